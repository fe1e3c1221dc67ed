//! The node's main loop: sample, detect, alert, draw, publish.

use tokio::time::{sleep, Instant};

use crate::alert::Alerter;
use crate::config::LOOP_INTERVAL;
use crate::connectivity::SharedLink;
use crate::detector::EventDetector;
use crate::display::{render, TextSurface};
use crate::publisher::{Channel, Publisher};
use crate::sensor::SensorReader;

pub struct Node<M, H> {
    sensors: SensorReader,
    detector: EventDetector,
    alerter: Alerter,
    surface: Box<dyn TextSurface>,
    link: SharedLink,
    publisher: Publisher<M, H>,
}

impl<M: Channel, H: Channel> Node<M, H> {
    pub fn new(
        sensors: SensorReader,
        alerter: Alerter,
        surface: Box<dyn TextSurface>,
        link: SharedLink,
        publisher: Publisher<M, H>,
    ) -> Self {
        Self {
            sensors,
            detector: EventDetector::default(),
            alerter,
            surface,
            link,
            publisher,
        }
    }

    /// One loop iteration. Never fails: every sensor, display and network
    /// fault is absorbed where it happens.
    pub async fn tick(&mut self) {
        let reading = self.sensors.sample();

        let motion = self
            .detector
            .evaluate_motion(Instant::now(), reading.motion_detected);
        if motion {
            tracing::info!("motion detected");
        }
        self.alerter.motion(motion).await;

        // No light alert on a failed read.
        let dark = reading
            .light_level
            .is_some_and(|level| self.detector.evaluate_light(level));
        self.alerter.light(dark).await;

        // Snapshot so the watch loop is never blocked on a slow publish.
        let link = self.link.read().await.clone();

        render(self.surface.as_mut(), &link, &reading, motion);
        self.publisher.publish(&reading, &link).await;
    }

    /// Tick forever at the nominal loop interval.
    pub async fn run(mut self) {
        loop {
            self.tick().await;
            sleep(LOOP_INTERVAL).await;
        }
    }
}
