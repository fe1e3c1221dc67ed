//! Best-effort telemetry fan-out to the MQTT topic and the HTTP save
//! endpoint.

use anyhow::{Context, Result};
use serde::Serialize;
use std::future::Future;

use crate::config::HTTP_TIMEOUT;
use crate::connectivity::LinkState;
use crate::sensor::Reading;

/// Wire shape shared by both channels.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Payload {
    pub temp: f32,
    pub hum: f32,
    pub light: u16,
    /// 0 or 1.
    pub motion: u8,
}

impl From<&Reading> for Payload {
    fn from(r: &Reading) -> Self {
        Self {
            temp: r.temperature_or_zero(),
            hum: r.humidity_or_zero(),
            light: r.light_or_zero(),
            motion: u8::from(r.motion_detected),
        }
    }
}

/// One outbound delivery path. A send is a single attempt.
pub trait Channel: Send + Sync {
    fn name(&self) -> &'static str;
    fn send(&self, link: &LinkState, payload: &Payload) -> impl Future<Output = Result<()>> + Send;
}

/// Publishes on the session currently held in the link state.
pub struct MqttChannel {
    topic: String,
}

impl MqttChannel {
    pub fn new(topic: impl Into<String>) -> Self {
        Self {
            topic: topic.into(),
        }
    }
}

impl Channel for MqttChannel {
    fn name(&self) -> &'static str {
        "mqtt"
    }

    async fn send(&self, link: &LinkState, payload: &Payload) -> Result<()> {
        let session = link.session.as_ref().context("no mqtt session")?;
        let body = serde_json::to_vec(payload)?;
        session.publish(&self.topic, body)
    }
}

pub struct HttpChannel {
    client: reqwest::Client,
    url: String,
}

impl HttpChannel {
    pub fn new(url: impl Into<String>) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(HTTP_TIMEOUT)
            .build()
            .context("failed to build http client")?;
        Ok(Self {
            client,
            url: url.into(),
        })
    }
}

impl Channel for HttpChannel {
    fn name(&self) -> &'static str {
        "http"
    }

    async fn send(&self, _link: &LinkState, payload: &Payload) -> Result<()> {
        let resp = self
            .client
            .post(&self.url)
            .json(payload)
            .send()
            .await
            .with_context(|| format!("POST {} failed", self.url))?
            .error_for_status()?;
        let body = resp.text().await.unwrap_or_default();
        tracing::debug!(url = %self.url, %body, "save endpoint replied");
        Ok(())
    }
}

pub struct Publisher<M, H> {
    mqtt: M,
    http: H,
}

impl<M: Channel, H: Channel> Publisher<M, H> {
    pub fn new(mqtt: M, http: H) -> Self {
        Self { mqtt, http }
    }

    /// Send `reading` on both channels when WiFi is up. Each channel gets one
    /// attempt; a failure is logged and dropped without affecting the other.
    pub async fn publish(&self, reading: &Reading, link: &LinkState) {
        if !link.wifi_connected {
            tracing::debug!("link down; reading dropped");
            return;
        }

        let payload = Payload::from(reading);
        let (mqtt, http) = tokio::join!(
            self.mqtt.send(link, &payload),
            self.http.send(link, &payload)
        );
        report(self.mqtt.name(), mqtt);
        report(self.http.name(), http);
    }
}

fn report(channel: &'static str, outcome: Result<()>) {
    match outcome {
        Ok(()) => tracing::debug!(channel, "reading sent"),
        Err(e) => tracing::warn!(channel, "send failed: {e:#}"),
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};

    /// Channel that counts attempts and records payloads.
    #[derive(Clone, Default)]
    pub(crate) struct CountingChannel {
        pub calls: Arc<AtomicUsize>,
        pub sent: Arc<Mutex<Vec<Payload>>>,
        pub fail: bool,
    }

    impl Channel for CountingChannel {
        fn name(&self) -> &'static str {
            "counting"
        }

        async fn send(&self, _link: &LinkState, payload: &Payload) -> Result<()> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                anyhow::bail!("unreachable");
            }
            self.sent.lock().unwrap().push(*payload);
            Ok(())
        }
    }

    fn reading() -> Reading {
        Reading {
            temperature: Some(22.0),
            humidity: Some(45.0),
            light_level: Some(300),
            motion_detected: true,
        }
    }

    fn link(up: bool) -> LinkState {
        LinkState {
            wifi_connected: up,
            session: None,
        }
    }

    #[tokio::test]
    async fn link_down_makes_no_calls() {
        let (m, h) = (CountingChannel::default(), CountingChannel::default());
        let p = Publisher::new(m.clone(), h.clone());
        p.publish(&reading(), &link(false)).await;
        assert_eq!(m.calls.load(Ordering::SeqCst), 0);
        assert_eq!(h.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn link_up_attempts_both_channels_once() {
        let (m, h) = (CountingChannel::default(), CountingChannel::default());
        let p = Publisher::new(m.clone(), h.clone());
        p.publish(&reading(), &link(true)).await;
        assert_eq!(m.calls.load(Ordering::SeqCst), 1);
        assert_eq!(h.calls.load(Ordering::SeqCst), 1);
        assert_eq!(m.sent.lock().unwrap()[0], h.sent.lock().unwrap()[0]);
    }

    #[tokio::test]
    async fn failing_mqtt_does_not_block_http() {
        let m = CountingChannel {
            fail: true,
            ..CountingChannel::default()
        };
        let h = CountingChannel::default();
        let p = Publisher::new(m.clone(), h.clone());
        p.publish(&reading(), &link(true)).await;
        assert_eq!(m.calls.load(Ordering::SeqCst), 1);
        assert_eq!(h.sent.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn failing_http_does_not_block_mqtt() {
        let m = CountingChannel::default();
        let h = CountingChannel {
            fail: true,
            ..CountingChannel::default()
        };
        let p = Publisher::new(m.clone(), h.clone());
        p.publish(&reading(), &link(true)).await;
        assert_eq!(h.calls.load(Ordering::SeqCst), 1);
        assert_eq!(m.sent.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn mqtt_channel_publishes_on_live_session() {
        use crate::connectivity::tests::{contains, loopback_broker};
        use crate::connectivity::MqttSession;

        let (cfg, mut packets) = loopback_broker(false).await;
        let live = LinkState {
            wifi_connected: true,
            session: Some(MqttSession::open(&cfg).await.unwrap()),
        };
        let ch = MqttChannel::new("tele/node/reading");
        ch.send(&live, &Payload::from(&reading())).await.unwrap();

        let packet = tokio::time::timeout(std::time::Duration::from_secs(2), packets.recv())
            .await
            .expect("no packet within 2s")
            .unwrap();
        assert!(contains(&packet, b"tele/node/reading"));
        assert!(contains(&packet, br#""light":300"#));
    }

    #[tokio::test]
    async fn mqtt_without_session_fails() {
        let ch = MqttChannel::new("tele/test");
        let payload = Payload::from(&reading());
        let err = ch.send(&link(true), &payload).await.unwrap_err();
        assert!(err.to_string().contains("no mqtt session"));
    }

    #[tokio::test]
    async fn http_to_closed_port_fails() {
        let ch = HttpChannel::new("http://127.0.0.1:1/save").unwrap();
        let payload = Payload::from(&reading());
        assert!(ch.send(&link(true), &payload).await.is_err());
    }

    #[test]
    fn payload_json_shape() {
        let json = serde_json::to_value(Payload::from(&reading())).unwrap();
        assert_eq!(
            json,
            serde_json::json!({ "temp": 22.0, "hum": 45.0, "light": 300, "motion": 1 })
        );
    }

    #[test]
    fn sensor_fault_is_sent_as_zero() {
        let r = Reading {
            temperature: None,
            humidity: None,
            motion_detected: false,
            ..reading()
        };
        let p = Payload::from(&r);
        assert_eq!((p.temp, p.hum, p.motion), (0.0, 0.0, 0));
    }
}
