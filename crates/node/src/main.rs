#[cfg(feature = "adc")]
mod adc;
mod alert;
mod config;
mod connectivity;
mod control;
mod detector;
mod display;
#[cfg(feature = "gpio")]
mod gpio;
#[cfg_attr(feature = "sim", allow(dead_code))]
mod link;
mod publisher;
mod rig;
mod sensor;
#[cfg(feature = "sim")]
#[cfg_attr(any(feature = "gpio", feature = "adc"), allow(dead_code))]
mod sim;

use anyhow::Result;
use tokio::time::sleep;
use tracing_subscriber::EnvFilter;

use config::{NodeConfig, SPLASH_DWELL};
use connectivity::ConnectivityManager;
use control::Node;
use publisher::{HttpChannel, MqttChannel, Publisher};
use rig::Rig;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cfg = NodeConfig::from_env();
    let mut rig = Rig::build(&cfg)?;

    display::render_splash(rig.surface.as_mut());
    sleep(SPLASH_DWELL).await;

    // ── Network ─────────────────────────────────────────────────────
    // One bounded attempt at boot; after that the watch task owns the link
    // state and reconnects on its own.
    let mut manager = ConnectivityManager::new(rig.link, rig.wifi_led, cfg.clone());
    manager.connect().await;
    let link = manager.shared();
    tracing::info!(phase = ?link.read().await.phase(), "initial connect finished");
    let watch = manager.start();

    // ── Main loop ───────────────────────────────────────────────────
    let publisher = Publisher::new(
        MqttChannel::new(&cfg.mqtt_topic),
        HttpChannel::new(&cfg.ingest_url)?,
    );
    let node = Node::new(rig.sensors, rig.alerter, rig.surface, link, publisher);

    tracing::info!(topic = %cfg.mqtt_topic, url = %cfg.ingest_url, "node running");
    tokio::select! {
        _ = node.run() => {}
        res = watch => {
            tracing::error!("connectivity watch task ended: {res:?}");
        }
    }
    Ok(())
}
