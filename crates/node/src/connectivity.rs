//! WiFi association, the MQTT session, and the 1 Hz link watch loop.
//!
//! The shared [`LinkState`] has exactly one writer: the
//! [`ConnectivityManager`], which runs the initial connect and then moves
//! into its own background task. Every other task only reads it, and may
//! see a value up to one poll interval old.
//!
//! ```text
//! Disconnected ──[associated]──▶ WifiUp ──[CONNACK]──▶ WifiUpMqttUp
//!      ▲                            │                        │
//!      └────────[link lost]─────────┴────────────────────────┘
//! ```

use anyhow::{bail, Context, Result};
use rumqttc::{AsyncClient, ConnectReturnCode, Event, EventLoop, MqttOptions, Packet, QoS};
use std::sync::Arc;
use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tokio::time::{sleep, Instant, MissedTickBehavior};

use crate::alert::Indicator;
use crate::config::{
    NodeConfig, MQTT_CONNECT_TIMEOUT, MQTT_KEEP_ALIVE, WATCH_INTERVAL, WIFI_CONNECT_TIMEOUT,
    WIFI_POLL_INTERVAL,
};
use crate::link::NetworkLink;

// ---------------------------------------------------------------------------
// MQTT session
// ---------------------------------------------------------------------------

/// Aborts the event loop task once the last session clone is gone.
struct Driver(JoinHandle<()>);

impl Drop for Driver {
    fn drop(&mut self) {
        self.0.abort();
    }
}

/// An open MQTT connection. Cheap to clone; the background event loop runs
/// until the first connection error or until every clone has been dropped.
/// A closed session is never revived; the watch loop opens a new one on the
/// next link-up.
#[derive(Clone)]
pub struct MqttSession {
    client: AsyncClient,
    driver: Arc<Driver>,
}

impl MqttSession {
    /// Connect and wait for the broker's CONNACK.
    pub async fn open(cfg: &NodeConfig) -> Result<Self> {
        let mut options = MqttOptions::new(&cfg.mqtt_client_id, &cfg.mqtt_host, cfg.mqtt_port);
        options.set_keep_alive(MQTT_KEEP_ALIVE);
        options.set_credentials(&cfg.mqtt_token, "");

        let (client, mut eventloop) = AsyncClient::new(options, 10);

        let handshake = async {
            loop {
                match eventloop.poll().await {
                    Ok(Event::Incoming(Packet::ConnAck(ack))) => {
                        if ack.code != ConnectReturnCode::Success {
                            bail!("broker refused connection: {:?}", ack.code);
                        }
                        return Ok(());
                    }
                    Ok(_) => {}
                    Err(e) => return Err(anyhow::Error::from(e).context("mqtt connect failed")),
                }
            }
        };
        tokio::time::timeout(MQTT_CONNECT_TIMEOUT, handshake)
            .await
            .with_context(|| format!("no CONNACK within {MQTT_CONNECT_TIMEOUT:?}"))??;

        let driver = tokio::spawn(drive(eventloop));
        Ok(Self {
            client,
            driver: Arc::new(Driver(driver)),
        })
    }

    /// Whether the event loop is still running.
    pub fn is_alive(&self) -> bool {
        !self.driver.0.is_finished()
    }

    /// Queue a QoS 0 publish without waiting. Fails if the outgoing queue is
    /// full or the session has closed.
    pub fn publish(&self, topic: &str, payload: Vec<u8>) -> Result<()> {
        if !self.is_alive() {
            bail!("mqtt session closed");
        }
        self.client
            .try_publish(topic, QoS::AtMostOnce, false, payload)
            .context("mqtt publish failed")
    }
}

/// Keep the session's event loop turning so queued publishes are flushed
/// and keep-alives are sent. Stops at the first connection error instead of
/// letting rumqttc reconnect on its own.
async fn drive(mut eventloop: EventLoop) {
    loop {
        if let Err(e) = eventloop.poll().await {
            tracing::warn!("mqtt session closed: {e}");
            return;
        }
    }
}

// ---------------------------------------------------------------------------
// Shared link state
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkPhase {
    Disconnected,
    WifiUp,
    WifiUpMqttUp,
}

/// What the rest of the node knows about the network.
///
/// `session` is only ever set while `wifi_connected` is true, but it is not
/// cleared when WiFi drops; a stale session simply fails to publish.
#[derive(Clone, Default)]
pub struct LinkState {
    pub wifi_connected: bool,
    pub session: Option<MqttSession>,
}

impl LinkState {
    pub fn phase(&self) -> LinkPhase {
        match (self.wifi_connected, self.session.is_some()) {
            (false, _) => LinkPhase::Disconnected,
            (true, false) => LinkPhase::WifiUp,
            (true, true) => LinkPhase::WifiUpMqttUp,
        }
    }
}

pub type SharedLink = Arc<RwLock<LinkState>>;

/// Link change observed by one watch poll.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    Up,
    Down,
}

// ---------------------------------------------------------------------------
// Manager
// ---------------------------------------------------------------------------

pub struct ConnectivityManager {
    link: Box<dyn NetworkLink>,
    indicator: Box<dyn Indicator>,
    shared: SharedLink,
    cfg: NodeConfig,
}

impl ConnectivityManager {
    pub fn new(link: Box<dyn NetworkLink>, indicator: Box<dyn Indicator>, cfg: NodeConfig) -> Self {
        Self {
            link,
            indicator,
            shared: SharedLink::default(),
            cfg,
        }
    }

    /// Read handle for the main loop.
    pub fn shared(&self) -> SharedLink {
        Arc::clone(&self.shared)
    }

    /// Bring the radio up and associate, polling for up to the connect
    /// timeout. Returns whether WiFi is up.
    pub async fn connect_wifi(&mut self) -> bool {
        if let Err(e) = self.link.activate() {
            tracing::warn!("wifi radio activation failed: {e:#}");
        }
        if let Err(e) = self.link.associate(&self.cfg.wifi_ssid, &self.cfg.wifi_password) {
            tracing::warn!(ssid = %self.cfg.wifi_ssid, "wifi association request failed: {e:#}");
        }

        let start = Instant::now();
        loop {
            if self.link.is_connected() {
                tracing::info!(ssid = %self.cfg.wifi_ssid, "wifi connected");
                self.set_wifi(true).await;
                return true;
            }
            if start.elapsed() >= WIFI_CONNECT_TIMEOUT {
                tracing::warn!(
                    timeout = ?WIFI_CONNECT_TIMEOUT,
                    "wifi connect timed out; continuing without network"
                );
                self.set_wifi(false).await;
                return false;
            }
            sleep(WIFI_POLL_INTERVAL).await;
        }
    }

    /// Open a fresh MQTT session, replacing any previous one. On failure the
    /// session is left absent.
    pub async fn connect_mqtt(&mut self) -> bool {
        let opened = MqttSession::open(&self.cfg).await;
        let mut st = self.shared.write().await;
        match opened {
            Ok(session) => {
                tracing::info!(host = %self.cfg.mqtt_host, port = self.cfg.mqtt_port, "mqtt connected");
                st.session = Some(session);
                true
            }
            Err(e) => {
                tracing::warn!(host = %self.cfg.mqtt_host, "mqtt connect failed: {e:#}");
                st.session = None;
                false
            }
        }
    }

    /// Initial connection sequence run once at boot.
    pub async fn connect(&mut self) {
        if self.connect_wifi().await {
            self.connect_mqtt().await;
        }
    }

    /// One watch-loop iteration: compare the raw link status with the last
    /// known state and react to a transition.
    pub async fn poll_once(&mut self) -> Option<Transition> {
        let up = self.link.is_connected();
        let was_up = self.shared.read().await.wifi_connected;

        match (was_up, up) {
            (false, true) => {
                tracing::info!("wifi reconnected");
                self.set_wifi(true).await;
                self.connect_mqtt().await;
                Some(Transition::Up)
            }
            (true, false) => {
                tracing::warn!("wifi lost");
                self.set_wifi(false).await;
                Some(Transition::Down)
            }
            _ => None,
        }
    }

    /// Poll the link forever at the watch cadence.
    pub async fn watch(mut self) {
        let mut ticker = tokio::time::interval(WATCH_INTERVAL);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            self.poll_once().await;
        }
    }

    /// Move the manager into its background watch task.
    pub fn start(self) -> JoinHandle<()> {
        tokio::spawn(self.watch())
    }

    async fn set_wifi(&mut self, up: bool) {
        self.shared.write().await.wifi_connected = up;
        self.indicator.set(up);
    }
}

// ===========================================================================
// Tests
// ===========================================================================
