//! Compiled-in node configuration.
//!
//! Thresholds and timings are constants. Endpoints and credentials have
//! compiled-in defaults that the environment may override at startup.

use std::env;
use std::time::Duration;

// ── Timing ──────────────────────────────────────────────────────────────────

/// Nominal main loop period (alert dwell and network calls add to it).
pub const LOOP_INTERVAL: Duration = Duration::from_secs(1);

/// Link status polling period of the connectivity watch loop.
pub const WATCH_INTERVAL: Duration = Duration::from_secs(1);

/// Minimum time between two accepted motion events.
pub const MOTION_DEBOUNCE: Duration = Duration::from_millis(3000);

/// How long the buzzer sounds for one accepted alert.
pub const ALERT_DWELL: Duration = Duration::from_millis(500);

/// Hard limit for one WiFi association attempt.
pub const WIFI_CONNECT_TIMEOUT: Duration = Duration::from_millis(5000);

/// Link status polling period while associating.
pub const WIFI_POLL_INTERVAL: Duration = Duration::from_millis(500);

/// Time allowed for the broker to answer CONNECT with CONNACK.
pub const MQTT_CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

pub const MQTT_KEEP_ALIVE: Duration = Duration::from_secs(30);

/// Request timeout for the HTTP save endpoint.
pub const HTTP_TIMEOUT: Duration = Duration::from_secs(10);

/// How long the boot banner stays on the display.
pub const SPLASH_DWELL: Duration = Duration::from_secs(2);

// ── Thresholds ──────────────────────────────────────────────────────────────

/// Light levels strictly below this raise the light alert (12-bit scale).
pub const LIGHT_THRESHOLD: u16 = 500;

/// Full scale of the ambient light reading (12-bit).
pub const LIGHT_MAX: u16 = 4095;

// ── Pin map (BCM numbering) ─────────────────────────────────────────────────

#[cfg(feature = "gpio")]
pub const DHT_PIN: u8 = 4;
#[cfg(feature = "gpio")]
pub const PIR_PIN: u8 = 27;
#[cfg(feature = "gpio")]
pub const BUZZER_PIN: u8 = 23;
#[cfg(feature = "gpio")]
pub const LED_MOTION_PIN: u8 = 5;
#[cfg(feature = "gpio")]
pub const LED_WIFI_PIN: u8 = 18;
#[cfg(feature = "gpio")]
pub const LED_LIGHT_PIN: u8 = 19;

/// I2C address of the ADS1115 carrying the light-dependent resistor.
#[cfg(feature = "adc")]
pub const LIGHT_ADC_ADDR: u16 = 0x48;
/// ADS1115 input the light sensor divider is wired to.
#[cfg(feature = "adc")]
pub const LIGHT_ADC_CHANNEL: usize = 0;

// ── Endpoints & credentials ─────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct NodeConfig {
    pub wifi_iface: String,
    pub wifi_ssid: String,
    pub wifi_password: String,
    pub mqtt_host: String,
    pub mqtt_port: u16,
    pub mqtt_client_id: String,
    /// Sent as the MQTT username; the password is always empty.
    pub mqtt_token: String,
    pub mqtt_topic: String,
    pub ingest_url: String,
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            wifi_iface: "wlan0".to_string(),
            wifi_ssid: "telemetry".to_string(),
            wifi_password: String::new(),
            mqtt_host: "industrial.api.ubidots.com".to_string(),
            mqtt_port: 1883,
            mqtt_client_id: "telemetry-node".to_string(),
            mqtt_token: String::new(),
            mqtt_topic: "/v1.6/devices/telemetry-node".to_string(),
            ingest_url: "http://127.0.0.1:5000/save".to_string(),
        }
    }
}

impl NodeConfig {
    /// Compiled-in defaults overridden by the process environment.
    pub fn from_env() -> Self {
        Self::default().with_overrides(|key| env::var(key).ok())
    }

    pub fn with_overrides<F>(mut self, lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let set = |key: &str, field: &mut String| {
            if let Some(v) = lookup(key) {
                *field = v;
            }
        };
        set("WIFI_IFACE", &mut self.wifi_iface);
        set("WIFI_SSID", &mut self.wifi_ssid);
        set("WIFI_PASSWORD", &mut self.wifi_password);
        set("MQTT_HOST", &mut self.mqtt_host);
        set("MQTT_CLIENT_ID", &mut self.mqtt_client_id);
        set("MQTT_TOKEN", &mut self.mqtt_token);
        set("MQTT_TOPIC", &mut self.mqtt_topic);
        set("INGEST_URL", &mut self.ingest_url);

        if let Some(port) = lookup("MQTT_PORT").and_then(|s| s.parse().ok()) {
            self.mqtt_port = port;
        }
        self
    }
}
