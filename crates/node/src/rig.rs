//! Assembles the hardware the node runs on. Each part comes from a real
//! driver when its feature is enabled and from the simulator otherwise.

use anyhow::Result;

use crate::alert::{Alerter, Indicator};
use crate::config::NodeConfig;
use crate::display::{ConsoleSurface, TextSurface};
use crate::link::NetworkLink;
use crate::sensor::{ClimateSensor, LightInput, MotionInput, SensorReader};

#[cfg(not(any(feature = "sim", all(feature = "gpio", feature = "adc"))))]
compile_error!("without the `sim` feature both `gpio` and `adc` are required");

pub struct Rig {
    pub sensors: SensorReader,
    pub alerter: Alerter,
    pub wifi_led: Box<dyn Indicator>,
    pub link: Box<dyn NetworkLink>,
    pub surface: Box<dyn TextSurface>,
}

struct Outputs {
    motion_led: Box<dyn Indicator>,
    light_led: Box<dyn Indicator>,
    wifi_led: Box<dyn Indicator>,
    buzzer: Box<dyn Indicator>,
}

impl Rig {
    #[cfg_attr(feature = "sim", allow(unused_variables))]
    pub fn build(cfg: &NodeConfig) -> Result<Self> {
        #[cfg(feature = "sim")]
        let scenario = {
            let s = crate::sim::Scenario::from_str_lossy(
                &std::env::var("SIM_SCENARIO").unwrap_or_default(),
            );
            tracing::info!(scenario = %s, "simulation enabled");
            s
        };

        #[cfg(feature = "gpio")]
        let (climate, motion, outputs) = {
            use crate::config::{
                BUZZER_PIN, DHT_PIN, LED_LIGHT_PIN, LED_MOTION_PIN, LED_WIFI_PIN, PIR_PIN,
            };
            use crate::gpio::{Dht11, GpioOutput, PirInput};

            let gpio = rppal::gpio::Gpio::new()?;
            let climate: Box<dyn ClimateSensor> = Box::new(Dht11::new(&gpio, DHT_PIN)?);
            let motion: Box<dyn MotionInput> = Box::new(PirInput::new(&gpio, PIR_PIN)?);
            let outputs = Outputs {
                motion_led: Box::new(GpioOutput::new(&gpio, LED_MOTION_PIN)?),
                light_led: Box::new(GpioOutput::new(&gpio, LED_LIGHT_PIN)?),
                wifi_led: Box::new(GpioOutput::new(&gpio, LED_WIFI_PIN)?),
                buzzer: Box::new(GpioOutput::new(&gpio, BUZZER_PIN)?),
            };
            (climate, motion, outputs)
        };

        #[cfg(not(feature = "gpio"))]
        let (climate, motion, outputs) = {
            use crate::alert::LogIndicator;
            use crate::sim::{SimClimate, SimMotion};

            let climate: Box<dyn ClimateSensor> = Box::new(SimClimate::new(scenario));
            let motion: Box<dyn MotionInput> = Box::new(SimMotion::new(scenario));
            let outputs = Outputs {
                motion_led: Box::new(LogIndicator::new("led_motion")),
                light_led: Box::new(LogIndicator::new("led_light")),
                wifi_led: Box::new(LogIndicator::new("led_wifi")),
                buzzer: Box::new(LogIndicator::new("buzzer")),
            };
            (climate, motion, outputs)
        };

        #[cfg(feature = "adc")]
        let light: Box<dyn LightInput> = Box::new(crate::adc::AdsLight::new(
            crate::config::LIGHT_ADC_ADDR,
            crate::config::LIGHT_ADC_CHANNEL,
        )?);

        #[cfg(not(feature = "adc"))]
        let light: Box<dyn LightInput> = Box::new(crate::sim::SimLight::new(scenario, 600));

        #[cfg(feature = "sim")]
        let link: Box<dyn NetworkLink> = Box::new(crate::sim::SimLink::new(scenario));

        #[cfg(not(feature = "sim"))]
        let link: Box<dyn NetworkLink> = Box::new(crate::link::HostLink::new(&cfg.wifi_iface));

        Ok(Self {
            sensors: SensorReader::new(climate, motion, light),
            alerter: Alerter::new(outputs.motion_led, outputs.light_led, outputs.buzzer),
            wifi_led: outputs.wifi_led,
            link,
            surface: Box::new(ConsoleSurface::default()),
        })
    }
}
