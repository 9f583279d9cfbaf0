//! Sensor driver seam.
//!
//! The node only needs two operations from the hardware: bring the sensors up
//! and grab an averaged burst of samples. Drivers:
//! - `iio`: Linux industrial-I/O sysfs channels of the environmental board
//! - `simulated`: noisy synthetic readings for bench runs

pub mod iio;
pub mod simulated;

use std::time::Duration;

use crate::config::{NodeConfig, SensorDriverKind};
use crate::error::SensorError;

pub use iio::IioSensors;
pub use simulated::SimulatedSensors;

/// One averaged reading in physical units.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct SensorReading {
    /// Degrees Celsius.
    pub temperature: f32,
    /// Hectopascal.
    pub pressure: f32,
    /// Percent relative humidity.
    pub humidity: f32,
}

pub trait SensorDriver: Send {
    fn init(&mut self) -> Result<(), SensorError>;

    /// Takes `samples` readings `sample_interval` apart and returns their mean.
    ///
    /// Blocks for at most `(samples - 1) * sample_interval` plus read time.
    fn grab(&mut self, samples: u8, sample_interval: Duration) -> Result<SensorReading, SensorError>;
}

/// Builds the driver selected in the configuration.
pub fn from_config(config: &NodeConfig) -> Box<dyn SensorDriver> {
    match config.sensors.driver {
        SensorDriverKind::Iio => Box::new(IioSensors::new(config.sensors.iio_root.clone())),
        SensorDriverKind::Simulated => Box::new(SimulatedSensors::new(config.simulation.sensor_failure_probability)),
    }
}

/// Runs a fixed-count burst and averages it. Any failed sample fails the burst.
pub(crate) fn average_burst<F>(samples: u8, sample_interval: Duration, mut sample: F) -> Result<SensorReading, SensorError>
where
    F: FnMut() -> Result<SensorReading, SensorError>,
{
    let mut sum = SensorReading::default();
    for taken in 0..samples {
        if taken > 0 && !sample_interval.is_zero() {
            std::thread::sleep(sample_interval);
        }
        let reading = sample().map_err(|e| SensorError::Burst {
            taken,
            requested: samples,
            reason: e.to_string(),
        })?;
        sum.temperature += reading.temperature;
        sum.pressure += reading.pressure;
        sum.humidity += reading.humidity;
    }

    let count = f32::from(samples.max(1));
    Ok(SensorReading {
        temperature: sum.temperature / count,
        pressure: sum.pressure / count,
        humidity: sum.humidity / count,
    })
}
