//! Environmental sensors exposed through the Linux industrial-I/O sysfs ABI.
//!
//! The board carries a humidity chip (relative humidity + temperature) and a
//! pressure chip. The kernel drivers publish them under
//! `/sys/bus/iio/devices/iio:deviceN/` as either processed `in_<chan>_input`
//! files or `in_<chan>_raw` with optional `_offset` and `_scale`.
//!
//! ABI units: temperature in milli °C, pressure in kPa, humidity in milli %RH.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use super::{SensorDriver, SensorReading, average_burst};
use crate::error::SensorError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Quantity {
    Temperature,
    Pressure,
    Humidity,
}

impl Quantity {
    fn channel(self) -> &'static str {
        match self {
            Quantity::Temperature => "temp",
            Quantity::Pressure => "pressure",
            Quantity::Humidity => "humidityrelative",
        }
    }

    /// Factor from the IIO ABI unit to the unit of [`SensorReading`].
    fn to_reading_unit(self) -> f64 {
        match self {
            Quantity::Temperature => 0.001,
            Quantity::Pressure => 10.0,
            Quantity::Humidity => 0.001,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
enum Channel {
    Processed(PathBuf),
    Raw { raw: PathBuf, offset: f64, scale: f64 },
}

impl Channel {
    fn discover(device: &Path, channel: &str) -> Result<Option<Channel>, SensorError> {
        let processed = device.join(format!("in_{channel}_input"));
        if processed.is_file() {
            return Ok(Some(Channel::Processed(processed)));
        }

        let raw = device.join(format!("in_{channel}_raw"));
        if !raw.is_file() {
            return Ok(None);
        }
        let offset = read_optional(&device.join(format!("in_{channel}_offset")))?.unwrap_or(0.0);
        let scale = read_optional(&device.join(format!("in_{channel}_scale")))?.unwrap_or(1.0);
        Ok(Some(Channel::Raw { raw, offset, scale }))
    }

    fn read(&self) -> Result<f64, SensorError> {
        match self {
            Channel::Processed(path) => read_value(path),
            Channel::Raw { raw, offset, scale } => Ok((read_value(raw)? + offset) * scale),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
struct Channels {
    temperature: Channel,
    pressure: Channel,
    humidity: Channel,
}

pub struct IioSensors {
    root: PathBuf,
    channels: Option<Channels>,
}

impl IioSensors {
    pub fn new(root: PathBuf) -> Self {
        Self { root, channels: None }
    }

    fn device_dirs(&self) -> Result<Vec<PathBuf>, SensorError> {
        let entries = fs::read_dir(&self.root).map_err(|source| SensorError::Read {
            path: self.root.clone(),
            source,
        })?;

        let mut devices: Vec<PathBuf> = entries
            .filter_map(|entry| entry.ok())
            .map(|entry| entry.path())
            .filter(|path| {
                path.file_name()
                    .and_then(|name| name.to_str())
                    .is_some_and(|name| name.starts_with("iio:device"))
            })
            .collect();
        devices.sort();
        Ok(devices)
    }

    /// Returns the first device channel providing `quantity`.
    ///
    /// Temperature is taken from the humidity chip when it has one, since the
    /// pressure chip's die temperature runs warmer.
    fn find(&self, devices: &[PathBuf], quantity: Quantity) -> Result<Channel, SensorError> {
        if quantity == Quantity::Temperature {
            for device in devices {
                if Channel::discover(device, Quantity::Humidity.channel())?.is_some() {
                    if let Some(channel) = Channel::discover(device, quantity.channel())? {
                        return Ok(channel);
                    }
                }
            }
        }
        for device in devices {
            if let Some(channel) = Channel::discover(device, quantity.channel())? {
                return Ok(channel);
            }
        }
        Err(SensorError::NotFound(self.root.join(format!("*/in_{}_*", quantity.channel()))))
    }

    fn sample(channels: &Channels) -> Result<SensorReading, SensorError> {
        Ok(SensorReading {
            temperature: (channels.temperature.read()? * Quantity::Temperature.to_reading_unit()) as f32,
            pressure: (channels.pressure.read()? * Quantity::Pressure.to_reading_unit()) as f32,
            humidity: (channels.humidity.read()? * Quantity::Humidity.to_reading_unit()) as f32,
        })
    }
}

impl SensorDriver for IioSensors {
    fn init(&mut self) -> Result<(), SensorError> {
        self.channels = None;
        let devices = self.device_dirs()?;
        let channels = Channels {
            temperature: self.find(&devices, Quantity::Temperature)?,
            pressure: self.find(&devices, Quantity::Pressure)?,
            humidity: self.find(&devices, Quantity::Humidity)?,
        };
        log::debug!("IIO channels discovered: {:?}", channels);
        self.channels = Some(channels);
        Ok(())
    }

    fn grab(&mut self, samples: u8, sample_interval: Duration) -> Result<SensorReading, SensorError> {
        let channels = self.channels.as_ref().ok_or(SensorError::NotInitialized)?;
        average_burst(samples, sample_interval, || Self::sample(channels))
    }
}

fn read_value(path: &Path) -> Result<f64, SensorError> {
    let content = fs::read_to_string(path).map_err(|source| SensorError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    let trimmed = content.trim();
    trimmed.parse().map_err(|_| SensorError::Malformed {
        path: path.to_path_buf(),
        value: trimmed.to_string(),
    })
}

fn read_optional(path: &Path) -> Result<Option<f64>, SensorError> {
    if path.is_file() { read_value(path).map(Some) } else { Ok(None) }
}
