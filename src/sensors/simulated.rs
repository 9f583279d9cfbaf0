//! Synthetic environmental readings for bench runs without the sensor board.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rand_distr::StandardNormal;
use std::time::Duration;

use super::{SensorDriver, SensorReading, average_burst};
use crate::error::SensorError;

/// Standard deviation of per-sample noise, in reading units.
const NOISE: f32 = 0.2;

const BASE_READING: SensorReading = SensorReading {
    temperature: 21.0,
    pressure: 1013.0,
    humidity: 45.0,
};

pub struct SimulatedSensors {
    rng: StdRng,
    failure_probability: f64,
    initialized: bool,
}

impl SimulatedSensors {
    pub fn new(failure_probability: f64) -> Self {
        Self::with_rng(StdRng::from_entropy(), failure_probability)
    }

    pub fn with_rng(rng: StdRng, failure_probability: f64) -> Self {
        Self {
            rng,
            failure_probability: failure_probability.clamp(0.0, 1.0),
            initialized: false,
        }
    }
}

impl SensorDriver for SimulatedSensors {
    fn init(&mut self) -> Result<(), SensorError> {
        self.initialized = true;
        Ok(())
    }

    fn grab(&mut self, samples: u8, sample_interval: Duration) -> Result<SensorReading, SensorError> {
        if !self.initialized {
            return Err(SensorError::NotInitialized);
        }
        if self.rng.gen_bool(self.failure_probability) {
            return Err(SensorError::Burst {
                taken: 0,
                requested: samples,
                reason: "simulated bus error".to_string(),
            });
        }

        let rng = &mut self.rng;
        average_burst(samples, sample_interval, || {
            let mut noise = || NOISE * rng.sample::<f32, _>(StandardNormal);
            Ok(SensorReading {
                temperature: BASE_READING.temperature + noise(),
                pressure: BASE_READING.pressure + noise() * 5.0,
                humidity: BASE_READING.humidity + noise() * 2.0,
            })
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn readings_stay_near_the_baseline() {
        let mut sensors = SimulatedSensors::with_rng(StdRng::seed_from_u64(7), 0.0);
        sensors.init().unwrap();
        let reading = sensors.grab(8, Duration::ZERO).unwrap();
        assert!((reading.temperature - 21.0).abs() < 2.0);
        assert!((reading.pressure - 1013.0).abs() < 10.0);
        assert!((reading.humidity - 45.0).abs() < 5.0);
    }

    #[test]
    fn certain_failure_fails_every_burst() {
        let mut sensors = SimulatedSensors::with_rng(StdRng::seed_from_u64(7), 1.0);
        sensors.init().unwrap();
        assert!(sensors.grab(8, Duration::ZERO).is_err());
    }
}
