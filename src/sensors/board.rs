//! Simulated sensor board.
//!
//! Stands in for the physical sensor hat so the full loop runs on a
//! development host. Values follow a small random walk around realistic
//! indoor levels, and each channel occasionally produces the faults its
//! real counterpart is known for (NaN climate reads, ADC bus timeouts),
//! which keeps the swallow-and-continue path honest.

use rand::Rng;

use crate::errors::SensorError;
use crate::models::{Metric, SensorReading};
use crate::sensors::reader::SensorChannel;

const CLIMATE_FAULT_PROBABILITY: f64 = 0.02;
const ADC_FAULT_PROBABILITY: f64 = 0.01;
const SOUND_SPIKE_PROBABILITY: f64 = 0.1;

/// Combined temperature/humidity sensor; one transaction, two readings.
pub struct ClimateChannel {
    temperature: f64,
    humidity: f64,
}

impl ClimateChannel {
    pub fn new() -> Self {
        ClimateChannel {
            temperature: 21.0,
            humidity: 40.0,
        }
    }
}

impl Default for ClimateChannel {
    fn default() -> Self {
        Self::new()
    }
}

impl SensorChannel for ClimateChannel {
    fn label(&self) -> &'static str {
        "climate"
    }

    fn sample(&mut self) -> Result<Vec<SensorReading>, SensorError> {
        let mut rng = rand::thread_rng();

        // A failed checksum on the real sensor surfaces as NaN.
        if rng.gen_bool(CLIMATE_FAULT_PROBABILITY) {
            return Ok(vec![
                SensorReading::new(Metric::Temperature, f64::NAN),
                SensorReading::new(Metric::Humidity, f64::NAN),
            ]);
        }

        self.temperature = (self.temperature + rng.gen_range(-0.2..0.2)).clamp(-10.0, 45.0);
        self.humidity = (self.humidity + rng.gen_range(-0.5..0.5)).clamp(5.0, 95.0);

        Ok(vec![
            SensorReading::new(Metric::Temperature, self.temperature),
            SensorReading::new(Metric::Humidity, self.humidity),
        ])
    }
}

/// Analog light sensor on a 10-bit ADC.
pub struct LightChannel {
    level: f64,
}

impl LightChannel {
    pub fn new() -> Self {
        LightChannel { level: 450.0 }
    }
}

impl Default for LightChannel {
    fn default() -> Self {
        Self::new()
    }
}

impl SensorChannel for LightChannel {
    fn label(&self) -> &'static str {
        "light"
    }

    fn sample(&mut self) -> Result<Vec<SensorReading>, SensorError> {
        let mut rng = rand::thread_rng();

        if rng.gen_bool(ADC_FAULT_PROBABILITY) {
            return Err(SensorError::ReadFailed("adc bus timeout".to_string()));
        }

        self.level = (self.level + rng.gen_range(-20.0..20.0)).clamp(0.0, 1023.0);
        Ok(vec![SensorReading::new(Metric::Brightness, self.level)])
    }
}

/// Analog sound sensor; quiet ambient base with occasional spikes.
pub struct SoundChannel {
    ambient: f64,
}

impl SoundChannel {
    pub fn new() -> Self {
        SoundChannel { ambient: 380.0 }
    }
}

impl Default for SoundChannel {
    fn default() -> Self {
        Self::new()
    }
}

impl SensorChannel for SoundChannel {
    fn label(&self) -> &'static str {
        "sound"
    }

    fn sample(&mut self) -> Result<Vec<SensorReading>, SensorError> {
        let mut rng = rand::thread_rng();

        if rng.gen_bool(ADC_FAULT_PROBABILITY) {
            return Err(SensorError::ReadFailed("adc bus timeout".to_string()));
        }

        self.ambient = (self.ambient + rng.gen_range(-15.0..15.0)).clamp(200.0, 500.0);
        let level = if rng.gen_bool(SOUND_SPIKE_PROBABILITY) {
            rng.gen_range(650.0..950.0)
        } else {
            self.ambient
        };

        Ok(vec![SensorReading::new(Metric::Loudness, level)])
    }
}
