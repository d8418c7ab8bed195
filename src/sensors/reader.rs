/// Sensor channel sampling and reading validation
use std::sync::{Arc, Mutex};
use std::time::Duration;

use log::debug;

use crate::errors::SensorError;
use crate::models::{Metric, SensorReading};
use crate::telemetry::aggregate::Aggregator;
use crate::telemetry::scheduler::{Cadence, SamplingGate, Scheduler};
use crate::utils::{format_datetime, lock_recover};

/// One physical sensor channel.
///
/// A single hardware transaction may yield more than one metric (the
/// climate sensor reports temperature and humidity together); light and
/// sound yield one reading each. Implementations return raw readings;
/// plausibility checking happens in `validate`, so the "ignore transient
/// errors" policy stays a visible decision at the call site instead of a
/// hidden catch inside the driver.
pub trait SensorChannel: Send + 'static {
    fn label(&self) -> &'static str;

    fn sample(&mut self) -> Result<Vec<SensorReading>, SensorError>;
}

/// Plausible value range per metric.
///
/// Climate bounds follow common DHT-class sensor datasheets; brightness
/// and loudness are raw 10-bit ADC values.
fn plausible_range(metric: Metric) -> (f64, f64) {
    match metric {
        Metric::Temperature => (-40.0, 85.0),
        Metric::Humidity => (0.0, 100.0),
        Metric::Brightness | Metric::Loudness => (0.0, 1023.0),
    }
}

/// Reject readings a healthy sensor cannot produce: NaN from a failed
/// bus transaction, values outside the physical range, and the all-zero
/// humidity a misread digital sensor reports.
pub fn validate(reading: &SensorReading) -> Result<(), SensorError> {
    let value = reading.value;
    if value.is_nan() {
        return Err(SensorError::NotANumber);
    }

    let (min, max) = plausible_range(reading.metric);
    if value < min || value > max {
        return Err(SensorError::OutOfRange { value, min, max });
    }

    if reading.metric == Metric::Humidity && value == 0.0 {
        return Err(SensorError::ImplausibleZero);
    }

    Ok(())
}

/// One sampling pass: read the channel, validate, fold into the
/// aggregator. Sensor faults are transient by definition: the previous
/// aggregated value is kept and nothing propagates to the scheduler.
fn sample_once(channel: &mut dyn SensorChannel, aggregator: &Mutex<Aggregator>) {
    let readings = match channel.sample() {
        Ok(readings) => readings,
        Err(e) => {
            debug!("{}: sample dropped: {}", channel.label(), e);
            return;
        }
    };

    let mut aggregator = lock_recover(aggregator);
    for reading in readings {
        match validate(&reading) {
            Ok(()) => {
                debug!(
                    "{}: {}={:.2} at {}",
                    channel.label(),
                    reading.metric.name(),
                    reading.value,
                    format_datetime(&reading.taken_at)
                );
                aggregator.record(reading.metric, reading.value);
            }
            Err(e) => debug!(
                "{}: invalid {} reading dropped: {}",
                channel.label(),
                reading.metric.name(),
                e
            ),
        }
    }
}

/// Run a channel as a periodic sampling task. The scheduler's per-task
/// guard keeps hardware transactions on one channel from overlapping, and
/// the gate lets the dispatcher hold sampling off during its snapshot.
pub fn spawn_sampling_task(
    scheduler: &mut Scheduler,
    gate: &SamplingGate,
    aggregator: &Arc<Mutex<Aggregator>>,
    interval: Duration,
    channel: Box<dyn SensorChannel>,
) {
    let name = channel.label();
    let channel = Arc::new(Mutex::new(channel));
    let aggregator = aggregator.clone();

    scheduler.spawn_periodic(name, Cadence::Fixed(interval), Some(gate.clone()), move || {
        let channel = channel.clone();
        let aggregator = aggregator.clone();
        async move {
            let mut channel = lock_recover(&channel);
            sample_once(&mut **channel, &aggregator);
            Ok(())
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn nan_readings_are_rejected() {
        let reading = SensorReading::new(Metric::Temperature, f64::NAN);
        assert!(matches!(
            validate(&reading),
            Err(SensorError::NotANumber)
        ));
    }

    #[test]
    fn out_of_range_readings_are_rejected() {
        assert!(validate(&SensorReading::new(Metric::Temperature, -60.0)).is_err());
        assert!(validate(&SensorReading::new(Metric::Humidity, 101.0)).is_err());
        assert!(validate(&SensorReading::new(Metric::Loudness, 2048.0)).is_err());
        assert!(validate(&SensorReading::new(Metric::Brightness, -1.0)).is_err());
    }

    #[test]
    fn zero_humidity_is_implausible_but_zero_brightness_is_not() {
        assert!(matches!(
            validate(&SensorReading::new(Metric::Humidity, 0.0)),
            Err(SensorError::ImplausibleZero)
        ));
        assert!(validate(&SensorReading::new(Metric::Brightness, 0.0)).is_ok());
        // 0 °C is a perfectly good winter reading.
        assert!(validate(&SensorReading::new(Metric::Temperature, 0.0)).is_ok());
    }

    #[test]
    fn plausible_readings_pass() {
        assert!(validate(&SensorReading::new(Metric::Temperature, 21.5)).is_ok());
        assert!(validate(&SensorReading::new(Metric::Humidity, 40.0)).is_ok());
        assert!(validate(&SensorReading::new(Metric::Loudness, 1023.0)).is_ok());
    }

    struct ScriptedChannel {
        results: Vec<Result<Vec<SensorReading>, SensorError>>,
    }

    impl SensorChannel for ScriptedChannel {
        fn label(&self) -> &'static str {
            "scripted"
        }

        fn sample(&mut self) -> Result<Vec<SensorReading>, SensorError> {
            self.results.remove(0)
        }
    }

    #[test]
    fn sensor_faults_keep_previous_aggregate() {
        let aggregator = Mutex::new(Aggregator::for_env_metrics(512.0));
        let mut channel = ScriptedChannel {
            results: vec![
                Ok(vec![SensorReading::new(Metric::Temperature, 20.0)]),
                Err(SensorError::ReadFailed("bus timeout".into())),
                Ok(vec![SensorReading::new(Metric::Temperature, f64::NAN)]),
            ],
        };

        sample_once(&mut channel, &aggregator);
        sample_once(&mut channel, &aggregator); // read failure, swallowed
        sample_once(&mut channel, &aggregator); // NaN, swallowed

        let value = lock_recover(&aggregator).snapshot_and_reset(Metric::Temperature);
        assert_eq!(value, 20.0);
    }
}
