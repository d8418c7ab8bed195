/// In-memory reduction of noisy sensor readings between dispatch cycles
use std::collections::HashMap;

use log::warn;

use crate::models::{EnvSnapshot, Metric};

/// How a metric's raw samples are reduced between dispatch cycles.
///
/// Fixed at construction; the policy decides what `record` accumulates and
/// what `snapshot_and_reset` hands to the dispatcher.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Reduction {
    /// Arithmetic mean of all samples strictly above the noise floor.
    /// Snapshot clears the buffer; an empty buffer reads as 0.0.
    Average { noise_floor: f64 },
    /// Maximum value since the last snapshot; snapshot resets to 0.0.
    PeakHold,
    /// Most recent sample. Snapshot does not reset it; the value persists
    /// until the next real sample arrives.
    Latest,
}

#[derive(Debug)]
struct Slot {
    reduction: Reduction,
    /// Accumulation buffer, used by `Average` only.
    buffer: Vec<f64>,
    /// Current reduced value for `PeakHold` and `Latest`.
    value: f64,
}

impl Slot {
    fn new(reduction: Reduction) -> Self {
        Slot {
            reduction,
            buffer: Vec::new(),
            value: 0.0,
        }
    }
}

/// Accumulates readings per metric between dispatch cycles.
///
/// Exactly one slot exists per tracked metric for the life of the
/// aggregator. `record` is called from the sampling tasks, the snapshot
/// methods from the dispatch and display tasks; the owner wraps the whole
/// aggregator in a mutex so every observer sees a consistent value.
#[derive(Debug)]
pub struct Aggregator {
    slots: HashMap<Metric, Slot>,
}

impl Aggregator {
    pub fn new(policies: impl IntoIterator<Item = (Metric, Reduction)>) -> Self {
        let slots = policies
            .into_iter()
            .map(|(metric, reduction)| (metric, Slot::new(reduction)))
            .collect();
        Aggregator { slots }
    }

    /// The standard four-metric setup: averaged loudness above the noise
    /// floor, peak-hold brightness, latest-value climate readings.
    pub fn for_env_metrics(loudness_noise_floor: f64) -> Self {
        Aggregator::new([
            (Metric::Temperature, Reduction::Latest),
            (Metric::Humidity, Reduction::Latest),
            (Metric::Brightness, Reduction::PeakHold),
            (
                Metric::Loudness,
                Reduction::Average {
                    noise_floor: loudness_noise_floor,
                },
            ),
        ])
    }

    /// Fold one validated sample into its metric's slot.
    pub fn record(&mut self, metric: Metric, value: f64) {
        let slot = match self.slots.get_mut(&metric) {
            Some(slot) => slot,
            None => {
                warn!("Reading for untracked metric {} dropped", metric.name());
                return;
            }
        };

        match slot.reduction {
            Reduction::Average { noise_floor } => {
                if value > noise_floor {
                    slot.buffer.push(value);
                }
            }
            Reduction::PeakHold => {
                if value > slot.value {
                    slot.value = value;
                }
            }
            Reduction::Latest => slot.value = value,
        }
    }

    /// Read out the reduced value and clear the transient accumulation.
    ///
    /// Averaged and peak-hold metrics start a fresh window; a latest-value
    /// metric keeps its value until the next real sample.
    pub fn snapshot_and_reset(&mut self, metric: Metric) -> f64 {
        let slot = match self.slots.get_mut(&metric) {
            Some(slot) => slot,
            None => {
                warn!("Snapshot of untracked metric {} reads 0", metric.name());
                return 0.0;
            }
        };

        match slot.reduction {
            Reduction::Average { .. } => {
                let mean = if slot.buffer.is_empty() {
                    0.0
                } else {
                    slot.buffer.iter().sum::<f64>() / slot.buffer.len() as f64
                };
                slot.buffer.clear();
                mean
            }
            Reduction::PeakHold => std::mem::replace(&mut slot.value, 0.0),
            Reduction::Latest => slot.value,
        }
    }

    /// Current reduced value without disturbing the accumulation window.
    /// Used by the display task.
    pub fn peek(&self, metric: Metric) -> f64 {
        match self.slots.get(&metric) {
            Some(slot) => match slot.reduction {
                Reduction::Average { .. } => {
                    if slot.buffer.is_empty() {
                        0.0
                    } else {
                        slot.buffer.iter().sum::<f64>() / slot.buffer.len() as f64
                    }
                }
                Reduction::PeakHold | Reduction::Latest => slot.value,
            },
            None => 0.0,
        }
    }

    /// Snapshot all four environmental metrics for one dispatch cycle.
    pub fn snapshot_env(&mut self) -> EnvSnapshot {
        EnvSnapshot {
            temperature: self.snapshot_and_reset(Metric::Temperature),
            humidity: self.snapshot_and_reset(Metric::Humidity),
            brightness: self.snapshot_and_reset(Metric::Brightness),
            loudness: self.snapshot_and_reset(Metric::Loudness),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn averaged_metric_ignores_values_at_or_below_noise_floor() {
        let mut agg = Aggregator::for_env_metrics(512.0);

        // 510 is below the floor and discarded; the mean covers {530, 600}.
        agg.record(Metric::Loudness, 510.0);
        agg.record(Metric::Loudness, 530.0);
        agg.record(Metric::Loudness, 600.0);

        assert_eq!(agg.snapshot_and_reset(Metric::Loudness), 565.0);
    }

    #[test]
    fn averaged_metric_resets_after_snapshot() {
        let mut agg = Aggregator::for_env_metrics(512.0);
        agg.record(Metric::Loudness, 600.0);

        assert_eq!(agg.snapshot_and_reset(Metric::Loudness), 600.0);
        // No intervening samples: the second snapshot reads empty.
        assert_eq!(agg.snapshot_and_reset(Metric::Loudness), 0.0);
    }

    #[test]
    fn peak_hold_keeps_maximum_and_resets() {
        let mut agg = Aggregator::for_env_metrics(512.0);

        agg.record(Metric::Brightness, 10.0);
        agg.record(Metric::Brightness, 45.0);
        agg.record(Metric::Brightness, 22.0);

        assert_eq!(agg.snapshot_and_reset(Metric::Brightness), 45.0);
        assert_eq!(agg.snapshot_and_reset(Metric::Brightness), 0.0);
    }

    #[test]
    fn latest_value_survives_snapshots() {
        let mut agg = Aggregator::for_env_metrics(512.0);

        agg.record(Metric::Temperature, 20.5);
        agg.record(Metric::Temperature, 21.0);

        assert_eq!(agg.snapshot_and_reset(Metric::Temperature), 21.0);
        assert_eq!(agg.snapshot_and_reset(Metric::Temperature), 21.0);

        agg.record(Metric::Temperature, 19.5);
        assert_eq!(agg.snapshot_and_reset(Metric::Temperature), 19.5);
    }

    #[test]
    fn snapshot_with_no_samples_reads_defaults() {
        let mut agg = Aggregator::for_env_metrics(512.0);
        let snapshot = agg.snapshot_env();
        assert_eq!(snapshot, EnvSnapshot::default());
    }

    #[test]
    fn peek_does_not_disturb_accumulation() {
        let mut agg = Aggregator::for_env_metrics(512.0);
        agg.record(Metric::Loudness, 600.0);
        agg.record(Metric::Brightness, 45.0);

        assert_eq!(agg.peek(Metric::Loudness), 600.0);
        assert_eq!(agg.peek(Metric::Brightness), 45.0);

        // Still there for the real snapshot.
        assert_eq!(agg.snapshot_and_reset(Metric::Loudness), 600.0);
        assert_eq!(agg.snapshot_and_reset(Metric::Brightness), 45.0);
    }

    #[test]
    fn untracked_metric_is_dropped_not_created() {
        let mut agg = Aggregator::new([(Metric::Temperature, Reduction::Latest)]);
        agg.record(Metric::Loudness, 600.0);
        assert_eq!(agg.snapshot_and_reset(Metric::Loudness), 0.0);
    }
}
