/// Status panel refresh task
///
/// The device carries a small status readout; this module abstracts it
/// behind a trait and refreshes it on its own cadence with a
/// non-destructive view of the aggregates, so a slow or wedged panel can
/// never disturb the telemetry window.
use std::sync::{Arc, Mutex};
use std::time::Duration;

use log::debug;

use crate::models::Metric;
use crate::telemetry::aggregate::Aggregator;
use crate::telemetry::scheduler::{Cadence, DispatchConfig, Scheduler};
use crate::utils::lock_recover;

/// What the panel shows on each refresh.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PanelView {
    pub temperature: f64,
    pub humidity: f64,
    pub brightness: f64,
    pub loudness: f64,
    pub interval_ms: u64,
}

pub trait StatusPanel: Send + 'static {
    fn render(&mut self, view: &PanelView);
}

/// Panel that renders to the log, the development-host stand-in for the
/// physical readout.
pub struct LogPanel;

impl StatusPanel for LogPanel {
    fn render(&mut self, view: &PanelView) {
        debug!(
            "{:.1}°C  {:.1}%  light={:.0}  sound={:.0}  (sending every {} ms)",
            view.temperature, view.humidity, view.brightness, view.loudness, view.interval_ms
        );
    }
}

pub fn spawn_display_task(
    scheduler: &mut Scheduler,
    interval: Duration,
    aggregator: &Arc<Mutex<Aggregator>>,
    dispatch_config: &Arc<DispatchConfig>,
    panel: impl StatusPanel,
) {
    let aggregator = aggregator.clone();
    let dispatch_config = dispatch_config.clone();
    let panel = Arc::new(Mutex::new(panel));

    scheduler.spawn_periodic("display", Cadence::Fixed(interval), None, move || {
        let aggregator = aggregator.clone();
        let dispatch_config = dispatch_config.clone();
        let panel = panel.clone();
        async move {
            let view = {
                let aggregator = lock_recover(&aggregator);
                PanelView {
                    temperature: aggregator.peek(Metric::Temperature),
                    humidity: aggregator.peek(Metric::Humidity),
                    brightness: aggregator.peek(Metric::Brightness),
                    loudness: aggregator.peek(Metric::Loudness),
                    interval_ms: dispatch_config.interval_ms(),
                }
            };
            lock_recover(&panel).render(&view);
            Ok(())
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::time::sleep;

    struct CapturePanel {
        views: Arc<Mutex<Vec<PanelView>>>,
    }

    impl StatusPanel for CapturePanel {
        fn render(&mut self, view: &PanelView) {
            lock_recover(&self.views).push(*view);
        }
    }

    #[tokio::test]
    async fn display_renders_current_aggregates() {
        let aggregator = Arc::new(Mutex::new(Aggregator::for_env_metrics(512.0)));
        let dispatch_config = Arc::new(DispatchConfig::new(10000, 5000, 60000).unwrap());
        let views = Arc::new(Mutex::new(Vec::new()));

        {
            let mut agg = lock_recover(&aggregator);
            agg.record(Metric::Temperature, 21.5);
            agg.record(Metric::Brightness, 45.0);
        }

        let mut scheduler = Scheduler::new();
        spawn_display_task(
            &mut scheduler,
            Duration::from_millis(10),
            &aggregator,
            &dispatch_config,
            CapturePanel {
                views: views.clone(),
            },
        );

        sleep(Duration::from_millis(80)).await;
        scheduler.signal_shutdown();
        scheduler.join().await;

        let views = lock_recover(&views);
        assert!(!views.is_empty());
        assert_eq!(views[0].temperature, 21.5);
        assert_eq!(views[0].brightness, 45.0);
        assert_eq!(views[0].interval_ms, 10000);

        // Peek must not have disturbed the accumulation.
        assert_eq!(lock_recover(&aggregator).peek(Metric::Brightness), 45.0);
    }
}
