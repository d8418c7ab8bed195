mod config;
mod display;
mod errors;
mod hub;
mod models;
mod sensors;
mod telemetry;
mod utils;

use std::sync::{Arc, Mutex};

use log::{error, info};
use time::OffsetDateTime;

use config::AppConfig;
use display::{spawn_display_task, LogPanel};
use hub::credentials::{CredentialProvider, EnvCredentialProvider};
use hub::loopback::LoopbackHub;
use hub::transport::{HubTransport, StateReporter};
use sensors::board::{ClimateChannel, LightChannel, SoundChannel};
use sensors::reader::spawn_sampling_task;
use telemetry::aggregate::Aggregator;
use telemetry::command::CommandRouter;
use telemetry::dispatch::Dispatcher;
use telemetry::scheduler::{Cadence, DispatchConfig, SamplingGate, Scheduler};
use utils::format_datetime;

async fn run(
    config: AppConfig,
    transport: Arc<dyn HubTransport>,
    reporter: Arc<dyn StateReporter>,
    provider: Arc<dyn CredentialProvider>,
) -> Result<(), Box<dyn std::error::Error>> {
    info!(
        "Starting environmental telemetry service at {}",
        format_datetime(&OffsetDateTime::now_utc())
    );

    let dispatch_config = Arc::new(DispatchConfig::new(
        config.dispatch_initial_ms,
        config.dispatch_min_ms,
        config.dispatch_max_ms,
    )?);
    let aggregator = Arc::new(Mutex::new(Aggregator::for_env_metrics(
        config.loudness_noise_floor,
    )));
    let gate = SamplingGate::new();

    // Connect to the hub and register the interval command before any
    // task starts ticking.
    let router = Arc::new(CommandRouter::new(dispatch_config.clone(), reporter));
    let dispatcher = Dispatcher::connect(
        transport,
        provider,
        router.into_handler(),
        aggregator.clone(),
        gate.clone(),
    )
    .await?;

    let mut scheduler = Scheduler::new();

    spawn_sampling_task(
        &mut scheduler,
        &gate,
        &aggregator,
        config.climate_interval,
        Box::new(ClimateChannel::new()),
    );
    spawn_sampling_task(
        &mut scheduler,
        &gate,
        &aggregator,
        config.light_interval,
        Box::new(LightChannel::new()),
    );
    spawn_sampling_task(
        &mut scheduler,
        &gate,
        &aggregator,
        config.sound_interval,
        Box::new(SoundChannel::new()),
    );

    spawn_display_task(
        &mut scheduler,
        config.display_interval,
        &aggregator,
        &dispatch_config,
        LogPanel,
    );

    let dispatch = dispatcher.clone();
    scheduler.spawn_periodic(
        "dispatch",
        Cadence::Shared(dispatch_config.clone()),
        None,
        move || {
            let dispatcher = dispatch.clone();
            async move {
                dispatcher.tick().await;
                Ok(())
            }
        },
    );

    info!(
        "Telemetry loop running, dispatching every {} ms",
        dispatch_config.interval_ms()
    );

    // Run until Ctrl+C, then stop the periodic tasks and let any
    // in-flight publish finish on its own terms.
    tokio::signal::ctrl_c().await?;
    info!("Program terminated by user. Exiting gracefully.");
    scheduler.signal_shutdown();
    scheduler.join().await;

    Ok(())
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logging
    env_logger::Builder::from_default_env()
        .filter_level(log::LevelFilter::Info)
        .format_timestamp_secs()
        .init();

    // Load configuration
    let config = match AppConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            error!("Failed to load configuration: {}", e);
            return Err(e);
        }
    };

    // The loopback hub stands in for the vendor transport on a
    // development host: published records land in the log. It doubles as
    // the state-report sink.
    let hub = Arc::new(LoopbackHub::new());
    let provider = Arc::new(EnvCredentialProvider::new());

    if let Err(e) = run(config, hub.clone(), hub, provider).await {
        error!("Fatal error: {}", e);
        return Err(e);
    }

    info!("Program completed successfully");
    Ok(())
}
