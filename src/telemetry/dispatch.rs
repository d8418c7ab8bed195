//! Telemetry dispatch cycle.
//!
//! One state machine per device: `Idle -> Sending -> {Idle, Reconnecting}`.
//! A tick that lands while a send is in flight is dropped, not queued:
//! at most one publish is ever outstanding, trading completeness for
//! device stability. Losing one interval's telemetry to a transport
//! hiccup is tolerated; an unauthorized rejection means the access token
//! expired, so the dispatcher refreshes credentials, reconnects, and
//! carries on at the next tick.

use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::{Arc, Mutex};

use log::{debug, error, info, warn};
use time::OffsetDateTime;
use tokio::sync::Mutex as AsyncMutex;

use crate::errors::ConnectError;
use crate::hub::credentials::CredentialProvider;
use crate::hub::transport::{CommandHandlerFn, HubConnection, HubTransport};
use crate::models::TelemetryRecord;
use crate::telemetry::aggregate::Aggregator;
use crate::telemetry::command::SET_TELEMETRY_INTERVAL;
use crate::telemetry::scheduler::SamplingGate;
use crate::utils::lock_recover;

const STATE_IDLE: u8 = 0;
const STATE_SENDING: u8 = 1;
const STATE_RECONNECTING: u8 = 2;

/// What one dispatch tick amounted to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchOutcome {
    /// Record published.
    Sent,
    /// A send was already in flight; this tick was dropped.
    Skipped,
    /// This interval's telemetry was lost (transport failure, or a failed
    /// reconnect). The next tick proceeds normally.
    Lost,
    /// Publish was rejected as unauthorized; credentials were refreshed
    /// and the connection re-established.
    Reconnected,
}

struct Link {
    connection: Box<dyn HubConnection>,
    device_id: String,
}

async fn establish(
    transport: &dyn HubTransport,
    provider: &dyn CredentialProvider,
    handler: &CommandHandlerFn,
) -> Result<Link, ConnectError> {
    let credentials = provider.fetch().await?;
    let connection = transport.connect(&credentials).await?;
    // Registrations do not survive the connection.
    connection.register_command_handler(SET_TELEMETRY_INTERVAL, handler.clone())?;

    info!(
        "Connected to hub {} as {}",
        credentials.hub_address, credentials.device_id
    );

    Ok(Link {
        connection,
        device_id: credentials.device_id,
    })
}

pub struct Dispatcher {
    transport: Arc<dyn HubTransport>,
    provider: Arc<dyn CredentialProvider>,
    handler: CommandHandlerFn,
    aggregator: Arc<Mutex<Aggregator>>,
    gate: SamplingGate,
    link: AsyncMutex<Link>,
    state: AtomicU8,
}

impl Dispatcher {
    /// Fetch credentials, open the hub connection and register the remote
    /// command handler.
    pub async fn connect(
        transport: Arc<dyn HubTransport>,
        provider: Arc<dyn CredentialProvider>,
        handler: CommandHandlerFn,
        aggregator: Arc<Mutex<Aggregator>>,
        gate: SamplingGate,
    ) -> Result<Arc<Self>, ConnectError> {
        let link = establish(transport.as_ref(), provider.as_ref(), &handler).await?;
        Ok(Arc::new(Dispatcher {
            transport,
            provider,
            handler,
            aggregator,
            gate,
            link: AsyncMutex::new(link),
            state: AtomicU8::new(STATE_IDLE),
        }))
    }

    /// One dispatch cycle: snapshot, build, publish.
    pub async fn tick(&self) -> DispatchOutcome {
        if self
            .state
            .compare_exchange(STATE_IDLE, STATE_SENDING, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            debug!("Dispatch tick dropped: send already in flight");
            return DispatchOutcome::Skipped;
        }

        // Coarse exclusion: sampling ticks are held off while the
        // aggregator is read out and the record is on its way.
        self.gate.pause();

        let snapshot = lock_recover(&self.aggregator).snapshot_env();

        let mut link = self.link.lock().await;
        let record = TelemetryRecord::new(&link.device_id, OffsetDateTime::now_utc(), &snapshot);
        let payload = match serde_json::to_vec(&record) {
            Ok(payload) => payload,
            Err(e) => {
                self.gate.resume();
                self.state.store(STATE_IDLE, Ordering::SeqCst);
                error!("Telemetry record serialization failed: {}", e);
                return DispatchOutcome::Lost;
            }
        };

        let result = link.connection.publish(&payload).await;
        self.gate.resume();

        match result {
            Ok(()) => {
                info!(
                    "Telemetry sent: temp={}°C humidity={}% brightness={} loudness={}",
                    record.temperature, record.humidity, record.brightness, record.loudness
                );
                self.state.store(STATE_IDLE, Ordering::SeqCst);
                DispatchOutcome::Sent
            }
            Err(e) if e.is_unauthorized() => {
                warn!("Publish rejected as unauthorized, refreshing credentials: {}", e);
                self.state.store(STATE_RECONNECTING, Ordering::SeqCst);

                let outcome = match establish(
                    self.transport.as_ref(),
                    self.provider.as_ref(),
                    &self.handler,
                )
                .await
                {
                    Ok(new_link) => {
                        *link = new_link;
                        info!("Hub connection re-established");
                        DispatchOutcome::Reconnected
                    }
                    Err(e) => {
                        error!("Reconnect failed, retrying on next tick: {}", e);
                        DispatchOutcome::Lost
                    }
                };

                self.state.store(STATE_IDLE, Ordering::SeqCst);
                outcome
            }
            Err(e) => {
                // Fire-and-forget: one interval's telemetry is lost, no
                // retry beyond the next natural tick.
                warn!("Telemetry for this interval lost: {}", e);
                self.state.store(STATE_IDLE, Ordering::SeqCst);
                DispatchOutcome::Lost
            }
        }
    }
}
