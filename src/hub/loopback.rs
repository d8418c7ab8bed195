//! In-process hub used for local runs and tests.
//!
//! Publishes land in a buffer (and in the log), remote commands are routed
//! to whatever handler the device registered, and faults or publish delays
//! can be injected to drive the dispatcher's failure paths.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use log::info;

use crate::errors::TransportError;
use crate::hub::credentials::Credentials;
use crate::hub::transport::{CommandHandlerFn, HubConnection, HubTransport, StateReporter};
use crate::models::StatePatch;
use crate::telemetry::command::CommandResponse;
use crate::utils::lock_recover;

#[derive(Default)]
struct LoopbackState {
    published: Mutex<Vec<Vec<u8>>>,
    handlers: Mutex<HashMap<String, CommandHandlerFn>>,
    patches: Mutex<Vec<StatePatch>>,
    publish_faults: Mutex<VecDeque<TransportError>>,
    publish_delay: Mutex<Option<Duration>>,
    connects: AtomicUsize,
}

pub struct LoopbackHub {
    state: Arc<LoopbackState>,
}

impl LoopbackHub {
    pub fn new() -> Self {
        LoopbackHub {
            state: Arc::new(LoopbackState::default()),
        }
    }

    /// How often `connect` succeeded since startup.
    pub fn connect_count(&self) -> usize {
        self.state.connects.load(Ordering::SeqCst)
    }

    /// All payloads published so far, oldest first.
    pub fn published(&self) -> Vec<Vec<u8>> {
        lock_recover(&self.state.published).clone()
    }

    /// All state patches reported so far, oldest first.
    pub fn patches(&self) -> Vec<StatePatch> {
        lock_recover(&self.state.patches).clone()
    }

    /// Fail the next publish with the given error (queued, FIFO).
    pub fn inject_publish_fault(&self, error: TransportError) {
        lock_recover(&self.state.publish_faults).push_back(error);
    }

    /// Make every publish take this long, to hold a send in flight.
    pub fn set_publish_delay(&self, delay: Duration) {
        *lock_recover(&self.state.publish_delay) = Some(delay);
    }

    /// Deliver a remote command to the registered handler, the way the
    /// hub's inbound channel would. Returns None if nothing is registered
    /// under that name.
    pub fn run_command(&self, name: &str, payload: &[u8]) -> Option<CommandResponse> {
        let handler = lock_recover(&self.state.handlers).get(name).cloned();
        handler.map(|h| h(name, payload))
    }
}

impl Default for LoopbackHub {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl HubTransport for LoopbackHub {
    async fn connect(
        &self,
        credentials: &Credentials,
    ) -> Result<Box<dyn HubConnection>, TransportError> {
        if credentials.access_token.is_empty() {
            return Err(TransportError::Unauthorized(
                "empty access token".to_string(),
            ));
        }

        self.state.connects.fetch_add(1, Ordering::SeqCst);
        info!(
            "Loopback hub connected: {} as {}",
            credentials.hub_address, credentials.device_id
        );

        Ok(Box::new(LoopbackConnection {
            state: self.state.clone(),
        }))
    }
}

impl StateReporter for LoopbackHub {
    fn report(&self, patch: &StatePatch) -> Result<(), TransportError> {
        info!(
            "State report: dataIntervalInMS={}",
            patch.data_interval_in_ms
        );
        lock_recover(&self.state.patches).push(patch.clone());
        Ok(())
    }
}

struct LoopbackConnection {
    state: Arc<LoopbackState>,
}

#[async_trait]
impl HubConnection for LoopbackConnection {
    async fn publish(&self, payload: &[u8]) -> Result<(), TransportError> {
        let delay = *lock_recover(&self.state.publish_delay);
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        if let Some(fault) = lock_recover(&self.state.publish_faults).pop_front() {
            return Err(fault);
        }

        info!("Published: {}", String::from_utf8_lossy(payload));
        lock_recover(&self.state.published).push(payload.to_vec());
        Ok(())
    }

    fn register_command_handler(
        &self,
        name: &str,
        handler: CommandHandlerFn,
    ) -> Result<(), TransportError> {
        lock_recover(&self.state.handlers).insert(name.to_string(), handler);
        Ok(())
    }
}
