//! Seams toward the cloud hub.
//!
//! The real hub client is vendor territory; the telemetry loop only ever
//! talks to these traits. `loopback` provides the in-process
//! implementation used for local runs and tests.

use std::sync::Arc;

use async_trait::async_trait;

use crate::errors::TransportError;
use crate::hub::credentials::Credentials;
use crate::models::StatePatch;
use crate::telemetry::command::CommandResponse;

/// Callback invoked by the transport's inbound channel when the hub sends
/// a remote command. Runs concurrently with the scheduled tasks and must
/// never panic its way out.
pub type CommandHandlerFn = Arc<dyn Fn(&str, &[u8]) -> CommandResponse + Send + Sync>;

/// An established, authenticated channel to the hub.
#[async_trait]
pub trait HubConnection: Send + Sync {
    /// Publish one serialized telemetry record.
    async fn publish(&self, payload: &[u8]) -> Result<(), TransportError>;

    /// Register the handler for a named remote command. Must be re-done
    /// after every reconnect; registrations do not survive the connection.
    fn register_command_handler(
        &self,
        name: &str,
        handler: CommandHandlerFn,
    ) -> Result<(), TransportError>;
}

/// Connection factory. `connect` may be called repeatedly; each call
/// consumes freshly fetched credentials.
#[async_trait]
pub trait HubTransport: Send + Sync {
    async fn connect(
        &self,
        credentials: &Credentials,
    ) -> Result<Box<dyn HubConnection>, TransportError>;
}

/// Sink for sparse device-state patches (reported alongside telemetry,
/// not as part of it).
pub trait StateReporter: Send + Sync {
    fn report(&self, patch: &StatePatch) -> Result<(), TransportError>;
}
