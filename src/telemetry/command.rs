//! Remote command surface.
//!
//! The hub can ask the device to change its telemetry cadence. That is the
//! only recognized command; everything else is answered 400. A direct
//! command must never be able to terminate the device process, so the
//! apply step is fault-isolated and every failure becomes a structured
//! response to the caller.

use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use log::{info, warn};
use serde_json::json;

use crate::hub::transport::{CommandHandlerFn, StateReporter};
use crate::models::StatePatch;
use crate::telemetry::scheduler::DispatchConfig;

pub const SET_TELEMETRY_INTERVAL: &str = "SetTelemetryInterval";

/// Response returned to the hub's command caller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandResponse {
    pub status: u16,
    pub body: String,
}

impl CommandResponse {
    pub fn ok(message: impl AsRef<str>) -> Self {
        CommandResponse::with_status(200, message.as_ref())
    }

    pub fn bad_request(message: impl AsRef<str>) -> Self {
        CommandResponse::with_status(400, message.as_ref())
    }

    fn with_status(status: u16, message: &str) -> Self {
        CommandResponse {
            status,
            body: json!({ "result": message }).to_string(),
        }
    }
}

/// Validates and applies dispatch-interval changes requested by the hub.
pub struct CommandRouter {
    config: Arc<DispatchConfig>,
    reporter: Arc<dyn StateReporter>,
}

impl CommandRouter {
    pub fn new(config: Arc<DispatchConfig>, reporter: Arc<dyn StateReporter>) -> Self {
        CommandRouter { config, reporter }
    }

    /// Entry point for the transport's inbound command channel.
    pub fn handle(&self, name: &str, payload: &[u8]) -> CommandResponse {
        if name != SET_TELEMETRY_INTERVAL {
            warn!("Unknown remote command '{}' rejected", name);
            return CommandResponse::bad_request(format!("unknown command: {}", name));
        }

        let text = match std::str::from_utf8(payload) {
            Ok(text) => text.trim(),
            Err(_) => return CommandResponse::bad_request("payload is not valid UTF-8"),
        };

        let requested: i64 = match text.parse() {
            Ok(value) => value,
            Err(_) => {
                return CommandResponse::bad_request(format!(
                    "payload is not an integer: '{}'",
                    text
                ))
            }
        };

        // The swap itself is infallible once validated, but the state
        // report talks to the outside world; neither may take the process
        // down from a command callback.
        let applied = std::panic::catch_unwind(AssertUnwindSafe(|| self.apply(requested)));
        match applied {
            Ok(Ok(ms)) => {
                info!("Telemetry interval set to {} ms by remote command", ms);
                CommandResponse::ok(format!("telemetry interval set to {} ms", ms))
            }
            Ok(Err(message)) => {
                warn!("SetTelemetryInterval rejected: {}", message);
                CommandResponse::bad_request(message)
            }
            Err(_) => {
                warn!("SetTelemetryInterval handler fault");
                CommandResponse::bad_request("internal fault while applying interval")
            }
        }
    }

    fn apply(&self, requested: i64) -> Result<u64, String> {
        let ms = self
            .config
            .set_interval_ms(requested)
            .map_err(|e| e.to_string())?;

        // The dispatch loop re-reads the config every tick, so the swap
        // above is already live; the patch mirrors it to the hub.
        self.reporter
            .report(&StatePatch::interval(ms))
            .map_err(|e| format!("interval set but state report failed: {}", e))?;

        Ok(ms)
    }

    /// Adapt the router into the callback shape the transport registers.
    pub fn into_handler(self: Arc<Self>) -> CommandHandlerFn {
        Arc::new(move |name, payload| self.handle(name, payload))
    }
}
