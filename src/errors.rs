use thiserror::Error;

/// Per-reading sensor failures. Always transient: the sampling task logs
/// and discards them, leaving the previous aggregated value untouched.
#[derive(Error, Debug)]
pub enum SensorError {
    #[error("sensor read failed: {0}")]
    ReadFailed(String),

    #[error("reading is not a number")]
    NotANumber,

    #[error("reading {value} outside plausible range {min}..={max}")]
    OutOfRange { value: f64, min: f64, max: f64 },

    #[error("implausible zero reading")]
    ImplausibleZero,
}

/// Failures reported by the hub transport. `Unauthorized` triggers the
/// dispatcher's reconnect path; everything else loses one interval.
#[derive(Error, Debug)]
pub enum TransportError {
    #[error("unauthorized: {0}")]
    Unauthorized(String),

    #[error("transport failure: {0}")]
    Other(String),
}

impl TransportError {
    pub fn is_unauthorized(&self) -> bool {
        matches!(self, TransportError::Unauthorized(_))
    }
}

#[derive(Error, Debug)]
pub enum CredentialError {
    #[error("credential lookup failed: {0}")]
    Lookup(String),
}

/// Rejected dispatch-interval change. Carries everything the remote
/// caller's 400 response needs to say.
#[derive(Error, Debug, PartialEq, Eq)]
#[error("interval {requested} ms outside allowed range {min}..={max} ms")]
pub struct IntervalOutOfRange {
    pub requested: i64,
    pub min: u64,
    pub max: u64,
}

/// Anything that can go wrong while (re-)establishing the hub link.
#[derive(Error, Debug)]
pub enum ConnectError {
    #[error(transparent)]
    Credentials(#[from] CredentialError),

    #[error(transparent)]
    Transport(#[from] TransportError),
}

/// Returned by a periodic job to the scheduler, which logs it and lets the
/// task run again on its next tick. Never fatal to the process.
#[derive(Error, Debug)]
#[error("task fault: {0}")]
pub struct TaskError(pub String);
