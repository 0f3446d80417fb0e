use std::{
    fmt,
    time::{Duration, Instant},
};

/// Unique identifier of an inference request.
///
/// Ids are handed out by the engine from a monotonically increasing counter,
/// so no two requests of the same engine ever share one.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TaskId(u64);

impl TaskId {
    /// Wraps a raw id, e.g. one parsed back from a URL.
    pub fn new(raw: u64) -> Self {
        Self(raw)
    }

    /// Returns the raw numeric value.
    pub fn as_u64(self) -> u64 {
        self.0
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Internal request wrapper used by the engine to track inference requests.
pub struct InfernumEngineRequest<Req> {
    /// Unique identifier for this inference request.
    pub id: TaskId,
    /// The actual request data to be processed by the model.
    pub request: Req,
    /// When the request was handed to the engine.
    pub submitted_at: Instant,
}

/// Outcome of a single inference.
#[derive(Clone, Debug, PartialEq)]
pub enum Outcome<T> {
    /// The model produced a response.
    Success(T),
    /// The model failed; carries a human readable reason.
    Failure(String),
}

impl<T> Outcome<T> {
    /// Returns true for [`Outcome::Success`].
    pub fn is_success(&self) -> bool {
        matches!(self, Outcome::Success(_))
    }

    /// Borrows the outcome as a `Result`, with the failure reason as the error.
    pub fn as_result(&self) -> Result<&T, &str> {
        match self {
            Outcome::Success(value) => Ok(value),
            Outcome::Failure(reason) => Err(reason),
        }
    }

    /// Converts the outcome into a `Result`, with the failure reason as the error.
    pub fn into_result(self) -> Result<T, String> {
        match self {
            Outcome::Success(value) => Ok(value),
            Outcome::Failure(reason) => Err(reason),
        }
    }

    /// Maps the success value, keeping a failure reason untouched.
    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> Outcome<U> {
        match self {
            Outcome::Success(value) => Outcome::Success(f(value)),
            Outcome::Failure(reason) => Outcome::Failure(reason),
        }
    }
}

/// Response returned by the engine containing both the model's outcome and telemetry data.
pub struct InfernumEngineResponse<Metadata, Res> {
    /// Unique identifier matching the original request.
    pub id: TaskId,
    /// Timestamp when the inference started.
    pub start_time: Instant,
    /// Total time taken for the inference.
    pub duration: Duration,
    /// Time the request spent queued before the worker picked it up.
    pub queued_for: Duration,
    /// Lightweight metadata extracted from the original request.
    pub request_metadata: Metadata,
    /// What the model returned, or why it failed.
    pub outcome: Outcome<Res>,
}
