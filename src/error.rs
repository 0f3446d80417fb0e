/// Errors returned by the inference engine and its building blocks.
#[derive(Debug, thiserror::Error)]
pub enum InfernumError {
    /// The request was rejected before it reached the worker.
    #[error("invalid input: {0}")]
    InputInvalid(String),

    /// The engine has been stopped and no longer accepts requests.
    #[error("engine stopped")]
    EngineStopped,

    /// A message was pushed into a channel that has been closed.
    #[error("channel closed")]
    ChannelClosed,

    /// The background worker thread could not be started.
    #[error("failed to spawn the worker thread: {0}")]
    WorkerSpawn(#[from] std::io::Error),
}
