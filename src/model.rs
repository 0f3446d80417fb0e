use crate::error::InfernumError;

/// Trait for implementing inference models that can be used with the InfernumEngine.
///
/// Users implement this trait to define their custom model behavior, including
/// the request and response types and the inference logic. The model is moved
/// into the worker thread and only ever runs one request at a time, so it does
/// not need to be `Sync`.
pub trait InfernumModel {
    /// The request type that the model accepts for inference.
    type Request;
    /// The response type that the model returns after inference.
    type Response;
    /// The error type that can be returned during inference.
    type Error: std::error::Error + Send + Sync + 'static;

    /// Runs inference on the given request and returns a response or error.
    fn run(&mut self, request: Self::Request) -> Result<Self::Response, Self::Error>;

    /// Checks a request on the caller's side before it is queued.
    ///
    /// Rejected requests never reach the worker. The default accepts everything.
    fn validate(_request: &Self::Request) -> Result<(), InfernumError> {
        Ok(())
    }
}

/// Trait for extracting lightweight metadata from inference requests.
///
/// This allows the engine to store essential information (like prompts) without
/// cloning heavy data (like images) for telemetry and debugging purposes.
pub trait RequestMetadata {
    /// The lightweight metadata type that represents the request.
    type Metadata: Send + 'static;

    /// Extracts lightweight metadata from the request.
    /// This should avoid cloning heavy data like images.
    fn metadata(&self) -> Self::Metadata;
}
