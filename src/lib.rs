//! Request/response correlation for slow, single-threaded inference models.
//!
//! An [`InfernumEngine`] owns a model on a dedicated worker thread. Callers
//! [`submit`](InfernumEngine::submit) requests from any thread and get a
//! [`TaskId`] back immediately; [`await_result`](InfernumEngine::await_result)
//! then blocks until the response for exactly that id is ready. Requests run
//! one at a time, in submission order.
//!
//! ```no_run
//! use infernum_relay::{Awaited, InfernumEngine, InfernumModel, Outcome, RequestMetadata};
//! use std::time::Duration;
//!
//! struct Echo;
//!
//! struct Prompt(String);
//!
//! impl RequestMetadata for Prompt {
//!     type Metadata = ();
//!     fn metadata(&self) {}
//! }
//!
//! impl InfernumModel for Echo {
//!     type Request = Prompt;
//!     type Response = String;
//!     type Error = std::io::Error;
//!
//!     fn run(&mut self, request: Prompt) -> Result<String, std::io::Error> {
//!         Ok(request.0)
//!     }
//! }
//!
//! let engine = InfernumEngine::new(Echo)?;
//! let id = engine.submit(Prompt("describe".into()))?;
//! if let Awaited::Ready(response) = engine.await_result(id, Some(Duration::from_secs(5))) {
//!     assert_eq!(response.outcome, Outcome::Success("describe".to_string()));
//! }
//! # Ok::<(), infernum_relay::InfernumError>(())
//! ```

pub mod channel;
pub mod config;
pub mod delivery;
pub mod engine;
pub mod envelope;
pub mod error;
pub mod model;
pub mod progress;
pub mod worker;

pub use channel::{CorrelationChannel, Polled};
pub use config::InfernumEngineConfig;
pub use delivery::{Awaited, Delivery, DeliveryTable};
pub use engine::InfernumEngine;
pub use envelope::{InfernumEngineRequest, InfernumEngineResponse, Outcome, TaskId};
pub use error::InfernumError;
pub use model::{InfernumModel, RequestMetadata};
pub use progress::{
    ChatMessage, DisplaySink, Role, Transcript, await_with_progress, submit_with_progress,
};
pub use worker::{EngineContext, EngineResponse, InfernumEngineState, WorkerLoop, WorkerReport};
