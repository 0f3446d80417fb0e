use crate::{
    config::InfernumEngineConfig,
    delivery::Awaited,
    envelope::{InfernumEngineRequest, TaskId},
    error::InfernumError,
    model::{InfernumModel, RequestMetadata},
    worker::{EngineContext, EngineResponse, InfernumEngineState, WorkerLoop, WorkerReport},
};
use std::{
    sync::Arc,
    thread::{self, JoinHandle},
    time::{Duration, Instant},
};

/// Inference engine that runs a model on a dedicated background thread.
///
/// Any number of callers may submit requests concurrently. Requests are run
/// one at a time in submission order, and each caller gets back exactly the
/// response for the id it was handed by [`InfernumEngine::submit`].
pub struct InfernumEngine<M: InfernumModel + Send + 'static>
where
    M::Request: Send + RequestMetadata + 'static,
    M::Response: Send + 'static,
{
    context: Arc<EngineContext<M>>,
    config: InfernumEngineConfig,
    inference_handle: Option<JoinHandle<WorkerReport>>,
}

impl<M: InfernumModel + Send + 'static> InfernumEngine<M>
where
    M::Request: Send + RequestMetadata + 'static,
    M::Response: Send + 'static,
{
    /// Creates a new inference engine with the given model and the default configuration.
    ///
    /// The model is moved to the background thread, which is spawned right away.
    pub fn new(model: M) -> Result<Self, InfernumError> {
        Self::with_config(model, InfernumEngineConfig::default())
    }

    /// Creates a new inference engine with an explicit configuration.
    pub fn with_config(model: M, config: InfernumEngineConfig) -> Result<Self, InfernumError> {
        let context = Arc::new(EngineContext::new(config.unclaimed_ttl));
        let worker = WorkerLoop::new(model, context.clone(), config.poll_interval);

        let inference_handle = thread::Builder::new()
            .name("infernum-worker".to_string())
            .spawn(move || worker.run())?;

        Ok(Self {
            context,
            config,
            inference_handle: Some(inference_handle),
        })
    }

    /// Returns the current state of the inference engine.
    pub fn state(&self) -> InfernumEngineState {
        self.context.state()
    }

    /// Returns the configuration the engine was built with.
    pub fn config(&self) -> &InfernumEngineConfig {
        &self.config
    }

    /// Number of requests waiting for the worker.
    pub fn queued(&self) -> usize {
        self.context.tasks.len()
    }

    /// Number of submitted requests that have not produced a response yet.
    pub fn pending(&self) -> usize {
        self.context.deliveries.pending()
    }

    /// Queues a request and returns its id without waiting for the inference.
    ///
    /// The request is checked with [`InfernumModel::validate`] first; rejected
    /// requests are not queued.
    pub fn submit(&self, request: M::Request) -> Result<TaskId, InfernumError> {
        M::validate(&request)?;
        if self.context.tasks.is_closed() {
            return Err(InfernumError::EngineStopped);
        }

        let id = self.context.deliveries.issue();
        let pushed = self.context.tasks.push(InfernumEngineRequest {
            id,
            request,
            submitted_at: Instant::now(),
        });
        if pushed.is_err() {
            self.context.deliveries.cancel(id);
            return Err(InfernumError::EngineStopped);
        }

        log::debug!("Scheduled inference {id} ({} queued)", self.queued());
        Ok(id)
    }

    /// Blocks until the response for `id` is available or the timeout elapses.
    ///
    /// `None` falls back to the configured default timeout. A response is handed
    /// out once; asking again for the same id yields [`Awaited::AlreadyConsumed`].
    pub fn await_result(
        &self,
        id: TaskId,
        timeout: Option<Duration>,
    ) -> Awaited<EngineResponse<M>> {
        let awaited = self
            .context
            .deliveries
            .wait(id, timeout.or(self.config.default_timeout));
        if let Awaited::TimedOut = awaited {
            log::debug!("Gave up waiting for inference {id}");
        }
        awaited
    }

    /// Attempts to retrieve the response for `id` without blocking.
    pub fn try_result(&self, id: TaskId) -> Awaited<EngineResponse<M>> {
        self.context.deliveries.wait(id, Some(Duration::ZERO))
    }

    /// Submits a request and waits for its response.
    pub fn infer(
        &self,
        request: M::Request,
        timeout: Option<Duration>,
    ) -> Result<Awaited<EngineResponse<M>>, InfernumError> {
        let id = self.submit(request)?;
        Ok(self.await_result(id, timeout))
    }

    /// Stops accepting new requests. Queued requests are still processed.
    ///
    /// Callers blocked on ids that were never issued are released with
    /// [`Awaited::TimedOut`], since those ids can no longer appear.
    pub fn shutdown(&self) {
        self.context.tasks.close();
        self.context.deliveries.close();
    }

    /// Stops the inference engine and shuts down the background thread.
    ///
    /// This method will close the request channel and wait for the background
    /// thread to finish processing any remaining requests.
    pub fn stop(&mut self) -> Option<WorkerReport> {
        self.shutdown();
        let handle = self.inference_handle.take()?;
        match handle.join() {
            Ok(report) => Some(report),
            Err(_) => {
                log::error!("Inference worker thread panicked");
                None
            }
        }
    }
}

impl<M: InfernumModel + Send + 'static> Drop for InfernumEngine<M>
where
    M::Request: Send + RequestMetadata + 'static,
    M::Response: Send + 'static,
{
    fn drop(&mut self) {
        self.stop();
    }
}
