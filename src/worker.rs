use crate::{
    channel::{CorrelationChannel, Polled},
    delivery::{Delivery, DeliveryTable},
    envelope::{InfernumEngineRequest, InfernumEngineResponse, Outcome},
    model::{InfernumModel, RequestMetadata},
};
use std::{
    any::Any,
    panic::{self, AssertUnwindSafe},
    sync::{Arc, Mutex, PoisonError},
    time::{Duration, Instant},
};

/// Envelope type produced for a model `M`.
pub type EngineResponse<M> = InfernumEngineResponse<
    <<M as InfernumModel>::Request as RequestMetadata>::Metadata,
    <M as InfernumModel>::Response,
>;

/// Represents the current state of the inference engine.
#[derive(Clone, Debug, PartialEq)]
pub enum InfernumEngineState {
    /// The engine is idle and ready to accept new inference requests.
    Idle,
    /// The engine is currently processing an inference request.
    Processing,
}

impl InfernumEngineState {
    /// Returns the state as a string representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            InfernumEngineState::Idle => "idle",
            InfernumEngineState::Processing => "processing",
        }
    }
}

/// State shared between the submitting side and the worker.
pub struct EngineContext<M: InfernumModel>
where
    M::Request: RequestMetadata,
{
    /// Requests waiting for the worker, in submission order.
    pub tasks: CorrelationChannel<InfernumEngineRequest<M::Request>>,
    /// One delivery slot per submitted request.
    pub deliveries: DeliveryTable<EngineResponse<M>>,
    state: Mutex<InfernumEngineState>,
}

impl<M: InfernumModel> EngineContext<M>
where
    M::Request: RequestMetadata,
{
    /// Creates an empty task queue and delivery table.
    ///
    /// # Arguments
    /// * `unclaimed_ttl` - How long a result nobody claims is kept
    pub fn new(unclaimed_ttl: Duration) -> Self {
        Self {
            tasks: CorrelationChannel::new(),
            deliveries: DeliveryTable::new(unclaimed_ttl),
            state: Mutex::new(InfernumEngineState::Idle),
        }
    }

    /// Returns whether the worker is currently running an inference.
    pub fn state(&self) -> InfernumEngineState {
        self.state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn set_state(&self, state: InfernumEngineState) {
        *self.state.lock().unwrap_or_else(PoisonError::into_inner) = state;
    }
}

/// Counters returned by [`WorkerLoop::run`] once the loop ends.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct WorkerReport {
    /// Requests taken off the queue.
    pub processed: usize,
    /// Requests whose inference returned an error or panicked.
    pub failed: usize,
}

/// The single consumer of the task queue.
///
/// Owns the model and runs one request at a time, end to end. A failing or
/// panicking inference becomes a `Failure` outcome for that request only; the
/// loop keeps going until the task queue is closed and drained.
pub struct WorkerLoop<M: InfernumModel>
where
    M::Request: RequestMetadata,
{
    model: M,
    context: Arc<EngineContext<M>>,
    poll_interval: Duration,
    report: WorkerReport,
}

impl<M: InfernumModel> WorkerLoop<M>
where
    M::Request: RequestMetadata,
{
    /// Creates a worker that owns `model` and serves requests from `context`.
    ///
    /// # Arguments
    /// * `model` - The model that runs every request
    /// * `context` - Queue and delivery table shared with the submitting side
    /// * `poll_interval` - Upper bound on a single wait for the next request
    pub fn new(model: M, context: Arc<EngineContext<M>>, poll_interval: Duration) -> Self {
        Self {
            model,
            context,
            poll_interval,
            report: WorkerReport::default(),
        }
    }

    /// Runs until the task queue is closed and every queued request is answered.
    pub fn run(mut self) -> WorkerReport {
        log::debug!("Inference worker started");
        loop {
            match self.context.tasks.poll(self.poll_interval) {
                Polled::Message(req) => self.process(req),
                Polled::Empty => {
                    self.context.deliveries.sweep(Instant::now());
                }
                Polled::Closed => break,
            }
        }
        log::debug!(
            "Inference worker stopped after {} requests ({} failed)",
            self.report.processed,
            self.report.failed
        );
        self.report
    }

    fn process(&mut self, req: InfernumEngineRequest<M::Request>) {
        log::debug!("Scheduling a new inference");

        // Extract lightweight metadata before consuming the request
        let request_metadata = req.request.metadata();
        let id = req.id;

        self.context.set_state(InfernumEngineState::Processing);
        let start_time = Instant::now();
        let queued_for = start_time.saturating_duration_since(req.submitted_at);

        let model = &mut self.model;
        let outcome = match panic::catch_unwind(AssertUnwindSafe(|| model.run(req.request))) {
            Ok(Ok(response)) => Outcome::Success(response),
            Ok(Err(e)) => {
                log::warn!("Inference {id} failed: {e}");
                Outcome::Failure(e.to_string())
            }
            Err(payload) => {
                let message = panic_message(&*payload);
                log::error!("Inference {id} panicked: {message}");
                Outcome::Failure(format!("inference panicked: {message}"))
            }
        };

        self.report.processed += 1;
        if !outcome.is_success() {
            self.report.failed += 1;
        }

        let duration = start_time.elapsed();
        log::debug!("Inference {id} completed in {duration:?}");

        // sweep before resolving so the fresh value is never part of this pass
        self.context.deliveries.sweep(Instant::now());
        let delivery = self.context.deliveries.resolve(
            id,
            InfernumEngineResponse {
                id,
                start_time,
                duration,
                queued_for,
                request_metadata,
                outcome,
            },
        );
        if delivery != Delivery::Stored {
            log::warn!("Result {id} could not be delivered: {delivery:?}");
        }

        self.context.set_state(InfernumEngineState::Idle);
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic payload".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{delivery::Awaited, envelope::TaskId};

    #[derive(Debug, thiserror::Error)]
    #[error("DecodeError: {0}")]
    struct DecodeError(String);

    struct Upper;

    impl RequestMetadata for String {
        type Metadata = usize;

        fn metadata(&self) -> usize {
            self.len()
        }
    }

    impl InfernumModel for Upper {
        type Request = String;
        type Response = String;
        type Error = DecodeError;

        fn run(&mut self, request: String) -> Result<String, DecodeError> {
            match request.as_str() {
                "corrupt" => Err(DecodeError("bad header".into())),
                "boom" => panic!("model exploded"),
                _ => Ok(request.to_uppercase()),
            }
        }
    }

    fn enqueue(context: &EngineContext<Upper>, request: &str) -> TaskId {
        let id = context.deliveries.issue();
        context
            .tasks
            .push(InfernumEngineRequest {
                id,
                request: request.to_string(),
                submitted_at: Instant::now(),
            })
            .unwrap();
        id
    }

    fn outcome(context: &EngineContext<Upper>, id: TaskId) -> Outcome<String> {
        match context.deliveries.wait(id, Some(Duration::ZERO)) {
            Awaited::Ready(response) => {
                assert_eq!(response.id, id);
                response.outcome
            }
            other => panic!("no result for {id}: {:?}", other.map(|_| ())),
        }
    }

    #[test]
    fn failures_do_not_stop_the_loop() {
        let context = Arc::new(EngineContext::<Upper>::new(Duration::from_secs(60)));
        let ok = enqueue(&context, "cat");
        let corrupt = enqueue(&context, "corrupt");
        let boom = enqueue(&context, "boom");
        let after = enqueue(&context, "dog");
        context.tasks.close();

        let report = WorkerLoop::new(Upper, context.clone(), Duration::from_millis(10)).run();

        assert_eq!(report, WorkerReport { processed: 4, failed: 2 });
        assert_eq!(context.state(), InfernumEngineState::Idle);
        assert_eq!(outcome(&context, ok), Outcome::Success("CAT".into()));
        assert_eq!(
            outcome(&context, corrupt),
            Outcome::Failure("DecodeError: bad header".into())
        );
        assert_eq!(
            outcome(&context, boom),
            Outcome::Failure("inference panicked: model exploded".into())
        );
        assert_eq!(outcome(&context, after), Outcome::Success("DOG".into()));
    }

    #[test]
    fn metadata_travels_with_the_response() {
        let context = Arc::new(EngineContext::<Upper>::new(Duration::from_secs(60)));
        let id = enqueue(&context, "hello");
        context.tasks.close();
        WorkerLoop::new(Upper, context.clone(), Duration::from_millis(10)).run();

        let response = context.deliveries.wait(id, None).ready().unwrap();
        assert_eq!(response.request_metadata, 5);
        assert!(response.duration <= response.start_time.elapsed());
    }

    #[test]
    fn closed_empty_queue_ends_immediately() {
        let context = Arc::new(EngineContext::<Upper>::new(Duration::from_secs(60)));
        context.tasks.close();
        let report = WorkerLoop::new(Upper, context, Duration::from_millis(10)).run();
        assert_eq!(report, WorkerReport::default());
    }
}
