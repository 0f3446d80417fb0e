use argh::FromArgs;
use axum::{
    Json, Router,
    extract::{Path, Query, State},
    response::IntoResponse,
    routing::{get, post},
};
use infernum_relay::{
    Awaited, InfernumEngine, InfernumEngineConfig, InfernumError, InfernumModel, Outcome,
    RequestMetadata, TaskId, Transcript, await_with_progress,
};
use kornia_image::{Image, ImageSize, allocator::CpuAllocator};
use kornia_vlm::paligemma::{Paligemma, PaligemmaConfig, PaligemmaError};
use reqwest::StatusCode;
use serde_json::json;
use std::{
    path::PathBuf,
    sync::{Arc, Mutex, PoisonError},
    time::Duration,
};

mod messages;

// defaults for the server
const DEFAULT_HOST: &str = "0.0.0.0";
const DEFAULT_PORT: u16 = 3000;
const DEFAULT_TIMEOUT_SECS: u64 = 120;
const DEFAULT_SAMPLE_LEN: usize = 50;
const DEFAULT_UNCLAIMED_TTL_SECS: u64 = 300;

const PLACEHOLDER: &str = "⏳ processing…";

#[derive(FromArgs)]
/// Infernum is a tool for running inference on images.
struct InfernumArgs {
    /// the host to run the server on
    #[argh(option, short = 'h', default = "DEFAULT_HOST.to_string()")]
    host: String,

    /// the port to run the server on
    #[argh(option, short = 'p', default = "DEFAULT_PORT")]
    port: u16,

    /// how long a request waits for its answer, in seconds
    #[argh(option, default = "DEFAULT_TIMEOUT_SECS")]
    timeout_secs: u64,

    /// maximum number of tokens to generate
    #[argh(option, default = "DEFAULT_SAMPLE_LEN")]
    sample_len: usize,

    /// how long an unclaimed result is kept, in seconds
    #[argh(option, default = "DEFAULT_UNCLAIMED_TTL_SECS")]
    unclaimed_ttl_secs: u64,
}

#[derive(Clone)]
struct AppState {
    engine: Arc<InfernumEngine<PaligemmaModel>>,
    transcript: Arc<Mutex<Transcript>>,
    timeout: Duration,
    sample_len: usize,
}

async fn get_state(State(app): State<AppState>) -> impl IntoResponse {
    Json(json!({
        "status": app.engine.state().as_str(),
        "queued": app.engine.queued(),
        "pending": app.engine.pending(),
    }))
}

async fn post_inference(
    State(app): State<AppState>,
    Json(payload): Json<messages::InferenceRequest>,
) -> impl IntoResponse {
    let request = match app.build_request(&payload) {
        Ok(request) => request,
        Err(error_msg) => {
            return (StatusCode::BAD_REQUEST, Json(json!({ "error": error_msg })));
        }
    };

    // schedule the inference
    match app.engine.submit(request) {
        Ok(id) => {
            log::info!("Scheduled inference {id}");
            (
                StatusCode::OK,
                Json(json!({ "status": "scheduled", "id": id.as_u64() })),
            )
        }
        Err(e) => submit_error(e),
    }
}

async fn get_result(
    State(app): State<AppState>,
    Path(id): Path<u64>,
    Query(query): Query<messages::ResultsQuery>,
) -> impl IntoResponse {
    let id = TaskId::new(id);
    let timeout = query
        .timeout_ms
        .map(Duration::from_millis)
        .or(Some(app.timeout));

    // waiting blocks, keep it off the async workers
    let engine = app.engine.clone();
    let awaited = match tokio::task::spawn_blocking(move || engine.await_result(id, timeout)).await
    {
        Ok(awaited) => awaited,
        Err(e) => {
            log::error!("Waiting for result {id} failed: {e}");
            return (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({ "status": "error", "message": e.to_string() })),
            );
        }
    };

    match awaited {
        Awaited::Ready(engine_result) => match engine_result.outcome {
            Outcome::Success(response) => {
                log::info!("Result {id} received successfully");
                let inference_response = messages::InferenceResponse {
                    id: engine_result.id.as_u64(),
                    prompt: engine_result.request_metadata.prompt,
                    start_time: engine_result.start_time.elapsed().as_nanos(),
                    duration: engine_result.duration,
                    queued_for: engine_result.queued_for,
                    response: response.result,
                };
                (
                    StatusCode::OK,
                    Json(json!({
                        "status": "success",
                        "response": inference_response
                    })),
                )
            }
            Outcome::Failure(reason) => {
                log::warn!("Inference {id} failed: {reason}");
                (
                    StatusCode::OK,
                    Json(json!({ "status": "error", "id": id.as_u64(), "message": reason })),
                )
            }
        },
        Awaited::TimedOut => (
            StatusCode::ACCEPTED,
            Json(json!({ "status": app.engine.state().as_str(), "id": id.as_u64() })),
        ),
        Awaited::AlreadyConsumed => (
            StatusCode::GONE,
            Json(json!({ "status": "consumed", "id": id.as_u64() })),
        ),
    }
}

async fn post_chat(
    State(app): State<AppState>,
    Json(payload): Json<messages::InferenceRequest>,
) -> impl IntoResponse {
    let request = match app.build_request(&payload) {
        Ok(request) => request,
        Err(error_msg) => {
            return (StatusCode::BAD_REQUEST, Json(json!({ "error": error_msg })));
        }
    };

    // only a request the engine accepted gets a user turn
    let id = match app.engine.submit(request) {
        Ok(id) => id,
        Err(e) => return submit_error(e),
    };
    app.lock_transcript().push_user(payload.prompt);

    let engine = app.engine.clone();
    let mut sink = app.transcript.clone();
    let timeout = Some(app.timeout);
    let answered = tokio::task::spawn_blocking(move || {
        await_with_progress(&*engine, id, PLACEHOLDER, timeout, &mut sink, |r| {
            r.result.clone()
        });
    })
    .await;

    match answered {
        Ok(()) => (StatusCode::OK, Json(json!({ "messages": app.chat_entries() }))),
        Err(e) => {
            log::error!("Chat request failed: {e}");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({ "status": "error", "message": e.to_string() })),
            )
        }
    }
}

async fn get_transcript(State(app): State<AppState>) -> impl IntoResponse {
    Json(json!({ "messages": app.chat_entries() }))
}

fn submit_error(e: InfernumError) -> (StatusCode, Json<serde_json::Value>) {
    let status = match e {
        InfernumError::InputInvalid(_) => StatusCode::BAD_REQUEST,
        _ => StatusCode::SERVICE_UNAVAILABLE,
    };
    (status, Json(json!({ "error": e.to_string() })))
}

impl AppState {
    fn build_request(
        &self,
        payload: &messages::InferenceRequest,
    ) -> Result<PaligemmaRequest, String> {
        if payload.prompt.trim().is_empty() {
            return Err("A prompt is required".to_string());
        }
        // Read image based on extension
        let image = read_image_from_path(&payload.image_path)?;
        Ok(PaligemmaRequest {
            image,
            prompt: payload.prompt.clone(),
            sample_len: self.sample_len,
        })
    }

    fn lock_transcript(&self) -> std::sync::MutexGuard<'_, Transcript> {
        self.transcript
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    fn chat_entries(&self) -> Vec<messages::ChatEntry> {
        self.lock_transcript()
            .messages()
            .iter()
            .map(|m| messages::ChatEntry {
                role: m.role.as_str().to_string(),
                content: m.content.clone(),
            })
            .collect()
    }
}

// Helper function
fn read_image_from_path(
    path: &PathBuf,
) -> Result<kornia_image::Image<u8, 3, CpuAllocator>, String> {
    let extension = path
        .extension()
        .and_then(|ext| ext.to_str())
        .ok_or_else(|| "Invalid file extension".to_string())?;

    match extension {
        "jpg" | "jpeg" => kornia_io::jpeg::read_image_jpeg_rgb8(path).map_err(|e| e.to_string()),
        "png" => kornia_io::png::read_image_png_rgb8(path).map_err(|e| e.to_string()),
        _ => Err(format!("Unsupported image format: {}", extension)),
    }
}

// custom model that uses Paligemma to run inference
struct PaligemmaModel(Paligemma);

struct PaligemmaRequest {
    image: Image<u8, 3, CpuAllocator>,
    prompt: String,
    sample_len: usize,
}

struct PaligemmaMetadata {
    prompt: String,
    _image_size: ImageSize,
}

impl RequestMetadata for PaligemmaRequest {
    type Metadata = PaligemmaMetadata;

    fn metadata(&self) -> Self::Metadata {
        PaligemmaMetadata {
            prompt: self.prompt.clone(),
            _image_size: self.image.size(),
        }
    }
}

struct PaligemmaResponse {
    result: String,
}

impl InfernumModel for PaligemmaModel {
    type Request = PaligemmaRequest;
    type Response = PaligemmaResponse;
    type Error = PaligemmaError;

    fn run(&mut self, request: Self::Request) -> Result<Self::Response, Self::Error> {
        let result =
            self.0
                .inference(&request.image, &request.prompt, request.sample_len, false)?;

        Ok(PaligemmaResponse { result })
    }

    fn validate(request: &Self::Request) -> Result<(), InfernumError> {
        if request.sample_len == 0 {
            return Err(InfernumError::InputInvalid(
                "sample length must be positive".to_string(),
            ));
        }
        Ok(())
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();
    let args: InfernumArgs = argh::from_env();

    // format the host and port
    let addr = format!("{}:{}", args.host, args.port);

    let config = InfernumEngineConfig::default()
        .with_unclaimed_ttl(Duration::from_secs(args.unclaimed_ttl_secs))
        .with_default_timeout(Duration::from_secs(args.timeout_secs));
    let model = Paligemma::new(PaligemmaConfig::default())?;
    let engine = Arc::new(InfernumEngine::with_config(PaligemmaModel(model), config)?);

    let app = Router::new()
        .route("/", get(|| async { "Welcome to Infernum!" }))
        .route("/state", get(get_state))
        .route("/inference", post(post_inference))
        .route("/results/{id}", get(get_result))
        .route("/chat", post(post_chat))
        .route("/transcript", get(get_transcript))
        .with_state(AppState {
            engine,
            transcript: Arc::new(Mutex::new(Transcript::new())),
            timeout: Duration::from_secs(args.timeout_secs),
            sample_len: args.sample_len,
        });

    log::info!("🚀 Starting the server");
    log::info!("🔥 Listening on: {}", addr);
    log::info!("🔧 Press Ctrl+C to stop the server");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
