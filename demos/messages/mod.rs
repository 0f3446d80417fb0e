use serde::{Deserialize, Serialize};
use std::{path::PathBuf, time::Duration};

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct InferenceRequest {
    pub prompt: String,
    pub image_path: PathBuf,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct InferenceResponse {
    pub id: u64,
    pub prompt: String,
    pub start_time: u128,
    pub duration: Duration,
    pub queued_for: Duration,
    pub response: String,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct ResultsQuery {
    pub timeout_ms: Option<u64>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ChatEntry {
    pub role: String,
    pub content: String,
}
