use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Progress of a single image layer, as relayed verbatim (besides the
/// `id` key used for in-place updates) from the registry's
/// newline-delimited pull stream.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PullLayer {
    pub id: String,
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub progress: String,
    #[serde(default)]
    pub progress_detail: Option<ProgressDetail>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProgressDetail {
    pub current: Option<i64>,
    pub total: Option<i64>,
}

/// Snapshot of an image pull: active/inactive, its layers in
/// insertion order (first-seen `id`), and free-form status lines for
/// entries without per-layer progress.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PullState {
    pub active: bool,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
    pub layers: Vec<PullLayer>,
    pub status_lines: Vec<String>,
}
