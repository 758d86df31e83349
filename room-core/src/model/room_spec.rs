use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use super::mount::Mount;

/// Env-var dialect an image expects. Selects which [`crate::env_codec`]
/// implementor encodes/decodes a room's settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, parse_display::Display, parse_display::FromStr)]
pub enum ApiVersion {
    #[display("2")]
    V2,
    #[display("3")]
    V3,
}

impl ApiVersion {
    pub fn as_u8(self) -> u8 {
        match self {
            ApiVersion::V2 => 2,
            ApiVersion::V3 => 3,
        }
    }

    pub fn from_u8(n: u8) -> Option<Self> {
        match n {
            2 => Some(ApiVersion::V2),
            3 => Some(ApiVersion::V3),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, parse_display::Display, parse_display::FromStr)]
#[display(style = "UPPERCASE")]
pub enum VideoCodec {
    #[default]
    Vp8,
    Vp9,
    H264,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, parse_display::Display, parse_display::FromStr)]
#[display(style = "UPPERCASE")]
pub enum AudioCodec {
    #[default]
    Opus,
    G722,
    Pcmu,
    Pcma,
}

/// Screen geometry, framerate and codec settings for the streamed
/// desktop. Bitrates and pipeline strings are optional passthroughs to
/// the underlying media stack.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Capture {
    pub screen_width: u32,
    pub screen_height: u32,
    pub screen_rate: u32,
    pub max_fps: u32,
    pub video_codec: VideoCodec,
    pub video_bitrate: Option<u32>,
    pub video_pipeline: Option<String>,
    pub audio_codec: AudioCodec,
    pub audio_bitrate: Option<u32>,
    pub audio_pipeline: Option<String>,
    pub broadcast_pipeline: Option<String>,
}

impl Capture {
    pub fn screen(&self) -> String {
        format!("{}x{}@{}", self.screen_width, self.screen_height, self.screen_rate)
    }
}

/// Operator-supplied browser policy (Firefox/Chromium enterprise
/// policy). Out of scope to *render*; the room manager only needs to
/// know where to mount the rendered file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BrowserPolicy {
    /// Absolute container path the rendered policy file mounts onto.
    pub path: String,
    /// Policy content, opaque to this crate (serialized JSON by the
    /// external policy templating collaborator).
    pub content: serde_json::Value,
}

/// Per-room CPU/memory/GPU/device limits.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Resources {
    pub cpu_shares: Option<i64>,
    pub nano_cpus: Option<i64>,
    pub shm_size_bytes: Option<i64>,
    pub memory_bytes: Option<i64>,
    /// Raw GPU spec strings, CSV of `count|driver|device|capabilities|options`.
    pub gpus: Vec<String>,
    /// Host device node strings (`/dev/dri/renderD128`, ...).
    pub devices: Vec<String>,
}

/// The desired state of one room, as submitted to [`crate::room_manager::RoomManager::create`].
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RoomSpec {
    /// Human name; auto-generated as an 8-char URL-safe token when empty.
    pub name: String,
    pub image: String,
    /// 0 means "auto-detect from image labels".
    pub api_version: u8,
    /// 0 when mux-mode is active.
    pub max_connections: u32,
    pub user_password: String,
    pub admin_password: String,
    pub capture: Capture,
    pub control_protection: bool,
    pub implicit_control: bool,
    pub nat1to1: Vec<String>,
    pub extra_env: HashMap<String, String>,
    pub labels: HashMap<String, String>,
    pub mounts: Vec<Mount>,
    pub resources: Resources,
    pub hostname: Option<String>,
    pub dns: Vec<String>,
    pub browser_policy: Option<BrowserPolicy>,
}

impl Default for RoomSpec {
    fn default() -> Self {
        Self {
            name: String::new(),
            image: String::new(),
            api_version: 0,
            max_connections: 5,
            user_password: String::new(),
            admin_password: String::new(),
            capture: Capture::default(),
            control_protection: false,
            implicit_control: false,
            nat1to1: Vec::new(),
            extra_env: HashMap::new(),
            labels: HashMap::new(),
            mounts: Vec::new(),
            resources: Resources::default(),
            hostname: None,
            dns: Vec::new(),
            browser_policy: None,
        }
    }
}

impl RoomSpec {
    pub fn is_mux(&self) -> bool {
        self.max_connections == 0
    }
}
