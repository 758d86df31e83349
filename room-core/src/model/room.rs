use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Live state of one room, read fresh from the host on every call — the
/// room manager never caches it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Room {
    pub id: String,
    pub name: String,
    pub image: String,
    pub url: String,
    pub max_connections: u32,
    pub running: bool,
    pub paused: bool,
    pub is_ready: bool,
    pub is_outdated: bool,
    pub status: String,
    pub created_at: DateTime<Utc>,
    pub labels: HashMap<String, String>,
    pub container_labels: HashMap<String, String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionMember {
    pub id: String,
    pub name: String,
    pub is_admin: bool,
}

/// Aggregated stats pulled from the room's in-container API.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RoomStats {
    pub connections: u32,
    pub members: Vec<SessionMember>,
    pub last_admin_left_at: Option<DateTime<Utc>>,
    pub last_user_left_at: Option<DateTime<Utc>>,
    pub server_started_at: Option<DateTime<Utc>>,
}
