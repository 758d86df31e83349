use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// The high-level, semantic action a [`super::Room`] just transitioned
/// through. Ordering per container ID is guaranteed FIFO by the host
/// event projector: `created < started < ready < stopped < destroyed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, parse_display::Display)]
#[display(style = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum RoomAction {
    Created,
    Started,
    Ready,
    Stopped,
    Paused,
    Destroyed,
}

/// Projection of a low-level host signal into the high-level event
/// consumed by the proxy router and the REST `/events` stream.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoomEvent {
    pub id: String,
    pub action: RoomAction,
    pub container_labels: HashMap<String, String>,
}
