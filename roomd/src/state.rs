use std::sync::Arc;

use room_core::proxy::Proxy;
use room_core::pull_manager::PullManager;
use room_core::room_manager::RoomManager;

#[derive(Clone)]
pub struct AppState {
    pub rooms: Arc<RoomManager>,
    pub pulls: Arc<PullManager>,
    pub proxy: Arc<Proxy>,
    pub http: reqwest::Client,
}
