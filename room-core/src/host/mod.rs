//! The "Host" capability set: everything the room manager, event
//! projector and pull manager need from a container runtime. Kept
//! abstract behind a trait so the rest of the crate never names
//! `bollard` directly — mirrors how the reference implementation
//! treats the container runtime as an external collaborator.

mod docker;

pub use docker::DockerHost;

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::stream::BoxStream;

use crate::error::Result;
use crate::gpu::DeviceMapping;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Protocol {
    Tcp,
    Udp,
}

#[derive(Debug, Clone, Copy)]
pub struct PortBindingSpec {
    pub container_port: u16,
    pub host_port: u16,
    pub protocol: Protocol,
}

#[derive(Debug, Clone)]
pub struct MountSpec {
    pub host_path: String,
    pub container_path: String,
    pub read_only: bool,
}

#[derive(Debug, Clone, Default)]
pub struct ResourceSpec {
    pub cpu_shares: Option<i64>,
    pub nano_cpus: Option<i64>,
    pub memory_bytes: Option<i64>,
    pub shm_size_bytes: Option<i64>,
    pub devices: Vec<DeviceMapping>,
    pub device_requests: Vec<GpuDeviceRequest>,
}

#[derive(Debug, Clone)]
pub struct GpuDeviceRequest {
    pub count: Option<i64>,
    pub driver: Option<String>,
    pub device_ids: Vec<String>,
    pub capabilities: Vec<Vec<String>>,
    pub options: HashMap<String, String>,
}

/// Everything the Room Manager needs to hand the host in order to
/// create one room container. Deliberately framework-agnostic: the
/// room manager builds this from a `RoomSpec`, `DockerHost` lowers it
/// into bollard's `Config`/`HostConfig`.
#[derive(Debug, Clone)]
pub struct ContainerSpec {
    pub name: String,
    pub image: String,
    pub env: Vec<String>,
    pub labels: HashMap<String, String>,
    pub ports: Vec<PortBindingSpec>,
    pub mounts: Vec<MountSpec>,
    pub resources: ResourceSpec,
    pub hostname: Option<String>,
    pub dns: Vec<String>,
    pub network_mode: Option<String>,
}

#[derive(Debug, Clone)]
pub struct ContainerInspect {
    pub id: String,
    pub image: String,
    pub image_digest: Option<String>,
    pub running: bool,
    pub paused: bool,
    pub status: String,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub labels: HashMap<String, String>,
    pub env: Vec<String>,
    pub mounts: Vec<MountSpec>,
    pub device_requests: Vec<GpuDeviceRequest>,
    /// Host device node paths bound in (`/dev/dri/renderD128`, ...),
    /// as opposed to the GPU vendor device requests above.
    pub devices: Vec<String>,
    pub shm_size_bytes: Option<i64>,
    pub cap_add: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HostSignal {
    Created,
    Started,
    Unpaused,
    Paused,
    Stopped,
    Destroyed,
    HealthHealthy,
}

#[derive(Debug, Clone)]
pub struct HostEvent {
    pub container_id: String,
    pub signal: HostSignal,
    pub labels: HashMap<String, String>,
}

#[derive(Debug, Clone)]
pub struct ImagePullProgress {
    pub id: Option<String>,
    pub status: String,
    pub progress: Option<String>,
    pub current: Option<i64>,
    pub total: Option<i64>,
}

/// Registry credentials for a pull against a private image, carried
/// through the wire as plain fields — bollard encodes them into the
/// `X-Registry-Auth` header itself (base64-url JSON) the way the
/// Docker Engine API expects.
#[derive(Debug, Clone)]
pub struct RegistryAuth {
    pub username: String,
    pub password: String,
}

/// Capability set the room control plane needs from a container
/// runtime. One implementation (`DockerHost`) talks to the Docker
/// Engine API over `bollard`; tests can fake it.
#[async_trait]
pub trait Host: Send + Sync {
    async fn create_container(&self, spec: ContainerSpec) -> Result<String>;
    async fn start_container(&self, id: &str) -> Result<()>;
    async fn stop_container(&self, id: &str, timeout_secs: i64) -> Result<()>;
    async fn pause_container(&self, id: &str) -> Result<()>;
    async fn unpause_container(&self, id: &str) -> Result<()>;
    async fn remove_container(&self, id: &str, timeout_secs: i64) -> Result<()>;
    async fn inspect_container(&self, id: &str) -> Result<ContainerInspect>;

    /// Lists containers carrying every `key=value` pair in `label_filters`.
    async fn list_containers(&self, label_filters: &[(String, String)]) -> Result<Vec<ContainerInspect>>;

    /// Long-lived stream of raw host events, already filtered to the
    /// configured instance label by the caller-supplied filters.
    fn events(&self, label_filters: &[(String, String)]) -> BoxStream<'static, Result<HostEvent>>;

    /// Runs `argv` inside `id` and returns combined stdout, used for
    /// the TCP readiness probe (`nc`/`bash -c` one-liner) and `chown`
    /// on newly created private mounts.
    async fn exec(&self, id: &str, argv: Vec<String>) -> Result<String>;

    /// In-container HTTP GET against `path` on `port`, used by
    /// `GetStats` to reach the room's own stats/session endpoint
    /// without publishing it externally.
    async fn http_get(&self, id: &str, port: u16, path: &str) -> Result<String>;

    fn pull_image(&self, image: &str, auth: Option<RegistryAuth>) -> BoxStream<'static, Result<ImagePullProgress>>;

    /// Digest of the locally cached image behind `image`, or `None`
    /// when it isn't cached at all. Used to tell a room's pinned
    /// digest apart from what a fresh pull would run.
    async fn inspect_image(&self, image: &str) -> Result<Option<String>>;
}
