//! CLI flags overlaying the environment, the way `core/env/config.rs`
//! resolves Docker connection settings: every knob has an env default,
//! flags win when given.

use std::path::PathBuf;

use clap::Parser;
use room_core::config::ManagerConfig;
use room_core::model::EprRange;

#[derive(Debug, Parser)]
#[command(name = "roomd", version, about = "Room control plane daemon")]
pub struct Cli {
    /// Address the HTTP server binds to.
    #[arg(long, env = "ROOMD_BIND", default_value = "0.0.0.0:8080")]
    pub bind: String,

    /// Stamped into every room's `instance` label; also the primary
    /// host-query filter.
    #[arg(long, env = "ROOMD_INSTANCE_NAME", default_value = "neko-rooms")]
    pub instance_name: String,

    #[arg(long, env = "ROOMD_EPR_MIN", default_value_t = 59000)]
    pub epr_min: u16,

    #[arg(long, env = "ROOMD_EPR_MAX", default_value_t = 59100)]
    pub epr_max: u16,

    /// When set, every room shares one EPR port for UDP+TCP instead of
    /// a per-connection range.
    #[arg(long, env = "ROOMD_MUX_MODE", default_value_t = false)]
    pub mux_mode: bool,

    /// Comma-separated image allow-list; empty means nothing may be
    /// created.
    #[arg(long, env = "ROOMD_IMAGE_ALLOWLIST", value_delimiter = ',')]
    pub image_allowlist: Vec<String>,

    /// Comma-separated absolute path prefixes permitted for
    /// protected/public mounts.
    #[arg(long, env = "ROOMD_MOUNT_WHITELIST", value_delimiter = ',')]
    pub mount_whitelist: Vec<PathBuf>,

    #[arg(long, env = "ROOMD_STORAGE_INTERNAL_ROOT", default_value = "/storage/internal")]
    pub storage_internal_root: PathBuf,

    #[arg(long, env = "ROOMD_STORAGE_EXTERNAL_ROOT", default_value = "/storage/external")]
    pub storage_external_root: PathBuf,

    #[arg(long, env = "ROOMD_PRIVATE_UID", default_value_t = 1000)]
    pub private_uid: u32,

    #[arg(long, env = "ROOMD_PRIVATE_GID", default_value_t = 1000)]
    pub private_gid: u32,

    #[arg(long, env = "ROOMD_STOP_TIMEOUT_SECS", default_value_t = 10)]
    pub stop_timeout_secs: i64,

    #[arg(long, env = "ROOMD_WAIT_MODE", default_value_t = true)]
    pub wait_mode_enabled: bool,

    /// Docker `--network` value applied to every created room; absent
    /// uses the daemon default.
    #[arg(long, env = "ROOMD_NETWORK_MODE")]
    pub network_mode: Option<String>,

    /// Path to the Docker Unix socket; absent uses
    /// `DOCKER_HOST`/TLS-env resolution.
    #[arg(long, env = "ROOMD_DOCKER_SOCKET")]
    pub docker_socket: Option<String>,
}

impl Cli {
    pub fn manager_config(&self) -> ManagerConfig {
        ManagerConfig {
            instance_name: self.instance_name.clone(),
            epr_pool: EprRange::new(self.epr_min, self.epr_max),
            mux_mode: self.mux_mode,
            image_allowlist: self.image_allowlist.clone(),
            mount_whitelist: self.mount_whitelist.clone(),
            storage_internal_root: self.storage_internal_root.clone(),
            storage_external_root: self.storage_external_root.clone(),
            private_uid: self.private_uid,
            private_gid: self.private_gid,
            stop_timeout_secs: self.stop_timeout_secs,
            wait_mode_enabled: self.wait_mode_enabled,
            network_mode: self.network_mode.clone(),
            routing_label_templates: Vec::new(),
        }
    }
}
