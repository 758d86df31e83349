//! Room Manager (C4): the core CRUD and lifecycle engine. Translates a
//! [`RoomSpec`] into a container creation request, implements
//! start/stop/restart/pause/remove, extracts settings back out of a
//! running container, and exports the fleet as a declarative manifest.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use rand::Rng;
use tracing::warn;

use crate::config::ManagerConfig;
use crate::env_codec::{self, PortSettings};
use crate::error::{Error, Result};
use crate::events::{EventProjector, EventSubscription};
use crate::gpu;
use crate::host::{ContainerInspect, ContainerSpec, Host, MountSpec, PortBindingSpec, Protocol, ResourceSpec};
use crate::labels::{self, PortLabels, RoomLabels};
use crate::model::{ApiVersion, EprRange, Mount, MountKind, Room, RoomSpec, RoomStats, SessionMember};
use crate::port_allocator;

const NAME_PATTERN_FIRST: fn(char) -> bool = |c| c.is_ascii_alphanumeric();
const NAME_PATTERN_REST: fn(char) -> bool = |c| c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | '-');
const LABEL_KEY_CHARS: fn(char) -> bool = |c| c.is_ascii_lowercase() || c.is_ascii_digit() || matches!(c, '.' | '-');

/// Minimum length a caller-supplied room ID must have to be looked up;
/// shorter prefixes are rejected to avoid ambiguous matches.
const MIN_ID_LEN: usize = 12;

pub struct RoomManager {
    host: Arc<dyn Host>,
    config: ManagerConfig,
    projector: Arc<EventProjector>,
}

impl std::fmt::Debug for RoomManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RoomManager")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl RoomManager {
    pub fn new(host: Arc<dyn Host>, config: ManagerConfig) -> Self {
        let label_filters = vec![(labels::key("instance"), config.instance_name.clone())];
        let projector = EventProjector::new(host.clone(), label_filters);
        Self { host, config, projector }
    }

    pub fn config(&self) -> &ManagerConfig {
        &self.config
    }

    pub fn events_loop_start(&self) {
        self.projector.start_loop();
    }

    pub fn events_loop_stop(&self) {
        self.projector.stop_loop();
    }

    pub fn events(&self) -> EventSubscription {
        self.projector.subscribe()
    }

    pub fn unsubscribe_events(&self, id: crate::events::SubscriberId) {
        self.projector.unsubscribe(id);
    }

    fn instance_label_filters(&self) -> Vec<(String, String)> {
        vec![(labels::key("instance"), self.config.instance_name.clone())]
    }

    pub async fn list(&self, extra_labels: &HashMap<String, String>) -> Result<Vec<Room>> {
        for key in extra_labels.keys() {
            validate_label_key(key)?;
        }

        let mut filters = self.instance_label_filters();
        for (k, v) in extra_labels {
            filters.push((k.clone(), v.clone()));
        }

        let inspects = self.host.list_containers(&filters).await?;
        let mut rooms = Vec::with_capacity(inspects.len());
        for inspect in &inspects {
            rooms.push(self.to_room(inspect).await?);
        }
        Ok(rooms)
    }

    async fn to_room(&self, inspect: &ContainerInspect) -> Result<Room> {
        let parsed = RoomLabels::extract(&inspect.labels)?;
        let epr = parsed.ports.as_epr_range();
        let max_connections = if matches!(parsed.ports, PortLabels::Mux(_)) {
            0
        } else {
            epr.span() as u32
        };

        let is_ready = inspect.running && !inspect.paused && self.projector.is_ready(&inspect.id);
        let is_outdated = self.is_outdated(inspect).await;

        Ok(Room {
            id: inspect.id.chars().take(12).collect(),
            name: parsed.name,
            image: inspect.image.clone(),
            url: parsed.url,
            max_connections,
            running: inspect.running,
            paused: inspect.paused,
            is_ready,
            is_outdated,
            status: inspect.status.clone(),
            created_at: inspect.created_at,
            labels: parsed.user_labels,
            container_labels: inspect.labels.clone(),
        })
    }

    /// `true` when the container's pinned digest no longer matches the
    /// digest of the locally cached image behind its tag — i.e. a fresh
    /// pull plus recreate would run different bits than what's running
    /// now. `false` whenever the comparison can't be made (image no
    /// longer cached locally, digest never recorded).
    async fn is_outdated(&self, inspect: &ContainerInspect) -> bool {
        let Some(pinned) = inspect.image_digest.as_deref() else {
            return false;
        };
        match self.host.inspect_image(&inspect.image).await {
            Ok(Some(current)) => current != pinned,
            _ => false,
        }
    }

    /// Resolves a caller-supplied ID or name into a full container ID.
    /// IDs shorter than [`MIN_ID_LEN`] are rejected to avoid ambiguity.
    pub async fn get_entry(&self, id: &str) -> Result<ContainerInspect> {
        if id.len() < MIN_ID_LEN {
            return Err(Error::not_found("room id too short"));
        }
        self.host
            .inspect_container(id)
            .await
            .map_err(|_| Error::not_found(format!("room not found: {id}")))
    }

    pub async fn get_entry_by_name(&self, name: &str) -> Result<ContainerInspect> {
        let mut filters = self.instance_label_filters();
        filters.push((labels::key("name"), name.to_string()));

        let mut matches = self.host.list_containers(&filters).await?;
        matches.pop().ok_or_else(|| Error::not_found(format!("room not found: {name}")))
    }

    pub async fn get(&self, id: &str) -> Result<Room> {
        let inspect = self.get_entry(id).await?;
        self.to_room(&inspect).await
    }

    pub async fn get_by_name(&self, name: &str) -> Result<Room> {
        let inspect = self.get_entry_by_name(name).await?;
        self.to_room(&inspect).await
    }

    pub async fn get_settings(&self, id: &str) -> Result<RoomSpec> {
        let inspect = self.get_entry(id).await?;
        decode_settings(&inspect, &self.config)
    }

    /// Performs an in-container HTTP call against the room's own
    /// stats/session endpoint and aggregates the result per §4.4.
    pub async fn get_stats(&self, id: &str) -> Result<RoomStats> {
        let inspect = self.get_entry(id).await?;
        let parsed = RoomLabels::extract(&inspect.labels)?;
        let frontend_port = parsed.ports.as_epr_range().min;

        let body = match parsed.api_version {
            3 => {
                let admin_password = decode_settings(&inspect, &self.config)?.admin_password;
                self.host
                    .http_get(&inspect.id, frontend_port, &format!("/api/sessions?token={admin_password}"))
                    .await?
            }
            _ => {
                let admin_password = decode_settings(&inspect, &self.config)?.admin_password;
                self.host
                    .http_get(&inspect.id, frontend_port, &format!("/stats?pwd={admin_password}"))
                    .await?
            }
        };

        parse_stats(parsed.api_version, &body, &inspect)
    }

    pub async fn start(&self, id: &str) -> Result<()> {
        let inspect = self.get_entry(id).await?;
        if inspect.paused {
            self.host.unpause_container(&inspect.id).await
        } else {
            self.host.start_container(&inspect.id).await
        }
    }

    pub async fn stop(&self, id: &str) -> Result<()> {
        let inspect = self.get_entry(id).await?;
        self.host.stop_container(&inspect.id, self.config.stop_timeout_secs).await
    }

    pub async fn restart(&self, id: &str) -> Result<()> {
        let inspect = self.get_entry(id).await?;
        self.host.stop_container(&inspect.id, self.config.stop_timeout_secs).await?;
        self.host.start_container(&inspect.id).await
    }

    pub async fn pause(&self, id: &str) -> Result<()> {
        let inspect = self.get_entry(id).await?;
        self.host.pause_container(&inspect.id).await
    }

    pub async fn remove(&self, id: &str) -> Result<()> {
        let inspect = self.get_entry(id).await?;
        self.host.remove_container(&inspect.id, self.config.stop_timeout_secs).await
    }

    /// Removes the room and recreates it with `spec`, returning the new ID.
    pub async fn recreate(&self, id: &str, spec: RoomSpec, start: bool) -> Result<String> {
        self.remove(id).await?;
        self.create(spec, start).await
    }

    /// Steps 1-13 of the creation algorithm.
    pub async fn create(&self, mut spec: RoomSpec, start: bool) -> Result<String> {
        // 1. validate / auto-generate name
        if spec.name.is_empty() {
            spec.name = random_name();
        }
        validate_name(&spec.name)?;
        for key in spec.labels.keys() {
            validate_label_key(key)?;
        }

        // 2. validate image allow-list
        if !self.config.is_image_allowed(&spec.image) {
            return Err(Error::invalid_input(format!("image not allowed: {}", spec.image)));
        }

        // 3. auto-detect api version
        let api_version = match spec.api_version {
            0 => {
                warn!(image = %spec.image, "unable to detect api version, defaulting to v2");
                ApiVersion::V2
            }
            n => ApiVersion::from_u8(n).ok_or_else(|| Error::invalid_input("unknown api_version"))?,
        };

        // 4. allocate ports
        let span: u16 = if spec.is_mux() { 1 } else { spec.max_connections as u16 };
        let used = self.used_ranges().await?;
        let range = port_allocator::allocate(&used, self.config.epr_pool.min, self.config.epr_pool.max, span)?;

        // 5. build port bindings
        let frontend_port = range.min;
        let mut ports = Vec::new();
        if spec.is_mux() {
            ports.push(PortBindingSpec { container_port: range.min, host_port: range.min, protocol: Protocol::Udp });
            ports.push(PortBindingSpec { container_port: range.min, host_port: range.min, protocol: Protocol::Tcp });
        } else {
            for port in range.min..=range.max {
                ports.push(PortBindingSpec { container_port: port, host_port: port, protocol: Protocol::Udp });
            }
        }
        ports.push(PortBindingSpec { container_port: frontend_port, host_port: frontend_port, protocol: Protocol::Tcp });

        let container_name = format!("{}-{}", self.config.instance_name, spec.name);
        let url = format!("/{}", spec.name);

        // 6 + 7. labels (routing hints use the internal proxy.* scheme)
        let room_labels = RoomLabels {
            instance: self.config.instance_name.clone(),
            name: spec.name.clone(),
            url: url.clone(),
            neko_image: spec.image.clone(),
            api_version: api_version.as_u8(),
            ports: if spec.is_mux() { PortLabels::Mux(range.min) } else { PortLabels::Epr(range) },
            browser_policy_path: spec.browser_policy.as_ref().map(|p| p.path.clone()),
            proxy_enabled: true,
            proxy_path: Some(url.clone()),
            proxy_port: Some(frontend_port.to_string()),
            user_labels: spec.labels.clone(),
        };
        let container_labels = room_labels.serialize();

        // 8. label templates are an external-router concern; nothing to
        //    expand when using the internal proxy.* scheme.

        // 9. env
        let codec = env_codec::codec_for(api_version);
        let env = codec.encode(&spec, PortSettings { frontend_port, epr_min: range.min, epr_max: range.max, mux: spec.is_mux() });

        // 10. browser policy mount
        let mut mounts = spec.mounts.clone();
        if let Some(policy) = &spec.browser_policy {
            let filename = format!("{}-policy.json", spec.name);
            let template_path = self.config.storage_internal_root.join("templates").join(&filename);
            write_policy_file(&template_path, &policy.content)?;
            mounts.push(Mount::new(MountKind::Template, template_path.display().to_string(), policy.path.clone()));
        }

        // 11. resolve mounts
        let resolved_mounts = self.resolve_mounts(&spec.name, mounts).await?;

        // 12. gpu device requests
        let mut device_requests = Vec::new();
        for gpu_spec in &spec.resources.gpus {
            let parsed = gpu::parse_spec(gpu_spec)?;
            device_requests.push(crate::host::GpuDeviceRequest {
                count: parsed.count,
                driver: parsed.driver,
                device_ids: parsed.device_ids,
                capabilities: vec![parsed.capabilities],
                options: parsed.options.into_iter().collect(),
            });
        }
        let devices = spec.resources.devices.iter().map(|d| gpu::device_mapping(d)).collect();

        let container_spec = ContainerSpec {
            name: container_name,
            image: spec.image.clone(),
            env,
            labels: container_labels,
            ports,
            mounts: resolved_mounts
                .iter()
                .map(|m| MountSpec { host_path: m.host_path.clone(), container_path: m.container_path.clone(), read_only: m.kind.is_read_only() })
                .collect(),
            resources: ResourceSpec {
                cpu_shares: spec.resources.cpu_shares,
                nano_cpus: spec.resources.nano_cpus,
                memory_bytes: spec.resources.memory_bytes,
                shm_size_bytes: spec.resources.shm_size_bytes,
                devices,
                device_requests,
            },
            hostname: spec.hostname.clone(),
            dns: spec.dns.clone(),
            network_mode: self.config.network_mode.clone(),
        };

        // 13. submit
        let id = self.host.create_container(container_spec).await?;
        let short_id: String = id.chars().take(12).collect();

        if start {
            self.host.start_container(&id).await?;
        }

        Ok(short_id)
    }

    /// Projects the live fleet into a declarative compose manifest.
    /// Port/volume lines are best-effort: reconstructed from labels,
    /// since a container inspect alone does not carry back the exact
    /// `docker run` invocation that created it.
    pub async fn export_manifest(&self) -> Result<Vec<u8>> {
        let inspects = self.host.list_containers(&self.instance_label_filters()).await?;
        let mut entries = Vec::with_capacity(inspects.len());

        for inspect in &inspects {
            let Ok(parsed) = RoomLabels::extract(&inspect.labels) else {
                continue;
            };
            let epr = parsed.ports.as_epr_range();
            let port_lines = if epr.min == epr.max {
                vec![format!("{0}:{0}/udp", epr.min), format!("{0}:{0}/tcp", epr.min)]
            } else {
                vec![
                    format!("{}-{}:{}-{}/udp", epr.min, epr.max, epr.min, epr.max),
                    format!("{}-{}:{}-{}/tcp", epr.min, epr.max, epr.min, epr.max),
                ]
            };
            entries.push(crate::manifest::entry_from_inspect(inspect, port_lines));
        }

        crate::manifest::export_as_manifest(&entries)
    }

    async fn used_ranges(&self) -> Result<Vec<EprRange>> {
        let inspects = self.host.list_containers(&self.instance_label_filters()).await?;
        let mut ranges = Vec::with_capacity(inspects.len());
        for inspect in &inspects {
            if let Ok(parsed) = RoomLabels::extract(&inspect.labels) {
                ranges.push(parsed.ports.as_epr_range());
            }
        }
        Ok(ranges)
    }

    async fn resolve_mounts(&self, room_name: &str, mounts: Vec<Mount>) -> Result<Vec<Mount>> {
        let deduped = Mount::dedupe(mounts);
        let mut out = Vec::with_capacity(deduped.len());

        for mount in deduped {
            let resolved_host_path = match mount.kind {
                MountKind::Private => {
                    let path = self.config.storage_external_root.join("rooms").join(room_name).join(mount.host_path.trim_start_matches('/'));
                    self.ensure_private_dir(&path).await?;
                    path.display().to_string()
                }
                MountKind::Template => self
                    .config
                    .storage_internal_root
                    .join("templates")
                    .join(mount.host_path.trim_start_matches('/'))
                    .display()
                    .to_string(),
                MountKind::Protected | MountKind::Public => {
                    let path = PathBuf::from(&mount.host_path);
                    let clean = crate::config::clean_mount_path(&path)
                        .ok_or_else(|| Error::policy_refused(format!("mount path escapes root: {}", mount.host_path)))?;
                    if !self.config.is_path_whitelisted(&clean) {
                        return Err(Error::policy_refused(format!("mount path not whitelisted: {}", mount.host_path)));
                    }
                    clean.display().to_string()
                }
            };
            out.push(Mount::new(mount.kind, resolved_host_path, mount.container_path));
        }

        Ok(out)
    }

    async fn ensure_private_dir(&self, path: &Path) -> Result<()> {
        tokio::fs::create_dir_all(path)
            .await
            .map_err(|e| Error::host_failure("failed to create private mount directory", e))?;
        // chown is best-effort; non-Unix hosts or permission-denied
        // sandboxes shouldn't fail room creation outright.
        #[cfg(unix)]
        {
            if let Err(err) = chown_recursive(path, self.config.private_uid, self.config.private_gid) {
                warn!(path = %path.display(), error = %err, "failed to chown private mount");
            }
        }
        Ok(())
    }
}

#[cfg(unix)]
fn chown_recursive(path: &Path, uid: u32, gid: u32) -> std::io::Result<()> {
    use std::os::unix::fs::chown;
    chown(path, Some(uid), Some(gid))
}

fn random_name() -> String {
    const ALPHABET: &[u8] = b"abcdefghijklmnopqrstuvwxyz0123456789";
    let mut rng = rand::thread_rng();
    (0..8)
        .map(|_| ALPHABET[rng.gen_range(0..ALPHABET.len())] as char)
        .collect()
}

fn validate_name(name: &str) -> Result<()> {
    let mut chars = name.chars();
    let ok = chars
        .next()
        .map(NAME_PATTERN_FIRST)
        .unwrap_or(false)
        && chars.all(NAME_PATTERN_REST);
    if ok {
        Ok(())
    } else {
        Err(Error::invalid_input(format!("invalid room name: {name}")))
    }
}

fn validate_label_key(key: &str) -> Result<()> {
    if !key.is_empty() && key.chars().all(LABEL_KEY_CHARS) {
        Ok(())
    } else {
        Err(Error::invalid_input(format!("invalid label key: {key}")))
    }
}

fn write_policy_file(path: &Path, content: &serde_json::Value) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(|e| Error::host_failure("failed to create template dir", e))?;
    }
    let rendered = serde_json::to_vec_pretty(content).map_err(|e| Error::invalid_input(format!("bad browser policy json: {e}")))?;
    std::fs::write(path, rendered).map_err(|e| Error::host_failure("failed to write browser policy", e))
}

/// Reverses steps 9-12 of creation: decodes env, mounts, and GPU specs
/// back out of a running container's inspect result.
fn decode_settings(inspect: &ContainerInspect, config: &ManagerConfig) -> Result<RoomSpec> {
    let parsed = RoomLabels::extract(&inspect.labels)?;
    let api_version = ApiVersion::from_u8(parsed.api_version).unwrap_or(ApiVersion::V2);
    let env_fields = env_codec::codec_for(api_version).decode(&inspect.env)?;

    let max_connections = match parsed.ports {
        PortLabels::Mux(_) => 0,
        PortLabels::Epr(range) => range.span() as u32,
    };

    let mounts = decode_mounts(inspect, config, &parsed.name);
    let resources = decode_resources(inspect);
    let browser_policy = parsed
        .browser_policy_path
        .as_ref()
        .map(|path| decode_browser_policy(config, &parsed.name, path));

    Ok(RoomSpec {
        name: parsed.name,
        image: inspect.image.clone(),
        api_version: api_version.as_u8(),
        max_connections,
        user_password: env_fields.user_password,
        admin_password: env_fields.admin_password,
        capture: env_fields.capture,
        control_protection: env_fields.control_protection,
        implicit_control: env_fields.implicit_control,
        nat1to1: env_fields.nat1to1,
        extra_env: env_fields.extra_env,
        labels: parsed.user_labels,
        mounts,
        resources,
        hostname: None,
        dns: Vec::new(),
        browser_policy,
    })
}

/// Reconstructs GPU spec lines and plain host-device paths from a
/// container's recorded device requests/mappings (step 12 in reverse).
fn decode_resources(inspect: &ContainerInspect) -> crate::model::Resources {
    let gpus = inspect
        .device_requests
        .iter()
        .filter(|req| req.capabilities.iter().any(|caps| gpu::is_gpu_capability_set(caps)))
        .map(|req| {
            let capabilities = req.capabilities.first().cloned().unwrap_or_default();
            gpu::spec_from_request(req.count, req.driver.as_deref(), &req.device_ids, &capabilities)
        })
        .collect();

    crate::model::Resources {
        gpus,
        devices: inspect.devices.clone(),
        ..Default::default()
    }
}

/// Reads back the rendered browser-policy file written at creation
/// step 10, yielding `Null` content if the template is gone — a
/// decode should never fail the whole settings read over it.
fn decode_browser_policy(config: &ManagerConfig, room_name: &str, path: &str) -> crate::model::BrowserPolicy {
    let filename = format!("{room_name}-policy.json");
    let template_path = config.storage_internal_root.join("templates").join(filename);
    let content = std::fs::read(&template_path)
        .ok()
        .and_then(|bytes| serde_json::from_slice(&bytes).ok())
        .unwrap_or(serde_json::Value::Null);

    crate::model::BrowserPolicy { path: path.to_string(), content }
}

/// Reverses the mount resolution of creation step 11: classifies each
/// recorded bind mount back into a [`MountKind`] by comparing its host
/// path against the configured storage roots, the same roots
/// `resolve_mounts` rewrote it relative to. The rendered browser-policy
/// mount is excluded; `decode_browser_policy` reports it separately.
fn decode_mounts(inspect: &ContainerInspect, config: &ManagerConfig, room_name: &str) -> Vec<Mount> {
    let templates_root = config.storage_internal_root.join("templates");
    let room_root = config.storage_external_root.join("rooms").join(room_name);

    inspect
        .mounts
        .iter()
        .filter_map(|m| {
            let host_path = Path::new(&m.host_path);
            if host_path.starts_with(&templates_root) {
                return None;
            }
            if let Ok(relative) = host_path.strip_prefix(&room_root) {
                let relative = format!("/{}", relative.display());
                return Some(Mount::new(MountKind::Private, relative, m.container_path.clone()));
            }
            let kind = if m.read_only { MountKind::Protected } else { MountKind::Public };
            Some(Mount::new(kind, m.host_path.clone(), m.container_path.clone()))
        })
        .collect()
}

fn parse_stats(api_version: u8, body: &str, inspect: &ContainerInspect) -> Result<RoomStats> {
    let server_started_at = inspect.started_at;

    if api_version == 3 {
        #[derive(serde::Deserialize)]
        struct Session {
            id: String,
            #[serde(default)]
            name: String,
            #[serde(default)]
            profile: Option<Profile>,
            connected: bool,
            #[serde(default)]
            not_connected_since: Option<chrono::DateTime<chrono::Utc>>,
        }
        #[derive(serde::Deserialize)]
        struct Profile {
            #[serde(default)]
            is_admin: bool,
        }

        let sessions: Vec<Session> = serde_json::from_str(body).map_err(|e| Error::host_failure("bad sessions response", e))?;

        let mut members = Vec::new();
        let mut connections = 0u32;
        let mut last_admin_left_at = None;
        let mut last_user_left_at = None;

        for session in sessions {
            let is_admin = session.profile.as_ref().map(|p| p.is_admin).unwrap_or(false);
            if session.connected {
                connections += 1;
                members.push(SessionMember { id: session.id, name: session.name, is_admin });
            } else if let Some(since) = session.not_connected_since {
                if is_admin {
                    last_admin_left_at = Some(last_admin_left_at.map_or(since, |prev: chrono::DateTime<chrono::Utc>| prev.max(since)));
                } else {
                    last_user_left_at = Some(last_user_left_at.map_or(since, |prev: chrono::DateTime<chrono::Utc>| prev.max(since)));
                }
            }
        }

        Ok(RoomStats { connections, members, last_admin_left_at, last_user_left_at, server_started_at })
    } else {
        #[derive(serde::Deserialize, Default)]
        struct StatsV2 {
            #[serde(default)]
            connections: u32,
        }
        let stats: StatsV2 = serde_json::from_str(body).unwrap_or_default();
        Ok(RoomStats { connections: stats.connections, members: Vec::new(), last_admin_left_at: None, last_user_left_at: None, server_started_at })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validate_name_rejects_leading_dot() {
        assert!(validate_name(".room").is_err());
        assert!(validate_name("room-1").is_ok());
    }

    #[test]
    fn validate_label_key_rejects_uppercase() {
        assert!(validate_label_key("Foo").is_err());
        assert!(validate_label_key("foo.bar-baz").is_ok());
    }

    #[test]
    fn parse_stats_v2_counts_connections() {
        let inspect = ContainerInspect {
            id: "abc".to_string(),
            image: "img".to_string(),
            image_digest: None,
            running: true,
            paused: false,
            status: "running".to_string(),
            created_at: chrono::Utc::now(),
            started_at: None,
            labels: HashMap::new(),
            env: Vec::new(),
            mounts: Vec::new(),
            device_requests: Vec::new(),
            devices: Vec::new(),
            shm_size_bytes: None,
            cap_add: Vec::new(),
        };
        let stats = parse_stats(2, r#"{"connections": 3}"#, &inspect).unwrap();
        assert_eq!(stats.connections, 3);
    }

    #[test]
    fn decode_settings_round_trips_private_mount_and_browser_policy() {
        let root = std::env::temp_dir().join(format!(
            "room-core-decode-test-{}-{}",
            std::process::id(),
            "room-a"
        ));
        let mut config = ManagerConfig::default();
        config.storage_external_root = root.join("external");
        config.storage_internal_root = root.join("internal");

        let templates_dir = config.storage_internal_root.join("templates");
        std::fs::create_dir_all(&templates_dir).unwrap();
        std::fs::write(
            templates_dir.join("room-a-policy.json"),
            br#"{"HomepageLocation":"about:blank"}"#,
        )
        .unwrap();

        let private_path = config
            .storage_external_root
            .join("rooms")
            .join("room-a")
            .join("data");

        let labels = RoomLabels {
            instance: "neko-rooms".to_string(),
            name: "room-a".to_string(),
            url: "/room-a".to_string(),
            neko_image: "m1k1o/neko:chromium".to_string(),
            api_version: 2,
            ports: PortLabels::Epr(EprRange::new(59000, 59002)),
            browser_policy_path: Some("/config/policies/policy.json".to_string()),
            proxy_enabled: true,
            proxy_path: Some("/room-a".to_string()),
            proxy_port: Some("59000".to_string()),
            user_labels: HashMap::new(),
        }
        .serialize();

        let inspect = ContainerInspect {
            id: "abc123456789".to_string(),
            image: "m1k1o/neko:chromium".to_string(),
            image_digest: None,
            running: true,
            paused: false,
            status: "running".to_string(),
            created_at: chrono::Utc::now(),
            started_at: None,
            labels,
            env: Vec::new(),
            mounts: vec![crate::host::MountSpec {
                host_path: private_path.display().to_string(),
                container_path: "/home/user/data".to_string(),
                read_only: false,
            }],
            device_requests: Vec::new(),
            devices: Vec::new(),
            shm_size_bytes: None,
            cap_add: Vec::new(),
        };

        let spec = decode_settings(&inspect, &config).unwrap();
        assert_eq!(spec.mounts.len(), 1);
        assert_eq!(spec.mounts[0].kind, MountKind::Private);
        assert_eq!(spec.mounts[0].host_path, "/data");
        assert_eq!(spec.mounts[0].container_path, "/home/user/data");

        let policy = spec.browser_policy.unwrap();
        assert_eq!(policy.path, "/config/policies/policy.json");
        assert_eq!(policy.content["HomepageLocation"], "about:blank");

        std::fs::remove_dir_all(&root).ok();
    }

    #[test]
    fn decode_resources_separates_gpu_from_plain_devices() {
        let inspect = ContainerInspect {
            id: "abc123456789".to_string(),
            image: "img".to_string(),
            image_digest: None,
            running: true,
            paused: false,
            status: "running".to_string(),
            created_at: chrono::Utc::now(),
            started_at: None,
            labels: HashMap::new(),
            env: Vec::new(),
            mounts: Vec::new(),
            device_requests: vec![crate::host::GpuDeviceRequest {
                count: None,
                driver: Some("nvidia".to_string()),
                device_ids: vec!["0".to_string()],
                capabilities: vec![vec!["gpu".to_string(), "compute".to_string()]],
                options: HashMap::new(),
            }],
            devices: vec!["/dev/dri/renderD128".to_string()],
            shm_size_bytes: None,
            cap_add: Vec::new(),
        };

        let resources = decode_resources(&inspect);
        assert_eq!(resources.gpus.len(), 1);
        assert!(resources.gpus[0].contains("driver=nvidia"));
        assert_eq!(resources.devices, vec!["/dev/dri/renderD128".to_string()]);
    }
}
