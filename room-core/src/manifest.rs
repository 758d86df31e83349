//! `ExportAsManifest`: projects the live fleet into a declarative,
//! docker-compose-shaped document. Built on `docker-compose-types`,
//! a dependency the teacher crate already carried (behind its
//! `docker-compose` feature, previously used only to shell out to the
//! `docker-compose` CLI for test fixtures) — here used for its literal
//! purpose, serializing a compose document.

use docker_compose_types::{
    Compose, ComposeNetwork, ComposeNetworks, ComposeVolumes, Labels, MapOrEmpty, Networks,
    Ports, Service, Services, SingleValue, Volumes,
};
use indexmap::IndexMap;

use crate::error::Result;
use crate::host::ContainerInspect;

/// One room's contribution to the manifest, pre-lowered from a host
/// inspect result so this module doesn't depend on bollard types.
#[derive(Debug, Clone)]
pub struct ManifestEntry {
    pub service_name: String,
    pub image: String,
    pub ports: Vec<String>,
    pub env: Vec<String>,
    pub volumes: Vec<String>,
    pub devices: Vec<String>,
    pub labels: std::collections::HashMap<String, String>,
    pub shm_size_bytes: Option<i64>,
    pub cap_add: Vec<String>,
}

/// Name of the external network every room service is attached to;
/// the manifest references it but does not declare its creation.
pub const EXTERNAL_NETWORK: &str = "neko-rooms";

pub fn export_as_manifest(entries: &[ManifestEntry]) -> Result<Vec<u8>> {
    let mut services = IndexMap::new();

    for entry in entries {
        let service = Service {
            image: Some(entry.image.clone()),
            container_name: Some(entry.service_name.clone()),
            ports: Ports::Short(entry.ports.clone()),
            environment: docker_compose_types::Environment::List(entry.env.clone()),
            volumes: entry
                .volumes
                .iter()
                .map(|v| Volumes::Simple(v.clone()))
                .collect(),
            devices: entry.devices.clone(),
            labels: Labels::Map(entry.labels.clone().into_iter().collect()),
            restart: Some("unless-stopped".to_string()),
            shm_size: entry.shm_size_bytes.map(|bytes| SingleValue::String(bytes.to_string())),
            cap_add: entry.cap_add.clone(),
            networks: Networks::Simple(vec![EXTERNAL_NETWORK.to_string()]),
            ..Default::default()
        };
        services.insert(entry.service_name.clone(), Some(service));
    }

    let mut networks = IndexMap::new();
    networks.insert(
        EXTERNAL_NETWORK.to_string(),
        MapOrEmpty::Map(ComposeNetwork {
            external: Some(docker_compose_types::ComposeNetworkExternal::Bool(true)),
            ..Default::default()
        }),
    );

    let compose = Compose {
        version: Some("3.8".to_string()),
        services: Services(services),
        networks: ComposeNetworks(networks),
        volumes: ComposeVolumes::default(),
        ..Default::default()
    };

    let yaml = serde_yaml::to_string(&compose)
        .map_err(|e| crate::error::Error::fatal(format!("failed to render manifest: {e}")))?;
    Ok(yaml.into_bytes())
}

/// Lowers one host inspect result into a [`ManifestEntry`] ready for
/// [`export_as_manifest`]. `port_lines` is passed in rather than derived
/// here because it's reconstructed from EPR-range labels, not from
/// anything `ContainerInspect` itself carries.
pub fn entry_from_inspect(inspect: &ContainerInspect, port_lines: Vec<String>) -> ManifestEntry {
    let volumes = inspect
        .mounts
        .iter()
        .map(|m| {
            if m.read_only {
                format!("{}:{}:ro", m.host_path, m.container_path)
            } else {
                format!("{}:{}", m.host_path, m.container_path)
            }
        })
        .collect();

    ManifestEntry {
        service_name: inspect.labels.get(&crate::labels::key("name")).cloned().unwrap_or_else(|| inspect.id.clone()),
        image: inspect.image.clone(),
        ports: port_lines,
        env: inspect.env.clone(),
        volumes,
        devices: inspect.devices.clone(),
        labels: inspect.labels.clone(),
        shm_size_bytes: inspect.shm_size_bytes,
        cap_add: inspect.cap_add.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn renders_one_service_per_entry() {
        let entries = vec![ManifestEntry {
            service_name: "room-a".to_string(),
            image: "m1k1o/neko:chromium".to_string(),
            ports: vec!["59000:59000/udp".to_string()],
            env: vec!["NEKO_PASSWORD=secret".to_string()],
            volumes: vec!["/srv/rooms/a:/data".to_string()],
            devices: Vec::new(),
            labels: std::collections::HashMap::new(),
            shm_size_bytes: Some(2 << 30),
            cap_add: Vec::new(),
        }];

        let yaml = export_as_manifest(&entries).unwrap();
        let text = String::from_utf8(yaml).unwrap();
        assert!(text.contains("room-a"));
        assert!(text.contains("m1k1o/neko:chromium"));
    }

    #[test]
    fn entry_from_inspect_carries_env_and_mounts() {
        let inspect = ContainerInspect {
            id: "abc123456789".to_string(),
            image: "m1k1o/neko:chromium".to_string(),
            image_digest: None,
            running: true,
            paused: false,
            status: "running".to_string(),
            created_at: chrono::Utc::now(),
            started_at: None,
            labels: [(crate::labels::key("name"), "room-a".to_string())].into_iter().collect(),
            env: vec!["NEKO_PASSWORD=secret".to_string()],
            mounts: vec![crate::host::MountSpec {
                host_path: "/srv/rooms/room-a".to_string(),
                container_path: "/home/user".to_string(),
                read_only: false,
            }],
            device_requests: Vec::new(),
            devices: vec!["/dev/dri/renderD128".to_string()],
            shm_size_bytes: Some(2 << 30),
            cap_add: vec!["SYS_ADMIN".to_string()],
        };

        let entry = entry_from_inspect(&inspect, vec!["59000:59000/udp".to_string()]);
        assert_eq!(entry.service_name, "room-a");
        assert_eq!(entry.env, vec!["NEKO_PASSWORD=secret".to_string()]);
        assert_eq!(entry.volumes, vec!["/srv/rooms/room-a:/home/user".to_string()]);
        assert_eq!(entry.devices, vec!["/dev/dri/renderD128".to_string()]);
        assert_eq!(entry.shm_size_bytes, Some(2 << 30));
        assert_eq!(entry.cap_add, vec!["SYS_ADMIN".to_string()]);
    }
}
