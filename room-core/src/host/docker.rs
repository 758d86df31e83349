//! Docker Engine API implementation of [`Host`], grounded on the
//! connection dispatch in `core/client/bollard_client.rs` and the
//! container-config assembly in `runners/async_runner.rs`.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use bollard::container::{
    Config, CreateContainerOptions, ListContainersOptions, RemoveContainerOptions,
    StopContainerOptions,
};
use bollard::exec::{CreateExecOptions, StartExecResults};
use bollard::image::CreateImageOptions;
use bollard::models::{
    DeviceMapping as BollardDeviceMapping, DeviceRequest, HostConfig, Mount as BollardMount,
    MountTypeEnum, PortBinding, PortMap,
};
use bollard::system::EventsOptions;
use bollard::Docker;
use chrono::{DateTime, Utc};
use futures::stream::BoxStream;
use futures::StreamExt;

use super::{
    ContainerInspect, ContainerSpec, GpuDeviceRequest, Host, HostEvent, HostSignal,
    ImagePullProgress, MountSpec, Protocol, RegistryAuth,
};
use crate::error::{Error, Result};

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(2 * 60);

pub struct DockerHost {
    client: Docker,
}

impl std::fmt::Debug for DockerHost {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DockerHost").finish_non_exhaustive()
    }
}

impl DockerHost {
    /// Connects using the standard `DOCKER_HOST`/TLS environment,
    /// falling back to the local Unix socket.
    pub fn connect() -> Result<Self> {
        let client = Docker::connect_with_local_defaults()
            .map_err(|e| Error::host_failure("failed to connect to docker daemon", e))?;
        Ok(Self { client })
    }

    pub fn connect_with_socket(path: &str) -> Result<Self> {
        let client = Docker::connect_with_unix(
            path,
            DEFAULT_TIMEOUT.as_secs(),
            bollard::API_DEFAULT_VERSION,
        )
        .map_err(|e| Error::host_failure("failed to connect to docker daemon", e))?;
        Ok(Self { client })
    }
}

fn to_port_map(ports: &[super::PortBindingSpec]) -> (HashMap<String, HashMap<(), ()>>, PortMap) {
    let mut exposed = HashMap::new();
    let mut bindings = PortMap::new();

    for port in ports {
        let proto = match port.protocol {
            Protocol::Tcp => "tcp",
            Protocol::Udp => "udp",
        };
        let key = format!("{}/{proto}", port.container_port);
        exposed.insert(key.clone(), HashMap::new());
        bindings.insert(
            key,
            Some(vec![PortBinding {
                host_ip: None,
                host_port: Some(port.host_port.to_string()),
            }]),
        );
    }

    (exposed, bindings)
}

fn to_mounts(mounts: &[super::MountSpec]) -> Vec<BollardMount> {
    mounts
        .iter()
        .map(|m| BollardMount {
            target: Some(m.container_path.clone()),
            source: Some(m.host_path.clone()),
            typ: Some(MountTypeEnum::BIND),
            read_only: Some(m.read_only),
            ..Default::default()
        })
        .collect()
}

fn to_device_requests(resources: &super::ResourceSpec) -> Vec<DeviceRequest> {
    resources
        .device_requests
        .iter()
        .map(|r| DeviceRequest {
            driver: r.driver.clone(),
            count: r.count,
            device_ids: if r.device_ids.is_empty() {
                None
            } else {
                Some(r.device_ids.clone())
            },
            capabilities: Some(r.capabilities.clone()),
            options: Some(r.options.clone()),
        })
        .collect()
}

fn to_device_mappings(resources: &super::ResourceSpec) -> Vec<BollardDeviceMapping> {
    resources
        .devices
        .iter()
        .map(|d| BollardDeviceMapping {
            path_on_host: Some(d.path_on_host.clone()),
            path_in_container: Some(d.path_in_container.clone()),
            cgroup_permissions: Some(d.cgroup_permissions.clone()),
        })
        .collect()
}

fn label_pairs(filters: &[(String, String)]) -> Vec<String> {
    filters.iter().map(|(k, v)| format!("{k}={v}")).collect()
}

fn parse_event_labels(attrs: &Option<HashMap<String, String>>) -> HashMap<String, String> {
    attrs.clone().unwrap_or_default()
}

fn signal_from_event(action: &str) -> Option<HostSignal> {
    match action {
        "create" => Some(HostSignal::Created),
        "start" | "unpause" => Some(HostSignal::Started),
        "pause" => Some(HostSignal::Paused),
        "stop" | "die" => Some(HostSignal::Stopped),
        "destroy" => Some(HostSignal::Destroyed),
        other if other.starts_with("health_status: healthy") => Some(HostSignal::HealthHealthy),
        _ => None,
    }
}

#[async_trait]
impl Host for DockerHost {
    async fn create_container(&self, spec: ContainerSpec) -> Result<String> {
        let (exposed_ports, port_bindings) = to_port_map(&spec.ports);

        let host_config = HostConfig {
            port_bindings: Some(port_bindings),
            mounts: Some(to_mounts(&spec.mounts)),
            cpu_shares: spec.resources.cpu_shares,
            nano_cpus: spec.resources.nano_cpus,
            memory: spec.resources.memory_bytes,
            shm_size: spec.resources.shm_size_bytes,
            devices: Some(to_device_mappings(&spec.resources)),
            device_requests: Some(to_device_requests(&spec.resources)),
            dns: Some(spec.dns.clone()),
            network_mode: spec.network_mode.clone(),
            ..Default::default()
        };

        let config = Config {
            image: Some(spec.image),
            env: Some(spec.env),
            labels: Some(spec.labels),
            exposed_ports: Some(exposed_ports),
            hostname: spec.hostname,
            host_config: Some(host_config),
            ..Default::default()
        };

        let options = CreateContainerOptions {
            name: spec.name,
            platform: None,
        };

        let created = self
            .client
            .create_container(Some(options), config)
            .await?;
        Ok(created.id)
    }

    async fn start_container(&self, id: &str) -> Result<()> {
        self.client
            .start_container::<String>(id, None)
            .await
            .map_err(Error::from)
    }

    async fn stop_container(&self, id: &str, timeout_secs: i64) -> Result<()> {
        self.client
            .stop_container(
                id,
                Some(StopContainerOptions {
                    t: timeout_secs as i32,
                }),
            )
            .await
            .map_err(Error::from)
    }

    async fn pause_container(&self, id: &str) -> Result<()> {
        self.client.pause_container(id).await.map_err(Error::from)
    }

    async fn unpause_container(&self, id: &str) -> Result<()> {
        self.client
            .unpause_container(id)
            .await
            .map_err(Error::from)
    }

    async fn remove_container(&self, id: &str, timeout_secs: i64) -> Result<()> {
        self.stop_container(id, timeout_secs).await.ok();
        self.client
            .remove_container(
                id,
                Some(RemoveContainerOptions {
                    force: true,
                    v: true,
                    ..Default::default()
                }),
            )
            .await
            .map_err(Error::from)
    }

    async fn inspect_container(&self, id: &str) -> Result<ContainerInspect> {
        let inspect = self.client.inspect_container(id, None).await?;
        to_inspect(inspect)
    }

    async fn list_containers(&self, label_filters: &[(String, String)]) -> Result<Vec<ContainerInspect>> {
        let mut filters = HashMap::new();
        filters.insert("label".to_string(), label_pairs(label_filters));

        let summaries = self
            .client
            .list_containers(Some(ListContainersOptions {
                all: true,
                filters,
                ..Default::default()
            }))
            .await?;

        let mut out = Vec::with_capacity(summaries.len());
        for summary in summaries {
            let id = summary.id.ok_or_else(|| Error::host_failure(
                "container summary missing id",
                std::io::Error::new(std::io::ErrorKind::Other, "no id"),
            ))?;
            out.push(self.inspect_container(&id).await?);
        }
        Ok(out)
    }

    fn events(&self, label_filters: &[(String, String)]) -> BoxStream<'static, Result<HostEvent>> {
        let mut filters = HashMap::new();
        filters.insert("type".to_string(), vec!["container".to_string()]);
        filters.insert("label".to_string(), label_pairs(label_filters));

        let stream = self.client.events(Some(EventsOptions::<String> {
            filters,
            ..Default::default()
        }));

        stream
            .filter_map(|item| async move {
                let event = match item {
                    Ok(event) => event,
                    Err(err) => return Some(Err(Error::from(err))),
                };
                let action = event.action.unwrap_or_default();
                let signal = signal_from_event(&action)?;
                let actor = event.actor.unwrap_or_default();
                Some(Ok(HostEvent {
                    container_id: actor.id.unwrap_or_default(),
                    signal,
                    labels: parse_event_labels(&actor.attributes),
                }))
            })
            .boxed()
    }

    async fn exec(&self, id: &str, argv: Vec<String>) -> Result<String> {
        let exec = self
            .client
            .create_exec(
                id,
                CreateExecOptions {
                    cmd: Some(argv),
                    attach_stdout: Some(true),
                    attach_stderr: Some(true),
                    ..Default::default()
                },
            )
            .await?;

        let mut output = String::new();
        if let StartExecResults::Attached { mut output: stream, .. } =
            self.client.start_exec(&exec.id, None).await?
        {
            while let Some(chunk) = stream.next().await {
                let chunk = chunk?;
                output.push_str(&chunk.to_string());
            }
        }
        Ok(output)
    }

    async fn http_get(&self, id: &str, port: u16, path: &str) -> Result<String> {
        let url = format!("http://localhost:{port}{path}");
        self.exec(id, vec!["curl".to_string(), "-sS".to_string(), url])
            .await
    }

    fn pull_image(
        &self,
        image: &str,
        auth: Option<RegistryAuth>,
    ) -> BoxStream<'static, Result<ImagePullProgress>> {
        let (name, tag) = image.split_once(':').unwrap_or((image, "latest"));
        let credentials = auth.map(|a| bollard::auth::DockerCredentials {
            username: Some(a.username),
            password: Some(a.password),
            ..Default::default()
        });
        let stream = self.client.create_image(
            Some(CreateImageOptions {
                from_image: name.to_string(),
                tag: tag.to_string(),
                ..Default::default()
            }),
            None,
            credentials,
        );

        stream
            .map(|item| {
                let info = item.map_err(Error::from)?;
                Ok(ImagePullProgress {
                    id: info.id,
                    status: info.status.unwrap_or_default(),
                    progress: info.progress,
                    current: info.progress_detail.as_ref().and_then(|d| d.current),
                    total: info.progress_detail.as_ref().and_then(|d| d.total),
                })
            })
            .boxed()
    }

    async fn inspect_image(&self, image: &str) -> Result<Option<String>> {
        match self.client.inspect_image(image).await {
            Ok(info) => Ok(info.repo_digests.unwrap_or_default().into_iter().next()),
            Err(bollard::errors::Error::DockerResponseServerError { status_code, .. })
                if status_code == 404 =>
            {
                Ok(None)
            }
            Err(e) => Err(Error::from(e)),
        }
    }
}

fn to_inspect(inspect: bollard::models::ContainerInspectResponse) -> Result<ContainerInspect> {
    let state = inspect.state.unwrap_or_default();
    let config = inspect.config.unwrap_or_default();
    let host_config = inspect.host_config.unwrap_or_default();

    let created_at = inspect
        .created
        .as_deref()
        .and_then(parse_rfc3339)
        .unwrap_or_else(Utc::now);
    let started_at = state.started_at.as_deref().and_then(parse_rfc3339);

    let mounts = inspect
        .mounts
        .unwrap_or_default()
        .into_iter()
        .map(|m| MountSpec {
            host_path: m.source.unwrap_or_default(),
            container_path: m.destination.unwrap_or_default(),
            read_only: !m.rw.unwrap_or(true),
        })
        .collect();

    let device_requests = host_config
        .device_requests
        .unwrap_or_default()
        .into_iter()
        .map(|d| GpuDeviceRequest {
            count: d.count,
            driver: d.driver,
            device_ids: d.device_ids.unwrap_or_default(),
            capabilities: d.capabilities.unwrap_or_default(),
            options: d.options.unwrap_or_default(),
        })
        .collect();

    let devices = host_config
        .devices
        .unwrap_or_default()
        .into_iter()
        .filter_map(|d| d.path_on_host)
        .collect();

    Ok(ContainerInspect {
        id: inspect.id.unwrap_or_default(),
        image: config.image.unwrap_or_default(),
        image_digest: inspect.image.clone(),
        running: state.running.unwrap_or(false),
        paused: state.paused.unwrap_or(false),
        status: state.status.map(|s| s.to_string()).unwrap_or_default(),
        created_at,
        started_at,
        labels: config.labels.unwrap_or_default(),
        env: config.env.unwrap_or_default(),
        mounts,
        device_requests,
        devices,
        shm_size_bytes: host_config.shm_size,
        cap_add: host_config.cap_add.unwrap_or_default(),
    })
}

fn parse_rfc3339(value: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}
