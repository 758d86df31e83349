//! GPU resource-spec parsing, modeled on Docker's `--gpus` CSV grammar.
//! Each `RoomSpec.resources.gpus` entry is a line of `key=value` pairs
//! joined by commas; this module turns those lines into device
//! requests the Host can hand to the container runtime, and can invert
//! a device request list back into a spec during `GetSettings`.

use crate::error::{Error, Result};

/// The `gpu` capability string device requests carry so `GetSettings`
/// can recognize which device requests came from a GPU spec line.
pub const GPU_CAPABILITY: &str = "gpu";

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GpuRequest {
    pub count: Option<i64>,
    pub driver: Option<String>,
    pub device_ids: Vec<String>,
    pub capabilities: Vec<String>,
    pub options: Vec<(String, String)>,
}

/// Parses one CSV line such as `count=all,capabilities=compute,utility`
/// or `device=0,1,driver=nvidia` into a [`GpuRequest`].
pub fn parse_spec(line: &str) -> Result<GpuRequest> {
    let mut req = GpuRequest {
        capabilities: vec![GPU_CAPABILITY.to_string()],
        ..Default::default()
    };

    for field in line.split(',') {
        let field = field.trim();
        if field.is_empty() {
            continue;
        }
        let Some((key, value)) = field.split_once('=') else {
            return Err(Error::invalid_input(format!(
                "malformed gpu spec field: {field}"
            )));
        };

        match key {
            "count" => {
                req.count = if value == "all" {
                    None
                } else {
                    Some(
                        value
                            .parse()
                            .map_err(|_| Error::invalid_input(format!("bad gpu count: {value}")))?,
                    )
                };
            }
            "driver" => req.driver = Some(value.to_string()),
            "device" => req.device_ids = value.split(';').map(str::to_string).collect(),
            "capabilities" => {
                req.capabilities = value.split(';').map(str::to_string).collect();
                if !req.capabilities.iter().any(|c| c == GPU_CAPABILITY) {
                    req.capabilities.push(GPU_CAPABILITY.to_string());
                }
            }
            "options" => {
                for opt in value.split(';') {
                    if let Some((k, v)) = opt.split_once('=') {
                        req.options.push((k.to_string(), v.to_string()));
                    }
                }
            }
            other => {
                return Err(Error::invalid_input(format!(
                    "unknown gpu spec key: {other}"
                )))
            }
        }
    }

    Ok(req)
}

/// A host device node mapping, allowing full read/write/mknod access
/// to the container (`rwm`) — the permission set Docker grants device
/// mounts by default.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceMapping {
    pub path_on_host: String,
    pub path_in_container: String,
    pub cgroup_permissions: String,
}

pub fn device_mapping(path: &str) -> DeviceMapping {
    DeviceMapping {
        path_on_host: path.to_string(),
        path_in_container: path.to_string(),
        cgroup_permissions: "rwm".to_string(),
    }
}

/// `true` when a device request's capability list marks it as GPU-origin,
/// used by `GetSettings` to separate GPU requests from other device
/// requests when decoding a container back into a `RoomSpec`.
pub fn is_gpu_capability_set(capabilities: &[String]) -> bool {
    capabilities.iter().any(|c| c == GPU_CAPABILITY)
}

/// Inverts a GPU device request into the CSV line `parse_spec` accepts,
/// the direction `GetSettings` needs to show a caller back the spec
/// that produced a running container's device requests.
pub fn spec_from_request(
    count: Option<i64>,
    driver: Option<&str>,
    device_ids: &[String],
    capabilities: &[String],
) -> String {
    let mut parts = vec![match count {
        Some(n) => format!("count={n}"),
        None => "count=all".to_string(),
    }];

    if let Some(driver) = driver {
        parts.push(format!("driver={driver}"));
    }
    if !device_ids.is_empty() {
        parts.push(format!("device={}", device_ids.join(";")));
    }

    let extra: Vec<&str> = capabilities
        .iter()
        .map(String::as_str)
        .filter(|c| *c != GPU_CAPABILITY)
        .collect();
    if !extra.is_empty() {
        let mut caps = extra;
        caps.push(GPU_CAPABILITY);
        parts.push(format!("capabilities={}", caps.join(";")));
    }

    parts.join(",")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_count_all() {
        let req = parse_spec("count=all,capabilities=compute;utility").unwrap();
        assert_eq!(req.count, None);
        assert_eq!(req.capabilities, vec!["compute", "utility"]);
    }

    #[test]
    fn parses_explicit_device_ids() {
        let req = parse_spec("device=0;1,driver=nvidia").unwrap();
        assert_eq!(req.device_ids, vec!["0", "1"]);
        assert_eq!(req.driver.as_deref(), Some("nvidia"));
        assert!(is_gpu_capability_set(&req.capabilities));
    }

    #[test]
    fn rejects_unknown_key() {
        let err = parse_spec("bogus=1").unwrap_err();
        assert_eq!(err.kind, crate::error::ErrorKind::InvalidInput);
    }

    #[test]
    fn default_capability_includes_gpu() {
        let req = parse_spec("count=1").unwrap();
        assert!(is_gpu_capability_set(&req.capabilities));
    }

    #[test]
    fn spec_from_request_round_trips_device_and_driver() {
        let req = parse_spec("device=0;1,driver=nvidia").unwrap();
        let line = spec_from_request(req.count, req.driver.as_deref(), &req.device_ids, &req.capabilities);
        let reparsed = parse_spec(&line).unwrap();
        assert_eq!(reparsed.device_ids, req.device_ids);
        assert_eq!(reparsed.driver, req.driver);
    }
}
