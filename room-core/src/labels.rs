//! Typed view over the flat `m1k1o.neko_rooms`-style label namespace
//! container runtimes expose. The rest of the crate works with
//! [`RoomLabels`]; only this module and the room manager's create/decode
//! paths touch the raw `HashMap<String, String>` Docker hands back.
//!
//! Grounded on the reference `internal/room/labels.go`, generalized to
//! the richer label set in the specification's §6 table (api_version,
//! mux, browser_policy, x-* user labels, proxy.*).

use std::collections::HashMap;

use crate::error::{Error, Result};
use crate::model::EprRange;

pub const NAMESPACE: &str = "m1k1o.neko_rooms";

pub fn key(suffix: &str) -> String {
    format!("{NAMESPACE}.{suffix}")
}

/// Port allocation as stored in labels: either a disjoint `epr.min`/
/// `epr.max` pair, or a single `mux` port reused for UDP and TCP.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PortLabels {
    Epr(EprRange),
    Mux(u16),
}

impl PortLabels {
    pub fn as_epr_range(&self) -> EprRange {
        match self {
            PortLabels::Epr(r) => *r,
            PortLabels::Mux(p) => EprRange::new(*p, *p),
        }
    }
}

#[derive(Debug, Clone)]
pub struct RoomLabels {
    pub instance: String,
    pub name: String,
    pub url: String,
    pub neko_image: String,
    pub api_version: u8,
    pub ports: PortLabels,
    pub browser_policy_path: Option<String>,
    pub proxy_enabled: bool,
    pub proxy_path: Option<String>,
    pub proxy_port: Option<String>,
    pub user_labels: HashMap<String, String>,
}

impl RoomLabels {
    pub fn serialize(&self) -> HashMap<String, String> {
        let mut out = HashMap::new();
        out.insert(key("instance"), self.instance.clone());
        out.insert(key("name"), self.name.clone());
        out.insert(key("url"), self.url.clone());
        out.insert(key("neko_image"), self.neko_image.clone());

        if self.api_version != 2 {
            out.insert(key("api_version"), self.api_version.to_string());
        }

        match self.ports {
            PortLabels::Epr(range) => {
                out.insert(key("epr.min"), range.min.to_string());
                out.insert(key("epr.max"), range.max.to_string());
            }
            PortLabels::Mux(port) => {
                out.insert(key("mux"), port.to_string());
            }
        }

        if let Some(path) = &self.browser_policy_path {
            out.insert(key("browser_policy"), "true".to_string());
            out.insert(key("browser_policy.path"), path.clone());
        }

        if self.proxy_enabled {
            out.insert(key("proxy.enabled"), "true".to_string());
            if let Some(path) = &self.proxy_path {
                out.insert(key("proxy.path"), path.clone());
            }
            if let Some(port) = &self.proxy_port {
                out.insert(key("proxy.port"), port.clone());
            }
        }

        for (k, v) in &self.user_labels {
            out.insert(key(&format!("x-{k}")), v.clone());
        }

        out
    }

    pub fn extract(labels: &HashMap<String, String>) -> Result<Self> {
        let get = |suffix: &str| -> Result<String> {
            labels
                .get(&key(suffix))
                .cloned()
                .ok_or_else(|| Error::damaged_labels(suffix))
        };

        let name = get("name")?;
        let url = get("url")?;
        let neko_image = get("neko_image")?;
        let instance = get("instance")?;

        let api_version = match labels.get(&key("api_version")) {
            Some(v) => v
                .parse()
                .map_err(|_| Error::damaged_labels("api_version"))?,
            None => 2,
        };

        let ports = if let Some(mux) = labels.get(&key("mux")) {
            let port: u16 = mux.parse().map_err(|_| Error::damaged_labels("mux"))?;
            PortLabels::Mux(port)
        } else {
            let min: u16 = get("epr.min")?
                .parse()
                .map_err(|_| Error::damaged_labels("epr.min"))?;
            let max: u16 = get("epr.max")?
                .parse()
                .map_err(|_| Error::damaged_labels("epr.max"))?;
            PortLabels::Epr(EprRange::new(min, max))
        };

        let browser_policy_path = labels.get(&key("browser_policy.path")).cloned();

        let proxy_enabled = labels
            .get(&key("proxy.enabled"))
            .map(|v| v == "true")
            .unwrap_or(false);
        let proxy_path = labels.get(&key("proxy.path")).cloned();
        let proxy_port = labels.get(&key("proxy.port")).cloned();

        let prefix = format!("{NAMESPACE}.x-");
        let user_labels = labels
            .iter()
            .filter_map(|(k, v)| {
                k.strip_prefix(&prefix)
                    .map(|stripped| (stripped.to_string(), v.clone()))
            })
            .collect();

        Ok(Self {
            instance,
            name,
            url,
            neko_image,
            api_version,
            ports,
            browser_policy_path,
            proxy_enabled,
            proxy_path,
            proxy_port,
            user_labels,
        })
    }
}

/// `true` when `labels` carries the reverse-proxy routing hints and a
/// path; mirrors `ProxyManagerCtx.parseLabels`.
pub fn parse_proxy_hints(labels: &HashMap<String, String>) -> Option<(bool, String, String)> {
    let enabled = labels.get(&key("proxy.enabled"))?.parse::<bool>().ok()?;
    let path = labels.get(&key("proxy.path"))?.clone();
    let port = labels.get(&key("proxy.port"))?.clone();
    Some((enabled, path, port))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> RoomLabels {
        RoomLabels {
            instance: "neko-rooms".into(),
            name: "room-a".into(),
            url: "/room-a".into(),
            neko_image: "m1k1o/neko:chromium".into(),
            api_version: 2,
            ports: PortLabels::Epr(EprRange::new(59000, 59002)),
            browser_policy_path: None,
            proxy_enabled: true,
            proxy_path: Some("/room-a".into()),
            proxy_port: Some("8080".into()),
            user_labels: HashMap::new(),
        }
    }

    #[test]
    fn round_trips_through_flat_map() {
        let labels = sample();
        let flat = labels.serialize();
        let decoded = RoomLabels::extract(&flat).unwrap();
        assert_eq!(decoded.name, labels.name);
        assert_eq!(decoded.ports.as_epr_range(), labels.ports.as_epr_range());
    }

    #[test]
    fn missing_required_label_is_damaged() {
        let mut flat = sample().serialize();
        flat.remove(&key("epr.min"));
        let err = RoomLabels::extract(&flat).unwrap_err();
        assert!(err.message.contains("epr.min"));
    }
}
