//! Versioned environment-variable dialects. Each image generation
//! expects a different set of `NEKO_*`-style variables; an
//! [`EnvCodec`] encodes a [`RoomSpec`] into that image's env list and
//! decodes it back, so the room manager never special-cases the API
//! version outside this module.

mod v2;
mod v3;

use std::collections::HashMap;

use crate::error::Result;
use crate::model::{ApiVersion, Capture, RoomSpec};

/// Frontend/media ports resolved for this room, passed to the codec
/// separately from the rest of the spec because they come from the
/// port allocator, not from user input.
#[derive(Debug, Clone, Copy)]
pub struct PortSettings {
    pub frontend_port: u16,
    pub epr_min: u16,
    pub epr_max: u16,
    pub mux: bool,
}

pub trait EnvCodec {
    fn encode(&self, spec: &RoomSpec, ports: PortSettings) -> Vec<String>;
    fn decode(&self, envs: &[String]) -> Result<RoomSpecEnvFields>;
}

/// Subset of [`RoomSpec`] reconstructable purely from a decoded env
/// list (passwords, capture settings, extra envs) — the room manager
/// merges this back with labels-derived fields (name, image, ports).
#[derive(Debug, Clone, Default)]
pub struct RoomSpecEnvFields {
    pub user_password: String,
    pub admin_password: String,
    pub capture: Capture,
    pub control_protection: bool,
    pub implicit_control: bool,
    pub nat1to1: Vec<String>,
    pub extra_env: HashMap<String, String>,
}

pub fn codec_for(version: ApiVersion) -> Box<dyn EnvCodec> {
    match version {
        ApiVersion::V2 => Box::new(v2::V2Codec),
        ApiVersion::V3 => Box::new(v3::V3Codec),
    }
}

pub(crate) fn split_env(env: &str) -> Option<(&str, &str)> {
    env.split_once('=')
}

/// Parses the `"WIDTHxHEIGHT@RATE"` screen string shared by both dialects.
pub(crate) fn parse_screen(capture: &mut Capture, screen: &str) {
    if let Some((wh, rate)) = screen.split_once('@') {
        capture.screen_rate = rate.parse().unwrap_or(0);
        if let Some((w, h)) = wh.split_once('x') {
            capture.screen_width = w.parse().unwrap_or(0);
            capture.screen_height = h.parse().unwrap_or(0);
        }
    }
}
