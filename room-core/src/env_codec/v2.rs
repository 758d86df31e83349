use super::{split_env, EnvCodec, PortSettings, RoomSpecEnvFields};
use crate::error::Result;
use crate::model::{AudioCodec, Capture, RoomSpec, VideoCodec};

/// Reserved names filtered from user-supplied envs and never echoed
/// back on decode, per the v2 env dialect in §6.
const RESERVED: &[&str] = &[
    "DEBIAN_FRONTEND",
    "PULSE_SERVER",
    "XDG_RUNTIME_DIR",
    "DISPLAY",
    "USER",
    "PATH",
    "NEKO_PLUGINS_ENABLED",
    "NEKO_PLUGINS_DIR",
    "NEKO_BIND",
    "NEKO_ICELITE",
    "NEKO_PROXY",
    "NEKO_PASSWORD",
    "NEKO_PASSWORD_ADMIN",
    "NEKO_SCREEN",
    "NEKO_MAX_FPS",
    "NEKO_EPR",
    "NEKO_UDPMUX",
    "NEKO_TCPMUX",
    "NEKO_NAT1TO1",
    "NEKO_CONTROL_PROTECTION",
    "NEKO_IMPLICIT_CONTROL",
    "NEKO_VIDEO_CODEC",
    "NEKO_VIDEO_BITRATE",
    "NEKO_VIDEO",
    "NEKO_AUDIO_CODEC",
    "NEKO_AUDIO_BITRATE",
    "NEKO_AUDIO",
    "NEKO_BROADCAST_PIPELINE",
];

pub struct V2Codec;

impl EnvCodec for V2Codec {
    fn encode(&self, spec: &RoomSpec, ports: PortSettings) -> Vec<String> {
        let mut env = vec![
            format!("NEKO_BIND=:{}", ports.frontend_port),
            "NEKO_ICELITE=true".to_string(),
            "NEKO_PROXY=true".to_string(),
            format!("NEKO_PASSWORD={}", spec.user_password),
            format!("NEKO_PASSWORD_ADMIN={}", spec.admin_password),
            format!("NEKO_SCREEN={}", spec.capture.screen()),
            format!("NEKO_MAX_FPS={}", spec.capture.max_fps),
        ];

        if ports.mux {
            env.push(format!("NEKO_UDPMUX={}", ports.epr_min));
            env.push(format!("NEKO_TCPMUX={}", ports.epr_min));
        } else {
            env.push(format!("NEKO_EPR={}-{}", ports.epr_min, ports.epr_max));
        }

        if !spec.nat1to1.is_empty() {
            env.push(format!("NEKO_NAT1TO1={}", spec.nat1to1.join(",")));
        }

        if spec.control_protection {
            env.push("NEKO_CONTROL_PROTECTION=true".to_string());
        }
        if spec.implicit_control {
            env.push("NEKO_IMPLICIT_CONTROL=true".to_string());
        }

        if spec.capture.video_codec != VideoCodec::Vp8 {
            env.push(format!(
                "NEKO_VIDEO_CODEC={}",
                spec.capture.video_codec.to_string().to_lowercase()
            ));
        }
        if let Some(bitrate) = spec.capture.video_bitrate {
            env.push(format!("NEKO_VIDEO_BITRATE={bitrate}"));
        }
        if let Some(pipeline) = &spec.capture.video_pipeline {
            env.push(format!("NEKO_VIDEO={pipeline}"));
        }

        if spec.capture.audio_codec != AudioCodec::Opus {
            env.push(format!(
                "NEKO_AUDIO_CODEC={}",
                spec.capture.audio_codec.to_string().to_lowercase()
            ));
        }
        if let Some(bitrate) = spec.capture.audio_bitrate {
            env.push(format!("NEKO_AUDIO_BITRATE={bitrate}"));
        }
        if let Some(pipeline) = &spec.capture.audio_pipeline {
            env.push(format!("NEKO_AUDIO={pipeline}"));
        }
        if let Some(pipeline) = &spec.capture.broadcast_pipeline {
            env.push(format!("NEKO_BROADCAST_PIPELINE={pipeline}"));
        }

        for (key, val) in &spec.extra_env {
            if !RESERVED.contains(&key.as_str()) {
                env.push(format!("{key}={val}"));
            }
        }

        env
    }

    fn decode(&self, envs: &[String]) -> Result<RoomSpecEnvFields> {
        let mut fields = RoomSpecEnvFields {
            capture: Capture {
                video_codec: VideoCodec::Vp8,
                audio_codec: AudioCodec::Opus,
                ..Default::default()
            },
            ..Default::default()
        };

        for env in envs {
            let Some((key, val)) = split_env(env) else {
                continue;
            };

            match key {
                "NEKO_PASSWORD" => fields.user_password = val.to_string(),
                "NEKO_PASSWORD_ADMIN" => fields.admin_password = val.to_string(),
                "NEKO_CONTROL_PROTECTION" => {
                    fields.control_protection = val.parse().unwrap_or(false)
                }
                "NEKO_IMPLICIT_CONTROL" => {
                    fields.implicit_control = val.parse().unwrap_or(false)
                }
                "NEKO_SCREEN" => super::parse_screen(&mut fields.capture, val),
                "NEKO_MAX_FPS" => fields.capture.max_fps = val.parse().unwrap_or(0),
                "NEKO_BROADCAST_PIPELINE" => fields.capture.broadcast_pipeline = Some(val.to_string()),
                "NEKO_VIDEO_CODEC" => {
                    fields.capture.video_codec = val.to_uppercase().parse().unwrap_or_default()
                }
                "NEKO_VIDEO_BITRATE" => fields.capture.video_bitrate = val.parse().ok(),
                "NEKO_VIDEO" => fields.capture.video_pipeline = Some(val.to_string()),
                "NEKO_AUDIO_CODEC" => {
                    fields.capture.audio_codec = val.to_uppercase().parse().unwrap_or_default()
                }
                "NEKO_AUDIO_BITRATE" => fields.capture.audio_bitrate = val.parse().ok(),
                "NEKO_AUDIO" => fields.capture.audio_pipeline = Some(val.to_string()),
                "NEKO_NAT1TO1" => {
                    fields.nat1to1 = val.split(',').map(str::to_string).collect()
                }
                _ if !RESERVED.contains(&key) => {
                    fields.extra_env.insert(key.to_string(), val.to_string());
                }
                _ => {}
            }
        }

        Ok(fields)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::RoomSpec;

    #[test]
    fn encode_decode_round_trips_passwords() {
        let mut spec = RoomSpec::default();
        spec.user_password = "user".to_string();
        spec.admin_password = "admin".to_string();
        spec.capture.max_fps = 30;

        let codec = V2Codec;
        let env = codec.encode(
            &spec,
            PortSettings {
                frontend_port: 8080,
                epr_min: 59000,
                epr_max: 59004,
                mux: false,
            },
        );
        assert!(env.contains(&"NEKO_EPR=59000-59004".to_string()));

        let decoded = codec.decode(&env).unwrap();
        assert_eq!(decoded.user_password, "user");
        assert_eq!(decoded.admin_password, "admin");
        assert_eq!(decoded.capture.max_fps, 30);
    }

    #[test]
    fn reserved_names_are_filtered_from_extra_env() {
        let mut spec = RoomSpec::default();
        spec.extra_env.insert("DISPLAY".to_string(), ":1".to_string());
        spec.extra_env.insert("FOO".to_string(), "bar".to_string());

        let env = V2Codec.encode(
            &spec,
            PortSettings {
                frontend_port: 8080,
                epr_min: 59000,
                epr_max: 59004,
                mux: false,
            },
        );
        assert!(!env.iter().any(|e| e.starts_with("DISPLAY=")));
        assert!(env.iter().any(|e| e == "FOO=bar"));
    }
}
