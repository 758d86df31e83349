use super::{split_env, EnvCodec, PortSettings, RoomSpecEnvFields};
use crate::error::Result;
use crate::model::{AudioCodec, Capture, RoomSpec, VideoCodec};

const RESERVED: &[&str] = &[
    "DEBIAN_FRONTEND",
    "PULSE_SERVER",
    "XDG_RUNTIME_DIR",
    "DISPLAY",
    "USER",
    "PATH",
    "NEKO_PLUGINS_ENABLED",
    "NEKO_PLUGINS_DIR",
    "NEKO_SERVER_BIND",
    "NEKO_SERVER_PROXY",
    "NEKO_WEBRTC_ICELITE",
    "NEKO_MEMBER_PROVIDER",
    "NEKO_MEMBER_MULTIUSER_USER_PASSWORD",
    "NEKO_MEMBER_MULTIUSER_ADMIN_PASSWORD",
    "NEKO_SESSION_API_TOKEN",
    "NEKO_DESKTOP_SCREEN",
    "NEKO_WEBRTC_EPR",
    "NEKO_WEBRTC_UDPMUX",
    "NEKO_WEBRTC_TCPMUX",
    "NEKO_WEBRTC_NAT1TO1",
    "NEKO_SESSION_CONTROL_PROTECTION",
    "NEKO_SESSION_IMPLICIT_HOSTING",
    "NEKO_CAPTURE_VIDEO_CODEC",
    "NEKO_CAPTURE_VIDEO_PIPELINE",
    "NEKO_CAPTURE_AUDIO_CODEC",
    "NEKO_CAPTURE_AUDIO_PIPELINE",
    "NEKO_CAPTURE_BROADCAST_PIPELINE",
];

pub struct V3Codec;

impl EnvCodec for V3Codec {
    fn encode(&self, spec: &RoomSpec, ports: PortSettings) -> Vec<String> {
        let mut env = vec![
            format!("NEKO_SERVER_BIND=:{}", ports.frontend_port),
            "NEKO_SERVER_PROXY=true".to_string(),
            "NEKO_WEBRTC_ICELITE=true".to_string(),
            "NEKO_MEMBER_PROVIDER=multiuser".to_string(),
            format!("NEKO_MEMBER_MULTIUSER_USER_PASSWORD={}", spec.user_password),
            format!("NEKO_MEMBER_MULTIUSER_ADMIN_PASSWORD={}", spec.admin_password),
            format!("NEKO_DESKTOP_SCREEN={}", spec.capture.screen()),
        ];

        if ports.mux {
            env.push(format!("NEKO_WEBRTC_UDPMUX={}", ports.epr_min));
            env.push(format!("NEKO_WEBRTC_TCPMUX={}", ports.epr_min));
        } else {
            env.push(format!("NEKO_WEBRTC_EPR={}-{}", ports.epr_min, ports.epr_max));
        }

        if !spec.nat1to1.is_empty() {
            env.push(format!("NEKO_WEBRTC_NAT1TO1={}", spec.nat1to1.join(",")));
        }

        if spec.control_protection {
            env.push("NEKO_SESSION_CONTROL_PROTECTION=true".to_string());
        }
        // Implicit hosting defaults to true; only emit when disabled.
        if !spec.implicit_control {
            env.push("NEKO_SESSION_IMPLICIT_HOSTING=false".to_string());
        }

        if spec.capture.video_codec != VideoCodec::Vp8 {
            env.push(format!(
                "NEKO_CAPTURE_VIDEO_CODEC={}",
                spec.capture.video_codec.to_string().to_lowercase()
            ));
        }
        if let Some(pipeline) = &spec.capture.video_pipeline {
            env.push(format!("NEKO_CAPTURE_VIDEO_PIPELINE={pipeline}"));
        }
        if spec.capture.audio_codec != AudioCodec::Opus {
            env.push(format!(
                "NEKO_CAPTURE_AUDIO_CODEC={}",
                spec.capture.audio_codec.to_string().to_lowercase()
            ));
        }
        if let Some(pipeline) = &spec.capture.audio_pipeline {
            env.push(format!("NEKO_CAPTURE_AUDIO_PIPELINE={pipeline}"));
        }
        if let Some(pipeline) = &spec.capture.broadcast_pipeline {
            env.push(format!("NEKO_CAPTURE_BROADCAST_PIPELINE={pipeline}"));
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
            implicit_control: true,
            ..Default::default()
        };

        for env in envs {
            let Some((key, val)) = split_env(env) else {
                continue;
            };

            match key {
                "NEKO_MEMBER_MULTIUSER_USER_PASSWORD" => fields.user_password = val.to_string(),
                "NEKO_MEMBER_MULTIUSER_ADMIN_PASSWORD" => fields.admin_password = val.to_string(),
                "NEKO_SESSION_CONTROL_PROTECTION" => {
                    fields.control_protection = val.parse().unwrap_or(false)
                }
                "NEKO_SESSION_IMPLICIT_HOSTING" => {
                    fields.implicit_control = val.parse().unwrap_or(true)
                }
                "NEKO_DESKTOP_SCREEN" => super::parse_screen(&mut fields.capture, val),
                "NEKO_WEBRTC_NAT1TO1" => {
                    fields.nat1to1 = val.split(',').map(str::to_string).collect()
                }
                "NEKO_CAPTURE_VIDEO_CODEC" => {
                    fields.capture.video_codec = val.to_uppercase().parse().unwrap_or_default()
                }
                "NEKO_CAPTURE_VIDEO_PIPELINE" => fields.capture.video_pipeline = Some(val.to_string()),
                "NEKO_CAPTURE_AUDIO_CODEC" => {
                    fields.capture.audio_codec = val.to_uppercase().parse().unwrap_or_default()
                }
                "NEKO_CAPTURE_AUDIO_PIPELINE" => fields.capture.audio_pipeline = Some(val.to_string()),
                "NEKO_CAPTURE_BROADCAST_PIPELINE" => {
                    fields.capture.broadcast_pipeline = Some(val.to_string())
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

    #[test]
    fn implicit_hosting_defaults_true_when_absent() {
        let decoded = V3Codec.decode(&[]).unwrap();
        assert!(decoded.implicit_control);
    }

    #[test]
    fn encode_omits_implicit_hosting_when_enabled() {
        let mut spec = RoomSpec::default();
        spec.implicit_control = true;
        let env = V3Codec.encode(
            &spec,
            PortSettings {
                frontend_port: 8080,
                epr_min: 59000,
                epr_max: 59000,
                mux: true,
            },
        );
        assert!(!env.iter().any(|e| e.starts_with("NEKO_SESSION_IMPLICIT_HOSTING")));
        assert!(env.contains(&"NEKO_WEBRTC_UDPMUX=59000".to_string()));
        assert!(env.contains(&"NEKO_WEBRTC_TCPMUX=59000".to_string()));
    }
}
