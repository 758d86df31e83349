//! `tracing` init: `EnvFilter` from `RUST_LOG`, defaulting to `info`
//! for this crate and its library, `warn` for everything else.

pub fn init() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "roomd=info,room_core=info,tower_http=info,warn".into());

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .init();
}
