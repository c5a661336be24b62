use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Initializes the global tracing subscriber: an `EnvFilter` (default `info`
/// for this workspace's crates, `warn` for dependencies) layered with the
/// standard `fmt` layer. Call once at binary startup.
pub fn init() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "orbit_server=info,orbit_core=info,orbit_github=info,orbit_actions=info,tower_http=warn".into());

    tracing_subscriber::registry().with(filter).with(tracing_subscriber::fmt::layer()).init();
}
