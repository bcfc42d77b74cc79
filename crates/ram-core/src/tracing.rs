use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Keeps sqlx statement logging out of the default output.
const DEFAULT_DIRECTIVE: &str = "info,sqlx=warn";

/// Install the global subscriber with the default filter.
pub fn init_tracing() {
    init_tracing_with_default(DEFAULT_DIRECTIVE);
}

/// Install a subscriber that writes JSON lines to stderr, leaving stdout to
/// command output. `RUST_LOG` overrides `directive`. Only the first call in a
/// process takes effect.
pub fn init_tracing_with_default(directive: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(directive));
    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().json().with_writer(std::io::stderr))
        .try_init();
}
