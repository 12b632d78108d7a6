use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Installs the stderr subscriber. An explicit filter wins over `RUST_LOG`;
/// an unparsable one falls back to `info`.
pub fn init_tracing(log_level: Option<&str>) {
    let env_filter = build_filter(log_level);

    let stderr_layer = fmt::layer().with_target(true).with_writer(std::io::stderr);

    tracing_subscriber::registry()
        .with(env_filter)
        .with(stderr_layer)
        .init();
}

fn build_filter(log_level: Option<&str>) -> EnvFilter {
    match log_level {
        Some(level) => EnvFilter::try_new(level).unwrap_or_else(|_| EnvFilter::new("info")),
        None => EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn explicit_filter_is_used() {
        assert_eq!(build_filter(Some("word_alignment=debug")).to_string(), "word_alignment=debug");
    }
}
