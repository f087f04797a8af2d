use tracing_subscriber::filter::{EnvFilter, LevelFilter};

#[derive(clap::Args, Debug, Clone)]
#[group()]
pub struct LoggingArgs {
    /// Enable debug mode.
    #[arg(long, global = true, default_value_t = false)]
    pub debug: bool,
}

impl LoggingArgs {
    pub fn init(&self) {
        init_logging(self.debug);
    }
}

/// Filter from `directives`, defaulting to `debug` or `info` for anything they do not cover.
fn build_filter(debug_mode: bool, directives: Option<&str>) -> EnvFilter {
    let level = if debug_mode {
        LevelFilter::DEBUG
    } else {
        LevelFilter::INFO
    };
    EnvFilter::builder()
        .with_default_directive(level.into())
        .parse_lossy(directives.unwrap_or_default())
}

/// `RUST_LOG` wins over `--debug`.
pub fn env_filter(debug_mode: bool) -> EnvFilter {
    let directives = std::env::var(EnvFilter::DEFAULT_ENV).ok();
    build_filter(debug_mode, directives.as_deref())
}

pub fn init_logging(debug_mode: bool) {
    tracing_subscriber::fmt()
        .with_env_filter(env_filter(debug_mode))
        .with_writer(std::io::stderr)
        .with_target(debug_mode)
        .init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_level() {
        assert!(build_filter(false, None).to_string().contains("info"));
        assert!(build_filter(true, None).to_string().contains("debug"));
    }

    #[test]
    fn test_directives_kept() {
        let filter = build_filter(false, Some("apt_repository=trace"));
        assert!(filter.to_string().contains("apt_repository=trace"));
    }
}
