use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

/// Filter used when `RUST_LOG` is not set.
pub const DEFAULT_FILTER: &str = "info";

/// Local `tracing` subscriber for the `sipay` binary.
///
/// Logs go to stderr so that stdout carries only the JSON result.
#[derive(Debug, Clone)]
pub struct Telemetry {
    name: &'static str,
    version: &'static str,
    default_filter: String,
}

impl Default for Telemetry {
    fn default() -> Self {
        Self::new()
    }
}

impl Telemetry {
    pub fn new() -> Self {
        Self {
            name: env!("CARGO_PKG_NAME"),
            version: env!("CARGO_PKG_VERSION"),
            default_filter: DEFAULT_FILTER.to_string(),
        }
    }

    pub fn with_name(mut self, name: &'static str) -> Self {
        self.name = name;
        self
    }

    pub fn with_version(mut self, version: &'static str) -> Self {
        self.version = version;
        self
    }

    pub fn with_default_filter(mut self, filter: impl Into<String>) -> Self {
        self.default_filter = filter.into();
        self
    }

    fn env_filter(&self) -> EnvFilter {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&self.default_filter))
    }

    /// Installs the global subscriber. A second call leaves the first one in place.
    pub fn register(self) -> Self {
        let installed = tracing_subscriber::registry()
            .with(self.env_filter())
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
            .try_init();
        match installed {
            Ok(()) => tracing::debug!(
                name = self.name,
                version = self.version,
                "Telemetry initialized"
            ),
            Err(err) => eprintln!("Telemetry already initialized: {err}"),
        }
        self
    }
}
