//! Subscriber setup for hosts and tests.

use std::sync::Once;

use tracing_subscriber::EnvFilter;
use tracing_subscriber::util::SubscriberInitExt;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Profile {
    /// Human-readable output at debug level.
    Development,
    /// JSON lines at info level.
    Production,
    /// A silent registry, so spans and events still resolve in tests.
    Test,
}

static INIT_ONCE: Once = Once::new();

/// Installs the global subscriber for `profile`. Only the first call has an
/// effect; `RUST_LOG` overrides the profile's default filter.
pub fn init(profile: Profile) {
    INIT_ONCE.call_once(|| {
        let result = match profile {
            Profile::Development => tracing_subscriber::fmt()
                .with_env_filter(
                    EnvFilter::try_from_default_env()
                        .unwrap_or_else(|_| EnvFilter::new("manos_doc_model=debug")),
                )
                .try_init()
                .map_err(|err| err.to_string()),
            Profile::Production => tracing_subscriber::fmt()
                .json()
                .with_env_filter(
                    EnvFilter::try_from_default_env()
                        .unwrap_or_else(|_| EnvFilter::new("manos_doc_model=info")),
                )
                .try_init()
                .map_err(|err| err.to_string()),
            Profile::Test => tracing_subscriber::registry()
                .try_init()
                .map_err(|err| err.to_string()),
        };
        if let Err(err) = result {
            tracing::warn!(%err, "a global subscriber is already installed");
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn init_is_idempotent() {
        init(Profile::Test);
        init(Profile::Test);
        init(Profile::Development);
    }
}
