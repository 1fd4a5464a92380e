//! Tracing setup

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Install the global tracing subscriber.
///
/// `RUST_LOG` wins when set; otherwise `filter` (or the crate default) is used.
/// Returns false when a subscriber was already installed.
pub fn init_tracing(filter: Option<&str>) -> bool {
    let fallback = filter.unwrap_or("canonical_normalizer=info").to_string();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| fallback.into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .try_init()
        .is_ok()
}
