//! Tracing subscriber initialization (`EnvFilter` + `fmt` layer),
//! parameterized per binary so every service configures logging the same way.

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::config::LoggingConfig;

pub fn init(service: &str, config: &LoggingConfig) {
    let default_filter = format!("{service}={level},tower_http=info", level = config.level);
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| default_filter.into());

    let registry = tracing_subscriber::registry().with(filter);

    if config.format == "json" {
        registry.with(tracing_subscriber::fmt::layer().json()).init();
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }
}
