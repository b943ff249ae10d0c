//! # Logging module
//!
//! This module provides logging facilities and helpers

#[cfg(feature = "trace")]
use opentelemetry::trace::TraceError;
use tracing::Level;
use tracing_subscriber::{filter::LevelFilter, prelude::*};

use crate::svc::cfg::Configuration;

// -----------------------------------------------------------------------------
// Error enumeration

#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("failed to set global default subscriber, {0}")]
    GlobalDefaultSubscriber(tracing::subscriber::SetGlobalDefaultError),
    #[cfg(feature = "trace")]
    #[error("failed to install jaeger tracer, {0}")]
    Tracer(TraceError),
}

// -----------------------------------------------------------------------------
// helpers

pub const fn level(verbosity: usize) -> Level {
    match verbosity {
        0 => Level::ERROR,
        1 => Level::WARN,
        2 => Level::INFO,
        3 => Level::DEBUG,
        _ => Level::TRACE,
    }
}

pub fn initialize(config: &Configuration, verbosity: usize) -> Result<(), Error> {
    let fmt = tracing_subscriber::fmt::layer()
        .with_thread_names(true)
        .with_line_number(true)
        .with_thread_ids(true)
        .with_target(true);

    #[cfg(feature = "trace")]
    let telemetry = match &config.jaeger {
        Some(jaeger) => {
            let tracer = opentelemetry_jaeger::new_collector_pipeline()
                .with_endpoint(&jaeger.endpoint)
                .with_service_name(env!("CARGO_PKG_NAME"))
                .with_reqwest()
                .install_batch(opentelemetry::runtime::Tokio)
                .map_err(Error::Tracer)?;

            Some(tracing_opentelemetry::layer().with_tracer(tracer))
        }
        None => None,
    };

    #[cfg(not(feature = "trace"))]
    let _ = config;

    let registry = tracing_subscriber::registry()
        .with(LevelFilter::from_level(level(verbosity)))
        .with(fmt);

    #[cfg(feature = "trace")]
    let registry = registry.with(telemetry);

    tracing::subscriber::set_global_default(registry).map_err(Error::GlobalDefaultSubscriber)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn verbosity_maps_to_level() {
        assert_eq!(level(0), Level::ERROR);
        assert_eq!(level(1), Level::WARN);
        assert_eq!(level(2), Level::INFO);
        assert_eq!(level(3), Level::DEBUG);
        assert_eq!(level(4), Level::TRACE);
        assert_eq!(level(42), Level::TRACE);
    }
}
