//! Global tracing subscriber setup.

use crate::diagnostics::{Diagnostic, DiagnosticsLayer};
use kako_core::{KakoError, Result};
use tokio::sync::mpsc;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::{EnvFilter, Registry, fmt};

/// Installs the global subscriber.
///
/// `RUST_LOG` wins over `default_filter` (the configured `log_level`). Logs go
/// to stderr. When `diagnostics` is given, `kako` warnings are forwarded there
/// instead, so an interactive front end can show them between its own output.
pub fn init_logging(
    default_filter: &str,
    diagnostics: Option<mpsc::UnboundedSender<Diagnostic>>,
) -> Result<()> {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));

    let formatting_layer = diagnostics.is_none().then(|| {
        fmt::layer()
            .with_target(false)
            .with_writer(std::io::stderr)
    });

    let subscriber = Registry::default()
        .with(env_filter)
        .with(formatting_layer)
        .with(diagnostics.map(DiagnosticsLayer::new));

    tracing::subscriber::set_global_default(subscriber)
        .map_err(|e| KakoError::internal(format!("failed to install tracing subscriber: {}", e)))
}
