use anyhow::{Context, Result};
use colored::Colorize;
use kako_application::SessionSync;
use kako_core::auth::TokenProvider;
use kako_core::config::ClientConfig;
use kako_core::store::SessionStore;
use kako_core::task::{TaskNotifier, TaskRecord};
use kako_infrastructure::{
    ConfigService, Diagnostic, HttpBackend, SecretFileTokenProvider, StaticTokenProvider,
};
use std::path::PathBuf;
use std::sync::Arc;

/// Options shared by every subcommand.
pub struct GlobalOptions {
    pub server: Option<String>,
    pub config: Option<PathBuf>,
    pub token: Option<String>,
}

impl GlobalOptions {
    pub fn config_service(&self) -> ConfigService {
        match &self.config {
            Some(path) => ConfigService::with_path(path),
            None => ConfigService::new(),
        }
    }

    /// Loads the config file and applies command-line overrides.
    pub fn load_config(&self) -> Result<ClientConfig> {
        let mut config = self.config_service().load()?;
        if let Some(server) = &self.server {
            config.server_url = server.clone();
        }
        Ok(config)
    }

    /// `--token` wins; otherwise the token is read from the secret file on
    /// every handshake so a refreshed token is picked up on reconnect.
    pub fn token_provider(&self) -> Arc<dyn TokenProvider> {
        if let Some(token) = &self.token {
            return Arc::new(StaticTokenProvider::new(Some(token.clone())));
        }
        match SecretFileTokenProvider::default_location() {
            Some(provider) => Arc::new(provider),
            None => Arc::new(StaticTokenProvider::new(None)),
        }
    }
}

/// Builds a session for `config`. Nothing connects until `start`.
pub fn open_session(
    options: &GlobalOptions,
    config: &ClientConfig,
    notifier: Option<Arc<dyn TaskNotifier>>,
) -> Result<SessionSync> {
    let tokens = options.token_provider();
    let backend = HttpBackend::new(&config.server_url, tokens.clone(), config.connect_timeout())
        .with_context(|| format!("invalid server URL '{}'", config.server_url))?;

    let mut store = SessionStore::new();
    store.set_notifier(notifier);

    Ok(SessionSync::from_config(
        config,
        tokens,
        Arc::new(backend),
        store,
    ))
}

/// Announces finished tasks on the terminal, with a bell.
pub struct TerminalNotifier;

impl TaskNotifier for TerminalNotifier {
    fn notify_terminal(&self, task: &TaskRecord) -> Result<(), String> {
        println!(
            "\x07{}",
            format!("Task #{} {}: {}", task.id, task.status, task.title).bright_green()
        );
        Ok(())
    }
}

pub fn print_diagnostic(diagnostic: &Diagnostic) {
    let component = diagnostic
        .component
        .as_deref()
        .map(|c| format!("[{}] ", c))
        .unwrap_or_default();
    let line = format!("{}{}", component, diagnostic.message);

    if diagnostic.level == "ERROR" {
        eprintln!("{}", line.red());
    } else {
        eprintln!("{}", line.yellow());
    }
}
