use super::utils::{GlobalOptions, open_session};
use anyhow::Result;
use colored::Colorize;
use kako_core::catalog::ModelOption;
use kako_infrastructure::init_logging;

pub async fn run(options: &GlobalOptions) -> Result<()> {
    let config = options.load_config()?;
    init_logging(&config.log_level, None)?;

    let sync = open_session(options, &config, None)?;
    let result = sync.refresh_models().await;
    if result.is_ok() {
        let engine = sync.read().await;
        print_models(&engine.store().model_options(), engine.store().selected_model());
    }
    sync.shutdown();
    result?;
    Ok(())
}

pub fn print_models(models: &[ModelOption], selected: &str) {
    if models.is_empty() {
        println!("{}", "No models available".bright_black());
        return;
    }

    for model in models {
        let marker = if model.id == selected { "*" } else { " " };
        let default = if model.is_default { " (default)" } else { "" };
        println!(
            "{} {} {}{}",
            marker.bright_green(),
            model.id.bold(),
            format!("[{}]", model.provider).bright_black(),
            default.bright_black()
        );
    }
}
