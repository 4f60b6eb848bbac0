use super::utils::GlobalOptions;
use anyhow::{Context, Result, bail};
use colored::Colorize;
use kako_core::config::ClientConfig;

pub fn show(options: &GlobalOptions) -> Result<()> {
    let config = options.load_config()?;
    let rendered = toml::to_string_pretty(&config).context("failed to render configuration")?;
    print!("{}", rendered);
    Ok(())
}

pub fn path(options: &GlobalOptions) -> Result<()> {
    match options.config_service().path() {
        Some(path) => println!("{}", path.display()),
        None => bail!("no home directory; pass --config"),
    }
    Ok(())
}

pub fn init(options: &GlobalOptions) -> Result<()> {
    let service = options.config_service();
    let Some(path) = service.path() else {
        bail!("no home directory; pass --config");
    };

    if path.exists() {
        println!("{}", format!("{} already exists", path.display()).yellow());
        return Ok(());
    }

    service.save(&ClientConfig::default())?;
    println!("{}", format!("Wrote {}", path.display()).green());
    Ok(())
}
