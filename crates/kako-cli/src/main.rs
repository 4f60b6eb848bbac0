use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

mod commands;

use commands::utils::GlobalOptions;

#[derive(Parser)]
#[command(name = "kako")]
#[command(about = "Kako - terminal client for the KakoClaw dashboard", long_about = None)]
struct Cli {
    /// Dashboard origin, e.g. https://kako.example.com (overrides the config file)
    #[arg(long, global = true)]
    server: Option<String>,

    /// Config file to use instead of ~/.config/kako/config.toml
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Auth token (overrides the stored secret)
    #[arg(long, global = true)]
    token: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Chat with the agent; task notifications appear inline
    Chat {
        /// Resume an existing chat session
        #[arg(long)]
        session: Option<String>,
    },
    /// Show the task board
    Tasks {
        /// Case-insensitive text matched against title and description
        #[arg(long)]
        search: Option<String>,
        /// Only show tasks with this status
        #[arg(long)]
        status: Option<String>,
        /// Sort order inside each column: recent, oldest, a-z, z-a
        #[arg(long, default_value = "recent")]
        sort: String,
        /// Keep the board open and redraw on every task push
        #[arg(long)]
        watch: bool,
    },
    /// List the models offered by the backend
    Models,
    /// Inspect the client configuration
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Print the effective configuration
    Show,
    /// Print the config file path
    Path,
    /// Write the default configuration if no file exists
    Init,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let options = GlobalOptions {
        server: cli.server,
        config: cli.config,
        token: cli.token,
    };

    match cli.command {
        Commands::Chat { session } => commands::chat::run(&options, session).await?,
        Commands::Tasks {
            search,
            status,
            sort,
            watch,
        } => commands::tasks::run(&options, search, status, &sort, watch).await?,
        Commands::Models => commands::models::run(&options).await?,
        Commands::Config { action } => match action {
            ConfigAction::Show => commands::config::show(&options)?,
            ConfigAction::Path => commands::config::path(&options)?,
            ConfigAction::Init => commands::config::init(&options)?,
        },
    }

    Ok(())
}
