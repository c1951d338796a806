//! Chatpane - terminal chat client
//!
#![doc = "Chatpane - terminal chat client"]
#![doc = "Main entry point for the Chatpane application."]

use anyhow::Result;

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use chatpane::cli::{Cli, Commands};
use chatpane::commands;
use chatpane::config::Config;

#[tokio::main]
async fn main() -> Result<()> {
    // Parse command line arguments
    let cli = Cli::parse_args();

    // Initialize tracing
    init_tracing(cli.verbose);

    // Load configuration
    let config_path = cli.config.as_deref().unwrap_or("config/config.yaml");
    let config = Config::load(config_path, &cli)?;

    // Validate configuration
    config.validate()?;

    // Execute command
    match cli.command {
        Commands::Chat { resume, .. } => {
            if let Some(r) = &resume {
                tracing::debug!("Resuming chat: {}", r);
            }
            commands::chat::run_chat(config, resume).await?;
            Ok(())
        }
        Commands::History { command } => {
            tracing::info!("Starting history command");
            commands::history::handle_history(&config, command)?;
            Ok(())
        }
        Commands::Export { output } => {
            commands::transfer::run_export(&config, output)?;
            Ok(())
        }
        Commands::Import { file } => {
            commands::transfer::run_import(&config, &file)?;
            Ok(())
        }
        Commands::Settings {
            api_key,
            hf_api_key,
            theme,
        } => {
            commands::settings::run_settings(&config, api_key, hf_api_key, theme).await?;
            Ok(())
        }
        Commands::Render { user, html } => {
            commands::render::run_render(user, html)?;
            Ok(())
        }
    }
}

/// Initialize tracing subscriber with environment filter
///
/// Logs go to stderr so command output on stdout stays clean.
fn init_tracing(verbose: bool) {
    let default_level = if verbose {
        "chatpane=debug"
    } else {
        "chatpane=info"
    };
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}
