//! alphabench - Main entry point
//!
//! Offline experiments comparing forward-return prediction models.

use clap::Parser;

use alphabench::cli::{cmd_all, cmd_classification, cmd_regression, cmd_sequential, Cli, Commands};

fn main() -> anyhow::Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "alphabench=info".into()),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Regression { common } => cmd_regression(&common)?,
        Commands::Classification {
            common,
            label_index,
            production,
        } => cmd_classification(&common, label_index, production)?,
        Commands::Sequential { common } => cmd_sequential(&common)?,
        Commands::All { common } => cmd_all(&common)?,
    }

    Ok(())
}
