//! runcheck CLI entry point.

use clap::Parser;

use runcheck::cli::{Cli, Commands};
use runcheck::infrastructure::config::ConfigLoader;
use runcheck::infrastructure::logging::{LogConfig, LoggerImpl};

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let config = match ConfigLoader::load() {
        Ok(config) => config,
        Err(err) => runcheck::cli::handle_error(err.into(), cli.json),
    };
    let _logger = match LogConfig::try_from(&config.logging)
        .map_err(anyhow::Error::from)
        .and_then(|log_config| LoggerImpl::init(&log_config))
    {
        Ok(logger) => logger,
        Err(err) => runcheck::cli::handle_error(err, cli.json),
    };

    let result = match cli.command {
        Commands::Run(args) => runcheck::cli::commands::run::execute(args, &config, cli.json).await,
        Commands::Abort(args) => runcheck::cli::commands::abort::execute(args, &config, cli.json).await,
        Commands::Summary(args) => runcheck::cli::commands::summary::execute(args, cli.json).await,
    };

    if let Err(err) = result {
        runcheck::cli::handle_error(err, cli.json);
    }
}
