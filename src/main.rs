//! TLS front-end - mutual TLS or proxy-forwarded client certificates

use std::process::ExitCode;

use clap::Parser;
use tracing::{error, info};

use tls_frontend::{
    cli::{Cli, Command},
    config::Config,
    frontend::Frontend,
    setup_tracing,
};

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    if let Err(e) = setup_tracing(&cli.log_level, cli.log_format.as_deref()) {
        eprintln!("Failed to setup tracing: {e}");
        return ExitCode::FAILURE;
    }

    let config = match load_config(&cli) {
        Ok(config) => config,
        Err(e) => {
            error!("Failed to load configuration: {e}");
            return ExitCode::FAILURE;
        }
    };

    match cli.command {
        Some(Command::Check) => run_check(&config).await,
        Some(Command::Serve) | None => run_server(&config).await,
    }
}

/// Load the config file and apply CLI overrides
fn load_config(cli: &Cli) -> tls_frontend::Result<Config> {
    let mut config = Config::load(cli.config.as_deref())?;
    if let Some(port) = cli.port {
        config.server.port = Some(port);
    }
    if let Some(ref host) = cli.host {
        config.server.host.clone_from(host);
    }
    Ok(config)
}

/// Validate TLS material and exit
async fn run_check(config: &Config) -> ExitCode {
    match Frontend::new(config) {
        Ok(frontend) => {
            let listener = frontend.listener();
            println!(
                "✅ Listener {} ({}, client auth {})",
                listener.bind_address(),
                if listener.is_tls() { "TLS" } else { "plain HTTP" },
                if listener.require_client_auth { "required" } else { "optional" },
            );
            frontend.shutdown().await;
            ExitCode::SUCCESS
        }
        Err(e) => {
            eprintln!("❌ {e}");
            ExitCode::FAILURE
        }
    }
}

async fn run_server(config: &Config) -> ExitCode {
    info!(
        version = env!("CARGO_PKG_VERSION"),
        tls = config.tls.enabled,
        customizer = ?config.server.customizer,
        "Starting TLS front-end"
    );

    let frontend = match Frontend::new(config) {
        Ok(f) => f,
        Err(e) => {
            error!("Failed to configure listener: {e}");
            return ExitCode::FAILURE;
        }
    };

    if let Err(e) = frontend.run().await {
        error!("Server error: {e}");
        return ExitCode::FAILURE;
    }

    info!("Shutdown complete");
    ExitCode::SUCCESS
}
