//! # Dispatch Server - Entry Point
//! src/main.rs
//!
//! Parsea la CLI, inicializa logging y señales, y corre el accept loop hasta
//! recibir SIGINT.

use clap::Parser;
use dispatch_server::config::Config;
use dispatch_server::error::ServerError;
use dispatch_server::server::Server;
use dispatch_server::{logging, signals};
use std::sync::Arc;
use tracing::error;

fn main() {
    let config = Config::parse();

    if let Err(e) = logging::init(&config.log_level) {
        eprintln!("{}", e);
        std::process::exit(e.exit_code());
    }

    if let Err(e) = run(config) {
        error!(error = %e, "error fatal");
        std::process::exit(e.exit_code());
    }
}

fn run(config: Config) -> Result<(), ServerError> {
    let config = Arc::new(config.into_server_config()?);
    config.log_summary();

    signals::ignore_sigpipe()?;

    let server = Server::bind(Arc::clone(&config))?;
    // SIGINT termina el proceso desde el handler, sin drenar lo que esté en vuelo
    signals::install_interrupt_handler(server.shutdown_handle()?, server.stats())?;

    server.run()
}
