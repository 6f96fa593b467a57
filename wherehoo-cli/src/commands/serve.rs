//! Serve command - run the server until Ctrl-C.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use wherehoo::config::ConfigFile;
use wherehoo::logging::init_logging;
use wherehoo::server::Server;
use wherehoo::store::Store;

use crate::error::CliError;

/// Arguments for the serve command.
pub struct ServeArgs {
    pub config: Option<PathBuf>,
    pub listen: Option<SocketAddr>,
    pub verbose: bool,
}

/// Run the serve command.
pub fn run(args: ServeArgs) -> Result<(), CliError> {
    let mut config = match &args.config {
        Some(path) => ConfigFile::load_from(path)?,
        None => ConfigFile::load()?,
    };
    if let Some(listen) = args.listen {
        config.server.listen = listen;
    }
    if args.verbose {
        config.logging.level = "debug".to_string();
    }

    let _guard = init_logging(&config.logging)?;
    info!(version = wherehoo::VERSION, "Starting wherehoo");
    if config.identities.is_empty() {
        warn!("No identities configured; inserts and deletes will be rejected");
    }

    let shutdown = CancellationToken::new();
    let signal_token = shutdown.clone();
    ctrlc::set_handler(move || {
        info!("Interrupt received");
        signal_token.cancel();
    })?;

    let runtime = tokio::runtime::Runtime::new()?;
    runtime.block_on(async move {
        let store: Arc<dyn Store> = Arc::new(config.build_store());
        let server = Server::bind(config.server.clone(), store).await?;
        server.run(shutdown).await?;
        Ok(())
    })
}
