pub mod catalog;
pub mod config;
pub mod core;
pub mod error;
pub mod logger;
pub mod pipeline;
pub mod reconcile;
pub mod remote;
pub mod transfer;

use crate::catalog::SheetClient;
use crate::config::{Cli, Command, RemoteArgs, RemoteTarget};
use crate::error::{SyncError, SyncResult};
use crate::pipeline::{Context, RunReport};
use crate::remote::{LocalStore, RemoteStore, SshStore};
use crate::transfer::HttpFetcher;

/// Exit status for an error that stopped the run
pub const EXIT_FATAL: i32 = 2;

fn open_store(remote: &RemoteArgs) -> SyncResult<Box<dyn RemoteStore>> {
    Ok(match remote.resolve()? {
        RemoteTarget::Ssh(config) => Box::new(SshStore::new(config)),
        RemoteTarget::Local(dir) => Box::new(LocalStore::new(dir)),
    })
}

async fn execute(cli: Cli) -> SyncResult<RunReport> {
    let sources = SheetClient::new().map_err(|e| SyncError::config(format!("{:#}", e)))?;
    let fetcher = HttpFetcher::new().map_err(|e| SyncError::config(format!("{:#}", e)))?;

    match cli.cmd {
        Command::Sync(args) => {
            let store = open_store(&args.remote)?;
            let ctx = Context {
                sources: &sources,
                store: store.as_ref(),
                fetcher: &fetcher,
            };
            pipeline::run_sync(&ctx, &args).await
        }
        Command::Catalog(args) => {
            let store = open_store(&args.remote)?;
            let ctx = Context {
                sources: &sources,
                store: store.as_ref(),
                fetcher: &fetcher,
            };
            pipeline::run_catalog(&ctx, &args).await
        }
    }
}

/// Run one command and return the process exit status
pub async fn run(cli: Cli) -> i32 {
    if let Err(e) = logger::init(cli.verbose) {
        eprintln!("{:#}", e);
    }

    match execute(cli).await {
        Ok(report) => report.exit_code(),
        Err(err) => {
            logger::log_error(&format!("Aborting: {}", err), Some("main"));
            EXIT_FATAL
        }
    }
}
