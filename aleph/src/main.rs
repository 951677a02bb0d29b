use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use tracing::{error, info};

use aleph::{logging, App, AppConfig, AppError};
use aleph_store::{FixtureSet, Role};

#[derive(Parser)]
#[command(name = "aleph-index")]
#[command(about = "Maintain the aleph search indices", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create missing indices; fails if an index has another mapping version
    Upgrade,
    /// Delete and recreate every index
    Reset,
    /// Load a fixture file into the store, then index it
    Load {
        path: PathBuf,
        /// Skip document processing
        #[arg(long)]
        no_process: bool,
    },
    /// Rebuild every collection, entity and record document
    Reindex,
    /// Process every stored document
    Process,
    /// Delete every document from the indices
    Purge,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let config = match AppConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("{}", e);
            return ExitCode::FAILURE;
        }
    };
    logging::init(config.debug);

    match run(config, cli.command).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!(error = %e, fatal = e.is_fatal(), "aleph-index failed");
            ExitCode::FAILURE
        }
    }
}

async fn run(config: AppConfig, command: Commands) -> Result<(), AppError> {
    let app = App::create(config).await?;
    let service = app.service();

    {
        let mut conn = service.store().acquire().await?;
        Role::create_system_roles(&mut conn).await?;
    }

    match command {
        Commands::Upgrade => {
            let outcome = service.upgrade_search().await?;
            info!(created = ?outcome.created, current = ?outcome.current, "Upgraded indices");
        }
        Commands::Reset => {
            service.delete_index().await?;
            service.upgrade_search().await?;
        }
        Commands::Load { path, no_process } => {
            service.upgrade_search().await?;
            let set = FixtureSet::from_path(&path).await?;
            let summary = service.load_fixtures(&set).await?;
            service.reindex_collections().await?;
            if !no_process {
                service.process_documents(&summary.document_ids).await?;
            }
            service.flush_index().await?;
            info!(rows = summary.total(), path = %path.display(), "Loaded fixtures");
        }
        Commands::Reindex => {
            service.upgrade_search().await?;
            let summary = service.reindex_collections().await?;
            service.flush_index().await?;
            info!(documents = summary.total(), "Reindexed");
        }
        Commands::Process => {
            service.upgrade_search().await?;
            let report = service.process_all(None).await?;
            service.flush_index().await?;
            info!(
                done = report.done.len(),
                failed = report.failed.len(),
                "Processed documents"
            );
        }
        Commands::Purge => {
            let summary = service.purge_all().await?;
            info!(
                deleted = summary.deleted,
                version_conflicts = summary.version_conflicts,
                "Purged indices"
            );
        }
    }
    Ok(())
}
