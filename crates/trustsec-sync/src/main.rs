//! trustsec - TrustSec egress matrix export, import and clear
//!
//! Talks to the ERS API of the configured node, or exports the adaptive
//! policy of a Meraki dashboard organization. Connection settings come from
//! an optional TOML file overlaid with the ISE_* and MERAKI_* environment
//! variables.

use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::time::Instant;

use clap::{Parser, Subcommand};
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;
use trustsec_common::{connect, connect_meraki, ErsConfig, ErsResult};
use trustsec_sync::{
    classify_matrix, BatchReport, ItemFailure, MerakiDashboard, SortKey, TrustsecSync, Workbook,
};

/// TrustSec egress matrix synchronization
#[derive(Parser, Debug)]
#[command(name = "trustsec")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Increase verbosity (-v info, -vv debug, -vvv trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// TOML configuration file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Report elapsed time
    #[arg(short, long, global = true)]
    timer: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Export the matrix, ACLs, tags and policies to a workbook
    Export {
        /// Output workbook
        #[arg(short, long, default_value = "trustsec_matrix.json")]
        filename: PathBuf,

        /// Row and column order: name or value
        #[arg(short, long, default_value = "name")]
        sort: SortKey,
    },
    /// Create tags, ACLs and cells from a workbook
    Import {
        /// Input workbook
        #[arg(short, long, default_value = "trustsec_matrix.json")]
        filename: PathBuf,

        /// Clear existing tags, ACLs and cells first
        #[arg(long)]
        reset: bool,
    },
    /// Delete all non-platform cells, ACLs and tags
    Clear,
    /// Export a Meraki organization's adaptive policy to a workbook
    Meraki {
        /// Output workbook
        #[arg(short, long, default_value = "meraki_matrix.json")]
        filename: PathBuf,

        /// Row and column order: name or value
        #[arg(short, long, default_value = "value")]
        sort: SortKey,
    },
    /// Show the node version
    Version,
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();
    init_logging(args.verbose);

    let start = Instant::now();
    let result = run(&args).await;
    if args.timer {
        println!("Elapsed: {:.3}s", start.elapsed().as_secs_f64());
    }

    match result {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::from(2),
        Err(e) => {
            error!("{}", e);
            eprintln!("trustsec: {}", e);
            ExitCode::FAILURE
        }
    }
}

/// Returns whether every item succeeded.
async fn run(args: &Args) -> ErsResult<bool> {
    if let Command::Meraki { filename, sort } = &args.command {
        return run_meraki(args, filename, *sort).await;
    }

    let config = ErsConfig::load(args.config.as_deref())?;
    info!(host = %config.server.host, connections = config.limits.max_connections, "Connecting");
    let session = TrustsecSync::new(connect(&config)?, &config);

    match &args.command {
        Command::Export { filename, sort } => {
            let export = session.export(*sort).await?;
            report_failures("export", &export.failures);

            let reserved = classify_matrix(&export.matrix)
                .iter()
                .filter(|c| c.reserved)
                .count();
            info!(reserved, "Classified matrix");

            export.to_workbook().write(filename)?;
            println!(
                "Exported {} tags, {} ACLs, {} policies to {}",
                export.tags.len(),
                export.acls.len(),
                export.policies.len(),
                filename.display()
            );
            Ok(export.failures.is_empty())
        }
        Command::Import { filename, reset } => {
            let workbook = Workbook::read(filename)?;
            let mut clean = true;
            if *reset {
                let cleared = session.clear().await?;
                for batch in [&cleared.cells, &cleared.acls, &cleared.tags] {
                    print_batch(batch);
                }
                clean &= cleared.is_clean();
            }

            let import = session.import(&workbook).await?;
            for batch in [&import.tags, &import.acls, &import.cells] {
                print_batch(batch);
            }
            report_failures("cell", &import.skipped_cells);
            report_failures("detail", &import.detail_failures);
            Ok(clean && import.is_clean())
        }
        Command::Clear => {
            let cleared = session.clear().await?;
            for batch in [&cleared.cells, &cleared.acls, &cleared.tags] {
                print_batch(batch);
            }
            Ok(cleared.is_clean())
        }
        Command::Version => {
            let version = session.version().await?;
            println!("{}", version);
            Ok(true)
        }
        Command::Meraki { filename, sort } => run_meraki(args, filename, *sort).await,
    }
}

async fn run_meraki(args: &Args, filename: &Path, sort: SortKey) -> ErsResult<bool> {
    let config = ErsConfig::load_meraki(args.config.as_deref())?;
    info!(base_url = %config.meraki.base_url, "Connecting to dashboard");
    let dashboard =
        MerakiDashboard::new(connect_meraki(&config)?).with_org_id(config.meraki.org_id.as_str());

    let export = dashboard.export(sort).await?;
    export.to_workbook().write(filename)?;
    println!(
        "Exported {} groups, {} ACLs, {} policies of organization {} to {}",
        export.tags.len(),
        export.acls.len(),
        export.policies.len(),
        export.org_id,
        filename.display()
    );
    Ok(true)
}

fn print_batch(batch: &BatchReport) {
    for item in &batch.items {
        if item.outcome.is_success() || item.outcome.is_conflict() {
            info!(collection = %batch.collection, key = %item.key, "{}", item.outcome);
        } else {
            warn!(collection = %batch.collection, key = %item.key, "{}", item.outcome);
        }
    }
    println!(
        "{}: {} ok, {} already present, {} failed",
        batch.collection,
        batch.succeeded(),
        batch.conflicts(),
        batch.failed()
    );
}

fn report_failures(what: &str, failures: &[ItemFailure]) {
    for failure in failures {
        warn!("Skipped {} {}", what, failure);
    }
}

fn init_logging(verbose: u8) {
    let level = match verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_level(true)
        .init();
}
