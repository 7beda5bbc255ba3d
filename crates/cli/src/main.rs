//! mediaferry entry point: Kobo → SharePoint media transfer.

mod config;
mod report;
mod select;

use std::time::Duration;

use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

use mediaferry_graph::GraphClient;
use mediaferry_kobo::KoboClient;
use mediaferry_pipeline::{PipelineOptions, run_transfer, select_run_folder};
use mediaferry_transfer::{SourceProvider, TransferError, TransferStats};

#[derive(Parser)]
#[command(
    name = "mediaferry",
    version,
    about = "Copies KoboToolbox form attachments into a SharePoint document library"
)]
struct Args {
    /// Forms to transfer: comma-separated numbers from the listing, or
    /// "all". Prompts interactively when omitted.
    #[arg(long)]
    forms: Option<String>,

    /// Destination run folder. Defaults to the most recent existing
    /// `KoboMedia_Direct_*` folder, or a fresh one when none exists.
    #[arg(long)]
    root_folder: Option<String>,

    /// Pause between transfers, in milliseconds.
    #[arg(long, default_value_t = 500)]
    delay_ms: u64,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    // Initialize structured logging.
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();
    let config = config::Config::from_env()?;

    let source = KoboClient::new(config.kobo_base_url.clone(), &config.kobo_token)?;
    let store = GraphClient::connect(&config.graph).await?;

    let forms = source.list_forms().await?;
    if forms.is_empty() {
        println!("No forms are visible to this account.");
        return Ok(());
    }

    let selected = match &args.forms {
        Some(input) => select::parse_selection(input, forms.len())
            .ok_or_else(|| anyhow::anyhow!("invalid form selection: {input:?}"))?,
        None => select::prompt_selection(&forms)?,
    };
    if selected.is_empty() {
        println!("Nothing selected.");
        return Ok(());
    }
    let chosen: Vec<_> = selected.iter().map(|&index| forms[index].clone()).collect();

    // First Ctrl-C finishes the in-flight item, then the run stops.
    let cancel = CancellationToken::new();
    {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                tracing::warn!("interrupt received, finishing current item then stopping");
                cancel.cancel();
            }
        });
    }

    let root_folder = match args.root_folder {
        Some(name) => name,
        None => select_run_folder(&store, chrono::Local::now().naive_local()).await,
    };

    let stats = TransferStats::new();
    let options = PipelineOptions {
        transfer_delay: Duration::from_millis(args.delay_ms),
        ..Default::default()
    };
    match run_transfer(
        &source,
        &store,
        &chosen,
        &root_folder,
        &stats,
        cancel,
        options,
    )
    .await
    {
        Ok(summary) => report::print_summary(&summary),
        Err(TransferError::Cancelled) => {
            println!("\nRun interrupted. Completed files are kept; a re-run resumes after them.");
        }
        Err(err) => return Err(err.into()),
    }

    Ok(())
}
