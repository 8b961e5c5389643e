use std::sync::Arc;

use anyhow::Context;
use arbor_datas::Database;
use arbor_server::{ArborServer, ServerConfig};
use arbor_sync::{pull_dataset, HttpTransport, RemoteStore};
use colored::Colorize;
use tracing::debug;

use crate::cli::*;

pub async fn run_command(cli: Cli) -> anyhow::Result<()> {
    match cli.command {
        Command::Serve(args) => cmd_serve(args).await,
        Command::Root(args) => cmd_root(args).await,
        Command::Datasets(args) => cmd_datasets(args).await,
        Command::Pull(args) => cmd_pull(args).await,
    }
}

fn open_remote(url: &str) -> anyhow::Result<Database> {
    let transport = HttpTransport::parse(url)?;
    debug!(url, "opening remote store");
    Ok(Database::new(Arc::new(RemoteStore::new(Arc::new(transport)))))
}

async fn cmd_serve(args: ServeArgs) -> anyhow::Result<()> {
    let mut config = match &args.config {
        Some(path) => ServerConfig::load(path)
            .with_context(|| format!("loading {}", path.display()))?,
        None => ServerConfig::default(),
    };
    if let Some(bind) = args.bind {
        config.bind_addr = bind;
    }
    println!("Arbor server on {}", config.bind_addr.to_string().bold());
    ArborServer::new(config).serve().await?;
    Ok(())
}

async fn cmd_root(args: RemoteArgs) -> anyhow::Result<()> {
    let db = open_remote(&args.url)?;
    let root = db.values().root().await?;
    if root.is_empty() {
        println!("{}", "(empty)".dimmed());
    } else {
        println!("{}", root.to_hex());
    }
    Ok(())
}

async fn cmd_datasets(args: RemoteArgs) -> anyhow::Result<()> {
    let db = open_remote(&args.url)?;
    let datasets = db.datasets().await?;
    if datasets.is_empty() {
        println!("No datasets.");
    }
    for (id, head) in datasets {
        println!("{}  {}", id.yellow().bold(), head.to_string().dimmed());
    }
    Ok(())
}

async fn cmd_pull(args: PullArgs) -> anyhow::Result<()> {
    let source = open_remote(&args.source)?;
    let sink = open_remote(&args.sink)?;
    let head = source
        .head_ref(&args.dataset)
        .await?
        .with_context(|| format!("source has no dataset {:?}", args.dataset))?;
    let sink_dataset = args.sink_dataset.as_deref().unwrap_or(&args.dataset);

    let report = pull_dataset(&source, &sink, &head, sink_dataset, args.concurrency).await?;
    if report.is_noop() {
        println!("{} {} already up to date", "✓".green(), sink_dataset.yellow());
        return Ok(());
    }
    println!(
        "{} {} -> {}",
        "✓".green().bold(),
        sink_dataset.yellow(),
        head.to_string().cyan()
    );
    println!(
        "  copied {} chunk(s), {} byte(s); {} hint(s)",
        report.chunks_copied, report.bytes_copied, report.hints
    );
    Ok(())
}
