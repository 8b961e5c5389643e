use std::net::SocketAddr;
use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

#[derive(Parser)]
#[command(
    name = "arbor",
    about = "Arbor -- versioned, content-addressed data store",
    version
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    #[arg(short, long, global = true)]
    pub verbose: bool,
}

#[derive(Subcommand)]
pub enum Command {
    /// Serve an in-memory store over HTTP
    Serve(ServeArgs),
    /// Print the root hash of a remote store
    Root(RemoteArgs),
    /// List the datasets of a remote store and their heads
    Datasets(RemoteArgs),
    /// Pull a dataset from one remote store into another
    Pull(PullArgs),
}

#[derive(Args)]
pub struct ServeArgs {
    /// Overrides `bind_addr` from the config file
    #[arg(long)]
    pub bind: Option<SocketAddr>,
    #[arg(long)]
    pub config: Option<PathBuf>,
}

#[derive(Args)]
pub struct RemoteArgs {
    /// Base URL of the server, e.g. http://127.0.0.1:8000/
    pub url: String,
}

#[derive(Args)]
pub struct PullArgs {
    pub source: String,
    pub sink: String,
    #[arg(short, long)]
    pub dataset: String,
    /// Dataset to update on the sink; defaults to the source dataset
    #[arg(long)]
    pub sink_dataset: Option<String>,
    #[arg(short = 'j', long, default_value = "8")]
    pub concurrency: usize,
}

#[cfg(test)]
mod tests {
    use clap::CommandFactory;

    use super::*;

    #[test]
    fn cli_is_well_formed() {
        Cli::command().debug_assert();
    }

    #[test]
    fn parses_pull() {
        let cli = Cli::parse_from([
            "arbor", "pull", "http://a/", "http://b/", "--dataset", "main", "-j", "2",
        ]);
        match cli.command {
            Command::Pull(args) => {
                assert_eq!(args.dataset, "main");
                assert_eq!(args.concurrency, 2);
                assert!(args.sink_dataset.is_none());
            }
            _ => panic!("expected pull"),
        }
    }

    #[test]
    fn parses_serve_overrides() {
        let cli = Cli::parse_from(["arbor", "-v", "serve", "--bind", "0.0.0.0:9000"]);
        assert!(cli.verbose);
        match cli.command {
            Command::Serve(args) => assert_eq!(args.bind.unwrap().port(), 9000),
            _ => panic!("expected serve"),
        }
    }
}
