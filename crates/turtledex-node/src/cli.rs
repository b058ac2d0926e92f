use crate::commands::chain_info::ChainInfoCmd;
use crate::commands::check::CheckCmd;
use crate::commands::export_blocks::ExportBlocksCmd;
use crate::commands::import_blocks::ImportBlocksCmd;
use crate::commands::tail_changes::TailChangesCmd;
use crate::error::Result;
use clap::Parser;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use turtledex_consensus::ConsensusSet;
use turtledex_primitives::ChainParams;

/// Chain.
#[derive(Clone, Copy, Default, Debug, clap::ValueEnum)]
pub enum Chain {
    /// TurtleDex mainnet.
    #[default]
    Mainnet,
    /// Small parameters for local testing.
    Testing,
}

impl Chain {
    pub fn id(&self) -> &'static str {
        match self {
            Self::Mainnet => "mainnet",
            Self::Testing => "testing",
        }
    }

    pub fn params(&self) -> ChainParams {
        match self {
            Self::Mainnet => ChainParams::mainnet(),
            Self::Testing => ChainParams::testing(),
        }
    }
}

/// Parameters shared by every subcommand.
#[derive(Debug, Clone, clap::Args)]
pub struct CommonParams {
    /// Specify the chain.
    #[clap(long, value_enum, default_value_t = Chain::Mainnet, global = true)]
    pub chain: Chain,

    /// Directory holding the node data.
    #[clap(long, short = 'd', value_name = "PATH", default_value = "turtledex-data", global = true)]
    pub base_path: PathBuf,

    /// Log filter directives, e.g. `info,turtledex_consensus=debug`.
    ///
    /// Takes precedence over `RUST_LOG`.
    #[clap(long, value_name = "DIRECTIVES", global = true)]
    pub log_filter: Option<String>,
}

impl CommonParams {
    /// Location of the ledger database for the selected chain.
    pub fn database_path(&self) -> PathBuf {
        self.base_path
            .join("chains")
            .join(self.chain.id())
            .join("consensus")
    }

    /// Opens the consensus set, creating the ledger on first use.
    pub fn open_consensus_set(&self) -> Result<ConsensusSet> {
        let path = self.database_path();
        std::fs::create_dir_all(&path)?;
        tracing::info!("📦 Opening {} ledger at {}", self.chain.id(), path.display());
        Ok(ConsensusSet::new(&path, self.chain.params())?)
    }
}

#[derive(Debug, clap::Subcommand)]
pub enum Command {
    /// Import blocks from a file.
    ImportBlocks(ImportBlocksCmd),

    /// Export canonical blocks to a file.
    ExportBlocks(ExportBlocksCmd),

    /// Print a summary of the ledger as JSON.
    ChainInfo(ChainInfoCmd),

    /// Run every ledger consistency check.
    Check(CheckCmd),

    /// Print the consensus changes after a given change.
    TailChanges(TailChangesCmd),
}

#[derive(Debug, Parser)]
#[clap(name = "turtledexd", version, about = "TurtleDex consensus node")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    #[allow(missing_docs)]
    #[clap(flatten)]
    pub common_params: CommonParams,
}

fn init_logging(log_filter: Option<&str>) {
    let filter = match log_filter {
        Some(directives) => EnvFilter::new(directives),
        None => EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

/// Parse and run command line arguments
pub fn run() -> Result<()> {
    let Cli {
        command,
        common_params,
    } = Cli::parse();

    init_logging(common_params.log_filter.as_deref());

    let res = match command {
        Command::ImportBlocks(cmd) => cmd.run(&common_params),
        Command::ExportBlocks(cmd) => cmd.run(&common_params),
        Command::ChainInfo(cmd) => cmd.run(&common_params),
        Command::Check(cmd) => cmd.run(&common_params),
        Command::TailChanges(cmd) => cmd.run(&common_params),
    };

    if let Err(err) = &res {
        if err.is_fatal() {
            tracing::error!(?err, "Ledger is in an unrecoverable state, aborting");
            std::process::abort();
        }
    }

    res
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_global_options_after_subcommand() {
        let cli = Cli::parse_from([
            "turtledexd",
            "chain-info",
            "--chain",
            "testing",
            "--base-path",
            "/tmp/ledger",
        ]);
        assert!(matches!(cli.command, Command::ChainInfo(_)));
        assert!(matches!(cli.common_params.chain, Chain::Testing));
        assert_eq!(
            cli.common_params.database_path(),
            PathBuf::from("/tmp/ledger/chains/testing/consensus")
        );
    }

    #[test]
    fn test_tail_changes_parses_change_id() {
        let id = "ab".repeat(32);
        let cli = Cli::parse_from(["turtledexd", "tail-changes", "--from", &id]);
        let Command::TailChanges(cmd) = cli.command else {
            panic!("Expected tail-changes");
        };
        assert_eq!(cmd.from.map(|id| id.to_string()), Some(id));
    }
}
