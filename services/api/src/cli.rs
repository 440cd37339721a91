use crate::commands::{run_learning, run_recommend, LearningArgs, RecommendArgs};
use crate::server;
use clap::{Args, Parser, Subcommand};
use procure_ai::error::AppError;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(
    name = "Lab Procurement Advisor",
    about = "Recommend laboratory purchases and learn from the choices made",
    version
)]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Start the HTTP service (default command)
    Serve(ServeArgs),
    /// Run one procurement request against the supplier catalog
    Recommend(RecommendArgs),
    /// Show learned weights, confidence, and vendor statistics
    Learning(LearningArgs),
}

#[derive(Args, Debug, Default)]
pub(crate) struct ServeArgs {
    /// Override the configured host for the HTTP server
    #[arg(long)]
    pub(crate) host: Option<String>,
    /// Override the configured port for the HTTP server
    #[arg(long)]
    pub(crate) port: Option<u16>,
    /// Supplier catalog CSV (defaults to PROCURE_CATALOG or the bundled sample)
    #[arg(long)]
    pub(crate) catalog: Option<PathBuf>,
}

pub(crate) async fn run() -> Result<(), AppError> {
    let cli = Cli::parse();
    let command = cli
        .command
        .unwrap_or_else(|| Command::Serve(ServeArgs::default()));

    match command {
        Command::Serve(args) => server::run(args).await,
        Command::Recommend(args) => run_recommend(args).await,
        Command::Learning(args) => run_learning(args),
    }
}
