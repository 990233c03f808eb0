use crate::render::{
    run_funnels, run_report, run_tags, FunnelsArgs, ReportArgs, TagsArgs,
};
use crate::server;
use amo_report::error::AppError;
use clap::{Args, Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(
    name = "amo-report",
    about = "Tag-sliced funnel conversion reports over CRM deal exports",
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
    /// Compute a funnel report from a deal export
    Report(ReportArgs),
    /// List the distinct deal tags present in an export
    Tags(TagsArgs),
    /// List the funnels configured for each segment
    Funnels(FunnelsArgs),
}

#[derive(Args, Debug, Default)]
pub(crate) struct ServeArgs {
    /// Override the configured host for the HTTP server
    #[arg(long)]
    pub(crate) host: Option<String>,
    /// Override the configured port for the HTTP server
    #[arg(long)]
    pub(crate) port: Option<u16>,
}

pub(crate) async fn run() -> Result<(), AppError> {
    let cli = Cli::parse();
    let command = cli
        .command
        .unwrap_or_else(|| Command::Serve(ServeArgs::default()));

    match command {
        Command::Serve(args) => server::run(args).await,
        Command::Report(args) => run_report(args),
        Command::Tags(args) => run_tags(args),
        Command::Funnels(args) => run_funnels(args),
    }
}
