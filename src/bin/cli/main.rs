use clap::Parser;
use tracing::error;

mod report;

#[derive(Parser, Debug)]
struct CliArgs {
    /// The command to perform.
    #[command(subcommand)]
    command: Subcommand,
}

#[tokio::main]
async fn main() {
    // set up tracing
    tracing_subscriber::fmt::init();

    let CliArgs { command } = CliArgs::parse();

    let result = match command {
        Subcommand::Report(report_args) => report::main(report_args).await,
    };
    if let Err(err) = result {
        if let Some(cli_err) = err.downcast_ref::<clap::Error>() {
            cli_err.exit();
        } else {
            error!("error during execution: {:#}", err);
            std::process::exit(1);
        }
    }
}

#[derive(clap::Subcommand, Debug)]
pub enum Subcommand {
    /// Generate the monthly report on enhancement and contracted enhancement
    /// jobs.
    Report(report::Args),
}
