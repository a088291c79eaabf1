use clap::Parser;
use idsync::{logging, runner, AppResult, Cli, SyncConfig};

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    match run(cli).await {
        Ok(()) => std::process::exit(0),
        Err(e) => {
            eprintln!("Error: {e}");
            std::process::exit(e.exit_code());
        }
    }
}

async fn run(cli: Cli) -> AppResult<()> {
    logging::init_logging(
        &logging::filter_directive(&cli.log_level, cli.debug),
        cli.log_format,
    )?;

    let config = SyncConfig::from_cli(cli)?;
    let result = runner::run(&config).await;

    if let Ok(summary) = &result {
        runner::report(summary, config.output, &mut std::io::stdout().lock())?;
    }
    runner::outcome(result).map(|_| ())
}
