use clap::Parser;
use tracing_subscriber::EnvFilter;

use backoffice_sync::cli::Cli;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let json = cli.json;

    if let Err(e) = backoffice_sync::cli::run(cli).await {
        if json {
            let format = backoffice_sync::cli::OutputFormat::Json;
            backoffice_sync::cli::utils::output_error(&format, &e.to_string(), None)?;
        } else {
            match std::env::var("CLI_VERBOSE").as_deref() {
                Ok("true") | Ok("1") => eprintln!("Error: {e:?}"),
                _ => eprintln!("Error: {e}"),
            }
        }
        std::process::exit(1);
    }

    Ok(())
}
