use clap::Parser;
use pmtud::cli::{Cli, Config};
use pmtud::process;
use pmtud::supervisor::Supervisor;
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    init_tracing();

    // clap's default `Parser::parse()` exits 0 on `--help`; the spec calls
    // for every CLI exit other than a clean run to be non-zero, `--help`
    // included, so the help/usage text is handled manually here instead.
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(e) => {
            let _ = e.print();
            return ExitCode::FAILURE;
        }
    };

    let config = match Config::from_cli(cli) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("pmtud: {e}");
            return ExitCode::FAILURE;
        }
    };

    if let Err(e) = process::enable_core_dumps() {
        tracing::warn!(error = %e, "failed to enable core dumps");
    }
    if let Some(cpu) = config.cpu {
        if let Err(e) = process::pin_to_cpu(cpu) {
            tracing::warn!(error = %e, cpu, "failed to pin to requested CPU");
        }
    }

    let supervisor = match Supervisor::build(config) {
        Ok(supervisor) => supervisor,
        Err(e) => {
            eprintln!("pmtud: {e}");
            return ExitCode::FAILURE;
        }
    };

    match supervisor.run().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("pmtud: {e}");
            ExitCode::FAILURE
        }
    }
}
