use anyhow::Result;
use clap::Parser;
use tracing_subscriber::{fmt, EnvFilter};

use shiftweaver::presentation::cli::commands::{CheckCommand, SolveCommand};
use shiftweaver::presentation::cli::{Cli, Commands};

fn main() {
    let cli = Cli::parse();

    let filter = if cli.verbose {
        EnvFilter::new("shiftweaver=debug,info")
    } else {
        EnvFilter::new("shiftweaver=info")
    };

    fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();

    let code = match run(&cli) {
        Ok(code) => code,
        Err(err) => {
            eprintln!("error: {:#}", err);
            3
        }
    };
    std::process::exit(code);
}

fn run(cli: &Cli) -> Result<i32> {
    match &cli.command {
        Commands::Solve {
            config,
            output,
            checkpoint,
        } => SolveCommand::execute(config, output.as_deref(), checkpoint.as_deref()),
        Commands::Check { checkpoint } => CheckCommand::execute(checkpoint),
    }
}
