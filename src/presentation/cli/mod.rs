pub mod commands;

use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "shiftweaver")]
#[command(author = "ShiftWeaver Team")]
#[command(version = "0.1.0")]
#[command(about = "Multi-post duty roster generator with constraint-driven optimization", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    #[arg(short, long)]
    pub verbose: bool,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    #[command(about = "Solve a roster from a config file and emit the JSON report")]
    Solve {
        #[arg(short, long, value_name = "FILE", help = "Input roster config JSON file")]
        config: PathBuf,

        #[arg(short, long, value_name = "FILE", help = "Write the JSON report here instead of stdout")]
        output: Option<PathBuf>,

        #[arg(long, value_name = "FILE", help = "Also write a schedule checkpoint")]
        checkpoint: Option<PathBuf>,
    },

    #[command(about = "Verify that a schedule checkpoint round-trips with its invariants intact")]
    Check {
        #[arg(short, long, value_name = "FILE", help = "Checkpoint JSON file")]
        checkpoint: PathBuf,
    },
}
