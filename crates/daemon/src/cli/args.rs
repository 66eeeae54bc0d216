pub use clap::Parser;

use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "q2q")]
#[command(about = "Identity-authenticated transport and certificate trust store")]
pub struct Args {
    /// Path to the q2q config directory (defaults to ~/.q2q)
    #[arg(long, global = true)]
    pub config_path: Option<PathBuf>,

    #[command(subcommand)]
    pub command: crate::Command,
}
