pub use clap::Parser;

use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "keyring")]
#[command(about = "Derive, grant, recover and probe keys for a server fleet")]
pub struct Args {
    /// Path to the keyring config directory (defaults to ~/.keyring)
    #[arg(long, global = true)]
    pub config_path: Option<PathBuf>,

    #[command(subcommand)]
    pub command: crate::Command,
}
