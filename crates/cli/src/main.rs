// CLI modules
mod cli;

use clap::{Parser, Subcommand};
use cli::{
    args::Args, op::Op, Bearer, Grant, Init, Keys, Monitor, Probe, Recover, Serve, Share, Version,
    VerifyToken,
};

command_enum! {
    (Init, Init),
    (Keys, Keys),
    (Grant, Grant),
    (Share, Share),
    (Recover, Recover),
    (Bearer, Bearer),
    (VerifyToken, VerifyToken),
    (Serve, Serve),
    (Probe, Probe),
    (Monitor, Monitor),
    (Version, Version),
}

#[tokio::main]
async fn main() {
    let args = Args::parse();
    let ctx = cli::op::OpContext::new(args.config_path);

    match args.command.execute(&ctx).await {
        Ok(output) => {
            println!("{}", output);
            std::process::exit(0);
        }
        Err(e) => {
            eprintln!("Error: {}", e);
            std::process::exit(1);
        }
    }
}
