// CLI modules
mod cli;

use clap::{Parser, Subcommand};
use cli::{args::Args, op::Op, Connect, Daemon, Domain, Init, Session, User, Version};

command_enum! {
    (Connect, Connect),
    (Daemon, Daemon),
    (Domain, Domain),
    (Init, Init),
    (Session, Session),
    (User, User),
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
