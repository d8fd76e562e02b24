#![forbid(unsafe_code)]

//! bbal: mergerfs branch balancer CLI entry point.

use clap::Parser;

mod cli_app;
mod console;

fn main() {
    let args = cli_app::Cli::parse();
    if let Err(e) = cli_app::run(&args) {
        eprintln!("bbal: {e}");
        std::process::exit(e.exit_code());
    }
}
