use clap::Parser;

use bake_action::{cli::Cli, github};

fn main() {
    let default_filter = if github::is_debug() { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_filter))
        .init();

    if let Err(error) = Cli::parse().run() {
        github::error(&error.to_string());
        std::process::exit(1);
    }
}
