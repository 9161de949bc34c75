mod commands;

use clap::{Parser, Subcommand};
use commands::{cache, install, platform, version};
use forgebin::log_error;
use std::process::ExitCode;

#[derive(Parser)]
#[command(name = "forgebin")]
#[command(about = "Install and update release binaries from a declarative tool list", long_about = None)]
struct Cli {
    /// Turn debugging information on
    #[arg(short, long, global = true)]
    debug: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Install or update every tool of a tool list
    Install(install::InstallArgs),
    /// Inspect or edit the install cache
    Cache(cache::CacheArgs),
    /// Print the detected platform
    Platform,
    /// Print version information
    Version,
}

// Exit codes: 0 when everything succeeded or was skipped, 1 when at least one tool
// failed, 2 for invalid input (bad flags, unreadable or malformed files).
fn main() -> ExitCode {
    let cli = Cli::parse();
    forgebin::logger::init(cli.debug);

    let outcome = match cli.command {
        Commands::Install(args) => install::run(args),
        Commands::Cache(args) => cache::run(args).map(|()| true),
        Commands::Platform => {
            platform::run();
            Ok(true)
        }
        Commands::Version => {
            version::run();
            Ok(true)
        }
    };

    match outcome {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::from(1),
        Err(e) => {
            log_error!("{:#}", e);
            ExitCode::from(2)
        }
    }
}
