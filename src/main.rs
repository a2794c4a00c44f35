use std::process::ExitCode;

use anyhow::Context as _;
use clap::Parser as _;

fn main() -> ExitCode {
    if let Err(err) = try_main() {
        eprintln!("{err:#}");
        return ExitCode::FAILURE;
    }

    ExitCode::SUCCESS
}

fn try_main() -> anyhow::Result<()> {
    interactive_book::logging::init().context("init logging")?;

    let cli = interactive_book::cli::Cli::parse();
    tracing::debug!(?cli, "parsed cli");

    match cli.command {
        interactive_book::cli::Command::Validate(args) => {
            interactive_book::config::run(args).context("validate")?;
        }
        interactive_book::cli::Command::Replay(args) => {
            interactive_book::script::run(args).context("replay")?;
        }
    }

    Ok(())
}
