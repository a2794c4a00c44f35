use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

#[derive(Debug, Parser)]
#[command(author, version, about)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Load a book config and print its chapters.
    Validate(ValidateArgs),
    /// Run scripted host actions against a book and print every event as JSON lines.
    Replay(ReplayArgs),
}

#[derive(Debug, Args)]
pub struct ValidateArgs {
    /// Book config (`.yaml`, `.yml` or `.json`).
    #[arg(long)]
    pub book: PathBuf,
}

#[derive(Debug, Args)]
pub struct ReplayArgs {
    /// Book config (`.yaml`, `.yml` or `.json`).
    #[arg(long)]
    pub book: PathBuf,

    /// Action script (`.yaml`, `.yml` or `.json`).
    #[arg(long)]
    pub script: PathBuf,

    /// Page URL the book is embedded in. Its fragment is the initial deep link.
    #[arg(long, default_value = "https://localhost/book")]
    pub url: String,

    /// Print the book's xAPI report after the last action.
    #[arg(long)]
    pub report: bool,
}
