use clap::{Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(name = "voxbridge")]
#[command(about = "Live caption relay and meeting summaries", long_about = None)]
pub struct Cli {
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Option<CliCommand>,
}

#[derive(Subcommand, Debug)]
pub enum CliCommand {
    /// Print version information
    Version,
    /// Print the effective configuration
    Config,
}
