use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

#[derive(Parser, Debug, Clone)]
#[command(name = "nbexec", about = "Session-persistent notebook snippet execution", version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Serve the execution API over HTTP (default).
    Serve(ServeArgs),

    /// Submit a snippet file to a running server and print the result.
    Run(RunArgs),
}

#[derive(Args, Debug, Clone, Default)]
pub struct ServeArgs {
    /// Address to bind (overrides NBEXEC_HOST).
    #[arg(long)]
    pub host: Option<String>,

    /// Port to bind (overrides NBEXEC_PORT).
    #[arg(short, long)]
    pub port: Option<u16>,

    /// Working directory for the kernel (overrides NBEXEC_WORKDIR).
    #[arg(long)]
    pub workdir: Option<PathBuf>,

    /// Per-invocation timeout in seconds (overrides NBEXEC_EXECUTION_TIMEOUT).
    #[arg(long)]
    pub timeout: Option<u64>,

    /// Execute a trivial snippet before binding and exit 1 if it fails.
    #[arg(long = "self-test")]
    pub self_test: bool,
}

#[derive(Args, Debug, Clone)]
pub struct RunArgs {
    /// Snippet file, or `-` for stdin.
    #[arg(value_name = "FILE")]
    pub file: String,

    /// Server base URL (overrides NBEXEC_SERVER_URL).
    #[arg(long)]
    pub url: Option<String>,

    /// Continue an existing session.
    #[arg(long)]
    pub session: Option<String>,

    /// Reset the session before executing.
    #[arg(long)]
    pub reset: bool,

    /// Decode returned images into this directory.
    #[arg(long = "save-images", value_name = "DIR")]
    pub save_images: Option<PathBuf>,
}

impl Cli {
    pub fn parse() -> Self {
        <Self as Parser>::parse()
    }
}
