//! nbexec: run code snippets against a per-session, replayed notebook and get
//! back text, HTML and images.

pub mod cli;
pub mod client;
pub mod config;
pub mod error;
pub mod execution;
pub mod notebook;
pub mod printer;
pub mod process;
pub mod server;
pub mod session;
pub mod utils;
