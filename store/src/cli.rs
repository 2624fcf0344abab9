use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Administration tool for the local chat document store.
#[derive(Parser, Debug)]
#[command(author, version, about)]
pub struct Cli {
    /// Path of the SQLite document database.
    #[arg(long)]
    pub db: Option<PathBuf>,
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Create a user profile, or refresh the fields of an existing one.
    SeedUser {
        #[arg(long)]
        uid: String,
        #[arg(long)]
        name: String,
        #[arg(long, default_value = "")]
        username: String,
        #[arg(long, default_value = "")]
        phone: String,
    },
    /// List stored users.
    Users,
    /// List conversations a user participates in.
    Chats {
        #[arg(long)]
        uid: String,
    },
}
