use anyhow::{Context, Result};
use clap::Parser;
use serde_json::Value;
use store_api::{Direction, Filter, Patch, Query, RemoteStore};
use tracing::info;

use chat_store::{
    cli::{Cli, Command},
    default_db_path, SqliteStore,
};

fn text(v: Option<&Value>) -> &str {
    v.and_then(Value::as_str).unwrap_or("")
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter("info")
        .with_writer(std::io::stderr)
        .init();
    let cli = Cli::parse();
    let path = match cli.db {
        Some(p) => p,
        None => default_db_path()?,
    };
    let store = SqliteStore::open(&path)
        .with_context(|| format!("failed to open {}", path.display()))?;

    match cli.command {
        Command::SeedUser {
            uid,
            name,
            username,
            phone,
        } => {
            let profile = Patch::new()
                .set("displayName", name.trim())
                .set("username", username.trim().to_lowercase())
                .set("phone", phone.trim());
            let fresh = profile
                .clone()
                .set("isOnline", false)
                .set("status", "offline");
            if store.create("users", &uid, fresh).await? {
                info!(%uid, "user created");
            } else {
                store.update("users", &uid, profile).await?;
                info!(%uid, "user updated");
            }
        }
        Command::Users => {
            let users = store.query("users", &Query::new()).await?;
            for user in users {
                println!(
                    "{:<24} {:<20} {:<16} {:<16} {}",
                    user.id,
                    text(user.get("displayName")),
                    text(user.get("username")),
                    text(user.get("phone")),
                    if user.get("isOnline") == Some(&Value::Bool(true)) {
                        "online"
                    } else {
                        "offline"
                    }
                );
            }
        }
        Command::Chats { uid } => {
            let query = Query::new()
                .filter(Filter::array_contains("participants", uid.as_str()))
                .order_by("lastMessageTime", Direction::Desc);
            for chat in store.query("chats", &query).await? {
                let unread = chat
                    .get(&format!("unreadCounts.{uid}"))
                    .and_then(Value::as_i64)
                    .unwrap_or(0);
                println!(
                    "{:<36} {:<8} {:<20} unread={:<4} {}",
                    chat.id,
                    text(chat.get("type")),
                    text(chat.get("name")),
                    unread,
                    text(chat.get("lastMessage"))
                );
            }
        }
    }
    Ok(())
}
