use std::{fs, path::PathBuf};

use anyhow::{Context, Result};
use clap::Parser;
use serde::Deserialize;
use time::UtcOffset;

use crate::session::Settings;

/// Command line options for the chat client.
#[derive(Parser, Debug, Default)]
pub struct Cli {
    /// User id to log in as.
    #[arg(long)]
    pub user: Option<String>,
    /// Path of the SQLite document database.
    #[arg(long)]
    pub db: Option<PathBuf>,
    /// Enable or disable logging (true/false).
    #[arg(long)]
    pub logging: Option<bool>,
    /// Viewer's UTC offset, e.g. `+02:00`.
    #[arg(long)]
    pub utc_offset: Option<String>,
    /// Path to configuration file.
    #[arg(long)]
    pub config: Option<PathBuf>,
}

/// Runtime configuration resolved from file, env and CLI.
#[derive(Clone, Debug)]
pub struct Config {
    /// User to log in as.
    pub user: String,
    /// Location of the document database.
    pub db_path: PathBuf,
    /// Whether verbose logging is enabled.
    pub logging_enabled: bool,
    /// Session limits and locale.
    pub settings: Settings,
}

#[derive(Deserialize, Default)]
struct FileConfig {
    #[serde(default)]
    session: FileSession,
    #[serde(default)]
    store: FileStore,
    #[serde(default)]
    logging: FileLogging,
    #[serde(default)]
    limits: FileLimits,
}

#[derive(Deserialize, Default)]
struct FileSession {
    user: Option<String>,
    utc_offset: Option<String>,
}

#[derive(Deserialize, Default)]
struct FileStore {
    path: Option<PathBuf>,
}

#[derive(Deserialize)]
struct FileLogging {
    #[serde(default = "default_logging")]
    enabled: bool,
}

#[derive(Deserialize, Default)]
struct FileLimits {
    page_size: Option<usize>,
    feed: Option<usize>,
    contacts: Option<usize>,
    search: Option<usize>,
}

fn default_logging() -> bool {
    true
}

impl Default for FileLogging {
    fn default() -> Self {
        Self {
            enabled: default_logging(),
        }
    }
}

impl Config {
    /// Resolve configuration from CLI, environment variables, config file and
    /// defaults. `local_offset` is the offset detected from the system.
    pub fn load(cli: &Cli, local_offset: UtcOffset) -> Result<Self> {
        // built-in defaults
        let mut settings = Settings {
            utc_offset: local_offset,
            ..Settings::default()
        };
        let mut user: Option<String> = None;
        let mut db_path: Option<PathBuf> = None;
        let mut logging = default_logging();
        let mut offset: Option<String> = None;

        // config file path precedence: CLI -> ENV -> default
        let config_path = cli
            .config
            .clone()
            .or_else(|| std::env::var("CHAT_CLIENT_CONFIG").ok().map(PathBuf::from))
            .unwrap_or_else(|| PathBuf::from("config/chat_client.toml"));

        if let Ok(bytes) = fs::read(&config_path) {
            let contents = String::from_utf8_lossy(&bytes);
            let file_cfg: FileConfig = toml::from_str(&contents).context("invalid config file")?;
            user = file_cfg.session.user;
            offset = file_cfg.session.utc_offset;
            db_path = file_cfg.store.path;
            logging = file_cfg.logging.enabled;
            let limits = file_cfg.limits;
            settings.page_size = limits.page_size.unwrap_or(settings.page_size);
            settings.feed_limit = limits.feed.unwrap_or(settings.feed_limit);
            settings.contacts_limit = limits.contacts.unwrap_or(settings.contacts_limit);
            settings.search_limit = limits.search.unwrap_or(settings.search_limit);
        }

        // environment overrides
        if let Ok(u) = std::env::var("CHAT_CLIENT_USER") {
            user = Some(u);
        }
        if let Ok(p) = std::env::var("CHAT_CLIENT_DB") {
            db_path = Some(PathBuf::from(p));
        }
        if let Ok(l) = std::env::var("CHAT_CLIENT_LOGGING") {
            if let Ok(l) = l.parse::<bool>() {
                logging = l;
            }
        }
        if let Ok(o) = std::env::var("CHAT_CLIENT_UTC_OFFSET") {
            offset = Some(o);
        }

        // CLI overrides
        if let Some(u) = &cli.user {
            user = Some(u.clone());
        }
        if let Some(p) = &cli.db {
            db_path = Some(p.clone());
        }
        if let Some(l) = cli.logging {
            logging = l;
        }
        if let Some(o) = &cli.utc_offset {
            offset = Some(o.clone());
        }

        if let Some(o) = offset {
            settings.utc_offset = parse_utc_offset(&o)?;
        }
        if settings.page_size == 0 || settings.feed_limit == 0 {
            anyhow::bail!("invalid_limits");
        }
        let user = user
            .map(|u| u.trim().to_string())
            .filter(|u| !u.is_empty())
            .context("no user configured")?;
        let db_path = match db_path {
            Some(p) => p,
            None => chat_store::default_db_path()?,
        };

        Ok(Self {
            user,
            db_path,
            logging_enabled: logging,
            settings,
        })
    }
}

/// Parse `Z`, `+HH`, `+HH:MM` or `-HH:MM`.
pub fn parse_utc_offset(s: &str) -> Result<UtcOffset> {
    let s = s.trim();
    if s.eq_ignore_ascii_case("z") || s.eq_ignore_ascii_case("utc") {
        return Ok(UtcOffset::UTC);
    }
    let (sign, rest) = match s.as_bytes().first() {
        Some(b'+') => (1, &s[1..]),
        Some(b'-') => (-1, &s[1..]),
        _ => anyhow::bail!("invalid utc offset `{s}`"),
    };
    let (h, m) = rest.split_once(':').unwrap_or((rest, "0"));
    let digits = |part: &str| !part.is_empty() && part.bytes().all(|b| b.is_ascii_digit());
    if !digits(h) || !digits(m) {
        anyhow::bail!("invalid utc offset `{s}`");
    }
    let hours: i8 = h.parse().with_context(|| format!("invalid utc offset `{s}`"))?;
    let minutes: i8 = m.parse().with_context(|| format!("invalid utc offset `{s}`"))?;
    UtcOffset::from_hms(sign * hours, sign * minutes, 0)
        .with_context(|| format!("utc offset `{s}` out of range"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use std::fs;

    fn clear_env() {
        for var in [
            "CHAT_CLIENT_CONFIG",
            "CHAT_CLIENT_USER",
            "CHAT_CLIENT_DB",
            "CHAT_CLIENT_LOGGING",
            "CHAT_CLIENT_UTC_OFFSET",
        ] {
            std::env::remove_var(var);
        }
    }

    #[test]
    #[serial]
    fn valid_config_parses() {
        clear_env();
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cfg.toml");
        fs::write(
            &path,
            "[session]\nuser=\"alice\"\nutc_offset=\"+02:00\"\n[store]\npath=\"/tmp/x.db\"\n[logging]\nenabled=false\n[limits]\npage_size=5\n",
        )
        .unwrap();
        let cli = Cli {
            config: Some(path),
            ..Default::default()
        };
        let cfg = Config::load(&cli, UtcOffset::UTC).unwrap();
        assert_eq!(cfg.user, "alice");
        assert_eq!(cfg.db_path, PathBuf::from("/tmp/x.db"));
        assert!(!cfg.logging_enabled);
        assert_eq!(cfg.settings.page_size, 5);
        assert_eq!(cfg.settings.feed_limit, 100);
        assert_eq!(cfg.settings.utc_offset, UtcOffset::from_hms(2, 0, 0).unwrap());
    }

    #[test]
    #[serial]
    fn missing_user_fails() {
        clear_env();
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cfg.toml");
        fs::write(&path, "").unwrap();
        let cli = Cli {
            config: Some(path),
            ..Default::default()
        };
        assert!(Config::load(&cli, UtcOffset::UTC).is_err());
    }

    #[test]
    #[serial]
    fn zero_page_size_fails() {
        clear_env();
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cfg.toml");
        fs::write(&path, "[session]\nuser=\"a\"\n[limits]\npage_size=0\n").unwrap();
        let cli = Cli {
            config: Some(path),
            ..Default::default()
        };
        assert!(Config::load(&cli, UtcOffset::UTC).is_err());
    }

    #[test]
    #[serial]
    fn precedence_cli_env_file() {
        clear_env();
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cfg.toml");
        fs::write(
            &path,
            "[session]\nuser=\"file\"\nutc_offset=\"+01:00\"\n[store]\npath=\"chat.db\"\n",
        )
        .unwrap();
        std::env::set_var("CHAT_CLIENT_USER", "env");
        std::env::set_var("CHAT_CLIENT_UTC_OFFSET", "-03:30");
        let cli = Cli {
            config: Some(path.clone()),
            user: Some("cli".into()),
            ..Default::default()
        };
        let cfg = Config::load(&cli, UtcOffset::UTC).unwrap();
        assert_eq!(cfg.user, "cli");
        assert_eq!(cfg.settings.utc_offset, UtcOffset::from_hms(-3, -30, 0).unwrap());

        let cli = Cli {
            config: Some(path),
            ..Default::default()
        };
        assert_eq!(Config::load(&cli, UtcOffset::UTC).unwrap().user, "env");
        clear_env();
    }

    #[test]
    #[serial]
    fn config_path_from_env_and_detected_offset() {
        clear_env();
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cfg.toml");
        fs::write(&path, "[session]\nuser=\"bob\"\n[store]\npath=\"chat.db\"\n").unwrap();
        std::env::set_var("CHAT_CLIENT_CONFIG", &path);
        let local = UtcOffset::from_hms(5, 30, 0).unwrap();
        let cfg = Config::load(&Cli::default(), local).unwrap();
        assert_eq!(cfg.user, "bob");
        assert_eq!(cfg.settings.utc_offset, local);
        assert!(cfg.logging_enabled);
        clear_env();
    }

    #[test]
    fn offsets() {
        assert_eq!(parse_utc_offset("Z").unwrap(), UtcOffset::UTC);
        assert_eq!(
            parse_utc_offset("+05").unwrap(),
            UtcOffset::from_hms(5, 0, 0).unwrap()
        );
        assert!(parse_utc_offset("0530").is_err());
        assert!(parse_utc_offset("+ab:00").is_err());
        assert!(parse_utc_offset("+30:00").is_err());
        assert!(parse_utc_offset("+-05:00").is_err());
        assert!(parse_utc_offset("-05:-30").is_err());
        assert!(parse_utc_offset("+05:+30").is_err());
        assert!(parse_utc_offset("+").is_err());
        assert_eq!(
            parse_utc_offset("-03:30").unwrap(),
            UtcOffset::from_hms(-3, -30, 0).unwrap()
        );
    }
}
