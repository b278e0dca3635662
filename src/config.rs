use std::{path::PathBuf, time::Duration};

use chrono::FixedOffset;
use clap::{Parser, Subcommand, ValueEnum};

use crate::snapshot::SnapshotKind;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Environment {
    Production,
    Development,
    #[value(name = "self-host")]
    SelfHost,
}

impl Environment {
    pub fn subject(&self, kind: SnapshotKind) -> &'static str {
        match (self, kind) {
            (Environment::Production, SnapshotKind::Upcoming) => {
                "🗓️ Upcoming YouTube Live Streams Notification"
            }
            (Environment::Production, SnapshotKind::Live) => "🔴 YouTube Live Streams Notification",
            (Environment::Development, SnapshotKind::Upcoming) => "[TEST] 🗓️ Upcoming Live Streams",
            (Environment::Development, SnapshotKind::Live) => "[TEST] 🔴 Live Streams",
            (Environment::SelfHost, SnapshotKind::Upcoming) => {
                "[HOST] 🗓️ Upcoming Live Streams Notification"
            }
            (Environment::SelfHost, SnapshotKind::Live) => "[HOST] 🔴 Live Streams Notification",
        }
    }
}

#[derive(thiserror::Error, Debug)]
pub enum ConfigError {
    #[error("Invalid UTC offset: {0} hours")]
    InvalidOffset(i32),
    #[error("Missing setting {0}")]
    Missing(&'static str),
}

#[derive(Debug, Parser)]
#[command(name = "yt-live-notify", version, about)]
pub struct Cli {
    #[command(flatten)]
    pub config: Config,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Debug, Clone, Subcommand)]
pub enum Command {
    /// Fetch all channels, send digests and persist state (default)
    Run,
    /// Rebuild both snapshot files so every directory channel has a bucket
    Seed,
    /// Refresh avatar URLs in the channel directory
    Avatars,
    /// Print the number of cached title translations
    CountTitles,
    /// Delete cached translations not used within the retention period
    Sweep,
    /// Write COOKIES_CONTENT into the cookies file
    Cookies,
}

#[derive(Debug, Clone, clap::Args)]
pub struct Config {
    #[arg(long, env = "ENV", value_enum, default_value = "production")]
    pub environment: Environment,

    /// Directory holding snapshots, hash files and the translation cache
    #[arg(long, env = "STATE_DIR", default_value = ".")]
    pub state_dir: PathBuf,

    #[arg(long, env = "CHANNEL_LIST", default_value = "channel_url.txt")]
    pub channel_list: PathBuf,

    #[arg(long, env = "DIRECTORY_FILE", default_value = "vtuber.json")]
    pub directory_file: PathBuf,

    #[arg(long, env = "TRANSLATION_DB", default_value = "titles.db")]
    pub translation_db: PathBuf,

    #[arg(long, env = "SENDER_EMAIL")]
    pub sender_email: Option<String>,

    #[arg(long, env = "SENDER_PWD", hide_env_values = true)]
    pub sender_password: Option<String>,

    #[arg(long, env = "RECEIVER_EMAIL")]
    pub receiver_email: Option<String>,

    #[arg(long, env = "SMTP_HOST", default_value = "smtp.gmail.com")]
    pub smtp_host: String,

    #[arg(long, env = "SMTP_PORT", default_value_t = 587)]
    pub smtp_port: u16,

    #[arg(long, env = "WEBHOOK_URL")]
    pub webhook_url: Option<String>,

    /// Target language for title translation; translation is off when unset
    #[arg(long, env = "TRANSLATE_TO")]
    pub translate_to: Option<String>,

    #[arg(long, env = "RETENTION_DAYS", default_value_t = 30)]
    pub retention_days: i64,

    #[arg(long, env = "TZ_OFFSET_HOURS", default_value_t = 7, allow_negative_numbers = true)]
    pub tz_offset_hours: i32,

    #[arg(long, env = "WORKERS", default_value_t = 10)]
    pub workers: usize,

    #[arg(long, env = "FETCH_TIMEOUT_SECS", default_value_t = 120)]
    pub fetch_timeout_secs: u64,

    /// Live or upcoming entries considered per channel
    #[arg(long, env = "MAX_ENTRIES", default_value_t = 11)]
    pub max_entries: usize,

    /// Video ids never reported
    #[arg(long, env = "SKIP_STREAMS", value_delimiter = ',', default_value = "O9V_EFbgpKQ")]
    pub skip_streams: Vec<String>,

    #[arg(long, env = "YT_DLP", default_value = "yt-dlp")]
    pub yt_dlp: PathBuf,

    #[arg(long, env = "COOKIES_FILE")]
    pub cookies_file: Option<PathBuf>,

    #[arg(long, env = "COOKIES_CONTENT", hide_env_values = true)]
    pub cookies_content: Option<String>,
}

impl Config {
    pub fn tz(&self) -> Result<FixedOffset, ConfigError> {
        FixedOffset::east_opt(self.tz_offset_hours * 3600)
            .ok_or(ConfigError::InvalidOffset(self.tz_offset_hours))
    }

    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_secs(self.fetch_timeout_secs)
    }

    pub fn state_path(&self, file: &str) -> PathBuf {
        self.state_dir.join(file)
    }

    pub fn translation_db_path(&self) -> PathBuf {
        self.state_dir.join(&self.translation_db)
    }
}
