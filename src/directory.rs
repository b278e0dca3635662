//! Static channel metadata kept in `vtuber.json`.

use std::{collections::BTreeMap, path::Path, sync::OnceLock};

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::{
    snapshot::{ChannelBucket, Snapshot},
    util::{self, HttpClient},
};

pub const DEFAULT_CHANNEL_NAME: &str = "John Doe Ch.";
pub const DEFAULT_CHANNEL_URL: &str = "https://www.youtube.com/@notfound";
pub const DEFAULT_AVATAR_URL: &str = "https://yt3.googleusercontent.com/U3KyLvyQRzOrgRHZYEYPQCc1QS2Jx5LnQF_5H6aYDluVM8AOnAZ90U0tSY3aVobgVNlRccieDA";

#[derive(thiserror::Error, Debug)]
pub enum DirectoryError {
    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),
    #[error("Could not (de)serialize directory: {0}")]
    JsonError(#[from] serde_json::Error),
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Links {
    pub youtube: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DirectoryEntry {
    pub channel_name: Option<String>,
    #[serde(default)]
    pub link: Links,
    pub avatar_url: Option<String>,
    /// Fields this tool does not manage are written back untouched.
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ChannelDirectory {
    pub entries: BTreeMap<String, DirectoryEntry>,
}

impl ChannelDirectory {
    pub fn from_json(json: &str) -> Result<Self, DirectoryError> {
        Ok(serde_json::from_str(json)?)
    }

    pub async fn load(path: &Path) -> Result<Self, DirectoryError> {
        Self::from_json(&tokio::fs::read_to_string(path).await?)
    }

    /// An absent directory only means no display metadata.
    pub async fn load_or_empty(path: &Path) -> Self {
        match Self::load(path).await {
            Ok(d) => d,
            Err(e) => {
                warn!("No channel directory from {}: {}", path.display(), e);
                Self::default()
            }
        }
    }

    pub async fn save(&self, path: &Path) -> Result<(), DirectoryError> {
        let json = serde_json::to_string_pretty(self)?;
        util::write_atomic(path, json.as_bytes()).await?;
        Ok(())
    }

    pub fn get(&self, channel_id: &str) -> Option<&DirectoryEntry> {
        self.entries.get(channel_id)
    }

    /// Empty bucket for a directory channel, with defaults for missing fields.
    pub fn empty_bucket(&self, channel_id: &str) -> ChannelBucket {
        let entry = self.get(channel_id).cloned().unwrap_or_default();
        ChannelBucket {
            channel_id: channel_id.to_string(),
            channel_name: entry
                .channel_name
                .unwrap_or_else(|| DEFAULT_CHANNEL_NAME.to_string()),
            channel_url: entry
                .link
                .youtube
                .unwrap_or_else(|| DEFAULT_CHANNEL_URL.to_string()),
            avatar_url: Some(
                entry
                    .avatar_url
                    .unwrap_or_else(|| DEFAULT_AVATAR_URL.to_string()),
            ),
            videos: Vec::new(),
        }
    }

    /// Overlays directory metadata onto a freshly scraped bucket.
    pub fn apply(&self, bucket: &mut ChannelBucket) {
        if let Some(entry) = self.get(&bucket.channel_id) {
            if let Some(name) = &entry.channel_name {
                bucket.channel_name = name.clone();
            }
            if let Some(avatar) = &entry.avatar_url {
                bucket.avatar_url = Some(avatar.clone());
            }
        }
    }

    /// Rebuilds a snapshot so that it holds exactly the directory channels,
    /// keeping the videos of channels that already had some.
    pub fn seed(&self, existing: &Snapshot) -> Snapshot {
        let mut seeded = Snapshot::new();
        for channel_id in self.entries.keys() {
            let mut bucket = self.empty_bucket(channel_id);
            if let Some(prev) = existing.get(channel_id) {
                bucket.videos = prev.videos.clone();
            }
            seeded.insert(bucket);
        }
        seeded
    }

    /// Refetches every channel page and stores the avatar found there.
    /// Channels whose page cannot be read keep no avatar.
    pub async fn refresh_avatars(&mut self, client: &HttpClient) -> usize {
        let mut found = 0;
        for (channel_id, entry) in self.entries.iter_mut() {
            let Some(url) = entry.link.youtube.clone() else {
                warn!("No YouTube link for {}", channel_id);
                continue;
            };
            info!("Getting avatar from: {}", url);
            entry.avatar_url = match client.fetch_text(&url).await {
                Ok(html) => {
                    let avatar = find_avatar_url(&html);
                    if avatar.is_none() {
                        warn!("No avatar URL on {}", url);
                    }
                    avatar
                }
                Err(e) => {
                    warn!("Unable to access {}: {}", url, e);
                    None
                }
            };
            found += usize::from(entry.avatar_url.is_some());
        }
        found
    }
}

pub fn find_avatar_url(html: &str) -> Option<String> {
    static AVATAR_RE: OnceLock<Regex> = OnceLock::new();
    AVATAR_RE
        .get_or_init(|| {
            Regex::new(r"https://yt3\.googleusercontent\.com/(ytc/)?([a-zA-Z0-9_-]+)")
                .expect("avatar pattern is valid")
        })
        .find(html)
        .map(|m| m.as_str().trim().to_string())
}
