use std::path::PathBuf;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_aux::prelude::*;

use crate::snapshot::StreamRecord;

/// Upcoming streams further out than this are ignored.
pub const HORIZON_DAYS: i64 = 50;

#[derive(thiserror::Error, Debug)]
pub enum ScrapeError {
    #[error("I/O error")]
    IoError(#[from] std::io::Error),
    #[error("yt-dlp exited with {0}: {1}")]
    ExitStatus(std::process::ExitStatus, String),
    #[error("Could not parse yt-dlp output")]
    ParseError(#[from] serde_json::Error),
}

/// Streams found on one channel.
#[derive(Debug, Clone, PartialEq)]
pub struct ChannelStreams {
    pub channel_id: String,
    pub channel_name: Option<String>,
    pub channel_url: String,
    pub upcoming: Vec<StreamRecord>,
    pub live: Vec<StreamRecord>,
}

#[async_trait]
pub trait Scraper: Send + Sync {
    async fn fetch_channel(&self, channel_url: &str) -> Result<ChannelStreams, ScrapeError>;
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct PlaylistInfo {
    pub uploader_id: Option<String>,
    pub channel: Option<String>,
    #[serde(default)]
    pub entries: Vec<PlaylistEntry>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct PlaylistEntry {
    pub id: String,
    #[serde(default)]
    pub title: String,
    pub live_status: Option<LiveStatus>,
    pub description: Option<String>,
    #[serde(default)]
    pub thumbnails: Vec<Thumbnail>,
    #[serde(default, deserialize_with = "deserialize_option_number_from_string")]
    pub release_timestamp: Option<i64>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Thumbnail {
    pub url: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LiveStatus {
    IsUpcoming,
    IsLive,
    WasLive,
    NotLive,
    PostLive,
    #[serde(other)]
    Unknown,
}

#[derive(Debug, Clone, Default)]
pub struct ListingOptions {
    pub max_entries: usize,
    pub skip_streams: Vec<String>,
}

fn streams_url(channel_url: &str) -> String {
    let trimmed = channel_url.trim_end_matches('/');
    if trimmed.ends_with("/streams") {
        trimmed.to_string()
    } else {
        format!("{}/streams", trimmed)
    }
}

impl PlaylistInfo {
    /// Picks the live and upcoming entries out of a channel's streams tab.
    pub fn into_streams(self, channel_url: &str, opts: &ListingOptions, now: DateTime<Utc>) -> ChannelStreams {
        let channel_id = self
            .uploader_id
            .filter(|id| !id.is_empty())
            .unwrap_or_else(|| {
                channel_url
                    .trim_end_matches('/')
                    .rsplit('/')
                    .next()
                    .unwrap_or(channel_url)
                    .to_string()
            });
        info!("Searching from channel: {}", channel_id);

        let mut upcoming = Vec::new();
        let mut live = Vec::new();
        let mut count = 0;

        for entry in self.entries {
            if count >= opts.max_entries {
                break;
            }
            let status = match entry.live_status {
                Some(s @ (LiveStatus::IsUpcoming | LiveStatus::IsLive)) => s,
                _ => continue,
            };
            if opts.skip_streams.contains(&entry.id) {
                continue;
            }

            let scheduled_at = entry
                .release_timestamp
                .and_then(|ts| DateTime::<Utc>::from_timestamp(ts, 0));
            let record = StreamRecord {
                thumbnail_url: entry.thumbnails.last().map(|t| t.url.clone()),
                video_id: entry.id,
                title: entry.title,
                description: entry.description,
                scheduled_at,
                channel_id: channel_id.clone(),
            };

            match status {
                LiveStatus::IsUpcoming => {
                    if let Some(at) = scheduled_at {
                        if (at - now).num_days() > HORIZON_DAYS {
                            debug!("Skipping far-off stream {}", record.video_id);
                            continue;
                        }
                    }
                    info!("Found upcoming live stream: {}", record.title);
                    upcoming.push(record);
                }
                _ => {
                    info!("Found live stream: {}", record.title);
                    live.push(record);
                }
            }
            count += 1;
        }

        ChannelStreams {
            channel_id,
            channel_name: self.channel,
            channel_url: channel_url.to_string(),
            upcoming,
            live,
        }
    }
}

/// Runs `yt-dlp` as a subprocess to list a channel's streams tab.
pub struct YtDlp {
    pub program: PathBuf,
    pub cookies: Option<PathBuf>,
    pub options: ListingOptions,
}

impl YtDlp {
    pub async fn dump_playlist(&self, url: &str) -> Result<PlaylistInfo, ScrapeError> {
        let mut cmd = tokio::process::Command::new(&self.program);

        cmd.arg("--flat-playlist")
            .arg("--dump-single-json")
            .arg("--no-warnings")
            .arg("--skip-download");
        if let Some(cookies) = &self.cookies {
            cmd.arg("--cookies").arg(cookies);
        }
        cmd.arg(url).kill_on_drop(true);

        let output = cmd.output().await?;
        if !output.status.success() {
            return Err(ScrapeError::ExitStatus(
                output.status,
                String::from_utf8_lossy(&output.stderr).trim().to_string(),
            ));
        }

        Ok(serde_json::from_slice(&output.stdout)?)
    }
}

#[async_trait]
impl Scraper for YtDlp {
    async fn fetch_channel(&self, channel_url: &str) -> Result<ChannelStreams, ScrapeError> {
        let info = self.dump_playlist(&streams_url(channel_url)).await?;
        Ok(info.into_streams(channel_url, &self.options, Utc::now()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const LISTING: &str = r#"{
        "uploader_id": "@example",
        "channel": "Example Ch.",
        "entries": [
            {"id": "up1", "title": "Karaoke night", "live_status": "is_upcoming",
             "release_timestamp": 1707984900, "description": null,
             "thumbnails": [{"url": "https://i.ytimg.com/small.jpg"}, {"url": "https://i.ytimg.com/big.jpg"}]},
            {"id": "far", "title": "Anniversary", "live_status": "is_upcoming", "release_timestamp": "1717984900"},
            {"id": "O9V_EFbgpKQ", "title": "Free chat", "live_status": "is_upcoming"},
            {"id": "live1", "title": "Now live", "live_status": "is_live"},
            {"id": "old", "title": "Archive", "live_status": "was_live"},
            {"id": "odd", "title": "Premiere", "live_status": "is_premiere"}
        ]
    }"#;

    fn now() -> DateTime<Utc> {
        "2024-02-15T08:00:00Z".parse().unwrap()
    }

    fn options() -> ListingOptions {
        ListingOptions {
            max_entries: 10,
            skip_streams: vec!["O9V_EFbgpKQ".into()],
        }
    }

    #[test]
    fn parses_listing() {
        let info: PlaylistInfo = serde_json::from_str(LISTING).unwrap();
        let streams = info.into_streams("https://www.youtube.com/@example", &options(), now());

        assert_eq!(streams.channel_id, "@example");
        assert_eq!(streams.channel_name.as_deref(), Some("Example Ch."));

        let upcoming: Vec<_> = streams.upcoming.iter().map(|r| r.video_id.as_str()).collect();
        assert_eq!(upcoming, vec!["up1"]);
        assert_eq!(streams.upcoming[0].thumbnail_url.as_deref(), Some("https://i.ytimg.com/big.jpg"));
        assert_eq!(
            streams.upcoming[0].scheduled_at,
            Some("2024-02-15T08:15:00Z".parse().unwrap())
        );

        let live: Vec<_> = streams.live.iter().map(|r| r.video_id.as_str()).collect();
        assert_eq!(live, vec!["live1"]);
        assert_eq!(streams.live[0].channel_id, "@example");
    }

    #[test]
    fn entry_limit() {
        let info: PlaylistInfo = serde_json::from_str(LISTING).unwrap();
        let opts = ListingOptions {
            max_entries: 1,
            ..options()
        };
        let streams = info.into_streams("https://www.youtube.com/@example", &opts, now());
        assert_eq!(streams.upcoming.len(), 1);
        assert!(streams.live.is_empty());
    }

    #[test]
    fn horizon_counts_whole_days() {
        // 50 days 12 hours and 51 days after `now`.
        let json = r#"{"uploader_id": "@example", "entries": [
            {"id": "half", "title": "a", "live_status": "is_upcoming", "release_timestamp": 1712347200},
            {"id": "past", "title": "b", "live_status": "is_upcoming", "release_timestamp": 1712390400}
        ]}"#;
        let info: PlaylistInfo = serde_json::from_str(json).unwrap();
        let streams = info.into_streams("https://www.youtube.com/@example", &options(), now());

        let kept: Vec<_> = streams.upcoming.iter().map(|r| r.video_id.as_str()).collect();
        assert_eq!(kept, vec!["half"]);
    }

    #[test]
    fn channel_id_fallback() {
        let info = PlaylistInfo {
            uploader_id: None,
            channel: None,
            entries: vec![],
        };
        let streams = info.into_streams("https://www.youtube.com/@fallback/", &options(), now());
        assert_eq!(streams.channel_id, "@fallback");
    }

    #[test]
    fn streams_suffix() {
        assert_eq!(streams_url("https://www.youtube.com/@a"), "https://www.youtube.com/@a/streams");
        assert_eq!(streams_url("https://www.youtube.com/@a/streams"), "https://www.youtube.com/@a/streams");
    }
}
