use std::{collections::BTreeMap, fmt, path::Path};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};

use crate::util;

/// One discovered video, live or upcoming.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StreamRecord {
    pub video_id: String,
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub thumbnail_url: Option<String>,
    #[serde(default, deserialize_with = "deserialize_lenient_datetime")]
    pub scheduled_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub channel_id: String,
}

impl StreamRecord {
    pub fn watch_url(&self) -> String {
        format!("https://www.youtube.com/watch?v={}", self.video_id)
    }
}

// A schedule that no longer parses is kept as "unknown" instead of failing the
// whole snapshot.
fn deserialize_lenient_datetime<'de, D>(deserializer: D) -> Result<Option<DateTime<Utc>>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Option::<serde_json::Value>::deserialize(deserializer)?;
    Ok(raw
        .as_ref()
        .and_then(|v| v.as_str())
        .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
        .map(|dt| dt.with_timezone(&Utc)))
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChannelBucket {
    #[serde(default)]
    pub channel_id: String,
    pub channel_name: String,
    pub channel_url: String,
    #[serde(default)]
    pub avatar_url: Option<String>,
    #[serde(default)]
    pub videos: Vec<StreamRecord>,
}

impl ChannelBucket {
    /// Sorts videos by id and drops duplicate ids, keeping the first seen.
    pub fn normalize(&mut self) {
        self.videos.sort_by(|a, b| a.video_id.cmp(&b.video_id));
        self.videos.dedup_by(|a, b| a.video_id == b.video_id);
    }

    pub fn contains(&self, video_id: &str) -> bool {
        self.videos.iter().any(|v| v.video_id == video_id)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SnapshotKind {
    Live,
    Upcoming,
}

impl SnapshotKind {
    pub fn snapshot_file(&self) -> &'static str {
        match self {
            SnapshotKind::Live => "live_streams.json",
            SnapshotKind::Upcoming => "upcoming.json",
        }
    }

    pub fn hash_file(&self) -> &'static str {
        match self {
            SnapshotKind::Live => "prev_hash_live.md5",
            SnapshotKind::Upcoming => "prev_hash_upcoming.md5",
        }
    }
}

impl fmt::Display for SnapshotKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SnapshotKind::Live => write!(f, "live"),
            SnapshotKind::Upcoming => write!(f, "upcoming"),
        }
    }
}

#[derive(thiserror::Error, Debug)]
pub enum SnapshotError {
    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),
    #[error("Could not (de)serialize snapshot: {0}")]
    JsonError(#[from] serde_json::Error),
}

/// Channel id to bucket. Keys iterate in ascending order and every bucket is
/// kept normalized, so two equal snapshots always serialize identically.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Snapshot {
    buckets: BTreeMap<String, ChannelBucket>,
}

impl Snapshot {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, mut bucket: ChannelBucket) {
        bucket.normalize();
        self.buckets.insert(bucket.channel_id.clone(), bucket);
    }

    pub fn get(&self, channel_id: &str) -> Option<&ChannelBucket> {
        self.buckets.get(channel_id)
    }

    pub fn buckets(&self) -> impl Iterator<Item = &ChannelBucket> {
        self.buckets.values()
    }

    pub fn records(&self) -> impl Iterator<Item = &StreamRecord> {
        self.buckets.values().flat_map(|b| b.videos.iter())
    }

    pub fn len(&self) -> usize {
        self.buckets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buckets.is_empty()
    }

    /// Compact serialization used for hashing.
    pub fn canonical_json(&self) -> Result<String, SnapshotError> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn from_json(json: &str) -> Result<Self, SnapshotError> {
        let mut snapshot: Snapshot = serde_json::from_str(json)?;
        // Older files may have been written unsorted or keyed differently.
        let buckets = std::mem::take(&mut snapshot.buckets);
        for (key, mut bucket) in buckets {
            if bucket.channel_id.is_empty() {
                bucket.channel_id = key;
            }
            for video in bucket.videos.iter_mut().filter(|v| v.channel_id.is_empty()) {
                video.channel_id = bucket.channel_id.clone();
            }
            snapshot.insert(bucket);
        }
        Ok(snapshot)
    }

    pub async fn load(path: &Path) -> Result<Self, SnapshotError> {
        let json = tokio::fs::read_to_string(path).await?;
        Self::from_json(&json)
    }

    /// Previous state for diffing. A missing or unreadable file means there
    /// is nothing to compare against.
    pub async fn load_or_empty(path: &Path) -> Self {
        match Self::load(path).await {
            Ok(snapshot) => snapshot,
            Err(SnapshotError::IoError(e)) if e.kind() == std::io::ErrorKind::NotFound => {
                info!("No previous snapshot at {}", path.display());
                Self::new()
            }
            Err(e) => {
                warn!("Ignoring previous snapshot {}: {}", path.display(), e);
                Self::new()
            }
        }
    }

    pub async fn save(&self, path: &Path) -> Result<(), SnapshotError> {
        let json = serde_json::to_string_pretty(self)?;
        util::write_atomic(path, json.as_bytes()).await?;
        Ok(())
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    pub(crate) fn record(channel_id: &str, video_id: &str, title: &str) -> StreamRecord {
        StreamRecord {
            video_id: video_id.into(),
            title: title.into(),
            description: None,
            thumbnail_url: None,
            scheduled_at: None,
            channel_id: channel_id.into(),
        }
    }

    pub(crate) fn bucket(channel_id: &str, videos: Vec<StreamRecord>) -> ChannelBucket {
        ChannelBucket {
            channel_id: channel_id.into(),
            channel_name: format!("{} Ch.", channel_id),
            channel_url: format!("https://www.youtube.com/channel/{}", channel_id),
            avatar_url: None,
            videos,
        }
    }

    #[test]
    fn insert_sorts_and_dedups() {
        let mut snapshot = Snapshot::new();
        snapshot.insert(bucket(
            "UCb",
            vec![record("UCb", "z", "z"), record("UCb", "a", "a"), record("UCb", "z", "dup")],
        ));
        snapshot.insert(bucket("UCa", vec![]));

        let keys: Vec<_> = snapshot.buckets().map(|b| b.channel_id.as_str()).collect();
        assert_eq!(keys, vec!["UCa", "UCb"]);

        let ids: Vec<_> = snapshot.get("UCb").unwrap().videos.iter().map(|v| v.video_id.as_str()).collect();
        assert_eq!(ids, vec!["a", "z"]);
        assert!(snapshot.get("UCb").unwrap().contains("z"));
        assert!(!snapshot.get("UCb").unwrap().contains("m"));
    }

    #[test]
    fn serialization_ignores_insertion_order() {
        let mut a = Snapshot::new();
        a.insert(bucket("UCa", vec![record("UCa", "1", "t"), record("UCa", "2", "t")]));
        a.insert(bucket("UCb", vec![record("UCb", "3", "t")]));

        let mut b = Snapshot::new();
        b.insert(bucket("UCb", vec![record("UCb", "3", "t")]));
        b.insert(bucket("UCa", vec![record("UCa", "2", "t"), record("UCa", "1", "t")]));

        assert_eq!(a.canonical_json().unwrap(), b.canonical_json().unwrap());
    }

    #[test]
    fn bad_schedule_is_unknown() {
        let json = r#"{"UCa": {"channel_id": "UCa", "channel_name": "A", "channel_url": "u",
            "videos": [{"video_id": "1", "title": "t", "scheduled_at": "15/02/2024 15:15:00 (GMT+7)", "channel_id": "UCa"}]}}"#;
        let snapshot = Snapshot::from_json(json).unwrap();
        assert_eq!(snapshot.get("UCa").unwrap().videos[0].scheduled_at, None);
    }

    #[tokio::test]
    async fn save_then_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("upcoming.json");

        let mut snapshot = Snapshot::new();
        let mut rec = record("UCa", "1", "ライブ");
        rec.scheduled_at = Some("2024-02-15T08:15:00Z".parse().unwrap());
        snapshot.insert(bucket("UCa", vec![rec]));
        snapshot.save(&path).await.unwrap();

        assert_eq!(Snapshot::load(&path).await.unwrap(), snapshot);
        assert!(Snapshot::load_or_empty(&dir.path().join("missing.json")).await.is_empty());
    }
}
