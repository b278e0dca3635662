use std::{
    collections::HashMap,
    path::{Path, PathBuf},
    time::Duration,
};

use chrono::{DateTime, FixedOffset, Utc};
use futures::{stream, StreamExt};

use crate::{
    classifier::Classifier,
    config::Environment,
    digest::DigestBuilder,
    directory::ChannelDirectory,
    gate::{ChangeGate, Decision, GateError},
    notify::{Mailer, NotifyError, Webhook},
    scraper::{ChannelStreams, Scraper},
    snapshot::{ChannelBucket, Snapshot, SnapshotError, SnapshotKind, StreamRecord},
    translate::{self, TranslationStore, Translator},
};

#[derive(thiserror::Error, Debug)]
pub enum RunError {
    #[error("Could not read channel list {0}: {1}")]
    ChannelList(PathBuf, std::io::Error),
    #[error("Channel list {0} is empty")]
    EmptyChannelList(PathBuf),
    #[error("Hash file error")]
    GateError(#[from] GateError),
    #[error("Snapshot error")]
    SnapshotError(#[from] SnapshotError),
}

/// Channel URLs, one per line. Blank lines and `#` comments are skipped.
pub async fn read_channel_list(path: &Path) -> Result<Vec<String>, RunError> {
    let text = tokio::fs::read_to_string(path)
        .await
        .map_err(|e| RunError::ChannelList(path.to_path_buf(), e))?;
    let urls: Vec<String> = text
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty() && !l.starts_with('#'))
        .map(String::from)
        .collect();

    if urls.is_empty() {
        return Err(RunError::EmptyChannelList(path.to_path_buf()));
    }
    Ok(urls)
}

/// Fetches every channel with at most `workers` in flight. Failed or
/// timed-out channels are logged and left out.
pub async fn fetch_all(
    scraper: &dyn Scraper,
    urls: &[String],
    workers: usize,
    timeout: Duration,
) -> Vec<ChannelStreams> {
    stream::iter(urls)
        .map(|url| async move {
            match tokio::time::timeout(timeout, scraper.fetch_channel(url)).await {
                Ok(Ok(streams)) => Some(streams),
                Ok(Err(e)) => {
                    error!("Failed to fetch data for {}: {}", url, e);
                    None
                }
                Err(_) => {
                    error!("Timed out fetching {} after {:?}", url, timeout);
                    None
                }
            }
        })
        .buffer_unordered(workers.max(1))
        .filter_map(|r| async move { r })
        .collect()
        .await
}

fn push_bucket(
    snapshot: &mut HashMap<String, ChannelBucket>,
    directory: &ChannelDirectory,
    streams: &ChannelStreams,
    videos: &[StreamRecord],
) {
    let bucket = snapshot
        .entry(streams.channel_id.clone())
        .or_insert_with(|| {
            let mut bucket = ChannelBucket {
                channel_id: streams.channel_id.clone(),
                channel_name: streams
                    .channel_name
                    .clone()
                    .unwrap_or_else(|| streams.channel_id.clone()),
                channel_url: streams.channel_url.clone(),
                avatar_url: None,
                videos: Vec::new(),
            };
            directory.apply(&mut bucket);
            bucket
        });
    bucket.videos.extend_from_slice(videos);
}

/// Merges per-channel results into the (upcoming, live) snapshots.
pub fn merge(results: &[ChannelStreams], directory: &ChannelDirectory) -> (Snapshot, Snapshot) {
    let mut upcoming = HashMap::new();
    let mut live = HashMap::new();

    for streams in results {
        push_bucket(&mut upcoming, directory, streams, &streams.upcoming);
        push_bucket(&mut live, directory, streams, &streams.live);
    }

    let into_snapshot = |buckets: HashMap<String, ChannelBucket>| {
        let mut snapshot = Snapshot::new();
        buckets.into_values().for_each(|b| snapshot.insert(b));
        snapshot
    };
    (into_snapshot(upcoming), into_snapshot(live))
}

pub struct Translation<'a> {
    pub store: &'a TranslationStore,
    pub translator: &'a dyn Translator,
}

pub struct RunSettings {
    pub state_dir: PathBuf,
    pub workers: usize,
    pub fetch_timeout: Duration,
    pub environment: Environment,
    pub tz: FixedOffset,
}

#[derive(Debug, Clone, PartialEq)]
pub struct KindReport {
    pub decision: Decision,
    pub new: usize,
    pub imminent: usize,
    pub emailed: bool,
    pub pushed: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RunReport {
    pub channels: usize,
    pub upcoming: KindReport,
    pub live: KindReport,
}

pub struct Pipeline<'a> {
    pub scraper: &'a dyn Scraper,
    pub mailer: &'a dyn Mailer,
    pub webhook: Option<&'a dyn Webhook>,
    pub translation: Option<Translation<'a>>,
    pub directory: &'a ChannelDirectory,
    pub classifier: &'a Classifier,
    pub settings: RunSettings,
}

impl<'a> Pipeline<'a> {
    pub async fn run(&self, urls: &[String], now: DateTime<Utc>) -> Result<RunReport, RunError> {
        let results = fetch_all(
            self.scraper,
            urls,
            self.settings.workers,
            self.settings.fetch_timeout,
        )
        .await;
        info!("Fetched {} of {} channels", results.len(), urls.len());

        let (upcoming, live) = merge(&results, self.directory);

        let translations = match &self.translation {
            Some(t) => {
                let titles = upcoming.records().chain(live.records()).map(|r| r.title.as_str());
                translate::translate_titles(t.store, t.translator, titles, now).await
            }
            None => HashMap::new(),
        };

        let builder = DigestBuilder {
            classifier: self.classifier,
            environment: self.settings.environment,
            tz: self.settings.tz,
            translations: &translations,
        };

        let upcoming_report = self
            .process(&builder, SnapshotKind::Upcoming, &upcoming, now)
            .await?;
        let live_report = self.process(&builder, SnapshotKind::Live, &live, now).await?;

        live.save(&self.snapshot_path(SnapshotKind::Live)).await?;
        upcoming
            .save(&self.snapshot_path(SnapshotKind::Upcoming))
            .await?;

        Ok(RunReport {
            channels: results.len(),
            upcoming: upcoming_report,
            live: live_report,
        })
    }

    fn snapshot_path(&self, kind: SnapshotKind) -> PathBuf {
        self.settings.state_dir.join(kind.snapshot_file())
    }

    async fn process(
        &self,
        builder: &DigestBuilder<'_>,
        kind: SnapshotKind,
        current: &Snapshot,
        now: DateTime<Utc>,
    ) -> Result<KindReport, RunError> {
        let previous = Snapshot::load_or_empty(&self.snapshot_path(kind)).await;
        let digest = builder.build(kind, current, &previous, now);

        let gate = ChangeGate::new(&self.settings.state_dir, kind);
        let decision = gate.evaluate(current, digest.imminent_count()).await?;

        let mut report = KindReport {
            decision,
            new: digest.new_count(),
            imminent: digest.imminent_count(),
            emailed: false,
            pushed: false,
        };

        if !decision.should_send() {
            info!("Nothing changed in {} streams", kind);
            return Ok(report);
        }

        match self.mailer.send(&digest.subject, &digest.html).await {
            Ok(()) => {
                info!("Email sent successfully: {}", digest.subject);
                report.emailed = true;
            }
            Err(NotifyError::NotConfigured) => warn!("Not emailing {} digest, mail is not configured", kind),
            Err(e) => error!("Failed to send {} email: {}", kind, e),
        }

        if let (Some(webhook), Some(text)) = (self.webhook, digest.push.as_deref()) {
            match webhook.push(text).await {
                Ok(()) => {
                    info!("Pushed unarchived {} streams", kind);
                    report.pushed = true;
                }
                Err(e) => error!("Failed to push {} notification: {}", kind, e),
            }
        }

        Ok(report)
    }
}
