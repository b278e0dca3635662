//! Composes the notification email and push text for one snapshot kind.

use std::collections::HashMap;

use chrono::{DateTime, Duration, FixedOffset, Utc};

use crate::{
    classifier::{Classification, Classifier, FilterTotals},
    config::Environment,
    snapshot::{ChannelBucket, Snapshot, SnapshotKind, StreamRecord},
    util::{self, escape_html},
};

/// Streams starting within this many minutes are highlighted.
pub const IMMINENT_MINUTES: i64 = 15;

const NEW_BADGE: &str = r#"<span style="font-weight: bold; background-color: greenyellow; padding: 3px; margin: 4px; border-radius: 30%;">New!</span>"#;

pub fn is_imminent(record: &StreamRecord, now: DateTime<Utc>) -> bool {
    record
        .scheduled_at
        .map(|at| at - now <= Duration::minutes(IMMINENT_MINUTES))
        .unwrap_or(false)
}

/// A record is new unless the previous snapshot had it under the same channel.
pub fn is_new(record: &StreamRecord, previous: &Snapshot) -> bool {
    previous
        .get(&record.channel_id)
        .map(|bucket| !bucket.contains(&record.video_id))
        .unwrap_or(true)
}

#[derive(Debug, Clone, PartialEq)]
pub struct EntryStatus {
    pub channel_id: String,
    pub video_id: String,
    pub is_new: bool,
    pub is_imminent: bool,
    pub classification: Classification,
}

#[derive(Debug, Clone)]
pub struct Digest {
    pub kind: SnapshotKind,
    pub subject: String,
    pub html: String,
    /// Plain-text push, present when any stream is unarchived.
    pub push: Option<String>,
    pub entries: Vec<EntryStatus>,
    pub totals: FilterTotals,
}

impl Digest {
    pub fn new_count(&self) -> usize {
        self.entries.iter().filter(|e| e.is_new).count()
    }

    pub fn imminent_count(&self) -> usize {
        self.entries.iter().filter(|e| e.is_imminent).count()
    }

    pub fn entry(&self, video_id: &str) -> Option<&EntryStatus> {
        self.entries.iter().find(|e| e.video_id == video_id)
    }
}

pub struct DigestBuilder<'a> {
    pub classifier: &'a Classifier,
    pub environment: Environment,
    pub tz: FixedOffset,
    /// Original title to translated title.
    pub translations: &'a HashMap<String, String>,
}

impl<'a> DigestBuilder<'a> {
    fn local_time(&self, dt: DateTime<Utc>) -> String {
        let hours = self.tz.local_minus_utc() / 3600;
        format!(
            "{} (GMT{:+})",
            dt.with_timezone(&self.tz).format("%d/%m/%Y %H:%M:%S"),
            hours
        )
    }

    pub fn build(
        &self,
        kind: SnapshotKind,
        current: &Snapshot,
        previous: &Snapshot,
        now: DateTime<Utc>,
    ) -> Digest {
        let mut totals = FilterTotals::new(self.classifier);
        let mut entries = Vec::new();
        let mut list = String::new();
        let mut push_groups = Vec::new();

        for bucket in current.buckets().filter(|b| !b.videos.is_empty()) {
            list.push_str(&format!(
                r#"<li><strong style="font-size: 18px;">{} ({})</strong> - <a href="{}"><strong>Visit Channel</strong></a><ul>"#,
                escape_html(&bucket.channel_name),
                escape_html(&bucket.channel_id),
                escape_html(&bucket.channel_url),
            ));

            let mut unarchived = Vec::new();
            for record in &bucket.videos {
                let status = EntryStatus {
                    channel_id: bucket.channel_id.clone(),
                    video_id: record.video_id.clone(),
                    is_new: is_new(record, previous),
                    is_imminent: kind == SnapshotKind::Upcoming && is_imminent(record, now),
                    classification: self.classifier.classify(record),
                };
                totals.add(&status.classification);
                list.push_str(&self.render_entry(kind, record, &status, now));

                if self.classifier.is_unarchived(&status.classification) {
                    unarchived.push(record);
                }
                entries.push(status);
            }
            list.push_str("</ul></li>");

            if !unarchived.is_empty() {
                push_groups.push(self.render_push_group(bucket, &unarchived));
            }
        }

        let new_count = entries.iter().filter(|e| e.is_new).count();
        let imminent_count = entries.iter().filter(|e| e.is_imminent).count();

        let mut header = String::new();
        for (i, filter) in self.classifier.filters().iter().enumerate() {
            if totals.get(i) > 0 {
                header.push_str(&format!(
                    r#"<h2 style="color: green; font-weight: bold;">{} {} {} Live Streams</h2>"#,
                    filter.icon,
                    totals.get(i),
                    escape_html(&filter.name)
                ));
            }
        }
        if new_count > 0 {
            header.push_str(&format!(
                r#"<h2 style="color: blue; font-weight: bold;">🆕 {} New Live Streams</h2>"#,
                new_count
            ));
        }
        if imminent_count > 0 {
            header.push_str(&format!(
                r#"<h2 style="color: orange; font-weight: bold;">💠 {} Live Streams will live soon!</h2>"#,
                imminent_count
            ));
        }

        let title = match kind {
            SnapshotKind::Upcoming => "📹 Upcoming YouTube Live Streams",
            SnapshotKind::Live => "🔴 YouTube Live Streams",
        };
        let html = format!(
            r#"<!DOCTYPE html><html><head><meta charset="UTF-8"></head><body><h1>{}</h1><br />{}<ul>{}</ul></body></html>"#,
            title, header, list
        );

        let subject = format!(
            "{} {}",
            self.environment.subject(kind),
            now.with_timezone(&self.tz).format("%d/%m/%Y %H:%M:%S")
        );

        let push = if push_groups.is_empty() {
            None
        } else {
            Some(format!(
                "🚨 Unarchived {} streams\n\n{}",
                kind,
                push_groups.join("\n")
            ))
        };

        Digest {
            kind,
            subject,
            html,
            push,
            entries,
            totals,
        }
    }

    fn render_entry(
        &self,
        kind: SnapshotKind,
        record: &StreamRecord,
        status: &EntryStatus,
        now: DateTime<Utc>,
    ) -> String {
        let unarchived = self.classifier.is_unarchived(&status.classification);
        let style = match kind {
            SnapshotKind::Upcoming => format!(
                "{}{}",
                if status.is_imminent { "color: red; " } else { "" },
                if unarchived {
                    "color: blue; font-weight: bold; font-style: oblique;"
                } else {
                    ""
                }
            ),
            SnapshotKind::Live if unarchived => {
                "color: red; font-weight: bold; font-style: oblique;".to_string()
            }
            SnapshotKind::Live => String::new(),
        };

        let badges: String = status
            .classification
            .matched
            .iter()
            .filter_map(|&i| self.classifier.filters().get(i))
            .map(|f| f.badge())
            .collect();

        let translated = self
            .translations
            .get(&record.title)
            .filter(|t| **t != record.title)
            .map(|t| {
                format!(
                    "<br /><span><strong>🌐 Translated: </strong>{}</span>",
                    escape_html(t)
                )
            })
            .unwrap_or_default();

        let thumbnail = record
            .thumbnail_url
            .as_deref()
            .map(|u| format!(r#"<br /><span><strong>🖼️ Thumbnail: </strong> <img src="{}"/></span>"#, escape_html(u)))
            .unwrap_or_default();

        let (schedule, action) = match kind {
            SnapshotKind::Upcoming => {
                let schedule = match record.scheduled_at {
                    Some(at) => format!(
                        "<br /><span><strong>{} Scheduled for: </strong>{} ({} from now)</span>",
                        util::clock_emoji(&at.with_timezone(&self.tz)),
                        self.local_time(at),
                        util::format_delta(at - now)
                    ),
                    None => "<br /><span><strong>🕛 Scheduled for: </strong>unknown</span>".into(),
                };
                (schedule, "▶️ Open Stream")
            }
            SnapshotKind::Live => (String::new(), "▶️ Watch Stream"),
        };

        format!(
            r#"<hr /><li style="list-style-type: none; {style}"><span><strong>🏷️ Title: </strong>{title}</span> {badges} {new}{translated}<br /><br /><span><strong>🆔 Stream ID: </strong><span style="font-weight: bold; font-family: consolas, 'Times New Roman', tahoma; font-size:x-large;">{id}</span></span>{thumbnail}{schedule}<br /><a href="{url}"><strong>{action}</strong></a></li>"#,
            style = style,
            title = escape_html(&record.title),
            badges = badges,
            new = if status.is_new { NEW_BADGE } else { "" },
            translated = translated,
            id = escape_html(&record.video_id),
            thumbnail = thumbnail,
            schedule = schedule,
            url = record.watch_url(),
            action = action,
        )
    }

    fn render_push_group(&self, bucket: &ChannelBucket, records: &[&StreamRecord]) -> String {
        let mut text = format!("{}:\n", bucket.channel_name);
        for record in records {
            text.push_str(&format!("- {}\n  {}\n", record.title, record.watch_url()));
            if let Some(at) = record.scheduled_at {
                text.push_str(&format!("  {}\n", self.local_time(at)));
            }
        }
        text
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::snapshot::tests::{bucket, record};

    fn builder<'a>(classifier: &'a Classifier, translations: &'a HashMap<String, String>) -> DigestBuilder<'a> {
        DigestBuilder {
            classifier,
            environment: Environment::Production,
            tz: FixedOffset::east_opt(7 * 3600).unwrap(),
            translations,
        }
    }

    fn now() -> DateTime<Utc> {
        "2024-02-15T08:00:00Z".parse().unwrap()
    }

    fn scheduled(channel: &str, id: &str, title: &str, minutes: i64) -> StreamRecord {
        let mut r = record(channel, id, title);
        r.scheduled_at = Some(now() + Duration::minutes(minutes));
        r
    }

    #[test]
    fn imminent_window() {
        assert!(is_imminent(&scheduled("UCa", "1", "t", 15), now()));
        assert!(is_imminent(&scheduled("UCa", "1", "t", -5), now()));
        assert!(!is_imminent(&scheduled("UCa", "1", "t", 16), now()));
        assert!(!is_imminent(&record("UCa", "1", "t"), now()));
    }

    #[test]
    fn new_detection() {
        let mut previous = Snapshot::new();
        previous.insert(bucket("UCa", vec![record("UCa", "1", "t")]));

        assert!(!is_new(&record("UCa", "1", "t"), &previous));
        assert!(is_new(&record("UCa", "2", "t"), &previous));
        assert!(is_new(&record("UCb", "1", "t"), &previous));
        assert!(is_new(&record("UCa", "1", "t"), &Snapshot::new()));
    }

    #[test]
    fn upcoming_digest() {
        let classifier = Classifier::default();
        let translations = HashMap::from([("歌枠".to_string(), "Singing stream".to_string())]);

        let mut previous = Snapshot::new();
        previous.insert(bucket("UCabc", vec![scheduled("UCabc", "1", "歌枠", 120)]));

        let mut current = Snapshot::new();
        current.insert(bucket(
            "UCabc",
            vec![
                scheduled("UCabc", "1", "歌枠", 120),
                scheduled("UCabc", "2", "Unarchived chatting", 5),
            ],
        ));
        current.insert(bucket("UCempty", vec![]));

        let digest = builder(&classifier, &translations).build(SnapshotKind::Upcoming, &current, &previous, now());

        assert_eq!(digest.entries.len(), 2);
        assert_eq!(digest.new_count(), 1);
        assert_eq!(digest.imminent_count(), 1);
        let second = digest.entry("2").unwrap();
        assert!(second.is_new && second.is_imminent);
        assert!(!digest.entry("1").unwrap().is_new);
        assert_eq!(digest.totals.get(0), 1);
        assert_eq!(digest.totals.get(1), 1);

        assert!(digest.subject.starts_with("🗓️ Upcoming YouTube Live Streams Notification 15/02/2024 15:00:00"));
        assert!(digest.html.contains("🆕 1 New Live Streams"));
        assert!(digest.html.contains("💠 1 Live Streams will live soon!"));
        assert!(digest.html.contains("Singing stream"));
        assert!(digest.html.contains("15/02/2024 15:05:00 (GMT+7) (0:05:00 from now)"));
        assert!(!digest.html.contains("UCempty"));

        let push = digest.push.expect("unarchived stream should produce a push");
        assert!(push.contains("UCabc Ch.:"));
        assert!(push.contains("https://www.youtube.com/watch?v=2"));
        assert!(!push.contains("watch?v=1"));
    }

    #[test]
    fn live_digest_has_no_imminent() {
        let classifier = Classifier::default();
        let translations = HashMap::new();
        let mut current = Snapshot::new();
        current.insert(bucket("UCa", vec![scheduled("UCa", "1", "Zatsudan", 0)]));

        let mut b = builder(&classifier, &translations);
        b.environment = Environment::Development;
        let digest = b.build(SnapshotKind::Live, &current, &current, now());

        assert_eq!(digest.imminent_count(), 0);
        assert_eq!(digest.new_count(), 0);
        assert!(digest.push.is_none());
        assert!(digest.subject.starts_with("[TEST] 🔴 Live Streams"));
        assert!(digest.html.contains("Watch Stream"));
    }

    #[test]
    fn titles_are_escaped() {
        let classifier = Classifier::default();
        let translations = HashMap::new();
        let mut current = Snapshot::new();
        current.insert(bucket("UCa", vec![record("UCa", "1", "<script>")]));

        let digest = builder(&classifier, &translations).build(SnapshotKind::Live, &current, &Snapshot::new(), now());
        assert!(digest.html.contains("&lt;script&gt;"));
    }
}
