//! Title translation with a SQLite-backed cache.

use std::{
    collections::HashMap,
    path::Path,
    sync::{Arc, Mutex, MutexGuard},
    time::Duration,
};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use tokio_retry::{strategy::FixedInterval, Retry};

use crate::util::{HttpClient, HttpError};

const SCHEMA: &str = "CREATE TABLE IF NOT EXISTS video_titles (
    original_title TEXT PRIMARY KEY,
    translated_title TEXT,
    last_accessed INTEGER
)";

#[derive(thiserror::Error, Debug)]
pub enum TranslateError {
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),
    #[error("http error: {0}")]
    Http(#[from] HttpError),
    #[error("unexpected translation response")]
    MalformedResponse,
}

/// Cache of translated titles keyed by the original title. Access is
/// serialized through a single connection.
pub struct TranslationStore {
    conn: Mutex<Connection>,
}

impl TranslationStore {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, TranslateError> {
        Self::init(Connection::open(path)?)
    }

    pub fn open_in_memory() -> Result<Self, TranslateError> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(conn: Connection) -> Result<Self, TranslateError> {
        conn.execute_batch(SCHEMA)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn conn(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Cached translation, refreshing its access time on a hit.
    pub fn get(&self, original: &str, now: DateTime<Utc>) -> Result<Option<String>, TranslateError> {
        let conn = self.conn();
        let translated: Option<Option<String>> = conn
            .query_row(
                "SELECT translated_title FROM video_titles WHERE original_title = ?1",
                params![original],
                |row| row.get(0),
            )
            .optional()?;

        if translated.is_some() {
            conn.execute(
                "UPDATE video_titles SET last_accessed = ?1 WHERE original_title = ?2",
                params![now.timestamp(), original],
            )?;
        }
        Ok(translated.flatten())
    }

    pub fn put(&self, original: &str, translated: &str, now: DateTime<Utc>) -> Result<(), TranslateError> {
        self.conn().execute(
            "INSERT INTO video_titles (original_title, translated_title, last_accessed) VALUES (?1, ?2, ?3)
             ON CONFLICT(original_title) DO UPDATE SET translated_title = excluded.translated_title,
                                                       last_accessed = excluded.last_accessed",
            params![original, translated, now.timestamp()],
        )?;
        Ok(())
    }

    /// Deletes entries not accessed within `retention_days`.
    pub fn sweep(&self, retention_days: i64, now: DateTime<Utc>) -> Result<usize, TranslateError> {
        let cutoff = now.timestamp() - retention_days * 86_400;
        let deleted = self.conn().execute(
            "DELETE FROM video_titles WHERE last_accessed < ?1",
            params![cutoff],
        )?;
        Ok(deleted)
    }

    pub fn count(&self) -> Result<i64, TranslateError> {
        Ok(self
            .conn()
            .query_row("SELECT COUNT(*) FROM video_titles", [], |row| row.get(0))?)
    }
}

#[async_trait]
pub trait Translator: Send + Sync {
    async fn translate(&self, text: &str) -> Result<String, TranslateError>;
}

const GOOGLE_ENDPOINT: &str = "https://translate.googleapis.com/translate_a/single";

/// The keyless `translate_a/single` endpoint.
pub struct GoogleTranslator {
    pub client: Arc<HttpClient>,
    pub endpoint: String,
    pub target: String,
}

impl GoogleTranslator {
    pub fn new(client: Arc<HttpClient>, target: &str) -> Self {
        GoogleTranslator {
            client,
            endpoint: GOOGLE_ENDPOINT.to_string(),
            target: target.to_string(),
        }
    }
}

fn parse_google_response(value: &serde_json::Value) -> Option<String> {
    let text: String = value
        .get(0)?
        .as_array()?
        .iter()
        .filter_map(|segment| segment.get(0)?.as_str())
        .collect();
    (!text.is_empty()).then_some(text)
}

#[async_trait]
impl Translator for GoogleTranslator {
    async fn translate(&self, text: &str) -> Result<String, TranslateError> {
        let resp = self
            .client
            .client
            .get(&self.endpoint)
            .query(&[
                ("client", "gtx"),
                ("sl", "auto"),
                ("tl", self.target.as_str()),
                ("dt", "t"),
                ("q", text),
            ])
            .send()
            .await
            .map_err(HttpError::from)?;
        if !resp.status().is_success() {
            return Err(HttpError::Status(resp.status()).into());
        }
        let value: serde_json::Value = resp.json().await.map_err(HttpError::from)?;
        parse_google_response(&value).ok_or(TranslateError::MalformedResponse)
    }
}

/// Looks up every distinct title, translating and caching misses. A failed
/// translation is retried once, then the title is left untranslated.
pub async fn translate_titles<'a, I>(
    store: &TranslationStore,
    translator: &dyn Translator,
    titles: I,
    now: DateTime<Utc>,
) -> HashMap<String, String>
where
    I: IntoIterator<Item = &'a str>,
{
    let mut out = HashMap::new();

    for title in titles {
        if title.is_empty() || out.contains_key(title) {
            continue;
        }

        match store.get(title, now) {
            Ok(Some(cached)) => {
                out.insert(title.to_string(), cached);
                continue;
            }
            Ok(None) => (),
            Err(e) => warn!("Translation cache lookup failed for {:?}: {}", title, e),
        }

        let retry = FixedInterval::new(Duration::from_millis(500)).take(1);
        match Retry::spawn(retry, || translator.translate(title)).await {
            Ok(translated) => {
                if let Err(e) = store.put(title, &translated, now) {
                    warn!("Could not cache translation for {:?}: {}", title, e);
                }
                out.insert(title.to_string(), translated);
            }
            Err(e) => warn!("Could not translate {:?}: {}", title, e),
        }
    }

    out
}
