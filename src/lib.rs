//! # yt-live-notify
//!
//! Watches a fixed list of YouTube channels for live and upcoming streams and
//! sends a digest email when the set of streams changes. It runs once per
//! invocation and keeps its state in a handful of files:
//!
//! - `live_streams.json` / `upcoming.json`: the last published snapshots,
//!   used to mark streams as new on the next run.
//! - `prev_hash_live.md5` / `prev_hash_upcoming.md5`: the hash of the last
//!   snapshot that was mailed. A digest is only sent when the hash changes,
//!   or, for upcoming streams, when one of them starts within 15 minutes.
//! - `titles.db`: cached title translations.
//!
//! ## Usage
//!
//! The scraping, mail and push back ends sit behind traits, so the pipeline
//! can be driven with any implementation:
//!
//! ```rust,no_run
//! use yt_live_notify::{classifier::Classifier, directory::ChannelDirectory, notify, scraper, worker};
//!
//! # async fn example(mailer: &dyn notify::Mailer) -> Result<(), worker::RunError> {
//! let scraper = scraper::YtDlp {
//!     program: "yt-dlp".into(),
//!     cookies: None,
//!     options: scraper::ListingOptions { max_entries: 11, skip_streams: vec![] },
//! };
//! let directory = ChannelDirectory::default();
//! let classifier = Classifier::default();
//!
//! let pipeline = worker::Pipeline {
//!     scraper: &scraper,
//!     mailer,
//!     webhook: None,
//!     translation: None,
//!     directory: &directory,
//!     classifier: &classifier,
//!     settings: worker::RunSettings {
//!         state_dir: ".".into(),
//!         workers: 10,
//!         fetch_timeout: std::time::Duration::from_secs(120),
//!         environment: yt_live_notify::config::Environment::Production,
//!         tz: chrono::FixedOffset::east_opt(7 * 3600).unwrap(),
//!     },
//! };
//!
//! let urls = worker::read_channel_list("channel_url.txt".as_ref()).await?;
//! let report = pipeline.run(&urls, chrono::Utc::now()).await?;
//! println!("{:?}", report);
//! # Ok(())
//! # }
//! ```

#[forbid(unsafe_code)]
#[macro_use]
extern crate log;

pub mod classifier;
pub mod config;
pub mod digest;
pub mod directory;
pub mod gate;
pub mod notify;
pub mod scraper;
pub mod snapshot;
pub mod translate;
pub mod util;
pub mod worker;
