use std::sync::Arc;

use anyhow::Context;
use chrono::Utc;
use clap::Parser;
use yt_live_notify::{
    classifier::Classifier,
    config::{Cli, Command, Config, ConfigError},
    directory::ChannelDirectory,
    notify::{HttpWebhook, LogMailer, Mailer, SmtpMailer, Webhook},
    scraper::{ListingOptions, YtDlp},
    snapshot::{Snapshot, SnapshotKind},
    translate::{GoogleTranslator, TranslationStore},
    util::HttpClient,
    worker::{self, Pipeline, RunSettings, Translation},
};

#[tokio::main]
async fn main() {
    dotenv::dotenv().ok();
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();
    log::info!("You are in {:?} environment!", cli.config.environment);

    let result = match cli.command.unwrap_or(Command::Run) {
        Command::Run => run(&cli.config).await,
        Command::Seed => seed(&cli.config).await,
        Command::Avatars => avatars(&cli.config).await,
        Command::CountTitles => count_titles(&cli.config),
        Command::Sweep => sweep(&cli.config),
        Command::Cookies => cookies(&cli.config).await,
    };

    if let Err(e) = result {
        log::error!("{:#}", e);
        std::process::exit(1);
    }
}

async fn run(config: &Config) -> anyhow::Result<()> {
    let urls = worker::read_channel_list(&config.channel_list).await?;
    let directory = ChannelDirectory::load_or_empty(&config.directory_file).await;
    let client = Arc::new(HttpClient::new().context("Could not create HttpClient")?);

    let scraper = YtDlp {
        program: config.yt_dlp.clone(),
        cookies: config.cookies_file.clone(),
        options: ListingOptions {
            max_entries: config.max_entries,
            skip_streams: config.skip_streams.clone(),
        },
    };

    let mailer: Box<dyn Mailer> = match (
        &config.sender_email,
        &config.sender_password,
        &config.receiver_email,
    ) {
        (Some(from), Some(password), Some(to)) => Box::new(SmtpMailer::new(
            &config.smtp_host,
            config.smtp_port,
            from,
            password,
            to,
        )?),
        _ => {
            log::warn!("SENDER_EMAIL, SENDER_PWD or RECEIVER_EMAIL unset; digests will only be logged");
            Box::new(LogMailer)
        }
    };

    let webhook = config.webhook_url.as_ref().map(|url| HttpWebhook {
        client: client.clone(),
        url: url.clone(),
    });

    let translation = match &config.translate_to {
        Some(target) => {
            let store = TranslationStore::open(config.translation_db_path())?;
            let swept = store.sweep(config.retention_days, Utc::now())?;
            log::debug!("Swept {} stale translations", swept);
            Some((
                store,
                GoogleTranslator::new(client.clone(), target),
            ))
        }
        None => None,
    };

    let classifier = Classifier::default();
    let pipeline = Pipeline {
        scraper: &scraper,
        mailer: mailer.as_ref(),
        webhook: webhook.as_ref().map(|w| w as &dyn Webhook),
        translation: translation.as_ref().map(|(store, translator)| Translation {
            store,
            translator,
        }),
        directory: &directory,
        classifier: &classifier,
        settings: RunSettings {
            state_dir: config.state_dir.clone(),
            workers: config.workers,
            fetch_timeout: config.fetch_timeout(),
            environment: config.environment,
            tz: config.tz()?,
        },
    };

    let report = pipeline.run(&urls, Utc::now()).await?;
    log::info!(
        "Done: {} channels, upcoming {:?} ({} new, {} soon), live {:?} ({} new)",
        report.channels,
        report.upcoming.decision,
        report.upcoming.new,
        report.upcoming.imminent,
        report.live.decision,
        report.live.new,
    );
    Ok(())
}

async fn seed(config: &Config) -> anyhow::Result<()> {
    let directory = ChannelDirectory::load(&config.directory_file)
        .await
        .with_context(|| format!("Could not load {}", config.directory_file.display()))?;

    for kind in [SnapshotKind::Live, SnapshotKind::Upcoming] {
        let path = config.state_path(kind.snapshot_file());
        let existing = Snapshot::load_or_empty(&path).await;
        let seeded = directory.seed(&existing);
        seeded.save(&path).await?;
        log::info!("Seeded {} with {} channels", path.display(), seeded.len());
    }
    Ok(())
}

async fn avatars(config: &Config) -> anyhow::Result<()> {
    let mut directory = ChannelDirectory::load(&config.directory_file)
        .await
        .with_context(|| format!("Could not load {}", config.directory_file.display()))?;
    let client = HttpClient::new().context("Could not create HttpClient")?;

    let found = directory.refresh_avatars(&client).await;
    directory.save(&config.directory_file).await?;
    log::info!("Found avatars for {} of {} channels", found, directory.entries.len());
    Ok(())
}

fn count_titles(config: &Config) -> anyhow::Result<()> {
    let store = TranslationStore::open(config.translation_db_path())?;
    println!("Total records in the table: {}", store.count()?);
    Ok(())
}

fn sweep(config: &Config) -> anyhow::Result<()> {
    let store = TranslationStore::open(config.translation_db_path())?;
    let deleted = store.sweep(config.retention_days, Utc::now())?;
    log::info!("Deleted {} translations unused for {} days", deleted, config.retention_days);
    Ok(())
}

async fn cookies(config: &Config) -> anyhow::Result<()> {
    let content = config
        .cookies_content
        .as_ref()
        .ok_or(ConfigError::Missing("COOKIES_CONTENT"))?;
    let path = config
        .cookies_file
        .clone()
        .unwrap_or_else(|| "cookies.txt".into());

    tokio::fs::write(&path, content).await?;
    log::info!("Wrote cookies to {}", path.display());
    Ok(())
}
