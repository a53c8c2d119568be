use crate::cache::AudioCache;
use crate::cli::{Cli, Commands, NarrateAllArgs, NarrateArgs, PreloadArgs};
use crate::config::{Config, ConfigStore};
use crate::library::HttpBookStore;
use crate::logging;
use crate::progress::GenerationProgress;
use crate::provider::HttpVoiceProvider;
use crate::queue::{BackgroundTask, TaskKind};
use crate::storage::HttpStorage;
use crate::worker::Narrator;
use anyhow::{anyhow, Context, Result};
use clap::Parser;
use crossbeam_channel::{unbounded, RecvTimeoutError};
use indicatif::{ProgressBar, ProgressStyle};
use std::path::PathBuf;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

pub fn run() -> Result<()> {
    logging::init();
    let cli = Cli::parse();
    let store = ConfigStore::new()?;
    let config = store.load()?;
    match cli.command {
        Commands::Narrate(args) => run_narrate(&config, args),
        Commands::NarrateAll(args) => run_narrate_all(&config, args),
        Commands::Preload(args) => run_preload(&config, args),
    }
}

fn run_narrate(config: &Config, args: NarrateArgs) -> Result<()> {
    tracing::info!(book = %args.book, voice = %args.voice, "narrate book");
    let narrator = build_narrator(config, None)?;
    narrator.enqueue(BackgroundTask {
        book_id: Some(args.book),
        voice_id: args.voice,
        kind: if args.recloned_from.is_some() {
            TaskKind::SingleReclone
        } else {
            TaskKind::Single
        },
        saved_voice_id: args.recloned_from,
    });
    drain_with_progress(narrator)
}

fn run_narrate_all(config: &Config, args: NarrateAllArgs) -> Result<()> {
    tracing::info!(voice = %args.voice, "narrate library");
    let narrator = build_narrator(config, None)?;
    narrator.enqueue(BackgroundTask {
        book_id: None,
        voice_id: args.voice,
        kind: if args.recloned_from.is_some() {
            TaskKind::AllReclone
        } else {
            TaskKind::All
        },
        saved_voice_id: args.recloned_from,
    });
    drain_with_progress(narrator)
}

fn run_preload(config: &Config, args: PreloadArgs) -> Result<()> {
    tracing::info!(book = %args.book, language = %args.language, "preload narration");
    let narrator = build_narrator(config, args.cache_dir)?;
    let bar = ProgressBar::new_spinner();
    bar.set_style(progress_style());
    let report = narrator.preload_book(
        &args.book,
        &args.language,
        args.voice.as_deref(),
        |loaded, total| {
            bar.set_length(total as u64);
            bar.set_position(loaded as u64);
        },
    )?;
    bar.finish_with_message(format!(
        "{} of {} pages cached",
        report.loaded, report.total_pages
    ));
    tracing::info!(
        loaded = report.loaded,
        already_cached = report.already_cached,
        failed = report.failed,
        missing = report.missing,
        "preload complete"
    );
    Ok(())
}

/// Runs the queue on a worker thread while this thread repaints an indicatif
/// bar from the shared progress handle.
fn drain_with_progress(narrator: Arc<Narrator>) -> Result<()> {
    let progress = narrator.progress();
    let (done_tx, done_rx) = unbounded::<()>();
    let worker = {
        let narrator = narrator.clone();
        thread::spawn(move || {
            narrator.run_pending();
            let _ = done_tx.send(());
        })
    };

    let bar = ProgressBar::new_spinner();
    bar.set_style(progress_style());
    loop {
        match done_rx.recv_timeout(Duration::from_millis(100)) {
            Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
            Err(RecvTimeoutError::Timeout) => {
                if let Some(snapshot) = progress.snapshot() {
                    repaint(&bar, &snapshot);
                }
            }
        }
    }
    worker
        .join()
        .map_err(|_| anyhow!("narration worker panicked"))?;
    if let Some(snapshot) = progress.snapshot() {
        repaint(&bar, &snapshot);
    }
    progress.clear();
    bar.finish_with_message("narration complete");
    Ok(())
}

fn repaint(bar: &ProgressBar, progress: &GenerationProgress) {
    if progress.total_pages > 0 {
        bar.set_length(progress.total_pages as u64);
        bar.set_position(progress.current_page as u64);
    }
    let mut message = progress.phase.label().to_string();
    if let (Some(current), Some(total)) = (progress.current_book, progress.total_books) {
        let title = progress.book_title.as_deref().unwrap_or("");
        message = format!("{message} (book {current}/{total}: {title})");
    }
    bar.set_message(message);
}

fn progress_style() -> ProgressStyle {
    ProgressStyle::with_template("{spinner} {pos}/{len} {msg}")
        .unwrap_or_else(|_| ProgressStyle::default_spinner())
}

fn build_narrator(config: &Config, cache_dir: Option<PathBuf>) -> Result<Arc<Narrator>> {
    let client = reqwest::blocking::Client::builder()
        .timeout(Duration::from_secs(120))
        .build()
        .context("build http client")?;
    let provider = Arc::new(HttpVoiceProvider::new(
        client.clone(),
        config.voice_api_base.clone(),
        config.voice_api_key.clone(),
    ));
    let store = Arc::new(HttpBookStore::new(
        client.clone(),
        config.library_base.clone(),
    ));
    let storage = Arc::new(HttpStorage::new(client, config.storage_base.clone()));
    let cache = AudioCache::new(cache_dir.unwrap_or_else(|| config.cache_dir.clone()))?;
    Ok(Arc::new(Narrator::new(
        provider,
        store,
        storage,
        cache,
        config.preload_concurrency,
    )))
}
