use crate::cache::AudioCache;
use crate::library::{Book, BookStore, Page};
use crate::preload::{preload, PreloadReport};
use crate::progress::{GenerationProgress, Phase, ProgressHandle};
use crate::provider::VoiceProvider;
use crate::queue::{BackgroundTask, TaskQueue};
use crate::storage::{narration_object_path, ObjectStorage};
use anyhow::{bail, Context, Result};
use std::sync::{Arc, Mutex};

/// Deletes a provider voice on every exit path of a task, success or failure.
/// Deletion failures are logged only; the orphaned voice slot is an accepted
/// leak rather than something we retry or roll back.
struct VoiceCleanup {
    provider: Arc<dyn VoiceProvider>,
    voice_id: String,
    progress: ProgressHandle,
}

impl Drop for VoiceCleanup {
    fn drop(&mut self) {
        self.progress.update(|p| p.phase = Phase::Deleting);
        if let Err(err) = self.provider.delete_voice(&self.voice_id) {
            tracing::warn!(voice_id = %self.voice_id, error = %err, "voice cleanup failed");
        }
    }
}

/// Narration service: the task queue, its worker, and the preload cache
/// behind one injectable object. Collaborators are constructor-injected so
/// tests run against in-memory fakes.
pub struct Narrator {
    queue: Mutex<TaskQueue>,
    progress: ProgressHandle,
    cache: AudioCache,
    provider: Arc<dyn VoiceProvider>,
    store: Arc<dyn BookStore>,
    storage: Arc<dyn ObjectStorage>,
    preload_concurrency: usize,
}

impl Narrator {
    pub fn new(
        provider: Arc<dyn VoiceProvider>,
        store: Arc<dyn BookStore>,
        storage: Arc<dyn ObjectStorage>,
        cache: AudioCache,
        preload_concurrency: usize,
    ) -> Self {
        Self {
            queue: Mutex::new(TaskQueue::new()),
            progress: ProgressHandle::new(),
            cache,
            provider,
            store,
            storage,
            preload_concurrency,
        }
    }

    /// Shared handle the caller can poll while tasks run on another thread.
    pub fn progress(&self) -> ProgressHandle {
        self.progress.clone()
    }

    pub fn enqueue(&self, task: BackgroundTask) {
        self.lock_queue().enqueue(task);
    }

    pub fn pending_len(&self) -> usize {
        self.lock_queue().pending_len()
    }

    /// Drains the queue: one task at a time, strictly in enqueue order. A
    /// failed task is logged and dropped; the next one still runs. The final
    /// `Done` progress marker is left for the caller to display and clear.
    pub fn run_pending(&self) {
        loop {
            let Some(task) = self.lock_queue().next_task() else {
                break;
            };
            tracing::info!(
                kind = ?task.kind,
                book = task.book_id.as_deref().unwrap_or("<all>"),
                voice = %task.voice_id,
                "narration task started"
            );
            if let Err(err) = self.execute(&task) {
                tracing::error!(error = %err, "narration task failed");
            }
            self.mark_done();
            self.lock_queue().complete_active();
        }
    }

    fn execute(&self, task: &BackgroundTask) -> Result<()> {
        let (synth_voice, persist_key) = if task.kind.is_reclone() {
            let saved_id = task
                .saved_voice_id
                .as_deref()
                .context("reclone task has no saved voice id")?;
            self.progress.set(GenerationProgress {
                phase: Phase::Cloning,
                current_page: 0,
                total_pages: 0,
                current_book: None,
                total_books: None,
                book_title: None,
            });
            let sample = self.store.voice_sample(saved_id)?;
            let bytes = self
                .storage
                .download(&sample.sample_url)
                .with_context(|| format!("download voice sample {saved_id}"))?;
            let temp_voice = self
                .provider
                .clone_voice(&format!("temp-{}", sample.name), &bytes)?;
            (temp_voice, saved_id.to_string())
        } else {
            (task.voice_id.clone(), task.voice_id.clone())
        };

        // Dropped on every exit path below, including early returns.
        let _cleanup = VoiceCleanup {
            provider: self.provider.clone(),
            voice_id: synth_voice.clone(),
            progress: self.progress.clone(),
        };

        let books = if task.kind.is_library_wide() {
            self.store.list_books()?
        } else {
            let book_id = task.book_id.as_deref();
            match book_id {
                Some(id) => vec![self.store.book(id)?],
                None => bail!("single-book task has no book id"),
            }
        };

        let total_books = books.len();
        for (book_index, book) in books.iter().enumerate() {
            self.generate_book(
                book,
                &synth_voice,
                &persist_key,
                task.kind.is_library_wide().then_some((book_index + 1, total_books)),
            );
        }
        Ok(())
    }

    /// Generates narration for one book, page by page in page-number order.
    /// A page that fails is logged and left without narration; the live
    /// fallback at playback time will retry it.
    fn generate_book(
        &self,
        book: &Book,
        synth_voice: &str,
        persist_key: &str,
        book_position: Option<(usize, usize)>,
    ) {
        let mut pages: Vec<&Page> = book.pages.iter().collect();
        pages.sort_by_key(|page| page.number);
        let total_pages = pages.len();

        for (index, page) in pages.iter().copied().enumerate() {
            self.progress.set(GenerationProgress {
                phase: Phase::Generating,
                current_page: index + 1,
                total_pages,
                current_book: book_position.map(|(current, _)| current),
                total_books: book_position.map(|(_, total)| total),
                book_title: book_position.map(|_| book.title.clone()),
            });
            if let Err(err) = self.generate_page(book, page, synth_voice, persist_key) {
                tracing::warn!(
                    book = %book.id,
                    page = page.number,
                    error = %err,
                    "page narration failed"
                );
            }
        }
    }

    fn generate_page(
        &self,
        book: &Book,
        page: &Page,
        synth_voice: &str,
        persist_key: &str,
    ) -> Result<()> {
        let audio = self.provider.synthesize(&page.text, synth_voice)?;
        self.progress.update(|p| p.phase = Phase::Saving);
        let object_path = narration_object_path(&book.id, page.number, persist_key);
        let url = self.storage.upload(&object_path, &audio)?;
        self.store
            .set_narration_url(&book.id, page.number, persist_key, &url)?;
        self.progress.update(|p| p.phase = Phase::Generating);
        Ok(())
    }

    fn mark_done(&self) {
        let progress = self.progress.snapshot();
        match progress {
            Some(mut p) => {
                p.phase = Phase::Done;
                self.progress.set(p);
            }
            None => self.progress.set(GenerationProgress {
                phase: Phase::Done,
                current_page: 0,
                total_pages: 0,
                current_book: None,
                total_books: None,
                book_title: None,
            }),
        }
    }

    /// Downloads a book's narration audio into the local cache. See
    /// [`preload`] for the fan-out and settling behavior.
    pub fn preload_book<F>(
        &self,
        book_id: &str,
        target_language: &str,
        voice_id: Option<&str>,
        on_progress: F,
    ) -> Result<PreloadReport>
    where
        F: FnMut(usize, usize),
    {
        let book = self.store.book(book_id)?;
        Ok(preload(
            &book,
            target_language,
            voice_id,
            &self.cache,
            self.storage.as_ref(),
            self.preload_concurrency,
            on_progress,
        ))
    }

    /// Synchronous cache read; `None` means the caller should fall back to
    /// live synthesis (without populating the cache).
    pub fn lookup(
        &self,
        book_id: &str,
        page_number: u32,
        voice_key: &str,
    ) -> Option<std::path::PathBuf> {
        self.cache.lookup(book_id, page_number, voice_key)
    }

    pub fn clear_cache(&self, book_id: Option<&str>) {
        self.cache.clear(book_id);
    }

    pub fn cache(&self) -> &AudioCache {
        &self.cache
    }

    fn lock_queue(&self) -> std::sync::MutexGuard<'_, TaskQueue> {
        self.queue.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}
