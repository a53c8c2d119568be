use std::sync::{Arc, Mutex};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Cloning,
    Generating,
    Saving,
    Deleting,
    Done,
}

impl Phase {
    pub fn label(self) -> &'static str {
        match self {
            Phase::Cloning => "cloning voice",
            Phase::Generating => "generating narration",
            Phase::Saving => "saving narration",
            Phase::Deleting => "removing temporary voice",
            Phase::Done => "done",
        }
    }
}

/// Status of the narration task currently in flight. Written only by the
/// worker; cleared between tasks.
#[derive(Debug, Clone)]
pub struct GenerationProgress {
    pub phase: Phase,
    pub current_page: usize,
    pub total_pages: usize,
    /// Set for library-wide runs.
    pub current_book: Option<usize>,
    pub total_books: Option<usize>,
    pub book_title: Option<String>,
}

/// Shared view of the worker's progress, polled by the CLI while the worker
/// thread runs. Mutex rather than channel so late readers see the latest
/// state instead of a backlog.
#[derive(Debug, Clone, Default)]
pub struct ProgressHandle {
    inner: Arc<Mutex<Option<GenerationProgress>>>,
}

impl ProgressHandle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&self, progress: GenerationProgress) {
        if let Ok(mut slot) = self.inner.lock() {
            *slot = Some(progress);
        }
    }

    pub fn update<F>(&self, apply: F)
    where
        F: FnOnce(&mut GenerationProgress),
    {
        if let Ok(mut slot) = self.inner.lock() {
            if let Some(progress) = slot.as_mut() {
                apply(progress);
            }
        }
    }

    pub fn clear(&self) {
        if let Ok(mut slot) = self.inner.lock() {
            *slot = None;
        }
    }

    pub fn snapshot(&self) -> Option<GenerationProgress> {
        self.inner.lock().ok().and_then(|slot| slot.clone())
    }
}
