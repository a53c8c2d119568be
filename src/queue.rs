use std::collections::VecDeque;

/// Scope and clone behavior of a narration task.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskKind {
    /// One book, voice already exists at the provider.
    Single,
    /// Whole library, voice already exists at the provider.
    All,
    /// One book, re-derive a temporary clone from a saved sample first.
    SingleReclone,
    /// Whole library, re-derive a temporary clone from a saved sample first.
    AllReclone,
}

impl TaskKind {
    pub fn is_reclone(self) -> bool {
        matches!(self, TaskKind::SingleReclone | TaskKind::AllReclone)
    }

    pub fn is_library_wide(self) -> bool {
        matches!(self, TaskKind::All | TaskKind::AllReclone)
    }
}

#[derive(Debug, Clone)]
pub struct BackgroundTask {
    /// Target book; `None` means every book in the library.
    pub book_id: Option<String>,
    /// Voice to synthesize with. Reclone runs synthesize with a freshly
    /// cloned temporary voice instead and only persist under this identity.
    pub voice_id: String,
    pub kind: TaskKind,
    /// Saved voice-sample record to re-clone from; required for reclone kinds.
    pub saved_voice_id: Option<String>,
}

/// In-memory FIFO of pending narration tasks. Not persisted: process exit
/// drops whatever is still queued. At most one task is active at a time.
#[derive(Debug, Default)]
pub struct TaskQueue {
    pending: VecDeque<BackgroundTask>,
    busy: bool,
}

impl TaskQueue {
    pub fn new() -> Self {
        Self {
            pending: VecDeque::new(),
            busy: false,
        }
    }

    pub fn enqueue(&mut self, task: BackgroundTask) {
        self.pending.push_back(task);
    }

    /// Pops the head task and marks the queue busy. Returns `None` while a
    /// task is already in flight or when nothing is pending.
    pub fn next_task(&mut self) -> Option<BackgroundTask> {
        if self.busy {
            return None;
        }
        let task = self.pending.pop_front()?;
        self.busy = true;
        Some(task)
    }

    /// Clears the busy flag after the active task finished, whether it
    /// succeeded or failed.
    pub fn complete_active(&mut self) {
        self.busy = false;
    }

    pub fn is_busy(&self) -> bool {
        self.busy
    }

    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }
}
