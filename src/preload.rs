use crate::cache::AudioCache;
use crate::library::{effective_voice_key, Book, Page};
use crate::storage::ObjectStorage;
use crossbeam_channel::unbounded;
use std::thread;

/// Outcome of one preload pass over a book.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct PreloadReport {
    pub total_pages: usize,
    /// Pages with playable audio in the cache after the pass, including ones
    /// that were already cached before it started.
    pub loaded: usize,
    pub already_cached: usize,
    pub failed: usize,
    /// Pages with neither a custom recording nor generated audio under the
    /// effective voice key; playback falls back to live synthesis for these.
    pub missing: usize,
}

/// Audio source for one page, in priority order.
fn page_audio_url<'a>(page: &'a Page, voice_key: &str) -> Option<&'a str> {
    page.custom_recording_url
        .as_deref()
        .or_else(|| page.narration.get(voice_key).map(String::as_str))
}

/// Downloads every page's narration audio into the cache, skipping pages that
/// are already cached. Fetches fan out over a bounded pool of worker threads;
/// the pass settles once every page's attempt has finished, whether or not
/// some of them failed. `on_progress` is invoked on the calling thread with
/// (pages loaded so far, total pages) after each settled attempt.
pub fn preload<F>(
    book: &Book,
    target_language: &str,
    voice_id: Option<&str>,
    cache: &AudioCache,
    storage: &dyn ObjectStorage,
    concurrency: usize,
    mut on_progress: F,
) -> PreloadReport
where
    F: FnMut(usize, usize),
{
    let voice_key = effective_voice_key(book, target_language, voice_id);
    let mut report = PreloadReport {
        total_pages: book.pages.len(),
        ..PreloadReport::default()
    };

    let mut to_fetch: Vec<(u32, String)> = Vec::new();
    for page in &book.pages {
        if cache.contains(&book.id, page.number, &voice_key) {
            report.already_cached += 1;
            report.loaded += 1;
            on_progress(report.loaded, report.total_pages);
        } else if let Some(url) = page_audio_url(page, &voice_key) {
            to_fetch.push((page.number, url.to_string()));
        } else {
            report.missing += 1;
            on_progress(report.loaded, report.total_pages);
        }
    }

    if to_fetch.is_empty() {
        return report;
    }

    let workers = concurrency.max(1).min(to_fetch.len());
    let (job_tx, job_rx) = unbounded::<(u32, String)>();
    let (result_tx, result_rx) = unbounded::<(u32, anyhow::Result<Vec<u8>>)>();
    let expected = to_fetch.len();
    for job in to_fetch {
        // Receiver outlives all senders, send cannot fail here.
        let _ = job_tx.send(job);
    }
    drop(job_tx);

    thread::scope(|scope| {
        for _ in 0..workers {
            let job_rx = job_rx.clone();
            let result_tx = result_tx.clone();
            scope.spawn(move || {
                while let Ok((page_number, url)) = job_rx.recv() {
                    let result = storage.download(&url);
                    if result_tx.send((page_number, result)).is_err() {
                        break;
                    }
                }
            });
        }
        drop(result_tx);

        // Join on the calling thread so the FnMut progress callback never
        // crosses a thread boundary.
        for _ in 0..expected {
            let Ok((page_number, result)) = result_rx.recv() else {
                break;
            };
            match result.and_then(|bytes| cache.insert(&book.id, page_number, &voice_key, &bytes))
            {
                Ok(_) => report.loaded += 1,
                Err(err) => {
                    tracing::warn!(
                        book = %book.id,
                        page = page_number,
                        error = %err,
                        "preload fetch failed"
                    );
                    report.failed += 1;
                }
            }
            on_progress(report.loaded, report.total_pages);
        }
    });

    report
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::{anyhow, Result};
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;
    use tempfile::tempdir;

    struct FakeStorage {
        objects: Mutex<HashMap<String, Vec<u8>>>,
        downloads: AtomicUsize,
    }

    impl FakeStorage {
        fn new(objects: &[(&str, &[u8])]) -> Self {
            Self {
                objects: Mutex::new(
                    objects
                        .iter()
                        .map(|(url, bytes)| (url.to_string(), bytes.to_vec()))
                        .collect(),
                ),
                downloads: AtomicUsize::new(0),
            }
        }

        fn download_count(&self) -> usize {
            self.downloads.load(Ordering::SeqCst)
        }
    }

    impl ObjectStorage for FakeStorage {
        fn upload(&self, path: &str, bytes: &[u8]) -> Result<String> {
            let url = format!("fake://{path}");
            self.objects
                .lock()
                .expect("objects lock")
                .insert(url.clone(), bytes.to_vec());
            Ok(url)
        }

        fn download(&self, url: &str) -> Result<Vec<u8>> {
            self.downloads.fetch_add(1, Ordering::SeqCst);
            self.objects
                .lock()
                .expect("objects lock")
                .get(url)
                .cloned()
                .ok_or_else(|| anyhow!("not found: {url}"))
        }
    }

    fn page(number: u32, narration: &[(&str, &str)], custom: Option<&str>) -> Page {
        Page {
            number,
            text: format!("page {number}"),
            narration: narration
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
            custom_recording_url: custom.map(str::to_string),
        }
    }

    fn book(pages: Vec<Page>) -> Book {
        Book {
            id: "b1".to_string(),
            title: "The Paper Boat".to_string(),
            original_language: "Korean".to_string(),
            pages,
        }
    }

    #[test]
    fn second_pass_fetches_nothing() -> Result<()> {
        let storage = FakeStorage::new(&[("u1", b"one".as_slice()), ("u2", b"two".as_slice())]);
        let book = book(vec![
            page(1, &[("default", "u1")], None),
            page(2, &[("default", "u2")], None),
        ]);
        let dir = tempdir()?;
        let cache = AudioCache::new(dir.path())?;

        let first = preload(&book, "Korean", None, &cache, &storage, 4, |_, _| {});
        assert_eq!(first.loaded, 2);
        assert_eq!(storage.download_count(), 2);

        let second = preload(&book, "Korean", None, &cache, &storage, 4, |_, _| {});
        assert_eq!(second.loaded, 2);
        assert_eq!(second.already_cached, 2);
        assert_eq!(storage.download_count(), 2, "no redundant fetches");
        Ok(())
    }

    #[test]
    fn original_language_pass_uses_plain_default_key() -> Result<()> {
        let storage = FakeStorage::new(&[("u1", b"one".as_slice())]);
        // Audio stored under "default_Korean" must not satisfy a Korean pass
        // over a Korean book.
        let book = book(vec![page(1, &[("default_Korean", "u1")], None)]);
        let dir = tempdir()?;
        let cache = AudioCache::new(dir.path())?;

        let report = preload(&book, "Korean", None, &cache, &storage, 4, |_, _| {});
        assert_eq!(report.missing, 1);
        assert_eq!(storage.download_count(), 0);
        Ok(())
    }

    #[test]
    fn custom_recording_beats_generated_audio() -> Result<()> {
        let storage = FakeStorage::new(&[("custom", b"owner".as_slice()), ("generated", b"tts".as_slice())]);
        let book = book(vec![page(1, &[("default", "generated")], Some("custom"))]);
        let dir = tempdir()?;
        let cache = AudioCache::new(dir.path())?;

        preload(&book, "Korean", None, &cache, &storage, 4, |_, _| {});
        let path = cache.lookup("b1", 1, "default").expect("cached");
        assert_eq!(std::fs::read(path)?, b"owner");
        Ok(())
    }

    #[test]
    fn failed_page_does_not_sink_the_pass() -> Result<()> {
        let storage = FakeStorage::new(&[("u1", b"one".as_slice()), ("u3", b"three".as_slice())]);
        let book = book(vec![
            page(1, &[("default", "u1")], None),
            page(2, &[("default", "missing-url")], None),
            page(3, &[("default", "u3")], None),
        ]);
        let dir = tempdir()?;
        let cache = AudioCache::new(dir.path())?;

        let mut last_progress = (0, 0);
        let report = preload(&book, "Korean", None, &cache, &storage, 2, |loaded, total| {
            last_progress = (loaded, total);
        });
        assert_eq!(report.loaded, 2);
        assert_eq!(report.failed, 1);
        assert!(cache.lookup("b1", 1, "default").is_some());
        assert!(cache.lookup("b1", 2, "default").is_none());
        assert!(cache.lookup("b1", 3, "default").is_some());
        assert_eq!(last_progress, (2, 3), "progress reports fewer than total");
        Ok(())
    }

    #[test]
    fn single_worker_still_settles_every_page() -> Result<()> {
        let storage = FakeStorage::new(&[("u1", b"one".as_slice()), ("u2", b"two".as_slice())]);
        let book = book(vec![
            page(1, &[("default", "u1")], None),
            page(2, &[("default", "u2")], None),
        ]);
        let dir = tempdir()?;
        let cache = AudioCache::new(dir.path())?;

        let report = preload(&book, "Korean", None, &cache, &storage, 0, |_, _| {});
        assert_eq!(report.loaded, 2);
        Ok(())
    }
}
