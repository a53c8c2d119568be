use crate::storage::ensure_dir;
use anyhow::{Context, Result};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct CacheKey {
    book_id: String,
    page_number: u32,
    voice_key: String,
}

/// Session-scoped index of downloaded narration audio. Entries map
/// (book, page, voice key) to a local file under the cache directory.
/// Nothing is evicted except through `clear`; a new process starts with an
/// empty index even if files from an earlier session remain on disk.
pub struct AudioCache {
    dir: PathBuf,
    entries: Mutex<HashMap<CacheKey, PathBuf>>,
}

impl AudioCache {
    pub fn new(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        ensure_dir(&dir)?;
        Ok(Self {
            dir,
            entries: Mutex::new(HashMap::new()),
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Writes the bytes to a local file and records it under the key,
    /// returning the playable path.
    pub fn insert(
        &self,
        book_id: &str,
        page_number: u32,
        voice_key: &str,
        bytes: &[u8],
    ) -> Result<PathBuf> {
        let file = self.dir.join(format!(
            "{}_{page_number}_{}.mp3",
            sanitize(book_id),
            sanitize(voice_key)
        ));
        fs::write(&file, bytes).with_context(|| format!("write cache file {}", file.display()))?;
        let key = CacheKey {
            book_id: book_id.to_string(),
            page_number,
            voice_key: voice_key.to_string(),
        };
        self.lock().insert(key, file.clone());
        Ok(file)
    }

    pub fn lookup(&self, book_id: &str, page_number: u32, voice_key: &str) -> Option<PathBuf> {
        let key = CacheKey {
            book_id: book_id.to_string(),
            page_number,
            voice_key: voice_key.to_string(),
        };
        self.lock().get(&key).cloned()
    }

    pub fn contains(&self, book_id: &str, page_number: u32, voice_key: &str) -> bool {
        self.lookup(book_id, page_number, voice_key).is_some()
    }

    /// Evicts one book's entries, or everything when no book is given.
    /// Cache files are left on disk; only the index forgets them.
    pub fn clear(&self, book_id: Option<&str>) {
        let mut entries = self.lock();
        match book_id {
            Some(book) => entries.retain(|key, _| key.book_id != book),
            None => entries.clear(),
        }
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<CacheKey, PathBuf>> {
        self.entries.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

fn sanitize(part: &str) -> String {
    part.chars()
        .map(|c| if c.is_alphanumeric() || c == '-' || c == '_' { c } else { '-' })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn insert_then_lookup_returns_playable_file() -> Result<()> {
        let dir = tempdir()?;
        let cache = AudioCache::new(dir.path())?;
        let path = cache.insert("b1", 1, "default", b"mp3-bytes")?;
        assert_eq!(cache.lookup("b1", 1, "default"), Some(path.clone()));
        assert_eq!(fs::read(path)?, b"mp3-bytes");
        Ok(())
    }

    #[test]
    fn lookup_distinguishes_voice_keys() -> Result<()> {
        let dir = tempdir()?;
        let cache = AudioCache::new(dir.path())?;
        cache.insert("b1", 1, "default", b"a")?;
        assert!(cache.lookup("b1", 1, "default_Korean").is_none());
        assert!(cache.lookup("b2", 1, "default").is_none());
        assert!(cache.lookup("b1", 2, "default").is_none());
        Ok(())
    }

    #[test]
    fn clear_one_book_keeps_the_rest() -> Result<()> {
        let dir = tempdir()?;
        let cache = AudioCache::new(dir.path())?;
        cache.insert("b1", 1, "default", b"a")?;
        cache.insert("b1", 2, "default", b"b")?;
        cache.insert("b2", 1, "default", b"c")?;
        cache.clear(Some("b1"));
        assert!(cache.lookup("b1", 1, "default").is_none());
        assert!(cache.lookup("b2", 1, "default").is_some());
        cache.clear(None);
        assert!(cache.is_empty());
        Ok(())
    }
}
