use anyhow::{Context, Result};
use chrono::Local;
use std::fs;
use std::path::Path;

/// Remote object storage for narration audio.
pub trait ObjectStorage: Send + Sync {
    /// Uploads bytes under the given object path and returns a fetchable URL.
    fn upload(&self, path: &str, bytes: &[u8]) -> Result<String>;

    fn download(&self, url: &str) -> Result<Vec<u8>>;
}

pub struct HttpStorage {
    client: reqwest::blocking::Client,
    base_url: String,
}

impl HttpStorage {
    pub fn new(client: reqwest::blocking::Client, base_url: impl Into<String>) -> Self {
        Self {
            client,
            base_url: base_url.into(),
        }
    }
}

impl ObjectStorage for HttpStorage {
    fn upload(&self, path: &str, bytes: &[u8]) -> Result<String> {
        let url = format!("{}/{path}", self.base_url);
        self.client
            .put(&url)
            .header("content-type", "audio/mpeg")
            .body(bytes.to_vec())
            .send()
            .and_then(reqwest::blocking::Response::error_for_status)
            .with_context(|| format!("upload {path}"))?;
        Ok(url)
    }

    fn download(&self, url: &str) -> Result<Vec<u8>> {
        let bytes = self
            .client
            .get(url)
            .send()
            .and_then(reqwest::blocking::Response::error_for_status)
            .with_context(|| format!("download {url}"))?
            .bytes()
            .with_context(|| format!("read body of {url}"))?;
        Ok(bytes.to_vec())
    }
}

pub fn ensure_dir(path: &Path) -> Result<()> {
    fs::create_dir_all(path).with_context(|| format!("create dir {}", path.display()))?;
    Ok(())
}

pub fn iso_timestamp() -> String {
    let now = Local::now();
    now.format("%Y-%m-%dT%H-%M-%S%.3f%z").to_string()
}

/// Object path narration audio is uploaded under. Timestamped so a
/// regeneration never overwrites audio a player may still be streaming.
pub fn narration_object_path(book_id: &str, page_number: u32, voice_key: &str) -> String {
    format!(
        "narration/{book_id}/{page_number}/{voice_key}/{}.mp3",
        iso_timestamp()
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn narration_path_scopes_by_book_page_and_voice() {
        let path = narration_object_path("b1", 3, "default_Korean");
        assert!(path.starts_with("narration/b1/3/default_Korean/"));
        assert!(path.ends_with(".mp3"));
    }

    #[test]
    fn ensure_dir_is_idempotent() -> Result<()> {
        let dir = tempdir()?;
        let nested = dir.path().join("a/b");
        ensure_dir(&nested)?;
        ensure_dir(&nested)?;
        assert!(nested.is_dir());
        Ok(())
    }
}
