use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Page {
    pub number: u32,
    pub text: String,
    /// Narration URLs keyed by voice key. This map's schema is owned by the
    /// document store; we only read and write entries.
    #[serde(default)]
    pub narration: HashMap<String, String>,
    /// Recording uploaded by the book owner; wins over generated narration.
    #[serde(default)]
    pub custom_recording_url: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Book {
    pub id: String,
    pub title: String,
    /// Language the story was written (or detected) in.
    pub original_language: String,
    pub pages: Vec<Page>,
}

/// Persisted voice-sample record a temporary clone can be re-derived from.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VoiceSample {
    pub id: String,
    pub name: String,
    pub sample_url: String,
}

/// Resolves the voice key narration audio is stored and looked up under.
///
/// Every call site (generation persistence, preload, playback lookup) must go
/// through this function: a key computed differently anywhere silently misses
/// the cache and falls back to live synthesis.
pub fn effective_voice_key(
    book: &Book,
    target_language: &str,
    voice_id: Option<&str>,
) -> String {
    if let Some(voice) = voice_id {
        return voice.to_string();
    }
    if target_language != book.original_language {
        return format!("default_{target_language}");
    }
    "default".to_string()
}

pub trait BookStore: Send + Sync {
    fn book(&self, book_id: &str) -> Result<Book>;
    fn list_books(&self) -> Result<Vec<Book>>;
    fn set_narration_url(
        &self,
        book_id: &str,
        page_number: u32,
        voice_key: &str,
        url: &str,
    ) -> Result<()>;
    fn voice_sample(&self, saved_voice_id: &str) -> Result<VoiceSample>;
}

/// Document-store client for the hosted library backend.
pub struct HttpBookStore {
    client: reqwest::blocking::Client,
    base_url: String,
}

#[derive(Serialize)]
struct NarrationPatch<'a> {
    voice_key: &'a str,
    url: &'a str,
}

impl HttpBookStore {
    pub fn new(client: reqwest::blocking::Client, base_url: impl Into<String>) -> Self {
        Self {
            client,
            base_url: base_url.into(),
        }
    }
}

impl BookStore for HttpBookStore {
    fn book(&self, book_id: &str) -> Result<Book> {
        let url = format!("{}/books/{book_id}", self.base_url);
        let book = self
            .client
            .get(&url)
            .send()
            .and_then(reqwest::blocking::Response::error_for_status)
            .with_context(|| format!("fetch book {book_id}"))?
            .json()
            .with_context(|| format!("decode book {book_id}"))?;
        Ok(book)
    }

    fn list_books(&self) -> Result<Vec<Book>> {
        let url = format!("{}/books", self.base_url);
        let books = self
            .client
            .get(&url)
            .send()
            .and_then(reqwest::blocking::Response::error_for_status)
            .context("list books")?
            .json()
            .context("decode book list")?;
        Ok(books)
    }

    fn set_narration_url(
        &self,
        book_id: &str,
        page_number: u32,
        voice_key: &str,
        url: &str,
    ) -> Result<()> {
        let endpoint = format!(
            "{}/books/{book_id}/pages/{page_number}/narration",
            self.base_url
        );
        self.client
            .patch(&endpoint)
            .json(&NarrationPatch { voice_key, url })
            .send()
            .and_then(reqwest::blocking::Response::error_for_status)
            .with_context(|| format!("save narration url for {book_id} page {page_number}"))?;
        Ok(())
    }

    fn voice_sample(&self, saved_voice_id: &str) -> Result<VoiceSample> {
        let url = format!("{}/voice-samples/{saved_voice_id}", self.base_url);
        let sample = self
            .client
            .get(&url)
            .send()
            .and_then(reqwest::blocking::Response::error_for_status)
            .with_context(|| format!("fetch voice sample {saved_voice_id}"))?
            .json()
            .with_context(|| format!("decode voice sample {saved_voice_id}"))?;
        Ok(sample)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn book(lang: &str) -> Book {
        Book {
            id: "b1".to_string(),
            title: "The Paper Boat".to_string(),
            original_language: lang.to_string(),
            pages: Vec::new(),
        }
    }

    #[test]
    fn custom_voice_wins() {
        let key = effective_voice_key(&book("English"), "Korean", Some("voice-9"));
        assert_eq!(key, "voice-9");
    }

    #[test]
    fn default_when_language_matches_original() {
        let key = effective_voice_key(&book("Korean"), "Korean", None);
        assert_eq!(key, "default");
    }

    #[test]
    fn language_suffixed_default_when_translated() {
        let key = effective_voice_key(&book("English"), "Korean", None);
        assert_eq!(key, "default_Korean");
    }

    #[test]
    fn key_is_stable_across_calls() {
        let b = book("English");
        let first = effective_voice_key(&b, "Spanish", None);
        let second = effective_voice_key(&b, "Spanish", None);
        assert_eq!(first, second);
    }
}
