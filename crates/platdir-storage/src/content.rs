use std::path::{Path, PathBuf};

use anyhow::Context;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio::fs;
use tracing::debug;

use crate::{sha256_hex, write_atomic};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum WriteOutcome {
    Created,
    Updated,
    /// Existing file already had identical bytes; nothing was written.
    Unchanged,
}

#[derive(Debug, Clone, Serialize)]
pub struct WrittenFile {
    pub path: PathBuf,
    pub sha256: String,
    pub outcome: WriteOutcome,
}

/// Writes generated pages and reports under a workspace root.
#[derive(Debug, Clone)]
pub struct ContentWriter {
    root: PathBuf,
}

impl ContentWriter {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn page_path(&self, dir: &str, slug: &str) -> PathBuf {
        self.root.join(dir).join(format!("{slug}.json"))
    }

    pub async fn page_exists(&self, dir: &str, slug: &str) -> bool {
        fs::try_exists(self.page_path(dir, slug)).await.unwrap_or(false)
    }

    pub async fn read_page<T: DeserializeOwned>(&self, dir: &str, slug: &str) -> anyhow::Result<T> {
        let path = self.page_path(dir, slug);
        let bytes = fs::read(&path)
            .await
            .with_context(|| format!("reading {}", path.display()))?;
        serde_json::from_slice(&bytes).with_context(|| format!("parsing {}", path.display()))
    }

    /// `<root>/<dir>/<slug>.json`, pretty-printed.
    pub async fn write_page<T: Serialize>(&self, dir: &str, slug: &str, page: &T) -> anyhow::Result<WrittenFile> {
        let mut bytes = serde_json::to_vec_pretty(page).with_context(|| format!("serializing {dir}/{slug}"))?;
        bytes.push(b'\n');
        self.write_bytes(&self.page_path(dir, slug), &bytes).await
    }

    pub async fn write_text(&self, relative: impl AsRef<Path>, text: &str) -> anyhow::Result<WrittenFile> {
        self.write_bytes(&self.root.join(relative), text.as_bytes()).await
    }

    pub async fn write_json<T: Serialize>(&self, relative: impl AsRef<Path>, value: &T) -> anyhow::Result<WrittenFile> {
        let path = self.root.join(relative);
        let mut bytes = serde_json::to_vec_pretty(value)
            .with_context(|| format!("serializing {}", path.display()))?;
        bytes.push(b'\n');
        self.write_bytes(&path, &bytes).await
    }

    async fn write_bytes(&self, path: &Path, bytes: &[u8]) -> anyhow::Result<WrittenFile> {
        let sha256 = sha256_hex(bytes);
        let outcome = match fs::read(path).await {
            Ok(existing) if sha256_hex(&existing) == sha256 => WriteOutcome::Unchanged,
            Ok(_) => WriteOutcome::Updated,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => WriteOutcome::Created,
            Err(err) => return Err(err).with_context(|| format!("reading {}", path.display())),
        };
        if outcome != WriteOutcome::Unchanged {
            write_atomic(path, bytes).await?;
        }
        debug!(path = %path.display(), ?outcome, "content file");
        Ok(WrittenFile {
            path: path.to_path_buf(),
            sha256,
            outcome,
        })
    }

    /// Slugs of the `.json` pages in `<root>/<dir>`, sorted; empty when the directory is missing.
    pub async fn list_pages(&self, dir: &str) -> anyhow::Result<Vec<String>> {
        let path = self.root.join(dir);
        let mut entries = match fs::read_dir(&path).await {
            Ok(entries) => entries,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(err) => return Err(err).with_context(|| format!("reading {}", path.display())),
        };
        let mut slugs = Vec::new();
        while let Some(entry) = entries
            .next_entry()
            .await
            .with_context(|| format!("listing {}", path.display()))?
        {
            let name = entry.file_name().to_string_lossy().into_owned();
            if let Some(slug) = name.strip_suffix(".json") {
                if !slug.starts_with('.') {
                    slugs.push(slug.to_string());
                }
            }
        }
        slugs.sort();
        Ok(slugs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::tempdir;

    #[tokio::test]
    async fn identical_content_is_left_untouched() {
        let dir = tempdir().expect("tempdir");
        let writer = ContentWriter::new(dir.path());
        let page = json!({"title": "Claude vs Gemini"});

        let first = writer.write_page("comparison-content", "claude-vs-gemini", &page).await.expect("first");
        let second = writer.write_page("comparison-content", "claude-vs-gemini", &page).await.expect("second");
        let third = writer
            .write_page("comparison-content", "claude-vs-gemini", &json!({"title": "changed"}))
            .await
            .expect("third");

        assert_eq!(first.outcome, WriteOutcome::Created);
        assert_eq!(second.outcome, WriteOutcome::Unchanged);
        assert_eq!(first.sha256, second.sha256);
        assert_eq!(third.outcome, WriteOutcome::Updated);
        assert!(writer.page_exists("comparison-content", "claude-vs-gemini").await);

        let read: serde_json::Value = writer.read_page("comparison-content", "claude-vs-gemini").await.expect("read");
        assert_eq!(read, json!({"title": "changed"}));
        assert!(writer.read_page::<serde_json::Value>("comparison-content", "missing").await.is_err());
    }

    #[tokio::test]
    async fn lists_page_slugs() {
        let dir = tempdir().expect("tempdir");
        let writer = ContentWriter::new(dir.path());
        assert!(writer.list_pages("bestof-content").await.expect("missing dir").is_empty());

        writer.write_page("bestof-content", "best-free-ai-tools", &json!({})).await.expect("write");
        writer.write_page("bestof-content", "best-video-ai", &json!({})).await.expect("write");
        writer.write_text("bestof-content/notes.txt", "ignored").await.expect("write");

        assert_eq!(
            writer.list_pages("bestof-content").await.expect("list"),
            vec!["best-free-ai-tools".to_string(), "best-video-ai".to_string()]
        );
    }
}
