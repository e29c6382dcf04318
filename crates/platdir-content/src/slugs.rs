//! Cross-checks generated pages against the platforms they link to.
//!
//! Comparison, alternatives and best-of pages carry platform slugs. Records
//! get merged away or re-slugged, so those references go stale; this pass
//! reports them and, when asked, rewrites the ones with a known replacement.

use std::collections::{BTreeMap, HashSet};

use anyhow::Result;
use platdir_core::{slugify, PlatformRecord};
use serde::Serialize;
use serde_json::Value as JsonValue;
use tracing::{info, info_span, warn, Instrument};

use crate::{Publisher, ALTERNATIVES_DIR, BESTOF_DIR, COMPARISON_DIR};

const CHECKED_DIRS: [&str; 3] = [COMPARISON_DIR, ALTERNATIVES_DIR, BESTOF_DIR];
const SLUG_FIELDS: [&str; 3] = ["platform1Slug", "platform2Slug", "platformSlug"];
/// Lists of slugs, or of objects with a `slug` key.
const SLUG_LISTS: [&str; 3] = ["alternatives", "platforms", "relatedPlatforms"];

/// Live slugs plus the stale spellings that map onto them.
#[derive(Debug, Clone, Default)]
pub struct SlugIndex {
    live: HashSet<String>,
    replacements: BTreeMap<String, String>,
}

impl SlugIndex {
    /// `corrections` (stale -> live) win over aliases derived from records:
    /// an id, stored slug, or slugified name that differs from the public slug.
    pub fn new(records: &[PlatformRecord], corrections: &BTreeMap<String, String>) -> Self {
        let live: HashSet<String> = records
            .iter()
            .map(|r| r.public_slug().to_string())
            .filter(|s| !s.is_empty())
            .collect();

        let mut replacements = BTreeMap::new();
        for record in records {
            let public = record.public_slug();
            if public.is_empty() {
                continue;
            }
            let aliases = [
                Some(record.id.clone()),
                record.slug.clone(),
                record.name().map(slugify),
            ];
            for alias in aliases.into_iter().flatten() {
                if !alias.is_empty() && alias != public && !live.contains(&alias) {
                    replacements.entry(alias).or_insert_with(|| public.to_string());
                }
            }
        }
        for (stale, target) in corrections {
            if live.contains(target) {
                replacements.insert(stale.clone(), target.clone());
            } else {
                warn!(%stale, %target, "slug correction points at no platform; ignored");
            }
        }
        Self { live, replacements }
    }

    pub fn is_live(&self, slug: &str) -> bool {
        self.live.contains(slug)
    }

    pub fn replacement(&self, slug: &str) -> Option<&str> {
        self.replacements.get(slug).map(String::as_str)
    }
}

/// A page reference to a slug no platform has.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MissingSlug {
    pub dir: &'static str,
    pub page: String,
    /// `platform1Slug`, `alternatives[2].slug`, ...
    pub field: String,
    pub slug: String,
    pub replacement: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct SlugCheckSummary {
    pub pages: usize,
    pub references: usize,
    pub missing: Vec<MissingSlug>,
    pub unreadable: Vec<String>,
    /// Pages rewritten with replacements (counted, not written, on a dry run).
    pub pages_fixed: usize,
}

impl SlugCheckSummary {
    /// Missing references with no known replacement.
    pub fn unresolved(&self) -> usize {
        self.missing.iter().filter(|m| m.replacement.is_none()).count()
    }
}

/// Calls `visit(field, slug)` for every platform slug a page refers to.
pub(crate) fn visit_slugs(page: &mut JsonValue, mut visit: impl FnMut(&str, &mut String)) {
    let Some(object) = page.as_object_mut() else {
        return;
    };
    for (key, value) in object.iter_mut() {
        if SLUG_FIELDS.contains(&key.as_str()) {
            if let JsonValue::String(slug) = value {
                visit(key, slug);
            }
        } else if SLUG_LISTS.contains(&key.as_str()) {
            let JsonValue::Array(items) = value else {
                continue;
            };
            for (i, item) in items.iter_mut().enumerate() {
                match item {
                    JsonValue::String(slug) => visit(&format!("{key}[{i}]"), slug),
                    JsonValue::Object(entry) => {
                        if let Some(JsonValue::String(slug)) = entry.get_mut("slug") {
                            visit(&format!("{key}[{i}].slug"), slug);
                        }
                    }
                    _ => {}
                }
            }
        }
    }
}

/// Checks every comparison, alternatives and best-of page. With `fix`, stale
/// slugs that have a replacement are rewritten in place.
pub async fn validate_content_slugs(
    records: &[PlatformRecord],
    publisher: &Publisher,
    corrections: &BTreeMap<String, String>,
    fix: bool,
) -> Result<SlugCheckSummary> {
    async {
        let index = SlugIndex::new(records, corrections);
        let writer = publisher.writer();
        let mut summary = SlugCheckSummary::default();

        for dir in CHECKED_DIRS {
            for page_slug in writer.list_pages(dir).await? {
                let mut page: JsonValue = match writer.read_page(dir, &page_slug).await {
                    Ok(page) => page,
                    Err(err) => {
                        warn!(error = %format!("{err:#}"), "skipping unreadable content page");
                        summary.unreadable.push(format!("{dir}/{page_slug}"));
                        continue;
                    }
                };
                summary.pages += 1;

                let mut changed = false;
                visit_slugs(&mut page, |field, slug| {
                    summary.references += 1;
                    if index.is_live(slug) {
                        return;
                    }
                    let replacement = index.replacement(slug).map(str::to_string);
                    summary.missing.push(MissingSlug {
                        dir,
                        page: page_slug.clone(),
                        field: field.to_string(),
                        slug: slug.clone(),
                        replacement: replacement.clone(),
                    });
                    if let (true, Some(replacement)) = (fix, replacement) {
                        info!(page = %page_slug, field, from = %slug, to = %replacement, "slug replaced");
                        *slug = replacement;
                        changed = true;
                    }
                });

                if changed {
                    summary.pages_fixed += 1;
                    if !publisher.is_dry_run() {
                        writer.write_page(dir, &page_slug, &page).await?;
                    }
                }
            }
        }

        info!(
            pages = summary.pages,
            references = summary.references,
            missing = summary.missing.len(),
            unresolved = summary.unresolved(),
            fixed = summary.pages_fixed,
            "content slugs checked"
        );
        Ok(summary)
    }
    .instrument(info_span!("content_slugs", fix))
    .await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::platform;
    use platdir_storage::ContentWriter;
    use serde_json::json;
    use tempfile::tempdir;

    fn directory() -> Vec<PlatformRecord> {
        let mut gpt = platform("chatgpt", "ChatGPT", "llms", 4.7);
        gpt.slug = Some("chatgpt".into());
        let mut hf = platform("huggingface", "Hugging Face Transformers", "ml-frameworks", 4.5);
        hf.slug = Some("hugging-face-transformers".into());
        vec![gpt, hf, platform("gemini", "Gemini", "llms", 4.6)]
    }

    #[test]
    fn record_aliases_and_curated_corrections() {
        let corrections = BTreeMap::from([
            ("gpt-4".to_string(), "chatgpt".to_string()),
            ("claude-3".to_string(), "claude".to_string()),
        ]);
        let index = SlugIndex::new(&directory(), &corrections);

        assert!(index.is_live("hugging-face-transformers"));
        assert!(!index.is_live("huggingface"));
        assert_eq!(index.replacement("huggingface"), Some("hugging-face-transformers"));
        assert_eq!(index.replacement("gpt-4"), Some("chatgpt"));
        assert_eq!(index.replacement("claude-3"), None);
    }

    #[test]
    fn visits_fields_and_lists() {
        let mut page = json!({
            "slug": "chatgpt-alternatives",
            "platformSlug": "chatgpt",
            "alternatives": [{"slug": "gemini", "name": "Gemini"}, {"name": "no slug"}],
            "relatedPlatforms": ["claude"],
            "title": "Best ChatGPT Alternatives"
        });
        let mut seen = Vec::new();
        visit_slugs(&mut page, |field, slug| seen.push((field.to_string(), slug.clone())));
        seen.sort();

        assert_eq!(
            seen,
            vec![
                ("alternatives[0].slug".to_string(), "gemini".to_string()),
                ("platformSlug".to_string(), "chatgpt".to_string()),
                ("relatedPlatforms[0]".to_string(), "claude".to_string()),
            ]
        );
    }

    #[tokio::test]
    async fn reports_and_fixes_stale_references() {
        let dir = tempdir().expect("tempdir");
        let writer = ContentWriter::new(dir.path());
        writer
            .write_page(
                COMPARISON_DIR,
                "gpt-4-vs-gemini",
                &json!({"platform1Slug": "gpt-4", "platform2Slug": "gemini"}),
            )
            .await
            .expect("comparison");
        writer
            .write_page(
                BESTOF_DIR,
                "best-llms",
                &json!({"platforms": [{"slug": "huggingface"}, {"slug": "vanished"}]}),
            )
            .await
            .expect("best-of");
        let corrections = BTreeMap::from([("gpt-4".to_string(), "chatgpt".to_string())]);
        let records = directory();

        let publisher = Publisher::new(writer.clone());
        let report = validate_content_slugs(&records, &publisher, &corrections, false)
            .await
            .expect("check");
        assert_eq!((report.pages, report.references), (2, 4));
        assert_eq!(report.missing.len(), 3);
        assert_eq!(report.unresolved(), 1);
        assert_eq!(report.pages_fixed, 0);

        let fixed = validate_content_slugs(&records, &publisher, &corrections, true)
            .await
            .expect("fix");
        assert_eq!(fixed.pages_fixed, 2);
        let comparison: JsonValue = writer.read_page(COMPARISON_DIR, "gpt-4-vs-gemini").await.expect("read");
        assert_eq!(comparison["platform1Slug"], json!("chatgpt"));
        let best: JsonValue = writer.read_page(BESTOF_DIR, "best-llms").await.expect("read");
        assert_eq!(best["platforms"][0]["slug"], json!("hugging-face-transformers"));
        assert_eq!(best["platforms"][1]["slug"], json!("vanished"));

        let after = validate_content_slugs(&records, &publisher, &corrections, false)
            .await
            .expect("recheck");
        assert_eq!(after.missing.len(), 1);
        assert_eq!(after.missing[0].field, "platforms[1].slug");
    }

    #[tokio::test]
    async fn dry_run_fix_leaves_pages_alone() {
        let dir = tempdir().expect("tempdir");
        let writer = ContentWriter::new(dir.path());
        let page = json!({"platformSlug": "huggingface", "alternatives": []});
        writer.write_page(ALTERNATIVES_DIR, "hf-alternatives", &page).await.expect("page");

        let publisher = Publisher::new(writer.clone()).dry_run(true);
        let summary = validate_content_slugs(&directory(), &publisher, &BTreeMap::new(), true)
            .await
            .expect("fix");
        assert_eq!(summary.pages_fixed, 1);
        let read: JsonValue = writer.read_page(ALTERNATIVES_DIR, "hf-alternatives").await.expect("read");
        assert_eq!(read, page);
    }
}
