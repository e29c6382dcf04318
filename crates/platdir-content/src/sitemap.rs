use std::collections::BTreeSet;

use anyhow::{Context, Result};
use askama::Template;
use chrono::{DateTime, NaiveDate};
use platdir_core::PlatformRecord;
use platdir_storage::{ContentWriter, WrittenFile};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::{Publisher, ALTERNATIVES_DIR, BESTOF_DIR, COMPARISON_DIR};

pub const SITEMAP_PATH: &str = "public/sitemap.xml";
pub const BLOG_DIR: &str = "blog-posts";
pub const PILLAR_DIR: &str = "pillar-content";

const STATIC_PAGES: [&str; 6] = [
    "/about",
    "/submit",
    "/blog",
    "/guides",
    "/resources",
    "/how-to-choose-ai-platforms",
];

/// Content directory, public route prefix, change frequency, priority.
const CONTENT_ROUTES: [(&str, &str, &str, &str); 5] = [
    (PILLAR_DIR, "guide", "monthly", "0.8"),
    (BLOG_DIR, "blog", "monthly", "0.6"),
    (ALTERNATIVES_DIR, "alternatives", "monthly", "0.6"),
    (COMPARISON_DIR, "compare", "monthly", "0.6"),
    (BESTOF_DIR, "best-of", "weekly", "0.7"),
];

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SitemapEntry {
    pub loc: String,
    pub lastmod: String,
    pub changefreq: &'static str,
    pub priority: &'static str,
}

#[derive(Template)]
#[template(path = "sitemap.xml")]
struct SitemapTemplate<'a> {
    urls: &'a [SitemapEntry],
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PageStub {
    slug: Option<String>,
    last_updated: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct SitemapSummary {
    pub urls: usize,
    pub written: Option<WrittenFile>,
}

/// `last_updated` is a Firestore-style `{ "_seconds": n }` timestamp when present.
fn record_lastmod(record: &PlatformRecord) -> Option<String> {
    let seconds = record.last_updated.as_ref()?.get("_seconds")?.as_i64()?;
    DateTime::from_timestamp(seconds, 0).map(|at| at.date_naive().to_string())
}

async fn content_pages(writer: &ContentWriter, dir: &str) -> Vec<PageStub> {
    let slugs = match writer.list_pages(dir).await {
        Ok(slugs) => slugs,
        Err(err) => {
            warn!(dir, error = %format!("{err:#}"), "could not list content pages");
            return Vec::new();
        }
    };
    let mut pages = Vec::with_capacity(slugs.len());
    for slug in slugs {
        match writer.read_page::<PageStub>(dir, &slug).await {
            Ok(page) => pages.push(page),
            Err(err) => warn!(error = %format!("{err:#}"), "skipping unreadable content page"),
        }
    }
    pages
}

/// Every public URL: home, static pages, platforms, categories, then generated content.
pub async fn collect_sitemap(
    records: &[PlatformRecord],
    writer: &ContentWriter,
    base_url: &str,
    today: NaiveDate,
) -> Vec<SitemapEntry> {
    let base = base_url.trim_end_matches('/');
    let today = today.to_string();
    let entry = |loc: String, lastmod: String, changefreq, priority| SitemapEntry {
        loc,
        lastmod,
        changefreq,
        priority,
    };

    let mut urls = vec![entry(base.to_string(), today.clone(), "daily", "1.0")];
    for page in STATIC_PAGES {
        urls.push(entry(format!("{base}{page}"), today.clone(), "weekly", "0.8"));
    }

    for record in records {
        urls.push(entry(
            format!("{base}/platform/{}", record.public_slug()),
            record_lastmod(record).unwrap_or_else(|| today.clone()),
            "weekly",
            if record.is_featured() { "0.9" } else { "0.7" },
        ));
    }

    let mut seen = BTreeSet::new();
    for category in records.iter().filter_map(PlatformRecord::category) {
        if seen.insert(category) {
            urls.push(entry(format!("{base}/category/{category}"), today.clone(), "daily", "0.8"));
        }
    }

    for (dir, route, changefreq, priority) in CONTENT_ROUTES {
        for page in content_pages(writer, dir).await {
            let Some(slug) = page.slug.filter(|s| !s.is_empty()) else {
                continue;
            };
            urls.push(entry(
                format!("{base}/{route}/{slug}"),
                page.last_updated.unwrap_or_else(|| today.clone()),
                changefreq,
                priority,
            ));
        }
    }
    urls
}

/// Renders `urls` as a sitemaps.org `urlset`, escaping every value.
pub fn render_sitemap(urls: &[SitemapEntry]) -> Result<String> {
    SitemapTemplate { urls }.render().context("rendering sitemap")
}

/// Writes [`SITEMAP_PATH`] under the publisher's root.
pub async fn generate_sitemap(
    records: &[PlatformRecord],
    publisher: &Publisher,
    base_url: &str,
    today: NaiveDate,
) -> Result<SitemapSummary> {
    let urls = collect_sitemap(records, publisher.writer(), base_url, today).await;
    let xml = render_sitemap(&urls)?;
    let written = if publisher.is_dry_run() {
        None
    } else {
        Some(publisher.writer().write_text(SITEMAP_PATH, &xml).await?)
    };
    info!(urls = urls.len(), path = SITEMAP_PATH, "sitemap generated");
    Ok(SitemapSummary {
        urls: urls.len(),
        written,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::platform;
    use serde_json::json;
    use tempfile::tempdir;

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 3, 1).expect("date")
    }

    #[tokio::test]
    async fn lists_platforms_categories_and_content() {
        let dir = tempdir().expect("tempdir");
        let writer = ContentWriter::new(dir.path());
        writer
            .write_page(COMPARISON_DIR, "claude-vs-gemini", &json!({"slug": "claude-vs-gemini"}))
            .await
            .expect("page");
        writer
            .write_page(BLOG_DIR, "launch", &json!({"slug": "launch", "lastUpdated": "2026-02-01"}))
            .await
            .expect("post");
        writer.write_page(BESTOF_DIR, "no-slug", &json!({"title": "x"})).await.expect("page");
        writer
            .write_page(PILLAR_DIR, "ultimate-guide-llms-ai-tools-2026", &json!({"slug": "ultimate-guide-llms-ai-tools-2026"}))
            .await
            .expect("guide");

        let mut featured = platform("claude", "Claude", "llms", 4.8);
        featured.featured = Some(true);
        featured.last_updated = Some(json!({"_seconds": 1_767_225_600, "_nanoseconds": 0}));
        let records = vec![featured, platform("gemini", "Gemini", "llms", 4.6)];

        let urls = collect_sitemap(&records, &writer, "https://example.com/", today()).await;
        let locs: Vec<_> = urls.iter().map(|u| u.loc.as_str()).collect();

        assert_eq!(locs[0], "https://example.com");
        assert_eq!(locs.len(), 1 + 6 + 2 + 1 + 1 + 2);
        assert!(locs.contains(&"https://example.com/guide/ultimate-guide-llms-ai-tools-2026"));
        assert!(locs.contains(&"https://example.com/category/llms"));
        assert!(locs.contains(&"https://example.com/compare/claude-vs-gemini"));

        let claude = urls.iter().find(|u| u.loc.ends_with("/platform/claude")).expect("claude");
        assert_eq!((claude.priority, claude.lastmod.as_str()), ("0.9", "2026-01-01"));
        let gemini = urls.iter().find(|u| u.loc.ends_with("/platform/gemini")).expect("gemini");
        assert_eq!((gemini.priority, gemini.lastmod.as_str()), ("0.7", "2026-03-01"));
        let post = urls.iter().find(|u| u.loc.ends_with("/blog/launch")).expect("post");
        assert_eq!(post.lastmod, "2026-02-01");
    }

    #[test]
    fn values_are_xml_escaped() {
        let xml = render_sitemap(&[SitemapEntry {
            loc: "https://example.com/platform/r&d<lab>".to_string(),
            lastmod: "2026-03-01".to_string(),
            changefreq: "weekly",
            priority: "0.7",
        }])
        .expect("render");

        assert!(xml.starts_with("<?xml version=\"1.0\" encoding=\"UTF-8\"?>"));
        assert!(xml.contains("r&amp;d&lt;lab&gt;"));
        assert!(xml.contains("<priority>0.7</priority>"));
        assert!(xml.trim_end().ends_with("</urlset>"));
    }

    #[tokio::test]
    async fn writes_public_sitemap() {
        let dir = tempdir().expect("tempdir");
        let publisher = Publisher::new(ContentWriter::new(dir.path()));
        let summary = generate_sitemap(&[platform("a", "A", "llms", 4.0)], &publisher, "https://example.com", today())
            .await
            .expect("sitemap");

        assert_eq!(summary.urls, 9);
        let xml = std::fs::read_to_string(dir.path().join(SITEMAP_PATH)).expect("sitemap.xml");
        assert!(xml.contains("<loc>https://example.com/category/llms</loc>"));
    }
}
