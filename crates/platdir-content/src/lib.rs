//! Derivative pages built from the platform directory.
//!
//! Every generator is a pure planning step over `&[PlatformRecord]` followed by
//! writes through a [`Publisher`], which owns the [`ContentWriter`] and the
//! dry-run switch.

mod alternatives;
mod bestof;
mod comparisons;
mod sitemap;
mod slugs;

use std::collections::HashMap;

use chrono::{Datelike, Utc};
use platdir_core::PlatformRecord;
use platdir_storage::{ContentWriter, WriteOutcome};
use serde::Serialize;
use tracing::info;

pub use alternatives::{
    alternatives_page, generate_alternatives, plan_alternatives, AlternativeEntry, AlternativesPage,
    AlternativesPlan, MainPlatform, ALTERNATIVES_DIR,
};
pub use bestof::{best_of_page, generate_best_of, plan_best_of, BestOfList, BestOfPage, RankedPlatform, BESTOF_DIR};
pub use comparisons::{
    comparison_page, generate_comparisons, plan_comparisons, ComparisonPage, PageSection, COMPARISON_DIR,
};
pub use sitemap::{
    collect_sitemap, generate_sitemap, render_sitemap, SitemapEntry, SitemapSummary, BLOG_DIR, PILLAR_DIR, SITEMAP_PATH,
};
pub use slugs::{validate_content_slugs, MissingSlug, SlugCheckSummary, SlugIndex};

pub const CRATE_NAME: &str = "platdir-content";

/// Writes pages unless in dry-run mode, and stamps the year used in titles.
#[derive(Debug, Clone)]
pub struct Publisher {
    writer: ContentWriter,
    dry_run: bool,
    year: i32,
}

impl Publisher {
    pub fn new(writer: ContentWriter) -> Self {
        Self {
            writer,
            dry_run: false,
            year: Utc::now().year(),
        }
    }

    pub fn dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    pub fn year(mut self, year: i32) -> Self {
        self.year = year;
        self
    }

    pub fn writer(&self) -> &ContentWriter {
        &self.writer
    }

    pub fn is_dry_run(&self) -> bool {
        self.dry_run
    }

    pub fn current_year(&self) -> i32 {
        self.year
    }

    async fn publish<T: Serialize>(
        &self,
        dir: &'static str,
        slug: &str,
        title: &str,
        page: &T,
        summary: &mut GenerationSummary,
    ) -> anyhow::Result<()> {
        summary.titles.push(title.to_string());
        if self.dry_run {
            return Ok(());
        }
        let written = self.writer.write_page(dir, slug, page).await?;
        match written.outcome {
            WriteOutcome::Created => summary.created += 1,
            WriteOutcome::Updated => summary.updated += 1,
            WriteOutcome::Unchanged => summary.unchanged += 1,
        }
        Ok(())
    }
}

/// What one generator run produced.
#[derive(Debug, Clone, Serialize)]
pub struct GenerationSummary {
    pub dir: &'static str,
    pub titles: Vec<String>,
    pub created: usize,
    pub updated: usize,
    pub unchanged: usize,
}

impl GenerationSummary {
    fn new(dir: &'static str) -> Self {
        Self {
            dir,
            titles: Vec::new(),
            created: 0,
            updated: 0,
            unchanged: 0,
        }
    }

    pub fn generated(&self) -> usize {
        self.titles.len()
    }

    fn log(&self) {
        info!(
            dir = self.dir,
            generated = self.generated(),
            created = self.created,
            updated = self.updated,
            unchanged = self.unchanged,
            "content generated"
        );
    }
}

/// `"code-assistants"` -> `"code assistants"`.
pub(crate) fn spaced(category: &str) -> String {
    category.replace('-', " ")
}

/// Highest rating first; ties keep their input order.
pub(crate) fn sort_by_rating(records: &mut [&PlatformRecord]) {
    records.sort_by(|a, b| b.rating_or_zero().total_cmp(&a.rating_or_zero()));
}

/// Records grouped by category in first-seen order; missing categories group as `uncategorized`.
pub(crate) fn group_by_category(records: &[PlatformRecord]) -> Vec<(String, Vec<&PlatformRecord>)> {
    let mut index: HashMap<&str, usize> = HashMap::new();
    let mut groups: Vec<(String, Vec<&PlatformRecord>)> = Vec::new();
    for record in records {
        let category = record.category().unwrap_or("uncategorized");
        match index.get(category) {
            Some(&at) => groups[at].1.push(record),
            None => {
                index.insert(category, groups.len());
                groups.push((category.to_string(), vec![record]));
            }
        }
    }
    groups
}

/// First `n` entries, or `fallback` when the list is empty.
pub(crate) fn first_or(list: &[String], n: usize, fallback: &[&str]) -> Vec<String> {
    if list.is_empty() {
        fallback.iter().map(|s| s.to_string()).collect()
    } else {
        list.iter().take(n).cloned().collect()
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use platdir_core::PlatformRecord;

    pub fn platform(id: &str, name: &str, category: &str, rating: f64) -> PlatformRecord {
        PlatformRecord {
            category: Some(category.to_string()),
            rating: Some(rating),
            ..PlatformRecord::named(id, name)
        }
    }

    pub fn tagged(mut record: PlatformRecord, tags: &[&str]) -> PlatformRecord {
        record.tags = Some(tags.iter().map(|t| t.to_string()).collect());
        record
    }
}
