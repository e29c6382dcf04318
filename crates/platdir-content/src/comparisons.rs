use std::collections::HashSet;

use anyhow::Result;
use platdir_core::PlatformRecord;
use serde::Serialize;
use tracing::{info, info_span, Instrument};

use crate::{spaced, GenerationSummary, Publisher};

pub const COMPARISON_DIR: &str = "comparison-content";

const TOP_PLATFORMS: usize = 100;
const MAX_PER_PLATFORM: usize = 5;

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PageSection {
    pub title: String,
    pub paragraphs: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ComparisonPage {
    pub slug: String,
    pub platform1_slug: String,
    pub platform2_slug: String,
    pub title: String,
    pub meta_description: String,
    pub introduction: String,
    pub cross_category: bool,
    pub sections: Vec<PageSection>,
    pub verdict: String,
}

fn prominence(record: &PlatformRecord) -> f64 {
    let mut score = record.rating_or_zero() * 10.0;
    if record.is_featured() {
        score += 5.0;
    }
    if record.is_verified() {
        score += 3.0;
    }
    score
}

fn pair_slug(a: &PlatformRecord, b: &PlatformRecord) -> String {
    format!("{}-vs-{}", a.public_slug(), b.public_slug())
}

/// Pairs among the most prominent platforms that have no page in either orientation.
pub fn plan_comparisons<'a>(
    records: &'a [PlatformRecord],
    existing: &HashSet<String>,
    target: usize,
) -> Vec<(&'a PlatformRecord, &'a PlatformRecord)> {
    let mut top: Vec<&PlatformRecord> = records
        .iter()
        .filter(|r| r.name().is_some() && !r.public_slug().is_empty())
        .collect();
    top.sort_by(|a, b| prominence(b).total_cmp(&prominence(a)));
    top.truncate(TOP_PLATFORMS);

    let mut pairs = Vec::new();
    'outer: for (i, first) in top.iter().enumerate() {
        let mut count = 0;
        for second in &top[i + 1..] {
            if pairs.len() >= target {
                break 'outer;
            }
            if count >= MAX_PER_PLATFORM {
                break;
            }
            if existing.contains(&pair_slug(first, second)) || existing.contains(&pair_slug(second, first)) {
                continue;
            }
            pairs.push((*first, *second));
            count += 1;
        }
    }
    pairs
}

fn tag_summary(record: &PlatformRecord, fallback: &str) -> String {
    let tags = record.tag_list();
    if tags.is_empty() {
        fallback.to_string()
    } else {
        tags.iter().take(3).cloned().collect::<Vec<_>>().join(", ")
    }
}

fn feature_summary(record: &PlatformRecord, fallback: &str) -> String {
    let features = record.feature_list();
    if features.is_empty() {
        fallback.to_string()
    } else {
        features.iter().take(3).cloned().collect::<Vec<_>>().join(", ")
    }
}

fn lead_tag<'a>(record: &'a PlatformRecord, fallback: &'a str) -> &'a str {
    record.tag_list().first().map(String::as_str).unwrap_or(fallback)
}

pub fn comparison_page(a: &PlatformRecord, b: &PlatformRecord, year: i32) -> ComparisonPage {
    let a_name = a.name().unwrap_or(&a.id);
    let b_name = b.name().unwrap_or(&b.id);
    let same_category = a.category().is_some() && a.category() == b.category();
    let category = spaced(a.category().unwrap_or("AI tools"));
    let kind = if same_category {
        format!("{category} Tool")
    } else {
        "AI Tool".to_string()
    };
    let category_of = |r: &PlatformRecord| r.category().map(spaced).unwrap_or_else(|| "AI tool".to_string());
    let pricing_of = |r: &PlatformRecord| {
        r.pricing
            .as_deref()
            .filter(|p| !p.trim().is_empty())
            .unwrap_or("Visit website for pricing details")
            .to_string()
    };

    ComparisonPage {
        slug: pair_slug(a, b),
        platform1_slug: a.public_slug().to_string(),
        platform2_slug: b.public_slug().to_string(),
        title: format!("{a_name} vs {b_name}: Which {kind} is Better in {year}?"),
        meta_description: format!(
            "Compare {a_name} vs {b_name}. See pricing, features, pros & cons to choose the best AI tool for your needs in {year}."
        ),
        introduction: format!(
            "Choosing between {a_name} and {b_name}? {}, each with unique strengths. This comparison breaks down the key differences to help you decide.",
            if same_category {
                format!("Both are popular {category} tools")
            } else {
                "These AI tools serve different but sometimes overlapping purposes".to_string()
            }
        ),
        cross_category: !same_category,
        sections: vec![
            PageSection {
                title: format!("Overview: {a_name} vs {b_name}"),
                paragraphs: vec![
                    format!(
                        "{a_name} ({}) is {}. It's known for {}.",
                        category_of(a),
                        a.description().unwrap_or("a powerful platform"),
                        tag_summary(a, "its capabilities")
                    ),
                    format!(
                        "{b_name} ({}) is {}. Users choose it for {}.",
                        category_of(b),
                        b.description().unwrap_or("another strong option"),
                        tag_summary(b, "its features")
                    ),
                ],
            },
            PageSection {
                title: "Pricing Comparison".to_string(),
                paragraphs: vec![
                    format!("{a_name}: {}.", pricing_of(a)),
                    format!("{b_name}: {}.", pricing_of(b)),
                ],
            },
            PageSection {
                title: "Key Features".to_string(),
                paragraphs: vec![
                    format!("{a_name}: {}", feature_summary(a, "Core features available")),
                    format!("{b_name}: {}", feature_summary(b, "Full feature set")),
                ],
            },
        ],
        verdict: format!(
            "Both {a_name} and {b_name} are excellent AI tools. {} choice depends on specific needs: {a_name} for {}, {b_name} for {}.",
            if same_category {
                format!("For {category}, your")
            } else {
                "Your".to_string()
            },
            lead_tag(a, "certain use cases"),
            lead_tag(b, "other scenarios")
        ),
    }
}

/// Writes up to `target` new `<a>-vs-<b>` pages into [`COMPARISON_DIR`].
pub async fn generate_comparisons(
    records: &[PlatformRecord],
    publisher: &Publisher,
    target: usize,
) -> Result<GenerationSummary> {
    async {
        let existing: HashSet<String> = publisher.writer().list_pages(COMPARISON_DIR).await?.into_iter().collect();
        let pairs = plan_comparisons(records, &existing, target);
        info!(existing = existing.len(), planned = pairs.len(), "comparison pages planned");

        let mut summary = GenerationSummary::new(COMPARISON_DIR);
        for (a, b) in pairs {
            let page = comparison_page(a, b, publisher.current_year());
            publisher
                .publish(COMPARISON_DIR, &page.slug, &page.title, &page, &mut summary)
                .await?;
        }
        summary.log();
        Ok(summary)
    }
    .instrument(info_span!("comparisons", limit = target))
    .await
}
