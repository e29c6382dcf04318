use std::collections::HashMap;

use anyhow::Result;
use platdir_core::{category_display_name, slugify, PlatformRecord};
use serde::Serialize;
use tracing::{info, info_span, Instrument};

use crate::{first_or, group_by_category, sort_by_rating, GenerationSummary, Publisher};

pub const BESTOF_DIR: &str = "bestof-content";

const SELECTION_CRITERIA: [&str; 8] = [
    "User ratings and reviews",
    "Feature completeness",
    "Pricing and value for money",
    "Ease of use and onboarding",
    "Documentation and support",
    "Community and ecosystem",
    "Integration capabilities",
    "Performance and reliability",
];

/// Audience pages: a platform qualifies when any tag contains one of the keywords.
const USE_CASES: [(&str, &[&str]); 5] = [
    ("Developers", &["Development", "Code", "Programming", "IDE", "GitHub"]),
    ("Data Scientists", &["Data", "Analytics", "ML", "Model", "Training"]),
    ("Content Creators", &["Content", "Creative", "Design", "Video", "Image"]),
    ("Businesses", &["Enterprise", "Business", "Automation", "Workflow"]),
    ("Researchers", &["Research", "Academic", "Scientific"]),
];

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RankedPlatform {
    pub rank: usize,
    pub name: String,
    pub slug: String,
    pub description: String,
    pub pricing: String,
    pub rating: Option<f64>,
    pub verified: Option<bool>,
    pub featured: Option<bool>,
    pub best_for: String,
    pub key_features: Vec<String>,
    pub pros: Vec<&'static str>,
    pub cons: Vec<&'static str>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BestOfPage {
    pub slug: String,
    pub title: String,
    pub meta_description: String,
    pub introduction: String,
    pub category: String,
    pub total_platforms: usize,
    pub platforms: Vec<RankedPlatform>,
    pub selection_criteria: Vec<&'static str>,
    pub how_to_choose: Vec<String>,
    pub verdict: String,
}

/// A ranked list before it is rendered into a page.
#[derive(Debug, Clone)]
pub struct BestOfList<'a> {
    pub title: String,
    /// Lowercase noun phrase used in the page copy, e.g. `"free video ai AI tools"`.
    pub description: String,
    pub category: String,
    pub platforms: Vec<&'a PlatformRecord>,
}

impl BestOfList<'_> {
    pub fn slug(&self) -> String {
        slugify(&self.title)
    }
}

fn top_rated<'a>(mut records: Vec<&'a PlatformRecord>, n: usize) -> Vec<&'a PlatformRecord> {
    sort_by_rating(&mut records);
    records.truncate(n);
    records
}

fn has_tag_containing(record: &PlatformRecord, needles: &[&str]) -> bool {
    record
        .tag_list()
        .iter()
        .any(|tag| needles.iter().any(|needle| tag.contains(needle)))
}

fn is_free(record: &PlatformRecord) -> bool {
    record
        .pricing
        .as_deref()
        .is_some_and(|p| p.to_lowercase().contains("free"))
}

fn is_open_source(record: &PlatformRecord) -> bool {
    record.tag_list().iter().any(|tag| {
        let tag = tag.to_lowercase();
        tag.contains("open source") || tag.contains("open-source")
    })
}

fn is_enterprise(record: &PlatformRecord) -> bool {
    record.tag_list().iter().any(|tag| tag.to_lowercase().contains("enterprise"))
        || record
            .pricing
            .as_deref()
            .is_some_and(|p| p.to_lowercase().contains("enterprise"))
}

/// Every list worth a page, in publishing order.
///
/// Category lists first, then free, open-source and enterprise variants per
/// category, then the most common tags, then audience lists.
pub fn plan_best_of(records: &[PlatformRecord]) -> Vec<BestOfList<'_>> {
    let groups = group_by_category(records);
    let mut lists = Vec::new();

    for (category, members) in &groups {
        if members.len() < 3 {
            continue;
        }
        let display = category_display_name(category);
        lists.push(BestOfList {
            title: format!("Best {display} AI Tools"),
            description: format!("{} AI tools", display.to_lowercase()),
            category: category.clone(),
            platforms: top_rated(members.clone(), 15),
        });
    }

    let variants: [(&str, &str, fn(&PlatformRecord) -> bool); 3] = [
        ("Free", "free", is_free),
        ("Open Source", "open source", is_open_source),
        ("Enterprise", "enterprise", is_enterprise),
    ];
    for (label, lower, keep) in variants {
        for (category, members) in &groups {
            let matching = members.iter().copied().filter(|r| keep(r)).collect();
            let platforms = top_rated(matching, 10);
            if platforms.len() < 3 {
                continue;
            }
            let display = category_display_name(category);
            lists.push(BestOfList {
                title: format!("Best {label} {display} AI Tools"),
                description: format!("{lower} {} AI tools", display.to_lowercase()),
                category: category.clone(),
                platforms,
            });
        }
    }

    let mut tag_order: Vec<&str> = Vec::new();
    let mut by_tag: HashMap<&str, Vec<&PlatformRecord>> = HashMap::new();
    for record in records {
        for tag in record.tag_list() {
            by_tag
                .entry(tag.as_str())
                .or_insert_with(|| {
                    tag_order.push(tag.as_str());
                    Vec::new()
                })
                .push(record);
        }
    }
    let mut popular: Vec<(&str, Vec<&PlatformRecord>)> = tag_order
        .into_iter()
        .filter_map(|tag| by_tag.remove(tag).map(|members| (tag, members)))
        .filter(|(_, members)| members.len() >= 5)
        .collect();
    popular.sort_by(|a, b| b.1.len().cmp(&a.1.len()));
    popular.truncate(50);
    for (tag, members) in popular {
        let category = members[0].category().unwrap_or("ai-tools").to_string();
        lists.push(BestOfList {
            title: format!("Best {tag} AI Tools"),
            description: format!("{} AI tools", tag.to_lowercase()),
            category,
            platforms: top_rated(members, 12),
        });
    }

    for (audience, keywords) in USE_CASES {
        let matching = records.iter().filter(|r| has_tag_containing(r, keywords)).collect();
        let platforms = top_rated(matching, 12);
        if platforms.len() < 5 {
            continue;
        }
        lists.push(BestOfList {
            title: format!("Best AI Tools for {audience}"),
            description: format!("AI tools for {}", audience.to_lowercase()),
            category: "ai-tools".to_string(),
            platforms,
        });
    }

    lists
}

/// `"video ai AI tools"` -> `"video ai AI tool"`; only the first match changes.
fn singular_tool(description: &str) -> String {
    let lower = description.to_ascii_lowercase();
    match lower.find("tool") {
        Some(at) => {
            let end = if lower[at + 4..].starts_with('s') { at + 5 } else { at + 4 };
            format!("{}tool{}", &description[..at], &description[end..])
        }
        None => description.to_string(),
    }
}

fn ranked(rank: usize, record: &PlatformRecord, category: &str) -> RankedPlatform {
    let name = record.name().unwrap_or(&record.id).to_string();
    let mut pros = Vec::new();
    if record.is_verified() {
        pros.push("Verified platform");
    }
    if record.rating_or_zero() >= 4.5 {
        pros.push("Highly rated");
    }
    if record.feature_list().len() > 5 {
        pros.push("Feature-rich");
    }
    let mut cons = Vec::new();
    if record
        .pricing
        .as_deref()
        .is_some_and(|p| p.contains("paid") && !p.contains("free"))
    {
        cons.push("Paid only");
    }
    cons.push("May have learning curve");

    RankedPlatform {
        rank,
        description: record
            .description()
            .map(str::to_string)
            .unwrap_or_else(|| format!("{name} is a powerful {category} solution")),
        slug: record.public_slug().to_string(),
        pricing: record
            .pricing
            .clone()
            .filter(|p| !p.trim().is_empty())
            .unwrap_or_else(|| "See website for pricing".to_string()),
        rating: record.rating,
        verified: record.verified,
        featured: record.featured,
        best_for: record.tag_list().first().cloned().unwrap_or_else(|| "General use".to_string()),
        key_features: first_or(record.feature_list(), 3, &["Core features", "User-friendly", "Scalable"]),
        pros,
        cons,
        name,
    }
}

pub fn best_of_page(list: &BestOfList<'_>, year: i32) -> BestOfPage {
    let count = list.platforms.len();
    let description = &list.description;
    let lead = |i: usize, fallback: &'static str| {
        list.platforms.get(i).map_or(("", fallback), |r| {
            (
                r.name().unwrap_or(&r.id),
                r.tag_list().first().map(String::as_str).unwrap_or(fallback),
            )
        })
    };
    let (first, first_tag) = lead(0, "comprehensive features");
    let (second, second_tag) = lead(1, "great value");

    BestOfPage {
        slug: list.slug(),
        title: format!("{} - Top Picks for {year}", list.title),
        meta_description: format!(
            "Discover the {count} best {description} in {year}. Compare features, pricing & reviews to find the perfect tool for your needs."
        ),
        introduction: format!(
            "Looking for the best {description} in {year}? We've analyzed hundreds of tools to bring you this curated list of the top {count} options. Whether you're a developer, business, or individual user, this guide helps you choose the right {}.",
            singular_tool(description)
        ),
        category: list.category.clone(),
        total_platforms: count,
        platforms: list
            .platforms
            .iter()
            .enumerate()
            .map(|(i, record)| ranked(i + 1, record, &list.category))
            .collect(),
        selection_criteria: SELECTION_CRITERIA.to_vec(),
        how_to_choose: vec![
            format!("Define your specific needs and use cases for {description}"),
            "Consider your budget and team size".to_string(),
            "Evaluate required integrations with existing tools".to_string(),
            "Check free trials or free tiers before committing".to_string(),
            "Read user reviews and case studies".to_string(),
            "Assess scalability for future growth".to_string(),
            "Consider support and documentation quality".to_string(),
        ],
        verdict: format!(
            "All {count} {description} on this list are excellent choices, each with unique strengths. {first} leads with {first_tag}, while {second} offers {second_tag}. Your best choice depends on your specific requirements, budget, and technical expertise."
        ),
    }
}

/// Writes up to `limit` best-of pages into [`BESTOF_DIR`].
pub async fn generate_best_of(
    records: &[PlatformRecord],
    publisher: &Publisher,
    limit: usize,
) -> Result<GenerationSummary> {
    async {
        let mut lists = plan_best_of(records);
        info!(available = lists.len(), "best-of lists planned");
        lists.truncate(limit);

        let mut summary = GenerationSummary::new(BESTOF_DIR);
        for list in &lists {
            let page = best_of_page(list, publisher.current_year());
            publisher
                .publish(BESTOF_DIR, &page.slug, &page.title, &page, &mut summary)
                .await?;
        }
        summary.log();
        Ok(summary)
    }
    .instrument(info_span!("best_of", limit))
    .await
}
