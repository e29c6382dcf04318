use anyhow::Result;
use platdir_core::PlatformRecord;
use serde::Serialize;
use tracing::{info, info_span, Instrument};

use crate::{first_or, group_by_category, spaced, GenerationSummary, Publisher};

pub const ALTERNATIVES_DIR: &str = "alternatives-content";

const MIN_CATEGORY_SIZE: usize = 4;
const TOP_PER_CATEGORY: usize = 20;
const MAIN_PER_CATEGORY: usize = 10;
const MAX_ALTERNATIVES: usize = 9;
const MIN_ALTERNATIVES: usize = 3;

const COMPARISON_CRITERIA: [&str; 7] = [
    "Pricing & Plans",
    "Features & Capabilities",
    "Ease of Use",
    "Integration Options",
    "Support & Documentation",
    "Scalability",
    "Community & Ecosystem",
];

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MainPlatform {
    pub name: String,
    pub description: Option<String>,
    pub pricing: Option<String>,
    pub pros: Vec<String>,
    pub cons: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AlternativeEntry {
    pub name: String,
    pub slug: String,
    pub description: String,
    pub pricing: String,
    pub rating: Option<f64>,
    pub best_for: String,
    pub key_features: Vec<String>,
    pub highlight: Option<&'static str>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AlternativesPage {
    pub slug: String,
    pub platform_slug: String,
    pub title: String,
    pub meta_description: String,
    pub introduction: String,
    pub main_platform: MainPlatform,
    pub alternatives: Vec<AlternativeEntry>,
    pub comparison_criteria: Vec<&'static str>,
    pub verdict: String,
}

/// One page to write: a platform and the category peers offered instead of it.
#[derive(Debug, Clone)]
pub struct AlternativesPlan<'a> {
    pub main: &'a PlatformRecord,
    pub alternatives: Vec<&'a PlatformRecord>,
}

pub fn plan_alternatives(records: &[PlatformRecord], limit: usize) -> Vec<AlternativesPlan<'_>> {
    let mut plans = Vec::new();
    for (_, members) in group_by_category(records) {
        if members.len() < MIN_CATEGORY_SIZE {
            continue;
        }
        let mut top: Vec<&PlatformRecord> = members
            .into_iter()
            .filter(|r| r.name().is_some() && !r.public_slug().is_empty())
            .collect();
        top.sort_by(|a, b| {
            b.rating_or_zero()
                .total_cmp(&a.rating_or_zero())
                .then_with(|| b.clicks.unwrap_or(0.0).total_cmp(&a.clicks.unwrap_or(0.0)))
        });
        top.truncate(TOP_PER_CATEGORY);

        for main in top.iter().take(MAIN_PER_CATEGORY) {
            if plans.len() >= limit {
                return plans;
            }
            let alternatives: Vec<&PlatformRecord> = top
                .iter()
                .filter(|r| r.id != main.id)
                .take(MAX_ALTERNATIVES)
                .copied()
                .collect();
            if alternatives.len() >= MIN_ALTERNATIVES {
                plans.push(AlternativesPlan { main, alternatives });
            }
        }
    }
    plans
}

fn highlight(rank: usize) -> Option<&'static str> {
    match rank {
        0 => Some("Top-rated alternative"),
        1 => Some("Best value"),
        2 => Some("Most popular"),
        _ => None,
    }
}

pub fn alternatives_page(plan: &AlternativesPlan<'_>, year: i32) -> AlternativesPage {
    let main = plan.main;
    let tool = main.name().unwrap_or(&main.id);
    let raw_category = main.category().unwrap_or("AI tools");
    let category = spaced(raw_category);
    let count = plan.alternatives.len();
    let generic_feature = format!("{raw_category} capabilities");

    let mut pros = Vec::new();
    if main.is_verified() {
        pros.push("Verified and trusted platform".to_string());
    }
    if main.is_featured() {
        pros.push("Featured tool with proven track record".to_string());
    }
    if let Some(rating) = main.rating.filter(|r| *r > 0.0) {
        pros.push(format!("High user rating ({rating}/5)"));
    }
    if main.feature_list().len() > 5 {
        pros.push("Extensive feature set".to_string());
    }

    let mut cons = Vec::new();
    if main.pricing.as_deref().is_some_and(|p| p.contains("paid")) {
        cons.push("Premium pricing may be barrier for some".to_string());
    }
    cons.push("May have more features than needed for simple use cases".to_string());
    cons.push("Learning curve for advanced features".to_string());

    let alternatives = plan
        .alternatives
        .iter()
        .enumerate()
        .map(|(rank, alt)| {
            let name = alt.name().unwrap_or(&alt.id).to_string();
            AlternativeEntry {
                description: alt
                    .description()
                    .map(str::to_string)
                    .unwrap_or_else(|| format!("{name} is a powerful {raw_category} alternative")),
                slug: alt.public_slug().to_string(),
                pricing: alt
                    .pricing
                    .clone()
                    .filter(|p| !p.trim().is_empty())
                    .unwrap_or_else(|| "See website for pricing".to_string()),
                rating: alt.rating,
                best_for: alt.tag_list().first().cloned().unwrap_or_else(|| "General use".to_string()),
                key_features: first_or(
                    alt.feature_list(),
                    3,
                    &[generic_feature.as_str(), "User-friendly interface", "Scalable solution"],
                ),
                highlight: highlight(rank),
                name,
            }
        })
        .collect();

    let nth = |i: usize, fallback_name: &'static str, fallback_tag: &'static str| {
        plan.alternatives.get(i).map_or((fallback_name, fallback_tag), |alt| {
            (
                alt.name().unwrap_or(&alt.id),
                alt.tag_list().first().map(String::as_str).unwrap_or(fallback_tag),
            )
        })
    };
    let (first, first_tag) = nth(0, "The top alternative", "similar capabilities");
    let (second, second_tag) = nth(1, "another option", "different features");
    let (third, third_tag) = nth(2, "a third choice", "unique benefits");

    AlternativesPage {
        slug: format!("{}-alternatives", main.public_slug()),
        platform_slug: main.public_slug().to_string(),
        title: format!("Best {tool} Alternatives in {year}: Top {category} Tools Compared"),
        meta_description: format!(
            "Looking for {tool} alternatives? Compare the top {count} {category} tools with features, pricing & use cases in {year}."
        ),
        introduction: format!(
            "{tool} is {}, but it might not be the perfect fit for everyone. Whether you're looking for different features, better pricing, or specialized capabilities, there are excellent alternatives available. This guide compares the top {count} {tool} alternatives to help you find the best {category} tool for your needs.",
            main.description()
                .map(str::to_string)
                .unwrap_or_else(|| format!("a popular {raw_category} platform"))
        ),
        main_platform: MainPlatform {
            name: tool.to_string(),
            description: main.description().map(str::to_string),
            pricing: main.pricing.clone(),
            pros,
            cons,
        },
        alternatives,
        comparison_criteria: COMPARISON_CRITERIA.to_vec(),
        verdict: format!(
            "While {tool} is a solid choice for {category}, the best alternative depends on your specific needs. {first} offers {first_tag}, {second} excels at {second_tag}, and {third} provides {third_tag}. Consider your budget, required features, and team size when making your decision."
        ),
    }
}

/// Writes up to `limit` `<slug>-alternatives` pages into [`ALTERNATIVES_DIR`].
pub async fn generate_alternatives(
    records: &[PlatformRecord],
    publisher: &Publisher,
    limit: usize,
) -> Result<GenerationSummary> {
    async {
        let plans = plan_alternatives(records, limit);
        info!(planned = plans.len(), "alternatives pages planned");

        let mut summary = GenerationSummary::new(ALTERNATIVES_DIR);
        for plan in &plans {
            let page = alternatives_page(plan, publisher.current_year());
            publisher
                .publish(ALTERNATIVES_DIR, &page.slug, &page.title, &page, &mut summary)
                .await?;
        }
        summary.log();
        Ok(summary)
    }
    .instrument(info_span!("alternatives", limit))
    .await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{platform, tagged};
    use platdir_storage::ContentWriter;
    use tempfile::tempdir;

    fn category(prefix: &str, category: &str, size: usize) -> Vec<PlatformRecord> {
        (0..size)
            .map(|i| {
                platform(
                    &format!("{prefix}-{i}"),
                    &format!("{prefix} {i}"),
                    category,
                    4.9 - i as f64 * 0.1,
                )
            })
            .collect()
    }

    #[test]
    fn small_categories_are_skipped() {
        let mut records = category("vid", "video-ai", 3);
        records.extend(category("llm", "llms", 4));

        let plans = plan_alternatives(&records, 100);
        assert_eq!(plans.len(), 4);
        assert!(plans.iter().all(|p| p.main.category() == Some("llms")));
        assert_eq!(plans[0].alternatives.len(), 3);
        assert!(plans[0].alternatives.iter().all(|a| a.id != plans[0].main.id));
    }

    #[test]
    fn at_most_ten_pages_with_nine_alternatives_per_category() {
        let records = category("img", "image-generation", 25);
        let plans = plan_alternatives(&records, 100);

        assert_eq!(plans.len(), 10);
        assert!(plans.iter().all(|p| p.alternatives.len() == 9));
        assert_eq!(plans[0].main.id, "img-0");
        assert_eq!(plan_alternatives(&records, 4).len(), 4);
    }

    #[test]
    fn page_highlights_the_first_three() {
        let mut records = category("llm", "llms", 4);
        records[0].verified = Some(true);
        records[1] = tagged(records[1].clone(), &["Reasoning"]);
        let plans = plan_alternatives(&records, 1);
        let page = alternatives_page(&plans[0], 2026);

        assert_eq!(page.slug, "llm-0-alternatives");
        assert_eq!(page.title, "Best llm 0 Alternatives in 2026: Top llms Tools Compared");
        assert_eq!(page.main_platform.pros, vec!["Verified and trusted platform", "High user rating (4.9/5)"]);
        let highlights: Vec<_> = page.alternatives.iter().map(|a| a.highlight).collect();
        assert_eq!(highlights, vec![Some("Top-rated alternative"), Some("Best value"), Some("Most popular")]);
        assert_eq!(page.alternatives[0].best_for, "Reasoning");
        assert_eq!(page.alternatives[1].key_features[0], "llms capabilities");
        assert!(page.verdict.contains("llm 1 offers Reasoning"));
    }

    #[tokio::test]
    async fn dry_run_writes_nothing() {
        let dir = tempdir().expect("tempdir");
        let publisher = Publisher::new(ContentWriter::new(dir.path())).dry_run(true);
        let summary = generate_alternatives(&category("llm", "llms", 5), &publisher, 100)
            .await
            .expect("generate");

        assert_eq!(summary.generated(), 5);
        assert_eq!(summary.created, 0);
        assert!(!dir.path().join(ALTERNATIVES_DIR).exists());
    }
}
