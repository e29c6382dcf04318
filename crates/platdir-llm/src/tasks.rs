//! Directory tasks driven by a [`ChatClient`]: discovery, enrichment,
//! recategorisation, duplicate review, affiliate research and long-form writing.
//!
//! Every task degrades to "no result" on a bad reply or a failed call, logging
//! a warning. Exhausted credits are the exception and always propagate so that
//! batch loops can stop.

use std::collections::BTreeSet;

use platdir_core::{category_display_name, domain_of, PlatformRecord};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use tracing::{debug, warn};

use crate::{parse_json_array_lenient, parse_json_object, ChatClient, ChatRequest, Confident, LlmError};

const KNOWN_NAMES_IN_PROMPT: usize = 100;

const DISCOVERY_FOCUS: &[&str] = &[
    "AI agents and workflow automation",
    "video, image and audio generation",
    "developer tools, code assistants and MLOps",
    "AI for marketing, sales and customer support",
    "research, search and document AI",
    "vertical AI for healthcare, legal, finance and education",
    "open-source models and inference platforms",
    "productivity, writing and meeting assistants",
];

fn soften<T: Default>(task: &str, subject: &str, result: Result<T, LlmError>) -> Result<T, LlmError> {
    match result {
        Ok(value) => Ok(value),
        Err(err) if err.is_credits_exhausted() => Err(err),
        Err(err) => {
            warn!(task, subject, error = %err, "AI task failed; skipping");
            Ok(T::default())
        }
    }
}

async fn ask<T>(
    client: &dyn ChatClient,
    request: &ChatRequest,
    decode: impl FnOnce(&str) -> Result<T, LlmError>,
) -> Result<T, LlmError> {
    let reply = client.complete(request).await?;
    decode(&reply)
}

fn join_or_na(items: &[String]) -> String {
    if items.is_empty() {
        "N/A".to_string()
    } else {
        items.join(", ")
    }
}

/// What the model is told about the directory before discovering more.
#[derive(Debug, Clone, Default)]
pub struct DiscoveryContext {
    pub total: usize,
    pub known_names: Vec<String>,
    pub categories: Vec<String>,
}

impl DiscoveryContext {
    pub fn from_records(records: &[PlatformRecord]) -> Self {
        let known_names = records
            .iter()
            .filter_map(PlatformRecord::name)
            .map(str::to_lowercase)
            .collect();
        let categories: BTreeSet<String> = records
            .iter()
            .filter_map(PlatformRecord::category)
            .map(str::to_string)
            .collect();
        Self {
            total: records.len(),
            known_names,
            categories: categories.into_iter().collect(),
        }
    }

    fn known_names_line(&self) -> String {
        let shown: Vec<&str> = self
            .known_names
            .iter()
            .take(KNOWN_NAMES_IN_PROMPT)
            .map(String::as_str)
            .collect();
        let hidden = self.known_names.len().saturating_sub(shown.len());
        if hidden > 0 {
            format!("{} ... (and {hidden} more)", shown.join(", "))
        } else {
            shown.join(", ")
        }
    }
}

fn discovery_prompt(ctx: &DiscoveryContext, batch_no: usize, per_batch: usize) -> String {
    let focus = DISCOVERY_FOCUS[batch_no % DISCOVERY_FOCUS.len()];
    format!(
        "You are researching AI platforms and tools that are live today.\n\n\
         EXISTING PLATFORMS ({total} total): {names}\n\n\
         EXISTING CATEGORIES: {categories}\n\n\
         Find {per_batch} AI platforms focused on {focus} that are NOT in the existing list \
         (no variations or renamed duplicates). Each must have a working official website.\n\n\
         For each platform return: name, description (2-3 sentences), url, category \
         (an existing one or a new lowercase-with-hyphens one), tags (5-8), pricing \
         (free, freemium, paid, open-source or enterprise), features (3-5), use_cases (3-5), \
         has_affiliate (true/false).\n\n\
         Return ONLY a JSON array of objects.",
        total = ctx.total,
        names = ctx.known_names_line(),
        categories = join_or_na(&ctx.categories),
    )
}

/// Candidate records proposed by one discovery batch, not yet checked for duplicates.
///
/// Elements without a name or a parseable URL are dropped.
pub async fn discover_batch(
    client: &dyn ChatClient,
    ctx: &DiscoveryContext,
    batch_no: usize,
    per_batch: usize,
) -> Result<Vec<PlatformRecord>, LlmError> {
    let request = ChatRequest::new(discovery_prompt(ctx, batch_no, per_batch))
        .temperature(0.8)
        .max_tokens(8000);
    let subject = format!("batch {batch_no}");
    let result = ask(client, &request, |reply| {
        let mut records: Vec<PlatformRecord> = parse_json_array_lenient(reply)?;
        let proposed = records.len();
        records.retain(|r| r.name().is_some() && r.identity_url().and_then(domain_of).is_some());
        for record in &mut records {
            record.extra.remove("reasoning");
        }
        debug!(batch_no, proposed, usable = records.len(), "discovery batch parsed");
        Ok(records)
    })
    .await;
    soften("discover", &subject, result)
}

/// Fields the model may fill in for an existing record.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EnrichmentProposal {
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default)]
    pub tags: Option<Vec<String>>,
    #[serde(default)]
    pub features: Option<Vec<String>>,
    #[serde(default)]
    pub use_cases: Option<Vec<String>>,
    #[serde(default)]
    pub pricing: Option<String>,
    #[serde(default)]
    pub pricing_details: Option<JsonValue>,
    #[serde(default)]
    pub target_audience: Option<Vec<String>>,
    #[serde(default)]
    pub has_api: Option<bool>,
    #[serde(default)]
    pub has_affiliate: Option<bool>,
    #[serde(default)]
    pub confidence: f64,
}

impl Confident for EnrichmentProposal {
    fn confidence(&self) -> f64 {
        self.confidence
    }
}

fn filled(text: Option<String>) -> Option<String> {
    text.map(|t| t.trim().to_string()).filter(|t| !t.is_empty())
}

fn filled_list(list: Option<Vec<String>>) -> Option<Vec<String>> {
    list.filter(|items| !items.is_empty())
}

impl EnrichmentProposal {
    /// Overwrites the record's fields with every non-empty proposed value.
    /// Returns the names of the fields written.
    pub fn merge_into(self, record: &mut PlatformRecord) -> Vec<&'static str> {
        let mut written = Vec::new();
        if let Some(description) = filled(self.description) {
            record.description = Some(description);
            written.push("description");
        }
        if let Some(category) = filled(self.category) {
            record.category = Some(category);
            written.push("category");
        }
        if let Some(tags) = filled_list(self.tags) {
            record.tags = Some(tags);
            written.push("tags");
        }
        if let Some(features) = filled_list(self.features) {
            record.features = Some(features);
            written.push("features");
        }
        if let Some(pricing) = filled(self.pricing) {
            record.pricing = Some(pricing);
            written.push("pricing");
        }

        let mut put = |key: &'static str, value: Option<JsonValue>| {
            if let Some(value) = value.filter(|v| !v.is_null()) {
                record.extra.insert(key.to_string(), value);
                written.push(key);
            }
        };
        put("use_cases", filled_list(self.use_cases).map(JsonValue::from));
        put("pricing_details", self.pricing_details);
        put("target_audience", filled_list(self.target_audience).map(JsonValue::from));
        put("has_api", self.has_api.map(JsonValue::Bool));
        put("has_affiliate", self.has_affiliate.map(JsonValue::Bool));
        written
    }
}

fn enrichment_prompt(record: &PlatformRecord, categories: &[String]) -> String {
    format!(
        "Research and enrich this AI platform with accurate information.\n\n\
         PLATFORM: {name}\n\
         CURRENT DESCRIPTION: {description}\n\
         WEBSITE: {url}\n\
         CURRENT CATEGORY: {category}\n\
         CURRENT TAGS: {tags}\n\
         CURRENT FEATURES: {features}\n\n\
         Return ONLY a JSON object with: description (2-3 sentences), category (one of [{categories}] \
         or a new lowercase-with-hyphens one), tags (5-8), features (5-8), use_cases (4-6), \
         pricing (free/freemium/paid/open-source/enterprise), pricing_details \
         {{model, tiers, free_tier, starting_price}}, target_audience, has_api, has_affiliate, \
         and confidence (0.0-1.0). Use null where unsure and lower the confidence.",
        name = record.name().unwrap_or("N/A"),
        description = record.description().unwrap_or("N/A"),
        url = record.identity_url().unwrap_or("N/A"),
        category = record.category().unwrap_or("N/A"),
        tags = join_or_na(record.tag_list()),
        features = join_or_na(record.feature_list()),
        categories = categories.join(", "),
    )
}

pub async fn enrich_platform(
    client: &dyn ChatClient,
    record: &PlatformRecord,
    categories: &[String],
) -> Result<Option<EnrichmentProposal>, LlmError> {
    let request = ChatRequest::new(enrichment_prompt(record, categories));
    let result = ask(client, &request, |reply| parse_json_object::<EnrichmentProposal>(reply).map(Some)).await;
    soften("enrich", record.name().unwrap_or(&record.id), result)
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CategorySuggestion {
    pub name: String,
    #[serde(default)]
    pub current_category: Option<String>,
    #[serde(default)]
    pub new_category: Option<String>,
    #[serde(default)]
    pub confidence: f64,
    #[serde(default)]
    pub reasoning: String,
}

impl Confident for CategorySuggestion {
    fn confidence(&self) -> f64 {
        self.confidence
    }
}

impl CategorySuggestion {
    /// Target category, when the model actually proposes a move.
    pub fn proposed_category(&self) -> Option<&str> {
        let target = self.new_category.as_deref()?.trim();
        let unchanged = self
            .current_category
            .as_deref()
            .is_some_and(|current| current.trim() == target);
        (!target.is_empty() && target != "null" && !unchanged).then_some(target)
    }
}

fn recategorization_prompt(batch: &[&PlatformRecord], categories: &[String]) -> String {
    let listed: Vec<String> = batch
        .iter()
        .enumerate()
        .map(|(i, r)| {
            format!(
                "{n}. {name}\n   Current category: {category}\n   Description: {description}\n   Tags: {tags}\n   URL: {url}",
                n = i + 1,
                name = r.name().unwrap_or("N/A"),
                category = r.category().unwrap_or("N/A"),
                description = r.description().unwrap_or("N/A"),
                tags = join_or_na(r.tag_list()),
                url = r.identity_url().unwrap_or("N/A"),
            )
        })
        .collect();
    format!(
        "Review these AI platforms and suggest a more specific category where one clearly fits better.\n\n\
         AVAILABLE CATEGORIES:\n{categories}\n\n\
         PLATFORMS:\n{platforms}\n\n\
         Prefer specific categories over generic ones and judge by primary function. \
         Return ONLY a JSON array of {{name, current_category, new_category, confidence, reasoning}} \
         with one entry per platform; use the current category as new_category when it already fits.",
        categories = categories.iter().map(|c| format!("- {c}")).collect::<Vec<_>>().join("\n"),
        platforms = listed.join("\n\n"),
    )
}

pub async fn suggest_categories(
    client: &dyn ChatClient,
    batch: &[&PlatformRecord],
    categories: &[String],
) -> Result<Vec<CategorySuggestion>, LlmError> {
    if batch.is_empty() {
        return Ok(Vec::new());
    }
    let request = ChatRequest::new(recategorization_prompt(batch, categories));
    let subject = format!("{} platforms", batch.len());
    let result = ask(client, &request, parse_json_array_lenient::<CategorySuggestion>).await;
    soften("recategorize", &subject, result)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DuplicateAction {
    KeepAll,
    KeepFirst,
    KeepBest,
    Merge,
    #[serde(other)]
    Unknown,
}

/// The model's verdict on one suspected duplicate group.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DuplicateDecision {
    pub are_duplicates: bool,
    #[serde(default)]
    pub reasoning: String,
    pub action: DuplicateAction,
    #[serde(default)]
    pub keep_id: Option<String>,
    #[serde(default)]
    pub merged_data: Option<JsonValue>,
}

fn review_prompt(group: &[&PlatformRecord]) -> String {
    let listed: Vec<String> = group
        .iter()
        .enumerate()
        .map(|(i, r)| {
            format!(
                "PLATFORM {n}:\n- ID: {id}\n- Name: {name}\n- Description: {description}\n- URL: {url}\n- Tags: {tags}",
                n = i + 1,
                id = r.id,
                name = r.name().unwrap_or("N/A"),
                description = r.description().unwrap_or("N/A"),
                url = r.identity_url().unwrap_or("N/A"),
                tags = join_or_na(r.tag_list()),
            )
        })
        .collect();
    format!(
        "Analyze these potentially duplicate AI platforms:\n\n{platforms}\n\n\
         Return ONLY a JSON object: {{\"are_duplicates\": bool, \"reasoning\": string, \
         \"action\": \"keep_all\" | \"keep_first\" | \"keep_best\" | \"merge\", \
         \"keep_id\": id to keep, \"merged_data\": {{name, description, tags, features}}}}",
        platforms = listed.join("\n\n"),
    )
}

pub async fn review_duplicate_group(
    client: &dyn ChatClient,
    group: &[&PlatformRecord],
) -> Result<Option<DuplicateDecision>, LlmError> {
    let request = ChatRequest::new(review_prompt(group));
    let subject = group
        .iter()
        .map(|r| r.name().unwrap_or(&r.id))
        .collect::<Vec<_>>()
        .join(" / ");
    let result = ask(client, &request, |reply| parse_json_object::<DuplicateDecision>(reply).map(Some)).await;
    soften("review-duplicates", &subject, result)
}

/// Affiliate or referral programme details the model found for a platform.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AffiliateProgram {
    #[serde(default)]
    pub has_program: bool,
    #[serde(default)]
    pub program_type: Option<String>,
    #[serde(default)]
    pub commission_rate: Option<String>,
    #[serde(default)]
    pub commission_structure: Option<String>,
    #[serde(default)]
    pub cookie_duration: Option<String>,
    #[serde(default)]
    pub network: Option<String>,
    #[serde(default)]
    pub program_url: Option<String>,
    #[serde(default)]
    pub signup_requirements: Option<String>,
    #[serde(default)]
    pub minimum_payout: Option<String>,
    /// `low`, `medium`, `high` or `very-high`.
    #[serde(default)]
    pub revenue_potential: Option<String>,
    #[serde(default)]
    pub notes: Option<String>,
    #[serde(default)]
    pub confidence: f64,
}

impl Confident for AffiliateProgram {
    fn confidence(&self) -> f64 {
        self.confidence
    }
}

impl AffiliateProgram {
    pub fn is_high_value(&self) -> bool {
        matches!(self.revenue_potential.as_deref(), Some("high" | "very-high"))
    }
}

fn affiliate_prompt(record: &PlatformRecord) -> String {
    format!(
        "Research the affiliate or referral program for this AI platform.\n\n\
         PLATFORM: {name}\n\
         WEBSITE: {url}\n\
         CATEGORY: {category}\n\
         DESCRIPTION: {description}\n\n\
         Check partner, affiliate and referral pages on the site and the usual networks \
         (Impact, PartnerStack, ShareASale, CJ, Rakuten).\n\n\
         Return ONLY a JSON object: has_program, program_type (affiliate/referral/partner/none), \
         commission_rate, commission_structure, cookie_duration, network, program_url, \
         signup_requirements, minimum_payout, revenue_potential (low/medium/high/very-high), notes, \
         confidence (0.0-1.0). Use \"unknown\" for anything you cannot verify and lower the confidence.",
        name = record.name().unwrap_or("N/A"),
        url = record.identity_url().unwrap_or("N/A"),
        category = record.category().unwrap_or("N/A"),
        description = record.description().unwrap_or("N/A"),
    )
}

pub async fn research_affiliate_program(
    client: &dyn ChatClient,
    record: &PlatformRecord,
) -> Result<Option<AffiliateProgram>, LlmError> {
    let request = ChatRequest::new(affiliate_prompt(record))
        .system("You are an expert at finding and analyzing affiliate marketing programs.")
        .temperature(0.3)
        .max_tokens(2000);
    let result = ask(client, &request, |reply| parse_json_object::<AffiliateProgram>(reply).map(Some)).await;
    soften("affiliates", record.name().unwrap_or(&record.id), result)
}

/// A subject for one blog post.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlogTopic {
    pub kind: String,
    pub title: String,
    pub keywords: String,
    pub focus: String,
}

impl BlogTopic {
    pub fn custom(title: &str) -> Self {
        Self {
            kind: "custom".to_string(),
            title: title.to_string(),
            keywords: title.to_lowercase(),
            focus: "Custom topic".to_string(),
        }
    }

    /// The standing editorial rotation.
    pub fn rotation(year: i32) -> Vec<Self> {
        [
            ("industry-analysis", format!("Top AI Trends Shaping {year}"), "AI trends, artificial intelligence future, AI technology trends", "Industry trends and predictions"),
            ("educational", "Complete Guide to AI Writing Tools".to_string(), "AI writing tools, AI content generation, best AI writers", "Educational content for beginners"),
            ("comparison", "ChatGPT vs Claude vs Gemini: Which AI is Best?".to_string(), "ChatGPT vs Claude, best AI chatbot, AI comparison", "In-depth platform comparisons"),
            ("tutorial", "How to Choose the Right AI Tool for Your Business".to_string(), "AI tools for business, choosing AI software, business AI guide", "Practical tutorials and how-tos"),
            ("category-deep-dive", format!("Best AI Image Generators in {year}"), "AI image generator, best AI art tools, AI image creation", "Category-specific roundups"),
            ("use-case", "AI Tools Every Content Creator Needs".to_string(), "AI tools for content creators, content creation AI, creator tools", "Use-case specific recommendations"),
            ("news-analysis", "Breaking Down the Latest AI Announcements".to_string(), "AI news, latest AI updates, AI announcements", "Recent news and announcements"),
            ("productivity", "10 Ways AI Can Boost Your Productivity".to_string(), "AI productivity tools, AI efficiency, productivity AI", "Productivity and efficiency"),
        ]
        .into_iter()
        .map(|(kind, title, keywords, focus)| Self {
            kind: kind.to_string(),
            title,
            keywords: keywords.to_string(),
            focus: focus.to_string(),
        })
        .collect()
    }
}

/// A blog post as written by the model, before publishing metadata is added.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BlogDraft {
    pub title: String,
    #[serde(default)]
    pub slug: String,
    #[serde(default)]
    pub meta_description: String,
    #[serde(default)]
    pub excerpt: String,
    #[serde(default)]
    pub keywords: Vec<String>,
    #[serde(default)]
    pub category: Option<String>,
    /// Markdown body.
    pub content: String,
    #[serde(default)]
    pub read_time: Option<JsonValue>,
}

/// `name - description` lines the writer may link to.
fn reference_lines(records: &[&PlatformRecord]) -> String {
    records
        .iter()
        .map(|r| format!("- {} ({}): {}", r.name().unwrap_or(&r.id), r.public_slug(), r.description().unwrap_or("N/A")))
        .collect::<Vec<_>>()
        .join("\n")
}

fn blog_prompt(topic: &BlogTopic, categories: &[String], references: &[&PlatformRecord]) -> String {
    format!(
        "Write a comprehensive blog post.\n\n\
         TOPIC: {title}\n\
         TYPE: {kind}\n\
         FOCUS: {focus}\n\
         TARGET KEYWORDS: {keywords}\n\n\
         AVAILABLE PLATFORM CATEGORIES: {categories}\n\n\
         PLATFORMS TO REFERENCE WHERE NATURAL (name, slug, description):\n{references}\n\n\
         Use an engaging introduction, H2/H3 headings, 5-7 main sections, lists for readability, \
         internal links as [Platform Name](/platform/slug), actionable tips and a conclusion with a call to action.\n\n\
         Return ONLY a JSON object: title (60 chars max), slug, metaDescription (150-160 chars), \
         excerpt (2 sentences), keywords, category, content (markdown), readTime.",
        title = topic.title,
        kind = topic.kind,
        focus = topic.focus,
        keywords = topic.keywords,
        categories = join_or_na(categories),
        references = reference_lines(references),
    )
}

/// One post on `topic`; `None` when the reply has no usable title or body.
pub async fn write_blog_post(
    client: &dyn ChatClient,
    topic: &BlogTopic,
    categories: &[String],
    references: &[&PlatformRecord],
) -> Result<Option<BlogDraft>, LlmError> {
    let request = ChatRequest::new(blog_prompt(topic, categories, references))
        .system(
            "You are an expert AI technology writer creating SEO-optimized posts for a directory of AI tools. \
             Write 1,500-2,000 words in a conversational yet professional tone.",
        )
        .temperature(0.8)
        .max_tokens(4000);
    let result = ask(client, &request, |reply| {
        let draft = parse_json_object::<BlogDraft>(reply)?;
        Ok((!draft.title.trim().is_empty() && !draft.content.trim().is_empty()).then_some(draft))
    })
    .await;
    soften("blog", &topic.title, result)
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TitledParagraphs {
    pub title: String,
    pub content: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct UseCase {
    pub title: String,
    pub description: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GuideStep {
    pub name: String,
    pub text: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GuideSteps {
    pub title: String,
    pub steps: Vec<GuideStep>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Faq {
    pub question: String,
    pub answer: String,
}

/// Long-form category guide ("pillar page").
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct PillarGuide {
    pub slug: String,
    pub category: String,
    pub title: String,
    pub meta_description: String,
    pub introduction: String,
    pub what_is_section: TitledParagraphs,
    pub key_benefits: Vec<String>,
    pub use_cases: Vec<UseCase>,
    pub how_to_choose: GuideSteps,
    pub comparison_criteria: Vec<String>,
    pub faqs: Vec<Faq>,
}

fn pillar_prompt(category: &str, year: i32, top: &[&PlatformRecord]) -> String {
    let name = category_display_name(category);
    let full_name = format!("AI {name} Tools");
    let lower = name.to_lowercase();
    format!(
        "Generate a detailed, SEO-optimized pillar page guide for \"{full_name}\".\n\n\
         TARGET KEYWORDS: AI {lower}, {lower} AI tools, best {lower} AI, {lower} automation\n\
         WORD COUNT: 3,000-5,000 words\n\n\
         TOP PLATFORMS IN CATEGORY:\n{platforms}\n\n\
         Return ONLY a JSON object with: title (\"Ultimate Guide to {full_name} in {year}\"), metaDescription \
         (150-160 chars), introduction (300-400 words), whatIsSection {{title, content: [3-4 paragraphs]}}, \
         keyBenefits (5-7), useCases [{{title, description}}] (5-8), howToChoose {{title, steps: [{{name, text}}]}} \
         (5-7 steps), comparisonCriteria (5-7), faqs [{{question, answer}}] (8-10, answers of 100+ words).",
        platforms = reference_lines(top),
    )
}

/// Guide for `category`; slug and category are set here rather than trusted from the reply.
pub async fn write_pillar_guide(
    client: &dyn ChatClient,
    category: &str,
    year: i32,
    top: &[&PlatformRecord],
) -> Result<Option<PillarGuide>, LlmError> {
    let request = ChatRequest::new(pillar_prompt(category, year, top))
        .system("You are an expert SEO content writer specializing in AI tools and software.")
        .temperature(0.7)
        .max_tokens(8000);
    let result = ask(client, &request, |reply| {
        let mut guide = parse_json_object::<PillarGuide>(reply)?;
        if guide.title.trim().is_empty() || guide.introduction.trim().is_empty() {
            return Ok(None);
        }
        guide.slug = format!("ultimate-guide-{category}-ai-tools-{year}");
        guide.category = category.to_string();
        Ok(Some(guide))
    })
    .await;
    soften("pillar", category, result)
}

#[cfg(test)]
pub(crate) mod testing {
    use std::collections::VecDeque;
    use std::sync::Mutex;

    use async_trait::async_trait;

    use crate::{ChatClient, ChatRequest, LlmError, ProviderKind};

    /// Replays canned replies in order and records the prompts it was sent.
    #[derive(Default)]
    pub struct ScriptedClient {
        replies: Mutex<VecDeque<Result<String, LlmError>>>,
        pub prompts: Mutex<Vec<String>>,
    }

    impl ScriptedClient {
        pub fn new(replies: Vec<Result<String, LlmError>>) -> Self {
            Self {
                replies: Mutex::new(replies.into()),
                prompts: Mutex::default(),
            }
        }
    }

    #[async_trait]
    impl ChatClient for ScriptedClient {
        fn provider(&self) -> ProviderKind {
            ProviderKind::DeepSeek
        }

        async fn complete(&self, request: &ChatRequest) -> Result<String, LlmError> {
            self.prompts.lock().expect("prompts").push(request.prompt.clone());
            self.replies
                .lock()
                .expect("replies")
                .pop_front()
                .unwrap_or_else(|| Err(LlmError::Network("no scripted reply".into())))
        }
    }
}
