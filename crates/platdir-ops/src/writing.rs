//! Long-form content written by the model: blog posts and category pillar guides.

use std::collections::BTreeSet;

use anyhow::{bail, Context, Result};
use chrono::{Datelike, Utc};
use platdir_content::{BLOG_DIR, PILLAR_DIR};
use platdir_core::{slugify, PlatformRecord};
use platdir_llm::tasks::{write_blog_post, write_pillar_guide, BlogDraft, BlogTopic};
use platdir_llm::{ChatClient, LlmError};
use platdir_storage::ContentWriter;
use serde::Serialize;
use tracing::{info, info_span, warn, Instrument};

use crate::OpsContext;

const BLOG_AUTHOR: &str = "AI Platforms List Team";
const BLOG_REFERENCES: usize = 10;
const PILLAR_PLATFORMS: usize = 10;

#[derive(Debug, Clone)]
pub struct BlogOptions {
    pub count: usize,
    /// Write about this instead of the next topics in the rotation.
    pub topic: Option<String>,
    pub year: i32,
}

impl Default for BlogOptions {
    fn default() -> Self {
        Self {
            count: 1,
            topic: None,
            year: Utc::now().year(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct PillarOptions {
    /// Only this category; otherwise every category with platforms.
    pub category: Option<String>,
    pub year: i32,
    /// Rewrite guides that already exist.
    pub overwrite: bool,
}

impl Default for PillarOptions {
    fn default() -> Self {
        Self {
            category: None,
            year: Utc::now().year(),
            overwrite: false,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct WritingSummary {
    pub dir: &'static str,
    /// Slugs written (or that would be, on a dry run).
    pub written: Vec<String>,
    pub existing: usize,
    pub no_answer: usize,
}

/// A published post: the draft plus the metadata the site reads.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BlogPost {
    #[serde(flatten)]
    pub draft: BlogDraft,
    pub published_date: String,
    pub last_updated: String,
    pub author: &'static str,
    pub featured: bool,
}

fn top_rated<'a>(records: impl Iterator<Item = &'a PlatformRecord>, limit: usize) -> Vec<&'a PlatformRecord> {
    let mut ranked: Vec<&PlatformRecord> = records.filter(|r| r.name().is_some()).collect();
    ranked.sort_by(|a, b| b.rating_or_zero().total_cmp(&a.rating_or_zero()));
    ranked.truncate(limit);
    ranked
}

/// `slug`, or `slug-2`, `slug-3`, ... when a page already has it.
async fn free_slug(writer: &ContentWriter, dir: &str, slug: String) -> String {
    if !writer.page_exists(dir, &slug).await {
        return slug;
    }
    let mut n = 2;
    loop {
        let candidate = format!("{slug}-{n}");
        if !writer.page_exists(dir, &candidate).await {
            return candidate;
        }
        n += 1;
    }
}

/// Topics for this run: the custom one, or the rotation picked up where the
/// existing posts left off.
fn next_topics(options: &BlogOptions, existing_posts: usize) -> Vec<BlogTopic> {
    if let Some(title) = options.topic.as_deref().filter(|t| !t.trim().is_empty()) {
        return vec![BlogTopic::custom(title.trim()); options.count];
    }
    let rotation = BlogTopic::rotation(options.year);
    (0..options.count)
        .map(|i| rotation[(existing_posts + i) % rotation.len()].clone())
        .collect()
}

pub async fn write_blog_posts(ctx: &OpsContext, client: &dyn ChatClient, options: BlogOptions) -> Result<WritingSummary> {
    async {
        let (_, records) = ctx.open_store().await?;
        let writer = ctx.writer();
        let categories: Vec<String> = records
            .iter()
            .filter_map(PlatformRecord::category)
            .collect::<BTreeSet<_>>()
            .into_iter()
            .map(str::to_string)
            .collect();
        let references = top_rated(records.iter().filter(|r| r.description().is_some()), BLOG_REFERENCES);
        let existing_posts = writer.list_pages(BLOG_DIR).await?.len();

        let mut summary = WritingSummary {
            dir: BLOG_DIR,
            ..WritingSummary::default()
        };
        let mut stopped: Option<LlmError> = None;
        for (n, topic) in next_topics(&options, existing_posts).iter().enumerate() {
            if n > 0 && !ctx.llm_delay().is_zero() {
                tokio::time::sleep(ctx.llm_delay()).await;
            }
            info!(title = %topic.title, kind = %topic.kind, "writing blog post");
            let mut draft = match write_blog_post(client, topic, &categories, &references).await {
                Ok(Some(draft)) => draft,
                Ok(None) => {
                    summary.no_answer += 1;
                    continue;
                }
                Err(err) => {
                    stopped = Some(err);
                    break;
                }
            };

            let slug = match slugify(&draft.slug) {
                slug if slug.is_empty() => slugify(&draft.title),
                slug => slug,
            };
            let slug = free_slug(&writer, BLOG_DIR, slug).await;
            draft.slug = slug.clone();
            let today = Utc::now().format("%Y-%m-%d").to_string();
            let post = BlogPost {
                draft,
                published_date: today.clone(),
                last_updated: today,
                author: BLOG_AUTHOR,
                featured: false,
            };
            if ctx.dry_run {
                info!(%slug, "dry run; blog post not written");
            } else {
                writer.write_page(BLOG_DIR, &slug, &post).await?;
                info!(%slug, "blog post written");
            }
            summary.written.push(slug);
        }

        if let Some(err) = stopped {
            return Err(err).context(format!("blog writing stopped after {} posts", summary.written.len()));
        }
        Ok(summary)
    }
    .instrument(info_span!("blog", count = options.count))
    .await
}

pub async fn write_pillar_guides(
    ctx: &OpsContext,
    client: &dyn ChatClient,
    options: PillarOptions,
) -> Result<WritingSummary> {
    async {
        let (_, records) = ctx.open_store().await?;
        let writer = ctx.writer();
        let mut categories: BTreeSet<&str> = records.iter().filter_map(PlatformRecord::category).collect();
        if let Some(only) = options.category.as_deref() {
            if !categories.contains(only) {
                bail!("no platforms in category {only}");
            }
            categories.retain(|c| *c == only);
        }

        let mut summary = WritingSummary {
            dir: PILLAR_DIR,
            ..WritingSummary::default()
        };
        let mut stopped: Option<LlmError> = None;
        let mut asked = 0usize;
        for category in categories {
            let slug = format!("ultimate-guide-{category}-ai-tools-{}", options.year);
            if !options.overwrite && writer.page_exists(PILLAR_DIR, &slug).await {
                summary.existing += 1;
                continue;
            }
            if asked > 0 && !ctx.llm_delay().is_zero() {
                tokio::time::sleep(ctx.llm_delay()).await;
            }
            asked += 1;

            let top = top_rated(records.iter().filter(|r| r.category() == Some(category)), PILLAR_PLATFORMS);
            let guide = match write_pillar_guide(client, category, options.year, &top).await {
                Ok(Some(guide)) => guide,
                Ok(None) => {
                    warn!(%category, "no usable pillar guide");
                    summary.no_answer += 1;
                    continue;
                }
                Err(err) => {
                    stopped = Some(err);
                    break;
                }
            };
            if ctx.dry_run {
                info!(%slug, "dry run; pillar guide not written");
            } else {
                writer.write_page(PILLAR_DIR, &guide.slug, &guide).await?;
                info!(%slug, faqs = guide.faqs.len(), "pillar guide written");
            }
            summary.written.push(guide.slug);
        }

        if let Some(err) = stopped {
            return Err(err).context(format!("pillar writing stopped after {} guides", summary.written.len()));
        }
        Ok(summary)
    }
    .instrument(info_span!("pillar", category = ?options.category))
    .await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::is_credits_exhausted;
    use crate::testing::{context, write_platforms, ScriptedClient};
    use serde_json::{json, Value as JsonValue};
    use tempfile::tempdir;

    fn directory(dir: &std::path::Path) {
        write_platforms(
            dir,
            json!([
                {"id": "claude", "name": "Claude", "category": "llms", "description": "Assistant", "rating": 4.8},
                {"id": "gemini", "name": "Gemini", "category": "llms", "description": "Multimodal", "rating": 4.6},
                {"id": "runway", "name": "Runway", "category": "video-ai", "rating": 4.5}
            ]),
        );
    }

    fn draft(title: &str, slug: &str) -> String {
        json!({"title": title, "slug": slug, "content": "## Intro\n\nBody", "keywords": ["ai"]}).to_string()
    }

    fn guide(title: &str) -> String {
        json!({"title": title, "introduction": "Why this matters.", "faqs": [{"question": "Q", "answer": "A"}]}).to_string()
    }

    #[test]
    fn rotation_resumes_after_existing_posts() {
        let options = BlogOptions {
            count: 3,
            topic: None,
            year: 2026,
        };
        let titles: Vec<String> = next_topics(&options, 7).into_iter().map(|t| t.title).collect();
        assert_eq!(titles[0], "10 Ways AI Can Boost Your Productivity");
        assert_eq!(titles[1], "Top AI Trends Shaping 2026");

        let custom = BlogOptions {
            count: 2,
            topic: Some(" Voice cloning ethics ".into()),
            year: 2026,
        };
        let topics = next_topics(&custom, 0);
        assert_eq!(topics.len(), 2);
        assert!(topics.iter().all(|t| t.title == "Voice cloning ethics" && t.kind == "custom"));
    }

    #[tokio::test]
    async fn blog_posts_are_published_with_metadata() {
        let dir = tempdir().expect("tempdir");
        directory(dir.path());
        let client = ScriptedClient::new(vec![
            Ok(draft("AI Trends", "")),
            Ok(json!({"title": "", "content": ""}).to_string()),
            Ok(draft("AI Trends Again", "ai-trends")),
        ]);
        let options = BlogOptions {
            count: 3,
            topic: None,
            year: 2026,
        };

        let summary = write_blog_posts(&context(dir.path()), &client, options).await.expect("blog");
        assert_eq!(summary.written, vec!["ai-trends".to_string(), "ai-trends-2".to_string()]);
        assert_eq!(summary.no_answer, 1);

        let path = dir.path().join(BLOG_DIR).join("ai-trends.json");
        let post: JsonValue = serde_json::from_slice(&std::fs::read(path).expect("post")).expect("json");
        assert_eq!(post["slug"], json!("ai-trends"));
        assert_eq!(post["author"], json!(BLOG_AUTHOR));
        assert_eq!(post["featured"], json!(false));
        assert!(post["publishedDate"].is_string());
        assert!(dir.path().join(BLOG_DIR).join("ai-trends-2.json").exists());
    }

    #[tokio::test]
    async fn dry_run_writes_no_posts() {
        let dir = tempdir().expect("tempdir");
        directory(dir.path());
        let client = ScriptedClient::new(vec![Ok(draft("AI Trends", "ai-trends"))]);

        let ctx = context(dir.path()).dry_run(true);
        let summary = write_blog_posts(&ctx, &client, BlogOptions::default()).await.expect("blog");
        assert_eq!(summary.written.len(), 1);
        assert!(!dir.path().join(BLOG_DIR).exists());
    }

    #[tokio::test]
    async fn pillar_guides_skip_existing_categories() {
        let dir = tempdir().expect("tempdir");
        directory(dir.path());
        let writer = ContentWriter::new(dir.path());
        writer
            .write_page(PILLAR_DIR, "ultimate-guide-llms-ai-tools-2026", &json!({"title": "kept"}))
            .await
            .expect("existing");
        let client = ScriptedClient::new(vec![Ok(guide("Ultimate Guide to AI Video Tools in 2026"))]);
        let options = PillarOptions {
            category: None,
            year: 2026,
            overwrite: false,
        };

        let summary = write_pillar_guides(&context(dir.path()), &client, options).await.expect("pillar");
        assert_eq!(summary.existing, 1);
        assert_eq!(summary.written, vec!["ultimate-guide-video-ai-ai-tools-2026".to_string()]);
        assert_eq!(client.calls(), 1);

        let written: JsonValue = writer
            .read_page(PILLAR_DIR, "ultimate-guide-video-ai-ai-tools-2026")
            .await
            .expect("guide");
        assert_eq!(written["category"], json!("video-ai"));
        let kept: JsonValue = writer.read_page(PILLAR_DIR, "ultimate-guide-llms-ai-tools-2026").await.expect("kept");
        assert_eq!(kept["title"], json!("kept"));
    }

    #[tokio::test]
    async fn pillar_category_must_exist_and_credits_stop_the_run() {
        let dir = tempdir().expect("tempdir");
        directory(dir.path());
        let missing = PillarOptions {
            category: Some("robotics".into()),
            ..PillarOptions::default()
        };
        let client = ScriptedClient::new(vec![Err(LlmError::CreditsExhausted("402".into()))]);
        assert!(write_pillar_guides(&context(dir.path()), &client, missing).await.is_err());
        assert_eq!(client.calls(), 0);

        let llms = PillarOptions {
            category: Some("llms".into()),
            ..PillarOptions::default()
        };
        let err = write_pillar_guides(&context(dir.path()), &client, llms).await.expect_err("credits");
        assert!(is_credits_exhausted(&err));
        assert!(!dir.path().join(PILLAR_DIR).exists());
    }
}
