//! Core data model for the platform directory.
//!
//! `platforms.json` carries loosely-typed records written by many hands over
//! time. Decoding here is lenient (numbers-as-strings, nulls, odd shapes) and
//! every key the model does not name survives a round trip through `extra`.

use std::collections::BTreeMap;

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map as JsonMap, Value as JsonValue};
use url::{ParseError, Url};

/// One entry of the directory.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct PlatformRecord {
    #[serde(
        default,
        deserialize_with = "lenient_id",
        skip_serializing_if = "String::is_empty"
    )]
    pub id: String,
    #[serde(default, deserialize_with = "lenient_string", skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, deserialize_with = "lenient_string", skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(default, deserialize_with = "lenient_string", skip_serializing_if = "Option::is_none")]
    pub website: Option<String>,
    #[serde(default, deserialize_with = "lenient_string", skip_serializing_if = "Option::is_none")]
    pub slug: Option<String>,
    #[serde(default, deserialize_with = "lenient_string", skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    #[serde(default, deserialize_with = "lenient_string", skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, deserialize_with = "lenient_string", skip_serializing_if = "Option::is_none")]
    pub pricing: Option<String>,
    #[serde(default, deserialize_with = "lenient_string_vec", skip_serializing_if = "Option::is_none")]
    pub tags: Option<Vec<String>>,
    #[serde(default, deserialize_with = "lenient_string_vec", skip_serializing_if = "Option::is_none")]
    pub features: Option<Vec<String>>,
    #[serde(default, deserialize_with = "lenient_f64", skip_serializing_if = "Option::is_none")]
    pub rating: Option<f64>,
    #[serde(default, deserialize_with = "lenient_f64", skip_serializing_if = "Option::is_none")]
    pub clicks: Option<f64>,
    #[serde(default, deserialize_with = "lenient_bool", skip_serializing_if = "Option::is_none")]
    pub featured: Option<bool>,
    #[serde(default, deserialize_with = "lenient_bool", skip_serializing_if = "Option::is_none")]
    pub verified: Option<bool>,

    // Free-form timestamps: strings in newer records, Firestore-style objects in older ones.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub added_date: Option<JsonValue>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<JsonValue>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_updated: Option<JsonValue>,

    #[serde(default, deserialize_with = "lenient_string", skip_serializing_if = "Option::is_none")]
    pub enriched_at: Option<String>,
    #[serde(default, deserialize_with = "lenient_string", skip_serializing_if = "Option::is_none")]
    pub recategorized_date: Option<String>,
    #[serde(default, deserialize_with = "lenient_string", skip_serializing_if = "Option::is_none")]
    pub recategorized_from: Option<String>,
    #[serde(default, deserialize_with = "lenient_string", skip_serializing_if = "Option::is_none")]
    pub discovered_by: Option<String>,
    #[serde(default, deserialize_with = "lenient_string", skip_serializing_if = "Option::is_none")]
    pub added_by: Option<String>,

    /// Everything else (`use_cases`, `pricing_details`, `has_api`, ...), preserved verbatim.
    #[serde(flatten)]
    pub extra: JsonMap<String, JsonValue>,
}

impl PlatformRecord {
    pub fn named(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: Some(name.into()),
            ..Default::default()
        }
    }

    /// Display name, if present and not blank.
    pub fn name(&self) -> Option<&str> {
        non_blank(self.name.as_deref())
    }

    /// `url`, falling back to `website`.
    pub fn identity_url(&self) -> Option<&str> {
        non_blank(self.url.as_deref()).or_else(|| non_blank(self.website.as_deref()))
    }

    /// Slug used in generated page paths: `slug`, falling back to `id`.
    pub fn public_slug(&self) -> &str {
        non_blank(self.slug.as_deref()).unwrap_or(&self.id)
    }

    pub fn category(&self) -> Option<&str> {
        non_blank(self.category.as_deref())
    }

    pub fn description(&self) -> Option<&str> {
        non_blank(self.description.as_deref())
    }

    pub fn rating_or_zero(&self) -> f64 {
        self.rating.unwrap_or(0.0)
    }

    pub fn is_featured(&self) -> bool {
        self.featured.unwrap_or(false)
    }

    pub fn is_verified(&self) -> bool {
        self.verified.unwrap_or(false)
    }

    pub fn has_clicks(&self) -> bool {
        self.clicks.is_some_and(|c| c != 0.0)
    }

    pub fn tag_list(&self) -> &[String] {
        self.tags.as_deref().unwrap_or_default()
    }

    pub fn feature_list(&self) -> &[String] {
        self.features.as_deref().unwrap_or_default()
    }

    pub fn has_added_timestamp(&self) -> bool {
        is_present(self.added_date.as_ref()) || is_present(self.created_at.as_ref())
    }

    /// Whether an unmodelled key is present with a non-null value.
    pub fn has_extra(&self, key: &str) -> bool {
        is_present(self.extra.get(key))
    }
}

fn non_blank(value: Option<&str>) -> Option<&str> {
    value.filter(|v| !v.trim().is_empty())
}

fn is_present(value: Option<&JsonValue>) -> bool {
    match value {
        None | Some(JsonValue::Null) => false,
        Some(JsonValue::String(s)) => !s.trim().is_empty(),
        Some(_) => true,
    }
}

fn lenient_id<'de, D: Deserializer<'de>>(deserializer: D) -> Result<String, D::Error> {
    Ok(lenient_string(deserializer)?.unwrap_or_default())
}

fn lenient_string<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<String>, D::Error> {
    let value = Option::<JsonValue>::deserialize(deserializer)?;
    Ok(match value {
        Some(JsonValue::String(s)) => Some(s),
        Some(JsonValue::Number(n)) => Some(n.to_string()),
        Some(JsonValue::Bool(b)) => Some(b.to_string()),
        _ => None,
    })
}

fn lenient_f64<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<f64>, D::Error> {
    let value = Option::<JsonValue>::deserialize(deserializer)?;
    let parsed = match value {
        Some(JsonValue::Number(n)) => n.as_f64(),
        Some(JsonValue::String(s)) => s.trim().parse::<f64>().ok(),
        _ => None,
    };
    Ok(parsed.filter(|v| v.is_finite()))
}

fn lenient_bool<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<bool>, D::Error> {
    let value = Option::<JsonValue>::deserialize(deserializer)?;
    Ok(match value {
        Some(JsonValue::Bool(b)) => Some(b),
        Some(JsonValue::Number(n)) => n.as_f64().map(|v| v != 0.0),
        Some(JsonValue::String(s)) => match s.trim().to_ascii_lowercase().as_str() {
            "true" | "yes" | "1" => Some(true),
            "false" | "no" | "0" => Some(false),
            _ => None,
        },
        _ => None,
    })
}

fn lenient_string_vec<'de, D: Deserializer<'de>>(
    deserializer: D,
) -> Result<Option<Vec<String>>, D::Error> {
    let value = Option::<JsonValue>::deserialize(deserializer)?;
    Ok(match value {
        Some(JsonValue::Array(items)) => Some(
            items
                .into_iter()
                .filter_map(|item| match item {
                    JsonValue::String(s) => Some(s),
                    JsonValue::Number(n) => Some(n.to_string()),
                    _ => None,
                })
                .collect(),
        ),
        Some(JsonValue::String(s)) => Some(
            s.split(',')
                .map(str::trim)
                .filter(|t| !t.is_empty())
                .map(str::to_string)
                .collect(),
        ),
        _ => None,
    })
}

/// Lowercase hostname of a platform URL with one leading `www.` removed.
///
/// Bare hosts (`openai.com`) are accepted by assuming `https://`.
pub fn domain_of(url: &str) -> Option<String> {
    let trimmed = url.trim();
    if trimmed.is_empty() {
        return None;
    }
    let parsed = match Url::parse(trimmed) {
        Ok(url) if trimmed.contains("://") => url,
        // `openai.com` has no scheme; `openai.com:443` parses with scheme `openai.com`.
        Ok(_) | Err(ParseError::RelativeUrlWithoutBase) => Url::parse(&format!("https://{trimmed}")).ok()?,
        Err(_) => return None,
    };
    let host = parsed.host_str()?.to_ascii_lowercase();
    let host = host.strip_prefix("www.").unwrap_or(&host);
    if host.is_empty() {
        return None;
    }
    Some(host.to_string())
}

/// `"Runway ML Gen-3"` -> `"runway-ml-gen-3"`.
pub fn slugify(input: &str) -> String {
    let mut slug = String::with_capacity(input.len());
    let mut pending_dash = false;
    for c in input.chars() {
        if c.is_ascii_alphanumeric() {
            if pending_dash && !slug.is_empty() {
                slug.push('-');
            }
            pending_dash = false;
            slug.push(c.to_ascii_lowercase());
        } else {
            pending_dash = true;
        }
    }
    slug
}

/// `"video-ai"` -> `"Video Ai"`.
pub fn category_display_name(category: &str) -> String {
    category
        .split('-')
        .filter(|w| !w.is_empty())
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars).collect::<String>(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RecordIssue {
    MissingId { index: usize },
    MissingName { index: usize, id: String },
    MissingUrl { index: usize, id: String },
    UnparseableUrl { index: usize, id: String, url: String },
    RatingOutOfRange { index: usize, id: String, rating: f64 },
    DuplicateId { id: String, indices: Vec<usize> },
}

/// Shape checks for a single record at position `index`.
pub fn validate_record(index: usize, record: &PlatformRecord) -> Vec<RecordIssue> {
    let mut issues = Vec::new();
    let id = record.id.clone();
    if record.id.trim().is_empty() {
        issues.push(RecordIssue::MissingId { index });
    }
    if record.name().is_none() {
        issues.push(RecordIssue::MissingName { index, id: id.clone() });
    }
    match record.identity_url() {
        None => issues.push(RecordIssue::MissingUrl { index, id: id.clone() }),
        Some(url) if domain_of(url).is_none() => issues.push(RecordIssue::UnparseableUrl {
            index,
            id: id.clone(),
            url: url.to_string(),
        }),
        Some(_) => {}
    }
    if let Some(rating) = record.rating {
        if !(0.0..=5.0).contains(&rating) {
            issues.push(RecordIssue::RatingOutOfRange { index, id, rating });
        }
    }
    issues
}

/// Shape checks across the whole store, including id uniqueness.
pub fn validate_records(records: &[PlatformRecord]) -> Vec<RecordIssue> {
    let mut issues = Vec::new();
    let mut by_id: BTreeMap<&str, Vec<usize>> = BTreeMap::new();
    for (index, record) in records.iter().enumerate() {
        issues.extend(validate_record(index, record));
        if !record.id.trim().is_empty() {
            by_id.entry(record.id.as_str()).or_default().push(index);
        }
    }
    for (id, indices) in by_id {
        if indices.len() > 1 {
            issues.push(RecordIssue::DuplicateId {
                id: id.to_string(),
                indices,
            });
        }
    }
    issues
}
