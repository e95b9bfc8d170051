use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::scrape::ScrapedPage;
use crate::core::error::ParseError;

/// Score used for any component the model left out or got wrong.
pub const NEUTRAL_SCORE: f64 = 50.0;

const WEIGHT_VISUAL: f64 = 0.25;
const WEIGHT_UX: f64 = 0.25;
const WEIGHT_SEO: f64 = 0.30;
const WEIGHT_EXPOSURE: f64 = 0.20;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BusinessType {
    Ecommerce,
    Saas,
    LocalBusiness,
    ProfessionalServices,
    Content,
    Nonprofit,
    Portfolio,
    Other,
}

impl BusinessType {
    pub const ALL: [BusinessType; 8] = [
        BusinessType::Ecommerce,
        BusinessType::Saas,
        BusinessType::LocalBusiness,
        BusinessType::ProfessionalServices,
        BusinessType::Content,
        BusinessType::Nonprofit,
        BusinessType::Portfolio,
        BusinessType::Other,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            BusinessType::Ecommerce => "ecommerce",
            BusinessType::Saas => "saas",
            BusinessType::LocalBusiness => "local_business",
            BusinessType::ProfessionalServices => "professional_services",
            BusinessType::Content => "content",
            BusinessType::Nonprofit => "nonprofit",
            BusinessType::Portfolio => "portfolio",
            BusinessType::Other => "other",
        }
    }

    /// Anything outside the closed set becomes `Other`.
    pub fn from_label(label: &str) -> Self {
        let wanted = label.trim().to_ascii_lowercase().replace([' ', '-'], "_");
        Self::ALL
            .into_iter()
            .find(|t| t.as_str() == wanted)
            .unwrap_or(BusinessType::Other)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisScores {
    pub business_type: BusinessType,
    pub business_category: String,
    pub visual_score: f64,
    pub ux_score: f64,
    pub seo_score: f64,
    pub exposure_score: f64,
    pub ai_assistants: Vec<String>,
    pub funnel_recommendations: Vec<String>,
    pub design_improvements: Vec<String>,
    pub seo_improvements: Vec<String>,
    pub redesign_description: String,
}

fn yes_no(flag: bool) -> &'static str {
    if flag { "True" } else { "False" }
}

/// The scoring request: the expected JSON schema followed by the page features.
pub fn build_prompt(page: &ScrapedPage) -> String {
    let allowed: Vec<&str> = BusinessType::ALL.iter().map(|t| t.as_str()).collect();
    format!(
        r#"Analyze this website data and provide a JSON response with this exact structure:
{{
  "business_type": "one of: {allowed}",
  "business_category": "specific category like: restaurant, dentist, software, etc.",
  "visual_score": 0-100 (rate modern design, colors, typography),
  "ux_score": 0-100 (rate navigation, structure, usability),
  "seo_score": 0-100 (rate meta tags, viewport, structure),
  "exposure_score": 0-100 (estimate based on SEO quality and content),
  "ai_assistants": ["list 2-3 AI assistant types that would help this business"],
  "funnel_recommendations": ["list 2-3 conversion funnel improvements"],
  "design_improvements": ["list 3 specific visual/UX improvements"],
  "seo_improvements": ["list 2-3 SEO recommendations"],
  "redesign_description": "detailed 2-3 sentence description of recommended homepage redesign"
}}

Website Data:
- URL: {url}
- Title: {title}
- Meta Description: {meta}
- H1 Tags: {h1}
- H2 Tags: {h2}
- Has Navigation: {nav}
- Has Footer: {footer}
- Has Forms: {form}
- Link Count: {links}
- Image Count: {images}
- Has Viewport: {viewport}
- Has Canonical: {canonical}

Provide ONLY the JSON response."#,
        allowed = allowed.join(", "),
        url = page.url,
        title = page.title,
        meta = if page.meta_description.is_empty() {
            "N/A"
        } else {
            page.meta_description.as_str()
        },
        h1 = page.h1_tags.join(", "),
        h2 = page.h2_tags.join(", "),
        nav = yes_no(page.has_nav),
        footer = yes_no(page.has_footer),
        form = yes_no(page.has_form),
        links = page.link_count,
        images = page.image_count,
        viewport = yes_no(page.has_viewport),
        canonical = yes_no(page.has_canonical),
    )
}

/// Removes optional ``` fencing, with or without a language tag, around a
/// model reply.
pub fn strip_fencing(text: &str) -> &str {
    let trimmed = text.trim();
    let Some(open) = trimmed.find("```") else {
        return trimmed;
    };
    let mut body = &trimmed[open + 3..];
    // Optional language tag (`json`, `JSON`, ...) up to the end of the fence line.
    if let Some(newline) = body.find('\n')
        && body[..newline]
            .trim()
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
    {
        body = &body[newline + 1..];
    }
    match body.find("```") {
        Some(close) => body[..close].trim(),
        None => body.trim(),
    }
}

/// Clamps a component score to the valid range, substituting the neutral
/// score for anything missing, non-numeric or out of range.
pub fn sanitize_score(value: Option<f64>) -> f64 {
    match value {
        Some(v) if v.is_finite() && (0.0..=100.0).contains(&v) => v,
        _ => NEUTRAL_SCORE,
    }
}

fn score_field(obj: &Map<String, Value>, key: &str) -> f64 {
    let raw = match obj.get(key) {
        Some(Value::Number(n)) => n.as_f64(),
        Some(Value::String(s)) => s.trim().parse::<f64>().ok(),
        _ => None,
    };
    sanitize_score(raw)
}

fn text_field(obj: &Map<String, Value>, key: &str) -> String {
    match obj.get(key) {
        Some(Value::String(s)) => s.trim().to_string(),
        _ => String::new(),
    }
}

fn list_field(obj: &Map<String, Value>, key: &str) -> Vec<String> {
    match obj.get(key) {
        Some(Value::Array(items)) => items
            .iter()
            .filter_map(|item| match item {
                Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
                Value::Number(n) => Some(n.to_string()),
                _ => None,
            })
            .collect(),
        Some(Value::String(s)) if !s.trim().is_empty() => vec![s.trim().to_string()],
        _ => Vec::new(),
    }
}

/// Reads the model's reply into typed scores. The reply must be a JSON
/// object once fencing is removed; individual fields fall back to defaults.
pub fn parse_scores(raw: &str) -> Result<AnalysisScores, ParseError> {
    let body = strip_fencing(raw);
    let value: Value = serde_json::from_str(body).map_err(|e| ParseError {
        reason: e.to_string(),
        raw: raw.to_string(),
    })?;
    let Value::Object(obj) = value else {
        return Err(ParseError {
            reason: "expected a JSON object".to_string(),
            raw: raw.to_string(),
        });
    };

    let business_type = match obj.get("business_type") {
        Some(Value::String(label)) => BusinessType::from_label(label),
        _ => BusinessType::Other,
    };

    Ok(AnalysisScores {
        business_type,
        business_category: text_field(&obj, "business_category"),
        visual_score: score_field(&obj, "visual_score"),
        ux_score: score_field(&obj, "ux_score"),
        seo_score: score_field(&obj, "seo_score"),
        exposure_score: score_field(&obj, "exposure_score"),
        ai_assistants: list_field(&obj, "ai_assistants"),
        funnel_recommendations: list_field(&obj, "funnel_recommendations"),
        design_improvements: list_field(&obj, "design_improvements"),
        seo_improvements: list_field(&obj, "seo_improvements"),
        redesign_description: text_field(&obj, "redesign_description"),
    })
}

/// Weighted composite of the four component scores, in [0, 100].
pub fn composite_score(scores: &AnalysisScores) -> f64 {
    sanitize_score(Some(scores.visual_score)) * WEIGHT_VISUAL
        + sanitize_score(Some(scores.ux_score)) * WEIGHT_UX
        + sanitize_score(Some(scores.seo_score)) * WEIGHT_SEO
        + sanitize_score(Some(scores.exposure_score)) * WEIGHT_EXPOSURE
}

pub fn round_to_tenth(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}
