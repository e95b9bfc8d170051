//! Website analysis: fetch, extract, score, composite, mockup.
//!
//! Stages run strictly in sequence for one request. Fetch and scoring
//! failures abort the request; a failed mockup only clears the image and
//! flags the result.

pub mod mockup;
pub mod scoring;
pub mod scrape;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, warn};

use crate::core::error::AnalysisError;
use crate::core::llm::image::ImageGenerator;
use crate::core::llm::{ChatMessage, ModelAdapter};
use scoring::AnalysisScores;
use scrape::{PageFetcher, ScrapedPage};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisResult {
    pub url: String,
    pub scraped_data: ScrapedPage,
    pub analysis: AnalysisScores,
    pub overall_score: f64,
    /// Base64 image, empty when `mockup_generated` is false.
    pub mockup_image: String,
    pub mockup_generated: bool,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<String>,
    pub analyzed_at: DateTime<Utc>,
}

pub struct AnalysisPipeline {
    fetcher: Arc<dyn PageFetcher>,
    scorer: ModelAdapter,
    images: Arc<dyn ImageGenerator>,
}

impl AnalysisPipeline {
    pub fn new(
        fetcher: Arc<dyn PageFetcher>,
        scorer: ModelAdapter,
        images: Arc<dyn ImageGenerator>,
    ) -> Self {
        Self {
            fetcher,
            scorer,
            images,
        }
    }

    pub async fn run(&self, raw_url: &str) -> Result<AnalysisResult, AnalysisError> {
        let url = scrape::normalize_url(raw_url)?;

        info!("Analysis [{}] fetching", url);
        let html = self.fetcher.fetch(&url).await?;
        let page = scrape::extract_features(&url, &html);
        info!(
            "Analysis [{}] extracted '{}' ({} links, {} images)",
            url, page.title, page.link_count, page.image_count
        );

        let prompt = scoring::build_prompt(&page);
        let reply = self.scorer.invoke(&[ChatMessage::user(prompt)]).await?;
        let analysis = scoring::parse_scores(&reply).inspect_err(|e| {
            warn!("Analysis [{}] unreadable scoring reply: {}\n{}", url, e, e.raw);
        })?;
        let overall_score = scoring::round_to_tenth(scoring::composite_score(&analysis));
        info!(
            "Analysis [{}] scored {} as {}",
            url,
            overall_score,
            analysis.business_type.as_str()
        );

        let mut warnings = Vec::new();
        let mockup_image = match mockup::render_mockup(
            self.images.as_ref(),
            &analysis.redesign_description,
            analysis.business_type.as_str(),
        )
        .await
        {
            Ok(encoded) => encoded,
            Err(e) => {
                warn!("Analysis [{}] mockup skipped: {}", url, e);
                warnings.push(format!("mockup generation failed: {e}"));
                String::new()
            }
        };

        Ok(AnalysisResult {
            mockup_generated: !mockup_image.is_empty(),
            url,
            scraped_data: page,
            analysis,
            overall_score,
            mockup_image,
            warnings,
            analyzed_at: Utc::now(),
        })
    }
}
