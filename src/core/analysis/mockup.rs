use base64::Engine;
use base64::engine::general_purpose::STANDARD;

use crate::core::error::ImageGenError;
use crate::core::llm::image::ImageGenerator;

pub fn mockup_prompt(redesign_description: &str, business_type: &str) -> String {
    format!(
        "Professional modern website homepage design:

Business Type: {business_type}
Design Requirements: {redesign_description}

Style Guidelines:
- Clean corporate aesthetic with purple/blue gradient (#667eea to #764ba2)
- Modern navigation bar at top
- Hero section with compelling headline and call-to-action button
- Feature cards or sections below hero
- Professional footer
- Spacious, minimal layout
- High-quality business-focused design
- Desktop view, 1920x1080 resolution

Overall style: Corporate, professional, trustworthy, modern, clean, data-driven"
    )
}

/// Renders one redesign mockup and returns it base64-encoded. A generator
/// that answers with no bytes counts as `ImageGenError::Empty`.
pub async fn render_mockup(
    images: &dyn ImageGenerator,
    redesign_description: &str,
    business_type: &str,
) -> Result<String, ImageGenError> {
    let prompt = mockup_prompt(redesign_description, business_type);
    let bytes = images.generate(&prompt).await?;
    if bytes.is_empty() {
        return Err(ImageGenError::Empty);
    }
    Ok(STANDARD.encode(bytes))
}
