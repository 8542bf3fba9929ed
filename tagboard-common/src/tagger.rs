//! Vision tagger contract
//!
//! The tagging model is an external collaborator that receives an image URL
//! and returns a caption plus tag suggestions. This module is the one place
//! its untyped JSON is allowed to exist: the response is decoded into the
//! strict shape below at the boundary, or the call fails. Nothing downstream
//! trusts the payload — names are re-tokenized by the normalizer, `kind` is
//! carried but ignored, and confidences are clamped.

use crate::Result;
use async_trait::async_trait;
use serde::Deserialize;

/// One tag suggestion from the model.
#[derive(Debug, Clone, Deserialize)]
pub struct TagSuggestion {
    /// Raw phrase; may be multi-word, the worker re-tokenizes it.
    pub name: String,
    pub confidence: f64,
    /// Model-assigned category. Untrusted, display/debugging only.
    #[serde(default)]
    pub kind: Option<String>,
}

/// The full tagger response.
#[derive(Debug, Clone, Deserialize)]
pub struct TaggerResponse {
    pub caption: String,
    #[serde(default)]
    pub tags: Vec<TagSuggestion>,
}

impl TaggerResponse {
    /// Clamp every confidence into [0,1]; non-finite values collapse to 0.
    pub fn sanitized(mut self) -> Self {
        for tag in &mut self.tags {
            tag.confidence = clamp_confidence(tag.confidence);
        }
        self
    }
}

/// Defensive clamp applied to every model-supplied confidence.
pub fn clamp_confidence(c: f64) -> f64 {
    if c.is_finite() {
        c.clamp(0.0, 1.0)
    } else {
        0.0
    }
}

/// The tagging collaborator. Implementations must bound each call with a
/// hard timeout; a hung model call must never hang the worker.
#[async_trait]
pub trait Tagger: Send + Sync {
    async fn tag_image(&self, image_url: &str) -> Result<TaggerResponse>;

    /// False when the collaborator lacks required configuration (endpoint,
    /// API key). The worker idles rather than claiming jobs it cannot run.
    fn is_configured(&self) -> bool {
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_the_contract_shape() {
        let raw = r#"{
            "caption": "a sad frog in the rain",
            "tags": [
                {"name": "sad", "confidence": 0.9, "kind": "mood"},
                {"name": "frog", "confidence": 0.85}
            ]
        }"#;
        let resp: TaggerResponse = serde_json::from_str(raw).unwrap();
        assert_eq!(resp.caption, "a sad frog in the rain");
        assert_eq!(resp.tags.len(), 2);
        assert_eq!(resp.tags[0].kind.as_deref(), Some("mood"));
    }

    #[test]
    fn missing_caption_is_a_parse_error() {
        let raw = r#"{"tags": []}"#;
        assert!(serde_json::from_str::<TaggerResponse>(raw).is_err());
    }

    #[test]
    fn missing_tags_defaults_to_empty() {
        let raw = r#"{"caption": "x"}"#;
        let resp: TaggerResponse = serde_json::from_str(raw).unwrap();
        assert!(resp.tags.is_empty());
    }

    #[test]
    fn sanitize_clamps_out_of_range_confidence() {
        let raw = r#"{
            "caption": "x",
            "tags": [
                {"name": "over", "confidence": 1.7},
                {"name": "under", "confidence": -0.2},
                {"name": "ok", "confidence": 0.5}
            ]
        }"#;
        let resp: TaggerResponse = serde_json::from_str::<TaggerResponse>(raw)
            .unwrap()
            .sanitized();
        assert_eq!(resp.tags[0].confidence, 1.0);
        assert_eq!(resp.tags[1].confidence, 0.0);
        assert_eq!(resp.tags[2].confidence, 0.5);
    }

    #[test]
    fn non_finite_confidence_collapses_to_zero() {
        assert_eq!(clamp_confidence(f64::NAN), 0.0);
        assert_eq!(clamp_confidence(f64::INFINITY), 0.0);
    }
}
