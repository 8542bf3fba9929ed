//! Suggestion pipeline: model output → storable (tag, confidence) pairs
//!
//! Pure transformation, no I/O. The model's tag phrases and its caption are
//! two independent suggestion sources; both go through the shared normalizer
//! so nothing unnormalized can ever reach the tag store. Collisions keep the
//! maximum confidence — confidence is a display signal only, so max is the
//! simplest monotonic combination and nothing ever sums or averages.

use std::collections::HashMap;
use tagboard_common::normalize::Normalizer;
use tagboard_common::tagger::{clamp_confidence, TaggerResponse};

/// Fixed confidence for tags derived from caption words. Low on purpose:
/// the caption is a fallback source that keeps caption words searchable
/// even when the model's explicit tag list misses them.
pub const CAPTION_CONFIDENCE: f64 = 0.30;

/// One storable tag candidate.
#[derive(Debug, Clone, PartialEq)]
pub struct Suggestion {
    pub name: String,
    pub confidence: f64,
}

/// Insertion-ordered merge keeping the max confidence per name.
struct SuggestionSet {
    ordered: Vec<Suggestion>,
    index: HashMap<String, usize>,
}

impl SuggestionSet {
    fn new() -> Self {
        Self {
            ordered: Vec::new(),
            index: HashMap::new(),
        }
    }

    fn merge(&mut self, name: String, confidence: f64) {
        match self.index.get(&name) {
            Some(&i) => {
                let existing = &mut self.ordered[i];
                if confidence > existing.confidence {
                    existing.confidence = confidence;
                }
            }
            None => {
                self.index.insert(name.clone(), self.ordered.len());
                self.ordered.push(Suggestion { name, confidence });
            }
        }
    }
}

/// Turn a sanitized tagger response into the full list of (tag, confidence)
/// pairs to write for one image.
///
/// - Each model tag phrase is tokenized independently; a multi-word phrase
///   becomes multiple single-token suggestions at the phrase's confidence.
/// - Caption words join at [`CAPTION_CONFIDENCE`].
/// - Hyphenated names also materialize their part tags at the same
///   confidence, so `"film-noir"` stays findable via `"film"` or `"noir"`.
pub fn build_suggestions(normalizer: &Normalizer, response: &TaggerResponse) -> Vec<Suggestion> {
    let mut set = SuggestionSet::new();

    for tag in &response.tags {
        let confidence = clamp_confidence(tag.confidence);
        for token in normalizer.tokenize_query(&tag.name) {
            set.merge(token, confidence);
        }
    }

    for token in normalizer.tokenize_query(&response.caption) {
        set.merge(token, CAPTION_CONFIDENCE);
    }

    // Expansion runs over a snapshot of the merged names so siblings inherit
    // the final (post-merge) confidence of their parent.
    let merged: Vec<Suggestion> = set.ordered.clone();
    for suggestion in merged {
        for sibling in normalizer.expand_hyphenated_token(&suggestion.name) {
            set.merge(sibling, suggestion.confidence);
        }
    }

    set.ordered
}
