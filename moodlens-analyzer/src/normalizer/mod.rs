//! Result normalizer
//!
//! Maps any supported backend result shape onto one [`CanonicalReport`].
//! Pure and deterministic: the same payload always yields the same report,
//! and every field is populated even for an empty object.

pub mod fields;
pub mod resolve;

use crate::models::{CanonicalReport, Score, UNKNOWN_TRAINABILITY};
use fields::TextField;
use serde_json::Value;

pub const EASILY_TRAINABLE: &str = "Easily Trainable";
pub const MODERATELY_TRAINABLE: &str = "Moderately Trainable";
pub const DIFFICULT_TO_TRAIN: &str = "Difficult to Train";

/// Normalize a raw result payload
pub fn normalize(payload: &Value) -> CanonicalReport {
    let trainability_score = resolve::resolve(payload, fields::TRAINABILITY_SCORE, resolve::number);
    let variability = resolve::resolve(payload, fields::VARIABILITY_SCORE, resolve::number);

    let trainability_label = resolve::resolve(payload, fields::TRAINABILITY_LABEL, resolve::text)
        .unwrap_or_else(|| trainability_label(trainability_score).to_string());

    CanonicalReport {
        model_used: text_field(payload, &fields::MODEL_USED),
        human_dominant_emotion: text_field(payload, &fields::HUMAN_DOMINANT_EMOTION),
        human_secondary_tags: tag_field(payload, fields::HUMAN_SECONDARY_TAGS),
        ai_dominant_emotion: text_field(payload, &fields::AI_DOMINANT_EMOTION),
        ai_tags: tag_field(payload, fields::AI_TAGS),
        ai_visual_summary: text_field(payload, &fields::AI_VISUAL_SUMMARY),
        trainability_score: Score::from(trainability_score),
        trainability_label,
        consensus_score: Score::from(variability.map(consensus_from_variability)),
        gap_summary: text_field(payload, &fields::GAP_SUMMARY),
        raw_comments: raw_comments(payload).unwrap_or_default(),
    }
}

/// Label derived from a trainability score
///
/// `>= 70` easily, `40..70` moderately, `< 40` difficult.
pub fn trainability_label(score: Option<f64>) -> &'static str {
    match score {
        Some(s) if s >= 70.0 => EASILY_TRAINABLE,
        Some(s) if s >= 40.0 => MODERATELY_TRAINABLE,
        Some(_) => DIFFICULT_TO_TRAIN,
        None => UNKNOWN_TRAINABILITY,
    }
}

pub fn consensus_from_variability(variability: f64) -> f64 {
    100.0 - variability
}

/// True when any narrative field resolves from the payload
///
/// Narrative fields are the descriptive ones (emotions, tags, summaries);
/// scores and comments do not count.
pub fn has_narrative(payload: &Value) -> bool {
    [
        &fields::HUMAN_DOMINANT_EMOTION,
        &fields::AI_DOMINANT_EMOTION,
        &fields::AI_VISUAL_SUMMARY,
        &fields::GAP_SUMMARY,
    ]
    .iter()
    .any(|field| resolve::resolve(payload, field.paths, resolve::text).is_some())
        || resolve::resolve(payload, fields::AI_TAGS, resolve::tags).is_some()
}

/// Human comments carried by the payload, if any
pub fn raw_comments(payload: &Value) -> Option<Vec<String>> {
    resolve::resolve(payload, fields::RAW_COMMENTS, resolve::comments)
}

fn text_field(payload: &Value, field: &TextField) -> String {
    resolve::resolve(payload, field.paths, resolve::text).unwrap_or_else(|| field.default.to_string())
}

fn tag_field(payload: &Value, paths: &[&str]) -> Vec<String> {
    resolve::resolve(payload, paths, resolve::tags).unwrap_or_default()
}
