//! Canonical report produced by the result normalizer
//!
//! Every field is always populated. Unresolved text fields carry a fixed
//! sentinel string and unresolved numbers carry `Score::Unknown`, so
//! consumers never branch on missing data.

use serde::{Serialize, Serializer};
use std::fmt::{Display, Formatter};

/// Sentinel for unresolved text fields
pub const UNKNOWN: &str = "Unknown";

/// Label used when neither an explicit label nor a score is available
pub const UNKNOWN_TRAINABILITY: &str = "Unknown Trainability";

/// A numeric field that may be unresolved
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub enum Score {
    Known(f64),
    #[default]
    Unknown,
}

impl Score {
    pub fn value(self) -> Option<f64> {
        match self {
            Self::Known(v) => Some(v),
            Self::Unknown => None,
        }
    }

    pub fn is_known(self) -> bool {
        matches!(self, Self::Known(_))
    }
}

impl From<Option<f64>> for Score {
    fn from(value: Option<f64>) -> Self {
        value.map_or(Self::Unknown, Self::Known)
    }
}

impl Display for Score {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Known(v) if v.fract() == 0.0 => write!(f, "{v:.0}"),
            Self::Known(v) => write!(f, "{v:.1}"),
            Self::Unknown => f.write_str("unknown"),
        }
    }
}

/// Unknown scores serialize as the string "unknown", never as null or absent
impl Serialize for Score {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Self::Known(v) => serializer.serialize_f64(*v),
            Self::Unknown => serializer.serialize_str("unknown"),
        }
    }
}

/// One fixed view model for every backend result shape
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CanonicalReport {
    pub model_used: String,
    pub human_dominant_emotion: String,
    /// Ordered, duplicate-free
    pub human_secondary_tags: Vec<String>,
    pub ai_dominant_emotion: String,
    /// Ordered, duplicate-free
    pub ai_tags: Vec<String>,
    pub ai_visual_summary: String,
    pub trainability_score: Score,
    pub trainability_label: String,
    /// `100 - variability` when variability is numeric
    pub consensus_score: Score,
    pub gap_summary: String,
    pub raw_comments: Vec<String>,
}

impl CanonicalReport {
    /// Report with every field unresolved
    pub fn unresolved() -> Self {
        Self {
            model_used: UNKNOWN.to_string(),
            human_dominant_emotion: UNKNOWN.to_string(),
            human_secondary_tags: Vec::new(),
            ai_dominant_emotion: UNKNOWN.to_string(),
            ai_tags: Vec::new(),
            ai_visual_summary: UNKNOWN.to_string(),
            trainability_score: Score::Unknown,
            trainability_label: UNKNOWN_TRAINABILITY.to_string(),
            consensus_score: Score::Unknown,
            gap_summary: UNKNOWN.to_string(),
            raw_comments: Vec::new(),
        }
    }

    /// Report carrying only the human comments gathered before analysis ran
    pub fn from_raw_comments(raw_comments: Vec<String>) -> Self {
        Self {
            raw_comments,
            ..Self::unresolved()
        }
    }

    /// Illustrative report offered when a real one cannot be produced
    pub fn sample() -> Self {
        Self {
            model_used: "sample".to_string(),
            human_dominant_emotion: "Happy".to_string(),
            human_secondary_tags: vec!["Playful".to_string(), "Curious".to_string()],
            ai_dominant_emotion: "Happy".to_string(),
            ai_tags: vec![
                "Relaxed".to_string(),
                "Playful".to_string(),
                "Alert".to_string(),
            ],
            ai_visual_summary: "Open mouth, soft eyes and a loose, wagging tail suggest a relaxed and playful mood."
                .to_string(),
            trainability_score: Score::Known(82.0),
            trainability_label: "Easily Trainable".to_string(),
            consensus_score: Score::Known(78.0),
            gap_summary: "Human and AI readings agree on the dominant emotion; the AI also notices alertness."
                .to_string(),
            raw_comments: vec![
                "Looks so happy!".to_string(),
                "That tail is going a mile a minute".to_string(),
            ],
        }
    }

    /// True when any scored field resolved
    pub fn has_scores(&self) -> bool {
        self.trainability_score.is_known() || self.consensus_score.is_known()
    }
}
