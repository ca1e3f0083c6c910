//! Candidate source paths for every canonical report field
//!
//! Probed in order, first non-empty wins. Supporting a new backend schema
//! means adding its path to the matching table.

use crate::models::UNKNOWN;

/// Text field with the literal used when no path resolves
pub struct TextField {
    pub paths: &'static [&'static str],
    pub default: &'static str,
}

pub const MODEL_USED: TextField = TextField {
    paths: &["model_used", "model", "meta.model", "analysis.model"],
    default: UNKNOWN,
};

pub const HUMAN_DOMINANT_EMOTION: TextField = TextField {
    paths: &[
        "aggregate.dominant_emotion",
        "aggregate.primary_emotion",
        "aggregate.top_emotion",
        "human.dominant_emotion",
        "dominant_emotion",
    ],
    default: "Neutral",
};

pub const AI_DOMINANT_EMOTION: TextField = TextField {
    paths: &[
        "ai_analysis.dominant_emotion",
        "ai.dominant_emotion",
        "ai_analysis.primary_emotion",
        "vision.dominant_emotion",
    ],
    default: UNKNOWN,
};

pub const AI_VISUAL_SUMMARY: TextField = TextField {
    paths: &[
        "ai_analysis.visual_summary",
        "ai_analysis.summary",
        "ai.summary",
        "vision.description",
    ],
    default: UNKNOWN,
};

pub const GAP_SUMMARY: TextField = TextField {
    paths: &["gap_analysis.summary", "comparison.summary", "gap_summary"],
    default: UNKNOWN,
};

pub const TRAINABILITY_LABEL: &[&str] = &[
    "trainability.label",
    "trainability_label",
    "dataset.trainability_label",
];

pub const HUMAN_SECONDARY_TAGS: &[&str] = &[
    "aggregate.secondary_emotions",
    "aggregate.secondary_tags",
    "secondary_tags",
    "tags",
];

pub const AI_TAGS: &[&str] = &[
    "ai_analysis.tags",
    "ai_analysis.emotion_tags",
    "ai.tags",
    "vision.tags",
];

pub const TRAINABILITY_SCORE: &[&str] = &[
    "trainability.score",
    "trainability_score",
    "dataset.trainability_score",
    "metrics.trainability",
    "trainability",
];

pub const VARIABILITY_SCORE: &[&str] = &[
    "aggregate.variability_score",
    "variability_score",
    "metrics.variability",
];

pub const RAW_COMMENTS: &[&str] = &[
    "raw_comments",
    "comments",
    "human_comments",
    "aggregate.comments",
];
