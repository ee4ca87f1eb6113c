//! Sentiment, qualification, and analytics types.

use serde::{Deserialize, Serialize};

/// Categorical sentiment label derived by thresholding the running score.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SentimentLabel {
    Hostile,
    Negative,
    Neutral,
    Positive,
    Enthusiastic,
}

impl SentimentLabel {
    /// The deterministic threshold function over the running score.
    ///
    /// ≤ −6 hostile, ≤ −2 negative, ≤ +2 neutral, ≤ +6 positive,
    /// else enthusiastic.
    pub fn from_score(score: f32) -> Self {
        if score <= -6.0 {
            Self::Hostile
        } else if score <= -2.0 {
            Self::Negative
        } else if score <= 2.0 {
            Self::Neutral
        } else if score <= 6.0 {
            Self::Positive
        } else {
            Self::Enthusiastic
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Hostile => "hostile",
            Self::Negative => "negative",
            Self::Neutral => "neutral",
            Self::Positive => "positive",
            Self::Enthusiastic => "enthusiastic",
        }
    }
}

/// One point of the per-turn sentiment history.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SentimentPoint {
    pub turn: u32,
    pub score: f32,
    pub label: SentimentLabel,
}

/// Budget / Authority / Need / Timeline qualification checklist.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BantChecklist {
    pub budget: bool,
    pub authority: bool,
    pub need: bool,
    pub timeline: bool,
}

impl BantChecklist {
    /// Number of qualified channels, 0–4.
    pub fn depth(self) -> u8 {
        u8::from(self.budget) + u8::from(self.authority) + u8::from(self.need) + u8::from(self.timeline)
    }

    /// Merges per-utterance signals into the running checklist. Channels
    /// only ever flip to true.
    pub fn merge(&mut self, other: BantChecklist) {
        self.budget |= other.budget;
        self.authority |= other.authority;
        self.need |= other.need;
        self.timeline |= other.timeline;
    }
}

/// Turn-completion heuristic attached to every final ASR fragment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TurnStatus {
    Complete,
    MidThought,
    Ambiguous,
}

/// Scoring snapshot attached to `call_ended` and session introspection.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalyticsSnapshot {
    pub michael_words: u64,
    pub prospect_words: u64,
    pub barge_ins: u32,
    pub objections: u32,
    pub bant: BantChecklist,
    pub bant_depth: u8,
    pub sentiment_score: f32,
    pub sentiment_label: Option<SentimentLabel>,
    pub sentiment_history: Vec<SentimentPoint>,
    pub gatekeeper: bool,
    pub gatekeeper_navigated: bool,
    pub callback_requested: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub callback_time: Option<String>,
    pub meeting_booked: bool,
    pub opt_out: bool,
    pub voicemail: bool,
}
