//! Running sentiment score over prospect utterances.
//!
//! A fixed table of weighted patterns produces a per-utterance delta; the
//! running score decays 15% per update and is clamped to [-10, +10].

use once_cell::sync::Lazy;
use regex::Regex;

/// Decay applied to the previous score before adding the delta.
const DECAY: f32 = 0.85;

/// Hard bounds on the running score.
const SCORE_MIN: f32 = -10.0;
const SCORE_MAX: f32 = 10.0;

/// Short utterances with no pattern hit read as mild disengagement.
const SHORT_NEUTRAL_DELTA: f32 = -0.5;

/// Long engaged answers earn a bonus when nothing negative matched.
const LONG_ENGAGED_BONUS: f32 = 1.0;

static POSITIVE: Lazy<Vec<(Regex, f32)>> = Lazy::new(|| {
    [
        (r"sounds (?:interesting|good|great)", 2.0),
        (r"(?:i'?m|very|definitely|really) interested", 2.5),
        (r"tell me more|go ahead|go on|keep going", 2.0),
        (r"\b(?:perfect|great|awesome|excellent|love it)\b", 1.5),
        (r"that works|works for me", 2.0),
        (r"\b(?:yes|yeah|sure|absolutely)\b", 0.5),
        (r"\bthanks?\b|thank you", 1.0),
    ]
    .into_iter()
    .map(|(pattern, weight)| (compile(pattern), weight))
    .collect()
});

static NEGATIVE: Lazy<Vec<(Regex, f32)>> = Lazy::new(|| {
    [
        (r"not interested|no interest", -3.0),
        (r"stop calling|take me off|do ?n[o']?t call", -4.0),
        (r"waste of time|leave me alone|get lost|buzz off", -4.0),
        (r"\b(?:spam|scam|robocall|telemarketer)\b", -3.5),
        (r"hang(?:ing)? up", -3.0),
        (r"how did you get my number", -2.5),
        (r"no thanks|no thank you", -2.0),
        (r"too (?:expensive|much)|can'?t afford", -1.5),
        (r"\bbusy\b|bad time", -1.5),
        (r"not right now|maybe later|some other time", -1.0),
    ]
    .into_iter()
    .map(|(pattern, weight)| (compile(pattern), weight))
    .collect()
});

fn compile(pattern: &str) -> Regex {
    Regex::new(&format!("(?i){pattern}")).expect("sentiment pattern must compile")
}

/// Computes the sentiment delta for one prospect utterance.
///
/// Weighted pattern hits are summed; a short (≤ 2 word) utterance with no
/// hits contributes −0.5, and a long (> 20 word) utterance with no
/// negative hits earns a +1 engagement bonus.
pub fn sentiment_delta(utterance: &str) -> f32 {
    let mut delta = 0.0f32;
    let mut negative_hit = false;

    for (pattern, weight) in NEGATIVE.iter() {
        if pattern.is_match(utterance) {
            delta += weight;
            negative_hit = true;
        }
    }
    for (pattern, weight) in POSITIVE.iter() {
        if pattern.is_match(utterance) {
            delta += weight;
        }
    }

    let words = utterance.split_whitespace().count();
    if delta == 0.0 && words <= 2 && words > 0 {
        return SHORT_NEUTRAL_DELTA;
    }
    if words > 20 && !negative_hit {
        delta += LONG_ENGAGED_BONUS;
    }
    delta
}

/// Applies one update to the running score: decay, add, clamp.
pub fn update_score(previous: f32, delta: f32) -> f32 {
    (previous * DECAY + delta).clamp(SCORE_MIN, SCORE_MAX)
}
