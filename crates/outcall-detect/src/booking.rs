//! BANT qualification signals and the meeting-booked gate.

use once_cell::sync::Lazy;
use outcall_types::BantChecklist;
use regex::Regex;

fn compile(pattern: &str) -> Regex {
    Regex::new(&format!("(?i){pattern}")).expect("booking pattern must compile")
}

static BUDGET: Lazy<Vec<Regex>> = Lazy::new(|| {
    [
        r"\bbudget\b",
        r"\b(?:cost|price|pricing)\b",
        r"how much",
        r"\bafford\b",
        r"\bspend(?:ing)?\b",
    ]
    .into_iter()
    .map(compile)
    .collect()
});

static AUTHORITY: Lazy<Vec<Regex>> = Lazy::new(|| {
    [
        r"i (?:decide|make the (?:call|decision)s?)",
        r"my (?:decision|call)\b",
        r"decision.?maker",
        r"i'?m the (?:owner|founder|ceo|director|one who)",
        r"(?:run|check) (?:it|this) (?:by|with) my (?:boss|team|partner)",
        r"i'?d have to ask",
    ]
    .into_iter()
    .map(compile)
    .collect()
});

static NEED: Lazy<Vec<Regex>> = Lazy::new(|| {
    [
        r"we (?:need|want|require)",
        r"looking for",
        r"\bproblem\b",
        r"\bstruggl\w+",
        r"pain point",
        r"\bchallenge\b",
        r"been meaning to",
    ]
    .into_iter()
    .map(compile)
    .collect()
});

static TIMELINE: Lazy<Vec<Regex>> = Lazy::new(|| {
    [
        r"(?:this|next) (?:week|month|quarter|year)",
        r"by the end of",
        r"\bq[1-4]\b",
        r"\bsoon\b",
        r"\basap\b",
        r"\btimeline\b",
        r"right away",
    ]
    .into_iter()
    .map(compile)
    .collect()
});

/// A specific clock time: `14:30`, `2pm`, `2 p.m.`.
static SPECIFIC_TIME: Lazy<Regex> =
    Lazy::new(|| compile(r"\d{1,2}:\d{2}|\d{1,2}\s?[ap]\.?m\.?\b"));

/// A specific day: weekday, `tomorrow`, `next <weekday>`, `<month> <day>`.
static SPECIFIC_DAY: Lazy<Regex> = Lazy::new(|| {
    compile(
        r"\b(?:monday|tuesday|wednesday|thursday|friday|saturday|sunday)\b|\btomorrow\b|\bnext (?:monday|tuesday|wednesday|thursday|friday|saturday|sunday)\b|\b(?:january|february|march|april|may|june|july|august|september|october|november|december) \d{1,2}\b",
    )
});

/// Prospect-side confirmation that the proposed slot is accepted.
static CONFIRMATION: Lazy<Vec<Regex>> = Lazy::new(|| {
    [
        r"sounds good",
        r"that works",
        r"works for me",
        r"see you then",
        r"looking forward",
        r"let'?s do it",
        r"book it",
        r"\b(?:yes|yeah|yep|sure|ok(?:ay)?)\b.*\b(?:work|book|perfect|great)\b",
        r"\b(?:work|book|perfect|great)\b.*\b(?:yes|yeah|yep|sure|ok(?:ay)?)\b",
        r"^\s*perfect\b",
        r"^\s*great\b",
    ]
    .into_iter()
    .map(compile)
    .collect()
});

/// Assistant-side scheduling language for the same turn.
static SCHEDULING: Lazy<Vec<Regex>> = Lazy::new(|| {
    [
        r"calendar invite",
        r"i'?ve got you down",
        r"i'?ll put you down",
        r"pencil you in",
        r"does that work",
        r"booked you",
        r"i'?ll send (?:you )?(?:an|the) invite",
        r"we'?re (?:all )?set for",
    ]
    .into_iter()
    .map(compile)
    .collect()
});

/// Per-utterance BANT channel triggers, merged into the running checklist
/// by the caller.
pub fn bant_signals(utterance: &str) -> BantChecklist {
    BantChecklist {
        budget: BUDGET.iter().any(|p| p.is_match(utterance)),
        authority: AUTHORITY.iter().any(|p| p.is_match(utterance)),
        need: NEED.iter().any(|p| p.is_match(utterance)),
        timeline: TIMELINE.iter().any(|p| p.is_match(utterance)),
    }
}

/// The strict meeting-booked gate over the most recent (assistant, user)
/// pair.
///
/// Fires only when all three conditions hold:
/// 1. the combined text contains a specific time anchor AND a specific
///    day anchor;
/// 2. the user side contains a confirmation phrase;
/// 3. the assistant side contains scheduling language.
pub fn meeting_booked(assistant: &str, user: &str) -> bool {
    let combined = format!("{assistant} {user}");
    let has_time = SPECIFIC_TIME.is_match(&combined);
    let has_day = SPECIFIC_DAY.is_match(&combined);
    if !(has_time && has_day) {
        return false;
    }
    if !CONFIRMATION.iter().any(|p| p.is_match(user)) {
        return false;
    }
    SCHEDULING.iter().any(|p| p.is_match(assistant))
}

#[cfg(test)]
mod tests {
    use super::*;

    const ASSISTANT: &str =
        "Perfect, I've got you down for Tuesday at 2 PM — I'll send a calendar invite.";
    const USER: &str = "Sounds good.";

    #[test]
    fn happy_booking_fires() {
        assert!(meeting_booked(ASSISTANT, USER));
    }

    #[test]
    fn missing_day_alone_does_not_fire() {
        let assistant = "Perfect, I've got you down for 2 PM — I'll send a calendar invite.";
        assert!(!meeting_booked(assistant, USER));
    }

    #[test]
    fn missing_time_alone_does_not_fire() {
        let assistant = "Perfect, I've got you down for Tuesday — I'll send a calendar invite.";
        assert!(!meeting_booked(assistant, USER));
    }

    #[test]
    fn missing_confirmation_does_not_fire() {
        assert!(!meeting_booked(ASSISTANT, "hmm let me think about it"));
    }

    #[test]
    fn missing_scheduling_language_does_not_fire() {
        let assistant = "Tuesday at 2 PM is a wonderful time of day.";
        assert!(!meeting_booked(assistant, USER));
    }

    #[test]
    fn clock_time_and_month_day_anchors_count() {
        let assistant = "I've got you down for March 12 at 14:30, calendar invite on the way.";
        assert!(meeting_booked(assistant, "that works for me"));
    }

    #[test]
    fn affirmation_adjacent_to_work_counts_as_confirmation() {
        assert!(meeting_booked(ASSISTANT, "yeah that should work"));
        assert!(!meeting_booked(ASSISTANT, "yeah maybe"));
    }

    #[test]
    fn bant_channels_trigger_independently() {
        let bant = bant_signals("what's the pricing on this?");
        assert!(bant.budget && !bant.authority && !bant.need && !bant.timeline);

        let bant = bant_signals("I'm the owner, we need something by next quarter");
        assert!(bant.authority);
        assert!(bant.need);
        assert!(bant.timeline);
        assert_eq!(bant.depth(), 3);
    }

    #[test]
    fn bant_empty_utterance() {
        assert_eq!(bant_signals("").depth(), 0);
    }
}
