//! Opt-out, gatekeeper, callback, and objection detectors.

use once_cell::sync::Lazy;
use regex::Regex;

fn compile(pattern: &str) -> Regex {
    Regex::new(&format!("(?i){pattern}")).expect("intent pattern must compile")
}

static OPT_OUT: Lazy<Vec<Regex>> = Lazy::new(|| {
    [
        r"stop calling",
        r"take me off",
        r"do ?n[o']?t call",
        r"remove me",
        r"no more calls",
        r"\bunsubscribe\b",
        // Standalone "stop" only counts at the end of the utterance.
        r"\bstop[.!]?\s*$",
    ]
    .into_iter()
    .map(compile)
    .collect()
});

static GATEKEEPER: Lazy<Vec<Regex>> = Lazy::new(|| {
    [
        r"who'?s calling",
        r"who is calling",
        r"what'?s this (?:regarding|about)",
        r"what is this (?:regarding|about)",
        r"(?:she|he)'?s? (?:is )?(?:in a meeting|not available|unavailable|out of (?:the )?office|busy)",
        r"let me transfer",
        r"front desk",
        r"reception(?:ist)?\b",
        r"can i take a message",
        r"may i ask who",
        r"(?:his|her) (?:office|assistant)",
    ]
    .into_iter()
    .map(compile)
    .collect()
});

static NAVIGATION_CUES: Lazy<Vec<Regex>> =
    Lazy::new(|| [r"\bspeaking\b", r"\bhi\b", r"\bhey\b", r"this is"].into_iter().map(compile).collect());

static CALLBACK: Lazy<Vec<Regex>> = Lazy::new(|| {
    [
        r"call (?:me )?back",
        r"bad time",
        r"not a good time",
        r"\bbusy\b",
        r"\bdriving\b",
        r"i'?m in a meeting",
        r"in the middle of",
        r"try (?:me )?(?:again )?later",
        r"another time",
        r"reach me",
    ]
    .into_iter()
    .map(compile)
    .collect()
});

/// Free-text time anchors captured alongside a callback request.
static TIME_ANCHOR: Lazy<Regex> = Lazy::new(|| {
    compile(
        r"(\d{1,2}:\d{2}\s*(?:[ap]\.?m\.?)?|\d{1,2}\s*[ap]\.?m\.?|monday|tuesday|wednesday|thursday|friday|saturday|sunday|tomorrow|tonight|(?:this|in the) (?:morning|afternoon|evening)|next week)",
    )
});

static OBJECTION: Lazy<Vec<Regex>> = Lazy::new(|| {
    [
        r"not interested",
        r"too expensive",
        r"no budget",
        r"can'?t afford",
        r"send (?:me )?an email",
        r"how did you get",
        r"already (?:have|using|working with)",
        r"we(?:'re| are) (?:all )?set",
        r"happy with (?:our|my) current",
        r"not the right time",
        r"do ?n[o']?t need",
    ]
    .into_iter()
    .map(compile)
    .collect()
});

/// Compliance opt-out. A match takes the immediate opt-out branch.
pub fn is_opt_out(utterance: &str) -> bool {
    OPT_OUT.iter().any(|p| p.is_match(utterance))
}

/// Screening language from someone who is not the prospect.
pub fn is_gatekeeper(utterance: &str) -> bool {
    GATEKEEPER.iter().any(|p| p.is_match(utterance))
}

/// After a gatekeeper match, detects the configured prospect coming on
/// the line: the first name plus a recognition cue.
pub fn is_gatekeeper_navigated(utterance: &str, first_name: &str) -> bool {
    let name = first_name.trim();
    if name.is_empty() {
        return false;
    }
    let named = Regex::new(&format!(r"(?i)\b{}\b", regex::escape(name)))
        .map(|re| re.is_match(utterance))
        .unwrap_or(false);
    named && NAVIGATION_CUES.iter().any(|p| p.is_match(utterance))
}

/// A detected request to call back later.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallbackSignal {
    /// Free-text time anchor if one was present ("tomorrow", "3 pm", ...).
    pub time: Option<String>,
}

/// Detects a callback request; captures a time anchor when present.
pub fn callback_request(utterance: &str) -> Option<CallbackSignal> {
    if !CALLBACK.iter().any(|p| p.is_match(utterance)) {
        return None;
    }
    let time = TIME_ANCHOR
        .captures(utterance)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().to_string());
    Some(CallbackSignal { time })
}

/// Classic sales pushback. Each match increments the objection counter.
pub fn is_objection(utterance: &str) -> bool {
    OBJECTION.iter().any(|p| p.is_match(utterance))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn opt_out_variants() {
        assert!(is_opt_out("Please take me off your list."));
        assert!(is_opt_out("stop calling me"));
        assert!(is_opt_out("do not call this number"));
        assert!(is_opt_out("don't call again"));
        assert!(is_opt_out("remove me from your database"));
        assert!(is_opt_out("no more calls please... stop"));
        assert!(is_opt_out("just stop"));
    }

    #[test]
    fn standalone_stop_only_at_end() {
        assert!(is_opt_out("ok stop."));
        assert!(!is_opt_out("we had to stop by the store earlier"));
        assert!(!is_opt_out("can't stop thinking about it honestly"));
    }

    #[test]
    fn gatekeeper_phrases() {
        assert!(is_gatekeeper("Who's calling?"));
        assert!(is_gatekeeper("What's this regarding?"));
        assert!(is_gatekeeper("She's in a meeting right now"));
        assert!(is_gatekeeper("he is not available"));
        assert!(is_gatekeeper("Let me transfer you"));
        assert!(is_gatekeeper("Front desk speaking"));
        assert!(is_gatekeeper("Can I take a message?"));
        assert!(!is_gatekeeper("I'm interested, go on"));
    }

    #[test]
    fn navigation_requires_name_and_cue() {
        assert!(is_gatekeeper_navigated("Hi, this is Sarah", "Sarah"));
        assert!(is_gatekeeper_navigated("Sarah speaking", "sarah"));
        assert!(!is_gatekeeper_navigated("Sarah is out today", "Sarah"));
        assert!(!is_gatekeeper_navigated("this is Mike", "Sarah"));
        assert!(!is_gatekeeper_navigated("hi there", ""));
    }

    #[test]
    fn callback_with_time_anchor() {
        let signal = callback_request("I'm driving, call me back tomorrow").unwrap();
        assert_eq!(signal.time.as_deref(), Some("tomorrow"));

        let signal = callback_request("bad time, try again at 3 pm").unwrap();
        assert_eq!(signal.time.as_deref(), Some("3 pm"));

        let signal = callback_request("this is a bad time").unwrap();
        assert_eq!(signal.time, None);

        assert!(callback_request("sounds great, go ahead").is_none());
    }

    #[test]
    fn objection_patterns() {
        assert!(is_objection("we're not interested"));
        assert!(is_objection("that's too expensive for us"));
        assert!(is_objection("there's no budget this year"));
        assert!(is_objection("just send me an email"));
        assert!(is_objection("how did you get this number"));
        assert!(is_objection("we already have a vendor"));
        assert!(!is_objection("tell me about pricing"));
    }

    #[test]
    fn detectors_are_pure() {
        let text = "She's in a meeting, can I take a message?";
        assert_eq!(is_gatekeeper(text), is_gatekeeper(text));
        assert_eq!(callback_request(text), callback_request(text));
    }
}
