//! Call lifecycle and operator configuration types.

use serde::{Deserialize, Serialize};

/// Lifecycle status of a call session.
///
/// Mirrors the carrier's reported statuses plus the engine's own
/// pre-placement states.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum CallStatus {
    Pending,
    Initiating,
    Ringing,
    Connected,
    Completed,
    Busy,
    NoAnswer,
    Canceled,
    Failed,
}

impl CallStatus {
    /// Maps a carrier status-callback value onto the session status.
    ///
    /// Unknown values return `None`; the caller logs and ignores them.
    pub fn from_carrier(value: &str) -> Option<Self> {
        match value {
            "queued" | "initiated" => Some(Self::Initiating),
            "ringing" => Some(Self::Ringing),
            "in-progress" | "answered" => Some(Self::Connected),
            "completed" => Some(Self::Completed),
            "busy" => Some(Self::Busy),
            "no-answer" => Some(Self::NoAnswer),
            "canceled" => Some(Self::Canceled),
            "failed" => Some(Self::Failed),
            _ => None,
        }
    }

    /// Terminal statuses reject new media events and only serve
    /// introspection until the session is purged.
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            Self::Completed | Self::Busy | Self::NoAnswer | Self::Canceled | Self::Failed
        )
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Initiating => "initiating",
            Self::Ringing => "ringing",
            Self::Connected => "connected",
            Self::Completed => "completed",
            Self::Busy => "busy",
            Self::NoAnswer => "no-answer",
            Self::Canceled => "canceled",
            Self::Failed => "failed",
        }
    }
}

/// Why a call ended. Carried on the `call_ended` observer event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CallEndReason {
    Hangup,
    MeetingBooked,
    Voicemail,
    OptOut,
    CarrierTerminal,
    MediaClosed,
    PlacementFailed,
    Shutdown,
}

impl CallEndReason {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Hangup => "hangup",
            Self::MeetingBooked => "meeting_booked",
            Self::Voicemail => "voicemail",
            Self::OptOut => "opt_out",
            Self::CarrierTerminal => "carrier_terminal",
            Self::MediaClosed => "media_closed",
            Self::PlacementFailed => "placement_failed",
            Self::Shutdown => "shutdown",
        }
    }
}

/// Conversational tone directive for the agent. Unknown inputs fall back
/// to `Professional`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Tone {
    #[default]
    Professional,
    Friendly,
    Consultative,
    Aggressive,
}

impl Tone {
    pub fn parse(value: &str) -> Self {
        match value.trim().to_lowercase().as_str() {
            "friendly" => Self::Friendly,
            "consultative" => Self::Consultative,
            "aggressive" => Self::Aggressive,
            _ => Self::Professional,
        }
    }
}

/// Immutable per-call inputs provided by the operator at initiation.
///
/// The prompt builder treats the optional fields as opaque configuration;
/// the engine never interprets their content.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OperatorProfile {
    pub first_name: String,
    #[serde(default)]
    pub last_name: Option<String>,
    pub phone: String,
    pub company: String,
    pub selling: String,
    #[serde(default)]
    pub tone: Option<String>,
    #[serde(default)]
    pub industry: Option<String>,
    #[serde(default)]
    pub target_role: Option<String>,
    #[serde(default)]
    pub value_props: Option<String>,
    #[serde(default)]
    pub common_objections: Option<String>,
    #[serde(default)]
    pub additional_context: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
}

impl OperatorProfile {
    /// Returns the first required field missing from the payload, if any.
    pub fn missing_required(&self) -> Option<&'static str> {
        if self.first_name.trim().is_empty() {
            return Some("firstName");
        }
        if self.phone.trim().is_empty() {
            return Some("phone");
        }
        if self.company.trim().is_empty() {
            return Some("company");
        }
        if self.selling.trim().is_empty() {
            return Some("selling");
        }
        None
    }

    pub fn tone(&self) -> Tone {
        self.tone.as_deref().map(Tone::parse).unwrap_or_default()
    }
}
