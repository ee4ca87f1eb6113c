//! Pattern-driven sentiment and intent detectors.
//!
//! Every detector is a pure function of the utterance (plus, for
//! sentiment, the previous score). None of them read session state or
//! make external calls, which keeps them trivially property-testable and
//! safe to run inline on the hot path.

pub mod booking;
pub mod intent;
pub mod sentiment;

pub use booking::{bant_signals, meeting_booked};
pub use intent::{
    callback_request, is_gatekeeper, is_gatekeeper_navigated, is_objection, is_opt_out,
    CallbackSignal,
};
pub use sentiment::{sentiment_delta, update_score};
