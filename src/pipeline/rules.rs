//! Rule-tag classification and the action decision table.
//!
//! Every message on the stream already matched at least one upstream rule.
//! The rule tags say *which* rules matched; tags are grouped by prefix so the
//! rule set can carry numbered variants (`addressed2`, `location_bio`, ...).

use crate::pipeline::types::{Action, IncomingMessage, Signals};

/// Tag prefix for rules that match inside the monitored bounding box.
pub const BOUNDING_BOX_PREFIX: &str = "boundingbox";

/// Tag prefix for rules that match messages directed at the monitored account.
pub const ADDRESSED_PREFIX: &str = "addressed";

/// Tag prefix for rules that match on profile location, bio or place.
pub const LOCATION_PREFIX: &str = "location";

/// Derive signals from rule tags and message-level geo.
///
/// A bounding-box rule can fire on the author's declared place alone, so
/// `in_bounding_box` is only raised when the message carries coordinates.
pub fn classify_tags<S: AsRef<str>>(tags: &[S], has_geo: bool) -> Signals {
    let mut signals = Signals {
        has_geo,
        ..Signals::default()
    };
    for tag in tags {
        let tag = tag.as_ref();
        if tag.starts_with(BOUNDING_BOX_PREFIX) && has_geo {
            signals.in_bounding_box = true;
        }
        if tag.starts_with(ADDRESSED_PREFIX) {
            signals.addressed = true;
        }
        if tag.starts_with(LOCATION_PREFIX) {
            signals.location_match = true;
        }
    }
    signals
}

/// Signals for a whole message.
pub fn classify_message(message: &IncomingMessage) -> Signals {
    classify_tags(&message.matching_tags, message.geo.is_some())
}

/// Map signals to an action.
///
/// A message with coordinates outside the box never gets an ask-for-geo or
/// invite reply: it already told us where it is.
pub fn categorize(signals: Signals) -> Action {
    match signals {
        Signals {
            in_bounding_box: true,
            addressed: true,
            ..
        } => Action::Confirmed,
        Signals {
            in_bounding_box: true,
            addressed: false,
            ..
        } => Action::Unconfirmed,
        Signals {
            has_geo: false,
            addressed: true,
            location_match: true,
            ..
        } => Action::AskForGeo,
        Signals {
            has_geo: false,
            addressed: false,
            location_match: true,
            ..
        } => Action::Invite,
        _ => Action::NoMatch,
    }
}
