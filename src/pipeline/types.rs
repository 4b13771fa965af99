//! Shared types for the report pipeline.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::error::PipelineError;

/// Characters of a system message kept for logging.
const SYSTEM_PREVIEW_CHARS: usize = 200;

// ── Incoming message ────────────────────────────────────────────────

/// A point reported by the message itself (not the author's profile).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoPoint {
    pub latitude: f64,
    pub longitude: f64,
}

/// Entity arrays carried through to storage as JSON.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MessageEntities {
    #[serde(default)]
    pub hashtags: serde_json::Value,
    #[serde(default)]
    pub urls: serde_json::Value,
    #[serde(default)]
    pub user_mentions: serde_json::Value,
}

/// One activity from the stream, converted from the provider envelope.
#[derive(Debug, Clone)]
pub struct IncomingMessage {
    /// Provider id, e.g. `tag:search.twitter.com,2005:123456`.
    pub id: String,
    /// Author screen name.
    pub author: String,
    pub body: String,
    pub posted_at: DateTime<Utc>,
    pub geo: Option<GeoPoint>,
    /// Language codes, most specific source first.
    pub languages: Vec<String>,
    /// Tags of the upstream rules this message matched.
    pub matching_tags: Vec<String>,
    pub entities: MessageEntities,
    pub link: Option<String>,
    /// `post` or `share` (retweet).
    pub verb: String,
    /// Provider id of the shared activity when `verb == "share"`.
    pub shared_object_id: Option<String>,
}

impl IncomingMessage {
    /// Convert a raw stream payload into a message.
    ///
    /// Payloads without an `actor` are provider system messages and are
    /// rejected with [`PipelineError::NotActivity`].
    pub fn from_activity(value: serde_json::Value) -> Result<Self, PipelineError> {
        if !value.get("actor").is_some_and(serde_json::Value::is_object) {
            let preview: String = value.to_string().chars().take(SYSTEM_PREVIEW_CHARS).collect();
            return Err(PipelineError::NotActivity(preview));
        }

        let raw: RawActivity = serde_json::from_value(value)
            .map_err(|e| PipelineError::MalformedActivity(e.to_string()))?;

        let posted_at = match raw.posted_time.as_deref() {
            Some(ts) => DateTime::parse_from_rfc3339(ts)
                .map(|dt| dt.with_timezone(&Utc))
                .map_err(|e| PipelineError::MalformedActivity(format!("postedTime {ts}: {e}")))?,
            None => Utc::now(),
        };

        let geo = raw.geo.and_then(|g| match g.coordinates.as_slice() {
            [lat, long, ..] => Some(GeoPoint {
                latitude: *lat,
                longitude: *long,
            }),
            _ => None,
        });

        let mut languages = Vec::new();
        if let Some(lang) = raw.twitter_lang.filter(|l| !l.is_empty()) {
            languages.push(lang);
        }
        let mut matching_tags = Vec::new();
        if let Some(gnip) = raw.gnip {
            if let Some(lang) = gnip.language.and_then(|l| l.value).filter(|l| !l.is_empty()) {
                languages.push(lang);
            }
            matching_tags = gnip
                .matching_rules
                .into_iter()
                .filter_map(|rule| rule.tag)
                .collect();
        }

        Ok(Self {
            id: raw.id,
            author: raw.actor.preferred_username,
            body: raw.body,
            posted_at,
            geo,
            languages,
            matching_tags,
            entities: raw.twitter_entities.unwrap_or_default(),
            link: raw.link,
            verb: raw.verb.unwrap_or_else(|| "post".into()),
            shared_object_id: raw.object.and_then(|o| o.id),
        })
    }

    /// Numeric message id: the digits after the last `:` of the provider id.
    pub fn numeric_id(&self) -> Option<&str> {
        numeric_suffix(&self.id)
    }

    /// Numeric id of the shared activity, for retweets.
    pub fn shared_numeric_id(&self) -> Option<&str> {
        self.shared_object_id.as_deref().and_then(numeric_suffix)
    }

    /// Hashed author identity. Raw screen names are never stored.
    pub fn author_hash(&self) -> String {
        hash_identity(&self.author)
    }
}

fn numeric_suffix(id: &str) -> Option<&str> {
    let tail = id.rsplit(':').next()?;
    (!tail.is_empty() && tail.bytes().all(|b| b.is_ascii_digit())).then_some(tail)
}

/// Hex SHA-256 of an account identifier.
pub fn hash_identity(identity: &str) -> String {
    format!("{:x}", Sha256::digest(identity.as_bytes()))
}

// Provider envelope. Only the fields the pipeline reads.

#[derive(Deserialize)]
struct RawActivity {
    id: String,
    actor: RawActor,
    #[serde(default)]
    body: String,
    #[serde(rename = "postedTime")]
    posted_time: Option<String>,
    verb: Option<String>,
    object: Option<RawObject>,
    geo: Option<RawGeo>,
    twitter_lang: Option<String>,
    gnip: Option<RawGnip>,
    twitter_entities: Option<MessageEntities>,
    link: Option<String>,
}

#[derive(Deserialize)]
struct RawActor {
    #[serde(rename = "preferredUsername")]
    preferred_username: String,
}

#[derive(Deserialize)]
struct RawObject {
    id: Option<String>,
}

#[derive(Deserialize)]
struct RawGeo {
    #[serde(default)]
    coordinates: Vec<f64>,
}

#[derive(Deserialize)]
struct RawGnip {
    #[serde(default)]
    matching_rules: Vec<RawRule>,
    language: Option<RawLanguage>,
}

#[derive(Deserialize)]
struct RawRule {
    tag: Option<String>,
}

#[derive(Deserialize)]
struct RawLanguage {
    value: Option<String>,
}

// ── Signals and actions ─────────────────────────────────────────────

/// Boolean signals derived from one message's rule tags and geo.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Signals {
    /// Message has coordinates AND matched a bounding-box rule.
    pub in_bounding_box: bool,
    /// Message carries its own coordinates.
    pub has_geo: bool,
    /// Message is directed at the monitored account.
    pub addressed: bool,
    /// Author profile or place suggests the monitored region.
    pub location_match: bool,
}

impl Signals {
    /// `+BOUNDINGBOX -GEO +ADDRESSED -LOCATION` style summary for logs.
    pub fn summary(&self) -> String {
        let flag = |on: bool| if on { '+' } else { '-' };
        format!(
            "{}BOUNDINGBOX {}GEO {}ADDRESSED {}LOCATION",
            flag(self.in_bounding_box),
            flag(self.has_geo),
            flag(self.addressed),
            flag(self.location_match)
        )
    }
}

/// What to do with a categorized message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Action {
    /// In the box and addressed to us: store as a report and thank the author.
    Confirmed,
    /// In the box but not addressed: store the point, invite the author.
    Unconfirmed,
    /// Addressed and regional but without coordinates: ask to enable location.
    AskForGeo,
    /// Regional, not addressed, no coordinates: invite the author.
    Invite,
    /// Nothing to do.
    NoMatch,
}

impl Action {
    /// Short label for logging.
    pub fn label(&self) -> &'static str {
        match self {
            Self::Confirmed => "confirmed",
            Self::Unconfirmed => "unconfirmed",
            Self::AskForGeo => "ask_for_geo",
            Self::Invite => "invite",
            Self::NoMatch => "no_match",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn activity() -> serde_json::Value {
        json!({
            "id": "tag:search.twitter.com,2005:420123456789",
            "actor": { "preferredUsername": "banjir_watcher" },
            "body": "@petajkt banjir di sini",
            "postedTime": "2014-02-03T04:05:06.000Z",
            "verb": "post",
            "geo": { "type": "Point", "coordinates": [-6.3, 106.8] },
            "twitter_lang": "in",
            "twitter_entities": { "hashtags": [], "urls": [], "user_mentions": [{ "screen_name": "petajkt" }] },
            "gnip": {
                "language": { "value": "id" },
                "matching_rules": [{ "tag": "boundingbox" }, { "tag": "addressed2" }, { "value": "untagged" }]
            }
        })
    }

    #[test]
    fn parses_activity_envelope() {
        let msg = IncomingMessage::from_activity(activity()).unwrap();
        assert_eq!(msg.author, "banjir_watcher");
        assert_eq!(msg.languages, vec!["in", "id"]);
        assert_eq!(msg.matching_tags, vec!["boundingbox", "addressed2"]);
        assert_eq!(
            msg.geo,
            Some(GeoPoint {
                latitude: -6.3,
                longitude: 106.8
            })
        );
        assert_eq!(msg.posted_at.to_rfc3339(), "2014-02-03T04:05:06+00:00");
        assert_eq!(msg.entities.user_mentions[0]["screen_name"], "petajkt");
        assert_eq!(msg.verb, "post");
    }

    #[test]
    fn system_message_is_not_activity() {
        let err = IncomingMessage::from_activity(json!({ "info": { "message": "Replay Request Completed" } }))
            .unwrap_err();
        assert!(matches!(err, PipelineError::NotActivity(_)));
    }

    #[test]
    fn long_multibyte_system_message_is_cut_on_char_boundary() {
        for pad in 170..190 {
            let text = format!("{}{}", "a".repeat(pad), "é".repeat(15));
            let err = IncomingMessage::from_activity(json!({ "info": { "message": text } }))
                .unwrap_err();
            let PipelineError::NotActivity(preview) = err else {
                panic!("expected system message for pad {pad}");
            };
            assert_eq!(preview.chars().count(), SYSTEM_PREVIEW_CHARS);
        }
    }

    #[test]
    fn bad_timestamp_is_malformed() {
        let mut value = activity();
        value["postedTime"] = json!("yesterday");
        let err = IncomingMessage::from_activity(value).unwrap_err();
        assert!(matches!(err, PipelineError::MalformedActivity(_)));
    }

    #[test]
    fn missing_gnip_block_means_no_tags() {
        let mut value = activity();
        value.as_object_mut().unwrap().remove("gnip");
        let msg = IncomingMessage::from_activity(value).unwrap();
        assert!(msg.matching_tags.is_empty());
        assert_eq!(msg.languages, vec!["in"]);
    }

    #[test]
    fn numeric_id_takes_last_segment() {
        let msg = IncomingMessage::from_activity(activity()).unwrap();
        assert_eq!(msg.numeric_id(), Some("420123456789"));
        assert_eq!(numeric_suffix("tag:x,2005:abc"), None);
        assert_eq!(numeric_suffix(""), None);
    }

    #[test]
    fn shared_id_for_retweets() {
        let mut value = activity();
        value["verb"] = json!("share");
        value["object"] = json!({ "id": "tag:search.twitter.com,2005:111" });
        let msg = IncomingMessage::from_activity(value).unwrap();
        assert_eq!(msg.shared_numeric_id(), Some("111"));
    }

    #[test]
    fn author_hash_is_stable_and_opaque() {
        let hash = hash_identity("banjir_watcher");
        assert_eq!(hash.len(), 64);
        assert_eq!(hash, hash_identity("banjir_watcher"));
        assert!(!hash.contains("banjir"));
        assert_ne!(hash, hash_identity("someone_else"));
    }

    #[test]
    fn signals_summary() {
        let signals = Signals {
            in_bounding_box: true,
            has_geo: true,
            addressed: false,
            location_match: false,
        };
        assert_eq!(signals.summary(), "+BOUNDINGBOX +GEO -ADDRESSED -LOCATION");
    }

    #[test]
    fn action_labels() {
        assert_eq!(Action::Confirmed.label(), "confirmed");
        assert_eq!(Action::AskForGeo.label(), "ask_for_geo");
        assert_eq!(Action::NoMatch.label(), "no_match");
    }
}
