//! Provider webhook events and subscription verification.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use dominion_core::ImportSummary;

/// Push notification for one provider object.
///
/// Only the routing fields are modelled; `updates`, `event_time` and the
/// subscription id are ignored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WebhookEvent {
    pub object_type: String,
    pub aspect_type: String,
    /// Activity (or athlete) id the event is about.
    pub object_id: i64,
    /// Provider athlete id of the owner.
    pub owner_id: i64,
}

impl WebhookEvent {
    /// Read a delivery body. A body that is not a well-formed event is still
    /// acknowledged, as [`EventOutcome::Malformed`].
    pub fn from_payload(body: &[u8]) -> Result<Self, EventOutcome> {
        serde_json::from_slice(body).map_err(|e| EventOutcome::Malformed {
            error: e.to_string(),
        })
    }

    /// Only newly created activities produce aggregation work.
    pub fn is_activity_create(&self) -> bool {
        self.object_type == "activity" && self.aspect_type == "create"
    }
}

/// Query parameters of the subscription handshake.
#[derive(Debug, Clone, Deserialize)]
pub struct WebhookVerification {
    #[serde(rename = "hub.mode")]
    pub mode: String,
    #[serde(rename = "hub.challenge")]
    pub challenge: String,
    #[serde(rename = "hub.verify_token")]
    pub verify_token: String,
}

/// Echo expected by the provider when the handshake succeeds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChallengeResponse {
    #[serde(rename = "hub.challenge")]
    pub challenge: String,
}

impl WebhookVerification {
    /// Answer the handshake when the token matches.
    pub fn verify(&self, expected_token: &str) -> Option<ChallengeResponse> {
        if expected_token.is_empty() || self.verify_token != expected_token {
            return None;
        }
        Some(ChallengeResponse {
            challenge: self.challenge.clone(),
        })
    }
}

/// What handling one webhook event amounted to. Every variant is an
/// acknowledgement; none is reported back to the provider as an error.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum EventOutcome {
    /// Not an activity creation.
    Ignored {
        object_type: String,
        aspect_type: String,
    },
    /// No connected user owns this athlete id.
    UnknownOwner { owner_id: i64 },
    /// The activity went through the aggregation path.
    Processed {
        user_id: Uuid,
        external_id: i64,
        summary: ImportSummary,
    },
    /// The delivery could not be read as an event.
    Malformed { error: String },
    /// Credential or feed failure while handling the event.
    Failed {
        owner_id: i64,
        #[serde(skip_serializing_if = "Option::is_none")]
        user_id: Option<Uuid>,
        error: String,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_ignores_extra_fields() {
        let event: WebhookEvent = serde_json::from_value(serde_json::json!({
            "aspect_type": "create",
            "event_time": 1516126040,
            "object_id": 1360128428,
            "object_type": "activity",
            "owner_id": 134815,
            "subscription_id": 120475,
            "updates": {}
        }))
        .unwrap();
        assert!(event.is_activity_create());
        assert_eq!(event.owner_id, 134815);
    }

    #[test]
    fn test_updates_and_athlete_events_do_no_work() {
        let update = WebhookEvent {
            object_type: "activity".into(),
            aspect_type: "update".into(),
            object_id: 1,
            owner_id: 2,
        };
        let athlete = WebhookEvent {
            object_type: "athlete".into(),
            aspect_type: "create".into(),
            object_id: 1,
            owner_id: 2,
        };
        assert!(!update.is_activity_create());
        assert!(!athlete.is_activity_create());
    }

    #[test]
    fn test_verification_echoes_challenge() {
        let params = WebhookVerification {
            mode: "subscribe".into(),
            challenge: "15f7d1a91c1f40f8a748fd134752feb3".into(),
            verify_token: "STRAVA".into(),
        };
        let echo = params.verify("STRAVA").unwrap();
        assert_eq!(
            serde_json::to_value(&echo).unwrap(),
            serde_json::json!({"hub.challenge": "15f7d1a91c1f40f8a748fd134752feb3"})
        );
        assert!(params.verify("other").is_none());
        assert!(params.verify("").is_none());
    }

    #[test]
    fn test_payload_missing_owner_is_malformed() {
        let body = br#"{"object_type":"athlete","aspect_type":"update","object_id":1}"#;
        match WebhookEvent::from_payload(body) {
            Err(EventOutcome::Malformed { error }) => assert!(error.contains("owner_id")),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_payload_mistyped_id_is_malformed() {
        let body = br#"{"object_type":"activity","aspect_type":"create","object_id":"x","owner_id":1}"#;
        assert!(matches!(
            WebhookEvent::from_payload(body),
            Err(EventOutcome::Malformed { .. })
        ));
        assert!(matches!(
            WebhookEvent::from_payload(b"not json"),
            Err(EventOutcome::Malformed { .. })
        ));
    }

    #[test]
    fn test_payload_parses_event() {
        let body = br#"{"object_type":"activity","aspect_type":"create","object_id":7,"owner_id":1,"event_time":1}"#;
        let event = WebhookEvent::from_payload(body).unwrap();
        assert!(event.is_activity_create());
        assert_eq!(event.object_id, 7);
    }

    #[test]
    fn test_outcome_serializes_with_status_tag() {
        let outcome = EventOutcome::UnknownOwner { owner_id: 5 };
        assert_eq!(
            serde_json::to_value(&outcome).unwrap(),
            serde_json::json!({"status": "unknown_owner", "owner_id": 5})
        );
    }
}
