//! Strava wire types.
//!
//! Only the fields the territory engine reads are modelled; everything else
//! in the payloads is ignored.

use serde::Deserialize;
use serde_json::Value;

use dominion_core::{FeedItem, RawActivity};

/// Summary or detailed activity as returned by `/athlete/activities` and
/// `/activities/{id}`.
#[derive(Debug, Clone, Deserialize)]
pub struct StravaActivity {
    pub id: i64,
    #[serde(default)]
    pub map: Option<StravaMap>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct StravaMap {
    #[serde(default)]
    pub summary_polyline: Option<String>,
}

impl From<StravaActivity> for RawActivity {
    fn from(activity: StravaActivity) -> Self {
        RawActivity {
            external_id: activity.id,
            polyline: activity.map.and_then(|m| m.summary_polyline),
        }
    }
}

impl StravaActivity {
    /// Read one record of an activity page. A record that does not parse
    /// becomes [`FeedItem::Malformed`], keeping its id when it is readable.
    pub fn parse_record(record: Value) -> FeedItem {
        let external_id = record.get("id").and_then(Value::as_i64);
        match serde_json::from_value::<StravaActivity>(record) {
            Ok(activity) => FeedItem::Activity(activity.into()),
            Err(e) => FeedItem::Malformed {
                external_id,
                error: e.to_string(),
            },
        }
    }
}

/// Response of the OAuth refresh grant.
///
/// Every field is optional so that a rejected grant (which answers with an
/// error document instead) still parses and can be reported as a refresh
/// failure rather than a decoding error.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct TokenResponse {
    #[serde(default)]
    pub access_token: Option<String>,
    #[serde(default)]
    pub refresh_token: Option<String>,
    #[serde(default)]
    pub expires_at: Option<i64>,
    #[serde(default)]
    pub message: Option<String>,
}

/// Error document returned with non-success statuses.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct StravaFault {
    #[serde(default)]
    pub message: Option<String>,
}
