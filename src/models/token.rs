// Token record and the results of the four registry operations.
//
// The record serializes in the same camelCase layout the legacy `tokens.json`
// file used, so the file backend can read data written by older deployments.
//
// Stored expiries are read as RFC 3339 timestamps or bare `YYYY-MM-DD` dates
// (UTC midnight). Anything else is kept verbatim as `Expiry::Unparseable` and
// evaluates as expired. A parsed expiry is always written and echoed back in
// the canonical millisecond form, so `2024-02-15T10:00:00Z` or `2024-02-15`
// in an old file comes back as `2024-02-15T10:00:00.000Z` /
// `2024-02-15T00:00:00.000Z`.

use chrono::{DateTime, NaiveDate, SecondsFormat, TimeZone, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// Formats a timestamp as RFC 3339 UTC with millisecond precision,
/// e.g. `2024-02-15T10:00:00.000Z`.
pub fn format_timestamp(at: &DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Millis, true)
}

pub(crate) mod iso_millis {
    use super::*;

    pub fn serialize<S: Serializer>(at: &DateTime<Utc>, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(&format_timestamp(at))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<DateTime<Utc>, D::Error> {
        let raw = String::deserialize(d)?;
        DateTime::parse_from_rfc3339(&raw)
            .map(|dt| dt.with_timezone(&Utc))
            .map_err(serde::de::Error::custom)
    }
}

/// A stored expiry. Records written by other tools may carry a value that is
/// not a timestamp; it is kept verbatim instead of failing the whole read.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Expiry {
    At(DateTime<Utc>),
    Unparseable(String),
}

impl Expiry {
    pub fn parse(raw: &str) -> Self {
        let trimmed = raw.trim();
        if let Ok(dt) = DateTime::parse_from_rfc3339(trimmed) {
            return Expiry::At(dt.with_timezone(&Utc));
        }
        NaiveDate::parse_from_str(trimmed, "%Y-%m-%d")
            .ok()
            .and_then(|date| date.and_hms_opt(0, 0, 0))
            .map(|midnight| Expiry::At(Utc.from_utc_datetime(&midnight)))
            .unwrap_or_else(|| Expiry::Unparseable(raw.to_string()))
    }

    pub fn timestamp(&self) -> Option<DateTime<Utc>> {
        match self {
            Expiry::At(at) => Some(*at),
            Expiry::Unparseable(_) => None,
        }
    }
}

impl std::fmt::Display for Expiry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Expiry::At(at) => f.write_str(&format_timestamp(at)),
            Expiry::Unparseable(raw) => f.write_str(raw),
        }
    }
}

impl From<DateTime<Utc>> for Expiry {
    fn from(at: DateTime<Utc>) -> Self {
        Expiry::At(at)
    }
}

impl Serialize for Expiry {
    fn serialize<S: Serializer>(&self, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for Expiry {
    fn deserialize<D: Deserializer<'de>>(d: D) -> Result<Self, D::Error> {
        let value = serde_json::Value::deserialize(d)?;
        Ok(match value {
            serde_json::Value::String(raw) => Expiry::parse(&raw),
            other => Expiry::Unparseable(other.to_string()),
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenRecord {
    pub token: String,
    #[serde(default)]
    pub active: bool,
    #[serde(with = "iso_millis")]
    pub created_at: DateTime<Utc>,
    /// `None` means permanent when `active`, never activated otherwise.
    #[serde(default)]
    pub expire_at: Option<Expiry>,
}

impl TokenRecord {
    pub fn new(token: impl Into<String>, created_at: DateTime<Utc>) -> Self {
        Self {
            token: token.into(),
            active: false,
            created_at,
            expire_at: None,
        }
    }

    /// Evaluates validity at `now`. Never mutates the record: an expired
    /// token stays flagged active until it is deactivated or re-activated.
    pub fn validity_at(&self, now: DateTime<Utc>) -> Validity {
        if !self.active {
            return Validity::Inactive;
        }
        match &self.expire_at {
            None => Validity::Permanent,
            Some(Expiry::At(at)) if now <= *at => Validity::Valid { expire_at: *at },
            Some(expiry) => Validity::Expired {
                expire_at: expiry.clone(),
            },
        }
    }
}

/// Partial update applied by a store in one step.
/// `expire_at: Some(None)` clears the expiry, `None` leaves it untouched.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TokenPatch {
    pub active: Option<bool>,
    pub expire_at: Option<Option<DateTime<Utc>>>,
}

impl TokenPatch {
    pub fn activate(expire_at: Option<DateTime<Utc>>) -> Self {
        Self {
            active: Some(true),
            expire_at: Some(expire_at),
        }
    }

    pub fn deactivate() -> Self {
        Self {
            active: Some(false),
            expire_at: None,
        }
    }

    pub fn apply(&self, record: &mut TokenRecord) {
        if let Some(active) = self.active {
            record.active = active;
        }
        if let Some(expire_at) = self.expire_at {
            record.expire_at = expire_at.map(Expiry::At);
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Registration {
    pub created: bool,
    pub active: bool,
}

impl Registration {
    pub fn message(&self) -> &'static str {
        if self.created {
            "Token registered"
        } else {
            "Token already registered"
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ActivationMode {
    Permanent,
    Timed,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Activation {
    pub token: String,
    /// The expiry as stored after the update.
    pub expire_at: Option<Expiry>,
    pub mode: ActivationMode,
}

impl Activation {
    pub fn message(&self) -> &'static str {
        match self.mode {
            ActivationMode::Permanent => "Token activated permanently",
            ActivationMode::Timed => "Token activated",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Deactivation {
    pub token: String,
    pub deactivated: bool,
}

/// Outcome of a validity check, in evaluation order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Validity {
    NotFound,
    Inactive,
    Permanent,
    Valid { expire_at: DateTime<Utc> },
    /// Also returned when the stored expiry cannot be parsed.
    Expired { expire_at: Expiry },
}

impl Validity {
    pub fn is_valid(&self) -> bool {
        matches!(self, Validity::Permanent | Validity::Valid { .. })
    }

    pub fn reason(&self) -> Option<&'static str> {
        match self {
            Validity::NotFound => Some("not_found"),
            Validity::Inactive => Some("inactive"),
            Validity::Expired { .. } => Some("expired"),
            Validity::Permanent | Validity::Valid { .. } => None,
        }
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ValidityWire {
    valid: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    reason: Option<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    permanent: Option<bool>,
    // Some(None) renders `"expireAt": null`, None omits the key.
    #[serde(skip_serializing_if = "Option::is_none")]
    expire_at: Option<Option<String>>,
}

impl Serialize for Validity {
    fn serialize<S: Serializer>(&self, s: S) -> Result<S::Ok, S::Error> {
        let (permanent, expire_at) = match self {
            Validity::NotFound | Validity::Inactive => (None, None),
            Validity::Permanent => (Some(true), Some(None)),
            Validity::Valid { expire_at } => (None, Some(Some(format_timestamp(expire_at)))),
            Validity::Expired { expire_at } => (None, Some(Some(expire_at.to_string()))),
        };
        ValidityWire {
            valid: self.is_valid(),
            reason: self.reason(),
            permanent,
            expire_at,
        }
        .serialize(s)
    }
}
