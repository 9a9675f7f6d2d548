use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// Tokens are treated as expired this long before their actual expiry.
const EXPIRY_MARGIN_SECS: i64 = 60;

/// OAuth2 credential as persisted in the token file.
///
/// Field names follow the common `token.json` layout so files written by other
/// OAuth2 client libraries load unchanged.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Credential {
    pub access_token: String,
    #[serde(default)]
    pub token_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expiry: Option<DateTime<Utc>>,
}

impl Credential {
    /// A credential without expiry never expires.
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        match self.expiry {
            Some(exp) => exp - Duration::seconds(EXPIRY_MARGIN_SECS) <= now,
            None => false,
        }
    }

    pub fn is_expired(&self) -> bool {
        self.is_expired_at(Utc::now())
    }

    pub fn can_refresh(&self) -> bool {
        self.refresh_token.as_deref().is_some_and(|t| !t.is_empty())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn credential(expiry: Option<DateTime<Utc>>) -> Credential {
        Credential {
            access_token: "ya29.token".into(),
            token_type: "Bearer".into(),
            refresh_token: Some("1//refresh".into()),
            expiry,
        }
    }

    #[test]
    fn expiry_honours_margin() {
        let now = Utc.with_ymd_and_hms(2024, 7, 8, 12, 0, 0).unwrap();
        assert!(!credential(None).is_expired_at(now));
        assert!(!credential(Some(now + Duration::minutes(10))).is_expired_at(now));
        assert!(credential(Some(now + Duration::seconds(30))).is_expired_at(now));
        assert!(credential(Some(now - Duration::minutes(1))).is_expired_at(now));
    }

    #[test]
    fn loads_go_style_token_file() {
        let json = r#"{
            "access_token": "ya29.a0",
            "token_type": "Bearer",
            "refresh_token": "1//0g",
            "expiry": "2024-07-08T01:53:20.123456+01:00"
        }"#;
        let c: Credential = serde_json::from_str(json).unwrap();
        assert_eq!(c.access_token, "ya29.a0");
        assert_eq!(c.refresh_token.as_deref(), Some("1//0g"));
        assert_eq!(
            c.expiry.unwrap().timestamp(),
            Utc.with_ymd_and_hms(2024, 7, 8, 0, 53, 20).unwrap().timestamp()
        );
        assert!(c.can_refresh());
    }

    #[test]
    fn minimal_token_file_has_no_refresh() {
        let c: Credential = serde_json::from_str(r#"{"access_token":"x"}"#).unwrap();
        assert_eq!(c.token_type, "");
        assert!(!c.can_refresh());
        assert!(!c.is_expired());
    }
}
