//! Telegram WebApp `initData` decoding and signature validation.
//!
//! The blob is an `application/x-www-form-urlencoded` string. Its `hash` field
//! is `hex(HMAC-SHA256(secret_key, data_check_string))` where `secret_key` is
//! `HMAC-SHA256("WebAppData", bot_token)` and `data_check_string` is every
//! other `key=value` pair, sorted by key and joined with `\n`.

use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use std::collections::BTreeMap;
use std::time::Duration;
use thiserror::Error;

type HmacSha256 = Hmac<Sha256>;

const WEB_APP_DATA_KEY: &[u8] = b"WebAppData";

/// User object carried in the `user` field of `initData`.
#[allow(dead_code)]
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WebAppUser {
    #[serde(default)]
    pub id: i64,
    #[serde(default)]
    pub first_name: Option<String>,
    #[serde(default)]
    pub last_name: Option<String>,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub language_code: Option<String>,
    #[serde(default)]
    pub is_premium: Option<bool>,
    #[serde(default)]
    pub photo_url: Option<String>,
}

#[derive(Debug, Error)]
pub enum InitDataError {
    #[error("init data has no hash")]
    MissingHash,
    #[error("init data hash mismatch")]
    HashMismatch,
    #[error("init data auth_date missing or invalid")]
    MissingAuthDate,
    #[error("init data expired ({age_secs}s old)")]
    Expired { age_secs: i64 },
    #[error("init data user is malformed: {0}")]
    MalformedUser(#[from] serde_json::Error),
}

/// Decoded, unverified view of an `initData` string.
#[derive(Debug, Clone, Default)]
pub struct InitData {
    raw: String,
    fields: BTreeMap<String, String>,
}

impl InitData {
    pub fn parse(raw: &str) -> Self {
        let fields = url::form_urlencoded::parse(raw.as_bytes())
            .map(|(k, v)| (k.into_owned(), v.into_owned()))
            .collect();
        Self {
            raw: raw.to_string(),
            fields,
        }
    }

    pub fn raw(&self) -> &str {
        &self.raw
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.fields.get(key).map(|s| s.as_str())
    }

    pub fn hash(&self) -> Option<&str> {
        self.get("hash")
    }

    pub fn auth_date(&self) -> Option<i64> {
        self.get("auth_date").and_then(|v| v.parse().ok())
    }

    /// The unsafe user payload; `Ok(None)` when the blob carries no user.
    pub fn user(&self) -> Result<Option<WebAppUser>, InitDataError> {
        match self.get("user") {
            Some(json) => Ok(Some(serde_json::from_str(json)?)),
            None => Ok(None),
        }
    }

    pub fn data_check_string(&self) -> String {
        self.fields
            .iter()
            .filter(|(k, _)| k.as_str() != "hash")
            .map(|(k, v)| format!("{k}={v}"))
            .collect::<Vec<_>>()
            .join("\n")
    }
}

/// Result of a successful validation.
#[derive(Debug, Clone)]
pub struct ValidatedInitData {
    pub user: Option<WebAppUser>,
    pub auth_date: Option<i64>,
}

/// Checks `initData` signatures for one bot token.
#[derive(Clone)]
pub struct InitDataValidator {
    secret_key: Vec<u8>,
    max_age: Duration,
}

impl std::fmt::Debug for InitDataValidator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InitDataValidator")
            .field("max_age", &self.max_age)
            .finish_non_exhaustive()
    }
}

impl InitDataValidator {
    pub fn new(bot_token: &str, max_age: Duration) -> Self {
        let secret_key = hmac_sha256(WEB_APP_DATA_KEY, bot_token.as_bytes());
        Self {
            secret_key,
            max_age,
        }
    }

    pub fn validate(&self, raw: &str) -> Result<ValidatedInitData, InitDataError> {
        self.validate_at(raw, chrono::Utc::now().timestamp())
    }

    pub fn validate_at(&self, raw: &str, now_unix: i64) -> Result<ValidatedInitData, InitDataError> {
        let data = InitData::parse(raw);
        let hash = data.hash().ok_or(InitDataError::MissingHash)?;
        let expected = hex::decode(hash).map_err(|_| InitDataError::HashMismatch)?;

        let mut mac = new_mac(&self.secret_key);
        mac.update(data.data_check_string().as_bytes());
        mac.verify_slice(&expected)
            .map_err(|_| InitDataError::HashMismatch)?;

        let auth_date = data.auth_date();
        if !self.max_age.is_zero() {
            let issued = auth_date.ok_or(InitDataError::MissingAuthDate)?;
            let age_secs = now_unix - issued;
            if age_secs > self.max_age.as_secs() as i64 {
                return Err(InitDataError::Expired { age_secs });
            }
        }

        Ok(ValidatedInitData {
            user: data.user()?,
            auth_date,
        })
    }
}

fn new_mac(key: &[u8]) -> HmacSha256 {
    // HMAC accepts keys of any length, so this never takes the error path.
    <HmacSha256 as Mac>::new_from_slice(key).unwrap_or_else(|_| unreachable!())
}

fn hmac_sha256(key: &[u8], msg: &[u8]) -> Vec<u8> {
    let mut mac = new_mac(key);
    mac.update(msg);
    mac.finalize().into_bytes().to_vec()
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    pub(crate) const TOKEN: &str = "123456:TEST-token";
    pub(crate) const SIGNED: &str = "auth_date=1700000000&query_id=AAF&user=%7B%22id%22%3A42%2C%22first_name%22%3A%22John%22%2C%22last_name%22%3A%22Doe%22%2C%22username%22%3A%22alice%22%7D&hash=41d44b1cf441cb8d90f0c8f4ffe4135694b5b0434523148b6f76b23f71963034";
    pub(crate) const SIGNED_AT: i64 = 1_700_000_000;
    /// Correctly signed, but `user` is not JSON.
    pub(crate) const SIGNED_BAD_USER: &str = "auth_date=1700000000&user=not-json&hash=70d839f1c5ac3272e515c86d87744cb06015f7d3c6fe58b2d4ae6d004189edd3";
    const SIGNED_NO_AUTH_DATE: &str =
        "query_id=AAF&hash=b4382bbe87f29478821ceba3fe57b4e2a16767fa9619dfe174dd97f49d8de07f";
    const SIGNED_BAD_AUTH_DATE: &str = "auth_date=soon&query_id=AAF&hash=97229bb6b1b84f504db0c3f21c4d44d5a999803b34ea52e2ac6632f2402a17c5";

    #[test]
    fn decodes_fields_and_user() {
        let data = InitData::parse(SIGNED);
        assert_eq!(data.auth_date(), Some(SIGNED_AT));
        assert_eq!(data.get("query_id"), Some("AAF"));
        let user = data.user().unwrap().unwrap();
        assert_eq!(user.id, 42);
        assert_eq!(user.first_name.as_deref(), Some("John"));
        assert_eq!(user.username.as_deref(), Some("alice"));
        assert!(user.photo_url.is_none());
    }

    #[test]
    fn data_check_string_is_sorted_and_skips_hash() {
        let data = InitData::parse("b=2&hash=ff&a=1");
        assert_eq!(data.data_check_string(), "a=1\nb=2");
    }

    #[test]
    fn accepts_correctly_signed_blob() {
        let validator = InitDataValidator::new(TOKEN, Duration::ZERO);
        let validated = validator.validate(SIGNED).unwrap();
        assert_eq!(validated.auth_date, Some(SIGNED_AT));
        assert_eq!(validated.user.unwrap().last_name.as_deref(), Some("Doe"));
    }

    #[test]
    fn rejects_other_token() {
        let validator = InitDataValidator::new("654321:other", Duration::ZERO);
        assert!(matches!(
            validator.validate(SIGNED),
            Err(InitDataError::HashMismatch)
        ));
    }

    #[test]
    fn rejects_tampered_field() {
        let validator = InitDataValidator::new(TOKEN, Duration::ZERO);
        let tampered = SIGNED.replace("query_id=AAF", "query_id=AAG");
        assert!(matches!(
            validator.validate(&tampered),
            Err(InitDataError::HashMismatch)
        ));
    }

    #[test]
    fn rejects_missing_or_garbage_hash() {
        let validator = InitDataValidator::new(TOKEN, Duration::ZERO);
        assert!(matches!(
            validator.validate("auth_date=1&user=%7B%7D"),
            Err(InitDataError::MissingHash)
        ));
        assert!(matches!(
            validator.validate("auth_date=1&hash=zz"),
            Err(InitDataError::HashMismatch)
        ));
    }

    #[test]
    fn enforces_max_age_when_configured() {
        let validator = InitDataValidator::new(TOKEN, Duration::from_secs(60));
        assert!(validator.validate_at(SIGNED, SIGNED_AT + 30).is_ok());
        assert!(matches!(
            validator.validate_at(SIGNED, SIGNED_AT + 3600),
            Err(InitDataError::Expired { age_secs: 3600 })
        ));
    }

    #[test]
    fn rejects_missing_auth_date_when_max_age_set() {
        let validator = InitDataValidator::new(TOKEN, Duration::from_secs(60));
        assert!(matches!(
            validator.validate_at(SIGNED_NO_AUTH_DATE, SIGNED_AT),
            Err(InitDataError::MissingAuthDate)
        ));
        assert!(matches!(
            validator.validate_at(SIGNED_BAD_AUTH_DATE, SIGNED_AT),
            Err(InitDataError::MissingAuthDate)
        ));

        let lenient = InitDataValidator::new(TOKEN, Duration::ZERO);
        let validated = lenient.validate(SIGNED_NO_AUTH_DATE).unwrap();
        assert!(validated.auth_date.is_none());
        assert!(validated.user.is_none());
    }

    #[test]
    fn signed_blob_with_malformed_user_is_rejected() {
        let validator = InitDataValidator::new(TOKEN, Duration::ZERO);
        assert!(matches!(
            validator.validate(SIGNED_BAD_USER),
            Err(InitDataError::MalformedUser(_))
        ));
    }

    #[test]
    fn debug_output_hides_secret() {
        let validator = InitDataValidator::new(TOKEN, Duration::ZERO);
        let printed = format!("{validator:?}");
        assert!(!printed.contains("secret_key"));
    }
}
