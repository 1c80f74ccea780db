//! Master-key request signing.
//!
//! Every request carries an `authorization` header computed from the
//! request verb, the resource type, the resource link and the `x-ms-date`
//! header, signed with HMAC-SHA256 under the decoded account key.

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use sha2::Sha256;

use crate::error::{ClientError, ClientResult};

type HmacSha256 = Hmac<Sha256>;

/// A decoded account master key.
#[derive(Clone)]
pub struct MasterKey {
    key: Vec<u8>,
}

impl std::fmt::Debug for MasterKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MasterKey").finish_non_exhaustive()
    }
}

impl MasterKey {
    /// Decodes a base64 master key.
    pub fn from_base64(encoded: &str) -> ClientResult<Self> {
        let key = STANDARD
            .decode(encoded.trim())
            .map_err(|e| ClientError::Auth {
                message: format!("master key is not valid base64: {e}"),
            })?;
        Ok(Self { key })
    }

    /// Computes the URL-encoded `authorization` header value.
    pub fn authorization(
        &self,
        verb: &str,
        resource_type: &str,
        resource_link: &str,
        date: &str,
    ) -> ClientResult<String> {
        let payload = format!(
            "{}\n{}\n{}\n{}\n\n",
            verb.to_lowercase(),
            resource_type.to_lowercase(),
            resource_link,
            date.to_lowercase()
        );

        let mut mac = HmacSha256::new_from_slice(&self.key).map_err(|e| ClientError::Auth {
            message: format!("invalid master key: {e}"),
        })?;
        mac.update(payload.as_bytes());
        let signature = STANDARD.encode(mac.finalize().into_bytes());

        let token = format!("type=master&ver=1.0&sig={signature}");
        Ok(url::form_urlencoded::byte_serialize(token.as_bytes()).collect())
    }
}

/// Formats `time` the way the `x-ms-date` header expects (RFC 1123, GMT).
pub fn format_date(time: DateTime<Utc>) -> String {
    time.format("%a, %d %b %Y %H:%M:%S GMT").to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    // base64("helios-docdb-test-master-key-0123456789")
    const TEST_KEY: &str = "aGVsaW9zLWRvY2RiLXRlc3QtbWFzdGVyLWtleS0wMTIzNDU2Nzg5";
    const TEST_DATE: &str = "Thu, 27 Apr 2017 00:51:12 GMT";

    #[test]
    fn test_authorization_for_database_read() {
        let key = MasterKey::from_base64(TEST_KEY).unwrap();
        let token = key
            .authorization("GET", "dbs", "dbs/ToDoList", TEST_DATE)
            .unwrap();
        assert_eq!(
            token,
            "type%3Dmaster%26ver%3D1.0%26sig%3DC%2BmSsZtqPTDm4q4bai2UsUgLc%2FDwZKJ%2F8EzAgm6yMJM%3D"
        );
    }

    #[test]
    fn test_authorization_for_document_create() {
        let key = MasterKey::from_base64(TEST_KEY).unwrap();
        let token = key
            .authorization("POST", "docs", "dbs/ToDoList/colls/Items", TEST_DATE)
            .unwrap();
        assert_eq!(
            token,
            "type%3Dmaster%26ver%3D1.0%26sig%3DNQpFHPXp8imc7Kzugs%2F2eMdSW5bULVmKUzTk4m4uTvA%3D"
        );
    }

    #[test]
    fn test_verb_and_date_case_do_not_matter() {
        let key = MasterKey::from_base64(TEST_KEY).unwrap();
        let upper = key.authorization("GET", "DBS", "dbs/ToDoList", TEST_DATE).unwrap();
        let lower = key
            .authorization("get", "dbs", "dbs/ToDoList", &TEST_DATE.to_lowercase())
            .unwrap();
        assert_eq!(upper, lower);
    }

    #[test]
    fn test_resource_link_is_case_sensitive() {
        let key = MasterKey::from_base64(TEST_KEY).unwrap();
        let a = key.authorization("GET", "dbs", "dbs/ToDoList", TEST_DATE).unwrap();
        let b = key.authorization("GET", "dbs", "dbs/todolist", TEST_DATE).unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn test_invalid_key_is_rejected() {
        let err = MasterKey::from_base64("***").unwrap_err();
        assert!(matches!(err, ClientError::Auth { .. }));
    }

    #[test]
    fn test_format_date() {
        let time = Utc.with_ymd_and_hms(2017, 4, 27, 0, 51, 12).unwrap();
        assert_eq!(format_date(time), TEST_DATE);
    }
}
