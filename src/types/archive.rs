use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Body of the archive's `tools/find` lookup.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FindRequest {
    #[serde(rename = "Level")]
    pub level: String,
    #[serde(rename = "Query")]
    pub query: BTreeMap<String, String>,
}

impl FindRequest {
    pub fn study_by_uid(study_instance_uid: impl Into<String>) -> Self {
        Self {
            level: "Study".to_string(),
            query: BTreeMap::from([("StudyInstanceUID".to_string(), study_instance_uid.into())]),
        }
    }
}

/// HTTP Basic credentials for the archive.
#[derive(Debug, Clone)]
pub struct ArchiveAuth {
    pub username: String,
    pub password: String,
}

impl ArchiveAuth {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
        }
    }

    /// `Authorization` header value.
    pub fn header_value(&self) -> String {
        let raw = format!("{}:{}", self.username, self.password);
        format!("Basic {}", STANDARD.encode(raw))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn find_request_serializes_with_archive_field_names() {
        let body = serde_json::to_value(FindRequest::study_by_uid("1.2.3")).unwrap();
        assert_eq!(
            body,
            serde_json::json!({"Level": "Study", "Query": {"StudyInstanceUID": "1.2.3"}})
        );
    }

    #[test]
    fn basic_auth_header() {
        assert_eq!(
            ArchiveAuth::new("admin", "password").header_value(),
            "Basic YWRtaW46cGFzc3dvcmQ="
        );
    }
}
