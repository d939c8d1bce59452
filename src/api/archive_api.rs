use crate::error::SetupError;
use crate::types::archive::{ArchiveAuth, FindRequest};
use reqwest::header::{AUTHORIZATION, HeaderValue};
use std::time::Duration;
use tracing::{debug, error};
use url::Url;

/// Stateless client for the PACS archive's REST endpoints.
#[derive(Clone)]
pub struct ArchiveApi {
    client: reqwest::Client,
    base: Url,
    authorization: HeaderValue,
}

impl ArchiveApi {
    pub fn new(base: Url, auth: &ArchiveAuth) -> Result<Self, SetupError> {
        let client = reqwest::Client::builder()
            .user_agent(concat!("pacs-provision/", env!("CARGO_PKG_VERSION")))
            .connect_timeout(Duration::from_secs(5))
            .build()?;
        Self::with_client(client, base, auth)
    }

    pub fn with_client(
        client: reqwest::Client,
        base: Url,
        auth: &ArchiveAuth,
    ) -> Result<Self, SetupError> {
        if base.cannot_be_a_base() {
            return Err(SetupError::InvalidBaseUrl(base.to_string()));
        }
        let mut authorization = HeaderValue::from_str(&auth.header_value())
            .map_err(|e| SetupError::InvalidCredentials(e.to_string()))?;
        authorization.set_sensitive(true);
        Ok(Self {
            client,
            base,
            authorization,
        })
    }

    /// `<base>/<segments...>`, keeping any path prefix already on the base.
    pub fn endpoint<'a>(&self, segments: impl IntoIterator<Item = &'a str>) -> Url {
        let mut url = self.base.clone();
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty().extend(segments);
        }
        url
    }

    /// Resolve archive identifiers for a `StudyInstanceUID`. An empty match
    /// list is an error.
    pub async fn find_study_ids(&self, study_instance_uid: &str) -> Result<Vec<String>, SetupError> {
        let url = self.endpoint(["tools", "find"]);
        let resp = self
            .client
            .post(url)
            .header(AUTHORIZATION, self.authorization.clone())
            .json(&FindRequest::study_by_uid(study_instance_uid))
            .send()
            .await?;

        let status = resp.status();
        let body = resp.bytes().await?;
        debug!(%status, body = %String::from_utf8_lossy(&body), "tools/find response");
        if !status.is_success() {
            error!(%status, "failed to retrieve study IDs");
            return Err(SetupError::UpstreamStatus(status));
        }

        let ids: Vec<String> = serde_json::from_slice(&body)?;
        if ids.is_empty() {
            return Err(SetupError::EmptyResultSet {
                key: study_instance_uid.to_string(),
            });
        }
        Ok(ids)
    }

    /// Fetch the zip archive of one study.
    pub async fn download_archive(&self, study_id: &str) -> Result<Vec<u8>, SetupError> {
        let url = self.endpoint(["studies", study_id, "archive"]);
        let resp = self
            .client
            .get(url)
            .header(AUTHORIZATION, self.authorization.clone())
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            error!(%status, study_id, "failed to download study");
            return Err(SetupError::UpstreamStatus(status));
        }
        Ok(resp.bytes().await?.to_vec())
    }
}
