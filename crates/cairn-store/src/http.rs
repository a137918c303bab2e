//! OCI distribution API registry backend.
//!
//! Speaks the subset of the distribution spec the store needs: monolithic
//! blob upload, manifest put/get/delete by digest or tag, tag deletion and
//! the referrers listing endpoint. Tag deletion requires a registry that
//! implements the OCI 1.1 tag-delete semantics (zot does; Docker Registry
//! needs its tag-deletion extension enabled).

use async_trait::async_trait;
use bytes::Bytes;
use reqwest::StatusCode;

use cairn_core::{Error, Result};

use crate::manifest::{Descriptor, Manifest, MEDIA_TYPE_MANIFEST};
use crate::registry::{sha256_digest, Registry};

/// Registry backend over the OCI distribution HTTP API.
#[derive(Debug, Clone)]
pub struct HttpRegistry {
    client: reqwest::Client,
    base_url: String,
    repository: String,
    credentials: Option<(String, String)>,
}

impl HttpRegistry {
    /// Creates a backend for the given registry URL and repository.
    #[must_use]
    pub fn new(registry_url: impl Into<String>, repository: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: registry_url.into().trim_end_matches('/').to_string(),
            repository: repository.into(),
            credentials: None,
        }
    }

    /// Attaches basic-auth credentials to every request.
    #[must_use]
    pub fn with_credentials(
        mut self,
        username: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        self.credentials = Some((username.into(), password.into()));
        self
    }

    fn url(&self, path: &str) -> String {
        format!("{}/v2/{}/{path}", self.base_url, self.repository)
    }

    fn authed(&self, builder: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.credentials {
            Some((user, pass)) => builder.basic_auth(user, Some(pass)),
            None => builder,
        }
    }

    async fn send(
        &self,
        builder: reqwest::RequestBuilder,
        what: &str,
    ) -> Result<reqwest::Response> {
        let response = self
            .authed(builder)
            .send()
            .await
            .map_err(|e| Error::unavailable_with_source(format!("{what} request failed"), e))?;
        Ok(response)
    }
}

fn check_status(status: StatusCode, what: &str, reference: &str) -> Result<()> {
    if status.is_success() {
        return Ok(());
    }
    match status {
        StatusCode::NOT_FOUND => Err(Error::not_found("registry object", reference)),
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => Err(Error::PermissionDenied(
            format!("registry rejected {what} for {reference}"),
        )),
        s if s.is_server_error() => Err(Error::unavailable(format!(
            "registry {what} for {reference} failed with {s}"
        ))),
        s => Err(Error::Internal(format!(
            "registry {what} for {reference} failed with {s}"
        ))),
    }
}

#[async_trait]
impl Registry for HttpRegistry {
    async fn put_blob(&self, digest: &str, data: Bytes) -> Result<()> {
        // Monolithic upload: start a session, then PUT the whole blob.
        let start = self
            .send(self.client.post(self.url("blobs/uploads/")), "blob upload")
            .await?;
        check_status(start.status(), "blob upload start", digest)?;

        let location = start
            .headers()
            .get(reqwest::header::LOCATION)
            .and_then(|v| v.to_str().ok())
            .ok_or_else(|| {
                Error::unavailable("registry did not return an upload location".to_string())
            })?;
        let upload_url = if location.starts_with("http") {
            location.to_string()
        } else {
            format!("{}{location}", self.base_url)
        };
        let separator = if upload_url.contains('?') { '&' } else { '?' };

        let response = self
            .send(
                self.client
                    .put(format!("{upload_url}{separator}digest={digest}"))
                    .header(reqwest::header::CONTENT_TYPE, "application/octet-stream")
                    .body(data),
                "blob upload",
            )
            .await?;
        check_status(response.status(), "blob upload", digest)
    }

    async fn get_blob(&self, digest: &str) -> Result<Bytes> {
        let response = self
            .send(self.client.get(self.url(&format!("blobs/{digest}"))), "blob fetch")
            .await?;
        check_status(response.status(), "blob fetch", digest)?;
        response
            .bytes()
            .await
            .map_err(|e| Error::unavailable_with_source("blob body read failed", e))
    }

    async fn delete_blob(&self, digest: &str) -> Result<()> {
        let response = self
            .send(
                self.client.delete(self.url(&format!("blobs/{digest}"))),
                "blob delete",
            )
            .await?;
        if response.status() == StatusCode::NOT_FOUND {
            return Ok(());
        }
        check_status(response.status(), "blob delete", digest)
    }

    async fn put_manifest(&self, manifest: &Manifest) -> Result<String> {
        let body = manifest.to_bytes();
        let digest = sha256_digest(&body);
        let response = self
            .send(
                self.client
                    .put(self.url(&format!("manifests/{digest}")))
                    .header(reqwest::header::CONTENT_TYPE, MEDIA_TYPE_MANIFEST)
                    .body(body),
                "manifest put",
            )
            .await?;
        check_status(response.status(), "manifest put", &digest)?;
        Ok(digest)
    }

    async fn get_manifest(&self, reference: &str) -> Result<(String, Manifest)> {
        let response = self
            .send(
                self.client
                    .get(self.url(&format!("manifests/{reference}")))
                    .header(reqwest::header::ACCEPT, MEDIA_TYPE_MANIFEST),
                "manifest fetch",
            )
            .await?;
        check_status(response.status(), "manifest fetch", reference)?;

        let body = response
            .bytes()
            .await
            .map_err(|e| Error::unavailable_with_source("manifest body read failed", e))?;
        let digest = sha256_digest(&body);
        let manifest: Manifest = serde_json::from_slice(&body)
            .map_err(|e| Error::Internal(format!("registry returned invalid manifest: {e}")))?;
        Ok((digest, manifest))
    }

    async fn delete_manifest(&self, digest: &str) -> Result<()> {
        let response = self
            .send(
                self.client.delete(self.url(&format!("manifests/{digest}"))),
                "manifest delete",
            )
            .await?;
        if response.status() == StatusCode::NOT_FOUND {
            return Ok(());
        }
        check_status(response.status(), "manifest delete", digest)
    }

    async fn tag(&self, digest: &str, tag: &str) -> Result<()> {
        // The distribution API tags by putting the manifest bytes under the
        // tag reference. Manifest serialization is deterministic, so the
        // re-serialized bytes keep the digest stable.
        let (_, manifest) = self.get_manifest(digest).await?;
        let response = self
            .send(
                self.client
                    .put(self.url(&format!("manifests/{tag}")))
                    .header(reqwest::header::CONTENT_TYPE, MEDIA_TYPE_MANIFEST)
                    .body(manifest.to_bytes()),
                "manifest tag",
            )
            .await?;
        check_status(response.status(), "manifest tag", tag)
    }

    async fn untag(&self, tag: &str) -> Result<()> {
        let response = self
            .send(
                self.client.delete(self.url(&format!("manifests/{tag}"))),
                "manifest untag",
            )
            .await?;
        if response.status() == StatusCode::NOT_FOUND {
            return Ok(());
        }
        check_status(response.status(), "manifest untag", tag)
    }

    async fn referrers(&self, subject_digest: &str) -> Result<Vec<Descriptor>> {
        let response = self
            .send(
                self.client
                    .get(self.url(&format!("referrers/{subject_digest}"))),
                "referrers fetch",
            )
            .await?;
        if response.status() == StatusCode::NOT_FOUND {
            // Registries without referrers support report none.
            return Ok(Vec::new());
        }
        check_status(response.status(), "referrers fetch", subject_digest)?;

        #[derive(serde::Deserialize)]
        struct ReferrerIndex {
            #[serde(default)]
            manifests: Vec<Descriptor>,
        }

        let index: ReferrerIndex = response
            .json()
            .await
            .map_err(|e| Error::Internal(format!("registry returned invalid referrer index: {e}")))?;
        Ok(index.manifests)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn urls_are_rooted_at_the_repository() {
        let registry = HttpRegistry::new("http://localhost:5000/", "cairn/records");
        assert_eq!(
            registry.url("manifests/latest"),
            "http://localhost:5000/v2/cairn/records/manifests/latest"
        );
    }

    #[test]
    fn status_mapping_covers_the_taxonomy() {
        assert!(matches!(
            check_status(StatusCode::NOT_FOUND, "fetch", "x"),
            Err(Error::NotFound { .. })
        ));
        assert!(matches!(
            check_status(StatusCode::UNAUTHORIZED, "fetch", "x"),
            Err(Error::PermissionDenied(_))
        ));
        assert!(matches!(
            check_status(StatusCode::BAD_GATEWAY, "fetch", "x"),
            Err(Error::Unavailable { .. })
        ));
        assert!(matches!(
            check_status(StatusCode::IM_A_TEAPOT, "fetch", "x"),
            Err(Error::Internal(_))
        ));
        assert!(check_status(StatusCode::CREATED, "fetch", "x").is_ok());
    }
}
