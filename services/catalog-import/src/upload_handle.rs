use crate::error::{describe, PipelineError};
use crate::model::{IntakeLayout, UploadIntent};
use crate::ports::ObjectStore;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, instrument};

/// Uploads are always signed for this content type
pub const CSV_CONTENT_TYPE: &str = "text/csv";

/// A signed, single-object write handle
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadHandle {
    pub url: String,
    pub container: String,
    pub key: String,
    pub expires_at: DateTime<Utc>,
}

/// Mints write handles scoped to `{intake}/{fileName}`
pub struct UploadHandleIssuer {
    store: Arc<dyn ObjectStore>,
    container: Option<String>,
    layout: IntakeLayout,
    ttl: Duration,
}

impl UploadHandleIssuer {
    pub fn new(
        store: Arc<dyn ObjectStore>,
        container: Option<String>,
        layout: IntakeLayout,
        ttl: Duration,
    ) -> Self {
        Self {
            store,
            container: container.filter(|c| !c.trim().is_empty()),
            layout,
            ttl,
        }
    }

    /// Issue a handle for `file_name`.
    ///
    /// Nothing is written to the store; the object appears once the client
    /// uses the URL.
    #[instrument(skip(self))]
    pub async fn issue(&self, file_name: Option<&str>) -> Result<UploadHandle, PipelineError> {
        let intent = UploadIntent::parse(file_name)?;

        let container = self.container.as_deref().ok_or_else(|| {
            PipelineError::Configuration("INTAKE_CONTAINER not set in environment.".to_string())
        })?;

        let key = intent.container_path(&self.layout);

        let url = self
            .store
            .presign_put(container, &key, CSV_CONTENT_TYPE, self.ttl)
            .await
            .map_err(|e| {
                error!(error = %describe(&e), key = %key, "Failed to sign upload handle");
                PipelineError::Signing {
                    key: key.clone(),
                    message: describe(&e),
                }
            })?;

        let expires_at = Utc::now()
            + chrono::Duration::from_std(self.ttl).unwrap_or_else(|_| chrono::Duration::zero());

        metrics::counter!("import.upload_handles.issued").increment(1);
        info!(container = %container, key = %key, ttl_secs = self.ttl.as_secs(), "Issued upload handle");

        Ok(UploadHandle {
            url,
            container: container.to_string(),
            key,
            expires_at,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ports::MockObjectStore;
    use mockall::predicate::eq;

    fn issuer(store: MockObjectStore, container: Option<&str>) -> UploadHandleIssuer {
        UploadHandleIssuer::new(
            Arc::new(store),
            container.map(str::to_string),
            IntakeLayout::default(),
            Duration::from_secs(60),
        )
    }

    #[tokio::test]
    async fn test_issue_signs_intake_key_as_csv() {
        let mut store = MockObjectStore::new();
        store
            .expect_presign_put()
            .with(
                eq("imports"),
                eq("intake/products.csv"),
                eq(CSV_CONTENT_TYPE),
                eq(Duration::from_secs(60)),
            )
            .times(1)
            .returning(|_, _, _, _| Ok("https://signed.url/put".to_string()));

        let handle = issuer(store, Some("imports"))
            .issue(Some("products.csv"))
            .await
            .unwrap();

        assert_eq!(handle.url, "https://signed.url/put");
        assert_eq!(handle.key, "intake/products.csv");
        assert!(handle.expires_at > Utc::now());
    }

    #[tokio::test]
    async fn test_missing_name_is_validation_error() {
        let mut store = MockObjectStore::new();
        store.expect_presign_put().never();

        let err = issuer(store, Some("imports")).issue(None).await.unwrap_err();
        assert_eq!(
            err,
            PipelineError::Validation("Missing \"name\" query parameter.".to_string())
        );
        assert_eq!(err.status_code(), 400);
    }

    #[tokio::test]
    async fn test_missing_container_is_configuration_error() {
        let mut store = MockObjectStore::new();
        store.expect_presign_put().never();

        let err = issuer(store, Some("  "))
            .issue(Some("products.csv"))
            .await
            .unwrap_err();
        assert!(matches!(err, PipelineError::Configuration(_)));
        assert_eq!(err.status_code(), 500);
        assert!(err.to_string().contains("INTAKE_CONTAINER not set"));
    }

    #[tokio::test]
    async fn test_signing_failure_is_server_error() {
        let mut store = MockObjectStore::new();
        store
            .expect_presign_put()
            .returning(|_, _, _, _| Err(anyhow::anyhow!("credentials expired")));

        let result = issuer(store, Some("imports")).issue(Some("a.csv")).await;
        let err = tokio_test::assert_err!(result);
        assert!(matches!(err, PipelineError::Signing { .. }));
        assert_eq!(err.status_code(), 500);
    }
}
