//! Step executors: the pipeline work behind each catalog step.
//!
//! Most steps are thin wrappers over one backend endpoint. The handful of
//! local steps (template selection, theme building) never touch the
//! network. `default_registry` wires the full catalog.

pub mod deployment;
pub mod infrastructure;
pub mod planning;

use crate::engine::ExecutorRegistry;
use crate::errors::ExecutorError;
use crate::step;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

/// Default per-request timeout. Content generation is the slowest call in
/// the pipeline at several minutes.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(600);

/// JSON-over-HTTP client for the generation backend.
#[derive(Clone)]
pub struct ApiClient {
    http: reqwest::Client,
    base_url: String,
}

impl ApiClient {
    pub fn new(base_url: impl Into<String>) -> Self {
        let http = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .unwrap_or_default();
        Self {
            http,
            base_url: base_url.into(),
        }
    }

    fn endpoint(&self, path: &str) -> String {
        format!(
            "{}/{}",
            self.base_url.trim_end_matches('/'),
            path.trim_start_matches('/')
        )
    }

    /// POST a JSON body and parse a JSON response. Non-2xx statuses become
    /// `BackendStatus` errors carrying the response body.
    pub async fn post_json(&self, path: &str, body: &Value) -> Result<Value, ExecutorError> {
        let endpoint = self.endpoint(path);
        debug!(%endpoint, "backend request");

        let response = self
            .http
            .post(&endpoint)
            .json(body)
            .send()
            .await
            .map_err(|source| ExecutorError::Http {
                endpoint: endpoint.clone(),
                source,
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ExecutorError::BackendStatus {
                endpoint,
                status: status.as_u16(),
                body,
            });
        }

        response
            .json::<Value>()
            .await
            .map_err(|err| ExecutorError::MalformedResponse {
                endpoint,
                message: err.to_string(),
            })
    }
}

/// Build the standard registry covering every catalog step.
pub fn default_registry(api: ApiClient) -> ExecutorRegistry {
    let api = Arc::new(api);
    let mut registry = ExecutorRegistry::new();

    registry.register(
        step::CREATE_GITHUB_REPO,
        Arc::new(infrastructure::CreateGithubRepo::new(api.clone())),
    );
    registry.register(
        step::PROVISION_WORDPRESS_BACKEND,
        Arc::new(infrastructure::ProvisionWordpressBackend::new(api.clone())),
    );
    registry.register(
        step::PROVISION_SITE,
        Arc::new(infrastructure::ProvisionSite::new(api.clone())),
    );
    registry.register(
        step::SCRAPE_SITE,
        Arc::new(infrastructure::ScrapeSite::new(api.clone())),
    );
    registry.register(
        step::PREVENT_HOTLINKING,
        Arc::new(infrastructure::PreventHotlinking::new(api.clone())),
    );
    registry.register(
        step::CREATE_DEMO_REPO,
        Arc::new(infrastructure::CreateDemoRepo::new(api.clone())),
    );
    registry.register(
        step::PROVISION_CLOUDFLARE_PAGES,
        Arc::new(infrastructure::ProvisionCloudflarePages::new(api.clone())),
    );

    registry.register(
        step::CREATE_VECTOR_STORE,
        Arc::new(planning::CreateVectorStore::new(api.clone())),
    );
    registry.register(step::SELECT_TEMPLATE, Arc::new(planning::SelectTemplate));
    registry.register(
        step::ALLOCATE_CONTENT,
        Arc::new(planning::AllocateContent::new(api.clone())),
    );
    registry.register(
        step::GENERATE_SITEMAP,
        Arc::new(planning::GenerateSitemap::new(api.clone())),
    );
    registry.register(
        step::GENERATE_CONTENT,
        Arc::new(planning::GenerateContent::new(api.clone())),
    );
    registry.register(step::DOWNLOAD_THEME, Arc::new(planning::BuildTheme));
    registry.register(
        step::IMAGE_PICKER,
        Arc::new(planning::ImagePicker::new(api.clone())),
    );

    registry.register(
        step::UPLOAD_JSON_TO_GITHUB,
        Arc::new(deployment::UploadJsonToGithub::new(api.clone())),
    );
    registry.register(
        step::EXPORT_TO_WORDPRESS,
        Arc::new(deployment::ExportToWordpress::new(api.clone())),
    );
    registry.register(
        step::SECOND_PASS,
        Arc::new(deployment::SecondPass::new(api.clone())),
    );
    registry.register(
        step::UPLOAD_LOGO,
        Arc::new(deployment::UploadAsset::logo(api.clone())),
    );
    registry.register(
        step::UPLOAD_FAVICON,
        Arc::new(deployment::UploadAsset::favicon(api)),
    );

    registry
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn endpoint_joins_without_doubled_slashes() {
        let api = ApiClient::new("http://localhost:8000/");
        assert_eq!(
            api.endpoint("/scrape-site/"),
            "http://localhost:8000/scrape-site/"
        );
        let api = ApiClient::new("http://localhost:8000");
        assert_eq!(
            api.endpoint("scrape-site/"),
            "http://localhost:8000/scrape-site/"
        );
    }

    #[test]
    fn default_registry_covers_the_catalog() {
        let registry = default_registry(ApiClient::new("http://localhost:8000"));
        assert!(registry.validate(&crate::step::default_catalog()).is_ok());
    }
}
