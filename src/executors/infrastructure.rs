//! Infrastructure steps: repositories, hosting, scraping, and image CDN.

use super::ApiClient;
use crate::engine::{StepContext, StepExecutor, StepOutput};
use crate::errors::ExecutorError;
use async_trait::async_trait;
use serde_json::{Value, json};
use std::sync::Arc;

/// Create the site repository from the template repo.
pub struct CreateGithubRepo {
    api: Arc<ApiClient>,
}

impl CreateGithubRepo {
    pub fn new(api: Arc<ApiClient>) -> Self {
        Self { api }
    }
}

#[async_trait]
impl StepExecutor for CreateGithubRepo {
    async fn run(&self, ctx: StepContext) -> Result<StepOutput, ExecutorError> {
        let body = json!({
            "domain": ctx.config.domain,
            "template": ctx.config.template,
        });
        let result = self
            .api
            .post_json("/create-github-repo-from-template/", &body)
            .await?;
        Ok(StepOutput::new(result))
    }
}

/// Copy the WordPress template hosting subscription for the new site.
pub struct ProvisionWordpressBackend {
    api: Arc<ApiClient>,
}

impl ProvisionWordpressBackend {
    pub fn new(api: Arc<ApiClient>) -> Self {
        Self { api }
    }
}

#[async_trait]
impl StepExecutor for ProvisionWordpressBackend {
    async fn run(&self, ctx: StepContext) -> Result<StepOutput, ExecutorError> {
        let body = json!({
            "domain": ctx.config.domain,
            "template": ctx.config.template,
        });
        let result = self.api.post_json("/copy-subscription", &body).await?;
        Ok(StepOutput::new(result))
    }
}

/// Create the S3 bucket and the dist/assets CloudFront distributions.
pub struct ProvisionSite {
    api: Arc<ApiClient>,
}

impl ProvisionSite {
    pub fn new(api: Arc<ApiClient>) -> Self {
        Self { api }
    }
}

#[async_trait]
impl StepExecutor for ProvisionSite {
    async fn run(&self, ctx: StepContext) -> Result<StepOutput, ExecutorError> {
        let body = json!({ "domain": ctx.config.domain });
        let result = self.api.post_json("/provision/", &body).await?;
        Ok(StepOutput::new(result))
    }
}

/// Scrape the source site's content and design system.
pub struct ScrapeSite {
    api: Arc<ApiClient>,
}

impl ScrapeSite {
    pub fn new(api: Arc<ApiClient>) -> Self {
        Self { api }
    }
}

/// A scrape with no pages cannot drive the rest of the pipeline.
fn require_pages(result: &Value) -> Result<(), ExecutorError> {
    let empty = result
        .get("pages")
        .and_then(Value::as_array)
        .is_none_or(|pages| pages.is_empty());
    if empty {
        return Err(ExecutorError::EmptyResult(
            "No pages found in scrape results".to_string(),
        ));
    }
    Ok(())
}

#[async_trait]
impl StepExecutor for ScrapeSite {
    async fn run(&self, ctx: StepContext) -> Result<StepOutput, ExecutorError> {
        let body = json!({
            "domain": ctx.config.effective_scrape_domain(),
            "site_type": ctx.config.site_type,
        });
        let result = self.api.post_json("/scrape-site/", &body).await?;
        require_pages(&result)?;
        Ok(StepOutput::new(result))
    }
}

/// Sync scraped images into S3 and rewrite references to CloudFront URLs.
pub struct PreventHotlinking {
    api: Arc<ApiClient>,
}

impl PreventHotlinking {
    pub fn new(api: Arc<ApiClient>) -> Self {
        Self { api }
    }
}

#[async_trait]
impl StepExecutor for PreventHotlinking {
    async fn run(&self, ctx: StepContext) -> Result<StepOutput, ExecutorError> {
        let page_data = ctx.require_input("imagePickerResult")?.clone();
        let theme = ctx.data.get_path("themeResult", "theme").await;
        let body = json!({
            "domain": ctx.config.domain,
            "pageData": page_data,
            "theme": theme,
        });
        let result = self.api.post_json("/sync-scraped-images/", &body).await?;
        Ok(StepOutput::new(result))
    }
}

/// Create the demo repository in the demo organization.
pub struct CreateDemoRepo {
    api: Arc<ApiClient>,
}

impl CreateDemoRepo {
    pub fn new(api: Arc<ApiClient>) -> Self {
        Self { api }
    }
}

#[async_trait]
impl StepExecutor for CreateDemoRepo {
    async fn run(&self, ctx: StepContext) -> Result<StepOutput, ExecutorError> {
        let body = json!({
            "domain": ctx.config.domain,
            "template": ctx.config.template,
        });
        let result = self.api.post_json("/create-demo-repo/", &body).await?;
        Ok(StepOutput::new(result))
    }
}

/// Create the Cloudflare Pages project and connect it to the demo repo.
pub struct ProvisionCloudflarePages {
    api: Arc<ApiClient>,
}

impl ProvisionCloudflarePages {
    pub fn new(api: Arc<ApiClient>) -> Self {
        Self { api }
    }
}

#[async_trait]
impl StepExecutor for ProvisionCloudflarePages {
    async fn run(&self, ctx: StepContext) -> Result<StepOutput, ExecutorError> {
        let repo = ctx.require_input("demoRepoResult")?.clone();
        let body = json!({
            "domain": ctx.config.domain,
            "repo": repo,
        });
        let result = self
            .api
            .post_json("/provision-cloudflare-pages/", &body)
            .await?;
        Ok(StepOutput::new(result))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scrape_without_pages_is_an_empty_result() {
        let err = require_pages(&json!({"pages": []})).unwrap_err();
        assert!(err.is_empty_result());

        let err = require_pages(&json!({"status": "ok"})).unwrap_err();
        assert!(err.is_empty_result());

        assert!(require_pages(&json!({"pages": [{"url": "/"}]})).is_ok());
    }
}
