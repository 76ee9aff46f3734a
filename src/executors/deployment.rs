//! Deployment steps: pushing generated content to the site repo or the
//! WordPress backend, plus logo and favicon uploads.

use super::ApiClient;
use crate::engine::{StepContext, StepExecutor, StepOutput};
use crate::errors::ExecutorError;
use async_trait::async_trait;
use serde_json::json;
use std::sync::Arc;

/// Push pages, global data, and theme JSON into the site repository.
pub struct UploadJsonToGithub {
    api: Arc<ApiClient>,
}

impl UploadJsonToGithub {
    pub fn new(api: Arc<ApiClient>) -> Self {
        Self { api }
    }
}

#[async_trait]
impl StepExecutor for UploadJsonToGithub {
    async fn run(&self, ctx: StepContext) -> Result<StepOutput, ExecutorError> {
        let content = ctx.require_input("contentResult")?.clone();
        // Images may have been repopulated after content generation; prefer
        // the post-hotlinking page data when it exists.
        let pages = ctx
            .data
            .get("hotlinkResult")
            .await
            .or_else(|| content.get("pageData").cloned())
            .unwrap_or(content.clone());
        let global_data = content.get("globalData").cloned();
        let theme = ctx.data.get_path("themeResult", "theme").await;

        let body = json!({
            "domain": ctx.config.domain,
            "files": {
                "pages": pages,
                "globalData": global_data,
                "theme": theme,
            },
        });
        let result = self
            .api
            .post_json("/update-github-repo-file/", &body)
            .await?;
        Ok(StepOutput::new(result))
    }
}

/// Push generated content through the WordPress REST API.
pub struct ExportToWordpress {
    api: Arc<ApiClient>,
}

impl ExportToWordpress {
    pub fn new(api: Arc<ApiClient>) -> Self {
        Self { api }
    }
}

#[async_trait]
impl StepExecutor for ExportToWordpress {
    async fn run(&self, ctx: StepContext) -> Result<StepOutput, ExecutorError> {
        let page_data = ctx.require_input("imagePickerResult")?.clone();
        let body = json!({
            "domain": ctx.config.domain,
            "pageData": page_data,
        });
        let result = self.api.post_json("/update-wordpress/", &body).await?;
        Ok(StepOutput::new(result))
    }
}

/// WordPress cleanup pass: IDs, accessibility, image sizes.
pub struct SecondPass {
    api: Arc<ApiClient>,
}

impl SecondPass {
    pub fn new(api: Arc<ApiClient>) -> Self {
        Self { api }
    }
}

#[async_trait]
impl StepExecutor for SecondPass {
    async fn run(&self, ctx: StepContext) -> Result<StepOutput, ExecutorError> {
        let body = json!({ "domain": ctx.config.domain });
        let result = self.api.post_json("/wordpress-second-pass/", &body).await?;
        Ok(StepOutput::new(result))
    }
}

/// Logo and favicon uploads share one backend endpoint, keyed by asset kind.
pub struct UploadAsset {
    api: Arc<ApiClient>,
    kind: &'static str,
}

impl UploadAsset {
    pub fn logo(api: Arc<ApiClient>) -> Self {
        Self { api, kind: "logo" }
    }

    pub fn favicon(api: Arc<ApiClient>) -> Self {
        Self {
            api,
            kind: "favicon",
        }
    }
}

#[async_trait]
impl StepExecutor for UploadAsset {
    async fn run(&self, ctx: StepContext) -> Result<StepOutput, ExecutorError> {
        let theme = ctx.require_input("themeResult")?.clone();
        let body = json!({
            "domain": ctx.config.domain,
            "asset": self.kind,
            "theme": theme,
        });
        let result = self
            .api
            .post_json("/update-github-repo-file-upload/", &body)
            .await?;
        Ok(StepOutput::new(result))
    }
}
