//! Planning steps: vector store, template selection, content allocation,
//! sitemap and content generation, theme building, and image selection.

use super::ApiClient;
use crate::config::{AVAILABLE_TEMPLATES, is_known_template};
use crate::engine::{StepContext, StepExecutor, StepOutput};
use crate::errors::ExecutorError;
use async_trait::async_trait;
use serde_json::{Value, json};
use std::sync::Arc;

/// Index the scraped pages for content allocation.
pub struct CreateVectorStore {
    api: Arc<ApiClient>,
}

impl CreateVectorStore {
    pub fn new(api: Arc<ApiClient>) -> Self {
        Self { api }
    }
}

#[async_trait]
impl StepExecutor for CreateVectorStore {
    async fn run(&self, ctx: StepContext) -> Result<StepOutput, ExecutorError> {
        let pages = ctx.require_input("scrapeResult")?.clone();
        let body = json!({
            "domain": ctx.config.domain,
            "pages": pages,
        });
        let result = self.api.post_json("/create-vector-store/", &body).await?;
        Ok(StepOutput::new(result))
    }
}

/// Validate the configured template against the known set. Local step.
pub struct SelectTemplate;

#[async_trait]
impl StepExecutor for SelectTemplate {
    async fn run(&self, ctx: StepContext) -> Result<StepOutput, ExecutorError> {
        let template = &ctx.config.template;
        if !is_known_template(template) {
            return Err(ExecutorError::Failed(format!(
                "Unknown template '{template}', expected one of {AVAILABLE_TEMPLATES:?}"
            )));
        }
        Ok(StepOutput::new(json!({
            "template": template,
            "availableTemplates": AVAILABLE_TEMPLATES,
        })))
    }
}

/// Map scraped markdown onto the template sitemap using the vector store.
pub struct AllocateContent {
    api: Arc<ApiClient>,
}

impl AllocateContent {
    pub fn new(api: Arc<ApiClient>) -> Self {
        Self { api }
    }
}

#[async_trait]
impl StepExecutor for AllocateContent {
    async fn run(&self, ctx: StepContext) -> Result<StepOutput, ExecutorError> {
        let vector_store = ctx.require_input("vectorStoreResult")?.clone();
        let body = json!({
            "domain": ctx.config.domain,
            "template": ctx.config.template,
            "vectorStore": vector_store,
        });
        let result = self
            .api
            .post_json("/allocate-content-second-pass/", &body)
            .await?;

        // The backend returns the allocated sitemap alongside an allocation
        // summary; older deployments return the sitemap bare.
        let mut output = match result.get("sitemap") {
            Some(sitemap) => StepOutput::new(sitemap.clone()),
            None => StepOutput::new(result.clone()),
        };
        if let Some(summary) = result
            .get("summary")
            .or_else(|| result.get("allocationSummary"))
        {
            output = output.with_extra("allocationSummary", summary.clone());
        }
        Ok(output)
    }
}

/// Generate the page structure in strict template mode.
pub struct GenerateSitemap {
    api: Arc<ApiClient>,
}

impl GenerateSitemap {
    pub fn new(api: Arc<ApiClient>) -> Self {
        Self { api }
    }
}

#[async_trait]
impl StepExecutor for GenerateSitemap {
    async fn run(&self, ctx: StepContext) -> Result<StepOutput, ExecutorError> {
        let pages = ctx.require_input("allocatedSitemap")?.clone();
        let body = json!({
            "domain": ctx.config.domain,
            "template": ctx.config.template,
            "pages": pages,
            "strictTemplate": true,
        });
        let result = self
            .api
            .post_json("/generate-sitemap-from-scraped/", &body)
            .await?;
        Ok(StepOutput::new(result))
    }
}

/// Generate page and global JSON content. The two backend calls are
/// independent and run in parallel.
pub struct GenerateContent {
    api: Arc<ApiClient>,
}

impl GenerateContent {
    pub fn new(api: Arc<ApiClient>) -> Self {
        Self { api }
    }
}

#[async_trait]
impl StepExecutor for GenerateContent {
    async fn run(&self, ctx: StepContext) -> Result<StepOutput, ExecutorError> {
        let pages = ctx.require_input("sitemapResult")?.clone();
        let page_body = json!({
            "domain": ctx.config.domain,
            "template": ctx.config.template,
            "site_type": ctx.config.site_type,
            "pages": pages,
        });
        let global_body = json!({
            "domain": ctx.config.domain,
            "template": ctx.config.template,
        });

        let (page_data, global_data) = tokio::join!(
            self.api.post_json("/generate-content-for-scraped/", &page_body),
            self.api.post_json("/generate-global/", &global_body),
        );

        Ok(StepOutput::new(json!({
            "pageData": page_data?,
            "globalData": global_data?,
        })))
    }
}

/// Build the theme configuration from the scraped design system. Local step.
pub struct BuildTheme;

#[async_trait]
impl StepExecutor for BuildTheme {
    async fn run(&self, ctx: StepContext) -> Result<StepOutput, ExecutorError> {
        let design = ctx.require_input("scrapeResult")?.clone();
        let theme = build_theme(&ctx.config.template, &design);
        Ok(StepOutput::new(json!({ "theme": theme })))
    }
}

/// Assemble a theme object, falling back to empty sections when the design
/// system is missing pieces.
fn build_theme(template: &str, design: &Value) -> Value {
    json!({
        "template": template,
        "colors": design.get("colors").cloned().unwrap_or_else(|| json!({})),
        "typography": design.get("typography").cloned().unwrap_or_else(|| json!({})),
        "logoUrl": design.get("logo").cloned().unwrap_or(Value::Null),
    })
}

/// Repopulate page images, preserving staff photos when configured.
pub struct ImagePicker {
    api: Arc<ApiClient>,
}

impl ImagePicker {
    pub fn new(api: Arc<ApiClient>) -> Self {
        Self { api }
    }
}

#[async_trait]
impl StepExecutor for ImagePicker {
    async fn run(&self, ctx: StepContext) -> Result<StepOutput, ExecutorError> {
        let page_data = ctx.require_input("contentResult")?.clone();
        let body = json!({
            "domain": ctx.config.domain,
            "pageData": page_data,
            "preserveStaffPhotos": ctx.config.preserve_photos,
        });
        let result = self
            .api
            .post_json("/adobe/image-agent/find-images", &body)
            .await?;
        Ok(StepOutput::new(result))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{EngineConfig, SiteConfig};
    use crate::engine::{DataHandle, EngineState};
    use std::sync::Arc;
    use tokio::sync::Mutex;

    fn context(template: &str, input: Option<Value>) -> StepContext {
        let config = SiteConfig::new("example.com", template, "dental");
        let state = Arc::new(Mutex::new(EngineState::new(EngineConfig {
            site: config.clone(),
            execution: Default::default(),
        })));
        StepContext {
            step_id: "select-template".to_string(),
            config,
            input,
            data: DataHandle::new(state),
        }
    }

    #[tokio::test]
    async fn select_template_accepts_known_templates() {
        let output = SelectTemplate.run(context("stinson", None)).await.unwrap();
        assert_eq!(output.primary["template"], "stinson");
    }

    #[tokio::test]
    async fn select_template_rejects_unknown_templates() {
        let err = SelectTemplate
            .run(context("notatemplate", None))
            .await
            .unwrap_err();
        assert!(matches!(err, ExecutorError::Failed(_)));
    }

    #[tokio::test]
    async fn build_theme_falls_back_on_sparse_design_systems() {
        let design = json!({"colors": {"primary": "#123456"}});
        let output = BuildTheme
            .run(context("stinson", Some(design)))
            .await
            .unwrap();
        assert_eq!(output.primary["theme"]["colors"]["primary"], "#123456");
        assert_eq!(output.primary["theme"]["typography"], json!({}));
        assert_eq!(output.primary["theme"]["logoUrl"], Value::Null);
    }

    #[tokio::test]
    async fn build_theme_requires_a_design_system() {
        let err = BuildTheme.run(context("stinson", None)).await.unwrap_err();
        assert!(matches!(err, ExecutorError::MissingInput { .. }));
    }
}
