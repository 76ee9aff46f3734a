//! Input/output contracts: where each step reads its input from and which
//! store keys it writes on success.
//!
//! Editing shows a step's declared *input* before it runs; a step never
//! lists its own output key as its input source.

use crate::step;
use serde_json::Value;
use std::collections::HashMap;

/// Declared data contract for one step.
#[derive(Debug, Clone)]
pub struct StepContract {
    /// Store key the step reads from. None when the step works from
    /// configuration alone.
    pub input_key: Option<&'static str>,
    /// Optional nested field within the input value (e.g. "pages").
    pub input_path: Option<&'static str>,
    /// Store keys written on success. Exactly one for every step except
    /// content allocation, which also writes its allocation summary.
    pub output_keys: &'static [&'static str],
    /// Whether the input may be replaced at a pre-step checkpoint.
    pub editable: bool,
    pub description: &'static str,
}

impl StepContract {
    const fn new(
        input_key: Option<&'static str>,
        input_path: Option<&'static str>,
        output_keys: &'static [&'static str],
        editable: bool,
        description: &'static str,
    ) -> Self {
        Self {
            input_key,
            input_path,
            output_keys,
            editable,
            description,
        }
    }

    /// The primary output key, i.e. where the step's result payload lands.
    pub fn primary_output(&self) -> &'static str {
        self.output_keys[0]
    }
}

/// The per-step contract table.
#[derive(Debug, Clone)]
pub struct ContractTable {
    map: HashMap<&'static str, StepContract>,
}

impl ContractTable {
    /// The standard table covering the full catalog.
    pub fn standard() -> Self {
        let mut map = HashMap::new();
        map.insert(
            step::CREATE_GITHUB_REPO,
            StepContract::new(
                None,
                None,
                &["githubRepoResult"],
                false,
                "No input data, repo name comes from the configured domain",
            ),
        );
        map.insert(
            step::PROVISION_WORDPRESS_BACKEND,
            StepContract::new(
                None,
                None,
                &["wordpressBackendResult"],
                false,
                "No input data, copies the WordPress template subscription",
            ),
        );
        map.insert(
            step::PROVISION_SITE,
            StepContract::new(
                None,
                None,
                &["provisionResult"],
                false,
                "No input data, uses site configuration",
            ),
        );
        map.insert(
            step::SCRAPE_SITE,
            StepContract::new(
                None,
                None,
                &["scrapeResult"],
                false,
                "No input data, uses the scrape domain from config",
            ),
        );
        map.insert(
            step::CREATE_VECTOR_STORE,
            StepContract::new(
                Some("scrapeResult"),
                Some("pages"),
                &["vectorStoreResult"],
                true,
                "Scraped pages to index in the vector store",
            ),
        );
        map.insert(
            step::SELECT_TEMPLATE,
            StepContract::new(
                None,
                None,
                &["templateResult"],
                false,
                "Template selection from config",
            ),
        );
        map.insert(
            step::ALLOCATE_CONTENT,
            StepContract::new(
                Some("vectorStoreResult"),
                None,
                &["allocatedSitemap", "allocationSummary"],
                false,
                "Vector store id for content allocation",
            ),
        );
        map.insert(
            step::GENERATE_SITEMAP,
            StepContract::new(
                Some("allocatedSitemap"),
                Some("pages"),
                &["sitemapResult"],
                true,
                "Allocated sitemap pages",
            ),
        );
        map.insert(
            step::GENERATE_CONTENT,
            StepContract::new(
                Some("sitemapResult"),
                Some("pages"),
                &["contentResult"],
                true,
                "Sitemap pages for content generation",
            ),
        );
        map.insert(
            step::DOWNLOAD_THEME,
            StepContract::new(
                Some("scrapeResult"),
                Some("designSystem"),
                &["themeResult"],
                true,
                "Design system extracted from the scraped site",
            ),
        );
        map.insert(
            step::IMAGE_PICKER,
            StepContract::new(
                Some("contentResult"),
                Some("pageData"),
                &["imagePickerResult"],
                true,
                "Generated page content with image placeholders",
            ),
        );
        map.insert(
            step::PREVENT_HOTLINKING,
            StepContract::new(
                Some("imagePickerResult"),
                None,
                &["hotlinkResult"],
                true,
                "Page data whose images are synced to S3 behind CloudFront",
            ),
        );
        map.insert(
            step::UPLOAD_JSON_TO_GITHUB,
            StepContract::new(
                Some("contentResult"),
                None,
                &["githubJsonResult"],
                true,
                "Pages, global data, and theme JSON to push to the repo",
            ),
        );
        map.insert(
            step::EXPORT_TO_WORDPRESS,
            StepContract::new(
                Some("imagePickerResult"),
                None,
                &["wordpressResult"],
                true,
                "Page data with updated images",
            ),
        );
        map.insert(
            step::SECOND_PASS,
            StepContract::new(
                None,
                None,
                &["secondPassResult"],
                false,
                "No input data, uses the WordPress API URL",
            ),
        );
        map.insert(
            step::UPLOAD_LOGO,
            StepContract::new(
                Some("themeResult"),
                Some("theme"),
                &["logoResult"],
                false,
                "Theme configuration with logo settings",
            ),
        );
        map.insert(
            step::UPLOAD_FAVICON,
            StepContract::new(
                Some("themeResult"),
                Some("theme"),
                &["faviconResult"],
                false,
                "Theme configuration with favicon settings",
            ),
        );
        map.insert(
            step::CREATE_DEMO_REPO,
            StepContract::new(
                None,
                None,
                &["demoRepoResult"],
                false,
                "No input data, repo name comes from the configured domain",
            ),
        );
        map.insert(
            step::PROVISION_CLOUDFLARE_PAGES,
            StepContract::new(
                Some("demoRepoResult"),
                None,
                &["cloudflarePagesResult"],
                false,
                "Demo repo to connect the Pages project to",
            ),
        );
        Self { map }
    }

    pub fn get(&self, step_id: &str) -> Option<&StepContract> {
        self.map.get(step_id)
    }

    /// Whether a step's input may be replaced before it runs.
    pub fn is_editable(&self, step_id: &str) -> bool {
        self.map
            .get(step_id)
            .is_some_and(|c| c.editable && c.input_key.is_some())
    }

    /// Resolve a step's declared input from a raw store value, applying
    /// the nested path when the contract declares one.
    pub fn extract_input(&self, step_id: &str, raw: Option<Value>) -> Option<Value> {
        let contract = self.map.get(step_id)?;
        contract.input_key?;
        let value = raw?;
        match contract.input_path {
            Some(path) => value.get(path).cloned(),
            None => Some(value),
        }
    }
}
