//! Step definitions: the pipeline catalog, statuses, and execution orders.

use crate::config::DeploymentTarget;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

pub const CREATE_GITHUB_REPO: &str = "create-github-repo";
pub const PROVISION_WORDPRESS_BACKEND: &str = "provision-wordpress-backend";
pub const PROVISION_SITE: &str = "provision-site";
pub const SCRAPE_SITE: &str = "scrape-site";
pub const CREATE_VECTOR_STORE: &str = "create-vector-store";
pub const SELECT_TEMPLATE: &str = "select-template";
pub const GENERATE_SITEMAP: &str = "generate-sitemap";
pub const ALLOCATE_CONTENT: &str = "allocate-content";
pub const GENERATE_CONTENT: &str = "generate-content";
pub const DOWNLOAD_THEME: &str = "download-theme";
pub const IMAGE_PICKER: &str = "image-picker";
pub const PREVENT_HOTLINKING: &str = "prevent-hotlinking";
pub const UPLOAD_JSON_TO_GITHUB: &str = "upload-json-to-github";
pub const EXPORT_TO_WORDPRESS: &str = "export-to-wordpress";
pub const SECOND_PASS: &str = "second-pass";
pub const UPLOAD_LOGO: &str = "upload-logo";
pub const UPLOAD_FAVICON: &str = "upload-favicon";
pub const CREATE_DEMO_REPO: &str = "create-demo-repo";
pub const PROVISION_CLOUDFLARE_PAGES: &str = "provision-cloudflare-pages";

/// Lifecycle status of a step.
///
/// Legal transitions: pending -> in_progress -> {completed | error}.
/// A pending or error step may be skipped, and an error step re-enters
/// in_progress directly, so rerunning a failed step needs no explicit
/// retry. The only other backward edge is enable/retry back to pending.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum StepStatus {
    #[default]
    Pending,
    InProgress,
    Completed,
    Error,
    Skipped,
}

impl StepStatus {
    /// Check if the step has reached a terminal state.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Error | Self::Skipped)
    }

    /// Completed or skipped, i.e. counts as done for dependency purposes.
    pub fn is_settled(&self) -> bool {
        matches!(self, Self::Completed | Self::Skipped)
    }

    pub fn is_success(&self) -> bool {
        matches!(self, Self::Completed)
    }

    /// Whether moving from `self` to `to` is a legal transition.
    pub fn can_transition_to(&self, to: StepStatus) -> bool {
        use StepStatus::*;
        matches!(
            (self, to),
            (Pending, InProgress)
                | (Pending, Skipped)
                | (InProgress, Completed)
                | (InProgress, Error)
                | (Error, InProgress)
                | (Error, Pending)
                | (Error, Skipped)
                | (Completed, Pending)
                | (Skipped, Pending)
        )
    }
}

/// Pipeline phase a step belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepPhase {
    /// Cloud resources and hosting.
    Infrastructure,
    /// Content generation and site structure.
    Planning,
    /// Pushing content to production.
    Deployment,
}

impl StepPhase {
    pub fn label(&self) -> &'static str {
        match self {
            Self::Infrastructure => "Infrastructure",
            Self::Planning => "Planning",
            Self::Deployment => "Deployment",
        }
    }
}

/// One unit of pipeline work.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Step {
    pub id: String,
    pub name: String,
    pub description: String,
    pub phase: StepPhase,
    pub status: StepStatus,
    pub depends_on: Vec<String>,
    pub estimated_duration_secs: u64,
    pub optional: bool,
    /// Primary output payload of the last successful run.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Error from the previous attempt, kept across a retry reset.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
}

impl Step {
    pub fn new(
        id: &str,
        name: &str,
        description: &str,
        phase: StepPhase,
        depends_on: &[&str],
        estimated_duration_secs: u64,
    ) -> Self {
        Self {
            id: id.to_string(),
            name: name.to_string(),
            description: description.to_string(),
            phase,
            status: StepStatus::Pending,
            depends_on: depends_on.iter().map(|s| s.to_string()).collect(),
            estimated_duration_secs,
            optional: false,
            result: None,
            error: None,
            last_error: None,
            started_at: None,
            completed_at: None,
        }
    }

    pub fn optional(mut self) -> Self {
        self.optional = true;
        self
    }

    /// Steps that are inactive unless the operator (or a target switch)
    /// enables them start out skipped.
    pub fn initially_skipped(mut self) -> Self {
        self.status = StepStatus::Skipped;
        self
    }

    /// Wall-clock duration of the last run, if it finished.
    pub fn actual_duration_secs(&self) -> Option<i64> {
        match (self.started_at, self.completed_at) {
            (Some(start), Some(end)) => Some((end - start).num_seconds()),
            _ => None,
        }
    }
}

/// The full pipeline catalog in declaration order.
pub fn default_catalog() -> Vec<Step> {
    use StepPhase::*;
    vec![
        Step::new(
            CREATE_GITHUB_REPO,
            "Create GitHub Repo",
            "Create GitHub repository from template",
            Infrastructure,
            &[],
            15,
        ),
        Step::new(
            PROVISION_WORDPRESS_BACKEND,
            "Provision WordPress Backend",
            "Copy hosting subscription for the WordPress API backend (WordPress templates only)",
            Infrastructure,
            &[],
            120,
        )
        .optional()
        .initially_skipped(),
        Step::new(
            PROVISION_SITE,
            "Provision Site",
            "Create S3 bucket and CloudFront distributions (dist + assets)",
            Infrastructure,
            &[CREATE_GITHUB_REPO],
            45,
        ),
        Step::new(
            SCRAPE_SITE,
            "Scrape Site",
            "Scrape existing site content and design system",
            Planning,
            &[],
            120,
        ),
        Step::new(
            CREATE_VECTOR_STORE,
            "Create Vector Store",
            "Index scraped content for content allocation",
            Planning,
            &[SCRAPE_SITE],
            30,
        ),
        Step::new(
            SELECT_TEMPLATE,
            "Select Template",
            "Choose from the available templates",
            Planning,
            &[CREATE_VECTOR_STORE],
            2,
        ),
        Step::new(
            ALLOCATE_CONTENT,
            "Allocate Content",
            "Map scraped markdown onto the template sitemap using the vector store",
            Planning,
            &[CREATE_VECTOR_STORE, SELECT_TEMPLATE],
            45,
        ),
        Step::new(
            GENERATE_SITEMAP,
            "Generate Sitemap",
            "Generate page structure and hierarchy (strict template mode)",
            Planning,
            &[ALLOCATE_CONTENT],
            30,
        ),
        Step::new(
            GENERATE_CONTENT,
            "Generate Content",
            "Generate page and global JSON content",
            Planning,
            &[GENERATE_SITEMAP],
            300,
        ),
        Step::new(
            DOWNLOAD_THEME,
            "Build Theme",
            "Build theme configuration from the scraped design system",
            Planning,
            &[SCRAPE_SITE],
            5,
        ),
        Step::new(
            IMAGE_PICKER,
            "Image Picker",
            "Update images while preserving staff photos",
            Planning,
            &[GENERATE_CONTENT],
            60,
        ),
        Step::new(
            PREVENT_HOTLINKING,
            "Prevent Hotlinking",
            "Sync images to S3 and rewrite references to CloudFront-only URLs",
            Infrastructure,
            &[PROVISION_SITE, IMAGE_PICKER, DOWNLOAD_THEME],
            15,
        ),
        Step::new(
            UPLOAD_JSON_TO_GITHUB,
            "Upload JSON to GitHub",
            "Upload pages, global data, and theme JSON to the site repo (JSON templates only)",
            Deployment,
            &[CREATE_GITHUB_REPO, PREVENT_HOTLINKING],
            20,
        )
        .optional(),
        Step::new(
            EXPORT_TO_WORDPRESS,
            "Export to WordPress",
            "Push content via the REST API (WordPress templates only)",
            Deployment,
            &[GENERATE_CONTENT, IMAGE_PICKER],
            60,
        )
        .optional()
        .initially_skipped(),
        Step::new(
            SECOND_PASS,
            "Second Pass",
            "Fix IDs, accessibility, and image sizes (WordPress templates only)",
            Deployment,
            &[EXPORT_TO_WORDPRESS],
            45,
        )
        .optional()
        .initially_skipped(),
        Step::new(
            UPLOAD_LOGO,
            "Upload Logo",
            "Upload PNG logo with header color detection",
            Deployment,
            &[DOWNLOAD_THEME],
            15,
        )
        .optional()
        .initially_skipped(),
        Step::new(
            UPLOAD_FAVICON,
            "Upload Favicon",
            "Upload site favicon",
            Deployment,
            &[DOWNLOAD_THEME],
            10,
        )
        .optional()
        .initially_skipped(),
        Step::new(
            CREATE_DEMO_REPO,
            "Create Demo Repository",
            "Create GitHub repository in the demo organization",
            Infrastructure,
            &[],
            15,
        )
        .optional()
        .initially_skipped(),
        Step::new(
            PROVISION_CLOUDFLARE_PAGES,
            "Provision Cloudflare Pages",
            "Create Cloudflare Pages project and connect it to the demo repo",
            Infrastructure,
            &[CREATE_DEMO_REPO],
            30,
        )
        .optional()
        .initially_skipped(),
    ]
}

/// Fixed execution order for production (S3 + CloudFront) runs.
pub fn production_execution_order() -> Vec<&'static str> {
    vec![
        CREATE_GITHUB_REPO,
        PROVISION_WORDPRESS_BACKEND,
        PROVISION_SITE,
        SCRAPE_SITE,
        CREATE_VECTOR_STORE,
        SELECT_TEMPLATE,
        ALLOCATE_CONTENT,
        GENERATE_SITEMAP,
        GENERATE_CONTENT,
        DOWNLOAD_THEME,
        IMAGE_PICKER,
        PREVENT_HOTLINKING,
        UPLOAD_JSON_TO_GITHUB,
        EXPORT_TO_WORDPRESS,
        SECOND_PASS,
        UPLOAD_LOGO,
        UPLOAD_FAVICON,
    ]
}

/// Fixed execution order for demo (Cloudflare Pages) runs. Demo sites keep
/// images hotlinked, so hotlink prevention is absent from the order.
pub fn demo_execution_order() -> Vec<&'static str> {
    vec![
        CREATE_DEMO_REPO,
        SCRAPE_SITE,
        CREATE_VECTOR_STORE,
        SELECT_TEMPLATE,
        ALLOCATE_CONTENT,
        GENERATE_SITEMAP,
        GENERATE_CONTENT,
        DOWNLOAD_THEME,
        IMAGE_PICKER,
        UPLOAD_JSON_TO_GITHUB,
        PROVISION_CLOUDFLARE_PAGES,
    ]
}

pub fn execution_order_for(target: DeploymentTarget) -> Vec<&'static str> {
    match target {
        DeploymentTarget::Production => production_execution_order(),
        DeploymentTarget::Demo => demo_execution_order(),
    }
}

/// Sum of estimated durations across the catalog.
pub fn total_estimated_duration_secs(steps: &[Step]) -> u64 {
    steps.iter().map(|s| s.estimated_duration_secs).sum()
}
