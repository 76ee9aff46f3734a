//! Engine and site configuration.

use serde::{Deserialize, Serialize};

/// Templates the backend knows how to render.
pub const AVAILABLE_TEMPLATES: &[&str] = &[
    "stinson",
    "haightashbury",
    "bayarea",
    "calistoga",
    "napa",
    "sonoma",
    "marin",
    "mendocino",
];

/// Fallback when a roster names an unknown template.
pub const DEFAULT_TEMPLATE: &str = "stinson";

/// Where the finished site is deployed. Controls which provisioning steps
/// are active and which execution order the automatic runner uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum DeploymentTarget {
    /// S3 + CloudFront production deployment.
    #[default]
    Production,
    /// Cloudflare Pages demo deployment.
    Demo,
}

/// Per-site configuration. Survives a workflow reset.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct SiteConfig {
    /// Target domain for the generated site.
    pub domain: String,
    /// Template id, one of `AVAILABLE_TEMPLATES`.
    pub template: String,
    /// Free-form site category (e.g. "dental").
    pub site_type: String,
    /// Domain to scrape content from, when different from `domain`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scrape_domain: Option<String>,
    pub deployment_target: DeploymentTarget,
    /// Keep original staff photos when repopulating images.
    pub preserve_photos: bool,
}

impl SiteConfig {
    pub fn new(domain: &str, template: &str, site_type: &str) -> Self {
        Self {
            domain: domain.to_string(),
            template: template.to_string(),
            site_type: site_type.to_string(),
            scrape_domain: None,
            deployment_target: DeploymentTarget::default(),
            preserve_photos: true,
        }
    }

    pub fn with_scrape_domain(mut self, scrape_domain: Option<String>) -> Self {
        self.scrape_domain = scrape_domain;
        self
    }

    pub fn with_deployment_target(mut self, target: DeploymentTarget) -> Self {
        self.deployment_target = target;
        self
    }

    /// The domain content is scraped from.
    pub fn effective_scrape_domain(&self) -> &str {
        self.scrape_domain.as_deref().unwrap_or(&self.domain)
    }
}

/// Behavior switches for a run. Captured once when a run starts.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionConfig {
    /// Pause after every successful step for operator review.
    pub intervention_enabled: bool,
    /// Pause before editable steps to allow input replacement.
    pub pre_step_edit_enabled: bool,
    /// Abort the automatic run on the first hard failure.
    pub stop_on_error: bool,
    /// Delay between automatic steps, in milliseconds.
    pub step_delay_ms: u64,
    /// Delay between batch sites, in milliseconds.
    pub site_delay_ms: u64,
}

impl Default for ExecutionConfig {
    fn default() -> Self {
        Self {
            intervention_enabled: false,
            pre_step_edit_enabled: false,
            stop_on_error: true,
            step_delay_ms: 500,
            site_delay_ms: 2000,
        }
    }
}

impl ExecutionConfig {
    pub fn with_intervention(mut self, enabled: bool) -> Self {
        self.intervention_enabled = enabled;
        self
    }

    pub fn with_pre_step_edit(mut self, enabled: bool) -> Self {
        self.pre_step_edit_enabled = enabled;
        self
    }

    pub fn with_stop_on_error(mut self, stop: bool) -> Self {
        self.stop_on_error = stop;
        self
    }

    pub fn with_step_delay_ms(mut self, ms: u64) -> Self {
        self.step_delay_ms = ms;
        self
    }

    pub fn with_site_delay_ms(mut self, ms: u64) -> Self {
        self.site_delay_ms = ms;
        self
    }
}

/// Top-level engine configuration.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct EngineConfig {
    pub site: SiteConfig,
    pub execution: ExecutionConfig,
}

/// Check a template id against the known set.
pub fn is_known_template(template: &str) -> bool {
    AVAILABLE_TEMPLATES.contains(&template)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stop_on_error_defaults_to_true() {
        assert!(ExecutionConfig::default().stop_on_error);
    }

    #[test]
    fn scrape_domain_falls_back_to_domain() {
        let config = SiteConfig::new("newsite.com", "stinson", "dental");
        assert_eq!(config.effective_scrape_domain(), "newsite.com");

        let config = config.with_scrape_domain(Some("oldsite.com".to_string()));
        assert_eq!(config.effective_scrape_domain(), "oldsite.com");
    }

    #[test]
    fn default_template_is_known() {
        assert!(is_known_template(DEFAULT_TEMPLATE));
        assert!(!is_known_template("nonexistent"));
    }
}
