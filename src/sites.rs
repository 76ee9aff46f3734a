//! Batch roster parsing.
//!
//! Rosters are CSV files with columns `domain,template,site_type,scrape_domain`
//! (the last two optional). A header row is detected and skipped. Malformed
//! rows become per-line errors rather than aborting the parse; unknown
//! templates produce a warning and fall back to the default template.

use crate::config::{DEFAULT_TEMPLATE, is_known_template};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::io::Read;
use std::sync::OnceLock;
use thiserror::Error;

/// One site to process in batch mode.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchSiteEntry {
    pub domain: String,
    pub template: String,
    pub site_type: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scrape_domain: Option<String>,
}

/// A problem tied to one roster line.
#[derive(Debug, Clone, PartialEq)]
pub struct LineIssue {
    pub line: usize,
    pub message: String,
}

/// Parse result: usable sites plus everything worth telling the operator.
#[derive(Debug, Clone, Default)]
pub struct Roster {
    pub sites: Vec<BatchSiteEntry>,
    pub errors: Vec<LineIssue>,
    pub warnings: Vec<LineIssue>,
}

impl Roster {
    pub fn is_empty(&self) -> bool {
        self.sites.is_empty()
    }
}

#[derive(Debug, Error)]
pub enum RosterError {
    #[error("Failed to read roster: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse roster CSV: {0}")]
    Csv(#[from] csv::Error),
}

fn domain_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"^[a-zA-Z0-9][a-zA-Z0-9\-_.]+[a-zA-Z0-9]$").expect("valid domain regex")
    })
}

/// Whether the first record looks like a header row.
fn looks_like_header(record: &csv::StringRecord) -> bool {
    record.iter().any(|field| {
        let lower = field.trim().to_lowercase();
        lower == "domain" || lower == "template"
    })
}

/// Parse a roster from any reader.
pub fn parse_roster<R: Read>(reader: R) -> Result<Roster, RosterError> {
    let mut csv_reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(reader);

    let mut roster = Roster::default();

    for (index, record) in csv_reader.records().enumerate() {
        let line = index + 1;
        let record = record?;

        if index == 0 && looks_like_header(&record) {
            continue;
        }
        if record.iter().all(|f| f.is_empty()) {
            continue;
        }

        if record.len() < 2 {
            roster.errors.push(LineIssue {
                line,
                message: format!("expected at least domain and template, got {} column(s)", record.len()),
            });
            continue;
        }

        let domain = record.get(0).unwrap_or_default().to_string();
        if !domain_pattern().is_match(&domain) {
            roster.errors.push(LineIssue {
                line,
                message: format!("invalid domain '{domain}'"),
            });
            continue;
        }

        let mut template = record.get(1).unwrap_or_default().to_string();
        if !is_known_template(&template) {
            roster.warnings.push(LineIssue {
                line,
                message: format!(
                    "unknown template '{template}', using '{DEFAULT_TEMPLATE}'"
                ),
            });
            template = DEFAULT_TEMPLATE.to_string();
        }

        let site_type = record
            .get(2)
            .filter(|s| !s.is_empty())
            .unwrap_or("dental")
            .to_string();
        let scrape_domain = record
            .get(3)
            .filter(|s| !s.is_empty())
            .map(String::from);

        roster.sites.push(BatchSiteEntry {
            domain,
            template,
            site_type,
            scrape_domain,
        });
    }

    Ok(roster)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(input: &str) -> Roster {
        parse_roster(input.as_bytes()).unwrap()
    }

    #[test]
    fn parses_plain_rows() {
        let roster = parse("newsite.com,stinson,dental,oldsite.com\nother.com,napa,dental\n");
        assert_eq!(roster.sites.len(), 2);
        assert!(roster.errors.is_empty());
        assert_eq!(roster.sites[0].scrape_domain.as_deref(), Some("oldsite.com"));
        assert!(roster.sites[1].scrape_domain.is_none());
    }

    #[test]
    fn detects_and_skips_header() {
        let roster = parse("domain,template,site_type,scrape_domain\nnewsite.com,stinson,dental\n");
        assert_eq!(roster.sites.len(), 1);
        assert_eq!(roster.sites[0].domain, "newsite.com");
    }

    #[test]
    fn short_rows_become_line_errors() {
        let roster = parse("newsite.com,stinson\nonlydomain\nvalid.com,napa\n");
        assert_eq!(roster.sites.len(), 2);
        assert_eq!(roster.errors.len(), 1);
        assert_eq!(roster.errors[0].line, 2);
    }

    #[test]
    fn invalid_domains_become_line_errors() {
        let roster = parse("-bad-.com,stinson\nok.com,stinson\n");
        assert_eq!(roster.sites.len(), 1);
        assert_eq!(roster.errors.len(), 1);
        assert!(roster.errors[0].message.contains("invalid domain"));
    }

    #[test]
    fn unknown_template_warns_and_falls_back() {
        let roster = parse("newsite.com,notatemplate,dental\n");
        assert_eq!(roster.sites.len(), 1);
        assert_eq!(roster.sites[0].template, DEFAULT_TEMPLATE);
        assert_eq!(roster.warnings.len(), 1);
    }

    #[test]
    fn blank_lines_are_ignored() {
        let roster = parse("newsite.com,stinson\n\nother.com,napa\n");
        assert_eq!(roster.sites.len(), 2);
        assert!(roster.errors.is_empty());
    }
}
