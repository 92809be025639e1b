//! # Failure Classification
//!
//! Maps an unstructured error message to a remediation class using an
//! ordered rule list. Permanent rules are evaluated first and win outright:
//! an error that says "404 not found" must never be auto-retried just
//! because it also happens to mention a timeout somewhere in the message.
//! Messages matching no rule are `Unknown`, a real third state that is never
//! auto-resolved but is flagged distinctly for operator triage.
//!
//! The rule set is data, not code: patterns come from
//! [`ClassificationRules`](crate::config::ClassificationRules) and are
//! compiled once at startup. Classification itself never fails.

use crate::config::ClassificationRules;
use crate::constants::FailureClass;
use crate::error::{CrawlerError, Result};
use regex::Regex;

/// Compiled, ordered classification rule set
#[derive(Debug)]
pub struct ErrorPatternClassifier {
    permanent: Vec<Regex>,
    transient: Vec<Regex>,
}

impl ErrorPatternClassifier {
    /// Compile a rule set. An invalid pattern is a configuration error.
    pub fn from_rules(rules: &ClassificationRules) -> Result<Self> {
        let compile = |patterns: &[String], field: &str| -> Result<Vec<Regex>> {
            patterns
                .iter()
                .map(|p| {
                    Regex::new(p).map_err(|e| {
                        CrawlerError::configuration(field, format!("invalid pattern '{p}': {e}"))
                    })
                })
                .collect()
        };

        Ok(Self {
            permanent: compile(&rules.permanent, "dlq.classification.permanent")?,
            transient: compile(&rules.transient, "dlq.classification.transient")?,
        })
    }

    /// Classify an error message. Permanent takes precedence over transient;
    /// no match means `Unknown`.
    pub fn classify(&self, error_message: &str) -> FailureClass {
        if self.permanent.iter().any(|re| re.is_match(error_message)) {
            return FailureClass::Permanent;
        }
        if self.transient.iter().any(|re| re.is_match(error_message)) {
            return FailureClass::Transient;
        }
        FailureClass::Unknown
    }
}
