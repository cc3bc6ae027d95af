//! Operator-facing diagnostics.
//!
//! The host surfaces these to the person running the configuration tool,
//! so the detail text is written for a human and lists everything needed
//! to fix the configuration in one pass.

use std::fmt::Write as _;

use crate::error::ReconcileError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Error,
    Warning,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Diagnostic {
    pub severity: Severity,
    pub summary: String,
    pub detail: String,
    /// Dotted attribute path the diagnostic points at, when there is one.
    pub attribute: Option<String>,
}

impl Diagnostic {
    pub fn error(summary: impl Into<String>, detail: impl Into<String>) -> Self {
        Self {
            severity: Severity::Error,
            summary: summary.into(),
            detail: detail.into(),
            attribute: None,
        }
    }

    pub fn warning(summary: impl Into<String>, detail: impl Into<String>) -> Self {
        Self {
            severity: Severity::Warning,
            summary: summary.into(),
            detail: detail.into(),
            attribute: None,
        }
    }

    pub fn at(mut self, attribute: impl Into<String>) -> Self {
        self.attribute = Some(attribute.into());
        self
    }
}

impl From<&ReconcileError> for Diagnostic {
    fn from(err: &ReconcileError) -> Self {
        match err {
            ReconcileError::Construction { path, message } => {
                Diagnostic::error("Invalid configuration value", message.clone()).at(path.clone())
            }
            ReconcileError::StateMapping { path, message } => {
                Diagnostic::error("Unexpected value returned by Microsoft Graph", message.clone())
                    .at(path.clone())
            }
            ReconcileError::NotFound {
                resource,
                kind,
                input,
                suggestions,
                valid,
                attribute,
            } => {
                let mut detail = format!("No {resource} found with {} \"{input}\".", kind.label());
                if !suggestions.is_empty() {
                    detail.push_str("\n\nDid you mean one of these?");
                    bullet_list(&mut detail, suggestions);
                }
                let _ = write!(detail, "\n\nValid {}s:", kind.label());
                bullet_list(&mut detail, valid);
                Diagnostic::error(format!("{resource} not found"), detail)
                    .at(attribute.as_deref().unwrap_or(kind.label()))
            }
            ReconcileError::Ambiguous { resource, input, ids } => {
                let mut detail = format!(
                    "{} {resource} objects are named \"{input}\". Reference one by id instead:",
                    ids.len()
                );
                bullet_list(&mut detail, ids);
                Diagnostic::error(format!("Ambiguous {resource} name"), detail)
            }
            ReconcileError::PostWriteRead { resource, attempts, source } => Diagnostic::error(
                format!("Could not confirm {resource} after write"),
                format!(
                    "The {resource} was written, but reading it back failed after {attempts} attempts. \
                     The write may have partially succeeded; inspect the tenant before retrying.\n\n\
                     Last error: {source}"
                ),
            ),
            other => Diagnostic::error(summary_for(other), other.to_string()),
        }
    }
}

fn summary_for(err: &ReconcileError) -> &'static str {
    match err {
        ReconcileError::Transport(_) | ReconcileError::Network(_) => "Microsoft Graph request failed",
        ReconcileError::NoCandidates { .. } => "Nothing to choose from",
        ReconcileError::Stale { .. } => "Remote object does not reflect the configuration",
        ReconcileError::DeadlineExceeded { .. } => "Operation timed out",
        ReconcileError::Cancelled { .. } => "Operation cancelled",
        ReconcileError::Schema(_) => "Provider schema error",
        ReconcileError::Config(_) => "Invalid provider configuration",
        _ => "Provider error",
    }
}

fn bullet_list(out: &mut String, items: &[String]) {
    for item in items {
        let _ = write!(out, "\n  - {item}");
    }
}

/// Diagnostics accumulated over one operation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Diagnostics(Vec<Diagnostic>);

impl Diagnostics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, diagnostic: Diagnostic) {
        self.0.push(diagnostic);
    }

    pub fn push_error(&mut self, err: &ReconcileError) {
        self.0.push(Diagnostic::from(err));
    }

    pub fn has_errors(&self) -> bool {
        self.0.iter().any(|d| d.severity == Severity::Error)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Diagnostic> {
        self.0.iter()
    }
}

impl Extend<Diagnostic> for Diagnostics {
    fn extend<I: IntoIterator<Item = Diagnostic>>(&mut self, iter: I) {
        self.0.extend(iter);
    }
}

impl IntoIterator for Diagnostics {
    type Item = Diagnostic;
    type IntoIter = std::vec::IntoIter<Diagnostic>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}
