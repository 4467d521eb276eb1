//! Error handling for oscup.
//!
//! The error system follows two principles:
//! 1. **Strongly-typed errors** for precise handling in code
//! 2. **User-friendly messages** with actionable suggestions for CLI users
//!
//! [`UpgradeError`] enumerates every failure an upgrade operation can report.
//! [`ErrorContext`] wraps any error with a suggestion and optional details for
//! terminal display, and [`user_friendly_error`] maps known variants to their
//! suggestions.
//!
//! Resolver and fetcher errors always occur before any live file is touched,
//! so they are safe to retry. File-system errors during replacement carry the
//! paths already written (see the installer's report) to aid manual recovery.

use colored::Colorize;
use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

use crate::migrator::FailedStatement;

/// The main error type for upgrade operations.
///
/// Each variant represents a specific failure mode with enough context to act
/// on. Errors reaching the operator are rendered through [`ErrorContext`],
/// never as a raw panic: every operation ends in a structured outcome.
#[derive(Error, Debug)]
pub enum UpgradeError {
    /// The remote manifest fetch returned no usable content.
    #[error("No manifest content received for '{target}'")]
    ManifestUnavailable {
        /// Short name of the upgrade target being resolved.
        target: String,
    },

    /// The manifest body could not be parsed into a known manifest shape.
    #[error("Malformed manifest for '{target}': {reason}")]
    ManifestMalformed {
        /// Short name of the upgrade target being resolved.
        target: String,
        /// Parser or field-level description of what was wrong.
        reason: String,
    },

    /// The remote release is marked as a draft; drafts are never installable.
    #[error("Release for '{target}' is a draft and not eligible for install")]
    DraftOrIneligible {
        /// Short name of the upgrade target being resolved.
        target: String,
    },

    /// The declared update URI for a target is not a well-formed http(s) URL.
    ///
    /// Plugin authors control their update URL, so resolution refuses to
    /// follow anything that does not parse.
    #[error("Update URI for '{target}' is not a valid URL: {uri}")]
    InvalidUpdateUri {
        /// Target whose metadata carries the bad URI.
        target: String,
        /// The URI exactly as declared.
        uri: String,
    },

    /// Transport-level failure (DNS, connect, timeout) talking to a remote.
    #[error("Network error fetching {url}: {reason}")]
    Network {
        /// URL that was being fetched.
        url: String,
        /// Transport error description.
        reason: String,
    },

    /// The remote answered with a non-success HTTP status.
    #[error("HTTP {status} fetching {url}")]
    Http {
        /// URL that was being fetched.
        url: String,
        /// Status code returned by the server.
        status: u16,
    },

    /// The remote answered 2xx with an empty body.
    #[error("Empty response from {url}")]
    EmptyResponse {
        /// URL that was being fetched.
        url: String,
    },

    /// Downloaded bytes are empty or not a readable archive.
    #[error("Downloaded archive is corrupt: {reason}")]
    CorruptArchive {
        /// What the archive reader rejected.
        reason: String,
    },

    /// The staged archive does not match the expected layout for its target
    /// kind, checked before any live file is touched.
    #[error("Archive layout does not match the expected {kind} structure: {reason}")]
    LayoutMismatch {
        /// Target kind description ("core" or "plugin").
        kind: String,
        /// What was expected versus found.
        reason: String,
    },

    /// One or more schema statements failed and continuation was not forced.
    ///
    /// The failed statements are surfaced verbatim so an operator can judge
    /// whether they are false positives (e.g. "column already exists") before
    /// re-running with the schema-error gate skipped.
    #[error("Schema migration reported {} failed statement(s)", failed.len())]
    SchemaErrors {
        /// Failed statements with their database error messages, in order.
        failed: Vec<FailedStatement>,
    },

    /// Another upgrade of the same target (or a conflicting core upgrade) is
    /// already running.
    #[error("An upgrade of '{target}' is already in progress")]
    AlreadyInProgress {
        /// Short name of the contended target.
        target: String,
    },

    /// A file-system operation failed at a known path.
    #[error("File system error at {}: {source}", path.display())]
    FileSystem {
        /// Path the operation was acting on.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// A version string could not be interpreted for ordering.
    #[error("Invalid version string '{version}': {reason}")]
    InvalidVersion {
        /// The raw version string.
        version: String,
        /// Why it could not be parsed.
        reason: String,
    },

    /// I/O error without a more specific path context.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl UpgradeError {
    /// Convenience constructor for path-tagged file-system failures.
    pub fn fs(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::FileSystem {
            path: path.into(),
            source,
        }
    }
}

/// Wraps an error with a user-facing suggestion and optional details.
///
/// The CLI renders this instead of a bare error chain so operators get a
/// next step along with the failure.
#[derive(Debug)]
pub struct ErrorContext {
    /// The underlying error.
    pub error: anyhow::Error,
    /// Actionable suggestion shown beneath the error.
    pub suggestion: Option<String>,
    /// Longer explanation shown when available.
    pub details: Option<String>,
}

impl ErrorContext {
    /// Create a context around any error.
    pub fn new(error: impl Into<anyhow::Error>) -> Self {
        Self {
            error: error.into(),
            suggestion: None,
            details: None,
        }
    }

    /// Attach a suggestion line.
    #[must_use]
    pub fn with_suggestion(mut self, suggestion: impl Into<String>) -> Self {
        self.suggestion = Some(suggestion.into());
        self
    }

    /// Attach a details paragraph.
    #[must_use]
    pub fn with_details(mut self, details: impl Into<String>) -> Self {
        self.details = Some(details.into());
        self
    }

    /// Print the error to stderr with terminal colors.
    pub fn display(&self) {
        eprintln!("{} {}", "error:".red().bold(), self.error);
        if let Some(details) = &self.details {
            eprintln!("  {}", details.dimmed());
        }
        if let Some(suggestion) = &self.suggestion {
            eprintln!("  {} {}", "hint:".yellow().bold(), suggestion);
        }
    }
}

impl fmt::Display for ErrorContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.error)?;
        if let Some(details) = &self.details {
            write!(f, "\n  {details}")?;
        }
        if let Some(suggestion) = &self.suggestion {
            write!(f, "\n  hint: {suggestion}")?;
        }
        Ok(())
    }
}

/// Convert any error into an [`ErrorContext`] with a variant-appropriate
/// suggestion.
pub fn user_friendly_error(error: anyhow::Error) -> ErrorContext {
    let (suggestion, details) = match error.downcast_ref::<UpgradeError>() {
        Some(UpgradeError::ManifestUnavailable { .. }) => (
            Some("Check your network connection and retry; nothing was modified".to_string()),
            None,
        ),
        Some(UpgradeError::ManifestMalformed { .. }) => (
            Some("The remote manifest may be temporarily broken; retry later".to_string()),
            None,
        ),
        Some(UpgradeError::DraftOrIneligible { .. }) => (
            Some("Wait for the release to be published, then run the check again".to_string()),
            None,
        ),
        Some(UpgradeError::InvalidUpdateUri { target, .. }) => (
            Some(format!(
                "Fix the update_uri declared in the metadata of '{target}' or contact its author"
            )),
            None,
        ),
        Some(UpgradeError::Network { .. }) | Some(UpgradeError::Http { .. }) => (
            Some("The operation aborted before touching any file; it is safe to retry".to_string()),
            None,
        ),
        Some(UpgradeError::EmptyResponse { .. }) | Some(UpgradeError::CorruptArchive { .. }) => (
            Some("The download was incomplete or invalid; retry the upgrade".to_string()),
            None,
        ),
        Some(UpgradeError::LayoutMismatch { .. }) => (
            Some("The release archive is not packaged as expected; report it upstream".to_string()),
            None,
        ),
        Some(UpgradeError::SchemaErrors { failed }) => (
            Some(
                "Review the failed statements; if they are false positives, re-run with \
                 --proceed-on-schema-errors"
                    .to_string(),
            ),
            Some(
                failed
                    .iter()
                    .map(|f| format!("{}: {}", f.statement, f.message))
                    .collect::<Vec<_>>()
                    .join("\n  "),
            ),
        ),
        Some(UpgradeError::AlreadyInProgress { target }) => (
            Some(format!(
                "Wait for the running upgrade of '{target}' to finish before retrying"
            )),
            None,
        ),
        Some(UpgradeError::FileSystem { .. }) => (
            Some("Check permissions and free space on the install directory".to_string()),
            None,
        ),
        _ => (None, None),
    };

    let mut ctx = ErrorContext::new(error);
    if let Some(s) = suggestion {
        ctx = ctx.with_suggestion(s);
    }
    if let Some(d) = details {
        ctx = ctx.with_details(d);
    }
    ctx
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn schema_errors_message_counts_failures() {
        let err = UpgradeError::SchemaErrors {
            failed: vec![
                FailedStatement {
                    statement: "ALTER TABLE t ADD c INT".to_string(),
                    message: "duplicate column name: c".to_string(),
                },
                FailedStatement {
                    statement: "CREATE INDEX i ON t(c)".to_string(),
                    message: "index i already exists".to_string(),
                },
            ],
        };
        assert_eq!(
            err.to_string(),
            "Schema migration reported 2 failed statement(s)"
        );
    }

    #[test]
    fn user_friendly_error_attaches_suggestion() {
        let err = UpgradeError::AlreadyInProgress {
            target: "osclass".to_string(),
        };
        let ctx = user_friendly_error(anyhow::Error::from(err));
        assert!(ctx.suggestion.unwrap().contains("osclass"));
    }

    #[test]
    fn schema_errors_context_lists_statements() {
        let err = UpgradeError::SchemaErrors {
            failed: vec![FailedStatement {
                statement: "DROP TABLE missing".to_string(),
                message: "no such table: missing".to_string(),
            }],
        };
        let ctx = user_friendly_error(anyhow::Error::from(err));
        let details = ctx.details.unwrap();
        assert!(details.contains("DROP TABLE missing"));
        assert!(details.contains("no such table"));
    }
}
