//! Severity-ranked diagnostics.
//!
//! Every problem found while scanning, resolving or running a profile is an
//! [`Exception`]. Exceptions are collected into an [`ExceptionList`] that keeps
//! a running "most severe level" so callers can keep going past anything
//! below [`Severity::Fatal`] and report everything at the end.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Diagnostic severity, ordered from least to most severe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    /// A single candidate variation is inapplicable (out of range, pruned).
    Skipped,
    /// A computed or measured value does not meet tolerance.
    Failure,
    /// The step was not executed because the session is a dry run.
    DryRun,
    /// A referenced baseline or feature does not exist on the target.
    Unsupported,
    /// Malformed profile input.
    Syntax,
    /// General processing error.
    Error,
    /// Unrecoverable; terminates the enclosing scan.
    Fatal,
}

impl Severity {
    pub fn as_str(self) -> &'static str {
        match self {
            Severity::Skipped => "skipped",
            Severity::Failure => "failure",
            Severity::DryRun => "dry-run",
            Severity::Unsupported => "unsupported",
            Severity::Syntax => "syntax",
            Severity::Error => "error",
            Severity::Fatal => "fatal",
        }
    }

    pub fn is_fatal(self) -> bool {
        self == Severity::Fatal
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Result code attached to a diagnostic, reported with the run summary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResultCode {
    InvalidArgument,
    OutOfRange,
    PriorValueRequired,
    NotSupported,
    NotFound,
    FileNotFound,
    SyntaxError,
    AmbiguousBlock,
    IndexOutOfRange,
    ToleranceExceeded,
    ReadbackMismatch,
    DryRun,
    ExecutionFailed,
}

impl ResultCode {
    pub fn as_str(self) -> &'static str {
        match self {
            ResultCode::InvalidArgument => "invalid_argument",
            ResultCode::OutOfRange => "out_of_range",
            ResultCode::PriorValueRequired => "prior_value_required",
            ResultCode::NotSupported => "not_supported",
            ResultCode::NotFound => "not_found",
            ResultCode::FileNotFound => "file_not_found",
            ResultCode::SyntaxError => "syntax_error",
            ResultCode::AmbiguousBlock => "ambiguous_block",
            ResultCode::IndexOutOfRange => "index_out_of_range",
            ResultCode::ToleranceExceeded => "tolerance_exceeded",
            ResultCode::ReadbackMismatch => "readback_mismatch",
            ResultCode::DryRun => "dry_run",
            ResultCode::ExecutionFailed => "execution_failed",
        }
    }
}

impl fmt::Display for ResultCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// File and line a diagnostic refers to.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SourceLocation {
    pub file: String,
    pub line: u32,
}

impl SourceLocation {
    pub fn new(file: impl Into<String>, line: u32) -> Self {
        Self {
            file: file.into(),
            line,
        }
    }
}

impl fmt::Display for SourceLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.file, self.line)
    }
}

/// A single diagnostic.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, thiserror::Error)]
#[error("{}", self.render())]
pub struct Exception {
    pub severity: Severity,
    #[serde(default)]
    pub code: Option<ResultCode>,
    pub message: String,
    #[serde(default)]
    pub location: Option<SourceLocation>,
}

impl Exception {
    pub fn new(severity: Severity, message: impl Into<String>) -> Self {
        Self {
            severity,
            code: None,
            message: message.into(),
            location: None,
        }
    }

    pub fn skipped(message: impl Into<String>) -> Self {
        Self::new(Severity::Skipped, message)
    }

    pub fn failure(message: impl Into<String>) -> Self {
        Self::new(Severity::Failure, message)
    }

    pub fn dry_run(message: impl Into<String>) -> Self {
        Self::new(Severity::DryRun, message).with_code(ResultCode::DryRun)
    }

    pub fn unsupported(message: impl Into<String>) -> Self {
        Self::new(Severity::Unsupported, message).with_code(ResultCode::NotSupported)
    }

    pub fn syntax(message: impl Into<String>) -> Self {
        Self::new(Severity::Syntax, message).with_code(ResultCode::SyntaxError)
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self::new(Severity::Error, message)
    }

    pub fn fatal(message: impl Into<String>) -> Self {
        Self::new(Severity::Fatal, message)
    }

    pub fn with_code(mut self, code: ResultCode) -> Self {
        self.code = Some(code);
        self
    }

    pub fn at(mut self, location: SourceLocation) -> Self {
        self.location = Some(location);
        self
    }

    /// Attach a location only if the diagnostic does not carry one yet.
    pub fn or_at(mut self, location: &SourceLocation) -> Self {
        if self.location.is_none() {
            self.location = Some(location.clone());
        }
        self
    }

    /// Emit this diagnostic as a tracing event at a level matching its severity.
    pub fn emit(&self) {
        let location = self
            .location
            .as_ref()
            .map(ToString::to_string)
            .unwrap_or_default();
        let code = self.code.map(ResultCode::as_str).unwrap_or("");
        match self.severity {
            Severity::Skipped => {
                tracing::debug!(%location, code, severity = %self.severity, "{}", self.message)
            }
            Severity::Failure | Severity::DryRun => {
                tracing::info!(%location, code, severity = %self.severity, "{}", self.message)
            }
            Severity::Unsupported | Severity::Syntax => {
                tracing::warn!(%location, code, severity = %self.severity, "{}", self.message)
            }
            Severity::Error | Severity::Fatal => {
                tracing::error!(%location, code, severity = %self.severity, "{}", self.message)
            }
        }
    }
}

impl Exception {
    /// `file:line: severity: message [code]`, location and code when known.
    fn render(&self) -> String {
        let mut out = String::new();
        if let Some(location) = &self.location {
            out.push_str(&format!("{location}: "));
        }
        out.push_str(&format!("{}: {}", self.severity, self.message));
        if let Some(code) = self.code {
            out.push_str(&format!(" [{code}]"));
        }
        out
    }
}

/// Ordered collection of diagnostics with a running worst severity.
///
/// The result code tracked by the list is the code of the most severe
/// diagnostic seen; among diagnostics of equal severity the first one that
/// carried a code wins.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ExceptionList {
    items: Vec<Exception>,
    worst: Option<Severity>,
    code: Option<ResultCode>,
}

impl ExceptionList {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, exception: Exception) {
        match self.worst {
            Some(worst) if exception.severity < worst => {}
            Some(worst) if exception.severity == worst => {
                if self.code.is_none() {
                    self.code = exception.code;
                }
            }
            _ => {
                self.worst = Some(exception.severity);
                self.code = exception.code;
            }
        }
        self.items.push(exception);
    }

    /// Move every diagnostic of `other` into this list, in order.
    pub fn append(&mut self, other: ExceptionList) {
        for exception in other.items {
            self.push(exception);
        }
    }

    /// Overall severity; `None` for an empty list.
    pub fn severity(&self) -> Option<Severity> {
        self.worst
    }

    pub fn result_code(&self) -> Option<ResultCode> {
        self.code
    }

    pub fn is_fatal(&self) -> bool {
        self.worst == Some(Severity::Fatal)
    }

    /// True if any diagnostic is at least as severe as `severity`.
    pub fn at_least(&self, severity: Severity) -> bool {
        self.worst.is_some_and(|worst| worst >= severity)
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Exception> {
        self.items.iter()
    }

    /// Number of diagnostics at exactly `severity`.
    pub fn count(&self, severity: Severity) -> usize {
        self.items.iter().filter(|e| e.severity == severity).count()
    }

    pub fn summary(&self) -> Summary {
        Summary {
            count: self.items.len(),
            worst: self.worst,
            code: self.code,
        }
    }
}

impl<'a> IntoIterator for &'a ExceptionList {
    type Item = &'a Exception;
    type IntoIter = std::slice::Iter<'a, Exception>;

    fn into_iter(self) -> Self::IntoIter {
        self.items.iter()
    }
}

impl Extend<Exception> for ExceptionList {
    fn extend<T: IntoIterator<Item = Exception>>(&mut self, iter: T) {
        for exception in iter {
            self.push(exception);
        }
    }
}

impl FromIterator<Exception> for ExceptionList {
    fn from_iter<T: IntoIterator<Item = Exception>>(iter: T) -> Self {
        let mut list = ExceptionList::new();
        list.extend(iter);
        list
    }
}

impl fmt::Display for ExceptionList {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for exception in &self.items {
            writeln!(f, "{exception}")?;
        }
        write!(f, "{}", self.summary())
    }
}

/// Aggregate view printed at the end of a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Summary {
    pub count: usize,
    pub worst: Option<Severity>,
    pub code: Option<ResultCode>,
}

impl fmt::Display for Summary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.worst {
            None => write!(f, "no diagnostics"),
            Some(worst) => {
                let noun = if self.count == 1 { "diagnostic" } else { "diagnostics" };
                write!(f, "{} {noun}, worst severity {worst}", self.count)?;
                if let Some(code) = self.code {
                    write!(f, " ({code})")?;
                }
                Ok(())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_list_has_no_severity() {
        let list = ExceptionList::new();
        assert!(list.is_empty());
        assert_eq!(list.severity(), None);
        assert_eq!(list.result_code(), None);
        assert_eq!(list.summary().to_string(), "no diagnostics");
    }

    #[test]
    fn test_severity_order() {
        assert!(Severity::Skipped < Severity::Failure);
        assert!(Severity::Failure < Severity::DryRun);
        assert!(Severity::DryRun < Severity::Unsupported);
        assert!(Severity::Unsupported < Severity::Syntax);
        assert!(Severity::Syntax < Severity::Error);
        assert!(Severity::Error < Severity::Fatal);
    }

    #[test]
    fn test_equal_severity_first_code_wins() {
        let mut list = ExceptionList::new();
        list.push(Exception::error("first").with_code(ResultCode::NotFound));
        list.push(Exception::error("second").with_code(ResultCode::OutOfRange));
        assert_eq!(list.result_code(), Some(ResultCode::NotFound));
    }

    #[test]
    fn test_uncoded_then_coded_at_same_severity_takes_code() {
        let mut list = ExceptionList::new();
        list.push(Exception::error("no code"));
        list.push(Exception::error("coded").with_code(ResultCode::NotFound));
        list.push(Exception::error("later").with_code(ResultCode::OutOfRange));
        assert_eq!(list.severity(), Some(Severity::Error));
        assert_eq!(list.result_code(), Some(ResultCode::NotFound));
    }

    #[test]
    fn test_exception_is_std_error() {
        let e: Box<dyn std::error::Error> =
            Box::new(Exception::fatal("cannot open 'a.ctp'").with_code(ResultCode::FileNotFound));
        assert_eq!(e.to_string(), "fatal: cannot open 'a.ctp' [file_not_found]");
    }

    #[test]
    fn test_display_includes_location_and_code() {
        let e = Exception::syntax("unknown keyword 'frq'").at(SourceLocation::new("a.ctp", 7));
        assert_eq!(
            e.to_string(),
            "a.ctp:7: syntax: unknown keyword 'frq' [syntax_error]"
        );
    }

    #[test]
    fn test_or_at_keeps_existing_location() {
        let e = Exception::error("x")
            .at(SourceLocation::new("a.ctp", 1))
            .or_at(&SourceLocation::new("b.ctp", 2));
        assert_eq!(e.location, Some(SourceLocation::new("a.ctp", 1)));
    }
}
