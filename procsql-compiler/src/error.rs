use std::fmt::{self, Debug, Formatter};
use std::ops::Range;

use ariadne::{Color, Config, Label, Report, ReportKind, Source};
use itertools::Itertools;
use serde::{Deserialize, Serialize};
use strum::{AsRefStr, Display};

/// Byte range into the source the AST was parsed from.
#[derive(Clone, PartialEq, Eq, Copy, Default, Serialize, Deserialize)]
pub struct Span {
    pub start: usize,
    pub end: usize,
}

impl Span {
    pub fn new(start: usize, end: usize) -> Self {
        Span { start, end }
    }

    /// Moves the span by `offset` bytes. Used when a child diagnostics sink
    /// reports positions relative to an embedded fragment.
    pub fn shift(self, offset: usize) -> Self {
        Span {
            start: self.start + offset,
            end: self.end + offset,
        }
    }
}

impl From<Span> for Range<usize> {
    fn from(a: Span) -> Self {
        a.start..a.end
    }
}

impl Debug for Span {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "span-chars-{}-{}", self.start, self.end)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Error {
    pub span: Option<Span>,
    pub reason: Reason,
    pub help: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Reason {
    Simple(String),
    Expected {
        who: Option<String>,
        expected: String,
        found: String,
    },
    NotFound {
        name: String,
        namespace: String,
    },
    Ambiguous {
        name: String,
        candidates: Vec<String>,
    },
    Duplicate {
        name: String,
        namespace: String,
    },
    ReadOnly(String),
    CompoundShape(String),
    /// The AST does not have a shape the analyzer relies on. Never caused by
    /// user input coming out of a correct parser.
    Internal(String),
}

impl Error {
    pub fn new(reason: Reason) -> Self {
        Error {
            span: None,
            reason,
            help: None,
        }
    }

    pub fn simple<S: Into<String>>(message: S) -> Self {
        Error::new(Reason::Simple(message.into()))
    }

    pub fn internal<S: Into<String>>(message: S) -> Self {
        Error::new(Reason::Internal(message.into()))
    }

    pub fn is_internal(&self) -> bool {
        matches!(self.reason, Reason::Internal(_))
    }
}

impl std::error::Error for Error {}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.reason)?;
        if let Some(help) = &self.help {
            write!(f, " ({help})")?;
        }
        Ok(())
    }
}

impl fmt::Display for Reason {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Reason::Simple(text) => f.write_str(text),
            Reason::Expected {
                who,
                expected,
                found,
            } => {
                if let Some(who) = who {
                    write!(f, "{who} ")?;
                }
                write!(f, "expected {expected}, but found {found}")
            }
            Reason::NotFound { name, namespace } => write!(f, "{namespace} `{name}` not found"),
            Reason::Ambiguous { name, candidates } => {
                let candidates = candidates.iter().map(|c| format!("`{c}`")).join(", ");
                write!(
                    f,
                    "ambiguous column `{name}`. Could be from either of {candidates}"
                )
            }
            Reason::Duplicate { name, namespace } => {
                write!(f, "{namespace} `{name}` is already declared")
            }
            Reason::ReadOnly(text) => write!(f, "read-only procedure {text}"),
            Reason::CompoundShape(text) => write!(f, "compound select shape mismatch: {text}"),
            Reason::Internal(text) => write!(f, "internal error: {text}"),
        }
    }
}

pub trait WithErrorInfo {
    fn with_help<S: Into<String>>(self, help: S) -> Self;

    fn with_span(self, span: Option<Span>) -> Self;
}

impl WithErrorInfo for Error {
    fn with_help<S: Into<String>>(mut self, help: S) -> Self {
        self.help = Some(help.into());
        self
    }

    fn with_span(mut self, span: Option<Span>) -> Self {
        // keep the innermost span
        if self.span.is_none() {
            self.span = span;
        }
        self
    }
}

impl<T, E: WithErrorInfo> WithErrorInfo for Result<T, E> {
    fn with_help<S: Into<String>>(self, help: S) -> Self {
        self.map_err(|e| e.with_help(help))
    }

    fn with_span(self, span: Option<Span>) -> Self {
        self.map_err(|e| e.with_span(span))
    }
}

impl From<Reason> for Error {
    fn from(reason: Reason) -> Self {
        Error::new(reason)
    }
}

/// Category of a reported diagnostic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, AsRefStr, Serialize, Deserialize)]
#[strum(serialize_all = "snake_case")]
pub enum ErrorKind {
    Syntax,
    Semantic,
    Type,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Diagnostic {
    pub kind: ErrorKind,
    pub error: Error,
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{} error: {}", self.kind, self.error)
    }
}

/// Accumulates diagnostics for one unit of analysis.
///
/// A child sink covers an embedded region (the SQL inside a procedure
/// statement). Its spans are relative to that region and are shifted by the
/// child's offset when absorbed into the parent.
#[derive(Debug, Clone, Default)]
pub struct Diagnostics {
    name: String,
    offset: usize,
    items: Vec<Diagnostic>,
}

impl Diagnostics {
    pub fn new() -> Self {
        Diagnostics::default()
    }

    pub fn child<S: Into<String>>(&self, name: S, offset: usize) -> Diagnostics {
        Diagnostics {
            name: name.into(),
            offset,
            items: Vec::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn push(&mut self, kind: ErrorKind, error: Error) {
        log::trace!("diagnostic ({kind}) in `{}`: {error}", self.name);
        self.items.push(Diagnostic { kind, error });
    }

    pub fn report<R: Into<Error>>(&mut self, kind: ErrorKind, reason: R, span: Option<Span>) {
        self.push(kind, reason.into().with_span(span));
    }

    /// Moves all diagnostics of a child sink into this one.
    pub fn absorb(&mut self, child: Diagnostics) {
        let offset = child.offset;
        for mut diagnostic in child.items {
            diagnostic.error.span = diagnostic.error.span.map(|s| s.shift(offset));
            self.items.push(diagnostic);
        }
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn has_errors(&self) -> bool {
        !self.items.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Diagnostic> {
        self.items.iter()
    }

    pub fn into_vec(self) -> Vec<Diagnostic> {
        self.items
    }

    /// Renders every diagnostic against the source it was produced from.
    pub fn render(&self, source_id: &str, source: &str, color: bool) -> String {
        self.items
            .iter()
            .map(|d| format_error(&d.error, source_id, source, color))
            .join("\n")
    }
}

impl IntoIterator for Diagnostics {
    type Item = Diagnostic;
    type IntoIter = std::vec::IntoIter<Diagnostic>;

    fn into_iter(self) -> Self::IntoIter {
        self.items.into_iter()
    }
}

/// Formats an error with source context. Errors without a span are printed
/// as a plain message.
pub fn format_error(error: &Error, source_id: &str, source: &str, color: bool) -> String {
    let message = error.reason.to_string();

    let span = match error.span {
        Some(span) if span.end <= source.len() => span,
        _ => {
            return match &error.help {
                Some(help) => format!("Error: {message}\n↳ Hint: {help}"),
                None => format!("Error: {message}"),
            };
        }
    };
    let span = Range::from(span);

    let config = Config::default().with_color(color);

    let mut report = Report::build(ReportKind::Error, source_id, span.start)
        .with_config(config)
        .with_label(
            Label::new((source_id, span))
                .with_message(&message)
                .with_color(Color::Red),
        );

    if let Some(help) = &error.help {
        report = report.with_help(help);
    }

    let mut out = Vec::new();
    let written = report
        .finish()
        .write((source_id, Source::from(source)), &mut out);

    match written {
        Ok(()) => String::from_utf8_lossy(&out).to_string(),
        Err(_) => format!("Error: {message}"),
    }
}

#[cfg(test)]
mod tests {
    use insta::assert_snapshot;

    use super::*;

    #[test]
    fn test_child_spans_are_shifted() {
        let mut parent = Diagnostics::new();
        let mut child = parent.child("sql-types", 10);

        child.report(
            ErrorKind::Type,
            Reason::Simple("bad".to_string()),
            Some(Span::new(2, 5)),
        );
        child.report(ErrorKind::Semantic, Error::simple("no span"), None);
        assert_eq!(child.name(), "sql-types");
        parent.absorb(child);

        let items = parent.into_vec();
        assert_eq!(items.len(), 2);
        assert_eq!(items[0].error.span, Some(Span::new(12, 15)));
        assert_eq!(items[1].error.span, None);
    }

    #[test]
    fn test_with_span_keeps_innermost() {
        let err = Error::simple("x")
            .with_span(Some(Span::new(1, 2)))
            .with_span(Some(Span::new(5, 9)));
        assert_eq!(err.span, Some(Span::new(1, 2)));
    }

    #[test]
    fn test_reason_display() {
        let reason = Reason::Ambiguous {
            name: "id".to_string(),
            candidates: vec!["u1".to_string(), "u2".to_string()],
        };
        assert_snapshot!(reason.to_string(), @"ambiguous column `id`. Could be from either of `u1`, `u2`");

        let reason = Reason::Expected {
            who: Some("where clause".to_string()),
            expected: "type `bool`".to_string(),
            found: "type `int`".to_string(),
        };
        assert_snapshot!(reason.to_string(), @"where clause expected type `bool`, but found type `int`");
    }

    #[test]
    fn test_format_without_span() {
        let err = Error::new(Reason::NotFound {
            name: "users".to_string(),
            namespace: "table".to_string(),
        })
        .with_help("declare the table in the schema");

        assert_snapshot!(format_error(&err, "", "", false), @r###"
        Error: table `users` not found
        ↳ Hint: declare the table in the schema
        "###);
    }

    #[test]
    fn test_format_with_span_mentions_message() {
        let source = "SELECT id FROM users";
        let err = Error::simple("column `id` not found").with_span(Some(Span::new(7, 9)));

        let rendered = format_error(&err, "query.sql", source, false);
        assert!(rendered.contains("column `id` not found"));
    }
}
