use std::fmt;

use crate::schema::SchemaKind;

/// Why a value was rejected.
#[derive(Debug, Clone, PartialEq)]
pub enum IssueCode {
    InvalidType {
        expected: &'static str,
        received: &'static str,
    },
    InvalidLiteral,
    InvalidEnumValue,
    UnrecognizedKeys(Vec<String>),
    /// Tuple length differs from the declared arity.
    InvalidArity {
        expected: usize,
        received: usize,
    },
    InvalidUnion(Vec<AlternativeIssues>),
    /// Raised by processors that reject their input.
    Custom,
}

/// A single validation problem, located by its path from the root value.
#[derive(Debug, Clone, PartialEq)]
pub struct Issue {
    pub path: Vec<String>,
    pub code: IssueCode,
    pub message: String,
}

impl Issue {
    pub fn new(code: IssueCode, message: impl Into<String>) -> Self {
        Issue {
            path: Vec::new(),
            code,
            message: message.into(),
        }
    }

    pub fn custom(message: impl Into<String>) -> Self {
        Issue::new(IssueCode::Custom, message)
    }

    pub fn invalid_type(expected: &'static str, received: &'static str) -> Self {
        Issue::new(
            IssueCode::InvalidType { expected, received },
            format!("expected {expected}, received {received}"),
        )
    }

    /// Prefixes the issue path with `segment`.
    pub fn within(mut self, segment: impl Into<String>) -> Self {
        self.path.insert(0, segment.into());
        self
    }
}

impl fmt::Display for Issue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.path.is_empty() {
            write!(f, "{}", self.message)
        } else {
            write!(f, "{}: {}", self.path.join("."), self.message)
        }
    }
}

/// Issues collected while trying one union alternative.
#[derive(Debug, Clone, PartialEq)]
pub struct AlternativeIssues {
    pub kind: SchemaKind,
    pub issues: Vec<Issue>,
}

/// No alternative of a union accepted the value.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("no union alternative matched ({} tried)", .alternatives.len())]
pub struct UnionError {
    pub alternatives: Vec<AlternativeIssues>,
}

impl UnionError {
    pub fn to_issue(&self) -> Issue {
        Issue::new(
            IssueCode::InvalidUnion(self.alternatives.clone()),
            self.to_string(),
        )
    }
}

fn join_issues(issues: &[Issue]) -> String {
    issues
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

/// Error type for transform operations.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum TransformError {
    #[error(transparent)]
    Union(#[from] UnionError),
    #[error("invalid input: {}", join_issues(.0))]
    Invalid(Vec<Issue>),
}

impl TransformError {
    /// Convenience for processors rejecting a value.
    pub fn invalid(message: impl Into<String>) -> Self {
        TransformError::Invalid(vec![Issue::custom(message)])
    }

    /// The error flattened into an issue list.
    pub fn issues(&self) -> Vec<Issue> {
        match self {
            TransformError::Union(union) => vec![union.to_issue()],
            TransformError::Invalid(issues) => issues.clone(),
        }
    }
}
