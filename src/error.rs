use std::fmt;

/// A 0-based position in the source text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Position {
    /// 0-based line number
    pub line: usize,
    /// 0-based column (character offset within the line)
    pub column: usize,
    /// 0-based absolute byte offset from the start of input
    pub offset: usize,
}

impl Position {
    /// Compute the line/column of a byte offset in `input`.
    pub fn at(input: &str, offset: usize) -> Self {
        let offset = offset.min(input.len());
        let consumed = &input[..offset];
        let line = consumed.matches('\n').count();
        let last_newline = consumed.rfind('\n').map(|i| i + 1).unwrap_or(0);
        Position {
            line,
            column: consumed[last_newline..].chars().count(),
            offset,
        }
    }
}

impl fmt::Display for Position {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.line, self.column)
    }
}

/// Every failure the engine reports. Path misses are not errors; they
/// resolve to `None` and the caller decides.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum Error {
    #[error("{position}: parse failure in rule `{rule}`, expected {}", .expected.join(" or "))]
    Parse {
        rule: String,
        position: Position,
        expected: Vec<String>,
    },

    #[error("unbound identifier `{0}`")]
    UnboundIdentifier(String),

    #[error("cannot assign to {0}")]
    InvalidAssignmentTarget(String),

    #[error("unsupported operator `{0}`")]
    UnsupportedOperator(String),

    #[error("{position}: unrecognized node `{name}`")]
    UnrecognizedNode { name: String, position: Position },

    #[error("{position}: unclosed script")]
    UnclosedScript { position: Position },

    #[error("`{path}` does not resolve to a list")]
    NotAList { path: String },

    #[error("`{0}` is not callable")]
    NotCallable(String),

    #[error("type error: {0}")]
    TypeError(String),

    #[error("{what} exceeded the limit of {limit}")]
    RecursionLimit { what: &'static str, limit: usize },

    #[error("evaluation exceeded the budget of {0} steps")]
    StepLimit(u64),

    #[error("invalid grammar: {0}")]
    Grammar(String),
}

impl Error {
    /// The source position of the error, if it has one.
    pub fn position(&self) -> Option<Position> {
        match self {
            Error::Parse { position, .. }
            | Error::UnrecognizedNode { position, .. }
            | Error::UnclosedScript { position } => Some(*position),
            _ => None,
        }
    }

    /// Machine-readable error code.
    pub fn code(&self) -> &'static str {
        match self {
            Error::Parse { .. } => "parse-failure",
            Error::UnboundIdentifier(_) => "unbound-identifier",
            Error::InvalidAssignmentTarget(_) => "invalid-assignment-target",
            Error::UnsupportedOperator(_) => "unsupported-operator",
            Error::UnrecognizedNode { .. } => "unrecognized-node",
            Error::UnclosedScript { .. } => "unclosed-script",
            Error::NotAList { .. } => "not-a-list",
            Error::NotCallable(_) => "not-callable",
            Error::TypeError(_) => "type-error",
            Error::RecursionLimit { .. } => "recursion-limit",
            Error::StepLimit(_) => "step-limit",
            Error::Grammar(_) => "invalid-grammar",
        }
    }
}

impl From<regex::Error> for Error {
    fn from(err: regex::Error) -> Self {
        Error::Grammar(err.to_string())
    }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
