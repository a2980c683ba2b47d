use crate::rules::DEFAULT_MAX_DEPTH;

/// Default nesting limit for script function calls.
pub const DEFAULT_MAX_CALL_DEPTH: usize = 64;

/// Knobs shared by the template compiler, the parser and the evaluator.
#[derive(Debug, Clone, PartialEq)]
pub struct EngineOptions {
    /// Opens a script run inside template text.
    pub open_delimiter: String,
    /// Closes a script run.
    pub close_delimiter: String,
    /// Deepest allowed nesting of rule invocations while parsing.
    pub max_parse_depth: usize,
    /// Deepest allowed nesting of function calls while evaluating.
    pub max_call_depth: usize,
    /// Evaluation budget in nodes; unlimited when `None`.
    pub max_steps: Option<u64>,
    /// Resolve unknown identifiers to `null` instead of failing.
    pub lenient_identifiers: bool,
}

impl Default for EngineOptions {
    fn default() -> Self {
        EngineOptions {
            open_delimiter: "[%".to_string(),
            close_delimiter: "%]".to_string(),
            max_parse_depth: DEFAULT_MAX_DEPTH,
            max_call_depth: DEFAULT_MAX_CALL_DEPTH,
            max_steps: None,
            lenient_identifiers: false,
        }
    }
}

impl EngineOptions {
    pub fn with_delimiters(mut self, open: &str, close: &str) -> Self {
        self.open_delimiter = open.to_string();
        self.close_delimiter = close.to_string();
        self
    }

    pub fn with_max_parse_depth(mut self, depth: usize) -> Self {
        self.max_parse_depth = depth;
        self
    }

    pub fn with_max_call_depth(mut self, depth: usize) -> Self {
        self.max_call_depth = depth;
        self
    }

    pub fn with_max_steps(mut self, steps: u64) -> Self {
        self.max_steps = Some(steps);
        self
    }

    pub fn with_lenient_identifiers(mut self, lenient: bool) -> Self {
        self.lenient_identifiers = lenient;
        self
    }
}
