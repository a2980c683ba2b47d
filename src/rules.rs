//! Composable PEG rules and the parser state they run over.
//!
//! A grammar is a DAG of [`Rule`] values. Matching is backtracking
//! recursive descent: every rule either succeeds and advances the
//! [`ParserState`], or fails and leaves the state exactly as it found it.
//! Recursive productions go through [`Rule::Recursive`], an indirect cell
//! bound once during grammar construction by [`GrammarBuilder::define`].

use std::rc::{Rc, Weak};

use once_cell::unsync::OnceCell;
use regex::Regex;

use crate::error::{Error, Position, Result};
use crate::token::Token;

pub type RuleRef = Rc<Rule>;

/// Default limit on nested rule invocations for a single parse.
pub const DEFAULT_MAX_DEPTH: usize = 512;

// ── Parser state ────────────────────────────────────────────────────

/// Mutable cursor over the input plus the tokens produced so far.
pub struct ParserState {
    input: Rc<str>,
    position: usize,
    tokens: Vec<Token>,

    // Bookkeeping outside the snapshot: nesting depth and the furthest
    // failure, used only for error reporting.
    depth: usize,
    max_depth: usize,
    nodes: Vec<Rc<str>>,
    furthest: usize,
    furthest_rule: Option<Rc<str>>,
    expected: Vec<String>,
}

/// Everything a failed rule must put back.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Snapshot {
    position: usize,
    token_count: usize,
}

impl ParserState {
    pub fn new(input: &str) -> Self {
        ParserState {
            input: Rc::from(input),
            position: 0,
            tokens: Vec::new(),
            depth: 0,
            max_depth: DEFAULT_MAX_DEPTH,
            nodes: Vec::new(),
            furthest: 0,
            furthest_rule: None,
            expected: Vec::new(),
        }
    }

    pub fn with_max_depth(mut self, max_depth: usize) -> Self {
        self.max_depth = max_depth;
        self
    }

    pub fn input(&self) -> &str {
        &self.input
    }

    pub fn position(&self) -> usize {
        self.position
    }

    pub fn tokens(&self) -> &[Token] {
        &self.tokens
    }

    pub fn into_tokens(self) -> Vec<Token> {
        self.tokens
    }

    pub fn remaining(&self) -> &str {
        &self.input[self.position..]
    }

    pub fn at_end(&self) -> bool {
        self.position >= self.input.len()
    }

    pub fn snapshot(&self) -> Snapshot {
        Snapshot {
            position: self.position,
            token_count: self.tokens.len(),
        }
    }

    /// Tokens are only ever appended, so truncating restores the list.
    pub fn restore(&mut self, snapshot: Snapshot) {
        self.position = snapshot.position;
        self.tokens.truncate(snapshot.token_count);
    }

    fn advance(&mut self, n: usize) {
        self.position += n;
    }

    fn enter(&mut self) -> Result<()> {
        if self.depth >= self.max_depth {
            return Err(Error::RecursionLimit {
                what: "rule nesting",
                limit: self.max_depth,
            });
        }
        self.depth += 1;
        Ok(())
    }

    fn leave(&mut self) {
        self.depth -= 1;
    }

    /// Record that `what` was expected at the current position.
    fn expect(&mut self, what: impl FnOnce() -> String) {
        if self.position > self.furthest || (self.position == 0 && self.expected.is_empty()) {
            self.furthest = self.position;
            self.furthest_rule = self.nodes.last().cloned();
            self.expected.clear();
        }
        if self.position == self.furthest {
            let what = what();
            if !self.expected.contains(&what) {
                self.expected.push(what);
            }
        }
    }

    /// Build the error describing the furthest failure.
    pub fn failure(&self, grammar: &str) -> Error {
        let expected = if self.expected.is_empty() {
            vec!["end of input".to_string()]
        } else {
            self.expected.clone()
        };
        Error::Parse {
            rule: self
                .furthest_rule
                .as_deref()
                .unwrap_or(grammar)
                .to_string(),
            position: Position::at(&self.input, self.furthest),
            expected,
        }
    }
}

impl PartialEq for ParserState {
    fn eq(&self, other: &Self) -> bool {
        self.input == other.input && self.position == other.position && self.tokens == other.tokens
    }
}

impl std::fmt::Debug for ParserState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ParserState")
            .field("position", &self.position)
            .field("tokens", &self.tokens)
            .finish()
    }
}

// ── Rules ───────────────────────────────────────────────────────────

/// Indirect cell for self-referential productions.
pub struct RecursiveCell {
    label: String,
    target: OnceCell<Weak<Rule>>,
}

pub enum Rule {
    Sequence(Vec<RuleRef>),
    Choice(Vec<RuleRef>),
    Optional(RuleRef),
    ZeroOrMore(RuleRef),
    OneOrMore(RuleRef),
    /// Negative lookahead.
    Not(RuleRef),
    /// Positive lookahead.
    At(RuleRef),
    Literal(String),
    CharIf {
        label: String,
        pred: fn(char) -> bool,
    },
    /// Regular expression, anchored at the cursor.
    Pattern(Regex),
    EndOfInput,
    Recursive(RecursiveCell),
    Node {
        name: Rc<str>,
        rule: RuleRef,
    },
}

impl Rule {
    /// Try to match at the current position.
    ///
    /// `Ok(false)` leaves `state` untouched. `Err` is reserved for hard
    /// failures (nesting limit, unbound recursive rule).
    pub fn matches(&self, state: &mut ParserState) -> Result<bool> {
        state.enter()?;
        let matched = self.match_inner(state);
        state.leave();
        matched
    }

    fn match_inner(&self, state: &mut ParserState) -> Result<bool> {
        match self {
            Rule::Sequence(rules) => {
                let snapshot = state.snapshot();
                for rule in rules {
                    if !rule.matches(state)? {
                        state.restore(snapshot);
                        return Ok(false);
                    }
                }
                Ok(true)
            }
            Rule::Choice(alternatives) => {
                let snapshot = state.snapshot();
                for alternative in alternatives {
                    if alternative.matches(state)? {
                        return Ok(true);
                    }
                    state.restore(snapshot);
                }
                Ok(false)
            }
            Rule::Optional(rule) => {
                let snapshot = state.snapshot();
                if !rule.matches(state)? {
                    state.restore(snapshot);
                }
                Ok(true)
            }
            Rule::ZeroOrMore(rule) => {
                repeat(rule, state)?;
                Ok(true)
            }
            Rule::OneOrMore(rule) => {
                let snapshot = state.snapshot();
                if !rule.matches(state)? {
                    state.restore(snapshot);
                    return Ok(false);
                }
                repeat(rule, state)?;
                Ok(true)
            }
            Rule::Not(rule) => {
                let snapshot = state.snapshot();
                let matched = rule.matches(state)?;
                state.restore(snapshot);
                Ok(!matched)
            }
            Rule::At(rule) => {
                let snapshot = state.snapshot();
                let matched = rule.matches(state)?;
                state.restore(snapshot);
                Ok(matched)
            }
            Rule::Literal(_) | Rule::CharIf { .. } | Rule::Pattern(_) | Rule::EndOfInput => {
                Ok(self.match_terminal(state))
            }
            Rule::Recursive(cell) => cell.resolve()?.matches(state),
            Rule::Node { name, rule } => match_node(name, rule, state),
        }
    }

    /// Terminal rules. These never recurse.
    fn match_terminal(&self, state: &mut ParserState) -> bool {
        match self {
            Rule::Literal(text) => {
                if state.remaining().starts_with(text.as_str()) {
                    state.advance(text.len());
                    true
                } else {
                    state.expect(|| format!("{:?}", text));
                    false
                }
            }
            Rule::CharIf { label, pred } => match state.remaining().chars().next() {
                Some(ch) if pred(ch) => {
                    state.advance(ch.len_utf8());
                    true
                }
                _ => {
                    state.expect(|| label.clone());
                    false
                }
            },
            Rule::Pattern(re) => match re.find(state.remaining()) {
                Some(m) if m.start() == 0 => {
                    state.advance(m.end());
                    true
                }
                _ => {
                    state.expect(|| format!("/{}/", display_pattern(re)));
                    false
                }
            },
            Rule::EndOfInput => {
                if state.at_end() {
                    true
                } else {
                    state.expect(|| "end of input".to_string());
                    false
                }
            }
            _ => false,
        }
    }

    /// Run this rule against a fresh state. Partial consumption is allowed;
    /// end the rule with [`eoi`] to require the whole input.
    pub fn parse(&self, input: &str) -> Result<Vec<Token>> {
        let mut state = ParserState::new(input);
        if self.matches(&mut state)? {
            Ok(state.into_tokens())
        } else {
            Err(state.failure("input"))
        }
    }
}

/// Shared loop of `ZeroOrMore` / `OneOrMore`. Stops when the child fails or
/// succeeds without consuming input.
fn repeat(rule: &Rule, state: &mut ParserState) -> Result<()> {
    loop {
        let snapshot = state.snapshot();
        if !rule.matches(state)? {
            state.restore(snapshot);
            return Ok(());
        }
        if state.position == snapshot.position {
            log::warn!("repetition matched without consuming input at {}", state.position);
            return Ok(());
        }
    }
}

fn display_pattern(re: &Regex) -> &str {
    let src = re.as_str();
    src.strip_prefix("^(?:")
        .and_then(|s| s.strip_suffix(')'))
        .unwrap_or(src)
}

impl RecursiveCell {
    fn resolve(&self) -> Result<RuleRef> {
        self.target
            .get()
            .and_then(Weak::upgrade)
            .ok_or_else(|| Error::Grammar(format!("rule `{}` was never defined", self.label)))
    }
}

/// Match `rule` with a fresh token list and wrap what it produced in one
/// token named `name`.
fn match_node(name: &Rc<str>, rule: &Rule, state: &mut ParserState) -> Result<bool> {
    let start = state.position;
    let outer = std::mem::take(&mut state.tokens);
    state.nodes.push(name.clone());
    let matched = rule.matches(state);
    state.nodes.pop();
    let inner = std::mem::replace(&mut state.tokens, outer);
    if !matched? {
        return Ok(false);
    }
    let token = Token::new(name.as_ref(), start, state.position, inner, state.input.clone());
    state.tokens.push(token);
    Ok(true)
}

// ── Constructors ────────────────────────────────────────────────────

pub fn seq(rules: Vec<RuleRef>) -> RuleRef {
    Rc::new(Rule::Sequence(rules))
}

pub fn choice(rules: Vec<RuleRef>) -> RuleRef {
    Rc::new(Rule::Choice(rules))
}

pub fn opt(rule: RuleRef) -> RuleRef {
    Rc::new(Rule::Optional(rule))
}

pub fn many(rule: RuleRef) -> RuleRef {
    Rc::new(Rule::ZeroOrMore(rule))
}

pub fn many1(rule: RuleRef) -> RuleRef {
    Rc::new(Rule::OneOrMore(rule))
}

pub fn not(rule: RuleRef) -> RuleRef {
    Rc::new(Rule::Not(rule))
}

pub fn at(rule: RuleRef) -> RuleRef {
    Rc::new(Rule::At(rule))
}

pub fn lit(text: &str) -> RuleRef {
    Rc::new(Rule::Literal(text.to_string()))
}

pub fn char_if(label: &str, pred: fn(char) -> bool) -> RuleRef {
    Rc::new(Rule::CharIf {
        label: label.to_string(),
        pred,
    })
}

/// A regular-expression terminal. The pattern is anchored at the cursor.
pub fn pattern(re: &str) -> Result<RuleRef> {
    let anchored = Regex::new(&format!("^(?:{})", re))?;
    Ok(Rc::new(Rule::Pattern(anchored)))
}

pub fn eoi() -> RuleRef {
    Rc::new(Rule::EndOfInput)
}

pub fn node(name: &str, rule: RuleRef) -> RuleRef {
    Rc::new(Rule::Node {
        name: Rc::from(name),
        rule,
    })
}

// ── Grammars ────────────────────────────────────────────────────────

/// Collects recursive slots and the productions bound to them.
///
/// Slots hold weak references; the builder (and later the [`Grammar`])
/// keeps the productions alive, so cyclic grammars do not leak.
#[derive(Default)]
pub struct GrammarBuilder {
    slots: Vec<RuleRef>,
    productions: Vec<RuleRef>,
}

impl GrammarBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// A placeholder rule that can be referenced before it is defined.
    pub fn recursive(&mut self, label: &str) -> RuleRef {
        let slot = Rc::new(Rule::Recursive(RecursiveCell {
            label: label.to_string(),
            target: OnceCell::new(),
        }));
        self.slots.push(slot.clone());
        slot
    }

    /// Bind a slot created by [`GrammarBuilder::recursive`].
    pub fn define(&mut self, slot: &RuleRef, rule: RuleRef) -> Result<()> {
        let Rule::Recursive(cell) = slot.as_ref() else {
            return Err(Error::Grammar("only recursive rules can be defined".to_string()));
        };
        cell.target
            .set(Rc::downgrade(&rule))
            .map_err(|_| Error::Grammar(format!("rule `{}` defined twice", cell.label)))?;
        self.productions.push(rule);
        Ok(())
    }

    /// Finish construction. Fails if any slot was left unbound.
    pub fn build(self, name: &str, root: RuleRef) -> Result<Grammar> {
        for slot in &self.slots {
            if let Rule::Recursive(cell) = slot.as_ref() {
                if cell.target.get().is_none() {
                    return Err(Error::Grammar(format!(
                        "rule `{}` was never defined",
                        cell.label
                    )));
                }
            }
        }
        Ok(Grammar {
            name: name.to_string(),
            root,
            productions: self.productions,
        })
    }
}

/// A root rule together with the productions its recursive slots point at.
pub struct Grammar {
    name: String,
    root: RuleRef,
    productions: Vec<RuleRef>,
}

impl Grammar {
    /// Productions bound to recursive slots, in definition order.
    pub fn productions(&self) -> &[RuleRef] {
        &self.productions
    }

    pub fn parse(&self, input: &str) -> Result<Vec<Token>> {
        self.parse_with_depth(input, DEFAULT_MAX_DEPTH)
    }

    pub fn parse_with_depth(&self, input: &str, max_depth: usize) -> Result<Vec<Token>> {
        log::debug!("parsing {} bytes with grammar `{}`", input.len(), self.name);
        let mut state = ParserState::new(input).with_max_depth(max_depth);
        if self.root.matches(&mut state)? {
            log::trace!("grammar `{}` produced {} token(s)", self.name, state.tokens().len());
            Ok(state.into_tokens())
        } else {
            Err(state.failure(&self.name))
        }
    }

    /// Parse and return the single top-level token the grammar produces.
    pub fn parse_one(&self, input: &str) -> Result<Token> {
        let mut tokens = self.parse(input)?;
        if tokens.len() != 1 {
            return Err(Error::Grammar(format!(
                "grammar `{}` produced {} top-level tokens, expected 1",
                self.name,
                tokens.len()
            )));
        }
        Ok(tokens.remove(0))
    }
}
