//! Concrete grammars built from the rule combinators.
//!
//! Each grammar is constructed once per thread and cached; construction
//! only fails if a pattern does not compile or a recursive slot is left
//! unbound, both of which are programming errors surfaced as
//! [`Error::Grammar`](crate::error::Error::Grammar).

pub mod arithmetic;
pub mod json;
pub mod script;

use std::rc::Rc;

use once_cell::unsync::OnceCell;

use crate::error::Result;
use crate::rules::{char_if, lit, not, pattern, seq, Grammar, RuleRef};

thread_local! {
    static ARITHMETIC: OnceCell<Rc<Grammar>> = const { OnceCell::new() };
    static JSON: OnceCell<Rc<Grammar>> = const { OnceCell::new() };
    static SCRIPT: OnceCell<Rc<Grammar>> = const { OnceCell::new() };
}

fn cached(
    key: &'static std::thread::LocalKey<OnceCell<Rc<Grammar>>>,
    build: fn() -> Result<Grammar>,
) -> Result<Rc<Grammar>> {
    key.with(|cell| cell.get_or_try_init(|| build().map(Rc::new)).cloned())
}

/// The arithmetic expression grammar.
pub fn arithmetic() -> Result<Rc<Grammar>> {
    cached(&ARITHMETIC, arithmetic::build)
}

/// The JSON literal grammar.
pub fn json() -> Result<Rc<Grammar>> {
    cached(&JSON, json::build)
}

/// The scripting language grammar.
pub fn script() -> Result<Rc<Grammar>> {
    cached(&SCRIPT, script::build)
}

/// Whitespace-aware building blocks shared by the grammars.
pub(crate) struct Lexicon {
    ws: RuleRef,
}

impl Lexicon {
    /// `skip` is the pattern for insignificant text between tokens.
    pub(crate) fn new(skip: &str) -> Result<Self> {
        Ok(Lexicon {
            ws: pattern(skip)?,
        })
    }

    pub(crate) fn ws(&self) -> RuleRef {
        self.ws.clone()
    }

    /// Optional whitespace, then `rule`.
    pub(crate) fn t(&self, rule: RuleRef) -> RuleRef {
        seq(vec![self.ws(), rule])
    }

    /// Optional whitespace, then the literal `text`.
    pub(crate) fn tok(&self, text: &str) -> RuleRef {
        self.t(lit(text))
    }

    /// A keyword: the literal `word` not followed by an identifier character.
    pub(crate) fn kw(&self, word: &str) -> RuleRef {
        seq(vec![self.ws(), lit(word), not(ident_char())])
    }
}

pub(crate) fn ident_char() -> RuleRef {
    char_if("identifier character", |c| {
        c.is_alphanumeric() || c == '_' || c == '$'
    })
}
