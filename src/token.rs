use std::fmt;
use std::rc::Rc;

use crate::error::Position;

/// A named, spanned node of a parse tree.
///
/// `source` is shared with every other token produced by the same parse, so
/// cloning a token never copies the input text.
#[derive(Clone, PartialEq)]
pub struct Token {
    pub name: String,
    pub start: usize,
    pub end: usize,
    pub children: Vec<Token>,
    pub source: Rc<str>,
}

impl Token {
    pub fn new(
        name: impl Into<String>,
        start: usize,
        end: usize,
        children: Vec<Token>,
        source: Rc<str>,
    ) -> Self {
        Token {
            name: name.into(),
            start,
            end,
            children,
            source,
        }
    }

    /// A childless token spanning `start..end` of `source`.
    pub fn leaf(name: impl Into<String>, start: usize, end: usize, source: Rc<str>) -> Self {
        Token::new(name, start, end, Vec::new(), source)
    }

    /// The source text covered by this token.
    pub fn text(&self) -> &str {
        self.source.get(self.start..self.end).unwrap_or("")
    }

    pub fn is(&self, name: &str) -> bool {
        self.name == name
    }

    pub fn child(&self, index: usize) -> Option<&Token> {
        self.children.get(index)
    }

    /// First direct child with the given name.
    pub fn find(&self, name: &str) -> Option<&Token> {
        self.children.iter().find(|c| c.name == name)
    }

    pub fn position(&self) -> Position {
        Position::at(&self.source, self.start)
    }

    /// Structural equality: names, spans and children, ignoring which
    /// `source` allocation the tokens point at.
    pub fn same_shape(&self, other: &Token) -> bool {
        self.name == other.name
            && self.start == other.start
            && self.end == other.end
            && self.children.len() == other.children.len()
            && self
                .children
                .iter()
                .zip(&other.children)
                .all(|(a, b)| a.same_shape(b))
    }

    /// Render the tree one token per line, indented by depth.
    pub fn dump(&self) -> String {
        let mut out = String::new();
        self.dump_into(&mut out, 0);
        out
    }

    fn dump_into(&self, out: &mut String, depth: usize) {
        for _ in 0..depth {
            out.push_str("  ");
        }
        out.push_str(&self.name);
        if self.children.is_empty() {
            out.push_str(&format!(" {:?}", self.text()));
        }
        out.push('\n');
        for child in &self.children {
            child.dump_into(out, depth + 1);
        }
    }
}

impl fmt::Debug for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut s = f.debug_struct("Token");
        s.field("name", &self.name)
            .field("span", &(self.start..self.end))
            .field("text", &self.text());
        if !self.children.is_empty() {
            s.field("children", &self.children);
        }
        s.finish()
    }
}
