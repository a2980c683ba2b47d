//! Path addressing over [`TemplateContainer`] trees.
//!
//! ```text
//! path     := "" | "/" path | "../" path | ".." | segment (sep path)?
//! segment  := name | "[" key "]" | "[*" index "]"
//! sep      := "." | "/" | (nothing, before "[")
//! ```
//!
//! Misses are not errors: every failure resolves to `None`.

use crate::container::{AttributeValue, Scalar, TemplateContainer, TemplateLink};

/// How many links a single lookup may follow before giving up.
pub const MAX_LINK_HOPS: usize = 32;

/// The result of a successful lookup.
#[derive(Debug, Clone, PartialEq)]
pub enum PathValue {
    Scalar(Scalar),
    Container(TemplateContainer),
    /// A list-typed link, not yet dereferenced.
    List(BoundLink),
}

impl PathValue {
    pub fn as_container(&self) -> Option<&TemplateContainer> {
        match self {
            PathValue::Container(c) => Some(c),
            _ => None,
        }
    }
}

/// A list-typed link together with the container it was found in, which
/// is where its target path is resolved from.
#[derive(Debug, Clone, PartialEq)]
pub struct BoundLink {
    pub link: TemplateLink,
    pub base: TemplateContainer,
}

impl BoundLink {
    pub fn keys(&self) -> &[String] {
        self.link.list_keys.as_deref().unwrap_or(&[])
    }

    /// The container the link's target path names.
    pub fn target(&self) -> Option<TemplateContainer> {
        match self.base.resolve(&self.link.target_path, 1)? {
            PathValue::Container(c) => Some(c),
            _ => None,
        }
    }

    /// The element stored under the link's `n`th key.
    pub fn nth(&self, n: usize) -> Option<TemplateContainer> {
        let key = self.keys().get(n)?;
        self.target()?.keyed(key)
    }
}

/// One popped path segment.
#[derive(Debug, Clone, PartialEq)]
enum Segment<'a> {
    Name(&'a str),
    Key(&'a str),
    Position(usize),
}

/// Cursor over a path string.
struct PathCursor<'a> {
    input: &'a str,
    pos: usize,
}

impl<'a> PathCursor<'a> {
    fn new(input: &'a str) -> Self {
        PathCursor { input, pos: 0 }
    }

    fn remaining(&self) -> &'a str {
        &self.input[self.pos..]
    }

    fn peek_char(&self) -> Option<char> {
        self.remaining().chars().next()
    }

    fn advance(&mut self, n: usize) {
        self.pos += n;
    }

    fn eat_char(&mut self, ch: char) -> bool {
        if self.peek_char() == Some(ch) {
            self.advance(ch.len_utf8());
            true
        } else {
            false
        }
    }

    /// Pop the next segment, or `None` if the path is malformed.
    fn pop_segment(&mut self) -> Option<Segment<'a>> {
        if self.eat_char('[') {
            let close = self.remaining().find(']')?;
            let body = &self.remaining()[..close];
            self.advance(close + 1);
            return Some(match body.strip_prefix('*') {
                Some(index) => Segment::Position(index.trim().parse().ok()?),
                None => Segment::Key(body),
            });
        }
        let start = self.pos;
        while let Some(ch) = self.peek_char() {
            if ch == '.' || ch == '[' || ch == '/' {
                break;
            }
            self.advance(ch.len_utf8());
        }
        if self.pos == start {
            return None;
        }
        Some(Segment::Name(&self.input[start..self.pos]))
    }

    /// The unparsed rest, with one separator consumed.
    fn rest(mut self) -> &'a str {
        let remaining = self.remaining();
        // `../` and a bare `..` are parent steps; `.../` is a separator
        // followed by one.
        if remaining != ".." && !remaining.starts_with("../") {
            let _ = self.eat_char('.') || self.eat_char('/');
        }
        self.remaining()
    }
}

impl TemplateContainer {
    /// Resolve `path` relative to this container.
    pub fn get_by_path(&self, path: &str) -> Option<PathValue> {
        self.resolve(path, 0)
    }

    pub(crate) fn resolve(&self, path: &str, hops: usize) -> Option<PathValue> {
        if hops > MAX_LINK_HOPS {
            log::warn!("link chain exceeded {} hops at `{}`", MAX_LINK_HOPS, path);
            return None;
        }
        if path.is_empty() {
            return Some(PathValue::Container(self.clone()));
        }
        if let Some(rest) = path.strip_prefix('/') {
            return self.root().resolve(rest, hops);
        }
        if let Some(rest) = path.strip_prefix("../") {
            return self.parent()?.resolve(rest, hops);
        }
        if path == ".." {
            return self.parent().map(PathValue::Container);
        }

        let mut cursor = PathCursor::new(path);
        let segment = cursor.pop_segment()?;
        let value = self.lookup(&segment)?;
        self.follow(value, cursor.rest(), hops)
    }

    /// Resolve one segment against this container's attributes or, for a
    /// list, its keyed and positional elements.
    fn lookup(&self, segment: &Segment) -> Option<AttributeValue> {
        match segment {
            Segment::Name(name) => self.attribute(name).or_else(|| {
                if self.is_list() {
                    self.keyed(name).map(AttributeValue::Container)
                } else {
                    None
                }
            }),
            Segment::Key(key) if self.is_list() => self.keyed(key).map(AttributeValue::Container),
            Segment::Position(index) if self.is_list() => {
                self.positional(*index).map(AttributeValue::Container)
            }
            _ => None,
        }
    }

    /// Continue resolving `rest` from a value found in this container.
    fn follow(&self, value: AttributeValue, rest: &str, hops: usize) -> Option<PathValue> {
        match value {
            AttributeValue::Scalar(scalar) => rest.is_empty().then_some(PathValue::Scalar(scalar)),
            AttributeValue::Container(child) => child.resolve(rest, hops),
            AttributeValue::Link(link) => match &link.list_keys {
                None => match self.resolve(&link.target_path, hops + 1)? {
                    PathValue::Container(target) => target.resolve(rest, hops + 1),
                    other if rest.is_empty() => Some(other),
                    _ => None,
                },
                Some(keys) => {
                    if rest.is_empty() {
                        return Some(PathValue::List(BoundLink {
                            link,
                            base: self.clone(),
                        }));
                    }
                    let mut cursor = PathCursor::new(rest);
                    let key = match cursor.pop_segment()? {
                        Segment::Position(n) => keys.get(n)?,
                        Segment::Key(k) => match k.parse::<usize>() {
                            Ok(n) => keys.get(n)?,
                            Err(_) => keys.iter().find(|candidate| candidate.as_str() == k)?,
                        },
                        Segment::Name(_) => return None,
                    };
                    let target = match self.resolve(&link.target_path, hops + 1)? {
                        PathValue::Container(target) => target,
                        _ => return None,
                    };
                    target.keyed(key)?.resolve(cursor.rest(), hops + 1)
                }
            },
        }
    }
}
