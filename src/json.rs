use std::fmt::Write;

use crate::container::{AttributeValue, Scalar, TemplateContainer, TemplateLink};
use crate::primitives::format_number;
use crate::value::Value;

/// Attribute holding a list element's key when it is not its position.
pub const KEY_FIELD: &str = "$key";
/// Attribute holding the elements of a container that also has attributes.
pub const ITEMS_FIELD: &str = "$items";

/// Nesting beyond this is written as `null`; script objects may be cyclic.
const MAX_DEPTH: usize = 128;

/// JSON formatting style.
#[derive(Clone, Copy)]
pub enum JsonStyle {
    /// Compact: no whitespace between tokens.
    Compact,
    /// Pretty: 2-space indented, one entry per line.
    Pretty,
}

struct JsonWriter {
    buf: String,
    style: JsonStyle,
    depth: usize,
}

impl JsonWriter {
    fn new(style: JsonStyle) -> Self {
        JsonWriter {
            buf: String::new(),
            style,
            depth: 0,
        }
    }

    fn is_pretty(&self) -> bool {
        matches!(self.style, JsonStyle::Pretty)
    }

    fn newline(&mut self) {
        if self.is_pretty() {
            self.buf.push('\n');
            for _ in 0..self.depth {
                self.buf.push_str("  ");
            }
        }
    }

    fn space(&mut self) {
        if self.is_pretty() {
            self.buf.push(' ');
        }
    }

    fn open(&mut self, bracket: char) -> bool {
        if self.depth >= MAX_DEPTH {
            self.buf.push_str("null");
            return false;
        }
        self.buf.push(bracket);
        self.depth += 1;
        true
    }

    fn close(&mut self, bracket: char, empty: bool) {
        self.depth -= 1;
        if !empty {
            self.newline();
        }
        self.buf.push(bracket);
    }

    /// A list without attributes is an array. Anything else is an object
    /// whose elements, if any, go under `$items`; `key` is written as
    /// `$key` for elements not keyed by their position.
    fn write_container(&mut self, container: &TemplateContainer, key: Option<&str>) {
        let attributes = container.attributes();
        let elements = container.array_values();
        if key.is_none() && attributes.is_empty() && !elements.is_empty() {
            self.write_elements(container);
            return;
        }
        if !self.open('{') {
            return;
        }
        let mut first = true;
        if let Some(key) = key {
            self.entry_sep(&mut first);
            self.write_key(KEY_FIELD);
            self.write_string_value(key);
        }
        for (name, value) in &attributes {
            self.entry_sep(&mut first);
            self.write_key(name);
            self.write_attribute(value);
        }
        if !elements.is_empty() {
            self.entry_sep(&mut first);
            self.write_key(ITEMS_FIELD);
            self.write_elements(container);
        }
        self.close('}', first);
    }

    fn write_elements(&mut self, container: &TemplateContainer) {
        if !self.open('[') {
            return;
        }
        let keys = container.array_keys();
        let elements = container.array_values();
        for (i, (key, element)) in keys.iter().zip(&elements).enumerate() {
            if i > 0 {
                self.buf.push(',');
            }
            self.newline();
            let positional = *key == i.to_string();
            self.write_container(element, (!positional).then_some(key.as_str()));
        }
        self.close(']', elements.is_empty());
    }

    fn write_attribute(&mut self, value: &AttributeValue) {
        match value {
            AttributeValue::Scalar(scalar) => self.write_scalar(scalar),
            AttributeValue::Container(child) => self.write_container(child, None),
            AttributeValue::Link(link) => self.write_link(link),
        }
    }

    /// `{"linkTo": path}` plus `"listKeys"` for list links.
    fn write_link(&mut self, link: &TemplateLink) {
        if !self.open('{') {
            return;
        }
        let mut first = true;
        self.entry_sep(&mut first);
        self.write_key("linkTo");
        self.write_string_value(&link.target_path);
        if let Some(keys) = &link.list_keys {
            self.entry_sep(&mut first);
            self.write_key("listKeys");
            self.buf.push('[');
            for (i, key) in keys.iter().enumerate() {
                if i > 0 {
                    self.buf.push(',');
                }
                self.write_string_value(key);
            }
            self.buf.push(']');
        }
        self.close('}', false);
    }

    fn write_scalar(&mut self, scalar: &Scalar) {
        match scalar {
            Scalar::String(s) => self.write_string_value(s),
            Scalar::Number(n) => self.write_number(*n),
            Scalar::Boolean(b) => self.buf.push_str(if *b { "true" } else { "false" }),
        }
    }

    fn write_value(&mut self, value: &Value) {
        match value {
            Value::Null | Value::Function(_) => self.buf.push_str("null"),
            Value::Bool(b) => self.buf.push_str(if *b { "true" } else { "false" }),
            Value::Number(n) => self.write_number(*n),
            Value::String(s) => self.write_string_value(s),
            Value::List(items) => {
                if !self.open('[') {
                    return;
                }
                let items = items.borrow();
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        self.buf.push(',');
                    }
                    self.newline();
                    self.write_value(item);
                }
                self.close(']', items.is_empty());
            }
            Value::Object(object) => {
                if !self.open('{') {
                    return;
                }
                let object = object.borrow();
                let mut first = true;
                for (key, field) in object.fields() {
                    self.entry_sep(&mut first);
                    self.write_key(key);
                    self.write_value(field);
                }
                self.close('}', first);
            }
            Value::Container(container) => self.write_container(container, None),
            Value::Link(bound) => self.write_link(&bound.link),
        }
    }

    /// JSON has no NaN or infinities; they are written as `null`.
    fn write_number(&mut self, n: f64) {
        if n.is_finite() {
            self.buf.push_str(&format_number(n));
        } else {
            self.buf.push_str("null");
        }
    }

    fn entry_sep(&mut self, first: &mut bool) {
        if *first {
            *first = false;
        } else {
            self.buf.push(',');
        }
        self.newline();
    }

    fn write_key(&mut self, key: &str) {
        self.write_string_value(key);
        self.buf.push(':');
        self.space();
    }

    fn write_string_value(&mut self, s: &str) {
        self.buf.push('"');
        for ch in s.chars() {
            match ch {
                '"' => self.buf.push_str("\\\""),
                '\\' => self.buf.push_str("\\\\"),
                '\n' => self.buf.push_str("\\n"),
                '\r' => self.buf.push_str("\\r"),
                '\t' => self.buf.push_str("\\t"),
                '\u{0008}' => self.buf.push_str("\\b"),
                '\u{000C}' => self.buf.push_str("\\f"),
                c if c < '\u{0020}' => {
                    let _ = write!(&mut self.buf, "\\u{:04x}", c as u32);
                }
                c => self.buf.push(c),
            }
        }
        self.buf.push('"');
    }
}

/// Serialize a container tree to compact JSON.
pub fn container_to_json(container: &TemplateContainer) -> String {
    let mut w = JsonWriter::new(JsonStyle::Compact);
    w.write_container(container, None);
    w.buf
}

/// Serialize a container tree to pretty-printed JSON (2-space indent).
pub fn container_to_json_pretty(container: &TemplateContainer) -> String {
    let mut w = JsonWriter::new(JsonStyle::Pretty);
    w.write_container(container, None);
    w.buf
}

/// Serialize a script value to compact JSON. Functions become `null`.
pub fn value_to_json(value: &Value) -> String {
    let mut w = JsonWriter::new(JsonStyle::Compact);
    w.write_value(value);
    w.buf
}

pub fn value_to_json_pretty(value: &Value) -> String {
    let mut w = JsonWriter::new(JsonStyle::Pretty);
    w.write_value(value);
    w.buf
}
