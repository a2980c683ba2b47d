//! JSON text → containers and script values, parsed with the JSON grammar.
//!
//! Containers read the shape [`crate::json`] writes: objects become
//! containers, arrays become lists, `{"linkTo": ..., "listKeys": [...]}`
//! becomes a link, and list elements may carry their key in `$key`.
//! Scalar list elements are stored as a `value` attribute of the element.

use crate::ast::Node;
use crate::container::{Scalar, TemplateContainer, TemplateLink};
use crate::error::{Error, Result};
use crate::grammar;
use crate::json::{ITEMS_FIELD, KEY_FIELD};
use crate::primitives::format_number;
use crate::transform::{lower, transform};
use crate::value::{JsonObject, Value};

/// Deserialize a JSON document into a container tree. The document must
/// be an object or an array.
pub fn container_from_json(input: &str) -> Result<TemplateContainer> {
    let root = TemplateContainer::new();
    match parse(input)? {
        Node::Object(fields) => fill_object(&root, &fields)?,
        Node::Array(items) => fill_list(&root, &items)?,
        other => {
            return Err(Error::TypeError(format!(
                "container JSON must be an object or array, got {}",
                other.kind()
            )))
        }
    }
    Ok(root)
}

/// Deserialize any JSON document into a script value.
pub fn value_from_json(input: &str) -> Result<Value> {
    Ok(to_value(&parse(input)?))
}

fn parse(input: &str) -> Result<Node> {
    let token = grammar::json()?.parse_one(input)?;
    lower(&transform(&token)?)
}

fn to_value(node: &Node) -> Value {
    match node {
        Node::Number(n) => Value::Number(*n),
        Node::Str(s) => Value::String(s.clone()),
        Node::Bool(b) => Value::Bool(*b),
        Node::Object(fields) => {
            let mut object = JsonObject::new();
            for (key, value) in fields {
                object.set(key, to_value(value));
            }
            Value::object(object)
        }
        Node::Array(items) => Value::list(items.iter().map(to_value).collect()),
        _ => Value::Null,
    }
}

fn scalar(node: &Node) -> Option<Scalar> {
    match node {
        Node::Number(n) => Some(Scalar::Number(*n)),
        Node::Str(s) => Some(Scalar::String(s.clone())),
        Node::Bool(b) => Some(Scalar::Boolean(*b)),
        _ => None,
    }
}

fn fill_object(container: &TemplateContainer, fields: &[(String, Node)]) -> Result<()> {
    for (name, value) in fields {
        match (name.as_str(), value) {
            (KEY_FIELD, _) => {}
            (ITEMS_FIELD, Node::Array(items)) => fill_list(container, items)?,
            (_, Node::Object(inner)) => match link(inner)? {
                Some(link) => container.add_link(name, link),
                None => fill_object(&container.add_child(name), inner)?,
            },
            (_, Node::Array(items)) => fill_list(&container.add_child(name), items)?,
            (_, Node::Null) => {}
            (_, other) => {
                if let Some(scalar) = scalar(other) {
                    container.add_attribute(name, scalar);
                }
            }
        }
    }
    Ok(())
}

fn fill_list(container: &TemplateContainer, items: &[Node]) -> Result<()> {
    for item in items {
        match item {
            Node::Object(fields) => {
                let key = fields.iter().find_map(|(name, value)| match value {
                    Node::Str(key) if name == KEY_FIELD => Some(key.as_str()),
                    _ => None,
                });
                fill_object(&container.add_array_value(key), fields)?;
            }
            Node::Array(inner) => fill_list(&container.add_array_value(None), inner)?,
            other => {
                let element = container.add_array_value(None);
                if let Some(scalar) = scalar(other) {
                    element.add_attribute("value", scalar);
                }
            }
        }
    }
    Ok(())
}

/// `{"linkTo": "path"}` or `{"linkTo": "path", "listKeys": ["a", "b"]}`.
fn link(fields: &[(String, Node)]) -> Result<Option<TemplateLink>> {
    let field = |wanted: &str| {
        fields
            .iter()
            .find(|(name, _)| name == wanted)
            .map(|(_, value)| value)
    };
    let Some(Node::Str(target_path)) = field("linkTo") else {
        return Ok(None);
    };
    let list_keys = match field("listKeys") {
        None | Some(Node::Null) => None,
        Some(Node::Array(keys)) => Some(
            keys.iter()
                .map(|key| match key {
                    Node::Str(s) => Ok(s.clone()),
                    Node::Number(n) => Ok(format_number(*n)),
                    other => Err(Error::TypeError(format!(
                        "listKeys entries must be strings, got {}",
                        other.kind()
                    ))),
                })
                .collect::<Result<Vec<_>>>()?,
        ),
        Some(other) => {
            return Err(Error::TypeError(format!(
                "listKeys must be an array, got {}",
                other.kind()
            )))
        }
    };
    Ok(Some(TemplateLink {
        target_path: target_path.clone(),
        list_keys,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::json::{container_to_json, value_to_json};
    use crate::path::PathValue;

    #[test]
    fn round_trip_attributes() {
        let text = r#"{"name":"templet","version":2,"stable":false}"#;
        let root = container_from_json(text).unwrap();
        assert_eq!(container_to_json(&root), text);
    }

    #[test]
    fn round_trip_list() {
        let text = r#"{"items":[{"n":1},{"n":2}]}"#;
        let root = container_from_json(text).unwrap();
        assert!(root.get_by_path("items").unwrap().as_container().unwrap().is_list());
        assert_eq!(container_to_json(&root), text);
    }

    #[test]
    fn round_trip_keyed_list_and_link() {
        let text = r#"{"rows":[{"$key":"a","v":1},{"$key":"b","v":2}],"pick":{"linkTo":"rows","listKeys":["b"]}}"#;
        let root = container_from_json(text).unwrap();
        assert_eq!(
            root.get_by_path("rows[b].v"),
            Some(PathValue::Scalar(Scalar::Number(2.0)))
        );
        assert_eq!(container_to_json(&root), text);
    }

    #[test]
    fn scalar_list_elements() {
        let root = container_from_json(r#"{"tags":["x","y"]}"#).unwrap();
        assert_eq!(
            root.get_by_path("tags[*1].value"),
            Some(PathValue::Scalar(Scalar::String("y".into())))
        );
    }

    #[test]
    fn rejects_scalar_document() {
        assert!(matches!(container_from_json("42"), Err(Error::TypeError(_))));
    }

    #[test]
    fn value_round_trip() {
        let text = r#"{"a":[1,2.5,"s\n"],"b":{"c":null,"d":true}}"#;
        let value = value_from_json(text).unwrap();
        assert_eq!(value_to_json(&value), text);
    }

    #[test]
    fn surrogate_pairs_decode_to_one_char() {
        assert_eq!(
            value_from_json(r#""\ud83d\ude00""#).unwrap(),
            Value::String("\u{1F600}".into())
        );
        // A lone high surrogate cannot be decoded.
        assert_eq!(
            value_from_json(r#""\ud83dx""#).unwrap(),
            Value::String("\u{FFFD}x".into())
        );
    }

    #[test]
    fn parse_error_has_position() {
        let err = value_from_json("{\"a\": }").unwrap_err();
        assert_eq!(err.code(), "parse-failure");
        assert!(err.position().is_some());
    }
}
