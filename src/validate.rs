use crate::container::{AttributeValue, TemplateContainer, TemplateLink};
use crate::path::PathValue;

/// A link that does not resolve.
#[derive(Debug, Clone, PartialEq)]
pub struct ValidationError {
    pub message: String,
    /// Where the link lives, e.g. `["orders", "[0]", "customer"]`.
    pub path: Vec<String>,
    /// Machine-readable error code.
    pub code: &'static str,
}

/// Check that every link in the tree resolves from the container holding
/// it, and that every key of a list link names an element of its target.
///
/// Returns an empty vec when all links are valid. Cyclic link chains end
/// at the hop limit and are reported as unresolved.
pub fn validate_links(root: &TemplateContainer) -> Vec<ValidationError> {
    let mut errors = Vec::new();
    let mut path: Vec<String> = Vec::new();
    walk_links(root, &mut path, &mut errors);
    errors
}

fn walk_links(container: &TemplateContainer, path: &mut Vec<String>, errors: &mut Vec<ValidationError>) {
    for (name, value) in container.attributes() {
        path.push(name);
        match value {
            AttributeValue::Link(link) => {
                if let Some((code, message)) = check_link(container, &link) {
                    errors.push(ValidationError {
                        message,
                        path: path.clone(),
                        code,
                    });
                }
            }
            // Only descend into children this container owns; loop aliases
            // point elsewhere in the tree.
            AttributeValue::Container(child) if owned_by(&child, container) => {
                walk_links(&child, path, errors);
            }
            _ => {}
        }
        path.pop();
    }

    for (key, element) in container.array_keys().into_iter().zip(container.array_values()) {
        path.push(format!("[{}]", key));
        walk_links(&element, path, errors);
        path.pop();
    }
}

fn owned_by(child: &TemplateContainer, container: &TemplateContainer) -> bool {
    child
        .parent()
        .is_some_and(|parent| parent.ptr_eq(container))
}

fn check_link(holder: &TemplateContainer, link: &TemplateLink) -> Option<(&'static str, String)> {
    let Some(target) = holder.get_by_path(&link.target_path) else {
        return Some((
            "unresolved-link",
            format!("link target `{}` does not resolve", link.target_path),
        ));
    };
    let keys = link.list_keys.as_ref()?;
    let PathValue::Container(target) = target else {
        return Some((
            "link-target-not-list",
            format!("list link target `{}` is not a container", link.target_path),
        ));
    };
    if !keys.is_empty() && !target.is_list() {
        return Some((
            "link-target-not-list",
            format!("list link target `{}` is not a list", link.target_path),
        ));
    }
    let missing: Vec<&str> = keys
        .iter()
        .filter(|key| target.keyed(key).is_none())
        .map(String::as_str)
        .collect();
    if missing.is_empty() {
        None
    } else {
        Some((
            "unresolved-list-key",
            format!(
                "list link to `{}` names missing key(s): {}",
                link.target_path,
                missing.join(", ")
            ),
        ))
    }
}
