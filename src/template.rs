//! Template text → script source.
//!
//! ```text
//! Hello [%name%]!            var __result = "";
//! [%if (flag)%]              __result += "Hello ";
//!   yes                      __result += (name);
//! [%end%]                    __result += "!\n";
//!                            if (flag) {
//!                            __result += "\n  yes\n";
//!                            }
//!                            return __result;
//! ```
//!
//! A script run is classified by its surface form only:
//!
//! * `end` (any case) closes the innermost block;
//! * a run that starts with `else` closes the open block and opens another;
//! * a run that starts with `if`, `for`, `foreach` or `while` opens a block;
//! * a run ending in `;` is copied as a statement;
//! * anything else is an expression whose value is appended to the output.

use crate::error::{Error, Position, Result};
use crate::options::EngineOptions;

/// Name of the accumulator the compiled script builds its output in.
pub const RESULT_VAR: &str = "__result";

const BLOCK_KEYWORDS: &[&str] = &["if", "for", "foreach", "while"];

/// Compile `template` into script source whose return value is the
/// rendered text.
pub fn compile(template: &str, options: &EngineOptions) -> Result<String> {
    let open = options.open_delimiter.as_str();
    let close = options.close_delimiter.as_str();
    if open.is_empty() || close.is_empty() {
        return Err(Error::Grammar("template delimiters must not be empty".to_string()));
    }
    log::debug!("compiling template of {} bytes", template.len());

    let mut out = format!("var {} = \"\";\n", RESULT_VAR);
    let mut pos = 0;
    while pos < template.len() {
        let Some(found) = template[pos..].find(open) else {
            // Trailing literal text gets a block of its own.
            out.push_str("{ ");
            emit_literal(&mut out, &template[pos..]);
            out.push_str("}\n");
            break;
        };
        let open_at = pos + found;
        emit_literal(&mut out, &template[pos..open_at]);

        let body_start = open_at + open.len();
        let Some(len) = template[body_start..].find(close) else {
            return Err(Error::UnclosedScript {
                position: Position::at(template, open_at),
            });
        };
        emit_script(&mut out, template[body_start..body_start + len].trim());
        pos = body_start + len + close.len();
    }
    out.push_str(&format!("return {};\n", RESULT_VAR));
    log::trace!("compiled script:\n{}", out);
    Ok(out)
}

fn emit_literal(out: &mut String, text: &str) {
    if text.is_empty() {
        return;
    }
    out.push_str(RESULT_VAR);
    out.push_str(" += ");
    quote_into(out, text);
    out.push_str(";\n");
}

fn emit_script(out: &mut String, script: &str) {
    if script.is_empty() {
        return;
    }
    if script.eq_ignore_ascii_case("end") {
        out.push_str("}\n");
    } else if starts_with_keyword(script, "else") {
        out.push_str("} ");
        out.push_str(script);
        out.push_str(" {\n");
    } else if BLOCK_KEYWORDS
        .iter()
        .any(|keyword| starts_with_keyword(script, keyword))
    {
        out.push_str(script);
        out.push_str(" {\n");
    } else if script.ends_with(';') {
        out.push_str(script);
        out.push('\n');
    } else {
        out.push_str(&format!("{} += ({});\n", RESULT_VAR, script));
    }
}

/// `keyword` followed by something that cannot continue an identifier.
fn starts_with_keyword(script: &str, keyword: &str) -> bool {
    script.starts_with(keyword)
        && !script[keyword.len()..]
            .chars()
            .next()
            .is_some_and(|c| c.is_alphanumeric() || c == '_' || c == '$')
}

/// Write `text` as a double-quoted script string literal.
fn quote_into(out: &mut String, text: &str) {
    out.push('"');
    for ch in text.chars() {
        match ch {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            c if c < '\u{0020}' => out.push_str(&format!("\\u{:04x}", c as u32)),
            c => out.push(c),
        }
    }
    out.push('"');
}

#[cfg(test)]
mod tests {
    use super::*;

    fn compile_default(template: &str) -> String {
        compile(template, &EngineOptions::default()).unwrap()
    }

    #[test]
    fn literal_only() {
        assert_eq!(
            compile_default("plain"),
            "var __result = \"\";\n{ __result += \"plain\";\n}\nreturn __result;\n"
        );
    }

    #[test]
    fn expression_run() {
        let script = compile_default("Hi [%name%]");
        assert!(script.contains("__result += \"Hi \";\n"));
        assert!(script.contains("__result += (name);\n"));
    }

    #[test]
    fn control_runs() {
        let script = compile_default("[%if (a)%]x[%else%]y[%END%]");
        assert!(script.contains("if (a) {\n"));
        assert!(script.contains("} else {\n"));
        assert!(script.ends_with("}\nreturn __result;\n"));
    }

    #[test]
    fn keyword_prefix_is_not_a_header() {
        let script = compile_default("[%format%]");
        assert!(script.contains("__result += (format);"));
    }

    #[test]
    fn statement_run() {
        let script = compile_default("[%var x = 1;%]");
        assert!(script.contains("\nvar x = 1;\n"));
    }

    #[test]
    fn escapes_literals() {
        let script = compile_default("a\"b\\c\n");
        assert!(script.contains(r#"__result += "a\"b\\c\n";"#));
    }

    #[test]
    fn unclosed_script_reports_open_delimiter() {
        let err = compile("ab\ncd [%oops", &EngineOptions::default()).unwrap_err();
        assert_eq!(
            err,
            Error::UnclosedScript {
                position: Position {
                    line: 1,
                    column: 3,
                    offset: 6,
                }
            }
        );
    }

    #[test]
    fn custom_delimiters() {
        let options = EngineOptions::default().with_delimiters("{{", "}}");
        let script = compile("x{{ y }}", &options).unwrap();
        assert!(script.contains("__result += (y);"));
    }
}
