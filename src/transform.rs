//! Raw parse tree → normalized tree → [`Node`].
//!
//! [`transform`] rewrites tokens bottom-up: pass-through wrappers collapse
//! to their only child, postfix chains become explicit `FieldExpr` /
//! `IndexExpr` / `CallExpr` / `MethodCallExpr` nodes, flat operator chains
//! become nested `BinaryExpr` nodes, compound assignments and `while` loops
//! are desugared. [`lower`] then maps the normalized tokens onto the closed
//! [`Node`] type.

use std::rc::Rc;
use std::str::Chars;

use crate::ast::{BinaryOp, FunctionDef, Node, UnaryOp};
use crate::error::{Error, Position, Result};
use crate::token::Token;

// ── Token normalization ─────────────────────────────────────────────

/// Normalize a raw parse tree. Children are transformed before their parent.
pub fn transform(token: &Token) -> Result<Token> {
    let children = token
        .children
        .iter()
        .map(transform)
        .collect::<Result<Vec<_>>>()?;
    let token = Token::new(
        token.name.clone(),
        token.start,
        token.end,
        children,
        token.source.clone(),
    );
    rewrite(token)
}

fn rewrite(mut token: Token) -> Result<Token> {
    match token.name.as_str() {
        "Expr" | "Statement" | "ExprStatement" | "Paren" | "Chain" | "Postfix"
            if token.children.len() == 1 =>
        {
            Ok(token.children.remove(0))
        }
        "Chain" => split_chain(&token.children),
        "Postfix" => Ok(peel_postfix(&token.children)),
        "Assign" => desugar_compound(token),
        "While" => Ok(desugar_while(token)),
        "New" => Ok(rewrite_new(token)),
        _ => Ok(token),
    }
}

/// Split `[operand, Op, operand, Op, ...]` around its loosest operator.
///
/// Among operators of equal precedence the rightmost one is the split
/// point, which makes the resulting tree left-associative.
fn split_chain(items: &[Token]) -> Result<Token> {
    if items.len() == 1 {
        return Ok(items[0].clone());
    }
    let mut split = 1;
    let mut lowest = u8::MAX;
    for i in (1..items.len()).step_by(2) {
        let precedence = BinaryOp::from_symbol(items[i].text())?.precedence();
        if precedence <= lowest {
            lowest = precedence;
            split = i;
        }
    }
    let lhs = split_chain(&items[..split])?;
    let rhs = split_chain(&items[split + 1..])?;
    let source = lhs.source.clone();
    Ok(Token::new(
        "BinaryExpr",
        lhs.start,
        rhs.end,
        vec![lhs, items[split].clone(), rhs],
        source,
    ))
}

/// `[primary, suffix, suffix, ...]`, peeled from the right.
fn peel_postfix(items: &[Token]) -> Token {
    let Some((last, rest)) = items.split_last() else {
        unreachable!("Postfix always has a primary");
    };
    if rest.is_empty() {
        return last.clone();
    }
    let target = peel_postfix(rest);
    let (start, end, source) = (target.start, last.end, target.source.clone());
    match last.name.as_str() {
        "Field" => {
            let mut children = vec![target];
            children.extend(last.children.iter().cloned());
            Token::new("FieldExpr", start, end, children, source)
        }
        "Index" => {
            let mut children = vec![target];
            children.extend(last.children.iter().cloned());
            Token::new("IndexExpr", start, end, children, source)
        }
        "Call" if target.is("FieldExpr") => {
            // receiver, member, arguments...
            let mut children = target.children;
            children.extend(last.children.iter().cloned());
            Token::new("MethodCallExpr", start, end, children, source)
        }
        "Call" => {
            let mut children = vec![target];
            children.extend(last.children.iter().cloned());
            Token::new("CallExpr", start, end, children, source)
        }
        // Unknown suffix kinds surface as unrecognized nodes in `lower`.
        _ => Token::new(last.name.clone(), start, end, vec![target], source),
    }
}

/// `target op= value` → `target = target op value`.
fn desugar_compound(token: Token) -> Result<Token> {
    let [target, op, value] = <[Token; 3]>::try_from(token.children).map_err(|children| {
        Error::UnrecognizedNode {
            name: format!("Assign with {} children", children.len()),
            position: Position::at(&token.source, token.start),
        }
    })?;
    if op.text() == "=" {
        return Ok(Token::new(
            "Assign",
            token.start,
            token.end,
            vec![target, op, value],
            token.source,
        ));
    }
    let source = token.source.clone();
    // The binary operator is the assignment symbol minus its trailing `=`.
    let bin_op = Token::leaf("Op", op.start, op.end - 1, source.clone());
    BinaryOp::from_symbol(bin_op.text())?;
    let eq = Token::leaf("AssignOp", op.end - 1, op.end, source.clone());
    let combined = Token::new(
        "BinaryExpr",
        target.start,
        value.end,
        vec![target.clone(), bin_op, value],
        source.clone(),
    );
    Ok(Token::new(
        "Assign",
        token.start,
        token.end,
        vec![target, eq, combined],
        source,
    ))
}

/// `while (cond) body` → `for (; cond; ) body`.
fn desugar_while(token: Token) -> Token {
    let source = token.source.clone();
    let mut children = token.children.into_iter();
    let cond = children.next();
    let body = children.next();
    let at = cond.as_ref().map(|c| c.start).unwrap_or(token.start);
    let mut parts = vec![
        Token::leaf("ForInit", at, at, source.clone()),
        Token::new(
            "ForCond",
            at,
            cond.as_ref().map(|c| c.end).unwrap_or(at),
            cond.into_iter().collect(),
            source.clone(),
        ),
        Token::leaf("ForStep", at, at, source.clone()),
    ];
    parts.extend(body);
    Token::new("For", token.start, token.end, parts, source)
}

/// `new f(args)` → `NewExpr[f, args...]`.
fn rewrite_new(mut token: Token) -> Token {
    let source = token.source.clone();
    let Some(inner) = token.children.pop() else {
        return token;
    };
    let children = match inner.name.as_str() {
        "CallExpr" => inner.children,
        "MethodCallExpr" => {
            let mut rest = inner.children.into_iter();
            let receiver = rest.next();
            let member = rest.next();
            let callee = match (receiver, member) {
                (Some(r), Some(m)) => {
                    let (start, end) = (r.start, m.end);
                    Token::new("FieldExpr", start, end, vec![r, m], source.clone())
                }
                (Some(r), None) => r,
                _ => return Token::new("NewExpr", token.start, token.end, vec![], source),
            };
            std::iter::once(callee).chain(rest).collect()
        }
        _ => vec![inner],
    };
    Token::new("NewExpr", token.start, token.end, children, source)
}

// ── Lowering ────────────────────────────────────────────────────────

/// Map a normalized token tree onto [`Node`].
pub fn lower(token: &Token) -> Result<Node> {
    let kids = &token.children;
    Ok(match token.name.as_str() {
        "Script" => Node::Script(lower_all(kids)?),
        "Block" => Node::Block(lower_all(kids)?),
        "VarDecl" => Node::Var {
            name: ident_text(token, 0)?,
            init: kids.get(1).map(lower_boxed).transpose()?,
        },
        "FunctionDecl" | "FunctionExpr" => {
            let def = Rc::new(lower_function(token)?);
            if token.is("FunctionDecl") {
                Node::FunctionDecl(def)
            } else {
                Node::Function(def)
            }
        }
        "If" => Node::If {
            cond: lower_boxed(required(token, 0)?)?,
            then: lower_boxed(required(token, 1)?)?,
            otherwise: kids.get(2).map(lower_boxed).transpose()?,
        },
        "For" => Node::For {
            init: lower_slot(required(token, 0)?)?,
            cond: lower_slot(required(token, 1)?)?,
            step: lower_slot(required(token, 2)?)?,
            body: lower_boxed(required(token, 3)?)?,
        },
        "Foreach" => Node::Foreach {
            name: ident_text(token, 0)?,
            path: required(token, 1)?.text().to_string(),
            body: lower_boxed(required(token, 2)?)?,
        },
        "Return" => Node::Return(kids.first().map(lower_boxed).transpose()?),
        "Empty" => Node::Empty,

        "Assign" => Node::Assign {
            target: lower_boxed(required(token, 0)?)?,
            value: lower_boxed(required(token, 2)?)?,
        },
        "BinaryExpr" => Node::Binary {
            op: BinaryOp::from_symbol(required(token, 1)?.text())?,
            lhs: lower_boxed(required(token, 0)?)?,
            rhs: lower_boxed(required(token, 2)?)?,
        },
        "Unary" => Node::Unary {
            op: UnaryOp::from_symbol(required(token, 0)?.text())?,
            operand: lower_boxed(required(token, 1)?)?,
        },
        "FieldExpr" => Node::Field {
            object: lower_boxed(required(token, 0)?)?,
            name: ident_text(token, 1)?,
        },
        "IndexExpr" => Node::Index {
            object: lower_boxed(required(token, 0)?)?,
            index: lower_boxed(required(token, 1)?)?,
        },
        "CallExpr" => Node::Call {
            callee: lower_boxed(required(token, 0)?)?,
            args: lower_all(&kids[1..])?,
        },
        "MethodCallExpr" => Node::MethodCall {
            receiver: lower_boxed(required(token, 0)?)?,
            method: ident_text(token, 1)?,
            args: lower_all(&kids[2..])?,
        },
        "NewExpr" => Node::New {
            callee: lower_boxed(required(token, 0)?)?,
            args: lower_all(&kids[1..])?,
        },

        "Number" => Node::Number(token.text().parse::<f64>().map_err(|_| {
            Error::TypeError(format!("invalid number literal `{}`", token.text()))
        })?),
        "String" => Node::Str(unquote(token.text())),
        "True" => Node::Bool(true),
        "False" => Node::Bool(false),
        "Null" => Node::Null,
        "Ident" => Node::Ident(token.text().to_string()),
        "Object" => Node::Object(
            kids.iter()
                .map(|pair| {
                    let key = required(pair, 0)?;
                    let key = if key.is("String") {
                        unquote(key.text())
                    } else {
                        key.text().to_string()
                    };
                    Ok((key, lower(required(pair, 1)?)?))
                })
                .collect::<Result<Vec<_>>>()?,
        ),
        "Array" => Node::Array(lower_all(kids)?),

        _ => return Err(unrecognized(token)),
    })
}

fn lower_all(tokens: &[Token]) -> Result<Vec<Node>> {
    tokens.iter().map(lower).collect()
}

fn lower_boxed(token: &Token) -> Result<Box<Node>> {
    lower(token).map(Box::new)
}

/// `ForInit` / `ForCond` / `ForStep`: empty when the clause was omitted.
fn lower_slot(token: &Token) -> Result<Option<Box<Node>>> {
    token.children.first().map(lower_boxed).transpose()
}

fn lower_function(token: &Token) -> Result<FunctionDef> {
    let name = token.find("Ident").map(|t| t.text().to_string());
    let params = token
        .find("Params")
        .map(|p| p.children.iter().map(|t| t.text().to_string()).collect())
        .unwrap_or_default();
    let body = match token.find("Block") {
        Some(block) => lower_all(&block.children)?,
        None => return Err(unrecognized(token)),
    };
    Ok(FunctionDef { name, params, body })
}

fn required(token: &Token, index: usize) -> Result<&Token> {
    token.child(index).ok_or_else(|| unrecognized(token))
}

fn ident_text(token: &Token, index: usize) -> Result<String> {
    let child = required(token, index)?;
    if child.is("Ident") {
        Ok(child.text().to_string())
    } else {
        Err(unrecognized(child))
    }
}

fn unrecognized(token: &Token) -> Error {
    Error::UnrecognizedNode {
        name: token.name.clone(),
        position: token.position(),
    }
}

/// Strip the quotes of a string literal and resolve its escapes.
pub fn unquote(literal: &str) -> String {
    let inner = if literal.len() >= 2 {
        &literal[1..literal.len() - 1]
    } else {
        literal
    };
    let mut out = String::with_capacity(inner.len());
    let mut chars = inner.chars();
    while let Some(ch) = chars.next() {
        if ch != '\\' {
            out.push(ch);
            continue;
        }
        match chars.next() {
            Some('n') => out.push('\n'),
            Some('t') => out.push('\t'),
            Some('r') => out.push('\r'),
            Some('b') => out.push('\u{0008}'),
            Some('f') => out.push('\u{000C}'),
            Some('v') => out.push('\u{000B}'),
            Some('0') => out.push('\0'),
            Some('u') => {
                let decoded = match hex_unit(&mut chars, 4) {
                    Some(high @ 0xD800..=0xDBFF) => low_surrogate(&mut chars).and_then(|low| {
                        char::from_u32(0x10000 + ((high - 0xD800) << 10) + (low - 0xDC00))
                    }),
                    Some(unit) => char::from_u32(unit),
                    None => None,
                };
                out.push(decoded.unwrap_or(char::REPLACEMENT_CHARACTER));
            }
            Some('x') => {
                let decoded = hex_unit(&mut chars, 2).and_then(char::from_u32);
                out.push(decoded.unwrap_or(char::REPLACEMENT_CHARACTER));
            }
            // Line continuation.
            Some('\n') => {}
            Some(other) => out.push(other),
            None => out.push('\\'),
        }
    }
    out
}

fn hex_unit(chars: &mut Chars<'_>, digits: usize) -> Option<u32> {
    let hex: String = chars.by_ref().take(digits).collect();
    if hex.len() != digits {
        return None;
    }
    u32::from_str_radix(&hex, 16).ok()
}

/// Consume a `\uXXXX` low surrogate if one comes next.
fn low_surrogate(chars: &mut Chars<'_>) -> Option<u32> {
    let mut ahead = chars.clone();
    if ahead.next() != Some('\\') || ahead.next() != Some('u') {
        return None;
    }
    let unit = hex_unit(&mut ahead, 4).filter(|unit| (0xDC00..=0xDFFF).contains(unit))?;
    *chars = ahead;
    Some(unit)
}
