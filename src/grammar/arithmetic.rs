//! Numbers, `+ - * / %`, unary minus and parentheses.
//!
//! Token names match the script grammar's expression tokens so the same
//! transformer and evaluator handle both.

use crate::error::Result;
use crate::rules::{choice, eoi, lit, many, node, pattern, seq, Grammar, GrammarBuilder};

use super::Lexicon;

pub fn build() -> Result<Grammar> {
    let lx = Lexicon::new(r"\s*")?;
    let mut g = GrammarBuilder::new();

    let expr = g.recursive("Expr");
    let unary = g.recursive("Unary");

    let number = node("Number", pattern(r"\d+(?:\.\d+)?(?:[eE][+-]?\d+)?")?);
    let paren = node("Paren", seq(vec![lx.tok("("), expr.clone(), lx.tok(")")]));
    let atom = lx.t(choice(vec![number, paren]));

    g.define(
        &unary,
        choice(vec![
            node(
                "Unary",
                seq(vec![lx.t(node("UnaryOp", lit("-"))), unary.clone()]),
            ),
            atom,
        ]),
    )?;

    let op = node(
        "Op",
        choice(vec![lit("+"), lit("-"), lit("*"), lit("/"), lit("%")]),
    );
    let chain = node(
        "Chain",
        seq(vec![unary.clone(), many(seq(vec![lx.t(op), unary]))]),
    );
    g.define(&expr, node("Expr", chain))?;

    g.build("arithmetic", seq(vec![expr, lx.ws(), eoi()]))
}
