//! JSON literals: objects, arrays, strings, numbers, `true`, `false`, `null`.

use crate::error::Result;
use crate::rules::{choice, eoi, many, node, opt, pattern, seq, Grammar, GrammarBuilder};

use super::Lexicon;

pub fn build() -> Result<Grammar> {
    let lx = Lexicon::new(r"[ \t\r\n]*")?;
    let mut g = GrammarBuilder::new();

    let value = g.recursive("Value");

    let string = || -> Result<_> {
        Ok(node(
            "String",
            pattern(r#""(?:[^"\\\x00-\x1f]|\\(?:["\\/bfnrt]|u[0-9a-fA-F]{4}))*""#)?,
        ))
    };
    let number = node(
        "Number",
        pattern(r"-?(?:0|[1-9][0-9]*)(?:\.[0-9]+)?(?:[eE][+-]?[0-9]+)?")?,
    );

    let pair = node(
        "Pair",
        seq(vec![lx.t(string()?), lx.tok(":"), value.clone()]),
    );
    let object = node(
        "Object",
        seq(vec![
            lx.tok("{"),
            opt(seq(vec![
                pair.clone(),
                many(seq(vec![lx.tok(","), pair])),
            ])),
            lx.tok("}"),
        ]),
    );
    let array = node(
        "Array",
        seq(vec![
            lx.tok("["),
            opt(seq(vec![
                value.clone(),
                many(seq(vec![lx.tok(","), value.clone()])),
            ])),
            lx.tok("]"),
        ]),
    );

    g.define(
        &value,
        lx.t(choice(vec![
            object,
            array,
            string()?,
            number,
            node("True", lx.kw("true")),
            node("False", lx.kw("false")),
            node("Null", lx.kw("null")),
        ])),
    )?;

    g.build("json", seq(vec![value, lx.ws(), eoi()]))
}
