//! The JavaScript-like scripting language.
//!
//! The raw tree is deliberately flat: binary operators come out as one
//! `Chain` of alternating operands and `Op` tokens, and postfix suffixes
//! as one `Postfix` list. [`crate::transform`] gives them their structure.

use crate::error::Result;
use crate::rules::{
    choice, eoi, lit, many, node, not, opt, pattern, seq, Grammar, GrammarBuilder, RuleRef,
};

use super::Lexicon;

const KEYWORDS: &[&str] = &[
    "var", "function", "if", "else", "for", "foreach", "in", "while", "return", "true", "false",
    "null", "new",
];

const IDENT: &str = r"[A-Za-z_$][A-Za-z0-9_$]*";

pub fn build() -> Result<Grammar> {
    let lx = Lexicon::new(r"(?:\s|//[^\n]*|/\*(?s:.*?)\*/)*")?;
    let mut g = GrammarBuilder::new();

    let expr = g.recursive("Expr");
    let statement = g.recursive("Statement");
    let unary = g.recursive("Unary");

    let keyword = choice(KEYWORDS.iter().map(|k| lx.kw(k)).collect());
    // Identifiers in binding position exclude keywords; member names do not.
    let ident = lx.t(seq(vec![not(keyword), node("Ident", pattern(IDENT)?)]));
    let member = lx.t(node("Ident", pattern(IDENT)?));
    let semi = opt(lx.tok(";"));

    let list_of = |item: RuleRef| {
        opt(seq(vec![
            item.clone(),
            many(seq(vec![lx.tok(","), item])),
            opt(lx.tok(",")),
        ]))
    };

    // ── Expressions ─────────────────────────────────────────────────

    let number = lx.t(node(
        "Number",
        pattern(r"(?:\d+(?:\.\d+)?|\.\d+)(?:[eE][+-]?\d+)?")?,
    ));
    let string = lx.t(node(
        "String",
        pattern(r#""(?:[^"\\]|\\(?s:.))*"|'(?:[^'\\]|\\(?s:.))*'"#)?,
    ));

    let block = node(
        "Block",
        seq(vec![lx.tok("{"), many(statement.clone()), lx.tok("}")]),
    );
    let params = node(
        "Params",
        seq(vec![lx.tok("("), list_of(ident.clone()), lx.tok(")")]),
    );
    let function_expr = node(
        "FunctionExpr",
        seq(vec![
            lx.kw("function"),
            opt(ident.clone()),
            params.clone(),
            block.clone(),
        ]),
    );
    let pair = node(
        "Pair",
        seq(vec![
            choice(vec![member.clone(), string.clone()]),
            lx.tok(":"),
            expr.clone(),
        ]),
    );
    let object = node(
        "Object",
        seq(vec![lx.tok("{"), list_of(pair), lx.tok("}")]),
    );
    let array = node(
        "Array",
        seq(vec![lx.tok("["), list_of(expr.clone()), lx.tok("]")]),
    );
    let paren = node(
        "Paren",
        seq(vec![lx.tok("("), expr.clone(), lx.tok(")")]),
    );

    let primary = choice(vec![
        number,
        string,
        node("True", lx.kw("true")),
        node("False", lx.kw("false")),
        node("Null", lx.kw("null")),
        function_expr,
        object,
        array,
        ident.clone(),
        paren,
    ]);

    let suffix = choice(vec![
        node("Field", seq(vec![lx.tok("."), member])),
        node(
            "Index",
            seq(vec![lx.tok("["), expr.clone(), lx.tok("]")]),
        ),
        node(
            "Call",
            seq(vec![lx.tok("("), list_of(expr.clone()), lx.tok(")")]),
        ),
    ]);
    let postfix = node("Postfix", seq(vec![primary, many(suffix)]));
    let new_expr = node("New", seq(vec![lx.kw("new"), postfix.clone()]));

    let unary_op = node(
        "UnaryOp",
        choice(vec![
            seq(vec![lit("!"), not(lit("="))]),
            seq(vec![lit("-"), not(lit("-"))]),
        ]),
    );
    g.define(
        &unary,
        choice(vec![
            node("Unary", seq(vec![lx.t(unary_op), unary.clone()])),
            new_expr,
            postfix.clone(),
        ]),
    )?;

    // Longest symbols first; arithmetic and bitwise symbols must not be
    // the head of a compound assignment.
    let op = node(
        "Op",
        choice(vec![
            lit("=="),
            lit("!="),
            lit("<="),
            lit(">="),
            seq(vec![
                choice(vec![
                    lit("<<"),
                    lit(">>"),
                    lit("&&"),
                    lit("||"),
                    lit("<"),
                    lit(">"),
                    lit("&"),
                    lit("|"),
                    lit("^"),
                    lit("*"),
                    lit("/"),
                    lit("%"),
                    lit("+"),
                    lit("-"),
                ]),
                not(lit("=")),
            ]),
        ]),
    );
    let chain = node(
        "Chain",
        seq(vec![unary.clone(), many(seq(vec![lx.t(op), unary]))]),
    );

    let assign_op = node(
        "AssignOp",
        choice(vec![
            lit("<<="),
            lit(">>="),
            lit("&&="),
            lit("||="),
            lit("+="),
            lit("-="),
            lit("*="),
            lit("/="),
            lit("%="),
            lit("&="),
            lit("|="),
            lit("^="),
            seq(vec![lit("="), not(lit("="))]),
        ]),
    );
    let assign = node(
        "Assign",
        seq(vec![postfix, lx.t(assign_op), expr.clone()]),
    );
    g.define(&expr, node("Expr", choice(vec![assign, chain])))?;

    // ── Statements ──────────────────────────────────────────────────

    let var_decl = node(
        "VarDecl",
        seq(vec![
            lx.kw("var"),
            ident.clone(),
            opt(seq(vec![lx.tok("="), expr.clone()])),
        ]),
    );
    let function_decl = node(
        "FunctionDecl",
        seq(vec![lx.kw("function"), ident.clone(), params, block.clone()]),
    );
    let if_stmt = node(
        "If",
        seq(vec![
            lx.kw("if"),
            lx.tok("("),
            expr.clone(),
            lx.tok(")"),
            statement.clone(),
            opt(seq(vec![lx.kw("else"), statement.clone()])),
        ]),
    );
    let for_stmt = node(
        "For",
        seq(vec![
            lx.kw("for"),
            lx.tok("("),
            node("ForInit", opt(choice(vec![var_decl.clone(), expr.clone()]))),
            lx.tok(";"),
            node("ForCond", opt(expr.clone())),
            lx.tok(";"),
            node("ForStep", opt(expr.clone())),
            lx.tok(")"),
            statement.clone(),
        ]),
    );
    let path = lx.t(node("Path", pattern(r"[A-Za-z0-9_$.*/\[\]-]+")?));
    let foreach_stmt = node(
        "Foreach",
        seq(vec![
            lx.kw("foreach"),
            choice(vec![
                seq(vec![
                    lx.tok("("),
                    ident.clone(),
                    lx.kw("in"),
                    path.clone(),
                    lx.tok(")"),
                ]),
                seq(vec![ident, lx.kw("in"), path]),
            ]),
            statement.clone(),
        ]),
    );
    let while_stmt = node(
        "While",
        seq(vec![
            lx.kw("while"),
            lx.tok("("),
            expr.clone(),
            lx.tok(")"),
            statement.clone(),
        ]),
    );
    let return_stmt = node(
        "Return",
        seq(vec![lx.kw("return"), opt(expr.clone()), semi.clone()]),
    );
    let expr_stmt = node("ExprStatement", seq(vec![expr, semi.clone()]));

    g.define(
        &statement,
        node(
            "Statement",
            choice(vec![
                block,
                seq(vec![var_decl, semi]),
                function_decl,
                if_stmt,
                for_stmt,
                foreach_stmt,
                while_stmt,
                return_stmt,
                node("Empty", lx.tok(";")),
                expr_stmt,
            ]),
        ),
    )?;

    g.build(
        "script",
        node("Script", seq(vec![many(statement), lx.ws(), eoi()])),
    )
}
