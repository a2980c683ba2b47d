use std::rc::Rc;

use rstest::rstest;

use crate::ast::Node;
use crate::container::{AttributeValue, Scalar, TemplateContainer, TemplateLink};
use crate::error::Error;
use crate::grammar;
use crate::options::{EngineOptions, DEFAULT_MAX_CALL_DEPTH};
use crate::path::PathValue;
use crate::rules::{choice, lit, node, seq, ParserState, DEFAULT_MAX_DEPTH};
use crate::value::Value;
use crate::{
    container_from_json, eval_arithmetic, parse_script, render, replace_string, run_script,
    validate_links, value_from_json, Engine,
};

// ── Shared fixtures ─────────────────────────────────────────────────

/// `R { items: [A, B], name: "World", flag }`, elements keyed "0" and "1".
fn sample_tree(flag: bool) -> (TemplateContainer, TemplateContainer, TemplateContainer) {
    let root = TemplateContainer::new();
    root.add_attribute("name", "World");
    root.add_attribute("flag", flag);
    let items = root.add_child("items");
    let a = items.add_array_value(None);
    a.add_attribute("name", "A");
    a.add_attribute("price", 3.0);
    let b = items.add_array_value(None);
    b.add_attribute("name", "B");
    b.add_attribute("price", 4.5);
    (root, a, b)
}

/// `rows` is a keyed list; `pick` is a list link selecting `b` then `a`.
fn linked_tree() -> TemplateContainer {
    let root = TemplateContainer::new();
    let rows = root.add_child("rows");
    rows.add_array_value(Some("a")).add_attribute("v", 1.0);
    rows.add_array_value(Some("b")).add_attribute("v", 2.0);
    root.add_link("pick", TemplateLink::list("rows", &["b", "a"]));
    let target = root.add_child("target");
    target.add_attribute("v", 7.0);
    root.add_link("alias", TemplateLink::to("target"));
    root
}

fn run(source: &str) -> Value {
    run_script(source, &TemplateContainer::new()).unwrap()
}

fn run_err(source: &str) -> Error {
    run_script(source, &TemplateContainer::new()).unwrap_err()
}

fn text(value: Value) -> String {
    match value {
        Value::String(s) => s,
        other => panic!("expected a string, got {:?}", other),
    }
}

// ── Rule engine ─────────────────────────────────────────────────────

#[test]
fn failed_choice_leaves_state_untouched() {
    // Alternative A consumes "a" and wraps a token before failing on "x".
    let rule = choice(vec![
        seq(vec![node("A", lit("a")), lit("x")]),
        seq(vec![node("A", lit("a")), lit("y")]),
    ]);
    let mut state = ParserState::new("ab");
    assert!(!rule.matches(&mut state).unwrap());
    assert_eq!(state, ParserState::new("ab"));
}

#[test]
fn choice_keeps_only_tokens_of_the_winning_alternative() {
    let rule = choice(vec![
        seq(vec![node("A", lit("a")), lit("x")]),
        node("B", seq(vec![lit("a"), lit("b")])),
    ]);
    let tokens = rule.parse("ab").unwrap();
    assert_eq!(tokens.len(), 1);
    assert_eq!(tokens[0].name, "B");
    assert_eq!(tokens[0].text(), "ab");
}

#[test]
fn node_children_are_isolated() {
    let rule = node(
        "Outer",
        seq(vec![node("X", lit("x")), node("Y", lit("y"))]),
    );
    let tokens = rule.parse("xy").unwrap();
    assert_eq!(tokens.len(), 1);
    let names: Vec<&str> = tokens[0].children.iter().map(|t| t.name.as_str()).collect();
    assert_eq!(names, ["X", "Y"]);
}

#[test]
fn parse_is_idempotent() {
    let source = "var x = 1; function f(a) { return a * 2 + x; } f(3);";
    let grammar = grammar::script().unwrap();
    let first = grammar.parse(source).unwrap();
    let second = grammar.parse(source).unwrap();
    assert_eq!(first, second);
    assert!(first[0].same_shape(&second[0]));
}

#[test]
fn parse_error_reports_furthest_position() {
    let err = parse_script("var x = 1;\nvar = 2;").unwrap_err();
    match err {
        Error::Parse { position, .. } => assert_eq!(position.line, 1),
        other => panic!("expected a parse error, got {:?}", other),
    }
}

#[test]
fn dump_shows_one_token_per_line() {
    let rule = node(
        "Outer",
        seq(vec![node("X", lit("x")), node("Y", lit("y"))]),
    );
    let tokens = rule.parse("xy").unwrap();
    assert_eq!(tokens[0].dump(), "Outer\n  X \"x\"\n  Y \"y\"\n");
}

#[test]
fn script_grammar_owns_its_recursive_productions() {
    let grammar = grammar::script().unwrap();
    assert_eq!(grammar.productions().len(), 3);
    assert!(grammar.parse("f(g(1));").is_ok());
}

#[test]
fn deep_nesting_fails_with_default_limits() {
    let source = format!("return {}1{};", "(".repeat(1500), ")".repeat(1500));
    let err = parse_script(&source).unwrap_err();
    assert_eq!(
        err,
        Error::RecursionLimit {
            what: "rule nesting",
            limit: DEFAULT_MAX_DEPTH
        }
    );
}

#[test]
fn parse_depth_is_limited() {
    let source = format!("return {}1{};", "(".repeat(100), ")".repeat(100));
    let engine = Engine::with_options(EngineOptions::default().with_max_parse_depth(200));
    let err = engine.parse_script(&source).unwrap_err();
    assert!(matches!(err, Error::RecursionLimit { what: "rule nesting", limit: 200 }));
}

// ── Transformer ─────────────────────────────────────────────────────

#[rstest]
#[case("2+3*4", 14.0)]
#[case("(2+3)*4", 20.0)]
#[case("10-4-3", 3.0)]
#[case("10-3-2", 5.0)]
#[case("2*-3", -6.0)]
#[case("7 % 4 + 1", 4.0)]
#[case("100 / 10 / 5", 2.0)]
fn arithmetic_precedence(#[case] input: &str, #[case] expected: f64) {
    assert_eq!(eval_arithmetic(input).unwrap(), expected);
}

#[rstest]
#[case("return 1 + 2 * 3 == 7 && true;", Value::Bool(true))]
#[case("return (5 & 3) | 8;", Value::Number(9.0))]
#[case("return 1 << 4 >> 2;", Value::Number(4.0))]
#[case("return 2 < 3 == true;", Value::Bool(true))]
#[case("return false || 0 || \"x\";", Value::String("x".into()))]
#[case("return !0;", Value::Bool(true))]
fn script_precedence(#[case] source: &str, #[case] expected: Value) {
    assert_eq!(run(source), expected);
}

#[test]
fn postfix_chain_becomes_method_call() {
    let Node::Script(body) = parse_script("a.b[0].c(1);").unwrap() else {
        panic!("expected a script");
    };
    match &body[0] {
        Node::MethodCall {
            receiver,
            method,
            args,
        } => {
            assert_eq!(method, "c");
            assert_eq!(args, &vec![Node::Number(1.0)]);
            assert!(matches!(receiver.as_ref(), Node::Index { .. }));
        }
        other => panic!("expected a method call, got {:?}", other),
    }
}

#[test]
fn while_lowers_to_for() {
    let Node::Script(body) = parse_script("while (x) { }").unwrap() else {
        panic!("expected a script");
    };
    assert!(matches!(
        &body[0],
        Node::For { init: None, cond: Some(_), step: None, .. }
    ));
}

#[test]
fn compound_assignment_desugars() {
    let Node::Script(body) = parse_script("x -= 2;").unwrap() else {
        panic!("expected a script");
    };
    let Node::Assign { target, value } = &body[0] else {
        panic!("expected an assignment");
    };
    assert_eq!(target.as_ref(), &Node::Ident("x".into()));
    assert!(matches!(
        value.as_ref(),
        Node::Binary { op: crate::ast::BinaryOp::Sub, .. }
    ));
}

// ── Evaluator ───────────────────────────────────────────────────────

#[test]
fn compound_assignment_operators() {
    let value = run("var x = 5; x *= 3; x -= 1; x <<= 1; x %= 5; return x;");
    assert_eq!(value, Value::Number(3.0));
}

#[test]
fn while_loop() {
    let value = run("var i = 0; var s = 0; while (i < 4) { s += i; i += 1; } return s;");
    assert_eq!(value, Value::Number(6.0));
}

#[test]
fn for_loop_with_early_return() {
    let value = run("function find() { for (var i = 0; i < 10; i += 1) { if (i * i > 20) { return i; } } return -1; } return find();");
    assert_eq!(value, Value::Number(5.0));
}

#[test]
fn closures_capture_per_iteration_bindings() {
    let value = run(
        "var fs = [];
         for (var i = 0; i < 3; i += 1) {
             var j = i;
             fs.push(function () { return j; });
         }
         return fs[0]() + \",\" + fs[2]();",
    );
    assert_eq!(text(value), "0,2");
}

#[test]
fn for_counter_is_captured_per_iteration() {
    let value = run(
        "var fs = [];
         for (var i = 0; i < 3; i += 1) { fs.push(function () { return i; }); }
         return fs[0]() + \",\" + fs[2]();",
    );
    assert_eq!(text(value), "0,2");
}

#[test]
fn for_counter_changes_in_the_body_carry_over() {
    let value = run("var n = 0; for (var i = 0; i < 10; i += 1) { i += 2; n += 1; } return n;");
    assert_eq!(value, Value::Number(4.0));
}

#[test]
fn foreach_closures_see_their_own_element() {
    let (root, _, _) = sample_tree(true);
    let value = run_script(
        "var fs = [];
         foreach (item in items) { var n = item.name; fs.push(function () { return n; }); }
         return fs[1]() + fs[0]();",
        &root,
    )
    .unwrap();
    assert_eq!(text(value), "BA");
}

#[test]
fn functions_are_hoisted() {
    let value = run("return even(10); function even(n) { return n == 0 || odd(n - 1); } function odd(n) { return n != 0 && even(n - 1); }");
    assert_eq!(value, Value::Bool(true));
}

#[test]
fn missing_arguments_are_null() {
    assert_eq!(run("function f(a, b) { return b; } return f(1);"), Value::Null);
}

#[test]
fn prototype_lookup() {
    let value = run(
        "var base = { greet: function () { return \"hi \" + this.name; } };
         var o = { name: \"x\" };
         o.prototype = base;
         return o.greet();",
    );
    assert_eq!(text(value), "hi x");
}

#[test]
fn new_binds_a_fresh_object() {
    let value = run(
        "function Point(x, y) { this.x = x; this.y = y; }
         var p = new Point(1, 2);
         return p.x + p.y;",
    );
    assert_eq!(value, Value::Number(3.0));
}

#[test]
fn object_positional_access() {
    let value = run("var o = { x: 1, y: 2 }; return o[1].key + o[1].value;");
    assert_eq!(text(value), "y2");
}

#[test]
fn string_and_list_methods() {
    let value = run(
        "return \"Hello\".toUpperCase() + \"abc\".substring(1) + \"a,b\".split(\",\").length
             + [1, 2, 3].join(\"-\") + [4, 5].indexOf(5);",
    );
    assert_eq!(text(value), "HELLObc21-2-31");
}

#[test]
fn default_natives() {
    let value = run(
        "var o = parseJson('{\"a\":[1,2]}');
         log(\"parsed\", o);
         return toJson(o) + count(o.a) + keys({ b: 1, a: 2 }).join(\"\") + str(1.5);",
    );
    assert_eq!(text(value), "{\"a\":[1,2]}2ba1.5");
}

#[test]
fn unbound_assignment_creates_a_global() {
    let value = run("function f() { counter = 5; } f(); return counter;");
    assert_eq!(value, Value::Number(5.0));
}

#[test]
fn only_true_selects_the_then_branch() {
    assert_eq!(text(run("if (1) { return \"a\"; } return \"b\";")), "b");
    assert_eq!(text(run("if (\"yes\") return \"a\"; else return \"b\";")), "b");
}

#[test]
fn unbound_identifier_fails_closed() {
    assert_eq!(run_err("return missing;"), Error::UnboundIdentifier("missing".into()));
}

#[test]
fn lenient_identifiers_read_null() {
    let engine = Engine::with_options(EngineOptions::default().with_lenient_identifiers(true));
    let value = engine.run_script("return missing;", &TemplateContainer::new()).unwrap();
    assert_eq!(value, Value::Null);
}

#[rstest]
#[case("f() = 3;", "call")]
#[case("1 = 2;", "number literal")]
fn invalid_assignment_target(#[case] source: &str, #[case] kind: &str) {
    let source = format!("function f() {{}} {}", source);
    assert_eq!(run_err(&source), Error::InvalidAssignmentTarget(kind.into()));
}

#[test]
fn calling_a_non_function() {
    assert_eq!(run_err("var x = 1; x();"), Error::NotCallable("x".into()));
}

#[test]
fn call_depth_is_limited() {
    let engine = Engine::with_options(EngineOptions::default().with_max_call_depth(50));
    let err = engine
        .run_script("function f(n) { return f(n + 1); } return f(0);", &TemplateContainer::new())
        .unwrap_err();
    assert_eq!(err, Error::RecursionLimit { what: "call depth", limit: 50 });
}

#[test]
fn unbounded_recursion_fails_with_default_limits() {
    let err = run_err("function f(n) { if (n >= 0) { var k = n; return f(k + 1) + 1; } } f(0);");
    assert_eq!(
        err,
        Error::RecursionLimit {
            what: "call depth",
            limit: DEFAULT_MAX_CALL_DEPTH
        }
    );
}

#[test]
fn step_budget_stops_infinite_loops() {
    let engine = Engine::with_options(EngineOptions::default().with_max_steps(1000));
    let err = engine
        .run_script("while (true) { }", &TemplateContainer::new())
        .unwrap_err();
    assert_eq!(err, Error::StepLimit(1000));
}

#[test]
fn registered_natives_are_callable() {
    let mut engine = Engine::new();
    engine.register_native("twice", |_, _, args| match args.first() {
        Some(Value::Number(n)) => Ok(Value::Number(n * 2.0)),
        _ => Ok(Value::Null),
    });
    let value = engine
        .run_script("return twice(21);", &TemplateContainer::new())
        .unwrap();
    assert_eq!(value, Value::Number(42.0));
}

#[test]
fn custom_primitives() {
    struct Strict;
    impl crate::primitives::Primitives for Strict {
        fn binary(&self, op: crate::ast::BinaryOp, _: &Value, _: &Value) -> crate::Result<Value> {
            Err(Error::UnsupportedOperator(op.to_string()))
        }
        fn truthy(&self, value: &Value) -> bool {
            matches!(value, Value::Bool(true))
        }
        fn stringify(&self, _: &Value) -> String {
            "?".to_string()
        }
    }
    let engine = Engine::new().with_primitives(Rc::new(Strict));
    let root = TemplateContainer::new();
    assert_eq!(
        engine.run_script("return 1 + 1;", &root).unwrap_err(),
        Error::UnsupportedOperator("+".into())
    );
    assert_eq!(engine.replace_string("return 1;", &root).unwrap(), "?");
}

// ── Containers and templates ────────────────────────────────────────

#[test]
fn path_resolution() {
    let (root, a, b) = sample_tree(true);
    assert_eq!(root.get_by_path("items[*1]"), Some(PathValue::Container(b.clone())));
    assert_eq!(root.get_by_path("items[0]"), Some(PathValue::Container(a.clone())));
    assert_eq!(root.get_by_path("items[*1]/../.."), Some(PathValue::Container(root.clone())));
    assert_eq!(root.get_by_path("items[1].../.."), Some(PathValue::Container(root.clone())));
    assert_eq!(b.get_by_path("../.."), Some(PathValue::Container(root.clone())));
    assert_eq!(
        a.get_by_path("/name"),
        Some(PathValue::Scalar(Scalar::String("World".into())))
    );
    assert_eq!(root.get_by_path(""), Some(PathValue::Container(root.clone())));
}

#[rstest]
#[case("missing")]
#[case("name.deeper")]
#[case("name[0]")]
#[case("items[*5]")]
#[case("items[*x]")]
#[case("../up")]
fn path_misses_are_none(#[case] path: &str) {
    let (root, _, _) = sample_tree(true);
    assert_eq!(root.get_by_path(path), None);
}

#[test]
fn links_are_followed() {
    let root = linked_tree();
    assert_eq!(
        root.get_by_path("alias.v"),
        Some(PathValue::Scalar(Scalar::Number(7.0)))
    );
    assert_eq!(
        root.get_by_path("pick[0].v"),
        Some(PathValue::Scalar(Scalar::Number(2.0)))
    );
    assert_eq!(
        root.get_by_path("pick[*1].v"),
        Some(PathValue::Scalar(Scalar::Number(1.0)))
    );
    match root.get_by_path("pick") {
        Some(PathValue::List(bound)) => assert_eq!(bound.keys(), ["b", "a"]),
        other => panic!("expected a list link, got {:?}", other),
    }
}

#[test]
fn cyclic_links_resolve_to_none() {
    let root = TemplateContainer::new();
    root.add_link("a", TemplateLink::to("b"));
    root.add_link("b", TemplateLink::to("a"));
    assert_eq!(root.get_by_path("a.x"), None);
    let problems = validate_links(&root);
    assert_eq!(problems.len(), 2);
    assert!(problems.iter().all(|p| p.code == "unresolved-link"));
}

#[test]
fn link_validation() {
    let root = linked_tree();
    assert!(validate_links(&root).is_empty());

    root.add_link("bad", TemplateLink::to("nowhere"));
    root.add_link("keys", TemplateLink::list("rows", &["a", "zz"]));
    let problems = validate_links(&root);
    let codes: Vec<(&str, Vec<String>)> = problems
        .iter()
        .map(|p| (p.code, p.path.clone()))
        .collect();
    assert_eq!(
        codes,
        vec![
            ("unresolved-link", vec!["bad".to_string()]),
            ("unresolved-list-key", vec!["keys".to_string()]),
        ]
    );
}

#[test]
fn hello_world_template() {
    let (root, _, _) = sample_tree(true);
    assert_eq!(render("Hello [%name%]!", &root).unwrap(), "Hello World!");
}

#[rstest]
#[case(true, "yes")]
#[case(false, "")]
fn control_block_template(#[case] flag: bool, #[case] expected: &str) {
    let (root, _, _) = sample_tree(flag);
    assert_eq!(render("[%if (flag)%]yes[%end%]", &root).unwrap(), expected);
}

#[rstest]
#[case(0.0, "none")]
#[case(1.0, "one")]
#[case(5.0, "many")]
fn else_if_chain(#[case] n: f64, #[case] expected: &str) {
    let root = TemplateContainer::new();
    root.add_attribute("n", n);
    let template = "[%if (n > 1)%]many[%else if (n == 1)%]one[%else%]none[%end%]";
    assert_eq!(render(template, &root).unwrap(), expected);
}

#[test]
fn foreach_template_restores_the_container() {
    let (root, _, _) = sample_tree(true);
    let out = render(
        "[%foreach (item in items)%]<[%item.name%]:[%item.price * 2%]>[%end%]",
        &root,
    )
    .unwrap();
    assert_eq!(out, "<A:6><B:9>");
    assert_eq!(root.attribute("item"), None);
}

#[test]
fn foreach_over_list_link() {
    let root = linked_tree();
    let out = render("[%foreach r in pick%][%r.v%],[%end%]", &root).unwrap();
    assert_eq!(out, "2,1,");
}

#[test]
fn foreach_keeps_a_shadowed_attribute() {
    let (root, _, _) = sample_tree(true);
    root.add_attribute("item", "outer");
    render("[%foreach (item in items)%][%item.name%][%end%]", &root).unwrap();
    assert_eq!(
        root.attribute("item"),
        Some(AttributeValue::Scalar(Scalar::String("outer".into())))
    );
}

#[test]
fn foreach_over_script_list() {
    let value = run("var out = \"\"; var xs = [1, 2, 3]; foreach (x in xs) { out += x; } return out;");
    assert_eq!(text(value), "123");
}

#[test]
fn foreach_requires_a_list() {
    let (root, _, _) = sample_tree(true);
    let err = run_script("foreach (x in name) { }", &root).unwrap_err();
    assert_eq!(err, Error::NotAList { path: "name".into() });
}

#[test]
fn statement_runs_and_containers_in_scripts() {
    let (root, _, _) = sample_tree(true);
    let out = render(
        "[%var total = 0;%][%foreach (i in items)%][%total += i.price;%][%end%]total=[%total%] n=[%items.length%]",
        &root,
    )
    .unwrap();
    assert_eq!(out, "total=7.5 n=2");
}

#[test]
fn scripts_write_container_attributes() {
    let (root, _, _) = sample_tree(true);
    replace_string("name = \"ignored\"; items[0].name = \"Z\";", &root).unwrap();
    assert_eq!(
        root.get_by_path("items[*0].name"),
        Some(PathValue::Scalar(Scalar::String("Z".into())))
    );
    assert_eq!(
        root.get_by_path("name"),
        Some(PathValue::Scalar(Scalar::String("World".into())))
    );
}

#[test]
fn unclosed_script_fails() {
    let err = render("ok [%name", &TemplateContainer::new()).unwrap_err();
    assert_eq!(err.code(), "unclosed-script");
}

#[test]
fn lenient_template_with_custom_delimiters() {
    let engine = Engine::with_options(
        EngineOptions::default()
            .with_lenient_identifiers(true)
            .with_delimiters("<%", "%>"),
    );
    assert_eq!(engine.render("a<%missing%>b", &TemplateContainer::new()).unwrap(), "ab");
}

// ── JSON ────────────────────────────────────────────────────────────

#[test]
fn json_grammar_agrees_with_serde_json() {
    let doc = r#"{
        "name": "templet",
        "tags": ["a", "bA", "tab\t"],
        "nested": { "pi": 3.25, "neg": -2, "ok": true, "none": null },
        "empty": [],
        "escaped": "quote \" slash \/ backslash \\",
        "unicode": "\ud83d\ude00 caf\u00e9 \u20ac"
    }"#;
    let ours = crate::json::value_to_json(&value_from_json(doc).unwrap());
    let reparsed: serde_json::Value = serde_json::from_str(&ours).unwrap();
    let expected: serde_json::Value = serde_json::from_str(doc).unwrap();
    assert_eq!(reparsed, expected);
}

#[test]
fn container_json_feeds_templates() {
    let root = container_from_json(
        r#"{"title": "Orders", "orders": [{"id": 1, "total": 10}, {"id": 2, "total": 5.5}]}"#,
    )
    .unwrap();
    let out = render(
        "[%title%]:[%foreach (o in orders)%] #[%o.id%]=[%o.total%][%end%]",
        &root,
    )
    .unwrap();
    assert_eq!(out, "Orders: #1=10 #2=5.5");
}
