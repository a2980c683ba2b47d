use std::io::{self, Read};
use std::process;

use templet::{container_from_json, validate_links, Engine, Error, TemplateContainer};

/// `templet [data.json] < template`
fn main() {
    env_logger::init();

    let mut template = String::new();
    if let Err(err) = io::stdin().read_to_string(&mut template) {
        eprintln!("failed to read template from stdin: {}", err);
        process::exit(1);
    }

    let root = match std::env::args().nth(1) {
        Some(path) => load_data(&path),
        None => TemplateContainer::new(),
    };
    for problem in validate_links(&root) {
        log::warn!("{}: {}", problem.path.join("."), problem.message);
    }

    let engine = Engine::new();
    let script = match engine.compile(&template) {
        Ok(script) => script,
        Err(err) => fail("template", &template, &err),
    };
    match engine.replace_string(&script, &root) {
        Ok(output) => print!("{}", output),
        // Parse positions point into the generated script, not the template.
        Err(err) => fail("generated script", &script, &err),
    }
}

fn load_data(path: &str) -> TemplateContainer {
    let text = match std::fs::read_to_string(path) {
        Ok(text) => text,
        Err(err) => {
            eprintln!("failed to read {}: {}", path, err);
            process::exit(1);
        }
    };
    match container_from_json(&text) {
        Ok(root) => root,
        Err(err) => fail(path, &text, &err),
    }
}

fn fail(source_name: &str, input: &str, err: &Error) -> ! {
    if let Some(pos) = err.position() {
        let line_text = input.lines().nth(pos.line).unwrap_or("");
        eprintln!("ERROR IN {} AT LINE {}:", source_name, pos.line + 1);
        eprintln!("{}", line_text);

        let mut underline = String::new();
        for _ in 0..pos.column {
            underline.push(' ');
        }
        underline.push('^');
        eprintln!("{}", underline);
    }
    eprintln!("{} [{}]", err, err.code());
    process::exit(1);
}
