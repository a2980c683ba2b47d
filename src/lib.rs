pub mod ast;
pub mod builtins;
pub mod container;
pub mod env;
pub mod error;
pub mod from_json;
pub mod grammar;
pub mod interpreter;
pub mod json;
pub mod options;
pub mod path;
pub mod primitives;
pub mod rules;
pub mod template;
pub mod token;
pub mod transform;
pub mod validate;
pub mod value;

use std::rc::Rc;

pub use container::{AttributeValue, Scalar, TemplateContainer, TemplateLink};
pub use error::{Error, Position, Result};
pub use from_json::{container_from_json, value_from_json};
pub use interpreter::Interpreter;
pub use options::EngineOptions;
pub use path::{BoundLink, PathValue};
pub use primitives::{DefaultPrimitives, Primitives};
pub use template::compile;
pub use transform::{lower, transform};
pub use validate::{validate_links, ValidationError};
pub use value::{JsonObject, NativeFn, Value};

use ast::Node;

// ── Engine ──────────────────────────────────────────────────────────

/// Options, operator semantics and host natives shared by every script
/// and template run through it. Each run gets its own [`Interpreter`].
pub struct Engine {
    options: EngineOptions,
    primitives: Rc<dyn Primitives>,
    natives: Vec<(String, NativeFn)>,
}

impl Engine {
    pub fn new() -> Self {
        Self::with_options(EngineOptions::default())
    }

    pub fn with_options(options: EngineOptions) -> Self {
        Engine {
            options,
            primitives: Rc::new(DefaultPrimitives),
            natives: Vec::new(),
        }
    }

    /// Replace the binary operator provider.
    pub fn with_primitives(mut self, primitives: Rc<dyn Primitives>) -> Self {
        self.primitives = primitives;
        self
    }

    pub fn options(&self) -> &EngineOptions {
        &self.options
    }

    /// Expose a host function to scripts as a global. Registering a name
    /// twice keeps the later function.
    pub fn register_native(
        &mut self,
        name: &str,
        func: impl Fn(&mut Interpreter, Value, Vec<Value>) -> Result<Value> + 'static,
    ) {
        self.natives.push((name.to_string(), Rc::new(func)));
    }

    /// A fresh interpreter bound to `root`, with this engine's natives.
    pub fn interpreter(&self, root: &TemplateContainer) -> Interpreter {
        let mut interpreter =
            Interpreter::with_options(root.clone(), self.options.clone(), self.primitives.clone());
        for (name, func) in &self.natives {
            interpreter.define_native(name, func.clone());
        }
        interpreter
    }

    /// Parse, normalize and lower script source.
    pub fn parse_script(&self, source: &str) -> Result<Node> {
        let grammar = grammar::script()?;
        let mut tokens = grammar.parse_with_depth(source, self.options.max_parse_depth)?;
        if tokens.len() != 1 {
            return Err(Error::Grammar(format!(
                "script grammar produced {} top-level tokens",
                tokens.len()
            )));
        }
        let token = transform(&tokens.remove(0))?;
        if log::log_enabled!(log::Level::Trace) {
            log::trace!("normalized script tree:\n{}", token.dump());
        }
        lower(&token)
    }

    pub fn run_script(&self, source: &str, root: &TemplateContainer) -> Result<Value> {
        let script = self.parse_script(source)?;
        self.interpreter(root).run(&script)
    }

    /// Run a script and stringify its result.
    pub fn replace_string(&self, source: &str, root: &TemplateContainer) -> Result<String> {
        let script = self.parse_script(source)?;
        let mut interpreter = self.interpreter(root);
        let value = interpreter.run(&script)?;
        Ok(interpreter.stringify(&value))
    }

    pub fn compile(&self, template: &str) -> Result<String> {
        template::compile(template, &self.options)
    }

    /// Compile a template and run it against `root`.
    pub fn render(&self, template: &str, root: &TemplateContainer) -> Result<String> {
        log::debug!("rendering template of {} bytes", template.len());
        let script = self.compile(template)?;
        self.replace_string(&script, root)
    }
}

impl Default for Engine {
    fn default() -> Self {
        Self::new()
    }
}

// ── Core API ────────────────────────────────────────────────────────

/// Parse script source into a [`Node::Script`].
pub fn parse_script(source: &str) -> Result<Node> {
    Engine::new().parse_script(source)
}

pub fn run_script(source: &str, root: &TemplateContainer) -> Result<Value> {
    Engine::new().run_script(source, root)
}

pub fn replace_string(source: &str, root: &TemplateContainer) -> Result<String> {
    Engine::new().replace_string(source, root)
}

/// Render a template with the default delimiters.
pub fn render(template: &str, root: &TemplateContainer) -> Result<String> {
    Engine::new().render(template, root)
}

/// Evaluate an expression of the arithmetic grammar.
pub fn eval_arithmetic(expression: &str) -> Result<f64> {
    let token = grammar::arithmetic()?.parse_one(expression)?;
    let node = lower(&transform(&token)?)?;
    let value = Interpreter::new(TemplateContainer::new()).run(&node)?;
    value
        .as_number()
        .ok_or_else(|| Error::TypeError(format!("expected a number, got {}", value.type_name())))
}

#[cfg(test)]
mod tests;
