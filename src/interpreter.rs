use std::rc::Rc;

use indexmap::IndexMap;

use crate::ast::{BinaryOp, FunctionDef, Node, UnaryOp};
use crate::builtins;
use crate::container::{AttributeValue, TemplateContainer};
use crate::env::Env;
use crate::error::{Error, Result};
use crate::options::EngineOptions;
use crate::primitives::{DefaultPrimitives, Primitives};
use crate::value::{Callable, JsonObject, NativeFn, Value};

/// Largest gap a list index assignment may open past the end of the list.
const MAX_INDEX_GAP: usize = 1 << 16;

/// Tree-walking evaluator bound to one data container.
///
/// State is the current environment, the pending-return flag and value,
/// and the globals that unbound assignments create. Identifiers resolve
/// through the environment, then the globals, then a path lookup on the
/// bound container.
pub struct Interpreter {
    env: Env,
    returning: bool,
    pending: Value,
    globals: IndexMap<String, Value>,
    root: TemplateContainer,
    options: EngineOptions,
    primitives: Rc<dyn Primitives>,
    call_depth: usize,
    steps: u64,
}

impl Interpreter {
    pub fn new(root: TemplateContainer) -> Self {
        Self::with_options(root, EngineOptions::default(), Rc::new(DefaultPrimitives))
    }

    pub fn with_options(
        root: TemplateContainer,
        options: EngineOptions,
        primitives: Rc<dyn Primitives>,
    ) -> Self {
        let mut interpreter = Interpreter {
            env: Env::new(),
            returning: false,
            pending: Value::Null,
            globals: IndexMap::new(),
            root,
            options,
            primitives,
            call_depth: 0,
            steps: 0,
        };
        builtins::install(&mut interpreter);
        interpreter
    }

    pub fn root(&self) -> &TemplateContainer {
        &self.root
    }

    pub fn options(&self) -> &EngineOptions {
        &self.options
    }

    pub fn stringify(&self, value: &Value) -> String {
        self.primitives.stringify(value)
    }

    pub fn truthy(&self, value: &Value) -> bool {
        self.primitives.truthy(value)
    }

    pub fn define_global(&mut self, name: &str, value: Value) {
        self.globals.insert(name.to_string(), value);
    }

    pub fn define_native(&mut self, name: &str, func: NativeFn) {
        let native = Callable::Native {
            name: name.to_string(),
            func,
        };
        self.define_global(name, Value::Function(Rc::new(native)));
    }

    pub fn global(&self, name: &str) -> Option<Value> {
        self.globals.get(name).cloned()
    }

    pub fn is_returning(&self) -> bool {
        self.returning
    }

    /// Evaluate a top-level node and yield its `return` value if it
    /// returned, else its own value.
    pub fn run(&mut self, node: &Node) -> Result<Value> {
        self.returning = false;
        self.pending = Value::Null;
        self.steps = 0;
        let result = self.eval(node);
        let returned = std::mem::take(&mut self.pending);
        let was_returning = std::mem::replace(&mut self.returning, false);
        let value = result?;
        Ok(if was_returning { returned } else { value })
    }

    /// Evaluate one node. Must not be entered while a return is pending;
    /// statement runners check the flag after every statement.
    pub fn eval(&mut self, node: &Node) -> Result<Value> {
        debug_assert!(!self.returning, "eval entered with a pending return");
        self.tick()?;
        match node {
            Node::Script(body) | Node::Block(body) => {
                self.scoped(|this| this.run_statements(body))
            }
            Node::Var { name, init } => self.eval_var(name, init.as_deref()),
            Node::FunctionDecl(def) => Ok(self.eval_function_decl(def)),
            Node::If {
                cond,
                then,
                otherwise,
            } => self.eval_if(cond, then, otherwise.as_deref()),
            Node::For {
                init,
                cond,
                step,
                body,
            } => self.eval_for(init.as_deref(), cond.as_deref(), step.as_deref(), body),
            Node::Foreach { name, path, body } => self.eval_foreach(name, path, body),
            Node::Return(value) => self.eval_return(value.as_deref()),
            Node::Empty => Ok(Value::Null),

            Node::Assign { target, value } => self.eval_assign(target, value),
            Node::Binary { op, lhs, rhs } => self.eval_binary(*op, lhs, rhs),
            Node::Unary { op, operand } => self.eval_unary(*op, operand),
            Node::Field { object, name } => self.eval_field(object, name),
            Node::Index { object, index } => self.eval_index(object, index),
            Node::Call { callee, args } => self.eval_call(callee, args),
            Node::MethodCall {
                receiver,
                method,
                args,
            } => self.eval_method_call(receiver, method, args),
            Node::New { callee, args } => self.eval_new(callee, args),

            Node::Number(n) => Ok(Value::Number(*n)),
            Node::Str(s) => Ok(Value::String(s.clone())),
            Node::Bool(b) => Ok(Value::Bool(*b)),
            Node::Null => Ok(Value::Null),
            Node::Ident(name) => self.lookup(name),
            Node::Function(def) => Ok(self.closure(def)),
            Node::Object(fields) => self.eval_object(fields),
            Node::Array(items) => Ok(Value::list(self.eval_all(items)?)),
        }
    }

    /// Invoke `callee` with an explicit receiver.
    pub fn call(&mut self, callee: &Value, this: Value, args: Vec<Value>) -> Result<Value> {
        let Value::Function(callable) = callee else {
            return Err(Error::NotCallable(callee.type_name().to_string()));
        };
        if self.call_depth >= self.options.max_call_depth {
            return Err(Error::RecursionLimit {
                what: "call depth",
                limit: self.options.max_call_depth,
            });
        }
        log::trace!("call {} with {} argument(s)", callable.name(), args.len());
        self.call_depth += 1;
        let result = match &**callable {
            Callable::Native { func, .. } => {
                let func = func.clone();
                func(self, this, args)
            }
            Callable::Script { def, env } => self.invoke(def, env, this, args),
        };
        self.call_depth -= 1;
        result
    }

    // ── Statements ──────────────────────────────────────────────────

    /// Run `f`, then put the environment back however `f` left it.
    fn scoped<T>(&mut self, f: impl FnOnce(&mut Self) -> Result<T>) -> Result<T> {
        let saved = self.env.clone();
        let result = f(self);
        self.env = saved;
        result
    }

    /// Stops at the first statement that sets the return flag and yields
    /// the pending value; otherwise yields the last statement's value.
    fn run_statements(&mut self, statements: &[Node]) -> Result<Value> {
        self.hoist(statements);
        let mut last = Value::Null;
        for statement in statements {
            last = self.eval(statement)?;
            if self.returning {
                return Ok(self.pending.clone());
            }
        }
        Ok(last)
    }

    /// Bind every function declared directly in `statements` before any of
    /// them runs, so declarations can call each other regardless of order.
    fn hoist(&mut self, statements: &[Node]) {
        let declared: Vec<(&str, &Rc<FunctionDef>)> = statements
            .iter()
            .filter_map(|statement| match statement {
                Node::FunctionDecl(def) => def.name.as_deref().map(|name| (name, def)),
                _ => None,
            })
            .collect();
        if declared.is_empty() {
            return;
        }
        for (name, _) in &declared {
            self.env = self.env.bind(name, Value::Null);
        }
        for (name, def) in declared {
            let function = self.closure(def);
            self.env.assign(name, function);
        }
    }

    /// `var name = init`
    fn eval_var(&mut self, name: &str, init: Option<&Node>) -> Result<Value> {
        let value = match init {
            Some(expr) => self.eval(expr)?,
            None => Value::Null,
        };
        self.env = self.env.bind(name, value);
        Ok(Value::Null)
    }

    /// `function name(params) { ... }`. Hoisted declarations are already
    /// bound; anything else binds here.
    fn eval_function_decl(&mut self, def: &Rc<FunctionDef>) -> Value {
        let Some(name) = def.name.as_deref() else {
            return Value::Null;
        };
        let hoisted = match self.env.get(name) {
            Some(Value::Function(f)) => {
                matches!(&*f, Callable::Script { def: bound, .. } if Rc::ptr_eq(bound, def))
            }
            _ => false,
        };
        if !hoisted {
            self.env = self.env.bind(name, Value::Null);
            let function = self.closure(def);
            self.env.assign(name, function);
        }
        Value::Null
    }

    /// Only a boolean `true` condition selects the then-branch.
    fn eval_if(&mut self, cond: &Node, then: &Node, otherwise: Option<&Node>) -> Result<Value> {
        let cond = self.eval(cond)?;
        if matches!(cond, Value::Bool(true)) {
            self.eval(then)
        } else if let Some(otherwise) = otherwise {
            self.eval(otherwise)
        } else {
            Ok(Value::Null)
        }
    }

    /// `for (init; cond; step) body`, also the target of `while`.
    fn eval_for(
        &mut self,
        init: Option<&Node>,
        cond: Option<&Node>,
        step: Option<&Node>,
        body: &Node,
    ) -> Result<Value> {
        self.scoped(|this| {
            if let Some(init) = init {
                this.eval(init)?;
            }
            // A `var` counter gets a fresh frame per iteration, seeded with
            // the previous iteration's value before the step runs.
            let counter = match init {
                Some(Node::Var { name, .. }) => Some(name.as_str()),
                _ => None,
            };
            let outer = this.env.clone();
            let mut last = Value::Null;
            loop {
                if let Some(cond) = cond {
                    if !matches!(this.eval(cond)?, Value::Bool(true)) {
                        break;
                    }
                }
                last = this.eval(body)?;
                if this.returning {
                    break;
                }
                if let Some(name) = counter {
                    let current = this.env.get(name).unwrap_or_default();
                    this.env = outer.bind(name, current);
                }
                if let Some(step) = step {
                    this.eval(step)?;
                }
            }
            Ok(last)
        })
    }

    /// `foreach (name in path) body`
    ///
    /// Each element is bound as `name` in a fresh frame and, for container
    /// and scalar elements, as an attribute of the bound container so that
    /// paths like `name.child` resolve. The attribute is restored
    /// afterwards.
    fn eval_foreach(&mut self, name: &str, path: &str, body: &Node) -> Result<Value> {
        let items = self.iteration_items(path)?;
        log::trace!("foreach {} over `{}`: {} element(s)", name, path, items.len());
        let root = self.root.clone();
        let previous = root.attribute(name);

        let result = self.scoped(|this| {
            let outer = this.env.clone();
            let mut last = Value::Null;
            for item in items {
                match &item {
                    Value::Container(c) => {
                        root.set_attribute(name, AttributeValue::Container(c.clone()));
                    }
                    other => match other.to_scalar() {
                        Some(scalar) => {
                            root.set_attribute(name, AttributeValue::Scalar(scalar));
                        }
                        None => {
                            root.remove_attribute(name);
                        }
                    },
                }
                this.env = outer.bind(name, item);
                last = this.eval(body)?;
                if this.returning {
                    break;
                }
            }
            Ok(last)
        });

        match previous {
            Some(value) => {
                root.set_attribute(name, value);
            }
            None => {
                root.remove_attribute(name);
            }
        }
        result
    }

    /// Resolve a `foreach` source. A leading name bound in the environment
    /// or globals wins over the container path.
    fn iteration_items(&self, path: &str) -> Result<Vec<Value>> {
        let not_a_list = || Error::NotAList {
            path: path.to_string(),
        };
        let head_len = path
            .find(|c: char| c == '.' || c == '/' || c == '[')
            .unwrap_or(path.len());
        let (head, rest) = path.split_at(head_len);
        let bound = self
            .env
            .get(head)
            .or_else(|| self.globals.get(head).cloned());

        let source = match bound {
            Some(value) if rest.is_empty() => Some(value),
            Some(Value::Container(c)) => {
                let rest = rest
                    .strip_prefix('.')
                    .or_else(|| rest.strip_prefix('/'))
                    .unwrap_or(rest);
                c.get_by_path(rest).map(Value::from)
            }
            Some(_) => None,
            None => self.root.get_by_path(path).map(Value::from),
        };

        match source {
            Some(Value::List(items)) => Ok(items.borrow().clone()),
            Some(Value::Container(c)) if c.is_list() || c.attribute_names().is_empty() => {
                Ok(c.array_values().into_iter().map(Value::Container).collect())
            }
            Some(Value::Link(link)) => (0..link.keys().len())
                .map(|n| link.nth(n).map(Value::Container).ok_or_else(not_a_list))
                .collect(),
            _ => Err(not_a_list()),
        }
    }

    /// `return value?`
    fn eval_return(&mut self, value: Option<&Node>) -> Result<Value> {
        let value = match value {
            Some(expr) => self.eval(expr)?,
            None => Value::Null,
        };
        self.pending = value.clone();
        self.returning = true;
        Ok(value)
    }

    // ── Expressions ─────────────────────────────────────────────────

    fn lookup(&self, name: &str) -> Result<Value> {
        if let Some(value) = self.env.get(name) {
            return Ok(value);
        }
        if let Some(value) = self.globals.get(name) {
            return Ok(value.clone());
        }
        if let Some(value) = self.root.get_by_path(name) {
            return Ok(value.into());
        }
        if self.options.lenient_identifiers {
            log::debug!("unbound identifier `{}` read as null", name);
            Ok(Value::Null)
        } else {
            Err(Error::UnboundIdentifier(name.to_string()))
        }
    }

    /// Assign to an identifier, field or index. An identifier with no
    /// binding anywhere in scope becomes a global.
    fn assign(&mut self, target: &Node, value: Value) -> Result<Value> {
        match target {
            Node::Ident(name) => {
                if !self.env.assign(name, value.clone()) {
                    self.globals.insert(name.clone(), value.clone());
                }
            }
            Node::Field { object, name } => {
                let object = self.eval(object)?;
                self.set_member(&object, name, value.clone())?;
            }
            Node::Index { object, index } => {
                let object = self.eval(object)?;
                let index = self.eval(index)?;
                self.set_index(&object, &index, value.clone())?;
            }
            other => return Err(Error::InvalidAssignmentTarget(other.kind().to_string())),
        }
        Ok(value)
    }

    fn set_member(&self, object: &Value, name: &str, value: Value) -> Result<()> {
        match object {
            Value::Object(o) => {
                o.borrow_mut().set(name, value);
                Ok(())
            }
            Value::Container(c) => match value.to_scalar() {
                Some(scalar) => {
                    c.add_attribute(name, scalar);
                    Ok(())
                }
                None => Err(Error::TypeError(format!(
                    "cannot store a {} in container attribute `{}`",
                    value.type_name(),
                    name
                ))),
            },
            other => Err(Error::TypeError(format!(
                "cannot set `{}` on {}",
                name,
                other.type_name()
            ))),
        }
    }

    fn set_index(&self, object: &Value, index: &Value, value: Value) -> Result<()> {
        match (object, index) {
            (Value::List(items), Value::Number(n)) => {
                let Some(i) = as_index(*n) else {
                    return Err(Error::TypeError(format!("invalid list index {}", n)));
                };
                let mut items = items.borrow_mut();
                if i >= items.len() {
                    if i - items.len() > MAX_INDEX_GAP {
                        return Err(Error::TypeError(format!("list index {} out of range", i)));
                    }
                    items.resize(i + 1, Value::Null);
                }
                items[i] = value;
                Ok(())
            }
            (Value::Object(_) | Value::Container(_), key) => {
                let key = self.stringify(key);
                self.set_member(object, &key, value)
            }
            (other, _) => Err(Error::TypeError(format!(
                "cannot index into {}",
                other.type_name()
            ))),
        }
    }

    fn eval_assign(&mut self, target: &Node, value: &Node) -> Result<Value> {
        let value = self.eval(value)?;
        self.assign(target, value)
    }

    fn eval_field(&mut self, object: &Node, name: &str) -> Result<Value> {
        let object = self.eval(object)?;
        self.member(&object, name)
    }

    fn eval_index(&mut self, object: &Node, index: &Node) -> Result<Value> {
        let object = self.eval(object)?;
        let index = self.eval(index)?;
        self.index(&object, &index)
    }

    fn eval_call(&mut self, callee: &Node, args: &[Node]) -> Result<Value> {
        let function = self.eval(callee)?;
        if !matches!(function, Value::Function(_)) {
            return Err(Error::NotCallable(describe(callee)));
        }
        let args = self.eval_all(args)?;
        self.call(&function, Value::Null, args)
    }

    fn eval_object(&mut self, fields: &[(String, Node)]) -> Result<Value> {
        let mut object = JsonObject::new();
        for (key, expr) in fields {
            let value = self.eval(expr)?;
            object.set(key, value);
        }
        Ok(Value::object(object))
    }

    /// `&&` and `||` short-circuit; everything else goes to the primitives.
    fn eval_binary(&mut self, op: BinaryOp, lhs: &Node, rhs: &Node) -> Result<Value> {
        let lhs = self.eval(lhs)?;
        match op {
            BinaryOp::And if !self.truthy(&lhs) => return Ok(lhs),
            BinaryOp::Or if self.truthy(&lhs) => return Ok(lhs),
            BinaryOp::And | BinaryOp::Or => return self.eval(rhs),
            _ => {}
        }
        let rhs = self.eval(rhs)?;
        self.primitives.binary(op, &lhs, &rhs)
    }

    fn eval_unary(&mut self, op: UnaryOp, operand: &Node) -> Result<Value> {
        let value = self.eval(operand)?;
        match op {
            UnaryOp::Not => Ok(Value::Bool(!self.truthy(&value))),
            UnaryOp::Neg => match value {
                Value::Number(n) => Ok(Value::Number(-n)),
                other => self
                    .primitives
                    .binary(BinaryOp::Sub, &Value::Number(0.0), &other),
            },
        }
    }

    /// Read `object.name`.
    pub fn member(&self, object: &Value, name: &str) -> Result<Value> {
        Ok(match object {
            Value::Object(o) => o.borrow().get(name).unwrap_or_default(),
            Value::List(items) if name == "length" => Value::Number(items.borrow().len() as f64),
            Value::String(s) if name == "length" => Value::Number(s.chars().count() as f64),
            Value::Container(c) if name == "length" && c.is_list() => {
                Value::Number(c.len() as f64)
            }
            Value::Container(c) => c.get_by_path(name).map(Value::from).unwrap_or_default(),
            Value::Link(link) if name == "length" => Value::Number(link.keys().len() as f64),
            Value::Null => {
                return Err(Error::TypeError(format!("cannot read `{}` of null", name)));
            }
            _ => Value::Null,
        })
    }

    /// Read `object[index]`. Numeric indexes are positional; an object
    /// indexed by position yields a `{key, value}` pair.
    pub fn index(&self, object: &Value, index: &Value) -> Result<Value> {
        let position = index.as_number().and_then(as_index);
        Ok(match (object, index) {
            (Value::Null, _) => {
                return Err(Error::TypeError(format!(
                    "cannot index null with `{}`",
                    self.stringify(index)
                )));
            }
            (_, Value::String(key)) => self.member(object, key)?,
            (Value::List(items), _) => position
                .and_then(|i| items.borrow().get(i).cloned())
                .unwrap_or_default(),
            (Value::String(s), _) => position
                .and_then(|i| s.chars().nth(i))
                .map(|c| Value::String(c.to_string()))
                .unwrap_or_default(),
            (Value::Object(o), _) => match position.and_then(|i| o.borrow().entry_at(i)) {
                Some((key, value)) => {
                    let mut pair = JsonObject::new();
                    pair.set("key", Value::String(key));
                    pair.set("value", value);
                    Value::object(pair)
                }
                None => Value::Null,
            },
            (Value::Container(c), _) => position
                .and_then(|i| c.positional(i))
                .map(Value::Container)
                .unwrap_or_default(),
            (Value::Link(link), _) => position
                .and_then(|i| link.nth(i))
                .map(Value::Container)
                .unwrap_or_default(),
            _ => Value::Null,
        })
    }

    /// `receiver.method(args)`: built-in string and list methods first,
    /// then a callable member with `this` bound to the receiver.
    fn eval_method_call(&mut self, receiver: &Node, method: &str, args: &[Node]) -> Result<Value> {
        let receiver_value = self.eval(receiver)?;
        let args = self.eval_all(args)?;
        let builtin = match &receiver_value {
            Value::String(s) => builtins::string_method(self, s, method, &args)?,
            Value::List(items) => builtins::list_method(self, items, method, &args)?,
            _ => None,
        };
        if let Some(value) = builtin {
            return Ok(value);
        }
        let function = self.member(&receiver_value, method)?;
        if !matches!(function, Value::Function(_)) {
            return Err(Error::NotCallable(format!("{}.{}", describe(receiver), method)));
        }
        self.call(&function, receiver_value, args)
    }

    /// `new callee(args)`: call with a fresh object as `this`; the result
    /// is that object unless the function returned another object.
    fn eval_new(&mut self, callee: &Node, args: &[Node]) -> Result<Value> {
        let function = self.eval(callee)?;
        if !matches!(function, Value::Function(_)) {
            return Err(Error::NotCallable(describe(callee)));
        }
        let args = self.eval_all(args)?;
        let this = Value::object(JsonObject::new());
        let result = self.call(&function, this.clone(), args)?;
        Ok(match result {
            Value::Object(_) => result,
            _ => this,
        })
    }

    fn eval_all(&mut self, nodes: &[Node]) -> Result<Vec<Value>> {
        nodes.iter().map(|node| self.eval(node)).collect()
    }

    /// Capture the current environment by reference.
    fn closure(&self, def: &Rc<FunctionDef>) -> Value {
        Value::Function(Rc::new(Callable::Script {
            def: def.clone(),
            env: self.env.clone(),
        }))
    }

    /// Run a script function: `this` and the parameters are bound in
    /// frames chained off the captured environment. Missing arguments are
    /// `null`.
    fn invoke(&mut self, def: &FunctionDef, env: &Env, this: Value, args: Vec<Value>) -> Result<Value> {
        let saved = std::mem::replace(&mut self.env, env.bind("this", this));
        let mut args = args.into_iter();
        for param in &def.params {
            self.env = self.env.bind(param, args.next().unwrap_or_default());
        }
        let result = self.run_statements(&def.body);
        self.env = saved;
        let returned = std::mem::take(&mut self.pending);
        let was_returning = std::mem::replace(&mut self.returning, false);
        result?;
        Ok(if was_returning { returned } else { Value::Null })
    }

    fn tick(&mut self) -> Result<()> {
        self.steps += 1;
        match self.options.max_steps {
            Some(max) if self.steps > max => Err(Error::StepLimit(max)),
            _ => Ok(()),
        }
    }
}

/// Non-negative integral numbers are valid positions.
fn as_index(n: f64) -> Option<usize> {
    (n >= 0.0 && n.fract() == 0.0 && n < usize::MAX as f64).then_some(n as usize)
}

/// Source-ish rendering of a callee for error messages.
fn describe(node: &Node) -> String {
    match node {
        Node::Ident(name) => name.clone(),
        Node::Field { object, name } => format!("{}.{}", describe(object), name),
        other => other.kind().to_string(),
    }
}
