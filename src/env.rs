//! Lexical environments as immutable, parent-chained frames.
//!
//! Binding a variable pushes a new frame in front of the chain; existing
//! frames are never relinked, so a closure holding an [`Env`] keeps seeing
//! exactly the bindings that were in scope when it was created. Only the
//! value slot of a frame is mutable, for assignment.

use std::cell::RefCell;
use std::rc::Rc;

use crate::value::Value;

pub struct Frame {
    name: String,
    value: RefCell<Value>,
    parent: Option<Rc<Frame>>,
}

/// Handle to the innermost frame; empty at the top level.
#[derive(Clone, Default)]
pub struct Env {
    head: Option<Rc<Frame>>,
}

impl Env {
    pub fn new() -> Self {
        Self::default()
    }

    /// A new environment with `name` bound in front of this one.
    pub fn bind(&self, name: &str, value: Value) -> Env {
        Env {
            head: Some(Rc::new(Frame {
                name: name.to_string(),
                value: RefCell::new(value),
                parent: self.head.clone(),
            })),
        }
    }

    fn frame(&self, name: &str) -> Option<&Frame> {
        let mut current = self.head.as_deref();
        while let Some(frame) = current {
            if frame.name == name {
                return Some(frame);
            }
            current = frame.parent.as_deref();
        }
        None
    }

    pub fn get(&self, name: &str) -> Option<Value> {
        self.frame(name).map(|f| f.value.borrow().clone())
    }

    /// Overwrite the nearest binding of `name`. Returns `false` if unbound.
    pub fn assign(&self, name: &str, value: Value) -> bool {
        match self.frame(name) {
            Some(frame) => {
                *frame.value.borrow_mut() = value;
                true
            }
            None => false,
        }
    }

    pub fn depth(&self) -> usize {
        let mut n = 0;
        let mut current = self.head.as_deref();
        while let Some(frame) = current {
            n += 1;
            current = frame.parent.as_deref();
        }
        n
    }
}

impl Drop for Frame {
    // Unlink long chains iteratively so dropping them cannot overflow the stack.
    fn drop(&mut self) {
        let mut next = self.parent.take();
        while let Some(frame) = next {
            match Rc::try_unwrap(frame) {
                Ok(mut frame) => next = frame.parent.take(),
                Err(_) => break,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn shadowing_and_capture() {
        let outer = Env::new().bind("x", Value::Number(1.0));
        let inner = outer.bind("x", Value::Number(2.0));
        assert_eq!(inner.get("x"), Some(Value::Number(2.0)));
        assert_eq!(outer.get("x"), Some(Value::Number(1.0)));

        assert!(inner.assign("x", Value::Number(3.0)));
        assert_eq!(outer.get("x"), Some(Value::Number(1.0)));
        assert!(!inner.assign("y", Value::Null));
        assert_eq!(inner.depth(), 2);
    }

    #[test]
    fn long_chains_drop() {
        let mut env = Env::new();
        for i in 0..200_000 {
            env = env.bind("v", Value::Number(i as f64));
        }
        assert_eq!(env.depth(), 200_000);
        drop(env);
    }
}
