// ABOUTME: Lexical environment for PTC-Lisp as an immutable frame chain
// Closures capture by value, so frames are shared read-only across threads.

use crate::value::Value;
use std::collections::HashMap;
use std::sync::Arc;

#[derive(Debug)]
struct Frame {
    bindings: HashMap<String, Value>,
    parent: Option<Arc<Frame>>,
}

/// A chain of binding frames. Cloning an `Env` is cheap (one Arc bump) and
/// the result is independent: bindings are never mutated after creation.
#[derive(Debug, Clone, Default)]
pub struct Env {
    head: Option<Arc<Frame>>,
}

impl Env {
    /// The empty environment.
    pub fn new() -> Self {
        Env { head: None }
    }

    /// Creates a child environment with an extra frame of bindings.
    pub fn with_frame(&self, bindings: HashMap<String, Value>) -> Self {
        Env {
            head: Some(Arc::new(Frame {
                bindings,
                parent: self.head.clone(),
            })),
        }
    }

    /// Looks up a symbol in this scope and parent scopes.
    pub fn get(&self, name: &str) -> Option<Value> {
        let mut frame = self.head.as_deref();
        while let Some(f) = frame {
            if let Some(value) = f.bindings.get(name) {
                return Some(value.clone());
            }
            frame = f.parent.as_deref();
        }
        None
    }
}
