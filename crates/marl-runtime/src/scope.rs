//! Lexical scopes for Marl evaluation

use std::collections::HashMap;
use std::sync::Arc;

use crate::object::{Object, ObjectKind};
use crate::value::Value;

/// Reference to a scope (shared, immutable)
pub type ScopeRef = Arc<Scope>;

/// Lexical scope for identifier resolution
#[derive(Debug, Default)]
pub struct Scope {
    /// Local bindings (let, function parameters, for-generator variables)
    locals: HashMap<String, Value>,

    /// Parent scope (lexical)
    parent: Option<ScopeRef>,

    /// The `this` object in this scope
    this_obj: Option<Arc<Object>>,

    /// The enclosing object (previous `this`)
    outer_obj: Option<Arc<Object>>,

    /// The module object
    module_obj: Option<Arc<Object>>,
}

impl Scope {
    /// Create a new root scope
    pub fn new() -> ScopeRef {
        Arc::new(Self::default())
    }

    /// Create a scope rooted at a module object
    pub fn with_module(module: Arc<Object>) -> ScopeRef {
        Arc::new(Self {
            locals: HashMap::new(),
            parent: None,
            this_obj: Some(Arc::clone(&module)),
            outer_obj: None,
            module_obj: Some(module),
        })
    }

    /// Create a child scope with additional local bindings
    pub fn with_locals(parent: &ScopeRef, bindings: Vec<(String, Value)>) -> ScopeRef {
        let mut locals = HashMap::new();
        for (name, value) in bindings {
            locals.insert(name, value);
        }
        Arc::new(Self {
            locals,
            parent: Some(Arc::clone(parent)),
            this_obj: parent.this_obj.clone(),
            outer_obj: parent.outer_obj.clone(),
            module_obj: parent.module_obj.clone(),
        })
    }

    /// Create a child scope with a new `this` object
    pub fn with_this(parent: &ScopeRef, this_obj: Arc<Object>) -> ScopeRef {
        Arc::new(Self {
            locals: HashMap::new(),
            parent: Some(Arc::clone(parent)),
            this_obj: Some(this_obj),
            // Previous this becomes the enclosing object
            outer_obj: parent.this_obj.clone(),
            module_obj: parent.module_obj.clone(),
        })
    }

    /// Create a child scope for lambda application
    pub fn for_lambda(parent: &ScopeRef, params: Vec<(String, Value)>) -> ScopeRef {
        let mut locals = HashMap::new();
        for (name, value) in params {
            locals.insert(name, value);
        }
        Arc::new(Self {
            locals,
            parent: Some(Arc::clone(parent)),
            this_obj: parent.this_obj.clone(),
            outer_obj: parent.outer_obj.clone(),
            module_obj: parent.module_obj.clone(),
        })
    }

    /// Create a child scope with the receiver overridden.
    ///
    /// Used when forcing an inherited member of an amendment: the member's
    /// expression was captured in the parent's scope, but `this` (and, when
    /// the receiver is a module, module references) must resolve against the
    /// amending object so overridden siblings are visible.
    pub fn with_receiver_override(parent: &ScopeRef, receiver: Arc<Object>) -> ScopeRef {
        let module_obj = if matches!(receiver.kind, ObjectKind::Module(_)) {
            Some(Arc::clone(&receiver))
        } else {
            parent.module_obj.clone()
        };
        Arc::new(Self {
            locals: HashMap::new(),
            parent: Some(Arc::clone(parent)),
            this_obj: Some(receiver),
            outer_obj: parent.outer_obj.clone(),
            module_obj,
        })
    }

    /// Scope with `this` bound to a plain value, for constraint expressions
    /// attached to type annotations.
    pub fn for_constraint(this_value: Value) -> ScopeRef {
        let mut locals = HashMap::new();
        locals.insert("this".to_string(), this_value);
        Arc::new(Self {
            locals,
            parent: None,
            this_obj: None,
            outer_obj: None,
            module_obj: None,
        })
    }

    /// Resolve an identifier against locals, then the parent chain
    pub fn resolve(&self, name: &str) -> Option<Value> {
        if let Some(v) = self.locals.get(name) {
            return Some(v.clone());
        }
        if let Some(parent) = &self.parent {
            return parent.resolve(name);
        }
        None
    }

    pub fn this(&self) -> Option<&Arc<Object>> {
        self.this_obj.as_ref()
    }

    pub fn outer(&self) -> Option<&Arc<Object>> {
        self.outer_obj.as_ref()
    }

    /// The `super` object: parent of `this` in the amendment chain
    pub fn super_obj(&self) -> Option<Arc<Object>> {
        self.this_obj.as_ref().and_then(|obj| obj.parent.clone())
    }

    pub fn module(&self) -> Option<&Arc<Object>> {
        self.module_obj.as_ref()
    }

    pub fn has_local(&self, name: &str) -> bool {
        self.locals.contains_key(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn locals_shadow_parent() {
        let root = Scope::new();
        let outer = Scope::with_locals(&root, vec![("x".to_string(), Value::Int(1))]);
        let inner = Scope::with_locals(&outer, vec![("x".to_string(), Value::Int(2))]);
        assert_eq!(inner.resolve("x"), Some(Value::Int(2)));
        assert_eq!(outer.resolve("x"), Some(Value::Int(1)));
    }

    #[test]
    fn with_this_tracks_outer() {
        let root = Scope::new();
        let a = Arc::new(Object::new_dynamic(Arc::clone(&root)));
        let b = Arc::new(Object::new_dynamic(Arc::clone(&root)));
        let s1 = Scope::with_this(&root, Arc::clone(&a));
        let s2 = Scope::with_this(&s1, Arc::clone(&b));
        assert!(Arc::ptr_eq(s2.this().unwrap(), &b));
        assert!(Arc::ptr_eq(s2.outer().unwrap(), &a));
    }
}
