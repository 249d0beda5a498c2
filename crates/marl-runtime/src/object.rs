//! Marl objects: lazy members over an amendment chain
//!
//! An object never copies its parent's member table. It stores only its own
//! declarations plus a parent pointer; lookup falls through to the parent, so
//! an amendment costs O(overridden members). Member order is the parent's
//! order with new members appended, and overriding never moves a member.

use std::cell::RefCell;
use std::fmt;
use std::sync::Arc;

use indexmap::IndexMap;
use serde::ser::{SerializeMap, SerializeSeq};
use serde::{Serialize, Serializer};

use crate::error::{ErrorKind, EvalResult};
use crate::scope::ScopeRef;
use crate::value::Value;

/// Object kind: closed set, exhaustively matched by evaluation and rendering
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ObjectKind {
    /// Untyped property bag
    Dynamic,
    /// Index-ordered elements
    Listing,
    /// Key-ordered entries
    Mapping,
    /// Instance of a declared class
    Typed(String),
    /// Top-level module object, identified by its resolved URI
    Module(String),
}

/// Shared reference to an object member
pub type MemberRef = Arc<Member>;

/// A Marl object
pub struct Object {
    pub kind: ObjectKind,

    /// Parent object in the amendment chain
    pub parent: Option<Arc<Object>>,

    /// Own properties (name -> member); Arc so amendments share thunk state
    pub properties: RefCell<IndexMap<String, MemberRef>>,

    /// Own elements (Listing)
    pub elements: RefCell<Vec<MemberRef>>,

    /// Own entries (Mapping)
    pub entries: RefCell<IndexMap<Value, MemberRef>>,

    /// Defining lexical scope
    pub scope: ScopeRef,
}

/// Metadata attached to a member at declaration time
#[derive(Debug, Clone, Default)]
pub struct MemberMetadata {
    /// Excluded from rendered output
    pub is_hidden: bool,
    /// Not inherited by amendments
    pub is_local: bool,
    /// Declared type, checked when the member is forced
    pub ty: Option<marl_ast::TypeAnnotation>,
}

/// A lazily evaluated member
#[derive(Debug)]
pub struct Member {
    state: RefCell<MemberState>,
    metadata: MemberMetadata,
}

#[derive(Debug, Clone)]
enum MemberState {
    /// Not yet forced: expression closed over its defining scope
    Unevaluated {
        expr: marl_ast::Expr,
        scope: ScopeRef,
    },
    /// Not yet forced: overlay of a base member's value with an object body
    UnevaluatedAmend {
        base: MemberRef,
        body: marl_ast::ObjectBody,
        scope: ScopeRef,
        hint: Option<String>,
    },
    /// Currently being forced; a re-entrant force is a cyclic evaluation
    Evaluating,
    /// Memoized, keeping the expression so copies promoted into an
    /// amendment can re-evaluate it against the amending object
    EvaluatedWithExpr {
        value: Value,
        expr: marl_ast::Expr,
        scope: ScopeRef,
    },
    /// Memoized
    Evaluated(Value),
}

/// Work handed to the evaluator when a lazy member is forced
pub enum Pending {
    /// Evaluate an expression in its captured scope
    Expr { expr: marl_ast::Expr, scope: ScopeRef },
    /// Force the base member, then overlay it with an object body
    Amend {
        base: MemberRef,
        body: marl_ast::ObjectBody,
        scope: ScopeRef,
        hint: Option<String>,
    },
}

/// Clears the `Evaluating` marker if forcing unwinds with an error, so a
/// failed member can be retried and sibling members stay usable.
struct EvaluatingGuard<'a> {
    member: &'a Member,
    restore: Option<MemberState>,
}

impl Drop for EvaluatingGuard<'_> {
    fn drop(&mut self) {
        if let Some(state) = self.restore.take() {
            *self.member.state.borrow_mut() = state;
        }
    }
}

impl Member {
    pub fn new(expr: marl_ast::Expr, scope: ScopeRef) -> Self {
        Self {
            state: RefCell::new(MemberState::Unevaluated { expr, scope }),
            metadata: MemberMetadata::default(),
        }
    }

    pub fn with_metadata(expr: marl_ast::Expr, scope: ScopeRef, metadata: MemberMetadata) -> Self {
        Self {
            state: RefCell::new(MemberState::Unevaluated { expr, scope }),
            metadata,
        }
    }

    /// Lazy overlay of `base` with an object body. The base member is only
    /// forced when this member is.
    pub fn amend_of(
        base: MemberRef,
        body: marl_ast::ObjectBody,
        scope: ScopeRef,
        hint: Option<String>,
        metadata: MemberMetadata,
    ) -> Self {
        Self {
            state: RefCell::new(MemberState::UnevaluatedAmend {
                base,
                body,
                scope,
                hint,
            }),
            metadata,
        }
    }

    pub fn evaluated(value: Value) -> Self {
        Self {
            state: RefCell::new(MemberState::Evaluated(value)),
            metadata: MemberMetadata::default(),
        }
    }

    pub fn evaluated_with_metadata(value: Value, metadata: MemberMetadata) -> Self {
        Self {
            state: RefCell::new(MemberState::Evaluated(value)),
            metadata,
        }
    }

    pub fn is_hidden(&self) -> bool {
        self.metadata.is_hidden
    }

    pub fn is_local(&self) -> bool {
        self.metadata.is_local
    }

    pub fn metadata(&self) -> &MemberMetadata {
        &self.metadata
    }

    pub fn is_evaluated(&self) -> bool {
        matches!(
            *self.state.borrow(),
            MemberState::Evaluated(_) | MemberState::EvaluatedWithExpr { .. }
        )
    }

    /// Get the memoized value, if any
    pub fn get_if_evaluated(&self) -> Option<Value> {
        match &*self.state.borrow() {
            MemberState::Evaluated(v) => Some(v.clone()),
            MemberState::EvaluatedWithExpr { value, .. } => Some(value.clone()),
            _ => None,
        }
    }

    /// Force this member. Memoized after the first successful evaluation;
    /// re-entrant forcing surfaces as a cyclic-evaluation error.
    pub fn force<F>(&self, name: &str, eval_fn: F) -> EvalResult<Value>
    where
        F: FnOnce(Pending) -> EvalResult<Value>,
    {
        let current = self.state.borrow().clone();
        match current {
            MemberState::Unevaluated { expr, scope } => {
                *self.state.borrow_mut() = MemberState::Evaluating;
                let guard = EvaluatingGuard {
                    member: self,
                    restore: Some(MemberState::Unevaluated {
                        expr: expr.clone(),
                        scope: Arc::clone(&scope),
                    }),
                };

                let result = eval_fn(Pending::Expr {
                    expr: expr.clone(),
                    scope: Arc::clone(&scope),
                })?;

                let mut guard = guard;
                guard.restore = None;
                *self.state.borrow_mut() = MemberState::EvaluatedWithExpr {
                    value: result.clone(),
                    expr,
                    scope,
                };
                Ok(result)
            }
            MemberState::UnevaluatedAmend {
                base,
                body,
                scope,
                hint,
            } => {
                *self.state.borrow_mut() = MemberState::Evaluating;
                let guard = EvaluatingGuard {
                    member: self,
                    restore: Some(MemberState::UnevaluatedAmend {
                        base: Arc::clone(&base),
                        body: body.clone(),
                        scope: Arc::clone(&scope),
                        hint: hint.clone(),
                    }),
                };

                let result = eval_fn(Pending::Amend {
                    base,
                    body,
                    scope,
                    hint,
                })?;

                let mut guard = guard;
                guard.restore = None;
                *self.state.borrow_mut() = MemberState::Evaluated(result.clone());
                Ok(result)
            }
            MemberState::Evaluating => Err(ErrorKind::CyclicEvaluation {
                member: name.to_string(),
            }
            .into()),
            MemberState::EvaluatedWithExpr { value, .. } => Ok(value),
            MemberState::Evaluated(v) => Ok(v),
        }
    }

    /// Unevaluated copy of this thunk with its captured scope rebound so
    /// `this` (and, for modules, module references) resolve against
    /// `receiver`. Returns None when there is nothing left to re-evaluate.
    fn to_unevaluated_copy(&self, receiver: &Arc<Object>) -> Option<Member> {
        let rebind = |scope: &ScopeRef| {
            crate::scope::Scope::with_receiver_override(scope, Arc::clone(receiver))
        };
        let state = match &*self.state.borrow() {
            MemberState::Unevaluated { expr, scope }
            | MemberState::EvaluatedWithExpr { expr, scope, .. } => MemberState::Unevaluated {
                expr: expr.clone(),
                scope: rebind(scope),
            },
            MemberState::UnevaluatedAmend {
                base,
                body,
                scope,
                hint,
            } => MemberState::UnevaluatedAmend {
                base: Arc::clone(base),
                body: body.clone(),
                scope: rebind(scope),
                hint: hint.clone(),
            },
            MemberState::Evaluating | MemberState::Evaluated(_) => return None,
        };
        Some(Member {
            state: RefCell::new(state),
            metadata: self.metadata.clone(),
        })
    }

    /// Overwrite with an evaluated value
    pub fn set_value(&self, value: Value) {
        *self.state.borrow_mut() = MemberState::Evaluated(value);
    }
}

impl Object {
    fn empty(kind: ObjectKind, scope: ScopeRef) -> Self {
        Self {
            kind,
            parent: None,
            properties: RefCell::new(IndexMap::new()),
            elements: RefCell::new(Vec::new()),
            entries: RefCell::new(IndexMap::new()),
            scope,
        }
    }

    pub fn new_dynamic(scope: ScopeRef) -> Self {
        Self::empty(ObjectKind::Dynamic, scope)
    }

    pub fn new_listing(scope: ScopeRef) -> Self {
        Self::empty(ObjectKind::Listing, scope)
    }

    pub fn new_mapping(scope: ScopeRef) -> Self {
        Self::empty(ObjectKind::Mapping, scope)
    }

    pub fn new_typed(class_name: String, scope: ScopeRef) -> Self {
        Self::empty(ObjectKind::Typed(class_name), scope)
    }

    pub fn new_module(uri: String, scope: ScopeRef) -> Self {
        Self::empty(ObjectKind::Module(uri), scope)
    }

    /// Create an amendment of this object: same kind, this object as parent,
    /// empty own member tables.
    pub fn amend(self: &Arc<Self>, new_scope: ScopeRef) -> Self {
        Self {
            kind: self.kind.clone(),
            parent: Some(Arc::clone(self)),
            properties: RefCell::new(IndexMap::new()),
            elements: RefCell::new(Vec::new()),
            entries: RefCell::new(IndexMap::new()),
            scope: new_scope,
        }
    }

    /// Amendment of this object viewed as a module with the given URI
    pub fn amend_as_module(self: &Arc<Self>, uri: String, new_scope: ScopeRef) -> Self {
        Self {
            kind: ObjectKind::Module(uri),
            parent: Some(Arc::clone(self)),
            properties: RefCell::new(IndexMap::new()),
            elements: RefCell::new(Vec::new()),
            entries: RefCell::new(IndexMap::new()),
            scope: new_scope,
        }
    }

    /// Runtime type identity, exposed through the render contract
    pub fn type_name(&self) -> &'static str {
        match &self.kind {
            ObjectKind::Dynamic => "Dynamic",
            ObjectKind::Listing => "Listing",
            ObjectKind::Mapping => "Mapping",
            ObjectKind::Typed(_) => "Object",
            ObjectKind::Module(_) => "Module",
        }
    }

    /// Class name for typed instances
    pub fn class_name(&self) -> Option<&str> {
        match &self.kind {
            ObjectKind::Typed(name) => Some(name),
            _ => None,
        }
    }

    /// Module URI for module objects
    pub fn module_uri(&self) -> Option<&str> {
        match &self.kind {
            ObjectKind::Module(uri) => Some(uri),
            _ => None,
        }
    }

    /// Short description for error traces
    pub fn describe(&self) -> String {
        match &self.kind {
            ObjectKind::Module(uri) => uri.clone(),
            ObjectKind::Typed(name) => name.clone(),
            ObjectKind::Dynamic => "Dynamic".to_string(),
            ObjectKind::Listing => "Listing".to_string(),
            ObjectKind::Mapping => "Mapping".to_string(),
        }
    }

    pub fn add_property(&self, name: String, member: Member) {
        self.properties.borrow_mut().insert(name, Arc::new(member));
    }

    pub fn add_element(&self, member: Member) {
        self.elements.borrow_mut().push(Arc::new(member));
    }

    pub fn add_entry(&self, key: Value, member: Member) {
        self.entries.borrow_mut().insert(key, Arc::new(member));
    }

    /// Property lookup through the amendment chain
    pub fn get_property_member(&self, name: &str) -> Option<MemberRef> {
        if let Some(member) = self.properties.borrow().get(name) {
            return Some(Arc::clone(member));
        }
        if let Some(parent) = &self.parent {
            // Local members are not inherited
            if let Some(member) = parent.get_property_member(name) {
                if !member.is_local() {
                    return Some(member);
                }
            }
        }
        None
    }

    /// Property lookup that stops at this object's own table
    pub fn get_own_property_member(&self, name: &str) -> Option<MemberRef> {
        self.properties.borrow().get(name).map(Arc::clone)
    }

    /// Copy-on-write lookup for amendments: an inherited thunk is copied
    /// into this object's own table with `this` rebound to this object, so
    /// forcing it sees overridden siblings while the parent's memo and every
    /// sibling amendment stay untouched. Returns None when the member
    /// carries no thunk; the shared value is then receiver-independent and
    /// can be used as-is.
    pub fn promote_property_member(self: &Arc<Self>, name: &str) -> Option<MemberRef> {
        if let Some(own) = self.get_own_property_member(name) {
            return Some(own);
        }
        let inherited = self.get_property_member(name)?;
        let copy = inherited.to_unevaluated_copy(self)?;
        let member: MemberRef = Arc::new(copy);
        self.properties
            .borrow_mut()
            .insert(name.to_string(), Arc::clone(&member));
        Some(member)
    }

    pub fn has_property(&self, name: &str) -> bool {
        self.get_property_member(name).is_some()
    }

    pub fn has_own_property(&self, name: &str) -> bool {
        self.properties.borrow().contains_key(name)
    }

    /// Element lookup: parent elements come first, own elements append
    pub fn get_element_member(&self, index: usize) -> Option<MemberRef> {
        let parent_len = self.parent.as_ref().map_or(0, |p| p.element_count());
        if index < parent_len {
            self.parent.as_ref().and_then(|p| p.get_element_member(index))
        } else {
            self.elements.borrow().get(index - parent_len).cloned()
        }
    }

    /// Entry lookup through the amendment chain (own entries override)
    pub fn get_entry_member(&self, key: &Value) -> Option<MemberRef> {
        if let Some(member) = self.entries.borrow().get(key) {
            return Some(Arc::clone(member));
        }
        if let Some(parent) = &self.parent {
            return parent.get_entry_member(key);
        }
        None
    }

    pub fn element_count(&self) -> usize {
        let local = self.elements.borrow().len();
        let parent = self.parent.as_ref().map_or(0, |p| p.element_count());
        local + parent
    }

    /// All property names in effective order: parent order first, own
    /// additions appended. Overriding keeps the parent's position.
    pub fn property_names(&self) -> Vec<String> {
        let mut names = Vec::new();
        if let Some(parent) = &self.parent {
            for name in parent.property_names() {
                let inherited = parent
                    .get_property_member(&name)
                    .is_some_and(|m| !m.is_local());
                if inherited {
                    names.push(name);
                }
            }
        }
        for name in self.properties.borrow().keys() {
            if !names.contains(name) {
                names.push(name.clone());
            }
        }
        names
    }

    /// Property names that should appear in rendered output
    pub fn visible_property_names(&self) -> Vec<String> {
        self.property_names()
            .into_iter()
            .filter(|name| {
                self.get_property_member(name)
                    .is_some_and(|m| !m.is_hidden() && !m.is_local())
            })
            .collect()
    }

    /// All entry keys in effective order
    pub fn entry_keys(&self) -> Vec<Value> {
        let mut keys = Vec::new();
        if let Some(parent) = &self.parent {
            keys.extend(parent.entry_keys());
        }
        for key in self.entries.borrow().keys() {
            if !keys.contains(key) {
                keys.push(key.clone());
            }
        }
        keys
    }
}

// Shallow by hand: the object graph is cyclic (members may hold `this`, the
// defining scope points back at the object), so a derived Debug would never
// terminate.
impl fmt::Debug for Object {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Object")
            .field("kind", &self.kind)
            .field("parent", &self.parent.as_ref().map(|p| p.describe()))
            .field(
                "properties",
                &self.properties.borrow().keys().cloned().collect::<Vec<_>>(),
            )
            .field("elements", &self.elements.borrow().len())
            .field("entries", &self.entries.borrow().len())
            .finish()
    }
}

impl fmt::Display for Object {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.kind {
            ObjectKind::Dynamic => write!(f, "new {{...}}"),
            ObjectKind::Listing => write!(f, "new Listing {{...}}"),
            ObjectKind::Mapping => write!(f, "new Mapping {{...}}"),
            ObjectKind::Typed(name) => write!(f, "new {} {{...}}", name),
            ObjectKind::Module(uri) => write!(f, "module {}", uri),
        }
    }
}

// Serializes only memoized members; callers deep-force through the
// evaluator before rendering.
impl Serialize for Object {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match &self.kind {
            ObjectKind::Listing => {
                let count = self.element_count();
                let mut seq = serializer.serialize_seq(Some(count))?;
                for i in 0..count {
                    if let Some(member) = self.get_element_member(i) {
                        if let Some(value) = member.get_if_evaluated() {
                            seq.serialize_element(&value)?;
                        }
                    }
                }
                seq.end()
            }
            ObjectKind::Mapping => {
                let keys = self.entry_keys();
                let mut map = serializer.serialize_map(Some(keys.len()))?;
                for key in keys {
                    if let Some(member) = self.get_entry_member(&key) {
                        if let Some(value) = member.get_if_evaluated() {
                            let key_str = match &key {
                                Value::String(s) => s.to_string(),
                                _ => key.to_string(),
                            };
                            map.serialize_entry(&key_str, &value)?;
                        }
                    }
                }
                map.end()
            }
            ObjectKind::Dynamic | ObjectKind::Typed(_) | ObjectKind::Module(_) => {
                let names = self.visible_property_names();
                let element_count = self.element_count();
                let entry_keys = self.entry_keys();

                if element_count > 0 && entry_keys.is_empty() && names.is_empty() {
                    // Pure element object renders as a sequence
                    let mut seq = serializer.serialize_seq(Some(element_count))?;
                    for i in 0..element_count {
                        if let Some(member) = self.get_element_member(i) {
                            if let Some(value) = member.get_if_evaluated() {
                                seq.serialize_element(&value)?;
                            }
                        }
                    }
                    seq.end()
                } else {
                    let mut map = serializer.serialize_map(None)?;
                    for name in names {
                        if let Some(member) = self.get_property_member(&name) {
                            if let Some(value) = member.get_if_evaluated() {
                                map.serialize_entry(&name, &value)?;
                            }
                        }
                    }
                    for i in 0..element_count {
                        if let Some(member) = self.get_element_member(i) {
                            if let Some(value) = member.get_if_evaluated() {
                                map.serialize_entry(&i.to_string(), &value)?;
                            }
                        }
                    }
                    for key in entry_keys {
                        if let Some(member) = self.get_entry_member(&key) {
                            if let Some(value) = member.get_if_evaluated() {
                                let key_str = match &key {
                                    Value::String(s) => s.to_string(),
                                    _ => key.to_string(),
                                };
                                map.serialize_entry(&key_str, &value)?;
                            }
                        }
                    }
                    map.end()
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scope::Scope;
    use marl_ast::builder;

    #[test]
    fn amendment_preserves_parent_order_and_appends() {
        let scope = Scope::new();
        let base = Arc::new(Object::new_dynamic(Arc::clone(&scope)));
        base.add_property("x".to_string(), Member::evaluated(Value::Int(1)));
        base.add_property("y".to_string(), Member::evaluated(Value::Int(2)));

        let amended = Arc::new(base.amend(Arc::clone(&scope)));
        amended.add_property("y".to_string(), Member::evaluated(Value::Int(20)));
        amended.add_property("z".to_string(), Member::evaluated(Value::Int(3)));

        assert_eq!(amended.property_names(), vec!["x", "y", "z"]);
        assert_eq!(
            amended
                .get_property_member("y")
                .unwrap()
                .get_if_evaluated(),
            Some(Value::Int(20))
        );
        assert_eq!(
            amended
                .get_property_member("x")
                .unwrap()
                .get_if_evaluated(),
            Some(Value::Int(1))
        );
    }

    #[test]
    fn reentrant_force_is_cyclic() {
        let scope = Scope::new();
        let member = Member::new(builder::int(1), Arc::clone(&scope));
        let result = member.force("p", |_| {
            // Simulate the expression forcing itself again
            member.force("p", |_| Ok(Value::Int(1)))
        });
        assert!(matches!(
            result.unwrap_err().kind,
            ErrorKind::CyclicEvaluation { .. }
        ));
    }

    #[test]
    fn failed_force_can_be_retried() {
        let scope = Scope::new();
        let member = Member::new(builder::int(1), Arc::clone(&scope));
        let first = member.force("p", |_| Err(crate::error::EvalError::io("boom")));
        assert!(first.is_err());
        let second = member.force("p", |_| Ok(Value::Int(7)));
        assert_eq!(second.unwrap(), Value::Int(7));
    }

    #[test]
    fn force_is_memoized() {
        let scope = Scope::new();
        let member = Member::new(builder::int(1), Arc::clone(&scope));
        let mut runs = 0;
        let v1 = member
            .force("p", |_| {
                runs += 1;
                Ok(Value::Int(5))
            })
            .unwrap();
        let v2 = member
            .force("p", |_| {
                runs += 1;
                Ok(Value::Int(99))
            })
            .unwrap();
        assert_eq!(v1, v2);
        assert_eq!(runs, 1);
    }

    #[test]
    fn promotion_copies_the_thunk_instead_of_sharing_it() {
        let scope = Scope::new();
        let base = Arc::new(Object::new_dynamic(Arc::clone(&scope)));
        base.add_property("y".to_string(), Member::new(builder::int(1), Arc::clone(&scope)));

        let amended = Arc::new(base.amend(Arc::clone(&scope)));
        let copy = amended.promote_property_member("y").unwrap();
        let original = base.get_property_member("y").unwrap();
        assert!(!Arc::ptr_eq(&copy, &original));

        // Forcing the copy must not touch the parent's thunk
        copy.force("y", |_| Ok(Value::Int(11))).unwrap();
        assert_eq!(copy.get_if_evaluated(), Some(Value::Int(11)));
        assert_eq!(original.get_if_evaluated(), None);
        original.force("y", |_| Ok(Value::Int(1))).unwrap();
        assert_eq!(original.get_if_evaluated(), Some(Value::Int(1)));
    }

    #[test]
    fn promotion_after_parent_memo_reuses_the_expression() {
        let scope = Scope::new();
        let base = Arc::new(Object::new_dynamic(Arc::clone(&scope)));
        base.add_property("y".to_string(), Member::new(builder::int(1), Arc::clone(&scope)));
        base.get_property_member("y")
            .unwrap()
            .force("y", |_| Ok(Value::Int(1)))
            .unwrap();

        let amended = Arc::new(base.amend(Arc::clone(&scope)));
        let copy = amended.promote_property_member("y").unwrap();
        // Memoized-with-expr members promote to a fresh unevaluated thunk
        assert_eq!(copy.get_if_evaluated(), None);
        let v = copy.force("y", |_| Ok(Value::Int(11))).unwrap();
        assert_eq!(v, Value::Int(11));
        // A second promotion returns the already-promoted member
        let again = amended.promote_property_member("y").unwrap();
        assert!(Arc::ptr_eq(&copy, &again));
    }

    #[test]
    fn debug_output_stays_shallow() {
        let scope = Scope::new();
        let base = Arc::new(Object::new_dynamic(Arc::clone(&scope)));
        base.add_property("x".to_string(), Member::evaluated(Value::Int(1)));
        let amended = Arc::new(base.amend(Arc::clone(&scope)));
        // A member holding the object itself must not recurse
        amended.add_property(
            "this_ref".to_string(),
            Member::evaluated(Value::Object(Arc::clone(&amended))),
        );
        let rendered = format!("{:?}", amended);
        assert!(rendered.contains("this_ref"));
        assert!(rendered.contains("Dynamic"));
    }
}
