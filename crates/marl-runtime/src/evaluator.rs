//! Expression and module evaluation
//!
//! One evaluator instance is single-threaded: the object graph it produces
//! carries interior mutability and must not leave the evaluator's thread.
//! Parsed modules come from the shared [`ModuleCache`] via the loader;
//! evaluated module objects stay local to this evaluator.

use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use indexmap::IndexMap;

use marl_ast::{
    BinaryOp, Expr, ExprKind, ImportKind, Module, ModuleKind, ModuleMember, ObjectBody,
    ObjectBodyMember, PropertyValue, StringLiteral, StringPart, TypeAnnotation, TypeKind, UnaryOp,
};

use crate::class::{self, ClassRegistry};
use crate::error::{ErrorKind, EvalError, EvalResult, StackFrame};
use crate::loader::ModuleLoader;
use crate::object::{Member, MemberMetadata, MemberRef, Object, ObjectKind, Pending};
use crate::reader::{EnvReader, PropReader};
use crate::scope::{Scope, ScopeRef};
use crate::value::{Closure, Value};

/// Configuration for a single evaluator
#[derive(Debug, Clone, Default)]
pub struct EvaluatorOptions {
    /// Wall-clock limit for each top-level evaluation
    pub timeout: Option<Duration>,

    /// Environment map backing `read("env:...")`
    pub env: HashMap<String, String>,

    /// External properties backing `read("prop:...")`
    pub external_properties: HashMap<String, String>,

    /// Recursion depth limit for non-member recursion
    pub max_depth: usize,
}

impl EvaluatorOptions {
    pub fn new() -> Self {
        Self {
            max_depth: 1000,
            ..Self::default()
        }
    }
}

/// Marl evaluator
pub struct Evaluator {
    loader: RefCell<ModuleLoader>,
    classes: RefCell<ClassRegistry>,
    /// Module scope each class was declared in, for default expressions
    class_scopes: RefCell<HashMap<String, ScopeRef>>,
    type_aliases: RefCell<HashMap<String, TypeAnnotation>>,
    /// Evaluated module objects, local to this evaluator
    module_objects: RefCell<HashMap<String, Value>>,
    /// URIs of modules currently being evaluated, for import cycles
    evaluating_modules: RefCell<Vec<String>>,
    frames: RefCell<Vec<StackFrame>>,
    max_depth: usize,
    depth: Cell<usize>,
    timeout: Option<Duration>,
    deadline: Cell<Option<Instant>>,
    /// Set after a timeout; a faulted evaluator refuses further work
    faulted: Cell<bool>,
}

impl Evaluator {
    pub fn new(mut loader: ModuleLoader, options: EvaluatorOptions) -> Self {
        let env = Arc::new(options.env);
        let props = Arc::new(options.external_properties);
        loader
            .registry_mut()
            .register_resource_reader(Arc::new(EnvReader::new(env)));
        loader
            .registry_mut()
            .register_resource_reader(Arc::new(PropReader::new(props)));

        Self {
            loader: RefCell::new(loader),
            classes: RefCell::new(ClassRegistry::new()),
            class_scopes: RefCell::new(HashMap::new()),
            type_aliases: RefCell::new(HashMap::new()),
            module_objects: RefCell::new(HashMap::new()),
            evaluating_modules: RefCell::new(Vec::new()),
            frames: RefCell::new(Vec::new()),
            max_depth: if options.max_depth == 0 {
                1000
            } else {
                options.max_depth
            },
            depth: Cell::new(0),
            timeout: options.timeout,
            deadline: Cell::new(None),
            faulted: Cell::new(false),
        }
    }

    pub fn with_defaults() -> Self {
        Self::new(ModuleLoader::with_defaults(), EvaluatorOptions::new())
    }

    pub fn loader(&self) -> &RefCell<ModuleLoader> {
        &self.loader
    }

    /// Whether this evaluator has been faulted by a timeout
    pub fn is_faulted(&self) -> bool {
        self.faulted.get()
    }

    /// Evaluate a module AST as `repl:input` and deep-force the result
    pub fn evaluate_module(&self, module: &Module) -> EvalResult<Value> {
        self.run(|| {
            let value = self.eval_module_ast(module, "repl:input")?;
            self.force_value(&value)?;
            Ok(value)
        })
    }

    /// Load, evaluate, and deep-force the module at `uri`
    pub fn evaluate_uri(&self, uri: &str) -> EvalResult<Value> {
        self.run(|| {
            let value = self.load_and_eval_module(uri, uri)?;
            self.force_value(&value)?;
            Ok(value)
        })
    }

    /// Evaluate a single expression against an empty module scope
    pub fn evaluate_expression(&self, expr: &Expr) -> EvalResult<Value> {
        self.run(|| {
            let scope = Scope::new();
            self.eval_expr(expr, &scope)
        })
    }

    /// Render an evaluated value as pretty-printed JSON
    pub fn render_json(&self, value: &Value) -> EvalResult<String> {
        self.force_value(value)?;
        serde_json::to_string_pretty(value)
            .map_err(|e| EvalError::io(format!("failed to render value: {}", e)))
    }

    /// Entry-point guard: refuse a faulted evaluator, arm the deadline, and
    /// fault on timeout.
    fn run<F>(&self, f: F) -> EvalResult<Value>
    where
        F: FnOnce() -> EvalResult<Value>,
    {
        if self.faulted.get() {
            return Err(EvalError::configuration(
                "evaluator is faulted after a timeout; create a new evaluator",
            ));
        }
        if let Some(timeout) = self.timeout {
            self.deadline.set(Some(Instant::now() + timeout));
        }
        let result = f();
        self.deadline.set(None);
        if let Err(err) = &result {
            if matches!(err.kind, ErrorKind::Timeout) {
                self.faulted.set(true);
            }
        }
        result
    }

    // --- module evaluation ---------------------------------------------------

    fn load_and_eval_module(&self, uri: &str, importing: &str) -> EvalResult<Value> {
        let resolved = ModuleLoader::resolve_reference(importing, uri);

        if let Some(value) = self.module_objects.borrow().get(&resolved) {
            return Ok(value.clone());
        }
        if self.evaluating_modules.borrow().contains(&resolved) {
            return Err(EvalError::resolution(&resolved, "circular module import"));
        }

        let module = self.loader.borrow_mut().load_module(uri, importing)?;

        self.evaluating_modules.borrow_mut().push(resolved.clone());
        let result = self.eval_module_ast(&module, &resolved);
        self.evaluating_modules.borrow_mut().pop();

        let value = result?;
        self.module_objects
            .borrow_mut()
            .insert(resolved, value.clone());
        Ok(value)
    }

    fn eval_module_ast(&self, module: &Module, uri: &str) -> EvalResult<Value> {
        // amends/extends: evaluate the parent module and overlay it
        let parent_obj = match module.header.as_ref().map(|h| &h.kind) {
            Some(ModuleKind::Amends { uri: parent } | ModuleKind::Extends { uri: parent }) => {
                let parent_uri = parent.as_simple().ok_or_else(|| {
                    EvalError::configuration("module header URI cannot be interpolated")
                })?;
                let parent_value = self.load_and_eval_module(parent_uri, uri)?;
                match parent_value {
                    Value::Object(obj) => Some(obj),
                    other => {
                        return Err(EvalError::operator_type("Module", other.type_name()))
                    }
                }
            }
            _ => None,
        };

        let scope = Scope::new();
        let obj = Arc::new(match parent_obj {
            Some(parent) => parent.amend_as_module(uri.to_string(), Arc::clone(&scope)),
            None => Object::new_module(uri.to_string(), Arc::clone(&scope)),
        });
        let module_scope = Scope::with_module(Arc::clone(&obj));

        for import in &module.imports {
            let (name, value) = self.process_import(import, uri)?;
            obj.add_property(
                name,
                Member::evaluated_with_metadata(
                    value,
                    MemberMetadata {
                        is_hidden: true,
                        is_local: false,
                        ty: None,
                    },
                ),
            );
        }

        for member in &module.members {
            match member {
                ModuleMember::Property(prop) => {
                    self.add_declared_property(&obj, prop, &module_scope)?;
                }
                ModuleMember::Method(method) => {
                    let closure = Closure {
                        params: method.params.iter().map(|p| p.name.node.clone()).collect(),
                        body: method.body.clone(),
                        captured_scope: Arc::clone(&module_scope),
                    };
                    obj.add_property(
                        method.name.node.clone(),
                        Member::evaluated_with_metadata(
                            Value::Lambda(Arc::new(closure)),
                            MemberMetadata {
                                is_hidden: true,
                                is_local: false,
                                ty: None,
                            },
                        ),
                    );
                }
                ModuleMember::Class(def) => {
                    self.classes.borrow_mut().register(def)?;
                    self.class_scopes
                        .borrow_mut()
                        .insert(def.name.node.clone(), Arc::clone(&module_scope));
                }
                ModuleMember::TypeAlias(alias) => {
                    self.type_aliases
                        .borrow_mut()
                        .insert(alias.name.node.clone(), alias.ty.clone());
                }
            }
        }

        Ok(Value::Object(obj))
    }

    fn process_import(
        &self,
        import: &marl_ast::Import,
        importing: &str,
    ) -> EvalResult<(String, Value)> {
        let uri = import.uri.as_simple().ok_or_else(|| {
            EvalError::configuration("import URI cannot be interpolated")
        })?;

        match import.kind {
            ImportKind::Normal => {
                let name = match &import.alias {
                    Some(alias) => alias.node.clone(),
                    None => uri_stem(uri).ok_or_else(|| {
                        EvalError::resolution(uri, "cannot derive an import name; use `as`")
                    })?,
                };
                let value = self.load_and_eval_module(uri, importing)?;
                Ok((name, value))
            }
            ImportKind::Glob => {
                let name = import
                    .alias
                    .as_ref()
                    .map(|a| a.node.clone())
                    .ok_or_else(|| {
                        EvalError::configuration("glob imports require an `as` alias")
                    })?;
                let expanded = self
                    .loader
                    .borrow_mut()
                    .expand_module_glob(uri, importing)?;
                let mut modules = IndexMap::new();
                for concrete in expanded {
                    let value = self.load_and_eval_module(&concrete, importing)?;
                    modules.insert(Value::string(concrete), value);
                }
                Ok((name, Value::map(modules)))
            }
        }
    }

    /// Add a declared property (module member or class default) to an object
    fn add_declared_property(
        &self,
        obj: &Arc<Object>,
        prop: &marl_ast::Property,
        scope: &ScopeRef,
    ) -> EvalResult<()> {
        let name = prop.name.node.clone();
        let metadata = MemberMetadata {
            is_hidden: prop.modifiers.is_hidden,
            is_local: prop.modifiers.is_local,
            ty: prop.ty.clone(),
        };

        match &prop.value {
            Some(PropertyValue::Expr(expr)) => {
                obj.add_property(
                    name,
                    Member::with_metadata(expr.clone(), Arc::clone(scope), metadata),
                );
            }
            Some(PropertyValue::Object(body)) => {
                if let Some(existing) = obj.get_property_member(&name) {
                    // Deferred overlay of an inherited object-valued
                    // property; the base stays unevaluated until this
                    // member is forced
                    let merged_ty = metadata
                        .ty
                        .clone()
                        .or_else(|| existing.metadata().ty.clone());
                    let hint = merged_ty.as_ref().and_then(base_type_name);
                    let metadata = MemberMetadata {
                        ty: merged_ty,
                        ..metadata
                    };
                    obj.add_property(
                        name,
                        Member::amend_of(
                            existing,
                            body.clone(),
                            Arc::clone(scope),
                            hint,
                            metadata,
                        ),
                    );
                } else {
                    // Lazy `new` so the body sees the amending module's scope
                    let new_expr = Expr::new(
                        ExprKind::New {
                            class_ref: None,
                            body: body.clone(),
                        },
                        prop.span,
                    );
                    obj.add_property(
                        name,
                        Member::with_metadata(new_expr, Arc::clone(scope), metadata),
                    );
                }
            }
            None => {
                // Declared without a value; amendments are expected to fill
                // it in, and the type check fires when it is forced
                obj.add_property(name, Member::evaluated_with_metadata(Value::Null, metadata));
            }
        }
        Ok(())
    }

    // --- member forcing ------------------------------------------------------

    /// Force a member, running its declared type check before the value is
    /// returned. A failing check surfaces inside the thunk, so the member is
    /// never memoized as evaluated.
    fn force_member(&self, owner: &Arc<Object>, name: &str, member: &MemberRef) -> EvalResult<Value> {
        self.frames.borrow_mut().push(StackFrame {
            member: name.to_string(),
            owner: owner.describe(),
        });
        let ty = member.metadata().ty.clone();
        let result = member
            .force(name, |pending| {
                let value = self.eval_pending(owner, name, pending)?;
                self.check_declared_type(name, &value, ty.as_ref())?;
                Ok(value)
            })
            .map_err(|e| e.with_trace(&self.frames.borrow()));
        self.frames.borrow_mut().pop();
        result
    }

    /// Run the work a lazy member carries: a plain expression, or a deferred
    /// overlay of a base member with an object body.
    fn eval_pending(&self, owner: &Arc<Object>, name: &str, pending: Pending) -> EvalResult<Value> {
        match pending {
            Pending::Expr { expr, scope } => self.eval_expr(&expr, &scope),
            Pending::Amend {
                base,
                body,
                scope,
                hint,
            } => {
                let base_value = self.force_member(owner, name, &base)?;
                self.eval_amendment_with_hint(base_value, &body, &scope, hint)
            }
        }
    }

    fn check_declared_type(
        &self,
        name: &str,
        value: &Value,
        ty: Option<&TypeAnnotation>,
    ) -> EvalResult<()> {
        let Some(ty) = ty else { return Ok(()) };
        self.force_for_type_check(value, ty)?;
        if self.check_type_value(value, ty) {
            Ok(())
        } else {
            Err(class::type_violation(name, ty, value))
        }
    }

    /// Force the members a parameterized container type constrains, so
    /// `Listing<T>` and `Mapping<K, V>` checks see evaluated values even on
    /// a lazily built object.
    fn force_for_type_check(&self, value: &Value, ty: &TypeAnnotation) -> EvalResult<()> {
        match &ty.kind {
            TypeKind::Named(name) => {
                let alias = self.type_aliases.borrow().get(&name.to_string()).cloned();
                if let Some(aliased) = alias {
                    self.force_for_type_check(value, &aliased)?;
                }
            }
            TypeKind::Parameterized { base, args } => {
                if let Value::Object(obj) = value {
                    match base.to_string().as_str() {
                        "Listing" if obj.kind == ObjectKind::Listing => {
                            for i in 0..obj.element_count() {
                                if let Some(member) = obj.get_element_member(i) {
                                    let element =
                                        self.force_member(obj, &i.to_string(), &member)?;
                                    if let Some(elem_ty) = args.first() {
                                        self.force_for_type_check(&element, elem_ty)?;
                                    }
                                }
                            }
                        }
                        "Mapping" if obj.kind == ObjectKind::Mapping => {
                            for key in obj.entry_keys() {
                                if let Some(member) = obj.get_entry_member(&key) {
                                    let entry =
                                        self.force_member(obj, &key.to_string(), &member)?;
                                    if let Some(val_ty) = args.get(1) {
                                        self.force_for_type_check(&entry, val_ty)?;
                                    }
                                }
                            }
                        }
                        _ => {}
                    }
                }
            }
            TypeKind::Nullable(inner) => {
                if !value.is_null() {
                    self.force_for_type_check(value, inner)?;
                }
            }
            TypeKind::Constrained { base, .. } => self.force_for_type_check(value, base)?,
            TypeKind::Union(members) => {
                for member_ty in members {
                    self.force_for_type_check(value, member_ty)?;
                }
            }
            _ => {}
        }
        Ok(())
    }

    /// Force all lazy members of a value, recursively.
    ///
    /// Call before rendering; serialization only sees memoized members.
    pub fn force_value(&self, value: &Value) -> EvalResult<()> {
        if let Value::Object(obj) = value {
            self.force_object(obj)?;
        }
        Ok(())
    }

    /// Force a property through the amendment chain.
    ///
    /// A member inherited from a parent is first promoted into `obj`'s own
    /// table with `this` rebound to `obj`, so overridden siblings are
    /// visible while the parent's memo and sibling amendments of the same
    /// parent stay untouched.
    fn force_property(&self, obj: &Arc<Object>, name: &str) -> EvalResult<Value> {
        let Some(member) = obj.get_property_member(name) else {
            return Err(EvalError::undefined_prop(name).with_trace(&self.frames.borrow()));
        };
        if obj.has_own_property(name) || obj.parent.is_none() {
            return self.force_member(obj, name, &member);
        }
        match obj.promote_property_member(name) {
            Some(copy) => self.force_member(obj, name, &copy),
            // No thunk left to re-evaluate; the shared value is
            // receiver-independent
            None => self.force_member(obj, name, &member),
        }
    }

    fn force_object(&self, obj: &Arc<Object>) -> EvalResult<()> {
        for name in obj.property_names() {
            let value = self.force_property(obj, &name)?;
            if let Value::Object(nested) = &value {
                self.force_object(nested)?;
            }
        }

        for i in 0..obj.element_count() {
            if let Some(member) = obj.get_element_member(i) {
                let value = self.force_member(obj, &i.to_string(), &member)?;
                if let Value::Object(nested) = &value {
                    self.force_object(nested)?;
                }
            }
        }

        for key in obj.entry_keys() {
            if let Some(member) = obj.get_entry_member(&key) {
                let value = self.force_member(obj, &key.to_string(), &member)?;
                if let Value::Object(nested) = &value {
                    self.force_object(nested)?;
                }
            }
        }

        Ok(())
    }

    // --- expression evaluation -----------------------------------------------

    pub fn eval_expr(&self, expr: &Expr, scope: &ScopeRef) -> EvalResult<Value> {
        if let Some(deadline) = self.deadline.get() {
            if Instant::now() > deadline {
                return Err(ErrorKind::Timeout.into());
            }
        }
        let depth = self.depth.get();
        if depth >= self.max_depth {
            return Err(ErrorKind::RecursionLimit.into());
        }
        self.depth.set(depth + 1);
        let result = self.eval_expr_inner(expr, scope);
        self.depth.set(depth);
        result
    }

    fn eval_expr_inner(&self, expr: &Expr, scope: &ScopeRef) -> EvalResult<Value> {
        match &expr.kind {
            ExprKind::Null => Ok(Value::Null),
            ExprKind::Bool(b) => Ok(Value::Bool(*b)),
            ExprKind::Int(i) => Ok(Value::Int(*i)),
            ExprKind::Float(f) => Ok(Value::Float(*f)),
            ExprKind::String(lit) => self.eval_string_literal(lit, scope),

            ExprKind::Identifier(name) => self.resolve_identifier(name, scope),
            ExprKind::This => {
                // In constraint scopes `this` is a plain local
                if let Some(value) = scope.resolve("this") {
                    return Ok(value);
                }
                scope
                    .this()
                    .map(|obj| Value::Object(Arc::clone(obj)))
                    .ok_or_else(|| EvalError::unresolved("this"))
            }
            ExprKind::Super => scope
                .super_obj()
                .map(Value::Object)
                .ok_or_else(|| EvalError::unresolved("super")),
            ExprKind::Module => scope
                .module()
                .map(|obj| Value::Object(Arc::clone(obj)))
                .ok_or_else(|| EvalError::unresolved("module")),

            ExprKind::New { class_ref, body } => self.eval_new(class_ref.as_ref(), body, scope),
            ExprKind::Amend { base, body } => {
                let base_value = self.eval_expr(base, scope)?;
                self.eval_amendment_with_hint(base_value, body, scope, None)
            }

            ExprKind::MemberAccess { base, member } => {
                let base_value = self.eval_expr(base, scope)?;
                self.eval_member_access(&base_value, &member.node)
            }
            ExprKind::OptionalMemberAccess { base, member } => {
                let base_value = self.eval_expr(base, scope)?;
                if base_value.is_null() {
                    Ok(Value::Null)
                } else {
                    self.eval_member_access(&base_value, &member.node)
                }
            }

            ExprKind::Binary { op, left, right } => self.eval_binary(*op, left, right, scope),
            ExprKind::Unary { op, operand } => {
                let value = self.eval_expr(operand, scope)?;
                self.eval_unary(*op, value)
            }

            ExprKind::Subscript { base, index } => {
                let base_value = self.eval_expr(base, scope)?;
                let index_value = self.eval_expr(index, scope)?;
                self.eval_subscript(&base_value, &index_value)
            }

            ExprKind::Call { callee, args } => self.eval_call_expr(callee, args, scope),

            ExprKind::If {
                condition,
                then_branch,
                else_branch,
            } => {
                let cond = self.eval_expr(condition, scope)?;
                match cond {
                    Value::Bool(true) => self.eval_expr(then_branch, scope),
                    Value::Bool(false) => self.eval_expr(else_branch, scope),
                    other => Err(EvalError::operator_type("Boolean", other.type_name())),
                }
            }
            ExprKind::Let { name, value, body } => {
                let bound = self.eval_expr(value, scope)?;
                let inner = Scope::with_locals(scope, vec![(name.node.clone(), bound)]);
                self.eval_expr(body, &inner)
            }

            ExprKind::Lambda { params, body } => Ok(Value::Lambda(Arc::new(Closure {
                params: params.iter().map(|p| p.name.node.clone()).collect(),
                body: (**body).clone(),
                captured_scope: Arc::clone(scope),
            }))),

            ExprKind::Is { value, ty } => {
                let v = self.eval_expr(value, scope)?;
                Ok(Value::Bool(self.check_type_value(&v, ty)))
            }

            ExprKind::NonNullAssertion(inner) => {
                let value = self.eval_expr(inner, scope)?;
                if value.is_null() {
                    Err(ErrorKind::NullPointer.into())
                } else {
                    Ok(value)
                }
            }
            ExprKind::NullCoalesce { value, default } => {
                let v = self.eval_expr(value, scope)?;
                if v.is_null() {
                    self.eval_expr(default, scope)
                } else {
                    Ok(v)
                }
            }

            ExprKind::Throw(message) => {
                let msg = self.eval_expr(message, scope)?;
                let text = match msg {
                    Value::String(s) => s.to_string(),
                    other => other.to_string(),
                };
                Err(ErrorKind::UserException(text).into())
            }
            ExprKind::Trace(inner) => {
                let value = self.eval_expr(inner, scope)?;
                tracing::info!(value = %value, "trace");
                Ok(value)
            }

            ExprKind::Read { uri, is_nullable } => self.eval_read(uri, *is_nullable, scope),
            ExprKind::ReadGlob { uri } => self.eval_read_glob(uri, scope),

            ExprKind::Parenthesized(inner) => self.eval_expr(inner, scope),
        }
    }

    fn eval_string_literal(&self, lit: &StringLiteral, scope: &ScopeRef) -> EvalResult<Value> {
        let mut result = String::new();
        for part in &lit.parts {
            match part {
                StringPart::Literal(s) => result.push_str(s),
                StringPart::Interpolation(expr) => {
                    let value = self.eval_expr(expr, scope)?;
                    match value {
                        Value::String(s) => result.push_str(&s),
                        other => result.push_str(&other.to_string()),
                    }
                }
            }
        }
        Ok(Value::string(result))
    }

    fn resolve_identifier(&self, name: &str, scope: &ScopeRef) -> EvalResult<Value> {
        if let Some(value) = scope.resolve(name) {
            return Ok(value);
        }
        if let Some(this) = scope.this() {
            if this.has_property(name) {
                return self.force_property(this, name);
            }
        }
        if let Some(outer) = scope.outer() {
            if outer.has_property(name) {
                return self.force_property(outer, name);
            }
        }
        if let Some(module) = scope.module() {
            if module.has_property(name) {
                return self.force_property(module, name);
            }
        }
        Err(EvalError::unresolved(name).with_trace(&self.frames.borrow()))
    }

    // --- objects -------------------------------------------------------------

    fn eval_new(
        &self,
        class_ref: Option<&marl_ast::QualifiedIdent>,
        body: &ObjectBody,
        scope: &ScopeRef,
    ) -> EvalResult<Value> {
        let kind = match class_ref.map(|c| c.to_string()) {
            None => infer_object_kind(body),
            Some(name) => match name.as_str() {
                "Dynamic" => ObjectKind::Dynamic,
                "Listing" => ObjectKind::Listing,
                "Mapping" => ObjectKind::Mapping,
                _ => {
                    if !self.classes.borrow().contains(&name) {
                        return Err(EvalError::unresolved(&name));
                    }
                    self.classes.borrow().check_instantiable(&name)?;
                    ObjectKind::Typed(name)
                }
            },
        };

        let obj = Arc::new(match &kind {
            ObjectKind::Dynamic => Object::new_dynamic(Arc::clone(scope)),
            ObjectKind::Listing => Object::new_listing(Arc::clone(scope)),
            ObjectKind::Mapping => Object::new_mapping(Arc::clone(scope)),
            ObjectKind::Typed(name) => Object::new_typed(name.clone(), Arc::clone(scope)),
            ObjectKind::Module(_) => unreachable!("new cannot produce a module"),
        });
        let obj_scope = Scope::with_this(scope, Arc::clone(&obj));

        if let ObjectKind::Typed(name) = &obj.kind {
            self.apply_class_defaults(&obj, name)?;
        }

        self.populate_object(&obj, body, &obj_scope)?;
        Ok(Value::Object(obj))
    }

    /// Apply class member declarations ancestor-first, each evaluated in its
    /// declaring module's scope with `this` bound to the new object. A
    /// subclass redeclaration lands on the ancestor's slot and overrides it.
    fn apply_class_defaults(&self, obj: &Arc<Object>, class_name: &str) -> EvalResult<()> {
        let properties = self.classes.borrow().property_declarations(class_name);
        let methods = self.classes.borrow().method_declarations(class_name);

        for (declaring, prop) in &properties {
            let default_scope = self.class_default_scope(declaring, obj);
            self.add_declared_property(obj, prop, &default_scope)?;
        }
        for (declaring, method) in &methods {
            let default_scope = self.class_default_scope(declaring, obj);
            let closure = Closure {
                params: method.params.iter().map(|p| p.name.node.clone()).collect(),
                body: method.body.clone(),
                captured_scope: default_scope,
            };
            obj.add_property(
                method.name.node.clone(),
                Member::evaluated_with_metadata(
                    Value::Lambda(Arc::new(closure)),
                    MemberMetadata {
                        is_hidden: true,
                        is_local: false,
                        ty: None,
                    },
                ),
            );
        }
        Ok(())
    }

    fn class_default_scope(&self, class_name: &str, obj: &Arc<Object>) -> ScopeRef {
        let class_scope = self
            .class_scopes
            .borrow()
            .get(class_name)
            .cloned()
            .unwrap_or_else(Scope::new);
        Scope::with_this(&class_scope, Arc::clone(obj))
    }

    fn eval_amendment_with_hint(
        &self,
        base: Value,
        body: &ObjectBody,
        scope: &ScopeRef,
        type_hint: Option<String>,
    ) -> EvalResult<Value> {
        match base {
            Value::Object(base_obj) => {
                let amended = Arc::new(base_obj.amend(Arc::clone(scope)));
                let obj_scope = Scope::with_this(scope, Arc::clone(&amended));
                self.populate_object(&amended, body, &obj_scope)?;
                Ok(Value::Object(amended))
            }
            // Amending null materializes the declared type's defaults
            Value::Null => {
                if let Some(name) = type_hint {
                    if self.classes.borrow().contains(&name) {
                        self.classes.borrow().check_instantiable(&name)?;
                        let obj = Arc::new(Object::new_typed(name.clone(), Arc::clone(scope)));
                        self.apply_class_defaults(&obj, &name)?;
                        let obj_scope = Scope::with_this(scope, Arc::clone(&obj));
                        self.populate_object(&obj, body, &obj_scope)?;
                        return Ok(Value::Object(obj));
                    }
                }
                let obj = Arc::new(match infer_object_kind(body) {
                    ObjectKind::Listing => Object::new_listing(Arc::clone(scope)),
                    ObjectKind::Mapping => Object::new_mapping(Arc::clone(scope)),
                    _ => Object::new_dynamic(Arc::clone(scope)),
                });
                let obj_scope = Scope::with_this(scope, Arc::clone(&obj));
                self.populate_object(&obj, body, &obj_scope)?;
                Ok(Value::Object(obj))
            }
            other => Err(EvalError::operator_type("Object", other.type_name())),
        }
    }

    fn populate_object(
        &self,
        obj: &Arc<Object>,
        body: &ObjectBody,
        scope: &ScopeRef,
    ) -> EvalResult<()> {
        for member in &body.members {
            self.add_body_member(obj, member, scope)?;
        }
        Ok(())
    }

    fn add_body_member(
        &self,
        obj: &Arc<Object>,
        member: &ObjectBodyMember,
        scope: &ScopeRef,
    ) -> EvalResult<()> {
        match member {
            ObjectBodyMember::Property {
                name, ty, value, ..
            } => {
                let metadata = MemberMetadata {
                    is_hidden: false,
                    is_local: false,
                    ty: ty.clone().or_else(|| {
                        // Inherit the declared type of the member being
                        // overridden
                        obj.get_property_member(&name.node)
                            .and_then(|m| m.metadata().ty.clone())
                    }),
                };
                obj.add_property(
                    name.node.clone(),
                    Member::with_metadata(value.clone(), Arc::clone(scope), metadata),
                );
            }
            ObjectBodyMember::PropertyAmend { name, body, span } => {
                if let Some(existing) = obj.get_property_member(&name.node) {
                    let hint = existing.metadata().ty.as_ref().and_then(base_type_name);
                    let metadata = existing.metadata().clone();
                    obj.add_property(
                        name.node.clone(),
                        Member::amend_of(
                            existing,
                            body.clone(),
                            Arc::clone(scope),
                            hint,
                            metadata,
                        ),
                    );
                } else {
                    let new_expr = Expr::new(
                        ExprKind::New {
                            class_ref: None,
                            body: body.clone(),
                        },
                        *span,
                    );
                    obj.add_property(name.node.clone(), Member::new(new_expr, Arc::clone(scope)));
                }
            }
            ObjectBodyMember::Element { value, .. } => {
                obj.add_element(Member::new(value.clone(), Arc::clone(scope)));
            }
            ObjectBodyMember::Entry { key, value, .. } => {
                let key_value = self.eval_expr(key, scope)?;
                obj.add_entry(key_value, Member::new(value.clone(), Arc::clone(scope)));
            }
            ObjectBodyMember::EntryAmend { key, body, span } => {
                let key_value = self.eval_expr(key, scope)?;
                if let Some(existing) = obj.get_entry_member(&key_value) {
                    let metadata = existing.metadata().clone();
                    obj.add_entry(
                        key_value,
                        Member::amend_of(existing, body.clone(), Arc::clone(scope), None, metadata),
                    );
                } else {
                    let new_expr = Expr::new(
                        ExprKind::New {
                            class_ref: None,
                            body: body.clone(),
                        },
                        *span,
                    );
                    obj.add_entry(key_value, Member::new(new_expr, Arc::clone(scope)));
                }
            }
            ObjectBodyMember::For {
                key_var,
                value_var,
                iterable,
                body,
                ..
            } => {
                let iter_value = self.eval_expr(iterable, scope)?;
                self.eval_for_generator(obj, key_var.as_ref(), value_var, &iter_value, body, scope)?;
            }
            ObjectBodyMember::When {
                condition,
                body,
                else_body,
                ..
            } => {
                let cond = self.eval_expr(condition, scope)?;
                match cond {
                    Value::Bool(true) => self.populate_object(obj, body, scope)?,
                    Value::Bool(false) => {
                        if let Some(else_body) = else_body {
                            self.populate_object(obj, else_body, scope)?;
                        }
                    }
                    other => {
                        return Err(EvalError::operator_type("Boolean", other.type_name()))
                    }
                }
            }
        }
        Ok(())
    }

    fn eval_for_generator(
        &self,
        obj: &Arc<Object>,
        key_var: Option<&marl_ast::Identifier>,
        value_var: &marl_ast::Identifier,
        iterable: &Value,
        body: &ObjectBody,
        scope: &ScopeRef,
    ) -> EvalResult<()> {
        let iterate = |key: Value, value: Value| -> EvalResult<()> {
            let mut bindings = vec![(value_var.node.clone(), value)];
            if let Some(k) = key_var {
                bindings.push((k.node.clone(), key));
            }
            let iter_scope = Scope::with_locals(scope, bindings);
            self.populate_object(obj, body, &iter_scope)
        };

        match iterable {
            Value::List(items) => {
                for (idx, item) in items.iter().enumerate() {
                    iterate(Value::Int(idx as i64), item.clone())?;
                }
            }
            Value::Map(items) => {
                for (k, v) in items.iter() {
                    iterate(k.clone(), v.clone())?;
                }
            }
            Value::Object(iter_obj) => {
                for i in 0..iter_obj.element_count() {
                    if let Some(member) = iter_obj.get_element_member(i) {
                        let item = self.force_member(iter_obj, &i.to_string(), &member)?;
                        iterate(Value::Int(i as i64), item)?;
                    }
                }
                for key in iter_obj.entry_keys() {
                    if let Some(member) = iter_obj.get_entry_member(&key) {
                        let item = self.force_member(iter_obj, &key.to_string(), &member)?;
                        iterate(key, item)?;
                    }
                }
            }
            other => {
                return Err(EvalError::operator_type(
                    "List, Map, Listing, or Mapping",
                    other.type_name(),
                ))
            }
        }
        Ok(())
    }

    // --- member access, operators, calls -------------------------------------

    fn eval_member_access(&self, base: &Value, member: &str) -> EvalResult<Value> {
        match base {
            Value::Object(obj) => {
                if obj.has_property(member) {
                    self.force_property(obj, member)
                } else {
                    match member {
                        "length" if obj.kind == ObjectKind::Listing => {
                            Ok(Value::Int(obj.element_count() as i64))
                        }
                        "isEmpty" if obj.kind == ObjectKind::Listing => {
                            Ok(Value::Bool(obj.element_count() == 0))
                        }
                        _ => Err(EvalError::undefined_prop(member)
                            .with_trace(&self.frames.borrow())),
                    }
                }
            }
            Value::String(s) => match member {
                "length" => Ok(Value::Int(s.chars().count() as i64)),
                "isEmpty" => Ok(Value::Bool(s.is_empty())),
                "isBlank" => Ok(Value::Bool(s.trim().is_empty())),
                _ => Err(EvalError::undefined_prop(member)),
            },
            Value::List(l) => match member {
                "length" => Ok(Value::Int(l.len() as i64)),
                "isEmpty" => Ok(Value::Bool(l.is_empty())),
                "first" => l.first().cloned().ok_or_else(|| {
                    ErrorKind::IndexOutOfBounds {
                        index: 0,
                        length: 0,
                    }
                    .into()
                }),
                "last" => l.last().cloned().ok_or_else(|| {
                    ErrorKind::IndexOutOfBounds {
                        index: 0,
                        length: 0,
                    }
                    .into()
                }),
                _ => Err(EvalError::undefined_prop(member)),
            },
            Value::Map(m) => match member {
                "length" => Ok(Value::Int(m.len() as i64)),
                "isEmpty" => Ok(Value::Bool(m.is_empty())),
                "keys" => Ok(Value::list(m.keys().cloned().collect())),
                "values" => Ok(Value::list(m.values().cloned().collect())),
                _ => Err(EvalError::undefined_prop(member)),
            },
            other => Err(EvalError::operator_type(
                "Object, String, List, or Map",
                other.type_name(),
            )),
        }
    }

    fn eval_call_expr(&self, callee: &Expr, args: &[Expr], scope: &ScopeRef) -> EvalResult<Value> {
        // Value-intrinsic method calls like `list.map(f)`
        if let ExprKind::MemberAccess { base, member } = &callee.kind {
            let base_value = self.eval_expr(base, scope)?;
            let needs_intrinsic = match &base_value {
                Value::Object(obj) => obj.get_property_member(&member.node).is_none(),
                _ => true,
            };
            if needs_intrinsic {
                let arg_values: Vec<Value> = args
                    .iter()
                    .map(|a| self.eval_expr(a, scope))
                    .collect::<EvalResult<_>>()?;
                return self.eval_intrinsic_method(&base_value, &member.node, &arg_values);
            }
            let callee_value = self.eval_member_access(&base_value, &member.node)?;
            let arg_values: Vec<Value> = args
                .iter()
                .map(|a| self.eval_expr(a, scope))
                .collect::<EvalResult<_>>()?;
            return self.call_value(&callee_value, &arg_values);
        }

        // Collection constructors
        if let ExprKind::Identifier(name) = &callee.kind {
            if scope.resolve(name).is_none() && !self.identifier_is_member(name, scope) {
                match name.as_str() {
                    "List" => {
                        let items: Vec<Value> = args
                            .iter()
                            .map(|a| self.eval_expr(a, scope))
                            .collect::<EvalResult<_>>()?;
                        return Ok(Value::list(items));
                    }
                    "Map" => {
                        if args.len() % 2 != 0 {
                            return Err(EvalError::configuration(
                                "Map() takes alternating key/value arguments",
                            ));
                        }
                        let mut map = IndexMap::new();
                        for pair in args.chunks(2) {
                            let k = self.eval_expr(&pair[0], scope)?;
                            let v = self.eval_expr(&pair[1], scope)?;
                            map.insert(k, v);
                        }
                        return Ok(Value::map(map));
                    }
                    _ => {}
                }
            }
        }

        let callee_value = self.eval_expr(callee, scope)?;
        let arg_values: Vec<Value> = args
            .iter()
            .map(|a| self.eval_expr(a, scope))
            .collect::<EvalResult<_>>()?;
        self.call_value(&callee_value, &arg_values)
    }

    fn identifier_is_member(&self, name: &str, scope: &ScopeRef) -> bool {
        scope
            .this()
            .is_some_and(|obj| obj.get_property_member(name).is_some())
            || scope
                .module()
                .is_some_and(|obj| obj.get_property_member(name).is_some())
    }

    fn call_value(&self, callee: &Value, args: &[Value]) -> EvalResult<Value> {
        match callee {
            Value::Lambda(closure) => {
                if closure.params.len() != args.len() {
                    return Err(ErrorKind::WrongArgCount {
                        expected: closure.params.len(),
                        actual: args.len(),
                    }
                    .into());
                }
                let bindings = closure
                    .params
                    .iter()
                    .cloned()
                    .zip(args.iter().cloned())
                    .collect();
                let call_scope = Scope::for_lambda(&closure.captured_scope, bindings);
                self.eval_expr(&closure.body, &call_scope)
            }
            other => Err(ErrorKind::NotCallable(other.type_name().to_string()).into()),
        }
    }

    fn eval_intrinsic_method(&self, base: &Value, method: &str, args: &[Value]) -> EvalResult<Value> {
        match base {
            Value::String(s) => match (method, args) {
                ("contains", [Value::String(needle)]) => {
                    Ok(Value::Bool(s.contains(needle.as_ref())))
                }
                ("startsWith", [Value::String(prefix)]) => {
                    Ok(Value::Bool(s.starts_with(prefix.as_ref())))
                }
                ("endsWith", [Value::String(suffix)]) => {
                    Ok(Value::Bool(s.ends_with(suffix.as_ref())))
                }
                ("trim", []) => Ok(Value::string(s.trim().to_string())),
                _ => Err(EvalError::undefined_prop(method)),
            },
            Value::List(l) => match (method, args) {
                ("contains", [needle]) => Ok(Value::Bool(l.contains(needle))),
                ("join", [Value::String(sep)]) => {
                    let joined = l
                        .iter()
                        .map(|v| match v {
                            Value::String(s) => s.to_string(),
                            other => other.to_string(),
                        })
                        .collect::<Vec<_>>()
                        .join(sep);
                    Ok(Value::string(joined))
                }
                ("map", [f]) => {
                    let mut out = Vec::with_capacity(l.len());
                    for item in l.iter() {
                        out.push(self.call_value(f, std::slice::from_ref(item))?);
                    }
                    Ok(Value::list(out))
                }
                ("filter", [f]) => {
                    let mut out = Vec::new();
                    for item in l.iter() {
                        match self.call_value(f, std::slice::from_ref(item))? {
                            Value::Bool(true) => out.push(item.clone()),
                            Value::Bool(false) => {}
                            other => {
                                return Err(EvalError::operator_type(
                                    "Boolean",
                                    other.type_name(),
                                ))
                            }
                        }
                    }
                    Ok(Value::list(out))
                }
                ("fold", [init, f]) => {
                    let mut acc = init.clone();
                    for item in l.iter() {
                        acc = self.call_value(f, &[acc, item.clone()])?;
                    }
                    Ok(acc)
                }
                _ => Err(EvalError::undefined_prop(method)),
            },
            Value::Map(m) => match (method, args) {
                ("containsKey", [key]) => Ok(Value::Bool(m.contains_key(key))),
                ("getOrNull", [key]) => Ok(m.get(key).cloned().unwrap_or(Value::Null)),
                _ => Err(EvalError::undefined_prop(method)),
            },
            other => Err(EvalError::operator_type(
                "String, List, or Map",
                other.type_name(),
            )),
        }
    }

    // --- arithmetic ----------------------------------------------------------

    fn eval_binary(
        &self,
        op: BinaryOp,
        left: &Expr,
        right: &Expr,
        scope: &ScopeRef,
    ) -> EvalResult<Value> {
        // Logical operators short-circuit
        if matches!(op, BinaryOp::And | BinaryOp::Or) {
            let lhs = self.eval_expr(left, scope)?;
            let Value::Bool(l) = lhs else {
                return Err(EvalError::operator_type("Boolean", lhs.type_name()));
            };
            match (op, l) {
                (BinaryOp::And, false) => return Ok(Value::Bool(false)),
                (BinaryOp::Or, true) => return Ok(Value::Bool(true)),
                _ => {}
            }
            let rhs = self.eval_expr(right, scope)?;
            let Value::Bool(r) = rhs else {
                return Err(EvalError::operator_type("Boolean", rhs.type_name()));
            };
            return Ok(Value::Bool(r));
        }

        let lhs = self.eval_expr(left, scope)?;
        let rhs = self.eval_expr(right, scope)?;

        match op {
            BinaryOp::Eq => return Ok(Value::Bool(lhs == rhs)),
            BinaryOp::Ne => return Ok(Value::Bool(lhs != rhs)),
            BinaryOp::Lt | BinaryOp::Le | BinaryOp::Gt | BinaryOp::Ge => {
                let ordering = lhs.partial_cmp(&rhs).ok_or_else(|| {
                    EvalError::operator_type(
                        "comparable values",
                        format!("{} and {}", lhs.type_name(), rhs.type_name()),
                    )
                })?;
                let result = match op {
                    BinaryOp::Lt => ordering.is_lt(),
                    BinaryOp::Le => ordering.is_le(),
                    BinaryOp::Gt => ordering.is_gt(),
                    _ => ordering.is_ge(),
                };
                return Ok(Value::Bool(result));
            }
            _ => {}
        }

        // String and list concatenation
        if op == BinaryOp::Add {
            match (&lhs, &rhs) {
                (Value::String(a), Value::String(b)) => {
                    return Ok(Value::string(format!("{}{}", a, b)));
                }
                (Value::List(a), Value::List(b)) => {
                    let mut items = a.as_ref().clone();
                    items.extend(b.iter().cloned());
                    return Ok(Value::list(items));
                }
                _ => {}
            }
        }

        self.eval_numeric(op, &lhs, &rhs)
    }

    /// Numeric operators: checked i64 semantics when both sides are Int,
    /// IEEE-754 double semantics as soon as a Float is involved. Integer
    /// overflow is a reported error, never a silent wrap.
    fn eval_numeric(&self, op: BinaryOp, lhs: &Value, rhs: &Value) -> EvalResult<Value> {
        if let (Value::Int(a), Value::Int(b)) = (lhs, rhs) {
            let (a, b) = (*a, *b);
            return match op {
                BinaryOp::Add => checked(a.checked_add(b), "+"),
                BinaryOp::Sub => checked(a.checked_sub(b), "-"),
                BinaryOp::Mul => checked(a.checked_mul(b), "*"),
                BinaryOp::Div => {
                    // `/` is float division regardless of operand types
                    Ok(Value::Float(a as f64 / b as f64))
                }
                BinaryOp::IntDiv => {
                    if b == 0 {
                        return Err(ErrorKind::DivisionByZero.into());
                    }
                    checked(a.checked_div(b), "~/")
                }
                BinaryOp::Mod => {
                    if b == 0 {
                        return Err(ErrorKind::DivisionByZero.into());
                    }
                    checked(a.checked_rem(b), "%")
                }
                BinaryOp::Pow => {
                    // Negative exponents leave the integers
                    if b < 0 {
                        return Ok(Value::Float((a as f64).powf(b as f64)));
                    }
                    let exp = u32::try_from(b)
                        .map_err(|_| EvalError::new(ErrorKind::ArithmeticOverflow { op: "**" }))?;
                    checked(a.checked_pow(exp), "**")
                }
                _ => unreachable!("non-numeric operator"),
            };
        }

        let a = lhs
            .as_float()
            .ok_or_else(|| EvalError::operator_type("Number", lhs.type_name()))?;
        let b = rhs
            .as_float()
            .ok_or_else(|| EvalError::operator_type("Number", rhs.type_name()))?;
        let result = match op {
            BinaryOp::Add => a + b,
            BinaryOp::Sub => a - b,
            BinaryOp::Mul => a * b,
            BinaryOp::Div => a / b,
            BinaryOp::IntDiv => (a / b).trunc(),
            BinaryOp::Mod => a % b,
            BinaryOp::Pow => a.powf(b),
            _ => unreachable!("non-numeric operator"),
        };
        Ok(Value::Float(result))
    }

    fn eval_unary(&self, op: UnaryOp, value: Value) -> EvalResult<Value> {
        match (op, value) {
            (UnaryOp::Neg, Value::Int(i)) => checked(i.checked_neg(), "-"),
            (UnaryOp::Neg, Value::Float(f)) => Ok(Value::Float(-f)),
            (UnaryOp::Neg, other) => Err(EvalError::operator_type("Number", other.type_name())),
            (UnaryOp::Not, Value::Bool(b)) => Ok(Value::Bool(!b)),
            (UnaryOp::Not, other) => Err(EvalError::operator_type("Boolean", other.type_name())),
        }
    }

    fn eval_subscript(&self, base: &Value, index: &Value) -> EvalResult<Value> {
        match base {
            Value::List(items) => {
                let idx = index
                    .as_int()
                    .ok_or_else(|| EvalError::operator_type("Int", index.type_name()))?;
                if idx < 0 || idx as usize >= items.len() {
                    return Err(ErrorKind::IndexOutOfBounds {
                        index: idx,
                        length: items.len(),
                    }
                    .into());
                }
                Ok(items[idx as usize].clone())
            }
            Value::Map(items) => items
                .get(index)
                .cloned()
                .ok_or_else(|| EvalError::undefined_prop(index.to_string())),
            Value::Object(obj) => match &obj.kind {
                ObjectKind::Listing => {
                    let idx = index
                        .as_int()
                        .ok_or_else(|| EvalError::operator_type("Int", index.type_name()))?;
                    let count = obj.element_count();
                    if idx < 0 || idx as usize >= count {
                        return Err(ErrorKind::IndexOutOfBounds {
                            index: idx,
                            length: count,
                        }
                        .into());
                    }
                    let member = obj
                        .get_element_member(idx as usize)
                        .expect("index checked against element count");
                    self.force_member(obj, &idx.to_string(), &member)
                }
                _ => match obj.get_entry_member(index) {
                    Some(member) => self.force_member(obj, &index.to_string(), &member),
                    None => Err(EvalError::undefined_prop(index.to_string())),
                },
            },
            other => Err(EvalError::operator_type(
                "List, Map, Listing, or Mapping",
                other.type_name(),
            )),
        }
    }

    // --- resources -----------------------------------------------------------

    fn current_module_uri(&self, scope: &ScopeRef) -> String {
        scope
            .module()
            .and_then(|m| m.module_uri().map(|u| u.to_string()))
            .unwrap_or_else(|| "repl:input".to_string())
    }

    fn eval_read(&self, uri: &Expr, is_nullable: bool, scope: &ScopeRef) -> EvalResult<Value> {
        let uri_value = self.eval_expr(uri, scope)?;
        let uri_str = uri_value
            .as_string()
            .ok_or_else(|| EvalError::operator_type("String", uri_value.type_name()))?;

        let importing = self.current_module_uri(scope);
        match self.loader.borrow_mut().read_resource(uri_str, &importing) {
            Ok(text) => Ok(Value::string(text)),
            // `read?` maps a missing resource to null; denials and other
            // failures still surface
            Err(err) if is_nullable && matches!(err.kind, ErrorKind::Resolution { .. }) => {
                Ok(Value::Null)
            }
            Err(err) => Err(err.with_trace(&self.frames.borrow())),
        }
    }

    fn eval_read_glob(&self, uri: &Expr, scope: &ScopeRef) -> EvalResult<Value> {
        let uri_value = self.eval_expr(uri, scope)?;
        let pattern = uri_value
            .as_string()
            .ok_or_else(|| EvalError::operator_type("String", uri_value.type_name()))?;

        let importing = self.current_module_uri(scope);
        let expanded = self
            .loader
            .borrow_mut()
            .expand_resource_glob(pattern, &importing)?;

        let mut entries = IndexMap::new();
        for concrete in expanded {
            let text = self.loader.borrow_mut().read_resource(&concrete, &importing)?;
            entries.insert(Value::string(concrete), Value::string(text));
        }
        Ok(Value::map(entries))
    }

    // --- types ---------------------------------------------------------------

    /// Type check with alias expansion and constraint evaluation
    pub fn check_type_value(&self, value: &Value, ty: &TypeAnnotation) -> bool {
        if let TypeKind::Named(name) = &ty.kind {
            let alias = self.type_aliases.borrow().get(&name.to_string()).cloned();
            if let Some(aliased) = alias {
                return self.check_type_value(value, &aliased);
            }
        }
        // Container checks need their members evaluated; a member that fails
        // to evaluate counts as a non-match
        if self.force_for_type_check(value, ty).is_err() {
            return false;
        }
        let classes = self.classes.borrow();
        class::check_type(value, ty, &classes, &|constraint, this_value| {
            let scope = Scope::for_constraint(this_value);
            matches!(self.eval_expr(constraint, &scope), Ok(Value::Bool(true)))
        })
    }
}

fn checked(result: Option<i64>, op: &'static str) -> EvalResult<Value> {
    result
        .map(Value::Int)
        .ok_or_else(|| ErrorKind::ArithmeticOverflow { op }.into())
}

/// Class name behind a type annotation, used as the instantiation hint when
/// an object body amends a null-valued typed property.
fn base_type_name(ty: &TypeAnnotation) -> Option<String> {
    match &ty.kind {
        TypeKind::Named(name) => Some(name.to_string()),
        TypeKind::Nullable(inner) => base_type_name(inner),
        TypeKind::Constrained { base, .. } => base_type_name(base),
        _ => None,
    }
}

/// Derive a member name from a module URI: the last path segment without
/// its extension.
fn uri_stem(uri: &str) -> Option<String> {
    let after_fragment = uri.rsplit('#').next().unwrap_or(uri);
    let last = after_fragment
        .rsplit('/')
        .next()
        .and_then(|s| s.rsplit(':').next())?;
    let stem = last.split('.').next().unwrap_or(last);
    if stem.is_empty() {
        None
    } else {
        Some(stem.to_string())
    }
}

/// Infer the kind of an anonymous object literal: all elements makes a
/// Listing, all entries a Mapping, anything else Dynamic.
fn infer_object_kind(body: &ObjectBody) -> ObjectKind {
    let mut has_elements = false;
    let mut has_entries = false;
    let mut has_properties = false;
    classify_body(body, &mut has_elements, &mut has_entries, &mut has_properties);

    if has_elements && !has_entries && !has_properties {
        ObjectKind::Listing
    } else if has_entries && !has_elements && !has_properties {
        ObjectKind::Mapping
    } else {
        ObjectKind::Dynamic
    }
}

fn classify_body(
    body: &ObjectBody,
    has_elements: &mut bool,
    has_entries: &mut bool,
    has_properties: &mut bool,
) {
    for member in &body.members {
        match member {
            ObjectBodyMember::Element { .. } => *has_elements = true,
            ObjectBodyMember::Entry { .. } | ObjectBodyMember::EntryAmend { .. } => {
                *has_entries = true
            }
            ObjectBodyMember::Property { .. } | ObjectBodyMember::PropertyAmend { .. } => {
                *has_properties = true
            }
            ObjectBodyMember::For { body, .. } => {
                classify_body(body, has_elements, has_entries, has_properties)
            }
            ObjectBodyMember::When {
                body, else_body, ..
            } => {
                classify_body(body, has_elements, has_entries, has_properties);
                if let Some(else_body) = else_body {
                    classify_body(else_body, has_elements, has_entries, has_properties);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use marl_ast::builder;

    fn eval(expr: Expr) -> EvalResult<Value> {
        Evaluator::with_defaults().evaluate_expression(&expr)
    }

    #[test]
    fn integer_overflow_is_reported() {
        let err = eval(builder::add(builder::int(i64::MAX), builder::int(1))).unwrap_err();
        assert!(matches!(
            err.kind,
            ErrorKind::ArithmeticOverflow { op: "+" }
        ));
    }

    #[test]
    fn division_always_floats() {
        assert_eq!(
            eval(builder::bin(BinaryOp::Div, builder::int(7), builder::int(2))).unwrap(),
            Value::Float(3.5)
        );
        assert_eq!(
            eval(builder::bin(
                BinaryOp::IntDiv,
                builder::int(7),
                builder::int(2)
            ))
            .unwrap(),
            Value::Int(3)
        );
    }

    #[test]
    fn division_by_integer_zero_is_error() {
        let err = eval(builder::bin(
            BinaryOp::IntDiv,
            builder::int(1),
            builder::int(0),
        ))
        .unwrap_err();
        assert!(matches!(err.kind, ErrorKind::DivisionByZero));
    }

    #[test]
    fn float_division_by_zero_is_infinity() {
        let result = eval(builder::bin(
            BinaryOp::Div,
            builder::float(1.0),
            builder::float(0.0),
        ))
        .unwrap();
        assert_eq!(result, Value::Float(f64::INFINITY));
    }

    #[test]
    fn logical_operators_short_circuit() {
        // The right operand would fail if evaluated
        let expr = builder::bin(
            BinaryOp::And,
            builder::boolean(false),
            builder::ident("nonexistent"),
        );
        assert_eq!(eval(expr).unwrap(), Value::Bool(false));
    }

    #[test]
    fn lambda_application_binds_parameters() {
        let expr = builder::call(
            builder::lambda(&["x", "y"], builder::add(builder::ident("x"), builder::ident("y"))),
            vec![builder::int(2), builder::int(3)],
        );
        assert_eq!(eval(expr).unwrap(), Value::Int(5));
    }

    #[test]
    fn wrong_arity_is_reported() {
        let expr = builder::call(builder::lambda(&["x"], builder::ident("x")), vec![]);
        let err = eval(expr).unwrap_err();
        assert!(matches!(
            err.kind,
            ErrorKind::WrongArgCount {
                expected: 1,
                actual: 0
            }
        ));
    }

    #[test]
    fn let_binding_shadows() {
        let expr = builder::let_in(
            "x",
            builder::int(1),
            builder::let_in("x", builder::int(2), builder::ident("x")),
        );
        assert_eq!(eval(expr).unwrap(), Value::Int(2));
    }

    #[test]
    fn string_interpolation_renders_values() {
        let expr = builder::interp(vec![
            marl_ast::StringPart::Literal("n = ".to_string()),
            marl_ast::StringPart::Interpolation(builder::int(42)),
        ]);
        assert_eq!(eval(expr).unwrap(), Value::string("n = 42"));
    }

    #[test]
    fn null_coalesce_and_non_null() {
        assert_eq!(
            eval(builder::coalesce(builder::null(), builder::int(9))).unwrap(),
            Value::Int(9)
        );
        let err = eval(builder::non_null(builder::null())).unwrap_err();
        assert!(matches!(err.kind, ErrorKind::NullPointer));
    }

    #[test]
    fn list_intrinsics() {
        let list = builder::call(
            builder::ident("List"),
            vec![builder::int(1), builder::int(2), builder::int(3)],
        );
        let mapped = builder::call(
            builder::member(list, "map"),
            vec![builder::lambda(
                &["x"],
                builder::bin(BinaryOp::Mul, builder::ident("x"), builder::int(10)),
            )],
        );
        assert_eq!(
            eval(mapped).unwrap(),
            Value::list(vec![Value::Int(10), Value::Int(20), Value::Int(30)])
        );
    }

    #[test]
    fn overriding_object_body_defers_base_evaluation() {
        let evaluator = Evaluator::with_defaults();
        let base = builder::module(vec![marl_ast::ModuleMember::Property(
            builder::object_prop(
                "server",
                builder::body(vec![
                    builder::body_prop("port", builder::int(8080)),
                    builder::body_prop("host", builder::str("localhost")),
                ]),
            ),
        )]);
        let base_value = evaluator.eval_module_ast(&base, "repl:base").unwrap();
        let Value::Object(base_obj) = base_value.clone() else {
            panic!("module must evaluate to an object");
        };
        evaluator
            .module_objects
            .borrow_mut()
            .insert("repl:base".to_string(), base_value);

        let amending = builder::amends_module(
            "repl:base",
            vec![marl_ast::ModuleMember::Property(builder::object_prop(
                "server",
                builder::body(vec![builder::body_prop("port", builder::int(9090))]),
            ))],
        );
        let amended_value = evaluator.eval_module_ast(&amending, "repl:main").unwrap();
        let Value::Object(amended_obj) = amended_value else {
            panic!("module must evaluate to an object");
        };

        // Declaring the override must not evaluate either side
        let override_member = amended_obj.get_own_property_member("server").unwrap();
        assert!(!override_member.is_evaluated());
        assert!(!base_obj
            .get_property_member("server")
            .unwrap()
            .is_evaluated());

        let forced = evaluator.force_property(&amended_obj, "server").unwrap();
        let Value::Object(server) = forced else {
            panic!("server must be an object");
        };
        assert_eq!(
            evaluator.force_property(&server, "port").unwrap(),
            Value::Int(9090)
        );
        assert_eq!(
            evaluator.force_property(&server, "host").unwrap(),
            Value::string("localhost")
        );
    }

    #[test]
    fn uri_stems() {
        assert_eq!(uri_stem("file:///a/db.marl"), Some("db".to_string()));
        assert_eq!(uri_stem("marl:base"), Some("base".to_string()));
        assert_eq!(
            uri_stem("package://e.com/p@1.0.0#/lib/util.marl"),
            Some("util".to_string())
        );
    }
}
