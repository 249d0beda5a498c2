//! Class declarations and force-time type checking
//!
//! Classes form a nominal single-inheritance chain, orthogonal to the
//! amendment chain. Declared property types are checked when a member is
//! forced, never at registration time, so a failing check is not memoized.

use std::sync::Arc;

use indexmap::IndexMap;

use marl_ast::{ClassDef, ClassMember, Property, TypeAnnotation, TypeKind};

use crate::error::{ErrorKind, EvalError, EvalResult};
use crate::object::ObjectKind;
use crate::value::Value;

/// Registered class: declaration plus resolved modifiers
#[derive(Debug, Clone)]
pub struct ClassInfo {
    pub name: String,
    pub is_abstract: bool,
    pub is_open: bool,
    pub extends: Option<String>,
    pub def: ClassDef,
}

/// Name-indexed class registry for one evaluation
#[derive(Debug, Default)]
pub struct ClassRegistry {
    classes: IndexMap<String, Arc<ClassInfo>>,
}

impl ClassRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a class declaration. Extending a class that is neither open
    /// nor abstract is a configuration error; so is extending an unknown
    /// class.
    pub fn register(&mut self, def: &ClassDef) -> EvalResult<()> {
        let name = def.name.node.clone();
        let extends = def.extends.as_ref().map(|q| q.to_string());

        if let Some(parent_name) = &extends {
            let parent = self.classes.get(parent_name).ok_or_else(|| {
                EvalError::configuration(format!(
                    "class `{}` extends unknown class `{}`",
                    name, parent_name
                ))
            })?;
            if !parent.is_open && !parent.is_abstract {
                return Err(EvalError::configuration(format!(
                    "class `{}` cannot extend final class `{}`",
                    name, parent_name
                )));
            }
        }

        self.classes.insert(
            name.clone(),
            Arc::new(ClassInfo {
                name,
                is_abstract: def.modifiers.is_abstract,
                is_open: def.modifiers.is_open,
                extends,
                def: def.clone(),
            }),
        );
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<&Arc<ClassInfo>> {
        self.classes.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.classes.contains_key(name)
    }

    /// Whether `name` names `ancestor` or transitively extends it
    pub fn is_subclass(&self, name: &str, ancestor: &str) -> bool {
        let mut current = Some(name.to_string());
        while let Some(n) = current {
            if n == ancestor {
                return true;
            }
            current = self.classes.get(&n).and_then(|c| c.extends.clone());
        }
        false
    }

    /// Fail if `name` cannot be instantiated directly
    pub fn check_instantiable(&self, name: &str) -> EvalResult<()> {
        if let Some(info) = self.classes.get(name) {
            if info.is_abstract {
                return Err(EvalError::configuration(format!(
                    "cannot instantiate abstract class `{}`",
                    name
                )));
            }
        }
        Ok(())
    }

    /// Inheritance chain from `name` up to the root
    fn chain(&self, name: &str) -> Vec<Arc<ClassInfo>> {
        let mut chain = Vec::new();
        let mut current = Some(name.to_string());
        while let Some(n) = current {
            match self.classes.get(&n) {
                Some(info) => {
                    chain.push(Arc::clone(info));
                    current = info.extends.clone();
                }
                None => break,
            }
        }
        chain
    }

    /// Property declarations for a class and its ancestors, ancestor-first,
    /// each paired with its declaring class. Applied in order, a subclass
    /// redeclaration overrides its ancestor's, and an object-bodied
    /// redeclaration amends the inherited default.
    pub fn property_declarations(&self, name: &str) -> Vec<(String, Property)> {
        let chain = self.chain(name);
        let mut props = Vec::new();
        for info in chain.iter().rev() {
            for member in &info.def.members {
                if let ClassMember::Property(p) = member {
                    props.push((info.name.clone(), p.clone()));
                }
            }
        }
        props
    }

    /// Method declarations, ancestor-first, paired with the declaring class
    pub fn method_declarations(&self, name: &str) -> Vec<(String, marl_ast::Method)> {
        let chain = self.chain(name);
        let mut methods = Vec::new();
        for info in chain.iter().rev() {
            for member in &info.def.members {
                if let ClassMember::Method(m) = member {
                    methods.push((info.name.clone(), m.clone()));
                }
            }
        }
        methods
    }
}

/// Check a value against a type annotation.
///
/// `eval_constraint` evaluates a constraint expression with `this` bound to
/// the candidate value; a failed or non-boolean evaluation counts as a
/// non-match.
pub fn check_type<F>(
    value: &Value,
    ty: &TypeAnnotation,
    registry: &ClassRegistry,
    eval_constraint: &F,
) -> bool
where
    F: Fn(&marl_ast::Expr, Value) -> bool,
{
    match &ty.kind {
        TypeKind::Named(name) => check_named_type(value, &name.to_string(), registry),
        TypeKind::Parameterized { base, args } => {
            check_parameterized_type(value, &base.to_string(), args, registry, eval_constraint)
        }
        TypeKind::Nullable(inner) => {
            value.is_null() || check_type(value, inner, registry, eval_constraint)
        }
        TypeKind::Union(members) => members
            .iter()
            .any(|t| check_type(value, t, registry, eval_constraint)),
        TypeKind::Constrained { base, constraints } => {
            check_type(value, base, registry, eval_constraint)
                && constraints.iter().all(|c| eval_constraint(c, value.clone()))
        }
        TypeKind::StringLiteral(expected) => {
            matches!(value, Value::String(s) if s.as_ref() == expected)
        }
        TypeKind::Nothing => false,
        TypeKind::Unknown => true,
    }
}

fn check_named_type(value: &Value, type_name: &str, registry: &ClassRegistry) -> bool {
    match type_name {
        "Any" => true,
        "Null" => value.is_null(),
        "Boolean" => matches!(value, Value::Bool(_)),
        "Int" => matches!(value, Value::Int(_)),
        "Float" => matches!(value, Value::Float(_)),
        "Number" => matches!(value, Value::Int(_) | Value::Float(_)),
        "String" => matches!(value, Value::String(_)),
        "List" => matches!(value, Value::List(_)),
        "Map" => matches!(value, Value::Map(_)),
        "Listing" => matches!(value, Value::Object(o) if o.kind == ObjectKind::Listing),
        "Mapping" => matches!(value, Value::Object(o) if o.kind == ObjectKind::Mapping),
        "Dynamic" => matches!(value, Value::Object(o) if o.kind == ObjectKind::Dynamic),
        "Object" => matches!(value, Value::Object(_)),
        "Function" => matches!(value, Value::Lambda(_)),
        _ => {
            // Class types match along the extends chain
            if let Value::Object(obj) = value {
                if let ObjectKind::Typed(class_name) = &obj.kind {
                    return registry.is_subclass(class_name, type_name);
                }
            }
            false
        }
    }
}

fn check_parameterized_type<F>(
    value: &Value,
    base_name: &str,
    args: &[TypeAnnotation],
    registry: &ClassRegistry,
    eval_constraint: &F,
) -> bool
where
    F: Fn(&marl_ast::Expr, Value) -> bool,
{
    match base_name {
        "List" => match value {
            Value::List(items) => args.first().is_none_or(|t| {
                items
                    .iter()
                    .all(|item| check_type(item, t, registry, eval_constraint))
            }),
            _ => false,
        },
        "Map" => match value {
            Value::Map(items) => {
                let key_type = args.first();
                let val_type = args.get(1);
                items.iter().all(|(k, v)| {
                    key_type.is_none_or(|t| check_type(k, t, registry, eval_constraint))
                        && val_type.is_none_or(|t| check_type(v, t, registry, eval_constraint))
                })
            }
            _ => false,
        },
        "Listing" => match value {
            Value::Object(obj) if obj.kind == ObjectKind::Listing => {
                let Some(elem_type) = args.first() else {
                    return true;
                };
                for i in 0..obj.element_count() {
                    if let Some(member) = obj.get_element_member(i) {
                        // Callers force elements before the check; anything
                        // still unevaluated cannot be verified, so it fails
                        let Some(val) = member.get_if_evaluated() else {
                            return false;
                        };
                        if !check_type(&val, elem_type, registry, eval_constraint) {
                            return false;
                        }
                    }
                }
                true
            }
            _ => false,
        },
        "Mapping" => match value {
            Value::Object(obj) if obj.kind == ObjectKind::Mapping => {
                let key_type = args.first();
                let val_type = args.get(1);
                for key in obj.entry_keys() {
                    if let Some(kt) = key_type {
                        if !check_type(&key, kt, registry, eval_constraint) {
                            return false;
                        }
                    }
                    if let Some(vt) = val_type {
                        if let Some(member) = obj.get_entry_member(&key) {
                            let Some(val) = member.get_if_evaluated() else {
                                return false;
                            };
                            if !check_type(&val, vt, registry, eval_constraint) {
                                return false;
                            }
                        }
                    }
                }
                true
            }
            _ => false,
        },
        _ => check_named_type(value, base_name, registry),
    }
}

/// Human-readable form of a type annotation for error messages
pub fn type_to_string(ty: &TypeAnnotation) -> String {
    match &ty.kind {
        TypeKind::Named(name) => name.to_string(),
        TypeKind::Parameterized { base, args } => {
            let args_str: Vec<String> = args.iter().map(type_to_string).collect();
            format!("{}<{}>", base, args_str.join(", "))
        }
        TypeKind::Nullable(inner) => format!("{}?", type_to_string(inner)),
        TypeKind::Union(members) => members
            .iter()
            .map(type_to_string)
            .collect::<Vec<_>>()
            .join("|"),
        TypeKind::Constrained { base, .. } => format!("{}(...)", type_to_string(base)),
        TypeKind::StringLiteral(s) => format!("\"{}\"", s),
        TypeKind::Nothing => "nothing".to_string(),
        TypeKind::Unknown => "unknown".to_string(),
    }
}

/// Build the type-violation error for a failed check
pub fn type_violation(property: &str, ty: &TypeAnnotation, value: &Value) -> EvalError {
    ErrorKind::TypeViolation {
        property: property.to_string(),
        expected: type_to_string(ty),
        actual: format!("{} ({})", value, value.type_name()),
    }
    .into()
}

#[cfg(test)]
mod tests {
    use super::*;
    use marl_ast::builder;
    use marl_ast::ClassModifiers;

    fn no_constraints(_: &marl_ast::Expr, _: Value) -> bool {
        panic!("constraint evaluation not expected")
    }

    #[test]
    fn final_class_cannot_be_extended() {
        let mut registry = ClassRegistry::new();
        registry
            .register(&builder::class(
                "Base",
                ClassModifiers::default(),
                None,
                vec![],
            ))
            .unwrap();
        let err = registry
            .register(&builder::class(
                "Child",
                ClassModifiers::default(),
                Some("Base"),
                vec![],
            ))
            .unwrap_err();
        assert!(matches!(err.kind, ErrorKind::Configuration(_)));
    }

    #[test]
    fn abstract_class_is_not_instantiable() {
        let mut registry = ClassRegistry::new();
        registry
            .register(&builder::class(
                "Shape",
                ClassModifiers {
                    is_abstract: true,
                    is_open: false,
                },
                None,
                vec![],
            ))
            .unwrap();
        assert!(registry.check_instantiable("Shape").is_err());
    }

    #[test]
    fn subclass_defaults_override_ancestor() {
        let mut registry = ClassRegistry::new();
        registry
            .register(&builder::class(
                "Animal",
                ClassModifiers {
                    is_abstract: false,
                    is_open: true,
                },
                None,
                vec![
                    ClassMember::Property(builder::prop("legs", builder::int(4))),
                    ClassMember::Property(builder::prop("name", builder::str("animal"))),
                ],
            ))
            .unwrap();
        registry
            .register(&builder::class(
                "Bird",
                ClassModifiers::default(),
                Some("Animal"),
                vec![ClassMember::Property(builder::prop("legs", builder::int(2)))],
            ))
            .unwrap();

        let props = registry.property_declarations("Bird");
        let pairs: Vec<(&str, &str)> = props
            .iter()
            .map(|(class, p)| (class.as_str(), p.name.node.as_str()))
            .collect();
        // Ancestor declarations first; the subclass redeclaration comes last
        // so applying in order overrides it
        assert_eq!(
            pairs,
            vec![("Animal", "legs"), ("Animal", "name"), ("Bird", "legs")]
        );
        let (_, legs) = props.last().unwrap();
        assert_eq!(
            legs.value,
            Some(marl_ast::PropertyValue::Expr(builder::int(2)))
        );
    }

    #[test]
    fn named_type_checks() {
        let registry = ClassRegistry::new();
        assert!(check_type(
            &Value::Int(1),
            &builder::ty("Int"),
            &registry,
            &no_constraints
        ));
        assert!(check_type(
            &Value::Int(1),
            &builder::ty("Number"),
            &registry,
            &no_constraints
        ));
        assert!(!check_type(
            &Value::string("x"),
            &builder::ty("Int"),
            &registry,
            &no_constraints
        ));
    }

    #[test]
    fn nullable_admits_null() {
        let registry = ClassRegistry::new();
        let ty = builder::nullable(builder::ty("String"));
        assert!(check_type(&Value::Null, &ty, &registry, &no_constraints));
        assert!(check_type(
            &Value::string("x"),
            &ty,
            &registry,
            &no_constraints
        ));
        assert!(!check_type(&Value::Int(1), &ty, &registry, &no_constraints));
    }

    #[test]
    fn subclass_matches_ancestor_type() {
        let mut registry = ClassRegistry::new();
        registry
            .register(&builder::class(
                "Animal",
                ClassModifiers {
                    is_abstract: false,
                    is_open: true,
                },
                None,
                vec![],
            ))
            .unwrap();
        registry
            .register(&builder::class(
                "Bird",
                ClassModifiers::default(),
                Some("Animal"),
                vec![],
            ))
            .unwrap();
        assert!(registry.is_subclass("Bird", "Animal"));
        assert!(!registry.is_subclass("Animal", "Bird"));
    }
}
