//! Convenience constructors for building ASTs in host code and tests.
//!
//! All nodes are created with empty spans; a real front end fills spans in
//! from its token stream.

use crate::ast::*;

pub fn id(name: &str) -> Identifier {
    Spanned::new(name.to_string(), Span::default())
}

pub fn qid(path: &str) -> QualifiedIdent {
    QualifiedIdent {
        parts: path.split('.').map(id).collect(),
    }
}

// --- expressions -------------------------------------------------------------

fn expr(kind: ExprKind) -> Expr {
    Expr::new(kind, Span::default())
}

pub fn null() -> Expr {
    expr(ExprKind::Null)
}

pub fn boolean(v: bool) -> Expr {
    expr(ExprKind::Bool(v))
}

pub fn int(v: i64) -> Expr {
    expr(ExprKind::Int(v))
}

pub fn float(v: f64) -> Expr {
    expr(ExprKind::Float(v))
}

pub fn str(s: &str) -> Expr {
    expr(ExprKind::String(StringLiteral::simple(
        s.to_string(),
        Span::default(),
    )))
}

/// Interpolated string from literal and expression parts
pub fn interp(parts: Vec<StringPart>) -> Expr {
    expr(ExprKind::String(StringLiteral {
        parts,
        span: Span::default(),
    }))
}

pub fn ident(name: &str) -> Expr {
    expr(ExprKind::Identifier(name.to_string()))
}

pub fn this() -> Expr {
    expr(ExprKind::This)
}

pub fn super_ref() -> Expr {
    expr(ExprKind::Super)
}

pub fn module_ref() -> Expr {
    expr(ExprKind::Module)
}

pub fn bin(op: BinaryOp, left: Expr, right: Expr) -> Expr {
    expr(ExprKind::Binary {
        op,
        left: Box::new(left),
        right: Box::new(right),
    })
}

pub fn add(left: Expr, right: Expr) -> Expr {
    bin(BinaryOp::Add, left, right)
}

pub fn unary(op: UnaryOp, operand: Expr) -> Expr {
    expr(ExprKind::Unary {
        op,
        operand: Box::new(operand),
    })
}

pub fn member(base: Expr, name: &str) -> Expr {
    expr(ExprKind::MemberAccess {
        base: Box::new(base),
        member: id(name),
    })
}

pub fn subscript(base: Expr, index: Expr) -> Expr {
    expr(ExprKind::Subscript {
        base: Box::new(base),
        index: Box::new(index),
    })
}

pub fn call(callee: Expr, args: Vec<Expr>) -> Expr {
    expr(ExprKind::Call {
        callee: Box::new(callee),
        args,
    })
}

pub fn if_else(condition: Expr, then_branch: Expr, else_branch: Expr) -> Expr {
    expr(ExprKind::If {
        condition: Box::new(condition),
        then_branch: Box::new(then_branch),
        else_branch: Box::new(else_branch),
    })
}

pub fn let_in(name: &str, value: Expr, body: Expr) -> Expr {
    expr(ExprKind::Let {
        name: id(name),
        value: Box::new(value),
        body: Box::new(body),
    })
}

pub fn lambda(params: &[&str], body: Expr) -> Expr {
    expr(ExprKind::Lambda {
        params: params
            .iter()
            .map(|p| Parameter {
                name: id(p),
                ty: None,
                span: Span::default(),
            })
            .collect(),
        body: Box::new(body),
    })
}

pub fn new_object(class_ref: Option<&str>, body: ObjectBody) -> Expr {
    expr(ExprKind::New {
        class_ref: class_ref.map(qid),
        body,
    })
}

pub fn amend(base: Expr, body: ObjectBody) -> Expr {
    expr(ExprKind::Amend {
        base: Box::new(base),
        body,
    })
}

pub fn read(uri: Expr) -> Expr {
    expr(ExprKind::Read {
        uri: Box::new(uri),
        is_nullable: false,
    })
}

pub fn read_nullable(uri: Expr) -> Expr {
    expr(ExprKind::Read {
        uri: Box::new(uri),
        is_nullable: true,
    })
}

pub fn read_glob(uri: Expr) -> Expr {
    expr(ExprKind::ReadGlob { uri: Box::new(uri) })
}

pub fn non_null(value: Expr) -> Expr {
    expr(ExprKind::NonNullAssertion(Box::new(value)))
}

pub fn coalesce(value: Expr, default: Expr) -> Expr {
    expr(ExprKind::NullCoalesce {
        value: Box::new(value),
        default: Box::new(default),
    })
}

// --- types -------------------------------------------------------------------

pub fn ty(name: &str) -> TypeAnnotation {
    TypeAnnotation {
        kind: TypeKind::Named(qid(name)),
        span: Span::default(),
    }
}

pub fn nullable(inner: TypeAnnotation) -> TypeAnnotation {
    TypeAnnotation {
        kind: TypeKind::Nullable(Box::new(inner)),
        span: Span::default(),
    }
}

pub fn constrained(base: TypeAnnotation, constraints: Vec<Expr>) -> TypeAnnotation {
    TypeAnnotation {
        kind: TypeKind::Constrained {
            base: Box::new(base),
            constraints,
        },
        span: Span::default(),
    }
}

pub fn parameterized(base: &str, args: Vec<TypeAnnotation>) -> TypeAnnotation {
    TypeAnnotation {
        kind: TypeKind::Parameterized {
            base: qid(base),
            args,
        },
        span: Span::default(),
    }
}

pub fn union(members: Vec<TypeAnnotation>) -> TypeAnnotation {
    TypeAnnotation {
        kind: TypeKind::Union(members),
        span: Span::default(),
    }
}

// --- object bodies -----------------------------------------------------------

pub fn body(members: Vec<ObjectBodyMember>) -> ObjectBody {
    ObjectBody {
        members,
        span: Span::default(),
    }
}

pub fn body_prop(name: &str, value: Expr) -> ObjectBodyMember {
    ObjectBodyMember::Property {
        name: id(name),
        ty: None,
        value,
        span: Span::default(),
    }
}

pub fn body_prop_amend(name: &str, b: ObjectBody) -> ObjectBodyMember {
    ObjectBodyMember::PropertyAmend {
        name: id(name),
        body: b,
        span: Span::default(),
    }
}

pub fn element(value: Expr) -> ObjectBodyMember {
    ObjectBodyMember::Element {
        value,
        span: Span::default(),
    }
}

pub fn entry(key: Expr, value: Expr) -> ObjectBodyMember {
    ObjectBodyMember::Entry {
        key,
        value,
        span: Span::default(),
    }
}

// --- module members ----------------------------------------------------------

pub fn prop(name: &str, value: Expr) -> Property {
    Property {
        modifiers: PropertyModifiers::default(),
        name: id(name),
        ty: None,
        value: Some(PropertyValue::Expr(value)),
        span: Span::default(),
    }
}

pub fn typed_prop(name: &str, annotation: TypeAnnotation, value: Option<Expr>) -> Property {
    Property {
        modifiers: PropertyModifiers::default(),
        name: id(name),
        ty: Some(annotation),
        value: value.map(PropertyValue::Expr),
        span: Span::default(),
    }
}

pub fn object_prop(name: &str, b: ObjectBody) -> Property {
    Property {
        modifiers: PropertyModifiers::default(),
        name: id(name),
        ty: None,
        value: Some(PropertyValue::Object(b)),
        span: Span::default(),
    }
}

pub fn method(name: &str, params: &[&str], method_body: Expr) -> Method {
    Method {
        name: id(name),
        params: params
            .iter()
            .map(|p| Parameter {
                name: id(p),
                ty: None,
                span: Span::default(),
            })
            .collect(),
        return_type: None,
        body: method_body,
        span: Span::default(),
    }
}

pub fn class(
    name: &str,
    modifiers: ClassModifiers,
    extends: Option<&str>,
    members: Vec<ClassMember>,
) -> ClassDef {
    ClassDef {
        modifiers,
        name: id(name),
        extends: extends.map(qid),
        members,
        span: Span::default(),
    }
}

// --- modules -----------------------------------------------------------------

pub fn module(members: Vec<ModuleMember>) -> Module {
    Module {
        header: None,
        imports: Vec::new(),
        members,
        span: Span::default(),
    }
}

pub fn amends_module(uri: &str, members: Vec<ModuleMember>) -> Module {
    Module {
        header: Some(ModuleHeader {
            kind: ModuleKind::Amends {
                uri: StringLiteral::simple(uri.to_string(), Span::default()),
            },
            span: Span::default(),
        }),
        imports: Vec::new(),
        members,
        span: Span::default(),
    }
}

pub fn extends_module(uri: &str, members: Vec<ModuleMember>) -> Module {
    Module {
        header: Some(ModuleHeader {
            kind: ModuleKind::Extends {
                uri: StringLiteral::simple(uri.to_string(), Span::default()),
            },
            span: Span::default(),
        }),
        imports: Vec::new(),
        members,
        span: Span::default(),
    }
}

pub fn import(uri: &str) -> Import {
    Import {
        kind: ImportKind::Normal,
        uri: StringLiteral::simple(uri.to_string(), Span::default()),
        alias: None,
        span: Span::default(),
    }
}

pub fn import_as(uri: &str, alias: &str) -> Import {
    Import {
        kind: ImportKind::Normal,
        uri: StringLiteral::simple(uri.to_string(), Span::default()),
        alias: Some(id(alias)),
        span: Span::default(),
    }
}

pub fn import_glob(uri: &str, alias: &str) -> Import {
    Import {
        kind: ImportKind::Glob,
        uri: StringLiteral::simple(uri.to_string(), Span::default()),
        alias: Some(id(alias)),
        span: Span::default(),
    }
}
