//! Abstract syntax tree definitions for Marl

use std::fmt;

/// Source location span (byte offsets into the original source)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Span {
    pub start: usize,
    pub end: usize,
}

impl Span {
    pub fn new(start: usize, end: usize) -> Self {
        Self { start, end }
    }

    pub fn merge(self, other: Span) -> Span {
        Span {
            start: self.start.min(other.start),
            end: self.end.max(other.end),
        }
    }
}

/// A node with associated source span
#[derive(Debug, Clone, PartialEq)]
pub struct Spanned<T> {
    pub node: T,
    pub span: Span,
}

impl<T> Spanned<T> {
    pub fn new(node: T, span: Span) -> Self {
        Self { node, span }
    }
}

/// Simple identifier
pub type Identifier = Spanned<String>;

/// Qualified identifier (e.g., `foo.bar.Baz`)
#[derive(Debug, Clone, PartialEq)]
pub struct QualifiedIdent {
    pub parts: Vec<Identifier>,
}

impl QualifiedIdent {
    pub fn simple(name: Identifier) -> Self {
        Self { parts: vec![name] }
    }
}

impl fmt::Display for QualifiedIdent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s: String = self
            .parts
            .iter()
            .map(|p| p.node.as_str())
            .collect::<Vec<_>>()
            .join(".");
        write!(f, "{}", s)
    }
}

// =============================================================================
// Module
// =============================================================================

/// A complete Marl module
#[derive(Debug, Clone, PartialEq)]
pub struct Module {
    pub header: Option<ModuleHeader>,
    pub imports: Vec<Import>,
    pub members: Vec<ModuleMember>,
    pub span: Span,
}

/// Module header declaration
#[derive(Debug, Clone, PartialEq)]
pub struct ModuleHeader {
    pub kind: ModuleKind,
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ModuleKind {
    /// `module foo.bar`
    Module {
        is_open: bool,
        name: Option<QualifiedIdent>,
    },
    /// `amends "uri"`
    Amends { uri: StringLiteral },
    /// `extends "uri"`
    Extends { uri: StringLiteral },
}

/// Import declaration
#[derive(Debug, Clone, PartialEq)]
pub struct Import {
    pub kind: ImportKind,
    pub uri: StringLiteral,
    pub alias: Option<Identifier>,
    pub span: Span,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImportKind {
    Normal,
    Glob,
}

// =============================================================================
// Module Members
// =============================================================================

#[derive(Debug, Clone, PartialEq)]
pub enum ModuleMember {
    Class(ClassDef),
    TypeAlias(TypeAlias),
    Property(Property),
    Method(Method),
}

// =============================================================================
// Class Definition
// =============================================================================

#[derive(Debug, Clone, PartialEq)]
pub struct ClassDef {
    pub modifiers: ClassModifiers,
    pub name: Identifier,
    pub extends: Option<QualifiedIdent>,
    pub members: Vec<ClassMember>,
    pub span: Span,
}

/// Classes are final unless declared `open` or `abstract`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ClassModifiers {
    pub is_abstract: bool,
    pub is_open: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ClassMember {
    Property(Property),
    Method(Method),
}

// =============================================================================
// Type Alias
// =============================================================================

#[derive(Debug, Clone, PartialEq)]
pub struct TypeAlias {
    pub name: Identifier,
    pub ty: TypeAnnotation,
    pub span: Span,
}

// =============================================================================
// Property and Method
// =============================================================================

#[derive(Debug, Clone, PartialEq)]
pub struct Property {
    pub modifiers: PropertyModifiers,
    pub name: Identifier,
    pub ty: Option<TypeAnnotation>,
    pub value: Option<PropertyValue>,
    pub span: Span,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PropertyModifiers {
    pub is_local: bool,
    pub is_hidden: bool,
    pub is_fixed: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub enum PropertyValue {
    Expr(Expr),
    Object(ObjectBody),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Method {
    pub name: Identifier,
    pub params: Vec<Parameter>,
    pub return_type: Option<TypeAnnotation>,
    pub body: Expr,
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Parameter {
    pub name: Identifier,
    pub ty: Option<TypeAnnotation>,
    pub span: Span,
}

// =============================================================================
// Type Annotations
// =============================================================================

#[derive(Debug, Clone, PartialEq)]
pub struct TypeAnnotation {
    pub kind: TypeKind,
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq)]
pub enum TypeKind {
    /// Simple type reference: `String`, `Int`, `MyClass`
    Named(QualifiedIdent),

    /// Parameterized type: `List<String>`, `Map<String, Int>`
    Parameterized {
        base: QualifiedIdent,
        args: Vec<TypeAnnotation>,
    },

    /// Nullable type: `String?`
    Nullable(Box<TypeAnnotation>),

    /// Union type: `String | Int`
    Union(Vec<TypeAnnotation>),

    /// Constrained type: `Int(this > 0)`
    Constrained {
        base: Box<TypeAnnotation>,
        constraints: Vec<Expr>,
    },

    /// String literal type: `"json"`
    StringLiteral(String),

    /// Bottom type
    Nothing,

    /// Top type
    Unknown,
}

// =============================================================================
// Expressions
// =============================================================================

#[derive(Debug, Clone, PartialEq)]
pub struct Expr {
    pub kind: ExprKind,
    pub span: Span,
}

impl Expr {
    pub fn new(kind: ExprKind, span: Span) -> Self {
        Self { kind, span }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ExprKind {
    // Literals
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    String(StringLiteral),

    // Identifiers and references
    Identifier(String),
    This,
    Super,
    Module,

    // Object creation and amendment
    New {
        class_ref: Option<QualifiedIdent>,
        body: ObjectBody,
    },
    Amend {
        base: Box<Expr>,
        body: ObjectBody,
    },

    // Member access
    MemberAccess {
        base: Box<Expr>,
        member: Identifier,
    },
    OptionalMemberAccess {
        base: Box<Expr>,
        member: Identifier,
    },

    Binary {
        op: BinaryOp,
        left: Box<Expr>,
        right: Box<Expr>,
    },

    Unary {
        op: UnaryOp,
        operand: Box<Expr>,
    },

    Subscript {
        base: Box<Expr>,
        index: Box<Expr>,
    },

    Call {
        callee: Box<Expr>,
        args: Vec<Expr>,
    },

    If {
        condition: Box<Expr>,
        then_branch: Box<Expr>,
        else_branch: Box<Expr>,
    },
    Let {
        name: Identifier,
        value: Box<Expr>,
        body: Box<Expr>,
    },

    Lambda {
        params: Vec<Parameter>,
        body: Box<Expr>,
    },

    // Type operations
    Is {
        value: Box<Expr>,
        ty: TypeAnnotation,
    },

    // Null handling
    NonNullAssertion(Box<Expr>),
    NullCoalesce {
        value: Box<Expr>,
        default: Box<Expr>,
    },

    Throw(Box<Expr>),
    Trace(Box<Expr>),

    /// `read("uri")` / `read?("uri")`
    Read {
        uri: Box<Expr>,
        is_nullable: bool,
    },
    /// `read*("glob-uri")`
    ReadGlob {
        uri: Box<Expr>,
    },

    Parenthesized(Box<Expr>),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    // Arithmetic
    Add,
    Sub,
    Mul,
    Div,
    IntDiv,
    Mod,
    Pow,
    // Comparison
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    // Logical
    And,
    Or,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    Neg,
    Not,
}

// =============================================================================
// String Literals
// =============================================================================

#[derive(Debug, Clone, PartialEq)]
pub struct StringLiteral {
    pub parts: Vec<StringPart>,
    pub span: Span,
}

impl StringLiteral {
    pub fn simple(value: String, span: Span) -> Self {
        Self {
            parts: vec![StringPart::Literal(value)],
            span,
        }
    }

    /// Returns true if this string has no interpolation
    pub fn is_simple(&self) -> bool {
        self.parts.len() == 1 && matches!(&self.parts[0], StringPart::Literal(_))
    }

    /// Get the literal string value if this is not interpolated
    pub fn as_simple(&self) -> Option<&str> {
        if self.is_simple() {
            if let StringPart::Literal(s) = &self.parts[0] {
                return Some(s);
            }
        }
        None
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum StringPart {
    Literal(String),
    Interpolation(Expr),
}

// =============================================================================
// Object Body
// =============================================================================

#[derive(Debug, Clone, PartialEq)]
pub struct ObjectBody {
    pub members: Vec<ObjectBodyMember>,
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ObjectBodyMember {
    /// `name = value`
    Property {
        name: Identifier,
        ty: Option<TypeAnnotation>,
        value: Expr,
        span: Span,
    },

    /// `name { ... }` (amend shorthand)
    PropertyAmend {
        name: Identifier,
        body: ObjectBody,
        span: Span,
    },

    /// Unlabeled expression (Listing element)
    Element { value: Expr, span: Span },

    /// `[key] = value` (Mapping entry)
    Entry { key: Expr, value: Expr, span: Span },

    /// `[key] { ... }` (entry amend)
    EntryAmend {
        key: Expr,
        body: ObjectBody,
        span: Span,
    },

    /// `for (x in iterable) { ... }`
    For {
        key_var: Option<Identifier>,
        value_var: Identifier,
        iterable: Expr,
        body: ObjectBody,
        span: Span,
    },

    /// `when (condition) { ... } else { ... }`
    When {
        condition: Expr,
        body: ObjectBody,
        else_body: Option<ObjectBody>,
        span: Span,
    },
}
