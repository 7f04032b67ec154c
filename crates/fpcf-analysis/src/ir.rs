//! Normalized program representation consumed by the analyses
//!
//! The analyses never parse anything themselves. They see classes, fields and
//! method bodies through [`IrProvider`] and the type hierarchy through
//! [`HierarchyProvider`]. Names are fully qualified: `pkg.Class`,
//! `pkg.Class.field`, `pkg.Class.method`.

use serde::{Deserialize, Serialize};

/// Declared type of a field or type argument
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FieldType {
    Primitive,
    String,
    Class { name: String, args: Vec<FieldType> },
    TypeParam(String),
    Array(Box<FieldType>),
}

impl FieldType {
    pub fn class(name: impl Into<String>) -> Self {
        FieldType::Class {
            name: name.into(),
            args: Vec::new(),
        }
    }

    pub fn generic(name: impl Into<String>, args: impl IntoIterator<Item = FieldType>) -> Self {
        FieldType::Class {
            name: name.into(),
            args: args.into_iter().collect(),
        }
    }

    pub fn param(name: impl Into<String>) -> Self {
        FieldType::TypeParam(name.into())
    }

    pub fn array(element: FieldType) -> Self {
        FieldType::Array(Box::new(element))
    }
}

/// Reference to a class with type arguments, e.g. a superclass
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TypeRef {
    pub name: String,
    pub args: Vec<FieldType>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Expr {
    Str(String),
    Var(String),
    Param(usize),
    Concat(Box<Expr>, Box<Expr>),
    /// `cond ? a : b`
    Cond(Box<Expr>, Box<Expr>),
    /// Call of a method of the analyzed program
    Call(String),
    /// Call into code outside the analyzed program
    ExternalCall(String),
    /// `Class.forName(class).getField(field).get(..)`
    ReflectiveFieldRead { class: String, field: String },
    FieldRead(String),
    /// Read from an array of known elements; `None` when the index is unknown
    ArrayRead { elements: Vec<Expr>, index: Option<usize> },
}

impl Expr {
    pub fn str(value: impl Into<String>) -> Self {
        Expr::Str(value.into())
    }

    pub fn var(name: impl Into<String>) -> Self {
        Expr::Var(name.into())
    }

    pub fn concat(left: Expr, right: Expr) -> Self {
        Expr::Concat(Box::new(left), Box::new(right))
    }

    pub fn cond(then: Expr, otherwise: Expr) -> Self {
        Expr::Cond(Box::new(then), Box::new(otherwise))
    }

    pub fn call(method: impl Into<String>) -> Self {
        Expr::Call(method.into())
    }

    pub fn external(method: impl Into<String>) -> Self {
        Expr::ExternalCall(method.into())
    }

    pub fn field(name: impl Into<String>) -> Self {
        Expr::FieldRead(name.into())
    }

    pub fn reflective_field(class: impl Into<String>, field: impl Into<String>) -> Self {
        Expr::ReflectiveFieldRead {
            class: class.into(),
            field: field.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Stmt {
    Assign { var: String, value: Expr },
    /// Store into a field; `lazy_guard` marks a write behind `if (f == null)`
    FieldWrite { field: String, value: Expr, lazy_guard: bool },
    If { then: Vec<Stmt>, otherwise: Vec<Stmt> },
    Loop { body: Vec<Stmt> },
    Return(Expr),
}

impl Stmt {
    pub fn assign(var: impl Into<String>, value: Expr) -> Self {
        Stmt::Assign {
            var: var.into(),
            value,
        }
    }

    pub fn write(field: impl Into<String>, value: Expr) -> Self {
        Stmt::FieldWrite {
            field: field.into(),
            value,
            lazy_guard: false,
        }
    }

    pub fn lazy_init(field: impl Into<String>, value: Expr) -> Self {
        Stmt::FieldWrite {
            field: field.into(),
            value,
            lazy_guard: true,
        }
    }

    /// Fields written by this statement, including nested blocks
    pub fn field_writes<'a>(&'a self, out: &mut Vec<(&'a str, bool)>) {
        match self {
            Stmt::FieldWrite {
                field, lazy_guard, ..
            } => out.push((field.as_str(), *lazy_guard)),
            Stmt::If { then, otherwise } => {
                then.iter().chain(otherwise).for_each(|s| s.field_writes(out));
            }
            Stmt::Loop { body } => body.iter().for_each(|s| s.field_writes(out)),
            Stmt::Assign { .. } | Stmt::Return(_) => {}
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldDecl {
    pub name: String,
    pub owner: String,
    pub ty: FieldType,
    pub is_final: bool,
    pub is_private: bool,
    pub initializer: Option<Expr>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MethodDecl {
    pub name: String,
    pub owner: String,
    pub is_constructor: bool,
    pub body: Vec<Stmt>,
}

impl MethodDecl {
    /// Every field write in the body with its lazy-guard flag
    pub fn field_writes(&self) -> Vec<(&str, bool)> {
        let mut out = Vec::new();
        self.body.iter().for_each(|s| s.field_writes(&mut out));
        out
    }

    pub fn writes_field(&self, field: &str) -> bool {
        self.field_writes().iter().any(|(f, _)| *f == field)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClassDecl {
    pub name: String,
    pub type_params: Vec<String>,
    pub superclass: Option<TypeRef>,
    pub is_final: bool,
    pub fields: Vec<String>,
    pub methods: Vec<String>,
}

/// Statements, fields and classes of the analyzed program
pub trait IrProvider: Send + Sync {
    fn class(&self, name: &str) -> Option<&ClassDecl>;

    fn field(&self, name: &str) -> Option<&FieldDecl>;

    fn method(&self, name: &str) -> Option<&MethodDecl>;

    /// Methods whose bodies write `field`
    fn field_writers(&self, field: &str) -> Vec<&MethodDecl>;
}

/// Class hierarchy and call resolution
pub trait HierarchyProvider: Send + Sync {
    /// Direct and indirect subclasses of `class`
    fn subclasses(&self, class: &str) -> Vec<&str>;

    /// Methods a call of `method` may dispatch to, `method` itself included
    fn call_targets(&self, method: &str) -> Vec<&str>;
}

/// Everything the hosted analyses need from a program
pub trait ProgramModel: IrProvider + HierarchyProvider {}

impl<T: IrProvider + HierarchyProvider> ProgramModel for T {}
