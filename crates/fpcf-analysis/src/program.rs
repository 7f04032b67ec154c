//! In-memory program model
//!
//! Implements both provider interfaces over plain declaration tables and
//! builds the entity universe the store is created from.

use crate::ir::{ClassDecl, Expr, FieldDecl, FieldType, HierarchyProvider, IrProvider, MethodDecl, Stmt, TypeRef};
use fpcf_core::{EntityKind, EntityUniverse, FpcfError};
use indexmap::IndexMap;
use std::collections::VecDeque;

/// Name given to constructors, as in `pkg.A.<init>`
pub const CONSTRUCTOR: &str = "<init>";

#[derive(Debug, Clone)]
pub struct Program {
    universe: EntityUniverse,
    classes: IndexMap<String, ClassDecl>,
    fields: IndexMap<String, FieldDecl>,
    methods: IndexMap<String, MethodDecl>,
    direct_subclasses: IndexMap<String, Vec<String>>,
}

impl Program {
    pub fn builder() -> ProgramBuilder {
        ProgramBuilder::default()
    }

    pub fn universe(&self) -> &EntityUniverse {
        &self.universe
    }

    pub fn classes(&self) -> impl Iterator<Item = &ClassDecl> {
        self.classes.values()
    }

    pub fn fields(&self) -> impl Iterator<Item = &FieldDecl> {
        self.fields.values()
    }

    pub fn methods(&self) -> impl Iterator<Item = &MethodDecl> {
        self.methods.values()
    }
}

impl IrProvider for Program {
    fn class(&self, name: &str) -> Option<&ClassDecl> {
        self.classes.get(name)
    }

    fn field(&self, name: &str) -> Option<&FieldDecl> {
        self.fields.get(name)
    }

    fn method(&self, name: &str) -> Option<&MethodDecl> {
        self.methods.get(name)
    }

    fn field_writers(&self, field: &str) -> Vec<&MethodDecl> {
        self.methods
            .values()
            .filter(|method| method.writes_field(field))
            .collect()
    }
}

impl HierarchyProvider for Program {
    fn subclasses(&self, class: &str) -> Vec<&str> {
        let mut found: Vec<&str> = Vec::new();
        let mut queue: VecDeque<&str> = VecDeque::from([class]);
        while let Some(next) = queue.pop_front() {
            for sub in self.direct_subclasses.get(next).into_iter().flatten() {
                let sub = sub.as_str();
                if !found.contains(&sub) {
                    found.push(sub);
                    queue.push_back(sub);
                }
            }
        }
        found
    }

    fn call_targets(&self, method: &str) -> Vec<&str> {
        let Some(decl) = self.methods.get(method) else {
            return Vec::new();
        };
        let simple = simple_name(&decl.name);
        let mut targets = vec![decl.name.as_str()];
        if simple == CONSTRUCTOR {
            return targets;
        }
        for sub in self.subclasses(&decl.owner) {
            if let Some((name, _)) = self.methods.get_key_value(format!("{sub}.{simple}").as_str()) {
                targets.push(name.as_str());
            }
        }
        targets
    }
}

fn simple_name(qualified: &str) -> &str {
    qualified.rsplit('.').next().unwrap_or(qualified)
}

/// Field declaration under construction
#[derive(Debug, Clone)]
pub struct FieldBuilder {
    name: String,
    ty: FieldType,
    is_final: bool,
    is_private: bool,
    initializer: Option<Expr>,
}

impl FieldBuilder {
    pub fn new(name: impl Into<String>, ty: FieldType) -> Self {
        Self {
            name: name.into(),
            ty,
            is_final: false,
            is_private: false,
            initializer: None,
        }
    }

    pub fn final_(mut self) -> Self {
        self.is_final = true;
        self
    }

    pub fn private(mut self) -> Self {
        self.is_private = true;
        self
    }

    pub fn init(mut self, value: Expr) -> Self {
        self.initializer = Some(value);
        self
    }
}

/// Class declaration under construction
#[derive(Debug, Clone)]
pub struct ClassBuilder {
    name: String,
    type_params: Vec<String>,
    superclass: Option<TypeRef>,
    is_final: bool,
    fields: Vec<FieldBuilder>,
    methods: Vec<(String, bool, Vec<Stmt>)>,
}

impl ClassBuilder {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            type_params: Vec::new(),
            superclass: None,
            is_final: false,
            fields: Vec::new(),
            methods: Vec::new(),
        }
    }

    pub fn type_params<I, S>(mut self, params: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.type_params = params.into_iter().map(Into::into).collect();
        self
    }

    pub fn extends(self, name: impl Into<String>) -> Self {
        self.extends_generic(name, Vec::new())
    }

    /// Superclass instantiated with type arguments
    pub fn extends_generic(mut self, name: impl Into<String>, args: Vec<FieldType>) -> Self {
        self.superclass = Some(TypeRef {
            name: name.into(),
            args,
        });
        self
    }

    pub fn final_class(mut self) -> Self {
        self.is_final = true;
        self
    }

    pub fn field(mut self, field: FieldBuilder) -> Self {
        self.fields.push(field);
        self
    }

    pub fn method(mut self, name: impl Into<String>, body: Vec<Stmt>) -> Self {
        self.methods.push((name.into(), false, body));
        self
    }

    pub fn constructor(mut self, body: Vec<Stmt>) -> Self {
        self.methods.push((CONSTRUCTOR.to_string(), true, body));
        self
    }
}

#[derive(Debug, Default)]
pub struct ProgramBuilder {
    classes: Vec<ClassBuilder>,
}

impl ProgramBuilder {
    pub fn class(mut self, class: ClassBuilder) -> Self {
        self.classes.push(class);
        self
    }

    /// Assemble the program; names must be unique across all declarations
    pub fn build(self) -> fpcf_core::Result<Program> {
        let mut program = Program {
            universe: EntityUniverse::new(),
            classes: IndexMap::new(),
            fields: IndexMap::new(),
            methods: IndexMap::new(),
            direct_subclasses: IndexMap::new(),
        };

        for class in self.classes {
            program.universe.add(class.name.clone(), EntityKind::Class)?;
            let mut decl = ClassDecl {
                name: class.name.clone(),
                type_params: class.type_params,
                superclass: class.superclass,
                is_final: class.is_final,
                fields: Vec::new(),
                methods: Vec::new(),
            };

            for field in class.fields {
                let name = format!("{}.{}", class.name, field.name);
                program.universe.add(name.clone(), EntityKind::Field)?;
                decl.fields.push(name.clone());
                program.fields.insert(
                    name.clone(),
                    FieldDecl {
                        name,
                        owner: class.name.clone(),
                        ty: field.ty,
                        is_final: field.is_final,
                        is_private: field.is_private,
                        initializer: field.initializer,
                    },
                );
            }

            for (simple, is_constructor, body) in class.methods {
                let name = format!("{}.{}", class.name, simple);
                program.universe.add(name.clone(), EntityKind::Method)?;
                decl.methods.push(name.clone());
                program.methods.insert(
                    name.clone(),
                    MethodDecl {
                        name,
                        owner: class.name.clone(),
                        is_constructor,
                        body,
                    },
                );
            }

            if let Some(superclass) = &decl.superclass {
                if superclass.name == decl.name {
                    return Err(FpcfError::Config(format!("class `{}` extends itself", decl.name)));
                }
                program
                    .direct_subclasses
                    .entry(superclass.name.clone())
                    .or_default()
                    .push(decl.name.clone());
            }
            program.classes.insert(class.name, decl);
        }
        Ok(program)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hierarchy() -> Program {
        Program::builder()
            .class(
                ClassBuilder::new("pkg.Base")
                    .field(FieldBuilder::new("name", FieldType::String).private())
                    .constructor(vec![Stmt::write("pkg.Base.name", Expr::str("base"))])
                    .method("describe", vec![Stmt::Return(Expr::str("base"))]),
            )
            .class(
                ClassBuilder::new("pkg.Mid")
                    .extends("pkg.Base")
                    .method("describe", vec![Stmt::Return(Expr::str("mid"))]),
            )
            .class(ClassBuilder::new("pkg.Leaf").extends("pkg.Mid").final_class())
            .build()
            .unwrap()
    }

    #[test]
    fn test_universe_covers_all_declarations() {
        let program = hierarchy();
        let universe = program.universe();
        assert_eq!(universe.len(), 6);
        assert_eq!(universe.lookup("pkg.Base.name").unwrap().kind(), EntityKind::Field);
        assert_eq!(universe.lookup("pkg.Base.<init>").unwrap().kind(), EntityKind::Method);
    }

    #[test]
    fn test_subclasses_are_transitive() {
        let program = hierarchy();
        assert_eq!(program.subclasses("pkg.Base"), vec!["pkg.Mid", "pkg.Leaf"]);
        assert!(program.subclasses("pkg.Leaf").is_empty());
    }

    #[test]
    fn test_call_targets_include_overrides() {
        let program = hierarchy();
        assert_eq!(
            program.call_targets("pkg.Base.describe"),
            vec!["pkg.Base.describe", "pkg.Mid.describe"]
        );
        assert!(program.call_targets("pkg.Missing.run").is_empty());
    }

    #[test]
    fn test_field_writers() {
        let program = hierarchy();
        let writers = program.field_writers("pkg.Base.name");
        assert_eq!(writers.len(), 1);
        assert!(writers[0].is_constructor);
    }

    #[test]
    fn test_duplicate_declaration_rejected() {
        let result = Program::builder()
            .class(ClassBuilder::new("pkg.A").method("m", vec![]).method("m", vec![]))
            .build();
        assert!(matches!(result, Err(FpcfError::DuplicateEntity(_))));
    }
}
