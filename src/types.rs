//! Type handling for nyan values.
//!
//! A type combines a *primitive* kind (bool, int, float, text, file,
//! object, container, modifier), a *composite* kind (single, set,
//! orderedset, dict, or one of the modifiers), and, for composites, the
//! nested element types.  Modifier wrappers (`optional`, `abstract`,
//! `children`) never change a type's identity; they fold into a flag set
//! on the wrapped type, so `optional(set(int))` is a `set(int)` with the
//! optional flag.

use std::fmt;
use std::sync::Arc;

use bitflags::bitflags;

use crate::ast::AstMemberType;
use crate::error::{LangError, NyanError, Result};
use crate::meta_info::MetaInfo;
use crate::namespace::{Namespace, NamespaceFinder};
use crate::token::IdToken;
use crate::Fqon;

/// Primitive kinds of member types.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Primitive {
    /// `bool`
    Boolean,
    /// `text`
    Text,
    /// `file`
    Filename,
    /// `int`
    Int,
    /// `float`
    Float,
    /// A reference to another object.
    Object,
    /// The `None` placeholder; values only, never a declared type.
    None,
    /// A container of multiple values; see the composite kind.
    Container,
    /// A modifier wrapper; see the composite kind.
    Modifier,
}

impl Primitive {
    /// Keyword or description of the primitive kind.
    pub fn name(self) -> &'static str {
        match self {
            Primitive::Boolean => "bool",
            Primitive::Text => "text",
            Primitive::Filename => "file",
            Primitive::Int => "int",
            Primitive::Float => "float",
            Primitive::Object => "object",
            Primitive::None => "none",
            Primitive::Container => "container",
            Primitive::Modifier => "modifier",
        }
    }
}

/// Composite kinds: the containers and modifiers.  `Single` means the
/// type is not a composite.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Composite {
    /// A primitive single value.
    Single,
    /// `set(T)`
    Set,
    /// `orderedset(T)`
    OrderedSet,
    /// `dict(K, V)`
    Dict,
    /// `abstract(T)` modifier: allows abstract objects as values.
    Abstract,
    /// `children(T)` modifier: restricts to strict descendants of T.
    Children,
    /// `optional(T)` modifier: allows `None` as the value.
    Optional,
}

impl Composite {
    /// Keyword of the composite kind.
    pub fn name(self) -> &'static str {
        match self {
            Composite::Single => "single_value",
            Composite::Set => "set",
            Composite::OrderedSet => "orderedset",
            Composite::Dict => "dict",
            Composite::Abstract => "abstract",
            Composite::Children => "children",
            Composite::Optional => "optional",
        }
    }
}

bitflags! {
    /// Modifier flags folded out of the type wrappers.
    #[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
    pub struct Modifiers: u8 {
        /// `optional(...)` was wrapped around the type.
        const OPTIONAL = 1 << 0;
        /// `abstract(...)` was wrapped around the type.
        const ABSTRACT = 1 << 1;
        /// `children(...)` was wrapped around the type.
        const CHILDREN = 1 << 2;
    }
}

/// The primitive/composite combination of a type or value, without
/// element types and object targets.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BasicType {
    /// Primitive kind.
    pub primitive: Primitive,
    /// Composite kind; `Single` for plain primitives.
    pub composite: Composite,
}

impl BasicType {
    /// Shorthand constructor.
    pub const fn new(primitive: Primitive, composite: Composite) -> BasicType {
        BasicType {
            primitive,
            composite,
        }
    }

    /// Whether this is an object reference type.
    pub fn is_object(&self) -> bool {
        self.primitive == Primitive::Object
    }

    /// Whether this is a plain value type (int, float, text, ...).
    pub fn is_fundamental(&self) -> bool {
        matches!(
            self.primitive,
            Primitive::Boolean
                | Primitive::Text
                | Primitive::Filename
                | Primitive::Int
                | Primitive::Float
                | Primitive::None
        )
    }

    /// Whether the composite kind is not `Single`.
    pub fn is_composite(&self) -> bool {
        self.composite != Composite::Single
    }

    /// Whether this is one of the container kinds.
    pub fn is_container(&self) -> bool {
        matches!(
            self.composite,
            Composite::Set | Composite::OrderedSet | Composite::Dict
        )
    }

    /// Whether this is one of the modifier kinds.
    pub fn is_modifier(&self) -> bool {
        matches!(
            self.composite,
            Composite::Abstract | Composite::Children | Composite::Optional
        )
    }

    /// How many nested types the composite kind requires, e.g. 2 for dict.
    pub fn expected_nested_types(&self) -> usize {
        match self.composite {
            Composite::Single => 0,
            Composite::Set | Composite::OrderedSet => 1,
            Composite::Dict => 2,
            Composite::Abstract | Composite::Children | Composite::Optional => 1,
        }
    }

    /// Determine the basic type a type token declares.  Unknown names are
    /// object references.
    pub fn from_type_token(token: &IdToken) -> BasicType {
        let (primitive, composite) = match token.first() {
            "bool" => (Primitive::Boolean, Composite::Single),
            "text" => (Primitive::Text, Composite::Single),
            "file" => (Primitive::Filename, Composite::Single),
            "int" => (Primitive::Int, Composite::Single),
            "float" => (Primitive::Float, Composite::Single),
            "set" => (Primitive::Container, Composite::Set),
            "orderedset" => (Primitive::Container, Composite::OrderedSet),
            "dict" => (Primitive::Container, Composite::Dict),
            "abstract" => (Primitive::Modifier, Composite::Abstract),
            "children" => (Primitive::Modifier, Composite::Children),
            "optional" => (Primitive::Modifier, Composite::Optional),
            _ => (Primitive::Object, Composite::Single),
        };
        BasicType::new(primitive, composite)
    }
}

impl fmt::Display for BasicType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_composite() {
            write!(f, "{}", self.composite.name())
        } else {
            write!(f, "{}", self.primitive.name())
        }
    }
}

/// A fully resolved member type.
#[derive(Clone, Debug, PartialEq)]
pub struct Type {
    basic: BasicType,
    modifiers: Modifiers,
    element_types: Vec<Type>,
    object_target: Option<Fqon>,
}

impl Type {
    /// Construct a type from its AST declaration.
    ///
    /// Modifier wrappers are consumed into flags, then the first
    /// non-modifier basic type decides the shape:
    ///
    /// - `set(int)` → set with element type `[int]`
    /// - `optional(int)` → int with the optional flag
    /// - `optional(set(int))` → set with the optional flag, elements `[int]`
    /// - `set(optional(int))` → error, element types can't be optional
    /// - `dict(int, optional(int))` → dict with key `int` and an
    ///   optional-flagged value type
    pub fn from_ast(
        ast_type: &AstMemberType,
        scope: &NamespaceFinder,
        namespace: &Namespace,
        meta: &MetaInfo,
    ) -> Result<Type> {
        let mut current = ast_type;
        let mut modifiers = Modifiers::default();
        let mut basic = BasicType::from_type_token(&current.name);

        let expect_nested = |basic: &BasicType, ast: &AstMemberType| -> Result<usize> {
            let count = basic.expected_nested_types();
            if ast.nested.len() != count {
                return Err(NyanError::Type(LangError::new(
                    ast.name.location(),
                    format!(
                        "{} element types specified, but {} expects {}",
                        ast.nested.len(),
                        basic,
                        count
                    ),
                )));
            }
            Ok(count)
        };

        // consume all modifier wrappers and convert them to flags
        while basic.is_modifier() {
            expect_nested(&basic, current)?;
            let flag = match basic.composite {
                Composite::Abstract => Modifiers::ABSTRACT,
                Composite::Children => Modifiers::CHILDREN,
                Composite::Optional => Modifiers::OPTIONAL,
                _ => return Err(NyanError::internal("unhandled modifier type")),
            };
            modifiers |= flag;
            current = &current.nested[0];
            basic = BasicType::from_type_token(&current.name);
        }

        if basic.is_fundamental() {
            if !current.nested.is_empty() {
                return Err(NyanError::Type(LangError::new(
                    current.name.location(),
                    format!("{} takes no element types", basic),
                )));
            }
            return Ok(Type {
                basic,
                modifiers,
                element_types: Vec::new(),
                object_target: None,
            });
        }

        if basic.is_container() {
            let count = expect_nested(&basic, current)?;
            let mut element_types = Vec::with_capacity(count);
            for nested in &current.nested {
                element_types.push(Type::from_ast(nested, scope, namespace, meta)?);
            }

            for (idx, element) in element_types.iter().enumerate() {
                // only the dict value type escapes the hashability rules
                let is_dict_value = basic.composite == Composite::Dict && idx == 1;
                if !is_dict_value && element.has_modifier(Modifiers::OPTIONAL) {
                    return Err(NyanError::Type(LangError::new(
                        current.nested[idx].name.location(),
                        "container key type can't be optional",
                    )));
                }
                if element.is_container() {
                    return Err(NyanError::Type(LangError::new(
                        current.nested[idx].name.location(),
                        "nested containers are not supported",
                    )));
                }
            }

            return Ok(Type {
                basic,
                modifiers,
                element_types,
                object_target: None,
            });
        }

        if basic.is_object() {
            if !current.nested.is_empty() {
                return Err(NyanError::Type(LangError::new(
                    current.name.location(),
                    "object types take no element types",
                )));
            }
            let target = scope.find(namespace, &current.name, meta)?;
            return Ok(Type {
                basic,
                modifiers,
                element_types: Vec::new(),
                object_target: Some(target),
            });
        }

        Err(NyanError::internal("unhandled basic type in conversion"))
    }

    /// Build a fundamental type directly, without an AST declaration.
    pub fn fundamental(primitive: Primitive, modifiers: Modifiers) -> Type {
        Type {
            basic: BasicType::new(primitive, Composite::Single),
            modifiers,
            element_types: Vec::new(),
            object_target: None,
        }
    }

    /// Build an object reference type directly; used for builtin checks.
    pub fn object(target: Fqon, modifiers: Modifiers) -> Type {
        Type {
            basic: BasicType::new(Primitive::Object, Composite::Single),
            modifiers,
            element_types: Vec::new(),
            object_target: Some(target),
        }
    }

    /// The primitive/composite combination of this type.
    pub fn basic(&self) -> &BasicType {
        &self.basic
    }

    /// Primitive kind.
    pub fn primitive(&self) -> Primitive {
        self.basic.primitive
    }

    /// Composite kind.
    pub fn composite(&self) -> Composite {
        self.basic.composite
    }

    /// Whether this type references an object.
    pub fn is_object(&self) -> bool {
        self.basic.is_object()
    }

    /// Whether this type is a plain value type.
    pub fn is_fundamental(&self) -> bool {
        self.basic.is_fundamental()
    }

    /// Whether this type is one of the containers.
    pub fn is_container(&self) -> bool {
        self.basic.is_container()
    }

    /// Whether a given modifier flag was wrapped around this type.
    pub fn has_modifier(&self, modifier: Modifiers) -> bool {
        self.modifiers.contains(modifier)
    }

    /// All modifier flags.
    pub fn modifiers(&self) -> Modifiers {
        self.modifiers
    }

    /// Element types of a container.
    pub fn element_types(&self) -> &[Type] {
        &self.element_types
    }

    /// The referenced object for object types.
    pub fn fqon(&self) -> Option<&Fqon> {
        self.object_target.as_ref()
    }

    /// Whether values of this type may appear in sets or as dict keys.
    pub fn is_hashable(&self) -> bool {
        !self.is_container()
    }
}

impl fmt::Display for Type {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(target) = &self.object_target {
            return write!(f, "{}", target);
        }
        if self.basic.is_composite() {
            write!(f, "{}(", self.basic.composite.name())?;
            for (i, element) in self.element_types.iter().enumerate() {
                if i > 0 {
                    write!(f, ", ")?;
                }
                write!(f, "{}", element)?;
            }
            return write!(f, ")");
        }
        write!(f, "{}", self.basic)
    }
}

/// Shared handle to a resolved type; member infos of an inheritance chain
/// all point at the same definition.
pub type TypeRef = Arc<Type>;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::Ast;
    use crate::file::SourceFile;
    use crate::lexer::tokenize;
    use assert_matches::assert_matches;

    fn member_type(src: &str) -> AstMemberType {
        let file = std::sync::Arc::new(SourceFile::new(
            "test.nyan",
            format!("A():\n    x : {} = 0\n", src),
        ));
        let mut ast = Ast::parse(tokenize(&file).expect("tokenize")).expect("parse");
        let mut obj = ast.objects.pop().expect("object");
        let member = obj.members.pop().expect("member");
        member.member_type.expect("declared type")
    }

    fn build(src: &str) -> Result<Type> {
        let scope = NamespaceFinder::default();
        let ns = Namespace::new(vec![], "test".into(), vec![]);
        let meta = MetaInfo::default();
        Type::from_ast(&member_type(src), &scope, &ns, &meta)
    }

    #[test]
    fn fundamental() {
        let ty = build("int").expect("type");
        assert_eq!(ty.primitive(), Primitive::Int);
        assert_eq!(ty.composite(), Composite::Single);
        assert!(ty.modifiers().is_empty());
    }

    #[test]
    fn modifiers_fold_into_flags() {
        let ty = build("optional(set(int))").expect("type");
        assert_eq!(ty.composite(), Composite::Set);
        assert!(ty.has_modifier(Modifiers::OPTIONAL));
        assert_eq!(ty.element_types().len(), 1);
        assert_eq!(ty.element_types()[0].primitive(), Primitive::Int);
    }

    #[test]
    fn optional_set_elements_are_rejected() {
        assert_matches!(build("set(optional(int))"), Err(NyanError::Type(_)));
        assert_matches!(build("dict(optional(int), int)"), Err(NyanError::Type(_)));
    }

    #[test]
    fn optional_dict_values_are_allowed() {
        let ty = build("dict(int, optional(float))").expect("type");
        assert_eq!(ty.composite(), Composite::Dict);
        assert!(ty.element_types()[1].has_modifier(Modifiers::OPTIONAL));
    }

    #[test]
    fn nested_containers_are_rejected() {
        assert_matches!(build("set(set(int))"), Err(NyanError::Type(_)));
    }

    #[test]
    fn arity_is_checked() {
        assert_matches!(build("dict(int)"), Err(NyanError::Type(_)));
        assert_matches!(build("set(int, int)"), Err(NyanError::Type(_)));
        assert_matches!(build("optional()"), Err(NyanError::Type(_)));
    }

    #[test]
    fn display() {
        let ty = build("dict(int, optional(float))").expect("type");
        assert_eq!(ty.to_string(), "dict(int, float)");
    }

    #[test]
    fn unknown_names_resolve_as_objects() {
        // no objects exist in the empty MetaInfo, so this is a name error
        assert_matches!(build("SomeObject"), Err(NyanError::Name(_)));
    }
}
