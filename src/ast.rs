//! Abstract syntax tree of a nyan file and its recursive-descent parser.
//!
//! The parser consumes the token stream of one file and produces an [`Ast`]
//! with the file's arguments, imports and (possibly nested) objects.  Name
//! resolution, typing and value construction happen later in the loader;
//! the AST stores raw [`IdToken`]s only.

use crate::error::{LangError, NyanError, Result};
use crate::ops::{InheritanceDirection, Operator};
use crate::token::{IdToken, Token, TokenKind};

/// Kind of container a value literal uses.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AstContainer {
    /// `{1, 2, 3}`
    Set,
    /// `o{1, 2, 3}`
    OrderedSet,
    /// `{k: v, ...}`
    Dict,
}

/// A single value entry: one component for plain values and set elements,
/// a key/value pair for dict entries.
#[derive(Clone, Debug)]
pub struct ValueToken {
    parts: Vec<IdToken>,
}

impl ValueToken {
    fn single(part: IdToken) -> ValueToken {
        ValueToken { parts: vec![part] }
    }

    fn pair(key: IdToken, value: IdToken) -> ValueToken {
        ValueToken {
            parts: vec![key, value],
        }
    }

    /// The components of this entry.
    pub fn parts(&self) -> &[IdToken] {
        &self.parts
    }

    /// Location of the entry.
    pub fn location(&self) -> crate::error::Location {
        match self.parts.first() {
            Some(part) => part.location(),
            None => crate::error::Location::builtin("empty value token"),
        }
    }

    /// Whether this entry is the literal `None`.
    pub fn is_none(&self) -> bool {
        self.parts.len() == 1
            && self.parts[0].components().len() == 1
            && self.parts[0].kind() == Some(TokenKind::Id)
            && self.parts[0].first() == "None"
    }
}

/// A member value expression.
#[derive(Clone, Debug)]
pub enum AstMemberValue {
    /// A single scalar value.
    Single(ValueToken),
    /// A container literal with its entries.
    Container {
        /// Which container literal was written.
        kind: AstContainer,
        /// The entries, in source order.
        items: Vec<ValueToken>,
    },
}

impl AstMemberValue {
    /// Location of the value expression.
    pub fn location(&self) -> crate::error::Location {
        match self {
            AstMemberValue::Single(v) => v.location(),
            AstMemberValue::Container { items, .. } => match items.first() {
                Some(item) => item.location(),
                None => crate::error::Location::builtin("empty container literal"),
            },
        }
    }
}

/// A member type declaration, e.g. `optional(set(int))`.
#[derive(Clone, Debug)]
pub struct AstMemberType {
    /// Name of the outermost type.
    pub name: IdToken,
    /// Nested element types of composite types.
    pub nested: Vec<AstMemberType>,
}

/// A member entry of an object.
#[derive(Clone, Debug)]
pub struct AstMember {
    /// Member name; may be dotted for disambiguation against parents.
    pub name: IdToken,
    /// Number of `@` sigils before the operator.
    pub override_depth: u32,
    /// Operator, present iff a value is present.
    pub operation: Option<Operator>,
    /// Declared type, if the member declares one.
    pub member_type: Option<AstMemberType>,
    /// Value expression, if the member defines one.
    pub value: Option<AstMemberValue>,
}

/// An inheritance edit of a patch: `[+Parent]` or `[Parent+]`.
#[derive(Clone, Debug)]
pub struct AstInheritanceChange {
    /// Front or back insertion.
    pub direction: InheritanceDirection,
    /// The parent to splice in.
    pub target: IdToken,
}

/// An `import a.b.c (as alias)` statement.
#[derive(Clone, Debug)]
pub struct AstImport {
    /// The imported namespace.
    pub namespace: IdToken,
    /// Alias name, if one was given.
    pub alias: Option<Token>,
}

/// A `!argument value...` metadata line.
#[derive(Clone, Debug)]
pub struct AstArgument {
    /// Argument keyword.
    pub arg: IdToken,
    /// Parameter values.
    pub params: Vec<IdToken>,
}

/// An object definition.
#[derive(Clone, Debug)]
pub struct AstObject {
    /// Name token of the object.
    pub name: Token,
    /// Patch target, if this object is declared as a patch.
    pub target: Option<IdToken>,
    /// Inheritance edits, only allowed on patches.
    pub inheritance_changes: Vec<AstInheritanceChange>,
    /// Parent objects, in declaration order.
    pub parents: Vec<IdToken>,
    /// Member entries.
    pub members: Vec<AstMember>,
    /// Nested objects.
    pub objects: Vec<AstObject>,
}

/// Root of a parsed file.
#[derive(Clone, Debug, Default)]
pub struct Ast {
    /// `!` arguments of the file.
    pub args: Vec<AstArgument>,
    /// Imports of the file.
    pub imports: Vec<AstImport>,
    /// Top-level objects.
    pub objects: Vec<AstObject>,
}

impl Ast {
    /// Parse the token stream of one file.
    pub fn parse(tokens: Vec<Token>) -> Result<Ast> {
        if tokens.is_empty() {
            return Ok(Ast::default());
        }
        Parser { tokens, pos: 0 }.parse_file()
    }
}

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
}

impl Parser {
    fn peek(&self) -> &Token {
        // the lexer guarantees a trailing EndFile token
        self.tokens
            .get(self.pos)
            .unwrap_or_else(|| &self.tokens[self.tokens.len() - 1])
    }

    fn peek_kind(&self) -> TokenKind {
        self.peek().kind
    }

    fn peek_at(&self, offset: usize) -> Option<&Token> {
        self.tokens.get(self.pos + offset)
    }

    fn next(&mut self) -> Token {
        let token = self.peek().clone();
        if self.pos < self.tokens.len() {
            self.pos += 1;
        }
        token
    }

    fn err(&self, msg: &str, token: &Token) -> NyanError {
        NyanError::Parse(LangError::new(
            token.location.clone(),
            format!("{}: {}", msg, token),
        ))
    }

    fn expect(&mut self, kind: TokenKind, msg: &str) -> Result<Token> {
        let token = self.next();
        if token.kind != kind {
            return Err(self.err(msg, &token));
        }
        Ok(token)
    }

    /// A dotted identifier, starting from an already-consumed first token.
    fn id_token_from(&mut self, first: Token) -> IdToken {
        let mut parts = vec![first];
        while self.peek_kind() == TokenKind::Dot {
            let Some(next) = self.peek_at(1) else { break };
            if next.kind != TokenKind::Id {
                break;
            }
            self.next();
            parts.push(self.next());
        }
        IdToken::from_parts(parts)
    }

    fn expect_id_token(&mut self, msg: &str) -> Result<IdToken> {
        let first = self.next();
        if first.kind != TokenKind::Id {
            return Err(self.err(msg, &first));
        }
        Ok(self.id_token_from(first))
    }

    /// Walk a comma separated list up to `end`, calling `item` per entry.
    fn comma_list(
        &mut self,
        end: TokenKind,
        mut item: impl FnMut(&mut Parser) -> Result<()>,
    ) -> Result<usize> {
        let mut count = 0;
        let mut comma_expected = false;
        loop {
            let kind = self.peek_kind();
            if kind == TokenKind::EndLine {
                self.next();
                continue;
            }
            if kind == end {
                self.next();
                break;
            }
            if kind == TokenKind::Comma {
                if !comma_expected {
                    let token = self.next();
                    return Err(self.err("expecting value, but got", &token));
                }
                self.next();
                comma_expected = false;
                continue;
            }
            if comma_expected {
                let token = self.next();
                return Err(self.err("expected comma, but got", &token));
            }
            item(self)?;
            comma_expected = true;
            count += 1;
        }
        Ok(count)
    }

    fn parse_file(mut self) -> Result<Ast> {
        let mut ast = Ast::default();

        loop {
            match self.peek_kind() {
                TokenKind::Bang => {
                    self.next();
                    ast.args.push(self.parse_argument()?);
                }
                TokenKind::Import => {
                    self.next();
                    ast.imports.push(self.parse_import()?);
                }
                TokenKind::Id => {
                    let name = self.next();
                    ast.objects.push(self.parse_object(name)?);
                }
                TokenKind::EndLine => {
                    self.next();
                }
                TokenKind::EndFile => break,
                _ => {
                    let token = self.next();
                    return Err(self.err("expected object name, but got", &token));
                }
            }
        }

        if let Some(first) = ast.args.first() {
            if first.arg.str() != "version" {
                return Err(NyanError::Parse(LangError::new(
                    first.arg.location(),
                    "the first file argument must be 'version'",
                )));
            }
        }

        Ok(ast)
    }

    fn parse_argument(&mut self) -> Result<AstArgument> {
        let arg = self.expect_id_token("expected argument keyword, encountered")?;
        let mut params = Vec::new();
        loop {
            let token = self.next();
            if token.kind.is_endmarker() {
                break;
            }
            if !token.kind.is_content() {
                return Err(self.err("expected parameter value, encountered", &token));
            }
            let param = if token.kind == TokenKind::Id {
                self.id_token_from(token)
            } else {
                IdToken::from_parts(vec![token])
            };
            params.push(param);
        }
        Ok(AstArgument { arg, params })
    }

    fn parse_import(&mut self) -> Result<AstImport> {
        let namespace = self.expect_id_token("expected namespace name to import, encountered")?;
        let mut alias = None;
        if self.peek_kind() == TokenKind::As {
            self.next();
            alias = Some(self.expect(
                TokenKind::Id,
                "expected namespace alias identifier, but encountered",
            )?);
        }
        let end = self.next();
        if !end.kind.is_endmarker() {
            return Err(self.err("newline expected after import, there is", &end));
        }
        Ok(AstImport { namespace, alias })
    }

    fn parse_object(&mut self, name: Token) -> Result<AstObject> {
        let mut object = AstObject {
            name,
            target: None,
            inheritance_changes: Vec::new(),
            parents: Vec::new(),
            members: Vec::new(),
            objects: Vec::new(),
        };

        if self.peek_kind() == TokenKind::LAngle {
            self.next();
            object.target = Some(self.expect_id_token("expected patch target, encountered")?);
            self.expect(TokenKind::RAngle, "expected > as patch target end, there is")?;
        }

        if self.peek_kind() == TokenKind::LBracket {
            self.next();
            let mut changes = Vec::new();
            self.comma_list(TokenKind::RBracket, |p| {
                changes.push(p.parse_inheritance_change()?);
                Ok(())
            })?;
            object.inheritance_changes = changes;
        }

        if self.peek_kind() != TokenKind::LParen {
            let token = self.next();
            return Err(self.err("create the object with (), i got", &token));
        }
        self.next();
        let mut parents = Vec::new();
        self.comma_list(TokenKind::RParen, |p| {
            parents.push(p.expect_id_token("expected inheritance parent identifier, but there is")?);
            Ok(())
        })?;
        object.parents = parents;

        self.expect(TokenKind::Colon, "expected a ':' but instead encountered")?;
        self.expect(TokenKind::EndLine, "expected a newline, there is")?;
        self.expect(TokenKind::Indent, "expected indentation but instead there's")?;

        self.parse_object_body(&mut object)?;

        Ok(object)
    }

    fn parse_object_body(&mut self, object: &mut AstObject) -> Result<()> {
        loop {
            match self.peek_kind() {
                TokenKind::Dedent => {
                    self.next();
                    return Ok(());
                }
                TokenKind::EndFile => return Ok(()),
                TokenKind::EndLine => {
                    self.next();
                }
                TokenKind::Pass | TokenKind::Ellipsis => {
                    self.next();
                    let end = self.next();
                    if !end.kind.is_endmarker() {
                        return Err(self.err("expected newline after pass or '...', but got", &end));
                    }
                }
                TokenKind::Id => {
                    let first = self.next();
                    let name = self.id_token_from(first);
                    match self.peek_kind() {
                        TokenKind::LAngle | TokenKind::LBracket | TokenKind::LParen => {
                            if name.components().len() != 1 {
                                return Err(NyanError::Parse(LangError::new(
                                    name.location(),
                                    "nested object names cannot be dotted",
                                )));
                            }
                            let name_token = name.components()[0].clone();
                            object.objects.push(self.parse_object(name_token)?);
                        }
                        TokenKind::Colon | TokenKind::At | TokenKind::Operator => {
                            object.members.push(self.parse_member(name)?);
                        }
                        _ => {
                            let token = self.next();
                            return Err(self.err(
                                "could not identify member or nested object definition after",
                                &token,
                            ));
                        }
                    }
                }
                _ => {
                    let token = self.next();
                    return Err(
                        self.err("expected member or object identifier, instead got", &token)
                    );
                }
            }
        }
    }

    fn parse_member(&mut self, name: IdToken) -> Result<AstMember> {
        let mut member = AstMember {
            name,
            override_depth: 0,
            operation: None,
            member_type: None,
            value: None,
        };

        if self.peek_kind() == TokenKind::Colon {
            self.next();
            let type_name = self.next();
            if type_name.kind != TokenKind::Id {
                return Err(self.err("expected type name, instead got", &type_name));
            }
            member.member_type = Some(self.parse_member_type(type_name)?);
        }

        while self.peek_kind() == TokenKind::At {
            self.next();
            member.override_depth += 1;
        }

        if self.peek_kind() == TokenKind::Operator {
            let op_token = self.next();
            let Some(operation) = Operator::from_str(op_token.get()) else {
                return Err(self.err("invalid operation", &op_token));
            };
            member.operation = Some(operation);
            member.value = Some(self.parse_member_value()?);
        }

        if member.member_type.is_none() && member.operation.is_none() {
            let token = self.next();
            return Err(self.err(
                "expected type declaration ( : type ) or value ( = something ), instead got",
                &token,
            ));
        }
        if member.override_depth > 0 && member.operation.is_none() {
            return Err(NyanError::Parse(LangError::new(
                member.name.location(),
                "override sigils require an operator and value",
            )));
        }

        let end = self.next();
        if !end.kind.is_endmarker() {
            return Err(self.err("expected newline after member entry, but got", &end));
        }

        Ok(member)
    }

    fn parse_member_type(&mut self, name: Token) -> Result<AstMemberType> {
        let name = self.id_token_from(name);
        let mut nested = Vec::new();
        if self.peek_kind() == TokenKind::LParen {
            self.next();
            self.comma_list(TokenKind::RParen, |p| {
                let inner = p.next();
                if inner.kind != TokenKind::Id {
                    return Err(p.err("expected nested type name, instead got", &inner));
                }
                nested.push(p.parse_member_type(inner)?);
                Ok(())
            })?;
        }
        Ok(AstMemberType { name, nested })
    }

    /// A single value component: an identifier or literal token.
    fn parse_value_component(&mut self) -> Result<IdToken> {
        let token = self.next();
        if !token.kind.is_content() {
            return Err(self.err("expected value, have", &token));
        }
        if token.kind == TokenKind::Id {
            Ok(self.id_token_from(token))
        } else {
            Ok(IdToken::from_parts(vec![token]))
        }
    }

    fn parse_member_value(&mut self) -> Result<AstMemberValue> {
        // `o{...}` is an orderedset literal
        if self.peek_kind() == TokenKind::Id
            && self.peek().get() == "o"
            && self.peek_at(1).map(|t| t.kind) == Some(TokenKind::LBrace)
        {
            self.next();
            self.next();
            return self.parse_container(AstContainer::OrderedSet);
        }

        if self.peek_kind() == TokenKind::LBrace {
            // a `{` opens a set or a dict; a colon before the first comma
            // or closing brace decides
            let kind = self.container_lookahead();
            self.next();
            return self.parse_container(kind);
        }

        Ok(AstMemberValue::Single(ValueToken::single(
            self.parse_value_component()?,
        )))
    }

    fn container_lookahead(&self) -> AstContainer {
        let mut offset = 1;
        while let Some(token) = self.peek_at(offset) {
            match token.kind {
                TokenKind::Colon => return AstContainer::Dict,
                TokenKind::Comma | TokenKind::RBrace => return AstContainer::Set,
                _ => offset += 1,
            }
        }
        AstContainer::Set
    }

    fn parse_container(&mut self, kind: AstContainer) -> Result<AstMemberValue> {
        let mut items = Vec::new();
        self.comma_list(TokenKind::RBrace, |p| {
            let entry = match kind {
                AstContainer::Set | AstContainer::OrderedSet => {
                    ValueToken::single(p.parse_value_component()?)
                }
                AstContainer::Dict => {
                    let key = p.parse_value_component()?;
                    p.expect(TokenKind::Colon, "expected colon, but got")?;
                    let value = p.parse_value_component()?;
                    ValueToken::pair(key, value)
                }
            };
            items.push(entry);
            Ok(())
        })?;
        Ok(AstMemberValue::Container { kind, items })
    }

    fn parse_inheritance_change(&mut self) -> Result<AstInheritanceChange> {
        let mut leading = false;
        if self.peek_kind() == TokenKind::Operator {
            let token = self.next();
            if token.get() != "+" {
                return Err(self.err("unsupported inheritance change operator", &token));
            }
            leading = true;
        }

        let target = self.expect_id_token("expected inheritance operator or identifier, there is")?;

        let mut trailing = false;
        if self.peek_kind() == TokenKind::Operator {
            let token = self.next();
            if token.get() != "+" {
                return Err(self.err("unsupported inheritance change operator", &token));
            }
            if leading {
                return Err(self.err("inheritance modifier already had operator at front", &token));
            }
            trailing = true;
        }

        if !leading && !trailing {
            return Err(NyanError::Parse(LangError::new(
                target.location(),
                "inheritance change is missing operator",
            )));
        }

        Ok(AstInheritanceChange {
            direction: if leading {
                InheritanceDirection::AddFront
            } else {
                InheritanceDirection::AddBack
            },
            target,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::file::SourceFile;
    use crate::lexer::tokenize;
    use assert_matches::assert_matches;
    use std::sync::Arc;

    fn parse(src: &str) -> Ast {
        let file = Arc::new(SourceFile::new("test.nyan", src));
        Ast::parse(tokenize(&file).expect("tokenize")).expect("parse")
    }

    fn parse_err(src: &str) -> NyanError {
        let file = Arc::new(SourceFile::new("test.nyan", src));
        Ast::parse(tokenize(&file).expect("tokenize")).expect_err("expected parse error")
    }

    #[test]
    fn object_with_member() {
        let ast = parse("A():\n    x : int = 3\n");
        assert_eq!(ast.objects.len(), 1);
        let obj = &ast.objects[0];
        assert_eq!(obj.name.get(), "A");
        assert_eq!(obj.members.len(), 1);
        let member = &obj.members[0];
        assert_eq!(member.name.str(), "x");
        assert_eq!(member.operation, Some(Operator::Assign));
        assert!(member.member_type.is_some());
    }

    #[test]
    fn imports_and_aliases() {
        let ast = parse("import a.b\nimport c.d as shorthand\nA():\n    pass\n");
        assert_eq!(ast.imports.len(), 2);
        assert!(ast.imports[0].alias.is_none());
        assert_eq!(
            ast.imports[1].alias.as_ref().map(|t| t.get()),
            Some("shorthand")
        );
    }

    #[test]
    fn patch_with_target_and_inheritance() {
        let ast = parse("AP<a.b.A>[+P, Q+]():\n    x = 99\n");
        let obj = &ast.objects[0];
        assert_eq!(obj.target.as_ref().map(|t| t.str()), Some("a.b.A".into()));
        assert_eq!(obj.inheritance_changes.len(), 2);
        assert_eq!(
            obj.inheritance_changes[0].direction,
            InheritanceDirection::AddFront
        );
        assert_eq!(
            obj.inheritance_changes[1].direction,
            InheritanceDirection::AddBack
        );
    }

    #[test]
    fn nested_objects() {
        let ast = parse("A():\n    B():\n        pass\n    x : int = 1\n");
        let obj = &ast.objects[0];
        assert_eq!(obj.objects.len(), 1);
        assert_eq!(obj.objects[0].name.get(), "B");
        assert_eq!(obj.members.len(), 1);
    }

    #[test]
    fn container_literals() {
        let ast = parse(
            "A():\n    s : set(int) = {1, 2}\n    os : orderedset(int) = o{3, 4}\n    d : dict(text, int) = {\"k\": 5}\n    e : set(int) = {}\n",
        );
        let members = &ast.objects[0].members;
        assert_matches!(
            members[0].value,
            Some(AstMemberValue::Container {
                kind: AstContainer::Set,
                ..
            })
        );
        assert_matches!(
            members[1].value,
            Some(AstMemberValue::Container {
                kind: AstContainer::OrderedSet,
                ..
            })
        );
        assert_matches!(
            members[2].value,
            Some(AstMemberValue::Container {
                kind: AstContainer::Dict,
                ..
            })
        );
        assert_matches!(
            members[3].value,
            Some(AstMemberValue::Container {
                kind: AstContainer::Set,
                ref items,
            }) if items.is_empty()
        );
    }

    #[test]
    fn override_depth() {
        let ast = parse("A():\n    x @@= 9\n");
        assert_eq!(ast.objects[0].members[0].override_depth, 2);
    }

    #[test]
    fn version_argument() {
        let ast = parse("!version 2\nA():\n    pass\n");
        assert_eq!(ast.args.len(), 1);
        assert_eq!(ast.args[0].arg.str(), "version");
    }

    #[test]
    fn non_version_first_argument_is_rejected() {
        assert_matches!(parse_err("!other 2\nA():\n    pass\n"), NyanError::Parse(_));
    }

    #[test]
    fn member_without_type_or_value_is_rejected() {
        assert_matches!(parse_err("A():\n    x\n"), NyanError::Parse(_));
    }

    #[test]
    fn object_without_parens_is_rejected() {
        assert_matches!(parse_err("A:\n    pass\n"), NyanError::Parse(_));
    }
}
