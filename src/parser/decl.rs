/*
Copyright 2025 The zedc Authors

Licensed under the Apache License, Version 2.0 (the "License");
you may not use this file except in compliance with the License.
You may obtain a copy of the License at

    http://www.apache.org/licenses/LICENSE-2.0

Unless required by applicable law or agreed to in writing, software
distributed under the License is distributed on an "AS IS" BASIS,
WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
See the License for the specific language governing permissions and
limitations under the License.
*/

use super::Parser;
use crate::ast::*;
use crate::errors::CompileError;
use crate::lexer::TokenKind;

impl<'t> Parser<'t> {
    /// Declaration specifiers: an ordered, heterogeneous list of storage
    /// classes, type qualifiers, function specifiers, type specifiers and
    /// attribute specifiers.
    ///
    /// Once a type specifier has been seen, parsing stops before the next
    /// identifier so that it can begin a declarator. A configurable number of
    /// extra identifiers is tolerated to accommodate macro decoration tokens.
    pub(crate) fn parse_decl_specs(&mut self) -> Result<DeclSpecs, CompileError> {
        let mut specs = DeclSpecs::default();
        let mut seen_type = false;
        let mut extra_idents = 0;

        loop {
            match self.peek_kind() {
                TokenKind::KwAuto
                | TokenKind::KwExtern
                | TokenKind::KwRegister
                | TokenKind::KwStatic
                | TokenKind::KwTypedef => {
                    specs.items.push(DeclSpec::StorageClass(self.bump()));
                }
                TokenKind::KwConst | TokenKind::KwRestrict | TokenKind::KwVolatile => {
                    specs.items.push(DeclSpec::TypeQual(self.bump()));
                }
                TokenKind::KwInline => {
                    specs.items.push(DeclSpec::FuncSpec(self.bump()));
                }
                TokenKind::KwVoid
                | TokenKind::KwChar
                | TokenKind::KwShort
                | TokenKind::KwInt
                | TokenKind::KwInt128
                | TokenKind::KwLong
                | TokenKind::KwSigned
                | TokenKind::KwUnsigned
                | TokenKind::KwFloat
                | TokenKind::KwDouble => {
                    specs.items.push(DeclSpec::TypeSpec(TypeSpec::Basic(self.bump())));
                    seen_type = true;
                }
                TokenKind::KwStruct | TokenKind::KwUnion => {
                    let record = self.parse_record_spec()?;
                    specs.items.push(DeclSpec::TypeSpec(TypeSpec::Record(record)));
                    seen_type = true;
                }
                TokenKind::KwEnum => {
                    let spec = self.parse_enum_spec()?;
                    specs.items.push(DeclSpec::TypeSpec(TypeSpec::Enum(spec)));
                    seen_type = true;
                }
                TokenKind::KwAttribute => {
                    let attr = self.parse_attr_spec()?;
                    specs.items.push(DeclSpec::Attr(attr));
                }
                TokenKind::Ident => {
                    if seen_type {
                        if extra_idents >= self.extra_type_idents() {
                            break;
                        }
                        extra_idents += 1;
                    }
                    specs.items.push(DeclSpec::TypeSpec(TypeSpec::Name(self.bump())));
                    seen_type = true;
                }
                _ => break,
            }
        }

        if specs.items.is_empty() {
            return Err(self.err("declaration specifiers"));
        }
        Ok(specs)
    }

    /// `struct` / `union` specifier with optional attribute list, optional
    /// tag and optional member body.
    fn parse_record_spec(&mut self) -> Result<RecordSpec, CompileError> {
        let kw = self.bump();
        let is_union = kw.kind == TokenKind::KwUnion;

        let mut attrs = Vec::new();
        while self.peek_kind() == TokenKind::KwAttribute {
            attrs.push(self.parse_attr_spec()?);
        }

        let name = match self.peek_kind() {
            TokenKind::Ident => Some(self.bump()),
            _ => None,
        };

        let members = if self.eat(TokenKind::LBrace) {
            let mut members = Vec::new();
            while !self.eat(TokenKind::RBrace) {
                members.push(self.parse_record_member()?);
            }
            Some(members)
        } else {
            None
        };

        if name.is_none() && members.is_none() {
            return Err(self.err("struct/union tag or body"));
        }

        Ok(RecordSpec {
            is_union,
            name,
            attrs,
            members,
        })
    }

    /// A member declaration is first tried as an ordinary
    /// specifier-qualifier + declarator list and, if that fails, as a
    /// macro-based declaration; on a second failure the first error is
    /// reported.
    fn parse_record_member(&mut self) -> Result<RecordMember, CompileError> {
        let mut sub = self.fork_silent();
        let first_err = match sub.parse_record_field() {
            Ok(member) => {
                self.commit(&sub);
                return Ok(member);
            }
            Err(err) => err,
        };

        let mut sub = self.fork_silent();
        match sub.parse_macro_member() {
            Ok(call) => {
                self.commit(&sub);
                Ok(RecordMember::Macro(call))
            }
            Err(_) => Err(first_err),
        }
    }

    fn parse_record_field(&mut self) -> Result<RecordMember, CompileError> {
        let specs = self.parse_decl_specs()?;

        // An anonymous member: the specifier is itself a record and no
        // declarator follows.
        if self.peek_kind() == TokenKind::Semicolon {
            let record = specs.items.iter().find_map(|item| match item {
                DeclSpec::TypeSpec(ts @ TypeSpec::Record(_)) => Some(ts.clone()),
                _ => None,
            });
            if let Some(record) = record {
                self.bump();
                return Ok(RecordMember::Anonymous(record));
            }
            return Err(self.err("declarator"));
        }

        let mut decls = Vec::new();
        decls.push(self.parse_declarator(false)?);
        while self.eat(TokenKind::Comma) {
            decls.push(self.parse_declarator(false)?);
        }
        self.expect(TokenKind::Semicolon, "';'")?;

        // A lone unknown identifier followed by a parenthesized declarator
        // is indistinguishable from a macro invocation; reject it here so
        // the macro reading gets its turn.
        if Self::looks_like_macro_call(&specs, &decls) {
            return Err(self.err("member declaration"));
        }

        Ok(RecordMember::Field(specs, decls))
    }

    pub(crate) fn looks_like_macro_call(specs: &DeclSpecs, decls: &[Declarator]) -> bool {
        specs.items.len() == 1
            && matches!(specs.items[0], DeclSpec::TypeSpec(TypeSpec::Name(_)))
            && decls.len() == 1
            && matches!(decls[0], Declarator::Paren(_))
    }

    fn parse_macro_member(&mut self) -> Result<Expr, CompileError> {
        let name = self.expect(TokenKind::Ident, "identifier")?;
        let call = self.parse_call_suffix(Expr::Ident(name))?;
        self.expect(TokenKind::Semicolon, "';'")?;
        Ok(call)
    }

    /// `enum` specifier with optional tag and optional element body.
    fn parse_enum_spec(&mut self) -> Result<EnumSpec, CompileError> {
        self.bump();

        let name = match self.peek_kind() {
            TokenKind::Ident => Some(self.bump()),
            _ => None,
        };

        let elems = if self.eat(TokenKind::LBrace) {
            let mut elems = Vec::new();
            while !self.eat(TokenKind::RBrace) {
                let name = self.expect(TokenKind::Ident, "enumerator")?;
                let value = if self.eat(TokenKind::Assign) {
                    Some(self.parse_assign_expr()?)
                } else {
                    None
                };
                elems.push(EnumElem { name, value });
                if !self.eat(TokenKind::Comma) {
                    self.expect(TokenKind::RBrace, "'}'")?;
                    break;
                }
            }
            Some(elems)
        } else {
            None
        };

        if name.is_none() && elems.is_none() {
            return Err(self.err("enum tag or body"));
        }

        Ok(EnumSpec { name, elems })
    }

    /// `__attribute__((name(args), ...))`
    fn parse_attr_spec(&mut self) -> Result<AttrSpec, CompileError> {
        self.expect(TokenKind::KwAttribute, "'__attribute__'")?;
        self.expect(TokenKind::LParen, "'('")?;
        self.expect(TokenKind::LParen, "'('")?;

        let mut attrs = Vec::new();
        if self.peek_kind() != TokenKind::RParen {
            loop {
                let name = self.expect(TokenKind::Ident, "attribute name")?;
                let mut args = Vec::new();
                if self.eat(TokenKind::LParen) {
                    if self.peek_kind() != TokenKind::RParen {
                        args.push(self.parse_assign_expr()?);
                        while self.eat(TokenKind::Comma) {
                            args.push(self.parse_assign_expr()?);
                        }
                    }
                    self.expect(TokenKind::RParen, "')'")?;
                }
                attrs.push(Attr { name, args });
                if !self.eat(TokenKind::Comma) {
                    break;
                }
            }
        }

        self.expect(TokenKind::RParen, "')'")?;
        self.expect(TokenKind::RParen, "')'")?;
        Ok(AttrSpec { attrs })
    }

    /// Declarator descent, layered pointer → function/array suffixes →
    /// parenthesized → identifier. Abstract declarators are only accepted
    /// when `allow_abstract` is set.
    pub(crate) fn parse_declarator(
        &mut self,
        allow_abstract: bool,
    ) -> Result<Declarator, CompileError> {
        if self.eat(TokenKind::Star) {
            let mut quals = Vec::new();
            while matches!(
                self.peek_kind(),
                TokenKind::KwConst | TokenKind::KwRestrict | TokenKind::KwVolatile
            ) {
                quals.push(self.bump());
            }
            let inner = self.parse_declarator(allow_abstract)?;
            return Ok(Declarator::Ptr(quals, Box::new(inner)));
        }

        let mut decl = self.parse_direct_base(allow_abstract)?;

        loop {
            match self.peek_kind() {
                TokenKind::LParen => {
                    let (params, variadic) = self.parse_params()?;
                    decl = Declarator::Func(Box::new(decl), params, variadic);
                }
                TokenKind::LBracket => {
                    self.bump();
                    let size = if self.peek_kind() == TokenKind::RBracket {
                        None
                    } else {
                        Some(Box::new(self.parse_expr()?))
                    };
                    self.expect(TokenKind::RBracket, "']'")?;
                    decl = Declarator::Array(Box::new(decl), size);
                }
                _ => break,
            }
        }

        Ok(decl)
    }

    fn parse_direct_base(&mut self, allow_abstract: bool) -> Result<Declarator, CompileError> {
        match self.peek_kind() {
            TokenKind::Ident => Ok(Declarator::Ident(self.bump())),
            TokenKind::LParen => {
                // A parenthesized declarator or the start of a function
                // suffix on an abstract base; try the declarator reading
                // silently first.
                let mut sub = self.fork_silent();
                sub.bump();
                if let Ok(inner) = sub.parse_declarator(allow_abstract) {
                    if !matches!(inner, Declarator::None) && sub.eat(TokenKind::RParen) {
                        self.commit(&sub);
                        return Ok(Declarator::Paren(Box::new(inner)));
                    }
                }
                if allow_abstract {
                    Ok(Declarator::None)
                } else {
                    Err(self.err("declarator"))
                }
            }
            _ => {
                if allow_abstract {
                    Ok(Declarator::None)
                } else {
                    Err(self.err("declarator"))
                }
            }
        }
    }

    /// Parameter list including the `(void)` form and a trailing ellipsis.
    fn parse_params(&mut self) -> Result<(Vec<ParamDecl>, bool), CompileError> {
        self.expect(TokenKind::LParen, "'('")?;

        if self.eat(TokenKind::RParen) {
            return Ok((Vec::new(), false));
        }
        if self.peek_kind() == TokenKind::KwVoid && self.peek2_kind() == TokenKind::RParen {
            self.bump();
            self.bump();
            return Ok((Vec::new(), false));
        }

        let mut params = Vec::new();
        let mut variadic = false;
        loop {
            if self.eat(TokenKind::Ellipsis) {
                variadic = true;
                break;
            }
            let specs = self.parse_decl_specs()?;
            let decl = self.parse_declarator(true)?;
            params.push(ParamDecl { specs, decl });
            if !self.eat(TokenKind::Comma) {
                break;
            }
        }

        self.expect(TokenKind::RParen, "')'")?;
        Ok((params, variadic))
    }

    /// A type name: specifier-qualifier list plus an abstract declarator, as
    /// used by casts, compound literals and sizeof.
    pub(crate) fn parse_type_name(&mut self) -> Result<TypeName, CompileError> {
        let specs = self.parse_decl_specs()?;
        if !specs.has_type_spec() {
            return Err(self.err("type specifier"));
        }
        let decl = self.parse_declarator(true)?;
        if decl.ident().is_some() {
            return Err(self.err("abstract declarator"));
        }
        Ok(TypeName { specs, decl })
    }

    pub(crate) fn parse_opt_initializer(&mut self) -> Result<Option<Init>, CompileError> {
        if self.eat(TokenKind::Assign) {
            Ok(Some(self.parse_initializer()?))
        } else {
            Ok(None)
        }
    }

    fn parse_initializer(&mut self) -> Result<Init, CompileError> {
        if self.peek_kind() == TokenKind::LBrace {
            Ok(Init::List(self.parse_init_list()?))
        } else {
            Ok(Init::Expr(Box::new(self.parse_assign_expr()?)))
        }
    }

    pub(crate) fn parse_init_list(&mut self) -> Result<InitList, CompileError> {
        self.expect(TokenKind::LBrace, "'{'")?;
        let mut inits = Vec::new();
        while !self.eat(TokenKind::RBrace) {
            inits.push(self.parse_initializer()?);
            if !self.eat(TokenKind::Comma) {
                self.expect(TokenKind::RBrace, "'}'")?;
                break;
            }
        }
        Ok(InitList { inits })
    }
}

// ------------- unit tests -------------
