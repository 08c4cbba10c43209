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

mod decl;
mod expr;
mod stmt;

use crate::ast::*;
use crate::errors::CompileError;
use crate::lexer::{Token, TokenKind, TokenSource};

/// Recursive-descent parser over a token cursor.
///
/// Ambiguous grammar forks are resolved with silent sub-parsers: `fork_silent`
/// clones the cursor cheaply, the alternative is attempted on the clone, and
/// on success the main parser adopts the clone's position via `commit`. Errors
/// from a rejected alternative are dropped by the caller, so only the path
/// that finally fails produces the reported diagnostic.
pub struct Parser<'t> {
    src: TokenSource<'t>,
    // identifiers tolerated in specifier position after a type specifier,
    // to accommodate macro decoration tokens
    extra_type_idents: usize,
}

/// Parse a translation unit into a module AST.
pub fn parse_module(tokens: &[Token]) -> Result<Module, CompileError> {
    parse_module_config(tokens, 0)
}

/// Same as [`parse_module`] with a configurable allowance of extra
/// identifiers in declaration-specifier position.
pub fn parse_module_config(
    tokens: &[Token],
    extra_type_idents: usize,
) -> Result<Module, CompileError> {
    let mut parser = Parser::new(tokens, extra_type_idents);
    parser.parse_module()
}

impl<'t> Parser<'t> {
    pub fn new(tokens: &'t [Token], extra_type_idents: usize) -> Self {
        Parser {
            src: TokenSource::new(tokens),
            extra_type_idents,
        }
    }

    // --- cursor primitives ---

    pub(crate) fn peek(&self) -> &'t Token {
        self.src.read()
    }

    pub(crate) fn peek_kind(&self) -> TokenKind {
        self.src.read().kind
    }

    pub(crate) fn peek2_kind(&self) -> TokenKind {
        self.src.read_second().kind
    }

    pub(crate) fn bump(&mut self) -> Token {
        self.src.next().clone()
    }

    pub(crate) fn eat(&mut self, kind: TokenKind) -> bool {
        if self.peek_kind() == kind {
            self.src.next();
            return true;
        }
        false
    }

    pub(crate) fn expect(&mut self, kind: TokenKind, expected: &str) -> Result<Token, CompileError> {
        if self.peek_kind() == kind {
            Ok(self.bump())
        } else {
            Err(self.err(expected))
        }
    }

    /// Single-line diagnostic naming the unexpected token.
    pub(crate) fn err(&self, expected: &str) -> CompileError {
        let tok = self.peek();
        let text = match tok.kind {
            TokenKind::Eof => "<eof>".to_string(),
            _ => tok.text.clone(),
        };
        CompileError::SyntaxError {
            line: tok.span.line,
            col: tok.span.col,
            token: text,
            expected: expected.to_string(),
        }
    }

    // --- silent sub-parser mechanics ---

    pub(crate) fn fork_silent(&self) -> Parser<'t> {
        Parser {
            src: self.src,
            extra_type_idents: self.extra_type_idents,
        }
    }

    pub(crate) fn commit(&mut self, sub: &Parser<'t>) {
        self.src = sub.src;
    }

    pub(crate) fn extra_type_idents(&self) -> usize {
        self.extra_type_idents
    }

    // --- module level ---

    fn parse_module(&mut self) -> Result<Module, CompileError> {
        let mut module = Module::default();
        while self.peek_kind() != TokenKind::Eof {
            module.decls.push(self.parse_global_decl()?);
        }
        Ok(module)
    }

    /// A global declaration: function definition, ordinary declaration, or a
    /// macro-based declaration such as `LIST_INIT(foo);`.
    fn parse_global_decl(&mut self) -> Result<GlobalDecl, CompileError> {
        // A lone call-shaped construct with no preceding specifiers is a
        // global macro declaration.
        if self.peek_kind() == TokenKind::Ident && self.peek2_kind() == TokenKind::LParen {
            let mut sub = self.fork_silent();
            if let Ok(call) = sub.parse_macro_decl() {
                self.commit(&sub);
                return Ok(GlobalDecl::Macro(call));
            }
        }

        let specs = self.parse_decl_specs()?;

        // `struct foo { ... };` and friends carry no declarator
        if self.eat(TokenKind::Semicolon) {
            return Ok(GlobalDecl::Decl(Declaration {
                specs,
                decls: Vec::new(),
            }));
        }

        let first = self.parse_declarator(false)?;

        if first.is_function() && self.peek_kind() == TokenKind::LBrace {
            let body = self.parse_braced_block()?;
            return Ok(GlobalDecl::FuncDef {
                specs,
                decl: first,
                body,
            });
        }

        let mut decls = Vec::new();
        let init = self.parse_opt_initializer()?;
        decls.push(InitDeclarator { decl: first, init });
        while self.eat(TokenKind::Comma) {
            let decl = self.parse_declarator(false)?;
            let init = self.parse_opt_initializer()?;
            decls.push(InitDeclarator { decl, init });
        }
        self.expect(TokenKind::Semicolon, "';'")?;
        Ok(GlobalDecl::Decl(Declaration { specs, decls }))
    }

    fn parse_macro_decl(&mut self) -> Result<Expr, CompileError> {
        let name = self.expect(TokenKind::Ident, "identifier")?;
        let call = self.parse_call_suffix(Expr::Ident(name))?;
        self.expect(TokenKind::Semicolon, "';'")?;
        Ok(call)
    }
}

// ------------- unit tests -------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lexer::lex;

    pub(crate) fn parse(source: &str) -> Result<Module, CompileError> {
        let toks = lex(source);
        parse_module(&toks)
    }

    #[test]
    fn test_parse_empty_module() {
        let module = parse("").unwrap();
        assert!(module.decls.is_empty());
    }

    #[test]
    fn test_parse_global_variable() {
        let module = parse("int x;").unwrap();
        assert_eq!(module.decls.len(), 1);
        match &module.decls[0] {
            GlobalDecl::Decl(decl) => {
                assert_eq!(decl.decls.len(), 1);
                assert_eq!(decl.decls[0].decl.ident().unwrap().text, "x");
            }
            other => panic!("expected declaration, got {:?}", other),
        }
    }

    #[test]
    fn test_parse_function_definition() {
        let module = parse("int f(void) { return 0; }").unwrap();
        assert_eq!(module.decls.len(), 1);
        match &module.decls[0] {
            GlobalDecl::FuncDef { decl, body, .. } => {
                assert_eq!(decl.ident().unwrap().text, "f");
                assert!(body.braced);
                assert_eq!(body.stmts.len(), 1);
            }
            other => panic!("expected function definition, got {:?}", other),
        }
    }

    #[test]
    fn test_parse_global_macro_decl() {
        let module = parse("LIST_INIT(queue);").unwrap();
        match &module.decls[0] {
            GlobalDecl::Macro(Expr::Call(callee, args)) => {
                assert!(matches!(**callee, Expr::Ident(ref t) if t.text == "LIST_INIT"));
                assert_eq!(args.len(), 1);
            }
            other => panic!("expected macro declaration, got {:?}", other),
        }
    }

    #[test]
    fn test_parse_multiple_declarators() {
        let module = parse("int a, *b, c[4];").unwrap();
        match &module.decls[0] {
            GlobalDecl::Decl(decl) => assert_eq!(decl.decls.len(), 3),
            other => panic!("expected declaration, got {:?}", other),
        }
    }

    #[test]
    fn test_parse_error_reports_token() {
        let err = parse("int x = ;").unwrap_err();
        match err {
            CompileError::SyntaxError { token, .. } => assert_eq!(token, ";"),
            other => panic!("expected syntax error, got {:?}", other),
        }
    }

    #[test]
    fn test_reparse_is_isomorphic() {
        let source = "int f(int a) { if (a) return 1; return 0; } char g;";
        let first = parse(source).unwrap();
        let second = parse(source).unwrap();
        assert_eq!(first, second);
    }
}
