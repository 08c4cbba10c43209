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
    /// `{ ... }` block.
    pub(crate) fn parse_braced_block(&mut self) -> Result<Block, CompileError> {
        self.expect(TokenKind::LBrace, "'{'")?;
        let mut stmts = Vec::new();
        while !self.eat(TokenKind::RBrace) {
            stmts.push(self.parse_stmt()?);
        }
        Ok(Block {
            braced: true,
            stmts,
        })
    }

    /// A statement body that may or may not be braced, as after `if` or
    /// `while`.
    fn parse_body(&mut self) -> Result<Block, CompileError> {
        if self.peek_kind() == TokenKind::LBrace {
            return self.parse_braced_block();
        }
        let stmt = self.parse_stmt()?;
        Ok(Block {
            braced: false,
            stmts: vec![stmt],
        })
    }

    pub(crate) fn parse_stmt(&mut self) -> Result<Stmt, CompileError> {
        match self.peek_kind() {
            TokenKind::LBrace => Ok(Stmt::Block(self.parse_braced_block()?)),
            TokenKind::Semicolon => {
                self.bump();
                Ok(Stmt::Null)
            }
            TokenKind::KwIf => self.parse_if_stmt(),
            TokenKind::KwWhile => self.parse_while_stmt(),
            TokenKind::KwDo => self.parse_do_while_stmt(),
            TokenKind::KwFor => self.parse_for_stmt(),
            TokenKind::KwSwitch => self.parse_switch_stmt(),
            TokenKind::KwReturn => {
                self.bump();
                let value = if self.peek_kind() == TokenKind::Semicolon {
                    None
                } else {
                    Some(self.parse_expr()?)
                };
                self.expect(TokenKind::Semicolon, "';'")?;
                Ok(Stmt::Return(value))
            }
            TokenKind::KwBreak => {
                self.bump();
                self.expect(TokenKind::Semicolon, "';'")?;
                Ok(Stmt::Break)
            }
            TokenKind::KwContinue => {
                self.bump();
                self.expect(TokenKind::Semicolon, "';'")?;
                Ok(Stmt::Continue)
            }
            TokenKind::KwGoto => {
                self.bump();
                let target = self.expect(TokenKind::Ident, "label")?;
                self.expect(TokenKind::Semicolon, "';'")?;
                Ok(Stmt::Goto(target))
            }
            TokenKind::KwCase => {
                self.bump();
                let value = self.parse_expr()?;
                self.expect(TokenKind::Colon, "':'")?;
                Ok(Stmt::Case(value))
            }
            TokenKind::KwDefault => {
                self.bump();
                self.expect(TokenKind::Colon, "':'")?;
                Ok(Stmt::Default)
            }
            TokenKind::KwAsm => self.parse_asm_stmt(),
            TokenKind::Ident if self.peek2_kind() == TokenKind::Colon => {
                let label = self.bump();
                self.bump();
                Ok(Stmt::Label(label))
            }
            _ => self.parse_decl_or_expr_stmt(),
        }
    }

    fn parse_if_stmt(&mut self) -> Result<Stmt, CompileError> {
        self.bump();
        self.expect(TokenKind::LParen, "'('")?;
        let cond = self.parse_expr()?;
        self.expect(TokenKind::RParen, "')'")?;
        let then_block = self.parse_body()?;

        let mut elifs = Vec::new();
        let mut else_block = None;
        while self.eat(TokenKind::KwElse) {
            if self.eat(TokenKind::KwIf) {
                self.expect(TokenKind::LParen, "'('")?;
                let elif_cond = self.parse_expr()?;
                self.expect(TokenKind::RParen, "')'")?;
                elifs.push((elif_cond, self.parse_body()?));
            } else {
                else_block = Some(self.parse_body()?);
                break;
            }
        }

        Ok(Stmt::If {
            cond,
            then_block,
            elifs,
            else_block,
        })
    }

    fn parse_while_stmt(&mut self) -> Result<Stmt, CompileError> {
        self.bump();
        self.expect(TokenKind::LParen, "'('")?;
        let cond = self.parse_expr()?;
        self.expect(TokenKind::RParen, "')'")?;
        let body = self.parse_body()?;
        Ok(Stmt::While { cond, body })
    }

    fn parse_do_while_stmt(&mut self) -> Result<Stmt, CompileError> {
        self.bump();
        let body = self.parse_body()?;
        self.expect(TokenKind::KwWhile, "'while'")?;
        self.expect(TokenKind::LParen, "'('")?;
        let cond = self.parse_expr()?;
        self.expect(TokenKind::RParen, "')'")?;
        self.expect(TokenKind::Semicolon, "';'")?;
        Ok(Stmt::DoWhile { body, cond })
    }

    fn parse_for_stmt(&mut self) -> Result<Stmt, CompileError> {
        self.bump();
        self.expect(TokenKind::LParen, "'('")?;

        let init = if self.eat(TokenKind::Semicolon) {
            ForInit::None
        } else {
            // declaration or expression; the declaration reading is tried
            // silently first
            let mut sub = self.fork_silent();
            match sub.parse_local_decl() {
                Ok(decl) => {
                    self.commit(&sub);
                    ForInit::Decl(decl)
                }
                Err(_) => {
                    let expr = self.parse_expr()?;
                    self.expect(TokenKind::Semicolon, "';'")?;
                    ForInit::Expr(expr)
                }
            }
        };

        let cond = if self.peek_kind() == TokenKind::Semicolon {
            None
        } else {
            Some(self.parse_expr()?)
        };
        self.expect(TokenKind::Semicolon, "';'")?;

        let step = if self.peek_kind() == TokenKind::RParen {
            None
        } else {
            Some(self.parse_expr()?)
        };
        self.expect(TokenKind::RParen, "')'")?;

        let body = self.parse_body()?;
        Ok(Stmt::For {
            init,
            cond,
            step,
            body,
        })
    }

    fn parse_switch_stmt(&mut self) -> Result<Stmt, CompileError> {
        self.bump();
        self.expect(TokenKind::LParen, "'('")?;
        let cond = self.parse_expr()?;
        self.expect(TokenKind::RParen, "')'")?;
        let body = self.parse_body()?;
        Ok(Stmt::Switch { cond, body })
    }

    /// GCC-style inline assembly:
    /// `asm [volatile] [goto] ( template [: outputs [: inputs [: clobbers
    /// [: labels]]]] ) ;`
    fn parse_asm_stmt(&mut self) -> Result<Stmt, CompileError> {
        self.bump();

        let mut is_volatile = false;
        let mut is_goto = false;
        loop {
            if self.peek_kind() == TokenKind::KwVolatile {
                self.bump();
                is_volatile = true;
            } else if self.peek_kind() == TokenKind::KwGoto {
                self.bump();
                is_goto = true;
            } else {
                break;
            }
        }

        self.expect(TokenKind::LParen, "'('")?;
        let template = self.parse_concat_expr()?;

        let mut outputs = Vec::new();
        let mut inputs = Vec::new();
        let mut clobbers = Vec::new();
        let mut labels = Vec::new();

        if self.eat(TokenKind::Colon) {
            self.parse_asm_operands(&mut outputs)?;
            if self.eat(TokenKind::Colon) {
                self.parse_asm_operands(&mut inputs)?;
                if self.eat(TokenKind::Colon) {
                    if self.peek_kind() == TokenKind::StrLit {
                        clobbers.push(self.parse_concat_expr()?);
                        while self.eat(TokenKind::Comma) {
                            clobbers.push(self.parse_concat_expr()?);
                        }
                    }
                    if self.eat(TokenKind::Colon) {
                        if self.peek_kind() == TokenKind::Ident {
                            labels.push(self.bump());
                            while self.eat(TokenKind::Comma) {
                                labels.push(self.expect(TokenKind::Ident, "label")?);
                            }
                        }
                    }
                }
            }
        }

        self.expect(TokenKind::RParen, "')'")?;
        self.expect(TokenKind::Semicolon, "';'")?;

        Ok(Stmt::Asm(AsmStmt {
            is_volatile,
            is_goto,
            template,
            outputs,
            inputs,
            clobbers,
            labels,
        }))
    }

    /// One asm operand: `[name] "constraint" (expr)`, comma separated.
    fn parse_asm_operands(&mut self, out: &mut Vec<AsmOperand>) -> Result<(), CompileError> {
        if !matches!(self.peek_kind(), TokenKind::LBracket | TokenKind::StrLit) {
            return Ok(());
        }
        loop {
            let name = if self.eat(TokenKind::LBracket) {
                let name = self.expect(TokenKind::Ident, "operand name")?;
                self.expect(TokenKind::RBracket, "']'")?;
                Some(name)
            } else {
                None
            };
            let constraint = Expr::Str(self.expect(TokenKind::StrLit, "constraint string")?);
            self.expect(TokenKind::LParen, "'('")?;
            let expr = self.parse_expr()?;
            self.expect(TokenKind::RParen, "')'")?;
            out.push(AsmOperand {
                name,
                constraint,
                expr,
            });
            if !self.eat(TokenKind::Comma) {
                break;
            }
        }
        Ok(())
    }

    /// A local declaration used inside statements and `for` initializers.
    fn parse_local_decl(&mut self) -> Result<Declaration, CompileError> {
        let specs = self.parse_decl_specs()?;

        if self.eat(TokenKind::Semicolon) {
            return Ok(Declaration {
                specs,
                decls: Vec::new(),
            });
        }

        let mut decls = Vec::new();
        let decl = self.parse_declarator(false)?;
        let init = self.parse_opt_initializer()?;
        decls.push(InitDeclarator { decl, init });
        while self.eat(TokenKind::Comma) {
            let decl = self.parse_declarator(false)?;
            let init = self.parse_opt_initializer()?;
            decls.push(InitDeclarator { decl, init });
        }
        self.expect(TokenKind::Semicolon, "';'")?;

        // reject the reading that is really a call statement in disguise
        let declarators: Vec<Declarator> =
            decls.iter().map(|d| d.decl.clone()).collect();
        if Self::looks_like_macro_call(&specs, &declarators) {
            return Err(self.err("declaration"));
        }

        Ok(Declaration { specs, decls })
    }

    /// A statement that is neither keyword-introduced nor a label is first
    /// tried as a declaration; on failure it becomes an expression
    /// statement. A call-shaped expression statement without `;` whose body
    /// follows is reinterpreted as a loop-macro invocation.
    //
    // Note that this reinterpretation silently accepts source that merely
    // forgot the semicolon after a call.
    fn parse_decl_or_expr_stmt(&mut self) -> Result<Stmt, CompileError> {
        let mut sub = self.fork_silent();
        if let Ok(decl) = sub.parse_local_decl() {
            self.commit(&sub);
            return Ok(Stmt::Decl(decl));
        }

        let expr = self.parse_expr()?;
        if self.eat(TokenKind::Semicolon) {
            return Ok(Stmt::Expr(expr));
        }

        if matches!(expr, Expr::Call(_, _)) {
            let body = self.parse_body()?;
            return Ok(Stmt::LoopMacro { call: expr, body });
        }

        Err(self.err("';'"))
    }
}

// ------------- unit tests -------------

#[cfg(test)]
mod tests {
    use super::super::tests::parse;
    use crate::ast::*;

    fn body(source_body: &str) -> Vec<Stmt> {
        let source = format!("int f(int a, int b) {{ {} }}", source_body);
        let module = parse(&source).unwrap();
        match module.decls.into_iter().next().unwrap() {
            GlobalDecl::FuncDef { body, .. } => body.stmts,
            other => panic!("expected function, got {:?}", other),
        }
    }

    #[test]
    fn test_if_else_chain() {
        let stmts = body("if (a) return 1; else if (b) return 2; else return 3;");
        match &stmts[0] {
            Stmt::If {
                elifs, else_block, ..
            } => {
                assert_eq!(elifs.len(), 1);
                assert!(else_block.is_some());
            }
            other => panic!("expected if, got {:?}", other),
        }
    }

    #[test]
    fn test_while_and_do_while() {
        let stmts = body("while (a) a = a - 1; do b = b + 1; while (b < 10);");
        assert!(matches!(stmts[0], Stmt::While { .. }));
        assert!(matches!(stmts[1], Stmt::DoWhile { .. }));
    }

    #[test]
    fn test_for_with_declaration_init() {
        let stmts = body("for (int i = 0; i < 10; i = i + 1) a = a + i;");
        match &stmts[0] {
            Stmt::For { init, cond, step, .. } => {
                assert!(matches!(init, ForInit::Decl(_)));
                assert!(cond.is_some());
                assert!(step.is_some());
            }
            other => panic!("expected for, got {:?}", other),
        }
    }

    #[test]
    fn test_for_with_expression_init() {
        let stmts = body("for (a = 0; a < 4; a = a + 1) ;");
        match &stmts[0] {
            Stmt::For { init, .. } => assert!(matches!(init, ForInit::Expr(_))),
            other => panic!("expected for, got {:?}", other),
        }
    }

    #[test]
    fn test_switch_with_cases() {
        let stmts = body("switch (a) { case 1: return 1; default: break; }");
        match &stmts[0] {
            Stmt::Switch { body, .. } => {
                assert!(matches!(body.stmts[0], Stmt::Case(_)));
                assert!(matches!(body.stmts[2], Stmt::Default));
            }
            other => panic!("expected switch, got {:?}", other),
        }
    }

    #[test]
    fn test_goto_and_label() {
        let stmts = body("again: a = a - 1; if (a) goto again;");
        assert!(matches!(&stmts[0], Stmt::Label(t) if t.text == "again"));
    }

    #[test]
    fn test_call_statement_is_expression() {
        let stmts = body("f(a, b); g();");
        assert!(matches!(stmts[0], Stmt::Expr(Expr::Call(_, _))));
        assert!(matches!(stmts[1], Stmt::Expr(Expr::Call(_, _))));
    }

    #[test]
    fn test_single_argument_call_statement() {
        // must not be misread as a declaration `f x;`
        let stmts = body("f(a);");
        assert!(matches!(stmts[0], Stmt::Expr(Expr::Call(_, _))));
    }

    #[test]
    fn test_local_declaration() {
        let stmts = body("int x = 1; char *p;");
        assert!(matches!(stmts[0], Stmt::Decl(_)));
        assert!(matches!(stmts[1], Stmt::Decl(_)));
    }

    #[test]
    fn test_loop_macro_reinterpretation() {
        let stmts = body("list_foreach(q, e) { a = a + 1; }");
        match &stmts[0] {
            Stmt::LoopMacro { call, body } => {
                assert!(matches!(call, Expr::Call(_, _)));
                assert!(body.braced);
            }
            other => panic!("expected loop macro, got {:?}", other),
        }
    }

    #[test]
    fn test_asm_statement() {
        let stmts = body("asm volatile (\"di\" : : : \"memory\");");
        match &stmts[0] {
            Stmt::Asm(asm) => {
                assert!(asm.is_volatile);
                assert!(!asm.is_goto);
                assert_eq!(asm.clobbers.len(), 1);
            }
            other => panic!("expected asm, got {:?}", other),
        }
    }

    #[test]
    fn test_asm_with_operands() {
        let stmts = body("asm (\"ld %0, %1\" : [dst] \"=r\" (a) : \"r\" (b));");
        match &stmts[0] {
            Stmt::Asm(asm) => {
                assert_eq!(asm.outputs.len(), 1);
                assert_eq!(asm.outputs[0].name.as_ref().unwrap().text, "dst");
                assert_eq!(asm.inputs.len(), 1);
            }
            other => panic!("expected asm, got {:?}", other),
        }
    }

    #[test]
    fn test_null_statement() {
        let stmts = body("; ;");
        assert!(matches!(stmts[0], Stmt::Null));
        assert!(matches!(stmts[1], Stmt::Null));
    }
}
