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

// Binary operator table per precedence tier, highest binding first.
// Left-to-right tiers parse as a loop; the right-associative tiers
// (ternary, assignment) recurse.
const MUL_OPS: &[(TokenKind, BinOp)] = &[
    (TokenKind::Star, BinOp::Mul),
    (TokenKind::Slash, BinOp::Div),
    (TokenKind::Percent, BinOp::Mod),
];
const ADD_OPS: &[(TokenKind, BinOp)] = &[
    (TokenKind::Plus, BinOp::Add),
    (TokenKind::Minus, BinOp::Sub),
];
const SHIFT_OPS: &[(TokenKind, BinOp)] = &[
    (TokenKind::Shl, BinOp::Shl),
    (TokenKind::Shr, BinOp::Shr),
];
const REL_OPS: &[(TokenKind, BinOp)] = &[
    (TokenKind::Lt, BinOp::Lt),
    (TokenKind::LtEq, BinOp::LtEq),
    (TokenKind::Gt, BinOp::Gt),
    (TokenKind::GtEq, BinOp::GtEq),
];
const EQ_OPS: &[(TokenKind, BinOp)] = &[
    (TokenKind::EqEq, BinOp::Eq),
    (TokenKind::NotEq, BinOp::NotEq),
];
const BITAND_OPS: &[(TokenKind, BinOp)] = &[(TokenKind::Amp, BinOp::BitAnd)];
const BITXOR_OPS: &[(TokenKind, BinOp)] = &[(TokenKind::Caret, BinOp::BitXor)];
const BITOR_OPS: &[(TokenKind, BinOp)] = &[(TokenKind::Pipe, BinOp::BitOr)];
const LOGAND_OPS: &[(TokenKind, BinOp)] = &[(TokenKind::AndAnd, BinOp::LogAnd)];
const LOGOR_OPS: &[(TokenKind, BinOp)] = &[(TokenKind::OrOr, BinOp::LogOr)];

const ASSIGN_OPS: &[(TokenKind, BinOp)] = &[
    (TokenKind::Assign, BinOp::Assign),
    (TokenKind::PlusAssign, BinOp::AddAssign),
    (TokenKind::MinusAssign, BinOp::SubAssign),
    (TokenKind::StarAssign, BinOp::MulAssign),
    (TokenKind::SlashAssign, BinOp::DivAssign),
    (TokenKind::PercentAssign, BinOp::ModAssign),
    (TokenKind::ShlAssign, BinOp::ShlAssign),
    (TokenKind::ShrAssign, BinOp::ShrAssign),
    (TokenKind::AmpAssign, BinOp::AndAssign),
    (TokenKind::PipeAssign, BinOp::OrAssign),
    (TokenKind::CaretAssign, BinOp::XorAssign),
];

fn lookup(table: &[(TokenKind, BinOp)], kind: TokenKind) -> Option<BinOp> {
    table.iter().find(|(k, _)| *k == kind).map(|(_, op)| *op)
}

impl<'t> Parser<'t> {
    /// Full expression, comma level.
    pub(crate) fn parse_expr(&mut self) -> Result<Expr, CompileError> {
        let mut lhs = self.parse_concat_expr()?;
        while self.eat(TokenKind::Comma) {
            let rhs = self.parse_concat_expr()?;
            lhs = Expr::Comma(Box::new(lhs), Box::new(rhs));
        }
        Ok(lhs)
    }

    /// Juxtaposed string literals concatenate left-to-right.
    pub(crate) fn parse_concat_expr(&mut self) -> Result<Expr, CompileError> {
        let first = self.parse_assign_expr()?;
        if self.peek_kind() != TokenKind::StrLit {
            return Ok(first);
        }
        let mut parts = vec![first];
        while self.peek_kind() == TokenKind::StrLit {
            parts.push(self.parse_assign_expr()?);
        }
        Ok(Expr::Concat(parts))
    }

    /// Assignment, right-associative.
    pub(crate) fn parse_assign_expr(&mut self) -> Result<Expr, CompileError> {
        let lhs = self.parse_ternary_expr()?;
        if let Some(op) = lookup(ASSIGN_OPS, self.peek_kind()) {
            self.bump();
            let rhs = self.parse_assign_expr()?;
            return Ok(Expr::Binary(op, Box::new(lhs), Box::new(rhs)));
        }
        Ok(lhs)
    }

    /// `? :`, right-associative.
    fn parse_ternary_expr(&mut self) -> Result<Expr, CompileError> {
        let cond = self.parse_binary_expr(0)?;
        if !self.eat(TokenKind::Question) {
            return Ok(cond);
        }
        let then_expr = self.parse_ternary_expr()?;
        self.expect(TokenKind::Colon, "':'")?;
        let else_expr = self.parse_ternary_expr()?;
        Ok(Expr::Ternary(
            Box::new(cond),
            Box::new(then_expr),
            Box::new(else_expr),
        ))
    }

    /// Left-to-right binary tiers, loosest first.
    fn parse_binary_expr(&mut self, tier: usize) -> Result<Expr, CompileError> {
        const TIERS: &[&[(TokenKind, BinOp)]] = &[
            LOGOR_OPS, LOGAND_OPS, BITOR_OPS, BITXOR_OPS, BITAND_OPS, EQ_OPS, REL_OPS, SHIFT_OPS,
            ADD_OPS, MUL_OPS,
        ];

        if tier == TIERS.len() {
            return self.parse_unary_expr();
        }

        let mut lhs = self.parse_binary_expr(tier + 1)?;
        while let Some(op) = lookup(TIERS[tier], self.peek_kind()) {
            self.bump();
            let rhs = self.parse_binary_expr(tier + 1)?;
            lhs = Expr::Binary(op, Box::new(lhs), Box::new(rhs));
        }
        Ok(lhs)
    }

    fn parse_unary_expr(&mut self) -> Result<Expr, CompileError> {
        let op = match self.peek_kind() {
            TokenKind::Inc => UnOp::PreInc,
            TokenKind::Dec => UnOp::PreDec,
            TokenKind::Plus => UnOp::Plus,
            TokenKind::Minus => UnOp::Minus,
            TokenKind::Not => UnOp::LogNot,
            TokenKind::Tilde => UnOp::BitNot,
            TokenKind::Amp => UnOp::AddrOf,
            TokenKind::Star => UnOp::Deref,
            TokenKind::KwSizeof => return self.parse_sizeof_expr(),
            _ => return self.parse_postfix_expr(),
        };
        self.bump();
        let operand = self.parse_unary_expr()?;
        Ok(Expr::Unary(op, Box::new(operand)))
    }

    /// `sizeof (type)` is tried silently before `sizeof expr`.
    fn parse_sizeof_expr(&mut self) -> Result<Expr, CompileError> {
        self.bump();
        if self.peek_kind() == TokenKind::LParen {
            let mut sub = self.fork_silent();
            sub.bump();
            if let Ok(ty) = sub.parse_type_name() {
                if sub.eat(TokenKind::RParen) {
                    self.commit(&sub);
                    return Ok(Expr::SizeofType(ty));
                }
            }
        }
        let operand = self.parse_unary_expr()?;
        Ok(Expr::SizeofExpr(Box::new(operand)))
    }

    fn parse_postfix_expr(&mut self) -> Result<Expr, CompileError> {
        let mut expr = self.parse_primary_expr()?;
        loop {
            match self.peek_kind() {
                TokenKind::LParen => {
                    expr = self.parse_call_suffix(expr)?;
                }
                TokenKind::LBracket => {
                    self.bump();
                    let index = self.parse_expr()?;
                    self.expect(TokenKind::RBracket, "']'")?;
                    expr = Expr::Index(Box::new(expr), Box::new(index));
                }
                TokenKind::Dot => {
                    self.bump();
                    let member = self.expect(TokenKind::Ident, "member name")?;
                    expr = Expr::Member(Box::new(expr), false, member);
                }
                TokenKind::Arrow => {
                    self.bump();
                    let member = self.expect(TokenKind::Ident, "member name")?;
                    expr = Expr::Member(Box::new(expr), true, member);
                }
                TokenKind::Inc => {
                    self.bump();
                    expr = Expr::Postfix(PostOp::Inc, Box::new(expr));
                }
                TokenKind::Dec => {
                    self.bump();
                    expr = Expr::Postfix(PostOp::Dec, Box::new(expr));
                }
                _ => break,
            }
        }
        Ok(expr)
    }

    pub(crate) fn parse_call_suffix(&mut self, callee: Expr) -> Result<Expr, CompileError> {
        self.expect(TokenKind::LParen, "'('")?;
        let mut args = Vec::new();
        if self.peek_kind() != TokenKind::RParen {
            // argument position admits adjacent-string concatenation but
            // not the comma operator
            args.push(self.parse_concat_expr()?);
            while self.eat(TokenKind::Comma) {
                args.push(self.parse_concat_expr()?);
            }
        }
        self.expect(TokenKind::RParen, "')'")?;
        Ok(Expr::Call(Box::new(callee), args))
    }

    fn parse_primary_expr(&mut self) -> Result<Expr, CompileError> {
        match self.peek_kind() {
            TokenKind::Number => Ok(Expr::Int(self.bump())),
            TokenKind::CharLit => Ok(Expr::Char(self.bump())),
            TokenKind::StrLit => Ok(Expr::Str(self.bump())),
            TokenKind::Ident => Ok(Expr::Ident(self.bump())),
            TokenKind::LParen => self.parse_paren_expr(),
            _ => Err(self.err("expression")),
        }
    }

    /// A parenthesized production: cast, compound literal, or parenthesized
    /// expression. Each alternative runs in a silent sub-parser; the first
    /// success wins, and if all fail the error of the last attempt surfaces.
    fn parse_paren_expr(&mut self) -> Result<Expr, CompileError> {
        // cast: ( type ) expr
        let mut sub = self.fork_silent();
        sub.bump();
        if let Ok(ty) = sub.parse_type_name() {
            if sub.eat(TokenKind::RParen) {
                if sub.peek_kind() == TokenKind::LBrace {
                    // compound literal: ( type ) { ... }
                    if let Ok(list) = sub.parse_init_list() {
                        self.commit(&sub);
                        return Ok(Expr::CompoundLiteral(ty, list));
                    }
                } else if let Ok(operand) = sub.parse_unary_expr() {
                    self.commit(&sub);
                    return Ok(Expr::Cast(ty, Box::new(operand)));
                }
            }
        }

        // parenthesized expression
        self.bump();
        let inner = self.parse_expr()?;
        self.expect(TokenKind::RParen, "')'")?;
        Ok(Expr::Paren(Box::new(inner)))
    }
}

// ------------- unit tests -------------

#[cfg(test)]
mod tests {
    use super::super::tests::parse;
    use crate::ast::*;

    /// Parse `int f(void) { return EXPR; }` and pull out EXPR.
    fn expr(source_expr: &str) -> Expr {
        let source = format!("int f(void) {{ return {}; }}", source_expr);
        let module = parse(&source).unwrap();
        match module.decls.into_iter().next().unwrap() {
            GlobalDecl::FuncDef { body, .. } => match body.stmts.into_iter().next().unwrap() {
                Stmt::Return(Some(e)) => e,
                other => panic!("expected return, got {:?}", other),
            },
            other => panic!("expected function, got {:?}", other),
        }
    }

    fn int_value(e: &Expr) -> &str {
        match e {
            Expr::Int(tok) => &tok.text,
            other => panic!("expected integer literal, got {:?}", other),
        }
    }

    #[test]
    fn test_mul_binds_tighter_than_add() {
        // 1 + 2 * 3 must parse as 1 + (2 * 3)
        match expr("1 + 2 * 3") {
            Expr::Binary(BinOp::Add, lhs, rhs) => {
                assert_eq!(int_value(&lhs), "1");
                match *rhs {
                    Expr::Binary(BinOp::Mul, l, r) => {
                        assert_eq!(int_value(&l), "2");
                        assert_eq!(int_value(&r), "3");
                    }
                    other => panic!("expected multiplication, got {:?}", other),
                }
            }
            other => panic!("expected addition, got {:?}", other),
        }
    }

    #[test]
    fn test_left_associative_subtraction() {
        // 5 - 2 - 1 must parse as (5 - 2) - 1
        match expr("5 - 2 - 1") {
            Expr::Binary(BinOp::Sub, lhs, rhs) => {
                assert_eq!(int_value(&rhs), "1");
                assert!(matches!(*lhs, Expr::Binary(BinOp::Sub, _, _)));
            }
            other => panic!("expected subtraction, got {:?}", other),
        }
    }

    #[test]
    fn test_assignment_right_associative() {
        match expr("a = b = 1") {
            Expr::Binary(BinOp::Assign, _, rhs) => {
                assert!(matches!(*rhs, Expr::Binary(BinOp::Assign, _, _)));
            }
            other => panic!("expected assignment, got {:?}", other),
        }
    }

    #[test]
    fn test_shift_between_add_and_rel() {
        // a + 1 << 2 < b parses as ((a + 1) << 2) < b
        match expr("a + 1 << 2 < b") {
            Expr::Binary(BinOp::Lt, lhs, _) => {
                assert!(matches!(*lhs, Expr::Binary(BinOp::Shl, _, _)));
            }
            other => panic!("expected relational, got {:?}", other),
        }
    }

    #[test]
    fn test_ternary() {
        match expr("a ? 1 : 2") {
            Expr::Ternary(cond, t, f) => {
                assert!(matches!(*cond, Expr::Ident(_)));
                assert_eq!(int_value(&t), "1");
                assert_eq!(int_value(&f), "2");
            }
            other => panic!("expected ternary, got {:?}", other),
        }
    }

    #[test]
    fn test_cast_expression() {
        match expr("(char)x") {
            Expr::Cast(ty, operand) => {
                assert!(ty.specs.has_type_spec());
                assert!(matches!(*operand, Expr::Ident(_)));
            }
            other => panic!("expected cast, got {:?}", other),
        }
    }

    #[test]
    fn test_paren_expression_not_cast() {
        // (x) + 1 where parenthesized reading is required by the operator
        match expr("(1 + 2) * 3") {
            Expr::Binary(BinOp::Mul, lhs, _) => {
                assert!(matches!(*lhs, Expr::Paren(_)));
            }
            other => panic!("expected multiplication, got {:?}", other),
        }
    }

    #[test]
    fn test_compound_literal() {
        match expr("(struct pair){ 1, 2 }") {
            Expr::CompoundLiteral(_, list) => assert_eq!(list.inits.len(), 2),
            other => panic!("expected compound literal, got {:?}", other),
        }
    }

    #[test]
    fn test_call_member_index_chain() {
        match expr("table[2].next->get(1, 2)") {
            Expr::Call(callee, args) => {
                assert_eq!(args.len(), 2);
                match *callee {
                    Expr::Member(base, true, tok) => {
                        assert_eq!(tok.text, "get");
                        assert!(matches!(*base, Expr::Member(_, false, _)));
                    }
                    other => panic!("expected arrow member, got {:?}", other),
                }
            }
            other => panic!("expected call, got {:?}", other),
        }
    }

    #[test]
    fn test_sizeof_type_and_expr() {
        assert!(matches!(expr("sizeof(int)"), Expr::SizeofType(_)));
        assert!(matches!(expr("sizeof x"), Expr::SizeofExpr(_)));
        // parenthesized expression operand, not a type
        assert!(matches!(expr("sizeof(x + 1)"), Expr::SizeofExpr(_)));
    }

    #[test]
    fn test_string_concatenation() {
        match expr("\"a\" \"b\" \"c\"") {
            Expr::Concat(parts) => assert_eq!(parts.len(), 3),
            other => panic!("expected concatenation, got {:?}", other),
        }
    }

    #[test]
    fn test_unary_chain() {
        match expr("!~-x") {
            Expr::Unary(UnOp::LogNot, inner) => match *inner {
                Expr::Unary(UnOp::BitNot, inner2) => {
                    assert!(matches!(*inner2, Expr::Unary(UnOp::Minus, _)));
                }
                other => panic!("expected bitwise not, got {:?}", other),
            },
            other => panic!("expected logical not, got {:?}", other),
        }
    }

    #[test]
    fn test_address_of_and_deref() {
        assert!(matches!(expr("&x"), Expr::Unary(UnOp::AddrOf, _)));
        assert!(matches!(expr("*p"), Expr::Unary(UnOp::Deref, _)));
    }

    #[test]
    fn test_comma_expression() {
        match expr("(a, b)") {
            Expr::Paren(inner) => assert!(matches!(*inner, Expr::Comma(_, _))),
            other => panic!("expected parenthesized comma, got {:?}", other),
        }
    }
}
