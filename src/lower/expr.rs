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

use super::ctype::{decode_string_literal, parse_char_literal, parse_int_literal};
use super::{CType, Lowerer, ProcCtx};
use crate::ast::*;
use crate::errors::CompileError;
use crate::ir::{IrInstr, IrOp, IrOper};

/// A lowered value: the pseudo-variable holding it plus its source type.
pub(crate) type Value = (String, CType);

impl Lowerer {
    // --- small emission helpers ---

    fn emit_op3(
        &mut self,
        ctx: &mut ProcCtx,
        op: IrOp,
        width: u32,
        op1: &str,
        op2: &str,
    ) -> String {
        let dest = ctx.new_value();
        ctx.push(
            IrInstr::new(op, width)
                .with_dest(IrOper::var(&dest))
                .with_op1(IrOper::var(op1))
                .with_op2(IrOper::var(op2)),
        );
        dest
    }

    fn emit_op2(&mut self, ctx: &mut ProcCtx, op: IrOp, width: u32, op1: &str) -> String {
        let dest = ctx.new_value();
        ctx.push(
            IrInstr::new(op, width)
                .with_dest(IrOper::var(&dest))
                .with_op1(IrOper::var(op1)),
        );
        dest
    }

    pub(crate) fn emit_imm(&mut self, ctx: &mut ProcCtx, width: u32, value: i64) -> String {
        let dest = ctx.new_value();
        ctx.push(
            IrInstr::new(IrOp::Imm, width)
                .with_dest(IrOper::var(&dest))
                .with_op1(IrOper::Imm(value)),
        );
        dest
    }

    fn emit_lvarptr(&mut self, ctx: &mut ProcCtx, lvar: &str) -> String {
        self.emit_op2(ctx, IrOp::Lvarptr, 16, lvar)
    }

    fn emit_varptr(&mut self, ctx: &mut ProcCtx, global: &str) -> String {
        self.emit_op2(ctx, IrOp::Varptr, 16, global)
    }

    fn emit_read(&mut self, ctx: &mut ProcCtx, addr: &str, width: u32) -> String {
        self.emit_op2(ctx, IrOp::Read, width, addr)
    }

    fn emit_write(&mut self, ctx: &mut ProcCtx, addr: &str, width: u32, value: &str) {
        ctx.push(
            IrInstr::new(IrOp::Write, width)
                .with_op1(IrOper::var(addr))
                .with_op2(IrOper::var(value)),
        );
    }

    // --- conversions ---

    /// Widen a value to `to_bits` through a scratch local: zero-filled for
    /// unsigned sources, shift-pair sign extension for signed ones.
    fn widen(&mut self, ctx: &mut ProcCtx, value: &Value, to_bits: u32) -> String {
        let (var, ty) = value;
        let from_bits = ty.value_bits();
        let scratch_ty = CType::Int {
            bits: to_bits,
            signed: ty.is_signed(),
        };
        let scratch = ctx.new_tmp(&scratch_ty);
        let addr = self.emit_lvarptr(ctx, &scratch);
        if ty.is_signed() {
            self.emit_write(ctx, &addr, from_bits, var);
            let raw = self.emit_read(ctx, &addr, to_bits);
            let shift = self.emit_imm(ctx, 16, (to_bits - from_bits) as i64);
            let shifted = self.emit_op3(ctx, IrOp::Shl, to_bits, &raw, &shift);
            self.emit_op3(ctx, IrOp::Shra, to_bits, &shifted, &shift)
        } else {
            let zero = self.emit_imm(ctx, to_bits, 0);
            self.emit_write(ctx, &addr, to_bits, &zero);
            self.emit_write(ctx, &addr, from_bits, var);
            self.emit_read(ctx, &addr, to_bits)
        }
    }

    /// Bring a value to a given width. Narrowing needs no code: consumers
    /// simply use the low bytes.
    fn to_width(&mut self, ctx: &mut ProcCtx, value: Value, bits: u32) -> String {
        if value.1.value_bits() >= bits {
            value.0
        } else {
            self.widen(ctx, &value, bits)
        }
    }

    /// Convert a value to a target type for assignment, argument passing or
    /// return.
    pub(crate) fn convert_value(
        &mut self,
        ctx: &mut ProcCtx,
        value: Value,
        to: &CType,
    ) -> Result<Value, CompileError> {
        let to_bits = to.value_bits();
        if to_bits == 0 {
            return Ok(value);
        }
        let var = self.to_width(ctx, value, to_bits);
        Ok((var, to.clone()))
    }

    /// A value usable by `jz`/`jnz`: 16 bits wide, zero iff false.
    pub(crate) fn lower_cond(
        &mut self,
        ctx: &mut ProcCtx,
        expr: &Expr,
    ) -> Result<String, CompileError> {
        let value = self.lower_expr(ctx, expr)?;
        let bits = value.1.value_bits();
        if bits < 16 {
            return Ok(self.widen(ctx, &value, 16));
        }
        if bits == 16 {
            return Ok(value.0);
        }
        let zero = self.emit_imm(ctx, bits, 0);
        Ok(self.emit_op3(ctx, IrOp::Neq, bits, &value.0, &zero))
    }

    // --- lvalues ---

    /// Lower an lvalue to the pseudo-variable holding its address.
    fn lower_place(&mut self, ctx: &mut ProcCtx, expr: &Expr) -> Result<Value, CompileError> {
        match expr {
            Expr::Ident(tok) => {
                if let Some((home, ty)) = ctx.lookup_local(&tok.text) {
                    let addr = self.emit_lvarptr(ctx, &home);
                    return Ok((addr, ty));
                }
                if let Some(ty) = self.globals.get(&tok.text).cloned() {
                    let addr = self.emit_varptr(ctx, &format!("@{}", tok.text));
                    return Ok((addr, ty));
                }
                Err(CompileError::SemanticError {
                    ident: tok.text.clone(),
                    reason: "undefined variable".to_string(),
                })
            }
            Expr::Paren(inner) => self.lower_place(ctx, inner),
            Expr::Unary(UnOp::Deref, inner) => {
                let (var, ty) = self.lower_expr(ctx, inner)?;
                match ty {
                    CType::Ptr(pointee) => Ok((var, *pointee)),
                    other => Err(CompileError::SemanticError {
                        ident: ctx.proc.ident.clone(),
                        reason: format!("dereference of non-pointer type {:?}", other),
                    }),
                }
            }
            Expr::Index(base, index) => {
                let (base_var, base_ty) = self.lower_expr(ctx, base)?;
                let elem_ty = match base_ty {
                    CType::Ptr(elem) => *elem,
                    CType::Array(elem, _) => *elem,
                    other => {
                        return Err(CompileError::SemanticError {
                            ident: ctx.proc.ident.clone(),
                            reason: format!("indexing into non-pointer type {:?}", other),
                        });
                    }
                };
                let index_value = self.lower_expr(ctx, index)?;
                let index_var = self.to_width(ctx, index_value, 16);
                let size = self.emit_imm(ctx, 16, elem_ty.sizeof() as i64);
                let offset = self.emit_op3(ctx, IrOp::Mul, 16, &index_var, &size);
                let addr = self.emit_op3(ctx, IrOp::Add, 16, &base_var, &offset);
                Ok((addr, elem_ty))
            }
            Expr::Member(_, _, _) => Err(CompileError::SemanticError {
                ident: ctx.proc.ident.clone(),
                reason: "record member access cannot be lowered".to_string(),
            }),
            other => Err(CompileError::SemanticError {
                ident: ctx.proc.ident.clone(),
                reason: format!("expression is not an lvalue: {:?}", other),
            }),
        }
    }

    /// Load the value stored at a place. Arrays decay to the address itself.
    fn load_place(&mut self, ctx: &mut ProcCtx, place: Value) -> Value {
        let (addr, ty) = place;
        match &ty {
            CType::Array(elem, _) => (addr, CType::Ptr(elem.clone())),
            _ => {
                let value = self.emit_read(ctx, &addr, ty.value_bits());
                (value, ty)
            }
        }
    }

    // --- expressions ---

    pub(crate) fn lower_expr(
        &mut self,
        ctx: &mut ProcCtx,
        expr: &Expr,
    ) -> Result<Value, CompileError> {
        match expr {
            Expr::Int(tok) => {
                let value = parse_int_literal(&tok.text)?;
                let bits = literal_bits(value);
                Ok((
                    self.emit_imm(ctx, bits, value),
                    CType::Int { bits, signed: true },
                ))
            }
            Expr::Char(tok) => {
                let value = parse_char_literal(&tok.text)?;
                Ok((self.emit_imm(ctx, 16, value), CType::int16()))
            }
            Expr::Str(tok) => {
                let ident = self.intern_string(&decode_string_literal(&tok.text));
                let addr = self.emit_varptr(ctx, &ident);
                Ok((
                    addr,
                    CType::Ptr(Box::new(CType::Int {
                        bits: 8,
                        signed: true,
                    })),
                ))
            }
            Expr::Concat(parts) => {
                let mut bytes = Vec::new();
                for part in parts {
                    match part {
                        Expr::Str(tok) => bytes.extend(decode_string_literal(&tok.text)),
                        other => {
                            return Err(CompileError::SemanticError {
                                ident: ctx.proc.ident.clone(),
                                reason: format!("cannot concatenate non-string {:?}", other),
                            });
                        }
                    }
                }
                let ident = self.intern_string(&bytes);
                let addr = self.emit_varptr(ctx, &ident);
                Ok((
                    addr,
                    CType::Ptr(Box::new(CType::Int {
                        bits: 8,
                        signed: true,
                    })),
                ))
            }
            Expr::Ident(tok) => {
                if let Some(value) = self.enum_consts.get(&tok.text).copied() {
                    return Ok((self.emit_imm(ctx, 16, value), CType::int16()));
                }
                let place = self.lower_place(ctx, expr)?;
                Ok(self.load_place(ctx, place))
            }
            Expr::Paren(inner) => self.lower_expr(ctx, inner),
            Expr::Cast(ty, inner) => {
                let target = self.resolve_type_name(ty)?;
                let value = self.lower_expr(ctx, inner)?;
                self.convert_value(ctx, value, &target)
            }
            Expr::CompoundLiteral(_, _) => Err(CompileError::SemanticError {
                ident: ctx.proc.ident.clone(),
                reason: "compound literals cannot be lowered".to_string(),
            }),
            Expr::Member(_, _, _) => {
                let place = self.lower_place(ctx, expr)?;
                Ok(self.load_place(ctx, place))
            }
            Expr::Index(_, _) => {
                let place = self.lower_place(ctx, expr)?;
                Ok(self.load_place(ctx, place))
            }
            Expr::Call(callee, args) => self.lower_call(ctx, callee, args),
            Expr::Unary(op, inner) => self.lower_unary(ctx, *op, inner),
            Expr::Postfix(op, inner) => {
                let step = match op {
                    PostOp::Inc => 1,
                    PostOp::Dec => -1,
                };
                self.lower_incdec(ctx, inner, step, false)
            }
            Expr::SizeofExpr(inner) => {
                let ty = self.expr_type(ctx, inner)?;
                Ok((
                    self.emit_imm(ctx, 16, ty.sizeof() as i64),
                    CType::Int {
                        bits: 16,
                        signed: false,
                    },
                ))
            }
            Expr::SizeofType(ty) => {
                let resolved = self.resolve_type_name(ty)?;
                Ok((
                    self.emit_imm(ctx, 16, resolved.sizeof() as i64),
                    CType::Int {
                        bits: 16,
                        signed: false,
                    },
                ))
            }
            Expr::Binary(op, lhs, rhs) => self.lower_binary(ctx, *op, lhs, rhs),
            Expr::Ternary(cond, then_expr, else_expr) => {
                self.lower_ternary(ctx, cond, then_expr, else_expr)
            }
            Expr::Comma(lhs, rhs) => {
                self.lower_expr(ctx, lhs)?;
                self.lower_expr(ctx, rhs)
            }
        }
    }

    fn lower_unary(
        &mut self,
        ctx: &mut ProcCtx,
        op: UnOp,
        inner: &Expr,
    ) -> Result<Value, CompileError> {
        match op {
            UnOp::Plus => self.lower_expr(ctx, inner),
            UnOp::Minus => {
                let value = self.lower_expr(ctx, inner)?;
                let bits = value.1.value_bits().max(16);
                let var = self.to_width(ctx, value, bits);
                let dest = self.emit_op2(ctx, IrOp::Neg, bits, &var);
                Ok((dest, CType::Int { bits, signed: true }))
            }
            UnOp::BitNot => {
                let value = self.lower_expr(ctx, inner)?;
                let signed = value.1.is_signed();
                let bits = value.1.value_bits().max(16);
                let var = self.to_width(ctx, value, bits);
                let dest = self.emit_op2(ctx, IrOp::Bnot, bits, &var);
                Ok((dest, CType::Int { bits, signed }))
            }
            UnOp::LogNot => {
                let value = self.lower_expr(ctx, inner)?;
                let bits = value.1.value_bits().max(16);
                let var = self.to_width(ctx, value, bits);
                let zero = self.emit_imm(ctx, bits, 0);
                let dest = self.emit_op3(ctx, IrOp::Eq, bits, &var, &zero);
                Ok((dest, CType::int16()))
            }
            UnOp::AddrOf => {
                let (addr, ty) = self.lower_place(ctx, inner)?;
                Ok((addr, CType::Ptr(Box::new(ty))))
            }
            UnOp::Deref => {
                let (var, ty) = self.lower_expr(ctx, inner)?;
                match ty {
                    CType::Ptr(pointee) => Ok(self.load_place(ctx, (var, *pointee))),
                    other => Err(CompileError::SemanticError {
                        ident: ctx.proc.ident.clone(),
                        reason: format!("dereference of non-pointer type {:?}", other),
                    }),
                }
            }
            UnOp::PreInc => self.lower_incdec(ctx, inner, 1, true),
            UnOp::PreDec => self.lower_incdec(ctx, inner, -1, true),
        }
    }

    /// Shared read-modify-write for the four inc/dec forms. Pointers step by
    /// their pointee size.
    fn lower_incdec(
        &mut self,
        ctx: &mut ProcCtx,
        target: &Expr,
        direction: i64,
        pre: bool,
    ) -> Result<Value, CompileError> {
        let (addr, ty) = self.lower_place(ctx, target)?;
        let bits = ty.value_bits();
        let step = match &ty {
            CType::Ptr(pointee) => pointee.sizeof() as i64,
            _ => 1,
        };
        let old = self.emit_read(ctx, &addr, bits);
        let amount = self.emit_imm(ctx, bits, step);
        let op = if direction > 0 { IrOp::Add } else { IrOp::Sub };
        let new = self.emit_op3(ctx, op, bits, &old, &amount);
        self.emit_write(ctx, &addr, bits, &new);
        let result = if pre { new } else { old };
        Ok((result, ty))
    }

    fn lower_call(
        &mut self,
        ctx: &mut ProcCtx,
        callee: &Expr,
        args: &[Expr],
    ) -> Result<Value, CompileError> {
        let name = match strip_parens(callee) {
            Expr::Ident(tok) => tok.text.clone(),
            other => {
                return Err(CompileError::SemanticError {
                    ident: ctx.proc.ident.clone(),
                    reason: format!("indirect calls are not supported: {:?}", other),
                });
            }
        };

        let sig = self.procs.get(&name).cloned();
        let ret = sig.as_ref().map(|s| s.ret.clone()).unwrap_or(CType::int16());

        let mut arg_opers = Vec::new();
        for (index, arg) in args.iter().enumerate() {
            let value = self.lower_expr(ctx, arg)?;
            let var = match sig.as_ref().and_then(|s| s.params.get(index)) {
                Some(param_ty) => {
                    let param_ty = param_ty.clone();
                    self.convert_value(ctx, value, &param_ty)?.0
                }
                // default argument promotion for variadic and undeclared
                // parameters
                None => {
                    let bits = value.1.value_bits().max(16);
                    self.to_width(ctx, value, bits)
                }
            };
            arg_opers.push(IrOper::var(&var));
        }

        let mut instr = IrInstr::new(IrOp::Call, ret.value_bits())
            .with_op1(IrOper::var(&format!("@{}", name)))
            .with_op2(IrOper::List(arg_opers));
        if matches!(ret, CType::Void) {
            ctx.push(instr);
            Ok((String::new(), CType::Void))
        } else {
            let dest = ctx.new_value();
            instr = instr.with_dest(IrOper::var(&dest));
            ctx.push(instr);
            Ok((dest, ret))
        }
    }

    fn lower_binary(
        &mut self,
        ctx: &mut ProcCtx,
        op: BinOp,
        lhs: &Expr,
        rhs: &Expr,
    ) -> Result<Value, CompileError> {
        if op.is_assign() {
            return self.lower_assign(ctx, op, lhs, rhs);
        }
        match op {
            BinOp::LogAnd | BinOp::LogOr => self.lower_logical(ctx, op, lhs, rhs),
            _ => {
                let left = self.lower_expr(ctx, lhs)?;
                let right = self.lower_expr(ctx, rhs)?;
                self.lower_arith(ctx, op, left, right)
            }
        }
    }

    /// Non-assignment arithmetic on already-lowered operands, including
    /// scaled pointer arithmetic and signed/unsigned comparison selection.
    fn lower_arith(
        &mut self,
        ctx: &mut ProcCtx,
        op: BinOp,
        left: Value,
        right: Value,
    ) -> Result<Value, CompileError> {
        // pointer +/- integer scales by the pointee size
        if matches!(op, BinOp::Add | BinOp::Sub) {
            let (ptr, int, ptr_first) = match (&left.1, &right.1) {
                (CType::Ptr(_), CType::Ptr(_)) => {
                    return Err(CompileError::SemanticError {
                        ident: ctx.proc.ident.clone(),
                        reason: "pointer difference is not supported".to_string(),
                    });
                }
                (CType::Ptr(_), _) => (left.clone(), right.clone(), true),
                (_, CType::Ptr(_)) => (right.clone(), left.clone(), false),
                _ => {
                    return self.lower_plain_arith(ctx, op, left, right);
                }
            };
            if !ptr_first && op == BinOp::Sub {
                return Err(CompileError::SemanticError {
                    ident: ctx.proc.ident.clone(),
                    reason: "integer minus pointer".to_string(),
                });
            }
            let pointee_size = match &ptr.1 {
                CType::Ptr(pointee) => pointee.sizeof() as i64,
                _ => unreachable!(),
            };
            let int_var = self.to_width(ctx, int, 16);
            let size = self.emit_imm(ctx, 16, pointee_size);
            let scaled = self.emit_op3(ctx, IrOp::Mul, 16, &int_var, &size);
            let ir_op = if op == BinOp::Add { IrOp::Add } else { IrOp::Sub };
            let dest = self.emit_op3(ctx, ir_op, 16, &ptr.0, &scaled);
            return Ok((dest, ptr.1));
        }

        self.lower_plain_arith(ctx, op, left, right)
    }

    fn lower_plain_arith(
        &mut self,
        ctx: &mut ProcCtx,
        op: BinOp,
        left: Value,
        right: Value,
    ) -> Result<Value, CompileError> {
        let bits = left.1.value_bits().max(right.1.value_bits()).max(16);
        // pointers compare unsigned; mixed signedness goes unsigned as well
        let signed = left.1.is_signed() && right.1.is_signed();
        let unsigned_cmp = !signed;

        let lvar = self.to_width(ctx, left, bits);
        let rvar = self.to_width(ctx, right, bits);

        let (ir_op, is_cmp) = match op {
            BinOp::Add => (IrOp::Add, false),
            BinOp::Sub => (IrOp::Sub, false),
            BinOp::Mul => (IrOp::Mul, false),
            BinOp::BitAnd => (IrOp::And, false),
            BinOp::BitOr => (IrOp::Or, false),
            BinOp::BitXor => (IrOp::Xor, false),
            BinOp::Shl => (IrOp::Shl, false),
            BinOp::Shr => {
                if unsigned_cmp {
                    (IrOp::Shrl, false)
                } else {
                    (IrOp::Shra, false)
                }
            }
            BinOp::Eq => (IrOp::Eq, true),
            BinOp::NotEq => (IrOp::Neq, true),
            BinOp::Lt => (if unsigned_cmp { IrOp::Ltu } else { IrOp::Lt }, true),
            BinOp::LtEq => (if unsigned_cmp { IrOp::Lteu } else { IrOp::Lteq }, true),
            BinOp::Gt => (if unsigned_cmp { IrOp::Gtu } else { IrOp::Gt }, true),
            BinOp::GtEq => (if unsigned_cmp { IrOp::Gteu } else { IrOp::Gteq }, true),
            BinOp::Div | BinOp::Mod => {
                return Err(CompileError::SemanticError {
                    ident: ctx.proc.ident.clone(),
                    reason: "division is not supported by this back end".to_string(),
                });
            }
            other => {
                return Err(CompileError::SemanticError {
                    ident: ctx.proc.ident.clone(),
                    reason: format!("operator {:?} cannot be lowered", other),
                });
            }
        };

        let dest = self.emit_op3(ctx, ir_op, bits, &lvar, &rvar);
        if is_cmp {
            Ok((dest, CType::int16()))
        } else {
            Ok((dest, CType::Int { bits, signed }))
        }
    }

    /// Short-circuit `&&` / `||` through a scratch local holding 0 or 1.
    fn lower_logical(
        &mut self,
        ctx: &mut ProcCtx,
        op: BinOp,
        lhs: &Expr,
        rhs: &Expr,
    ) -> Result<Value, CompileError> {
        let scratch = ctx.new_tmp(&CType::int16());
        let short_label = ctx.new_label(if op == BinOp::LogAnd { "andf" } else { "ort" });
        let end_label = ctx.new_label("logend");

        let (short_op, short_value, other_value) = if op == BinOp::LogAnd {
            (IrOp::Jz, 0, 1)
        } else {
            (IrOp::Jnz, 1, 0)
        };

        let first = self.lower_cond(ctx, lhs)?;
        ctx.push(
            IrInstr::new(short_op, 16)
                .with_op1(IrOper::var(&first))
                .with_op2(IrOper::var(&short_label)),
        );
        let second = self.lower_cond(ctx, rhs)?;
        ctx.push(
            IrInstr::new(short_op, 16)
                .with_op1(IrOper::var(&second))
                .with_op2(IrOper::var(&short_label)),
        );

        let addr = self.emit_lvarptr(ctx, &scratch);
        let other = self.emit_imm(ctx, 16, other_value);
        self.emit_write(ctx, &addr, 16, &other);
        self.emit_jmp(ctx, &end_label);

        ctx.label(&short_label);
        let addr = self.emit_lvarptr(ctx, &scratch);
        let value = self.emit_imm(ctx, 16, short_value);
        self.emit_write(ctx, &addr, 16, &value);

        ctx.label(&end_label);
        let addr = self.emit_lvarptr(ctx, &scratch);
        let result = self.emit_read(ctx, &addr, 16);
        Ok((result, CType::int16()))
    }

    fn lower_ternary(
        &mut self,
        ctx: &mut ProcCtx,
        cond: &Expr,
        then_expr: &Expr,
        else_expr: &Expr,
    ) -> Result<Value, CompileError> {
        // the scratch must hold either branch, so join both static types
        let then_ty = self.expr_type(ctx, then_expr)?;
        let else_ty = self.expr_type(ctx, else_expr)?;
        let result_ty = merge_branch_types(&then_ty, &else_ty);
        let scratch = ctx.new_tmp(&result_ty);
        let else_label = ctx.new_label("terne");
        let end_label = ctx.new_label("ternend");

        let cond_var = self.lower_cond(ctx, cond)?;
        ctx.push(
            IrInstr::new(IrOp::Jz, 16)
                .with_op1(IrOper::var(&cond_var))
                .with_op2(IrOper::var(&else_label)),
        );

        let then_value = self.lower_expr(ctx, then_expr)?;
        let then_value = self.convert_value(ctx, then_value, &result_ty)?;
        let addr = self.emit_lvarptr(ctx, &scratch);
        self.emit_write(ctx, &addr, result_ty.value_bits(), &then_value.0);
        self.emit_jmp(ctx, &end_label);

        ctx.label(&else_label);
        let else_value = self.lower_expr(ctx, else_expr)?;
        let else_value = self.convert_value(ctx, else_value, &result_ty)?;
        let addr = self.emit_lvarptr(ctx, &scratch);
        self.emit_write(ctx, &addr, result_ty.value_bits(), &else_value.0);

        ctx.label(&end_label);
        let addr = self.emit_lvarptr(ctx, &scratch);
        let result = self.emit_read(ctx, &addr, result_ty.value_bits());
        Ok((result, result_ty))
    }

    fn lower_assign(
        &mut self,
        ctx: &mut ProcCtx,
        op: BinOp,
        lhs: &Expr,
        rhs: &Expr,
    ) -> Result<Value, CompileError> {
        let (addr, ty) = self.lower_place(ctx, lhs)?;
        let bits = ty.value_bits();

        let value = if op == BinOp::Assign {
            let rhs_value = self.lower_expr(ctx, rhs)?;
            self.convert_value(ctx, rhs_value, &ty)?
        } else {
            let arith_op = match op {
                BinOp::AddAssign => BinOp::Add,
                BinOp::SubAssign => BinOp::Sub,
                BinOp::MulAssign => BinOp::Mul,
                BinOp::DivAssign => BinOp::Div,
                BinOp::ModAssign => BinOp::Mod,
                BinOp::ShlAssign => BinOp::Shl,
                BinOp::ShrAssign => BinOp::Shr,
                BinOp::AndAssign => BinOp::BitAnd,
                BinOp::OrAssign => BinOp::BitOr,
                BinOp::XorAssign => BinOp::BitXor,
                _ => unreachable!(),
            };
            let old = self.emit_read(ctx, &addr, bits);
            let rhs_value = self.lower_expr(ctx, rhs)?;
            let combined = self.lower_arith(ctx, arith_op, (old, ty.clone()), rhs_value)?;
            self.convert_value(ctx, combined, &ty)?
        };

        self.emit_write(ctx, &addr, bits, &value.0);
        Ok(value)
    }

    /// The static type of an expression, for `sizeof` and ternary results.
    /// No code is emitted.
    fn expr_type(&mut self, ctx: &mut ProcCtx, expr: &Expr) -> Result<CType, CompileError> {
        match expr {
            Expr::Int(tok) => {
                let value = parse_int_literal(&tok.text)?;
                Ok(CType::Int {
                    bits: literal_bits(value),
                    signed: true,
                })
            }
            Expr::Char(_) => Ok(CType::int16()),
            Expr::Str(tok) => Ok(CType::Array(
                Box::new(CType::Int {
                    bits: 8,
                    signed: true,
                }),
                decode_string_literal(&tok.text).len() as u32 + 1,
            )),
            Expr::Ident(tok) => {
                if self.enum_consts.contains_key(&tok.text) {
                    return Ok(CType::int16());
                }
                if let Some((_, ty)) = ctx.lookup_local(&tok.text) {
                    return Ok(ty);
                }
                if let Some(ty) = self.globals.get(&tok.text) {
                    return Ok(ty.clone());
                }
                Err(CompileError::SemanticError {
                    ident: tok.text.clone(),
                    reason: "undefined variable".to_string(),
                })
            }
            Expr::Paren(inner) => self.expr_type(ctx, inner),
            Expr::Cast(ty, _) => self.resolve_type_name(ty),
            Expr::Unary(UnOp::AddrOf, inner) => {
                let inner_ty = self.expr_type(ctx, inner)?;
                Ok(CType::Ptr(Box::new(inner_ty)))
            }
            Expr::Unary(UnOp::Deref, inner) => match self.expr_type(ctx, inner)? {
                CType::Ptr(pointee) => Ok(*pointee),
                CType::Array(elem, _) => Ok(*elem),
                other => Err(CompileError::SemanticError {
                    ident: ctx.proc.ident.clone(),
                    reason: format!("dereference of non-pointer type {:?}", other),
                }),
            },
            Expr::Unary(_, inner) => {
                let ty = self.expr_type(ctx, inner)?;
                Ok(CType::Int {
                    bits: ty.value_bits().max(16),
                    signed: ty.is_signed(),
                })
            }
            Expr::Postfix(_, inner) => self.expr_type(ctx, inner),
            Expr::Index(base, _) => match self.expr_type(ctx, base)? {
                CType::Ptr(pointee) => Ok(*pointee),
                CType::Array(elem, _) => Ok(*elem),
                other => Err(CompileError::SemanticError {
                    ident: ctx.proc.ident.clone(),
                    reason: format!("indexing into non-pointer type {:?}", other),
                }),
            },
            Expr::Call(callee, _) => {
                let name = match strip_parens(callee) {
                    Expr::Ident(tok) => tok.text.clone(),
                    _ => return Ok(CType::int16()),
                };
                Ok(self
                    .procs
                    .get(&name)
                    .map(|s| s.ret.clone())
                    .unwrap_or(CType::int16()))
            }
            Expr::Binary(op, lhs, rhs) => {
                if op.is_assign() {
                    return self.expr_type(ctx, lhs);
                }
                if matches!(
                    op,
                    BinOp::Eq
                        | BinOp::NotEq
                        | BinOp::Lt
                        | BinOp::LtEq
                        | BinOp::Gt
                        | BinOp::GtEq
                        | BinOp::LogAnd
                        | BinOp::LogOr
                ) {
                    return Ok(CType::int16());
                }
                let l = self.expr_type(ctx, lhs)?;
                let r = self.expr_type(ctx, rhs)?;
                if matches!(l, CType::Ptr(_) | CType::Array(_, _)) {
                    return Ok(l);
                }
                if matches!(r, CType::Ptr(_) | CType::Array(_, _)) {
                    return Ok(r);
                }
                Ok(CType::Int {
                    bits: l.value_bits().max(r.value_bits()).max(16),
                    signed: l.is_signed() && r.is_signed(),
                })
            }
            Expr::Ternary(_, then_expr, else_expr) => {
                let then_ty = self.expr_type(ctx, then_expr)?;
                let else_ty = self.expr_type(ctx, else_expr)?;
                Ok(merge_branch_types(&then_ty, &else_ty))
            }
            Expr::Comma(_, rhs) => self.expr_type(ctx, rhs),
            Expr::SizeofExpr(_) | Expr::SizeofType(_) => Ok(CType::Int {
                bits: 16,
                signed: false,
            }),
            other => Err(CompileError::SemanticError {
                ident: ctx.proc.ident.clone(),
                reason: format!("cannot type expression {:?}", other),
            }),
        }
    }
}

fn strip_parens(expr: &Expr) -> &Expr {
    match expr {
        Expr::Paren(inner) => strip_parens(inner),
        other => other,
    }
}

/// Result type of a two-branch value join: pointers win (arrays decay),
/// otherwise the wider integer, signed only when both sides are.
fn merge_branch_types(then_ty: &CType, else_ty: &CType) -> CType {
    match (then_ty, else_ty) {
        (CType::Ptr(_), _) => then_ty.clone(),
        (CType::Array(elem, _), _) => CType::Ptr(elem.clone()),
        (_, CType::Ptr(_)) => else_ty.clone(),
        (_, CType::Array(elem, _)) => CType::Ptr(elem.clone()),
        _ => CType::Int {
            bits: then_ty.value_bits().max(else_ty.value_bits()).max(16),
            signed: then_ty.is_signed() && else_ty.is_signed(),
        },
    }
}

/// Width of the narrowest supported integer type that holds the literal.
fn literal_bits(value: i64) -> u32 {
    if (-32768..=65535).contains(&value) {
        16
    } else if (-2147483648..=4294967295).contains(&value) {
        32
    } else {
        64
    }
}

// ------------- unit tests -------------

#[cfg(test)]
mod tests {
    use super::super::tests::lower;
    use super::*;
    use crate::ir::*;

    fn find_proc<'a>(ir: &'a IrModule, name: &str) -> &'a IrProc {
        ir.decls
            .iter()
            .find_map(|d| match d {
                IrDecl::Proc(p) if p.ident == name => Some(p),
                _ => None,
            })
            .unwrap_or_else(|| panic!("procedure {} not found", name))
    }

    fn instrs(proc: &IrProc) -> Vec<&IrInstr> {
        proc.body
            .entries
            .iter()
            .filter_map(|e| match e {
                IrEntry::Instr(i) => Some(i),
                _ => None,
            })
            .collect()
    }

    fn f_instrs(source: &str) -> (IrModule, Vec<IrInstr>) {
        let ir = lower(source).unwrap();
        let list = instrs(find_proc(&ir, "@f")).into_iter().cloned().collect();
        (ir, list)
    }

    #[test]
    fn test_merge_branch_types_widens() {
        let narrow = CType::Int {
            bits: 8,
            signed: true,
        };
        let wide = CType::Int {
            bits: 32,
            signed: true,
        };
        assert_eq!(
            merge_branch_types(&narrow, &wide),
            CType::Int {
                bits: 32,
                signed: true
            }
        );
        // mixed signedness joins unsigned
        let unsigned16 = CType::Int {
            bits: 16,
            signed: false,
        };
        assert_eq!(
            merge_branch_types(&narrow, &unsigned16),
            CType::Int {
                bits: 16,
                signed: false
            }
        );
        // pointers win, arrays decay
        let ptr = CType::Ptr(Box::new(CType::int16()));
        assert_eq!(merge_branch_types(&ptr, &narrow), ptr.clone());
        let arr = CType::Array(Box::new(CType::int16()), 4);
        assert_eq!(merge_branch_types(&narrow, &arr), ptr);
    }

    #[test]
    fn test_ternary_scratch_holds_wider_branch() {
        // the untaken arm is wider than the then arm; the scratch local
        // must be sized for both
        let ir = lower(
            "unsigned long f(int p) {
                 unsigned char c;
                 unsigned long w;
                 c = 1;
                 w = 70000;
                 return p ? c : w;
             }",
        )
        .unwrap();
        let proc = find_proc(&ir, "@f");
        let tmps: Vec<&IrProcLvar> = proc
            .lvars
            .iter()
            .filter(|l| l.name.starts_with("%_t"))
            .collect();
        // the ternary scratch plus the widening scratch for `c`
        assert_eq!(tmps.len(), 2);
        for tmp in tmps {
            assert_eq!(tmp.ty, IrType::Int { bits: 32 });
        }
        // the joined value is read back at full width right before retv
        let list = instrs(proc);
        let retv_at = list.iter().position(|i| i.op == IrOp::Retv).unwrap();
        assert_eq!(list[retv_at - 1].op, IrOp::Read);
        assert_eq!(list[retv_at - 1].width, 32);
    }

    #[test]
    fn test_logical_and_short_circuits_rhs() {
        let (_, list) = f_instrs("int f(int a, int b) { return a && b; }");
        let jz_targets: Vec<&IrOper> = list
            .iter()
            .filter(|i| i.op == IrOp::Jz)
            .map(|i| i.op2.as_ref().unwrap())
            .collect();
        // both operands guard to the same false label
        assert_eq!(jz_targets.len(), 2);
        assert_eq!(jz_targets[0], jz_targets[1]);
        assert!(matches!(jz_targets[0], IrOper::Var(l) if l.starts_with("%andf")));
        // the right operand is only loaded behind the first guard
        let first_jz = list.iter().position(|i| i.op == IrOp::Jz).unwrap();
        let rhs_load = list
            .iter()
            .rposition(|i| {
                i.op == IrOp::Lvarptr && i.op1 == Some(IrOper::var("%b"))
            })
            .unwrap();
        assert!(first_jz < rhs_load);
    }

    #[test]
    fn test_logical_or_short_circuits_on_true() {
        let (_, list) = f_instrs("int f(int a, int b) { return a || b; }");
        let jnz_targets: Vec<&IrOper> = list
            .iter()
            .filter(|i| i.op == IrOp::Jnz)
            .map(|i| i.op2.as_ref().unwrap())
            .collect();
        assert_eq!(jnz_targets.len(), 2);
        assert_eq!(jnz_targets[0], jnz_targets[1]);
        assert!(matches!(jnz_targets[0], IrOper::Var(l) if l.starts_with("%ort")));
    }

    #[test]
    fn test_pointer_plus_int_scales_by_pointee_size() {
        let ir = lower("long *f(long *p) { return p + 3; }").unwrap();
        let list = instrs(find_proc(&ir, "@f"));
        // the index is multiplied by sizeof(long) before the add
        assert!(list
            .iter()
            .any(|i| i.op == IrOp::Imm && i.op1 == Some(IrOper::Imm(4))));
        let mul_at = list.iter().position(|i| i.op == IrOp::Mul).unwrap();
        let add_at = list.iter().position(|i| i.op == IrOp::Add).unwrap();
        assert!(mul_at < add_at);
        assert_eq!(list[mul_at].width, 16);
        assert_eq!(list[add_at].width, 16);
    }

    #[test]
    fn test_pointer_minus_int_scales_too() {
        let ir = lower("long *f(long *p) { return p - 2; }").unwrap();
        let list = instrs(find_proc(&ir, "@f"));
        assert!(list
            .iter()
            .any(|i| i.op == IrOp::Imm && i.op1 == Some(IrOper::Imm(4))));
        assert!(list.iter().any(|i| i.op == IrOp::Mul));
        assert!(list.iter().any(|i| i.op == IrOp::Sub));
    }

    #[test]
    fn test_int_plus_pointer_commutes() {
        let ir = lower("char *f(char *p, int i) { return i + p; }").unwrap();
        let list = instrs(find_proc(&ir, "@f"));
        assert!(list
            .iter()
            .any(|i| i.op == IrOp::Imm && i.op1 == Some(IrOper::Imm(1))));
        assert!(list.iter().any(|i| i.op == IrOp::Mul));
        assert!(list.iter().any(|i| i.op == IrOp::Add));
    }

    #[test]
    fn test_pointer_difference_rejected() {
        let err = lower("int f(int *a, int *b) { return a - b; }").unwrap_err();
        match err {
            CompileError::SemanticError { reason, .. } => {
                assert!(reason.contains("pointer difference"));
            }
            other => panic!("expected semantic error, got {:?}", other),
        }
    }

    /// Each compound assignment reads the old value, applies its operator
    /// and writes back.
    fn assert_compound(source: &str, expected: IrOp) {
        let (_, list) = f_instrs(source);
        let op_at = list
            .iter()
            .position(|i| i.op == expected)
            .unwrap_or_else(|| panic!("{:?} not emitted for {}", expected, source));
        let write_back = list.iter().rposition(|i| i.op == IrOp::Write).unwrap();
        assert!(op_at < write_back, "no write-back after {:?}", expected);
    }

    #[test]
    fn test_compound_assignment_operators() {
        assert_compound("int f(int a, int b) { a += b; return a; }", IrOp::Add);
        assert_compound("int f(int a, int b) { a -= b; return a; }", IrOp::Sub);
        assert_compound("int f(int a, int b) { a *= b; return a; }", IrOp::Mul);
        assert_compound("int f(int a, int b) { a &= b; return a; }", IrOp::And);
        assert_compound("int f(int a, int b) { a |= b; return a; }", IrOp::Or);
        assert_compound("int f(int a, int b) { a ^= b; return a; }", IrOp::Xor);
        assert_compound("int f(int a, int b) { a <<= b; return a; }", IrOp::Shl);
    }

    #[test]
    fn test_shift_right_assign_follows_signedness() {
        assert_compound("int f(int a, int b) { a >>= b; return a; }", IrOp::Shra);
        assert_compound(
            "unsigned f(unsigned a, unsigned b) { a >>= b; return a; }",
            IrOp::Shrl,
        );
    }

    #[test]
    fn test_divide_assign_rejected() {
        let err = lower("int f(int a, int b) { a /= b; return a; }").unwrap_err();
        match err {
            CompileError::SemanticError { reason, .. } => {
                assert!(reason.contains("division"));
            }
            other => panic!("expected semantic error, got {:?}", other),
        }
        let err = lower("int f(int a, int b) { a %= b; return a; }").unwrap_err();
        assert!(matches!(err, CompileError::SemanticError { .. }));
    }

    #[test]
    fn test_post_increment_returns_old_value() {
        let (_, list) = f_instrs("int f(int a) { return a++; }");
        let add = list.iter().find(|i| i.op == IrOp::Add).unwrap();
        let retv = list.iter().find(|i| i.op == IrOp::Retv).unwrap();
        assert_eq!(retv.op1, add.op1);
    }

    #[test]
    fn test_pre_increment_returns_new_value() {
        let (_, list) = f_instrs("int f(int a) { return ++a; }");
        let add = list.iter().find(|i| i.op == IrOp::Add).unwrap();
        let retv = list.iter().find(|i| i.op == IrOp::Retv).unwrap();
        assert_eq!(retv.op1, add.dest);
    }

    #[test]
    fn test_post_decrement_returns_old_value() {
        let (_, list) = f_instrs("int f(int a) { return a--; }");
        let sub = list.iter().find(|i| i.op == IrOp::Sub).unwrap();
        let retv = list.iter().find(|i| i.op == IrOp::Retv).unwrap();
        assert_eq!(retv.op1, sub.op1);
    }

    #[test]
    fn test_incdec_writes_stepped_value_back() {
        let (_, list) = f_instrs("int f(int a) { a++; return a; }");
        let add_at = list.iter().position(|i| i.op == IrOp::Add).unwrap();
        let add_dest = list[add_at].dest.clone();
        // the stepped value is stored through the place address
        assert!(list[add_at + 1].op == IrOp::Write && list[add_at + 1].op2 == add_dest);
    }

    #[test]
    fn test_pointer_increment_steps_by_pointee_size() {
        let (_, list) = f_instrs("long *f(long *p) { p++; return p; }");
        // the step immediate is sizeof(long), not 1
        assert!(list
            .iter()
            .any(|i| i.op == IrOp::Imm && i.op1 == Some(IrOper::Imm(4))));
    }
}
