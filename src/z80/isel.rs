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

//! Instruction selection: rewrite each IR procedure into a Z80 instruction
//! stream over virtual registers. The selector knows the calling convention
//! but nothing about physical register assignment.

use super::argloc::{assign_arg_locs, ArgLocs, SlotHalf};
use super::instr::*;
use super::varmap::{build_varmap, VarMap, VarMapEntry};
use super::{mangle_global, mangle_label, AsmLine, DataItem, Z80Data, Z80Decl, Z80Module, Z80Proc};
use crate::errors::CompileError;
use crate::ir::*;
use std::collections::HashMap;

/// Callee facts the selector needs at call sites.
#[derive(Debug, Clone)]
struct ProcMeta {
    arg_sizes: Vec<u32>,
    is_variadic: bool,
}

/// Translate a whole IR module. Data declarations pass through with their
/// symbols mangled; extern procedures contribute no code.
pub fn select_module(ir: &IrModule) -> Result<Z80Module, CompileError> {
    let mut metas: HashMap<String, ProcMeta> = HashMap::new();
    for decl in &ir.decls {
        if let IrDecl::Proc(proc) = decl {
            metas.insert(
                proc.ident.clone(),
                ProcMeta {
                    arg_sizes: proc.args.iter().map(|a| a.ty.sizeof()).collect(),
                    is_variadic: proc.is_variadic,
                },
            );
        }
    }

    let mut out = Z80Module::default();
    for decl in &ir.decls {
        match decl {
            IrDecl::Var(var) => out.decls.push(Z80Decl::Data(select_data(var))),
            IrDecl::Proc(proc) if proc.is_extern => {}
            IrDecl::Proc(proc) => {
                let mut selector = ProcSelector::new(proc, &metas);
                out.decls.push(Z80Decl::Proc(selector.select()?));
            }
        }
    }
    Ok(out)
}

fn select_data(var: &IrVar) -> Z80Data {
    let items = var
        .data
        .iter()
        .map(|entry| match entry {
            DataEntry::Byte(b) => DataItem::Defb(*b),
            DataEntry::Word(w) => DataItem::Defw(*w),
            DataEntry::Dword(d) => DataItem::Defdw(*d),
            DataEntry::Qword(q) => DataItem::Defqw(*q),
            DataEntry::WordSym { symbol, addend } => {
                DataItem::DefwSym(mangle_global(symbol), *addend)
            }
        })
        .collect();
    Z80Data {
        ident: mangle_global(&var.ident),
        items,
    }
}

struct ProcSelector<'a> {
    proc: &'a IrProc,
    metas: &'a HashMap<String, ProcMeta>,
    varmap: VarMap,
    lines: Vec<AsmLine>,
    label_counter: u32,
    /// bytes pushed beyond the base frame, tracked symbolically
    sp_adjust: u32,
    lvar_offsets: HashMap<String, u16>,
    locals_size: u16,
}

impl<'a> ProcSelector<'a> {
    fn new(proc: &'a IrProc, metas: &'a HashMap<String, ProcMeta>) -> Self {
        let varmap = build_varmap(proc);

        let mut lvar_offsets = HashMap::new();
        let mut offset: u16 = 0;
        for lvar in &proc.lvars {
            lvar_offsets.insert(lvar.name.clone(), offset);
            offset += lvar.ty.sizeof() as u16;
        }

        ProcSelector {
            proc,
            metas,
            varmap,
            lines: Vec::new(),
            label_counter: 0,
            sp_adjust: 0,
            lvar_offsets,
            locals_size: offset,
        }
    }

    fn select(&mut self) -> Result<Z80Proc, CompileError> {
        self.select_entry()?;
        let proc = self.proc;
        for entry in &proc.body.entries {
            match entry {
                IrEntry::Label(label) => {
                    let mangled = mangle_label(&proc.ident, label);
                    self.lines.push(AsmLine::label(&mangled));
                }
                IrEntry::Instr(instr) => self.select_instr(instr)?,
            }
        }
        if self.sp_adjust != 0 {
            return Err(self.err(format!(
                "unbalanced stack adjustment of {} bytes at procedure end",
                self.sp_adjust
            )));
        }
        Ok(Z80Proc {
            ident: mangle_global(&self.proc.ident),
            lines: std::mem::take(&mut self.lines),
            vr_count: self.varmap.vr_count(),
            locals_size: self.locals_size,
        })
    }

    // --- shared helpers ---

    fn push(&mut self, instr: Instr) {
        self.lines.push(AsmLine::instr(instr));
    }

    fn push_label(&mut self, label: &str) {
        self.lines.push(AsmLine::label(label));
    }

    /// Fresh mangled helper label from a pattern stem.
    fn new_label(&mut self, stem: &str) -> String {
        let label = format!("%{}{}", stem, self.label_counter);
        self.label_counter += 1;
        mangle_label(&self.proc.ident, &label)
    }

    fn err(&self, reason: String) -> CompileError {
        CompileError::SemanticError {
            ident: self.proc.ident.clone(),
            reason,
        }
    }

    fn oper_var<'o>(&self, oper: &'o Option<IrOper>, what: &str) -> Result<&'o str, CompileError> {
        match oper {
            Some(IrOper::Var(name)) => Ok(name),
            other => Err(self.err(format!("expected {} operand, found {:?}", what, other))),
        }
    }

    fn vr(&self, name: &str) -> Result<VarMapEntry, CompileError> {
        self.varmap
            .get(name)
            .ok_or_else(|| self.err(format!("use of unmapped variable {}", name)))
    }

    /// Byte `b` of a mapped value.
    fn byte(entry: VarMapEntry, b: u32) -> VReg {
        if entry.bytes == 1 {
            VReg::whole(entry.base)
        } else {
            VReg::byte(entry.base, b)
        }
    }

    fn pair(entry: VarMapEntry, word: u32) -> VRegPair {
        VRegPair(entry.base + word)
    }

    // --- procedure entry ---

    /// Capture incoming arguments into their VRs: register parts first,
    /// stack parts through SFE-relative addressing (the stack image starts
    /// past the saved frame pointer and return address).
    fn select_entry(&mut self) -> Result<(), CompileError> {
        let sizes: Vec<(String, u32)> = self
            .proc
            .args
            .iter()
            .map(|arg| (arg.name.clone(), arg.ty.sizeof()))
            .collect();
        let locs = assign_arg_locs(&sizes, self.proc.is_variadic);

        // register parts first for every argument: the stack reads below run
        // through A and HL and would clobber slots not yet captured
        for loc in &locs.args {
            let entry = self.vr(&loc.name)?;
            for (word, slot) in loc.reg_slots.iter().enumerate() {
                match slot.half {
                    SlotHalf::Whole => {
                        self.push(Instr::LdVrrDd(Self::pair(entry, word as u32), slot.pair));
                    }
                    _ => {
                        let reg = slot.reg().unwrap();
                        self.push(Instr::LdVrR(Self::byte(entry, 0), reg));
                    }
                }
            }
        }

        for loc in &locs.args {
            let entry = self.vr(&loc.name)?;
            if loc.stack_bytes > 0 {
                let reg_bytes = loc.reg_slots.len() as u32 * 2;
                let value_bytes = entry.bytes.min(reg_bytes + loc.stack_bytes as u32);
                let addr = VRegPair(self.varmap.alloc_temp());
                self.push(Instr::LdVrrSfenn(addr, 4 + loc.stack_off));
                self.push(Instr::LdDdVrr(RegPair::HL, addr));
                for b in reg_bytes..value_bytes {
                    self.push(Instr::LdVrIhl(Self::byte(entry, b)));
                    if b + 1 < value_bytes {
                        self.push(Instr::IncSs(RegPair::HL));
                    }
                }
            }
        }
        Ok(())
    }

    // --- instruction dispatch ---

    fn select_instr(&mut self, instr: &IrInstr) -> Result<(), CompileError> {
        match instr.op {
            IrOp::Add | IrOp::Sub => self.select_add_sub(instr),
            IrOp::And | IrOp::Or | IrOp::Xor => self.select_bitwise(instr),
            IrOp::Bnot => self.select_bnot(instr),
            IrOp::Neg => self.select_neg(instr),
            IrOp::Shl | IrOp::Shra | IrOp::Shrl => self.select_shift(instr),
            IrOp::Mul => self.select_mul(instr),
            IrOp::Eq | IrOp::Neq => self.select_eq_neq(instr),
            IrOp::Lt
            | IrOp::Ltu
            | IrOp::Lteq
            | IrOp::Lteu
            | IrOp::Gt
            | IrOp::Gtu
            | IrOp::Gteq
            | IrOp::Gteu => self.select_ordered_cmp(instr),
            IrOp::Imm => self.select_imm(instr),
            IrOp::Jmp => {
                let label = self.oper_var(&instr.op1, "label")?;
                let mangled = mangle_label(&self.proc.ident, label);
                self.push(Instr::JpNn(Imm16::sym(&mangled)));
                Ok(())
            }
            IrOp::Jz | IrOp::Jnz => self.select_cond_jump(instr),
            IrOp::Call => self.select_call(instr),
            IrOp::Ret => {
                self.push(Instr::Ret);
                Ok(())
            }
            IrOp::Retv => self.select_retv(instr),
            IrOp::Read => self.select_read(instr),
            IrOp::Write => self.select_write(instr),
            IrOp::Varptr => {
                let dest = self.vr(self.oper_var(&instr.dest, "destination")?)?;
                let global = self.oper_var(&instr.op1, "global")?;
                let symbol = mangle_global(global);
                self.push(Instr::LdVrrNn(Self::pair(dest, 0), Imm16::sym(&symbol)));
                Ok(())
            }
            IrOp::Lvarptr => {
                let dest = self.vr(self.oper_var(&instr.dest, "destination")?)?;
                let lvar = self.oper_var(&instr.op1, "local variable")?;
                let offset = *self
                    .lvar_offsets
                    .get(lvar)
                    .ok_or_else(|| self.err(format!("unknown local variable {}", lvar)))?;
                self.push(Instr::LdVrrSfbnn(Self::pair(dest, 0), offset));
                Ok(())
            }
            IrOp::Nop => {
                self.push(Instr::Nop);
                Ok(())
            }
        }
    }

    fn three_operands(
        &self,
        instr: &IrInstr,
    ) -> Result<(VarMapEntry, VarMapEntry, VarMapEntry), CompileError> {
        let dest = self.vr(self.oper_var(&instr.dest, "destination")?)?;
        let op1 = self.vr(self.oper_var(&instr.op1, "source")?)?;
        let op2 = self.vr(self.oper_var(&instr.op2, "source")?)?;
        Ok((dest, op1, op2))
    }

    /// Byte-wise addition/subtraction through A; byte 0 sets the carry, the
    /// higher bytes consume it.
    fn select_add_sub(&mut self, instr: &IrInstr) -> Result<(), CompileError> {
        let (dest, op1, op2) = self.three_operands(instr)?;
        let bytes = instr.width.div_ceil(8);
        for b in 0..bytes {
            self.push(Instr::LdRVr(Reg::A, Self::byte(op1, b)));
            let op = match (instr.op, b) {
                (IrOp::Add, 0) => Instr::AddAVr(Self::byte(op2, b)),
                (IrOp::Add, _) => Instr::AdcAVr(Self::byte(op2, b)),
                (IrOp::Sub, 0) => Instr::SubVr(Self::byte(op2, b)),
                (IrOp::Sub, _) => Instr::SbcAVr(Self::byte(op2, b)),
                _ => unreachable!(),
            };
            self.push(op);
            self.push(Instr::LdVrR(Self::byte(dest, b), Reg::A));
        }
        Ok(())
    }

    fn select_bitwise(&mut self, instr: &IrInstr) -> Result<(), CompileError> {
        let (dest, op1, op2) = self.three_operands(instr)?;
        let bytes = instr.width.div_ceil(8);
        for b in 0..bytes {
            self.push(Instr::LdRVr(Reg::A, Self::byte(op1, b)));
            let op = match instr.op {
                IrOp::And => Instr::AndVr(Self::byte(op2, b)),
                IrOp::Or => Instr::OrVr(Self::byte(op2, b)),
                IrOp::Xor => Instr::XorVr(Self::byte(op2, b)),
                _ => unreachable!(),
            };
            self.push(op);
            self.push(Instr::LdVrR(Self::byte(dest, b), Reg::A));
        }
        Ok(())
    }

    fn select_bnot(&mut self, instr: &IrInstr) -> Result<(), CompileError> {
        let dest = self.vr(self.oper_var(&instr.dest, "destination")?)?;
        let op1 = self.vr(self.oper_var(&instr.op1, "source")?)?;
        let bytes = instr.width.div_ceil(8);
        for b in 0..bytes {
            self.push(Instr::LdRVr(Reg::A, Self::byte(op1, b)));
            self.push(Instr::Cpl);
            self.push(Instr::LdVrR(Self::byte(dest, b), Reg::A));
        }
        Ok(())
    }

    /// Two's complement: one's complement through A, then add one. The
    /// 16-bit case takes the `inc vrr` fast path.
    fn select_neg(&mut self, instr: &IrInstr) -> Result<(), CompileError> {
        let dest = self.vr(self.oper_var(&instr.dest, "destination")?)?;
        let op1 = self.vr(self.oper_var(&instr.op1, "source")?)?;
        let bytes = instr.width.div_ceil(8);

        for b in 0..bytes {
            self.push(Instr::LdRVr(Reg::A, Self::byte(op1, b)));
            self.push(Instr::Cpl);
            self.push(Instr::LdVrR(Self::byte(dest, b), Reg::A));
        }

        if bytes == 2 {
            self.push(Instr::IncVrr(Self::pair(dest, 0)));
            return Ok(());
        }
        self.push(Instr::LdRVr(Reg::A, Self::byte(dest, 0)));
        self.push(Instr::AddAN(1));
        self.push(Instr::LdVrR(Self::byte(dest, 0), Reg::A));
        for b in 1..bytes {
            self.push(Instr::LdRVr(Reg::A, Self::byte(dest, b)));
            self.push(Instr::AdcAN(0));
            self.push(Instr::LdVrR(Self::byte(dest, b), Reg::A));
        }
        Ok(())
    }

    /// Count-loop shifts: copy the value into the destination, count down an
    /// 8-bit counter and shift by one per round.
    fn select_shift(&mut self, instr: &IrInstr) -> Result<(), CompileError> {
        let (dest, op1, op2) = self.three_operands(instr)?;
        let bytes = instr.width.div_ceil(8);

        for b in 0..bytes {
            self.push(Instr::LdVrVr(Self::byte(dest, b), Self::byte(op1, b)));
        }
        let cnt = VReg::whole(self.varmap.alloc_temp());
        self.push(Instr::LdVrVr(cnt, Self::byte(op2, 0)));

        let rep = self.new_label("sh_rep");
        let end = self.new_label("sh_end");
        self.push_label(&rep);
        self.push(Instr::DecVr(cnt));
        self.push(Instr::JpCcNn(Cond::M, Imm16::sym(&end)));
        match instr.op {
            IrOp::Shl => {
                self.push(Instr::SlaVr(Self::byte(dest, 0)));
                for b in 1..bytes {
                    self.push(Instr::RlVr(Self::byte(dest, b)));
                }
            }
            IrOp::Shrl => {
                self.push(Instr::SrlVr(Self::byte(dest, bytes - 1)));
                for b in (0..bytes - 1).rev() {
                    self.push(Instr::RrVr(Self::byte(dest, b)));
                }
            }
            IrOp::Shra => {
                self.push(Instr::SraVr(Self::byte(dest, bytes - 1)));
                for b in (0..bytes - 1).rev() {
                    self.push(Instr::RrVr(Self::byte(dest, b)));
                }
            }
            _ => unreachable!(),
        }
        self.push(Instr::JpNn(Imm16::sym(&rep)));
        self.push_label(&end);
        Ok(())
    }

    /// Classic shift-and-add multiplication, one round per bit of the
    /// operand width.
    fn select_mul(&mut self, instr: &IrInstr) -> Result<(), CompileError> {
        let (dest, op1, op2) = self.three_operands(instr)?;
        let bytes = instr.width.div_ceil(8);
        let words = bytes.div_ceil(2).max(1);

        let t = self.alloc_temp_value(bytes, words);
        let u = self.alloc_temp_value(bytes, words);
        let cnt = VReg::whole(self.varmap.alloc_temp());

        // t := op1, u := op2, dest := 0, cnt := width
        for b in 0..bytes {
            self.push(Instr::LdVrVr(Self::byte(t, b), Self::byte(op1, b)));
        }
        for b in 0..bytes {
            self.push(Instr::LdVrVr(Self::byte(u, b), Self::byte(op2, b)));
        }
        for b in 0..bytes {
            self.push(Instr::LdVrN(Self::byte(dest, b), 0));
        }
        self.push(Instr::LdVrN(cnt, instr.width as u8));

        let rep = self.new_label("mul_rep");
        let noadd = self.new_label("mul_noadd");
        self.push_label(&rep);

        // u >>= 1 (logical), multiplier bit lands in carry
        self.push(Instr::SrlVr(Self::byte(u, bytes - 1)));
        for b in (0..bytes.saturating_sub(1)).rev() {
            self.push(Instr::RrVr(Self::byte(u, b)));
        }
        self.push(Instr::JpCcNn(Cond::NC, Imm16::sym(&noadd)));

        // dest += t
        for b in 0..bytes {
            self.push(Instr::LdRVr(Reg::A, Self::byte(dest, b)));
            if b == 0 {
                self.push(Instr::AddAVr(Self::byte(t, b)));
            } else {
                self.push(Instr::AdcAVr(Self::byte(t, b)));
            }
            self.push(Instr::LdVrR(Self::byte(dest, b), Reg::A));
        }

        self.push_label(&noadd);

        // t <<= 1
        self.push(Instr::SlaVr(Self::byte(t, 0)));
        for b in 1..bytes {
            self.push(Instr::RlVr(Self::byte(t, b)));
        }

        self.push(Instr::DecVr(cnt));
        self.push(Instr::JpCcNn(Cond::NZ, Imm16::sym(&rep)));
        Ok(())
    }

    fn alloc_temp_value(&mut self, bytes: u32, words: u32) -> VarMapEntry {
        let count = if bytes <= 1 { 1 } else { words };
        let base = self.varmap.alloc_temp();
        for _ in 1..count {
            self.varmap.alloc_temp();
        }
        VarMapEntry {
            base,
            count,
            bytes: bytes.max(1),
        }
    }

    /// Equality tests: any differing byte short-circuits to the inequality
    /// path. The result is a 16-bit 0-or-1.
    fn select_eq_neq(&mut self, instr: &IrInstr) -> Result<(), CompileError> {
        let (dest, op1, op2) = self.three_operands(instr)?;
        let bytes = instr.width.div_ceil(8);

        let diff = self.new_label("eq_diff");
        let end = self.new_label("eq_end");
        let (on_equal, on_diff) = match instr.op {
            IrOp::Eq => (1, 0),
            _ => (0, 1),
        };

        for b in 0..bytes {
            self.push(Instr::LdRVr(Reg::A, Self::byte(op1, b)));
            self.push(Instr::SubVr(Self::byte(op2, b)));
            self.push(Instr::JpCcNn(Cond::NZ, Imm16::sym(&diff)));
        }
        self.push(Instr::LdVrN(VReg::lo(dest.base), on_equal));
        self.push(Instr::LdVrN(VReg::hi(dest.base), 0));
        self.push(Instr::JpNn(Imm16::sym(&end)));
        self.push_label(&diff);
        self.push(Instr::LdVrN(VReg::lo(dest.base), on_diff));
        self.push(Instr::LdVrN(VReg::hi(dest.base), 0));
        self.push_label(&end);
        Ok(())
    }

    /// Ordered comparisons ride on a wide subtract: signed variants branch
    /// on the sign flag, unsigned on carry.
    fn select_ordered_cmp(&mut self, instr: &IrInstr) -> Result<(), CompileError> {
        let (dest, op1, op2) = self.three_operands(instr)?;
        let bytes = instr.width.div_ceil(8);

        // (left, right) order of the subtraction and the flag that means
        // "true" after it
        let (swap, cond) = match instr.op {
            IrOp::Lt => (false, Cond::M),
            IrOp::Gt => (true, Cond::M),
            IrOp::Lteq => (true, Cond::P),
            IrOp::Gteq => (false, Cond::P),
            IrOp::Ltu => (false, Cond::Cy),
            IrOp::Gtu => (true, Cond::Cy),
            IrOp::Lteu => (true, Cond::NC),
            IrOp::Gteu => (false, Cond::NC),
            _ => unreachable!(),
        };
        let (x, y) = if swap { (op2, op1) } else { (op1, op2) };

        let true_label = self.new_label("cmp_true");
        let end = self.new_label("cmp_end");

        for b in 0..bytes {
            self.push(Instr::LdRVr(Reg::A, Self::byte(x, b)));
            if b == 0 {
                self.push(Instr::SubVr(Self::byte(y, b)));
            } else {
                self.push(Instr::SbcAVr(Self::byte(y, b)));
            }
        }
        self.push(Instr::JpCcNn(cond, Imm16::sym(&true_label)));
        self.push(Instr::LdVrN(VReg::lo(dest.base), 0));
        self.push(Instr::LdVrN(VReg::hi(dest.base), 0));
        self.push(Instr::JpNn(Imm16::sym(&end)));
        self.push_label(&true_label);
        self.push(Instr::LdVrN(VReg::lo(dest.base), 1));
        self.push(Instr::LdVrN(VReg::hi(dest.base), 0));
        self.push_label(&end);
        Ok(())
    }

    fn select_imm(&mut self, instr: &IrInstr) -> Result<(), CompileError> {
        let dest = self.vr(self.oper_var(&instr.dest, "destination")?)?;
        let value = match instr.op1 {
            Some(IrOper::Imm(v)) => v,
            ref other => {
                return Err(self.err(format!("imm needs an immediate operand, found {:?}", other)));
            }
        };
        if instr.width <= 8 {
            self.push(Instr::LdVrN(Self::byte(dest, 0), value as u8));
            return Ok(());
        }
        let words = instr.width.div_ceil(16);
        for word in 0..words {
            let slice = ((value >> (16 * word)) & 0xFFFF) as i32;
            self.push(Instr::LdVrrNn(Self::pair(dest, word), Imm16::Val(slice)));
        }
        Ok(())
    }

    /// `jz`/`jnz`: or the halves of the 16-bit condition together and jump
    /// on the zero flag.
    fn select_cond_jump(&mut self, instr: &IrInstr) -> Result<(), CompileError> {
        let cond_var = self.vr(self.oper_var(&instr.op1, "condition")?)?;
        let label = self.oper_var(&instr.op2, "label")?;
        let mangled = mangle_label(&self.proc.ident, label);
        self.push(Instr::LdRVr(Reg::A, VReg::hi(cond_var.base)));
        self.push(Instr::OrVr(VReg::lo(cond_var.base)));
        let cond = if instr.op == IrOp::Jz { Cond::Z } else { Cond::NZ };
        self.push(Instr::JpCcNn(cond, Imm16::sym(&mangled)));
        Ok(())
    }

    /// Calls: stack arguments are pushed last argument first (words high to
    /// low within an argument), then register arguments are loaded last to
    /// first, then `call`; the stack is released with `inc SP` afterwards.
    fn select_call(&mut self, instr: &IrInstr) -> Result<(), CompileError> {
        let callee = self.oper_var(&instr.op1, "callee")?.to_string();
        let args = match &instr.op2 {
            Some(IrOper::List(list)) => list,
            other => {
                return Err(self.err(format!("call needs an operand list, found {:?}", other)));
            }
        };

        let meta = self
            .metas
            .get(&callee)
            .ok_or_else(|| self.err(format!("call to undefined procedure {}", callee)))?
            .clone();
        if args.len() < meta.arg_sizes.len()
            || (!meta.is_variadic && args.len() > meta.arg_sizes.len())
        {
            return Err(self.err(format!(
                "argument count mismatch calling {} ({} given, {} declared)",
                callee,
                args.len(),
                meta.arg_sizes.len()
            )));
        }

        // sizes: declared for fixed parameters, the value's own size for
        // variadic extras
        let mut sized_args: Vec<(String, u32, VarMapEntry)> = Vec::new();
        for (index, arg) in args.iter().enumerate() {
            let name = match arg {
                IrOper::Var(name) => name.clone(),
                other => {
                    return Err(self.err(format!("call argument must be a variable: {:?}", other)));
                }
            };
            let entry = self.vr(&name)?;
            let size = meta
                .arg_sizes
                .get(index)
                .copied()
                .unwrap_or(entry.bytes);
            sized_args.push((name, size, entry));
        }

        let loc_input: Vec<(String, u32)> = sized_args
            .iter()
            .map(|(name, size, _)| (name.clone(), *size))
            .collect();
        let locs: ArgLocs = assign_arg_locs(&loc_input, meta.is_variadic);

        // stack arguments, last to first; word counts follow the declared
        // argument size, not the (possibly wider) value holding it
        for (loc, (_, size, entry)) in locs.args.iter().zip(sized_args.iter()).rev() {
            if loc.stack_bytes == 0 {
                continue;
            }
            if entry.bytes == 1 {
                let tmp = self.varmap.alloc_temp();
                self.push(Instr::LdVrVr(VReg::lo(tmp), Self::byte(*entry, 0)));
                self.push(Instr::LdVrN(VReg::hi(tmp), 0));
                self.push(Instr::PushVrr(VRegPair(tmp)));
                self.sp_adjust += 2;
                continue;
            }
            let total_words = size.div_ceil(2);
            let reg_words = loc.reg_slots.len() as u32;
            for word in (reg_words..total_words).rev() {
                self.push(Instr::PushVrr(Self::pair(*entry, word)));
                self.sp_adjust += 2;
            }
        }

        // register arguments, last to first
        for (loc, (_, _, entry)) in locs.args.iter().zip(sized_args.iter()).rev() {
            for (word, slot) in loc.reg_slots.iter().enumerate().rev() {
                match slot.half {
                    SlotHalf::Whole => {
                        self.push(Instr::LdDdVrr(slot.pair, Self::pair(*entry, word as u32)));
                    }
                    _ => {
                        let reg = slot.reg().unwrap();
                        self.push(Instr::LdRVr(reg, Self::byte(*entry, 0)));
                    }
                }
            }
        }

        self.push(Instr::CallNn(Imm16::sym(&mangle_global(&callee))));

        if let Some(IrOper::Var(dest)) = &instr.dest {
            let dest = self.vr(dest)?;
            self.push(Instr::LdVrrDd(Self::pair(dest, 0), RegPair::BC));
        }

        for _ in 0..locs.stack_total {
            self.push(Instr::IncSs(RegPair::SP));
            self.sp_adjust -= 1;
        }
        Ok(())
    }

    /// Return value travels in BC.
    fn select_retv(&mut self, instr: &IrInstr) -> Result<(), CompileError> {
        let src = self.vr(self.oper_var(&instr.op1, "return value")?)?;
        if instr.width > 16 {
            return Err(self.err(format!(
                "return value of {} bits does not fit the BC convention",
                instr.width
            )));
        }
        if instr.width <= 8 {
            self.push(Instr::LdRVr(Reg::C, Self::byte(src, 0)));
            self.push(Instr::LdRN(Reg::B, 0));
        } else {
            self.push(Instr::LdDdVrr(RegPair::BC, Self::pair(src, 0)));
        }
        self.push(Instr::Ret);
        Ok(())
    }

    /// Memory read through HL, one byte per step.
    fn select_read(&mut self, instr: &IrInstr) -> Result<(), CompileError> {
        let dest = self.vr(self.oper_var(&instr.dest, "destination")?)?;
        let addr = self.vr(self.oper_var(&instr.op1, "address")?)?;
        let bytes = instr.width.div_ceil(8);
        self.push(Instr::LdDdVrr(RegPair::HL, Self::pair(addr, 0)));
        for b in 0..bytes {
            self.push(Instr::LdVrIhl(Self::byte(dest, b)));
            if b + 1 < bytes {
                self.push(Instr::IncSs(RegPair::HL));
            }
        }
        Ok(())
    }

    fn select_write(&mut self, instr: &IrInstr) -> Result<(), CompileError> {
        let addr = self.vr(self.oper_var(&instr.op1, "address")?)?;
        let value = self.vr(self.oper_var(&instr.op2, "value")?)?;
        let bytes = instr.width.div_ceil(8);
        self.push(Instr::LdDdVrr(RegPair::HL, Self::pair(addr, 0)));
        for b in 0..bytes {
            self.push(Instr::LdIhlVr(Self::byte(value, b)));
            if b + 1 < bytes {
                self.push(Instr::IncSs(RegPair::HL));
            }
        }
        Ok(())
    }
}

// ------------- unit tests -------------
