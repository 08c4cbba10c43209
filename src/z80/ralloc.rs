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

//! Register allocation: every virtual register gets a two-byte slot in the
//! procedure's stack frame and every virtual instruction is rewritten into
//! physical operations that go through A or a register pair.
//!
//! Frame layout, addresses growing upward: the local variable area, then VR
//! N-1 down to VR 0, then the saved caller IX. After the prologue IX points
//! at the saved IX, so VR k sits at IX-2(k+1) and is reachable with a signed
//! byte displacement while the frame is small.

use super::instr::*;
use super::{AsmLine, Z80Decl, Z80Module, Z80Proc};

/// Rewrite a whole module into physical form. Data declarations pass
/// through unchanged.
pub fn allocate_module(module: &Z80Module) -> Z80Module {
    let mut out = Z80Module::default();
    for decl in &module.decls {
        match decl {
            Z80Decl::Data(data) => out.decls.push(Z80Decl::Data(data.clone())),
            Z80Decl::Proc(proc) => {
                let mut allocator = ProcAllocator::new(proc);
                out.decls.push(Z80Decl::Proc(allocator.allocate()));
            }
        }
    }
    out
}

struct ProcAllocator<'a> {
    proc: &'a Z80Proc,
    out: Vec<AsmLine>,
    /// locals plus VR slots; the saved IX sits above this
    frame_size: i32,
    /// bytes pushed onto the stack beyond the base frame
    sp_adjust: i32,
    label_counter: u32,
}

impl<'a> ProcAllocator<'a> {
    fn new(proc: &'a Z80Proc) -> Self {
        ProcAllocator {
            proc,
            out: Vec::new(),
            frame_size: proc.locals_size as i32 + 2 * proc.vr_count as i32,
            sp_adjust: 0,
            label_counter: 0,
        }
    }

    fn allocate(&mut self) -> Z80Proc {
        self.emit_prologue();
        let proc = self.proc;
        for line in &proc.lines {
            if let Some(label) = &line.label {
                self.out.push(AsmLine::label(label));
            }
            if let Some(instr) = &line.instr {
                self.lower(instr);
            }
        }
        Z80Proc {
            ident: self.proc.ident.clone(),
            lines: std::mem::take(&mut self.out),
            vr_count: self.proc.vr_count,
            locals_size: self.proc.locals_size,
        }
    }

    // --- plumbing ---

    fn push(&mut self, instr: Instr) {
        self.out.push(AsmLine::instr(instr));
    }

    fn new_label(&mut self, stem: &str) -> String {
        let name = self.proc.ident.strip_prefix('_').unwrap_or(&self.proc.ident);
        let label = format!("ra_{}_{}{}", name, stem, self.label_counter);
        self.label_counter += 1;
        label
    }

    /// Every SP-modifying effect funnels through these two helpers so that
    /// stack-relative addressing stays correct.
    fn emit_push(&mut self, pair: RegPair) {
        self.push(Instr::PushQq(pair));
        self.sp_adjust += 2;
    }

    fn emit_pop(&mut self, pair: RegPair) {
        self.push(Instr::PopQq(pair));
        self.sp_adjust -= 2;
    }

    /// Displacement of a VR slot from IX: VR k occupies IX-2(k+1), high
    /// half one above the low half.
    fn vr_rel(&self, vr: VReg) -> i32 {
        let part = match vr.part {
            VrPart::Hi => 1,
            _ => 0,
        };
        -2 * (vr.num as i32 + 1) + part
    }

    fn pair_rel(&self, vrr: VRegPair) -> i32 {
        -2 * (vrr.0 as i32 + 1)
    }

    // --- idxacc ---

    /// Make `(IX+d)` reach `size` bytes at the given IX-relative offset.
    /// In-range targets use the offset directly; out-of-range targets move
    /// IX near the target with flags preserved. Returns the displacement and
    /// whether a teardown is owed.
    fn idxacc(&mut self, rel: i32, size: i32) -> (i8, bool) {
        if rel >= -128 && rel + size - 1 <= 127 {
            return (rel as i8, false);
        }
        self.emit_ix_adjust(rel);
        (0, true)
    }

    /// `ld IX, offset@SP; push AF; add IX, SP; pop AF` — the offset is taken
    /// relative to SP at the `add`, which runs with AF pushed.
    fn emit_ix_adjust(&mut self, rel: i32) {
        let from_sp = rel + self.frame_size + self.sp_adjust + 2;
        self.push(Instr::LdDdNn(RegPair::IX, Imm16::Val(from_sp)));
        self.emit_push(RegPair::AF);
        self.push(Instr::AddIxSs(RegPair::SP));
        self.emit_pop(RegPair::AF);
    }

    /// Restore IX to the frame end after a temporary adjustment.
    fn teardown(&mut self, adjusted: bool) {
        if adjusted {
            self.emit_ix_adjust(0);
        }
    }

    // --- fill / spill ---

    fn fill(&mut self, reg: Reg, vr: VReg) {
        let (d, adjusted) = self.idxacc(self.vr_rel(vr), 1);
        self.push(Instr::LdRIxd(reg, d));
        self.teardown(adjusted);
    }

    fn spill(&mut self, vr: VReg, reg: Reg) {
        let (d, adjusted) = self.idxacc(self.vr_rel(vr), 1);
        self.push(Instr::LdIxdR(d, reg));
        self.teardown(adjusted);
    }

    /// Fill a register pair, low half then high half.
    fn fill_pair(&mut self, pair: RegPair, vrr: VRegPair) {
        let (lo, hi) = pair.split().unwrap();
        let (d, adjusted) = self.idxacc(self.pair_rel(vrr), 2);
        self.push(Instr::LdRIxd(lo, d));
        self.push(Instr::LdRIxd(hi, d + 1));
        self.teardown(adjusted);
    }

    fn spill_pair(&mut self, vrr: VRegPair, pair: RegPair) {
        let (lo, hi) = pair.split().unwrap();
        let (d, adjusted) = self.idxacc(self.pair_rel(vrr), 2);
        self.push(Instr::LdIxdR(d, lo));
        self.push(Instr::LdIxdR(d + 1, hi));
        self.teardown(adjusted);
    }

    /// A memory operand on a VR slot with flags untouched around the
    /// access, for the arithmetic group.
    fn with_slot<F: FnOnce(i8) -> Instr>(&mut self, vr: VReg, build: F) {
        let (d, adjusted) = self.idxacc(self.vr_rel(vr), 1);
        self.push(build(d));
        self.teardown(adjusted);
    }

    // --- prologue / epilogue ---

    /// `push IX; ld IX,-size; add IX,SP; ld SP,IX; ld IX,+size; add IX,SP`
    /// leaves SP at the frame bottom and IX just past the frame end.
    fn emit_prologue(&mut self) {
        self.push(Instr::PushQq(RegPair::IX));
        self.push(Instr::LdDdNn(RegPair::IX, Imm16::Val(-self.frame_size)));
        self.push(Instr::AddIxSs(RegPair::SP));
        self.push(Instr::LdSpIx);
        self.push(Instr::LdDdNn(RegPair::IX, Imm16::Val(self.frame_size)));
        self.push(Instr::AddIxSs(RegPair::SP));
    }

    fn emit_epilogue(&mut self) {
        self.push(Instr::LdSpIx);
        self.push(Instr::PopQq(RegPair::IX));
        self.push(Instr::Ret);
    }

    // --- instruction lowering ---

    fn lower(&mut self, instr: &Instr) {
        match instr {
            Instr::LdVrN(vr, n) => {
                let (d, adjusted) = self.idxacc(self.vr_rel(*vr), 1);
                self.push(Instr::LdIxdN(d, *n));
                self.teardown(adjusted);
            }
            Instr::LdVrVr(dest, src) => {
                self.fill(Reg::A, *src);
                self.spill(*dest, Reg::A);
            }
            Instr::LdVrR(vr, reg) => self.spill(*vr, *reg),
            Instr::LdRVr(reg, vr) => self.fill(*reg, *vr),
            Instr::LdVrrNn(vrr, imm) => {
                self.push(Instr::LdDdNn(RegPair::HL, imm.clone()));
                self.spill_pair(*vrr, RegPair::HL);
            }
            Instr::LdVrrDd(vrr, pair) => self.spill_pair(*vrr, *pair),
            Instr::LdDdVrr(pair, vrr) => self.fill_pair(*pair, *vrr),
            Instr::LdVrIhl(vr) => {
                self.push(Instr::LdRIhl(Reg::A));
                self.spill(*vr, Reg::A);
            }
            Instr::LdIhlVr(vr) => {
                self.fill(Reg::A, *vr);
                self.push(Instr::LdIhlR(Reg::A));
            }
            Instr::LdVrrSfbnn(vrr, nn) => {
                let from_sp = *nn as i32 + self.sp_adjust;
                self.push(Instr::LdDdNn(RegPair::HL, Imm16::Val(from_sp)));
                self.push(Instr::AddHlSs(RegPair::SP));
                self.spill_pair(*vrr, RegPair::HL);
            }
            Instr::LdVrrSfenn(vrr, nn) => {
                let from_sp = *nn as i32 + self.frame_size + self.sp_adjust;
                self.push(Instr::LdDdNn(RegPair::HL, Imm16::Val(from_sp)));
                self.push(Instr::AddHlSs(RegPair::SP));
                self.spill_pair(*vrr, RegPair::HL);
            }
            Instr::AddAVr(vr) => self.with_slot(*vr, Instr::AddAIxd),
            Instr::AdcAVr(vr) => self.with_slot(*vr, Instr::AdcAIxd),
            Instr::SubVr(vr) => self.with_slot(*vr, Instr::SubIxd),
            Instr::SbcAVr(vr) => self.with_slot(*vr, Instr::SbcAIxd),
            Instr::AndVr(vr) => self.with_slot(*vr, Instr::AndIxd),
            Instr::OrVr(vr) => self.with_slot(*vr, Instr::OrIxd),
            Instr::XorVr(vr) => self.with_slot(*vr, Instr::XorIxd),
            Instr::IncVrr(vrr) => {
                let nocarry = self.new_label("nocarry");
                let (d, adjusted) = self.idxacc(self.pair_rel(*vrr), 2);
                self.push(Instr::IncIxd(d));
                self.push(Instr::JpCcNn(Cond::NZ, Imm16::sym(&nocarry)));
                self.push(Instr::IncIxd(d + 1));
                self.out.push(AsmLine::label(&nocarry));
                self.teardown(adjusted);
            }
            Instr::DecVr(vr) => self.with_slot(*vr, Instr::DecIxd),
            Instr::SlaVr(vr) => self.with_slot(*vr, Instr::SlaIxd),
            Instr::RlVr(vr) => self.with_slot(*vr, Instr::RlIxd),
            Instr::SraVr(vr) => self.with_slot(*vr, Instr::SraIxd),
            Instr::SrlVr(vr) => self.with_slot(*vr, Instr::SrlIxd),
            Instr::RrVr(vr) => self.with_slot(*vr, Instr::RrIxd),
            Instr::PushVrr(vrr) => {
                self.fill_pair(RegPair::HL, *vrr);
                self.emit_push(RegPair::HL);
            }
            Instr::Ret => {
                // a ret while pushed bytes remain is the tail of an
                // indirect-call stub, not a procedure return
                if self.sp_adjust == 0 {
                    self.emit_epilogue();
                } else {
                    self.push(Instr::Ret);
                    self.sp_adjust = (self.sp_adjust - 4).max(0);
                }
            }
            Instr::IncSs(RegPair::SP) => {
                self.push(Instr::IncSs(RegPair::SP));
                self.sp_adjust -= 1;
            }
            Instr::PushQq(pair) => self.emit_push(*pair),
            Instr::PopQq(pair) => self.emit_pop(*pair),
            other => self.push(other.clone()),
        }
    }
}

// ------------- unit tests -------------

#[cfg(test)]
mod tests {
    use super::*;

    fn proc_of(lines: Vec<AsmLine>, vr_count: u32, locals_size: u16) -> Z80Proc {
        Z80Proc {
            ident: "_f".to_string(),
            lines,
            vr_count,
            locals_size,
        }
    }

    fn allocate(proc: Z80Proc) -> Z80Proc {
        let mut module = Z80Module::default();
        module.decls.push(Z80Decl::Proc(proc));
        let out = allocate_module(&module);
        match out.decls.into_iter().next().unwrap() {
            Z80Decl::Proc(p) => p,
            other => panic!("expected proc, got {:?}", other),
        }
    }

    fn texts(proc: &Z80Proc) -> Vec<String> {
        proc.lines
            .iter()
            .filter_map(|l| l.instr.as_ref().map(|i| i.to_string()))
            .collect()
    }

    #[test]
    fn test_no_virtual_operands_remain() {
        let proc = proc_of(
            vec![
                AsmLine::instr(Instr::LdVrrNn(VRegPair(0), Imm16::Val(7))),
                AsmLine::instr(Instr::LdVrVr(VReg::whole(1), VReg::lo(0))),
                AsmLine::instr(Instr::PushVrr(VRegPair(0))),
                AsmLine::instr(Instr::IncSs(RegPair::SP)),
                AsmLine::instr(Instr::IncSs(RegPair::SP)),
                AsmLine::instr(Instr::Ret),
            ],
            2,
            0,
        );
        let out = allocate(proc);
        for line in &out.lines {
            if let Some(instr) = &line.instr {
                assert!(!instr.is_virtual(), "virtual instruction left: {}", instr);
            }
        }
    }

    #[test]
    fn test_prologue_shape() {
        let proc = proc_of(vec![AsmLine::instr(Instr::Ret)], 2, 3);
        let out = allocate(proc);
        let text = texts(&out);
        // frame: 3 bytes of locals plus two VR slots
        assert_eq!(text[0], "push IX");
        assert_eq!(text[1], "ld IX, -7");
        assert_eq!(text[2], "add IX, SP");
        assert_eq!(text[3], "ld SP, IX");
        assert_eq!(text[4], "ld IX, 7");
        assert_eq!(text[5], "add IX, SP");
    }

    #[test]
    fn test_ret_gets_epilogue() {
        let proc = proc_of(vec![AsmLine::instr(Instr::Ret)], 1, 0);
        let out = allocate(proc);
        let text = texts(&out);
        let len = text.len();
        assert_eq!(text[len - 3], "ld SP, IX");
        assert_eq!(text[len - 2], "pop IX");
        assert_eq!(text[len - 1], "ret");
    }

    #[test]
    fn test_vr_slots_addressed_from_ix() {
        let proc = proc_of(
            vec![AsmLine::instr(Instr::LdVrVr(VReg::whole(0), VReg::whole(2)))],
            3,
            0,
        );
        let out = allocate(proc);
        let text = texts(&out);
        // VR 2 at IX-6, VR 0 at IX-2
        assert_eq!(text[6], "ld A, (IX-6)");
        assert_eq!(text[7], "ld (IX-2), A");
    }

    #[test]
    fn test_vrr_fill_low_then_high() {
        let proc = proc_of(
            vec![AsmLine::instr(Instr::LdDdVrr(RegPair::BC, VRegPair(1)))],
            2,
            0,
        );
        let out = allocate(proc);
        let text = texts(&out);
        // VR pair 1 at IX-4/IX-3
        assert_eq!(text[6], "ld C, (IX-4)");
        assert_eq!(text[7], "ld B, (IX-3)");
    }

    #[test]
    fn test_idxacc_near_no_adjustment() {
        let proc = proc_of(
            vec![AsmLine::instr(Instr::AddAVr(VReg::whole(0)))],
            4,
            0,
        );
        let out = allocate(proc);
        let text = texts(&out);
        assert_eq!(text[6], "add A, (IX-2)");
        // no on-the-fly IX adjustment anywhere
        assert!(!text.iter().any(|t| t == "push AF"));
    }

    #[test]
    fn test_idxacc_far_adjusts_and_restores() {
        // 100 VR pairs: VR 99 sits at IX-200, out of signed byte range
        let proc = proc_of(
            vec![AsmLine::instr(Instr::AddAVr(VReg::whole(99)))],
            100,
            0,
        );
        let out = allocate(proc);
        let text = texts(&out);
        // frame is 200 bytes; the slot is materialized from SP: -200
        // +200(frame) +0(adjust) +2(pushed AF) = 2
        let at = text.iter().position(|t| t == "ld IX, 2").unwrap();
        assert_eq!(text[at + 1], "push AF");
        assert_eq!(text[at + 2], "add IX, SP");
        assert_eq!(text[at + 3], "pop AF");
        assert_eq!(text[at + 4], "add A, (IX+0)");
        // matching teardown restores IX to the frame end: 0 +200 +2 = 202
        let restore = text.iter().position(|t| t == "ld IX, 202").unwrap();
        assert!(restore > at);
        assert_eq!(text[restore + 1], "push AF");
        assert_eq!(text[restore + 2], "add IX, SP");
        assert_eq!(text[restore + 3], "pop AF");
    }

    #[test]
    fn test_push_vrr_raises_sp_adjust() {
        // a push before an SFB address computation shifts the SP-relative
        // offset by two
        let proc = proc_of(
            vec![
                AsmLine::instr(Instr::LdVrrSfbnn(VRegPair(0), 0)),
                AsmLine::instr(Instr::PushVrr(VRegPair(0))),
                AsmLine::instr(Instr::LdVrrSfbnn(VRegPair(1), 0)),
            ],
            2,
            4,
        );
        let out = allocate(proc);
        let text = texts(&out);
        let first = text.iter().position(|t| t == "ld HL, 0").unwrap();
        assert_eq!(text[first + 1], "add HL, SP");
        // after push HL the same frame offset is two bytes further from SP
        let second = text.iter().position(|t| t == "ld HL, 2").unwrap();
        assert!(second > first);
    }

    #[test]
    fn test_inc_vrr_carry_chain() {
        let proc = proc_of(vec![AsmLine::instr(Instr::IncVrr(VRegPair(0)))], 1, 0);
        let out = allocate(proc);
        let text = texts(&out);
        assert_eq!(text[6], "inc (IX-2)");
        assert!(text[7].starts_with("jp NZ, ra_f_nocarry"));
        assert_eq!(text[8], "inc (IX-1)");
        // the skip label lands after the high-byte increment
        let label_line = out
            .lines
            .iter()
            .position(|l| l.label.as_deref().is_some_and(|s| s.starts_with("ra_f_nocarry")))
            .unwrap();
        assert!(label_line > 0);
    }

    #[test]
    fn test_sfe_addressing_accounts_for_frame() {
        let proc = proc_of(
            vec![AsmLine::instr(Instr::LdVrrSfenn(VRegPair(0), 4))],
            1,
            2,
        );
        let out = allocate(proc);
        let text = texts(&out);
        // frame = 2 locals + 2 VR bytes; SFE+4 = SP + 4 + 4
        assert!(text.contains(&"ld HL, 8".to_string()));
        assert!(text.contains(&"add HL, SP".to_string()));
    }

    #[test]
    fn test_sp_adjust_zero_at_plain_ret() {
        let proc = proc_of(
            vec![
                AsmLine::instr(Instr::PushVrr(VRegPair(0))),
                AsmLine::instr(Instr::IncSs(RegPair::SP)),
                AsmLine::instr(Instr::IncSs(RegPair::SP)),
                AsmLine::instr(Instr::Ret),
            ],
            1,
            0,
        );
        let out = allocate(proc);
        let text = texts(&out);
        // the counter returned to zero, so the ret carries a full epilogue
        let len = text.len();
        assert_eq!(text[len - 3], "ld SP, IX");
        assert_eq!(text[len - 2], "pop IX");
        assert_eq!(text[len - 1], "ret");
    }

    #[test]
    fn test_ret_with_outstanding_push_skips_epilogue() {
        let proc = proc_of(
            vec![
                AsmLine::instr(Instr::PushVrr(VRegPair(0))),
                AsmLine::instr(Instr::PushVrr(VRegPair(0))),
                AsmLine::instr(Instr::Ret),
            ],
            1,
            0,
        );
        let out = allocate(proc);
        let text = texts(&out);
        // no epilogue: the ret is an indirect-call stub tail
        assert_eq!(text.last().unwrap(), "ret");
        assert_ne!(text[text.len() - 2], "pop IX");
    }
}
