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

//! The Z80 instruction set as used by the back end: physical forms plus the
//! virtual-register forms that exist between instruction selection and
//! register allocation.

use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reg {
    A,
    B,
    C,
    D,
    E,
    H,
    L,
}

impl fmt::Display for Reg {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Reg::A => "A",
            Reg::B => "B",
            Reg::C => "C",
            Reg::D => "D",
            Reg::E => "E",
            Reg::H => "H",
            Reg::L => "L",
        };
        write!(f, "{}", name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegPair {
    AF,
    BC,
    DE,
    HL,
    IX,
    IY,
    SP,
}

impl RegPair {
    /// Low and high component registers of the general-purpose pairs.
    pub fn split(&self) -> Option<(Reg, Reg)> {
        match self {
            RegPair::BC => Some((Reg::C, Reg::B)),
            RegPair::DE => Some((Reg::E, Reg::D)),
            RegPair::HL => Some((Reg::L, Reg::H)),
            _ => None,
        }
    }
}

impl fmt::Display for RegPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            RegPair::AF => "AF",
            RegPair::BC => "BC",
            RegPair::DE => "DE",
            RegPair::HL => "HL",
            RegPair::IX => "IX",
            RegPair::IY => "IY",
            RegPair::SP => "SP",
        };
        write!(f, "{}", name)
    }
}

/// Jump conditions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Cond {
    NZ,
    Z,
    NC,
    Cy,
    P,
    M,
}

impl fmt::Display for Cond {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Cond::NZ => "NZ",
            Cond::Z => "Z",
            Cond::NC => "NC",
            Cond::Cy => "C",
            Cond::P => "P",
            Cond::M => "M",
        };
        write!(f, "{}", name)
    }
}

/// Which portion of a virtual register pair an 8-bit access means.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VrPart {
    Whole8,
    Lo,
    Hi,
}

/// An 8-bit virtual register reference: pair number plus part.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VReg {
    pub num: u32,
    pub part: VrPart,
}

impl VReg {
    pub fn whole(num: u32) -> Self {
        VReg {
            num,
            part: VrPart::Whole8,
        }
    }

    pub fn lo(num: u32) -> Self {
        VReg {
            num,
            part: VrPart::Lo,
        }
    }

    pub fn hi(num: u32) -> Self {
        VReg {
            num,
            part: VrPart::Hi,
        }
    }

    /// Byte `b` of a value whose least-significant pair is `base`.
    pub fn byte(base: u32, b: u32) -> Self {
        VReg {
            num: base + b / 2,
            part: if b % 2 == 0 { VrPart::Lo } else { VrPart::Hi },
        }
    }
}

impl fmt::Display for VReg {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.part {
            VrPart::Whole8 => write!(f, "%{}", self.num),
            VrPart::Lo => write!(f, "%{}.L", self.num),
            VrPart::Hi => write!(f, "%{}.H", self.num),
        }
    }
}

/// A 16-bit virtual register pair reference.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VRegPair(pub u32);

impl fmt::Display for VRegPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "%%{}", self.0)
    }
}

/// A 16-bit immediate: a plain value, a symbol reference, or a symbol with a
/// byte addend. Symbols stay unresolved until final assembly.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Imm16 {
    Val(i32),
    Sym(String),
    SymOff(String, i32),
}

impl Imm16 {
    pub fn sym(name: &str) -> Self {
        Imm16::Sym(name.to_string())
    }
}

impl fmt::Display for Imm16 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Imm16::Val(v) => write!(f, "{}", v),
            Imm16::Sym(s) => write!(f, "{}", s),
            Imm16::SymOff(s, off) if *off >= 0 => write!(f, "{}+{}", s, off),
            Imm16::SymOff(s, off) => write!(f, "{}{}", s, off),
        }
    }
}

fn ixd(d: i8) -> String {
    if d >= 0 {
        format!("(IX+{})", d)
    } else {
        format!("(IX{})", d)
    }
}

/// One Z80 instruction, physical or virtual.
#[derive(Debug, Clone, PartialEq)]
pub enum Instr {
    // --- physical loads ---
    LdRN(Reg, u8),         // ld r, n
    LdRIhl(Reg),           // ld r, (HL)
    LdIhlR(Reg),           // ld (HL), r
    LdRIxd(Reg, i8),       // ld r, (IX+d)
    LdIxdR(i8, Reg),       // ld (IX+d), r
    LdIxdN(i8, u8),        // ld (IX+d), n
    LdDdNn(RegPair, Imm16), // ld dd, nn
    LdSpIx,                // ld SP, IX

    // --- physical arithmetic ---
    AddAN(u8),
    AddAIxd(i8),
    AdcAN(u8),
    AdcAIxd(i8),
    SubIxd(i8),
    SbcAIxd(i8),
    AndIxd(i8),
    OrIxd(i8),
    XorIxd(i8),
    AddHlSs(RegPair),
    AddIxSs(RegPair), // add IX, pp
    IncSs(RegPair),
    IncIxd(i8),
    DecIxd(i8),
    Cpl,

    // --- physical shifts on frame slots ---
    SlaIxd(i8),
    RlIxd(i8),
    SraIxd(i8),
    SrlIxd(i8),
    RrIxd(i8),

    // --- control flow and stack ---
    JpNn(Imm16),
    JpCcNn(Cond, Imm16),
    CallNn(Imm16),
    Ret,
    PushQq(RegPair),
    PopQq(RegPair),
    Nop,

    // --- virtual forms ---
    LdVrN(VReg, u8),            // ld vr, n
    LdVrVr(VReg, VReg),         // ld vr, vr'
    LdVrR(VReg, Reg),           // ld vr, r
    LdRVr(Reg, VReg),           // ld r, vr
    LdVrrNn(VRegPair, Imm16),   // ld vrr, nn
    LdVrrDd(VRegPair, RegPair), // ld vrr, dd
    LdDdVrr(RegPair, VRegPair), // ld dd, vrr
    LdVrIhl(VReg),              // ld vr, (HL)
    LdIhlVr(VReg),              // ld (HL), vr
    LdVrrSfbnn(VRegPair, u16),  // ld vrr, SFB+nn
    LdVrrSfenn(VRegPair, u16),  // ld vrr, SFE+nn
    AddAVr(VReg),
    AdcAVr(VReg),
    SubVr(VReg),
    SbcAVr(VReg),
    AndVr(VReg),
    OrVr(VReg),
    XorVr(VReg),
    IncVrr(VRegPair),
    DecVr(VReg),
    SlaVr(VReg),
    RlVr(VReg),
    SraVr(VReg),
    SrlVr(VReg),
    RrVr(VReg),
    PushVrr(VRegPair),
}

impl Instr {
    /// True while any operand is of virtual kind; the register allocator
    /// removes all of these.
    pub fn is_virtual(&self) -> bool {
        matches!(
            self,
            Instr::LdVrN(_, _)
                | Instr::LdVrVr(_, _)
                | Instr::LdVrR(_, _)
                | Instr::LdRVr(_, _)
                | Instr::LdVrrNn(_, _)
                | Instr::LdVrrDd(_, _)
                | Instr::LdDdVrr(_, _)
                | Instr::LdVrIhl(_)
                | Instr::LdIhlVr(_)
                | Instr::LdVrrSfbnn(_, _)
                | Instr::LdVrrSfenn(_, _)
                | Instr::AddAVr(_)
                | Instr::AdcAVr(_)
                | Instr::SubVr(_)
                | Instr::SbcAVr(_)
                | Instr::AndVr(_)
                | Instr::OrVr(_)
                | Instr::XorVr(_)
                | Instr::IncVrr(_)
                | Instr::DecVr(_)
                | Instr::SlaVr(_)
                | Instr::RlVr(_)
                | Instr::SraVr(_)
                | Instr::SrlVr(_)
                | Instr::RrVr(_)
                | Instr::PushVrr(_)
        )
    }
}

impl fmt::Display for Instr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Instr::LdRN(r, n) => write!(f, "ld {}, {}", r, n),
            Instr::LdRIhl(r) => write!(f, "ld {}, (HL)", r),
            Instr::LdIhlR(r) => write!(f, "ld (HL), {}", r),
            Instr::LdRIxd(r, d) => write!(f, "ld {}, {}", r, ixd(*d)),
            Instr::LdIxdR(d, r) => write!(f, "ld {}, {}", ixd(*d), r),
            Instr::LdIxdN(d, n) => write!(f, "ld {}, {}", ixd(*d), n),
            Instr::LdDdNn(dd, nn) => write!(f, "ld {}, {}", dd, nn),
            Instr::LdSpIx => write!(f, "ld SP, IX"),
            Instr::AddAN(n) => write!(f, "add A, {}", n),
            Instr::AddAIxd(d) => write!(f, "add A, {}", ixd(*d)),
            Instr::AdcAN(n) => write!(f, "adc A, {}", n),
            Instr::AdcAIxd(d) => write!(f, "adc A, {}", ixd(*d)),
            Instr::SubIxd(d) => write!(f, "sub {}", ixd(*d)),
            Instr::SbcAIxd(d) => write!(f, "sbc A, {}", ixd(*d)),
            Instr::AndIxd(d) => write!(f, "and {}", ixd(*d)),
            Instr::OrIxd(d) => write!(f, "or {}", ixd(*d)),
            Instr::XorIxd(d) => write!(f, "xor {}", ixd(*d)),
            Instr::AddHlSs(ss) => write!(f, "add HL, {}", ss),
            Instr::AddIxSs(ss) => write!(f, "add IX, {}", ss),
            Instr::IncSs(ss) => write!(f, "inc {}", ss),
            Instr::IncIxd(d) => write!(f, "inc {}", ixd(*d)),
            Instr::DecIxd(d) => write!(f, "dec {}", ixd(*d)),
            Instr::Cpl => write!(f, "cpl"),
            Instr::SlaIxd(d) => write!(f, "sla {}", ixd(*d)),
            Instr::RlIxd(d) => write!(f, "rl {}", ixd(*d)),
            Instr::SraIxd(d) => write!(f, "sra {}", ixd(*d)),
            Instr::SrlIxd(d) => write!(f, "srl {}", ixd(*d)),
            Instr::RrIxd(d) => write!(f, "rr {}", ixd(*d)),
            Instr::JpNn(nn) => write!(f, "jp {}", nn),
            Instr::JpCcNn(cc, nn) => write!(f, "jp {}, {}", cc, nn),
            Instr::CallNn(nn) => write!(f, "call {}", nn),
            Instr::Ret => write!(f, "ret"),
            Instr::PushQq(qq) => write!(f, "push {}", qq),
            Instr::PopQq(qq) => write!(f, "pop {}", qq),
            Instr::Nop => write!(f, "nop"),
            Instr::LdVrN(vr, n) => write!(f, "ld {}, {}", vr, n),
            Instr::LdVrVr(vr, vs) => write!(f, "ld {}, {}", vr, vs),
            Instr::LdVrR(vr, r) => write!(f, "ld {}, {}", vr, r),
            Instr::LdRVr(r, vr) => write!(f, "ld {}, {}", r, vr),
            Instr::LdVrrNn(vrr, nn) => write!(f, "ld {}, {}", vrr, nn),
            Instr::LdVrrDd(vrr, dd) => write!(f, "ld {}, {}", vrr, dd),
            Instr::LdDdVrr(dd, vrr) => write!(f, "ld {}, {}", dd, vrr),
            Instr::LdVrIhl(vr) => write!(f, "ld {}, (HL)", vr),
            Instr::LdIhlVr(vr) => write!(f, "ld (HL), {}", vr),
            Instr::LdVrrSfbnn(vrr, nn) => write!(f, "ld {}, SFB+{}", vrr, nn),
            Instr::LdVrrSfenn(vrr, nn) => write!(f, "ld {}, SFE+{}", vrr, nn),
            Instr::AddAVr(vr) => write!(f, "add A, {}", vr),
            Instr::AdcAVr(vr) => write!(f, "adc A, {}", vr),
            Instr::SubVr(vr) => write!(f, "sub {}", vr),
            Instr::SbcAVr(vr) => write!(f, "sbc A, {}", vr),
            Instr::AndVr(vr) => write!(f, "and {}", vr),
            Instr::OrVr(vr) => write!(f, "or {}", vr),
            Instr::XorVr(vr) => write!(f, "xor {}", vr),
            Instr::IncVrr(vrr) => write!(f, "inc {}", vrr),
            Instr::DecVr(vr) => write!(f, "dec {}", vr),
            Instr::SlaVr(vr) => write!(f, "sla {}", vr),
            Instr::RlVr(vr) => write!(f, "rl {}", vr),
            Instr::SraVr(vr) => write!(f, "sra {}", vr),
            Instr::SrlVr(vr) => write!(f, "srl {}", vr),
            Instr::RrVr(vr) => write!(f, "rr {}", vr),
            Instr::PushVrr(vrr) => write!(f, "push {}", vrr),
        }
    }
}

// ------------- unit tests -------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_physical() {
        assert_eq!(Instr::LdRN(Reg::A, 5).to_string(), "ld A, 5");
        assert_eq!(Instr::LdRIxd(Reg::C, -4).to_string(), "ld C, (IX-4)");
        assert_eq!(
            Instr::LdDdNn(RegPair::HL, Imm16::sym("_counter")).to_string(),
            "ld HL, _counter"
        );
        assert_eq!(
            Instr::JpCcNn(Cond::NZ, Imm16::sym("l_f_rep0")).to_string(),
            "jp NZ, l_f_rep0"
        );
        assert_eq!(
            Instr::LdDdNn(RegPair::HL, Imm16::SymOff("_buf".to_string(), 3)).to_string(),
            "ld HL, _buf+3"
        );
        assert_eq!(Instr::LdSpIx.to_string(), "ld SP, IX");
    }

    #[test]
    fn test_display_virtual() {
        assert_eq!(Instr::LdVrN(VReg::whole(3), 7).to_string(), "ld %3, 7");
        assert_eq!(
            Instr::LdVrrNn(VRegPair(2), Imm16::Val(256)).to_string(),
            "ld %%2, 256"
        );
        assert_eq!(Instr::AddAVr(VReg::hi(1)).to_string(), "add A, %1.H");
    }

    #[test]
    fn test_vreg_byte_addressing() {
        // byte b of a value based at pair k lives in pair k + b/2
        assert_eq!(VReg::byte(4, 0), VReg::lo(4));
        assert_eq!(VReg::byte(4, 1), VReg::hi(4));
        assert_eq!(VReg::byte(4, 2), VReg::lo(5));
        assert_eq!(VReg::byte(4, 3), VReg::hi(5));
    }

    #[test]
    fn test_is_virtual() {
        assert!(Instr::PushVrr(VRegPair(0)).is_virtual());
        assert!(Instr::LdRVr(Reg::A, VReg::whole(0)).is_virtual());
        assert!(!Instr::PushQq(RegPair::HL).is_virtual());
        assert!(!Instr::Ret.is_virtual());
    }
}
