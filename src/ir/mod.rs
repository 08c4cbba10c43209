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

//! The machine-independent three-address intermediate representation.
//!
//! Identifier convention: globals are written `@name`, locals and labels
//! `%name`, and numbered pseudo-variables `%0`, `%1`, ... carry intermediate
//! values between instructions.

use serde::Serialize;

#[derive(Debug, Clone, PartialEq, Serialize, Default)]
pub struct IrModule {
    pub decls: Vec<IrDecl>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum IrDecl {
    Var(IrVar),
    Proc(IrProc),
}

/// A global variable: an identifier plus a block of typed data entries.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct IrVar {
    pub ident: String,
    pub data: Vec<DataEntry>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum DataEntry {
    Byte(u8),
    Word(u16),
    Dword(u32),
    Qword(u64),
    /// A word entry carrying an unresolved symbol reference with an optional
    /// byte addend.
    WordSym { symbol: String, addend: i32 },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct IrProc {
    pub ident: String,
    pub args: Vec<IrProcArg>,
    pub lvars: Vec<IrProcLvar>,
    pub body: IrBlock,
    pub is_extern: bool,
    pub is_variadic: bool,
}

impl IrProc {
    pub fn new(ident: &str) -> Self {
        IrProc {
            ident: ident.to_string(),
            args: Vec::new(),
            lvars: Vec::new(),
            body: IrBlock::default(),
            is_extern: false,
            is_variadic: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct IrProcArg {
    pub name: String,
    pub ty: IrType,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct IrProcLvar {
    pub name: String,
    pub ty: IrType,
}

/// A labeled block: instructions interleaved with plain-string labels.
#[derive(Debug, Clone, PartialEq, Serialize, Default)]
pub struct IrBlock {
    pub entries: Vec<IrEntry>,
}

impl IrBlock {
    pub fn push(&mut self, instr: IrInstr) {
        self.entries.push(IrEntry::Instr(instr));
    }

    pub fn push_label(&mut self, label: &str) {
        self.entries.push(IrEntry::Label(label.to_string()));
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum IrEntry {
    Label(String),
    Instr(IrInstr),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum IrOp {
    Add,
    Sub,
    Mul,
    And,
    Or,
    Xor,
    Bnot,
    Neg,
    Shl,
    Shra,
    Shrl,
    Eq,
    Neq,
    Lt,
    Ltu,
    Lteq,
    Lteu,
    Gt,
    Gtu,
    Gteq,
    Gteu,
    Imm,
    Jmp,
    Jnz,
    Jz,
    Call,
    Ret,
    Retv,
    Read,
    Write,
    Varptr,
    Lvarptr,
    Nop,
}

impl IrOp {
    pub fn is_comparison(&self) -> bool {
        matches!(
            self,
            IrOp::Eq
                | IrOp::Neq
                | IrOp::Lt
                | IrOp::Ltu
                | IrOp::Lteq
                | IrOp::Lteu
                | IrOp::Gt
                | IrOp::Gtu
                | IrOp::Gteq
                | IrOp::Gteu
        )
    }
}

/// One three-address instruction: opcode, operand bit width, destination and
/// up to two sources.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct IrInstr {
    pub op: IrOp,
    pub width: u32,
    pub dest: Option<IrOper>,
    pub op1: Option<IrOper>,
    pub op2: Option<IrOper>,
}

impl IrInstr {
    pub fn new(op: IrOp, width: u32) -> Self {
        IrInstr {
            op,
            width,
            dest: None,
            op1: None,
            op2: None,
        }
    }

    pub fn with_dest(mut self, dest: IrOper) -> Self {
        self.dest = Some(dest);
        self
    }

    pub fn with_op1(mut self, oper: IrOper) -> Self {
        self.op1 = Some(oper);
        self
    }

    pub fn with_op2(mut self, oper: IrOper) -> Self {
        self.op2 = Some(oper);
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum IrOper {
    /// Named variable or label reference (`@g`, `%l`, `%3`).
    Var(String),
    /// Immediate integer value.
    Imm(i64),
    /// Operand list, used by `call` for its arguments.
    List(Vec<IrOper>),
}

impl IrOper {
    pub fn var(name: &str) -> Self {
        IrOper::Var(name.to_string())
    }
}

/// IR type expressions, used for procedure arguments and locals.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum IrType {
    Int { bits: u32 },
    Ptr,
    Array { elem: Box<IrType>, count: u32 },
    Record { fields: Vec<IrType> },
}

impl IrType {
    /// Size in bytes, consistent across the lowerer and the instruction
    /// selector.
    pub fn sizeof(&self) -> u32 {
        match self {
            IrType::Int { bits } => bits.div_ceil(8),
            IrType::Ptr => 2,
            IrType::Array { elem, count } => elem.sizeof() * count,
            IrType::Record { fields } => fields.iter().map(|f| f.sizeof()).sum(),
        }
    }
}

// ------------- unit tests -------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_type_sizes() {
        assert_eq!(IrType::Int { bits: 8 }.sizeof(), 1);
        assert_eq!(IrType::Int { bits: 16 }.sizeof(), 2);
        assert_eq!(IrType::Int { bits: 32 }.sizeof(), 4);
        assert_eq!(IrType::Int { bits: 64 }.sizeof(), 8);
        assert_eq!(IrType::Ptr.sizeof(), 2);
        assert_eq!(
            IrType::Array {
                elem: Box::new(IrType::Int { bits: 16 }),
                count: 10
            }
            .sizeof(),
            20
        );
        assert_eq!(
            IrType::Record {
                fields: vec![IrType::Int { bits: 8 }, IrType::Ptr]
            }
            .sizeof(),
            3
        );
    }

    #[test]
    fn test_instr_builder() {
        let instr = IrInstr::new(IrOp::Add, 16)
            .with_dest(IrOper::var("%2"))
            .with_op1(IrOper::var("%0"))
            .with_op2(IrOper::var("%1"));
        assert_eq!(instr.op, IrOp::Add);
        assert_eq!(instr.dest, Some(IrOper::Var("%2".to_string())));
    }

    #[test]
    fn test_block_labels_interleave() {
        let mut block = IrBlock::default();
        block.push(IrInstr::new(IrOp::Nop, 0));
        block.push_label("%loop");
        block.push(IrInstr::new(IrOp::Nop, 0));
        assert_eq!(block.entries.len(), 3);
        assert!(matches!(block.entries[1], IrEntry::Label(_)));
    }
}
