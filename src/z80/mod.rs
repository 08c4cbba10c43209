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

//! The Z80 back end: instruction selection over virtual registers, then
//! register allocation into stack-frame slots.

pub mod argloc;
pub mod emit;
pub mod instr;
pub mod isel;
mod mangle;
pub mod ralloc;
pub mod varmap;

pub use mangle::{mangle_global, mangle_label, mangle_lvar};

use instr::Instr;

/// A single output line: a label, an instruction, or an instruction carrying
/// a label.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AsmLine {
    pub label: Option<String>,
    pub instr: Option<Instr>,
}

impl AsmLine {
    pub fn label(name: &str) -> Self {
        AsmLine {
            label: Some(name.to_string()),
            instr: None,
        }
    }

    pub fn instr(instr: Instr) -> Self {
        AsmLine {
            label: None,
            instr: Some(instr),
        }
    }
}

/// A procedure in Z80 form. Between selection and allocation the lines
/// contain virtual-register instructions; afterwards they are physical only.
#[derive(Debug, Clone, PartialEq)]
pub struct Z80Proc {
    pub ident: String,
    pub lines: Vec<AsmLine>,
    /// number of virtual register pairs used, dense from zero
    pub vr_count: u32,
    /// byte size of the local variable area
    pub locals_size: u16,
}

/// One emitted data item.
#[derive(Debug, Clone, PartialEq)]
pub enum DataItem {
    Defb(u8),
    Defw(u16),
    Defdw(u32),
    Defqw(u64),
    /// word entry referencing a symbol, with optional addend
    DefwSym(String, i32),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Z80Data {
    pub ident: String,
    pub items: Vec<DataItem>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Z80Decl {
    Proc(Z80Proc),
    Data(Z80Data),
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Z80Module {
    pub decls: Vec<Z80Decl>,
}
