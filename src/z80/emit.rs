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

//! Render a Z80 module as assembly text: one labeled block per procedure,
//! data declarations as defb/defw/defdw/defqw directives.

use super::{DataItem, Z80Data, Z80Decl, Z80Module, Z80Proc};
use std::fmt::Write;

pub fn emit_module(module: &Z80Module) -> String {
    let mut out = String::new();
    for (index, decl) in module.decls.iter().enumerate() {
        if index > 0 {
            out.push('\n');
        }
        match decl {
            Z80Decl::Proc(proc) => emit_proc(&mut out, proc),
            Z80Decl::Data(data) => emit_data(&mut out, data),
        }
    }
    out
}

fn emit_proc(out: &mut String, proc: &Z80Proc) {
    let _ = writeln!(out, "{}:", proc.ident);
    for line in &proc.lines {
        if let Some(label) = &line.label {
            let _ = writeln!(out, "{}:", label);
        }
        if let Some(instr) = &line.instr {
            let _ = writeln!(out, "    {}", instr);
        }
    }
}

fn emit_data(out: &mut String, data: &Z80Data) {
    let _ = writeln!(out, "{}:", data.ident);
    for item in &data.items {
        let _ = match item {
            DataItem::Defb(b) => writeln!(out, "    defb {}", b),
            DataItem::Defw(w) => writeln!(out, "    defw {}", w),
            DataItem::Defdw(d) => writeln!(out, "    defdw {}", d),
            DataItem::Defqw(q) => writeln!(out, "    defqw {}", q),
            DataItem::DefwSym(symbol, 0) => writeln!(out, "    defw {}", symbol),
            DataItem::DefwSym(symbol, addend) if *addend > 0 => {
                writeln!(out, "    defw {}+{}", symbol, addend)
            }
            DataItem::DefwSym(symbol, addend) => writeln!(out, "    defw {}{}", symbol, addend),
        };
    }
}

// ------------- unit tests -------------
