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

use crate::ir::{IrEntry, IrOp, IrOper, IrProc};
use std::collections::HashMap;

/// Where a variable lives in the virtual register file: its first VR number,
/// how many consecutive numbers it occupies, and its byte size.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VarMapEntry {
    pub base: u32,
    pub count: u32,
    pub bytes: u32,
}

/// Mapping from IR variable names to virtual registers, with a running
/// next-VR counter. A 1-byte value takes one 8-bit VR; an N-byte value takes
/// N/2 consecutive pairs, least-significant word first.
#[derive(Debug, Default)]
pub struct VarMap {
    entries: HashMap<String, VarMapEntry>,
    next: u32,
}

impl VarMap {
    pub fn new() -> Self {
        VarMap::default()
    }

    /// Allocate VRs for a variable of the given byte size. Re-definitions of
    /// an already-mapped variable keep their original slot.
    pub fn insert(&mut self, name: &str, bytes: u32) -> VarMapEntry {
        if let Some(entry) = self.entries.get(name) {
            return *entry;
        }
        let count = if bytes <= 1 { 1 } else { bytes / 2 };
        let entry = VarMapEntry {
            base: self.next,
            count,
            bytes: bytes.max(1),
        };
        self.next += count;
        self.entries.insert(name.to_string(), entry);
        entry
    }

    pub fn get(&self, name: &str) -> Option<VarMapEntry> {
        self.entries.get(name).copied()
    }

    /// Allocate a fresh anonymous VR pair for selector-internal use.
    pub fn alloc_temp(&mut self) -> u32 {
        let num = self.next;
        self.next += 1;
        num
    }

    pub fn vr_count(&self) -> u32 {
        self.next
    }
}

/// How many bytes an instruction's destination occupies in the VR file.
/// Comparison results and call return values are always at least one pair.
pub fn dest_bytes(op: IrOp, width: u32) -> u32 {
    if op.is_comparison() {
        return 2;
    }
    let bytes = width.div_ceil(8).max(1);
    if op == IrOp::Call { bytes.max(2) } else { bytes }
}

/// One pass over an IR procedure: arguments first, sized by their declared
/// type, then every instruction that defines a pseudo-variable.
pub fn build_varmap(proc: &IrProc) -> VarMap {
    let mut map = VarMap::new();
    for arg in &proc.args {
        map.insert(&arg.name, arg.ty.sizeof());
    }
    for entry in &proc.body.entries {
        let IrEntry::Instr(instr) = entry else {
            continue;
        };
        if let Some(IrOper::Var(name)) = &instr.dest {
            map.insert(name, dest_bytes(instr.op, instr.width));
        }
    }
    map
}

// ------------- unit tests -------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::*;

    #[test]
    fn test_sizes_to_vr_counts() {
        let mut map = VarMap::new();
        assert_eq!(map.insert("%a", 1).base, 0);
        assert_eq!(map.insert("%b", 2).base, 1);
        let c = map.insert("%c", 4);
        assert_eq!((c.base, c.count), (2, 2));
        let d = map.insert("%d", 8);
        assert_eq!((d.base, d.count, d.bytes), (4, 4, 8));
        assert_eq!(map.vr_count(), 8);
    }

    #[test]
    fn test_redefinition_keeps_slot() {
        let mut map = VarMap::new();
        let first = map.insert("%r", 2);
        let second = map.insert("%r", 2);
        assert_eq!(first, second);
        assert_eq!(map.vr_count(), 1);
    }

    #[test]
    fn test_build_from_proc_args_first() {
        let mut proc = IrProc::new("@f");
        proc.args.push(IrProcArg {
            name: "%a".to_string(),
            ty: IrType::Int { bits: 16 },
        });
        proc.args.push(IrProcArg {
            name: "%b".to_string(),
            ty: IrType::Int { bits: 32 },
        });
        proc.body.push(
            IrInstr::new(IrOp::Imm, 16)
                .with_dest(IrOper::var("%0"))
                .with_op1(IrOper::Imm(1)),
        );
        let map = build_varmap(&proc);
        assert_eq!(map.get("%a").unwrap().base, 0);
        assert_eq!(map.get("%b").unwrap().base, 1);
        assert_eq!(map.get("%b").unwrap().count, 2);
        assert_eq!(map.get("%0").unwrap().base, 3);
        // dense, contiguous numbering
        assert_eq!(map.vr_count(), 4);
    }

    #[test]
    fn test_comparison_dest_is_one_pair() {
        assert_eq!(dest_bytes(IrOp::Lt, 32), 2);
        assert_eq!(dest_bytes(IrOp::Eq, 8), 2);
        assert_eq!(dest_bytes(IrOp::Add, 32), 4);
        assert_eq!(dest_bytes(IrOp::Call, 8), 2);
        assert_eq!(dest_bytes(IrOp::Imm, 8), 1);
    }
}
