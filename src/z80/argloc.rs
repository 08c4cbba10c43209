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

//! Argument location assignment for the calling convention, used for both
//! call sites and procedure entries.
//!
//! Register slots are taken in a fixed order: `A B C D E H L` for 8-bit
//! slots, `HL DE BC` for 16-bit slots. Wide arguments consume consecutive
//! pairs, low-significance words in registers and the remainder on the
//! stack. For a variadic procedure an argument goes to the stack entirely
//! unless it fits in registers entirely, so the stack image stays
//! contiguous.

use super::instr::{Reg, RegPair};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SlotHalf {
    Lo,
    Hi,
    Whole,
}

/// One register slot: a pair and which half of it (or the whole pair).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RegSlot {
    pub pair: RegPair,
    pub half: SlotHalf,
}

impl RegSlot {
    pub fn whole(pair: RegPair) -> Self {
        RegSlot {
            pair,
            half: SlotHalf::Whole,
        }
    }

    /// The component register of a half slot.
    pub fn reg(&self) -> Option<Reg> {
        match (self.pair, self.half) {
            (RegPair::AF, SlotHalf::Hi) => Some(Reg::A),
            (_, SlotHalf::Whole) => None,
            (pair, half) => pair.split().map(|(lo, hi)| {
                if half == SlotHalf::Lo { lo } else { hi }
            }),
        }
    }
}

/// Where one argument lives: its register slots in significance order,
/// followed by the byte count and offset of its stack part.
#[derive(Debug, Clone, PartialEq)]
pub struct ArgLoc {
    pub name: String,
    pub reg_slots: Vec<RegSlot>,
    pub stack_bytes: u16,
    pub stack_off: u16,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct ArgLocs {
    pub args: Vec<ArgLoc>,
    pub stack_total: u16,
}

#[derive(Clone, Copy, Default)]
struct SlotPool {
    taken: [bool; 7], // A B C D E H L
}

impl SlotPool {
    fn index(reg: Reg) -> usize {
        match reg {
            Reg::A => 0,
            Reg::B => 1,
            Reg::C => 2,
            Reg::D => 3,
            Reg::E => 4,
            Reg::H => 5,
            Reg::L => 6,
        }
    }

    fn alloc8(&mut self) -> Option<Reg> {
        const ORDER: [Reg; 7] = [Reg::A, Reg::B, Reg::C, Reg::D, Reg::E, Reg::H, Reg::L];
        for reg in ORDER {
            let index = Self::index(reg);
            if !self.taken[index] {
                self.taken[index] = true;
                return Some(reg);
            }
        }
        None
    }

    fn alloc16(&mut self) -> Option<RegPair> {
        const ORDER: [RegPair; 3] = [RegPair::HL, RegPair::DE, RegPair::BC];
        for pair in ORDER {
            let (lo, hi) = pair.split().unwrap();
            let (li, hi_index) = (Self::index(lo), Self::index(hi));
            if !self.taken[li] && !self.taken[hi_index] {
                self.taken[li] = true;
                self.taken[hi_index] = true;
                return Some(pair);
            }
        }
        None
    }
}

fn half_slot(reg: Reg) -> RegSlot {
    match reg {
        Reg::A => RegSlot {
            pair: RegPair::AF,
            half: SlotHalf::Hi,
        },
        Reg::B => RegSlot {
            pair: RegPair::BC,
            half: SlotHalf::Hi,
        },
        Reg::C => RegSlot {
            pair: RegPair::BC,
            half: SlotHalf::Lo,
        },
        Reg::D => RegSlot {
            pair: RegPair::DE,
            half: SlotHalf::Hi,
        },
        Reg::E => RegSlot {
            pair: RegPair::DE,
            half: SlotHalf::Lo,
        },
        Reg::H => RegSlot {
            pair: RegPair::HL,
            half: SlotHalf::Hi,
        },
        Reg::L => RegSlot {
            pair: RegPair::HL,
            half: SlotHalf::Lo,
        },
    }
}

/// Assign locations for the given argument names and byte sizes, in
/// declaration order.
pub fn assign_arg_locs(args: &[(String, u32)], variadic: bool) -> ArgLocs {
    let mut pool = SlotPool::default();
    let mut locs = ArgLocs::default();
    let mut stack_off: u16 = 0;

    for (name, bytes) in args {
        let mut slots = Vec::new();
        let mut stack_bytes: u16 = 0;

        if *bytes == 1 {
            match pool.alloc8() {
                Some(reg) => slots.push(half_slot(reg)),
                // a stacked byte still occupies a pushed word
                None => stack_bytes = 2,
            }
        } else {
            let words = bytes.div_ceil(2);
            if variadic {
                let mut probe = pool;
                let mut probed = Vec::new();
                let mut fits = true;
                for _ in 0..words {
                    match probe.alloc16() {
                        Some(pair) => probed.push(RegSlot::whole(pair)),
                        None => {
                            fits = false;
                            break;
                        }
                    }
                }
                if fits {
                    pool = probe;
                    slots = probed;
                } else {
                    stack_bytes = (words * 2) as u16;
                }
            } else {
                let mut remaining = words;
                while remaining > 0 {
                    match pool.alloc16() {
                        Some(pair) => {
                            slots.push(RegSlot::whole(pair));
                            remaining -= 1;
                        }
                        None => {
                            stack_bytes = (remaining * 2) as u16;
                            break;
                        }
                    }
                }
            }
        }

        let off = if stack_bytes > 0 { stack_off } else { 0 };
        stack_off += stack_bytes;
        locs.args.push(ArgLoc {
            name: name.clone(),
            reg_slots: slots,
            stack_bytes,
            stack_off: off,
        });
    }

    locs.stack_total = stack_off;
    locs
}

// ------------- unit tests -------------

#[cfg(test)]
mod tests {
    use super::*;

    fn words(args: &[u32]) -> Vec<(String, u32)> {
        args.iter()
            .enumerate()
            .map(|(index, bytes)| (format!("%a{}", index), *bytes))
            .collect()
    }

    #[test]
    fn test_three_words_fill_hl_de_bc() {
        let locs = assign_arg_locs(&words(&[2, 2, 2]), false);
        assert_eq!(locs.args[0].reg_slots, vec![RegSlot::whole(RegPair::HL)]);
        assert_eq!(locs.args[1].reg_slots, vec![RegSlot::whole(RegPair::DE)]);
        assert_eq!(locs.args[2].reg_slots, vec![RegSlot::whole(RegPair::BC)]);
        assert_eq!(locs.stack_total, 0);
    }

    #[test]
    fn test_fourth_word_goes_to_stack() {
        let locs = assign_arg_locs(&words(&[2, 2, 2, 2]), false);
        assert!(locs.args[3].reg_slots.is_empty());
        assert_eq!(locs.args[3].stack_bytes, 2);
        assert_eq!(locs.args[3].stack_off, 0);
        assert_eq!(locs.stack_total, 2);
    }

    #[test]
    fn test_byte_arg_takes_a_first() {
        let locs = assign_arg_locs(&words(&[1, 2]), false);
        assert_eq!(
            locs.args[0].reg_slots,
            vec![RegSlot {
                pair: RegPair::AF,
                half: SlotHalf::Hi
            }]
        );
        assert_eq!(locs.args[0].reg_slots[0].reg(), Some(Reg::A));
        // HL is still free for the word argument
        assert_eq!(locs.args[1].reg_slots, vec![RegSlot::whole(RegPair::HL)]);
    }

    #[test]
    fn test_byte_args_block_pairs() {
        // bytes take A, then B which breaks up BC
        let locs = assign_arg_locs(&words(&[1, 1, 2, 2, 2]), false);
        assert_eq!(locs.args[0].reg_slots[0].reg(), Some(Reg::A));
        assert_eq!(locs.args[1].reg_slots[0].reg(), Some(Reg::B));
        assert_eq!(locs.args[2].reg_slots, vec![RegSlot::whole(RegPair::HL)]);
        assert_eq!(locs.args[3].reg_slots, vec![RegSlot::whole(RegPair::DE)]);
        // BC is unavailable, the last word spills
        assert_eq!(locs.args[4].stack_bytes, 2);
    }

    #[test]
    fn test_wide_arg_partial_spill() {
        // an 8-byte argument: HL DE BC hold the low words, one word spills
        let locs = assign_arg_locs(&words(&[8]), false);
        assert_eq!(locs.args[0].reg_slots.len(), 3);
        assert_eq!(locs.args[0].stack_bytes, 2);
    }

    #[test]
    fn test_variadic_all_or_nothing() {
        // 4-byte arg fits in HL+DE; the next word argument cannot be split
        let locs = assign_arg_locs(&words(&[4, 2, 4]), true);
        assert_eq!(locs.args[0].reg_slots.len(), 2);
        assert_eq!(locs.args[1].reg_slots, vec![RegSlot::whole(RegPair::BC)]);
        // no registers left: entirely on the stack
        assert!(locs.args[2].reg_slots.is_empty());
        assert_eq!(locs.args[2].stack_bytes, 4);
        // never part in registers, part on the stack
        for arg in &locs.args {
            assert!(arg.reg_slots.is_empty() || arg.stack_bytes == 0);
        }
    }

    #[test]
    fn test_stack_offsets_accumulate() {
        let locs = assign_arg_locs(&words(&[2, 2, 2, 2, 4]), false);
        assert_eq!(locs.args[3].stack_off, 0);
        assert_eq!(locs.args[4].stack_off, 2);
        assert_eq!(locs.args[4].stack_bytes, 4);
        assert_eq!(locs.stack_total, 6);
    }
}
