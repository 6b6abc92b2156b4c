//! Register allocation driver.
//!
//! Pipeline per procedure: materialize ABI argument registers into ordinary
//! virtuals, build liveness + the interference graph, then loop: try to
//! color with the current budgets, widen the budgets toward the full
//! register file while any class still spills, and only once both budgets
//! are exhausted rewrite the stream with spill loads/stores and start over.
//! On success physical registers are substituted in place, used-register
//! masks and the spill area size are recorded, and self-moves are erased.

use std::sync::OnceLock;

use crate::arch::Abi;
use crate::igraph::InterferenceGraph;
use crate::liveness;
use crate::mir::{MInsn, MMem, MOp, MOperand, MProcedure, MReg, VRegAlloc};
use crate::ra_debug;

/// Outer-loop safety net. Widening from the minimum budgets to the full
/// register file plus one spill pass terminates far below this.
const MAX_COLOR_STEPS: usize = 32;

/// Bounded per-instruction rewrite lists: an instruction reads at most
/// three registers and defines at most one.
const MAX_RELOADS: usize = 4;
const MAX_SPILLS: usize = 1;

fn dump_enabled() -> bool {
    static DUMP: OnceLock<bool> = OnceLock::new();
    *DUMP.get_or_init(|| std::env::var_os("MIRLO_RA_DEBUG").is_some())
}

// r[impl ra.args]
/// Rewrites the reserved argument pseudo registers (`%vm`, `%tos`,
/// `%nargs`) to fresh GP virtuals and prepends one `movi` per used pseudo
/// copying from the ABI argument register. This keeps pre-colored nodes off
/// the argument path; the coalescer usually folds the copies away.
fn spill_args(proc: &mut MProcedure, abi: &Abi) {
    let mut fresh = [MReg::NONE; 3];
    let vregs = &mut proc.vregs;
    for bb in &mut proc.blocks {
        for insn in &mut bb.instructions {
            insn.for_each_reg_mut(|r, _| {
                let slot = match *r {
                    MReg::VM => 0,
                    MReg::TOS => 1,
                    MReg::NARGS => 2,
                    _ => return,
                };
                if fresh[slot].is_none() {
                    fresh[slot] = vregs.next_gp();
                }
                *r = fresh[slot];
            });
        }
    }

    let Some(entry) = proc.blocks.first_mut() else {
        return;
    };
    let mut at = 0;
    for (i, r) in fresh.iter().enumerate() {
        if r.is_none() {
            continue;
        }
        let arg = abi.map_argument(i, 0, false);
        assert!(arg != 0, "ABI lacks a GP register for argument {i}");
        entry.instructions.insert(
            at,
            MInsn::new(
                MOp::Movi,
                *r,
                [MOperand::Reg(MReg::phys(arg)), MOperand::None, MOperand::None],
            ),
        );
        at += 1;
    }
}

#[derive(Debug, Clone, Copy, Default)]
struct SpillEntry {
    src: MReg,
    dst: MReg,
    /// 0-based absolute slot index.
    slot: i32,
}

/// Substitutes `*r` with the fresh register standing in for its spill slot
/// within the current instruction, reusing an earlier entry for repeated
/// operands.
fn place_spill(
    r: &mut MReg,
    list: &mut [SpillEntry],
    slot: i32,
    slot_offset: i32,
    vregs: &mut VRegAlloc,
    num_spill_slots: &mut i32,
) {
    for entry in list.iter_mut() {
        if entry.src.is_none() {
            entry.src = *r;
            entry.dst = if r.is_fp() {
                vregs.next_fp()
            } else {
                vregs.next_gp()
            };
            entry.slot = slot + slot_offset - 1;
            *num_spill_slots = (*num_spill_slots).max(entry.slot + 1);
            *r = entry.dst;
            return;
        }
        if entry.src == *r {
            *r = entry.dst;
            return;
        }
    }
    panic!("reload/spill list exhausted rewriting {r}; malformed instruction");
}

// r[impl ra.spill.rewrite]
/// Rewrites every instruction touching a spilled register: reads get a
/// fresh register reloaded from the slot before the instruction, writes get
/// a fresh register stored to the slot after it.
fn rewrite_spills(proc: &mut MProcedure, graph: &InterferenceGraph, num_spill_slots: &mut i32) {
    let slot_offset = *num_spill_slots;
    let vregs = &mut proc.vregs;
    for bb in &mut proc.blocks {
        let mut idx = 0;
        while idx < bb.instructions.len() {
            let mut reloads = [SpillEntry::default(); MAX_RELOADS];
            let mut spills = [SpillEntry::default(); MAX_SPILLS];
            let mut dirty = false;

            bb.instructions[idx].for_each_reg_mut(|r, is_read| {
                if r.is_pseudo() || !r.is_virt() {
                    return;
                }
                // Registers minted by this very pass sit past the graph.
                let Some(node) = graph.node(r.uid()) else {
                    return;
                };
                if node.spill_slot == 0 {
                    return;
                }
                dirty = true;
                let list: &mut [SpillEntry] = if is_read { &mut reloads } else { &mut spills };
                place_spill(r, list, node.spill_slot, slot_offset, vregs, num_spill_slots);
            });

            if !dirty {
                idx += 1;
                continue;
            }

            for e in reloads.iter().take_while(|e| !e.src.is_none()) {
                let op = if e.src.is_fp() {
                    MOp::LoadF64
                } else {
                    MOp::LoadI64
                };
                let mem = MMem {
                    base: MReg::SP,
                    disp: e.slot * 8,
                };
                bb.instructions.insert(
                    idx,
                    MInsn::new(op, e.dst, [MOperand::Mem(mem), MOperand::None, MOperand::None]),
                );
                idx += 1;
            }
            idx += 1;
            for e in spills.iter().take_while(|e| !e.src.is_none()) {
                let op = if e.src.is_fp() {
                    MOp::StoreF64
                } else {
                    MOp::StoreI64
                };
                let mem = MMem {
                    base: MReg::SP,
                    disp: e.slot * 8,
                };
                bb.instructions.insert(
                    idx,
                    MInsn::new(
                        op,
                        MReg::NONE,
                        [MOperand::Mem(mem), MOperand::Reg(e.dst), MOperand::None],
                    ),
                );
                idx += 1;
            }
        }
    }
}

// r[impl ra.masks]
/// Replaces every colored virtual register with its physical register
/// (sign-flipped for FP) and records the used-register masks.
fn substitute_colors(proc: &mut MProcedure, graph: &InterferenceGraph) {
    let used_gp = &mut proc.used_gp_mask;
    let used_fp = &mut proc.used_fp_mask;
    for bb in &mut proc.blocks {
        for insn in &mut bb.instructions {
            insn.for_each_reg_mut(|r, _| {
                if r.is_pseudo() || !r.is_virt() {
                    return;
                }
                let node = graph
                    .node(r.uid())
                    .expect("virtual register missing from interference graph");
                let color = node.color as i32;
                assert!(color != 0, "virtual register {r} left uncolored");
                if r.is_fp() {
                    *used_fp |= 1u64 << (color - 1);
                    *r = MReg::phys(-color);
                } else {
                    *used_gp |= 1u64 << (color - 1);
                    *r = MReg::phys(color);
                }
            });
        }
    }
}

// r[impl ra.selfmove]
fn erase_self_moves(proc: &mut MProcedure) {
    for bb in &mut proc.blocks {
        bb.instructions
            .retain(|i| !(i.op.is_move() && i.args[0] == MOperand::Reg(i.out)));
    }
}

// r[impl ra.alloc]
/// Allocates physical registers for the whole procedure.
///
/// On return no virtual register remains in the instruction stream,
/// `used_gp_mask`/`used_fp_mask` name every physical register the coloring
/// assigned, and `used_stack_length` covers the spill slots (slot count
/// rounded up to a multiple of two, times eight bytes).
pub fn allocate_registers(proc: &mut MProcedure, abi: &Abi) {
    spill_args(proc, abi);

    let live = liveness::analyze(proc);
    let mut graph = InterferenceGraph::build(proc, &live);
    if dump_enabled() {
        eprintln!("{}", ra_debug::graph_dot(&graph, abi));
        eprintln!("{}", ra_debug::lifetime_listing(proc, Some(&graph)));
    }

    // Start with only the caller-saved registers on the table; callee-saved
    // ones cost prologue traffic and are pulled in by widening only when
    // coloring fails without them.
    let max_k = abi.num_gp();
    let max_m = abi.num_fp();
    let mut k = abi.gp_volatile.len().max(2).min(max_k);
    let mut m = abi.fp_volatile.len().max(2).min(max_m);

    let mut baseline = graph.clone();
    let mut num_spill_slots: i32 = 0;

    // r[impl ra.spill.widen]
    let mut step = 0;
    loop {
        assert!(
            step < MAX_COLOR_STEPS,
            "register allocation did not converge"
        );
        step += 1;

        let (spill_gp, spill_fp) = graph.try_color(k, m);
        if dump_enabled() {
            eprintln!("try_color (K={k}, M={m}) spills ({spill_gp}, {spill_fp}) registers");
        }
        if spill_gp == 0 && spill_fp == 0 {
            break;
        }

        let widen_k = spill_gp > 0 && k != max_k;
        let widen_m = spill_fp > 0 && m != max_m;
        if widen_k || widen_m {
            k += widen_k as usize;
            m += widen_m as usize;
            graph = baseline.clone();
            continue;
        }

        rewrite_spills(proc, &graph, &mut num_spill_slots);
        let live = liveness::analyze(proc);
        graph = InterferenceGraph::build(proc, &live);
        baseline = graph.clone();
    }

    proc.used_stack_length = ((num_spill_slots as u32 + 1) & !1) * 8;

    substitute_colors(proc, &graph);
    erase_self_moves(proc);

    if dump_enabled() {
        eprintln!("{proc}");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::arch::x64;
    use crate::mir_parse::parse_proc;

    #[test]
    fn argument_pseudos_are_materialized_once() {
        let mut proc = parse_proc(
            "proc {
              b0 {
                v0 = add %vm, 1
                v1 = add %vm, v0
                v2 = add %vm, v1
                ret v2
              }
            }",
        )
        .unwrap();
        spill_args(&mut proc, &x64::SYSV64);

        let entry = &proc.blocks[0];
        // Exactly one prepended copy from the first GP argument register.
        let first = &entry.instructions[0];
        assert_eq!(first.op, MOp::Movi);
        let arg0 = MReg::phys(x64::SYSV64.map_argument(0, 0, false));
        assert_eq!(first.args[0], MOperand::Reg(arg0));
        assert_eq!(entry.instructions.len(), 5);

        // Every %vm use was rewritten to the same fresh virtual.
        let fresh = first.out;
        for insn in &entry.instructions[1..] {
            insn.for_each_reg(|r, _| assert_ne!(r, MReg::VM));
            if insn.op == MOp::Add {
                assert_eq!(insn.args[0], MOperand::Reg(fresh));
            }
        }
    }

    #[test]
    fn self_moves_are_erased_after_substitution() {
        let mut proc = parse_proc(
            "proc {
              b0 {
                v0 = movi 5
                v1 = movi v0
                ret v1
              }
            }",
        )
        .unwrap();
        allocate_registers(&mut proc, &x64::SYSV64);
        for bb in &proc.blocks {
            for insn in &bb.instructions {
                assert!(
                    !(insn.op.is_move() && insn.args[0] == MOperand::Reg(insn.out)),
                    "self-move survived: {insn}"
                );
            }
        }
        // The coalesced pair shares one register.
        assert_eq!(proc.used_gp_mask.count_ones(), 1);
        assert_eq!(proc.used_stack_length, 0);
    }
}
