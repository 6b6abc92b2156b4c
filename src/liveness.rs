//! Live-variable analysis over MIR basic blocks.
//!
//! Standard backward data-flow:
//!
//! - `in(B)  = (out(B) \ def(B)) ∪ ref(B)`
//! - `out(B) = ⋃ in(S)` over successors `S`
//!
//! iterated to fixed point. Pseudo registers never enter the sets. The pass
//! also tallies per-register use counts, which seed the spill priorities of
//! the interference graph.

use crate::bitset::BitSet;
use crate::mir::{MBlock, MProcedure};

/// Extra weight for a read appearing in a load/store instruction: such
/// registers are addressing operands whose reloads would cascade, so they
/// make poor spill victims.
const MEM_USE_WEIGHT: u32 = 100;

/// Per-procedure analysis results that live outside the block bitsets.
pub struct Liveness {
    /// One past the highest register uid referenced by the procedure.
    pub max_reg_id: u32,
    /// Read counts keyed by uid.
    pub use_counts: Vec<u32>,
}

// r[impl ra.liveness]
/// Populates every block's `df_def`/`df_ref`/`df_in_live`/`df_out_live` and
/// returns the use-count table. Safe to re-run; the previous sets are
/// discarded.
pub fn analyze(proc: &mut MProcedure) -> Liveness {
    let mut max_reg_id = 0u32;
    let mut use_counts: Vec<u32> = Vec::new();
    for bb in &proc.blocks {
        for insn in &bb.instructions {
            let mem_access = insn.op.is_mem_access();
            insn.for_each_reg(|r, is_read| {
                if max_reg_id < r.uid() {
                    max_reg_id = r.uid();
                    use_counts.resize(max_reg_id as usize + 1, 0);
                }
                if is_read {
                    use_counts[r.uid() as usize] += 1;
                    if mem_access {
                        use_counts[r.uid() as usize] += MEM_USE_WEIGHT;
                    }
                }
            });
        }
    }
    max_reg_id += 1;
    use_counts.resize(max_reg_id as usize, 0);
    let max = max_reg_id as usize;

    // def(B) and ref(B). A read counts as a ref only when no prior write in
    // the block dominates it; reads and the definition of one instruction
    // are visited sources-first, so `x = op x, y` refs x.
    for bb in &mut proc.blocks {
        let MBlock {
            instructions,
            df_def,
            df_ref,
            ..
        } = bb;
        *df_def = BitSet::new(max);
        *df_ref = BitSet::new(max);
        for insn in instructions.iter() {
            insn.for_each_reg(|r, is_read| {
                if r.is_pseudo() {
                    return;
                }
                if is_read {
                    if !df_def.get(r.uid() as usize) {
                        df_ref.set(r.uid() as usize);
                    }
                } else {
                    df_def.set(r.uid() as usize);
                }
            });
        }
    }

    // Backward fixed point on in-live.
    let nblocks = proc.blocks.len();
    let mut in_live = vec![BitSet::new(max); nblocks];
    loop {
        let mut changed = false;
        for bi in 0..nblocks {
            let mut new_live = BitSet::new(max);
            for s in &proc.blocks[bi].successors {
                new_live.union_with(&in_live[s.index()]);
            }
            new_live.difference_with(&proc.blocks[bi].df_def);
            new_live.union_with(&proc.blocks[bi].df_ref);
            if new_live != in_live[bi] {
                changed = true;
                in_live[bi] = new_live;
            }
        }
        if !changed {
            break;
        }
    }

    // Derive out-live from the fixed point and store both sets back.
    let mut out_live = vec![BitSet::new(max); nblocks];
    for bi in 0..nblocks {
        for s in &proc.blocks[bi].successors {
            out_live[bi].union_with(&in_live[s.index()]);
        }
    }
    for (bi, bb) in proc.blocks.iter_mut().enumerate() {
        bb.df_in_live = std::mem::take(&mut in_live[bi]);
        bb.df_out_live = std::mem::take(&mut out_live[bi]);
    }

    Liveness {
        max_reg_id,
        use_counts,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mir::MReg;
    use crate::mir_parse::parse_proc;

    fn uid(r: MReg) -> usize {
        r.uid() as usize
    }

    #[test]
    fn straight_line_def_ref() {
        let mut proc = parse_proc(
            "proc {
              b0 {
                v0 = movi 1
                v1 = add v0, v2
                ret v1
              }
            }",
        )
        .unwrap();
        analyze(&mut proc);
        let bb = &proc.blocks[0];
        assert!(bb.df_def.get(uid(MReg::virt_gp(0))));
        assert!(bb.df_def.get(uid(MReg::virt_gp(1))));
        // v0 is written before any read, v2 is upward-exposed.
        assert!(!bb.df_ref.get(uid(MReg::virt_gp(0))));
        assert!(bb.df_ref.get(uid(MReg::virt_gp(2))));
        assert!(bb.df_in_live.get(uid(MReg::virt_gp(2))));
        assert_eq!(bb.df_out_live.popcount(), 0);
    }

    #[test]
    fn loop_carries_liveness_to_fixed_point() {
        // b0 -> b1; b1 -> b1 b2; v0 defined in b0, used in b1 each iteration.
        let mut proc = parse_proc(
            "proc {
              b0 -> b1 {
                v0 = movi 10
                v1 = movi 0
              }
              b1 -> b1 b2 {
                v1 = add v1, v0
                %flags = cmp v1, 100
                jcc %flags
              }
              b2 {
                ret v1
              }
            }",
        )
        .unwrap();
        analyze(&mut proc);
        let v0 = uid(MReg::virt_gp(0));
        let v1 = uid(MReg::virt_gp(1));
        // v0 live around the loop edge.
        assert!(proc.blocks[0].df_out_live.get(v0));
        assert!(proc.blocks[1].df_in_live.get(v0));
        assert!(proc.blocks[1].df_out_live.get(v0));
        assert!(proc.blocks[1].df_out_live.get(v1));
        // Pseudo registers never enter the sets.
        assert!(!proc.blocks[1].df_def.get(uid(MReg::FLAGS)));
        assert!(!proc.blocks[1].df_ref.get(uid(MReg::FLAGS)));
    }

    #[test]
    fn reanalysis_is_idempotent() {
        let mut proc = parse_proc(
            "proc {
              b0 -> b1 b2 {
                v0 = movi 1
                %flags = cmp v0, 2
                jcc %flags
              }
              b1 { ret v0 }
              b2 { ret v0 }
            }",
        )
        .unwrap();
        analyze(&mut proc);
        let snapshot: Vec<_> = proc
            .blocks
            .iter()
            .map(|b| {
                (
                    b.df_def.clone(),
                    b.df_ref.clone(),
                    b.df_in_live.clone(),
                    b.df_out_live.clone(),
                )
            })
            .collect();
        analyze(&mut proc);
        for (bb, (def, rf, inl, outl)) in proc.blocks.iter().zip(&snapshot) {
            assert_eq!(&bb.df_def, def);
            assert_eq!(&bb.df_ref, rf);
            assert_eq!(&bb.df_in_live, inl);
            assert_eq!(&bb.df_out_live, outl);
        }
    }

    #[test]
    fn memory_reads_weigh_heavily_in_use_counts() {
        let mut proc = parse_proc(
            "proc {
              b0 {
                v0 = movi 1
                v1 = loadi64 [v0 + 8]
                v2 = add v0, v1
                ret v2
              }
            }",
        )
        .unwrap();
        let live = analyze(&mut proc);
        // v0: one plain read (add) plus one addressing read (loadi64).
        assert_eq!(live.use_counts[uid(MReg::virt_gp(0))], 102);
        assert_eq!(live.use_counts[uid(MReg::virt_gp(1))], 1);
    }
}
