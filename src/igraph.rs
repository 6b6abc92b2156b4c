//! Interference graph construction and the Chaitin coloring core.
//!
//! One node per register uid, adjacency as bitsets (with a self bit, so
//! `popcount == degree + 1` and a removed node reads as popcount 0).
//! Coloring is the classic simplify-select recursion, expressed as an
//! explicit push/pop worklist so graphs with tens of thousands of nodes do
//! not exhaust the native stack.

use crate::bitset::BitSet;
use crate::liveness::Liveness;
use crate::mir::{MOperand, MProcedure, MReg};

/// Spill priorities scale `uses + 1` by this factor.
const PRIO_BIAS: f32 = 12.0;

/// Ring capacity for move-affinity hints per node.
const HINT_SLOTS: usize = 4;

#[derive(Debug, Clone)]
pub struct GraphNode {
    /// Adjacency set, self bit included.
    pub vtx: BitSet,
    /// Spill preference weight; the lowest-priority over-degree node spills.
    pub priority: f32,
    /// Offsets to move-related nodes; 0 marks an empty slot.
    coalescing_hints: [i32; HINT_SLOTS],
    hint_id: u8,
    /// 0 = uncolored (or spilled); otherwise a 1-based color in the active
    /// budget of the node's class. Pre-colored nodes enter with `|phys|`.
    pub color: u8,
    pub is_fp: bool,
    /// 0 = not spilled; otherwise a 1-based spill slot, disjoint among
    /// interfering nodes.
    pub spill_slot: i32,
}

impl GraphNode {
    fn add_hint(&mut self, off: i32) {
        self.coalescing_hints[self.hint_id as usize % HINT_SLOTS] = off;
        self.hint_id = self.hint_id.wrapping_add(1);
    }
}

/// Whether two registers may share an interference edge: pseudo registers
/// are opaque to allocation and GP never interferes with FP.
fn interferes_with(a: MReg, b: MReg) -> bool {
    if a.is_none() || b.is_none() || a.is_pseudo() || b.is_pseudo() {
        return false;
    }
    a.is_fp() == b.is_fp()
}

#[derive(Debug, Clone)]
pub struct InterferenceGraph {
    nodes: Vec<GraphNode>,
}

impl InterferenceGraph {
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn nodes(&self) -> &[GraphNode] {
        &self.nodes
    }

    pub fn node(&self, uid: u32) -> Option<&GraphNode> {
        self.nodes.get(uid as usize)
    }

    // r[impl ra.graph]
    /// Builds the graph from the procedure's liveness state: walks every
    /// block in reverse maintaining the live set, connects each definition
    /// to everything live across it, and records move affinities.
    pub fn build(proc: &MProcedure, live: &Liveness) -> Self {
        let max = live.max_reg_id as usize;
        let mut nodes = Vec::with_capacity(max);
        for i in 0..max {
            let r = MReg::from_uid(i as u32);
            let mut vtx = BitSet::new(max);
            vtx.set(i);
            nodes.push(GraphNode {
                vtx,
                priority: (live.use_counts[i] + 1) as f32 * PRIO_BIAS,
                coalescing_hints: [0; HINT_SLOTS],
                hint_id: 0,
                color: if r.is_phys() {
                    r.phys_index().unsigned_abs() as u8
                } else {
                    0
                },
                is_fp: r.is_fp(),
                spill_slot: 0,
            });
        }
        let mut graph = Self { nodes };

        for bb in &proc.blocks {
            let mut live_set = bb.df_out_live.clone();
            for insn in bb.instructions.iter().rev() {
                if insn.op.is_move() && !insn.out.is_none() {
                    if let MOperand::Reg(src) = insn.args[0] {
                        graph.add_hint_pair(src, insn.out);
                    }
                }

                if !insn.out.is_none() {
                    live_set.reset(insn.out.uid() as usize);
                    graph.add_set(&live_set, insn.out);
                }

                insn.for_each_reg(|r, is_read| {
                    if is_read {
                        live_set.set(r.uid() as usize);
                    }
                });
                insn.for_each_reg(|r, is_read| {
                    if is_read {
                        graph.add_set(&live_set, r);
                    }
                });
            }
        }
        graph
    }

    fn add_vertex(&mut self, a: MReg, b: MReg) {
        if !interferes_with(a, b) {
            return;
        }
        let (au, bu) = (a.uid() as usize, b.uid() as usize);
        self.nodes[au].vtx.set(bu);
        self.nodes[bu].vtx.set(au);
    }

    fn add_set(&mut self, live: &BitSet, def: MReg) {
        for i in live.iter() {
            self.add_vertex(def, MReg::from_uid(i as u32));
        }
    }

    fn add_hint_pair(&mut self, a: MReg, b: MReg) {
        if a == b {
            return;
        }
        let (au, bu) = (a.uid() as usize, b.uid() as usize);
        let off = bu as i64 - au as i64;
        self.nodes[au].add_hint(off as i32);
        self.nodes[bu].add_hint(-off as i32);
    }

    /// Degree of a node, ignoring the self bit. 0 also for removed nodes.
    pub fn degree(&self, uid: u32) -> usize {
        self.nodes[uid as usize].vtx.popcount().saturating_sub(1)
    }

    /// True when `a` and `b` share an interference edge.
    pub fn interferes(&self, a: MReg, b: MReg) -> bool {
        self.nodes[a.uid() as usize].vtx.get(b.uid() as usize)
    }

    // r[impl ra.color]
    /// Colors the graph with `k` GP and `m` FP colors. On return every node
    /// is either colored or carries a spill slot; the return value is the
    /// per-class count of nodes that had to spill.
    ///
    /// Simplify-select: repeatedly remove a node of degree below its class
    /// budget (or, failing that, the over-degree node with the lowest
    /// priority), then recolor in reverse removal order, preferring a
    /// hinted color when it is still legal.
    pub fn try_color(&mut self, k: usize, m: usize) -> (usize, usize) {
        assert!(k <= 64 && m <= 64, "color budget exceeds mask width");
        let len = self.nodes.len();
        let mut removed: Vec<(usize, BitSet)> = Vec::new();

        // Push phase: strip the graph down to nothing.
        loop {
            let mut over: Option<usize> = None;
            let mut pick: Option<usize> = None;
            for (i, n) in self.nodes.iter().enumerate() {
                // Skip pre-colored and already-removed nodes.
                if n.color != 0 {
                    continue;
                }
                let pc = n.vtx.popcount();
                if pc == 0 {
                    continue;
                }
                let deg = pc - 1;
                let limit = if n.is_fp { m } else { k };
                if deg >= limit {
                    match over {
                        Some(o) if self.nodes[o].priority <= n.priority => {}
                        _ => over = Some(i),
                    }
                } else {
                    pick = Some(i);
                    break;
                }
            }
            let Some(idx) = pick.or(over) else {
                break;
            };

            let saved = std::mem::replace(&mut self.nodes[idx].vtx, BitSet::new(len));
            for i in saved.iter() {
                if i != idx {
                    self.nodes[i].vtx.reset(idx);
                }
            }
            removed.push((idx, saved));
        }

        // Pop phase: restore and color in reverse removal order.
        let mut spill_gp = 0usize;
        let mut spill_fp = 0usize;
        while let Some((idx, saved)) = removed.pop() {
            let limit = if self.nodes[idx].is_fp { m } else { k };
            let mut color_mask: u64 = if limit >= 64 { !0 } else { (1u64 << limit) - 1 };
            for i in saved.iter() {
                if i == idx {
                    continue;
                }
                self.nodes[i].vtx.set(idx);
                let c = self.nodes[i].color;
                if c != 0 && c as usize <= 64 {
                    color_mask &= !(1u64 << (c - 1));
                }
            }
            self.nodes[idx].vtx = saved;

            // Adopt a move partner's color when it is still legal; the move
            // then folds away as a self-move.
            let mut adopted = false;
            for s in 0..HINT_SLOTS {
                let off = self.nodes[idx].coalescing_hints[s];
                if off == 0 {
                    continue;
                }
                let j = idx as i64 + off as i64;
                if j < 0 || j >= len as i64 {
                    continue;
                }
                let c = self.nodes[j as usize].color;
                if c != 0 && color_mask & (1u64 << (c - 1)) != 0 {
                    self.nodes[idx].color = c;
                    adopted = true;
                    break;
                }
            }
            if adopted {
                continue;
            }

            if color_mask != 0 {
                self.nodes[idx].color = color_mask.trailing_zeros() as u8 + 1;
            } else {
                // No legal color: spill, taking the smallest slot disjoint
                // from every interfering neighbor.
                if self.nodes[idx].is_fp {
                    spill_fp += 1;
                } else {
                    spill_gp += 1;
                }
                self.nodes[idx].color = 0;
                self.nodes[idx].spill_slot = self.free_spill_slot(idx);
            }
        }
        (spill_gp, spill_fp)
    }

    fn free_spill_slot(&self, idx: usize) -> i32 {
        let mut slot = 1;
        loop {
            let clash = self.nodes[idx]
                .vtx
                .iter()
                .any(|i| i != idx && self.nodes[i].spill_slot == slot);
            if !clash {
                return slot;
            }
            slot += 1;
        }
    }
}
