//! Machine IR for the mirlo back-end.
//!
//! MIR sits between the bytecode front-end and the machine-code emitter:
//! instructions are target-shaped but operate on an unbounded virtual
//! register space. The register allocator rewrites every virtual register
//! to a physical one and materializes spill traffic.
//!
//! Register identifiers (`MReg`) are a single dense `u32` uid space, split
//! into bands:
//!
//! - `0` — none / absent operand.
//! - `[1, 66)` — physical registers. `uid = 33 + p` for the signed physical
//!   index `p` (FP negative, GP positive, see [`crate::arch`]); uid 33 is
//!   never produced.
//! - `[66, 71)` — pseudo registers (`%flags`, `%vm`, `%tos`, `%nargs`,
//!   `%sp`). Opaque to allocation.
//! - `[71, ∞)` — virtual registers, class by parity (even offset GP, odd FP).
//!
//! The density matters: liveness bitsets and the interference graph are
//! indexed directly by uid.

use std::fmt;

use crate::bitset::BitSet;

/// A MIR register in any band of the uid space.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct MReg(u32);

const PHYS_BIAS: u32 = 33;
const PHYS_LAST: u32 = 65;

impl MReg {
    pub const NONE: MReg = MReg(0);
    pub const FLAGS: MReg = MReg(66);
    pub const VM: MReg = MReg(67);
    pub const TOS: MReg = MReg(68);
    pub const NARGS: MReg = MReg(69);
    pub const SP: MReg = MReg(70);

    /// First freely-allocatable uid.
    pub const FIRST_VIRT: u32 = 71;

    pub fn from_uid(uid: u32) -> MReg {
        MReg(uid)
    }

    pub fn uid(self) -> u32 {
        self.0
    }

    /// A physical register from its signed index (`p < 0` FP, `p > 0` GP).
    pub fn phys(p: i32) -> MReg {
        debug_assert!(p != 0 && (-32..=32).contains(&p), "bad physical index {p}");
        MReg((PHYS_BIAS as i32 + p) as u32)
    }

    /// The `n`-th GP virtual register.
    pub fn virt_gp(n: u32) -> MReg {
        MReg(Self::FIRST_VIRT + 2 * n)
    }

    /// The `n`-th FP virtual register.
    pub fn virt_fp(n: u32) -> MReg {
        MReg(Self::FIRST_VIRT + 2 * n + 1)
    }

    pub fn is_none(self) -> bool {
        self.0 == 0
    }

    pub fn is_phys(self) -> bool {
        (1..=PHYS_LAST).contains(&self.0) && self.0 != PHYS_BIAS
    }

    pub fn is_virt(self) -> bool {
        self.0 >= Self::FIRST_VIRT
    }

    /// True for registers that never participate in allocation.
    pub fn is_pseudo(self) -> bool {
        (Self::FLAGS.0..Self::FIRST_VIRT).contains(&self.0)
    }

    /// Signed physical index; only meaningful when [`is_phys`](Self::is_phys).
    pub fn phys_index(self) -> i32 {
        debug_assert!(self.is_phys());
        self.0 as i32 - PHYS_BIAS as i32
    }

    /// Class-local ordinal of a virtual register.
    pub fn virt_index(self) -> u32 {
        debug_assert!(self.is_virt());
        (self.0 - Self::FIRST_VIRT) / 2
    }

    pub fn is_fp(self) -> bool {
        if self.is_phys() {
            self.phys_index() < 0
        } else if self.is_virt() {
            (self.0 - Self::FIRST_VIRT) & 1 == 1
        } else {
            false
        }
    }
}

impl fmt::Display for MReg {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            MReg::NONE => write!(f, "_"),
            MReg::FLAGS => write!(f, "%flags"),
            MReg::VM => write!(f, "%vm"),
            MReg::TOS => write!(f, "%tos"),
            MReg::NARGS => write!(f, "%nargs"),
            MReg::SP => write!(f, "%sp"),
            r if r.is_phys() => {
                let p = r.phys_index();
                if p < 0 {
                    write!(f, "$f{}", -p)
                } else {
                    write!(f, "$r{p}")
                }
            }
            r if r.is_virt() => {
                if r.is_fp() {
                    write!(f, "f{}", r.virt_index())
                } else {
                    write!(f, "v{}", r.virt_index())
                }
            }
            r => write!(f, "?{}", r.0),
        }
    }
}

/// A memory reference: `[base + disp]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MMem {
    pub base: MReg,
    pub disp: i32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MOperand {
    #[default]
    None,
    Reg(MReg),
    Imm(i64),
    Mem(MMem),
}

impl fmt::Display for MOperand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MOperand::None => write!(f, "_"),
            MOperand::Reg(r) => write!(f, "{r}"),
            MOperand::Imm(v) => write!(f, "{v}"),
            MOperand::Mem(m) => {
                if m.disp < 0 {
                    write!(f, "[{} - {}]", m.base, -(m.disp as i64))
                } else {
                    write!(f, "[{} + {}]", m.base, m.disp)
                }
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MOp {
    Movi,
    Movf,
    LoadI64,
    LoadF64,
    StoreI64,
    StoreF64,
    Add,
    Sub,
    Mul,
    Cmp,
    Jmp,
    Jcc,
    Call,
    Ret,
}

impl MOp {
    pub fn name(self) -> &'static str {
        match self {
            MOp::Movi => "movi",
            MOp::Movf => "movf",
            MOp::LoadI64 => "loadi64",
            MOp::LoadF64 => "loadf64",
            MOp::StoreI64 => "storei64",
            MOp::StoreF64 => "storef64",
            MOp::Add => "add",
            MOp::Sub => "sub",
            MOp::Mul => "mul",
            MOp::Cmp => "cmp",
            MOp::Jmp => "jmp",
            MOp::Jcc => "jcc",
            MOp::Call => "call",
            MOp::Ret => "ret",
        }
    }

    /// Register-to-register move opcodes carry coalescing hints.
    pub fn is_move(self) -> bool {
        matches!(self, MOp::Movi | MOp::Movf)
    }

    /// Spill-traffic opcodes; registers read by these weigh heavily in
    /// spill priorities.
    pub fn is_mem_access(self) -> bool {
        matches!(
            self,
            MOp::LoadI64 | MOp::LoadF64 | MOp::StoreI64 | MOp::StoreF64
        )
    }
}

/// One MIR instruction: an opcode, a defined register (possibly none), and
/// up to three source operands.
#[derive(Debug, Clone, PartialEq)]
pub struct MInsn {
    pub op: MOp,
    pub out: MReg,
    pub args: [MOperand; 3],
}

impl MInsn {
    pub fn new(op: MOp, out: MReg, args: [MOperand; 3]) -> Self {
        Self { op, out, args }
    }

    /// Visits every register operand with its read/write role: sources and
    /// memory bases first (`is_read = true`), then the definition
    /// (`is_read = false`). Absent registers are skipped.
    pub fn for_each_reg(&self, mut f: impl FnMut(MReg, bool)) {
        for a in &self.args {
            match a {
                MOperand::Reg(r) if !r.is_none() => f(*r, true),
                MOperand::Mem(m) if !m.base.is_none() => f(m.base, true),
                _ => {}
            }
        }
        if !self.out.is_none() {
            f(self.out, false);
        }
    }

    /// Mutable variant of [`for_each_reg`](Self::for_each_reg); the callback
    /// may rewrite the register in place.
    pub fn for_each_reg_mut(&mut self, mut f: impl FnMut(&mut MReg, bool)) {
        for a in &mut self.args {
            match a {
                MOperand::Reg(r) if !r.is_none() => f(r, true),
                MOperand::Mem(m) if !m.base.is_none() => f(&mut m.base, true),
                _ => {}
            }
        }
        if !self.out.is_none() {
            f(&mut self.out, false);
        }
    }
}

impl fmt::Display for MInsn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if !self.out.is_none() {
            write!(f, "{} = ", self.out)?;
        }
        write!(f, "{}", self.op.name())?;
        let mut first = true;
        for a in &self.args {
            if matches!(a, MOperand::None) {
                continue;
            }
            if first {
                write!(f, " {a}")?;
                first = false;
            } else {
                write!(f, ", {a}")?;
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BlockId(pub u32);

impl BlockId {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// A basic block: instructions, successor edges, a static hotness weight,
/// and the four liveness bitsets the analyzer maintains.
#[derive(Debug, Clone, Default)]
pub struct MBlock {
    pub instructions: Vec<MInsn>,
    pub successors: Vec<BlockId>,
    /// Negative = cold, positive = hot, zero = neutral.
    pub hot: i32,
    pub df_def: BitSet,
    pub df_ref: BitSet,
    pub df_in_live: BitSet,
    pub df_out_live: BitSet,
}

/// Fresh virtual register source. GP and FP counters are independent.
#[derive(Debug, Clone, Copy, Default)]
pub struct VRegAlloc {
    next_gp: u32,
    next_fp: u32,
}

impl VRegAlloc {
    pub fn next_gp(&mut self) -> MReg {
        let r = MReg::virt_gp(self.next_gp);
        self.next_gp += 1;
        r
    }

    pub fn next_fp(&mut self) -> MReg {
        let r = MReg::virt_fp(self.next_fp);
        self.next_fp += 1;
        r
    }

    /// Ensures subsequently allocated registers do not collide with `r`.
    pub fn mark_used(&mut self, r: MReg) {
        if !r.is_virt() {
            return;
        }
        let n = r.virt_index() + 1;
        if r.is_fp() {
            self.next_fp = self.next_fp.max(n);
        } else {
            self.next_gp = self.next_gp.max(n);
        }
    }
}

/// A procedure in MIR form. The first block is the entry. The register
/// allocator populates `used_stack_length` and the used-register masks.
#[derive(Debug, Clone, Default)]
pub struct MProcedure {
    pub blocks: Vec<MBlock>,
    pub vregs: VRegAlloc,
    /// Bytes of spill-slot area the prologue must reserve.
    pub used_stack_length: u32,
    /// Physical GP registers assigned by allocation, bit `i` = index `i + 1`.
    pub used_gp_mask: u64,
    /// Physical FP registers assigned by allocation, bit `i` = index `-(i + 1)`.
    pub used_fp_mask: u64,
}

impl MProcedure {
    pub fn new() -> Self {
        Self::default()
    }
}

impl fmt::Display for MProcedure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "proc {{")?;
        for (bi, bb) in self.blocks.iter().enumerate() {
            write!(f, "  b{bi}")?;
            if bb.hot != 0 {
                write!(f, " hot={}", bb.hot)?;
            }
            if !bb.successors.is_empty() {
                write!(f, " ->")?;
                for s in &bb.successors {
                    write!(f, " b{}", s.0)?;
                }
            }
            writeln!(f, " {{")?;
            for insn in &bb.instructions {
                writeln!(f, "    {insn}")?;
            }
            writeln!(f, "  }}")?;
        }
        write!(f, "}}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn uid_bands_are_disjoint() {
        assert!(MReg::NONE.is_none());
        for p in [-32, -1, 1, 32] {
            let r = MReg::phys(p);
            assert!(r.is_phys() && !r.is_virt() && !r.is_pseudo());
            assert_eq!(r.phys_index(), p);
            assert_eq!(r.is_fp(), p < 0);
        }
        for r in [MReg::FLAGS, MReg::VM, MReg::TOS, MReg::NARGS, MReg::SP] {
            assert!(r.is_pseudo() && !r.is_phys() && !r.is_virt());
        }
        let v = MReg::virt_gp(0);
        let f = MReg::virt_fp(0);
        assert!(v.is_virt() && !v.is_fp());
        assert!(f.is_virt() && f.is_fp());
        assert_eq!(v.uid() + 1, f.uid());
    }

    #[test]
    fn visitor_yields_reads_before_the_def() {
        let mut insn = MInsn::new(
            MOp::Add,
            MReg::virt_gp(0),
            [
                MOperand::Reg(MReg::virt_gp(0)),
                MOperand::Mem(MMem {
                    base: MReg::virt_gp(1),
                    disp: 8,
                }),
                MOperand::Imm(3),
            ],
        );
        let mut seen = Vec::new();
        insn.for_each_reg(|r, is_read| seen.push((r, is_read)));
        assert_eq!(
            seen,
            vec![
                (MReg::virt_gp(0), true),
                (MReg::virt_gp(1), true),
                (MReg::virt_gp(0), false),
            ]
        );

        insn.for_each_reg_mut(|r, _| *r = MReg::phys(1));
        let mut rewritten = Vec::new();
        insn.for_each_reg(|r, _| rewritten.push(r));
        assert_eq!(rewritten, vec![MReg::phys(1); 3]);
    }

    #[test]
    fn vreg_alloc_skips_past_marked_registers() {
        let mut vregs = VRegAlloc::default();
        vregs.mark_used(MReg::virt_gp(7));
        vregs.mark_used(MReg::virt_fp(2));
        assert_eq!(vregs.next_gp(), MReg::virt_gp(8));
        assert_eq!(vregs.next_fp(), MReg::virt_fp(3));
    }

    #[test]
    fn display_formats() {
        let insn = MInsn::new(
            MOp::StoreI64,
            MReg::NONE,
            [
                MOperand::Mem(MMem {
                    base: MReg::SP,
                    disp: 16,
                }),
                MOperand::Reg(MReg::virt_gp(4)),
                MOperand::None,
            ],
        );
        assert_eq!(insn.to_string(), "storei64 [%sp + 16], v4");
        assert_eq!(MReg::phys(-3).to_string(), "$f3");
        assert_eq!(MReg::phys(5).to_string(), "$r5");
    }
}
