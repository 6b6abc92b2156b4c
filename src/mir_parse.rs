//! Textual MIR parser.
//!
//! Parses the format produced by `MProcedure::Display` back into a
//! procedure. Corpus tests and diagnostics build MIR from text instead of
//! hand-assembled struct literals. Two passes: text → AST, then checks and
//! assembly into an [`MProcedure`].

use chumsky::prelude::*;

use crate::mir::{BlockId, MBlock, MInsn, MMem, MOp, MOperand, MProcedure, MReg};

type Extra<'src> = extra::Err<Rich<'src, char>>;

fn ws<'src>() -> impl Parser<'src, &'src str, (), Extra<'src>> + Clone {
    any()
        .filter(|c: &char| c.is_whitespace())
        .repeated()
        .ignored()
}

/// Horizontal whitespace only, so instructions do not span lines.
fn hws<'src>() -> impl Parser<'src, &'src str, (), Extra<'src>> + Clone {
    any()
        .filter(|c: &char| *c == ' ' || *c == '\t')
        .repeated()
        .ignored()
}

fn uint32<'src>() -> impl Parser<'src, &'src str, u32, Extra<'src>> + Clone {
    text::int::<_, Extra<'_>>(10).map(|s: &str| s.parse::<u32>().unwrap())
}

fn uint64<'src>() -> impl Parser<'src, &'src str, u64, Extra<'src>> + Clone {
    let hex = just("0x")
        .ignore_then(text::int::<_, Extra<'_>>(16))
        .map(|s: &str| u64::from_str_radix(s, 16).unwrap());
    let dec = text::int::<_, Extra<'_>>(10).map(|s: &str| s.parse::<u64>().unwrap());
    hex.or(dec)
}

fn int64<'src>() -> impl Parser<'src, &'src str, i64, Extra<'src>> + Clone {
    just("-")
        .or_not()
        .then(uint64())
        .map(|(neg, v)| if neg.is_some() { -(v as i64) } else { v as i64 })
}

fn int32<'src>() -> impl Parser<'src, &'src str, i32, Extra<'src>> + Clone {
    int64().map(|v| v as i32)
}

/// `v0`, `f3`, `$r5`, `$f2`, `%flags`, `%vm`, `%tos`, `%nargs`, `%sp`
fn reg<'src>() -> impl Parser<'src, &'src str, MReg, Extra<'src>> + Clone {
    choice((
        just("%flags").to(MReg::FLAGS),
        just("%vm").to(MReg::VM),
        just("%tos").to(MReg::TOS),
        just("%nargs").to(MReg::NARGS),
        just("%sp").to(MReg::SP),
        just("$r").ignore_then(uint32()).map(|n| MReg::phys(n as i32)),
        just("$f").ignore_then(uint32()).map(|n| MReg::phys(-(n as i32))),
        just("v").ignore_then(uint32()).map(MReg::virt_gp),
        just("f").ignore_then(uint32()).map(MReg::virt_fp),
    ))
}

/// `[%sp + 8]`, `[v0 - 16]`
fn mem<'src>() -> impl Parser<'src, &'src str, MMem, Extra<'src>> + Clone {
    just("[")
        .ignore_then(reg().padded_by(hws()))
        .then(one_of("+-"))
        .then(uint64().padded_by(hws()))
        .then_ignore(just("]"))
        .map(|((base, sign), n)| MMem {
            base,
            disp: if sign == '-' { -(n as i32) } else { n as i32 },
        })
}

fn operand<'src>() -> impl Parser<'src, &'src str, MOperand, Extra<'src>> + Clone {
    choice((
        mem().map(MOperand::Mem),
        reg().map(MOperand::Reg),
        int64().map(MOperand::Imm),
    ))
}

fn opcode<'src>() -> impl Parser<'src, &'src str, MOp, Extra<'src>> + Clone {
    choice((
        just("movi").to(MOp::Movi),
        just("movf").to(MOp::Movf),
        just("loadi64").to(MOp::LoadI64),
        just("loadf64").to(MOp::LoadF64),
        just("storei64").to(MOp::StoreI64),
        just("storef64").to(MOp::StoreF64),
        just("add").to(MOp::Add),
        just("sub").to(MOp::Sub),
        just("mul").to(MOp::Mul),
        just("cmp").to(MOp::Cmp),
        just("jmp").to(MOp::Jmp),
        just("jcc").to(MOp::Jcc),
        just("call").to(MOp::Call),
        just("ret").to(MOp::Ret),
    ))
}

#[derive(Debug, Clone)]
struct AstInst {
    out: Option<MReg>,
    op: MOp,
    args: Vec<MOperand>,
}

#[derive(Debug, Clone)]
struct AstBlock {
    id: u32,
    hot: i32,
    succs: Vec<u32>,
    insns: Vec<AstInst>,
}

/// `[out =] op [operand {, operand}]`
fn instruction<'src>() -> impl Parser<'src, &'src str, AstInst, Extra<'src>> + Clone {
    let out = reg()
        .then_ignore(just("=").padded_by(hws()))
        .or_not();
    let operands = operand()
        .separated_by(just(",").padded_by(hws()))
        .collect::<Vec<_>>();
    out.then(opcode())
        .then(hws().ignore_then(operands))
        .map(|((out, op), args)| AstInst { out, op, args })
}

/// `b0 hot=2 -> b1 b2 { ... }`
fn block<'src>() -> impl Parser<'src, &'src str, AstBlock, Extra<'src>> + Clone {
    let hot = hws()
        .ignore_then(just("hot="))
        .ignore_then(int32());
    let succs = hws().ignore_then(just("->")).ignore_then(
        hws()
            .ignore_then(just("b"))
            .ignore_then(uint32())
            .repeated()
            .at_least(1)
            .collect::<Vec<_>>(),
    );
    just("b")
        .ignore_then(uint32())
        .then(hot.or_not())
        .then(succs.or_not())
        .then_ignore(hws())
        .then_ignore(just("{"))
        .then(
            instruction()
                .padded_by(ws())
                .repeated()
                .collect::<Vec<_>>(),
        )
        .then_ignore(ws())
        .then_ignore(just("}"))
        .map(|(((id, hot), succs), insns)| AstBlock {
            id,
            hot: hot.unwrap_or(0),
            succs: succs.unwrap_or_default(),
            insns,
        })
}

fn proc_parser<'src>() -> impl Parser<'src, &'src str, Vec<AstBlock>, Extra<'src>> {
    ws().ignore_then(just("proc"))
        .ignore_then(ws())
        .ignore_then(just("{"))
        .ignore_then(block().padded_by(ws()).repeated().collect::<Vec<_>>())
        .then_ignore(just("}"))
        .then_ignore(ws())
        .then_ignore(end())
}

fn assemble(ast: Vec<AstBlock>) -> Result<MProcedure, String> {
    for (i, b) in ast.iter().enumerate() {
        if b.id as usize != i {
            return Err(format!(
                "block b{} declared out of order (expected b{i})",
                b.id
            ));
        }
    }
    let len = ast.len();
    let mut proc = MProcedure::new();
    for b in ast {
        for &s in &b.succs {
            if s as usize >= len {
                return Err(format!("unknown successor b{s}"));
            }
        }
        let mut instructions = Vec::with_capacity(b.insns.len());
        for inst in b.insns {
            if inst.args.len() > 3 {
                return Err(format!(
                    "instruction {} has {} operands (3 at most)",
                    inst.op.name(),
                    inst.args.len()
                ));
            }
            let mut args = [MOperand::None; 3];
            args[..inst.args.len()].copy_from_slice(&inst.args);
            instructions.push(MInsn::new(inst.op, inst.out.unwrap_or(MReg::NONE), args));
        }
        let bb = MBlock {
            instructions,
            successors: b.succs.iter().map(|&s| BlockId(s)).collect(),
            hot: b.hot,
            ..Default::default()
        };
        let vregs = &mut proc.vregs;
        for insn in &bb.instructions {
            insn.for_each_reg(|r, _| vregs.mark_used(r));
        }
        proc.blocks.push(bb);
    }
    Ok(proc)
}

// r[impl mir.text]
/// Parses a textual procedure. The fresh-register counters are positioned
/// past the highest parsed virtual index, so subsequently minted registers
/// do not collide.
pub fn parse_proc(src: &str) -> Result<MProcedure, String> {
    let ast = proc_parser().parse(src).into_result().map_err(|errs| {
        errs.iter()
            .map(|e| e.to_string())
            .collect::<Vec<_>>()
            .join("\n")
    })?;
    assemble(ast)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn roundtrips_through_display() {
        let src = "proc {
  b0 hot=2 -> b1 b2 {
    v0 = movi 42
    f0 = movf 4607182418800017408
    v1 = add v0, $r1
    storei64 [%sp + 8], v1
    v2 = loadi64 [%sp - 8]
    %flags = cmp v1, -7
    jcc %flags
  }
  b1 {
    ret v0
  }
  b2 hot=-1 {
    v3 = call 99
    jmp
  }
}";
        let proc = parse_proc(src).unwrap();
        assert_eq!(proc.to_string(), src);
        let reparsed = parse_proc(&proc.to_string()).unwrap();
        assert_eq!(reparsed.to_string(), src);
    }

    #[test]
    fn counters_skip_past_parsed_registers() {
        let mut proc = parse_proc(
            "proc {
              b0 {
                v4 = movi 1
                f2 = movf 0
                ret v4
              }
            }",
        )
        .unwrap();
        assert_eq!(proc.vregs.next_gp(), MReg::virt_gp(5));
        assert_eq!(proc.vregs.next_fp(), MReg::virt_fp(3));
    }

    #[test]
    fn successors_and_hotness_are_parsed() {
        let proc = parse_proc(
            "proc {
              b0 hot=3 -> b1 {
                jmp
              }
              b1 { ret v0 }
            }",
        )
        .unwrap();
        assert_eq!(proc.blocks[0].hot, 3);
        assert_eq!(proc.blocks[0].successors, vec![BlockId(1)]);
        assert!(proc.blocks[1].successors.is_empty());
    }

    #[test]
    fn rejects_malformed_procedures() {
        assert!(parse_proc("proc { b1 { ret v0 } }").is_err());
        assert!(parse_proc("proc { b0 -> b5 { jmp } }").is_err());
        assert!(parse_proc("proc { b0 { v0 = frobnicate v1 } }").is_err());
        assert!(parse_proc("garbage").is_err());
    }
}
