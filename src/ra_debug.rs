//! Debug renderings of allocator state.
//!
//! Both printers are pure: they borrow the procedure/graph and return a
//! `String`, so they can back snapshot tests as well as ad-hoc dumps.

use std::fmt::Write;

use crate::arch::Abi;
use crate::igraph::InterferenceGraph;
use crate::mir::{MProcedure, MReg};

fn reg_label(r: MReg, abi: &Abi) -> String {
    if r.is_phys() {
        abi.native_name(abi.to_native(r.phys_index())).to_string()
    } else {
        r.to_string()
    }
}

/// Renders the interference graph in DOT form: one vertex per node with at
/// least one neighbor, colored by its assigned color.
pub fn graph_dot(graph: &InterferenceGraph, abi: &Abi) -> String {
    let mut out = String::new();
    out.push_str("graph {\n node [colorscheme=set312 penwidth=5]\n");
    for (i, n) in graph.nodes().iter().enumerate() {
        if n.vtx.popcount() > 1 {
            let r = MReg::from_uid(i as u32);
            let _ = writeln!(
                out,
                " r{} [color={} label=\"{}\"];",
                i,
                n.color,
                reg_label(r, abi)
            );
        }
    }
    for (i, n) in graph.nodes().iter().enumerate() {
        for j in n.vtx.iter() {
            if i < j {
                let _ = writeln!(out, " r{i} -- r{j};");
            }
        }
    }
    out.push_str("}\n");
    out
}

fn write_set(out: &mut String, label: &str, bits: &crate::bitset::BitSet) {
    out.push_str(label);
    out.push_str(" =");
    for i in bits.iter() {
        let _ = write!(out, " {}", MReg::from_uid(i as u32));
    }
    out.push('\n');
}

/// Renders each block with its hotness, liveness sets, and (when a graph is
/// given) the interference neighborhood of every instruction operand.
pub fn lifetime_listing(proc: &MProcedure, graph: Option<&InterferenceGraph>) -> String {
    let mut out = String::new();
    for (bi, bb) in proc.blocks.iter().enumerate() {
        let _ = write!(out, "-- Block b{bi}");
        if bb.hot < 0 {
            let _ = write!(out, " [COLD {}]", -bb.hot);
        }
        if bb.hot > 0 {
            let _ = write!(out, " [HOT {}]", bb.hot);
        }
        out.push('\n');
        write_set(&mut out, "Out-Live", &bb.df_out_live);
        write_set(&mut out, "Def", &bb.df_def);
        write_set(&mut out, "Ref", &bb.df_ref);

        for insn in &bb.instructions {
            let _ = write!(out, "    {insn}");
            if let Some(graph) = graph {
                insn.for_each_reg(|r, _| {
                    let Some(node) = graph.node(r.uid()) else {
                        return;
                    };
                    let _ = write!(out, " |I[{r}]:");
                    for j in node.vtx.iter() {
                        if j != r.uid() as usize {
                            let _ = write!(out, " {}", MReg::from_uid(j as u32));
                        }
                    }
                });
            }
            out.push('\n');
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::arch::x64;
    use crate::liveness;
    use crate::mir_parse::parse_proc;

    fn listing_fixture() -> (MProcedure, InterferenceGraph) {
        let mut proc = parse_proc(
            "proc {
              b0 hot=2 {
                v0 = movi 1
                v1 = movi 2
                v0 = add v0, v1
                ret v0
              }
            }",
        )
        .unwrap();
        let live = liveness::analyze(&mut proc);
        let graph = InterferenceGraph::build(&proc, &live);
        (proc, graph)
    }

    #[test]
    fn graph_dot_renders_connected_nodes_only() {
        let (_, graph) = listing_fixture();
        let dot = graph_dot(&graph, &x64::SYSV64);
        insta::assert_snapshot!(dot, @r#"
        graph {
         node [colorscheme=set312 penwidth=5]
         r71 [color=0 label="v0"];
         r73 [color=0 label="v1"];
         r71 -- r73;
        }
        "#);
    }

    #[test]
    fn lifetime_listing_shows_sets_and_neighborhoods() {
        let (proc, graph) = listing_fixture();
        let listing = lifetime_listing(&proc, Some(&graph));
        insta::assert_snapshot!(listing, @r"
        -- Block b0 [HOT 2]
        Out-Live =
        Def = v0 v1
        Ref =
            v0 = movi 1 |I[v0]: v1
            v1 = movi 2 |I[v1]: v0
            v0 = add v0, v1 |I[v0]: v1 |I[v1]: v0 |I[v0]: v1
            ret v0 |I[v0]: v1
        ");
    }

    #[test]
    fn printers_leave_state_untouched() {
        let (proc, graph) = listing_fixture();
        let before = proc.to_string();
        let _ = graph_dot(&graph, &x64::SYSV64);
        let _ = lifetime_listing(&proc, Some(&graph));
        assert_eq!(proc.to_string(), before);
    }
}
