// Copyright 2022-2023 VMware, Inc.
// SPDX-License-Identifier: BSD-2-Clause

use std::io::{self, Write};

use itertools::Itertools;

use crate::logic::Formula;
use crate::net::Net;
use crate::unfolding::{Mode, Unfolding};

impl Unfolding {
    /// Render the prefix in Graphviz DOT format. Cut-off events are dashed.
    /// With `show_internal` the identifiers, co-sets and constraints of the
    /// nodes are shown too.
    pub fn render_dot<W: Write>(&self, net: &Net, w: &mut W, show_internal: bool) -> io::Result<()> {
        writeln!(w, "digraph unfolding {{")?;

        if !self.conditions().is_empty() {
            writeln!(w, "node[shape=circle];")?;
        }
        for b in self.conditions() {
            let place = &net.place(b.place).name;
            let color = match self.mode() {
                Mode::Uncolored => String::new(),
                Mode::Colored | Mode::Jit(_) => b.color.to_string(),
            };
            let xlabel = if show_internal {
                let co = self.co(b.id).iter().map(|c| format!("c{c}")).join(", ");
                format!("c{} {place} co={{{co}}}", b.id)
            } else {
                place.clone()
            };
            writeln!(w, "\"c{}\"[xlabel=\"{xlabel}\",label=\"{color}\"];", b.id)?;
        }

        if !self.events().is_empty() {
            writeln!(w, "node[shape=box];")?;
        }
        for e in self.events() {
            let name = &net.transition(e.transition).name;
            let label = if show_internal {
                format!("e{} {name}", e.id)
            } else {
                name.clone()
            };
            write!(w, "\"e{}\"[label=\"{label}\"", e.id)?;
            if show_internal && e.constraint != Formula::top() {
                write!(w, ",xlabel=\"{}\"", e.constraint)?;
            }
            if e.cutoff {
                write!(w, ",style=dashed")?;
            }
            writeln!(w, "];")?;
        }

        for e in self.events() {
            for b in &e.preset {
                writeln!(w, "\"c{b}\" -> \"e{}\"", e.id)?;
            }
            for b in &e.postset {
                writeln!(w, "\"e{}\" -> \"c{b}\"", e.id)?;
            }
        }

        writeln!(w, "}}")
    }
}

#[cfg(test)]
mod tests {
    use crate::net::tests::chain;
    use crate::unfolding::{unfold, Mode, UnfoldOptions};

    #[test]
    fn test_render_dot() {
        let net = chain();
        let options = UnfoldOptions {
            mode: Mode::Uncolored,
            ..Default::default()
        };
        let u = unfold(&net, &options, None).unwrap();
        let mut out = vec![];
        u.render_dot(&net, &mut out, false).unwrap();
        insta::assert_snapshot!(String::from_utf8(out).unwrap(), @r###"
        digraph unfolding {
        node[shape=circle];
        "c0"[xlabel="p",label=""];
        "c1"[xlabel="q",label=""];
        "c2"[xlabel="r",label=""];
        node[shape=box];
        "e0"[label="t"];
        "e1"[label="u"];
        "c0" -> "e0"
        "e0" -> "c1"
        "c1" -> "e1"
        "e1" -> "c2"
        }
        "###);
    }

    #[test]
    fn test_render_internal() {
        let net = crate::builtin::lookup("parallelAmnesia#1").unwrap().unwrap();
        let options = UnfoldOptions {
            mode: Mode::Jit("0..1".parse().unwrap()),
            depth: Some(1),
            ..Default::default()
        };
        let u = unfold(&net, &options, None).unwrap();
        let mut out = vec![];
        u.render_dot(&net, &mut out, true).unwrap();
        insta::assert_snapshot!(String::from_utf8(out).unwrap(), @r###"
        digraph unfolding {
        node[shape=circle];
        "c0"[xlabel="c0 p_0 co={}",label="0"];
        "c1"[xlabel="c1 p_0 co={}",label="1"];
        "c2"[xlabel="c2 p_0 co={}",label="0"];
        "c3"[xlabel="c3 p_0 co={}",label="1"];
        node[shape=box];
        "e0"[label="e0 forget_0"];
        "e1"[label="e1 forget_0",style=dashed];
        "e2"[label="e2 inc_0",style=dashed];
        "c0" -> "e0"
        "e0" -> "c1"
        "c0" -> "e1"
        "e1" -> "c2"
        "c0" -> "e2"
        "e2" -> "c3"
        }
        "###);
    }
}
