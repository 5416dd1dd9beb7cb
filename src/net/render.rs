// Copyright 2022-2023 VMware, Inc.
// SPDX-License-Identifier: BSD-2-Clause

use std::io::{self, Write};

use crate::logic::Formula;
use crate::net::Net;

impl Net {
    /// Render the reachable part of the net in Graphviz DOT format.
    pub fn render_dot<W: Write>(&self, w: &mut W) -> io::Result<()> {
        writeln!(w, "digraph net {{")?;

        let nodes = self.collect_nodes();
        if !nodes.places.is_empty() {
            writeln!(w, "node[shape=circle];")?;
            for &p in &nodes.places {
                let name = &self.place(p).name;
                let label = self
                    .initial_marking()
                    .get(&p)
                    .map(|color| color.to_string())
                    .unwrap_or_default();
                writeln!(w, "\"{name}\"[xlabel=\"{name}\",label=\"{label}\"];")?;
            }
        }
        if !nodes.transitions.is_empty() {
            writeln!(w, "node[shape=box];")?;
            for &t in &nodes.transitions {
                let transition = self.transition(t);
                write!(w, "\"{}\"", transition.name)?;
                if transition.guard != Formula::top() {
                    write!(w, "[xlabel=\"{}\"]", transition.guard)?;
                }
                writeln!(w, ";")?;
            }
        }

        for &t in &nodes.transitions {
            let transition = self.transition(t);
            for (&p, v) in &transition.preset {
                writeln!(
                    w,
                    "\"{}\" -> \"{}\"[xlabel=\"{v}\"]",
                    self.place(p).name,
                    transition.name
                )?;
            }
            for (&p, v) in &transition.postset {
                writeln!(
                    w,
                    "\"{}\" -> \"{}\"[xlabel=\"{v}\"]",
                    transition.name,
                    self.place(p).name
                )?;
            }
        }

        writeln!(w, "}}")
    }

    /// Render the reachable part of the net as a low-level PEP net, ignoring
    /// colors. PEP numbers nodes starting at 1.
    pub fn render_pep<W: Write>(&self, w: &mut W) -> io::Result<()> {
        writeln!(w, "PEP")?;
        writeln!(w, "PTNet")?;
        writeln!(w, "FORMAT_N")?;

        let nodes = self.collect_nodes();
        writeln!(w, "PL")?;
        for &p in &nodes.places {
            let tokens = usize::from(self.initial_marking().contains_key(&p));
            writeln!(w, "{}\"{}\"0@0M{tokens}", p + 1, self.place(p).name)?;
        }

        writeln!(w, "TR")?;
        for &t in &nodes.transitions {
            writeln!(w, "{}\"{}\"0@0", t + 1, self.transition(t).name)?;
        }

        writeln!(w, "TP")?;
        for &t in &nodes.transitions {
            for &p in self.transition(t).postset.keys() {
                writeln!(w, "{}<{}", t + 1, p + 1)?;
            }
        }

        writeln!(w, "PT")?;
        for &p in &nodes.places {
            for &t in self.place_postset(p) {
                writeln!(w, "{}>{}", p + 1, t + 1)?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use crate::net::tests::chain;

    #[test]
    fn test_render_dot() {
        let mut out = vec![];
        chain().render_dot(&mut out).unwrap();
        insta::assert_snapshot!(String::from_utf8(out).unwrap(), @r###"
        digraph net {
        node[shape=circle];
        "p"[xlabel="p",label="3"];
        "q"[xlabel="q",label=""];
        "r"[xlabel="r",label=""];
        node[shape=box];
        "t"[xlabel="y = x"];
        "u";
        "p" -> "t"[xlabel="x"]
        "t" -> "q"[xlabel="y"]
        "q" -> "u"[xlabel="y"]
        "u" -> "r"[xlabel="y"]
        }
        "###);
    }

    #[test]
    fn test_render_pep() {
        let mut out = vec![];
        chain().render_pep(&mut out).unwrap();
        insta::assert_snapshot!(String::from_utf8(out).unwrap(), @r###"
        PEP
        PTNet
        FORMAT_N
        PL
        1"p"0@0M1
        2"q"0@0M0
        3"r"0@0M0
        TR
        1"t"0@0
        2"u"0@0
        TP
        1<2
        2<3
        PT
        1>1
        2>2
        "###);
    }
}
