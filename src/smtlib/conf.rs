// Copyright 2022-2023 VMware, Inc.
// SPDX-License-Identifier: BSD-2-Clause

//! Command lines and startup options of the supported solvers.

use crate::smtlib::sexp::{symbol, Sexp};

/// How to launch a solver and which options to set once it runs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SolverCmd {
    pub bin: String,
    pub args: Vec<String>,
    /// `(set-option :name value)` commands, in order
    pub options: Vec<(String, Sexp)>,
}

impl SolverCmd {
    fn new(bin: &str, args: &[&str]) -> Self {
        Self {
            bin: bin.to_string(),
            args: args.iter().map(|a| a.to_string()).collect(),
            options: vec![],
        }
    }

    pub fn option(&mut self, name: &str, value: Sexp) {
        self.options.push((name.to_string(), value));
    }

    /// cvc5 reading SMT-LIB from stdin. The timeout applies to each
    /// `check-sat`; `None` disables it.
    pub fn cvc5(bin: &str, timeout_ms: Option<u64>) -> Self {
        let mut cmd = Self::new(bin, &["-q", "--lang", "smt2"]);
        cmd.option("interactive", symbol("false"));
        cmd.option("incremental", symbol("true"));
        cmd.option("seed", Sexp::Num(1));
        cmd.option("tlimit-per", Sexp::Num(timeout_ms.unwrap_or(0)));
        cmd
    }

    /// Z3 reading SMT-LIB from stdin. Without a timeout Z3 waits forever.
    pub fn z3(bin: &str, timeout_ms: Option<u64>) -> Self {
        let mut cmd = Self::new(bin, &["-in", "-smt2"]);
        cmd.option("model.completion", symbol("true"));
        if let Some(ms) = timeout_ms {
            cmd.option("timeout", Sexp::Num(ms));
        }
        cmd
    }

    /// The command line as a shell would show it.
    pub fn cmdline(&self) -> String {
        [&self.bin]
            .into_iter()
            .chain(&self.args)
            .map(|a| {
                if a.contains(' ') {
                    format!("\"{a}\"")
                } else {
                    a.clone()
                }
            })
            .collect::<Vec<_>>()
            .join(" ")
    }
}

#[cfg(test)]
mod tests {
    use super::SolverCmd;
    use crate::smtlib::sexp::Sexp;

    #[test]
    fn test_cmdline() {
        let z3 = SolverCmd::z3("/opt/my solvers/z3", Some(1000));
        assert_eq!(z3.cmdline(), "\"/opt/my solvers/z3\" -in -smt2");
        assert!(z3
            .options
            .contains(&("timeout".to_string(), Sexp::Num(1000))));
        assert_eq!(SolverCmd::z3("z3", None).options.len(), 1);

        let cvc5 = SolverCmd::cvc5("cvc5", None);
        assert_eq!(cvc5.cmdline(), "cvc5 -q --lang smt2");
        assert_eq!(
            cvc5.options.last(),
            Some(&("tlimit-per".to_string(), Sexp::Num(0)))
        );
    }
}
