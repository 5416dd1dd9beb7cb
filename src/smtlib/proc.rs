// Copyright 2022-2023 VMware, Inc.
// SPDX-License-Identifier: BSD-2-Clause

//! A solver process driven over its stdin and stdout.
//!
//! Commands are written as s-expressions. After a command that answers, an
//! `(echo)` of a marker is sent and the output is read up to that marker, so
//! responses spanning several lines are read whole.

use std::{
    fs::File,
    io::{self, BufRead, BufReader, Write},
    path::Path,
    process::{Child, ChildStdin, ChildStdout, Command, Stdio},
};

use thiserror::Error;

use crate::smtlib::conf::SolverCmd;
use crate::smtlib::sexp::{self, app, list, symbol, Sexp};

/// The answer to `(check-sat)`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SatResp {
    Sat,
    Unsat,
    /// With the solver's `:reason-unknown`, e.g. a timeout or incomplete
    /// quantifier instantiation.
    Unknown(String),
}

#[derive(Error, Debug)]
pub enum SolverError {
    #[error("could not talk to the solver: {0}")]
    Io(#[from] io::Error),
    #[error("solver exited unexpectedly: {0}")]
    UnexpectedClose(String),
    #[error("unexpected solver response to {command}: {response}")]
    UnexpectedResponse { command: String, response: String },
}

type Result<T> = std::result::Result<T, SolverError>;

const DONE: &str = "<<DONE>>";

#[derive(Debug)]
pub struct SmtProc {
    child: Child,
    stdin: ChildStdin,
    stdout: BufReader<ChildStdout>,
    // copy of everything sent, for --smt-file
    transcript: Option<File>,
}

impl SmtProc {
    /// Launch the solver and send its startup options. With `transcript` all
    /// commands are also written to that file.
    pub fn new(cmd: SolverCmd, transcript: Option<&Path>) -> Result<Self> {
        let mut child = Command::new(&cmd.bin)
            .args(&cmd.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .spawn()?;
        let (Some(stdin), Some(stdout)) = (child.stdin.take(), child.stdout.take()) else {
            return Err(SolverError::UnexpectedClose(
                "solver pipes are not available".to_string(),
            ));
        };
        let transcript = match transcript {
            Some(path) => {
                let mut f = File::create(path)?;
                writeln!(f, ";; {}", cmd.cmdline())?;
                Some(f)
            }
            None => None,
        };
        log::debug!("started solver: {}", cmd.cmdline());
        let mut proc = Self {
            child,
            stdin,
            stdout: BufReader::new(stdout),
            transcript,
        };
        proc.send(&app("set-option", [symbol(":produce-models"), symbol("true")]))?;
        for (name, value) in &cmd.options {
            proc.send(&app("set-option", [symbol(format!(":{name}")), value.clone()]))?;
        }
        // guards may multiply variables, and cut-off checks quantify
        proc.send(&app("set-logic", [symbol("ALL")]))?;
        Ok(proc)
    }

    /// Send a command that has no response.
    pub fn send(&mut self, cmd: &Sexp) -> Result<()> {
        writeln!(self.stdin, "{cmd}")?;
        if let Some(f) = &mut self.transcript {
            writeln!(f, "{cmd}")?;
        }
        Ok(())
    }

    /// Write a comment to the transcript. `comment` is only evaluated when
    /// there is one.
    pub fn comment_with<F>(&mut self, comment: F)
    where
        F: FnOnce() -> String,
    {
        if let Some(f) = &mut self.transcript {
            _ = writeln!(f, "\n;; {}", comment());
        }
    }

    pub fn push(&mut self) -> Result<()> {
        self.send(&app("push", [Sexp::Num(1)]))
    }

    pub fn pop(&mut self) -> Result<()> {
        self.send(&app("pop", [Sexp::Num(1)]))
    }

    pub fn check_sat(&mut self) -> Result<SatResp> {
        self.send(&app("check-sat", []))?;
        let resp = self.read_response()?;
        match parse_check_sat(&resp)? {
            Some(sat) => Ok(if sat { SatResp::Sat } else { SatResp::Unsat }),
            None => Ok(SatResp::Unknown(self.reason_unknown()?)),
        }
    }

    /// The values of `terms` in the model of the last satisfiable
    /// `check-sat`, in the same order.
    pub fn get_value(&mut self, terms: &[Sexp]) -> Result<Vec<Sexp>> {
        let cmd = app("get-value", [list(terms.to_vec())]);
        let resp = self.query(&cmd)?;
        let unexpected = || SolverError::UnexpectedResponse {
            command: cmd.to_string(),
            response: resp.to_string(),
        };
        let pairs = resp.as_list().ok_or_else(unexpected)?;
        if pairs.len() != terms.len() {
            return Err(unexpected());
        }
        pairs
            .iter()
            .map(|pair| match pair.as_list() {
                Some([_, value]) => Ok(value.clone()),
                _ => Err(unexpected()),
            })
            .collect()
    }

    fn reason_unknown(&mut self) -> Result<String> {
        let cmd = app("get-info", [symbol(":reason-unknown")]);
        let resp = self.query(&cmd)?;
        match resp.as_list() {
            Some([_, reason]) => Ok(reason.as_text().map_or_else(|| reason.to_string(), str::to_string)),
            _ => Err(SolverError::UnexpectedResponse {
                command: cmd.to_string(),
                response: resp.to_string(),
            }),
        }
    }

    /// Send a command and parse its response.
    fn query(&mut self, cmd: &Sexp) -> Result<Sexp> {
        self.send(cmd)?;
        let resp = self.read_response()?;
        sexp::parse(&resp).map_err(|_| SolverError::UnexpectedResponse {
            command: cmd.to_string(),
            response: resp,
        })
    }

    /// Read the output up to the marker echoed after the last command.
    fn read_response(&mut self) -> Result<String> {
        writeln!(self.stdin, "(echo \"{DONE}\")")?;
        self.stdin.flush()?;
        let mut buf = String::new();
        loop {
            let start = buf.len();
            if self.stdout.read_line(&mut buf)? == 0 {
                return Err(SolverError::UnexpectedClose(error_message(&buf)));
            }
            // cvc5 quotes the echoed string, Z3 does not
            let line = buf[start..].trim_end();
            if line == DONE || line.trim_matches('"') == DONE {
                return Ok(buf[..start].trim_end().to_string());
            }
        }
    }
}

impl Drop for SmtProc {
    fn drop(&mut self) {
        _ = writeln!(self.stdin, "(exit)");
        _ = self.stdin.flush();
        _ = self.child.kill();
        _ = self.child.wait();
    }
}

/// The answer to `(check-sat)`: `Some(sat)` or `None` for `unknown`.
fn parse_check_sat(resp: &str) -> Result<Option<bool>> {
    match resp {
        "sat" => Ok(Some(true)),
        "unsat" => Ok(Some(false)),
        "unknown" => Ok(None),
        _ => Err(SolverError::UnexpectedResponse {
            command: "(check-sat)".to_string(),
            response: error_message(resp),
        }),
    }
}

/// The message of an `(error "...")` in a response, or the whole response.
/// Z3 may answer `check-sat` with an error followed by `sat`.
fn error_message(resp: &str) -> String {
    sexp::parse_many(resp)
        .ok()
        .and_then(|sexps| {
            sexps.iter().find_map(|s| match s.as_app() {
                Some(("error", [msg])) => msg.as_text().map(str::to_string),
                _ => None,
            })
        })
        .unwrap_or_else(|| resp.to_string())
}

#[cfg(test)]
mod tests {
    use super::{error_message, parse_check_sat, SatResp, SmtProc, SolverError};
    use crate::smtlib::{
        conf::SolverCmd,
        path::{solver_available, solver_path},
        sexp::{app, parse, symbol},
    };

    fn solvers() -> Vec<SmtProc> {
        let mut procs = vec![];
        let z3 = solver_path("z3");
        if solver_available(&z3) {
            procs.push(SmtProc::new(SolverCmd::z3(&z3, None), None).unwrap());
        }
        let cvc5 = solver_path("cvc5");
        if solver_available(&cvc5) {
            procs.push(SmtProc::new(SolverCmd::cvc5(&cvc5, None), None).unwrap());
        }
        procs
    }

    #[test]
    fn test_error_message() {
        assert_eq!(
            error_message("(error \"line 1: unknown constant x\")\nsat"),
            "line 1: unknown constant x"
        );
        assert_eq!(error_message("segfault"), "segfault");
    }

    #[test]
    fn test_parse_check_sat() {
        assert_eq!(parse_check_sat("sat").unwrap(), Some(true));
        assert_eq!(parse_check_sat("unsat").unwrap(), Some(false));
        assert_eq!(parse_check_sat("unknown").unwrap(), None);
        match parse_check_sat("(error \"model is not available\")") {
            Err(SolverError::UnexpectedResponse { command, response }) => {
                assert_eq!(command, "(check-sat)");
                assert_eq!(response, "model is not available");
            }
            other => panic!("unexpected result {other:?}"),
        }
        let err = parse_check_sat("timeout").unwrap_err();
        assert_eq!(
            err.to_string(),
            "unexpected solver response to (check-sat): timeout"
        );
    }

    #[test]
    fn test_scoped_unsat() {
        for mut solver in solvers() {
            assert_eq!(solver.check_sat().unwrap(), SatResp::Sat);
            solver.push().unwrap();
            solver
                .send(&app("declare-const", [symbol("a"), symbol("Bool")]))
                .unwrap();
            solver.send(&parse("(assert (and a (not a)))").unwrap()).unwrap();
            insta::assert_debug_snapshot!(solver.check_sat().unwrap(), @"Unsat");
            solver.pop().unwrap();
            assert_eq!(solver.check_sat().unwrap(), SatResp::Sat);
        }
    }

    #[test]
    fn test_get_value() {
        for mut solver in solvers() {
            solver
                .send(&app("declare-const", [symbol("x@1"), symbol("Int")]))
                .unwrap();
            solver
                .send(&parse("(assert (and (< x@1 0) (> x@1 (- 2))))").unwrap())
                .unwrap();
            assert_eq!(solver.check_sat().unwrap(), SatResp::Sat);
            let values = solver.get_value(&[symbol("x@1")]).unwrap();
            assert_eq!(values.len(), 1);
            assert_eq!(values[0].as_int(), Some(-1));
        }
    }
}
