// Copyright 2022-2023 VMware, Inc.
// SPDX-License-Identifier: BSD-2-Clause

//! Satisfiability and validity of formulas, decided by an SMT solver process.

use std::path::PathBuf;

use thiserror::Error;

use crate::logic::formula::{Formula, Valuation};
use crate::logic::smt;
use crate::smtlib::{
    conf::SolverCmd,
    proc::{SatResp, SmtProc, SolverError},
    sexp::{app, symbol},
};
use crate::timing::{self, TimeType};

/// The supported solvers.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum SolverType {
    Cvc5,
    Z3,
}

/// How to launch the solver.
#[derive(Debug, Clone)]
pub struct SolverConf {
    pub solver_type: SolverType,
    pub bin: String,
    pub timeout_ms: Option<u64>,
    pub tee: Option<PathBuf>,
}

impl SolverConf {
    fn cmd(&self) -> SolverCmd {
        match self.solver_type {
            SolverType::Cvc5 => SolverCmd::cvc5(&self.bin, self.timeout_ms),
            SolverType::Z3 => SolverCmd::z3(&self.bin, self.timeout_ms),
        }
    }
}

#[derive(Error, Debug)]
pub enum SatError {
    #[error(transparent)]
    Solver(#[from] SolverError),
    #[error("SAT result is unknown ({reason}). formula was {formula}, encoded as {encoded}")]
    Unknown {
        reason: String,
        formula: String,
        encoded: String,
    },
    #[error("solver did not report an integer value for {0}")]
    MissingValue(String),
}

/// A long-lived solver process; every query runs in its own assertion scope.
pub struct SatSolver {
    proc: SmtProc,
}

impl SatSolver {
    pub fn new(conf: &SolverConf) -> Result<Self, SolverError> {
        let proc = SmtProc::new(conf.cmd(), conf.tee.as_deref())?;
        Ok(Self { proc })
    }

    fn query(&mut self, f: &Formula, with_model: bool) -> Result<Option<Valuation>, SatError> {
        let vars = f.vars();
        for v in &vars {
            self.proc
                .send(&app("declare-const", [smt::variable(v), symbol("Int")]))?;
        }
        let encoded = smt::formula(f);
        self.proc.comment_with(|| f.to_string());
        self.proc.send(&app("assert", [encoded.clone()]))?;

        let start = timing::start();
        let resp = self.proc.check_sat()?;
        timing::elapsed(
            TimeType::CheckSat {
                sat: resp == SatResp::Sat,
            },
            start,
        );
        match resp {
            SatResp::Sat if with_model && !vars.is_empty() => {
                let terms = vars.iter().map(smt::variable).collect::<Vec<_>>();
                let start = timing::start();
                let values = self.proc.get_value(&terms)?;
                timing::elapsed(TimeType::GetValue, start);
                let mut model = Valuation::new();
                for (v, value) in vars.into_iter().zip(values) {
                    let value = value
                        .as_int()
                        .ok_or_else(|| SatError::MissingValue(v.to_string()))?;
                    log::trace!("{v} = {value}");
                    model.insert(v, value);
                }
                Ok(Some(model))
            }
            SatResp::Sat => Ok(Some(Valuation::new())),
            SatResp::Unsat => Ok(None),
            SatResp::Unknown(reason) => Err(SatError::Unknown {
                reason,
                formula: f.to_string(),
                encoded: encoded.to_string(),
            }),
        }
    }

    /// Check `f` in a fresh scope, returning a model if it is satisfiable.
    /// The model is empty unless `with_model` is set.
    fn check_sat(&mut self, f: &Formula, with_model: bool) -> Result<Option<Valuation>, SatError> {
        self.proc.push()?;
        let result = self.query(f, with_model);
        let popped = self.proc.pop();
        first_error(result, popped)
    }

    pub fn is_satisfiable(&mut self, f: &Formula) -> Result<bool, SatError> {
        log::debug!("      {f}");
        let sat = self.check_sat(f, false)?.is_some();
        log::trace!("      {}", if sat { "SAT" } else { "UNSAT" });
        Ok(sat)
    }

    pub fn is_tautology(&mut self, f: &Formula) -> Result<bool, SatError> {
        log::debug!("    {f}");
        let valid = self.check_sat(&Formula::not(f.clone()), false)?.is_none();
        log::trace!(
            "    {}",
            if valid {
                "TAUTOLOGY"
            } else {
                "NOT A TAUTOLOGY"
            }
        );
        Ok(valid)
    }

    /// A satisfying assignment of the free variables of `f`, if there is one.
    pub fn model(&mut self, f: &Formula) -> Result<Option<Valuation>, SatError> {
        self.check_sat(f, true)
    }
}

/// `result`, unless it succeeded and the cleanup after it failed. An error
/// of the query itself wins over one from the cleanup.
fn first_error<T>(
    result: Result<T, SatError>,
    cleanup: Result<(), SolverError>,
) -> Result<T, SatError> {
    let value = result?;
    cleanup?;
    Ok(value)
}

#[cfg(test)]
pub(crate) mod tests {
    use std::io;

    use super::{first_error, SatError, SatSolver, SolverConf, SolverType};
    use crate::logic::formula::{ArithOp, CmpOp, Expr, Formula, Variable};
    use crate::smtlib::path::{solver_available, solver_path};
    use crate::smtlib::proc::SolverError;

    /// A solver for tests, or `None` if no solver binary can be found.
    pub(crate) fn test_solver() -> Option<SatSolver> {
        for (solver_type, bin) in [(SolverType::Cvc5, "cvc5"), (SolverType::Z3, "z3")] {
            let bin = solver_path(bin);
            if solver_available(&bin) {
                let conf = SolverConf {
                    solver_type,
                    bin,
                    timeout_ms: Some(60_000),
                    tee: None,
                };
                return Some(SatSolver::new(&conf).expect("could not start solver"));
            }
        }
        eprintln!("no SMT solver found, skipping");
        None
    }

    #[test]
    fn test_satisfiable() {
        let Some(mut solver) = test_solver() else {
            return;
        };
        let x = Expr::var("x");
        let positive = Formula::cmp(CmpOp::Gt, x.clone(), Expr::Const(0));
        assert!(solver.is_satisfiable(&positive).unwrap());
        let contradiction = Formula::and([
            positive.clone(),
            Formula::cmp(CmpOp::Lt, x.clone(), Expr::Const(1)),
        ]);
        assert!(!solver.is_satisfiable(&contradiction).unwrap());
        // scopes do not leak assertions
        assert!(solver.is_satisfiable(&positive).unwrap());
        assert!(solver.is_satisfiable(&Formula::Top).unwrap());
    }

    #[test]
    fn test_tautology() {
        let Some(mut solver) = test_solver() else {
            return;
        };
        let x = Expr::var("x");
        let y = Expr::var("y");
        // x >= 0 -> exists y. y + y = x OR y + y + 1 = x
        let parity = Formula::implies(
            Formula::cmp(CmpOp::Ge, x.clone(), Expr::Const(0)),
            Formula::exists(
                vec![Variable::new("y")],
                Formula::or([
                    Formula::eq(Expr::binop(ArithOp::Add, y.clone(), y.clone()), x.clone()),
                    Formula::eq(
                        Expr::binop(
                            ArithOp::Add,
                            Expr::binop(ArithOp::Add, y.clone(), y),
                            Expr::Const(1),
                        ),
                        x.clone(),
                    ),
                ]),
            ),
        );
        assert!(solver.is_tautology(&parity).unwrap());
        assert!(!solver
            .is_tautology(&Formula::cmp(CmpOp::Gt, x, Expr::Const(0)))
            .unwrap());
    }

    #[test]
    fn test_model() {
        let Some(mut solver) = test_solver() else {
            return;
        };
        let x = Expr::var("x");
        let f = Formula::and([
            Formula::cmp(CmpOp::Lt, x.clone(), Expr::Const(-4)),
            Formula::cmp(CmpOp::Gt, x, Expr::Const(-6)),
        ]);
        let model = solver.model(&f).unwrap().expect("should be sat");
        assert_eq!(model.get(&Variable::new("x")), Some(&-5));
        assert_eq!(solver.model(&Formula::Bottom).unwrap(), None);
    }

    #[test]
    fn test_query_error_wins_over_cleanup() {
        let broken_pipe = || SolverError::Io(io::Error::new(io::ErrorKind::BrokenPipe, "pipe"));
        let unknown = || SatError::Unknown {
            reason: "timeout".to_string(),
            formula: "x > 0".to_string(),
            encoded: "(> x 0)".to_string(),
        };

        let err = first_error::<bool>(Err(unknown()), Err(broken_pipe())).unwrap_err();
        assert!(matches!(err, SatError::Unknown { reason, .. } if reason == "timeout"));

        let err = first_error(Ok(true), Err(broken_pipe())).unwrap_err();
        assert!(matches!(err, SatError::Solver(SolverError::Io(_))));

        assert!(first_error(Ok(true), Ok(())).unwrap());
        assert!(matches!(
            first_error::<bool>(Err(unknown()), Ok(())),
            Err(SatError::Unknown { .. })
        ));
    }
}
