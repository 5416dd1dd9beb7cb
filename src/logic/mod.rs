// Copyright 2022-2023 VMware, Inc.
// SPDX-License-Identifier: BSD-2-Clause

//! Formulas over integer arithmetic and an SMT-backed decision procedure for
//! them.

pub mod formula;
pub mod sat;
pub mod smt;

pub use formula::{ArithOp, CmpOp, Expr, Formula, Quantifier, Valuation, Variable};
pub use sat::{SatError, SatSolver, SolverConf, SolverType};
