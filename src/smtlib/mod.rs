// Copyright 2022-2023 VMware, Inc.
// SPDX-License-Identifier: BSD-2-Clause

//! Talking SMT-LIB to an external solver process over pipes.
//!
//! Only cvc5 and Z3 are configured; anything speaking SMT-LIB on stdin would
//! work given a [`conf::SolverCmd`].

pub mod conf;
pub mod path;
pub mod proc;
pub mod sexp;
