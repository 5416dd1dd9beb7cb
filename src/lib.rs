// Copyright 2022-2023 VMware, Inc.
// SPDX-License-Identifier: BSD-2-Clause

pub mod builtin;
mod command;
pub mod logic;
pub mod net;
pub mod parser;
pub mod smtlib;
pub mod timing;
pub mod unfolding;

#[doc(hidden)]
pub use command::App;
