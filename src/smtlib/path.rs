// Copyright 2022-2023 VMware, Inc.
// SPDX-License-Identifier: BSD-2-Clause

//! Locating solver binaries.

use std::{
    env,
    path::{Path, PathBuf},
};

/// The program to run for solver `bin` (e.g. `"cvc5"`). In order of
/// preference: the `CVC5_BIN` style environment variable, a binary in the
/// crate's `solvers/` directory, or the bare name to be looked up in `$PATH`.
pub fn solver_path(bin: &str) -> String {
    if let Some(path) = env::var_os(format!("{}_BIN", bin.to_uppercase())) {
        return path.to_string_lossy().into_owned();
    }
    let file = format!("{bin}{}", env::consts::EXE_SUFFIX);
    let bundled: PathBuf = [env!("CARGO_MANIFEST_DIR"), "solvers", file.as_str()].iter().collect();
    if bundled.is_file() {
        bundled.to_string_lossy().into_owned()
    } else {
        file
    }
}

/// Whether `bin`, as returned by [`solver_path`], names a file that exists
/// or a program on `$PATH`.
pub fn solver_available(bin: &str) -> bool {
    let path = Path::new(bin);
    if path.components().count() > 1 {
        return path.is_file();
    }
    env::var_os("PATH")
        .map(|paths| env::split_paths(&paths).any(|dir| dir.join(bin).is_file()))
        .unwrap_or(false)
}
