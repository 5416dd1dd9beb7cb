// Copyright 2022-2023 VMware, Inc.
// SPDX-License-Identifier: BSD-2-Clause

use std::{env, process};

use clap::Parser;
use color_unfolder::{timing, App};

fn main() {
    let app = App::parse();
    if env::var_os("RUST_LOG").is_some() {
        pretty_env_logger::init();
    } else {
        pretty_env_logger::formatted_builder()
            .filter_level(app.log_level())
            .init();
    }
    timing::init();
    process::exit(app.exec());
}
