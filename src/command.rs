// Copyright 2022-2023 VMware, Inc.
// SPDX-License-Identifier: BSD-2-Clause

use std::collections::BTreeSet;
use std::fs::{self, File};
use std::io::{self, BufWriter, Read, Write};
use std::path::{Path, PathBuf};

use clap::Args;
use codespan_reporting::{
    files::SimpleFile,
    term::{
        self as terminal,
        termcolor::{ColorChoice, StandardStream},
    },
};
use itertools::Itertools;
use path_slash::PathExt;
use regex::Regex;

use crate::builtin;
use crate::logic::{self, SatSolver, SolverConf};
use crate::net::expansion::{expand, ExpansionRange};
use crate::net::{Net, TransitionId};
use crate::parser;
use crate::smtlib::path::solver_path;
use crate::timing::{self, TimeType};
use crate::unfolding::{self, AdequateOrder, Mode, UnfoldOptions, Unfolding};

#[derive(clap::ValueEnum, Copy, Clone, Debug, PartialEq, Eq)]
enum SolverType {
    Cvc5,
    Z3,
}

#[derive(clap::ValueEnum, Copy, Clone, Debug, PartialEq, Eq)]
enum ColorOutput {
    Never,
    Auto,
    Always,
}

#[derive(clap::ValueEnum, Copy, Clone, Debug, PartialEq, Eq)]
enum Order {
    Esparza,
    #[value(alias = "mc_millan")]
    McMillan,
}

#[derive(Args, Clone, Debug, PartialEq, Eq)]
struct SolverArgs {
    #[arg(value_enum, long, default_value_t = SolverType::Cvc5)]
    /// Solver to use for colored unfolding
    solver: SolverType,

    #[arg(long)]
    /// Full path to output SMT file to
    smt_file: Option<PathBuf>,

    #[arg(long, default_value_t = 600)]
    /// SMT solver timeout in seconds per query (0 for none)
    timeout: u64,
}

impl SolverArgs {
    fn get_solver_conf(&self) -> SolverConf {
        let (solver_type, bin) = match self.solver {
            SolverType::Cvc5 => (logic::SolverType::Cvc5, "cvc5"),
            SolverType::Z3 => (logic::SolverType::Z3, "z3"),
        };
        SolverConf {
            solver_type,
            bin: solver_path(bin),
            timeout_ms: if self.timeout > 0 {
                Some(self.timeout * 1000)
            } else {
                None
            },
            tee: self.smt_file.clone(),
        }
    }
}

enum OutputFormat {
    Dot,
    Pep,
    None,
}

#[derive(clap::Parser, Debug)]
#[command(name = "color-unfolder", version, about, long_about = None)]
/// Unfold high-level Petri nets into finite complete prefixes.
pub struct App {
    #[arg(default_value = "-")]
    /// The net to process: an HL-LoLA file, a built-in net such as
    /// `isqrt#10` or `mastermind#4182#6123`, or `-` for stdin
    input_file: String,

    #[arg(default_value = "-")]
    /// Where to write the output, `-` for stdout
    output_file: String,

    #[arg(short = 'T', long = "output", value_name = "FORMAT", default_value = "DOT")]
    /// Output format: DOT (or GRAPHVIZ) and none; nets can also be written
    /// as low-level PEP
    output_format: String,

    #[arg(short = 'E', long = "expand", value_name = "RANGE", allow_hyphen_values = true)]
    /// Expand the high-level net to its low-level representation over a
    /// range of colors, such as `-2..2`
    expand: Option<ExpansionRange>,

    #[arg(long, value_name = "BOOL", default_value_t = true, action = clap::ArgAction::Set)]
    /// Unfold the expansion without building it
    jit_expand: bool,

    #[arg(long)]
    /// Don't unfold; output the net or its expansion
    no_unfold: bool,

    #[arg(long)]
    /// Unfold without looking at colors, for low-level nets
    no_color: bool,

    #[arg(long)]
    /// Unfold without checking for cut-offs (the depth bound still applies)
    no_cutoff: bool,

    #[arg(short, long)]
    /// Unfold up to this depth
    depth: Option<usize>,

    #[arg(short = 't', long = "target", value_name = "REGEX")]
    /// Unfold until a transition whose name matches can fire
    targets: Vec<String>,

    #[arg(value_enum, short, long, ignore_case = true, default_value_t = Order::Esparza)]
    /// Adequate order to unfold with
    order: Order,

    #[arg(short = 'D', long)]
    /// Render the internal structure of the unfolding
    show_internal: bool,

    #[arg(short, long, action = clap::ArgAction::Count)]
    /// Log more (repeat for even more); RUST_LOG takes precedence
    verbose: u8,

    #[arg(long)]
    /// Print timing statistics
    time: bool,

    #[command(flatten)]
    solver: SolverArgs,

    #[arg(value_enum, long, default_value_t = ColorOutput::Auto)]
    /// Control color output. Auto disables colors with TERM=dumb or
    /// NO_COLOR=true.
    color: ColorOutput,
}

impl App {
    /// The log level selected by `-v`.
    pub fn log_level(&self) -> log::LevelFilter {
        match self.verbose {
            0 => log::LevelFilter::Warn,
            1 => log::LevelFilter::Info,
            2 => log::LevelFilter::Debug,
            _ => log::LevelFilter::Trace,
        }
    }

    fn mode(&self) -> Mode {
        match self.expand {
            Some(range) if self.jit_expand => Mode::Jit(range),
            Some(_) => Mode::Uncolored,
            None if self.no_color => Mode::Uncolored,
            None => Mode::Colored,
        }
    }

    fn output_format(&self, allow_pep: bool) -> Option<OutputFormat> {
        match self.output_format.to_lowercase().as_str() {
            "dot" | "graphviz" => Some(OutputFormat::Dot),
            "pep" if allow_pep => Some(OutputFormat::Pep),
            "none" => Some(OutputFormat::None),
            _ => None,
        }
    }

    fn output(&self) -> io::Result<Box<dyn Write>> {
        if self.output_file == "-" {
            Ok(Box::new(BufWriter::new(io::stdout().lock())))
        } else {
            Ok(Box::new(BufWriter::new(File::create(&self.output_file)?)))
        }
    }

    fn write_output<F>(&self, render: F) -> i32
    where
        F: FnOnce(&mut dyn Write) -> io::Result<()>,
    {
        let r = self.output().and_then(|mut w| {
            render(w.as_mut())?;
            w.flush()
        });
        if let Err(err) = r {
            eprintln!("could not write {}: {err}", self.output_file);
            return 1;
        }
        0
    }

    fn render_net(&self, net: &Net) -> i32 {
        match self.output_format(true) {
            Some(OutputFormat::Dot) => self.write_output(|mut w| net.render_dot(&mut w)),
            Some(OutputFormat::Pep) => self.write_output(|mut w| net.render_pep(&mut w)),
            Some(OutputFormat::None) => 0,
            None => {
                eprintln!("unsupported low-level output format: {}", self.output_format);
                1
            }
        }
    }

    fn render_unfolding(&self, net: &Net, unfolding: &Unfolding) -> i32 {
        match self.output_format(false) {
            Some(OutputFormat::Dot) => {
                self.write_output(|mut w| unfolding.render_dot(net, &mut w, self.show_internal))
            }
            Some(OutputFormat::None) => 0,
            Some(OutputFormat::Pep) | None => {
                eprintln!("unsupported low-level output format: {}", self.output_format);
                1
            }
        }
    }

    /// Read the input net, reporting problems to stderr. On failure returns
    /// the exit code.
    fn read_net(&self) -> Result<Net, i32> {
        if let Some(r) = builtin::lookup(&self.input_file) {
            return r.map_err(|err| {
                eprintln!("{err}");
                1
            });
        }

        let (name, file) = if self.input_file == "-" {
            let mut file = String::new();
            if let Err(err) = io::stdin().read_to_string(&mut file) {
                eprintln!("could not read stdin: {err}");
                return Err(2);
            }
            ("<stdin>".to_string(), file)
        } else {
            let path = Path::new(&self.input_file);
            let file = match fs::read_to_string(path) {
                Ok(file) => file,
                Err(err) if err.kind() == io::ErrorKind::NotFound => {
                    eprintln!("no such file or directory: {}", self.input_file);
                    return Err(2);
                }
                Err(err) => {
                    eprintln!("could not read {}: {err}", self.input_file);
                    return Err(2);
                }
            };
            if path.extension().and_then(|ext| ext.to_str()) != Some("hllola") {
                log::warn!(
                    "encountered possibly unsupported input format (determined by file name extension), assuming HL-LoLA"
                );
            }
            // We make sure paths look like Unix paths on all platforms, otherwise test snapshots don't match.
            (path.to_slash_lossy().to_string(), file)
        };

        parser::parse(&file).map_err(|err| {
            let files = SimpleFile::new(name, &file);
            let writer = StandardStream::stderr(match &self.color {
                ColorOutput::Never => ColorChoice::Never,
                ColorOutput::Always => ColorChoice::Always,
                ColorOutput::Auto => ColorChoice::Auto,
            });
            let config = codespan_reporting::term::Config {
                start_context_lines: 3,
                end_context_lines: 3,
                ..Default::default()
            };
            let diagnostic = err.diagnostic(());
            if let Err(err) = terminal::emit(&mut writer.lock(), &config, &files, &diagnostic) {
                eprintln!("could not report parse error: {err}");
            }
            1
        })
    }

    /// The reachable transitions matching one of the target patterns.
    fn targets(&self, net: &Net) -> Result<BTreeSet<TransitionId>, regex::Error> {
        let expanded = self.expand.is_some() && !self.jit_expand;
        let patterns = self
            .targets
            .iter()
            .map(|pattern| {
                let pattern = if expanded {
                    format!(r"t\d+_{pattern}")
                } else {
                    pattern.clone()
                };
                // match the whole name
                Regex::new(&format!("^(?:{pattern})$"))
            })
            .collect::<Result<Vec<_>, _>>()?;
        Ok(net
            .collect_nodes()
            .transitions
            .into_iter()
            .filter(|&t| {
                patterns
                    .iter()
                    .any(|pattern| pattern.is_match(&net.transition(t).name))
            })
            .collect())
    }

    /// Run the application, returning the process exit code.
    pub fn exec(self) -> i32 {
        let mut net = match self.read_net() {
            Ok(net) => net,
            Err(code) => return code,
        };

        if let (Some(range), false) = (self.expand, self.jit_expand) {
            let start = timing::start();
            net = match expand(&net, &range) {
                Ok(net) => net,
                Err(err) => {
                    eprintln!("could not expand net: {err}");
                    return 1;
                }
            };
            timing::elapsed(TimeType::Expand, start);
        }

        if self.no_unfold {
            let code = self.render_net(&net);
            if self.time {
                timing::report();
            }
            return code;
        }

        let targets = match self.targets(&net) {
            Ok(targets) => targets,
            Err(err) => {
                eprintln!("invalid target pattern: {err}");
                return 1;
            }
        };
        if !self.targets.is_empty() {
            log::info!(
                "checking reachability of target transitions: {}",
                targets
                    .iter()
                    .map(|&t| &net.transition(t).name)
                    .join(", ")
            );
        }

        let options = UnfoldOptions {
            depth: self.depth,
            order: match self.order {
                Order::Esparza => AdequateOrder::Esparza,
                Order::McMillan => AdequateOrder::McMillan,
            },
            cutoff: !self.no_cutoff,
            mode: self.mode(),
            targets,
        };
        let mut solver = if options.mode == Mode::Colored {
            match SatSolver::new(&self.solver.get_solver_conf()) {
                Ok(solver) => Some(solver),
                Err(err) => {
                    eprintln!("could not start solver: {err}");
                    return 1;
                }
            }
        } else {
            None
        };

        let unfolding = match unfolding::unfold(&net, &options, solver.as_mut()) {
            Ok(unfolding) => unfolding,
            Err(err) => {
                eprintln!("unfolding failed: {err}");
                return 1;
            }
        };
        let code = self.render_unfolding(&net, &unfolding);
        if self.time {
            timing::report();
        }
        if code != 0 {
            return code;
        }

        if self.targets.is_empty() {
            return 0;
        }
        let Some(target) = unfolding.found_target() else {
            log::info!("no target transition can fire");
            return 3;
        };
        let event = unfolding.event(target);
        log::info!(
            "target transition {} can fire:",
            net.transition(event.transition).name
        );
        match event
            .cone
            .firing_sequence_string(&unfolding, &net, solver.as_mut())
        {
            Ok(sequence) => {
                eprintln!("{sequence}");
                0
            }
            Err(err) => {
                eprintln!("could not compute firing sequence: {err}");
                1
            }
        }
    }
}
