// Copyright 2022-2023 VMware, Inc.
// SPDX-License-Identifier: BSD-2-Clause

//! Process-wide timing of the unfolder's phases and solver calls, reported
//! with `--time`.

use std::{
    sync::Mutex,
    time::{Duration, Instant},
};

use itertools::Itertools;
use lazy_static::lazy_static;

#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum TimeType {
    Expand,
    Unfold,
    CheckSat { sat: bool },
    GetValue,
}

impl TimeType {
    fn name(&self) -> &'static str {
        match self {
            TimeType::Expand => "expand",
            TimeType::Unfold => "unfold",
            TimeType::CheckSat { sat: false } => "check-sat (unsat)",
            TimeType::CheckSat { sat: true } => "check-sat (sat)",
            TimeType::GetValue => "get-value",
        }
    }

    fn is_solver(&self) -> bool {
        matches!(self, TimeType::CheckSat { .. } | TimeType::GetValue)
    }
}

pub struct Timings {
    start: Instant,
    times: Mutex<Vec<(TimeType, Duration)>>,
}

impl Timings {
    #[allow(clippy::new_without_default)]
    pub fn new() -> Self {
        Self {
            start: Instant::now(),
            times: Mutex::new(vec![]),
        }
    }

    pub fn elapsed(&self, typ: TimeType, start: Instant) {
        if let Ok(mut times) = self.times.lock() {
            times.push((typ, start.elapsed()));
        }
    }

    /// Total duration and number of measurements per type, in the order of
    /// [`TimeType`].
    pub fn summary(&self) -> Vec<(TimeType, Duration, usize)> {
        let Ok(times) = self.times.lock() else {
            return vec![];
        };
        times
            .iter()
            .into_grouping_map_by(|(typ, _)| *typ)
            .fold((Duration::ZERO, 0), |(total, count), _, (_, dur)| {
                (total + *dur, count + 1)
            })
            .into_iter()
            .map(|(typ, (total, count))| (typ, total, count))
            .sorted()
            .collect()
    }

    /// Print the report to stderr, since stdout may carry the rendered net.
    pub fn report(&self) {
        if cfg!(debug_assertions) {
            eprintln!("warning: this is a debug build, non-solver time will be worse");
        }
        eprintln!("{:<22}: {:.3}s", "total", self.start.elapsed().as_secs_f64());
        let summary = self.summary();
        let (solver, phases): (Vec<_>, Vec<_>) =
            summary.iter().partition(|(typ, _, _)| typ.is_solver());
        for (typ, total, _) in phases {
            eprintln!("  {:<20}: {:.3}s", typ.name(), total.as_secs_f64());
        }
        if solver.is_empty() {
            return;
        }
        let total = solver.iter().map(|(_, total, _)| *total).sum::<Duration>();
        let calls = solver.iter().map(|(_, _, count)| count).sum::<usize>();
        eprintln!(
            "  {:<20}: {:.3}s {calls:>4} calls",
            "solver total",
            total.as_secs_f64()
        );
        for (typ, total, count) in solver {
            eprintln!(
                "    {:<18}: {:.3}s {count:>4} calls",
                typ.name(),
                total.as_secs_f64()
            );
        }
    }
}

lazy_static! {
    pub static ref TIMES: Timings = Timings::new();
}

/// Start the global clock; the report's total counts from here.
pub fn init() {
    lazy_static::initialize(&TIMES);
}

pub fn start() -> Instant {
    Instant::now()
}

pub fn elapsed(typ: TimeType, start: Instant) {
    TIMES.elapsed(typ, start)
}

pub fn report() {
    TIMES.report()
}

#[cfg(test)]
mod tests {
    use std::time::{Duration, Instant};

    use super::{TimeType, Timings};

    #[test]
    fn test_summary() {
        let timings = Timings::new();
        let start = Instant::now() - Duration::from_millis(5);
        timings.elapsed(TimeType::GetValue, start);
        timings.elapsed(TimeType::Unfold, start);
        timings.elapsed(TimeType::Unfold, start);
        let summary = timings.summary();
        let types = summary.iter().map(|(typ, _, count)| (*typ, *count)).collect::<Vec<_>>();
        assert_eq!(types, vec![(TimeType::Unfold, 2), (TimeType::GetValue, 1)]);
        assert!(summary[0].1 >= Duration::from_millis(10));
    }
}
