// Copyright 2022-2023 VMware, Inc.
// SPDX-License-Identifier: BSD-2-Clause

//! Expansion of a high-level net to its low-level representation over a
//! finite range of colors.

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::ops::RangeInclusive;
use std::str::FromStr;

use itertools::Itertools;
use thiserror::Error;

use crate::logic::{Formula, Valuation, Variable};
use crate::net::{Net, NetBuilder, NetError, PlaceId, Transition};

/// A range of colors `lower..upper`, both inclusive.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct ExpansionRange {
    pub lower: i64,
    pub upper: i64,
}

#[derive(Error, Debug, PartialEq, Eq)]
pub enum RangeError {
    #[error("malformed range {0:?}, expected lower..upper")]
    Malformed(String),
    #[error("empty range {lower}..{upper}")]
    Empty { lower: i64, upper: i64 },
}

impl ExpansionRange {
    pub fn new(lower: i64, upper: i64) -> Result<Self, RangeError> {
        if lower > upper {
            return Err(RangeError::Empty { lower, upper });
        }
        Ok(Self { lower, upper })
    }

    pub fn parse(s: &str) -> Result<Self, RangeError> {
        let malformed = || RangeError::Malformed(s.to_string());
        let (lower, upper) = s.split_once("..").ok_or_else(malformed)?;
        let lower = lower.trim().parse().map_err(|_| malformed())?;
        let upper = upper.trim().parse().map_err(|_| malformed())?;
        Self::new(lower, upper)
    }

    pub fn contains(&self, v: i64) -> bool {
        self.values().contains(&v)
    }

    pub fn values(&self) -> RangeInclusive<i64> {
        self.lower..=self.upper
    }
}

impl FromStr for ExpansionRange {
    type Err = RangeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for ExpansionRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}..{}", self.lower, self.upper)
    }
}

/// All bindings of the variables of `t` that extend `fixed` with values from
/// `range` and satisfy the guard. Bindings come in lexicographic order of
/// the free variables' values.
pub fn bindings(t: &Transition, range: &ExpansionRange, fixed: &Valuation) -> Vec<Valuation> {
    let free = t
        .variables()
        .into_iter()
        .filter(|v| !fixed.contains_key(v))
        .collect::<Vec<_>>();
    let assignments: Vec<Vec<i64>> = if free.is_empty() {
        vec![vec![]]
    } else {
        free.iter()
            .map(|_| range.values())
            .multi_cartesian_product()
            .collect()
    };
    assignments
        .into_iter()
        .map(|values| {
            let mut binding = fixed.clone();
            binding.extend(free.iter().cloned().zip(values));
            binding
        })
        .filter(|binding| t.guard.eval(binding) == Some(true))
        .collect()
}

/// The name of the low-level place holding color `v` of place `name`.
pub fn expanded_place_name(name: &str, v: i64) -> String {
    format!("{name}_{v}")
}

/// Build the low-level net of `net` over `range`. Every low-level token has
/// color 1 and every arc carries the variable `token`.
pub fn expand(net: &Net, range: &ExpansionRange) -> Result<Net, NetError> {
    let mut b = NetBuilder::new();
    let mut places: HashMap<(PlaceId, i64), PlaceId> = HashMap::new();
    for place in net.places() {
        for v in range.values() {
            let id = b.place(expanded_place_name(&place.name, v))?;
            places.insert((place.index, v), id);
        }
    }
    for (&p, &color) in net.initial_marking() {
        let Some(&id) = places.get(&(p, color)) else {
            return Err(NetError::MarkingOutOfRange {
                place: net.place(p).name.clone(),
                color,
                lower: range.lower,
                upper: range.upper,
            });
        };
        b.mark(id, 1)?;
    }

    let token = Variable::new("token");
    let arcs = |arcs: &BTreeMap<PlaceId, Variable>, binding: &Valuation| {
        arcs.iter()
            .map(|(&p, v)| (places[&(p, binding[v])], token.clone()))
            .collect::<Vec<_>>()
    };
    let mut count = 0;
    for t in net.transitions() {
        for binding in bindings(t, range, &Valuation::new()) {
            b.transition(
                format!("t{count}_{}", t.name),
                Formula::top(),
                arcs(&t.preset, &binding),
                arcs(&t.postset, &binding),
            )?;
            count += 1;
        }
    }
    log::info!(
        "expanded {} places and {} transitions to {} low-level transitions",
        net.places().len(),
        net.transitions().len(),
        count
    );
    Ok(b.build())
}
