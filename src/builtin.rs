// Copyright 2022-2023 VMware, Inc.
// SPDX-License-Identifier: BSD-2-Clause

//! Built-in example nets, selected by name with `#`-separated parameters,
//! for example `mastermind#4182#6123`.

use peg::{error::ParseError, str::LineCol};
use thiserror::Error;

use crate::logic::Variable;
use crate::net::{Net, NetBuilder, NetError, PlaceId};
use crate::parser::parse_formula;

#[derive(Error, Debug)]
pub enum BuiltinError {
    #[error("bad parameter {param:?} for {net}: {reason}")]
    BadParameter {
        net: &'static str,
        param: String,
        reason: String,
    },
    #[error(transparent)]
    Net(#[from] NetError),
    #[error("could not parse guard {guard:?}: expected {}", .error.expected)]
    Guard {
        guard: String,
        error: ParseError<LineCol>,
    },
}

/// Wraps a [`NetBuilder`] to write transitions with textual guards.
struct Example {
    b: NetBuilder,
}

impl Example {
    fn new() -> Self {
        Self {
            b: NetBuilder::new(),
        }
    }

    fn place<S: Into<String>>(&mut self, name: S, color: Option<i64>) -> Result<PlaceId, BuiltinError> {
        let p = self.b.place(name)?;
        if let Some(color) = color {
            self.b.mark(p, color)?;
        }
        Ok(p)
    }

    fn transition<S: Into<String>>(
        &mut self,
        name: S,
        guard: &str,
        consume: &[(PlaceId, &str)],
        produce: &[(PlaceId, &str)],
    ) -> Result<(), BuiltinError> {
        let formula = parse_formula(guard).map_err(|error| BuiltinError::Guard {
            guard: guard.to_string(),
            error,
        })?;
        let arcs = |arcs: &[(PlaceId, &str)]| {
            arcs.iter()
                .map(|&(p, v)| (p, Variable::new(v)))
                .collect::<Vec<_>>()
        };
        self.b
            .transition(name, formula, arcs(consume), arcs(produce))?;
        Ok(())
    }

    fn build(self) -> Net {
        self.b.build()
    }
}

fn number(net: &'static str, param: &str, min: i64) -> Result<i64, BuiltinError> {
    let bad = |reason: String| BuiltinError::BadParameter {
        net,
        param: param.to_string(),
        reason,
    };
    let n: i64 = param.parse().map_err(|_| bad("not a number".to_string()))?;
    if n < min {
        return Err(bad(format!("must be at least {min}")));
    }
    Ok(n)
}

fn digits(net: &'static str, param: &str) -> Result<Vec<i64>, BuiltinError> {
    if param.is_empty() {
        return Err(BuiltinError::BadParameter {
            net,
            param: param.to_string(),
            reason: "no digits".to_string(),
        });
    }
    param
        .chars()
        .map(|c| {
            c.to_digit(10)
                .map(i64::from)
                .ok_or_else(|| BuiltinError::BadParameter {
                    net,
                    param: param.to_string(),
                    reason: format!("{c:?} is not a digit"),
                })
        })
        .collect()
}

fn arity(net: &'static str, params: &[&str], expected: usize) -> Result<(), BuiltinError> {
    if params.len() != expected {
        return Err(BuiltinError::BadParameter {
            net,
            param: params.join("#"),
            reason: format!("expected {expected} parameters"),
        });
    }
    Ok(())
}

/// Count up to the integer square root of `n`.
fn isqrt(n: i64) -> Result<Net, BuiltinError> {
    let mut ex = Example::new();
    let counter = ex.place("counter", Some(0))?;
    let number = ex.place("number", Some(n))?;
    let result = ex.place("result", None)?;
    ex.transition(
        "step",
        "j = i + 1 AND j * j <= n AND n2 = n",
        &[(counter, "i"), (number, "n")],
        &[(counter, "j"), (number, "n2")],
    )?;
    ex.transition(
        "done",
        "(i + 1) * (i + 1) > n AND r = i",
        &[(counter, "i"), (number, "n")],
        &[(result, "r")],
    )?;
    Ok(ex.build())
}

/// Three guests share two tables; the restaurant closes once all of them
/// have left.
fn restaurant() -> Result<Net, BuiltinError> {
    let mut ex = Example::new();
    let waiting = ex.place("waiting", Some(3))?;
    let tables = ex.place("tables", Some(2))?;
    let seated = ex.place("seated", Some(0))?;
    let eating = ex.place("eating", Some(0))?;
    let left = ex.place("left", Some(0))?;
    let closed = ex.place("closed", None)?;
    ex.transition(
        "seat",
        "w > 0 AND f > 0 AND w2 = w - 1 AND f2 = f - 1 AND s2 = s + 1",
        &[(waiting, "w"), (tables, "f"), (seated, "s")],
        &[(waiting, "w2"), (tables, "f2"), (seated, "s2")],
    )?;
    ex.transition(
        "serve",
        "s > 0 AND s2 = s - 1 AND e2 = e + 1",
        &[(seated, "s"), (eating, "e")],
        &[(seated, "s2"), (eating, "e2")],
    )?;
    ex.transition(
        "leave",
        "e > 0 AND e2 = e - 1 AND f2 = f + 1 AND l2 = l + 1",
        &[(eating, "e"), (tables, "f"), (left, "l")],
        &[(eating, "e2"), (tables, "f2"), (left, "l2")],
    )?;
    ex.transition("close", "l = 3 AND c = l", &[(left, "l")], &[(closed, "c")])?;
    Ok(ex.build())
}

/// Score `guess` against `code` position by position. `solved` fires iff
/// every position is a hit.
fn mastermind(code: &[i64], guess: &[i64]) -> Result<Net, BuiltinError> {
    if code.len() != guess.len() {
        return Err(BuiltinError::BadParameter {
            net: "mastermind",
            param: guess.iter().map(|d| d.to_string()).collect(),
            reason: format!("guess must have {} digits like the code", code.len()),
        });
    }
    let mut ex = Example::new();
    let score = ex.place("score", Some(0))?;
    let done = ex.place("done", None)?;
    for (i, (&c, &g)) in code.iter().zip(guess).enumerate() {
        let code_i = ex.place(format!("code_{i}"), Some(c))?;
        let guess_i = ex.place(format!("guess_{i}"), Some(g))?;
        let checked_i = ex.place(format!("checked_{i}"), None)?;
        ex.transition(
            format!("hit_{i}"),
            "c = g AND s2 = s + 1 AND c2 = c",
            &[(code_i, "c"), (guess_i, "g"), (score, "s")],
            &[(checked_i, "c2"), (score, "s2")],
        )?;
        ex.transition(
            format!("miss_{i}"),
            "c != g AND c2 = c",
            &[(code_i, "c"), (guess_i, "g")],
            &[(checked_i, "c2")],
        )?;
    }
    ex.transition(
        "solved",
        &format!("s = {} AND d = s", code.len()),
        &[(score, "s")],
        &[(done, "d")],
    )?;
    Ok(ex.build())
}

/// The water-jug puzzle: buckets with the given capacities start empty and
/// `goal_<i>` fires once bucket `i` holds exactly `goal`.
fn buckets(goal: i64, capacities: &[i64]) -> Result<Net, BuiltinError> {
    let mut ex = Example::new();
    let places = (0..capacities.len())
        .map(|i| ex.place(format!("bucket_{i}"), Some(0)))
        .collect::<Result<Vec<_>, _>>()?;
    for (i, (&p, &cap)) in places.iter().zip(capacities).enumerate() {
        ex.transition(
            format!("fill_{i}"),
            &format!("a < {cap} AND a2 = {cap}"),
            &[(p, "a")],
            &[(p, "a2")],
        )?;
        ex.transition(
            format!("empty_{i}"),
            "a > 0 AND a2 = 0",
            &[(p, "a")],
            &[(p, "a2")],
        )?;
    }
    for (i, &from) in places.iter().enumerate() {
        for (j, (&to, &cap)) in places.iter().zip(capacities).enumerate() {
            if i == j {
                continue;
            }
            // pour until the source is empty or the target is full
            ex.transition(
                format!("pour_{i}_{j}"),
                &format!(
                    "a > 0 AND b < {cap} AND a2 + b2 = a + b AND (a2 = 0 OR b2 = {cap}) \
                     AND a2 >= 0 AND b2 <= {cap}"
                ),
                &[(from, "a"), (to, "b")],
                &[(from, "a2"), (to, "b2")],
            )?;
        }
    }
    for (i, &p) in places.iter().enumerate() {
        ex.transition(
            format!("goal_{i}"),
            &format!("a = {goal} AND a2 = a"),
            &[(p, "a")],
            &[(p, "a2")],
        )?;
    }
    Ok(ex.build())
}

/// `n` independent counters, each of which can also forget its value.
fn parallel_amnesia(n: i64) -> Result<Net, BuiltinError> {
    let mut ex = Example::new();
    for i in 0..n {
        let p = ex.place(format!("p_{i}"), Some(0))?;
        ex.transition(format!("inc_{i}"), "y = x + 1", &[(p, "x")], &[(p, "y")])?;
        ex.transition(format!("forget_{i}"), "TRUE", &[(p, "x")], &[(p, "y")])?;
    }
    Ok(ex.build())
}

/// An odometer of `levels` digits in base `base`; `overflow` can only fire
/// after `base^levels` increments.
fn fast_growing(levels: i64, base: i64) -> Result<Net, BuiltinError> {
    let mut ex = Example::new();
    let counters = (0..levels)
        .map(|i| ex.place(format!("c_{i}"), Some(0)))
        .collect::<Result<Vec<_>, _>>()?;
    let done = ex.place("done", None)?;
    ex.transition(
        "inc",
        &format!("x < {base} AND y = x + 1"),
        &[(counters[0], "x")],
        &[(counters[0], "y")],
    )?;
    for (i, pair) in counters.windows(2).enumerate() {
        ex.transition(
            format!("carry_{i}"),
            &format!("x = {base} AND y < {base} AND x2 = 0 AND y2 = y + 1"),
            &[(pair[0], "x"), (pair[1], "y")],
            &[(pair[0], "x2"), (pair[1], "y2")],
        )?;
    }
    let top = counters[counters.len() - 1];
    ex.transition(
        "overflow",
        &format!("x = {base} AND d = x"),
        &[(top, "x")],
        &[(done, "d")],
    )?;
    Ok(ex.build())
}

fn build(name: &str, params: &[&str]) -> Result<Option<Net>, BuiltinError> {
    let net = match name {
        "isqrt" => {
            arity("isqrt", params, 1)?;
            isqrt(number("isqrt", params[0], 0)?)?
        }
        "restaurant" => {
            arity("restaurant", params, 0)?;
            restaurant()?
        }
        "mastermind" => {
            arity("mastermind", params, 2)?;
            mastermind(
                &digits("mastermind", params[0])?,
                &digits("mastermind", params[1])?,
            )?
        }
        "buckets" => {
            if params.len() < 2 {
                return Err(BuiltinError::BadParameter {
                    net: "buckets",
                    param: params.join("#"),
                    reason: "expected a goal and at least one capacity".to_string(),
                });
            }
            let goal = number("buckets", params[0], 0)?;
            let capacities = params[1..]
                .iter()
                .map(|p| number("buckets", p, 1))
                .collect::<Result<Vec<_>, _>>()?;
            buckets(goal, &capacities)?
        }
        "parallelAmnesia" => {
            arity("parallelAmnesia", params, 1)?;
            parallel_amnesia(number("parallelAmnesia", params[0], 0)?)?
        }
        "fast-growing" => {
            arity("fast-growing", params, 2)?;
            fast_growing(
                number("fast-growing", params[0], 1)?,
                number("fast-growing", params[1], 1)?,
            )?
        }
        _ => return Ok(None),
    };
    Ok(Some(net))
}

/// Build the built-in net named by `input`, or return `None` if `input` does
/// not name one (and so should be read as a file).
pub fn lookup(input: &str) -> Option<Result<Net, BuiltinError>> {
    let mut parts = input.split('#');
    let name = parts.next()?;
    let params = parts.collect::<Vec<_>>();
    if params.is_empty() && name != "restaurant" {
        return None;
    }
    let net = build(name, &params).transpose()?;
    log::info!("using built-in net {input}");
    Some(net)
}

#[cfg(test)]
mod tests {
    use super::{lookup, BuiltinError};
    use crate::logic::{Valuation, Variable};
    use crate::net::expansion::{bindings, ExpansionRange};
    use crate::net::Net;

    fn net(name: &str) -> Net {
        lookup(name)
            .unwrap_or_else(|| panic!("{name} is not built in"))
            .unwrap_or_else(|e| panic!("{name} failed: {e}"))
    }

    fn names(net: &Net) -> Vec<&str> {
        net.transitions().iter().map(|t| t.name.as_str()).collect()
    }

    fn valuation(values: &[(&str, i64)]) -> Valuation {
        values
            .iter()
            .map(|&(v, x)| (Variable::new(v), x))
            .collect()
    }

    #[test]
    fn test_lookup() {
        assert!(lookup("nets/restaurant.hllola").is_none());
        assert!(lookup("isqrt").is_none());
        assert!(lookup("-").is_none());
        assert!(lookup("unknown#1").is_none());
        assert!(matches!(
            lookup("isqrt#x"),
            Some(Err(BuiltinError::BadParameter { net: "isqrt", .. }))
        ));
        assert!(matches!(
            lookup("mastermind#12#3"),
            Some(Err(BuiltinError::BadParameter { .. }))
        ));
        assert!(matches!(
            lookup("buckets#4"),
            Some(Err(BuiltinError::BadParameter { .. }))
        ));
        assert!(matches!(
            lookup("fast-growing#0#2"),
            Some(Err(BuiltinError::BadParameter { .. }))
        ));
    }

    #[test]
    fn test_isqrt() {
        let net = net("isqrt#10");
        assert_eq!(names(&net), vec!["step", "done"]);
        assert_eq!(net.initial_marking().values().copied().collect::<Vec<_>>(), vec![0, 10]);
        let done = net.transition_by_name("done").unwrap();
        let env = valuation(&[("i", 3), ("n", 10), ("r", 3)]);
        assert_eq!(done.guard.eval(&env), Some(true));
        let env = valuation(&[("i", 2), ("n", 10), ("r", 2)]);
        assert_eq!(done.guard.eval(&env), Some(false));
    }

    #[test]
    fn test_mastermind() {
        let net = net("mastermind#41#61");
        assert_eq!(
            names(&net),
            vec!["hit_0", "miss_0", "hit_1", "miss_1", "solved"]
        );
        let place = net.place_by_name("code_0").unwrap();
        assert_eq!(net.initial_marking()[&place.index], 4);
        let solved = net.transition_by_name("solved").unwrap();
        assert_eq!(solved.guard.to_string(), "s = 2 AND d = s");
    }

    #[test]
    fn test_buckets() {
        let net = net("buckets#4#3#5");
        assert_eq!(
            names(&net),
            vec![
                "fill_0", "empty_0", "fill_1", "empty_1", "pour_0_1", "pour_1_0", "goal_0",
                "goal_1"
            ]
        );
        // pouring 3 liters into a bucket of 5 holding 4
        let pour = net.transition_by_name("pour_0_1").unwrap();
        let range = ExpansionRange::new(0, 5).unwrap();
        let results = bindings(pour, &range, &valuation(&[("a", 3), ("b", 4)]));
        assert_eq!(results, vec![valuation(&[("a", 3), ("a2", 2), ("b", 4), ("b2", 5)])]);
    }

    #[test]
    fn test_parallel_amnesia() {
        let net = net("parallelAmnesia#2");
        assert_eq!(names(&net), vec!["inc_0", "forget_0", "inc_1", "forget_1"]);
        let forget = net.transition_by_name("forget_1").unwrap();
        let range = ExpansionRange::new(0, 2).unwrap();
        assert_eq!(bindings(forget, &range, &Valuation::new()).len(), 9);
    }

    #[test]
    fn test_fast_growing() {
        let net = net("fast-growing#3#2");
        assert_eq!(names(&net), vec!["inc", "carry_0", "carry_1", "overflow"]);
        assert_eq!(net.places().len(), 4);
        assert_eq!(net.initial_marking().len(), 3);
        assert!(lookup("restaurant").is_some_and(|net| net.is_ok()));
    }
}
