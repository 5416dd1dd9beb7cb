// Copyright 2022-2023 VMware, Inc.
// SPDX-License-Identifier: BSD-2-Clause

//! Safe high-level Petri nets whose tokens carry integer colors.
//!
//! Places and transitions live in arenas and refer to each other by index.
//! Arcs are labeled by variables: firing a transition binds each variable of a
//! consuming arc to the color of the consumed token, the guard constrains the
//! binding, and every produced token gets the value of its arc variable.

use std::collections::{BTreeMap, BTreeSet, HashMap, VecDeque};

use thiserror::Error;

use crate::logic::{Formula, Variable};

pub mod expansion;
mod render;

pub type PlaceId = usize;
pub type TransitionId = usize;

/// The color of the single token of each marked place.
pub type Marking = BTreeMap<PlaceId, i64>;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Place {
    pub index: PlaceId,
    pub name: String,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Transition {
    pub index: TransitionId,
    pub name: String,
    pub guard: Formula,
    pub preset: BTreeMap<PlaceId, Variable>,
    pub postset: BTreeMap<PlaceId, Variable>,
}

impl Transition {
    /// Every variable on an arc or in the guard.
    pub fn variables(&self) -> BTreeSet<Variable> {
        let mut vars = self.guard.vars();
        vars.extend(self.preset.values().cloned());
        vars.extend(self.postset.values().cloned());
        vars
    }
}

#[derive(Error, Debug, PartialEq, Eq)]
pub enum NetError {
    #[error("place {0} is declared twice")]
    DuplicatePlace(String),
    #[error("transition {0} is declared twice")]
    DuplicateTransition(String),
    #[error("unknown place {0}")]
    UnknownPlace(String),
    #[error("place {place} is marked twice")]
    DuplicateMarking { place: String },
    #[error("transition {transition} has two {direction} arcs with place {place}")]
    DuplicateArc {
        transition: String,
        place: String,
        direction: &'static str,
    },
    #[error("place {place} is marked with {color}, outside of the range {lower}..{upper}")]
    MarkingOutOfRange {
        place: String,
        color: i64,
        lower: i64,
        upper: i64,
    },
}

/// Places and transitions reachable from the initial marking.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Nodes {
    pub places: BTreeSet<PlaceId>,
    pub transitions: BTreeSet<TransitionId>,
}

#[derive(Clone, Debug)]
pub struct Net {
    places: Vec<Place>,
    transitions: Vec<Transition>,
    // transitions consuming from each place
    place_postsets: Vec<Vec<TransitionId>>,
    initial_marking: Marking,
}

impl Net {
    pub fn places(&self) -> &[Place] {
        &self.places
    }

    pub fn transitions(&self) -> &[Transition] {
        &self.transitions
    }

    pub fn place(&self, id: PlaceId) -> &Place {
        &self.places[id]
    }

    pub fn transition(&self, id: TransitionId) -> &Transition {
        &self.transitions[id]
    }

    pub fn initial_marking(&self) -> &Marking {
        &self.initial_marking
    }

    /// The transitions consuming from place `p`.
    pub fn place_postset(&self, p: PlaceId) -> &[TransitionId] {
        &self.place_postsets[p]
    }

    pub fn place_by_name(&self, name: &str) -> Option<&Place> {
        self.places.iter().find(|p| p.name == name)
    }

    pub fn transition_by_name(&self, name: &str) -> Option<&Transition> {
        self.transitions.iter().find(|t| t.name == name)
    }

    /// Collect the places and transitions reachable from the initially marked
    /// places, following arcs forward.
    pub fn collect_nodes(&self) -> Nodes {
        let mut nodes = Nodes::default();
        let mut queue: VecDeque<PlaceId> = self.initial_marking.keys().copied().collect();
        while let Some(p) = queue.pop_front() {
            if !nodes.places.insert(p) {
                continue;
            }
            for &t in self.place_postset(p) {
                if nodes.transitions.insert(t) {
                    queue.extend(self.transitions[t].postset.keys().copied());
                }
            }
        }
        nodes
    }
}

/// Incrementally build a [`Net`], checking names as they are declared.
#[derive(Debug, Default)]
pub struct NetBuilder {
    places: Vec<Place>,
    place_names: HashMap<String, PlaceId>,
    transitions: Vec<Transition>,
    transition_names: HashMap<String, TransitionId>,
    marking: Marking,
}

impl NetBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn place<S: Into<String>>(&mut self, name: S) -> Result<PlaceId, NetError> {
        let name = name.into();
        if self.place_names.contains_key(&name) {
            return Err(NetError::DuplicatePlace(name));
        }
        let index = self.places.len();
        self.place_names.insert(name.clone(), index);
        self.places.push(Place { index, name });
        Ok(index)
    }

    pub fn place_id(&self, name: &str) -> Result<PlaceId, NetError> {
        self.place_names
            .get(name)
            .copied()
            .ok_or_else(|| NetError::UnknownPlace(name.to_string()))
    }

    /// Put a token of the given color on `place`.
    pub fn mark(&mut self, place: PlaceId, color: i64) -> Result<(), NetError> {
        if self.marking.insert(place, color).is_some() {
            return Err(NetError::DuplicateMarking {
                place: self.places[place].name.clone(),
            });
        }
        Ok(())
    }

    fn arcs(
        &self,
        transition: &str,
        direction: &'static str,
        arcs: Vec<(PlaceId, Variable)>,
    ) -> Result<BTreeMap<PlaceId, Variable>, NetError> {
        let mut map = BTreeMap::new();
        for (p, v) in arcs {
            if map.insert(p, v).is_some() {
                return Err(NetError::DuplicateArc {
                    transition: transition.to_string(),
                    place: self.places[p].name.clone(),
                    direction,
                });
            }
        }
        Ok(map)
    }

    pub fn transition<S: Into<String>>(
        &mut self,
        name: S,
        guard: Formula,
        preset: Vec<(PlaceId, Variable)>,
        postset: Vec<(PlaceId, Variable)>,
    ) -> Result<TransitionId, NetError> {
        let name = name.into();
        if self.transition_names.contains_key(&name) {
            return Err(NetError::DuplicateTransition(name));
        }
        let preset = self.arcs(&name, "consuming", preset)?;
        let postset = self.arcs(&name, "producing", postset)?;
        let index = self.transitions.len();
        self.transition_names.insert(name.clone(), index);
        self.transitions.push(Transition {
            index,
            name,
            guard,
            preset,
            postset,
        });
        Ok(index)
    }

    pub fn build(self) -> Net {
        let mut place_postsets = vec![vec![]; self.places.len()];
        for t in &self.transitions {
            for &p in t.preset.keys() {
                place_postsets[p].push(t.index);
            }
        }
        Net {
            places: self.places,
            transitions: self.transitions,
            place_postsets,
            initial_marking: self.marking,
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::{Net, NetBuilder, NetError};
    use crate::logic::{CmpOp, Expr, Formula, Variable};

    /// p --t--> q --u--> r, plus an unreachable transition from s.
    pub(crate) fn chain() -> Net {
        let mut b = NetBuilder::new();
        let p = b.place("p").unwrap();
        let q = b.place("q").unwrap();
        let r = b.place("r").unwrap();
        let s = b.place("s").unwrap();
        b.mark(p, 3).unwrap();
        let x = Variable::new("x");
        let y = Variable::new("y");
        b.transition(
            "t",
            Formula::eq(Expr::var("y"), Expr::var("x")),
            vec![(p, x.clone())],
            vec![(q, y.clone())],
        )
        .unwrap();
        b.transition(
            "u",
            Formula::Top,
            vec![(q, y.clone())],
            vec![(r, y.clone())],
        )
        .unwrap();
        b.transition(
            "v",
            Formula::cmp(CmpOp::Gt, Expr::var("x"), Expr::Const(0)),
            vec![(s, x.clone())],
            vec![(p, x)],
        )
        .unwrap();
        b.build()
    }

    #[test]
    fn test_builder_errors() {
        let mut b = NetBuilder::new();
        let p = b.place("p").unwrap();
        assert_eq!(b.place("p"), Err(NetError::DuplicatePlace("p".to_string())));
        assert_eq!(b.place_id("nope"), Err(NetError::UnknownPlace("nope".to_string())));
        b.mark(p, 1).unwrap();
        assert!(matches!(b.mark(p, 2), Err(NetError::DuplicateMarking { .. })));
        let x = Variable::new("x");
        let err = b
            .transition(
                "t",
                Formula::Top,
                vec![(p, x.clone()), (p, Variable::new("y"))],
                vec![],
            )
            .unwrap_err();
        assert_eq!(
            err.to_string(),
            "transition t has two consuming arcs with place p"
        );
        b.transition("t", Formula::Top, vec![(p, x.clone())], vec![])
            .unwrap();
        assert_eq!(
            b.transition("t", Formula::Top, vec![], vec![]),
            Err(NetError::DuplicateTransition("t".to_string()))
        );
    }

    #[test]
    fn test_collect_nodes() {
        let net = chain();
        let nodes = net.collect_nodes();
        assert_eq!(nodes.places.into_iter().collect::<Vec<_>>(), vec![0, 1, 2]);
        assert_eq!(nodes.transitions.into_iter().collect::<Vec<_>>(), vec![0, 1]);
        assert_eq!(net.place_postset(1), &[1]);
        assert_eq!(net.transition_by_name("v").map(|t| t.index), Some(2));
        let vars: Vec<String> = net.transitions()[0]
            .variables()
            .iter()
            .map(|v| v.to_string())
            .collect();
        assert_eq!(vars, vec!["x", "y"]);
    }
}
