// Copyright 2022-2023 VMware, Inc.
// SPDX-License-Identifier: BSD-2-Clause

//! Configurations of an unfolding and the adequate orders comparing them.

use std::cmp::Ordering;
use std::collections::{BTreeMap, BTreeSet};

use itertools::{EitherOrBoth, Itertools};

use crate::logic::{Expr, Formula, SatSolver};
use crate::net::{Net, PlaceId, TransitionId};
use crate::unfolding::{ConditionId, EventId, Mode, UnfoldError, Unfolding};

/// What an adequate order sees of an event: its transition and, when
/// unfolding an expansion just in time, the values of its binding.
pub type Label = (TransitionId, Vec<i64>);

#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub enum AdequateOrder {
    /// Compare sizes only.
    McMillan,
    /// Compare sizes, then Parikh vectors, then Foata normal forms.
    #[default]
    Esparza,
}

/// How often each label occurs in a set of events.
pub type Counts = BTreeMap<Label, usize>;

/// Everything an [`AdequateOrder`] needs to compare two local
/// configurations.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ConfigKey {
    size: usize,
    parikh: Counts,
    // one Parikh vector per Foata level, starting at level 1
    foata: Vec<Counts>,
}

impl ConfigKey {
    /// Build the key of a local configuration from the depth and label of
    /// each of its events. In a local configuration the Foata level of an
    /// event is its depth.
    pub fn new<I>(events: I) -> Self
    where
        I: IntoIterator<Item = (usize, Label)>,
    {
        let mut key = Self::default();
        for (depth, label) in events {
            if key.foata.len() < depth {
                key.foata.resize_with(depth, Counts::new);
            }
            if let Some(level) = depth.checked_sub(1) {
                *key.foata[level].entry(label.clone()).or_default() += 1;
            }
            *key.parikh.entry(label).or_default() += 1;
            key.size += 1;
        }
        key
    }

    pub fn size(&self) -> usize {
        self.size
    }
}

/// Compare two Parikh vectors position by position in label order. Labels
/// missing from one side count zero there.
fn compare_counts(a: &Counts, b: &Counts) -> Ordering {
    a.iter()
        .merge_join_by(b.iter(), |(l, _), (m, _)| l.cmp(m))
        .map(|both| match both {
            EitherOrBoth::Both((_, x), (_, y)) => x.cmp(y),
            EitherOrBoth::Left(_) => Ordering::Greater,
            EitherOrBoth::Right(_) => Ordering::Less,
        })
        .find(|o| o.is_ne())
        .unwrap_or(Ordering::Equal)
}

impl AdequateOrder {
    pub fn compare(&self, a: &ConfigKey, b: &ConfigKey) -> Ordering {
        let by_size = a.size.cmp(&b.size);
        match self {
            AdequateOrder::McMillan => by_size,
            AdequateOrder::Esparza => by_size
                .then_with(|| compare_counts(&a.parikh, &b.parikh))
                .then_with(|| {
                    let empty = Counts::new();
                    a.foata
                        .iter()
                        .zip_longest(&b.foata)
                        .map(|levels| match levels {
                            EitherOrBoth::Both(x, y) => compare_counts(x, y),
                            EitherOrBoth::Left(x) => compare_counts(x, &empty),
                            EitherOrBoth::Right(y) => compare_counts(&empty, y),
                        })
                        .find(|o| o.is_ne())
                        .unwrap_or(Ordering::Equal)
                }),
        }
    }
}

/// A causally closed, conflict-free set of events.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Configuration {
    events: BTreeSet<EventId>,
}

impl Configuration {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn events(&self) -> &BTreeSet<EventId> {
        &self.events
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    pub fn contains(&self, e: EventId) -> bool {
        self.events.contains(&e)
    }

    pub(crate) fn insert(&mut self, e: EventId) {
        self.events.insert(e);
    }

    pub(crate) fn union(&mut self, other: &Configuration) {
        self.events.extend(other.events.iter().copied());
    }

    /// The conditions marked after firing the configuration, ordered by
    /// place.
    pub fn cut(&self, u: &Unfolding) -> Vec<ConditionId> {
        let mut cut: BTreeSet<ConditionId> = u.initial_conditions().iter().copied().collect();
        for &e in &self.events {
            cut.extend(u.event(e).postset.iter().copied());
        }
        for &e in &self.events {
            for b in &u.event(e).preset {
                cut.remove(b);
            }
        }
        cut.into_iter()
            .sorted_by_key(|&b| u.condition(b).place)
            .collect()
    }

    /// The marking reached by the configuration, with symbolic colors.
    pub fn marking(&self, u: &Unfolding) -> Vec<(PlaceId, Expr)> {
        self.cut(u)
            .into_iter()
            .map(|b| {
                let condition = u.condition(b);
                (condition.place, condition.color.clone())
            })
            .collect()
    }

    /// The conjunction of the constraints of all events.
    pub fn constraint(&self, u: &Unfolding) -> Formula {
        Formula::and(self.events.iter().map(|&e| u.event(e).constraint.clone()))
    }

    /// The events in an order in which they can fire.
    pub fn firing_sequence(&self, u: &Unfolding) -> Vec<EventId> {
        self.events
            .iter()
            .copied()
            .sorted_by_key(|&e| (u.event(e).depth, e))
            .collect()
    }

    /// Render the firing sequence as `t1, t2(x=3, y=0)`. In colored mode the
    /// bindings come from a model of the configuration's constraint.
    pub fn firing_sequence_string(
        &self,
        u: &Unfolding,
        net: &Net,
        solver: Option<&mut SatSolver>,
    ) -> Result<String, UnfoldError> {
        let model = match (u.mode(), solver) {
            (Mode::Colored, Some(solver)) => solver.model(&self.constraint(u))?,
            _ => None,
        };
        let fired = self.firing_sequence(u).into_iter().map(|e| {
            let event = u.event(e);
            let transition = net.transition(event.transition);
            let values = match (u.mode(), &model) {
                (Mode::Jit(_), _) => event
                    .binding
                    .iter()
                    .map(|(v, value)| format!("{v}={value}"))
                    .collect_vec(),
                (Mode::Colored, Some(model)) => transition
                    .variables()
                    .iter()
                    .filter_map(|v| {
                        let value = model.get(&v.instance(event.serial))?;
                        Some(format!("{v}={value}"))
                    })
                    .collect_vec(),
                _ => vec![],
            };
            if values.is_empty() {
                transition.name.clone()
            } else {
                format!("{}({})", transition.name, values.join(", "))
            }
        });
        Ok(fired.collect_vec().join(", "))
    }
}
