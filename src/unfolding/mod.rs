// Copyright 2022-2023 VMware, Inc.
// SPDX-License-Identifier: BSD-2-Clause

//! Finite complete prefixes of the unfolding of a high-level net.
//!
//! The prefix grows one event at a time: possible extensions wait in a
//! priority queue ordered by the adequate order on their local
//! configurations, and an event whose local configuration reaches a marking
//! already reached by a smaller configuration is a cut-off and gets no
//! successors.
//!
//! Colors are handled in one of three ways. In colored mode every event
//! carries a constraint over its own copies of the transition variables and
//! an SMT solver decides whether extensions are possible and whether events
//! are cut-offs. In uncolored mode colors and guards are ignored. In JIT mode
//! colors are concrete values from a finite range, which unfolds the
//! expansion of the net without building it.

use std::cmp::{Ordering, Reverse};
use std::collections::{BTreeSet, BinaryHeap, HashMap, HashSet};

use thiserror::Error;

use crate::logic::{Expr, Formula, SatError, SatSolver, Valuation, Variable};
use crate::net::expansion::{bindings, ExpansionRange};
use crate::net::{Net, NetError, PlaceId, TransitionId};
use crate::timing::{self, TimeType};

pub mod configuration;
mod render;

pub use configuration::{AdequateOrder, ConfigKey, Configuration, Label};

pub type ConditionId = usize;
pub type EventId = usize;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Condition {
    pub id: ConditionId,
    pub place: PlaceId,
    /// The event producing this condition; `None` for initial conditions.
    pub preset: Option<EventId>,
    pub color: Expr,
}

#[derive(Clone, Debug)]
pub struct Event {
    pub id: EventId,
    /// Unique among all possible extensions; names the event's copies of
    /// the transition variables.
    pub serial: usize,
    pub transition: TransitionId,
    /// Consumed conditions, ordered by place.
    pub preset: Vec<ConditionId>,
    /// Produced conditions, ordered by place.
    pub postset: Vec<ConditionId>,
    pub depth: usize,
    /// Concrete values of the transition variables (JIT mode only).
    pub binding: Valuation,
    /// Constraint on the event's variables (colored mode only).
    pub constraint: Formula,
    pub cutoff: bool,
    /// The local configuration `[e]`.
    pub cone: Configuration,
    key: ConfigKey,
    cut: Vec<ConditionId>,
}

impl Event {
    pub fn label(&self) -> Label {
        (self.transition, self.binding.values().copied().collect())
    }
}

/// How colors are treated while unfolding.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Mode {
    Colored,
    Uncolored,
    Jit(ExpansionRange),
}

#[derive(Clone, Debug)]
pub struct UnfoldOptions {
    /// Events deeper than this are not added.
    pub depth: Option<usize>,
    pub order: AdequateOrder,
    pub cutoff: bool,
    pub mode: Mode,
    /// Stop as soon as one of these transitions can fire.
    pub targets: BTreeSet<TransitionId>,
}

impl Default for UnfoldOptions {
    fn default() -> Self {
        Self {
            depth: None,
            order: AdequateOrder::default(),
            cutoff: true,
            mode: Mode::Colored,
            targets: BTreeSet::new(),
        }
    }
}

#[derive(Error, Debug)]
pub enum UnfoldError {
    #[error(transparent)]
    Sat(#[from] SatError),
    #[error(transparent)]
    Net(#[from] NetError),
    #[error("colored unfolding needs an SMT solver")]
    SolverRequired,
}

/// A prefix of the unfolding of a net.
#[derive(Clone, Debug)]
pub struct Unfolding {
    mode: Mode,
    conditions: Vec<Condition>,
    events: Vec<Event>,
    initial: Vec<ConditionId>,
    co: Vec<BTreeSet<ConditionId>>,
    found_target: Option<EventId>,
}

impl Unfolding {
    pub fn mode(&self) -> &Mode {
        &self.mode
    }

    pub fn conditions(&self) -> &[Condition] {
        &self.conditions
    }

    pub fn events(&self) -> &[Event] {
        &self.events
    }

    pub fn condition(&self, b: ConditionId) -> &Condition {
        &self.conditions[b]
    }

    pub fn event(&self, e: EventId) -> &Event {
        &self.events[e]
    }

    /// The conditions of the initial marking, ordered by place.
    pub fn initial_conditions(&self) -> &[ConditionId] {
        &self.initial
    }

    /// The conditions concurrent to `b`. Conditions produced by cut-off
    /// events are concurrent to nothing.
    pub fn co(&self, b: ConditionId) -> &BTreeSet<ConditionId> {
        &self.co[b]
    }

    pub fn cutoffs(&self) -> impl Iterator<Item = &Event> {
        self.events.iter().filter(|e| e.cutoff)
    }

    /// The first event of a target transition, if one was added.
    pub fn found_target(&self) -> Option<EventId> {
        self.found_target
    }

    /// The cut of `[e]`, or of the empty configuration for `None`.
    fn cut(&self, e: Option<EventId>) -> &[ConditionId] {
        match e {
            Some(e) => &self.events[e].cut,
            None => &self.initial,
        }
    }
}

/// A possible extension waiting in the queue.
#[derive(Debug)]
struct Candidate {
    serial: usize,
    transition: TransitionId,
    preset: Vec<ConditionId>,
    depth: usize,
    binding: Valuation,
    constraint: Formula,
    // the union of the local configurations of the preset's producers
    history: Configuration,
}

#[derive(Debug)]
struct Queued {
    order: AdequateOrder,
    key: ConfigKey,
    candidate: Candidate,
}

impl Ord for Queued {
    fn cmp(&self, other: &Self) -> Ordering {
        self.order
            .compare(&self.key, &other.key)
            .then_with(|| self.candidate.serial.cmp(&other.candidate.serial))
    }
}

impl PartialOrd for Queued {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for Queued {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Queued {}

struct Unfolder<'a> {
    net: &'a Net,
    options: &'a UnfoldOptions,
    solver: Option<&'a mut SatSolver>,
    unfolding: Unfolding,
    queue: BinaryHeap<Reverse<Queued>>,
    seen: HashSet<(TransitionId, Vec<ConditionId>)>,
    // conditions that can be consumed, by place
    place_conditions: Vec<Vec<ConditionId>>,
    // configurations whose cut covers a set of places; `None` is the empty
    // configuration
    by_places: HashMap<Vec<PlaceId>, Vec<Option<EventId>>>,
    serial: usize,
}

impl<'a> Unfolder<'a> {
    fn new(
        net: &'a Net,
        options: &'a UnfoldOptions,
        solver: Option<&'a mut SatSolver>,
    ) -> Result<Self, UnfoldError> {
        let mut unfolding = Unfolding {
            mode: options.mode.clone(),
            conditions: vec![],
            events: vec![],
            initial: vec![],
            co: vec![],
            found_target: None,
        };
        let mut place_conditions = vec![vec![]; net.places().len()];
        for (&place, &color) in net.initial_marking() {
            if let Mode::Jit(range) = &options.mode {
                if !range.contains(color) {
                    return Err(NetError::MarkingOutOfRange {
                        place: net.place(place).name.clone(),
                        color,
                        lower: range.lower,
                        upper: range.upper,
                    }
                    .into());
                }
            }
            let id = unfolding.conditions.len();
            unfolding.conditions.push(Condition {
                id,
                place,
                preset: None,
                color: Expr::Const(color),
            });
            unfolding.initial.push(id);
            place_conditions[place].push(id);
        }
        for &b in &unfolding.initial {
            let co = unfolding
                .initial
                .iter()
                .copied()
                .filter(|&c| c != b)
                .collect();
            unfolding.co.push(co);
        }
        for t in net.transitions() {
            if t.preset.is_empty() {
                log::warn!("transition {} consumes no token and is never fired", t.name);
            }
        }

        let initial_places: Vec<PlaceId> = net.initial_marking().keys().copied().collect();
        let initial = unfolding.initial.clone();
        let mut unfolder = Self {
            net,
            options,
            solver,
            unfolding,
            queue: BinaryHeap::new(),
            seen: HashSet::new(),
            place_conditions,
            by_places: HashMap::from([(initial_places, vec![None])]),
            serial: 0,
        };
        unfolder.discover(&initial);
        Ok(unfolder)
    }

    fn colored(&self) -> bool {
        self.options.mode == Mode::Colored
    }

    fn solver(&mut self) -> Result<&mut SatSolver, UnfoldError> {
        self.solver.as_deref_mut().ok_or(UnfoldError::SolverRequired)
    }

    /// Extend `chosen` by a condition on each of `places`, such that all
    /// chosen conditions are pairwise concurrent.
    fn co_sets(
        &self,
        places: &[PlaceId],
        chosen: &mut Vec<ConditionId>,
        found: &mut Vec<Vec<ConditionId>>,
    ) {
        let Some((&p, rest)) = places.split_first() else {
            found.push(chosen.clone());
            return;
        };
        for &c in &self.place_conditions[p] {
            if chosen.iter().all(|&b| self.unfolding.co[b].contains(&c)) {
                chosen.push(c);
                self.co_sets(rest, chosen, found);
                chosen.pop();
            }
        }
    }

    /// Queue the possible extensions that consume one of `fresh`.
    fn discover(&mut self, fresh: &[ConditionId]) {
        let net = self.net;
        for &b in fresh {
            let place = self.unfolding.conditions[b].place;
            for &t in net.place_postset(place) {
                let others = net
                    .transition(t)
                    .preset
                    .keys()
                    .copied()
                    .filter(|&p| p != place)
                    .collect::<Vec<_>>();
                let mut found = vec![];
                self.co_sets(&others, &mut vec![b], &mut found);
                for mut preset in found {
                    preset.sort_by_key(|&c| self.unfolding.conditions[c].place);
                    self.extend(t, preset);
                }
            }
        }
    }

    fn next_serial(&mut self) -> usize {
        let serial = self.serial;
        self.serial += 1;
        serial
    }

    /// The bindings of `t` consuming the concrete colors of `preset`.
    fn jit_bindings(&self, t: TransitionId, preset: &[ConditionId], range: &ExpansionRange) -> Vec<Valuation> {
        let transition = self.net.transition(t);
        let mut fixed = Valuation::new();
        for (&b, v) in preset.iter().zip(transition.preset.values()) {
            let Some(color) = self.unfolding.conditions[b].color.eval(&Valuation::new()) else {
                return vec![];
            };
            if *fixed.entry(v.clone()).or_insert(color) != color {
                // one variable on two arcs with different colors
                return vec![];
            }
        }
        bindings(transition, range, &fixed)
    }

    /// The colored constraint of an event with the given serial consuming
    /// `preset`.
    fn constraint(&self, t: TransitionId, preset: &[ConditionId], serial: usize) -> Formula {
        let transition = self.net.transition(t);
        let consumed = preset
            .iter()
            .zip(transition.preset.values())
            .map(|(&b, v)| {
                Formula::eq(
                    Expr::Var(v.instance(serial)),
                    self.unfolding.conditions[b].color.clone(),
                )
            })
            .collect::<Vec<_>>();
        Formula::and(
            [transition.guard.rename(|v| v.instance(serial))]
                .into_iter()
                .chain(consumed),
        )
    }

    fn extend(&mut self, t: TransitionId, preset: Vec<ConditionId>) {
        if !self.seen.insert((t, preset.clone())) {
            return;
        }
        let producers = preset
            .iter()
            .filter_map(|&b| self.unfolding.conditions[b].preset)
            .collect::<BTreeSet<_>>();
        let depth = 1 + producers
            .iter()
            .map(|&e| self.unfolding.events[e].depth)
            .max()
            .unwrap_or(0);
        if self.options.depth.is_some_and(|bound| depth > bound) {
            log::trace!(
                "dropping {} beyond the depth bound",
                self.net.transition(t).name
            );
            return;
        }
        let mut history = Configuration::empty();
        for &e in &producers {
            history.union(&self.unfolding.events[e].cone);
        }
        let bindings = match &self.options.mode {
            Mode::Jit(range) => self.jit_bindings(t, &preset, range),
            Mode::Colored | Mode::Uncolored => vec![Valuation::new()],
        };
        for binding in bindings {
            let serial = self.next_serial();
            let label: Label = (t, binding.values().copied().collect());
            let key = ConfigKey::new(
                history
                    .events()
                    .iter()
                    .map(|&e| {
                        let event = &self.unfolding.events[e];
                        (event.depth, event.label())
                    })
                    .chain([(depth, label)]),
            );
            let constraint = if self.colored() {
                self.constraint(t, &preset, serial)
            } else {
                Formula::Top
            };
            self.queue.push(Reverse(Queued {
                order: self.options.order,
                key,
                candidate: Candidate {
                    serial,
                    transition: t,
                    preset: preset.clone(),
                    depth,
                    binding,
                    constraint,
                    history: history.clone(),
                },
            }));
        }
    }

    /// Whether the colors consumed by a candidate can actually occur.
    fn is_possible(&mut self, candidate: &Candidate) -> Result<bool, UnfoldError> {
        let f = Formula::and([
            candidate.history.constraint(&self.unfolding),
            candidate.constraint.clone(),
        ]);
        Ok(self.solver()?.is_satisfiable(&f)?)
    }

    fn add_event(&mut self, candidate: Candidate, key: ConfigKey) -> EventId {
        let id = self.unfolding.events.len();
        let net = self.net;
        let transition = net.transition(candidate.transition);
        let mut postset = vec![];
        for (&p, v) in &transition.postset {
            let color = match &self.options.mode {
                Mode::Jit(_) => Expr::Const(candidate.binding.get(v).copied().unwrap_or_default()),
                Mode::Colored | Mode::Uncolored => Expr::Var(v.instance(candidate.serial)),
            };
            let b = self.unfolding.conditions.len();
            self.unfolding.conditions.push(Condition {
                id: b,
                place: p,
                preset: Some(id),
                color,
            });
            self.unfolding.co.push(BTreeSet::new());
            postset.push(b);
        }
        let mut cone = candidate.history;
        cone.insert(id);
        self.unfolding.events.push(Event {
            id,
            serial: candidate.serial,
            transition: candidate.transition,
            preset: candidate.preset,
            postset,
            depth: candidate.depth,
            binding: candidate.binding,
            constraint: candidate.constraint,
            cutoff: false,
            cone,
            key,
            cut: vec![],
        });
        let cut = self.unfolding.events[id].cone.cut(&self.unfolding);
        self.unfolding.events[id].cut = cut;
        id
    }

    /// The formula stating that every marking of `[e]` is reached by `other`.
    fn covered_by(&self, e: EventId, other: Option<EventId>) -> Formula {
        let u = &self.unfolding;
        let constraint = match other {
            Some(other) => u.events[other].cone.constraint(u),
            None => Formula::Top,
        };
        let pairs = u
            .cut(other)
            .iter()
            .zip(u.cut(Some(e)))
            .map(|(&theirs, &ours)| (&u.conditions[theirs].color, &u.conditions[ours].color))
            .collect::<Vec<_>>();
        let mut vars = constraint.vars();
        for (theirs, _) in &pairs {
            vars.extend(theirs.vars());
        }
        // rename the variables of `other` apart from those of `[e]`
        let prime = |v: &Variable| {
            if vars.contains(v) {
                v.primed()
            } else {
                v.clone()
            }
        };
        let body = Formula::and(
            [constraint.rename(prime)].into_iter().chain(
                pairs
                    .iter()
                    .map(|(theirs, ours)| Formula::eq(theirs.rename(prime), (*ours).clone())),
            ),
        );
        Formula::exists(vars.iter().map(|v| v.primed()).collect(), body)
    }

    /// Valid iff `e` is a cut-off with respect to the configurations
    /// `smaller`, which have cuts on the same places.
    fn cutoff_formula(&self, e: EventId, smaller: &[Option<EventId>]) -> Formula {
        Formula::implies(
            self.unfolding.events[e].cone.constraint(&self.unfolding),
            Formula::or(smaller.iter().map(|&other| self.covered_by(e, other))),
        )
    }

    fn is_cutoff(&mut self, e: EventId) -> Result<bool, UnfoldError> {
        let event = &self.unfolding.events[e];
        let places = event
            .cut
            .iter()
            .map(|&b| self.unfolding.conditions[b].place)
            .collect::<Vec<_>>();
        let smaller = self
            .by_places
            .get(&places)
            .map(|others| {
                others
                    .iter()
                    .copied()
                    .filter(|other| match other {
                        Some(other) => {
                            self.options
                                .order
                                .compare(&self.unfolding.events[*other].key, &event.key)
                                == Ordering::Less
                        }
                        None => true,
                    })
                    .collect::<Vec<_>>()
            })
            .unwrap_or_default();
        self.by_places.entry(places).or_default().push(Some(e));
        if smaller.is_empty() {
            return Ok(false);
        }

        match &self.options.mode {
            Mode::Uncolored => Ok(true),
            Mode::Jit(_) => {
                let colors = |c: Option<EventId>| {
                    self.unfolding
                        .cut(c)
                        .iter()
                        .map(|&b| &self.unfolding.conditions[b].color)
                        .collect::<Vec<_>>()
                };
                let ours = colors(Some(e));
                Ok(smaller.iter().any(|&other| colors(other) == ours))
            }
            Mode::Colored => {
                let f = self.cutoff_formula(e, &smaller);
                Ok(self.solver()?.is_tautology(&f)?)
            }
        }
    }

    /// Make the postset of a non-cut-off event available to later events.
    fn connect_postset(&mut self, e: EventId) -> Vec<ConditionId> {
        let event = &self.unfolding.events[e];
        let mut common: Option<BTreeSet<ConditionId>> = None;
        for &b in &event.preset {
            let co = &self.unfolding.co[b];
            common = Some(match common {
                None => co.clone(),
                Some(common) => common.intersection(co).copied().collect(),
            });
        }
        let common = common.unwrap_or_default();
        let postset = event.postset.clone();
        for &q in &postset {
            let mut co = common.clone();
            co.extend(postset.iter().copied().filter(|&r| r != q));
            for &r in &common {
                self.unfolding.co[r].insert(q);
            }
            self.unfolding.co[q] = co;
            let place = self.unfolding.conditions[q].place;
            self.place_conditions[place].push(q);
        }
        postset
    }

    fn run(&mut self) -> Result<(), UnfoldError> {
        while let Some(Reverse(Queued { key, candidate, .. })) = self.queue.pop() {
            if self.colored() && !self.is_possible(&candidate)? {
                continue;
            }
            let e = self.add_event(candidate, key);
            let net = self.net;
            let name = &net.transition(self.unfolding.events[e].transition).name;
            log::debug!(
                "event {e}: {name} at depth {}, {} in queue",
                self.unfolding.events[e].depth,
                self.queue.len()
            );
            if self
                .options
                .targets
                .contains(&self.unfolding.events[e].transition)
            {
                log::info!("target transition {name} can fire");
                self.unfolding.found_target = Some(e);
                return Ok(());
            }
            if self.options.cutoff && self.is_cutoff(e)? {
                log::debug!("event {e} is a cut-off");
                self.unfolding.events[e].cutoff = true;
                continue;
            }
            let postset = self.connect_postset(e);
            self.discover(&postset);
        }
        Ok(())
    }
}

/// Unfold `net`. Colored mode queries `solver`, which must be given.
pub fn unfold(
    net: &Net,
    options: &UnfoldOptions,
    solver: Option<&mut SatSolver>,
) -> Result<Unfolding, UnfoldError> {
    if options.mode == Mode::Colored && solver.is_none() {
        return Err(UnfoldError::SolverRequired);
    }
    let start = timing::start();
    let mut unfolder = Unfolder::new(net, options, solver)?;
    unfolder.run()?;
    timing::elapsed(TimeType::Unfold, start);
    let unfolding = unfolder.unfolding;
    log::info!(
        "unfolded {} events ({} cut-offs) and {} conditions",
        unfolding.events.len(),
        unfolding.cutoffs().count(),
        unfolding.conditions.len()
    );
    Ok(unfolding)
}
