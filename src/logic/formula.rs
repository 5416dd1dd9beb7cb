// Copyright 2022-2023 VMware, Inc.
// SPDX-License-Identifier: BSD-2-Clause

//! Guards and constraints: formulas over integer arithmetic.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

/// A named integer variable.
#[derive(PartialEq, Eq, PartialOrd, Ord, Clone, Debug, Hash)]
pub struct Variable(String);

impl Variable {
    pub fn new<S: Into<String>>(name: S) -> Self {
        Self(name.into())
    }

    pub fn name(&self) -> &str {
        &self.0
    }

    /// The copy of this variable that belongs to a single event of an
    /// unfolding.
    pub fn instance(&self, event: usize) -> Self {
        Self(format!("{}@{event}", self.0))
    }

    /// A copy of this variable that never clashes with an instance variable.
    pub fn primed(&self) -> Self {
        Self(format!("{}'", self.0))
    }
}

impl fmt::Display for Variable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A concrete assignment of values to variables.
pub type Valuation = BTreeMap<Variable, i64>;

#[derive(PartialEq, Eq, Clone, Copy, Debug, Hash)]
pub enum ArithOp {
    Add,
    Sub,
    Mul,
    /// Euclidean division, as in SMT-LIB `div`.
    Div,
    /// Euclidean remainder, as in SMT-LIB `mod`.
    Mod,
}

#[derive(PartialEq, Eq, Clone, Debug, Hash)]
pub enum Expr {
    Var(Variable),
    Const(i64),
    Neg(Box<Expr>),
    BinOp(ArithOp, Box<Expr>, Box<Expr>),
}

#[derive(PartialEq, Eq, Clone, Copy, Debug, Hash)]
pub enum CmpOp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

#[derive(PartialEq, Eq, Clone, Copy, Debug, Hash)]
pub enum Quantifier {
    Exists,
    Forall,
}

#[derive(PartialEq, Eq, Clone, Debug, Hash)]
pub enum Formula {
    Top,
    Bottom,
    Cmp(CmpOp, Expr, Expr),
    Not(Box<Formula>),
    And(Vec<Formula>),
    Or(Vec<Formula>),
    Quantified {
        quantifier: Quantifier,
        vars: Vec<Variable>,
        body: Box<Formula>,
    },
}

impl Expr {
    pub fn var<S: Into<String>>(name: S) -> Self {
        Self::Var(Variable::new(name))
    }

    pub fn binop(op: ArithOp, lhs: Expr, rhs: Expr) -> Self {
        Self::BinOp(op, Box::new(lhs), Box::new(rhs))
    }

    fn collect_vars(&self, vars: &mut BTreeSet<Variable>) {
        match self {
            Expr::Var(v) => {
                vars.insert(v.clone());
            }
            Expr::Const(_) => {}
            Expr::Neg(e) => e.collect_vars(vars),
            Expr::BinOp(_, lhs, rhs) => {
                lhs.collect_vars(vars);
                rhs.collect_vars(vars);
            }
        }
    }

    pub fn vars(&self) -> BTreeSet<Variable> {
        let mut vars = BTreeSet::new();
        self.collect_vars(&mut vars);
        vars
    }

    fn rename_except<F>(&self, f: &F, bound: &BTreeSet<Variable>) -> Expr
    where
        F: Fn(&Variable) -> Variable,
    {
        match self {
            Expr::Var(v) if bound.contains(v) => Expr::Var(v.clone()),
            Expr::Var(v) => Expr::Var(f(v)),
            Expr::Const(c) => Expr::Const(*c),
            Expr::Neg(e) => Expr::Neg(Box::new(e.rename_except(f, bound))),
            Expr::BinOp(op, lhs, rhs) => Expr::binop(
                *op,
                lhs.rename_except(f, bound),
                rhs.rename_except(f, bound),
            ),
        }
    }

    /// Rename every variable using `f`.
    pub fn rename<F>(&self, f: F) -> Expr
    where
        F: Fn(&Variable) -> Variable,
    {
        self.rename_except(&f, &BTreeSet::new())
    }

    /// Evaluate under `env`. Returns `None` for unbound variables, division by
    /// zero and overflow.
    pub fn eval(&self, env: &Valuation) -> Option<i64> {
        match self {
            Expr::Var(v) => env.get(v).copied(),
            Expr::Const(c) => Some(*c),
            Expr::Neg(e) => e.eval(env)?.checked_neg(),
            Expr::BinOp(op, lhs, rhs) => {
                let (l, r) = (lhs.eval(env)?, rhs.eval(env)?);
                match op {
                    ArithOp::Add => l.checked_add(r),
                    ArithOp::Sub => l.checked_sub(r),
                    ArithOp::Mul => l.checked_mul(r),
                    ArithOp::Div => l.checked_div_euclid(r),
                    ArithOp::Mod => l.checked_rem_euclid(r),
                }
            }
        }
    }
}

impl CmpOp {
    fn holds(&self, l: i64, r: i64) -> bool {
        match self {
            CmpOp::Eq => l == r,
            CmpOp::Ne => l != r,
            CmpOp::Lt => l < r,
            CmpOp::Le => l <= r,
            CmpOp::Gt => l > r,
            CmpOp::Ge => l >= r,
        }
    }

    fn symbol(&self) -> &'static str {
        match self {
            CmpOp::Eq => "=",
            CmpOp::Ne => "!=",
            CmpOp::Lt => "<",
            CmpOp::Le => "<=",
            CmpOp::Gt => ">",
            CmpOp::Ge => ">=",
        }
    }
}

impl Formula {
    pub fn top() -> Self {
        Self::Top
    }

    pub fn cmp(op: CmpOp, lhs: Expr, rhs: Expr) -> Self {
        Self::Cmp(op, lhs, rhs)
    }

    pub fn eq(lhs: Expr, rhs: Expr) -> Self {
        Self::Cmp(CmpOp::Eq, lhs, rhs)
    }

    /// Conjunction of `fs`, dropping `TRUE` and flattening nested
    /// conjunctions.
    pub fn and<I: IntoIterator<Item = Formula>>(fs: I) -> Self {
        let mut conjuncts = vec![];
        for f in fs {
            match f {
                Formula::Top => {}
                Formula::Bottom => return Formula::Bottom,
                Formula::And(inner) => conjuncts.extend(inner),
                f => conjuncts.push(f),
            }
        }
        match conjuncts.len() {
            0 => Formula::Top,
            1 => conjuncts.remove(0),
            _ => Formula::And(conjuncts),
        }
    }

    /// Disjunction of `fs`, dropping `FALSE` and flattening nested
    /// disjunctions.
    pub fn or<I: IntoIterator<Item = Formula>>(fs: I) -> Self {
        let mut disjuncts = vec![];
        for f in fs {
            match f {
                Formula::Bottom => {}
                Formula::Top => return Formula::Top,
                Formula::Or(inner) => disjuncts.extend(inner),
                f => disjuncts.push(f),
            }
        }
        match disjuncts.len() {
            0 => Formula::Bottom,
            1 => disjuncts.remove(0),
            _ => Formula::Or(disjuncts),
        }
    }

    #[allow(clippy::should_implement_trait)]
    pub fn not(f: Formula) -> Self {
        match f {
            Formula::Top => Formula::Bottom,
            Formula::Bottom => Formula::Top,
            Formula::Not(inner) => *inner,
            f => Formula::Not(Box::new(f)),
        }
    }

    pub fn implies(lhs: Formula, rhs: Formula) -> Self {
        Self::or([Self::not(lhs), rhs])
    }

    fn quantify(quantifier: Quantifier, vars: Vec<Variable>, body: Formula) -> Self {
        if vars.is_empty() || matches!(body, Formula::Top | Formula::Bottom) {
            return body;
        }
        Formula::Quantified {
            quantifier,
            vars,
            body: Box::new(body),
        }
    }

    pub fn exists(vars: Vec<Variable>, body: Formula) -> Self {
        Self::quantify(Quantifier::Exists, vars, body)
    }

    pub fn forall(vars: Vec<Variable>, body: Formula) -> Self {
        Self::quantify(Quantifier::Forall, vars, body)
    }

    /// Join two formulas with a binary connective as written, only flattening
    /// the same connective.
    pub(crate) fn nary_and(lhs: Formula, rhs: Formula) -> Self {
        let mut fs = vec![];
        for f in [lhs, rhs] {
            match f {
                Formula::And(inner) => fs.extend(inner),
                f => fs.push(f),
            }
        }
        Formula::And(fs)
    }

    pub(crate) fn nary_or(lhs: Formula, rhs: Formula) -> Self {
        let mut fs = vec![];
        for f in [lhs, rhs] {
            match f {
                Formula::Or(inner) => fs.extend(inner),
                f => fs.push(f),
            }
        }
        Formula::Or(fs)
    }

    fn collect_vars(&self, vars: &mut BTreeSet<Variable>) {
        match self {
            Formula::Top | Formula::Bottom => {}
            Formula::Cmp(_, lhs, rhs) => {
                lhs.collect_vars(vars);
                rhs.collect_vars(vars);
            }
            Formula::Not(f) => f.collect_vars(vars),
            Formula::And(fs) | Formula::Or(fs) => {
                for f in fs {
                    f.collect_vars(vars);
                }
            }
            Formula::Quantified {
                vars: bound, body, ..
            } => {
                let mut inner = BTreeSet::new();
                body.collect_vars(&mut inner);
                vars.extend(inner.into_iter().filter(|v| !bound.contains(v)));
            }
        }
    }

    /// The free variables, in sorted order.
    pub fn vars(&self) -> BTreeSet<Variable> {
        let mut vars = BTreeSet::new();
        self.collect_vars(&mut vars);
        vars
    }

    fn rename_except<F>(&self, f: &F, bound: &BTreeSet<Variable>) -> Formula
    where
        F: Fn(&Variable) -> Variable,
    {
        match self {
            Formula::Top => Formula::Top,
            Formula::Bottom => Formula::Bottom,
            Formula::Cmp(op, lhs, rhs) => Formula::Cmp(
                *op,
                lhs.rename_except(f, bound),
                rhs.rename_except(f, bound),
            ),
            Formula::Not(g) => Formula::Not(Box::new(g.rename_except(f, bound))),
            Formula::And(fs) => Formula::And(fs.iter().map(|g| g.rename_except(f, bound)).collect()),
            Formula::Or(fs) => Formula::Or(fs.iter().map(|g| g.rename_except(f, bound)).collect()),
            Formula::Quantified {
                quantifier,
                vars,
                body,
            } => {
                let mut bound = bound.clone();
                bound.extend(vars.iter().cloned());
                Formula::Quantified {
                    quantifier: *quantifier,
                    vars: vars.clone(),
                    body: Box::new(body.rename_except(f, &bound)),
                }
            }
        }
    }

    /// Rename the free variables using `f`.
    pub fn rename<F>(&self, f: F) -> Formula
    where
        F: Fn(&Variable) -> Variable,
    {
        self.rename_except(&f, &BTreeSet::new())
    }

    /// Evaluate under `env`. Returns `None` if some variable is unbound, an
    /// arithmetic operation is undefined, or the formula is quantified.
    pub fn eval(&self, env: &Valuation) -> Option<bool> {
        match self {
            Formula::Top => Some(true),
            Formula::Bottom => Some(false),
            Formula::Cmp(op, lhs, rhs) => Some(op.holds(lhs.eval(env)?, rhs.eval(env)?)),
            Formula::Not(f) => f.eval(env).map(|b| !b),
            Formula::And(fs) => {
                let values = fs.iter().map(|f| f.eval(env)).collect::<Option<Vec<_>>>()?;
                Some(values.into_iter().all(|b| b))
            }
            Formula::Or(fs) => {
                let values = fs.iter().map(|f| f.eval(env)).collect::<Option<Vec<_>>>()?;
                Some(values.into_iter().any(|b| b))
            }
            Formula::Quantified { .. } => None,
        }
    }
}

fn parens(add_parens: bool, s: String) -> String {
    if add_parens {
        format!("({s})")
    } else {
        s
    }
}

fn expr_precedence(e: &Expr) -> usize {
    match e {
        Expr::BinOp(ArithOp::Add | ArithOp::Sub, _, _) => 10,
        Expr::BinOp(ArithOp::Mul | ArithOp::Div | ArithOp::Mod, _, _) => 20,
        Expr::Neg(_) => 30,
        Expr::Const(c) if *c < 0 => 30,
        Expr::Var(_) | Expr::Const(_) => 1000,
    }
}

fn expr(e: &Expr) -> String {
    match e {
        Expr::Var(v) => v.to_string(),
        Expr::Const(c) => c.to_string(),
        Expr::Neg(arg) => format!(
            "-{}",
            parens(expr_precedence(e) > expr_precedence(arg), expr(arg))
        ),
        Expr::BinOp(op, lhs, rhs) => {
            let op_str = match op {
                ArithOp::Add => "+",
                ArithOp::Sub => "-",
                ArithOp::Mul => "*",
                ArithOp::Div => "/",
                ArithOp::Mod => "%",
            };
            // all binary operators are left associative
            let left = parens(expr_precedence(e) > expr_precedence(lhs), expr(lhs));
            let right = parens(expr_precedence(e) >= expr_precedence(rhs), expr(rhs));
            format!("{left} {op_str} {right}")
        }
    }
}

fn precedence(f: &Formula) -> usize {
    match f {
        Formula::Quantified { .. } => 0,
        Formula::Or(_) => 10,
        Formula::And(_) => 20,
        Formula::Not(_) => 30,
        Formula::Top | Formula::Bottom | Formula::Cmp(..) => 1000,
    }
}

fn formula(f: &Formula) -> String {
    match f {
        Formula::Top => "TRUE".to_string(),
        Formula::Bottom => "FALSE".to_string(),
        Formula::Cmp(op, lhs, rhs) => format!("{} {} {}", expr(lhs), op.symbol(), expr(rhs)),
        Formula::Not(arg) => format!(
            "NOT {}",
            parens(precedence(f) > precedence(arg), formula(arg))
        ),
        Formula::And(fs) if fs.is_empty() => "TRUE".to_string(),
        Formula::Or(fs) if fs.is_empty() => "FALSE".to_string(),
        Formula::And(fs) | Formula::Or(fs) => {
            let sep = if matches!(f, Formula::And(_)) {
                " AND "
            } else {
                " OR "
            };
            fs.iter()
                .map(|arg| parens(precedence(f) >= precedence(arg), formula(arg)))
                .collect::<Vec<_>>()
                .join(sep)
        }
        Formula::Quantified {
            quantifier,
            vars,
            body,
        } => {
            let q = match quantifier {
                Quantifier::Exists => "EXISTS",
                Quantifier::Forall => "FORALL",
            };
            let vars = vars
                .iter()
                .map(|v| v.to_string())
                .collect::<Vec<_>>()
                .join(", ");
            format!("{q} {vars} . {}", formula(body))
        }
    }
}

impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", expr(self))
    }
}

impl fmt::Display for Formula {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", formula(self))
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeSet;

    use super::*;

    fn x() -> Expr {
        Expr::var("x")
    }

    fn y() -> Expr {
        Expr::var("y")
    }

    #[test]
    fn test_smart_constructors() {
        let p = Formula::cmp(CmpOp::Gt, x(), Expr::Const(0));
        assert_eq!(Formula::and([]), Formula::Top);
        assert_eq!(Formula::and([Formula::Top, p.clone()]), p);
        assert_eq!(Formula::and([p.clone(), Formula::Bottom]), Formula::Bottom);
        assert_eq!(Formula::or([Formula::Bottom, p.clone()]), p);
        assert_eq!(Formula::not(Formula::not(p.clone())), p);
        assert_eq!(
            Formula::and([Formula::and([p.clone(), p.clone()]), p.clone()]),
            Formula::And(vec![p.clone(), p.clone(), p.clone()])
        );
        assert_eq!(Formula::exists(vec![], p.clone()), p);
        assert_eq!(Formula::forall(vec![], p.clone()), p);
        assert_eq!(
            Formula::forall(vec![Variable::new("x")], Formula::Top),
            Formula::Top
        );
        assert_eq!(Formula::implies(Formula::Top, p.clone()), p);
    }

    #[test]
    fn test_display() {
        let sum = Expr::binop(ArithOp::Add, x(), Expr::Const(1));
        let square = Expr::binop(ArithOp::Mul, sum.clone(), sum);
        let f = Formula::and([
            Formula::cmp(CmpOp::Le, square, y()),
            Formula::or([
                Formula::eq(x(), Expr::Const(-2)),
                Formula::not(Formula::eq(y(), Expr::Neg(Box::new(x())))),
            ]),
        ]);
        insta::assert_display_snapshot!(f, @"(x + 1) * (x + 1) <= y AND (x = -2 OR NOT y = -x)");

        let sub = Expr::binop(
            ArithOp::Sub,
            x(),
            Expr::binop(ArithOp::Sub, y(), Expr::Const(1)),
        );
        assert_eq!(sub.to_string(), "x - (y - 1)");

        let q = Formula::exists(
            vec![Variable::new("x"), Variable::new("y")],
            Formula::and([Formula::eq(x(), y()), Formula::Top]),
        );
        assert_eq!(
            Formula::not(q).to_string(),
            "NOT (EXISTS x, y . x = y)"
        );
        assert_eq!(Formula::Top.to_string(), "TRUE");

        let all = Formula::forall(
            vec![Variable::new("x")],
            Formula::implies(
                Formula::cmp(CmpOp::Gt, x(), Expr::Const(0)),
                Formula::exists(vec![Variable::new("y")], Formula::cmp(CmpOp::Lt, y(), x())),
            ),
        );
        insta::assert_display_snapshot!(all, @"FORALL x . NOT x > 0 OR (EXISTS y . y < x)");
    }

    #[test]
    fn test_vars_and_rename() {
        let f = Formula::and([
            Formula::eq(x(), Expr::binop(ArithOp::Add, y(), Expr::var("z"))),
            Formula::exists(
                vec![Variable::new("z")],
                Formula::cmp(CmpOp::Lt, Expr::var("z"), Expr::var("w")),
            ),
        ]);
        let vars: Vec<String> = f.vars().iter().map(|v| v.to_string()).collect();
        assert_eq!(vars, vec!["w", "x", "y", "z"]);

        let renamed = f.rename(|v| v.instance(3));
        let vars: BTreeSet<String> = renamed.vars().iter().map(|v| v.to_string()).collect();
        assert_eq!(
            vars,
            ["w@3", "x@3", "y@3", "z@3"]
                .into_iter()
                .map(String::from)
                .collect()
        );
        // bound occurrences are untouched
        assert_eq!(
            renamed.to_string(),
            "x@3 = y@3 + z@3 AND (EXISTS z . z < w@3)"
        );
    }

    #[test]
    fn test_eval() {
        let env: Valuation = [(Variable::new("x"), 7), (Variable::new("y"), -2)]
            .into_iter()
            .collect();
        let div = Expr::binop(ArithOp::Div, x(), y());
        let rem = Expr::binop(ArithOp::Mod, Expr::Neg(Box::new(x())), Expr::Const(3));
        assert_eq!(div.eval(&env), Some(-3));
        assert_eq!(rem.eval(&env), Some(2));
        assert_eq!(
            Expr::binop(ArithOp::Div, x(), Expr::Const(0)).eval(&env),
            None
        );

        let f = Formula::and([
            Formula::cmp(CmpOp::Gt, x(), y()),
            Formula::cmp(CmpOp::Ne, y(), Expr::Const(0)),
        ]);
        assert_eq!(f.eval(&env), Some(true));
        assert_eq!(Formula::eq(Expr::var("z"), x()).eval(&env), None);
        assert_eq!(
            Formula::exists(vec![Variable::new("z")], Formula::eq(Expr::var("z"), x()))
                .eval(&env),
            None
        );
    }
}
