// Copyright 2022 VMware, Inc.
// SPDX-License-Identifier: BSD-2-Clause

use crate::logic::formula::{ArithOp, CmpOp, Expr, Formula, Quantifier, Variable};
use crate::smtlib::sexp::{app, int, list, symbol, Sexp};

pub fn variable(v: &Variable) -> Sexp {
    symbol(v.name())
}

pub fn expr(e: &Expr) -> Sexp {
    match e {
        Expr::Var(v) => variable(v),
        Expr::Const(c) => int(*c),
        Expr::Neg(arg) => app("-", [expr(arg)]),
        Expr::BinOp(op, lhs, rhs) => {
            let head = match op {
                ArithOp::Add => "+",
                ArithOp::Sub => "-",
                ArithOp::Mul => "*",
                ArithOp::Div => "div",
                ArithOp::Mod => "mod",
            };
            app(head, [expr(lhs), expr(rhs)])
        }
    }
}

fn nary(head: &str, unit: &str, fs: &[Formula]) -> Sexp {
    match fs {
        [] => symbol(unit),
        [f] => formula(f),
        fs => app(head, fs.iter().map(formula)),
    }
}

pub fn formula(f: &Formula) -> Sexp {
    match f {
        Formula::Top => symbol("true"),
        Formula::Bottom => symbol("false"),
        Formula::Cmp(op, lhs, rhs) => {
            let head = match op {
                CmpOp::Eq => "=",
                CmpOp::Ne => "distinct",
                CmpOp::Lt => "<",
                CmpOp::Le => "<=",
                CmpOp::Gt => ">",
                CmpOp::Ge => ">=",
            };
            app(head, [expr(lhs), expr(rhs)])
        }
        Formula::Not(arg) => app("not", [formula(arg)]),
        Formula::And(fs) => nary("and", "true", fs),
        Formula::Or(fs) => nary("or", "false", fs),
        Formula::Quantified { vars, body, .. } if vars.is_empty() => formula(body),
        Formula::Quantified {
            quantifier,
            vars,
            body,
        } => {
            let quantifier = match quantifier {
                Quantifier::Exists => "exists",
                Quantifier::Forall => "forall",
            };
            let binders = list(vars.iter().map(|v| app(v.name(), [symbol("Int")])));
            app(quantifier, [binders, formula(body)])
        }
    }
}

#[cfg(test)]
mod tests {
    use super::formula;
    use crate::logic::formula::{ArithOp, CmpOp, Expr, Formula, Quantifier, Variable};

    #[test]
    fn test_encode() {
        let x = Expr::var("x");
        let y = Expr::var("y@1");
        let f = Formula::and([
            Formula::cmp(CmpOp::Gt, x.clone(), Expr::Const(0)),
            Formula::eq(y, Expr::binop(ArithOp::Sub, x.clone(), Expr::Const(1))),
            Formula::cmp(
                CmpOp::Ne,
                Expr::binop(ArithOp::Mod, x.clone(), Expr::Const(2)),
                Expr::Const(-3),
            ),
        ]);
        insta::assert_display_snapshot!(formula(&f), @"(and (> x 0) (= y@1 (- x 1)) (distinct (mod x 2) (- 3)))");

        let q = Formula::exists(
            vec![Variable::new("x").primed()],
            Formula::or([Formula::eq(Expr::var("x'"), x), Formula::Bottom]),
        );
        insta::assert_display_snapshot!(formula(&q), @"(exists ((|x'| Int)) (= |x'| x))");
        assert_eq!(formula(&Formula::And(vec![])).to_string(), "true");

        let positive = Formula::cmp(CmpOp::Gt, Expr::var("x"), Expr::Const(0));
        let all = Formula::forall(vec![Variable::new("x")], positive.clone());
        insta::assert_display_snapshot!(formula(&all), @"(forall ((x Int)) (> x 0))");
        // a quantifier without variables is not valid SMT-LIB
        let empty = Formula::Quantified {
            quantifier: Quantifier::Forall,
            vars: vec![],
            body: Box::new(positive),
        };
        assert_eq!(formula(&empty).to_string(), "(> x 0)");
    }
}
