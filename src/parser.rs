// Copyright 2022-2023 VMware, Inc.
// SPDX-License-Identifier: BSD-2-Clause

//! Parser for high-level nets in an extension of the LoLA net format:
//!
//! ```text
//! PLACE p, q;
//! MARKING p: 3;
//! TRANSITION t
//!   GUARD x > 0 AND y = x - 1
//!   CONSUME p: x;
//!   PRODUCE q: y;
//! ```

use codespan_reporting::diagnostic::{Diagnostic, Label};
use peg::{error::ParseError, str::LineCol};
use thiserror::Error;

use crate::logic::{ArithOp, CmpOp, Expr, Formula, Quantifier, Variable};
use crate::net::{Net, NetBuilder, NetError, PlaceId};

#[derive(PartialEq, Eq, Clone, Copy, Debug)]
pub struct Span {
    pub start: usize,
    pub end: usize,
}

#[derive(PartialEq, Eq, Clone, Debug)]
pub struct Spanned<T> {
    pub x: T,
    pub span: Span,
}

type Arc = (Spanned<String>, Variable);

#[derive(Debug)]
struct TransitionDecl {
    name: Spanned<String>,
    guard: Formula,
    consume: Vec<Arc>,
    produce: Vec<Arc>,
}

#[derive(Debug)]
struct NetDecl {
    places: Vec<Spanned<String>>,
    marking: Vec<(Spanned<String>, i64)>,
    transitions: Vec<TransitionDecl>,
}

peg::parser! {

grammar parser() for str {
    rule ident_start() = ['a'..='z' | 'A'..='Z' | '_']
    rule ident_char() = ident_start() / ['0'..='9']
    rule keyword() = ("PLACE" / "MARKING" / "TRANSITION" / "GUARD" / "CONSUME" / "PRODUCE" /
                      "AND" / "OR" / "NOT" / "TRUE" / "FALSE" / "EXISTS" / "FORALL") !ident_char()
    pub rule ident() -> String
    = s:$(quiet!{!keyword() ident_start() ident_char()*} / expected!("identifier"))
    { s.to_string() }

    rule line_comment() = "//" [^'\n' | '\r']*
    rule block_comment() = "{" [^'}']* "}"
    rule whitespace() = quiet!{ [' ' | '\t' | '\n' | '\r'] / line_comment() / block_comment() }
    rule word_boundary() = !ident_char()
    rule _ = whitespace()*
    rule __ = word_boundary() _

    rule nat() -> i64
    = s:$(quiet!{['0'..='9']+} / expected!("number")) {? s.parse().or(Err("number")) }

    rule int() -> i64
    = s:$(quiet!{"-"? ['0'..='9']+} / expected!("number")) {? s.parse().or(Err("number")) }

    rule variable() -> Variable
    = s:ident() { Variable::new(s) }

    pub rule expr() -> Expr = precedence!{
        x:(@) _ "+" _ y:@ { Expr::binop(ArithOp::Add, x, y) }
        x:(@) _ "-" _ y:@ { Expr::binop(ArithOp::Sub, x, y) }
        --
        x:(@) _ "*" _ y:@ { Expr::binop(ArithOp::Mul, x, y) }
        x:(@) _ "/" _ y:@ { Expr::binop(ArithOp::Div, x, y) }
        x:(@) _ "%" _ y:@ { Expr::binop(ArithOp::Mod, x, y) }
        --
        "-" _ x:@ { match x {
            Expr::Const(c) => Expr::Const(-c),
            x => Expr::Neg(Box::new(x)),
        } }
        --
        n:nat() { Expr::Const(n) }
        v:variable() { Expr::Var(v) }
        "(" _ e:expr() _ ")" { e }
    }

    rule cmp_op() -> CmpOp
    = "<=" { CmpOp::Le } / ">=" { CmpOp::Ge } / "!=" { CmpOp::Ne } /
      "=" { CmpOp::Eq } / "<" { CmpOp::Lt } / ">" { CmpOp::Gt }

    rule comparison() -> Formula
    = lhs:expr() _ op:cmp_op() _ rhs:expr() { Formula::cmp(op, lhs, rhs) }

    pub rule formula() -> Formula = precedence!{
        q:("EXISTS" { Quantifier::Exists } / "FORALL" { Quantifier::Forall }) __
            vars:(variable() ++ (_ "," _)) _ "." _ body:@
        { Formula::Quantified {
            quantifier: q,
            vars,
            body: Box::new(body),
          } }
        --
        x:(@) _ "OR" __ y:@ { Formula::nary_or(x, y) }
        --
        x:(@) _ "AND" __ y:@ { Formula::nary_and(x, y) }
        --
        "NOT" __ x:@ { Formula::Not(Box::new(x)) }
        --
        "TRUE" word_boundary() { Formula::Top }
        "FALSE" word_boundary() { Formula::Bottom }
        c:comparison() { c }
        "(" _ f:formula() _ ")" { f }
    }

    pub rule formula_only() -> Formula
    = _ f:formula() _ { f }

    rule spanned<T>(e: rule<T>) -> Spanned<T>
    = start:position!() x:e() end:position!()
      { Spanned { x, span: Span { start, end } } }

    rule place_decl() -> Vec<Spanned<String>>
    = "PLACE" __ places:(spanned(<ident()>) ** (_ "," _)) _ ";" { places }

    rule marking_entry() -> (Spanned<String>, i64)
    = p:spanned(<ident()>) _ ":" _ color:int() { (p, color) }

    rule marking_decl() -> Vec<(Spanned<String>, i64)>
    = "MARKING" __ entries:(marking_entry() ** (_ "," _)) _ ";" { entries }

    rule arc() -> Arc
    = p:spanned(<ident()>) _ ":" _ v:variable() { (p, v) }

    rule arcs() -> Vec<Arc>
    = arcs:(arc() ** (_ "," _)) _ ";" { arcs }

    rule transition() -> TransitionDecl
    = "TRANSITION" __ name:spanned(<ident()>) _
      guard:("GUARD" __ f:formula() _ { f })?
      "CONSUME" __ consume:arcs() _
      "PRODUCE" __ produce:arcs()
    { TransitionDecl {
        name,
        guard: guard.unwrap_or(Formula::Top),
        consume,
        produce,
    } }

    rule net0() -> NetDecl
    = _ places:place_decl() _ marking:marking_decl()? _
      transitions:(transition() ** _) _
    { NetDecl {
        places,
        marking: marking.unwrap_or_default(),
        transitions,
    } }

    pub rule net() -> NetDecl = traced(<net0()>)

    // wrap a rule with tracing support, gated under the trace feature
    rule traced<T>(e: rule<T>) -> T =
        &(input:$([_]*) {
            #[cfg(feature = "trace")]
            println!("[PEG_INPUT_START]\n{}\n[PEG_TRACE_START]", input);
        })
        e:e()? {?
            #[cfg(feature = "trace")]
            println!("[PEG_TRACE_STOP]");
            e.ok_or("")
        }
}
}

#[derive(Error, Debug)]
pub enum HlLolaError {
    #[error("could not parse net: expected {}", .0.expected)]
    Parse(ParseError<LineCol>),
    #[error("{error}")]
    Net { error: NetError, span: Span },
}

impl HlLolaError {
    pub fn diagnostic<FileId>(&self, file_id: FileId) -> Diagnostic<FileId> {
        match self {
            HlLolaError::Parse(e) => Diagnostic::error()
                .with_message("could not parse file")
                .with_labels(vec![Label::primary(
                    file_id,
                    e.location.offset..e.location.offset + 1,
                )
                .with_message(format!("expected {}", e.expected))]),
            HlLolaError::Net { error, span } => Diagnostic::error()
                .with_message("invalid net")
                .with_labels(vec![
                    Label::primary(file_id, span.start..span.end).with_message(error.to_string())
                ]),
        }
    }
}

fn net_error(span: Span) -> impl FnOnce(NetError) -> HlLolaError {
    move |error| HlLolaError::Net { error, span }
}

fn arcs(b: &NetBuilder, arcs: Vec<Arc>) -> Result<Vec<(PlaceId, Variable)>, HlLolaError> {
    arcs.into_iter()
        .map(|(p, v)| Ok((b.place_id(&p.x).map_err(net_error(p.span))?, v)))
        .collect()
}

fn build(decl: NetDecl) -> Result<Net, HlLolaError> {
    let mut b = NetBuilder::new();
    for p in decl.places {
        b.place(p.x).map_err(net_error(p.span))?;
    }
    for (p, color) in decl.marking {
        let id = b.place_id(&p.x).map_err(net_error(p.span))?;
        b.mark(id, color).map_err(net_error(p.span))?;
    }
    for t in decl.transitions {
        let consume = arcs(&b, t.consume)?;
        let produce = arcs(&b, t.produce)?;
        b.transition(t.name.x, t.guard, consume, produce)
            .map_err(net_error(t.name.span))?;
    }
    Ok(b.build())
}

/// Parse a net, reporting a human-readable error on failure.
pub fn parse(s: &str) -> Result<Net, HlLolaError> {
    let decl = parser::net(s).map_err(HlLolaError::Parse)?;
    build(decl)
}

/// Parse a single guard formula.
pub fn parse_formula(s: &str) -> Result<Formula, ParseError<LineCol>> {
    parser::formula_only(s)
}

#[cfg(test)]
mod tests {
    use super::parser::*;
    use super::{parse, parse_formula, HlLolaError};
    use crate::logic::{CmpOp, Expr, Formula};
    use crate::net::NetError;

    #[test]
    fn test_ident() {
        assert_eq!(ident("hello"), Ok("hello".to_string()));
        assert_eq!(ident("p_1"), Ok("p_1".to_string()));
        assert_eq!(ident("ORDER"), Ok("ORDER".to_string()));
        assert!(ident("1up").is_err());
        assert!(ident("AND").is_err());
    }

    #[test]
    fn test_expr() {
        assert_eq!(expr("-3"), Ok(Expr::Const(-3)));
        assert_eq!(expr("1 + 2 * x").unwrap().to_string(), "1 + 2 * x");
        assert_eq!(expr("(1 + 2) * x").unwrap().to_string(), "(1 + 2) * x");
        assert_eq!(expr("a - b - c"), expr("(a - b) - c"));
        assert_eq!(expr("-(x % 2)").unwrap().to_string(), "-(x % 2)");
        assert!(expr("x +").is_err());
    }

    #[test]
    fn test_formula() {
        assert_eq!(
            parse_formula(" x > 0 ").unwrap(),
            Formula::cmp(CmpOp::Gt, Expr::var("x"), Expr::Const(0))
        );
        // AND binds tighter than OR
        assert_eq!(
            formula("a = 1 OR b = 1 AND c = 1"),
            formula("a = 1 OR (b = 1 AND c = 1)")
        );
        assert_eq!(
            formula("(a = 1 AND b = 1) AND c = 1"),
            formula("a = 1 AND b = 1 AND c = 1")
        );
        assert_eq!(
            formula("(x + 1) * (x + 1) > n").unwrap().to_string(),
            "(x + 1) * (x + 1) > n"
        );
        assert_eq!(formula("NOT TRUE"), Ok(Formula::Not(Box::new(Formula::Top))));
        assert_eq!(
            formula("EXISTS y . x = y + y OR x = y + y + 1")
                .unwrap()
                .to_string(),
            "EXISTS y . x = y + y OR x = y + y + 1"
        );
        assert!(formula("x").is_err());
        assert!(formula("TRUEISH = 1").is_ok());
    }

    #[test]
    fn test_formula_roundtrip() {
        for s in [
            "x != y AND (y < 2 OR y >= 7)",
            "NOT (a = b AND b <= c)",
            "y = x / 2 AND z = x % 2 AND w = -x",
            "FALSE OR x = -1",
        ] {
            let f = parse_formula(s).unwrap_or_else(|e| panic!("`{s}` did not parse: {e}"));
            assert_eq!(f.to_string(), s);
            assert_eq!(parse_formula(&f.to_string()).unwrap(), f);
        }
    }

    const RESTAURANT: &str = r"
{ a small net }
PLACE waiting, tables, eating;
MARKING waiting: 2, tables: 1, eating: 0;

TRANSITION seat
  GUARD w > 0 AND f > 0 AND w2 = w - 1 AND f2 = f - 1 AND e2 = e + 1
  CONSUME waiting: w, tables: f, eating: e;
  PRODUCE waiting: w2, tables: f2, eating: e2;

// leaving frees a table
TRANSITION leave
  GUARD e > 0 AND e2 = e - 1 AND f2 = f + 1
  CONSUME eating: e, tables: f;
  PRODUCE eating: e2, tables: f2;

TRANSITION idle
  CONSUME ;
  PRODUCE ;
";

    #[test]
    fn test_net() {
        let net = parse(RESTAURANT).unwrap();
        assert_eq!(net.places().len(), 3);
        assert_eq!(net.transitions().len(), 3);
        assert_eq!(net.initial_marking().get(&0), Some(&2));
        let seat = net.transition_by_name("seat").unwrap();
        assert_eq!(seat.preset.len(), 3);
        assert_eq!(seat.postset[&1].name(), "f2");
        let idle = net.transition_by_name("idle").unwrap();
        assert_eq!(idle.guard, Formula::Top);
        assert!(idle.preset.is_empty());
    }

    #[test]
    fn test_net_errors() {
        let err = parse("PLACE p;\nMARKING q: 1;").unwrap_err();
        match &err {
            HlLolaError::Net { error, span } => {
                assert_eq!(error, &NetError::UnknownPlace("q".to_string()));
                assert_eq!((span.start, span.end), (17, 18));
            }
            _ => panic!("expected a net error, got {err}"),
        }

        let err = parse("PLACE p;\nTRANSITION t\nCONSUME p x;\nPRODUCE ;").unwrap_err();
        assert!(matches!(err, HlLolaError::Parse(_)));
        let diagnostic = err.diagnostic(());
        assert_eq!(diagnostic.message, "could not parse file");

        let err = parse("PLACE p, p;").unwrap_err();
        assert_eq!(err.to_string(), "place p is declared twice");
    }
}
