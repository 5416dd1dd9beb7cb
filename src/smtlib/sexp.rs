// Copyright 2022-2023 VMware, Inc.
// SPDX-License-Identifier: BSD-2-Clause

//! S-expressions exchanged with the solver.
//!
//! Only the lexical classes the unfolder needs are distinguished: numerals,
//! symbols (keywords included), string literals and lists. Comments in solver
//! output are skipped.

use std::fmt;

use peg::str::LineCol;

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub enum Sexp {
    /// A numeral. SMT-LIB has no negative numerals; `-3` is `(- 3)`.
    Num(u64),
    Symbol(String),
    Str(String),
    List(Vec<Sexp>),
}

pub fn symbol<S: Into<String>>(s: S) -> Sexp {
    Sexp::Symbol(s.into())
}

/// An integer constant, negated with `-` when below zero.
pub fn int(i: i64) -> Sexp {
    let num = Sexp::Num(i.unsigned_abs());
    if i < 0 {
        app("-", [num])
    } else {
        num
    }
}

pub fn list<I: IntoIterator<Item = Sexp>>(ss: I) -> Sexp {
    Sexp::List(ss.into_iter().collect())
}

/// `(head args..)`
pub fn app<I: IntoIterator<Item = Sexp>>(head: &str, args: I) -> Sexp {
    Sexp::List([symbol(head)].into_iter().chain(args).collect())
}

fn is_simple_symbol(s: &str) -> bool {
    let special = |c: char| "~!@$%^&*_-+=<>.?/:".contains(c);
    !s.is_empty()
        && !s.starts_with(|c: char| c.is_ascii_digit())
        && s.chars().all(|c| c.is_ascii_alphanumeric() || special(c))
}

impl fmt::Display for Sexp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Sexp::Num(n) => write!(f, "{n}"),
            Sexp::Symbol(s) if is_simple_symbol(s) => write!(f, "{s}"),
            Sexp::Symbol(s) => write!(f, "|{s}|"),
            Sexp::Str(s) => write!(f, "\"{}\"", s.replace('"', "\"\"")),
            Sexp::List(ss) => {
                write!(f, "(")?;
                for (i, s) in ss.iter().enumerate() {
                    if i > 0 {
                        write!(f, " ")?;
                    }
                    write!(f, "{s}")?;
                }
                write!(f, ")")
            }
        }
    }
}

impl Sexp {
    pub fn as_list(&self) -> Option<&[Sexp]> {
        match self {
            Sexp::List(ss) => Some(ss),
            _ => None,
        }
    }

    pub fn as_symbol(&self) -> Option<&str> {
        match self {
            Sexp::Symbol(s) => Some(s),
            _ => None,
        }
    }

    /// The text of a string literal or symbol, as solvers use either for
    /// messages.
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Sexp::Symbol(s) | Sexp::Str(s) => Some(s),
            _ => None,
        }
    }

    /// Read an integer value as printed in a model: a numeral or `(- n)`.
    pub fn as_int(&self) -> Option<i64> {
        match self {
            Sexp::Num(n) => i64::try_from(*n).ok(),
            Sexp::List(ss) => match ss.as_slice() {
                [minus, n] if minus.as_symbol() == Some("-") => n.as_int().map(|n| -n),
                _ => None,
            },
            _ => None,
        }
    }

    /// Split `(head args..)` into the head symbol and the arguments.
    pub fn as_app(&self) -> Option<(&str, &[Sexp])> {
        let (head, args) = self.as_list()?.split_first()?;
        Some((head.as_symbol()?, args))
    }
}

peg::parser! {
grammar parser() for str {
    rule comment() = ";" [^'\n']*
    rule _ = quiet!{ ([' ' | '\t' | '\n' | '\r'] / comment())* }

    rule symbol_char() = ['a'..='z' | 'A'..='Z' | '0'..='9' | '~' | '!' | '@' | '$' | '%' | '^' |
                          '&' | '*' | '_' | '-' | '+' | '=' | '<' | '>' | '.' | '?' | '/' | ':' | '\'']

    rule num() -> Sexp
    = n:$(['0'..='9']+) !symbol_char() {? n.parse().map(Sexp::Num).or(Err("numeral")) }

    rule simple_symbol() -> Sexp
    = s:$(symbol_char()+) { Sexp::Symbol(s.to_string()) }

    rule quoted_symbol() -> Sexp
    = "|" s:$([^'|']*) "|" { Sexp::Symbol(s.to_string()) }

    rule string() -> Sexp
    = "\"" parts:($([^'"']*) ** "\"\"") "\"" { Sexp::Str(parts.join("\"")) }

    rule list() -> Sexp
    = "(" _ ss:(sexp() ** _) _ ")" { Sexp::List(ss) }

    rule sexp() -> Sexp
    = quiet!{ num() / simple_symbol() / quoted_symbol() / string() / list() } / expected!("s-expression")

    pub(super) rule one() -> Sexp
    = _ s:sexp() _ { s }

    pub(super) rule many() -> Vec<Sexp>
    = _ ss:(sexp() ** _) _ { ss }
}
}

/// Parse one s-expression, surrounded by optional whitespace.
pub fn parse(s: &str) -> Result<Sexp, peg::error::ParseError<LineCol>> {
    parser::one(s)
}

/// Parse a whitespace-separated sequence of s-expressions.
pub fn parse_many(s: &str) -> Result<Vec<Sexp>, peg::error::ParseError<LineCol>> {
    parser::many(s)
}

#[cfg(test)]
mod tests {
    use super::{app, int, list, parse, parse_many, symbol, Sexp};

    #[test]
    fn test_parse_query() {
        assert_eq!(
            parse("(assert (> x@3  (- 2)))"),
            Ok(app("assert", [app(">", [symbol("x@3"), int(-2)])]))
        );
        assert_eq!(parse(" ( ) "), Ok(list([])));
        assert!(parse("(unbalanced").is_err());
    }

    #[test]
    fn test_printing() {
        let e = app(
            "exists",
            [
                list([app("x'", [symbol("Int")])]),
                app("=", [symbol("x'"), int(-7)]),
            ],
        );
        insta::assert_display_snapshot!(e, @"(exists ((|x'| Int)) (= |x'| (- 7)))");
        insta::assert_display_snapshot!(
            app("echo", [Sexp::Str("say \"hi\"".to_string())]),
            @r###"(echo "say ""hi""")"###
        );
        assert_eq!(parse(&e.to_string()), Ok(e));
    }

    #[test]
    fn test_model_values() {
        let values = parse("((x 3) (|y@2| (- 4)) ; trailing comment\n (z 0))").unwrap();
        let pairs = values
            .as_list()
            .unwrap()
            .iter()
            .map(|pair| match pair.as_list().unwrap() {
                [name, value] => (name.as_symbol().unwrap(), value.as_int()),
                _ => panic!("not a pair: {pair}"),
            })
            .collect::<Vec<_>>();
        assert_eq!(pairs, vec![("x", Some(3)), ("y@2", Some(-4)), ("z", Some(0))]);
        assert_eq!(symbol("true").as_int(), None);
    }

    #[test]
    fn test_solver_messages() {
        let sexps = parse_many("(error \"line 3: unknown constant x\")\nsat").unwrap();
        assert_eq!(sexps.len(), 2);
        let (head, args) = sexps[0].as_app().unwrap();
        assert_eq!(head, "error");
        assert_eq!(args[0].as_text(), Some("line 3: unknown constant x"));
        assert_eq!(sexps[1], symbol("sat"));

        let info = parse("(:reason-unknown timeout)").unwrap();
        assert_eq!(info.as_app().map(|(head, _)| head), Some(":reason-unknown"));
    }
}
