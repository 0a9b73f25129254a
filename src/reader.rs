//! Textual reader.
//!
//! Turns source text into the data the evaluator consumes: atoms, symbols and lists only.
//! Reader shorthands expand to ordinary lists, so `'x` reads as `(quote x)` and `` `x ``
//! reads as `(syntax-quote x)`. Comments run from `;` to the end of the line.

use nom::{
    IResult, Parser,
    branch::alt,
    bytes::complete::{tag, take_while, take_while1},
    character::complete::{char, digit1, multispace1, satisfy},
    combinator::{cut, not, opt, recognize, value},
    error::ErrorKind,
    multi::many0,
    sequence::{pair, preceded, terminated},
};

use crate::Error;
use crate::MAX_PARSE_DEPTH;
use crate::ast::{Atom, NumberType, Value};

/// Characters besides alphanumerics that may appear in a symbol
const SYMBOL_SPECIAL_CHARS: &str = "+-*/<>=!?_$.#&%:";

fn is_symbol_char(c: char) -> bool {
    c.is_alphanumeric() || SYMBOL_SPECIAL_CHARS.contains(c)
}

/// Valid: non-empty, no leading digit, no "-digit" prefix, no leading `#`
fn is_valid_symbol(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        None => false,
        Some(first) if first.is_ascii_digit() || first == '#' => false,
        Some('-') => !chars.next().is_some_and(|c| c.is_ascii_digit()),
        Some(_) => true,
    }
}

fn error<T>(input: &str, kind: ErrorKind) -> IResult<&str, T> {
    Err(nom::Err::Error(nom::error::Error::new(input, kind)))
}

/// Convert nom parsing errors to user-friendly messages
fn parse_error_to_message(input: &str, error: nom::Err<nom::error::Error<&str>>) -> String {
    match error {
        nom::Err::Error(e) | nom::Err::Failure(e) => {
            let position = input.len().saturating_sub(e.input.len());
            match e.code {
                ErrorKind::TooLarge => {
                    format!("Expression too deeply nested (max depth: {MAX_PARSE_DEPTH})")
                }
                ErrorKind::Char if e.input.is_empty() => "Unexpected end of input".into(),
                ErrorKind::Char => format!("Expected character at position {position}"),
                _ => {
                    if position < input.len() {
                        let remaining: String = input.chars().skip(position).take(10).collect();
                        format!("Invalid syntax near '{remaining}'")
                    } else {
                        "Unexpected end of input".into()
                    }
                }
            }
        }
        nom::Err::Incomplete(_) => "Incomplete input".into(),
    }
}

/// Whitespace and `;` line comments
fn skip_ws(input: &str) -> IResult<&str, ()> {
    value(
        (),
        many0(alt((
            multispace1,
            recognize(pair(char(';'), take_while(|c: char| c != '\n'))),
        ))),
    )
    .parse(input)
}

/// Atoms must not run straight into symbol characters: `123abc` is not a number
fn atom_end(input: &str) -> IResult<&str, ()> {
    not(satisfy(is_symbol_char)).parse(input)
}

fn parse_number(input: &str) -> IResult<&str, Value> {
    terminated(alt((parse_hexadecimal, parse_decimal)), atom_end).parse(input)
}

fn parse_decimal(input: &str) -> IResult<&str, Value> {
    let (rest, text) = recognize(pair(opt(char('-')), digit1)).parse(input)?;
    match text.parse::<NumberType>() {
        Ok(n) => Ok((rest, Value::Atom(Atom::Number(n)))),
        Err(_) => error(input, ErrorKind::Digit),
    }
}

/// `#x` or `#X` prefix
fn parse_hexadecimal(input: &str) -> IResult<&str, Value> {
    let (rest, digits) = preceded(
        pair(char('#'), alt((char('x'), char('X')))),
        take_while1(|c: char| c.is_ascii_hexdigit()),
    )
    .parse(input)?;
    match NumberType::from_str_radix(digits, 16) {
        Ok(n) => Ok((rest, Value::Atom(Atom::Number(n)))),
        Err(_) => error(input, ErrorKind::HexDigit),
    }
}

fn parse_bool(input: &str) -> IResult<&str, Value> {
    terminated(
        alt((
            value(Value::Atom(Atom::Bool(true)), tag("#t")),
            value(Value::Atom(Atom::Bool(false)), tag("#f")),
        )),
        atom_end,
    )
    .parse(input)
}

fn parse_symbol(input: &str) -> IResult<&str, Value> {
    let (rest, candidate) = take_while1(is_symbol_char).parse(input)?;
    if is_valid_symbol(candidate) {
        Ok((rest, Value::Symbol(candidate.to_owned())))
    } else {
        error(input, ErrorKind::Alpha)
    }
}

fn parse_string(input: &str) -> IResult<&str, Value> {
    let (mut remaining, _) = char('"').parse(input)?;
    let mut text = String::new();

    loop {
        let mut chars = remaining.chars();
        match chars.next() {
            Some('"') => {
                return Ok((chars.as_str(), Value::Atom(Atom::String(text))));
            }
            Some('\\') => {
                match chars.next() {
                    Some('n') => text.push('\n'),
                    Some('t') => text.push('\t'),
                    Some('r') => text.push('\r'),
                    Some('\\') => text.push('\\'),
                    Some('"') => text.push('"'),
                    // unknown escape, or backslash at end of input
                    _ => return error(remaining, ErrorKind::Escaped),
                }
                remaining = chars.as_str();
            }
            Some(ch) => {
                text.push(ch);
                remaining = chars.as_str();
            }
            None => return error(remaining, ErrorKind::Char),
        }
    }
}

/// Nested lists and quote shorthands count towards the depth limit
fn check_depth(input: &str, depth: usize) -> IResult<&str, ()> {
    if depth >= MAX_PARSE_DEPTH {
        // Failure, so the enclosing alternatives do not swallow it
        return Err(nom::Err::Failure(nom::error::Error::new(
            input,
            ErrorKind::TooLarge,
        )));
    }
    Ok((input, ()))
}

fn parse_list(input: &str, depth: usize) -> IResult<&str, Value> {
    let (input, _) = char('(').parse(input)?;
    let (input, _) = check_depth(input, depth)?;
    let (input, elements) = many0(|input| parse_sexpr(input, depth + 1)).parse(input)?;
    let (input, _) = cut(preceded(skip_ws, char(')'))).parse(input)?;
    Ok((input, Value::List(elements)))
}

/// `'expr` and `` `expr `` shorthands
fn parse_quoted(input: &str, depth: usize) -> IResult<&str, Value> {
    let (input, form) = alt((
        value("quote", char('\'')),
        value("syntax-quote", char('`')),
    ))
    .parse(input)?;
    let (input, _) = check_depth(input, depth)?;
    let (input, expr) = parse_sexpr(input, depth + 1)?;
    Ok((input, Value::List(vec![Value::Symbol(form.to_owned()), expr])))
}

fn parse_sexpr(input: &str, depth: usize) -> IResult<&str, Value> {
    preceded(
        skip_ws,
        alt((
            |input| parse_quoted(input, depth),
            |input| parse_list(input, depth),
            parse_number,
            parse_bool,
            parse_string,
            parse_symbol,
        )),
    )
    .parse(input)
}

/// Parse exactly one expression; only whitespace and comments may surround it
pub fn parse_expression(input: &str) -> Result<Value, Error> {
    match terminated(|input| parse_sexpr(input, 0), skip_ws).parse(input) {
        Ok(("", expr)) => Ok(expr),
        Ok((remaining, _)) => Err(Error::ParseError(format!(
            "Unexpected remaining input: '{remaining}'"
        ))),
        Err(e) => Err(Error::ParseError(parse_error_to_message(input, e))),
    }
}

/// Parse a sequence of zero or more top-level expressions
pub fn parse_program(input: &str) -> Result<Vec<Value>, Error> {
    match terminated(many0(|input| parse_sexpr(input, 0)), skip_ws).parse(input) {
        Ok(("", exprs)) => Ok(exprs),
        Ok((remaining, _)) => {
            // Re-parse the offending expression for a precise message
            let err = parse_expression(remaining).err().unwrap_or_else(|| {
                Error::ParseError(format!("Unexpected remaining input: '{remaining}'"))
            });
            Err(err)
        }
        Err(e) => Err(Error::ParseError(parse_error_to_message(input, e))),
    }
}

#[cfg(test)]
#[expect(clippy::unwrap_used)] // test code OK
mod tests {
    use super::*;
    use crate::ast::{nil, sym, val};

    /// Test result variants for parsing tests
    #[derive(Debug)]
    enum ParseTestResult {
        Success(Value),              // Parsing should succeed with this value
        SpecificError(&'static str), // Parsing should fail with error containing this string
        Error,                       // Parsing should fail (any error)
    }
    use ParseTestResult::*;

    fn success<T: Into<Value>>(value: T) -> ParseTestResult {
        Success(value.into())
    }

    /// Run parse tests, checking that successful results display back to re-readable text
    fn run_parse_tests(test_cases: Vec<(&str, ParseTestResult)>) {
        for (i, (input, expected)) in test_cases.iter().enumerate() {
            let test_id = format!("Parse test #{} `{input}`", i + 1);

            match (parse_expression(input), expected) {
                (Ok(actual), Success(expected_val)) => {
                    assert_eq!(actual, *expected_val, "{test_id}: value mismatch");

                    let displayed = format!("{actual}");
                    let reparsed = parse_expression(&displayed).unwrap_or_else(|e| {
                        panic!("{test_id}: round-trip parse failed for '{displayed}': {e:?}")
                    });
                    assert_eq!(reparsed, actual, "{test_id}: round-trip mismatch");
                }
                (Err(_), Error) => {}
                (Err(err), SpecificError(text)) => {
                    let msg = format!("{err}");
                    assert!(
                        msg.contains(text),
                        "{test_id}: error '{msg}' should contain '{text}'"
                    );
                }
                (Ok(actual), _) => panic!("{test_id}: expected error, got {actual:?}"),
                (Err(err), Success(_)) => panic!("{test_id}: expected success, got {err:?}"),
            }
        }
    }

    #[test]
    #[expect(clippy::too_many_lines)] // Comprehensive test coverage is intentionally thorough
    fn test_parser_comprehensive() {
        run_parse_tests(vec![
            // ===== NUMBERS =====
            ("42", success(42)),
            ("-5", success(-5)),
            ("0", success(0)),
            ("#x1A", success(26)),
            ("#Xff", success(255)),
            ("9223372036854775807", success(i64::MAX)),
            ("-9223372036854775808", success(i64::MIN)),
            ("3.14", Error),
            ("#x", Error),
            ("#xG", Error),
            ("123abc", Error),
            ("99999999999999999999", Error),
            // ===== SYMBOLS =====
            ("foo", success(sym("foo"))),
            ("+", success(sym("+"))),
            ("-", success(sym("-"))),
            ("-abc", success(sym("-abc"))),
            ("nil?", success(sym("nil?"))),
            ("let*", success(sym("let*"))),
            ("bob#", success(sym("bob#"))),
            (".", success(sym("."))),
            ("λ", success(sym("λ"))),
            ("G__syntax_quote_id", success(sym("G__syntax_quote_id"))),
            ("a:b%c&d", success(sym("a:b%c&d"))),
            ("123var", Error),
            ("-42name", Error),
            ("test@home", Error),
            ("#tag", Error),
            // ===== BOOLEANS =====
            ("#t", success(true)),
            ("#f", success(false)),
            ("#T", Error),
            ("#true", Error),
            // ===== STRINGS =====
            ("\"hello world\"", success("hello world")),
            (r#""line\nbreak""#, success("line\nbreak")),
            (r#""quote\"inside""#, success("quote\"inside")),
            (r#""back\\slash""#, success("back\\slash")),
            ("\"\"", success("")),
            (r#""bad\zescape""#, Error),
            (r#""unterminated"#, Error),
            // ===== LISTS =====
            ("()", success(Value::List(vec![]))),
            ("(42)", success([42])),
            (
                "(1 hello \"world\" #t)",
                success(vec![val(1), sym("hello"), val("world"), val(true)]),
            ),
            (
                "(lambda (x . rest) rest)",
                success(vec![
                    sym("lambda"),
                    val(vec![sym("x"), sym("."), sym("rest")]),
                    sym("rest"),
                ]),
            ),
            ("(a(b))", success(vec![sym("a"), val(vec![sym("b")])])),
            ("  ( 1   2 )  ", success([1, 2])),
            ("(1a)", Error),
            ("(1 2", SpecificError("end of input")),
            ("1 2)", SpecificError("Unexpected remaining input")),
            (")", Error),
            ("", SpecificError("end of input")),
            // ===== SHORTHANDS =====
            ("'foo", success(vec![sym("quote"), sym("foo")])),
            ("'()", success(vec![sym("quote"), Value::List(vec![])])),
            (
                "`(a# b)",
                success(vec![
                    sym("syntax-quote"),
                    val(vec![sym("a#"), sym("b")]),
                ]),
            ),
            ("''x", success(vec![sym("quote"), val(vec![sym("quote"), sym("x")])])),
            ("'", Error),
            // ===== COMMENTS =====
            ("; leading\n42", success(42)),
            ("(1 ; inner\n 2)", success([1, 2])),
            ("x ; trailing", success(sym("x"))),
        ]);
    }

    #[test]
    fn test_nesting_depth_limit() {
        let nested = |levels: usize| format!("{}{}", "(".repeat(levels), ")".repeat(levels));

        let expected = (1..10).fold(Value::List(vec![]), |inner, _| Value::List(vec![inner]));
        assert_eq!(parse_expression(&nested(10)).unwrap(), expected);

        let err = parse_expression(&nested(MAX_PARSE_DEPTH + 1)).unwrap_err();
        assert!(
            err.to_string().contains("too deeply nested"),
            "unexpected error: {err}"
        );
        assert!(parse_program(&nested(MAX_PARSE_DEPTH + 1)).is_err());
    }

    #[test]
    fn test_parse_program() {
        let program = parse_program(
            "; define then call
             (define (sq x) (* x x))
             (sq 4)",
        )
        .unwrap();
        assert_eq!(program.len(), 2);
        assert_eq!(program[1], val(vec![sym("sq"), val(4)]));

        assert_eq!(parse_program("").unwrap(), vec![]);
        assert_eq!(parse_program("  ; only a comment\n").unwrap(), vec![]);
        assert_eq!(parse_program("1 #t nil").unwrap(), vec![val(1), val(true), sym("nil")]);
    }

    #[test]
    fn test_parse_program_errors() {
        for input in ["(+ 1", "1 )", "(1 2) \"open"] {
            assert!(
                matches!(parse_program(input), Err(crate::Error::ParseError(_))),
                "`{input}` should not parse"
            );
        }
    }

    #[test]
    fn test_reader_produces_data_only() {
        let expr = parse_expression("(if #t 'yes nil)").unwrap();
        assert_eq!(
            expr,
            val(vec![
                sym("if"),
                val(true),
                val(vec![sym("quote"), sym("yes")]),
                sym("nil"),
            ])
        );
        assert_ne!(expr, nil());
    }
}
