//! Parser for the textual formula notation.
//!
//! Recursive descent over the preview notation used when formulas are
//! written by hand, e.g.
//!
//! ```text
//! Wenn_Dann(Grp_Sum(lineA, -lineB, -lineC), '>', 0, Grp_Sum(lineA, -lineB, -lineC), 0)
//! ```
//!
//! - `name` is a series reference, `-name` scales it by -1
//! - `name * 0.98` and `0.98 * name` carry an explicit scaling factor
//! - comparators may be bare (`>=`) or quoted (`'>='`)
//!
//! The parser only builds the tree; arity and reference checks are done by
//! [`crate::domain::formula_builder::validate_expression`]. Nesting is capped
//! while parsing so hostile input fails instead of exhausting the stack.

use crate::domain::error::ParseError;
use crate::domain::evaluator::DEFAULT_MAX_DEPTH;
use crate::domain::expression::{Expression, FormulaFunction, Parameter};

struct Parser<'a> {
    input: &'a str,
    pos: usize,
    depth: usize,
    max_depth: usize,
}

fn is_ident_start(ch: char) -> bool {
    ch.is_alphabetic() || ch == '_'
}

fn is_ident_char(ch: char) -> bool {
    ch.is_alphanumeric() || matches!(ch, '_' | '+' | '.' | ':')
}

impl<'a> Parser<'a> {
    fn new(input: &'a str, max_depth: usize) -> Self {
        Self {
            input,
            pos: 0,
            depth: 0,
            max_depth,
        }
    }

    fn remaining(&self) -> &'a str {
        &self.input[self.pos..]
    }

    fn peek(&self) -> Option<char> {
        self.remaining().chars().next()
    }

    fn peek_second(&self) -> Option<char> {
        self.remaining().chars().nth(1)
    }

    fn advance(&mut self) -> Option<char> {
        let ch = self.peek()?;
        self.pos += ch.len_utf8();
        Some(ch)
    }

    fn skip_whitespace(&mut self) {
        while let Some(ch) = self.peek() {
            if ch.is_whitespace() {
                self.advance();
            } else {
                break;
            }
        }
    }

    fn error(&self, message: String) -> ParseError {
        ParseError {
            message,
            position: self.pos,
        }
    }

    fn found(&self) -> String {
        self.peek()
            .map(|c| format!("'{c}'"))
            .unwrap_or_else(|| "end of input".to_string())
    }

    fn expect_char(&mut self, expected: char) -> Result<(), ParseError> {
        self.skip_whitespace();
        match self.peek() {
            Some(ch) if ch == expected => {
                self.advance();
                Ok(())
            }
            _ => Err(self.error(format!("expected '{}', found {}", expected, self.found()))),
        }
    }

    fn parse_ident(&mut self) -> Result<String, ParseError> {
        self.skip_whitespace();
        match self.peek() {
            Some(ch) if is_ident_start(ch) => {}
            _ => return Err(self.error(format!("expected name, found {}", self.found()))),
        }
        let start = self.pos;
        while let Some(ch) = self.peek() {
            if is_ident_char(ch) {
                self.advance();
            } else {
                break;
            }
        }
        Ok(self.input[start..self.pos].to_string())
    }

    fn parse_number(&mut self) -> Result<f64, ParseError> {
        self.skip_whitespace();
        let start = self.pos;
        let mut has_dot = false;
        let mut digits = 0;

        if self.peek() == Some('-') {
            self.advance();
        }

        while let Some(ch) = self.peek() {
            if ch.is_ascii_digit() {
                digits += 1;
                self.advance();
            } else if ch == '.' && !has_dot {
                has_dot = true;
                self.advance();
            } else {
                break;
            }
        }

        if digits == 0 {
            return Err(ParseError {
                message: "expected number".to_string(),
                position: start,
            });
        }

        let num_str = &self.input[start..self.pos];
        num_str.parse::<f64>().map_err(|_| ParseError {
            message: format!("invalid number: {}", num_str),
            position: start,
        })
    }

    /// Optional `* <number>` suffix after a series name.
    fn parse_scale_suffix(&mut self) -> Result<f64, ParseError> {
        self.skip_whitespace();
        if self.peek() == Some('*') {
            self.advance();
            self.parse_number()
        } else {
            Ok(1.0)
        }
    }

    fn parse_operator(&mut self) -> Result<Parameter, ParseError> {
        self.skip_whitespace();
        let quote = match self.peek() {
            Some(q @ ('\'' | '"')) => {
                self.advance();
                Some(q)
            }
            _ => None,
        };

        let start = self.pos;
        while let Some(ch) = self.peek() {
            if matches!(ch, '>' | '<' | '=' | '!') {
                self.advance();
            } else {
                break;
            }
        }
        if self.pos == start {
            return Err(self.error(format!("expected comparator, found {}", self.found())));
        }
        let symbol = self.input[start..self.pos].to_string();

        if let Some(q) = quote {
            if self.peek() != Some(q) {
                return Err(self.error(format!("unterminated comparator, expected {q}")));
            }
            self.advance();
        }
        Ok(Parameter::OperatorToken(symbol))
    }

    fn parse_parameter(&mut self) -> Result<Parameter, ParseError> {
        self.skip_whitespace();
        let start = self.pos;

        match self.peek() {
            Some('\'' | '"' | '>' | '<' | '=' | '!') => self.parse_operator(),
            Some('-') if self.peek_second().is_some_and(is_ident_start) => {
                self.advance();
                let name = self.parse_ident()?;
                let scale = self.parse_scale_suffix()?;
                Ok(Parameter::scaled(name, -scale))
            }
            Some(ch) if ch == '-' || ch == '.' || ch.is_ascii_digit() => {
                let value = self.parse_number()?;
                self.skip_whitespace();
                if self.peek() == Some('*') {
                    self.advance();
                    let name = self.parse_ident()?;
                    Ok(Parameter::scaled(name, value))
                } else {
                    Ok(Parameter::Constant(value))
                }
            }
            Some(ch) if is_ident_start(ch) => {
                let name = self.parse_ident()?;
                self.skip_whitespace();
                if self.peek() == Some('(') {
                    self.pos = start;
                    return Ok(Parameter::nested(self.parse_expression()?));
                }
                let scale = self.parse_scale_suffix()?;
                Ok(Parameter::scaled(name, scale))
            }
            _ => Err(self.error(format!("expected parameter, found {}", self.found()))),
        }
    }

    fn parse_expression(&mut self) -> Result<Expression, ParseError> {
        if self.depth >= self.max_depth {
            return Err(self.error(format!(
                "expression nesting exceeds maximum depth {}",
                self.max_depth
            )));
        }
        self.depth += 1;
        let expr = self.parse_call()?;
        self.depth -= 1;
        Ok(expr)
    }

    fn parse_call(&mut self) -> Result<Expression, ParseError> {
        let name = self.parse_ident()?;
        self.expect_char('(')?;

        let mut parameters = Vec::new();
        self.skip_whitespace();
        if self.peek() == Some(')') {
            self.advance();
            return Ok(Expression::new(FormulaFunction::from_name(&name), parameters));
        }

        parameters.push(self.parse_parameter()?);
        loop {
            self.skip_whitespace();
            if self.peek() == Some(')') {
                self.advance();
                break;
            }
            self.expect_char(',')?;
            parameters.push(self.parse_parameter()?);
        }

        Ok(Expression::new(FormulaFunction::from_name(&name), parameters))
    }

    fn parse(&mut self) -> Result<Expression, ParseError> {
        let expr = self.parse_expression()?;
        self.skip_whitespace();
        if self.pos < self.input.len() {
            return Err(ParseError {
                message: format!("unexpected input after expression: '{}'", self.remaining()),
                position: self.pos,
            });
        }
        Ok(expr)
    }
}

pub fn parse(input: &str) -> Result<Expression, ParseError> {
    parse_with_max_depth(input, DEFAULT_MAX_DEPTH)
}

/// Like [`parse`] with a caller-chosen nesting ceiling; the outermost call
/// counts as depth 1.
pub fn parse_with_max_depth(input: &str, max_depth: usize) -> Result<Expression, ParseError> {
    let mut parser = Parser::new(input, max_depth);
    parser.parse()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::expression::Comparator;

    #[test]
    fn parse_grp_sum_with_scaling() {
        let expr = parse("Grp_Sum(lineA, -lineB, production * 0.98, 0.5 * lineC)").unwrap();
        assert_eq!(expr.function, FormulaFunction::GrpSum);
        assert_eq!(
            expr.parameters,
            vec![
                Parameter::series("lineA"),
                Parameter::scaled("lineB", -1.0),
                Parameter::scaled("production", 0.98),
                Parameter::scaled("lineC", 0.5),
            ]
        );
    }

    #[test]
    fn parse_conditional_with_quoted_and_bare_operators() {
        let quoted = parse("Wenn_Dann(a, '>=', 0, a, 0)").unwrap();
        let bare = parse("Wenn_Dann(a, >=, 0, a, 0)").unwrap();
        assert_eq!(quoted, bare);
        assert_eq!(
            quoted.parameters[1],
            Parameter::operator(Comparator::GreaterOrEqual)
        );
    }

    #[test]
    fn parse_negative_constant() {
        let expr = parse("Quer_Min(-1.5, a)").unwrap();
        assert_eq!(expr.parameters[0], Parameter::Constant(-1.5));
    }

    #[test]
    fn parse_nested_expressions() {
        let expr = parse(
            "Quer_Max(Anteil_Groesser_Als(TS1, 50), Anteil_Kleiner_Als(TS2, 200))",
        )
        .unwrap();
        assert_eq!(expr.function, FormulaFunction::QuerMax);
        match &expr.parameters[1] {
            Parameter::Expression(inner) => {
                assert_eq!(inner.function, FormulaFunction::AnteilKleinerAls);
                assert_eq!(inner.parameters[1], Parameter::Constant(200.0));
            }
            other => panic!("expected nested expression, got {other:?}"),
        }
    }

    #[test]
    fn parse_unknown_function_is_kept() {
        let expr = parse("Conv_RKMG(a)").unwrap();
        assert_eq!(expr.function, FormulaFunction::Unknown("Conv_RKMG".into()));
    }

    #[test]
    fn parse_empty_parameter_list() {
        let expr = parse("Quer_Max()").unwrap();
        assert!(expr.parameters.is_empty());
    }

    #[test]
    fn display_output_parses_back() {
        let text = "Wenn_Dann(Grp_Sum(lineA, -lineB, -lineC), '>', 0, Grp_Sum(lineA, -lineB, -lineC), 0)";
        let expr = parse(text).unwrap();
        assert_eq!(expr.to_string(), text);
        assert_eq!(parse(&expr.to_string()).unwrap(), expr);
    }

    #[test]
    fn error_missing_paren() {
        let err = parse("Grp_Sum(a, b").unwrap_err();
        assert!(err.message.contains("expected ','"));
        assert_eq!(err.position, 12);
    }

    #[test]
    fn error_trailing_input() {
        let err = parse("Grp_Sum(a) extra").unwrap_err();
        assert!(err.message.contains("unexpected input"));
        assert_eq!(err.position, 11);
    }

    #[test]
    fn error_unterminated_comparator() {
        let err = parse("Wenn_Dann(a, '>, 0, a, 0)").unwrap_err();
        assert!(err.message.contains("unterminated"));
    }

    #[test]
    fn error_not_an_expression() {
        let err = parse("42").unwrap_err();
        assert_eq!(err.position, 0);
        assert!(err.message.contains("expected name"));
    }

    #[test]
    fn error_scale_without_number() {
        assert!(parse("Grp_Sum(a * b)").is_err());
    }

    fn nested_sums(levels: usize) -> String {
        format!("{}1{}", "Grp_Sum(".repeat(levels), ")".repeat(levels))
    }

    #[test]
    fn nesting_up_to_the_ceiling_parses() {
        let expr = parse_with_max_depth(&nested_sums(5), 5).unwrap();
        assert_eq!(expr.depth(), 5);
        assert!(parse(&nested_sums(DEFAULT_MAX_DEPTH)).is_ok());
    }

    #[test]
    fn nesting_past_the_ceiling_fails() {
        let err = parse_with_max_depth(&nested_sums(6), 5).unwrap_err();
        assert!(err.message.contains("maximum depth 5"));
        assert_eq!(err.position, "Grp_Sum(".len() * 5);
    }

    #[test]
    fn very_deep_input_fails_without_overflowing() {
        let err = parse(&nested_sums(200_000)).unwrap_err();
        assert!(err.message.contains("maximum depth"));
    }
}
