//! Formula submission: document shapes and structural validation.
//!
//! Formulas arrive as JSON documents (`type`-tagged parameters). Building a
//! [`Formula`] converts the document into the typed tree and validates it
//! completely, so a malformed formula is rejected at submission instead of
//! failing part-way through a calculation.

use crate::domain::error::CalcError;
use crate::domain::evaluator::{EvalOptions, FunctionPolicy};
use crate::domain::expression::{Comparator, Expression, Formula, FormulaFunction, Parameter};
use crate::domain::interval::{default_resolution, default_unit};
use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FormulaDocument {
    pub formula_id: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub expression: ExpressionDocument,
    #[serde(default)]
    pub input_time_series: Vec<String>,
    #[serde(default = "default_unit")]
    pub output_unit: String,
    #[serde(default = "default_resolution")]
    pub output_resolution: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExpressionDocument {
    pub function: String,
    #[serde(default)]
    pub parameters: Vec<ParameterDocument>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ParameterDocument {
    #[serde(rename = "type", default = "default_parameter_type")]
    pub kind: String,
    pub value: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scaling_factor: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub obis_code: Option<String>,
}

fn default_parameter_type() -> String {
    "constant".to_string()
}

/// Batch of formulas submitted in one message.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FormulaSubmission {
    #[serde(default)]
    pub message_id: Option<String>,
    pub formulas: Vec<FormulaDocument>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidationResult {
    pub formula_id: String,
    pub valid: bool,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub errors: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmissionReport {
    pub message_id: Option<String>,
    pub status: String,
    pub formula_ids: Vec<String>,
    pub validation_results: Vec<ValidationResult>,
}

/// Build every formula of a submission. Valid formulas are returned; the
/// report lists each formula with its validation outcome.
pub fn submit(
    submission: &FormulaSubmission,
    options: &EvalOptions,
) -> (Vec<Formula>, SubmissionReport) {
    let mut accepted = Vec::new();
    let mut results = Vec::new();

    for doc in &submission.formulas {
        match build_formula(doc, options) {
            Ok(formula) => {
                results.push(ValidationResult {
                    formula_id: doc.formula_id.clone(),
                    valid: true,
                    errors: Vec::new(),
                });
                accepted.push(formula);
            }
            Err(e) => results.push(ValidationResult {
                formula_id: doc.formula_id.clone(),
                valid: false,
                errors: vec![e.to_string()],
            }),
        }
    }

    // an empty batch accepts nothing
    let status = if accepted.is_empty() {
        "REJECTED"
    } else if accepted.len() == submission.formulas.len() {
        "ACCEPTED"
    } else {
        "PARTIALLY_ACCEPTED"
    };

    let report = SubmissionReport {
        message_id: submission.message_id.clone(),
        status: status.to_string(),
        formula_ids: accepted.iter().map(|f| f.id.clone()).collect(),
        validation_results: results,
    };
    (accepted, report)
}

pub fn build_formula(doc: &FormulaDocument, options: &EvalOptions) -> Result<Formula, CalcError> {
    if doc.formula_id.trim().is_empty() {
        return Err(CalcError::InvalidFormula {
            reason: "formulaId must not be empty".into(),
        });
    }

    let expression = build_expression(&doc.expression, "$")?;
    validate_expression(&expression, &doc.input_time_series, options)?;

    for name in expression.unknown_functions() {
        tracing::warn!(
            formula = %doc.formula_id,
            function = %name,
            "unrecognised function accepted, it evaluates to 0"
        );
    }

    Ok(Formula {
        id: doc.formula_id.clone(),
        name: doc.name.clone(),
        description: doc.description.clone(),
        expression,
        input_series_names: doc.input_time_series.clone(),
        output_unit: doc.output_unit.clone(),
        output_resolution: doc.output_resolution.clone(),
        category: doc.category.clone(),
        version: doc.version.clone(),
    })
}

pub fn build_expression(doc: &ExpressionDocument, path: &str) -> Result<Expression, CalcError> {
    let parameters = doc
        .parameters
        .iter()
        .enumerate()
        .map(|(i, p)| build_parameter(p, &format!("{path}.parameters[{i}]")))
        .collect::<Result<Vec<_>, _>>()?;

    Ok(Expression {
        function: FormulaFunction::from_name(&doc.function),
        parameters,
        description: doc.description.clone(),
    })
}

fn build_parameter(doc: &ParameterDocument, path: &str) -> Result<Parameter, CalcError> {
    let invalid = |reason: String| CalcError::InvalidFormula {
        reason: format!("{path}: {reason}"),
    };

    match doc.kind.as_str() {
        "constant" => match &doc.value {
            Value::Number(n) => n
                .as_f64()
                .map(Parameter::Constant)
                .ok_or_else(|| invalid(format!("constant {n} is not representable"))),
            Value::String(s) => s
                .trim()
                .parse::<f64>()
                .map(Parameter::Constant)
                .map_err(|_| invalid(format!("constant '{s}' is not a number"))),
            other => Err(invalid(format!("constant must be a number, found {other}"))),
        },
        "timeseries_ref" | "series_ref" => match &doc.value {
            Value::String(name) => Ok(Parameter::SeriesRef {
                name: name.clone(),
                scaling_factor: doc.scaling_factor.unwrap_or(1.0),
            }),
            other => Err(invalid(format!(
                "series reference must be a name, found {other}"
            ))),
        },
        "expression" => {
            let nested: ExpressionDocument = serde_json::from_value(doc.value.clone())
                .map_err(|e| invalid(format!("nested expression is malformed: {e}")))?;
            Ok(Parameter::nested(build_expression(&nested, path)?))
        }
        "string" | "operator" | "operator_token" => match &doc.value {
            Value::String(symbol) => Ok(Parameter::OperatorToken(symbol.clone())),
            other => Err(invalid(format!("operator must be a string, found {other}"))),
        },
        other => Err(invalid(format!("unknown parameter type '{other}'"))),
    }
}

/// Check arity, parameter kinds, declared references, comparators and depth
/// of the whole tree.
pub fn validate_expression(
    expr: &Expression,
    inputs: &[String],
    options: &EvalOptions,
) -> Result<(), CalcError> {
    validate_node(expr, inputs, options, "$", 1)
}

fn validate_node(
    expr: &Expression,
    inputs: &[String],
    options: &EvalOptions,
    path: &str,
    depth: usize,
) -> Result<(), CalcError> {
    if depth > options.max_depth {
        return Err(CalcError::DepthExceeded {
            max_depth: options.max_depth,
        });
    }

    let function = expr.function.name();
    let params = &expr.parameters;

    match expr.function.arity() {
        Some(arity) if !arity.accepts(params.len()) => {
            return Err(CalcError::Arity {
                function: function.to_string(),
                path: path.to_string(),
                expected: arity.to_string(),
                found: params.len(),
            });
        }
        Some(_) => {}
        None => {
            if options.policy == FunctionPolicy::Strict {
                return Err(CalcError::UnsupportedFunction {
                    name: function.to_string(),
                    path: path.to_string(),
                });
            }
        }
    }

    let wrong_kind = |index: usize, expected: &str| CalcError::ParameterType {
        function: function.to_string(),
        path: path.to_string(),
        index,
        expected: expected.to_string(),
        found: params[index].kind().to_string(),
    };

    for (i, param) in params.iter().enumerate() {
        let is_operator = matches!(param, Parameter::OperatorToken(_));
        match (&expr.function, i) {
            (FormulaFunction::WennDann, 1) => {
                let Parameter::OperatorToken(symbol) = param else {
                    return Err(wrong_kind(i, "an operator token"));
                };
                if Comparator::from_symbol(symbol).is_none() {
                    if options.policy == FunctionPolicy::Strict {
                        return Err(CalcError::UnknownComparator {
                            symbol: symbol.clone(),
                            path: path.to_string(),
                        });
                    }
                    tracing::warn!(%path, %symbol, "unknown comparator always selects the else branch");
                }
            }
            (
                FormulaFunction::AnteilGroesserAls
                | FormulaFunction::AnteilKleinerAls
                | FormulaFunction::IMax
                | FormulaFunction::IMin,
                0,
            ) => {
                if !matches!(param, Parameter::SeriesRef { .. }) {
                    return Err(wrong_kind(i, "a series reference"));
                }
            }
            (
                FormulaFunction::AnteilGroesserAls
                | FormulaFunction::AnteilKleinerAls
                | FormulaFunction::Round,
                1,
            ) => {
                if !matches!(param, Parameter::Constant(_)) {
                    return Err(wrong_kind(i, "a constant"));
                }
            }
            (FormulaFunction::Unknown(_), _) => {}
            _ => {
                if is_operator {
                    return Err(wrong_kind(i, "a numeric parameter"));
                }
            }
        }

        let child = format!("{path}.parameters[{i}]");
        match param {
            Parameter::SeriesRef { name, .. } => {
                if !inputs.iter().any(|input| input == name) {
                    return Err(CalcError::UnknownReference {
                        name: name.clone(),
                        path: child,
                    });
                }
            }
            Parameter::Expression(inner) => {
                validate_node(inner, inputs, options, &child, depth + 1)?;
            }
            Parameter::Constant(_) | Parameter::OperatorToken(_) => {}
        }
    }
    Ok(())
}

impl From<&Parameter> for ParameterDocument {
    fn from(param: &Parameter) -> Self {
        let (value, scaling_factor) = match param {
            Parameter::Constant(v) => (serde_json::json!(v), None),
            Parameter::SeriesRef {
                name,
                scaling_factor,
            } => (Value::String(name.clone()), Some(*scaling_factor)),
            Parameter::Expression(inner) => (
                serde_json::to_value(ExpressionDocument::from(inner.as_ref()))
                    .unwrap_or(Value::Null),
                None,
            ),
            Parameter::OperatorToken(symbol) => (Value::String(symbol.clone()), None),
        };
        Self {
            kind: param.kind().to_string(),
            value,
            scaling_factor,
            name: None,
            obis_code: None,
        }
    }
}

impl From<&Expression> for ExpressionDocument {
    fn from(expr: &Expression) -> Self {
        Self {
            function: expr.function.name().to_string(),
            parameters: expr.parameters.iter().map(ParameterDocument::from).collect(),
            description: expr.description.clone(),
        }
    }
}

impl From<&Formula> for FormulaDocument {
    fn from(formula: &Formula) -> Self {
        Self {
            formula_id: formula.id.clone(),
            name: formula.name.clone(),
            description: formula.description.clone(),
            expression: ExpressionDocument::from(&formula.expression),
            input_time_series: formula.input_series_names.clone(),
            output_unit: formula.output_unit.clone(),
            output_resolution: formula.output_resolution.clone(),
            category: formula.category.clone(),
            version: formula.version.clone(),
        }
    }
}
