//! Formula expression tree.
//!
//! - `FormulaFunction`: the closed set of known functions plus `Unknown`
//! - `Comparator`: operator tokens understood by `Wenn_Dann`
//! - `Parameter`: constant, series reference, operator token or nested expression
//! - `Expression`: a function applied to its ordered parameters
//! - `Formula`: a named, immutable expression over declared input series

use std::collections::BTreeSet;
use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum FormulaFunction {
    /// `Wenn_Dann`: if-then-else over a comparison.
    WennDann,
    /// `Grp_Sum`: sum of all parameters.
    GrpSum,
    /// `Anteil_Groesser_Als`: series value if above the threshold, else 0.
    AnteilGroesserAls,
    /// `Anteil_Kleiner_Als`: series value if below the threshold, else 0.
    AnteilKleinerAls,
    /// `Quer_Max`: maximum across parameters.
    QuerMax,
    /// `Quer_Min`: minimum across parameters.
    QuerMin,
    /// `Round`: round to a number of fractional digits.
    Round,
    /// `IMax`: maximum over every interval of one series.
    IMax,
    /// `IMin`: minimum over every interval of one series.
    IMin,
    Unknown(String),
}

/// Number of parameters a function accepts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Arity {
    Exactly(usize),
    AtLeast(usize),
}

impl Arity {
    pub fn accepts(self, count: usize) -> bool {
        match self {
            Arity::Exactly(n) => count == n,
            Arity::AtLeast(n) => count >= n,
        }
    }
}

impl fmt::Display for Arity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Arity::Exactly(n) => write!(f, "{n}"),
            Arity::AtLeast(n) => write!(f, "at least {n}"),
        }
    }
}

impl FormulaFunction {
    pub fn from_name(name: &str) -> Self {
        match name {
            "Wenn_Dann" => FormulaFunction::WennDann,
            "Grp_Sum" => FormulaFunction::GrpSum,
            "Anteil_Groesser_Als" => FormulaFunction::AnteilGroesserAls,
            "Anteil_Kleiner_Als" => FormulaFunction::AnteilKleinerAls,
            "Quer_Max" => FormulaFunction::QuerMax,
            "Quer_Min" => FormulaFunction::QuerMin,
            "Round" => FormulaFunction::Round,
            "IMax" => FormulaFunction::IMax,
            "IMin" => FormulaFunction::IMin,
            other => FormulaFunction::Unknown(other.to_string()),
        }
    }

    pub fn name(&self) -> &str {
        match self {
            FormulaFunction::WennDann => "Wenn_Dann",
            FormulaFunction::GrpSum => "Grp_Sum",
            FormulaFunction::AnteilGroesserAls => "Anteil_Groesser_Als",
            FormulaFunction::AnteilKleinerAls => "Anteil_Kleiner_Als",
            FormulaFunction::QuerMax => "Quer_Max",
            FormulaFunction::QuerMin => "Quer_Min",
            FormulaFunction::Round => "Round",
            FormulaFunction::IMax => "IMax",
            FormulaFunction::IMin => "IMin",
            FormulaFunction::Unknown(name) => name,
        }
    }

    /// `None` for unknown functions, whose arity cannot be checked.
    pub fn arity(&self) -> Option<Arity> {
        match self {
            FormulaFunction::WennDann => Some(Arity::Exactly(5)),
            FormulaFunction::GrpSum | FormulaFunction::QuerMax | FormulaFunction::QuerMin => {
                Some(Arity::AtLeast(1))
            }
            FormulaFunction::AnteilGroesserAls
            | FormulaFunction::AnteilKleinerAls
            | FormulaFunction::Round => Some(Arity::Exactly(2)),
            FormulaFunction::IMax | FormulaFunction::IMin => Some(Arity::Exactly(1)),
            FormulaFunction::Unknown(_) => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Comparator {
    Greater,
    Less,
    GreaterOrEqual,
    LessOrEqual,
    Equal,
}

impl Comparator {
    pub fn from_symbol(symbol: &str) -> Option<Self> {
        match symbol.trim() {
            ">" => Some(Comparator::Greater),
            "<" => Some(Comparator::Less),
            ">=" => Some(Comparator::GreaterOrEqual),
            "<=" => Some(Comparator::LessOrEqual),
            "==" => Some(Comparator::Equal),
            _ => None,
        }
    }

    pub fn symbol(self) -> &'static str {
        match self {
            Comparator::Greater => ">",
            Comparator::Less => "<",
            Comparator::GreaterOrEqual => ">=",
            Comparator::LessOrEqual => "<=",
            Comparator::Equal => "==",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Parameter {
    Constant(f64),
    SeriesRef { name: String, scaling_factor: f64 },
    Expression(Box<Expression>),
    /// Raw symbol as submitted; only `Wenn_Dann` reads it, through
    /// [`Comparator::from_symbol`].
    OperatorToken(String),
}

impl Parameter {
    pub fn series(name: impl Into<String>) -> Self {
        Parameter::SeriesRef {
            name: name.into(),
            scaling_factor: 1.0,
        }
    }

    pub fn scaled(name: impl Into<String>, scaling_factor: f64) -> Self {
        Parameter::SeriesRef {
            name: name.into(),
            scaling_factor,
        }
    }

    pub fn operator(comparator: Comparator) -> Self {
        Parameter::OperatorToken(comparator.symbol().to_string())
    }

    pub fn nested(expression: Expression) -> Self {
        Parameter::Expression(Box::new(expression))
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Parameter::Constant(_) => "constant",
            Parameter::SeriesRef { .. } => "timeseries_ref",
            Parameter::Expression(_) => "expression",
            Parameter::OperatorToken(_) => "string",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Expression {
    pub function: FormulaFunction,
    pub parameters: Vec<Parameter>,
    pub description: Option<String>,
}

impl Expression {
    pub fn new(function: FormulaFunction, parameters: Vec<Parameter>) -> Self {
        Self {
            function,
            parameters,
            description: None,
        }
    }

    /// Every series name referenced anywhere in the tree.
    pub fn referenced_series(&self) -> BTreeSet<String> {
        let mut names = BTreeSet::new();
        self.collect_series(&mut names);
        names
    }

    fn collect_series(&self, names: &mut BTreeSet<String>) {
        for param in &self.parameters {
            match param {
                Parameter::SeriesRef { name, .. } => {
                    names.insert(name.clone());
                }
                Parameter::Expression(inner) => inner.collect_series(names),
                Parameter::Constant(_) | Parameter::OperatorToken(_) => {}
            }
        }
    }

    /// Names of unknown functions anywhere in the tree, in first-seen order.
    pub fn unknown_functions(&self) -> Vec<String> {
        let mut names = Vec::new();
        self.collect_unknown(&mut names);
        names
    }

    fn collect_unknown(&self, names: &mut Vec<String>) {
        if let FormulaFunction::Unknown(name) = &self.function {
            if !names.contains(name) {
                names.push(name.clone());
            }
        }
        for param in &self.parameters {
            if let Parameter::Expression(inner) = param {
                inner.collect_unknown(names);
            }
        }
    }

    /// Nesting depth; a node without nested expressions has depth 1.
    pub fn depth(&self) -> usize {
        1 + self
            .parameters
            .iter()
            .filter_map(|p| match p {
                Parameter::Expression(inner) => Some(inner.depth()),
                _ => None,
            })
            .max()
            .unwrap_or(0)
    }
}

impl fmt::Display for Parameter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Parameter::Constant(v) => write!(f, "{v}"),
            Parameter::SeriesRef {
                name,
                scaling_factor,
            } => {
                if *scaling_factor == 1.0 {
                    write!(f, "{name}")
                } else if *scaling_factor == -1.0 {
                    write!(f, "-{name}")
                } else {
                    write!(f, "{name} * {scaling_factor}")
                }
            }
            Parameter::Expression(inner) => write!(f, "{inner}"),
            Parameter::OperatorToken(symbol) => write!(f, "'{symbol}'"),
        }
    }
}

impl fmt::Display for Expression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}(", self.function.name())?;
        for (i, param) in self.parameters.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{param}")?;
        }
        f.write_str(")")
    }
}

/// A validated formula. Built once by [`crate::domain::formula_builder`] and
/// never mutated afterwards.
#[derive(Debug, Clone, PartialEq)]
pub struct Formula {
    pub id: String,
    pub name: String,
    pub description: Option<String>,
    pub expression: Expression,
    /// Declared inputs in submission order.
    pub input_series_names: Vec<String>,
    pub output_unit: String,
    pub output_resolution: String,
    pub category: Option<String>,
    pub version: Option<String>,
}
