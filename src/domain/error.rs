//! Domain error types.

/// A parse error with position information for the textual formula notation.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("parse error at position {position}: {message}")]
pub struct ParseError {
    pub message: String,
    pub position: usize,
}

impl ParseError {
    /// Format the error with a caret pointing at the error position in the input.
    pub fn display_with_context(&self, input: &str) -> String {
        let caret = " ".repeat(self.position) + "^";
        format!(
            "{input}\n{caret}\n{err}",
            input = input,
            caret = caret,
            err = self
        )
    }
}

/// Top-level error type for mabis-calc.
#[derive(Debug, thiserror::Error)]
pub enum CalcError {
    #[error("{function} at {path}: expected {expected} parameters, found {found}")]
    Arity {
        function: String,
        path: String,
        expected: String,
        found: usize,
    },

    #[error("{function} at {path}: parameter {index} must be {expected}, found {found}")]
    ParameterType {
        function: String,
        path: String,
        index: usize,
        expected: String,
        found: String,
    },

    #[error("series reference '{name}' at {path} is not a declared input of the formula")]
    UnknownReference { name: String, path: String },

    #[error("unsupported function '{name}' at {path}")]
    UnsupportedFunction { name: String, path: String },

    #[error("unknown comparator '{symbol}' at {path}")]
    UnknownComparator { symbol: String, path: String },

    #[error("expression nesting exceeds the maximum depth of {max_depth}")]
    DepthExceeded { max_depth: usize },

    #[error("series reference '{name}' has no bound series")]
    UnboundReference { name: String },

    #[error("index {index} is out of range for series '{name}' with {len} intervals")]
    IndexOutOfRange {
        name: String,
        index: usize,
        len: usize,
    },

    #[error("series '{name}' has {len} intervals, reference series '{reference}' has {expected}")]
    MisalignedSeries {
        name: String,
        len: usize,
        reference: String,
        expected: usize,
    },

    #[error("no reference series given for the calculation")]
    MissingReference,

    #[error("calculation cancelled before interval {position}")]
    Cancelled { position: usize },

    #[error("invalid quantity '{value}'")]
    InvalidQuantity { value: String },

    #[error("invalid series {series}: {reason}")]
    InvalidSeries { series: String, reason: String },

    #[error("invalid formula document: {reason}")]
    InvalidFormula { reason: String },

    #[error("formula {id} not found")]
    FormulaNotFound { id: String },

    #[error("time series {id} not found")]
    SeriesNotFound { id: String },

    #[error(transparent)]
    ExpressionParse(#[from] ParseError),

    #[error("config parse error in {file}: {reason}")]
    ConfigParse { file: String, reason: String },

    #[error("missing config key [{section}] {key}")]
    ConfigMissing { section: String, key: String },

    #[error("invalid config value [{section}] {key}: {reason}")]
    ConfigInvalid {
        section: String,
        key: String,
        reason: String,
    },

    #[error("storage error: {reason}")]
    Storage { reason: String },

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Csv(#[from] csv::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl CalcError {
    /// Errors describing a malformed expression tree. These are detected when a
    /// formula is built and never depend on the bound series.
    pub fn is_structural(&self) -> bool {
        matches!(
            self,
            CalcError::Arity { .. }
                | CalcError::ParameterType { .. }
                | CalcError::UnknownReference { .. }
                | CalcError::UnsupportedFunction { .. }
                | CalcError::UnknownComparator { .. }
                | CalcError::DepthExceeded { .. }
        )
    }

    /// Stable code recorded on failed calculations.
    pub fn code(&self) -> &'static str {
        match self {
            CalcError::Arity { .. }
            | CalcError::ParameterType { .. }
            | CalcError::UnknownComparator { .. }
            | CalcError::DepthExceeded { .. } => "STRUCTURAL_VALIDATION",
            CalcError::UnknownReference { .. } => "UNKNOWN_REFERENCE",
            CalcError::UnsupportedFunction { .. } => "UNSUPPORTED_FUNCTION",
            CalcError::UnboundReference { .. } => "UNBOUND_REFERENCE",
            CalcError::IndexOutOfRange { .. } => "INDEX_OUT_OF_RANGE",
            CalcError::MisalignedSeries { .. } => "MISALIGNED_SERIES",
            CalcError::MissingReference => "MISSING_REFERENCE",
            CalcError::Cancelled { .. } => "CANCELLED",
            CalcError::InvalidQuantity { .. } => "INVALID_QUANTITY",
            CalcError::InvalidSeries { .. } => "INVALID_SERIES",
            CalcError::InvalidFormula { .. } | CalcError::ExpressionParse(_) => "INVALID_FORMULA",
            CalcError::FormulaNotFound { .. } => "FORMULA_NOT_FOUND",
            CalcError::SeriesNotFound { .. } => "SERIES_NOT_FOUND",
            CalcError::ConfigParse { .. }
            | CalcError::ConfigMissing { .. }
            | CalcError::ConfigInvalid { .. } => "CONFIG_ERROR",
            CalcError::Storage { .. }
            | CalcError::Json(_)
            | CalcError::Csv(_)
            | CalcError::Io(_) => "STORAGE_ERROR",
        }
    }
}

impl From<&CalcError> for std::process::ExitCode {
    fn from(err: &CalcError) -> Self {
        let code: u8 = match err {
            CalcError::Io(_) | CalcError::Storage { .. } | CalcError::Csv(_) => 1,
            CalcError::ConfigParse { .. }
            | CalcError::ConfigMissing { .. }
            | CalcError::ConfigInvalid { .. } => 2,
            CalcError::FormulaNotFound { .. } | CalcError::SeriesNotFound { .. } => 3,
            CalcError::Arity { .. }
            | CalcError::ParameterType { .. }
            | CalcError::UnknownReference { .. }
            | CalcError::UnsupportedFunction { .. }
            | CalcError::UnknownComparator { .. }
            | CalcError::DepthExceeded { .. }
            | CalcError::InvalidFormula { .. }
            | CalcError::ExpressionParse(_)
            | CalcError::Json(_) => 4,
            CalcError::UnboundReference { .. }
            | CalcError::IndexOutOfRange { .. }
            | CalcError::MisalignedSeries { .. }
            | CalcError::MissingReference
            | CalcError::Cancelled { .. }
            | CalcError::InvalidQuantity { .. }
            | CalcError::InvalidSeries { .. } => 5,
        };
        std::process::ExitCode::from(code)
    }
}
