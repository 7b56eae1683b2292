use thiserror::Error;

/// Error types for the kinfit-rs library.
#[derive(Error, Debug)]
pub enum KinFitError {
    /// Error indicating a mismatch in matrix or vector dimensions.
    #[error("Dimension mismatch: {0}")]
    DimensionMismatch(String),

    /// Error indicating a singular linear system was encountered.
    #[error("Singular linear system encountered")]
    SingularMatrix,

    /// Error indicating the optimizer failed to converge.
    #[error("Algorithm failed to converge: {0}")]
    ConvergenceFailure(String),

    /// Error for invalid parameter values or definitions.
    #[error("Invalid parameter value: {0}")]
    InvalidParameter(String),

    /// Error for parameter-related problems.
    #[error("Parameter error: {0}")]
    ParameterError(String),

    /// Error for boundary constraint violations.
    #[error("Bounds error: {0}")]
    BoundsError(String),

    /// A name that is reserved by the model builder ('V' for the volume state).
    #[error("'{0}' is a reserved name and cannot be used for a {1}")]
    ReservedName(String, &'static str),

    /// A component, state, parameter or step was declared twice.
    #[error("'{0}' is already declared in this reaction model")]
    DuplicateName(String),

    /// A rate expression or operation referenced an undeclared name.
    #[error("Unknown model variable: {0}")]
    UnknownVariable(String),

    /// A component or state is missing its rate equation.
    #[error("No ODE declared for '{0}'")]
    MissingOde(String),

    /// The model definition is incomplete or inconsistent.
    #[error("Invalid model: {0}")]
    InvalidModel(String),

    /// Error during rate-expression parsing or evaluation.
    #[error("Expression error: {0}")]
    ExpressionError(String),

    /// A measured data file violated the expected format.
    #[error("Data format error in {file} line {line}: {reason}")]
    DataFormat {
        file: String,
        line: usize,
        reason: String,
    },

    /// The ODE integrator failed (step underflow, non-finite state, ...).
    #[error("Integration failure: {0}")]
    IntegrationFailure(String),

    /// Error during function or residual evaluation.
    #[error("Function evaluation error: {0}")]
    FunctionEvaluation(String),

    /// Error during computational processing.
    #[error("Computation error: {0}")]
    ComputationError(String),

    /// Invalid input data.
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// I/O error wrapper.
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    /// JSON serialization/deserialization error.
    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),

    /// CSV read/write error.
    #[error("CSV error: {0}")]
    CsvError(#[from] csv::Error),

    /// Generic error for cases that don't fit the other categories.
    #[error("Error: {0}")]
    Other(String),
}

impl From<crate::parameters::parameter::ParameterError> for KinFitError {
    fn from(err: crate::parameters::parameter::ParameterError) -> Self {
        KinFitError::ParameterError(format!("{}", err))
    }
}

impl From<crate::expr::ExpressionError> for KinFitError {
    fn from(err: crate::expr::ExpressionError) -> Self {
        KinFitError::ExpressionError(format!("{}", err))
    }
}

/// Result type alias for kinfit-rs operations.
pub type Result<T> = std::result::Result<T, KinFitError>;

/// Extensions for converting from other error types.
impl From<String> for KinFitError {
    fn from(s: String) -> Self {
        KinFitError::Other(s)
    }
}

impl From<&str> for KinFitError {
    fn from(s: &str) -> Self {
        KinFitError::Other(s.to_string())
    }
}
