use thiserror::Error;

/// Malformed input, rejected before any state change.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("`{combinator}` group must have at least one child")]
    EmptyGroup { combinator: String },
    #[error("`not` group must have exactly one child, found {children}")]
    NotArity { children: usize },
    #[error("operator `{operator}` requires a list comparison value")]
    ListValueRequired { operator: String },
    #[error("operator `{operator}` cannot compare against a list value")]
    ScalarValueRequired { operator: String },
    #[error("justification is required to reject an approval step")]
    MissingJustification,
    #[error("verdict for booking `{booking_id}` does not require approval")]
    ApprovalNotRequired { booking_id: String },
}

/// A rule referenced data the trip context cannot supply. Contained at the
/// per-policy boundary: the orchestrator converts it to a STOP outcome so one
/// misconfigured policy cannot abort or silently pass an evaluation run.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum EvaluationError {
    #[error("unknown field path `{field}`")]
    UnknownField { field: String },
    #[error("field `{field}` has no value in this trip context")]
    MissingValue { field: String },
    #[error(
        "operator `{operator}` cannot compare {actual} field `{field}` against {expected} value"
    )]
    TypeMismatch { field: String, operator: String, actual: &'static str, expected: &'static str },
    #[error(transparent)]
    MalformedRule(#[from] ValidationError),
}
