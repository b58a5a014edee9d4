use serde::{Deserialize, Serialize};

use crate::domain::context::{FieldValue, TripContext};
use crate::domain::policy::normalize_key;
use crate::errors::{EvaluationError, ValidationError};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ComparisonOp {
    Equals,
    NotEquals,
    LessThan,
    GreaterThan,
    LessOrEqual,
    GreaterOrEqual,
    In,
    NotIn,
    Contains,
}

impl ComparisonOp {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Equals => "equals",
            Self::NotEquals => "not_equals",
            Self::LessThan => "less_than",
            Self::GreaterThan => "greater_than",
            Self::LessOrEqual => "less_or_equal",
            Self::GreaterOrEqual => "greater_or_equal",
            Self::In => "in",
            Self::NotIn => "not_in",
            Self::Contains => "contains",
        }
    }

    /// Negative operators quantify universally over per-segment value lists;
    /// positive operators existentially.
    fn is_negative(&self) -> bool {
        matches!(self, Self::NotEquals | Self::NotIn)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Combinator {
    And,
    Or,
    Not,
}

/// Recursive boolean expression over trip-context fields. Built strictly
/// top-down from its serialized form, so the tree is acyclic by construction.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "node", rename_all = "snake_case")]
pub enum ConditionNode {
    Leaf { field: String, op: ComparisonOp, value: FieldValue },
    Group { combinator: Combinator, children: Vec<ConditionNode> },
}

/// One leaf evaluation, kept for result messages and structured details.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct LeafTrace {
    pub field: String,
    pub operator: String,
    pub expected: String,
    pub actual: String,
    pub matched: bool,
}

#[derive(Clone, Debug, PartialEq)]
pub struct RuleMatch {
    pub matched: bool,
    pub trace: Vec<LeafTrace>,
}

impl ConditionNode {
    /// Structural checks applied before a rule is accepted or evaluated.
    pub fn validate(&self) -> Result<(), ValidationError> {
        match self {
            Self::Leaf { op, value, .. } => match op {
                ComparisonOp::In | ComparisonOp::NotIn => {
                    if !matches!(value, FieldValue::List(_)) {
                        return Err(ValidationError::ListValueRequired {
                            operator: op.as_str().to_string(),
                        });
                    }
                    Ok(())
                }
                _ => {
                    if matches!(value, FieldValue::List(_)) {
                        return Err(ValidationError::ScalarValueRequired {
                            operator: op.as_str().to_string(),
                        });
                    }
                    Ok(())
                }
            },
            Self::Group { combinator: Combinator::Not, children } => {
                if children.len() != 1 {
                    return Err(ValidationError::NotArity { children: children.len() });
                }
                children[0].validate()
            }
            Self::Group { combinator, children } => {
                if children.is_empty() {
                    return Err(ValidationError::EmptyGroup {
                        combinator: format!("{combinator:?}").to_ascii_lowercase(),
                    });
                }
                children.iter().try_for_each(ConditionNode::validate)
            }
        }
    }

    /// Pure, deterministic evaluation against a trip context. Every child of a
    /// group is evaluated so a rule error always surfaces, even where
    /// short-circuiting would have skipped the offending child.
    pub fn evaluate(&self, context: &TripContext) -> Result<RuleMatch, EvaluationError> {
        match self {
            Self::Leaf { field, op, value } => {
                let actual = context.resolve(field)?;
                let matched = compare(field, &actual, *op, value)?;
                Ok(RuleMatch {
                    matched,
                    trace: vec![LeafTrace {
                        field: field.clone(),
                        operator: op.as_str().to_string(),
                        expected: value.display(),
                        actual: actual.display(),
                        matched,
                    }],
                })
            }
            Self::Group { combinator, children } => {
                if matches!(combinator, Combinator::Not) && children.len() != 1 {
                    return Err(ValidationError::NotArity { children: children.len() }.into());
                }
                if children.is_empty() {
                    return Err(ValidationError::EmptyGroup {
                        combinator: format!("{combinator:?}").to_ascii_lowercase(),
                    }
                    .into());
                }

                let mut trace = Vec::new();
                let mut results = Vec::with_capacity(children.len());
                for child in children {
                    let outcome = child.evaluate(context)?;
                    results.push(outcome.matched);
                    trace.extend(outcome.trace);
                }

                let matched = match combinator {
                    Combinator::And => results.iter().all(|matched| *matched),
                    Combinator::Or => results.iter().any(|matched| *matched),
                    Combinator::Not => !results[0],
                };
                Ok(RuleMatch { matched, trace })
            }
        }
    }
}

fn compare(
    field: &str,
    actual: &FieldValue,
    op: ComparisonOp,
    expected: &FieldValue,
) -> Result<bool, EvaluationError> {
    if let FieldValue::List(elements) = actual {
        if op != ComparisonOp::Contains {
            return compare_elements(field, elements, op, expected);
        }
    }

    match op {
        ComparisonOp::In | ComparisonOp::NotIn => {
            let FieldValue::List(options) = expected else {
                return Err(ValidationError::ListValueRequired {
                    operator: op.as_str().to_string(),
                }
                .into());
            };
            let mut found = false;
            for option in options {
                if scalar_equals(field, op, actual, option)? {
                    found = true;
                }
            }
            Ok(if op == ComparisonOp::In { found } else { !found })
        }
        ComparisonOp::Contains => match (actual, expected) {
            (FieldValue::Text(haystack), FieldValue::Text(needle)) => {
                Ok(normalize_key(haystack).contains(&normalize_key(needle)))
            }
            (FieldValue::List(elements), _) => {
                let mut found = false;
                for element in elements {
                    if scalar_equals(field, op, element, expected)? {
                        found = true;
                    }
                }
                Ok(found)
            }
            _ => Err(mismatch(field, op, actual, expected)),
        },
        ComparisonOp::Equals => scalar_equals(field, op, actual, expected),
        ComparisonOp::NotEquals => Ok(!scalar_equals(field, op, actual, expected)?),
        ComparisonOp::LessThan
        | ComparisonOp::GreaterThan
        | ComparisonOp::LessOrEqual
        | ComparisonOp::GreaterOrEqual => {
            let ordering = scalar_ordering(field, op, actual, expected)?;
            Ok(match op {
                ComparisonOp::LessThan => ordering.is_lt(),
                ComparisonOp::GreaterThan => ordering.is_gt(),
                ComparisonOp::LessOrEqual => ordering.is_le(),
                ComparisonOp::GreaterOrEqual => ordering.is_ge(),
                _ => unreachable!("ordering arm only handles ordering operators"),
            })
        }
    }
}

/// Quantifies a comparison over a per-segment value list: positive operators
/// hold if any element matches, negative operators only if every element does.
/// An empty list triggers no positive operator and every negative one.
fn compare_elements(
    field: &str,
    elements: &[FieldValue],
    op: ComparisonOp,
    expected: &FieldValue,
) -> Result<bool, EvaluationError> {
    let mut outcomes = Vec::with_capacity(elements.len());
    for element in elements {
        outcomes.push(compare(field, element, op, expected)?);
    }

    if op.is_negative() {
        Ok(outcomes.iter().all(|matched| *matched))
    } else {
        Ok(outcomes.iter().any(|matched| *matched))
    }
}

/// Equality used directly and as the membership test for `in`/`not_in`/
/// `contains`; `op` is the originating operator so mismatch errors cite what
/// the policy author wrote.
fn scalar_equals(
    field: &str,
    op: ComparisonOp,
    actual: &FieldValue,
    expected: &FieldValue,
) -> Result<bool, EvaluationError> {
    if let (Some(left), Some(right)) = (actual.as_decimal(), expected.as_decimal()) {
        return Ok(left == right);
    }

    match (actual, expected) {
        (FieldValue::Text(left), FieldValue::Text(right)) => {
            Ok(normalize_key(left) == normalize_key(right))
        }
        (FieldValue::Date(left), FieldValue::Date(right)) => Ok(left == right),
        _ => Err(mismatch(field, op, actual, expected)),
    }
}

fn scalar_ordering(
    field: &str,
    op: ComparisonOp,
    actual: &FieldValue,
    expected: &FieldValue,
) -> Result<std::cmp::Ordering, EvaluationError> {
    if let (Some(left), Some(right)) = (actual.as_decimal(), expected.as_decimal()) {
        return Ok(left.cmp(&right));
    }

    match (actual, expected) {
        (FieldValue::Date(left), FieldValue::Date(right)) => Ok(left.cmp(right)),
        (FieldValue::Text(left), FieldValue::Text(right)) => {
            Ok(normalize_key(left).cmp(&normalize_key(right)))
        }
        _ => Err(mismatch(field, op, actual, expected)),
    }
}

fn mismatch(
    field: &str,
    op: ComparisonOp,
    actual: &FieldValue,
    expected: &FieldValue,
) -> EvaluationError {
    EvaluationError::TypeMismatch {
        field: field.to_string(),
        operator: op.as_str().to_string(),
        actual: actual.type_name(),
        expected: expected.type_name(),
    }
}
