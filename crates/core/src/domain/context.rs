use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::errors::EvaluationError;

/// Snapshot of a candidate booking, used as evaluator input. Built once by the
/// caller; the engine never mutates it.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TripContext {
    pub total_cost: Decimal,
    pub currency: String,
    pub segments: Vec<TripSegment>,
    pub employee: EmployeeProfile,
    pub advance_booking_days: i64,
    #[serde(default)]
    pub departure_date: Option<NaiveDate>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TripSegment {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub cabin_class: Option<String>,
    #[serde(default)]
    pub fare_class: Option<String>,
    #[serde(default)]
    pub duration_minutes: Option<i64>,
    pub price: Decimal,
    #[serde(default)]
    pub departure_date: Option<NaiveDate>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmployeeProfile {
    pub id: String,
    pub level: String,
    pub department: String,
    pub region: String,
}

/// Typed value produced by field-path resolution and carried as the comparison
/// value of rule leaves.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum FieldValue {
    Decimal(Decimal),
    Int(i64),
    Text(String),
    Date(NaiveDate),
    List(Vec<FieldValue>),
}

impl FieldValue {
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Decimal(_) => "decimal",
            Self::Int(_) => "integer",
            Self::Text(_) => "text",
            Self::Date(_) => "date",
            Self::List(_) => "list",
        }
    }

    /// Numeric widening: integers and decimals compare against each other.
    pub fn as_decimal(&self) -> Option<Decimal> {
        match self {
            Self::Decimal(value) => Some(*value),
            Self::Int(value) => Some(Decimal::from(*value)),
            _ => None,
        }
    }

    pub fn display(&self) -> String {
        match self {
            Self::Decimal(value) => value.to_string(),
            Self::Int(value) => value.to_string(),
            Self::Text(value) => value.clone(),
            Self::Date(value) => value.to_string(),
            Self::List(values) => {
                let items: Vec<String> = values.iter().map(FieldValue::display).collect();
                format!("[{}]", items.join(", "))
            }
        }
    }
}

impl TripContext {
    /// Resolves a dotted field path against this context. An unknown path is an
    /// error, never a false match: rules referencing fields outside the schema
    /// are misconfigured, not unmatched.
    pub fn resolve(&self, path: &str) -> Result<FieldValue, EvaluationError> {
        let path = path.trim();
        match path {
            "total_cost" => Ok(FieldValue::Decimal(self.total_cost)),
            "currency" => Ok(FieldValue::Text(self.currency.clone())),
            "advance_booking_days" => Ok(FieldValue::Int(self.advance_booking_days)),
            "segment_count" => Ok(FieldValue::Int(self.segments.len() as i64)),
            "departure_date" => self
                .departure_date
                .map(FieldValue::Date)
                .ok_or_else(|| EvaluationError::MissingValue { field: path.to_string() }),
            "employee.id" => Ok(FieldValue::Text(self.employee.id.clone())),
            "employee.level" => Ok(FieldValue::Text(self.employee.level.clone())),
            "employee.department" => Ok(FieldValue::Text(self.employee.department.clone())),
            "employee.region" => Ok(FieldValue::Text(self.employee.region.clone())),
            _ => self.resolve_segment_field(path),
        }
    }

    fn resolve_segment_field(&self, path: &str) -> Result<FieldValue, EvaluationError> {
        let field = path
            .strip_prefix("segments.")
            .or_else(|| path.strip_prefix("segment."))
            .ok_or_else(|| EvaluationError::UnknownField { field: path.to_string() })?;

        let values: Vec<FieldValue> = match field {
            "type" => self.segments.iter().map(|s| FieldValue::Text(s.kind.clone())).collect(),
            "cabin_class" => self
                .segments
                .iter()
                .filter_map(|s| s.cabin_class.clone())
                .map(FieldValue::Text)
                .collect(),
            "fare_class" => self
                .segments
                .iter()
                .filter_map(|s| s.fare_class.clone())
                .map(FieldValue::Text)
                .collect(),
            "duration_minutes" => self
                .segments
                .iter()
                .filter_map(|s| s.duration_minutes)
                .map(FieldValue::Int)
                .collect(),
            "price" => self.segments.iter().map(|s| FieldValue::Decimal(s.price)).collect(),
            "departure_date" => self
                .segments
                .iter()
                .filter_map(|s| s.departure_date)
                .map(FieldValue::Date)
                .collect(),
            _ => return Err(EvaluationError::UnknownField { field: path.to_string() }),
        };

        Ok(FieldValue::List(values))
    }
}
