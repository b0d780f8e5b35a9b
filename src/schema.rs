//! Canonical feature schema.
//!
//! Both the training loader (CSV cells) and the serving endpoint (JSON
//! objects) build [`FeatureRecord`]s through this module, so field names,
//! types and column order cannot drift between the two processes.

use crate::error::SchemaValidationError;
use crate::types::record::FeatureRecord;
use serde_json::{Map, Value};

pub const JOB_TYPE: &str = "job_type";
pub const JOB_PRIORITY: &str = "job_priority";
pub const ENGINEER_SKILL_LEVEL: &str = "engineer_skill_level";
pub const ENGINEER_EXPERIENCE_YEARS: &str = "engineer_experience_years";
pub const DISTANCE_KM: &str = "distance_km";

/// Ground-truth label column of the historical dataset.
pub const TARGET: &str = "success";

/// Numerical features, in preprocessed-vector order.
pub const NUMERICAL_FEATURES: [&str; 3] = [
    ENGINEER_SKILL_LEVEL,
    ENGINEER_EXPERIENCE_YEARS,
    DISTANCE_KM,
];

/// Categorical features, in preprocessed-vector order (after the numericals).
pub const CATEGORICAL_FEATURES: [&str; 2] = [JOB_TYPE, JOB_PRIORITY];

/// How a field participates in preprocessing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FeatureKind {
    Categorical,
    Numerical,
}

/// Wire type of a field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueType {
    Text,
    Integer,
    Float,
}

impl ValueType {
    fn expected(self) -> &'static str {
        match self {
            ValueType::Text => "a string",
            ValueType::Integer => "an integer",
            ValueType::Float => "a finite number",
        }
    }
}

/// Definition of a single input field.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FieldSpec {
    pub name: &'static str,
    pub kind: FeatureKind,
    pub value_type: ValueType,
    /// Inclusive lower bound for numeric fields.
    pub min: Option<f64>,
}

pub const JOB_TYPE_FIELD: FieldSpec = FieldSpec {
    name: JOB_TYPE,
    kind: FeatureKind::Categorical,
    value_type: ValueType::Text,
    min: None,
};

pub const JOB_PRIORITY_FIELD: FieldSpec = FieldSpec {
    name: JOB_PRIORITY,
    kind: FeatureKind::Categorical,
    value_type: ValueType::Text,
    min: None,
};

/// Skill level is validated for type only; no magnitude bounds are known.
pub const ENGINEER_SKILL_LEVEL_FIELD: FieldSpec = FieldSpec {
    name: ENGINEER_SKILL_LEVEL,
    kind: FeatureKind::Numerical,
    value_type: ValueType::Integer,
    min: None,
};

pub const ENGINEER_EXPERIENCE_YEARS_FIELD: FieldSpec = FieldSpec {
    name: ENGINEER_EXPERIENCE_YEARS,
    kind: FeatureKind::Numerical,
    value_type: ValueType::Integer,
    min: Some(0.0),
};

pub const DISTANCE_KM_FIELD: FieldSpec = FieldSpec {
    name: DISTANCE_KM,
    kind: FeatureKind::Numerical,
    value_type: ValueType::Float,
    min: Some(0.0),
};

/// All input fields in request order. Validation reports the first failure in this order.
pub static FIELDS: [FieldSpec; 5] = [
    JOB_TYPE_FIELD,
    JOB_PRIORITY_FIELD,
    ENGINEER_SKILL_LEVEL_FIELD,
    ENGINEER_EXPERIENCE_YEARS_FIELD,
    DISTANCE_KM_FIELD,
];

/// Look up a field definition by name.
pub fn field(name: &str) -> Option<&'static FieldSpec> {
    FIELDS.iter().find(|spec| spec.name == name)
}

/// Iterate over the field definitions of one kind, in schema order.
pub fn fields_of_kind(kind: FeatureKind) -> impl Iterator<Item = &'static FieldSpec> {
    FIELDS.iter().filter(move |spec| spec.kind == kind)
}

impl FieldSpec {
    fn wrong_type(&self) -> SchemaValidationError {
        SchemaValidationError::WrongType {
            field: self.name,
            expected: self.value_type.expected(),
        }
    }

    fn missing(&self) -> SchemaValidationError {
        SchemaValidationError::Missing { field: self.name }
    }

    /// Enforce the lower bound, if any.
    pub fn check_bounds(&self, value: f64) -> Result<(), SchemaValidationError> {
        match self.min {
            Some(min) if value < min => Err(SchemaValidationError::OutOfRange {
                field: self.name,
                reason: format!("{value} is below the minimum of {min}"),
            }),
            _ => Ok(()),
        }
    }

    /// Parse a raw text cell as an integer of this field.
    pub fn parse_integer(&self, raw: Option<&str>) -> Result<i64, SchemaValidationError> {
        let raw = non_empty(raw).ok_or_else(|| self.missing())?;
        let value = raw.trim().parse::<i64>().map_err(|_| self.wrong_type())?;
        self.check_bounds(value as f64)?;
        Ok(value)
    }

    /// Parse a raw text cell as a float of this field.
    pub fn parse_float(&self, raw: Option<&str>) -> Result<f64, SchemaValidationError> {
        let value = self.parse_number(raw)?;
        self.check_bounds(value)?;
        Ok(value)
    }

    /// Parse a raw text cell as any finite number, ignoring this field's bounds.
    pub fn parse_number(&self, raw: Option<&str>) -> Result<f64, SchemaValidationError> {
        let raw = non_empty(raw).ok_or_else(|| self.missing())?;
        let value = raw.trim().parse::<f64>().map_err(|_| self.wrong_type())?;
        if !value.is_finite() {
            return Err(self.wrong_type());
        }
        Ok(value)
    }
}

fn non_empty(raw: Option<&str>) -> Option<&str> {
    raw.filter(|s| !s.trim().is_empty())
}

/// Typed access to the raw fields of one incoming record.
trait FieldSource {
    fn text(&self, spec: &FieldSpec) -> Result<String, SchemaValidationError>;
    fn integer(&self, spec: &FieldSpec) -> Result<i64, SchemaValidationError>;
    fn float(&self, spec: &FieldSpec) -> Result<f64, SchemaValidationError>;
}

struct JsonFields<'a>(&'a Map<String, Value>);

impl FieldSource for JsonFields<'_> {
    fn text(&self, spec: &FieldSpec) -> Result<String, SchemaValidationError> {
        match self.0.get(spec.name) {
            None | Some(Value::Null) => Err(spec.missing()),
            Some(Value::String(s)) => Ok(s.clone()),
            Some(_) => Err(spec.wrong_type()),
        }
    }

    fn integer(&self, spec: &FieldSpec) -> Result<i64, SchemaValidationError> {
        let value = match self.0.get(spec.name) {
            None | Some(Value::Null) => return Err(spec.missing()),
            Some(Value::Number(n)) => n.as_i64().ok_or_else(|| spec.wrong_type())?,
            Some(_) => return Err(spec.wrong_type()),
        };
        spec.check_bounds(value as f64)?;
        Ok(value)
    }

    fn float(&self, spec: &FieldSpec) -> Result<f64, SchemaValidationError> {
        let value = match self.0.get(spec.name) {
            None | Some(Value::Null) => return Err(spec.missing()),
            Some(Value::Number(n)) => n.as_f64().ok_or_else(|| spec.wrong_type())?,
            Some(_) => return Err(spec.wrong_type()),
        };
        if !value.is_finite() {
            return Err(spec.wrong_type());
        }
        spec.check_bounds(value)?;
        Ok(value)
    }
}

struct TextFields<F>(F);

impl<'a, F> FieldSource for TextFields<F>
where
    F: Fn(&str) -> Option<&'a str>,
{
    fn text(&self, spec: &FieldSpec) -> Result<String, SchemaValidationError> {
        non_empty((self.0)(spec.name))
            .map(str::to_string)
            .ok_or_else(|| spec.missing())
    }

    fn integer(&self, spec: &FieldSpec) -> Result<i64, SchemaValidationError> {
        spec.parse_integer((self.0)(spec.name))
    }

    fn float(&self, spec: &FieldSpec) -> Result<f64, SchemaValidationError> {
        spec.parse_float((self.0)(spec.name))
    }
}

fn build_record(source: &impl FieldSource) -> Result<FeatureRecord, SchemaValidationError> {
    Ok(FeatureRecord {
        job_type: source.text(&JOB_TYPE_FIELD)?,
        job_priority: source.text(&JOB_PRIORITY_FIELD)?,
        engineer_skill_level: source.integer(&ENGINEER_SKILL_LEVEL_FIELD)?,
        engineer_experience_years: source.integer(&ENGINEER_EXPERIENCE_YEARS_FIELD)?,
        distance_km: source.float(&DISTANCE_KM_FIELD)?,
    })
}

/// Validate a JSON request body into a feature record.
///
/// The object must carry exactly the schema fields: missing fields, wrong
/// types, out-of-range values and unknown extra keys are all rejected.
/// Nothing is coerced (`3.0` is not an integer, `"3"` is not a number).
pub fn record_from_json(value: &Value) -> Result<FeatureRecord, SchemaValidationError> {
    let object = value.as_object().ok_or(SchemaValidationError::NotAnObject)?;
    let record = build_record(&JsonFields(object))?;

    if let Some(extra) = object.keys().find(|key| field(key).is_none()) {
        return Err(SchemaValidationError::UnexpectedField {
            field: extra.clone(),
        });
    }

    Ok(record)
}

/// Validate a row of text cells into a feature record.
///
/// `lookup` returns the raw cell for a column name, or `None` if the
/// column is absent. Extra columns are ignored.
pub fn record_from_columns<'a, F>(lookup: F) -> Result<FeatureRecord, SchemaValidationError>
where
    F: Fn(&str) -> Option<&'a str>,
{
    build_record(&TextFields(lookup))
}
