//! Structural validation of wire payloads.
//!
//! The API schema is consumed as a black box by the handlers: a payload
//! either conforms or is rejected with a descriptive message. Only the
//! structure the matching core depends on is checked; unknown fields pass
//! through untouched.

use serde_json::Value;
use thiserror::Error;

#[derive(Error, Debug)]
#[error("{0}")]
pub struct SchemaError(String);

impl SchemaError {
    fn new(message: impl Into<String>) -> Self {
        Self(message.into())
    }
}

/// Validate an inbound match request.
///
/// # Errors
///
/// Returns `SchemaError` naming the first non-conforming field.
pub fn validate_request(payload: &Value) -> Result<(), SchemaError> {
    let root = payload
        .as_object()
        .ok_or_else(|| SchemaError::new("request body must be a JSON object"))?;
    let patient = root
        .get("patient")
        .ok_or_else(|| SchemaError::new("missing required field \"patient\""))?;
    validate_patient(patient)
}

/// Validate an outbound (or remote) match response.
///
/// # Errors
///
/// Returns `SchemaError` naming the first non-conforming field.
pub fn validate_response(payload: &Value) -> Result<(), SchemaError> {
    let results = payload
        .get("results")
        .ok_or_else(|| SchemaError::new("missing required field \"results\""))?
        .as_array()
        .ok_or_else(|| SchemaError::new("\"results\" must be an array"))?;

    for (i, result) in results.iter().enumerate() {
        let score = result
            .get("score")
            .and_then(|s| s.get("patient"))
            .and_then(Value::as_f64)
            .ok_or_else(|| SchemaError::new(format!("results[{i}].score.patient must be a number")))?;
        if !(0.0..1.0).contains(&score) {
            return Err(SchemaError::new(format!(
                "results[{i}].score.patient must be in [0, 1): {score}"
            )));
        }
        let patient = result
            .get("patient")
            .ok_or_else(|| SchemaError::new(format!("results[{i}] is missing \"patient\"")))?;
        if !patient.is_object() {
            return Err(SchemaError::new(format!("results[{i}].patient must be an object")));
        }
    }
    Ok(())
}

fn validate_patient(patient: &Value) -> Result<(), SchemaError> {
    let patient = patient
        .as_object()
        .ok_or_else(|| SchemaError::new("\"patient\" must be an object"))?;

    require_string(patient.get("id"), "patient.id")?;

    let contact = patient
        .get("contact")
        .and_then(Value::as_object)
        .ok_or_else(|| SchemaError::new("missing required object \"patient.contact\""))?;
    require_string(contact.get("name"), "patient.contact.name")?;
    require_string(contact.get("href"), "patient.contact.href")?;

    let features = optional_array(patient.get("features"), "patient.features")?;
    for (i, feature) in features.iter().enumerate() {
        require_string(feature.get("id"), &format!("patient.features[{i}].id"))?;
        if let Some(observed) = feature.get("observed") {
            if !observed.is_boolean() {
                return Err(SchemaError::new(format!(
                    "patient.features[{i}].observed must be a boolean"
                )));
            }
        }
    }

    let genomic = optional_array(patient.get("genomicFeatures"), "patient.genomicFeatures")?;
    for (i, feature) in genomic.iter().enumerate() {
        if !feature.is_object() {
            return Err(SchemaError::new(format!(
                "patient.genomicFeatures[{i}] must be an object"
            )));
        }
        if let Some(gene) = feature.get("gene") {
            require_string(gene.get("id"), &format!("patient.genomicFeatures[{i}].gene.id"))?;
        }
    }

    if features.is_empty() && genomic.is_empty() {
        return Err(SchemaError::new(
            "at least one of \"features\" or \"genomicFeatures\" must be provided",
        ));
    }

    if let Some(test) = patient.get("test") {
        if !test.is_boolean() {
            return Err(SchemaError::new("patient.test must be a boolean"));
        }
    }

    Ok(())
}

fn require_string(value: Option<&Value>, field: &str) -> Result<(), SchemaError> {
    match value.and_then(Value::as_str) {
        Some(s) if !s.is_empty() => Ok(()),
        Some(_) => Err(SchemaError::new(format!("{field} must not be empty"))),
        None => Err(SchemaError::new(format!("missing required string {field:?}"))),
    }
}

fn optional_array<'a>(
    value: Option<&'a Value>,
    field: &str,
) -> Result<&'a [Value], SchemaError> {
    match value {
        None => Ok(&[]),
        Some(Value::Array(items)) => Ok(items),
        Some(_) => Err(SchemaError::new(format!("{field} must be an array"))),
    }
}
