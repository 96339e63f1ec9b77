use std::collections::BTreeMap;
use std::fmt;

use serde::Serialize;
use validator::ValidationErrors;

/// Validation failures keyed by the field they concern, e.g. `{"weight": ["range"]}`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct FieldErrors(BTreeMap<String, Vec<String>>);

impl FieldErrors {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, field: &str, code: &str) {
        self.0
            .entry(field.to_string())
            .or_default()
            .push(code.to_string());
    }

    pub fn single(field: &str, code: &str) -> Self {
        let mut errors = Self::new();
        errors.add(field, code);
        errors
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// `Ok(())` when nothing was recorded.
    pub fn into_result(self) -> Result<(), FieldErrors> {
        if self.is_empty() { Ok(()) } else { Err(self) }
    }
}

#[cfg(test)]
impl FieldErrors {
    pub fn has(&self, field: &str) -> bool {
        self.0.contains_key(field)
    }

    pub fn codes(&self, field: &str) -> &[String] {
        self.0.get(field).map(Vec::as_slice).unwrap_or_default()
    }
}

impl From<ValidationErrors> for FieldErrors {
    fn from(errors: ValidationErrors) -> Self {
        let mut fields = Self::new();
        for (field, failures) in errors.field_errors() {
            let field = field.to_string();
            for failure in failures {
                fields.add(&field, &failure.code);
            }
        }
        fields
    }
}

impl fmt::Display for FieldErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let rendered = self
            .0
            .iter()
            .map(|(field, codes)| format!("{field}: {}", codes.join(", ")))
            .collect::<Vec<_>>()
            .join("; ");
        f.write_str(&rendered)
    }
}

impl std::error::Error for FieldErrors {}

#[cfg(test)]
mod tests {
    use super::*;
    use validator::ValidationError;

    #[test]
    fn collects_codes_per_field() {
        let mut errors = FieldErrors::new();
        errors.add("email", "blank");
        errors.add("email", "invalid");
        errors.add("phone", "blank");

        assert_eq!(errors.codes("email"), ["blank", "invalid"]);
        assert!(errors.has("phone"));
        assert!(!errors.has("weight"));
        assert_eq!(errors.to_string(), "email: blank, invalid; phone: blank");
    }

    #[test]
    fn converts_validator_errors() {
        let mut source = ValidationErrors::new();
        source.add("max_grants", ValidationError::new("range"));

        let errors = FieldErrors::from(source);
        assert_eq!(errors.codes("max_grants"), ["range"]);
    }

    #[test]
    fn empty_errors_are_ok() {
        assert!(FieldErrors::new().into_result().is_ok());
        assert!(FieldErrors::single("name", "taken").into_result().is_err());
    }
}
