use std::collections::BTreeMap;

use regex::Regex;
use serde::Deserialize;
use serde_json::Value;
use validator::{Validate, ValidationError};

use crate::census::identity::sanitize_phone;
use crate::entities::setting::AuthorizationMethod;
use crate::error::FieldErrors;

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct SettingForm {
    #[validate(range(min = 1, max = 32767))]
    pub max_grants: i32,
    #[serde(default = "SettingForm::default_authorization_method")]
    pub authorization_method: AuthorizationMethod,
    #[serde(default)]
    pub active: bool,
    #[validate(custom(function = "translatable_presence"))]
    pub title: BTreeMap<String, String>,
    #[serde(default)]
    pub description: BTreeMap<String, String>,
}

impl SettingForm {
    const fn default_authorization_method() -> AuthorizationMethod {
        AuthorizationMethod::Both
    }

    pub fn check(&self) -> Result<(), FieldErrors> {
        self.validate().map_err(FieldErrors::from)
    }

    pub fn title_json(&self) -> Value {
        translations_json(&self.title)
    }

    pub fn description_json(&self) -> Value {
        translations_json(&self.description)
    }
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct PonderationForm {
    #[validate(length(min = 1, max = 255))]
    pub name: String,
    #[serde(default = "PonderationForm::default_weight")]
    pub weight: f64,
}

impl PonderationForm {
    const fn default_weight() -> f64 {
        1.0
    }

    pub fn check(&self) -> Result<(), FieldErrors> {
        let mut errors = match self.validate() {
            Ok(()) => FieldErrors::new(),
            Err(errors) => FieldErrors::from(errors),
        };
        if !(self.weight.is_finite() && self.weight > 0.0) {
            errors.add("weight", "greater_than");
        }
        errors.into_result()
    }
}

#[derive(Debug, Clone, Default, Deserialize, Validate)]
pub struct ParticipantForm {
    #[validate(email)]
    pub email: Option<String>,
    pub phone: Option<String>,
    pub user_id: Option<i64>,
    pub ponderation_id: Option<i64>,
}

impl ParticipantForm {
    /// Trims the email, sanitizes the phone and turns blanks into `None`.
    pub fn normalized(self) -> Self {
        let email = self
            .email
            .map(|email| email.trim().to_string())
            .filter(|email| !email.is_empty());
        let phone = self
            .phone
            .map(|phone| sanitize_phone(&phone))
            .filter(|phone| !phone.is_empty());
        Self {
            email,
            phone,
            ..self
        }
    }

    /// Field checks that depend on how the owning setting verifies its census.
    pub fn check_for(&self, method: AuthorizationMethod, phone_pattern: &Regex) -> FieldErrors {
        let mut errors = match self.validate() {
            Ok(()) => FieldErrors::new(),
            Err(errors) => FieldErrors::from(errors),
        };

        if method.email_required() && self.email.is_none() {
            errors.add("email", "blank");
        }
        match self.phone.as_deref() {
            None if method.phone_required() => errors.add("phone", "blank"),
            Some(phone) if !phone_pattern.is_match(phone.trim_start_matches('+')) => {
                errors.add("phone", "invalid");
            }
            _ => {}
        }
        errors
    }
}

fn translatable_presence(value: &BTreeMap<String, String>) -> Result<(), ValidationError> {
    if value.values().any(|text| !text.trim().is_empty()) {
        return Ok(());
    }
    Err(ValidationError::new("blank"))
}

fn translations_json(value: &BTreeMap<String, String>) -> Value {
    Value::Object(
        value
            .iter()
            .map(|(locale, text)| (locale.clone(), Value::String(text.clone())))
            .collect(),
    )
}
