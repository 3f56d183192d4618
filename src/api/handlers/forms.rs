//! Server-side validation of submitted forms.

use regex::Regex;
use serde::Serialize;
use std::collections::{BTreeMap, HashMap};
use utoipa::ToSchema;

/// Key for errors that belong to the form as a whole.
pub const GENERIC: &str = "generic";

const EMAIL_PATTERN: &str = r"^[a-zA-Z0-9.!#$%&'*+/=?^_`{|}~-]+@[a-zA-Z0-9](?:[a-zA-Z0-9-]{0,61}[a-zA-Z0-9])?(?:\.[a-zA-Z0-9](?:[a-zA-Z0-9-]{0,61}[a-zA-Z0-9])?)*$";

pub(crate) fn valid_email(email: &str) -> bool {
    Regex::new(EMAIL_PATTERN).is_ok_and(|re| re.is_match(email))
}

/// Submitted values plus the messages collected while checking them.
#[derive(Debug, Default)]
pub struct Form {
    values: HashMap<String, String>,
    errors: BTreeMap<String, Vec<String>>,
}

/// What a rendered form shows back to the user. Secrets are never echoed.
#[derive(Debug, Default, Serialize, ToSchema)]
pub struct FormView {
    pub values: BTreeMap<String, String>,
    pub errors: BTreeMap<String, Vec<String>>,
}

impl Form {
    #[must_use]
    pub fn new(values: HashMap<String, String>) -> Self {
        Self {
            values,
            errors: BTreeMap::new(),
        }
    }

    #[must_use]
    pub fn get(&self, field: &str) -> &str {
        self.values.get(field).map_or("", String::as_str)
    }

    pub fn add_error(&mut self, field: &str, message: impl Into<String>) {
        self.errors
            .entry(field.to_string())
            .or_default()
            .push(message.into());
    }

    #[must_use]
    pub fn error(&self, field: &str) -> Option<&str> {
        self.errors
            .get(field)
            .and_then(|messages| messages.first())
            .map(String::as_str)
    }

    pub fn required(&mut self, fields: &[&str]) {
        for field in fields {
            if self.get(field).trim().is_empty() {
                self.add_error(field, "This field cannot be blank");
            }
        }
    }

    /// Length counted in characters; blank values are left to [`Form::required`].
    pub fn max_length(&mut self, field: &str, max: usize) {
        let value = self.get(field);
        if !value.is_empty() && value.chars().count() > max {
            self.add_error(
                field,
                format!("This field is too long (maximum is {max} characters)"),
            );
        }
    }

    pub fn min_length(&mut self, field: &str, min: usize) {
        let value = self.get(field);
        if !value.is_empty() && value.chars().count() < min {
            self.add_error(
                field,
                format!("This field is too short (minimum is {min} characters)"),
            );
        }
    }

    pub fn email(&mut self, field: &str) {
        let value = self.get(field);
        if !value.is_empty() && !valid_email(value) {
            self.add_error(field, "This field is invalid");
        }
    }

    #[must_use]
    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }

    /// Snapshot for rendering, echoing only the `visible` fields.
    #[must_use]
    pub fn view(&self, visible: &[&str]) -> FormView {
        FormView {
            values: visible
                .iter()
                .filter_map(|field| {
                    self.values
                        .get(*field)
                        .map(|value| ((*field).to_string(), value.clone()))
                })
                .collect(),
            errors: self.errors.clone(),
        }
    }
}
