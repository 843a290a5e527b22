//! Request validation for the Triage API
//!
//! Provides type-safe validation with clear error messages.

use std::collections::HashMap;
use crate::error::{AppError, ValidationBuilder};
use triage_shared::{NewTicket, TicketUpdate};

/// Validation result type
pub type ValidationResult<T> = Result<T, AppError>;

fn single(field: &str, message: String) -> AppError {
    let mut details = HashMap::new();
    details.insert(field.to_string(), vec![message]);
    AppError::ValidationError { details }
}

/// String validation helpers
pub mod string {
    use super::*;

    /// Validate required non-empty string
    pub fn required(value: &str, field: &str) -> ValidationResult<String> {
        let trimmed = value.trim();
        if trimmed.is_empty() {
            return Err(single(field, format!("{} is required", field)));
        }
        Ok(trimmed.to_string())
    }

    /// Validate string with max length
    pub fn max_length(value: &str, field: &str, max: usize) -> ValidationResult<String> {
        if value.chars().count() > max {
            return Err(single(
                field,
                format!("{} must be {} characters or less", field, max),
            ));
        }
        Ok(value.trim().to_string())
    }
}

/// Email validation
pub mod email {
    use super::*;

    /// Validate email format
    pub fn validate(value: &str, field: &str) -> ValidationResult<String> {
        let email = value.trim().to_lowercase();

        if email.is_empty() {
            return Err(single(field, format!("{} is required", field)));
        }

        let parts: Vec<&str> = email.split('@').collect();
        if parts.len() != 2 || parts[0].is_empty() || parts[1].is_empty() {
            return Err(single(field, "Invalid email format".to_string()));
        }

        if !parts[1].contains('.') {
            return Err(single(field, "Invalid email domain".to_string()));
        }

        Ok(email)
    }
}

/// Ticket payload validation
pub mod ticket {
    use super::*;

    pub const MAX_DESCRIPTION_LENGTH: usize = 10_000;
    pub const MAX_ATTRIBUTE_LENGTH: usize = 100;

    /// Validate and normalize a new ticket. Attributes are trimmed.
    pub fn validate_new(input: NewTicket) -> ValidationResult<NewTicket> {
        let mut errors = ValidationBuilder::new();

        if input.description.trim().is_empty() {
            errors = errors.error("description", "description is required");
        } else if input.description.chars().count() > MAX_DESCRIPTION_LENGTH {
            errors = errors.error(
                "description",
                &format!("description must be {} characters or less", MAX_DESCRIPTION_LENGTH),
            );
        }

        let attributes = [
            ("seniority", &input.seniority),
            ("experience", &input.experience),
            ("category", &input.category),
            ("type", &input.ticket_type),
            ("impact", &input.impact),
        ];
        for (field, value) in attributes {
            if value.chars().count() > MAX_ATTRIBUTE_LENGTH {
                errors = errors.error(
                    field,
                    &format!("{} must be {} characters or less", field, MAX_ATTRIBUTE_LENGTH),
                );
            }
            // Model instances are comma-joined
            if value.contains(',') {
                errors = errors.error(field, &format!("{} must not contain commas", field));
            }
        }

        if let Some(err) = errors.build() {
            return Err(err);
        }

        Ok(NewTicket {
            description: input.description.trim().to_string(),
            seniority: input.seniority.trim().to_string(),
            experience: input.experience.trim().to_string(),
            category: input.category.trim().to_string(),
            ticket_type: input.ticket_type.trim().to_string(),
            impact: input.impact.trim().to_string(),
        })
    }

    /// Validate operator attribute changes
    pub fn validate_update(update: TicketUpdate) -> ValidationResult<TicketUpdate> {
        if update.is_empty() {
            return Err(AppError::BadRequest(
                "Nothing to update: only priority and t_resolution may change".to_string(),
            ));
        }

        let priority = match update.priority {
            Some(p) => Some(string::max_length(&string::required(&p, "priority")?, "priority", MAX_ATTRIBUTE_LENGTH)?),
            None => None,
        };

        if let Some(t) = update.t_resolution {
            if !t.is_finite() || t < 0.0 {
                return Err(single(
                    "t_resolution",
                    "t_resolution must be a non-negative number".to_string(),
                ));
            }
        }

        Ok(TicketUpdate {
            priority,
            t_resolution: update.t_resolution,
        })
    }
}
