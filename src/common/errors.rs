use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use sea_orm::DbErr;
use serde_json::json;
use std::fmt;

/// Custom error types for business logic validation and application errors
#[derive(Debug, Clone)]
pub enum BusinessError {
    /// Validation errors for user input (400 Bad Request)
    ValidationError { field: String, message: String },
    /// Business rule violations (422 Unprocessable Entity)
    BusinessRuleViolation { rule: String, message: String },
    /// Resource not found (404 Not Found)
    NotFound { resource: String, id: String },
    /// Duplicate resource (409 Conflict)
    Duplicate { resource: String, field: String },
    /// Generic application error (500 Internal Server Error)
    InternalError { message: String },
}

impl fmt::Display for BusinessError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BusinessError::ValidationError { field, message } => {
                write!(f, "Validation error in field '{field}': {message}")
            }
            BusinessError::BusinessRuleViolation { rule, message } => {
                write!(f, "Business rule '{rule}' violated: {message}")
            }
            BusinessError::NotFound { resource, id } => {
                write!(f, "{resource} with id '{id}' not found")
            }
            BusinessError::Duplicate { resource, field } => {
                write!(f, "{resource} with this {field} already exists")
            }
            BusinessError::InternalError { message } => {
                write!(f, "Internal error: {message}")
            }
        }
    }
}

impl std::error::Error for BusinessError {}

/// Convert BusinessError to HTTP responses
impl IntoResponse for BusinessError {
    fn into_response(self) -> Response {
        let (status, error_code) = match &self {
            BusinessError::ValidationError { .. } => (StatusCode::BAD_REQUEST, "VALIDATION_ERROR"),
            BusinessError::BusinessRuleViolation { .. } => {
                (StatusCode::UNPROCESSABLE_ENTITY, "BUSINESS_RULE_VIOLATION")
            }
            BusinessError::NotFound { .. } => (StatusCode::NOT_FOUND, "RESOURCE_NOT_FOUND"),
            BusinessError::Duplicate { .. } => (StatusCode::CONFLICT, "DUPLICATE_RESOURCE"),
            BusinessError::InternalError { .. } => {
                (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR")
            }
        };

        let body = Json(json!({
            "error": {
                "code": error_code,
                "message": self.to_string(),
            }
        }));

        (status, body).into_response()
    }
}

/// Map DbErr to appropriate HTTP responses with business context
pub fn map_db_error(err: DbErr, context: &str) -> BusinessError {
    match err {
        DbErr::RecordNotFound(msg) => BusinessError::NotFound {
            resource: context.replace('_', " "),
            id: extract_id_from_message(&msg),
        },
        DbErr::Custom(msg) => {
            if msg.starts_with("Validation failed:") {
                let field = extract_field_from_validation(&msg);
                let message = msg.replace("Validation failed:", "").trim().to_string();
                BusinessError::ValidationError { field, message }
            } else if msg.contains("already exists") || msg.contains("duplicate") {
                BusinessError::Duplicate {
                    resource: context.replace('_', " "),
                    field: "pair".to_string(),
                }
            } else {
                BusinessError::InternalError { message: msg }
            }
        }
        DbErr::Exec(exec_err) => {
            // Check if it's a constraint violation
            let err_msg = exec_err.to_string();
            if err_msg.contains("UNIQUE constraint") || err_msg.contains("duplicate key") {
                BusinessError::Duplicate {
                    resource: context.replace('_', " "),
                    field: "pair".to_string(),
                }
            } else {
                BusinessError::InternalError { message: err_msg }
            }
        }
        _ => BusinessError::InternalError {
            message: err.to_string(),
        },
    }
}

/// Helper to extract ID from error messages
fn extract_id_from_message(msg: &str) -> String {
    if let Some(start_pos) = msg.find(" id '") {
        let after_id = &msg[start_pos + 5..];
        if let Some(end_pos) = after_id.find('\'') {
            return after_id[..end_pos].to_string();
        }
    }
    "unknown".to_string()
}

/// Helper to extract field name from validation error
fn extract_field_from_validation(msg: &str) -> String {
    // Messages look like "Validation failed: area must be positive"
    msg.split(':')
        .nth(1)
        .and_then(|part| part.trim().split_whitespace().next())
        .unwrap_or("unknown")
        .to_string()
}

/// Extension trait to add business error conversion to DbErr
pub trait DbErrorExt {
    fn to_business_error(self, context: &str) -> BusinessError;
}

impl DbErrorExt for DbErr {
    fn to_business_error(self, context: &str) -> BusinessError {
        map_db_error(self, context)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn maps_validation_failures_to_validation_error() {
        let db_err = DbErr::Custom("Validation failed: area must be positive".to_string());
        let business_err = map_db_error(db_err, "field");

        match business_err {
            BusinessError::ValidationError { field, message } => {
                assert_eq!(field, "area");
                assert!(message.contains("must be positive"));
            }
            other => panic!("Expected validation error, got {other:?}"),
        }
    }

    #[test]
    fn maps_record_not_found_with_id() {
        let db_err = DbErr::RecordNotFound("Treatment with id 'abc-123' not found".to_string());
        let business_err = map_db_error(db_err, "treatment");

        match business_err {
            BusinessError::NotFound { resource, id } => {
                assert_eq!(resource, "treatment");
                assert_eq!(id, "abc-123");
            }
            other => panic!("Expected not found error, got {other:?}"),
        }
    }

    #[test]
    fn maps_unique_violations_to_duplicate() {
        let db_err = DbErr::Custom("duplicate product for this treatment".to_string());
        let business_err = map_db_error(db_err, "treatment_product");
        assert!(matches!(business_err, BusinessError::Duplicate { .. }));
    }
}
