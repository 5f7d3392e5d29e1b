use thiserror::Error;

use super::RepositoryError;

/// Error type for service operations
#[derive(Debug, Error)]
pub enum ServiceError {
    /// Input validation failed
    #[error("Validation error: {0}")]
    Validation(String),

    /// No record exists for the requested short code
    #[error("Not found error: {0}")]
    NotFound(String),

    /// The allocation loop hit its attempt bound without finding a free code
    #[error("Allocation error: no free short code after {0} attempts")]
    Exhausted(usize),

    /// Wrapped store failure
    #[error("Store error: {0}")]
    Store(#[from] RepositoryError),
}

impl From<validator::ValidationErrors> for ServiceError {
    fn from(errors: validator::ValidationErrors) -> Self {
        // Flatten field errors into a single string
        let message = errors
            .field_errors()
            .iter()
            .map(|(field, errs)| {
                let reasons = errs
                    .iter()
                    .map(|e| e.message.clone().unwrap_or_else(|| "invalid".into()))
                    .collect::<Vec<_>>()
                    .join(", ");
                format!("{}: {}", field, reasons)
            })
            .collect::<Vec<_>>()
            .join("; ");
        ServiceError::Validation(message)
    }
}

#[cfg(test)]
mod tests {
    use validator::Validate;

    use super::*;
    use crate::models::ShortenRequestDto;

    #[test]
    fn validation_errors_flatten_to_field_messages() {
        let errors = ShortenRequestDto { url: None }.validate().unwrap_err();
        match ServiceError::from(errors) {
            ServiceError::Validation(msg) => assert_eq!(msg, "url: url is required"),
            other => panic!("unexpected {:?}", other),
        }
    }
}
