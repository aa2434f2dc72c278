use thiserror::Error;

use crate::validation::ValidationErrors;

#[derive(Debug, Error)]
pub enum TodoError {
    #[error("Validation failed: {0}")]
    Validation(ValidationErrors),

    #[error("Task not found: {0}")]
    NotFound(String),
}

pub type TodoResult<T> = Result<T, TodoError>;

impl TodoError {
    pub fn not_found(id: impl Into<String>) -> Self {
        TodoError::NotFound(id.into())
    }

    pub fn validation_errors(&self) -> Option<&ValidationErrors> {
        match self {
            TodoError::Validation(errors) => Some(errors),
            TodoError::NotFound(_) => None,
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, TodoError::NotFound(_))
    }
}

impl From<ValidationErrors> for TodoError {
    fn from(errors: ValidationErrors) -> Self {
        TodoError::Validation(errors)
    }
}
