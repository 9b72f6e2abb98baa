use thiserror::Error;

use shopkeep_core::DomainError;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CatalogError {
    #[error("{kind} {id} not found")]
    NotFound { kind: &'static str, id: String },

    #[error("{kind} named '{name}' already exists")]
    Duplicate { kind: &'static str, name: String },

    #[error(transparent)]
    Domain(#[from] DomainError),
}

impl CatalogError {
    pub fn not_found(kind: &'static str, id: impl ToString) -> Self {
        Self::NotFound {
            kind,
            id: id.to_string(),
        }
    }
}
