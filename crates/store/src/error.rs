use thiserror::Error;

use common::ItemId;

/// Errors that can occur when interacting with the checkout store.
#[derive(Debug, Error)]
pub enum StoreError {
    /// A reservation asked for more units than the item has on hand.
    /// The whole reservation is rolled back when this is raised.
    #[error("insufficient stock for item {item_id}")]
    InsufficientStock { item_id: ItemId },

    /// The item does not exist or is no longer active.
    #[error("item {item_id} is not available for ordering")]
    ItemUnavailable { item_id: ItemId },

    /// A row the operation requires does not exist.
    #[error("{entity} {id} not found")]
    NotFound { entity: &'static str, id: String },

    /// A unique or check constraint rejected the write.
    #[error("constraint violated: {constraint}")]
    Constraint { constraint: String },

    /// A stored value could not be decoded into its domain type.
    #[error("invalid {column} value in storage: {value}")]
    Decode { column: &'static str, value: String },

    /// A database error occurred.
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    /// A database migration error occurred.
    #[error("migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    /// A serialization/deserialization error occurred.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl StoreError {
    /// Builds a `NotFound` for the given entity and key.
    pub fn not_found(entity: &'static str, id: impl ToString) -> Self {
        StoreError::NotFound {
            entity,
            id: id.to_string(),
        }
    }
}

/// Result type for store operations.
pub type Result<T> = std::result::Result<T, StoreError>;
