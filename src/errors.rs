//! Error types for the local state layer
//!
//! Errors only surface at construction and adapter seams. The UI-facing
//! operations in the component modules translate them into a
//! [`Durability`](crate::kv_store::Durability) flag instead of failing.

use thiserror::Error;

/// Main error type for the local state layer
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Configuration error: {message}")]
    Config { message: String },

    #[error("Database operation failed: {operation} - {source}")]
    Database {
        operation: String,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    #[error("Serialization failed: {context}")]
    Serialization {
        context: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("I/O operation failed: {operation}")]
    Io {
        operation: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Validation error: {field} - {message}")]
    Validation { field: String, message: String },

    #[error("Storage unavailable: {operation}")]
    Unavailable { operation: String },

    #[error("Mutex lock failed: {resource}")]
    MutexPoisoned { resource: String },

    #[error("Error sink '{sink}' failed: {message}")]
    Sink { sink: String, message: String },

    #[error("Internal error: {message}")]
    Internal { message: String },
}

/// Shorthand for results carrying a [`StoreError`]
pub type StoreResult<T> = Result<T, StoreError>;

impl StoreError {
    /// Create a configuration error
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// Create a database error
    pub fn database(
        operation: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self::Database {
            operation: operation.into(),
            source: Box::new(source),
        }
    }

    /// Create a serialization error
    pub fn serialization(context: impl Into<String>, source: serde_json::Error) -> Self {
        Self::Serialization {
            context: context.into(),
            source,
        }
    }

    /// Create an I/O error
    pub fn io(operation: impl Into<String>, source: std::io::Error) -> Self {
        Self::Io {
            operation: operation.into(),
            source,
        }
    }

    /// Create a validation error
    pub fn validation(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Validation {
            field: field.into(),
            message: message.into(),
        }
    }

    /// Storage refused the operation (quota, disabled storage)
    pub fn unavailable(operation: impl Into<String>) -> Self {
        Self::Unavailable {
            operation: operation.into(),
        }
    }

    pub fn sink(sink: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Sink {
            sink: sink.into(),
            message: message.into(),
        }
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }
}

/// Lock a mutex without panicking on poison
pub trait SafeLock<T: ?Sized> {
    fn safe_lock(&self) -> StoreResult<std::sync::MutexGuard<'_, T>>;
}

impl<T: ?Sized> SafeLock<T> for std::sync::Mutex<T> {
    fn safe_lock(&self) -> StoreResult<std::sync::MutexGuard<'_, T>> {
        self.lock().map_err(|_| StoreError::MutexPoisoned {
            resource: "generic_mutex".to_string(),
        })
    }
}

/// Helper trait for RwLock read access
pub trait SafeReadLock<T: ?Sized> {
    fn safe_read(&self) -> StoreResult<std::sync::RwLockReadGuard<'_, T>>;
}

impl<T: ?Sized> SafeReadLock<T> for std::sync::RwLock<T> {
    fn safe_read(&self) -> StoreResult<std::sync::RwLockReadGuard<'_, T>> {
        self.read().map_err(|_| StoreError::MutexPoisoned {
            resource: "rwlock_read".to_string(),
        })
    }
}

/// Helper trait for RwLock write access
pub trait SafeWriteLock<T: ?Sized> {
    fn safe_write(&self) -> StoreResult<std::sync::RwLockWriteGuard<'_, T>>;
}

impl<T: ?Sized> SafeWriteLock<T> for std::sync::RwLock<T> {
    fn safe_write(&self) -> StoreResult<std::sync::RwLockWriteGuard<'_, T>> {
        self.write().map_err(|_| StoreError::MutexPoisoned {
            resource: "rwlock_write".to_string(),
        })
    }
}

impl From<sled::Error> for StoreError {
    fn from(err: sled::Error) -> Self {
        StoreError::database("sled_operation", err)
    }
}

impl From<serde_json::Error> for StoreError {
    fn from(err: serde_json::Error) -> Self {
        StoreError::serialization("json_operation", err)
    }
}

impl From<std::io::Error> for StoreError {
    fn from(err: std::io::Error) -> Self {
        StoreError::io("io_operation", err)
    }
}

impl From<figment::Error> for StoreError {
    fn from(err: figment::Error) -> Self {
        StoreError::config(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_creation() {
        let config_err = StoreError::config("Missing configuration file");
        assert!(config_err.to_string().contains("Configuration error"));

        let validation_err = StoreError::validation("key", "must not be empty");
        assert_eq!(
            validation_err.to_string(),
            "Validation error: key - must not be empty"
        );
    }

    #[test]
    fn test_error_chaining() {
        use std::error::Error;

        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "File not found");
        let store_err = StoreError::io("reading config", io_err);

        assert!(store_err.source().is_some());
        assert!(store_err.to_string().contains("I/O operation failed"));
    }

    #[test]
    fn poisoned_mutex_maps_to_error() {
        use std::sync::{Arc, Mutex};

        let shared = Arc::new(Mutex::new(0u32));
        let clone = Arc::clone(&shared);
        let _ = std::thread::spawn(move || {
            let _guard = clone.lock().unwrap();
            panic!("poison the lock");
        })
        .join();

        assert!(matches!(
            shared.safe_lock(),
            Err(StoreError::MutexPoisoned { .. })
        ));
    }
}
