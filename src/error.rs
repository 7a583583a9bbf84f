use thiserror::Error;

/// Main error type for crmsync
#[derive(Error, Debug)]
pub enum CrmError {
    /// Missing credentials or invalid configuration
    #[error("Configuration error: {0}")]
    Config(String),

    /// AI extraction service unreachable or returned unusable output
    #[error("Extraction error: {0}")]
    Extraction(String),

    /// Listing the remote folder failed (aborts a poll cycle)
    #[error("Remote listing error: {0}")]
    RemoteListing(String),

    /// Downloading a remote file failed
    #[error("Remote fetch error: {0}")]
    RemoteFetch(String),

    /// Store backend failure not covered by a more specific variant
    #[error("Store error: {0}")]
    Store(String),

    /// Database-related errors
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// File system I/O errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON (de)serialization of stored documents
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Invalid input
    #[error("Invalid input: {0}")]
    InvalidInput(String),
}

/// Convenient Result type using CrmError
pub type Result<T> = std::result::Result<T, CrmError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = CrmError::Config("API key missing".to_string());
        assert!(err.to_string().contains("Configuration error"));
        assert!(err.to_string().contains("API key missing"));
    }

    #[test]
    fn test_error_from_rusqlite() {
        let rusqlite_err = rusqlite::Error::InvalidQuery;
        let crm_err: CrmError = rusqlite_err.into();
        assert!(matches!(crm_err, CrmError::Database(_)));
    }

    #[test]
    fn test_error_from_serde_json() {
        let json_err = serde_json::from_str::<serde_json::Value>("{not json").unwrap_err();
        let crm_err: CrmError = json_err.into();
        assert!(matches!(crm_err, CrmError::Serialization(_)));
    }
}
