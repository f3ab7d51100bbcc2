//! Error types and HTTP status mapping for the service.

use parcel_enrich::EnrichError;

/// HTTP status codes used by the service.
pub mod status_codes {
    pub const BAD_REQUEST: u16 = 400;
    pub const NOT_FOUND: u16 = 404;
    pub const INTERNAL_ERROR: u16 = 500;
    pub const SERVICE_UNAVAILABLE: u16 = 503;
}

/// All errors that can occur in the service and CLI.
#[derive(thiserror::Error, Debug)]
pub enum ServerError {
    #[error("Invalid params: {0}")]
    InvalidParams(String),

    #[error("No parcel found at this location.")]
    NoParcel,

    #[error("Parcel data is not loaded; start the service with --parcels")]
    ParcelsUnavailable,

    #[error("{0}")]
    CorruptCache(String),

    #[error("Enrichment error: {0}")]
    Enrich(String),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl ServerError {
    pub fn status_code(&self) -> u16 {
        use status_codes::*;
        match self {
            ServerError::InvalidParams(_) => BAD_REQUEST,
            ServerError::NoParcel => NOT_FOUND,
            ServerError::ParcelsUnavailable => SERVICE_UNAVAILABLE,
            ServerError::CorruptCache(_)
            | ServerError::Enrich(_)
            | ServerError::Csv(_)
            | ServerError::Transport(_)
            | ServerError::Io(_) => INTERNAL_ERROR,
        }
    }

    /// JSON body returned to HTTP clients.
    pub fn to_json(&self) -> serde_json::Value {
        serde_json::json!({ "error": self.to_string() })
    }
}

impl From<EnrichError> for ServerError {
    fn from(e: EnrichError) -> Self {
        match e {
            EnrichError::NoParcel => ServerError::NoParcel,
            EnrichError::InvalidInput(msg) => ServerError::InvalidParams(msg),
            EnrichError::StoreCorrupt { .. } => ServerError::CorruptCache(e.to_string()),
            EnrichError::Io(io) => ServerError::Io(io),
            other => ServerError::Enrich(other.to_string()),
        }
    }
}

pub type ServerResult<T> = Result<T, ServerError>;
