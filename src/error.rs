use thiserror::Error;

/// A payload on either ingestion path that cannot become a [`crate::reading::Reading`].
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ParseError {
    #[error("payload is not valid JSON: {0}")]
    Json(String),
    #[error("missing required field `{0}`")]
    MissingField(&'static str),
    #[error("field `{field}` is invalid: {reason}")]
    InvalidField {
        field: &'static str,
        reason: String,
    },
}

impl ParseError {
    pub(crate) fn invalid(field: &'static str, reason: impl Into<String>) -> Self {
        Self::InvalidField {
            field,
            reason: reason.into(),
        }
    }
}

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("mqtt client request failed: {0}")]
    Client(#[from] rumqttc::ClientError),
    #[error("mqtt connection failed: {0}")]
    Connection(#[from] rumqttc::ConnectionError),
    #[error("broker refused connection: {0:?}")]
    Refused(rumqttc::ConnectReturnCode),
    #[error("broker rejected subscription to {0}")]
    SubscribeRejected(String),
    #[error("no CONNACK/SUBACK from broker within {0:?}")]
    Timeout(std::time::Duration),
}

#[derive(Debug, Error)]
pub enum PersistenceError {
    #[error("database unavailable: {0}")]
    Unavailable(String),
    #[error("database call exceeded {0:?}")]
    Timeout(std::time::Duration),
    #[error("unit {unit_id} is not registered in StorageUnits")]
    IntegrityViolation { unit_id: i32 },
    #[error("database query failed: {0}")]
    Query(String),
}

impl PersistenceError {
    /// Classifies a driver error. `unit_id` is reported on foreign-key violations.
    pub fn from_sqlx(err: sqlx::Error, unit_id: Option<i32>) -> Self {
        match &err {
            sqlx::Error::Database(db) if db.code().as_deref() == Some("23503") => {
                Self::IntegrityViolation {
                    unit_id: unit_id.unwrap_or_default(),
                }
            }
            sqlx::Error::PoolTimedOut
            | sqlx::Error::PoolClosed
            | sqlx::Error::Io(_)
            | sqlx::Error::Tls(_) => Self::Unavailable(err.to_string()),
            _ => Self::Query(err.to_string()),
        }
    }
}
