use clinic_types::TextError;
use clinic_uuid::{IdError, RecordId};

#[derive(Debug, thiserror::Error)]
pub enum ClinicError {
    #[error("invalid input: {0}")]
    InvalidInput(String),
    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: String },
    #[error("forbidden")]
    Forbidden,

    #[error("time slot {0} is already booked")]
    SlotAlreadyBooked(RecordId),
    #[error("clinic {0} has already used its free trial")]
    FreeTrialAlreadyUsed(RecordId),
    #[error("clinic {0} has no active subscription")]
    NoActiveSubscription(RecordId),
    #[error("clinic {0} has no bookings left on its subscription")]
    BookingQuotaExhausted(RecordId),
    #[error("invalid state: {0}")]
    InvalidState(String),

    #[error("external service error: {0}")]
    Gateway(String),

    #[error("failed to create data directory: {0}")]
    DataDirCreation(std::io::Error),
    #[error("failed to read store snapshot: {0}")]
    SnapshotRead(std::io::Error),
    #[error("failed to write store snapshot: {0}")]
    SnapshotWrite(std::io::Error),
    #[error("failed to serialize YAML: {0}")]
    YamlSerialization(serde_yaml::Error),
    #[error("failed to deserialize YAML: {0}")]
    YamlDeserialization(serde_yaml::Error),
    #[error("store lock poisoned")]
    StorePoisoned,
}

impl ClinicError {
    pub fn not_found(entity: &'static str, id: impl ToString) -> Self {
        Self::NotFound {
            entity,
            id: id.to_string(),
        }
    }
}

impl From<TextError> for ClinicError {
    fn from(e: TextError) -> Self {
        Self::InvalidInput(e.to_string())
    }
}

impl From<IdError> for ClinicError {
    fn from(e: IdError) -> Self {
        Self::InvalidInput(e.to_string())
    }
}

pub type ClinicResult<T> = std::result::Result<T, ClinicError>;
