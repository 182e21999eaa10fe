use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct HealthRes {
    pub ok: bool,
    pub message: String,
}

/// Health check shared by the REST server and the standalone API binary.
#[derive(Clone, Default)]
pub struct HealthService;

impl HealthService {
    pub fn new() -> Self {
        Self
    }

    pub fn check_health() -> HealthRes {
        HealthRes {
            ok: true,
            message: "clinic service is alive".into(),
        }
    }
}
