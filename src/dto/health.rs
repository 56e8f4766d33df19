use serde::Serialize;
use utoipa::ToSchema;

/// Health payload returned by `/healthcheck`.
#[derive(Debug, Serialize, ToSchema)]
pub struct HealthResponse {
    pub status: &'static str,
    pub degraded: bool,
}

impl HealthResponse {
    pub fn ok() -> Self {
        Self {
            status: "ok",
            degraded: false,
        }
    }

    pub fn degraded() -> Self {
        Self {
            status: "degraded",
            degraded: true,
        }
    }
}
