use clinic_core::ClinicError;

#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    #[error("failed to build HTTP client: {0}")]
    Client(reqwest::Error),
    #[error("request failed: {0}")]
    Request(reqwest::Error),
    #[error("{service} responded with status {status}: {body}")]
    Status {
        service: &'static str,
        status: u16,
        body: String,
    },
    #[error("unexpected {service} response: {source}")]
    Decode {
        service: &'static str,
        source: serde_json::Error,
    },
    #[error("{service} rejected the request: {message}")]
    Rejected {
        service: &'static str,
        message: String,
    },
    #[error("no location found for postal code {0}")]
    UnknownPostalCode(String),
}

impl From<GatewayError> for ClinicError {
    fn from(e: GatewayError) -> Self {
        match e {
            GatewayError::UnknownPostalCode(code) => ClinicError::not_found("postal code", code),
            other => ClinicError::Gateway(other.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unknown_postal_code_maps_to_not_found() {
        let err: ClinicError = GatewayError::UnknownPostalCode("000000".into()).into();
        assert!(matches!(err, ClinicError::NotFound { entity: "postal code", .. }));
    }

    #[test]
    fn test_status_error_maps_to_gateway() {
        let err: ClinicError = GatewayError::Status {
            service: "razorpay",
            status: 401,
            body: "bad key".into(),
        }
        .into();
        match err {
            ClinicError::Gateway(message) => assert!(message.contains("401")),
            other => panic!("expected gateway error, got {other:?}"),
        }
    }
}
