use crate::error::{EngineError, ErrorClass};

/// Map an error raised while pulling from the engine stream to its handling class.
///
/// Connectivity, timeouts, 408, 429 and 5xx responses are worth retrying.
/// Items lacking a field or failing to parse are skipped. Everything else,
/// including other 4xx statuses, aborts the harvest.
pub fn classify(err: &EngineError) -> ErrorClass {
    match err {
        EngineError::Network(_) | EngineError::Timeout(_) => ErrorClass::TransientNetwork,
        EngineError::HttpStatus { status, .. } => match status {
            408 | 429 => ErrorClass::TransientNetwork,
            500..=599 => ErrorClass::TransientNetwork,
            _ => ErrorClass::Fatal,
        },
        EngineError::MissingField { .. } | EngineError::Malformed(_) => ErrorClass::MissingData,
        EngineError::Other(_) => ErrorClass::Fatal,
    }
}
