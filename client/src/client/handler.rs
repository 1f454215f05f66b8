//! Observer for results pushed by the server
//!
//! Pushed results are not matched to the calls that triggered them; the
//! application registers one handler and receives every result.

use std::sync::Arc;

use tracing::{error, info};

use crate::network::PredictionResult;

/// Callback receiving every `prediction_result` event
pub type ResultHandler = Arc<dyn Fn(&PredictionResult) + Send + Sync>;

/// Log a pushed result
///
/// Successes are logged at info level, failures at error level.
pub fn log_result(result: &PredictionResult) {
    match result {
        PredictionResult::Success(success) => info!(
            prediction = %success.prediction,
            confidence = success.confidence,
            prediction_id = success.prediction_id,
            "Prediction success"
        ),
        PredictionResult::Failure(failure) => {
            error!(status = %failure.status, "Prediction error: {}", failure.error)
        }
        PredictionResult::Accepted(accepted) => {
            info!(status = %accepted.status, "Prediction accepted: {}", accepted.message)
        }
    }
}

/// Handler used when the application does not register one
pub fn logging_handler() -> ResultHandler {
    Arc::new(log_result)
}
