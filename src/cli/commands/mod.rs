//! CLI command handlers.

pub mod metrics;
pub mod rule;
pub mod serve;
pub mod task;

use anyhow::{anyhow, Result};

use crate::services::api::ApiResponse;

/// Unwrap a structured API envelope into a CLI result.
fn unwrap_response<T>(response: ApiResponse<T>) -> Result<T> {
    if response.success {
        response
            .data
            .ok_or_else(|| anyhow!("API returned success with no data"))
    } else {
        Err(anyhow!(response
            .error
            .unwrap_or_else(|| "unknown API error".to_string())))
    }
}
