//! Outbound HTTP operations

use opcore::{OpResult, OperationError};

/// Fetches a URL and returns the response.
///
/// Display name: HTTP GET
///
/// Parameters:
/// - url: absolute URL to fetch
///
/// Returns:
/// - status: response status code
/// - body: response body text
pub async fn http_get(url: String) -> OpResult<(i64, String)> {
    let response = reqwest::get(&url)
        .await
        .map_err(|e| OperationError::Failed(format!("HTTP request failed: {}", e)))?;
    let status = response.status().as_u16() as i64;
    let body = response
        .text()
        .await
        .map_err(|e| OperationError::Failed(format!("failed to read response: {}", e)))?;
    Ok((status, body))
}
