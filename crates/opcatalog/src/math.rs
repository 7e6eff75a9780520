//! Arithmetic operations

use opcore::{OpResult, OperationError};

/// Adds two integers.
///
/// Display name: Add Numbers
///
/// Parameters:
/// - a: first addend
/// - b: second addend
///
/// Returns:
/// - sum: arithmetic sum of the inputs
pub async fn add(a: i64, b: i64) -> OpResult<i64> {
    a.checked_add(b)
        .ok_or_else(|| OperationError::Failed("integer overflow".to_string()))
}

/// Subtracts the second integer from the first.
///
/// Display name: Subtract Numbers
///
/// Parameters:
/// - a: minuend
/// - b: subtrahend
///
/// Returns:
/// - difference: a minus b
pub async fn subtract(a: i64, b: i64) -> OpResult<i64> {
    a.checked_sub(b)
        .ok_or_else(|| OperationError::Failed("integer overflow".to_string()))
}

/// Multiplies two integers.
///
/// Display name: Multiply Numbers
///
/// Parameters:
/// - a: first factor
/// - b: second factor
///
/// Returns:
/// - product: a times b
pub async fn multiply(a: i64, b: i64) -> OpResult<i64> {
    a.checked_mul(b)
        .ok_or_else(|| OperationError::Failed("integer overflow".to_string()))
}

/// Divides the first integer by the second, truncating toward zero.
///
/// Display name: Divide Numbers
///
/// Parameters:
/// - a: dividend
/// - b: divisor
///
/// Returns:
/// - quotient: a divided by b
pub async fn divide(a: i64, b: i64) -> OpResult<i64> {
    if b == 0 {
        return Err(OperationError::Failed("division by zero".to_string()));
    }
    a.checked_div(b)
        .ok_or_else(|| OperationError::Failed("integer overflow".to_string()))
}
