use crate::utils::response::AppError;

/// Fallback for every route nobody claimed.
pub async fn not_found() -> AppError {
    AppError::NotFound
}
