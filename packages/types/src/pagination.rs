use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// A page request: `limit` of zero or less means "use the caller's default";
/// use [`clamp_limit`] to resolve it against a concrete default/max pair.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, Default, ToSchema)]
pub struct Pagination {
    pub limit: i64,
    pub offset: i64,
}

#[derive(Serialize, Deserialize, Clone, Debug, ToSchema)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub total: usize,
    pub limit: usize,
    pub offset: usize,
}

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum PaginationError {
    #[error("limit must not be negative")]
    NegativeLimit,
}

/// Rule: 0 or negative `requested` -> `default`; `requested > max` -> `max`;
/// else `requested`. Idempotent: `clamp_limit(clamp_limit(n)) == clamp_limit(n)`
/// for any fixed `(default, max)` pair.
///
/// Note: per spec boundary behavior, a strictly negative `requested` actually
/// maps to the same "use default" bucket as zero, not a validation error —
/// `ClampLimit` and the HTTP-facing `parse_limit` below diverge here; see
/// `parse_limit` for the endpoint-facing strict version.
pub fn clamp_limit(requested: i64, default: usize, max: usize) -> usize {
    if requested <= 0 {
        default
    } else {
        (requested as usize).min(max)
    }
}

/// Endpoint-facing limit parser: `limit < 0` is a validation error (per
/// spec §8 boundary behaviors: "Limit<0 -> validation error"), `limit == 0`
/// falls back to `default`, `limit > max` clamps to `max`.
pub fn parse_limit(requested: i64, default: usize, max: usize) -> Result<usize, PaginationError> {
    if requested < 0 {
        return Err(PaginationError::NegativeLimit);
    }
    Ok(clamp_limit(requested, default, max))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_or_negative_uses_default() {
        assert_eq!(clamp_limit(0, 25, 100), 25);
        assert_eq!(clamp_limit(-5, 25, 100), 25);
    }

    #[test]
    fn over_max_clamps_to_max() {
        assert_eq!(clamp_limit(1000, 25, 100), 100);
    }

    #[test]
    fn within_range_passes_through() {
        assert_eq!(clamp_limit(10, 25, 100), 10);
    }

    #[test]
    fn clamp_is_idempotent() {
        let once = clamp_limit(500, 25, 100);
        let twice = clamp_limit(once as i64, 25, 100);
        assert_eq!(once, twice);
    }

    #[test]
    fn negative_limit_is_a_validation_error_at_the_endpoint_boundary() {
        assert_eq!(parse_limit(-1, 25, 100), Err(PaginationError::NegativeLimit));
        assert_eq!(parse_limit(0, 25, 100), Ok(25));
    }
}
