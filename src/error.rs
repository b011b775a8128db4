//! Error types for plan computation.
//!
//! Only malformed configuration is an error. Degenerate inputs (empty
//! holdings, zero portfolio value, all-zero targets) produce a valid, possibly
//! empty, plan instead.

/// Errors returned by the planning core.
#[derive(Clone, Debug, PartialEq, thiserror::Error)]
pub enum Error {
    /// A target weight could not be parsed as a number.
    #[error("target weight for '{key}' is not a number: {raw:?}")]
    InvalidWeight { key: String, raw: String },

    /// A target weight is negative.
    #[error("target weight for '{key}' is negative ({weight})")]
    NegativeWeight { key: String, weight: f64 },

    /// A target weight is NaN or infinite.
    #[error("target weight for '{key}' is not finite")]
    NonFiniteWeight { key: String },

    /// A target entry has an empty key.
    #[error("target entry has an empty group/symbol key")]
    EmptyKey,

    /// Unrecognized pricing mode name.
    #[error("unknown pricing mode '{0}' (expected local, auto or hybrid)")]
    InvalidPricingMode(String),

    /// Unrecognized grouping name.
    #[error("unknown grouping '{0}' (expected symbol or group)")]
    InvalidGrouping(String),

    /// Planning thresholds out of range.
    #[error("invalid plan parameters: {0}")]
    InvalidParams(String),
}

pub type Result<T> = std::result::Result<T, Error>;
