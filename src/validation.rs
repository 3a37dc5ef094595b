use rust_decimal::Decimal;
use std::str::FromStr;
use thiserror::Error;

use crate::models::NormalizedShare;

#[derive(Error, Debug, PartialEq)]
pub enum ValidationError {
    #[error("Share {uuid}: {field} must be greater than 0, got {id}")]
    NonPositiveId {
        uuid: String,
        field: &'static str,
        id: i64,
    },

    #[error("Share {uuid}: invalid decimal in {field}: '{value}'")]
    InvalidDecimal {
        uuid: String,
        field: &'static str,
        value: String,
    },
}

/// All three reference IDs of a normalized share must be strictly positive.
pub fn validate_share_ids(share: &NormalizedShare) -> Result<(), ValidationError> {
    for (field, id) in [
        ("coin_id", share.coin_id),
        ("wallet_id", share.wallet_id),
        ("worker_id", share.worker_id),
    ] {
        if id <= 0 {
            return Err(ValidationError::NonPositiveId {
                uuid: share.uuid.clone(),
                field,
                id,
            });
        }
    }
    Ok(())
}

pub fn parse_decimal(share: &NormalizedShare, field: &'static str, value: &str) -> Result<Decimal, ValidationError> {
    let trimmed = value.trim();
    Decimal::from_str(trimmed)
        .or_else(|_| Decimal::from_scientific(trimmed))
        .map_err(|_| ValidationError::InvalidDecimal {
            uuid: share.uuid.clone(),
            field,
            value: value.to_string(),
        })
}
