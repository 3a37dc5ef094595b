use clickhouse::Row;
use rust_decimal::Decimal;
use serde::Serialize;

use crate::models::NormalizedShare;
use crate::validation::{self, ValidationError};

/// Precision and scale of the `Decimal(38, 18)` columns.
pub const DECIMAL_PRECISION: u32 = 38;
pub const DECIMAL_SCALE: u32 = 18;

/// One row of the `shares` table in RowBinary layout.
///
/// Decimal columns travel as their raw `Decimal128(18)` mantissa and
/// `share_date` as `DateTime64(3)` ticks.
#[derive(Debug, Clone, PartialEq, Row, Serialize)]
pub struct ShareRow {
    pub uuid: String,
    pub server_id: String,
    pub coin_id: i64,
    pub worker_id: i64,
    pub wallet_id: i64,
    pub share_date: i64,
    pub difficulty: i128,
    pub sharedif: i128,
    pub nonce: String,
    pub is_solo: bool,
    pub reward_method: String,
    pub cost: i128,
}

impl TryFrom<&NormalizedShare> for ShareRow {
    type Error = ValidationError;

    fn try_from(share: &NormalizedShare) -> Result<Self, Self::Error> {
        validation::validate_share_ids(share)?;

        Ok(Self {
            uuid: share.uuid.clone(),
            server_id: share.server_id.clone(),
            coin_id: share.coin_id,
            worker_id: share.worker_id,
            wallet_id: share.wallet_id,
            share_date: share.share_date,
            difficulty: decimal_column(share, "difficulty", &share.difficulty)?,
            sharedif: decimal_column(share, "sharedif", &share.sharedif)?,
            nonce: share.nonce.clone(),
            is_solo: share.is_solo,
            reward_method: share.reward_method.clone(),
            cost: decimal_column(share, "cost", &share.cost)?,
        })
    }
}

/// Convert the whole batch, failing on the first bad record.
pub fn rows_for_batch(shares: &[NormalizedShare]) -> Result<Vec<ShareRow>, ValidationError> {
    shares.iter().map(ShareRow::try_from).collect()
}

fn decimal_column(share: &NormalizedShare, field: &'static str, value: &str) -> Result<i128, ValidationError> {
    let decimal = validation::parse_decimal(share, field, value)?;
    to_fixed_scale(decimal).ok_or_else(|| ValidationError::InvalidDecimal {
        uuid: share.uuid.clone(),
        field,
        value: value.to_string(),
    })
}

/// Mantissa of `value` at `DECIMAL_SCALE`, rounding extra fractional digits.
/// `None` when the result needs more than `DECIMAL_PRECISION` digits.
pub fn to_fixed_scale(value: Decimal) -> Option<i128> {
    let value = value.round_dp(DECIMAL_SCALE);
    let factor = 10i128.checked_pow(DECIMAL_SCALE - value.scale())?;
    value
        .mantissa()
        .checked_mul(factor)
        .filter(|mantissa| mantissa.unsigned_abs() < 10u128.pow(DECIMAL_PRECISION))
}
