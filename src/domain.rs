//! Banking value types
//!
//! Plain structs for the records the cache layer moves around. Validation
//! lives in free functions returning `Result`, never in constructors.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Longest description accepted on a transfer
pub const MAX_DESCRIPTION_LENGTH: usize = 140;

/// Largest single transfer, in cents
pub const MAX_TRANSFER_CENTS: i64 = 5_000_000;

// == Transaction ==
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransactionKind {
    Credit,
    Debit,
}

/// A booked movement on an account, as shown in the extract.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transaction {
    pub id: String,
    pub account_id: String,
    pub counterparty: String,
    pub description: String,
    pub amount_cents: i64,
    pub kind: TransactionKind,
    pub created_at: DateTime<Utc>,
}

// == Filter ==
/// Extract filter; compared structurally to suppress repeated filter events.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionFilter {
    #[serde(default)]
    pub kind: Option<TransactionKind>,
    #[serde(default)]
    pub min_amount_cents: Option<i64>,
    #[serde(default)]
    pub max_amount_cents: Option<i64>,
}

impl TransactionFilter {
    pub fn matches(&self, tx: &Transaction) -> bool {
        self.kind.map_or(true, |kind| tx.kind == kind)
            && self.min_amount_cents.map_or(true, |min| tx.amount_cents >= min)
            && self.max_amount_cents.map_or(true, |max| tx.amount_cents <= max)
    }
}

// == Transfer ==
/// A transfer request as submitted from the transfer form.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transfer {
    /// Empty means the signed-in account
    #[serde(default)]
    pub from_account: String,
    pub to_account: String,
    pub amount_cents: i64,
    #[serde(default)]
    pub description: String,
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("amount must be greater than zero")]
    NonPositiveAmount,

    #[error("amount exceeds the transfer limit of {} cents", MAX_TRANSFER_CENTS)]
    AmountOverLimit,

    #[error("destination account is required")]
    MissingDestination,

    #[error("source and destination accounts must differ")]
    SameAccount,

    #[error("description exceeds {} characters", MAX_DESCRIPTION_LENGTH)]
    DescriptionTooLong,
}

/// Checks a transfer before it is sent anywhere.
pub fn validate_transfer(transfer: &Transfer) -> Result<(), ValidationError> {
    if transfer.amount_cents <= 0 {
        return Err(ValidationError::NonPositiveAmount);
    }
    if transfer.amount_cents > MAX_TRANSFER_CENTS {
        return Err(ValidationError::AmountOverLimit);
    }
    if transfer.to_account.trim().is_empty() {
        return Err(ValidationError::MissingDestination);
    }
    if transfer.to_account == transfer.from_account {
        return Err(ValidationError::SameAccount);
    }
    if transfer.description.chars().count() > MAX_DESCRIPTION_LENGTH {
        return Err(ValidationError::DescriptionTooLong);
    }
    Ok(())
}
