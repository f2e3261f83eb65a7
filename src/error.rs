// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2025 Daniel Negri
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU Affero General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
// GNU Affero General Public License for more details.
//
// You should have received a copy of the GNU Affero General Public License
// along with this program. If not, see <https://www.gnu.org/licenses/>.

//! Error types for the payment workflow.

use crate::base::{BillingMonth, BillingMonthError, PaymentId, TenantId, WaterReadingId};
use crate::payment::{PaymentStatus, PaymentType};
use rust_decimal::Decimal;
use std::fmt;
use thiserror::Error;

/// Workflow errors.
///
/// Every variant propagates unchanged to the caller; translating them into
/// user-facing messages is the caller's job.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PaymentError {
    /// Referenced tenant, payment or reading does not exist
    #[error("{0} not found")]
    NotFound(Missing),

    /// Input rejected before any state was touched
    #[error("validation failed: {0}")]
    Validation(#[from] ValidationError),

    /// Operation would break a uniqueness rule
    #[error("conflict: {0}")]
    Conflict(#[from] ConflictError),

    /// Payment is not in a status that allows the requested transition
    #[error("payment {payment} is {status}, expected PENDING")]
    InvalidState {
        payment: PaymentId,
        status: PaymentStatus,
    },

    /// Persistence failure; the whole operation was rolled back
    #[error("storage error: {0}")]
    Storage(String),
}

/// The entity a [`PaymentError::NotFound`] refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Missing {
    Tenant(TenantId),
    Payment(PaymentId),
    WaterReading(WaterReadingId),
}

impl fmt::Display for Missing {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Missing::Tenant(id) => write!(f, "tenant {id}"),
            Missing::Payment(id) => write!(f, "payment {id}"),
            Missing::WaterReading(id) => write!(f, "water reading {id}"),
        }
    }
}

/// Reasons a request fails validation.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("amount must be positive, got {0}")]
    NonPositiveAmount(Decimal),

    /// Rent must be paid in full; partial payments are refused up front.
    #[error("rent payment of {actual} does not match rent amount {expected}")]
    RentMismatch { expected: Decimal, actual: Decimal },

    #[error("M-Pesa payments require a transaction code")]
    MissingTransactionCode,

    #[error("cash payments require the receiving caretaker's name")]
    MissingCaretakerName,

    #[error("tenant {tenant} does not own payment {payment}")]
    NotPaymentOwner { tenant: TenantId, payment: PaymentId },

    #[error("meter reading {current} is below previous reading {previous}")]
    MeterWentBackwards { previous: Decimal, current: Decimal },

    #[error("rent amount must be positive, got {0}")]
    InvalidRentAmount(Decimal),

    #[error("water rate must not be negative, got {0}")]
    InvalidWaterRate(Decimal),

    #[error("tenant with a positive balance of {0} cannot be CURRENT")]
    CurrentWithBalance(Decimal),

    #[error("projection horizon of {requested} months exceeds the maximum of {max}")]
    ProjectionTooLong { requested: u32, max: u32 },

    #[error(transparent)]
    BillingMonth(#[from] BillingMonthError),

    #[error("unknown {field} '{value}'")]
    UnknownValue { field: &'static str, value: String },
}

/// Uniqueness rules a request would violate.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConflictError {
    #[error("tenant {tenant} already has open {payment_type} payment {existing} for {month}")]
    DuplicatePayment {
        tenant: TenantId,
        payment_type: PaymentType,
        month: BillingMonth,
        existing: PaymentId,
    },

    #[error("M-Pesa transaction code '{code}' is already used by payment {existing}")]
    TransactionCodeReused { code: String, existing: PaymentId },

    #[error("tenant {0} already exists")]
    TenantExists(TenantId),

    #[error("tenant {tenant} already has a water reading for {month}")]
    DuplicateReading { tenant: TenantId, month: BillingMonth },
}

impl PaymentError {
    /// Short machine-readable code, e.g. for bulk verification reports.
    pub fn code(&self) -> &'static str {
        match self {
            PaymentError::NotFound(_) => "not_found",
            PaymentError::Validation(_) => "validation",
            PaymentError::Conflict(_) => "conflict",
            PaymentError::InvalidState { .. } => "invalid_state",
            PaymentError::Storage(_) => "storage",
        }
    }
}

impl From<BillingMonthError> for PaymentError {
    fn from(err: BillingMonthError) -> Self {
        PaymentError::Validation(ValidationError::BillingMonth(err))
    }
}
