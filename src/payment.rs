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

//! Payment records.
//!
//! Payments follow a state machine:
//! - [`Pending`] → [`Verified`] or [`Rejected`] (admin decision)
//! - [`Pending`] → [`Cancelled`] (withdrawn before a decision)
//!
//! Every other transition is refused with [`PaymentError::InvalidState`].
//!
//! [`Pending`]: PaymentStatus::Pending
//! [`Verified`]: PaymentStatus::Verified
//! [`Rejected`]: PaymentStatus::Rejected
//! [`Cancelled`]: PaymentStatus::Cancelled

use crate::base::{BillingMonth, PaymentId, TenantId, UserId, WaterReadingId};
use crate::error::{PaymentError, ValidationError};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PaymentType {
    Rent,
    Water,
    Maintenance,
    Other,
}

impl PaymentType {
    pub const ALL: [PaymentType; 4] = [
        PaymentType::Rent,
        PaymentType::Water,
        PaymentType::Maintenance,
        PaymentType::Other,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentType::Rent => "RENT",
            PaymentType::Water => "WATER",
            PaymentType::Maintenance => "MAINTENANCE",
            PaymentType::Other => "OTHER",
        }
    }
}

impl fmt::Display for PaymentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PaymentType {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "RENT" => Ok(PaymentType::Rent),
            "WATER" => Ok(PaymentType::Water),
            "MAINTENANCE" => Ok(PaymentType::Maintenance),
            "OTHER" => Ok(PaymentType::Other),
            _ => Err(ValidationError::UnknownValue {
                field: "payment type",
                value: s.to_string(),
            }),
        }
    }
}

/// How the money was paid, with the details each channel requires.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "method", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PaymentMethod {
    Mpesa { transaction_code: String },
    Cash { caretaker_name: String },
    BankTransfer { reference: Option<String> },
    Check { check_number: Option<String> },
}

impl PaymentMethod {
    pub fn name(&self) -> &'static str {
        match self {
            PaymentMethod::Mpesa { .. } => "MPESA",
            PaymentMethod::Cash { .. } => "CASH",
            PaymentMethod::BankTransfer { .. } => "BANK_TRANSFER",
            PaymentMethod::Check { .. } => "CHECK",
        }
    }

    /// Builds a method from its name and the single free-form detail column
    /// used by flat input formats.
    pub fn from_parts(name: &str, detail: Option<String>) -> Result<Self, ValidationError> {
        let detail = detail.filter(|d| !d.trim().is_empty());
        match name.trim().to_ascii_uppercase().as_str() {
            "MPESA" => Ok(PaymentMethod::Mpesa {
                transaction_code: detail.unwrap_or_default(),
            }),
            "CASH" => Ok(PaymentMethod::Cash {
                caretaker_name: detail.unwrap_or_default(),
            }),
            "BANK_TRANSFER" => Ok(PaymentMethod::BankTransfer { reference: detail }),
            "CHECK" => Ok(PaymentMethod::Check {
                check_number: detail,
            }),
            _ => Err(ValidationError::UnknownValue {
                field: "payment method",
                value: name.to_string(),
            }),
        }
    }

    /// The M-Pesa code, normalised to upper case.
    pub fn transaction_code(&self) -> Option<String> {
        match self {
            PaymentMethod::Mpesa { transaction_code } => {
                Some(transaction_code.trim().to_ascii_uppercase())
            }
            _ => None,
        }
    }

    /// Checks the method-specific required fields are present.
    pub fn validate(&self) -> Result<(), ValidationError> {
        match self {
            PaymentMethod::Mpesa { transaction_code } if transaction_code.trim().is_empty() => {
                Err(ValidationError::MissingTransactionCode)
            }
            PaymentMethod::Cash { caretaker_name } if caretaker_name.trim().is_empty() => {
                Err(ValidationError::MissingCaretakerName)
            }
            _ => Ok(()),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PaymentStatus {
    Pending,
    Verified,
    Rejected,
    Cancelled,
}

impl PaymentStatus {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, PaymentStatus::Pending)
    }

    /// Statuses that occupy the (tenant, type, month) slot.
    pub fn holds_slot(&self) -> bool {
        matches!(self, PaymentStatus::Pending | PaymentStatus::Verified)
    }

    pub fn can_transition_to(&self, next: PaymentStatus) -> bool {
        matches!(
            (self, next),
            (
                PaymentStatus::Pending,
                PaymentStatus::Verified | PaymentStatus::Rejected | PaymentStatus::Cancelled
            )
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentStatus::Pending => "PENDING",
            PaymentStatus::Verified => "VERIFIED",
            PaymentStatus::Rejected => "REJECTED",
            PaymentStatus::Cancelled => "CANCELLED",
        }
    }
}

impl fmt::Display for PaymentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PaymentStatus {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "PENDING" => Ok(PaymentStatus::Pending),
            "VERIFIED" => Ok(PaymentStatus::Verified),
            "REJECTED" => Ok(PaymentStatus::Rejected),
            "CANCELLED" => Ok(PaymentStatus::Cancelled),
            _ => Err(ValidationError::UnknownValue {
                field: "payment status",
                value: s.to_string(),
            }),
        }
    }
}

/// An admin's verdict on a pending payment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Decision {
    Verified,
    Rejected,
}

impl From<Decision> for PaymentStatus {
    fn from(decision: Decision) -> Self {
        match decision {
            Decision::Verified => PaymentStatus::Verified,
            Decision::Rejected => PaymentStatus::Rejected,
        }
    }
}

/// Who decided on the payment, when, and why.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Verification {
    pub verifier: UserId,
    pub at: DateTime<Utc>,
    pub notes: Option<String>,
}

/// A tenant's request to record a payment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentSubmission {
    pub tenant_id: TenantId,
    pub payment_type: PaymentType,
    pub method: PaymentMethod,
    pub amount: Decimal,
    pub month: BillingMonth,
    /// Identifiers of uploaded proof files (screenshots, deposit slips).
    #[serde(default)]
    pub proofs: Vec<String>,
}

impl PaymentSubmission {
    /// Checks everything that does not need the tenant record.
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.amount <= Decimal::ZERO {
            return Err(ValidationError::NonPositiveAmount(self.amount));
        }
        self.method.validate()
    }
}

/// A submitted payment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentRecord {
    pub id: PaymentId,
    pub tenant_id: TenantId,
    pub payment_type: PaymentType,
    pub method: PaymentMethod,
    pub amount: Decimal,
    pub month: BillingMonth,
    pub status: PaymentStatus,
    pub proofs: Vec<String>,
    pub created_at: DateTime<Utc>,
    pub verification: Option<Verification>,
    pub cancelled_at: Option<DateTime<Utc>>,
    /// Amount taken off the tenant balance at submission; restored on rejection.
    pub provisional_credit: Decimal,
    /// Water readings settled by this payment.
    pub water_readings: Vec<WaterReadingId>,
}

impl PaymentRecord {
    pub fn new(id: PaymentId, submission: PaymentSubmission, created_at: DateTime<Utc>) -> Self {
        Self {
            id,
            tenant_id: submission.tenant_id,
            payment_type: submission.payment_type,
            method: submission.method,
            amount: submission.amount,
            month: submission.month,
            status: PaymentStatus::Pending,
            proofs: submission.proofs,
            created_at,
            verification: None,
            cancelled_at: None,
            provisional_credit: Decimal::ZERO,
            water_readings: Vec::new(),
        }
    }

    /// Time between submission and the admin decision.
    pub fn verification_latency(&self) -> Option<chrono::Duration> {
        self.verification.as_ref().map(|v| v.at - self.created_at)
    }

    fn transition(&mut self, next: PaymentStatus) -> Result<(), PaymentError> {
        if !self.status.can_transition_to(next) {
            return Err(PaymentError::InvalidState {
                payment: self.id,
                status: self.status,
            });
        }
        self.status = next;
        Ok(())
    }

    /// Records an admin decision. Allowed exactly once, from PENDING.
    pub(crate) fn decide(
        &mut self,
        decision: Decision,
        verifier: UserId,
        notes: Option<String>,
        at: DateTime<Utc>,
    ) -> Result<(), PaymentError> {
        self.transition(decision.into())?;
        self.verification = Some(Verification {
            verifier,
            at,
            notes,
        });
        Ok(())
    }

    pub(crate) fn cancel(&mut self, at: DateTime<Utc>) -> Result<(), PaymentError> {
        self.transition(PaymentStatus::Cancelled)?;
        self.cancelled_at = Some(at);
        Ok(())
    }
}
