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

//! Tenant accounts.
//!
//! A positive balance is money the tenant owes. Balance only moves through
//! the payment workflow; the status follows the balance:
//!
//! ```text
//!  balance <= 0 ──► CURRENT
//!  balance  > 0 ──► OVERDUE (DELINQUENT stays DELINQUENT)
//!  EVICTED / FORMER never change on payment
//! ```
//!
//! # Example
//!
//! ```
//! use rust_decimal_macros::dec;
//! use rental_ledger_rs::{TenantAccount, TenantId, TenantStatus};
//!
//! let tenant = TenantAccount::new(TenantId(1), "Amina", "A1", dec!(15000), dec!(150)).unwrap();
//! assert_eq!(tenant.balance(), dec!(0));
//! assert_eq!(tenant.status(), TenantStatus::Current);
//! ```

use crate::base::TenantId;
use crate::error::{PaymentError, ValidationError};
use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TenantStatus {
    Current,
    Overdue,
    Delinquent,
    Evicted,
    Former,
}

impl TenantStatus {
    /// Whether the tenant still occupies a unit and is billed.
    pub fn is_active(&self) -> bool {
        !matches!(self, TenantStatus::Evicted | TenantStatus::Former)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            TenantStatus::Current => "CURRENT",
            TenantStatus::Overdue => "OVERDUE",
            TenantStatus::Delinquent => "DELINQUENT",
            TenantStatus::Evicted => "EVICTED",
            TenantStatus::Former => "FORMER",
        }
    }
}

impl fmt::Display for TenantStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TenantStatus {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "CURRENT" => Ok(TenantStatus::Current),
            "OVERDUE" => Ok(TenantStatus::Overdue),
            "DELINQUENT" => Ok(TenantStatus::Delinquent),
            "EVICTED" => Ok(TenantStatus::Evicted),
            "FORMER" => Ok(TenantStatus::Former),
            _ => Err(ValidationError::UnknownValue {
                field: "tenant status",
                value: s.to_string(),
            }),
        }
    }
}

/// A resident renting a unit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TenantAccount {
    pub id: TenantId,
    pub name: String,
    pub unit: String,
    /// Monthly rent; a RENT payment must match it exactly.
    pub rent_amount: Decimal,
    /// Price per unit of water consumed.
    pub water_rate: Decimal,
    /// Last day of the lease, if it has an end date.
    pub lease_end: Option<NaiveDate>,
    balance: Decimal,
    status: TenantStatus,
}

impl TenantAccount {
    /// Currency values are reported with two decimal places.
    pub const CURRENCY_PRECISION: u32 = 2;

    /// Onboards a tenant with a zero balance.
    ///
    /// # Errors
    ///
    /// [`ValidationError::InvalidRentAmount`] when rent is not positive and
    /// [`ValidationError::InvalidWaterRate`] when the water rate is negative.
    pub fn new(
        id: TenantId,
        name: impl Into<String>,
        unit: impl Into<String>,
        rent_amount: Decimal,
        water_rate: Decimal,
    ) -> Result<Self, PaymentError> {
        if rent_amount <= Decimal::ZERO {
            return Err(ValidationError::InvalidRentAmount(rent_amount).into());
        }
        if water_rate < Decimal::ZERO {
            return Err(ValidationError::InvalidWaterRate(water_rate).into());
        }
        Ok(Self {
            id,
            name: name.into(),
            unit: unit.into(),
            rent_amount,
            water_rate,
            lease_end: None,
            balance: Decimal::ZERO,
            status: TenantStatus::Current,
        })
    }

    /// Sets the balance carried over at onboarding and derives the status from it.
    pub fn with_opening_balance(mut self, balance: Decimal) -> Self {
        self.balance = balance;
        self.recompute_status();
        self
    }

    pub fn with_lease_end(mut self, lease_end: NaiveDate) -> Self {
        self.lease_end = Some(lease_end);
        self
    }

    pub fn balance(&self) -> Decimal {
        self.balance
    }

    pub fn status(&self) -> TenantStatus {
        self.status
    }

    /// Whether the lease is still running on `date`.
    pub fn lease_covers(&self, date: NaiveDate) -> bool {
        self.lease_end.is_none_or(|end| end >= date)
    }

    /// Applies an externally decided status change (eviction, move-out, escalation).
    ///
    /// # Errors
    ///
    /// [`ValidationError::CurrentWithBalance`] when marking CURRENT while money is owed.
    pub fn mark(&mut self, status: TenantStatus) -> Result<(), PaymentError> {
        if status == TenantStatus::Current && self.balance > Decimal::ZERO {
            return Err(ValidationError::CurrentWithBalance(self.balance).into());
        }
        self.status = status;
        self.assert_invariants();
        Ok(())
    }

    /// Reduces the balance by `amount`, floored at zero.
    ///
    /// A balance already in credit is left as it is. Returns the amount
    /// actually taken off the balance, which is never negative and is what a
    /// later reversal must restore.
    pub(crate) fn apply_payment(&mut self, amount: Decimal) -> Decimal {
        let before = self.balance;
        if before > Decimal::ZERO {
            self.balance = (before - amount.max(Decimal::ZERO)).max(Decimal::ZERO);
        }
        self.recompute_status();
        before - self.balance
    }

    /// Restores an amount previously returned by [`apply_payment`](Self::apply_payment).
    pub(crate) fn reverse_payment(&mut self, applied: Decimal) {
        self.balance += applied;
        self.recompute_status();
    }

    fn recompute_status(&mut self) {
        self.status = match self.status {
            TenantStatus::Evicted | TenantStatus::Former => self.status,
            _ if self.balance <= Decimal::ZERO => TenantStatus::Current,
            TenantStatus::Delinquent => TenantStatus::Delinquent,
            _ => TenantStatus::Overdue,
        };
        self.assert_invariants();
    }

    fn assert_invariants(&self) {
        debug_assert!(
            self.status != TenantStatus::Current || self.balance <= Decimal::ZERO,
            "Invariant violated: CURRENT tenant {} owes {}",
            self.id,
            self.balance
        );
    }
}
