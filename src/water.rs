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

//! Water meter readings.

use crate::base::{BillingMonth, PaymentId, TenantId, WaterReadingId};
use crate::error::{PaymentError, ValidationError};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// One month's meter reading for a tenant and the charge it produces.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WaterReading {
    pub id: WaterReadingId,
    pub tenant_id: TenantId,
    pub month: BillingMonth,
    pub previous_reading: Decimal,
    pub current_reading: Decimal,
    /// Tenant water rate at the time of reading.
    pub rate: Decimal,
    pub recorded_at: DateTime<Utc>,
    pub paid: bool,
    pub payment_id: Option<PaymentId>,
}

impl WaterReading {
    /// # Errors
    ///
    /// [`ValidationError::MeterWentBackwards`] when `current < previous`.
    pub fn new(
        id: WaterReadingId,
        tenant_id: TenantId,
        month: BillingMonth,
        previous_reading: Decimal,
        current_reading: Decimal,
        rate: Decimal,
        recorded_at: DateTime<Utc>,
    ) -> Result<Self, PaymentError> {
        if current_reading < previous_reading {
            return Err(ValidationError::MeterWentBackwards {
                previous: previous_reading,
                current: current_reading,
            }
            .into());
        }
        Ok(Self {
            id,
            tenant_id,
            month,
            previous_reading,
            current_reading,
            rate,
            recorded_at,
            paid: false,
            payment_id: None,
        })
    }

    pub fn consumption(&self) -> Decimal {
        self.current_reading - self.previous_reading
    }

    pub fn amount(&self) -> Decimal {
        self.consumption() * self.rate
    }

    pub(crate) fn settle(&mut self, payment: PaymentId) {
        self.paid = true;
        self.payment_id = Some(payment);
    }

    pub(crate) fn release(&mut self) {
        self.paid = false;
        self.payment_id = None;
    }
}
