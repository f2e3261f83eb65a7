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

//! Receipts for verified payments.
//!
//! Receipt numbers look like `RCP-202401-0003`: prefix, billing month, and a
//! per-month sequence starting at 1.

use crate::base::{BillingMonth, PaymentId, ReceiptId, TenantId};
use crate::error::PaymentError;
use crate::payment::{PaymentRecord, PaymentStatus, PaymentType};
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};

/// Immutable proof of a verified payment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Receipt {
    pub id: ReceiptId,
    pub payment_id: PaymentId,
    pub tenant_id: TenantId,
    pub number: String,
    pub payment_type: PaymentType,
    pub amount: Decimal,
    pub month: BillingMonth,
    pub issued_at: DateTime<Utc>,
    /// Where the rendered document lives.
    pub document: String,
}

/// Issues receipts. Implementations must be idempotent per payment id.
pub trait ReceiptGenerator: Send + Sync {
    /// Returns the receipt for `payment`, creating it on first call.
    ///
    /// # Errors
    ///
    /// [`PaymentError::InvalidState`] unless the payment is VERIFIED.
    fn generate(&self, payment: &PaymentRecord) -> Result<Receipt, PaymentError>;

    fn receipt_for(&self, payment: PaymentId) -> Option<Receipt>;
}

/// In-memory receipt register keyed by payment id.
#[derive(Debug)]
pub struct ReceiptBook {
    prefix: String,
    receipts: DashMap<PaymentId, Receipt>,
    sequences: DashMap<BillingMonth, u32>,
    last_id: AtomicU64,
}

impl ReceiptBook {
    pub const DEFAULT_PREFIX: &'static str = "RCP";

    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
            receipts: DashMap::new(),
            sequences: DashMap::new(),
            last_id: AtomicU64::new(0),
        }
    }

    pub fn len(&self) -> usize {
        self.receipts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.receipts.is_empty()
    }

    /// All receipts ordered by id.
    pub fn receipts(&self) -> Vec<Receipt> {
        let mut all: Vec<Receipt> = self.receipts.iter().map(|r| r.value().clone()).collect();
        all.sort_by_key(|r| r.id);
        all
    }

    fn next_number(&self, month: BillingMonth) -> String {
        let mut seq = self.sequences.entry(month).or_insert(0);
        *seq += 1;
        format!("{}-{}-{:04}", self.prefix, month.compact(), *seq)
    }
}

impl Default for ReceiptBook {
    fn default() -> Self {
        Self::new(Self::DEFAULT_PREFIX)
    }
}

impl ReceiptGenerator for ReceiptBook {
    fn generate(&self, payment: &PaymentRecord) -> Result<Receipt, PaymentError> {
        if payment.status != PaymentStatus::Verified {
            return Err(PaymentError::InvalidState {
                payment: payment.id,
                status: payment.status,
            });
        }

        // Entry API holds the shard lock, so concurrent calls for one payment
        // cannot both issue a receipt.
        match self.receipts.entry(payment.id) {
            Entry::Occupied(existing) => Ok(existing.get().clone()),
            Entry::Vacant(slot) => {
                let number = self.next_number(payment.month);
                let receipt = Receipt {
                    id: ReceiptId(self.last_id.fetch_add(1, Ordering::SeqCst) + 1),
                    payment_id: payment.id,
                    tenant_id: payment.tenant_id,
                    document: format!("receipts/{}/{}.pdf", payment.tenant_id, number),
                    number,
                    payment_type: payment.payment_type,
                    amount: payment.amount,
                    month: payment.month,
                    issued_at: payment
                        .verification
                        .as_ref()
                        .map_or(payment.created_at, |v| v.at),
                };
                tracing::info!(
                    payment = %payment.id,
                    receipt = %receipt.number,
                    "receipt issued"
                );
                slot.insert(receipt.clone());
                Ok(receipt)
            }
        }
    }

    fn receipt_for(&self, payment: PaymentId) -> Option<Receipt> {
        self.receipts.get(&payment).map(|r| r.value().clone())
    }
}
