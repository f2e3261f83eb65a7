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

//! Status-change notifications.
//!
//! Delivery is best effort: the workflow logs a failed dispatch and carries on.

use crate::base::{BillingMonth, PaymentId, TenantId};
use crate::payment::{PaymentRecord, PaymentType};
use crossbeam::queue::SegQueue;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Recipient {
    Admin,
    Tenant(TenantId),
}

/// Message template to render.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum NotificationKind {
    PaymentSubmitted,
    PaymentVerified,
    PaymentRejected,
    PaymentCancelled,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notification {
    pub recipient: Recipient,
    pub kind: NotificationKind,
    pub payment_id: PaymentId,
    pub tenant_id: TenantId,
    pub payment_type: PaymentType,
    pub amount: Decimal,
    pub month: BillingMonth,
    pub notes: Option<String>,
}

impl Notification {
    pub fn about(payment: &PaymentRecord, recipient: Recipient, kind: NotificationKind) -> Self {
        Self {
            recipient,
            kind,
            payment_id: payment.id,
            tenant_id: payment.tenant_id,
            payment_type: payment.payment_type,
            amount: payment.amount,
            month: payment.month,
            notes: payment.verification.as_ref().and_then(|v| v.notes.clone()),
        }
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum NotifyError {
    #[error("notification channel unavailable: {0}")]
    Unavailable(String),

    #[error("notification rejected by provider: {0}")]
    Rejected(String),
}

/// Sends notifications to tenants and admins (email, SMS, push).
pub trait NotificationDispatcher: Send + Sync {
    fn notify(&self, notification: &Notification) -> Result<(), NotifyError>;
}

/// Queues notifications for a delivery worker to drain.
#[derive(Debug, Default)]
pub struct Outbox {
    queue: SegQueue<Notification>,
}

impl Outbox {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    /// Removes and returns every queued notification in FIFO order.
    pub fn drain(&self) -> Vec<Notification> {
        std::iter::from_fn(|| self.queue.pop()).collect()
    }
}

impl NotificationDispatcher for Outbox {
    fn notify(&self, notification: &Notification) -> Result<(), NotifyError> {
        self.queue.push(notification.clone());
        Ok(())
    }
}

/// Writes notifications to the log instead of delivering them.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogDispatcher;

impl NotificationDispatcher for LogDispatcher {
    fn notify(&self, notification: &Notification) -> Result<(), NotifyError> {
        tracing::info!(
            recipient = ?notification.recipient,
            kind = ?notification.kind,
            payment = %notification.payment_id,
            tenant = %notification.tenant_id,
            amount = %notification.amount,
            month = %notification.month,
            "notification"
        );
        Ok(())
    }
}
