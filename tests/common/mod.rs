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

//! Shared fixtures for integration tests.

#![allow(dead_code)]

use chrono::{DateTime, TimeZone, Utc};
use rental_ledger_rs::audit::AuditLog;
use rental_ledger_rs::clock::ManualClock;
use rental_ledger_rs::notify::{Notification, NotificationDispatcher, NotifyError, Outbox};
use rental_ledger_rs::receipt::ReceiptBook;
use rental_ledger_rs::storage::{MemoryStore, Storage};
use rental_ledger_rs::{
    BillingMonth, PaymentMethod, PaymentSubmission, PaymentType, PaymentWorkflow, TenantAccount,
    TenantId,
};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

pub const RENT: Decimal = dec!(15000);
pub const WATER_RATE: Decimal = dec!(150);

/// Workflow wired to in-memory collaborators the test can inspect.
pub struct Harness {
    pub workflow: PaymentWorkflow<MemoryStore>,
    pub receipts: Arc<ReceiptBook>,
    pub outbox: Arc<Outbox>,
    pub audit: Arc<AuditLog>,
    pub clock: Arc<ManualClock>,
}

impl Harness {
    pub fn balance(&self, tenant: u32) -> Decimal {
        self.tenant(tenant).balance()
    }

    pub fn tenant(&self, tenant: u32) -> TenantAccount {
        self.workflow
            .store()
            .tenant(TenantId(tenant))
            .unwrap()
            .unwrap()
    }
}

/// Always refuses delivery and counts attempts.
#[derive(Debug, Default)]
pub struct FailingDispatcher {
    pub attempts: AtomicUsize,
}

impl NotificationDispatcher for FailingDispatcher {
    fn notify(&self, _notification: &Notification) -> Result<(), NotifyError> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        Err(NotifyError::Unavailable("smtp down".to_string()))
    }
}

pub fn start_time() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 1, 15, 9, 0, 0).unwrap()
}

pub fn month(s: &str) -> BillingMonth {
    s.parse().unwrap()
}

/// Tenant owing one month of rent.
pub fn make_tenant(id: u32) -> TenantAccount {
    make_tenant_owing(id, RENT)
}

pub fn make_tenant_owing(id: u32, balance: Decimal) -> TenantAccount {
    TenantAccount::new(
        TenantId(id),
        format!("Tenant {}", id),
        format!("U{}", id),
        RENT,
        WATER_RATE,
    )
    .unwrap()
    .with_opening_balance(balance)
}

pub fn make_harness(tenants: Vec<TenantAccount>) -> Harness {
    let receipts = Arc::new(ReceiptBook::default());
    let outbox = Arc::new(Outbox::new());
    let audit = Arc::new(AuditLog::new());
    let clock = Arc::new(ManualClock::new(start_time()));
    let workflow = PaymentWorkflow::new(
        MemoryStore::with_tenants(tenants).unwrap(),
        receipts.clone(),
        outbox.clone(),
        audit.clone(),
    )
    .with_clock(clock.clone());
    Harness {
        workflow,
        receipts,
        outbox,
        audit,
        clock,
    }
}

pub fn make_submission(
    tenant: u32,
    payment_type: PaymentType,
    amount: Decimal,
    billing_month: &str,
) -> PaymentSubmission {
    PaymentSubmission {
        tenant_id: TenantId(tenant),
        payment_type,
        method: PaymentMethod::Cash {
            caretaker_name: "Otieno".to_string(),
        },
        amount,
        month: month(billing_month),
        proofs: vec![],
    }
}

pub fn make_rent(tenant: u32, billing_month: &str) -> PaymentSubmission {
    make_submission(tenant, PaymentType::Rent, RENT, billing_month)
}

pub fn make_mpesa_rent(tenant: u32, billing_month: &str, code: &str) -> PaymentSubmission {
    PaymentSubmission {
        method: PaymentMethod::Mpesa {
            transaction_code: code.to_string(),
        },
        ..make_rent(tenant, billing_month)
    }
}
