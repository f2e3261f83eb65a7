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

//! # Rental Ledger
//!
//! Payment workflow for a rental property: tenants submit rent, water and
//! other payments, administrators verify or reject them, and verified
//! payments earn a receipt.
//!
//! ## Core Components
//!
//! - [`PaymentWorkflow`]: submission, verification, cancellation and reporting
//! - [`TenantAccount`]: tenant balance and standing
//! - [`PaymentRecord`]: a submitted payment and its lifecycle
//! - [`storage::Storage`]: atomic persistence with unique-slot enforcement
//! - [`receipt::ReceiptGenerator`], [`notify::NotificationDispatcher`],
//!   [`audit::AuditRecorder`]: injected collaborators
//! - [`PaymentError`]: NotFound, Validation, Conflict and InvalidState failures
//!
//! ## Example
//!
//! ```
//! use std::sync::Arc;
//! use rental_ledger_rs::audit::AuditLog;
//! use rental_ledger_rs::notify::Outbox;
//! use rental_ledger_rs::receipt::ReceiptBook;
//! use rental_ledger_rs::storage::{MemoryStore, Storage};
//! use rental_ledger_rs::{
//!     Decision, PaymentMethod, PaymentStatus, PaymentSubmission, PaymentType, PaymentWorkflow,
//!     TenantAccount, TenantId, UserId,
//! };
//! use rust_decimal_macros::dec;
//!
//! let tenant = TenantAccount::new(TenantId(1), "Amina", "A1", dec!(15000), dec!(150))
//!     .unwrap()
//!     .with_opening_balance(dec!(15000));
//! let workflow = PaymentWorkflow::new(
//!     MemoryStore::with_tenants([tenant]).unwrap(),
//!     Arc::new(ReceiptBook::default()),
//!     Arc::new(Outbox::new()),
//!     Arc::new(AuditLog::new()),
//! );
//!
//! let payment = workflow
//!     .submit_payment(PaymentSubmission {
//!         tenant_id: TenantId(1),
//!         payment_type: PaymentType::Rent,
//!         method: PaymentMethod::Mpesa { transaction_code: "QK7XY12".into() },
//!         amount: dec!(15000),
//!         month: "2024-01".parse().unwrap(),
//!         proofs: vec![],
//!     })
//!     .unwrap();
//!
//! let verified = workflow
//!     .verify_payment(payment.id, Decision::Verified, UserId(1), None)
//!     .unwrap();
//! assert_eq!(verified.status, PaymentStatus::Verified);
//! assert!(workflow.receipt_for(payment.id).is_some());
//!
//! let tenant = workflow.store().tenant(TenantId(1)).unwrap().unwrap();
//! assert_eq!(tenant.balance(), dec!(0));
//! ```
//!
//! ## Thread Safety
//!
//! Every write runs inside one [`storage::Storage::atomically`] call, so
//! concurrent submissions for the same tenant, type and month cannot both
//! succeed.

pub mod audit;
mod base;
pub mod clock;
pub mod config;
pub mod error;
pub mod notify;
mod payment;
pub mod receipt;
pub mod reports;
pub mod storage;
mod tenant;
mod water;
mod workflow;

pub use base::{BillingMonth, BillingMonthError, PaymentId, ReceiptId, TenantId, UserId, WaterReadingId};
pub use error::{ConflictError, Missing, PaymentError, ValidationError};
pub use payment::{
    Decision, PaymentMethod, PaymentRecord, PaymentStatus, PaymentSubmission, PaymentType,
    Verification,
};
pub use tenant::{TenantAccount, TenantStatus};
pub use water::WaterReading;
pub use workflow::{BulkFailure, BulkVerification, MeterReading, PaymentWorkflow};
