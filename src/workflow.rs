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

//! Payment workflow.
//!
//! The [`PaymentWorkflow`] is the only writer of payment status and tenant
//! balance. It validates submissions, applies the provisional balance
//! adjustment, runs admin decisions through the status state machine, issues
//! receipts, and emits notifications and audit entries.
//!
//! # Balance policy
//!
//! - **Submit RENT**: balance becomes `max(0, balance - amount)`; the amount
//!   actually taken off is stored on the payment as `provisional_credit`. A
//!   balance already in credit is left alone.
//! - **Verify**: only the part of the amount the balance has not absorbed
//!   yet is applied, so a submission that found the balance at zero still
//!   counts once the balance rises again.
//! - **Reject / cancel**: `provisional_credit` is added back, then the
//!   tenant's other open RENT payments absorb the restored balance, oldest
//!   first.
//!
//! Between operations the balance always equals the opening balance minus
//! the `provisional_credit` of every PENDING or VERIFIED payment.
//!
//! # Atomicity
//!
//! Each operation's storage effects run inside one [`Storage::atomically`]
//! call. Notifications and audit entries follow a successful commit;
//! notification failures are logged and swallowed.

use crate::audit::{Actor, AuditAction, AuditEntry, AuditRecorder};
use crate::base::{BillingMonth, PaymentId, TenantId, UserId};
use crate::clock::{Clock, SystemClock};
use crate::config::WorkflowConfig;
use crate::error::{ConflictError, Missing, PaymentError, ValidationError};
use crate::notify::{Notification, NotificationDispatcher, NotificationKind, Recipient};
use crate::payment::{Decision, PaymentRecord, PaymentStatus, PaymentSubmission, PaymentType};
use crate::receipt::{Receipt, ReceiptGenerator};
use crate::reports::{
    self, HistoryFilter, PaymentHistory, PaymentStatistics, RevenueProjection, StatsPeriod,
};
use crate::storage::{Storage, StorageTx};
use crate::tenant::TenantAccount;
use crate::water::WaterReading;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// A payment id that could not be processed in a bulk run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BulkFailure {
    pub id: PaymentId,
    pub error: PaymentError,
}

/// Outcome of [`PaymentWorkflow::process_bulk_verification`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BulkVerification {
    pub successful: Vec<PaymentId>,
    pub failed: Vec<BulkFailure>,
}

/// Input for [`PaymentWorkflow::record_water_reading`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MeterReading {
    pub tenant_id: TenantId,
    pub month: BillingMonth,
    pub previous_reading: Decimal,
    pub current_reading: Decimal,
}

/// Orchestrates payment submission, verification and reporting.
///
/// Collaborators are injected; the workflow keeps no per-request state, so
/// one instance can serve concurrent callers.
pub struct PaymentWorkflow<S: Storage> {
    store: S,
    receipts: Arc<dyn ReceiptGenerator>,
    notifier: Arc<dyn NotificationDispatcher>,
    audit: Arc<dyn AuditRecorder>,
    clock: Arc<dyn Clock>,
    config: WorkflowConfig,
}

impl<S: Storage> PaymentWorkflow<S> {
    /// Creates a workflow using the system clock and default settings.
    pub fn new(
        store: S,
        receipts: Arc<dyn ReceiptGenerator>,
        notifier: Arc<dyn NotificationDispatcher>,
        audit: Arc<dyn AuditRecorder>,
    ) -> Self {
        Self {
            store,
            receipts,
            notifier,
            audit,
            clock: Arc::new(SystemClock),
            config: WorkflowConfig::default(),
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_config(mut self, config: WorkflowConfig) -> Self {
        self.config = config;
        self
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn config(&self) -> &WorkflowConfig {
        &self.config
    }

    /// Records a tenant's payment as PENDING.
    ///
    /// RENT payments must equal the tenant's rent exactly and immediately
    /// reduce the balance (floored at zero). WATER payments settle the
    /// tenant's unpaid readings for the month.
    ///
    /// # Errors
    ///
    /// - [`PaymentError::Validation`] - non-positive amount, missing method
    ///   details, or rent amount mismatch.
    /// - [`PaymentError::NotFound`] - unknown tenant.
    /// - [`PaymentError::Conflict`] - an open payment already exists for the
    ///   same tenant, type and month, or the M-Pesa code was used before.
    pub fn submit_payment(
        &self,
        submission: PaymentSubmission,
    ) -> Result<PaymentRecord, PaymentError> {
        submission.validate()?;
        let now = self.clock.now();

        let payment = self.store.atomically(|tx| {
            let mut tenant = tx
                .tenant(submission.tenant_id)
                .ok_or(PaymentError::NotFound(Missing::Tenant(submission.tenant_id)))?;

            if submission.payment_type == PaymentType::Rent
                && submission.amount != tenant.rent_amount
            {
                return Err(ValidationError::RentMismatch {
                    expected: tenant.rent_amount,
                    actual: submission.amount,
                }
                .into());
            }

            if let Some(existing) =
                tx.open_payment(tenant.id, submission.payment_type, submission.month)
            {
                return Err(ConflictError::DuplicatePayment {
                    tenant: tenant.id,
                    payment_type: submission.payment_type,
                    month: submission.month,
                    existing,
                }
                .into());
            }

            if let Some(code) = submission.method.transaction_code() {
                if let Some(existing) = tx.transaction_code_owner(&code) {
                    return Err(ConflictError::TransactionCodeReused { code, existing }.into());
                }
            }

            let id = tx.next_payment_id();
            let mut payment = PaymentRecord::new(id, submission, now);

            match payment.payment_type {
                PaymentType::Rent => {
                    payment.provisional_credit = tenant.apply_payment(payment.amount);
                    tx.save_tenant(tenant)?;
                }
                PaymentType::Water => settle_water_readings(tx, &mut payment)?,
                PaymentType::Maintenance | PaymentType::Other => {}
            }

            tx.insert_payment(payment.clone())?;
            Ok(payment)
        })?;

        tracing::info!(
            payment = %payment.id,
            tenant = %payment.tenant_id,
            payment_type = %payment.payment_type,
            amount = %payment.amount,
            month = %payment.month,
            "payment submitted"
        );

        self.dispatch(Notification::about(
            &payment,
            Recipient::Admin,
            NotificationKind::PaymentSubmitted,
        ));
        self.audit.record(AuditEntry::payment(
            Actor::Tenant(payment.tenant_id),
            AuditAction::Create,
            None,
            &payment,
            now,
        ));

        Ok(payment)
    }

    /// Applies an admin decision to a PENDING payment.
    ///
    /// VERIFIED issues exactly one receipt; REJECTED restores the provisional
    /// balance adjustment and releases linked water readings.
    ///
    /// # Errors
    ///
    /// - [`PaymentError::NotFound`] - unknown payment.
    /// - [`PaymentError::InvalidState`] - the payment was already decided or cancelled.
    pub fn verify_payment(
        &self,
        id: PaymentId,
        decision: Decision,
        verifier: UserId,
        notes: Option<String>,
    ) -> Result<PaymentRecord, PaymentError> {
        let now = self.clock.now();

        let (before, payment, receipt) = self.store.atomically(|tx| {
            let mut payment = tx
                .payment(id)
                .ok_or(PaymentError::NotFound(Missing::Payment(id)))?;
            let before = payment.clone();
            payment.decide(decision, verifier, notes, now)?;

            match decision {
                // Submission already did most of the work; pick up what it
                // could not.
                Decision::Verified => match payment.payment_type {
                    PaymentType::Rent => {
                        let mut tenant = tx
                            .tenant(payment.tenant_id)
                            .ok_or(PaymentError::NotFound(Missing::Tenant(payment.tenant_id)))?;
                        apply_rent_shortfall(&mut tenant, &mut payment);
                        tx.save_tenant(tenant)?;
                    }
                    PaymentType::Water => settle_water_readings(tx, &mut payment)?,
                    PaymentType::Maintenance | PaymentType::Other => {}
                },
                Decision::Rejected => undo_provisional_effects(tx, &payment)?,
            }

            tx.save_payment(payment.clone())?;

            // Last fallible step: nothing after it can roll the payment back.
            let receipt = match decision {
                Decision::Verified => Some(self.receipts.generate(&payment)?),
                Decision::Rejected => None,
            };
            Ok((before, payment, receipt))
        })?;

        let (kind, action) = match decision {
            Decision::Verified => (NotificationKind::PaymentVerified, AuditAction::Verify),
            Decision::Rejected => (NotificationKind::PaymentRejected, AuditAction::Reject),
        };

        tracing::info!(
            payment = %payment.id,
            tenant = %payment.tenant_id,
            verifier = %verifier,
            status = %payment.status,
            receipt = receipt.as_ref().map(|r| r.number.as_str()),
            "payment decided"
        );

        self.dispatch(Notification::about(
            &payment,
            Recipient::Tenant(payment.tenant_id),
            kind,
        ));
        self.audit.record(AuditEntry::payment(
            Actor::Admin(verifier),
            action,
            Some(&before),
            &payment,
            now,
        ));

        Ok(payment)
    }

    /// Applies one decision to many payments, each in its own atomic unit.
    ///
    /// Failures are collected per id and never abort the batch.
    pub fn process_bulk_verification(
        &self,
        ids: &[PaymentId],
        decision: Decision,
        verifier: UserId,
        notes: Option<&str>,
    ) -> BulkVerification {
        let mut outcome = BulkVerification::default();
        for &id in ids {
            match self.verify_payment(id, decision, verifier, notes.map(str::to_owned)) {
                Ok(_) => outcome.successful.push(id),
                Err(error) => {
                    tracing::warn!(payment = %id, %error, "bulk verification item failed");
                    outcome.failed.push(BulkFailure { id, error });
                }
            }
        }
        tracing::info!(
            succeeded = outcome.successful.len(),
            failed = outcome.failed.len(),
            "bulk verification finished"
        );
        outcome
    }

    /// Withdraws a PENDING payment.
    ///
    /// # Errors
    ///
    /// - [`PaymentError::NotFound`] - unknown payment.
    /// - [`PaymentError::Validation`] - a tenant tried to cancel someone else's payment.
    /// - [`PaymentError::InvalidState`] - the payment is no longer PENDING.
    pub fn cancel_payment(
        &self,
        id: PaymentId,
        actor: Actor,
    ) -> Result<PaymentRecord, PaymentError> {
        let now = self.clock.now();

        let (before, payment) = self.store.atomically(|tx| {
            let mut payment = tx
                .payment(id)
                .ok_or(PaymentError::NotFound(Missing::Payment(id)))?;
            if let Actor::Tenant(tenant) = actor {
                if tenant != payment.tenant_id {
                    return Err(ValidationError::NotPaymentOwner { tenant, payment: id }.into());
                }
            }
            let before = payment.clone();
            payment.cancel(now)?;
            undo_provisional_effects(tx, &payment)?;
            tx.save_payment(payment.clone())?;
            Ok((before, payment))
        })?;

        tracing::info!(payment = %payment.id, actor = ?actor, "payment cancelled");

        self.dispatch(Notification::about(
            &payment,
            Recipient::Admin,
            NotificationKind::PaymentCancelled,
        ));
        self.audit.record(AuditEntry::payment(
            actor,
            AuditAction::Cancel,
            Some(&before),
            &payment,
            now,
        ));

        Ok(payment)
    }

    /// Records a meter reading priced at the tenant's water rate.
    ///
    /// # Errors
    ///
    /// - [`PaymentError::NotFound`] - unknown tenant.
    /// - [`PaymentError::Validation`] - the meter went backwards.
    /// - [`PaymentError::Conflict`] - the month already has a reading.
    pub fn record_water_reading(
        &self,
        reading: MeterReading,
    ) -> Result<WaterReading, PaymentError> {
        let now = self.clock.now();
        let recorded = self.store.atomically(|tx| {
            let tenant = tx
                .tenant(reading.tenant_id)
                .ok_or(PaymentError::NotFound(Missing::Tenant(reading.tenant_id)))?;
            let id = tx.next_water_reading_id();
            let water = WaterReading::new(
                id,
                tenant.id,
                reading.month,
                reading.previous_reading,
                reading.current_reading,
                tenant.water_rate,
                now,
            )?;
            tx.insert_water_reading(water.clone())?;
            Ok(water)
        })?;

        tracing::info!(
            reading = %recorded.id,
            tenant = %recorded.tenant_id,
            month = %recorded.month,
            amount = %recorded.amount(),
            "water reading recorded"
        );
        Ok(recorded)
    }

    pub fn payment(&self, id: PaymentId) -> Result<PaymentRecord, PaymentError> {
        self.store
            .payment(id)?
            .ok_or(PaymentError::NotFound(Missing::Payment(id)))
    }

    pub fn receipt_for(&self, id: PaymentId) -> Option<Receipt> {
        self.receipts.receipt_for(id)
    }

    /// PENDING payments awaiting a decision, oldest first.
    pub fn pending_payments(&self) -> Result<Vec<PaymentRecord>, PaymentError> {
        let mut pending: Vec<PaymentRecord> = self
            .store
            .payments()?
            .into_iter()
            .filter(|p| p.status == PaymentStatus::Pending)
            .collect();
        pending.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
        Ok(pending)
    }

    pub fn payment_statistics(
        &self,
        period: StatsPeriod,
    ) -> Result<PaymentStatistics, PaymentError> {
        let payments = self.store.payments()?;
        Ok(reports::payment_statistics(
            &payments,
            period,
            self.clock.now(),
        ))
    }

    /// # Errors
    ///
    /// [`PaymentError::NotFound`] for an unknown tenant.
    pub fn tenant_payment_history(
        &self,
        tenant: TenantId,
        filter: &HistoryFilter,
    ) -> Result<PaymentHistory, PaymentError> {
        if self.store.tenant(tenant)?.is_none() {
            return Err(PaymentError::NotFound(Missing::Tenant(tenant)));
        }
        let payments = self.store.tenant_payments(tenant)?;
        let history = reports::payment_history(
            tenant,
            payments,
            filter,
            self.config.history_page_size,
            self.config.history_max_page_size,
        );
        tracing::debug!(
            tenant = %tenant,
            matched = history.total,
            page = history.page,
            "payment history computed"
        );
        Ok(history)
    }

    /// Expected revenue for each of the next `months` months.
    ///
    /// # Errors
    ///
    /// [`ValidationError::ProjectionTooLong`] beyond the configured horizon.
    pub fn calculate_projected_revenue(
        &self,
        months: u32,
    ) -> Result<Vec<RevenueProjection>, PaymentError> {
        let max = self.config.projection_max_months;
        if months > max {
            return Err(ValidationError::ProjectionTooLong {
                requested: months,
                max,
            }
            .into());
        }
        let current = BillingMonth::of(self.clock.now().date_naive());
        let tenants = self.store.tenants()?;
        let payments = self.store.payments()?;
        Ok(reports::project_revenue(
            &tenants,
            &payments,
            current,
            months,
            self.config.water_trailing_months,
        ))
    }

    fn dispatch(&self, notification: Notification) {
        if let Err(error) = self.notifier.notify(&notification) {
            tracing::warn!(
                payment = %notification.payment_id,
                kind = ?notification.kind,
                %error,
                "notification dispatch failed"
            );
        }
    }
}

/// Links the tenant's unpaid readings for the payment month to the payment.
fn settle_water_readings(
    tx: &mut dyn StorageTx,
    payment: &mut PaymentRecord,
) -> Result<(), PaymentError> {
    for mut reading in tx.water_readings(payment.tenant_id, payment.month) {
        if reading.paid {
            continue;
        }
        reading.settle(payment.id);
        payment.water_readings.push(reading.id);
        tx.save_water_reading(reading)?;
    }
    Ok(())
}

/// Applies the part of a RENT payment the tenant balance has not absorbed yet.
fn apply_rent_shortfall(tenant: &mut TenantAccount, payment: &mut PaymentRecord) {
    let shortfall = payment.amount - payment.provisional_credit;
    if shortfall > Decimal::ZERO {
        payment.provisional_credit += tenant.apply_payment(shortfall);
    }
}

/// Reverses what submission did to the tenant balance and water readings.
///
/// Restored balance is offered to the tenant's other open RENT payments
/// that the floor left short, oldest first.
fn undo_provisional_effects(
    tx: &mut dyn StorageTx,
    payment: &PaymentRecord,
) -> Result<(), PaymentError> {
    if payment.payment_type == PaymentType::Rent {
        let mut tenant = tx
            .tenant(payment.tenant_id)
            .ok_or(PaymentError::NotFound(Missing::Tenant(payment.tenant_id)))?;
        tenant.reverse_payment(payment.provisional_credit);

        let mut short: Vec<PaymentRecord> = tx
            .tenant_payments(payment.tenant_id)
            .into_iter()
            .filter(|p| {
                p.id != payment.id
                    && p.payment_type == PaymentType::Rent
                    && p.status.holds_slot()
                    && p.provisional_credit < p.amount
            })
            .collect();
        short.sort_by_key(|p| (p.created_at, p.id));
        for mut other in short {
            if tenant.balance() <= Decimal::ZERO {
                break;
            }
            apply_rent_shortfall(&mut tenant, &mut other);
            tracing::debug!(
                payment = %other.id,
                credit = %other.provisional_credit,
                "restored balance reapplied"
            );
            tx.save_payment(other)?;
        }
        tx.save_tenant(tenant)?;
    }
    for mut reading in tx.water_readings(payment.tenant_id, payment.month) {
        if reading.payment_id == Some(payment.id) {
            reading.release();
            tx.save_water_reading(reading)?;
        }
    }
    Ok(())
}
