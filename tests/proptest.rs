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

//! Property-based tests for the payment workflow.
//!
//! These tests verify invariants that should hold for any sequence of
//! submissions and decisions.

mod common;

use common::*;
use proptest::prelude::*;
use rental_ledger_rs::audit::Actor;
use rental_ledger_rs::storage::Storage;
use rental_ledger_rs::{
    Decision, PaymentError, PaymentStatus, PaymentType, TenantId, UserId, ValidationError,
};
use rust_decimal::Decimal;
use std::collections::HashMap;

// =============================================================================
// Arbitrary Strategies
// =============================================================================

/// Generate an opening balance (-10000 credit to 50000 owed, 2 decimal places).
fn arb_balance() -> impl Strategy<Value = Decimal> {
    (-1_000_000i64..=5_000_000i64).prop_map(|cents| Decimal::new(cents, 2))
}

/// Generate a positive amount (0.01 to 50000).
fn arb_amount() -> impl Strategy<Value = Decimal> {
    (1i64..=5_000_000i64).prop_map(|cents| Decimal::new(cents, 2))
}

#[derive(Debug, Clone, Copy)]
enum Step {
    Verify,
    Reject,
    Cancel,
    Leave,
}

fn arb_step() -> impl Strategy<Value = Step> {
    prop_oneof![
        Just(Step::Verify),
        Just(Step::Reject),
        Just(Step::Cancel),
        Just(Step::Leave),
    ]
}

/// Generate one step per month plus the order the months are decided in.
fn arb_decision_order() -> impl Strategy<Value = (Vec<Step>, Vec<usize>)> {
    (1usize..=6).prop_flat_map(|months| {
        (
            prop::collection::vec(arb_step(), months),
            Just((0..months).collect::<Vec<_>>()).prop_shuffle(),
        )
    })
}

// =============================================================================
// Helper Functions
// =============================================================================

/// Balance equals the opening balance minus what open payments hold, and a
/// balance still owing means every open payment has been applied in full.
fn check_tenant_ledger(
    h: &Harness,
    tenant: TenantId,
    opening: Decimal,
) -> Result<(), TestCaseError> {
    let payments = h.workflow.store().tenant_payments(tenant).unwrap();
    let open: Vec<_> = payments.iter().filter(|p| p.status.holds_slot()).collect();
    let held: Decimal = open.iter().map(|p| p.provisional_credit).sum();
    let balance = h.balance(tenant.0);

    prop_assert_eq!(balance, opening - held);
    prop_assert!(balance >= opening.min(Decimal::ZERO));
    for payment in &open {
        prop_assert!(payment.provisional_credit >= Decimal::ZERO);
        prop_assert!(payment.provisional_credit <= payment.amount);
        if balance > Decimal::ZERO && payment.payment_type == PaymentType::Rent {
            prop_assert_eq!(payment.provisional_credit, payment.amount);
        }
    }
    Ok(())
}

// =============================================================================
// Balance Invariants
// =============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(200))]

    /// Submitting rent floors the balance at zero, keeps any credit, and
    /// rejection restores the opening balance exactly.
    #[test]
    fn rent_floors_balance_and_rejection_restores_it(opening in arb_balance()) {
        let h = make_harness(vec![make_tenant_owing(1, opening)]);

        let payment = h.workflow.submit_payment(make_rent(1, "2024-01")).unwrap();
        if opening > Decimal::ZERO {
            prop_assert_eq!(h.balance(1), (opening - RENT).max(Decimal::ZERO));
        } else {
            prop_assert_eq!(h.balance(1), opening);
        }
        prop_assert_eq!(payment.provisional_credit, opening.max(Decimal::ZERO).min(RENT));

        h.workflow
            .verify_payment(payment.id, Decision::Rejected, UserId(1), None)
            .unwrap();
        prop_assert_eq!(h.balance(1), opening);
    }

    /// Any rent amount other than the tenant's rent is refused without side effects.
    #[test]
    fn rent_mismatch_is_refused(amount in arb_amount()) {
        prop_assume!(amount != RENT);
        let h = make_harness(vec![make_tenant(1)]);

        let result = h
            .workflow
            .submit_payment(make_submission(1, PaymentType::Rent, amount, "2024-01"));

        prop_assert_eq!(
            result,
            Err(PaymentError::Validation(ValidationError::RentMismatch {
                expected: RENT,
                actual: amount,
            }))
        );
        prop_assert_eq!(h.balance(1), RENT);
        prop_assert!(h.workflow.store().payments().unwrap().is_empty());
    }

    /// After any mix of submissions and decisions:
    /// - each tenant's balance equals the opening balance minus the credits of open payments
    /// - no (tenant, type, month) holds two open payments
    /// - every verified payment has exactly one receipt
    #[test]
    fn random_workflows_keep_ledger_consistent(
        openings in prop::collection::vec(arb_balance(), 3),
        steps in prop::collection::vec((1u32..=3, 0i32..4, arb_step()), 1..40),
    ) {
        let tenants = openings
            .iter()
            .enumerate()
            .map(|(i, balance)| make_tenant_owing(i as u32 + 1, *balance))
            .collect();
        let h = make_harness(tenants);

        for (tenant, offset, step) in steps {
            let billing_month = month("2024-01").plus_months(offset).unwrap().to_string();
            let Ok(payment) = h.workflow.submit_payment(make_rent(tenant, &billing_month)) else {
                continue;
            };
            let outcome = match step {
                Step::Verify => h
                    .workflow
                    .verify_payment(payment.id, Decision::Verified, UserId(1), None),
                Step::Reject => h
                    .workflow
                    .verify_payment(payment.id, Decision::Rejected, UserId(1), None),
                Step::Cancel => h
                    .workflow
                    .cancel_payment(payment.id, Actor::Tenant(TenantId(tenant))),
                Step::Leave => Ok(payment),
            };
            prop_assert!(outcome.is_ok());
        }

        let payments = h.workflow.store().payments().unwrap();
        let mut open = HashMap::new();
        for payment in payments.iter().filter(|p| p.status.holds_slot()) {
            let key = (payment.tenant_id, payment.payment_type, payment.month);
            prop_assert!(open.insert(key, payment.id).is_none());
        }

        for (i, opening) in openings.iter().enumerate() {
            check_tenant_ledger(&h, TenantId(i as u32 + 1), *opening)?;
        }

        let verified = payments
            .iter()
            .filter(|p| p.status == PaymentStatus::Verified)
            .count();
        prop_assert_eq!(h.receipts.len(), verified);
    }

    /// Several months submitted up front and then decided in any order keep
    /// the ledger consistent after every decision.
    #[test]
    fn out_of_order_decisions_keep_ledger_consistent(
        opening in arb_balance(),
        (steps, order) in arb_decision_order(),
    ) {
        let h = make_harness(vec![make_tenant_owing(1, opening)]);
        let ids: Vec<_> = (0..steps.len())
            .map(|offset| {
                let billing_month = month("2024-01")
                    .plus_months(offset as i32)
                    .unwrap()
                    .to_string();
                h.workflow.submit_payment(make_rent(1, &billing_month)).unwrap().id
            })
            .collect();
        check_tenant_ledger(&h, TenantId(1), opening)?;

        for index in order {
            let id = ids[index];
            let outcome = match steps[index] {
                Step::Verify => h.workflow.verify_payment(id, Decision::Verified, UserId(1), None),
                Step::Reject => h.workflow.verify_payment(id, Decision::Rejected, UserId(1), None),
                Step::Cancel => h.workflow.cancel_payment(id, Actor::Tenant(TenantId(1))),
                Step::Leave => continue,
            };
            prop_assert!(outcome.is_ok());
            check_tenant_ledger(&h, TenantId(1), opening)?;
        }

        let verified = h
            .workflow
            .store()
            .payments()
            .unwrap()
            .iter()
            .filter(|p| p.status == PaymentStatus::Verified)
            .count();
        prop_assert_eq!(h.receipts.len(), verified);
    }
}
