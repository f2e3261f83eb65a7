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

//! Concurrent access tests using parking_lot's built-in deadlock detector.
//!
//! Racing callers must never get two open payments into one slot, decide a
//! payment twice, or issue a second receipt.

mod common;

use common::*;
use parking_lot::deadlock;
use rental_ledger_rs::audit::Actor;
use rental_ledger_rs::reports::StatsPeriod;
use rental_ledger_rs::storage::Storage;
use rental_ledger_rs::{
    ConflictError, Decision, PaymentError, PaymentId, PaymentStatus, TenantAccount, UserId,
};
use rust_decimal::Decimal;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::Duration;

// === Deadlock Detection Infrastructure ===

/// Starts a background thread that checks for deadlocks.
fn start_deadlock_detector() -> Arc<AtomicBool> {
    let running = Arc::new(AtomicBool::new(true));
    let running_clone = running.clone();

    thread::spawn(move || {
        while running_clone.load(Ordering::SeqCst) {
            thread::sleep(Duration::from_millis(50));
            let deadlocks = deadlock::check_deadlock();
            if !deadlocks.is_empty() {
                for (i, threads) in deadlocks.iter().enumerate() {
                    eprintln!("Deadlock #{}", i + 1);
                    for t in threads {
                        eprintln!("Thread ID: {:?}\n{:#?}", t.thread_id(), t.backtrace());
                    }
                }
                panic!("Deadlock detected! See output above for details.");
            }
        }
    });

    running
}

fn stop_deadlock_detector(running: Arc<AtomicBool>) {
    running.store(false, Ordering::SeqCst);
    thread::sleep(Duration::from_millis(100));
}

// === Tests ===

#[test]
fn racing_submissions_admit_one_open_payment() {
    let detector = start_deadlock_detector();
    let h = make_harness(vec![make_tenant(1)]);

    const NUM_THREADS: usize = 16;

    let results: Vec<_> = thread::scope(|s| {
        let handles: Vec<_> = (0..NUM_THREADS)
            .map(|i| {
                let h = &h;
                s.spawn(move || {
                    h.workflow
                        .submit_payment(make_mpesa_rent(1, "2024-01", &format!("QK{:04}", i)))
                })
            })
            .collect();
        handles
            .into_iter()
            .map(|handle| handle.join().expect("Thread panicked"))
            .collect()
    });

    stop_deadlock_detector(detector);

    assert_eq!(results.iter().filter(|r| r.is_ok()).count(), 1);
    assert!(results.iter().filter(|r| r.is_err()).all(|r| matches!(
        r,
        Err(PaymentError::Conflict(ConflictError::DuplicatePayment { .. }))
    )));
    assert_eq!(h.workflow.store().payments().unwrap().len(), 1);
    assert_eq!(h.balance(1), Decimal::ZERO);
}

#[test]
fn racing_decisions_apply_once() {
    let detector = start_deadlock_detector();
    let h = make_harness(vec![make_tenant(1)]);
    let payment = h.workflow.submit_payment(make_rent(1, "2024-01")).unwrap();

    const NUM_THREADS: usize = 12;

    let results: Vec<_> = thread::scope(|s| {
        let handles: Vec<_> = (0..NUM_THREADS)
            .map(|i| {
                let h = &h;
                let decision = if i % 2 == 0 {
                    Decision::Verified
                } else {
                    Decision::Rejected
                };
                s.spawn(move || {
                    h.workflow
                        .verify_payment(payment.id, decision, UserId(i as u32), None)
                })
            })
            .collect();
        handles
            .into_iter()
            .map(|handle| handle.join().expect("Thread panicked"))
            .collect()
    });

    stop_deadlock_detector(detector);

    let winners: Vec<_> = results.iter().filter_map(|r| r.as_ref().ok()).collect();
    assert_eq!(winners.len(), 1);
    assert!(results.iter().filter(|r| r.is_err()).all(|r| matches!(
        r,
        Err(PaymentError::InvalidState { .. })
    )));

    match winners[0].status {
        PaymentStatus::Verified => {
            assert_eq!(h.receipts.len(), 1);
            assert_eq!(h.balance(1), Decimal::ZERO);
        }
        PaymentStatus::Rejected => {
            assert!(h.receipts.is_empty());
            assert_eq!(h.balance(1), RENT);
        }
        status => panic!("unexpected status {}", status),
    }
}

#[test]
fn tenants_progress_independently_under_load() {
    let detector = start_deadlock_detector();

    const NUM_TENANTS: u32 = 20;
    const MONTHS: i32 = 6;

    let tenants: Vec<TenantAccount> = (1..=NUM_TENANTS).map(make_tenant).collect();
    let h = make_harness(tenants);

    thread::scope(|s| {
        for tenant in 1..=NUM_TENANTS {
            let h = &h;
            s.spawn(move || {
                for offset in 0..MONTHS {
                    let billing_month = month("2024-01").plus_months(offset).unwrap().to_string();
                    let payment = h
                        .workflow
                        .submit_payment(make_rent(tenant, &billing_month))
                        .expect("submission failed");
                    h.workflow
                        .verify_payment(payment.id, Decision::Verified, UserId(1), None)
                        .expect("verification failed");
                }
            });
        }
        // Readers alongside the writers.
        for _ in 0..4 {
            let h = &h;
            s.spawn(move || {
                for _ in 0..50 {
                    let stats = h.workflow.payment_statistics(StatsPeriod::Year).unwrap();
                    assert!(stats.verified.count <= stats.total.count);
                    let _ = h.workflow.pending_payments().unwrap();
                }
            });
        }
    });

    stop_deadlock_detector(detector);

    let expected = (NUM_TENANTS as usize) * (MONTHS as usize);
    assert_eq!(h.receipts.len(), expected);
    assert_eq!(h.workflow.store().payments().unwrap().len(), expected);
    for tenant in 1..=NUM_TENANTS {
        assert_eq!(h.balance(tenant), Decimal::ZERO);
    }
}

#[test]
fn bulk_verification_racing_cancellation() {
    let detector = start_deadlock_detector();

    const NUM_TENANTS: u32 = 50;

    let tenants: Vec<TenantAccount> = (1..=NUM_TENANTS).map(make_tenant).collect();
    let h = make_harness(tenants);
    let ids: Vec<PaymentId> = (1..=NUM_TENANTS)
        .map(|t| h.workflow.submit_payment(make_rent(t, "2024-01")).unwrap().id)
        .collect();

    let (bulk, cancelled) = thread::scope(|s| {
        let bulk = s.spawn(|| {
            h.workflow
                .process_bulk_verification(&ids, Decision::Verified, UserId(1), None)
        });
        let cancel = s.spawn(|| {
            ids.iter()
                .rev()
                .filter(|id| h.workflow.cancel_payment(**id, Actor::Admin(UserId(2))).is_ok())
                .count()
        });
        (
            bulk.join().expect("Thread panicked"),
            cancel.join().expect("Thread panicked"),
        )
    });

    stop_deadlock_detector(detector);

    assert_eq!(bulk.successful.len() + cancelled, NUM_TENANTS as usize);
    assert_eq!(bulk.failed.len(), cancelled);
    assert_eq!(h.receipts.len(), bulk.successful.len());

    for id in &ids {
        let payment = h.workflow.payment(*id).unwrap();
        let balance = h.balance(payment.tenant_id.0);
        match payment.status {
            PaymentStatus::Verified => assert_eq!(balance, Decimal::ZERO),
            PaymentStatus::Cancelled => assert_eq!(balance, RENT),
            status => panic!("unexpected status {}", status),
        }
    }
}
