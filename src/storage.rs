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

//! Persistence for tenants, payments and water readings.
//!
//! Writes go through [`Storage::atomically`]: the closure sees a [`StorageTx`]
//! and its changes are kept only if it returns `Ok`. The storage layer
//! owns the uniqueness rules, so a second open payment for the same
//! (tenant, type, month) is refused here even if a caller skipped the check.

use crate::base::{BillingMonth, PaymentId, TenantId, WaterReadingId};
use crate::error::{ConflictError, Missing, PaymentError};
use crate::payment::{PaymentRecord, PaymentType};
use crate::tenant::TenantAccount;
use crate::water::WaterReading;
use parking_lot::RwLock;
use std::collections::{BTreeMap, HashMap};
use std::hash::Hash;

/// Working set of one atomic operation.
pub trait StorageTx {
    fn tenant(&self, id: TenantId) -> Option<TenantAccount>;

    /// # Errors
    ///
    /// [`ConflictError::TenantExists`] if the id is taken.
    fn insert_tenant(&mut self, tenant: TenantAccount) -> Result<(), PaymentError>;

    /// # Errors
    ///
    /// [`PaymentError::NotFound`] if the tenant was never inserted.
    fn save_tenant(&mut self, tenant: TenantAccount) -> Result<(), PaymentError>;

    fn payment(&self, id: PaymentId) -> Option<PaymentRecord>;

    /// The tenant's payments in submission order.
    fn tenant_payments(&self, tenant: TenantId) -> Vec<PaymentRecord>;

    /// The PENDING or VERIFIED payment occupying (tenant, type, month), if any.
    fn open_payment(
        &self,
        tenant: TenantId,
        payment_type: PaymentType,
        month: BillingMonth,
    ) -> Option<PaymentId>;

    /// The open payment already using an M-Pesa transaction code, if any.
    fn transaction_code_owner(&self, code: &str) -> Option<PaymentId>;

    fn next_payment_id(&mut self) -> PaymentId;

    /// # Errors
    ///
    /// [`PaymentError::Conflict`] when the record would break a unique index.
    fn insert_payment(&mut self, payment: PaymentRecord) -> Result<(), PaymentError>;

    /// Replaces a stored payment and refreshes its index entries.
    fn save_payment(&mut self, payment: PaymentRecord) -> Result<(), PaymentError>;

    fn water_readings(&self, tenant: TenantId, month: BillingMonth) -> Vec<WaterReading>;

    fn next_water_reading_id(&mut self) -> WaterReadingId;

    /// # Errors
    ///
    /// [`ConflictError::DuplicateReading`] for a second reading in the same month.
    fn insert_water_reading(&mut self, reading: WaterReading) -> Result<(), PaymentError>;

    fn save_water_reading(&mut self, reading: WaterReading) -> Result<(), PaymentError>;
}

/// Storage backend used by the workflow.
pub trait Storage: Send + Sync {
    /// Runs `op` as a single all-or-nothing unit, serialised against other writers.
    fn atomically<T, F>(&self, op: F) -> Result<T, PaymentError>
    where
        F: FnOnce(&mut dyn StorageTx) -> Result<T, PaymentError>;

    fn tenant(&self, id: TenantId) -> Result<Option<TenantAccount>, PaymentError>;

    fn tenants(&self) -> Result<Vec<TenantAccount>, PaymentError>;

    fn payment(&self, id: PaymentId) -> Result<Option<PaymentRecord>, PaymentError>;

    /// All payments ordered by id.
    fn payments(&self) -> Result<Vec<PaymentRecord>, PaymentError>;

    fn tenant_payments(&self, tenant: TenantId) -> Result<Vec<PaymentRecord>, PaymentError>;

    fn water_reading(&self, id: WaterReadingId) -> Result<Option<WaterReading>, PaymentError>;

    /// Onboards a tenant.
    fn add_tenant(&self, tenant: TenantAccount) -> Result<(), PaymentError> {
        self.atomically(|tx| tx.insert_tenant(tenant))
    }
}

type SlotKey = (TenantId, PaymentType, BillingMonth);
type ReadingKey = (TenantId, BillingMonth);

#[derive(Debug, Default)]
struct Tables {
    tenants: HashMap<TenantId, TenantAccount>,
    payments: BTreeMap<PaymentId, PaymentRecord>,
    readings: BTreeMap<WaterReadingId, WaterReading>,
    /// Payment ids per tenant in insertion order.
    tenant_payments: HashMap<TenantId, Vec<PaymentId>>,
    /// Unique index over slot-holding payments.
    open_slots: HashMap<SlotKey, PaymentId>,
    /// Unique index over M-Pesa codes of slot-holding payments.
    transaction_codes: HashMap<String, PaymentId>,
    reading_slots: HashMap<ReadingKey, WaterReadingId>,
    last_payment_id: u64,
    last_reading_id: u64,
}

impl Tables {
    fn slot_key(payment: &PaymentRecord) -> SlotKey {
        (payment.tenant_id, payment.payment_type, payment.month)
    }

    fn check_unique(&self, payment: &PaymentRecord) -> Result<(), PaymentError> {
        if !payment.status.holds_slot() {
            return Ok(());
        }
        let taken = |owner: Option<&PaymentId>| owner.copied().filter(|id| *id != payment.id);

        if let Some(existing) = taken(self.open_slots.get(&Self::slot_key(payment))) {
            return Err(ConflictError::DuplicatePayment {
                tenant: payment.tenant_id,
                payment_type: payment.payment_type,
                month: payment.month,
                existing,
            }
            .into());
        }
        if let Some(code) = payment.method.transaction_code() {
            if let Some(existing) = taken(self.transaction_codes.get(&code)) {
                return Err(ConflictError::TransactionCodeReused { code, existing }.into());
            }
        }
        Ok(())
    }

    fn revert(&mut self, undo: Undo) {
        match undo {
            Undo::Tenant(id, previous) => reset(&mut self.tenants, id, previous),
            Undo::Payment(id, previous) => match previous {
                Some(payment) => {
                    self.payments.insert(id, payment);
                }
                None => {
                    self.payments.remove(&id);
                }
            },
            Undo::Reading(id, previous) => match previous {
                Some(reading) => {
                    self.readings.insert(id, reading);
                }
                None => {
                    self.readings.remove(&id);
                }
            },
            Undo::TenantPayment(tenant) => {
                if let Some(ids) = self.tenant_payments.get_mut(&tenant) {
                    ids.pop();
                }
            }
            Undo::Slot(key, previous) => reset(&mut self.open_slots, key, previous),
            Undo::Code(code, previous) => reset(&mut self.transaction_codes, code, previous),
            Undo::ReadingSlot(key, previous) => reset(&mut self.reading_slots, key, previous),
        }
    }
}

fn reset<K: Eq + Hash, V>(map: &mut HashMap<K, V>, key: K, previous: Option<V>) {
    match previous {
        Some(value) => {
            map.insert(key, value);
        }
        None => {
            map.remove(&key);
        }
    }
}

/// Prior state of one entry touched by an open operation.
#[derive(Debug)]
enum Undo {
    Tenant(TenantId, Option<TenantAccount>),
    Payment(PaymentId, Option<PaymentRecord>),
    Reading(WaterReadingId, Option<WaterReading>),
    TenantPayment(TenantId),
    Slot(SlotKey, Option<PaymentId>),
    Code(String, Option<PaymentId>),
    ReadingSlot(ReadingKey, Option<WaterReadingId>),
}

/// Writes straight into the tables and records how to undo each one.
///
/// Dropping an uncommitted journal replays the undo log in reverse, which
/// covers both an `Err` from the operation and a panic inside it.
struct Journal<'a> {
    tables: &'a mut Tables,
    undo: Vec<Undo>,
    last_payment_id: u64,
    last_reading_id: u64,
    committed: bool,
}

impl<'a> Journal<'a> {
    fn begin(tables: &'a mut Tables) -> Self {
        Self {
            last_payment_id: tables.last_payment_id,
            last_reading_id: tables.last_reading_id,
            tables,
            undo: Vec::new(),
            committed: false,
        }
    }

    fn commit(mut self) {
        self.committed = true;
    }

    fn put_tenant(&mut self, tenant: TenantAccount) {
        let id = tenant.id;
        let previous = self.tables.tenants.insert(id, tenant);
        self.undo.push(Undo::Tenant(id, previous));
    }

    fn put_payment(&mut self, payment: PaymentRecord) {
        let id = payment.id;
        let previous = self.tables.payments.insert(id, payment);
        self.undo.push(Undo::Payment(id, previous));
    }

    fn put_reading(&mut self, reading: WaterReading) {
        let id = reading.id;
        let previous = self.tables.readings.insert(id, reading);
        self.undo.push(Undo::Reading(id, previous));
    }

    fn set_slot(&mut self, key: SlotKey, owner: Option<PaymentId>) {
        let previous = match owner {
            Some(id) => self.tables.open_slots.insert(key, id),
            None => self.tables.open_slots.remove(&key),
        };
        self.undo.push(Undo::Slot(key, previous));
    }

    fn set_code(&mut self, code: String, owner: Option<PaymentId>) {
        let previous = match owner {
            Some(id) => self.tables.transaction_codes.insert(code.clone(), id),
            None => self.tables.transaction_codes.remove(&code),
        };
        self.undo.push(Undo::Code(code, previous));
    }

    fn index(&mut self, payment: &PaymentRecord) {
        if !payment.status.holds_slot() {
            return;
        }
        self.set_slot(Tables::slot_key(payment), Some(payment.id));
        if let Some(code) = payment.method.transaction_code() {
            self.set_code(code, Some(payment.id));
        }
    }

    fn unindex(&mut self, payment: &PaymentRecord) {
        let key = Tables::slot_key(payment);
        if self.tables.open_slots.get(&key) == Some(&payment.id) {
            self.set_slot(key, None);
        }
        if let Some(code) = payment.method.transaction_code() {
            if self.tables.transaction_codes.get(&code) == Some(&payment.id) {
                self.set_code(code, None);
            }
        }
    }
}

impl Drop for Journal<'_> {
    fn drop(&mut self) {
        if self.committed {
            return;
        }
        while let Some(undo) = self.undo.pop() {
            self.tables.revert(undo);
        }
        self.tables.last_payment_id = self.last_payment_id;
        self.tables.last_reading_id = self.last_reading_id;
    }
}

impl StorageTx for Journal<'_> {
    fn tenant(&self, id: TenantId) -> Option<TenantAccount> {
        self.tables.tenants.get(&id).cloned()
    }

    fn insert_tenant(&mut self, tenant: TenantAccount) -> Result<(), PaymentError> {
        if self.tables.tenants.contains_key(&tenant.id) {
            return Err(ConflictError::TenantExists(tenant.id).into());
        }
        self.put_tenant(tenant);
        Ok(())
    }

    fn save_tenant(&mut self, tenant: TenantAccount) -> Result<(), PaymentError> {
        if !self.tables.tenants.contains_key(&tenant.id) {
            return Err(PaymentError::NotFound(Missing::Tenant(tenant.id)));
        }
        self.put_tenant(tenant);
        Ok(())
    }

    fn payment(&self, id: PaymentId) -> Option<PaymentRecord> {
        self.tables.payments.get(&id).cloned()
    }

    fn tenant_payments(&self, tenant: TenantId) -> Vec<PaymentRecord> {
        self.tables
            .tenant_payments
            .get(&tenant)
            .into_iter()
            .flatten()
            .filter_map(|id| self.tables.payments.get(id))
            .cloned()
            .collect()
    }

    fn open_payment(
        &self,
        tenant: TenantId,
        payment_type: PaymentType,
        month: BillingMonth,
    ) -> Option<PaymentId> {
        self.tables
            .open_slots
            .get(&(tenant, payment_type, month))
            .copied()
    }

    fn transaction_code_owner(&self, code: &str) -> Option<PaymentId> {
        self.tables
            .transaction_codes
            .get(&code.trim().to_ascii_uppercase())
            .copied()
    }

    fn next_payment_id(&mut self) -> PaymentId {
        self.tables.last_payment_id += 1;
        PaymentId(self.tables.last_payment_id)
    }

    fn insert_payment(&mut self, payment: PaymentRecord) -> Result<(), PaymentError> {
        if self.tables.payments.contains_key(&payment.id) {
            return Err(PaymentError::Storage(format!(
                "payment {} already stored",
                payment.id
            )));
        }
        self.tables.check_unique(&payment)?;
        self.index(&payment);
        self.tables.last_payment_id = self.tables.last_payment_id.max(payment.id.0);
        self.tables
            .tenant_payments
            .entry(payment.tenant_id)
            .or_default()
            .push(payment.id);
        self.undo.push(Undo::TenantPayment(payment.tenant_id));
        self.put_payment(payment);
        Ok(())
    }

    fn save_payment(&mut self, payment: PaymentRecord) -> Result<(), PaymentError> {
        let previous = self
            .tables
            .payments
            .get(&payment.id)
            .cloned()
            .ok_or(PaymentError::NotFound(Missing::Payment(payment.id)))?;
        self.tables.check_unique(&payment)?;
        self.unindex(&previous);
        self.index(&payment);
        self.put_payment(payment);
        Ok(())
    }

    fn water_readings(&self, tenant: TenantId, month: BillingMonth) -> Vec<WaterReading> {
        self.tables
            .reading_slots
            .get(&(tenant, month))
            .and_then(|id| self.tables.readings.get(id))
            .cloned()
            .into_iter()
            .collect()
    }

    fn next_water_reading_id(&mut self) -> WaterReadingId {
        self.tables.last_reading_id += 1;
        WaterReadingId(self.tables.last_reading_id)
    }

    fn insert_water_reading(&mut self, reading: WaterReading) -> Result<(), PaymentError> {
        let key = (reading.tenant_id, reading.month);
        if self.tables.reading_slots.contains_key(&key) {
            return Err(ConflictError::DuplicateReading {
                tenant: reading.tenant_id,
                month: reading.month,
            }
            .into());
        }
        let previous = self.tables.reading_slots.insert(key, reading.id);
        self.undo.push(Undo::ReadingSlot(key, previous));
        self.tables.last_reading_id = self.tables.last_reading_id.max(reading.id.0);
        self.put_reading(reading);
        Ok(())
    }

    fn save_water_reading(&mut self, reading: WaterReading) -> Result<(), PaymentError> {
        if !self.tables.readings.contains_key(&reading.id) {
            return Err(PaymentError::NotFound(Missing::WaterReading(reading.id)));
        }
        self.put_reading(reading);
        Ok(())
    }
}

/// In-process [`Storage`] backed by indexed tables behind one lock.
///
/// Writers hold the write lock for the whole closure and change the tables in
/// place through an undo journal; the journal is discarded when the closure
/// succeeds and replayed when it fails. This gives serialisable writes and
/// full rollback at a cost proportional to the rows an operation touches.
#[derive(Debug, Default)]
pub struct MemoryStore {
    tables: RwLock<Tables>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a store pre-loaded with tenants.
    pub fn with_tenants(
        tenants: impl IntoIterator<Item = TenantAccount>,
    ) -> Result<Self, PaymentError> {
        let store = Self::new();
        store.atomically(|tx| {
            for tenant in tenants {
                tx.insert_tenant(tenant)?;
            }
            Ok(())
        })?;
        Ok(store)
    }
}

impl Storage for MemoryStore {
    fn atomically<T, F>(&self, op: F) -> Result<T, PaymentError>
    where
        F: FnOnce(&mut dyn StorageTx) -> Result<T, PaymentError>,
    {
        let mut tables = self.tables.write();
        let mut journal = Journal::begin(&mut *tables);
        let output = op(&mut journal)?;
        journal.commit();
        Ok(output)
    }

    fn tenant(&self, id: TenantId) -> Result<Option<TenantAccount>, PaymentError> {
        Ok(self.tables.read().tenants.get(&id).cloned())
    }

    fn tenants(&self) -> Result<Vec<TenantAccount>, PaymentError> {
        let mut tenants: Vec<_> = self.tables.read().tenants.values().cloned().collect();
        tenants.sort_by_key(|t| t.id);
        Ok(tenants)
    }

    fn payment(&self, id: PaymentId) -> Result<Option<PaymentRecord>, PaymentError> {
        Ok(self.tables.read().payments.get(&id).cloned())
    }

    fn payments(&self) -> Result<Vec<PaymentRecord>, PaymentError> {
        Ok(self.tables.read().payments.values().cloned().collect())
    }

    fn tenant_payments(&self, tenant: TenantId) -> Result<Vec<PaymentRecord>, PaymentError> {
        let tables = self.tables.read();
        Ok(tables
            .tenant_payments
            .get(&tenant)
            .into_iter()
            .flatten()
            .filter_map(|id| tables.payments.get(id))
            .cloned()
            .collect())
    }

    fn water_reading(&self, id: WaterReadingId) -> Result<Option<WaterReading>, PaymentError> {
        Ok(self.tables.read().readings.get(&id).cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::payment::{PaymentMethod, PaymentStatus, PaymentSubmission};
    use chrono::Utc;
    use rust_decimal_macros::dec;

    fn tenant(id: u32) -> TenantAccount {
        TenantAccount::new(TenantId(id), "T", "U", dec!(15000), dec!(100)).unwrap()
    }

    fn rent(id: u64, tenant: u32, code: &str) -> PaymentRecord {
        PaymentRecord::new(
            PaymentId(id),
            PaymentSubmission {
                tenant_id: TenantId(tenant),
                payment_type: PaymentType::Rent,
                method: PaymentMethod::Mpesa {
                    transaction_code: code.to_string(),
                },
                amount: dec!(15000),
                month: "2024-01".parse().unwrap(),
                proofs: vec![],
            },
            Utc::now(),
        )
    }

    #[test]
    fn failed_operation_rolls_back() {
        let store = MemoryStore::with_tenants([tenant(1)]).unwrap();
        let result: Result<(), _> = store.atomically(|tx| {
            tx.insert_payment(rent(1, 1, "A"))?;
            Err(PaymentError::Storage("boom".into()))
        });
        assert!(result.is_err());
        assert!(store.payment(PaymentId(1)).unwrap().is_none());
        assert!(store.payments().unwrap().is_empty());
    }

    #[test]
    fn rollback_restores_rows_indexes_and_counters() {
        let store = MemoryStore::with_tenants([tenant(1)]).unwrap();
        store.atomically(|tx| tx.insert_payment(rent(1, 1, "A"))).unwrap();
        let balance = store.tenant(TenantId(1)).unwrap().unwrap().balance();

        let result: Result<(), _> = store.atomically(|tx| {
            let mut first = tx.payment(PaymentId(1)).unwrap();
            first.status = PaymentStatus::Rejected;
            tx.save_payment(first)?;
            let id = tx.next_payment_id();
            tx.insert_payment(rent(id.0, 1, "A"))?;
            let mut t = tx.tenant(TenantId(1)).unwrap();
            t.reverse_payment(dec!(500));
            tx.save_tenant(t)?;
            Err(PaymentError::Storage("boom".into()))
        });
        assert!(result.is_err());

        assert_eq!(
            store.payment(PaymentId(1)).unwrap().unwrap().status,
            PaymentStatus::Pending
        );
        assert!(store.payment(PaymentId(2)).unwrap().is_none());
        assert_eq!(store.tenant_payments(TenantId(1)).unwrap().len(), 1);
        assert_eq!(store.tenant(TenantId(1)).unwrap().unwrap().balance(), balance);
        store
            .atomically(|tx| {
                assert_eq!(
                    tx.open_payment(TenantId(1), PaymentType::Rent, "2024-01".parse().unwrap()),
                    Some(PaymentId(1))
                );
                assert_eq!(tx.transaction_code_owner("a"), Some(PaymentId(1)));
                assert_eq!(tx.next_payment_id(), PaymentId(2));
                Ok(())
            })
            .unwrap();
    }

    #[test]
    fn panic_inside_operation_rolls_back() {
        let store = MemoryStore::with_tenants([tenant(1)]).unwrap();
        let outcome = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            let _: Result<(), _> = store.atomically(|tx| {
                tx.insert_payment(rent(1, 1, "A"))?;
                panic!("interrupted");
            });
        }));
        assert!(outcome.is_err());
        assert!(store.payments().unwrap().is_empty());
        store.atomically(|tx| tx.insert_payment(rent(1, 1, "A"))).unwrap();
    }

    #[test]
    fn tenant_payments_follow_submission_order() {
        let store = MemoryStore::with_tenants([tenant(1), tenant(2)]).unwrap();
        store
            .atomically(|tx| {
                tx.insert_payment(rent(3, 1, "C"))?;
                tx.insert_payment(rent(1, 2, "A"))?;
                let mut other_month = rent(2, 1, "B");
                other_month.month = "2024-02".parse().unwrap();
                tx.insert_payment(other_month)
            })
            .unwrap();
        let ids: Vec<_> = store
            .tenant_payments(TenantId(1))
            .unwrap()
            .iter()
            .map(|p| p.id)
            .collect();
        assert_eq!(ids, vec![PaymentId(3), PaymentId(2)]);
    }

    #[test]
    fn unique_index_rejects_second_open_payment() {
        let store = MemoryStore::with_tenants([tenant(1)]).unwrap();
        store.atomically(|tx| tx.insert_payment(rent(1, 1, "A"))).unwrap();

        let result = store.atomically(|tx| tx.insert_payment(rent(2, 1, "B")));
        assert_eq!(
            result,
            Err(ConflictError::DuplicatePayment {
                tenant: TenantId(1),
                payment_type: PaymentType::Rent,
                month: "2024-01".parse().unwrap(),
                existing: PaymentId(1),
            }
            .into())
        );
    }

    #[test]
    fn terminal_payment_frees_its_slot_and_code() {
        let store = MemoryStore::with_tenants([tenant(1)]).unwrap();
        store.atomically(|tx| tx.insert_payment(rent(1, 1, "A"))).unwrap();
        store
            .atomically(|tx| {
                let mut p = tx.payment(PaymentId(1)).unwrap();
                p.status = PaymentStatus::Rejected;
                tx.save_payment(p)
            })
            .unwrap();

        store.atomically(|tx| tx.insert_payment(rent(2, 1, "A"))).unwrap();
        store
            .atomically(|tx| {
                assert_eq!(
                    tx.open_payment(TenantId(1), PaymentType::Rent, "2024-01".parse().unwrap()),
                    Some(PaymentId(2))
                );
                assert_eq!(tx.transaction_code_owner("a"), Some(PaymentId(2)));
                Ok(())
            })
            .unwrap();
    }

    #[test]
    fn transaction_codes_are_unique_across_tenants() {
        let store = MemoryStore::with_tenants([tenant(1), tenant(2)]).unwrap();
        store.atomically(|tx| tx.insert_payment(rent(1, 1, "qk1"))).unwrap();
        let result = store.atomically(|tx| tx.insert_payment(rent(2, 2, "QK1")));
        assert_eq!(
            result,
            Err(ConflictError::TransactionCodeReused {
                code: "QK1".into(),
                existing: PaymentId(1),
            }
            .into())
        );
    }

    #[test]
    fn duplicate_tenant_is_a_conflict() {
        let store = MemoryStore::with_tenants([tenant(1)]).unwrap();
        assert_eq!(
            store.add_tenant(tenant(1)),
            Err(ConflictError::TenantExists(TenantId(1)).into())
        );
    }

    #[test]
    fn saving_unknown_records_fails() {
        let store = MemoryStore::new();
        let result = store.atomically(|tx| tx.save_payment(rent(7, 1, "A")));
        assert_eq!(result, Err(PaymentError::NotFound(Missing::Payment(PaymentId(7)))));
        let result = store.atomically(|tx| tx.save_tenant(tenant(3)));
        assert_eq!(result, Err(PaymentError::NotFound(Missing::Tenant(TenantId(3)))));
    }

    #[test]
    fn ids_are_sequential() {
        let store = MemoryStore::new();
        let ids = store
            .atomically(|tx| Ok((tx.next_payment_id(), tx.next_payment_id())))
            .unwrap();
        assert_eq!(ids, (PaymentId(1), PaymentId(2)));
    }

    #[test]
    fn one_water_reading_per_month() {
        let store = MemoryStore::with_tenants([tenant(1)]).unwrap();
        let reading = |id| {
            WaterReading::new(
                WaterReadingId(id),
                TenantId(1),
                "2024-01".parse().unwrap(),
                dec!(0),
                dec!(5),
                dec!(100),
                Utc::now(),
            )
            .unwrap()
        };
        store.atomically(|tx| tx.insert_water_reading(reading(1))).unwrap();
        assert!(matches!(
            store.atomically(|tx| tx.insert_water_reading(reading(2))),
            Err(PaymentError::Conflict(ConflictError::DuplicateReading { .. }))
        ));
        assert!(store.water_reading(WaterReadingId(1)).unwrap().is_some());
    }
}
