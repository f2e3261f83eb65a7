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

//! Read-side computations: statistics, tenant history, revenue projection.
//!
//! Everything here is a pure function over snapshots; nothing is persisted.

use crate::base::{BillingMonth, TenantId};
use crate::error::ValidationError;
use crate::payment::{PaymentRecord, PaymentStatus, PaymentType};
use crate::tenant::TenantAccount;
use chrono::{DateTime, Duration, Months, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

/// Rolling window ending now.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StatsPeriod {
    Day,
    Week,
    Month,
    Year,
}

impl StatsPeriod {
    pub fn window_start(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        match self {
            StatsPeriod::Day => now - Duration::days(1),
            StatsPeriod::Week => now - Duration::days(7),
            StatsPeriod::Month => now
                .checked_sub_months(Months::new(1))
                .unwrap_or(DateTime::<Utc>::MIN_UTC),
            StatsPeriod::Year => now
                .checked_sub_months(Months::new(12))
                .unwrap_or(DateTime::<Utc>::MIN_UTC),
        }
    }
}

impl fmt::Display for StatsPeriod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            StatsPeriod::Day => "day",
            StatsPeriod::Week => "week",
            StatsPeriod::Month => "month",
            StatsPeriod::Year => "year",
        })
    }
}

impl FromStr for StatsPeriod {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "day" => Ok(StatsPeriod::Day),
            "week" => Ok(StatsPeriod::Week),
            "month" => Ok(StatsPeriod::Month),
            "year" => Ok(StatsPeriod::Year),
            _ => Err(ValidationError::UnknownValue {
                field: "statistics period",
                value: s.to_string(),
            }),
        }
    }
}

/// A count and the money behind it.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Totals {
    pub count: usize,
    pub amount: Decimal,
}

impl Totals {
    fn add(&mut self, amount: Decimal) {
        self.count += 1;
        self.amount += amount;
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentStatistics {
    pub period: StatsPeriod,
    pub from: DateTime<Utc>,
    pub to: DateTime<Utc>,
    pub total: Totals,
    pub verified: Totals,
    pub pending: Totals,
    pub rejected: Totals,
    pub cancelled: Totals,
    /// `verified / total * 100`, zero when there are no payments.
    pub verification_rate: Decimal,
    /// Mean seconds from submission to verification, over verified payments.
    pub average_verification_secs: Option<i64>,
    pub by_type: BTreeMap<PaymentType, Totals>,
}

/// Aggregates payments created within `period` before `now`.
pub fn payment_statistics(
    payments: &[PaymentRecord],
    period: StatsPeriod,
    now: DateTime<Utc>,
) -> PaymentStatistics {
    let from = period.window_start(now);
    let mut stats = PaymentStatistics {
        period,
        from,
        to: now,
        total: Totals::default(),
        verified: Totals::default(),
        pending: Totals::default(),
        rejected: Totals::default(),
        cancelled: Totals::default(),
        verification_rate: Decimal::ZERO,
        average_verification_secs: None,
        by_type: BTreeMap::new(),
    };

    let mut latency_secs: i64 = 0;
    for payment in payments
        .iter()
        .filter(|p| p.created_at >= from && p.created_at <= now)
    {
        stats.total.add(payment.amount);
        stats
            .by_type
            .entry(payment.payment_type)
            .or_default()
            .add(payment.amount);
        match payment.status {
            PaymentStatus::Verified => {
                stats.verified.add(payment.amount);
                if let Some(latency) = payment.verification_latency() {
                    latency_secs += latency.num_seconds();
                }
            }
            PaymentStatus::Pending => stats.pending.add(payment.amount),
            PaymentStatus::Rejected => stats.rejected.add(payment.amount),
            PaymentStatus::Cancelled => stats.cancelled.add(payment.amount),
        }
    }

    if stats.total.count > 0 {
        stats.verification_rate = Decimal::from(stats.verified.count)
            / Decimal::from(stats.total.count)
            * Decimal::ONE_HUNDRED;
    }
    if stats.verified.count > 0 {
        stats.average_verification_secs = Some(latency_secs / stats.verified.count as i64);
    }

    tracing::debug!(
        period = %period,
        total = stats.total.count,
        verified = stats.verified.count,
        "computed payment statistics"
    );
    stats
}

/// Filters and paging for a tenant's payment history.
///
/// `page` is 1-based; 0 is read as 1. `per_page` of 0 means the configured default.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HistoryFilter {
    pub from: Option<DateTime<Utc>>,
    pub to: Option<DateTime<Utc>>,
    pub payment_type: Option<PaymentType>,
    pub status: Option<PaymentStatus>,
    pub page: usize,
    pub per_page: usize,
}

impl HistoryFilter {
    pub fn matches(&self, payment: &PaymentRecord) -> bool {
        self.from.is_none_or(|from| payment.created_at >= from)
            && self.to.is_none_or(|to| payment.created_at <= to)
            && self.payment_type.is_none_or(|t| payment.payment_type == t)
            && self.status.is_none_or(|s| payment.status == s)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistorySummary {
    pub total: Totals,
    pub by_type: BTreeMap<PaymentType, Totals>,
    pub by_status: BTreeMap<PaymentStatus, Totals>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentHistory {
    pub tenant_id: TenantId,
    /// The requested page, newest first.
    pub payments: Vec<PaymentRecord>,
    pub page: usize,
    pub per_page: usize,
    /// Payments matching the filter across all pages.
    pub total: usize,
    pub total_pages: usize,
    /// Covers every matching payment, not just this page.
    pub summary: HistorySummary,
}

pub fn payment_history(
    tenant_id: TenantId,
    payments: Vec<PaymentRecord>,
    filter: &HistoryFilter,
    default_page_size: usize,
    max_page_size: usize,
) -> PaymentHistory {
    let mut matching: Vec<PaymentRecord> =
        payments.into_iter().filter(|p| filter.matches(p)).collect();
    matching.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));

    let mut summary = HistorySummary::default();
    for payment in &matching {
        summary.total.add(payment.amount);
        summary
            .by_type
            .entry(payment.payment_type)
            .or_default()
            .add(payment.amount);
        summary
            .by_status
            .entry(payment.status)
            .or_default()
            .add(payment.amount);
    }

    let per_page = match filter.per_page {
        0 => default_page_size,
        n => n,
    }
    .clamp(1, max_page_size.max(1));
    let page = filter.page.max(1);
    let total = matching.len();
    let payments = matching
        .into_iter()
        .skip((page - 1).saturating_mul(per_page))
        .take(per_page)
        .collect();

    PaymentHistory {
        tenant_id,
        payments,
        page,
        per_page,
        total,
        total_pages: total.div_ceil(per_page),
        summary,
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RevenueProjection {
    pub month: BillingMonth,
    /// Tenants expected to pay rent that month.
    pub tenants: usize,
    pub rent: Decimal,
    pub water: Decimal,
    pub total: Decimal,
}

/// Projects revenue for the `months` months following `current`.
///
/// Rent counts active tenants whose lease still runs on the first of the
/// month. Water is the average of verified water payments over the
/// `trailing_months` billing months before `current`.
pub fn project_revenue(
    tenants: &[TenantAccount],
    payments: &[PaymentRecord],
    current: BillingMonth,
    months: u32,
    trailing_months: u32,
) -> Vec<RevenueProjection> {
    let window_start = i32::try_from(trailing_months)
        .ok()
        .and_then(|trailing| current.plus_months(-trailing))
        .unwrap_or(BillingMonth::EARLIEST);
    let water_collected: Decimal = payments
        .iter()
        .filter(|p| {
            p.payment_type == PaymentType::Water
                && p.status == PaymentStatus::Verified
                && p.month >= window_start
                && p.month < current
        })
        .map(|p| p.amount)
        .sum();
    let water = if trailing_months == 0 {
        Decimal::ZERO
    } else {
        (water_collected / Decimal::from(trailing_months))
            .round_dp(TenantAccount::CURRENCY_PRECISION)
    };

    (1..=months)
        .map_while(|offset| i32::try_from(offset).ok().and_then(|o| current.plus_months(o)))
        .map(|month| {
            let first_day = month.first_day();
            let paying: Vec<&TenantAccount> = tenants
                .iter()
                .filter(|t| t.status().is_active() && t.lease_covers(first_day))
                .collect();
            let rent: Decimal = paying.iter().map(|t| t.rent_amount).sum();
            RevenueProjection {
                month,
                tenants: paying.len(),
                rent,
                water,
                total: rent + water,
            }
        })
        .collect()
}
