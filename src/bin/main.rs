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

use chrono::NaiveDate;
use clap::Parser;
use csv::{ReaderBuilder, Trim, Writer};
use rental_ledger_rs::audit::{Actor, AuditLog};
use rental_ledger_rs::config::WorkflowConfig;
use rental_ledger_rs::notify::LogDispatcher;
use rental_ledger_rs::receipt::ReceiptBook;
use rental_ledger_rs::storage::{MemoryStore, Storage};
use rental_ledger_rs::{
    Decision, MeterReading, PaymentError, PaymentId, PaymentMethod, PaymentSubmission,
    PaymentWorkflow, TenantAccount, TenantId, TenantStatus, UserId,
};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs::File;
use std::io::{BufReader, Read, Write};
use std::path::{Path, PathBuf};
use std::process;
use std::sync::Arc;
use thiserror::Error;
use tracing_subscriber::EnvFilter;

/// Rental Ledger - Replay tenant payment events
///
/// Loads tenants, replays payment events against the workflow and prints the
/// resulting tenant balances as CSV to stdout.
#[derive(Parser, Debug)]
#[command(name = "rental-ledger-rs")]
#[command(about = "Replays rental payment events and reports tenant balances", long_about = None)]
struct Args {
    /// Path to CSV file with tenants
    ///
    /// Expected format: tenant,name,unit,rent,water_rate,balance,status,lease_end
    #[arg(long, value_name = "FILE")]
    tenants: PathBuf,

    /// Path to CSV file with payment events
    ///
    /// Expected format: event,ref,tenant,type,method,detail,amount,month,user,notes,previous,current
    /// Example: cargo run -- --tenants tenants.csv events.csv > balances.csv
    #[arg(value_name = "FILE")]
    events: PathBuf,

    /// Log filter used when RUST_LOG is unset
    #[arg(long, default_value = "warn")]
    log_level: String,
}

fn main() {
    let args = Args::parse();
    init_tracing(&args.log_level);

    let config = match WorkflowConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Invalid configuration: {}", e);
            process::exit(1);
        }
    };

    let tenants = match open(&args.tenants).and_then(|f| load_tenants(f).map_err(|e| e.to_string()))
    {
        Ok(tenants) => tenants,
        Err(e) => {
            eprintln!("Error loading tenants: {}", e);
            process::exit(1);
        }
    };

    let store = MemoryStore::new();
    for tenant in tenants {
        if let Err(error) = store.add_tenant(tenant) {
            tracing::warn!(%error, "skipping tenant");
        }
    }

    let workflow = PaymentWorkflow::new(
        store,
        Arc::new(ReceiptBook::new(config.receipt_prefix.clone())),
        Arc::new(LogDispatcher),
        Arc::new(AuditLog::new()),
    )
    .with_config(config);

    let summary = match open(&args.events)
        .and_then(|f| replay_events(&workflow, f).map_err(|e| e.to_string()))
    {
        Ok(summary) => summary,
        Err(e) => {
            eprintln!("Error replaying events: {}", e);
            process::exit(1);
        }
    };
    tracing::info!(
        applied = summary.applied,
        skipped = summary.skipped,
        "replay finished"
    );

    let output = workflow
        .store()
        .tenants()
        .map_err(|e| e.to_string())
        .and_then(|tenants| write_balances(&tenants, std::io::stdout()).map_err(|e| e.to_string()));
    if let Err(e) = output {
        eprintln!("Error writing output: {}", e);
        process::exit(1);
    }
}

fn init_tracing(log_level: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn open(path: &Path) -> Result<BufReader<File>, String> {
    File::open(path)
        .map(BufReader::new)
        .map_err(|e| format!("cannot open '{}': {}", path.display(), e))
}

fn csv_reader<R: Read>(reader: R) -> csv::Reader<R> {
    ReaderBuilder::new()
        .trim(Trim::All)
        .flexible(true)
        .has_headers(true)
        .from_reader(reader)
}

/// Raw tenant row.
///
/// Fields: `tenant, name, unit, rent, water_rate, balance, status, lease_end`
#[derive(Debug, Deserialize)]
struct TenantRow {
    tenant: u32,
    name: String,
    unit: String,
    rent: Decimal,
    water_rate: Decimal,
    #[serde(default, deserialize_with = "csv::invalid_option")]
    balance: Option<Decimal>,
    #[serde(default, deserialize_with = "csv::invalid_option")]
    status: Option<String>,
    #[serde(default, deserialize_with = "csv::invalid_option")]
    lease_end: Option<NaiveDate>,
}

impl TenantRow {
    fn into_tenant(self) -> Result<TenantAccount, PaymentError> {
        let mut tenant = TenantAccount::new(
            TenantId(self.tenant),
            self.name,
            self.unit,
            self.rent,
            self.water_rate,
        )?
        .with_opening_balance(self.balance.unwrap_or(Decimal::ZERO));
        if let Some(end) = self.lease_end {
            tenant = tenant.with_lease_end(end);
        }
        if let Some(status) = self.status {
            tenant.mark(status.parse()?)?;
        }
        Ok(tenant)
    }
}

/// Reads tenants, skipping rows that are malformed or fail validation.
pub fn load_tenants<R: Read>(reader: R) -> Result<Vec<TenantAccount>, csv::Error> {
    let mut tenants = Vec::new();
    for result in csv_reader(reader).deserialize::<TenantRow>() {
        match result.map(TenantRow::into_tenant) {
            Ok(Ok(tenant)) => tenants.push(tenant),
            Ok(Err(error)) => tracing::warn!(%error, "skipping invalid tenant"),
            Err(error) => tracing::warn!(%error, "skipping malformed tenant row"),
        }
    }
    Ok(tenants)
}

#[derive(Error, Debug)]
enum EventError {
    #[error(transparent)]
    Payment(#[from] PaymentError),

    #[error("missing {0}")]
    MissingField(&'static str),

    #[error("unknown event '{0}'")]
    UnknownEvent(String),

    #[error("unknown payment reference '{0}'")]
    UnknownReference(String),
}

/// Raw event row. Columns a given event does not use are left empty.
///
/// Fields: `event, ref, tenant, type, method, detail, amount, month, user, notes, previous, current`
#[derive(Debug, Deserialize)]
struct EventRow {
    event: String,
    #[serde(rename = "ref", default, deserialize_with = "csv::invalid_option")]
    reference: Option<String>,
    #[serde(default, deserialize_with = "csv::invalid_option")]
    tenant: Option<u32>,
    #[serde(rename = "type", default, deserialize_with = "csv::invalid_option")]
    payment_type: Option<String>,
    #[serde(default, deserialize_with = "csv::invalid_option")]
    method: Option<String>,
    #[serde(default, deserialize_with = "csv::invalid_option")]
    detail: Option<String>,
    #[serde(default, deserialize_with = "csv::invalid_option")]
    amount: Option<Decimal>,
    #[serde(default, deserialize_with = "csv::invalid_option")]
    month: Option<String>,
    #[serde(default, deserialize_with = "csv::invalid_option")]
    user: Option<u32>,
    #[serde(default, deserialize_with = "csv::invalid_option")]
    notes: Option<String>,
    #[serde(default, deserialize_with = "csv::invalid_option")]
    previous: Option<Decimal>,
    #[serde(default, deserialize_with = "csv::invalid_option")]
    current: Option<Decimal>,
}

enum Event {
    Submit {
        reference: String,
        submission: PaymentSubmission,
    },
    Decide {
        reference: String,
        decision: Decision,
        verifier: UserId,
        notes: Option<String>,
    },
    Cancel {
        reference: String,
        actor: Actor,
    },
    Reading(MeterReading),
}

fn required<T>(value: Option<T>, field: &'static str) -> Result<T, EventError> {
    value.ok_or(EventError::MissingField(field))
}

impl EventRow {
    fn into_event(self) -> Result<Event, EventError> {
        let decision = match self.event.to_lowercase().as_str() {
            "submit" => {
                let month = required(self.month, "month")?.parse().map_err(PaymentError::from)?;
                let payment_type = required(self.payment_type, "type")?
                    .parse()
                    .map_err(PaymentError::from)?;
                let method = PaymentMethod::from_parts(&required(self.method, "method")?, self.detail)
                    .map_err(PaymentError::from)?;
                return Ok(Event::Submit {
                    reference: required(self.reference, "ref")?,
                    submission: PaymentSubmission {
                        tenant_id: TenantId(required(self.tenant, "tenant")?),
                        payment_type,
                        method,
                        amount: required(self.amount, "amount")?,
                        month,
                        proofs: Vec::new(),
                    },
                });
            }
            "verify" => Decision::Verified,
            "reject" => Decision::Rejected,
            "cancel" => {
                let actor = match (self.tenant, self.user) {
                    (Some(tenant), _) => Actor::Tenant(TenantId(tenant)),
                    (None, Some(user)) => Actor::Admin(UserId(user)),
                    (None, None) => return Err(EventError::MissingField("tenant or user")),
                };
                return Ok(Event::Cancel {
                    reference: required(self.reference, "ref")?,
                    actor,
                });
            }
            "reading" => {
                return Ok(Event::Reading(MeterReading {
                    tenant_id: TenantId(required(self.tenant, "tenant")?),
                    month: required(self.month, "month")?
                        .parse()
                        .map_err(PaymentError::from)?,
                    previous_reading: required(self.previous, "previous")?,
                    current_reading: required(self.current, "current")?,
                }));
            }
            _ => return Err(EventError::UnknownEvent(self.event)),
        };

        Ok(Event::Decide {
            reference: required(self.reference, "ref")?,
            decision,
            verifier: UserId(required(self.user, "user")?),
            notes: self.notes,
        })
    }
}

/// Counts of replayed and skipped event rows.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ReplaySummary {
    pub applied: usize,
    pub skipped: usize,
}

/// Replays payment events from a CSV reader.
///
/// Payments are addressed by the free-form `ref` given at submission. Rows
/// that are malformed or refused by the workflow are skipped and logged.
///
/// # Example
///
/// ```csv
/// event,ref,tenant,type,method,detail,amount,month,user,notes
/// submit,jan,1,RENT,MPESA,QK7XY12,15000,2024-01,,
/// verify,jan,,,,,,,1,
/// ```
///
/// # Errors
///
/// Returns a CSV error only if the reader itself fails.
pub fn replay_events<S: Storage, R: Read>(
    workflow: &PaymentWorkflow<S>,
    reader: R,
) -> Result<ReplaySummary, csv::Error> {
    let mut labels: HashMap<String, PaymentId> = HashMap::new();
    let mut summary = ReplaySummary::default();

    for (line, result) in csv_reader(reader).deserialize::<EventRow>().enumerate() {
        let outcome = match result {
            Ok(row) => row
                .into_event()
                .and_then(|event| apply(workflow, &mut labels, event)),
            Err(error) => {
                tracing::warn!(row = line + 1, %error, "skipping malformed event row");
                summary.skipped += 1;
                continue;
            }
        };
        match outcome {
            Ok(()) => summary.applied += 1,
            Err(error) => {
                tracing::warn!(row = line + 1, %error, "skipping event");
                summary.skipped += 1;
            }
        }
    }

    Ok(summary)
}

fn apply<S: Storage>(
    workflow: &PaymentWorkflow<S>,
    labels: &mut HashMap<String, PaymentId>,
    event: Event,
) -> Result<(), EventError> {
    let lookup = |labels: &HashMap<String, PaymentId>, reference: String| {
        labels
            .get(&reference)
            .copied()
            .ok_or(EventError::UnknownReference(reference))
    };

    match event {
        Event::Submit {
            reference,
            submission,
        } => {
            let payment = workflow.submit_payment(submission)?;
            labels.insert(reference, payment.id);
        }
        Event::Decide {
            reference,
            decision,
            verifier,
            notes,
        } => {
            let id = lookup(labels, reference)?;
            workflow.verify_payment(id, decision, verifier, notes)?;
        }
        Event::Cancel { reference, actor } => {
            let id = lookup(labels, reference)?;
            workflow.cancel_payment(id, actor)?;
        }
        Event::Reading(reading) => {
            workflow.record_water_reading(reading)?;
        }
    }
    Ok(())
}

#[derive(Debug, Serialize)]
struct BalanceRow<'a> {
    tenant: u32,
    name: &'a str,
    unit: &'a str,
    rent: Decimal,
    balance: Decimal,
    status: TenantStatus,
}

/// Write tenant balances to a CSV writer.
///
/// # CSV Format
///
/// Columns: `tenant, name, unit, rent, balance, status`
///
/// # Errors
///
/// Returns a CSV error if writing fails.
pub fn write_balances<W: Write>(tenants: &[TenantAccount], writer: W) -> Result<(), csv::Error> {
    let mut wtr = Writer::from_writer(writer);
    for tenant in tenants {
        wtr.serialize(BalanceRow {
            tenant: tenant.id.0,
            name: &tenant.name,
            unit: &tenant.unit,
            rent: tenant.rent_amount,
            balance: tenant
                .balance()
                .round_dp(TenantAccount::CURRENCY_PRECISION),
            status: tenant.status(),
        })?;
    }
    wtr.flush()?;
    Ok(())
}
