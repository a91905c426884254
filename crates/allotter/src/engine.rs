//! The synchronous engine facade.
//!
//! [`Engine`] ties the catalog, the pool store, the quota ledger, the status
//! book and the rosters together. Every mutating operation runs its whole
//! load-mutate-replace cycle under the single [`Gate`]; statistics and exports
//! read without it.
//!
//! All methods block on file I/O proportional to pool size. Async callers
//! should go through [`crate::Service`], which offloads them to a worker.

use crate::{
    allocate::{Allocation, AllocationOutcome, claim_remaining},
    error::{Error, Result},
    gate::{Gate, GateGuard},
    identity::{Identity, IdentityStatus},
    import::{Candidate, ImportSummary, merge_candidates},
    pool::{PoolCatalog, PoolKey, PoolSpec},
    quota::QuotaLedger,
    record::{RECORD_HEADER, Record},
    roster::IdRoster,
    stats::{PoolStats, StatsReport},
    status::StatusBook,
    store::{CsvPoolStore, MemoryPoolStore, PoolStore},
    telemetry,
    time::{SystemClock, TimeSource},
    workbook::{Sheet, Workbook},
};
use std::{path::Path, sync::Arc, time::Instant};

/// Manager roster file name inside the data directory.
pub const MANAGERS_FILE: &str = "admins.txt";
/// Visitor roster file name inside the data directory.
pub const VISITORS_FILE: &str = "users.txt";
/// Quota ledger file name inside the data directory.
pub const QUOTAS_FILE: &str = "user_limits.csv";
/// Identity status file name inside the data directory.
pub const STATUSES_FILE: &str = "user_status.csv";

/// Result of unlocking one pool for one identity.
#[derive(Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(tag = "result", rename_all = "snake_case"))]
pub enum PoolUnlock {
    /// The identity holds nothing in this pool.
    NoClaims,
    /// The allowance was exhausted; one more base-limit batch was granted.
    Unlocked { granted: u32, allowance: u64 },
    /// The allowance still has room; nothing changed.
    NotExhausted { remaining: u64 },
}

/// Result of unlocking every pool for one identity.
///
/// Pools in which the identity holds nothing are not listed.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct UnlockReport {
    /// `(pool, granted)`: pools that received another batch of `granted`.
    pub unlocked: Vec<(PoolKey, u32)>,
    /// `(pool, remaining)`: pools whose allowance was not used up yet.
    pub skipped: Vec<(PoolKey, u64)>,
}

impl UnlockReport {
    pub fn is_empty(&self) -> bool {
        self.unlocked.is_empty() && self.skipped.is_empty()
    }
}

/// What happened to one sheet of an all-pools import.
#[derive(Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(tag = "result", rename_all = "snake_case"))]
pub enum SheetImport {
    Imported(ImportSummary),
    /// The sheet maps to a pool but has no usable values.
    Empty { sheet: String },
    /// The sheet name is not a known pool alias.
    UnknownSheet { sheet: String },
    /// The pool could not be read or written. Sheets imported before it stay
    /// imported.
    Failed { sheet: String, reason: String },
}

/// The claimed values of one identity.
#[derive(Clone, Debug, PartialEq)]
pub struct IdentityExport {
    pub workbook: Workbook,
    /// `(pool, claimed)` for every pool with at least one claim.
    pub counts: Vec<(PoolKey, usize)>,
}

impl IdentityExport {
    pub fn total(&self) -> usize {
        self.counts.iter().map(|(_, n)| n).sum()
    }
}

/// Name of the sheet produced for an identity without claims.
pub const EMPTY_EXPORT_SHEET: &str = "Empty";

/// Record-pool allocation engine.
pub struct Engine<S = CsvPoolStore> {
    catalog: PoolCatalog,
    store: S,
    quotas: QuotaLedger,
    statuses: StatusBook,
    managers: IdRoster,
    visitors: IdRoster,
    clock: Arc<dyn TimeSource>,
    gate: Gate,
}

impl<S> core::fmt::Debug for Engine<S> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Engine")
            .field("pools", &self.catalog.len())
            .field("gate_held", &self.gate.is_held())
            .finish_non_exhaustive()
    }
}

/// Builder for an [`Engine`] over an arbitrary store.
///
/// Ledgers and rosters default to in-memory instances and the clock to the
/// system clock.
pub struct EngineBuilder<S> {
    catalog: PoolCatalog,
    store: S,
    quotas: Option<QuotaLedger>,
    statuses: Option<StatusBook>,
    managers: Option<IdRoster>,
    visitors: Option<IdRoster>,
    clock: Option<Arc<dyn TimeSource>>,
}

impl<S: PoolStore> EngineBuilder<S> {
    #[must_use]
    pub fn catalog(mut self, catalog: PoolCatalog) -> Self {
        self.catalog = catalog;
        self
    }

    #[must_use]
    pub fn quotas(mut self, quotas: QuotaLedger) -> Self {
        self.quotas = Some(quotas);
        self
    }

    #[must_use]
    pub fn statuses(mut self, statuses: StatusBook) -> Self {
        self.statuses = Some(statuses);
        self
    }

    #[must_use]
    pub fn managers(mut self, managers: IdRoster) -> Self {
        self.managers = Some(managers);
        self
    }

    #[must_use]
    pub fn visitors(mut self, visitors: IdRoster) -> Self {
        self.visitors = Some(visitors);
        self
    }

    #[must_use]
    pub fn clock(mut self, clock: impl TimeSource + 'static) -> Self {
        self.clock = Some(Arc::new(clock));
        self
    }

    pub fn build(self) -> Engine<S> {
        Engine {
            catalog: self.catalog,
            store: self.store,
            quotas: self.quotas.unwrap_or_else(QuotaLedger::in_memory),
            statuses: self.statuses.unwrap_or_else(StatusBook::in_memory),
            managers: self.managers.unwrap_or_else(IdRoster::in_memory),
            visitors: self.visitors.unwrap_or_else(IdRoster::in_memory),
            clock: self.clock.unwrap_or_else(|| Arc::new(SystemClock)),
            gate: Gate::new(),
        }
    }
}

impl Engine<CsvPoolStore> {
    /// An engine persisting everything as files under `data_dir`, with the
    /// default catalog.
    pub fn open(data_dir: impl AsRef<Path>) -> Self {
        let dir = data_dir.as_ref();
        Self::builder(CsvPoolStore::new(dir))
            .quotas(QuotaLedger::open(dir.join(QUOTAS_FILE)))
            .statuses(StatusBook::open(dir.join(STATUSES_FILE)))
            .managers(IdRoster::open(dir.join(MANAGERS_FILE)))
            .visitors(IdRoster::open(dir.join(VISITORS_FILE)))
            .build()
    }
}

impl Engine<MemoryPoolStore> {
    /// An engine that keeps all state in memory.
    pub fn in_memory(catalog: PoolCatalog) -> Self {
        Self::builder(MemoryPoolStore::new()).catalog(catalog).build()
    }
}

impl<S: PoolStore> Engine<S> {
    pub fn builder(store: S) -> EngineBuilder<S> {
        EngineBuilder {
            catalog: PoolCatalog::default(),
            store,
            quotas: None,
            statuses: None,
            managers: None,
            visitors: None,
            clock: None,
        }
    }

    pub fn catalog(&self) -> &PoolCatalog {
        &self.catalog
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn quotas(&self) -> &QuotaLedger {
        &self.quotas
    }

    fn enter(&self) -> Gated<'_> {
        Gated {
            _guard: self.gate.enter(),
            since: Instant::now(),
        }
    }

    // ---------------------------------------------------------------------
    // Allocation
    // ---------------------------------------------------------------------

    /// Claims the remaining allowance of `identity` in `pool`.
    ///
    /// Only approved identities may allocate. Quota exhaustion and short
    /// supply are reported through [`Allocation::outcome`]; the pool is only
    /// rewritten when records were actually claimed.
    #[cfg_attr(feature = "tracing", tracing::instrument(level = "debug", skip(self, pool, label), fields(pool = %pool)))]
    pub fn allocate(&self, pool: &PoolKey, identity: Identity, label: &str) -> Result<Allocation> {
        let spec = self.catalog.get(pool)?;
        self.ensure_approved(identity)?;
        telemetry::increment_allocation_requests();

        let _gate = self.enter();
        let allowance = self.quotas.total_allowance(identity, spec)?;
        let mut records = self.store.load(spec)?;
        let pass = claim_remaining(&mut records, identity, label, allowance, self.clock.now());

        match pass.outcome {
            AllocationOutcome::Granted => {
                self.store.replace(spec, &records)?;
                telemetry::increment_records_claimed(pass.values.len() as u64);
            }
            AllocationOutcome::QuotaExhausted => telemetry::increment_quota_exhausted(),
            AllocationOutcome::InsufficientSupply => telemetry::increment_insufficient_supply(),
        }

        let allocation = Allocation {
            pool: spec.key.clone(),
            outcome: pass.outcome,
            held: pass.held_before + pass.values.len(),
            values: pass.values,
            allowance,
            free: records.iter().filter(|r| r.is_free()).count(),
            total: records.len(),
        };

        #[cfg(feature = "tracing")]
        {
            tracing::info!(
                outcome = ?allocation.outcome,
                claimed = allocation.values.len(),
                held = allocation.held,
                allowance,
                "allocation finished"
            );
            if allocation.is_granted() && allocation.low_stock() {
                tracing::warn!(
                    free = allocation.free,
                    total = allocation.total,
                    "pool is running low"
                );
            }
        }

        Ok(allocation)
    }

    fn ensure_approved(&self, identity: Identity) -> Result<()> {
        match self.statuses.get(identity)? {
            Some(IdentityStatus::Approved) => Ok(()),
            other => Err(Error::NotAuthorized {
                identity,
                reason: match other {
                    Some(status) => format!("status is {status}"),
                    None => "identity is not registered".to_string(),
                },
            }),
        }
    }

    // ---------------------------------------------------------------------
    // Import
    // ---------------------------------------------------------------------

    /// Merges `candidates` into `pool`, dropping empty values and
    /// case-insensitive duplicates.
    #[cfg_attr(feature = "tracing", tracing::instrument(level = "debug", skip(self, pool, candidates), fields(pool = %pool)))]
    pub fn import<I>(&self, pool: &PoolKey, candidates: I) -> Result<ImportSummary>
    where
        I: IntoIterator<Item = Candidate>,
    {
        let spec = self.catalog.get(pool)?;
        let candidates: Vec<Candidate> = candidates.into_iter().collect();
        let _gate = self.enter();
        self.import_locked(spec, candidates)
    }

    fn import_locked(&self, spec: &PoolSpec, candidates: Vec<Candidate>) -> Result<ImportSummary> {
        let offered = candidates.len();
        let mut records = self.store.load(spec)?;
        let added = merge_candidates(&mut records, candidates);
        if added > 0 {
            self.store.replace(spec, &records)?;
        }

        let summary = ImportSummary {
            pool: spec.key.clone(),
            candidates: offered,
            added,
        };
        telemetry::record_import(summary.added as u64, summary.skipped() as u64);

        #[cfg(feature = "tracing")]
        tracing::info!(
            pool = %spec.key,
            added = summary.added,
            skipped = summary.skipped(),
            "import finished"
        );
        Ok(summary)
    }

    /// Imports the first column of the first sheet of `workbook` into `pool`.
    ///
    /// The first row is a title row. Cells reading as a column title are
    /// ignored as well.
    pub fn import_workbook(&self, pool: &PoolKey, workbook: &Workbook) -> Result<ImportSummary> {
        let sheet = workbook.first_sheet().ok_or_else(|| Error::MalformedInput {
            reason: "workbook has no sheets".to_string(),
        })?;
        self.import(pool, sheet.first_column_candidates())
    }

    /// Imports every sheet of `workbook` into the pool its name maps to.
    ///
    /// Sheets with unknown names are reported and left alone. The gate is
    /// taken per sheet, so a sheet whose pool cannot be stored is reported as
    /// [`SheetImport::Failed`] without undoing the sheets before it.
    #[cfg_attr(feature = "tracing", tracing::instrument(level = "debug", skip_all, fields(sheets = workbook.sheets.len())))]
    pub fn import_all_sheets(&self, workbook: &Workbook) -> Result<Vec<SheetImport>> {
        let mut results = Vec::with_capacity(workbook.sheets.len());
        for sheet in &workbook.sheets {
            let Some(spec) = self.catalog.resolve_sheet(&sheet.name) else {
                #[cfg(feature = "tracing")]
                tracing::warn!(sheet = %sheet.name, "skipping sheet with unknown name");
                results.push(SheetImport::UnknownSheet {
                    sheet: sheet.name.clone(),
                });
                continue;
            };

            let candidates = sheet.first_column_candidates();
            if candidates.is_empty() {
                results.push(SheetImport::Empty {
                    sheet: sheet.name.clone(),
                });
                continue;
            }

            let _gate = self.enter();
            match self.import_locked(spec, candidates) {
                Ok(summary) => results.push(SheetImport::Imported(summary)),
                Err(err) => {
                    #[cfg(feature = "tracing")]
                    tracing::error!(sheet = %sheet.name, pool = %spec.key, "sheet import failed: {err}");
                    results.push(SheetImport::Failed {
                        sheet: sheet.name.clone(),
                        reason: err.to_string(),
                    });
                }
            }
        }
        Ok(results)
    }

    // ---------------------------------------------------------------------
    // Export and statistics (ungated reads)
    // ---------------------------------------------------------------------

    /// Every pool as one sheet of raw record rows, in catalog order.
    pub fn export_all(&self) -> Result<Workbook> {
        let mut workbook = Workbook::new();
        for spec in self.catalog.iter() {
            let mut sheet = Sheet::new(&spec.name);
            sheet.push_row(RECORD_HEADER);
            for record in self.store.load(spec)? {
                sheet.push_row(record.to_columns());
            }
            workbook.push(sheet);
        }
        Ok(workbook)
    }

    /// The values claimed by `identity`, one sheet per pool it holds
    /// anything in.
    pub fn export_for_identity(&self, identity: Identity) -> Result<IdentityExport> {
        let mut workbook = Workbook::new();
        let mut counts = Vec::new();
        for spec in self.catalog.iter() {
            let values: Vec<String> = self
                .store
                .load(spec)?
                .iter()
                .filter(|r| r.is_claimed_by(identity))
                .filter_map(|r| r.normalized_value().map(str::to_string))
                .collect();
            if values.is_empty() {
                continue;
            }

            let mut sheet = Sheet::new(&spec.name);
            sheet.push_row([RECORD_HEADER[0]]);
            counts.push((spec.key.clone(), values.len()));
            for value in values {
                sheet.push_row([value]);
            }
            workbook.push(sheet);
        }

        if workbook.sheets.is_empty() {
            let mut sheet = Sheet::new(EMPTY_EXPORT_SHEET);
            sheet.push_row(["No claimed records"]);
            workbook.push(sheet);
        }
        Ok(IdentityExport { workbook, counts })
    }

    /// Point-in-time statistics of every pool.
    pub fn get_stats(&self) -> Result<StatsReport> {
        let now = self.clock.now();
        let pools = self
            .catalog
            .iter()
            .map(|spec| Ok(PoolStats::compute(spec, &self.store.load(spec)?, now)))
            .collect::<Result<Vec<_>>>()?;
        Ok(StatsReport {
            taken_at: now,
            pools,
        })
    }

    /// Records `identity` holds in `pool`.
    pub fn held_by(&self, pool: &PoolKey, identity: Identity) -> Result<usize> {
        let spec = self.catalog.get(pool)?;
        Ok(count_held(&self.store.load(spec)?, identity))
    }

    // ---------------------------------------------------------------------
    // Quotas
    // ---------------------------------------------------------------------

    pub fn get_extra_limit(&self, identity: Identity, pool: &PoolKey) -> Result<u64> {
        self.catalog.get(pool)?;
        self.quotas.get_extra(identity, pool)
    }

    pub fn total_allowance(&self, identity: Identity, pool: &PoolKey) -> Result<u64> {
        self.quotas.total_allowance(identity, self.catalog.get(pool)?)
    }

    /// Overwrites the extra allowance of `identity` on `pool`.
    pub fn set_extra_limit(&self, identity: Identity, pool: &PoolKey, value: u64) -> Result<()> {
        self.catalog.get(pool)?;
        let _gate = self.enter();
        self.quotas.set_extra(identity, pool, value)?;

        #[cfg(feature = "tracing")]
        tracing::info!(%identity, %pool, extra = value, "extra limit set");
        Ok(())
    }

    /// Grants one more base-limit batch in `pool` if `identity` has used up
    /// its allowance there.
    #[cfg_attr(feature = "tracing", tracing::instrument(level = "debug", skip(self, pool), fields(pool = %pool)))]
    pub fn unlock_pool(&self, pool: &PoolKey, identity: Identity) -> Result<PoolUnlock> {
        let spec = self.catalog.get(pool)?;
        let _gate = self.enter();
        self.unlock_locked(spec, identity)
    }

    /// [`Engine::unlock_pool`] applied to every pool `identity` holds
    /// records in, under a single gate acquisition.
    #[cfg_attr(feature = "tracing", tracing::instrument(level = "debug", skip(self)))]
    pub fn unlock(&self, identity: Identity) -> Result<UnlockReport> {
        let _gate = self.enter();
        let mut report = UnlockReport::default();
        for spec in self.catalog.iter() {
            match self.unlock_locked(spec, identity)? {
                PoolUnlock::NoClaims => {}
                PoolUnlock::Unlocked { granted, .. } => {
                    report.unlocked.push((spec.key.clone(), granted));
                }
                PoolUnlock::NotExhausted { remaining } => {
                    report.skipped.push((spec.key.clone(), remaining));
                }
            }
        }
        Ok(report)
    }

    fn unlock_locked(&self, spec: &PoolSpec, identity: Identity) -> Result<PoolUnlock> {
        let held = count_held(&self.store.load(spec)?, identity) as u64;
        if held == 0 {
            return Ok(PoolUnlock::NoClaims);
        }

        let allowance = self.quotas.total_allowance(identity, spec)?;
        if held < allowance {
            return Ok(PoolUnlock::NotExhausted {
                remaining: allowance - held,
            });
        }

        // The ledger only grows: a larger extra is never lowered here.
        let extra = held.max(self.quotas.get_extra(identity, &spec.key)?);
        self.quotas.set_extra(identity, &spec.key, extra)?;

        #[cfg(feature = "tracing")]
        tracing::info!(%identity, pool = %spec.key, extra, "allowance unlocked");

        Ok(PoolUnlock::Unlocked {
            granted: spec.base_limit,
            allowance: u64::from(spec.base_limit).saturating_add(extra),
        })
    }

    // ---------------------------------------------------------------------
    // Pools
    // ---------------------------------------------------------------------

    /// Empties every pool. Pool definitions stay. Returns the number of
    /// records removed.
    #[cfg_attr(feature = "tracing", tracing::instrument(level = "debug", skip(self)))]
    pub fn clear_all_pools(&self) -> Result<usize> {
        let _gate = self.enter();
        let mut removed = 0;
        for spec in self.catalog.iter() {
            removed += self.store.load(spec)?.len();
            self.store.replace(spec, &[])?;
        }

        #[cfg(feature = "tracing")]
        tracing::warn!(removed, "all pools cleared");
        Ok(removed)
    }

    // ---------------------------------------------------------------------
    // Identity status
    // ---------------------------------------------------------------------

    pub fn get_status(&self, identity: Identity) -> Result<Option<IdentityStatus>> {
        self.statuses.get(identity)
    }

    pub fn set_status(&self, identity: Identity, status: IdentityStatus) -> Result<()> {
        let _gate = self.enter();
        self.statuses.set(identity, status)?;

        #[cfg(feature = "tracing")]
        tracing::info!(%identity, %status, "status changed");
        Ok(())
    }

    /// Registers `identity` as pending unless it already has a status.
    /// Returns the status after the call.
    pub fn request_access(&self, identity: Identity) -> Result<IdentityStatus> {
        let _gate = self.enter();
        if let Some(status) = self.statuses.get(identity)? {
            return Ok(status);
        }
        self.statuses.set(identity, IdentityStatus::Pending)?;
        Ok(IdentityStatus::Pending)
    }

    /// Lifts a ban. Returns `false`, changing nothing, when `identity` is
    /// not currently banned.
    pub fn unban(&self, identity: Identity) -> Result<bool> {
        let _gate = self.enter();
        if self.statuses.get(identity)? != Some(IdentityStatus::Banned) {
            return Ok(false);
        }
        self.statuses.set(identity, IdentityStatus::Approved)?;
        Ok(true)
    }

    pub fn statuses(&self) -> Result<Vec<(Identity, IdentityStatus)>> {
        self.statuses.entries()
    }

    // ---------------------------------------------------------------------
    // Rosters
    // ---------------------------------------------------------------------

    pub fn is_manager(&self, identity: Identity) -> Result<bool> {
        self.managers.contains(identity)
    }

    pub fn add_manager(&self, identity: Identity) -> Result<bool> {
        let _gate = self.enter();
        self.managers.add(identity)
    }

    /// Adds `identity` to the manager roster on behalf of `actor`.
    ///
    /// `actor` must be a manager unless the roster is empty, in which case
    /// anyone may add the first manager. The check and the insert happen
    /// under one gate acquisition, so only one bootstrap can win.
    pub fn add_manager_as(&self, actor: Identity, identity: Identity) -> Result<bool> {
        let _gate = self.enter();
        let managers = self.managers.members()?;
        if !managers.is_empty() && !managers.contains(&actor) {
            #[cfg(feature = "tracing")]
            tracing::warn!(%actor, "manager operation refused");
            return Err(Error::NotAuthorized {
                identity: actor,
                reason: "not a manager".to_string(),
            });
        }
        let added = self.managers.add(identity)?;

        #[cfg(feature = "tracing")]
        {
            if added {
                tracing::info!(%actor, %identity, "manager added");
            }
        }
        Ok(added)
    }

    pub fn managers(&self) -> Result<Vec<Identity>> {
        self.managers.members()
    }

    /// Notes that `identity` has been seen. Returns `true` on first sight.
    pub fn record_visit(&self, identity: Identity) -> Result<bool> {
        let _gate = self.enter();
        self.visitors.add(identity)
    }

    pub fn visitor_count(&self) -> Result<usize> {
        self.visitors.len()
    }
}

fn count_held(records: &[Record], identity: Identity) -> usize {
    records.iter().filter(|r| r.is_claimed_by(identity)).count()
}

/// The gate plus the time it was entered, reported on release.
struct Gated<'a> {
    _guard: GateGuard<'a>,
    since: Instant,
}

impl Drop for Gated<'_> {
    fn drop(&mut self) {
        telemetry::record_gate_hold(self.since.elapsed().as_secs_f64() * 1_000.0);
    }
}
