//! Quota-checked claiming of free records.
//!
//! The algorithm works on a fully loaded pool and mutates it in memory; the
//! caller is responsible for loading, holding the gate and persisting. A
//! request is all-or-nothing: either the whole remaining allowance is claimed
//! in one pass or nothing is.

use crate::{identity::Identity, pool::PoolKey, record::Record};
use chrono::{DateTime, Utc};

/// Free share of a pool below which an allocation reports low stock.
pub const LOW_STOCK_RATIO: f64 = 0.05;

/// Result classification of an allocation request.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum AllocationOutcome {
    /// The remaining allowance was claimed in full.
    Granted,
    /// The identity already holds its whole allowance. A manager unlock
    /// grants another batch.
    QuotaExhausted,
    /// The pool has fewer free records than the remaining allowance. An
    /// import restores supply.
    InsufficientSupply,
}

/// What a single pass over a pool decided.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ClaimPass {
    pub outcome: AllocationOutcome,
    /// Normalized values claimed in this pass, in storage order.
    pub values: Vec<String>,
    /// Records the identity held before this pass.
    pub held_before: usize,
}

/// Claims up to the remaining allowance of `identity` in `records`.
///
/// 1. Count records already held by `identity`; stop with
///    [`AllocationOutcome::QuotaExhausted`] if that meets `allowance`.
/// 2. Count free records (unclaimed with a non-empty value); stop with
///    [`AllocationOutcome::InsufficientSupply`] if fewer than the remaining
///    allowance.
/// 3. Claim free records in storage order until the remaining allowance is
///    met.
///
/// `records` is untouched unless the outcome is
/// [`AllocationOutcome::Granted`].
pub fn claim_remaining(
    records: &mut [Record],
    identity: Identity,
    label: &str,
    allowance: u64,
    at: DateTime<Utc>,
) -> ClaimPass {
    let held_before = records.iter().filter(|r| r.is_claimed_by(identity)).count();
    if held_before as u64 >= allowance {
        return ClaimPass {
            outcome: AllocationOutcome::QuotaExhausted,
            values: Vec::new(),
            held_before,
        };
    }

    let remaining = allowance - held_before as u64;
    let free = records.iter().filter(|r| r.is_free()).count() as u64;
    if free < remaining {
        return ClaimPass {
            outcome: AllocationOutcome::InsufficientSupply,
            values: Vec::new(),
            held_before,
        };
    }

    // `remaining <= free <= records.len()`, so this fits in usize.
    let remaining = remaining as usize;
    let mut values = Vec::with_capacity(remaining);
    for record in records.iter_mut().filter(|r| r.is_free()) {
        if values.len() == remaining {
            break;
        }
        let Some(value) = record.normalized_value().map(str::to_string) else {
            continue;
        };
        if record.claim_for(identity, label, at) {
            values.push(value);
        }
    }

    ClaimPass {
        outcome: AllocationOutcome::Granted,
        values,
        held_before,
    }
}

/// Report of one allocation request.
#[derive(Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Allocation {
    pub pool: PoolKey,
    pub outcome: AllocationOutcome,
    /// Claimed values, empty unless the outcome is `Granted`.
    pub values: Vec<String>,
    /// Total allowance (base plus extra) at the time of the request.
    pub allowance: u64,
    /// Records the identity holds after the request.
    pub held: usize,
    /// Free records left in the pool after the request.
    pub free: usize,
    /// All records of the pool.
    pub total: usize,
}

impl Allocation {
    pub fn is_granted(&self) -> bool {
        self.outcome == AllocationOutcome::Granted
    }

    /// `true` when less than [`LOW_STOCK_RATIO`] of the pool is still free.
    pub fn low_stock(&self) -> bool {
        self.total > 0 && (self.free as f64) < (self.total as f64) * LOW_STOCK_RATIO
    }
}
