//! Location allocation for sell actions.
//!
//! A sell is split across the venues that actually hold the symbol, draining
//! fast exchanges before wallets, DeFi, cold storage and generic buckets.
//! Buys are left alone: picking a destination venue is the caller's call.

use std::collections::BTreeMap;

use log::debug;
use rustc_hash::FxHashMap;

use crate::location::{location_rank, normalize_location};
use crate::plan::Plan;
use crate::types::{Action, HoldingRow, UNKNOWN_LOCATION, round_to};

/// Remaining sell amounts below this are treated as fully allocated.
pub const REMAINDER_EPSILON: f64 = 0.01;

/// symbol → normalized location → Σ value_usd
pub type LocationHoldings = FxHashMap<String, BTreeMap<String, f64>>;

/// Aggregate positive-value rows by symbol and normalized location.
pub fn holdings_by_location(rows: &[HoldingRow]) -> LocationHoldings {
    let mut holdings = LocationHoldings::default();
    for row in rows {
        if row.symbol.is_empty() || row.value_usd <= 0.0 {
            continue;
        }
        *holdings
            .entry(row.symbol.to_uppercase())
            .or_default()
            .entry(normalize_location(&row.location))
            .or_insert(0.0) += row.value_usd;
    }
    holdings
}

/// Assign venues to the plan's sell actions.
///
/// `rows` must be the rows the plan was built from (after the dust cutoff).
/// Actions that already name a concrete venue pass through unchanged, as do
/// buys. A sell for a symbol with no holdings is tagged `"Unknown"`. Every
/// other sell is replaced by one or more sub-actions whose `usd` sums to the
/// original amount.
pub fn assign_locations(mut plan: Plan, rows: &[HoldingRow], min_trade_usd: f64) -> Plan {
    let holdings = holdings_by_location(rows);
    let actions = std::mem::take(&mut plan.actions);
    let mut out = Vec::with_capacity(actions.len());

    for mut action in actions {
        if action.has_concrete_location() || !action.is_sell() {
            out.push(action);
            continue;
        }

        let held = holdings
            .get(&action.symbol.to_uppercase())
            .filter(|locs| locs.values().sum::<f64>() > 0.0);

        match held {
            Some(locs) => out.extend(split_sell(&action, locs, min_trade_usd)),
            None => {
                debug!("allocate: no holdings for {}, location unknown", action.symbol);
                action.location = Some(UNKNOWN_LOCATION.to_string());
                out.push(action);
            }
        }
    }

    plan.meta.locations_assigned = Some(out.iter().filter(|a| a.has_concrete_location()).count());
    plan.actions = out;
    plan
}

/// Split one sell over the venues holding its symbol.
///
/// Candidates are ranked by venue priority, then by held value (largest
/// first). Each takes `min(remaining, available)`; a slice below
/// `min_trade_usd` is skipped unless it is the last candidate. Any amount
/// left over fills spare room on accepted venues; what remains after that
/// goes to the accepted venue holding the most, so a venue is only asked for
/// more than it holds when every venue with room was below the minimum. If
/// nothing was accepted the whole sell lands on the largest holder.
fn split_sell(
    action: &Action,
    locations: &BTreeMap<String, f64>,
    min_trade_usd: f64,
) -> Vec<Action> {
    let mut candidates: Vec<(&str, f64)> = locations
        .iter()
        .filter(|(_, v)| **v > 0.0)
        .map(|(loc, v)| (loc.as_str(), *v))
        .collect();
    candidates.sort_by(|a, b| {
        location_rank(a.0)
            .cmp(&location_rank(b.0))
            .then(b.1.total_cmp(&a.1))
            .then(a.0.cmp(b.0))
    });

    // candidates is non-empty: the caller checked the symbol's total is positive
    let largest = candidates
        .iter()
        .fold(candidates[0], |best, c| if c.1 > best.1 { *c } else { best });

    let to_sell = -action.usd;
    let mut remaining = to_sell;
    let mut parts: Vec<(&str, f64, f64)> = Vec::new();
    let last = candidates.len() - 1;

    for (i, &(loc, available)) in candidates.iter().enumerate() {
        if remaining < REMAINDER_EPSILON {
            break;
        }
        let amount = round_to(remaining.min(available), 2);
        if amount >= min_trade_usd || (i == last && amount > 0.0) {
            parts.push((loc, available, amount));
            remaining -= amount;
        }
    }

    if parts.is_empty() {
        debug!(
            "allocate: {} ${to_sell:.2} below minimum everywhere, collapsed to {}",
            action.symbol, largest.0
        );
        return vec![action.split(action.usd, largest.0)];
    }

    // Spare room on accepted venues first.
    for part in parts.iter_mut() {
        if remaining <= 0.0 {
            break;
        }
        let room = round_to(part.1 - part.2, 2);
        if room > 0.0 {
            let extra = remaining.min(room);
            part.2 += extra;
            remaining -= extra;
        }
    }

    // Only venues below `min_trade_usd` still have room: overdraw the largest.
    if remaining > 0.0 {
        let (idx, _) = parts
            .iter()
            .enumerate()
            .fold((0, f64::MIN), |best, (i, p)| if p.1 > best.1 { (i, p.1) } else { best });
        debug!(
            "allocate: {} ${remaining:.2} left after filling venues, added to {}",
            action.symbol, parts[idx].0
        );
        parts[idx].2 += remaining;
    }

    debug!(
        "allocate: {} ${to_sell:.2} over {} location(s)",
        action.symbol,
        parts.len()
    );

    parts
        .into_iter()
        .map(|(loc, _, amount)| action.split(-amount, loc))
        .collect()
}
