//! Partitioned processing.
//!
//! Accounts that never meet are independent: no transaction moves value
//! between them and no balance assertion sums them together. Each connected
//! group of accounts is processed on its own with rayon, against a price
//! database loaded up front, and the results are put back in stream order.
//! The output is identical to the sequential processor's.

use rayon::prelude::*;
use std::collections::HashMap;
use tallyman_core::intern::is_within;
use tallyman_core::{Directive, DirectiveId, Sourced};
use tallyman_prices::PriceDatabase;
use tallyman_validate::Diagnostic;
use tracing::debug;

use crate::processor::{date_order_diagnostics, Processor};
use crate::{BookingStats, Options, ProcessOutput};

/// Union-find over account names.
#[derive(Default)]
struct Components<'d> {
    index: HashMap<&'d str, usize>,
    parent: Vec<usize>,
}

impl<'d> Components<'d> {
    fn slot(&mut self, account: &'d str) -> usize {
        let next = self.parent.len();
        let slot = *self.index.entry(account).or_insert(next);
        if slot == next {
            self.parent.push(next);
        }
        slot
    }

    fn find(&mut self, mut x: usize) -> usize {
        while self.parent[x] != x {
            self.parent[x] = self.parent[self.parent[x]];
            x = self.parent[x];
        }
        x
    }

    fn union(&mut self, a: usize, b: usize) {
        let (ra, rb) = (self.find(a), self.find(b));
        if ra != rb {
            self.parent[ra.max(rb)] = ra.min(rb);
        }
    }
}

/// Split directive indices into independent groups, each in stream order.
///
/// Price and uninterpreted directives belong to no group. Directives that
/// name no account at all (an empty transaction) form a group of their own.
pub(crate) fn partition(directives: &[Sourced<Directive>]) -> Vec<Vec<usize>> {
    let mut components = Components::default();

    for sourced in directives {
        let accounts = sourced.value.accounts();
        let Some((first, rest)) = accounts.split_first() else {
            continue;
        };
        let root = components.slot(first);
        for account in rest {
            let other = components.slot(account);
            components.union(root, other);
        }
    }

    // An assertion on a parent sums its sub-accounts.
    let names: Vec<&str> = components.index.keys().copied().collect();
    for sourced in directives {
        if let Directive::Balance(balance) = &sourced.value {
            let parent = components.slot(&balance.account);
            for name in names.iter().copied().filter(|n| is_within(n, &balance.account)) {
                let child = components.slot(name);
                components.union(parent, child);
            }
        }
    }

    let mut groups: Vec<Vec<usize>> = Vec::new();
    let mut group_of_root: HashMap<usize, usize> = HashMap::new();
    let mut loose = Vec::new();
    for (i, sourced) in directives.iter().enumerate() {
        if matches!(sourced.value, Directive::Price(_) | Directive::Other(_)) {
            continue;
        }
        let Some(first) = sourced.value.accounts().first().copied() else {
            loose.push(i);
            continue;
        };
        let slot = components.slot(first);
        let root = components.find(slot);
        let group = *group_of_root.entry(root).or_insert_with(|| {
            groups.push(Vec::new());
            groups.len() - 1
        });
        groups[group].push(i);
    }
    if !loose.is_empty() {
        groups.push(loose);
    }
    groups
}

/// Process `directives` one account group per task.
pub(crate) fn process(directives: &[Sourced<Directive>], options: &Options) -> ProcessOutput {
    let mut diagnostics = date_order_diagnostics(directives);

    let mut prices = PriceDatabase::new();
    for (i, sourced) in directives.iter().enumerate() {
        if let Directive::Price(price) = &sourced.value {
            if let Err(err) = prices.record_directive(price) {
                diagnostics.push(Diagnostic::from_price_error(&err, DirectiveId(i), price.date));
            }
        }
    }

    let groups = partition(directives);
    debug!(groups = groups.len(), prices = prices.len(), "partitioned accounts");

    let results: Vec<_> = groups
        .par_iter()
        .map(|indices| {
            let entries: Vec<_> = indices
                .iter()
                .map(|&i| (DirectiveId(i), &directives[i]))
                .collect();
            let mut processor = Processor::shared(options, &prices);
            let outputs = processor.process_entries(&entries, &mut |_, _| {});
            let (diagnostics, stats) = processor.finish();
            (outputs, diagnostics, stats)
        })
        .collect();

    let mut slots: Vec<Option<Sourced<Directive>>> = directives
        .iter()
        .map(|d| match d.value {
            Directive::Price(_) | Directive::Other(_) => Some(d.clone()),
            _ => None,
        })
        .collect();
    let mut stats = BookingStats::default();
    for (outputs, group_diagnostics, group_stats) in results {
        for (id, output) in outputs {
            slots[id.0] = output;
        }
        diagnostics.extend(group_diagnostics);
        stats += group_stats;
    }
    diagnostics.sort_by_key(|d| d.directive);

    ProcessOutput {
        directives: slots.into_iter().flatten().collect(),
        diagnostics,
        stats,
    }
}
