//! Booking counters.

use serde::Serialize;
use std::fmt;
use std::ops::AddAssign;

/// What booking did over a run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct BookingStats {
    /// Transactions booked.
    pub transactions: usize,
    /// Postings in booked transactions, after splitting.
    pub postings: usize,
    /// Units numbers filled in.
    pub interpolated_units: usize,
    /// Per-unit costs filled in.
    pub interpolated_costs: usize,
    /// Prices filled in, by solving or from the price database.
    pub interpolated_prices: usize,
    /// Augmentations at cost.
    pub lots_created: usize,
    /// Lots reduced, counting each lot a split reduction touched.
    pub lots_reduced: usize,
}

impl AddAssign for BookingStats {
    fn add_assign(&mut self, other: Self) {
        self.transactions += other.transactions;
        self.postings += other.postings;
        self.interpolated_units += other.interpolated_units;
        self.interpolated_costs += other.interpolated_costs;
        self.interpolated_prices += other.interpolated_prices;
        self.lots_created += other.lots_created;
        self.lots_reduced += other.lots_reduced;
    }
}

impl fmt::Display for BookingStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} transactions, {} postings, interpolated {} units / {} costs / {} prices, {} lots created, {} lots reduced",
            self.transactions,
            self.postings,
            self.interpolated_units,
            self.interpolated_costs,
            self.interpolated_prices,
            self.lots_created,
            self.lots_reduced
        )
    }
}
