//! Incubation conveyor: a delay line of cohorts moving through the Bitten
//! compartment.
//!
//! Each cohort ([`ConveyorBatch`]) enters with the number of people bitten on
//! one day and the incubation time still ahead of it. Every step the conveyor
//! ages all cohorts by one day, drains the ones that have matured, and then
//! admits the day's new bites up to the remaining capacity. Amounts are
//! continuous quantities here; discretization into people happens in the
//! reconciler.
//!
//! # Per-step order
//!
//! 1. [`IncubationConveyor::advance_one_day`]
//! 2. [`IncubationConveyor::drain_expired`] (frees capacity)
//! 3. [`IncubationConveyor::try_inflow`] (may use the freed capacity)

use crate::fixed::Fixed64;

// ---------------------------------------------------------------------------
// Batch
// ---------------------------------------------------------------------------

/// A cohort that entered incubation together.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConveyorBatch {
    /// People in this cohort (fractional).
    pub amount_of_people: Fixed64,
    /// Days until the cohort matures. Matured when `<= 0`.
    pub remaining_days: Fixed64,
}

// ---------------------------------------------------------------------------
// Conveyor
// ---------------------------------------------------------------------------

/// Ordered collection of cohorts in flight. Insertion order is preserved.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IncubationConveyor {
    batches: Vec<ConveyorBatch>,
}

impl IncubationConveyor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Age every cohort by exactly one simulated day.
    pub fn advance_one_day(&mut self) {
        for batch in &mut self.batches {
            batch.remaining_days -= Fixed64::ONE;
        }
    }

    /// Total people currently incubating.
    pub fn content(&self) -> Fixed64 {
        self.batches
            .iter()
            .fold(Fixed64::ZERO, |acc, b| acc.saturating_add(b.amount_of_people))
    }

    /// Remove every matured cohort and return the total people released.
    pub fn drain_expired(&mut self) -> Fixed64 {
        let mut outflow = Fixed64::ZERO;
        self.batches.retain(|b| {
            if b.remaining_days <= Fixed64::ZERO {
                outflow = outflow.saturating_add(b.amount_of_people);
                false
            } else {
                true
            }
        });
        outflow
    }

    /// Admit up to `amount` people as a new cohort, limited by the free
    /// capacity. Returns the accepted amount, which is never negative and may
    /// be less than requested.
    pub fn try_inflow(
        &mut self,
        amount: Fixed64,
        duration_days: Fixed64,
        capacity: Fixed64,
    ) -> Fixed64 {
        let free = capacity.saturating_sub(self.content()).max(Fixed64::ZERO);
        let accepted = amount.min(free).max(Fixed64::ZERO);
        if accepted > Fixed64::ZERO {
            self.batches.push(ConveyorBatch {
                amount_of_people: accepted,
                remaining_days: duration_days,
            });
        }
        accepted
    }

    /// Cohorts in insertion order.
    pub fn batches(&self) -> &[ConveyorBatch] {
        &self.batches
    }

    pub fn len(&self) -> usize {
        self.batches.len()
    }

    pub fn is_empty(&self) -> bool {
        self.batches.is_empty()
    }

    /// Drop every cohort.
    pub fn clear(&mut self) {
        self.batches.clear();
    }
}
