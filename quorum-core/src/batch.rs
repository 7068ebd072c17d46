use std::future::Future;

use crate::{StoreError, StoreResult};

/// Outcome of a single item inside a fan-out batch.
#[derive(Debug, Clone, PartialEq)]
pub enum ItemOutcome {
    Committed,
    Failed(StoreError),
    /// Never attempted, because an earlier item failed.
    Skipped,
}

/// Per-item outcomes of a sequential fan-out, in the order the items were
/// given.
#[derive(Debug)]
pub struct BatchReport<K> {
    outcomes: Vec<(K, ItemOutcome)>,
}

impl<K> BatchReport<K> {
    pub fn outcomes(&self) -> &[(K, ItemOutcome)] {
        &self.outcomes
    }

    pub fn len(&self) -> usize {
        self.outcomes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.outcomes.is_empty()
    }

    pub fn committed(&self) -> impl Iterator<Item = &K> {
        self.outcomes
            .iter()
            .filter(|(_, outcome)| matches!(outcome, ItemOutcome::Committed))
            .map(|(item, _)| item)
    }

    pub fn skipped(&self) -> impl Iterator<Item = &K> {
        self.outcomes
            .iter()
            .filter(|(_, outcome)| matches!(outcome, ItemOutcome::Skipped))
            .map(|(item, _)| item)
    }

    /// The item that stopped the batch, if any.
    pub fn failure(&self) -> Option<(&K, &StoreError)> {
        self.outcomes.iter().find_map(|(item, outcome)| match outcome {
            ItemOutcome::Failed(error) => Some((item, error)),
            _ => None,
        })
    }

    /// Every item committed.
    pub fn is_complete(&self) -> bool {
        self.outcomes
            .iter()
            .all(|(_, outcome)| matches!(outcome, ItemOutcome::Committed))
    }

    /// Some items committed and at least one did not. This is the state
    /// callers must reconcile by refetching, since committed writes stay
    /// committed.
    pub fn is_partial(&self) -> bool {
        !self.is_complete() && self.committed().next().is_some()
    }
}

/// Applies an async write to each item in order, stopping at the first
/// failure.
///
/// There is no atomicity across items: writes that committed before the
/// failure stay committed, items after it are never attempted and come
/// back as [ItemOutcome::Skipped]. Callers reconcile a partial batch by
/// refetching the affected documents.
pub async fn fan_out<K, F, Fut>(items: Vec<K>, mut write: F) -> BatchReport<K>
where
    F: FnMut(&K) -> Fut,
    Fut: Future<Output = StoreResult<()>>,
{
    let mut outcomes = Vec::with_capacity(items.len());
    let mut failed = false;

    for item in items {
        if failed {
            outcomes.push((item, ItemOutcome::Skipped));
            continue;
        }

        match write(&item).await {
            Ok(()) => outcomes.push((item, ItemOutcome::Committed)),
            Err(error) => {
                failed = true;
                outcomes.push((item, ItemOutcome::Failed(error)));
            }
        }
    }

    BatchReport { outcomes }
}
