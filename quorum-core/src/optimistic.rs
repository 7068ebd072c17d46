use parking_lot::Mutex;

/// A value that is flipped locally before its confirming write commits.
///
/// Every mutation starts with [OptimisticCell::begin], which applies the
/// new value immediately and hands back a ticket holding what it
/// replaced. If the write behind the mutation fails, the ticket rolls the
/// value back. A rollback only applies while its ticket is still the
/// newest mutation: once a later mutation has taken the cell over, stale
/// rollbacks are ignored so a slow failure can't clobber a newer state.
pub struct OptimisticCell<T> {
    inner: Mutex<Inner<T>>,
}

struct Inner<T> {
    value: T,
    generation: u64,
}

/// Proof of a begun mutation, consumed by rolling it back.
#[derive(Debug)]
pub struct MutationTicket<T> {
    previous: T,
    generation: u64,
}

impl<T: Clone> OptimisticCell<T> {
    pub fn new(value: T) -> Self {
        Self {
            inner: Mutex::new(Inner {
                value,
                generation: 0,
            }),
        }
    }

    pub fn get(&self) -> T {
        self.inner.lock().value.clone()
    }

    /// Applies the new value immediately and returns the ticket guarding
    /// the mutation.
    pub fn begin(&self, value: T) -> MutationTicket<T> {
        let mut inner = self.inner.lock();

        let previous = std::mem::replace(&mut inner.value, value);
        inner.generation += 1;

        MutationTicket {
            previous,
            generation: inner.generation,
        }
    }

    /// Restores the value the ticket's mutation replaced, unless a newer
    /// mutation owns the cell. Returns whether the rollback applied.
    pub fn rollback(&self, ticket: MutationTicket<T>) -> bool {
        let mut inner = self.inner.lock();

        if inner.generation != ticket.generation {
            return false;
        }

        inner.value = ticket.previous;
        true
    }

    /// Overwrites the value outside the ticket protocol, for example with
    /// a confirmed state from a live query. Outstanding tickets become
    /// stale.
    pub fn set(&self, value: T) {
        let mut inner = self.inner.lock();

        inner.value = value;
        inner.generation += 1;
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn rollback_restores_the_previous_value() {
        let cell = OptimisticCell::new(false);

        let ticket = cell.begin(true);
        assert!(cell.get(), "the new value applies immediately");

        assert!(cell.rollback(ticket));
        assert!(!cell.get());
    }

    #[test]
    fn stale_rollback_is_ignored() {
        let cell = OptimisticCell::new(0);

        let first = cell.begin(1);
        let _second = cell.begin(2);

        assert!(!cell.rollback(first), "an older ticket no longer applies");
        assert_eq!(cell.get(), 2, "the newer mutation stays in place");
    }

    #[test]
    fn direct_set_invalidates_outstanding_tickets() {
        let cell = OptimisticCell::new("a".to_string());

        let ticket = cell.begin("b".to_string());
        cell.set("confirmed".to_string());

        assert!(!cell.rollback(ticket));
        assert_eq!(cell.get(), "confirmed");
    }

    #[test]
    fn latest_ticket_still_applies_after_older_ones_expire() {
        let cell = OptimisticCell::new(0);

        let _first = cell.begin(1);
        let second = cell.begin(2);

        assert!(cell.rollback(second));
        assert_eq!(cell.get(), 1, "rolling back restores what it replaced");
    }
}
