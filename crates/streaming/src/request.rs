use std::sync::{Arc, Weak};

use foundation::handles::Generation;
use foundation::time::IsoDate;

use crate::cache::Shared;

/// Permission to run the single bulk fetch for one year.
///
/// Issued by [`crate::cache::YearCache::begin_year_fetch`] and redeemed
/// exactly once by `complete_year_fetch`. Not `Clone`. Dropping an
/// unredeemed ticket hands the year back to the cache as retryable.
#[derive(Debug)]
pub struct YearTicket {
    year: i32,
    id: u64,
    owner: Weak<Shared>,
}

impl YearTicket {
    pub(crate) fn new(year: i32, id: u64, owner: &Arc<Shared>) -> Self {
        Self {
            year,
            id,
            owner: Arc::downgrade(owner),
        }
    }

    pub fn year(&self) -> i32 {
        self.year
    }

    /// Consumes the ticket without releasing its claim.
    pub(crate) fn redeem(mut self) -> (i32, u64) {
        self.owner = Weak::new();
        (self.year, self.id)
    }
}

impl Drop for YearTicket {
    fn drop(&mut self) {
        if let Some(owner) = self.owner.upgrade() {
            owner.abandon(self.year, self.id);
        }
    }
}

impl PartialEq for YearTicket {
    fn eq(&self, other: &Self) -> bool {
        self.year == other.year && self.id == other.id
    }
}

impl Eq for YearTicket {}

/// A single-date fetch tagged with the selection generation it belongs to.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct DateRequest {
    pub date: IsoDate,
    pub generation: Generation,
}
