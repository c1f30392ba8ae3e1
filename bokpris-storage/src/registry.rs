//! Which identifiers are monitored, and which of them need a refresh

use crate::{TimeSeriesLedger, WatchlistFile};
use bokpris_core::{Day, Isbn, PersistenceError};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

/// Monitored identifier with its last refresh date, derived from the ledger.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WatchEntry {
    pub isbn: Isbn,
    /// `None` when nothing has been recorded yet.
    pub last_update: Option<Day>,
}

/// View over the ledger and the watchlist file.
///
/// Nothing here is persisted separately: last-update dates are always
/// recomputed from ledger rows.
#[derive(Clone)]
pub struct WatchListRegistry {
    ledger: Arc<dyn TimeSeriesLedger>,
    watchlist: Arc<WatchlistFile>,
}

impl WatchListRegistry {
    pub fn new(ledger: Arc<dyn TimeSeriesLedger>, watchlist: Arc<WatchlistFile>) -> Self {
        Self { ledger, watchlist }
    }

    /// Start monitoring `isbn`. Returns whether it was newly added.
    pub fn watch(&self, isbn: &Isbn) -> Result<bool, PersistenceError> {
        self.watchlist.add(isbn)
    }

    pub fn latest_update_map(&self) -> Result<BTreeMap<Isbn, Day>, PersistenceError> {
        self.ledger.latest_date_per_identifier()
    }

    /// Identifiers due for a refresh on `today`.
    ///
    /// An identifier is stale when its latest ledger date is strictly
    /// before `today`. Watchlist members without any ledger rows are stale
    /// as well.
    pub fn stale_identifiers(&self, today: Day) -> Result<BTreeSet<Isbn>, PersistenceError> {
        let latest = self.ledger.latest_date_per_identifier()?;
        let mut stale: BTreeSet<Isbn> = latest
            .iter()
            .filter(|(_, date)| **date < today)
            .map(|(isbn, _)| isbn.clone())
            .collect();

        for member in self.watchlist.members()? {
            if !latest.contains_key(&member) {
                stale.insert(member);
            }
        }
        Ok(stale)
    }

    /// Watchlist members, then ledger-only identifiers, with last update dates.
    pub fn entries(&self) -> Result<Vec<WatchEntry>, PersistenceError> {
        let latest = self.ledger.latest_date_per_identifier()?;
        let members = self.watchlist.members()?;

        let mut entries: Vec<WatchEntry> = members
            .iter()
            .map(|isbn| WatchEntry {
                isbn: isbn.clone(),
                last_update: latest.get(isbn).copied(),
            })
            .collect();
        entries.extend(
            latest
                .iter()
                .filter(|(isbn, _)| !members.contains(isbn))
                .map(|(isbn, date)| WatchEntry {
                    isbn: isbn.clone(),
                    last_update: Some(*date),
                }),
        );
        Ok(entries)
    }
}

impl std::fmt::Debug for WatchListRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WatchListRegistry")
            .field("watchlist", &self.watchlist.path())
            .finish()
    }
}
