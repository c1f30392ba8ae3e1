//! Append-only price ledger
//!
//! One row per `(date, identifier, retailer)`. The first write for a key
//! wins; later writes for the same key are silent no-ops. Rows are never
//! updated or deleted.

use bokpris_core::{Day, Isbn, PersistenceError, PriceRecord, Retailer};
use std::collections::BTreeMap;
use std::fs::{File, OpenOptions};
use std::io::{ErrorKind, Read, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

/// Header written when a ledger file is created.
pub const LEDGER_HEADER: &str = "date,identifier,retailer,price";

/// Header of ledgers written by earlier versions, still readable.
pub const LEGACY_LEDGER_HEADER: &str = "datum,isbn,butik,pris";

/// Outcome of [`TimeSeriesLedger::write`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteOutcome {
    Appended,
    /// A row for the same key already existed; nothing was written.
    Duplicate,
}

/// Persistent time series of price rows.
///
/// Implementations serialize the whole read-check-append cycle of `write`,
/// so concurrent writers with distinct keys never lose rows and concurrent
/// writers with the same key produce exactly one row.
pub trait TimeSeriesLedger: Send + Sync {
    fn write(&self, record: &PriceRecord) -> Result<WriteOutcome, PersistenceError>;

    /// Rows for `isbn`, optionally for one retailer, in ascending date order.
    fn read(
        &self,
        isbn: &Isbn,
        retailer: Option<Retailer>,
    ) -> Result<Vec<PriceRecord>, PersistenceError>;

    /// Latest recorded date per identifier, across all retailers.
    fn latest_date_per_identifier(&self) -> Result<BTreeMap<Isbn, Day>, PersistenceError>;
}

fn select(rows: Vec<PriceRecord>, isbn: &Isbn, retailer: Option<Retailer>) -> Vec<PriceRecord> {
    let mut selected: Vec<PriceRecord> = rows
        .into_iter()
        .filter(|r| &r.isbn == isbn && retailer.map_or(true, |wanted| r.retailer == wanted))
        .collect();
    // Stable: rows of one day keep file order.
    selected.sort_by_key(|r| r.date);
    selected
}

fn latest_dates<'a>(rows: impl IntoIterator<Item = &'a PriceRecord>) -> BTreeMap<Isbn, Day> {
    let mut latest: BTreeMap<Isbn, Day> = BTreeMap::new();
    for row in rows {
        latest
            .entry(row.isbn.clone())
            .and_modify(|d| {
                if row.date > *d {
                    *d = row.date;
                }
            })
            .or_insert(row.date);
    }
    latest
}

// ============================================================================
// CSV LEDGER
// ============================================================================

/// Ledger stored as a CSV file with header `date,identifier,retailer,price`.
///
/// Quoted fields and the legacy Swedish header are accepted on read.
///
/// The in-process mutex is held for the whole read-check-append cycle. One
/// `CsvLedger` must own a given file; share it behind an `Arc`.
#[derive(Debug)]
pub struct CsvLedger {
    path: PathBuf,
    lock: Mutex<()>,
}

impl CsvLedger {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Every well-formed row in file order. A missing file has no rows.
    pub fn rows(&self) -> Result<Vec<PriceRecord>, PersistenceError> {
        let _guard = self.lock.lock().map_err(|_| PersistenceError::LockPoisoned)?;
        self.load_rows()
    }

    fn load_text(&self) -> Result<Option<String>, PersistenceError> {
        let mut file = match File::open(&self.path) {
            Ok(file) => file,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(PersistenceError::io(&self.path, &e)),
        };
        let mut text = String::new();
        file.read_to_string(&mut text)
            .map_err(|e| PersistenceError::io(&self.path, &e))?;
        Ok(Some(text))
    }

    fn load_rows(&self) -> Result<Vec<PriceRecord>, PersistenceError> {
        Ok(self
            .load_text()?
            .map(|text| self.parse_rows(&text))
            .unwrap_or_default())
    }

    fn parse_rows(&self, text: &str) -> Vec<PriceRecord> {
        let mut reader = csv::ReaderBuilder::new()
            .has_headers(false)
            .flexible(true)
            .trim(csv::Trim::All)
            .from_reader(text.as_bytes());

        let mut rows = Vec::new();
        for (idx, result) in reader.records().enumerate() {
            let line = match &result {
                Ok(record) => record.position().map(|p| p.line()),
                Err(e) => e.position().map(|p| p.line()),
            }
            .map_or(idx + 1, |line| line as usize);
            let parsed = result.map_err(|e| e.to_string()).and_then(|record| {
                if idx == 0 && is_header(&record) {
                    return Ok(None);
                }
                parse_row(&record).map(Some)
            });
            match parsed {
                Ok(Some(row)) => rows.push(row),
                Ok(None) => {}
                Err(reason) => {
                    let err = PersistenceError::Corrupt {
                        path: self.path.display().to_string(),
                        line,
                        reason,
                    };
                    tracing::warn!(error = %err, "Skipping malformed ledger row");
                }
            }
        }
        rows
    }

    fn encode(&self, header: bool, record: &PriceRecord) -> Result<Vec<u8>, PersistenceError> {
        let io = |reason: String| PersistenceError::Io {
            path: self.path.display().to_string(),
            reason,
        };
        let mut writer = csv::WriterBuilder::new()
            .has_headers(false)
            .terminator(csv::Terminator::Any(b'\n'))
            .from_writer(Vec::new());
        if header {
            writer
                .write_record(LEDGER_HEADER.split(','))
                .map_err(|e| io(e.to_string()))?;
        }
        let price = format!("{:.2}", record.price);
        let date = record.date.format("%Y-%m-%d").to_string();
        writer
            .write_record([date.as_str(), record.isbn.as_str(), record.retailer.slug(), price.as_str()])
            .map_err(|e| io(e.to_string()))?;
        writer.into_inner().map_err(|e| io(e.to_string()))
    }
}

fn is_header(record: &csv::StringRecord) -> bool {
    [LEDGER_HEADER, LEGACY_LEDGER_HEADER]
        .iter()
        .any(|header| record.iter().eq(header.split(',')))
}

fn parse_row(record: &csv::StringRecord) -> Result<PriceRecord, String> {
    let fields: Vec<&str> = record.iter().collect();
    let [date, isbn, retailer, price] = fields.as_slice() else {
        return Err(format!("expected 4 fields, found {}", fields.len()));
    };

    let date = Day::parse_from_str(date, "%Y-%m-%d").map_err(|e| format!("date: {}", e))?;
    let isbn = Isbn::parse(isbn).map_err(|e| e.to_string())?;
    let retailer = Retailer::from_slug(retailer).ok_or_else(|| format!("unknown retailer {}", retailer))?;
    let price: f64 = price.parse().map_err(|e| format!("price: {}", e))?;
    if !price.is_finite() {
        return Err("price is not finite".to_string());
    }
    Ok(PriceRecord::new(date, isbn, retailer, price))
}

impl TimeSeriesLedger for CsvLedger {
    fn write(&self, record: &PriceRecord) -> Result<WriteOutcome, PersistenceError> {
        let _guard = self.lock.lock().map_err(|_| PersistenceError::LockPoisoned)?;

        let existing = self.load_text()?;
        if let Some(text) = existing.as_deref() {
            if self.parse_rows(text).iter().any(|r| r.key() == record.key()) {
                tracing::debug!(
                    isbn = %record.isbn,
                    retailer = %record.retailer,
                    date = %record.date,
                    "Ledger row already present"
                );
                return Ok(WriteOutcome::Duplicate);
            }
        }

        let mut chunk = Vec::new();
        let header = matches!(existing.as_deref(), None | Some(""));
        if existing.as_deref().is_some_and(|text| !text.is_empty() && !text.ends_with('\n')) {
            chunk.push(b'\n');
        }
        chunk.extend(self.encode(header, record)?);

        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|e| PersistenceError::io(parent, &e))?;
        }
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .map_err(|e| PersistenceError::io(&self.path, &e))?;
        file.write_all(&chunk)
            .and_then(|_| file.sync_data())
            .map_err(|e| PersistenceError::io(&self.path, &e))?;

        tracing::debug!(
            isbn = %record.isbn,
            retailer = %record.retailer,
            date = %record.date,
            price = record.price,
            "Ledger row appended"
        );
        Ok(WriteOutcome::Appended)
    }

    fn read(
        &self,
        isbn: &Isbn,
        retailer: Option<Retailer>,
    ) -> Result<Vec<PriceRecord>, PersistenceError> {
        Ok(select(self.rows()?, isbn, retailer))
    }

    fn latest_date_per_identifier(&self) -> Result<BTreeMap<Isbn, Day>, PersistenceError> {
        Ok(latest_dates(&self.rows()?))
    }
}

// ============================================================================
// IN-MEMORY LEDGER
// ============================================================================

#[derive(Debug, Default)]
struct MemoryState {
    rows: Vec<PriceRecord>,
    failures_remaining: u32,
}

/// Ledger held in memory, with optional injected write failures.
#[derive(Debug, Default)]
pub struct InMemoryLedger {
    state: Mutex<MemoryState>,
}

impl InMemoryLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the next `count` writes fail with an I/O error.
    pub fn fail_next_writes(&self, count: u32) {
        if let Ok(mut state) = self.state.lock() {
            state.failures_remaining = count;
        }
    }

    /// Every row in insertion order.
    pub fn rows(&self) -> Vec<PriceRecord> {
        self.state
            .lock()
            .map(|s| s.rows.clone())
            .unwrap_or_default()
    }
}

impl TimeSeriesLedger for InMemoryLedger {
    fn write(&self, record: &PriceRecord) -> Result<WriteOutcome, PersistenceError> {
        let mut state = self.state.lock().map_err(|_| PersistenceError::LockPoisoned)?;
        if state.failures_remaining > 0 {
            state.failures_remaining -= 1;
            return Err(PersistenceError::Io {
                path: "memory".to_string(),
                reason: "injected failure".to_string(),
            });
        }
        if state.rows.iter().any(|r| r.key() == record.key()) {
            return Ok(WriteOutcome::Duplicate);
        }
        state.rows.push(record.clone());
        Ok(WriteOutcome::Appended)
    }

    fn read(
        &self,
        isbn: &Isbn,
        retailer: Option<Retailer>,
    ) -> Result<Vec<PriceRecord>, PersistenceError> {
        let state = self.state.lock().map_err(|_| PersistenceError::LockPoisoned)?;
        Ok(select(state.rows.clone(), isbn, retailer))
    }

    fn latest_date_per_identifier(&self) -> Result<BTreeMap<Isbn, Day>, PersistenceError> {
        let state = self.state.lock().map_err(|_| PersistenceError::LockPoisoned)?;
        Ok(latest_dates(&state.rows))
    }
}
