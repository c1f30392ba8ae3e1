//! Bokpris Test Utilities
//!
//! Shared test infrastructure for the bokpris workspace:
//! - Proptest generators for identifiers, price text and ledger rows
//! - Fixtures with the production discount terms and fast timeouts
//! - Temp-directory ledgers
//! - Assertions on bokpris error variants

// Re-export test doubles from their source crates
pub use bokpris_storage::InMemoryLedger;
pub use bokpris_stores::{ScriptedAdapter, StaticPageFetcher};

pub use bokpris_core::{
    BokprisConfig, BokprisError, Day, DiscountEngine, Isbn, ManualClock, PriceRecord, Promotion,
    Retailer, RetailerPolicy, RetryConfig,
};

pub use fixtures::*;

// ============================================================================
// GENERATORS
// ============================================================================

pub mod generators {
    //! Proptest strategies.

    use super::*;
    use proptest::prelude::*;

    /// ISBN-13 digit string with a valid check digit.
    pub fn arb_isbn13() -> impl Strategy<Value = String> {
        (prop_oneof![Just("978"), Just("979")], proptest::collection::vec(0u8..10, 9)).prop_map(
            |(prefix, body)| {
                let mut digits: Vec<u8> = prefix.bytes().map(|b| b - b'0').collect();
                digits.extend(body);
                let sum: u32 = digits
                    .iter()
                    .enumerate()
                    .map(|(i, d)| *d as u32 * if i % 2 == 0 { 1 } else { 3 })
                    .sum();
                digits.push(((10 - sum % 10) % 10) as u8);
                digits.iter().map(|d| char::from(b'0' + d)).collect()
            },
        )
    }

    /// ISBN-13 as a user might type it: hyphens and spaces sprinkled in.
    ///
    /// Yields `(typed, canonical)`.
    pub fn arb_typed_isbn13() -> impl Strategy<Value = (String, String)> {
        (arb_isbn13(), proptest::collection::vec(prop_oneof![Just(""), Just("-"), Just(" ")], 13))
            .prop_map(|(canonical, seps)| {
                let mut typed = String::new();
                for (ch, sep) in canonical.chars().zip(seps) {
                    typed.push(ch);
                    typed.push_str(sep);
                }
                (typed.trim().to_string(), canonical)
            })
    }

    pub fn arb_isbn() -> impl Strategy<Value = Isbn> {
        arb_isbn13().prop_filter_map("valid isbn", |s| Isbn::parse(&s).ok())
    }

    pub fn arb_retailer() -> impl Strategy<Value = Retailer> {
        prop_oneof![
            Just(Retailer::AdlibrisCampus),
            Just(Retailer::Studentapan),
            Just(Retailer::Bokus),
            Just(Retailer::Akademibokhandeln),
        ]
    }

    /// Swedish price text for a whole-öre amount.
    ///
    /// Yields `(text, expected value)`.
    pub fn arb_price_text() -> impl Strategy<Value = (String, f64)> {
        let suffix = prop_oneof![
            Just(" kr"),
            Just("\u{a0}kr"),
            Just(":-"),
            Just(" SEK"),
            Just(""),
        ];
        (1u32..5000, 0u32..100, suffix).prop_map(|(kronor, ore, suffix)| {
            let text = format!("{},{:02}{}", kronor, ore, suffix);
            (text, kronor as f64 + ore as f64 / 100.0)
        })
    }

    pub fn arb_day() -> impl Strategy<Value = Day> {
        (0i64..730).prop_map(|offset| {
            Day::from_ymd_opt(2024, 1, 1).unwrap_or_default() + chrono::Duration::days(offset)
        })
    }

    pub fn arb_price_record() -> impl Strategy<Value = PriceRecord> {
        (arb_day(), arb_isbn(), arb_retailer(), 0u32..500_000).prop_map(
            |(date, isbn, retailer, ore)| PriceRecord::new(date, isbn, retailer, ore as f64 / 100.0),
        )
    }
}

// ============================================================================
// FIXTURES
// ============================================================================

pub mod fixtures {
    //! Pre-built values for common scenarios.

    use super::*;
    use bokpris_storage::CsvLedger;
    use std::path::Path;
    use std::sync::Arc;

    pub const SAMPLE_ISBN: &str = "9789144156798";

    /// Distinct ISBN-13s with valid check digits.
    pub const SAMPLE_ISBNS: [&str; 4] = [
        "9789144156798",
        "9780262046305",
        "9789147112548",
        "9789144119281",
    ];

    pub fn sample_isbn() -> Isbn {
        Isbn::parse(SAMPLE_ISBN).expect("sample ISBN is valid")
    }

    pub fn sample_isbns() -> Vec<Isbn> {
        SAMPLE_ISBNS
            .iter()
            .map(|s| Isbn::parse(s).expect("sample ISBN is valid"))
            .collect()
    }

    pub fn day(year: i32, month: u32, d: u32) -> Day {
        Day::from_ymd_opt(year, month, d).expect("valid calendar day")
    }

    /// Clock pinned to midday of the given day.
    pub fn clock_at(year: i32, month: u32, d: u32) -> Arc<ManualClock> {
        Arc::new(ManualClock::at_day(day(year, month, d)))
    }

    /// Bokus 5% / 29 kr below 249, Akademibokhandeln 10% / 29 kr below 300.
    pub fn production_policies() -> Vec<RetailerPolicy> {
        vec![
            RetailerPolicy {
                retailer: Retailer::Bokus,
                standing_discount_rate: 0.05,
                shipping_cost: 29.0,
                free_shipping_threshold: 249.0,
            },
            RetailerPolicy {
                retailer: Retailer::Akademibokhandeln,
                standing_discount_rate: 0.10,
                shipping_cost: 29.0,
                free_shipping_threshold: 300.0,
            },
        ]
    }

    /// APRIL25: 10% at Bokus through April 2025.
    pub fn april_promotion() -> Promotion {
        Promotion {
            retailer: Retailer::Bokus,
            name: "APRIL25".to_string(),
            discount_rate: 0.10,
            start_date: day(2025, 4, 1),
            end_date: day(2025, 4, 30),
        }
    }

    pub fn production_engine() -> DiscountEngine {
        DiscountEngine::new(production_policies(), vec![april_promotion()])
    }

    /// Millisecond backoff so retry paths stay fast.
    pub fn fast_retry() -> RetryConfig {
        RetryConfig {
            max_retries: 2,
            initial_backoff_ms: 1,
            max_backoff_ms: 4,
            backoff_multiplier: 2.0,
        }
    }

    /// Production configuration under `data_dir` with short timeouts.
    pub fn fast_config(data_dir: &Path) -> BokprisConfig {
        let mut config = BokprisConfig::default_config(data_dir);
        config.fetch.step_timeout_ms = 500;
        config.refresh.deadline_ms = 2_000;
        config.retry = fast_retry();
        config
    }

    /// CSV ledger in a fresh temp directory. Keep the directory alive.
    pub fn temp_csv_ledger() -> (tempfile::TempDir, Arc<CsvLedger>) {
        let dir = tempfile::tempdir().expect("create temp dir");
        let ledger = Arc::new(CsvLedger::new(dir.path().join("prishistorik.csv")));
        (dir, ledger)
    }

    /// Adapter per retailer, each quoting the same title and price text.
    pub fn quoting_adapters(title: &str, raw_price: &str) -> Vec<ScriptedAdapter> {
        Retailer::ALL
            .into_iter()
            .map(|retailer| ScriptedAdapter::quoting(retailer, Some(title), Some(raw_price)))
            .collect()
    }
}

// ============================================================================
// CUSTOM ASSERTIONS
// ============================================================================

pub mod assertions {
    //! Assertions on bokpris result variants.
    //!
    //! Accept any error that converts into [`BokprisError`], so crate-level
    //! results such as `Result<_, PersistenceError>` work directly.

    use super::*;
    use std::fmt::Debug;

    fn classify<T, E>(result: &Result<T, E>) -> Option<BokprisError>
    where
        E: Clone + Into<BokprisError>,
    {
        result.as_ref().err().map(|e| e.clone().into())
    }

    #[track_caller]
    pub fn assert_persistence_error<T: Debug, E: Clone + Debug + Into<BokprisError>>(
        result: &Result<T, E>,
    ) {
        match classify(result) {
            Some(BokprisError::Persistence(_)) => {}
            _ => panic!("Expected Persistence error, got: {:?}", result),
        }
    }

    #[track_caller]
    pub fn assert_config_error<T: Debug, E: Clone + Debug + Into<BokprisError>>(
        result: &Result<T, E>,
    ) {
        match classify(result) {
            Some(BokprisError::Config(_)) => {}
            _ => panic!("Expected Config error, got: {:?}", result),
        }
    }

    /// Rows are in ascending date order.
    #[track_caller]
    pub fn assert_ascending(rows: &[PriceRecord]) {
        for pair in rows.windows(2) {
            assert!(
                pair[0].date <= pair[1].date,
                "Rows out of order: {} after {}",
                pair[1].date,
                pair[0].date
            );
        }
    }
}
