//! Ledger behaviour under concurrent writers.

use bokpris_core::{PriceRecord, Retailer};
use bokpris_storage::{TimeSeriesLedger, WriteOutcome};
use bokpris_test_utils::{day, sample_isbn, sample_isbns, temp_csv_ledger};
use std::thread;

#[test]
fn test_distinct_concurrent_writes_are_all_kept() {
    let (_dir, ledger) = temp_csv_ledger();

    let mut handles = Vec::new();
    for (i, isbn) in sample_isbns().into_iter().enumerate() {
        for retailer in Retailer::ALL {
            for d in 1..=5u32 {
                let ledger = ledger.clone();
                let isbn = isbn.clone();
                handles.push(thread::spawn(move || {
                    let price = 100.0 + i as f64 + d as f64;
                    ledger
                        .write(&PriceRecord::new(day(2025, 4, d), isbn, retailer, price))
                        .unwrap()
                }));
            }
        }
    }
    for handle in handles {
        assert_eq!(handle.join().unwrap(), WriteOutcome::Appended);
    }

    let rows = ledger.rows().unwrap();
    assert_eq!(rows.len(), 4 * 4 * 5);

    let text = std::fs::read_to_string(ledger.path()).unwrap();
    assert_eq!(text.lines().count(), 4 * 4 * 5 + 1);
    assert_eq!(text.lines().next(), Some("date,identifier,retailer,price"));
}

#[test]
fn test_same_key_concurrent_writes_yield_one_row() {
    let (_dir, ledger) = temp_csv_ledger();
    let isbn = sample_isbn();

    let handles: Vec<_> = (0..16)
        .map(|i| {
            let ledger = ledger.clone();
            let isbn = isbn.clone();
            thread::spawn(move || {
                ledger
                    .write(&PriceRecord::new(day(2025, 4, 2), isbn, Retailer::Bokus, 200.0 + i as f64))
                    .unwrap()
            })
        })
        .collect();

    let appended = handles
        .into_iter()
        .map(|h| h.join().unwrap())
        .filter(|o| *o == WriteOutcome::Appended)
        .count();

    assert_eq!(appended, 1);
    assert_eq!(ledger.read(&isbn, None).unwrap().len(), 1);
}
