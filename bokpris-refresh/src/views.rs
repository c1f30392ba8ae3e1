//! Chart payloads derived from ledger rows

use bokpris_core::{resale_proceeds, Day, PriceRecord};
use bokpris_storage::ViewKind;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// One retailer's line in a chart.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Series {
    pub dates: Vec<Day>,
    pub prices: Vec<f64>,
}

impl Series {
    fn push(&mut self, date: Day, price: f64) {
        self.dates.push(date);
        self.prices.push(price);
    }

    pub fn len(&self) -> usize {
        self.dates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.dates.is_empty()
    }
}

/// Retailer slug to series, ready to hand to a chart renderer.
///
/// Serializes as a plain JSON object keyed by slug.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ChartPayload {
    pub series: BTreeMap<String, Series>,
}

impl ChartPayload {
    /// Build the `view` of `rows`.
    ///
    /// Zero-sentinel rows are left out. The resale view keeps only resale
    /// venues and plots seller proceeds instead of listed prices.
    pub fn build(view: ViewKind, rows: &[PriceRecord]) -> Self {
        let mut sorted: Vec<&PriceRecord> = rows.iter().filter(|r| !r.is_unavailable()).collect();
        sorted.sort_by_key(|r| r.date);

        let mut series: BTreeMap<String, Series> = BTreeMap::new();
        for row in sorted {
            let value = match view {
                ViewKind::Purchase => Some(row.price),
                ViewKind::Resale => resale_proceeds(row.retailer, row.price),
            };
            if let Some(value) = value {
                series
                    .entry(row.retailer.slug().to_string())
                    .or_default()
                    .push(row.date, value);
            }
        }
        Self { series }
    }

    /// No data recorded yet for this view.
    pub fn is_empty(&self) -> bool {
        self.series.values().all(Series::is_empty)
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }
}


#[cfg(test)]
mod prop_tests {
    use super::*;
    use bokpris_test_utils::generators::arb_price_record;
    use proptest::prelude::*;

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(50))]

        /// Series are date-ordered and never plot the unavailable sentinel.
        #[test]
        fn prop_series_ordered_without_sentinels(
            rows in proptest::collection::vec(arb_price_record(), 0..40),
        ) {
            let chart = ChartPayload::build(ViewKind::Purchase, &rows);
            for series in chart.series.values() {
                prop_assert_eq!(series.dates.len(), series.prices.len());
                prop_assert!(series.dates.windows(2).all(|w| w[0] <= w[1]));
                prop_assert!(series.prices.iter().all(|p| *p > 0.0));
            }
            let plotted: usize = chart.series.values().map(Series::len).sum();
            prop_assert_eq!(plotted, rows.iter().filter(|r| !r.is_unavailable()).count());
        }
    }
}
