//! Resale proceeds on the two second-hand venues

use crate::{round2, Retailer};

/// Commission share kept by the seller on Adlibris Campus.
pub const CAMPUS_SELLER_SHARE: f64 = 0.82;
/// Fixed fee per sale on Adlibris Campus (kr).
pub const CAMPUS_FIXED_FEE: f64 = 49.0;
/// Fixed fee per sale on Studentapan (kr).
pub const STUDENTAPAN_FIXED_FEE: f64 = 72.0;
/// Studentapan takes its commission on top of the payout.
pub const STUDENTAPAN_MARKUP: f64 = 1.19;

/// What a seller receives when the venue lists the book at `listed_price`.
///
/// `None` for retailers that do not buy books back. A non-positive listed
/// price yields `Some(0.0)`; proceeds can go negative for cheap books, which
/// is reported as is.
pub fn resale_proceeds(retailer: Retailer, listed_price: f64) -> Option<f64> {
    if !retailer.is_resale_venue() {
        return None;
    }
    if !listed_price.is_finite() || listed_price <= 0.0 {
        return Some(0.0);
    }
    let proceeds = match retailer {
        Retailer::AdlibrisCampus => listed_price * CAMPUS_SELLER_SHARE - CAMPUS_FIXED_FEE,
        Retailer::Studentapan => (listed_price - STUDENTAPAN_FIXED_FEE) / STUDENTAPAN_MARKUP,
        Retailer::Bokus | Retailer::Akademibokhandeln => return None,
    };
    Some(round2(proceeds))
}
