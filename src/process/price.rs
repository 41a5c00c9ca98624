// src/process/price.rs

use once_cell::sync::Lazy;
use regex::Regex;

static NON_NUMERIC: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[^0-9.]").expect("price filter regex should compile"));

/// Turn a display price such as `"$1,250.50"` into a sortable number.
///
/// Everything but digits and `.` is stripped; whatever does not then parse
/// as a float (empty, `"."`, `"1.2.3"`) becomes `0.0`. The result is never
/// negative because the sign is stripped with the rest.
pub fn normalize_price(raw: &str) -> f64 {
    let digits = NON_NUMERIC.replace_all(raw, "");
    digits.parse::<f64>().unwrap_or(0.0)
}
