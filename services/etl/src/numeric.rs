//! Numeric coercion and edge-case policy
//!
//! Source spreadsheets carry free-text numbers ("$45,000*", "n/a", blank).
//! Parsing never fails: a value either parses to a finite number or becomes
//! [`Numeric::Missing`]. Division and sanitization helpers below encode the
//! zero-instead-of-inf/NaN policy in one place.

/// Decimal places kept for stored fact values
pub const FACT_PRECISION: i32 = 6;

/// Result of coercing a raw field to a number
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Numeric {
    Value(f64),
    Missing,
}

impl Numeric {
    /// Parse a plain numeric field. Thousands separators are tolerated;
    /// anything else non-numeric (including "inf"/"NaN") is missing.
    pub fn parse(raw: &str) -> Self {
        let cleaned: String = raw
            .trim()
            .chars()
            .filter(|c| *c != ',' && !c.is_whitespace())
            .collect();
        Self::from_cleaned(&cleaned)
    }

    /// Parse a listed price: drops currency symbols and the footnote
    /// asterisks the registry export appends to some prices.
    pub fn parse_price(raw: &str) -> Self {
        let cleaned: String = raw
            .trim()
            .chars()
            .filter(|c| !matches!(c, '*' | '$' | ',') && !c.is_whitespace())
            .collect();
        Self::from_cleaned(&cleaned)
    }

    fn from_cleaned(cleaned: &str) -> Self {
        if cleaned.is_empty() {
            return Numeric::Missing;
        }
        match cleaned.parse::<f64>() {
            Ok(v) if v.is_finite() => Numeric::Value(v),
            _ => Numeric::Missing,
        }
    }

    pub fn value(self) -> Option<f64> {
        match self {
            Numeric::Value(v) => Some(v),
            Numeric::Missing => None,
        }
    }

    pub fn or_zero(self) -> f64 {
        self.value().unwrap_or(0.0)
    }
}

/// Running mean that ignores missing values; an all-missing mean is zero.
#[derive(Debug, Default, Clone, Copy)]
pub struct MeanAccumulator {
    sum: f64,
    count: u64,
}

impl MeanAccumulator {
    pub fn push(&mut self, value: Numeric) {
        if let Numeric::Value(v) = value {
            self.sum += v;
            self.count += 1;
        }
    }

    pub fn mean(&self) -> Option<f64> {
        if self.count == 0 {
            None
        } else {
            Some(self.sum / self.count as f64)
        }
    }

    pub fn mean_or_zero(&self) -> f64 {
        self.mean().unwrap_or(0.0)
    }
}

/// Divide, substituting 1 for a zero denominator.
pub fn clamped_div(numerator: f64, denominator: f64) -> f64 {
    let denominator = if denominator == 0.0 { 1.0 } else { denominator };
    numerator / denominator
}

/// Year-over-year percentage change.
///
/// With `prior == 0` the change is reported as the current value itself,
/// never inf or NaN.
pub fn pct_change(prior: f64, current: f64) -> f64 {
    if prior == 0.0 {
        return current;
    }
    (current - prior) / prior * 100.0
}

/// Replace non-finite values with zero and round to [`FACT_PRECISION`].
pub fn sanitize(value: f64) -> f64 {
    if !value.is_finite() {
        return 0.0;
    }
    let scale = 10f64.powi(FACT_PRECISION);
    let rounded = (value * scale).round() / scale;
    if !rounded.is_finite() {
        // value * scale overflowed; the value is already beyond 6dp resolution
        return value;
    }
    // normalise -0.0 so repeated exports are byte-identical
    if rounded == 0.0 {
        0.0
    } else {
        rounded
    }
}
