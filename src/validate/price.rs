//! Locale-aware price normalization
//!
//! Listing pages render prices with whatever separators the storefront's
//! locale uses: `$1,299.00` on a US site, `$ 1.299.900` or `25.000,50` on a
//! Latin American one. This module turns such text into a plain `f64`.

/// Separator conventions for one storefront locale
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PriceLocale {
    /// Character separating the integer and fractional parts
    pub decimal: char,

    /// Character grouping thousands
    pub thousands: char,
}

impl PriceLocale {
    /// `1,299.99`
    pub const EN_US: PriceLocale = PriceLocale {
        decimal: '.',
        thousands: ',',
    };

    /// `1.299,99`
    pub const ES_CO: PriceLocale = PriceLocale {
        decimal: ',',
        thousands: '.',
    };
}

/// Normalizes a price string to a number
///
/// # Rules
///
/// | Input shape | Interpretation |
/// |-------------|----------------|
/// | both `.` and `,` present | the last one is the decimal separator |
/// | one separator, repeated | thousands grouping |
/// | one separator, exactly 3 digits after it, equal to the locale's thousands char | thousands grouping |
/// | one separator otherwise | decimal point |
///
/// Currency symbols and surrounding text are ignored. Scanning stops at the
/// first character that cannot be part of the number, so a range such as
/// `"19.99 - 24.99"` yields its lower bound. A minus sign before the first
/// digit produces a negative number; rejecting it is the caller's job.
///
/// # Returns
///
/// * `Some(f64)` - The parsed value
/// * `None` - No digits found, or the digits do not form a number
pub fn normalize_price(text: &str, locale: PriceLocale) -> Option<f64> {
    let first_digit = text.find(|c: char| c.is_ascii_digit())?;
    let negative = text[..first_digit].contains('-');

    let mut number = String::new();
    for c in text[first_digit..].chars() {
        if c.is_ascii_digit() || c == '.' || c == ',' {
            number.push(c);
        } else if c.is_whitespace() {
            continue;
        } else {
            break;
        }
    }
    let number = number.trim_end_matches(['.', ',']);

    let dots = number.matches('.').count();
    let commas = number.matches(',').count();

    let decimal = if dots > 0 && commas > 0 {
        number.rfind(['.', ',']).and_then(|i| number[i..].chars().next())
    } else if dots + commas == 0 {
        None
    } else {
        let sep = if dots > 0 { '.' } else { ',' };
        if dots + commas > 1 {
            None
        } else {
            let digits_after = number.len() - number.find(sep)? - 1;
            if digits_after == 3 && sep == locale.thousands {
                None
            } else {
                Some(sep)
            }
        }
    };

    let canonical = match decimal.and_then(|sep| number.rfind(sep)) {
        Some(split) => {
            let (int_part, frac_part) = number.split_at(split);
            let int_digits: String = int_part.chars().filter(char::is_ascii_digit).collect();
            let frac_digits: String = frac_part.chars().filter(char::is_ascii_digit).collect();
            format!("{}.{}", int_digits, frac_digits)
        }
        None => number.chars().filter(char::is_ascii_digit).collect(),
    };

    let value: f64 = canonical.parse().ok()?;
    Some(if negative { -value } else { value })
}
