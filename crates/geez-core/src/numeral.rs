//! Ge'ez numeral conversion
//!
//! Ge'ez numerals have distinct glyphs for 1-9 and for the tens 10-90, plus a
//! hundred glyph that takes a leading count glyph for 200 and up. Exactly one
//! hundred is written with the bare hundred glyph, never "one hundred".

use crate::error::GeezError;

/// Largest ordinal the numeral tables can express (no ten-thousand multiplier).
pub const MAX_ORDINAL: i64 = 999;

/// Glyphs for 0-9. Index 0 is empty.
pub const ONES: [&str; 10] = ["", "፩", "፪", "፫", "፬", "፭", "፮", "፯", "፰", "፱"];

/// Glyphs for 0, 10, 20, ... 90. Index 0 is empty.
pub const TENS: [&str; 10] = ["", "፲", "፳", "፴", "፵", "፶", "፷", "፸", "፹", "፺"];

/// The glyph for one hundred.
pub const HUNDRED: &str = "፻";

/// Every glyph `to_geez` can emit: U+1369 (one) through U+137B (hundred).
pub fn numeral_glyphs() -> impl Iterator<Item = char> {
    '\u{1369}'..='\u{137B}'
}

/// Convert a 1-based ordinal to its Ge'ez representation.
///
/// Fails with [`GeezError::InvalidArgument`] for `n <= 0` and for values whose
/// hundreds digit would exceed 9.
pub fn to_geez(n: i64) -> Result<String, GeezError> {
    if n <= 0 {
        return Err(GeezError::InvalidArgument(format!(
            "Ge'ez numerals start at 1, got {}",
            n
        )));
    }
    if n > MAX_ORDINAL {
        return Err(GeezError::InvalidArgument(format!(
            "{} is above the largest supported ordinal {}",
            n, MAX_ORDINAL
        )));
    }

    let n = n as usize;
    let numeral = if n < 10 {
        ONES[n].to_string()
    } else if n < 100 {
        format!("{}{}", TENS[n / 10], ONES[n % 10])
    } else if n == 100 {
        HUNDRED.to_string()
    } else if n < 200 {
        let rem = n - 100;
        format!("{}{}{}", HUNDRED, TENS[rem / 10], ONES[rem % 10])
    } else {
        let (h, rem) = (n / 100, n % 100);
        format!("{}{}{}{}", ONES[h], HUNDRED, TENS[rem / 10], ONES[rem % 10])
    };

    Ok(numeral)
}
