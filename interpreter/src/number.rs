//! Float formatting for label output.
//!
//! Values are rendered with the shortest decimal string that round-trips, in the
//! same layout Python's `repr` uses, and then cleaned of the binary rounding noise
//! that arithmetic leaves in the last digits (`1.0000000000000241`,
//! `0.9999999999999865`).

use std::sync::LazyLock;

use regex::Regex;

/// A run of at least ten zeros followed by stray nonzero digits.
static TRAILING_ZEROS: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(.*[.1-9])0{10,99}[1-9]\d*$").expect("invalid trailing zeros pattern")
});

/// A run of at least ten nines after the decimal point followed by stray digits.
static TRAILING_NINES: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(.*\.\d+9{10,99})[0-8]\d*$").expect("invalid trailing nines pattern")
});

/// Shortest round-trip representation: fixed notation for decimal exponents in
/// `[-4, 16)`, otherwise `d.ddde±XX`. Integral values keep a `.0`.
pub fn float_repr(value: f64) -> String {
    if value.is_nan() {
        return "nan".to_string();
    }
    if value.is_infinite() {
        return if value > 0.0 { "inf" } else { "-inf" }.to_string();
    }
    let sign = if value.is_sign_negative() { "-" } else { "" };
    if value == 0.0 {
        return format!("{sign}0.0");
    }

    // `{:e}` yields the shortest round-trip digits, e.g. "1.2345e-5"
    let scientific = format!("{:e}", value.abs());
    let Some((mantissa, exponent)) = scientific.split_once('e') else {
        return scientific;
    };
    let exponent: i32 = exponent.parse().unwrap_or(0);
    let digits: String = mantissa.chars().filter(|c| *c != '.').collect();

    if (-4..16).contains(&exponent) {
        if exponent < 0 {
            let zeros = "0".repeat((-exponent - 1) as usize);
            return format!("{sign}0.{zeros}{digits}");
        }
        let point = exponent as usize + 1;
        if digits.len() <= point {
            let zeros = "0".repeat(point - digits.len());
            format!("{sign}{digits}{zeros}.0")
        } else {
            format!("{sign}{}.{}", &digits[..point], &digits[point..])
        }
    } else {
        let fraction = if digits.len() > 1 {
            format!(".{}", &digits[1..])
        } else {
            String::new()
        };
        let exponent_sign = if exponent < 0 { '-' } else { '+' };
        format!(
            "{sign}{}{fraction}e{exponent_sign}{:02}",
            &digits[..1],
            exponent.abs()
        )
    }
}

/// Render a float for output.
pub fn canonical_float(value: f64) -> String {
    canonicalize(&float_repr(value))
}

/// Clean a [`float_repr`] string:
///
/// 1. a mantissa ending in `.0` loses the `0`;
/// 2. ten or more zeros followed by stray digits are cut off;
/// 3. ten or more nines followed by stray digits are rounded up to the next
///    value at the precision of the last nine.
///
/// The exponent suffix, if any, is kept in every case.
pub fn canonicalize(repr: &str) -> String {
    let (mantissa, suffix) = match repr.find('e') {
        Some(at) => repr.split_at(at),
        None => (repr, ""),
    };

    if let Some(integral) = mantissa.strip_suffix(".0") {
        return format!("{integral}.{suffix}");
    }

    if let Some(caps) = TRAILING_ZEROS.captures(mantissa) {
        return format!("{}{suffix}", &caps[1]);
    }

    let Some(caps) = TRAILING_NINES.captures(mantissa) else {
        return repr.to_string();
    };
    let head = &caps[1];

    // Same layout and sign as the head, with a one in the last place
    let mut offset: String = head
        .chars()
        .map(|c| if matches!(c, '1'..='9') { '0' } else { c })
        .collect();
    offset.pop();
    offset.push('1');

    match (head.parse::<f64>(), offset.parse::<f64>()) {
        (Ok(head), Ok(offset)) => {
            let rounded = float_repr(head + offset);
            format!("{}{suffix}", rounded.trim_end_matches('0'))
        }
        _ => repr.to_string(),
    }
}
