//! Number/string coercion helpers.

/// Largest number routed to the array index of a table (2^53).
pub const MAX_ARRAY_KEY: f64 = 9_007_199_254_740_992.0;

/// Parse a string as a number the way scripts see it: surrounding whitespace
/// is ignored, decimal and `0x` hex forms are accepted, `inf`/`nan` are not.
///
/// Hex integers wrap around modulo 2^64 into the signed range; hex numbers
/// with a fraction or a binary exponent (`0x1.8p3`) are floats.
pub fn str_to_number(s: &str) -> Option<f64> {
    let s = s.trim();
    if s.is_empty() {
        return None;
    }
    let (negative, body) = match s.as_bytes()[0] {
        b'-' => (true, &s[1..]),
        b'+' => (false, &s[1..]),
        _ => (false, s),
    };
    if let Some(hex) = body.strip_prefix("0x").or_else(|| body.strip_prefix("0X")) {
        let n = hex_to_number(hex)?;
        return Some(if negative { -n } else { n });
    }
    // Rust accepts "inf", "NaN" and "infinity"; scripts do not.
    if !body
        .bytes()
        .all(|b| b.is_ascii_digit() || matches!(b, b'.' | b'e' | b'E' | b'+' | b'-'))
    {
        return None;
    }
    s.parse::<f64>().ok()
}

fn hex_to_number(hex: &str) -> Option<f64> {
    let (digits, exponent) = match hex.find(|c: char| c == 'p' || c == 'P') {
        Some(i) => (&hex[..i], Some(&hex[i + 1..])),
        None => (hex, None),
    };
    let (int_part, frac_part) = match digits.split_once('.') {
        Some((int_part, frac_part)) => (int_part, Some(frac_part)),
        None => (digits, None),
    };
    if int_part.is_empty() && frac_part.map_or(true, str::is_empty) {
        return None;
    }

    if frac_part.is_none() && exponent.is_none() {
        let mut n: u64 = 0;
        for c in int_part.chars() {
            n = n.wrapping_mul(16).wrapping_add(u64::from(c.to_digit(16)?));
        }
        return Some(n as i64 as f64);
    }

    let mut mantissa = 0.0f64;
    let mut scale: i32 = 0;
    for c in int_part.chars() {
        mantissa = mantissa * 16.0 + f64::from(c.to_digit(16)?);
    }
    for c in frac_part.unwrap_or("").chars() {
        mantissa = mantissa * 16.0 + f64::from(c.to_digit(16)?);
        scale -= 4;
    }
    if let Some(exponent) = exponent {
        scale = scale.saturating_add(exponent.parse::<i32>().ok()?);
    }
    Some(mantissa * 2f64.powi(scale))
}

/// Convert a float to integer if it has no fractional part.
pub fn float_to_integer(f: f64) -> Option<i64> {
    if f.is_finite() && f == (f as i64 as f64) {
        Some(f as i64)
    } else {
        None
    }
}

/// Array slot a number routes to: positive and integral, up to 2^53.
pub fn integral_key(f: f64) -> Option<usize> {
    if f >= 1.0 && f <= MAX_ARRAY_KEY && f.fract() == 0.0 {
        Some(f as usize)
    } else {
        None
    }
}

/// Format a number using `%.14g` rules; integral values print without a fraction.
pub fn format_number(f: f64) -> String {
    if f.is_nan() {
        return "nan".to_string();
    }
    if f.is_infinite() {
        return if f > 0.0 { "inf" } else { "-inf" }.to_string();
    }
    if f.fract() == 0.0 && f.abs() < 1e15 {
        return format!("{}", f as i64);
    }
    let exp = f.abs().log10().floor() as i32;
    if !(-4..14).contains(&exp) {
        let s = format!("{:.13e}", f);
        let (mantissa, exponent) = s.split_once('e').unwrap_or((&s, "0"));
        let exponent: i32 = exponent.parse().unwrap_or(0);
        let sign = if exponent < 0 { '-' } else { '+' };
        format!(
            "{}e{}{:02}",
            trim_fraction(mantissa),
            sign,
            exponent.unsigned_abs()
        )
    } else {
        let decimals = (13 - exp).max(0) as usize;
        trim_fraction(&format!("{:.*}", decimals, f)).to_string()
    }
}

fn trim_fraction(s: &str) -> &str {
    if s.contains('.') {
        s.trim_end_matches('0').trim_end_matches('.')
    } else {
        s
    }
}
