//! Parsing of human readable check intervals such as `30s`, `1m30s` or `1.5h`.
//!
//! The accepted grammar is a sequence of `<number><unit>` pairs, where the
//! number may carry a fractional part and the unit is one of `ns`, `us`
//! (or `µs`), `ms`, `s`, `m` and `h`. A bare `0` is also accepted.

use std::time::Duration;

const NANOS_PER_UNIT: [(&str, u128); 7] = [
    ("ns", 1),
    ("us", 1_000),
    ("µs", 1_000),
    ("ms", 1_000_000),
    ("s", 1_000_000_000),
    ("m", 60 * 1_000_000_000),
    ("h", 60 * 60 * 1_000_000_000),
];

pub fn parse_interval(input: &str) -> Result<Duration, String> {
    let s = input.trim();
    if s.is_empty() {
        return Err("empty duration".to_owned());
    }
    if s.starts_with('-') {
        return Err("duration must not be negative".to_owned());
    }
    let s = s.strip_prefix('+').unwrap_or(s);
    if s == "0" {
        return Ok(Duration::ZERO);
    }

    let mut rest = s;
    let mut total_nanos: u128 = 0;
    while !rest.is_empty() {
        let number_len = rest
            .find(|c: char| !(c.is_ascii_digit() || c == '.'))
            .ok_or_else(|| format!("missing unit in duration \"{}\"", input))?;
        if number_len == 0 {
            return Err(format!("invalid duration \"{}\"", input));
        }
        let (number, tail) = rest.split_at(number_len);

        let unit_len = tail
            .find(|c: char| c.is_ascii_digit() || c == '.')
            .unwrap_or(tail.len());
        let (unit, tail) = tail.split_at(unit_len);

        let scale = NANOS_PER_UNIT
            .iter()
            .find(|(name, _)| *name == unit)
            .map(|(_, scale)| *scale)
            .ok_or_else(|| format!("unknown unit \"{}\" in duration \"{}\"", unit, input))?;

        total_nanos = total_nanos
            .checked_add(scale_number(number, scale, input)?)
            .ok_or_else(|| format!("duration \"{}\" overflows", input))?;
        rest = tail;
    }

    u64::try_from(total_nanos)
        .map(Duration::from_nanos)
        .map_err(|_| format!("duration \"{}\" overflows", input))
}

fn scale_number(number: &str, scale: u128, input: &str) -> Result<u128, String> {
    let (whole, fraction) = match number.split_once('.') {
        Some((whole, fraction)) => (whole, fraction),
        None => (number, ""),
    };
    if (whole.is_empty() && fraction.is_empty()) || fraction.contains('.') {
        return Err(format!("invalid duration \"{}\"", input));
    }

    let overflow = || format!("duration \"{}\" overflows", input);
    let whole: u128 = if whole.is_empty() {
        0
    } else {
        whole.parse().map_err(|_| overflow())?
    };
    let mut nanos = whole.checked_mul(scale).ok_or_else(overflow)?;

    // Digits past nanosecond precision are dropped.
    let mut divisor = 1u128;
    for digit in fraction.bytes() {
        divisor = divisor.saturating_mul(10);
        if divisor > scale {
            break;
        }
        nanos += u128::from(digit - b'0') * scale / divisor;
    }
    Ok(nanos)
}
