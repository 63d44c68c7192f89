//! Duration strings for plugin configs, e.g. `"500ms"`, `"30s"`, `"10m"`.

use std::time::Duration;

/// Parse a duration string with an `ms`, `s`, `m`, or `h` suffix.
pub fn parse_duration(s: &str) -> Result<Duration, String> {
    let s = s.trim();
    if s.is_empty() {
        return Err("empty duration".to_string());
    }

    let (value, unit) = match s.find(|c: char| !c.is_ascii_digit()) {
        Some(idx) => s.split_at(idx),
        None => return Err(format!("duration {s:?} is missing a unit (ms, s, m, h)")),
    };

    let n: u64 = value
        .parse()
        .map_err(|_| format!("duration {s:?} has an invalid numeric value"))?;

    let seconds = |factor: u64| {
        n.checked_mul(factor)
            .map(Duration::from_secs)
            .ok_or_else(|| format!("duration {s:?} is out of range"))
    };

    match unit {
        "ms" => Ok(Duration::from_millis(n)),
        "s" => Ok(Duration::from_secs(n)),
        "m" => seconds(60),
        "h" => seconds(3600),
        _ => Err(format!("duration {s:?} has an unknown unit {unit:?}")),
    }
}
