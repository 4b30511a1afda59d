//! `[d.]hh:mm:ss[.fffffff]` duration text, as written by the bus backend and
//! by header values of duration type.

use std::time::Duration;

const TICKS_PER_SECOND: u32 = 10_000_000;
const NANOS_PER_TICK: u32 = 100;

/// Formats a duration as `[d.]hh:mm:ss[.fffffff]`.
pub fn format(d: Duration) -> String {
    let secs = d.as_secs();
    let (days, rem) = (secs / 86_400, secs % 86_400);
    let (hours, rem) = (rem / 3_600, rem % 3_600);
    let (minutes, seconds) = (rem / 60, rem % 60);
    let ticks = d.subsec_nanos() / NANOS_PER_TICK;

    let mut text = String::with_capacity(20);
    if days > 0 {
        text.push_str(&format!("{days}."));
    }
    text.push_str(&format!("{hours:02}:{minutes:02}:{seconds:02}"));
    if ticks > 0 {
        text.push_str(&format!(".{ticks:07}"));
    }
    text
}

/// Parses `[d.]hh:mm:ss[.f...]`. Returns `None` for anything else.
pub fn parse(text: &str) -> Option<Duration> {
    let text = text.trim();
    let mut parts = text.split(':');
    let (first, minutes, rest) = (parts.next()?, parts.next()?, parts.next()?);
    if parts.next().is_some() {
        return None;
    }

    let (days, hours) = match first.split_once('.') {
        Some((d, h)) => (digits(d)?, digits(h)?),
        None => (0, digits(first)?),
    };
    let minutes = digits(minutes)?;
    let (seconds, fraction) = match rest.split_once('.') {
        Some((s, f)) => (digits(s)?, Some(f)),
        None => (digits(rest)?, None),
    };
    if hours > 23 || minutes > 59 || seconds > 59 {
        return None;
    }

    let mut nanos = 0u32;
    if let Some(fraction) = fraction {
        if fraction.is_empty() || fraction.len() > 7 || !fraction.bytes().all(|b| b.is_ascii_digit()) {
            return None;
        }
        let ticks: u32 = format!("{fraction:0<7}").parse().ok()?;
        debug_assert!(ticks < TICKS_PER_SECOND);
        nanos = ticks * NANOS_PER_TICK;
    }

    let secs = days
        .checked_mul(86_400)?
        .checked_add(hours * 3_600 + minutes * 60 + seconds)?;
    Some(Duration::new(secs, nanos))
}

fn digits(text: &str) -> Option<u64> {
    if text.is_empty() || !text.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    text.parse().ok()
}
