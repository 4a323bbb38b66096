//! Displayed-clock parsing.
//!
//! Slide players render progress as `MM:SS` or `H:MM:SS` clocks, often as
//! a compound `"elapsed / total"` label. Parsing never fails: malformed
//! input degrades to zero seconds, which downstream gating treats as
//! "still locked", the safe default when timer data is ambiguous.

/// Converts a displayed clock string into seconds.
///
/// Accepts `H:MM:SS` and `MM:SS` shapes with arbitrary leading-zero
/// padding and surrounding whitespace. Returns 0 for anything
/// unparseable.
#[must_use]
pub fn parse_clock(raw: &str) -> u32 {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return 0;
    }

    let parts: Vec<&str> = trimmed.split(':').collect();
    if parts.len() < 2 || parts.len() > 3 {
        return 0;
    }

    let mut seconds: u32 = 0;
    for part in &parts {
        let Ok(value) = part.trim().parse::<u32>() else {
            return 0;
        };
        seconds = seconds.saturating_mul(60).saturating_add(value);
    }
    seconds
}

/// Splits a compound `"elapsed / total"` label and parses both sides.
///
/// Returns `None` when the label has no `/` separator; either side may
/// still degrade to 0 individually.
#[must_use]
pub fn parse_progress(raw: &str) -> Option<(u32, u32)> {
    let (elapsed, total) = raw.split_once('/')?;
    Some((parse_clock(elapsed), parse_clock(total)))
}
