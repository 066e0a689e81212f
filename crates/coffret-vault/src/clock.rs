//! UTC timestamp helpers.
//!
//! Timestamps in the vault document and the event log are UTC ISO 8601
//! strings (`YYYY-MM-DDTHH:MM:SSZ`), produced from `std::time::SystemTime`
//! to avoid pulling in `chrono`. The fixed format makes lexicographic
//! comparison equivalent to chronological comparison, which is how expiry
//! checks are implemented (a date-only `expiresAt` like `2026-08-02` also
//! orders correctly against full timestamps).

/// Return the current UTC time as an ISO 8601 string.
#[must_use]
pub fn now_iso8601() -> String {
    iso8601_from_epoch(epoch_secs())
}

/// Return the ISO 8601 timestamp `days` days in the future.
#[must_use]
pub fn iso8601_after_days(days: u64) -> String {
    iso8601_from_epoch(epoch_secs().saturating_add(days.saturating_mul(86_400)))
}

/// Return the ISO 8601 timestamp `days` days in the past.
#[must_use]
pub fn iso8601_days_ago(days: u64) -> String {
    iso8601_from_epoch(epoch_secs().saturating_sub(days.saturating_mul(86_400)))
}

/// Current time as milliseconds since the Unix epoch (archive file names).
#[must_use]
pub fn epoch_millis() -> u128 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis()
}

/// Current time as seconds since the Unix epoch.
fn epoch_secs() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}

/// Format epoch seconds as `YYYY-MM-DDTHH:MM:SSZ`.
fn iso8601_from_epoch(epoch: u64) -> String {
    let (year, month, day, hour, minute, second) = epoch_to_utc(epoch);
    format!("{year:04}-{month:02}-{day:02}T{hour:02}:{minute:02}:{second:02}Z")
}

/// Convert epoch seconds to (year, month, day, hour, minute, second) in UTC.
///
/// Civil calendar computation adapted from Howard Hinnant's
/// `civil_from_days` (valid for years 1970–9999).
#[allow(clippy::arithmetic_side_effects)]
const fn epoch_to_utc(epoch_secs: u64) -> (u64, u64, u64, u64, u64, u64) {
    let secs_per_day: u64 = 86_400;
    let total_days = epoch_secs / secs_per_day;
    let remaining_secs = epoch_secs % secs_per_day;

    let hour = remaining_secs / 3600;
    let minute = (remaining_secs % 3600) / 60;
    let second = remaining_secs % 60;

    // Days since 0000-03-01 (shifted epoch for leap year handling).
    let z = total_days + 719_468;
    let era = z / 146_097;
    let doe = z - era * 146_097;
    let yoe = (doe - doe / 1460 + doe / 36524 - doe / 146_096) / 365;
    let y = yoe + era * 400;
    let doy = doe - (365 * yoe + yoe / 4 - yoe / 100);
    let mp = (5 * doy + 2) / 153;
    let day = doy - (153 * mp + 2) / 5 + 1;
    let month = if mp < 10 { mp + 3 } else { mp - 9 };
    let year = if month <= 2 { y + 1 } else { y };

    (year, month, day, hour, minute, second)
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------
