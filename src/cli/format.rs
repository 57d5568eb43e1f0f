//! Output formatting for CLI display.

use jiff::tz::TimeZone;
use jiff::{SignedDuration, Timestamp};

use crate::journal::JournalEntry;

/// Format a timestamp as local wall-clock time.
pub(super) fn format_time(at: Timestamp, tz: &TimeZone) -> String {
    at.to_zoned(tz.clone())
        .strftime("%Y-%m-%d %H:%M:%S")
        .to_string()
}

/// Format a duration as `1h 2m 3s`, dropping leading zero units.
pub(super) fn format_age(age: SignedDuration) -> String {
    let secs = age.as_secs();
    let sign = if secs < 0 { "-" } else { "" };
    let secs = secs.unsigned_abs();
    let (h, m, s) = (secs / 3600, secs % 3600 / 60, secs % 60);
    if h > 0 {
        format!("{sign}{h}h {m}m {s}s")
    } else if m > 0 {
        format!("{sign}{m}m {s}s")
    } else {
        format!("{sign}{s}s")
    }
}

/// Format a journal entry as one line.
pub(super) fn format_entry(entry: &JournalEntry, tz: &TimeZone) -> String {
    match entry {
        JournalEntry::Reconciled {
            at,
            camera,
            shot,
            outcome,
            file,
        } => {
            let file = file
                .as_ref()
                .map(|f| format!(" {}", f.display()))
                .unwrap_or_default();
            format!("{}  {camera}: shot {shot} {outcome:?}{file}", format_time(*at, tz))
        }
        JournalEntry::MissedShot {
            at,
            expected,
            observed,
        } => format!(
            "{}  missed shot: expected {expected}, saw {observed}",
            format_time(*at, tz)
        ),
        JournalEntry::ArmFailed { at, camera, shot } => {
            let shot = shot.map(|s| format!(" before shot {s}")).unwrap_or_default();
            format!("{}  {camera}: failed to arm{shot}", format_time(*at, tz))
        }
        JournalEntry::Aborted { at, shot, cameras } => {
            let shot = shot.map_or_else(|| "unknown".to_string(), |s| s.to_string());
            format!(
                "{}  shot {shot} aborted, disarmed [{}]",
                format_time(*at, tz),
                cameras.join(", ")
            )
        }
        JournalEntry::DayRolled {
            at,
            camera,
            date,
            archived,
            remote,
        } => {
            let remote = if *remote { "with remote" } else { "local only" };
            format!(
                "{}  {camera}: folders for {date} ({remote}), \
                 {archived} old file(s) moved to backup",
                format_time(*at, tz)
            )
        }
        JournalEntry::ShotStoreReset {
            at,
            next_shot,
            last_handled,
        } => format!(
            "{}  shot counter reset to {next_shot} (last handled {last_handled})",
            format_time(*at, tz)
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::path::PathBuf;

    use crate::reconcile::Outcome;

    fn at() -> Timestamp {
        "2027-01-15T10:00:00Z".parse().unwrap()
    }

    #[test]
    fn ages_drop_leading_zero_units() {
        assert_eq!(format_age(SignedDuration::from_secs(7)), "7s");
        assert_eq!(format_age(SignedDuration::from_secs(125)), "2m 5s");
        assert_eq!(format_age(SignedDuration::from_secs(3725)), "1h 2m 5s");
        assert_eq!(format_age(SignedDuration::from_secs(-30)), "-30s");
    }

    #[test]
    fn formats_reconciled_entry() {
        let entry = JournalEntry::Reconciled {
            at: at(),
            camera: "px".into(),
            shot: 44123,
            outcome: Outcome::Renamed,
            file: Some(PathBuf::from("/movies/44123.seq")),
        };

        assert_eq!(
            format_entry(&entry, &TimeZone::UTC),
            "2027-01-15 10:00:00  px: shot 44123 Renamed /movies/44123.seq"
        );
    }

    #[test]
    fn formats_abort_with_unknown_shot() {
        let entry = JournalEntry::Aborted {
            at: at(),
            shot: None,
            cameras: vec!["px".into(), "ircam".into()],
        };

        assert_eq!(
            format_entry(&entry, &TimeZone::UTC),
            "2027-01-15 10:00:00  shot unknown aborted, disarmed [px, ircam]"
        );
    }
}
