//! End-of-file banner written at the tail of real log content.

use std::io::Write;

use chrono::NaiveDateTime;
use log::debug;

use crate::error::LogError;

pub const BANNER_DELIMITER: &str = "####";
pub const BANNER_TITLE: &str = "END OF LOG";
const ZERO_TIMESTAMP: &str = "0000-00-00 00:00:00";

/// Source of the timestamp stamped into the banner.
pub trait Clock: Send + Sync {
    /// `None` when the time cannot be read.
    fn now(&self) -> Option<NaiveDateTime>;
}

/// Wall clock in local time.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Option<NaiveDateTime> {
        Some(chrono::Local::now().naive_local())
    }
}

/// Always reports the same instant, or nothing.
#[derive(Debug, Clone, Copy)]
pub struct FixedClock(pub Option<NaiveDateTime>);

impl Clock for FixedClock {
    fn now(&self) -> Option<NaiveDateTime> {
        self.0
    }
}

pub fn banner(clock: &dyn Clock) -> String {
    let stamp = clock
        .now()
        .map(|t| t.format("%Y-%m-%d %H:%M:%S").to_string())
        .unwrap_or_else(|| ZERO_TIMESTAMP.to_string());
    format!("\n{BANNER_DELIMITER} {BANNER_TITLE} {stamp} {BANNER_DELIMITER}\n")
}

/// Writes the banner at the current position, clipped to `room_left` bytes.
///
/// A full file (`room_left == 0`) is not an error; nothing is written.
pub fn write_eof_marker<W: Write + ?Sized>(
    file: &mut W,
    name: &str,
    room_left: u64,
    clock: &dyn Clock,
) -> Result<(), LogError> {
    if room_left == 0 {
        debug!("{name} is full, no room for end marker");
        return Ok(());
    }
    let text = banner(clock);
    let len = usize::try_from(room_left).map_or(text.len(), |room| room.min(text.len()));
    file.write_all(&text.as_bytes()[..len])
        .map_err(|e| LogError::write(name, len, e))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use std::io;

    fn fixed() -> FixedClock {
        FixedClock(
            NaiveDate::from_ymd_opt(2024, 3, 9)
                .and_then(|d| d.and_hms_opt(7, 5, 1)),
        )
    }

    #[test]
    fn test_banner_format() {
        assert_eq!(banner(&fixed()), "\n#### END OF LOG 2024-03-09 07:05:01 ####\n");
        assert_eq!(
            banner(&FixedClock(None)),
            "\n#### END OF LOG 0000-00-00 00:00:00 ####\n"
        );
    }

    #[test]
    fn test_marker_is_clipped_to_room() {
        let mut out = Vec::new();
        write_eof_marker(&mut out, "log_1.txt", 8, &fixed()).unwrap();
        assert_eq!(out, b"\n#### EN");

        let mut out = Vec::new();
        write_eof_marker(&mut out, "log_1.txt", 4096, &fixed()).unwrap();
        assert_eq!(out, banner(&fixed()).as_bytes());
    }

    #[test]
    fn test_full_file_skips_marker() {
        let mut out = Vec::new();
        write_eof_marker(&mut out, "log_1.txt", 0, &fixed()).unwrap();
        assert!(out.is_empty());
    }

    struct Stingy;

    impl Write for Stingy {
        fn write(&mut self, _buf: &[u8]) -> io::Result<usize> {
            Ok(0)
        }
        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn test_short_write_is_reported() {
        let err = write_eof_marker(&mut Stingy, "log_2.txt", 100, &fixed()).unwrap_err();
        assert!(matches!(err, LogError::ShortWrite { .. }));
    }
}
