//! Response formatting
//!
//! Formatting helpers for the replies that are more than a literal string:
//! the PASV endpoint encoding, directory-listing entry lines and the
//! RFC 3659 timestamp.

use std::net::Ipv4Addr;

use chrono::NaiveDateTime;

use crate::storage::FileEntry;

/// `227 Entering Passive Mode (a,b,c,d,p1,p2).` with the port split into
/// high and low bytes.
pub fn passive_mode_reply(ip: Ipv4Addr, port: u16) -> String {
    let [a, b, c, d] = ip.octets();
    format!(
        "227 Entering Passive Mode ({},{},{},{},{},{}).",
        a,
        b,
        c,
        d,
        port >> 8,
        port & 255
    )
}

/// `YYYYMMDDHHMMSS` timestamp used by MDTM and MLSD facts.
pub fn modify_timestamp(t: NaiveDateTime) -> String {
    t.format("%Y%m%d%H%M%S").to_string()
}

/// Legacy fixed-width LIST line: date, 12-hour time, size, name.
pub fn list_entry(entry: &FileEntry<'_>) -> String {
    format!(
        "{} {} {}",
        entry.modified.format("%m-%d-%Y %I:%M%p"),
        entry.size,
        entry.display_name()
    )
}

/// Machine-readable MLSD fact line.
pub fn mlsd_entry(entry: &FileEntry<'_>) -> String {
    format!(
        "Type=file;Size={};modify={}; {}",
        entry.size,
        modify_timestamp(entry.modified),
        entry.display_name()
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn stamp() -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 5, 1)
            .unwrap()
            .and_hms_opt(14, 7, 9)
            .unwrap()
    }

    fn entry(stamp: NaiveDateTime) -> FileEntry<'static> {
        FileEntry {
            name: "/test.txt",
            size: 5,
            modified: stamp,
        }
    }

    #[test]
    fn pasv_reply_splits_the_port() {
        assert_eq!(
            passive_mode_reply(Ipv4Addr::new(192, 168, 1, 7), 50009),
            "227 Entering Passive Mode (192,168,1,7,195,89)."
        );
    }

    #[test]
    fn mdtm_timestamp_is_compact() {
        assert_eq!(modify_timestamp(stamp()), "20240501140709");
    }

    #[test]
    fn list_line_uses_legacy_format() {
        assert_eq!(list_entry(&entry(stamp())), "05-01-2024 02:07PM 5 test.txt");
    }

    #[test]
    fn mlsd_line_carries_facts() {
        assert_eq!(
            mlsd_entry(&entry(stamp())),
            "Type=file;Size=5;modify=20240501140709; test.txt"
        );
    }
}
