use chrono::NaiveDateTime;
use once_cell::sync::Lazy;
use regex::{Captures, Regex};
use tracing::debug;

use crate::types::{ConnectionLine, Direction, TransferLine};

const SYSLOG_TIMESTAMP_FORMAT: &str = "%Y %b %d %H:%M:%S";
const NORMALIZED_TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

// Syslog prefix, then either the session opening line or the transfer summary.
static LINE_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(concat!(
        r"^(?P<timestamp>\d{4}\s+[A-Za-z]{3}\s+\d{1,2}\s+\d{2}:\d{2}:\d{2})\s+",
        r"\S+\s+[\w.-]+\[(?P<pid>\d+)\]:\s+",
        r"(?:",
        r"rsync\s+(?P<logtype>to|on)\s+(?P<module>[^/\s]+)/?(?P<directory>\S*)\s+",
        r"from\s+(?:(?P<user>\S+)@)?(?P<hostname>\S+)\s+\((?P<clientip>[^)\s]+)\)",
        r"|",
        r"sent\s+(?P<sentbytes>[\d,]+)\s+bytes\s+",
        r"received\s+(?P<receivedbytes>[\d,]+)\s+bytes\s+",
        r"total\s+size\s+(?P<totalbytes>[\d,]+)",
        r")",
    ))
    .expect("rsync log line pattern must compile")
});

/// Classification of a single log line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParsedLine {
    Connection(ConnectionLine),
    Transfer(TransferLine),
    Unmatched,
}

/// Matches one line of an rsync daemon log. Lines of any other shape are noise
/// and come back as `Unmatched`.
pub fn parse_line(line: &str) -> ParsedLine {
    let Some(caps) = LINE_PATTERN.captures(line) else {
        debug!(line, "line does not match an rsync connection or transfer");
        return ParsedLine::Unmatched;
    };

    let Some(timestamp) = normalize_timestamp(&caps["timestamp"]) else {
        debug!(line, "line carries an unparseable timestamp");
        return ParsedLine::Unmatched;
    };
    let pid = caps["pid"].to_string();

    if let Some(logtype) = caps.name("logtype") {
        let Some(direction) = Direction::from_logtype(logtype.as_str()) else {
            return ParsedLine::Unmatched;
        };

        return ParsedLine::Connection(ConnectionLine {
            timestamp,
            pid,
            direction,
            module: group(&caps, "module"),
            directory: group(&caps, "directory"),
            user: group(&caps, "user"),
            hostname: group(&caps, "hostname"),
            clientip: group(&caps, "clientip"),
        });
    }

    ParsedLine::Transfer(TransferLine {
        timestamp,
        pid,
        sentbytes: byte_count(&caps, "sentbytes"),
        receivedbytes: byte_count(&caps, "receivedbytes"),
        totalbytes: byte_count(&caps, "totalbytes"),
    })
}

/// Rewrites `YYYY Mon D HH:MM:SS` as `YYYY-MM-DD HH:MM:SS`.
pub fn normalize_timestamp(raw: &str) -> Option<String> {
    let compact = raw.split_whitespace().collect::<Vec<_>>().join(" ");

    NaiveDateTime::parse_from_str(&compact, SYSLOG_TIMESTAMP_FORMAT)
        .ok()
        .map(|ts| ts.format(NORMALIZED_TIMESTAMP_FORMAT).to_string())
}

fn group(caps: &Captures, name: &str) -> String {
    caps.name(name)
        .map(|m| m.as_str().to_string())
        .unwrap_or_default()
}

// Some builds print counters with thousands separators.
fn byte_count(caps: &Captures, name: &str) -> String {
    group(caps, name).replace(',', "")
}
