use chrono::NaiveDateTime;

/// Timestamp layout used in device log lines. Local time, second
/// precision, lexicographically sortable.
pub const TIMESTAMP_FMT: &str = "%Y-%m-%dT%H:%M:%S";

/// One line of a device's append-only state log:
/// `timestamp,ip,mac,status,seconds_since_last_transition`
#[derive(Debug, Clone, PartialEq)]
pub struct LogEntry {
    pub timestamp: NaiveDateTime,
    pub ip: String,
    pub mac: String,
    pub status: String,
    pub seconds_since_transition: i64,
}

impl LogEntry {
    pub fn to_line(&self) -> String {
        format!(
            "{},{},{},{},{}",
            self.timestamp.format(TIMESTAMP_FMT),
            self.ip,
            self.mac,
            self.status,
            self.seconds_since_transition
        )
    }

    /// Parse a single log line. Returns `None` for anything malformed,
    /// so callers can skip corrupt lines without failing the whole file.
    pub fn parse(line: &str) -> Option<Self> {
        let fields = line.trim().split(',').collect::<Vec<_>>();
        if fields.len() != 5 {
            return None;
        }

        let timestamp = NaiveDateTime::parse_from_str(fields[0], TIMESTAMP_FMT).ok()?;
        let seconds_since_transition = fields[4].parse::<i64>().ok()?;

        if fields[1].is_empty() || fields[2].is_empty() || fields[3].is_empty() {
            return None;
        }

        Some(Self {
            timestamp,
            ip: fields[1].to_string(),
            mac: fields[2].to_string(),
            status: fields[3].to_string(),
            seconds_since_transition,
        })
    }
}
