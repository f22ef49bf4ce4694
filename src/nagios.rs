//! Nagios-style check output: status codes, perfdata records, and the
//! timestamp parsing the uptime check needs.
//!
//! The engine's consumers are monitoring plugins; everything they print
//! goes through the `<STATUS> - <text> | <perfdata>` convention with
//! `label=value;warn;crit;min;max` performance records.

use std::fmt;

use chrono::{DateTime, FixedOffset, NaiveDateTime, TimeZone, Utc};

use crate::error::{Result, WrError};

// ============================================================================
// Status
// ============================================================================

/// Nagios plugin exit states, ordered by severity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum CheckStatus {
    Ok,
    Warning,
    Critical,
    Unknown,
}

impl CheckStatus {
    pub fn exit_code(self) -> i32 {
        match self {
            CheckStatus::Ok => 0,
            CheckStatus::Warning => 1,
            CheckStatus::Critical => 2,
            CheckStatus::Unknown => 3,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            CheckStatus::Ok => "OK",
            CheckStatus::Warning => "WARNING",
            CheckStatus::Critical => "CRITICAL",
            CheckStatus::Unknown => "UNKNOWN",
        }
    }

    /// The worse of two states.
    pub fn worsen(self, other: CheckStatus) -> CheckStatus {
        self.max(other)
    }
}

impl fmt::Display for CheckStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Threshold comparison: strictly above critical wins over strictly
/// above warning; absent thresholds never fire.
pub fn classify(value: i64, warn: Option<i64>, crit: Option<i64>) -> CheckStatus {
    if crit.is_some_and(|c| value > c) {
        CheckStatus::Critical
    } else if warn.is_some_and(|w| value > w) {
        CheckStatus::Warning
    } else {
        CheckStatus::Ok
    }
}

// ============================================================================
// Perfdata
// ============================================================================

/// One `label=value;warn;crit;min;max` performance record.
#[derive(Debug, Clone)]
pub struct Perfdata {
    label: String,
    value: i64,
    uom: &'static str,
    warn: Option<i64>,
    crit: Option<i64>,
    min: Option<i64>,
    max: Option<i64>,
}

impl Perfdata {
    pub fn new(label: impl Into<String>, value: i64) -> Self {
        Perfdata {
            label: label.into(),
            value,
            uom: "",
            warn: None,
            crit: None,
            min: None,
            max: None,
        }
    }

    pub fn uom(mut self, uom: &'static str) -> Self {
        self.uom = uom;
        self
    }

    pub fn thresholds(mut self, warn: Option<i64>, crit: Option<i64>) -> Self {
        self.warn = warn;
        self.crit = crit;
        self
    }

    pub fn range(mut self, min: i64, max: i64) -> Self {
        self.min = Some(min);
        self.max = Some(max);
        self
    }
}

impl fmt::Display for Perfdata {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Labels containing quotes, equals or spaces get quoted.
        if self.label.contains(['\'', '=', ' ']) {
            write!(f, "'{}'={}{};", self.label, self.value, self.uom)?;
        } else {
            write!(f, "{}={}{};", self.label, self.value, self.uom)?;
        }
        match self.warn {
            Some(w) => write!(f, "{w};")?,
            None => write!(f, ";")?,
        }
        match self.crit {
            Some(c) => write!(f, "{c};")?,
            None => write!(f, ";")?,
        }
        if let Some(min) = self.min {
            write!(f, "{min}")?;
        }
        if let Some(max) = self.max {
            write!(f, ";{max}")?;
        }
        Ok(())
    }
}

/// Assemble the plugin output line.
pub fn status_line(status: CheckStatus, text: &str, perfdata: &[Perfdata]) -> String {
    if perfdata.is_empty() {
        return format!("{status} - {text}");
    }
    let records: Vec<String> = perfdata.iter().map(Perfdata::to_string).collect();
    format!("{status} - {text} | {}", records.join(" "))
}

// ============================================================================
// CIM datetime
// ============================================================================

/// Parse a CIM datetime as WS-Management delivers it.
///
/// WinRM converts WMI datetimes to ISO 8601 (`2023-08-12T11:30:22.5-05:00`);
/// the raw DMTF form (`20230812113022.500000-300`) shows up on some
/// providers and is accepted too.
pub fn parse_cim_datetime(raw: &str) -> Result<DateTime<FixedOffset>> {
    let text = raw.trim();

    if let Ok(dt) = DateTime::parse_from_rfc3339(text) {
        return Ok(dt);
    }

    // ISO form without an offset: take it as UTC.
    for fmt in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(text, fmt) {
            return Ok(Utc.from_utc_datetime(&naive).fixed_offset());
        }
    }

    parse_dmtf_datetime(text)
        .ok_or_else(|| WrError::Schema(format!("\"{raw}\" is not a CIM datetime")))
}

/// `yyyymmddHHMMSS.ffffff±UUU` with the UTC offset in minutes.
fn parse_dmtf_datetime(text: &str) -> Option<DateTime<FixedOffset>> {
    if text.len() < 21 || !text.is_ascii() {
        return None;
    }
    let naive = NaiveDateTime::parse_from_str(&text[..14], "%Y%m%d%H%M%S").ok()?;
    let sign_at = text.rfind(['+', '-'])?;
    if sign_at < 14 {
        return None;
    }
    let offset_minutes: i32 = text[sign_at + 1..].parse().ok()?;
    let seconds = offset_minutes.checked_mul(60)?;
    let offset = if text.as_bytes()[sign_at] == b'-' {
        FixedOffset::west_opt(seconds)?
    } else {
        FixedOffset::east_opt(seconds)?
    };
    offset.from_local_datetime(&naive).single()
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classify_orders_thresholds() {
        assert_eq!(classify(50, Some(80), Some(90)), CheckStatus::Ok);
        assert_eq!(classify(85, Some(80), Some(90)), CheckStatus::Warning);
        assert_eq!(classify(95, Some(80), Some(90)), CheckStatus::Critical);
        // Boundary values do not fire.
        assert_eq!(classify(80, Some(80), Some(90)), CheckStatus::Ok);
        assert_eq!(classify(90, Some(80), Some(90)), CheckStatus::Warning);
        // Absent thresholds never fire.
        assert_eq!(classify(1000, None, None), CheckStatus::Ok);
    }

    #[test]
    fn perfdata_rendering() {
        let pd = Perfdata::new("load", 42)
            .thresholds(Some(80), Some(90))
            .range(0, 100);
        assert_eq!(pd.to_string(), "load=42;80;90;0;100");

        let pd = Perfdata::new("load", 42).range(0, 100);
        assert_eq!(pd.to_string(), "load=42;;;0;100");

        let pd = Perfdata::new("uptime", 86400).thresholds(Some(720), Some(1440));
        assert_eq!(pd.to_string(), "uptime=86400;720;1440;");

        let pd = Perfdata::new("free space", 10).uom("MB");
        assert_eq!(pd.to_string(), "'free space'=10MB;;;");
    }

    #[test]
    fn status_line_layout() {
        let line = status_line(
            CheckStatus::Warning,
            "CPU Usage 85%",
            &[Perfdata::new("load", 85).thresholds(Some(80), Some(90)).range(0, 100)],
        );
        assert_eq!(line, "WARNING - CPU Usage 85% | load=85;80;90;0;100");
        assert_eq!(
            status_line(CheckStatus::Ok, "all good", &[]),
            "OK - all good"
        );
    }

    #[test]
    fn status_worsen() {
        assert_eq!(
            CheckStatus::Ok.worsen(CheckStatus::Critical),
            CheckStatus::Critical
        );
        assert_eq!(
            CheckStatus::Warning.worsen(CheckStatus::Ok),
            CheckStatus::Warning
        );
    }

    #[test]
    fn cim_datetime_iso_with_offset() {
        let dt = parse_cim_datetime("2023-08-12T11:30:22-05:00").unwrap();
        assert_eq!(dt.timestamp(), 1_691_857_822);
    }

    #[test]
    fn cim_datetime_dmtf() {
        let iso = parse_cim_datetime("2023-08-12T11:30:22-05:00").unwrap();
        let dmtf = parse_cim_datetime("20230812113022.000000-300").unwrap();
        assert_eq!(iso.timestamp(), dmtf.timestamp());
    }

    #[test]
    fn cim_datetime_rejects_garbage() {
        assert!(parse_cim_datetime("last tuesday").is_err());
    }
}
