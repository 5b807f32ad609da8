use std::fs;
use std::path::Path;
use std::sync::OnceLock;

use chrono::{DateTime, Datelike, NaiveDate, NaiveDateTime, ParseResult, TimeZone, Utc};
use regex::Regex;
use regex::bytes::Regex as BytesRegex;
use tracing::debug;
use walkdir::WalkDir;

use crate::error::ServiceError;
use crate::model::GaleWarning;

const TIMESTAMP_FORMAT: &str = "%Y_%m_%dT%H_%M_%S";
const FILL_SEED: u32 = 1;

fn snapshot_name() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"([0-9]{4}_[0-9]{2}_[0-9]{2}T_?[0-9]{2}_[0-9]{2}_[0-9]{2})\.txt$")
            .expect("valid snapshot name pattern")
    })
}

// Bulletin spécial: Avis de Grand frais à Coup de vent numéro 36
fn warning_line() -> &'static BytesRegex {
    static RE: OnceLock<BytesRegex> = OnceLock::new();
    RE.get_or_init(|| {
        BytesRegex::new(r"^\s*(?:Bulletin spécial:|BMS\s+côte\s+numéro)(?-u:.)*?([0-9]+)")
            .expect("valid warning line pattern")
    })
}

/// Timestamp embedded in a snapshot file name such as
/// `bulletin_2016_01_10T06_00_00.txt` (older snapshots wrote `T_06_00_00`),
/// `None` when the name does not follow the snapshot convention.
pub fn parse_snapshot_name(file_name: &str) -> Option<ParseResult<DateTime<Utc>>> {
    let captures = snapshot_name().captures(file_name)?;
    let stamp = captures[1].replace("T_", "T");
    Some(NaiveDateTime::parse_from_str(&stamp, TIMESTAMP_FORMAT).map(|naive| naive.and_utc()))
}

/// First warning number announced in a bulletin, 0 when there is none.
pub fn extract_warning_number(content: &[u8]) -> Result<u32, String> {
    for line in content.split(|byte| *byte == b'\n') {
        if let Some(captures) = warning_line().captures(line) {
            let digits = String::from_utf8_lossy(&captures[1]);
            return digits
                .parse::<u32>()
                .map_err(|error| format!("invalid warning number {digits:?}: {error}"));
        }
    }
    Ok(0)
}

/// Walk `dir` recursively and return the sorted, gap-filled timeline.
pub fn extract_warnings(dir: &Path) -> Result<Vec<GaleWarning>, ServiceError> {
    let mut warnings = Vec::new();
    for entry in WalkDir::new(dir).follow_links(false).sort_by_file_name() {
        let entry =
            entry.map_err(|error| ServiceError::extraction(dir.display().to_string(), error))?;
        if !entry.file_type().is_file() {
            continue;
        }
        let path = entry.path();
        let file_name = entry.file_name().to_string_lossy();
        let Some(timestamp) = parse_snapshot_name(&file_name) else {
            continue;
        };
        let timestamp = timestamp
            .map_err(|error| ServiceError::extraction(path.display().to_string(), error))?;
        let content = fs::read(path)
            .map_err(|error| ServiceError::extraction(path.display().to_string(), error))?;
        let number = extract_warning_number(&content)
            .map_err(|message| ServiceError::extraction(path.display().to_string(), message))?;
        debug!(path = %path.display(), number, "read gale snapshot");
        warnings.push(GaleWarning { number, timestamp });
    }
    debug!(dir = %dir.display(), snapshots = warnings.len(), "extracted gale warnings");
    Ok(build_timeline(warnings))
}

/// Order snapshots chronologically and carry the last known number over
/// snapshots without one.
pub fn build_timeline(mut warnings: Vec<GaleWarning>) -> Vec<GaleWarning> {
    warnings.sort_by_key(|warning| warning.timestamp);
    let mut last = FILL_SEED;
    for warning in &mut warnings {
        if warning.number == 0 {
            warning.number = last;
        } else {
            last = warning.number;
        }
    }
    warnings
}

/// Anchor the timeline on January 1st of the current year (number 0) and
/// extend it to `now` with the last number. Applied at render time only.
pub fn with_boundaries(mut warnings: Vec<GaleWarning>, now: DateTime<Utc>) -> Vec<GaleWarning> {
    let jan1 = start_of_year(now);
    let starts_later = warnings
        .first()
        .is_none_or(|first| jan1 < first.timestamp);
    if starts_later {
        warnings.insert(
            0,
            GaleWarning {
                number: 0,
                timestamp: jan1,
            },
        );
    }
    let last = warnings.last().map(|warning| warning.number).unwrap_or(0);
    warnings.push(GaleWarning {
        number: last,
        timestamp: now,
    });
    warnings
}

fn start_of_year(now: DateTime<Utc>) -> DateTime<Utc> {
    NaiveDate::from_ymd_opt(now.year(), 1, 1)
        .and_then(|date| date.and_hms_opt(0, 0, 0))
        .map(|naive| Utc.from_utc_datetime(&naive))
        .unwrap_or(now)
}
