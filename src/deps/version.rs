//! Version identifiers and update-check scheduling.

use chrono::{DateTime, Duration, Utc};

use super::ledger::VersionInfo;

/// Suffix identifying the executable JAR among release assets.
pub const EXEC_JAR_SUFFIX: &str = "-exec.jar";

/// Minimum time between two remote update checks.
pub const UPDATE_CHECK_INTERVAL_SECONDS: i64 = 24 * 60 * 60;

/// Adds a leading `v` if missing, so `0.28.0` and `v0.28.0` compare equal.
pub fn normalize_version(version: &str) -> String {
    if version.starts_with('v') {
        version.to_string()
    } else {
        format!("v{version}")
    }
}

/// Returns `true` if `name` looks like a server executable JAR.
pub fn is_exec_jar(name: &str) -> bool {
    name.ends_with(EXEC_JAR_SUFFIX)
}

/// Extracts `vX.Y.Z` from a file name shaped like `<prefix>-X.Y.Z-exec.jar`.
///
/// Returns `None` unless the name ends with the exact `-exec.jar` suffix and
/// the segment before it is a three-part numeric version preceded by a
/// non-empty prefix.
pub fn version_from_jar_name(name: &str) -> Option<String> {
    let stem = name.strip_suffix(EXEC_JAR_SUFFIX)?;
    let (prefix, version) = stem.rsplit_once('-')?;
    if prefix.is_empty() {
        return None;
    }

    let parts: Vec<&str> = version.split('.').collect();
    let numeric = parts.len() == 3
        && parts
            .iter()
            .all(|p| !p.is_empty() && p.chars().all(|c| c.is_ascii_digit()));

    numeric.then(|| format!("v{version}"))
}

/// Decides whether a remote update check is due.
///
/// Never when pinned; always when there is no (parseable) previous check;
/// otherwise once [`UPDATE_CHECK_INTERVAL_SECONDS`] have elapsed.
pub fn should_check_for_updates(info: &VersionInfo, now: DateTime<Utc>) -> bool {
    if info.pinned.is_some() {
        return false;
    }

    let Some(last_check) = info.last_check.as_deref() else {
        return true;
    };

    match DateTime::parse_from_rfc3339(last_check) {
        Ok(last) => {
            now.signed_duration_since(last.with_timezone(&Utc))
                >= Duration::seconds(UPDATE_CHECK_INTERVAL_SECONDS)
        }
        Err(_) => true,
    }
}
