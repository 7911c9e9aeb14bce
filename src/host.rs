//! Host identification
//!
//! The host integration hands over the DAW's self-description and, when
//! available, the path of its executable. From those we derive the raw host
//! name (sent with submissions), a friendly display name for the UI, and the
//! `User-Agent` header.

use serde::Serialize;

const UNKNOWN_HOST: &str = "Unknown";

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HostInfo {
    raw_name: String,
    display_name: String,
    user_agent: String,
}

impl HostInfo {
    /// Identify the host.
    ///
    /// * `description` - the host's self-reported name, e.g. `"ProTools"`
    /// * `executable_path` - used to tell Ableton Live 12 and 13 apart
    /// * `host_version` - the host application's version, if known
    pub fn detect(description: &str, executable_path: Option<&str>, host_version: Option<&str>) -> Self {
        let mut raw_name = description.trim().to_string();
        if raw_name.is_empty() {
            raw_name = UNKNOWN_HOST.to_string();
        }

        if is_ableton_live(&raw_name) {
            if let Some(major) = executable_path.and_then(live_major_version) {
                raw_name = format!("Live {major}");
            }
        }

        let display_name = display_name_for(&raw_name);
        let user_agent = format!(
            "{}/{} - {}/{}",
            raw_name,
            host_version.unwrap_or("0.0.0"),
            os_name(),
            arch_name()
        );

        Self {
            raw_name,
            display_name,
            user_agent,
        }
    }

    pub fn unknown() -> Self {
        Self::detect(UNKNOWN_HOST, None, None)
    }

    /// Name sent as the `host` field.
    pub fn raw_name(&self) -> &str {
        &self.raw_name
    }

    /// Friendly name for the UI.
    pub fn display_name(&self) -> &str {
        &self.display_name
    }

    pub fn user_agent(&self) -> &str {
        &self.user_agent
    }
}

impl Default for HostInfo {
    fn default() -> Self {
        Self::unknown()
    }
}

fn is_ableton_live(name: &str) -> bool {
    let lower = name.to_lowercase();
    lower.contains("ableton") || lower == "live" || lower.starts_with("live ")
}

/// `Live 12` / `Live 13` from an install path or file name.
fn live_major_version(path: &str) -> Option<u32> {
    let lower = path.to_lowercase();
    [13, 12]
        .into_iter()
        .find(|major| lower.contains(&format!("live {major}")))
}

fn display_name_for(raw: &str) -> String {
    match raw {
        "ProTools" => "Pro Tools".to_string(),
        "Live 12" => "Ableton Live 12".to_string(),
        "Live 13" => "Ableton Live 13".to_string(),
        "FruityLoops" => "FL Studio".to_string(),
        "Apple Logic" => "Logic Pro".to_string(),
        other => other.to_string(),
    }
}

fn os_name() -> &'static str {
    match std::env::consts::OS {
        "macos" => "Mac OSX",
        "windows" => "Windows",
        "linux" => "Linux",
        other => other,
    }
}

fn arch_name() -> &'static str {
    match std::env::consts::ARCH {
        "aarch64" => "arm64",
        "x86_64" => "x64",
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_names() {
        assert_eq!(HostInfo::detect("ProTools", None, None).display_name(), "Pro Tools");
        assert_eq!(HostInfo::detect("FruityLoops", None, None).display_name(), "FL Studio");
        assert_eq!(HostInfo::detect("Apple Logic", None, None).display_name(), "Logic Pro");
        assert_eq!(HostInfo::detect("Reaper", None, None).display_name(), "Reaper");
    }

    #[test]
    fn test_live_version_from_path() {
        let host = HostInfo::detect(
            "Ableton Live 12",
            Some("/Applications/Ableton Live 13 Suite.app/Contents/MacOS/Live"),
            Some("13.0.1"),
        );
        assert_eq!(host.raw_name(), "Live 13");
        assert_eq!(host.display_name(), "Ableton Live 13");
        assert!(host.user_agent().starts_with("Live 13/13.0.1 - "));
    }

    #[test]
    fn test_live_without_path_keeps_description() {
        let host = HostInfo::detect("Ableton Live 11", None, None);
        assert_eq!(host.raw_name(), "Ableton Live 11");
        assert_eq!(host.display_name(), "Ableton Live 11");
    }

    #[test]
    fn test_path_ignored_for_other_hosts() {
        let host = HostInfo::detect("Reaper", Some("C:/Live 12/reaper.exe"), None);
        assert_eq!(host.raw_name(), "Reaper");
    }

    #[test]
    fn test_empty_description_is_unknown() {
        let host = HostInfo::detect("  ", None, None);
        assert_eq!(host.display_name(), "Unknown");
        assert_eq!(host, HostInfo::unknown());
    }

    #[test]
    fn test_user_agent_shape() {
        let ua = HostInfo::detect("Bitwig Studio", None, Some("5.1")).user_agent().to_string();
        let (left, right) = ua.split_once(" - ").unwrap();
        assert_eq!(left, "Bitwig Studio/5.1");
        assert!(right.contains('/'));
    }
}
