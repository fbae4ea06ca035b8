//! Extraction of network identifiers from WPA2 captures.
//!
//! Parsing capture contents is left to dedicated tooling; the coordinator only
//! needs the ESSID and BSSID to label the target and to hand them to workers.
//! [`FilenameInspector`] recovers both from the conventional
//! `<ESSID>_<BSSID>.<ext>` file name.

use std::path::Path;

/// Network identifiers of a captured handshake.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TargetInfo {
    pub essid: String,
    /// Colon-separated, e.g. `00:11:22:33:44:55`.
    pub bssid: String,
}

#[derive(thiserror::Error, Debug, PartialEq, Eq)]
#[error("cannot determine ESSID/BSSID of {path}: {reason}")]
pub struct InspectError {
    pub path: String,
    pub reason: String,
}

/// Resolves a capture to its network identifiers.
pub trait TargetInspector: Send + Sync {
    /// # Errors
    ///
    /// Returns [`InspectError`] if either identifier cannot be determined.
    fn inspect(&self, path: &Path) -> Result<TargetInfo, InspectError>;
}

/// Reads identifiers from a file named `<ESSID>_<12 hex digits>.<ext>`.
#[derive(Clone, Copy, Debug, Default)]
pub struct FilenameInspector;

const BSSID_DIGITS: usize = 12;

impl TargetInspector for FilenameInspector {
    fn inspect(&self, path: &Path) -> Result<TargetInfo, InspectError> {
        let fail = |reason: &str| InspectError {
            path: path.display().to_string(),
            reason: reason.to_string(),
        };

        let stem = path
            .file_stem()
            .and_then(|s| s.to_str())
            .ok_or_else(|| fail("file name is not valid UTF-8"))?;
        // The ESSID itself may contain underscores; the BSSID never does.
        let (essid, raw_bssid) = stem
            .rsplit_once('_')
            .ok_or_else(|| fail("expected <ESSID>_<BSSID>.<ext>"))?;

        if essid.is_empty() {
            return Err(fail("empty ESSID"));
        }
        if raw_bssid.len() != BSSID_DIGITS || !raw_bssid.bytes().all(|b| b.is_ascii_hexdigit()) {
            return Err(fail("BSSID must be 12 hex digits without separators"));
        }

        Ok(TargetInfo {
            essid: essid.to_string(),
            bssid: splice(raw_bssid, ':', 2),
        })
    }
}

/// Inserts `separator` after every `every` characters.
fn splice(input: &str, separator: char, every: usize) -> String {
    let mut out = String::with_capacity(input.len() + input.len() / every);
    for (i, c) in input.chars().enumerate() {
        if i > 0 && i % every == 0 {
            out.push(separator);
        }
        out.push(c);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn filename_yields_essid_and_bssid() {
        let info = FilenameInspector
            .inspect(Path::new("/captures/HomeNet_A0B1C2D3E4F5.pcap"))
            .unwrap();
        assert_eq!(info.essid, "HomeNet");
        assert_eq!(info.bssid, "A0:B1:C2:D3:E4:F5");
    }

    #[test]
    fn essid_may_contain_underscores() {
        let info = FilenameInspector
            .inspect(Path::new("my_guest_net_001122334455.cap"))
            .unwrap();
        assert_eq!(info.essid, "my_guest_net");
        assert_eq!(info.bssid, "00:11:22:33:44:55");
    }

    #[test]
    fn malformed_names_are_rejected() {
        for name in [
            "HomeNet.pcap",
            "_001122334455.pcap",
            "HomeNet_0011223344.pcap",
            "HomeNet_00112233445G.pcap",
        ] {
            assert!(FilenameInspector.inspect(Path::new(name)).is_err(), "{name}");
        }
    }
}
