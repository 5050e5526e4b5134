use std::fmt;

use serde::Serialize;

/// Four-part engine version stamp stored in catalogue entries and packet headers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct EngineVersion {
    pub major: u16,
    pub minor: u16,
    pub release: u16,
    pub build: u16,
}

impl EngineVersion {
    pub const CURRENT: EngineVersion = EngineVersion::new(1, 12, 0, 2145);

    /// Encoded width on disk.
    pub const SIZE: usize = 8;

    pub const fn new(major: u16, minor: u16, release: u16, build: u16) -> Self {
        Self {
            major,
            minor,
            release,
            build,
        }
    }

    pub fn matches_running(&self) -> bool {
        *self == Self::CURRENT
    }
}

impl fmt::Display for EngineVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}.{}.{}.{}",
            self.major, self.minor, self.release, self.build
        )
    }
}

#[cfg(test)]
mod tests {
    use super::EngineVersion;

    #[test]
    fn displays_dotted() {
        assert_eq!(EngineVersion::new(1, 2, 3, 4).to_string(), "1.2.3.4");
    }

    #[test]
    fn current_matches_itself_only() {
        assert!(EngineVersion::CURRENT.matches_running());
        let mut other = EngineVersion::CURRENT;
        other.build += 1;
        assert!(!other.matches_running());
    }
}
