//! Storage level selection.

use std::fmt;
use std::str::FromStr;

/// How segment files are accessed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum StorageLevel {
    /// Explicit positional I/O through a reusable scratch buffer.
    #[default]
    Disk,
    /// The whole segment is memory-mapped and accessed in place.
    Mapped,
}

impl fmt::Display for StorageLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Disk => f.write_str("disk"),
            Self::Mapped => f.write_str("mapped"),
        }
    }
}

impl FromStr for StorageLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "disk" => Ok(Self::Disk),
            "mapped" | "mmap" => Ok(Self::Mapped),
            other => Err(format!("unknown storage level: {other}")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_levels() {
        assert_eq!("disk".parse::<StorageLevel>().unwrap(), StorageLevel::Disk);
        assert_eq!("MAPPED".parse::<StorageLevel>().unwrap(), StorageLevel::Mapped);
        assert_eq!("mmap".parse::<StorageLevel>().unwrap(), StorageLevel::Mapped);
        assert!("memory".parse::<StorageLevel>().is_err());
    }

    #[test]
    fn display_round_trips() {
        for level in [StorageLevel::Disk, StorageLevel::Mapped] {
            assert_eq!(level.to_string().parse::<StorageLevel>().unwrap(), level);
        }
    }

    #[test]
    fn default_is_disk() {
        assert_eq!(StorageLevel::default(), StorageLevel::Disk);
    }
}
