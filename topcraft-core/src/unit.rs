//! Display units for memory measurements.
//!
//! The sampler reports MiB; a unit's factor converts that native value into
//! the unit shown to the user.

use std::fmt;
use std::str::FromStr;

/// Memory unit used for reporting
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum MemoryUnit {
    /// Bytes
    Bytes,
    /// Kibibytes (1024 bytes)
    KiB,
    /// Mebibytes, the native sampler unit
    #[default]
    MiB,
    /// Gibibytes
    GiB,
}

impl MemoryUnit {
    /// Multiplier from MiB to this unit
    pub const fn factor(self) -> f64 {
        match self {
            MemoryUnit::Bytes => 1_048_576.0,
            MemoryUnit::KiB => 1024.0,
            MemoryUnit::MiB => 1.0,
            MemoryUnit::GiB => 1.0 / 1024.0,
        }
    }

    /// Suffix used when printing values
    pub const fn suffix(self) -> &'static str {
        match self {
            MemoryUnit::Bytes => "B",
            MemoryUnit::KiB => "KiB",
            MemoryUnit::MiB => "MiB",
            MemoryUnit::GiB => "GiB",
        }
    }

    /// Parse a unit name, falling back to MiB for anything unrecognised.
    pub fn from_name_lossy(name: &str) -> Self {
        name.parse().unwrap_or_default()
    }

    /// Convert a native (MiB) value into this unit
    pub fn from_mebibytes(self, mebibytes: f64) -> f64 {
        mebibytes * self.factor()
    }

    /// Convert a value in this unit back to MiB
    pub fn to_mebibytes(self, value: f64) -> f64 {
        value / self.factor()
    }
}

impl FromStr for MemoryUnit {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "b" | "byte" | "bytes" => Ok(MemoryUnit::Bytes),
            "kb" | "kib" => Ok(MemoryUnit::KiB),
            "mb" | "mib" => Ok(MemoryUnit::MiB),
            "gb" | "gib" => Ok(MemoryUnit::GiB),
            other => Err(format!("Unknown memory unit: {}", other)),
        }
    }
}

impl fmt::Display for MemoryUnit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.suffix())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_case_insensitive_names() {
        assert_eq!(MemoryUnit::from_name_lossy("Mb"), MemoryUnit::MiB);
        assert_eq!(MemoryUnit::from_name_lossy("KB"), MemoryUnit::KiB);
        assert_eq!(MemoryUnit::from_name_lossy("gib"), MemoryUnit::GiB);
        assert_eq!(MemoryUnit::from_name_lossy("b"), MemoryUnit::Bytes);
    }

    #[test]
    fn test_unknown_unit_falls_back_to_mib() {
        let unit = MemoryUnit::from_name_lossy("petabytes");
        assert_eq!(unit, MemoryUnit::MiB);
        assert_eq!(unit.factor(), 1.0);
        assert!("petabytes".parse::<MemoryUnit>().is_err());
    }

    #[test]
    fn test_kib_conversion_recovers_native_value() {
        let raw = 37.123_456;
        let kib = MemoryUnit::KiB.from_mebibytes(raw);
        assert!((kib - raw * 1024.0).abs() < 1e-9);
        assert!((MemoryUnit::KiB.to_mebibytes(kib) - raw).abs() < 1e-12);
    }

    #[test]
    fn test_factors() {
        assert_eq!(MemoryUnit::Bytes.factor(), 2f64.powi(20));
        assert_eq!(MemoryUnit::GiB.factor(), 2f64.powi(-10));
    }
}
