//! Byte-size parsing (`10K`, `2M`, `512`) and human formatting.

use crate::core::errors::{BalanceError, Result};

const KIB: u64 = 1024;
const MIB: u64 = 1024 * KIB;
const GIB: u64 = 1024 * MIB;
const TIB: u64 = 1024 * GIB;

/// Parse a size bound: a bare integer (bytes) or an integer followed by one
/// binary unit suffix `K`, `M`, `G` or `T`. Lowercase suffixes are accepted.
pub fn parse_size(input: &str) -> Result<u64> {
    let trimmed = input.trim();
    let invalid = |details: &str| BalanceError::InvalidSize {
        input: input.to_string(),
        details: details.to_string(),
    };

    let Some(last) = trimmed.chars().last() else {
        return Err(invalid("empty size"));
    };

    let (digits, multiplier) = match last.to_ascii_uppercase() {
        'K' => (&trimmed[..trimmed.len() - 1], KIB),
        'M' => (&trimmed[..trimmed.len() - 1], MIB),
        'G' => (&trimmed[..trimmed.len() - 1], GIB),
        'T' => (&trimmed[..trimmed.len() - 1], TIB),
        c if c.is_ascii_digit() => (trimmed, 1),
        other => return Err(invalid(&format!("unknown unit suffix {other:?}"))),
    };

    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return Err(invalid("expected an unsigned integer"));
    }
    let value = digits
        .parse::<u64>()
        .map_err(|err| invalid(&err.to_string()))?;
    value
        .checked_mul(multiplier)
        .ok_or_else(|| invalid("size overflows 64 bits"))
}

/// Render a byte count with one decimal in the largest fitting binary unit.
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn format_bytes(bytes: u64) -> String {
    if bytes >= TIB {
        format!("{:.1} TB", bytes as f64 / TIB as f64)
    } else if bytes >= GIB {
        format!("{:.1} GB", bytes as f64 / GIB as f64)
    } else if bytes >= MIB {
        format!("{:.1} MB", bytes as f64 / MIB as f64)
    } else if bytes >= KIB {
        format!("{:.1} KB", bytes as f64 / KIB as f64)
    } else {
        format!("{bytes} B")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn parses_documented_units() {
        assert_eq!(parse_size("10K").unwrap(), 10_240);
        assert_eq!(parse_size("2M").unwrap(), 2_097_152);
        assert_eq!(parse_size("1G").unwrap(), 1_073_741_824);
        assert_eq!(parse_size("3T").unwrap(), 3 * 1024 * 1024 * 1024 * 1024);
        assert_eq!(parse_size("512").unwrap(), 512);
    }

    #[test]
    fn lowercase_suffix_and_whitespace_accepted() {
        assert_eq!(parse_size("4k").unwrap(), 4_096);
        assert_eq!(parse_size(" 1m ").unwrap(), MIB);
        assert_eq!(parse_size("0").unwrap(), 0);
    }

    #[test]
    fn rejects_malformed_sizes() {
        for bad in ["", "K", "1.5G", "-3", "12X", "1KB", "abc"] {
            let err = parse_size(bad).expect_err(bad);
            assert_eq!(err.code(), "BAL-1004", "{bad}: {err}");
        }
    }

    #[test]
    fn rejects_overflow() {
        let err = parse_size("99999999999T").unwrap_err();
        assert!(err.to_string().contains("overflows"));
    }

    #[test]
    fn formats_bytes_in_binary_units() {
        assert_eq!(format_bytes(512), "512 B");
        assert_eq!(format_bytes(1536), "1.5 KB");
        assert_eq!(format_bytes(3 * GIB), "3.0 GB");
    }

    proptest! {
        #[test]
        fn suffix_multiplies_by_binary_step(n in 0u64..1_000_000) {
            prop_assert_eq!(parse_size(&format!("{n}K")).unwrap(), n * KIB);
            prop_assert_eq!(parse_size(&format!("{n}M")).unwrap(), n * MIB);
            prop_assert_eq!(parse_size(&n.to_string()).unwrap(), n);
        }
    }
}
