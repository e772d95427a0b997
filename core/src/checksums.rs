//! Parsing of the location-checksum sidecar file.
//!
//! UTF-8 text, one 32-bit unsigned value per line, decimal or `0x`-prefixed
//! hex. Blank lines are skipped; the surviving line count must later match
//! the container's dex count.

use std::fs;
use std::path::Path;

use crate::errors::ExtractError;

/// Parse sidecar text into checksum values.
pub fn parse_checksums(text: &str) -> Result<Vec<u32>, ExtractError> {
    let mut checksums = Vec::new();

    for (lineno, raw) in text.lines().enumerate() {
        let line = raw.trim();
        if line.is_empty() {
            continue;
        }

        let parsed = match line.strip_prefix("0x").or_else(|| line.strip_prefix("0X")) {
            Some(hex) => u32::from_str_radix(hex, 16),
            None => line.parse::<u32>(),
        };

        let value = parsed.map_err(|_| ExtractError::ChecksumParse {
            line: lineno + 1,
            value: line.to_owned(),
        })?;
        checksums.push(value);
    }

    Ok(checksums)
}

/// Load and parse the sidecar at `path`.
pub fn load_checksums(path: &Path) -> Result<Vec<u32>, ExtractError> {
    let text = fs::read_to_string(path)?;
    parse_checksums(&text)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decimal_and_hex_lines() {
        let checksums = parse_checksums("0x11111111\n22\n").unwrap();
        assert_eq!(checksums, vec![0x11111111, 22]);
    }

    #[test]
    fn trailing_blank_lines_are_ignored() {
        let checksums = parse_checksums("1\n2\n\n\n").unwrap();
        assert_eq!(checksums, vec![1, 2]);
    }

    #[test]
    fn garbage_is_rejected_with_the_line_number() {
        let err = parse_checksums("1\nnot-a-number\n").unwrap_err();
        assert!(matches!(
            err,
            ExtractError::ChecksumParse { line: 2, .. }
        ));
    }

    #[test]
    fn values_out_of_u32_range_are_rejected() {
        assert!(parse_checksums("4294967296\n").is_err());
        assert_eq!(parse_checksums("4294967295\n").unwrap(), vec![u32::MAX]);
    }
}
