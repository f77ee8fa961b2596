//! Checksum output and error reporting

use console::{style, Term};
use std::io::{self, Write};

/// `0,` for zero, `0x1f,` otherwise.
#[must_use]
pub fn format_checksum(value: u64) -> String {
    if value == 0 {
        "0,".to_string()
    } else {
        format!("{value:#x},")
    }
}

/// One checksum per thread, in thread order, no separator between them.
pub fn write_checksums(out: &mut dyn Write, values: &[u64]) -> io::Result<()> {
    for &value in values {
        out.write_all(format_checksum(value).as_bytes())?;
    }
    out.flush()
}

/// `Error:`, styled when stderr is a terminal.
#[must_use]
pub fn error_prefix() -> String {
    if Term::stderr().is_term() {
        style("Error:").red().bold().to_string()
    } else {
        "Error:".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_has_no_prefix() {
        assert_eq!(format_checksum(0), "0,");
    }

    #[test]
    fn hex_with_prefix() {
        assert_eq!(format_checksum(0x1f), "0x1f,");
        assert_eq!(format_checksum(u64::MAX), "0xffffffffffffffff,");
    }

    #[test]
    fn checksums_in_order() {
        let mut out = Vec::new();
        write_checksums(&mut out, &[0, 1, 0xabc]).unwrap();
        assert_eq!(String::from_utf8(out).unwrap(), "0,0x1,0xabc,");
    }
}
