//! Kubernetes resource quantity parsing.
//!
//! Quantities arrive as strings like `512Mi`, `2G`, `250m`. Unparseable
//! input normalizes to zero rather than erroring; callers substitute their
//! own defaults.

const BINARY_SUFFIXES: [(&str, u64); 6] = [
    ("Ki", 1 << 10),
    ("Mi", 1 << 20),
    ("Gi", 1 << 30),
    ("Ti", 1 << 40),
    ("Pi", 1 << 50),
    ("Ei", 1 << 60),
];

const DECIMAL_SUFFIXES: [(&str, u64); 6] = [
    ("K", 1_000),
    ("M", 1_000_000),
    ("G", 1_000_000_000),
    ("T", 1_000_000_000_000),
    ("P", 1_000_000_000_000_000),
    ("E", 1_000_000_000_000_000_000),
];

/// Parse a CPU quantity into cores. `250m` is 0.25 cores.
pub fn parse_cpu_cores(quantity: &str) -> f64 {
    let trimmed = quantity.trim();
    if trimmed.is_empty() {
        return 0.0;
    }

    if let Some(millis) = trimmed.strip_suffix('m') {
        return millis.parse::<f64>().map(|m| m / 1000.0).unwrap_or(0.0);
    }

    trimmed.parse::<f64>().unwrap_or(0.0)
}

/// Parse a memory quantity into bytes. Binary suffixes (Ki..Ei) are powers
/// of 1024, decimal suffixes (K..E) powers of 1000.
pub fn parse_memory_bytes(quantity: &str) -> u64 {
    let trimmed = quantity.trim();
    if trimmed.is_empty() {
        return 0;
    }

    let split = trimmed
        .find(|c: char| !c.is_ascii_digit() && c != '.')
        .unwrap_or(trimmed.len());
    let (number, suffix) = trimmed.split_at(split);

    let value: f64 = match number.parse() {
        Ok(v) => v,
        Err(_) => return 0,
    };

    if suffix.is_empty() {
        return value.round() as u64;
    }

    for (s, multiplier) in BINARY_SUFFIXES {
        if suffix == s {
            return (value * multiplier as f64).round() as u64;
        }
    }
    for (s, multiplier) in DECIMAL_SUFFIXES {
        if suffix == s {
            return (value * multiplier as f64).round() as u64;
        }
    }

    0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cpu_millicores() {
        assert_eq!(parse_cpu_cores("250m"), 0.25);
        assert_eq!(parse_cpu_cores("1500m"), 1.5);
    }

    #[test]
    fn cpu_whole_cores() {
        assert_eq!(parse_cpu_cores("2"), 2.0);
        assert_eq!(parse_cpu_cores("0.5"), 0.5);
    }

    #[test]
    fn cpu_garbage_is_zero() {
        assert_eq!(parse_cpu_cores(""), 0.0);
        assert_eq!(parse_cpu_cores("lots"), 0.0);
    }

    #[test]
    fn memory_binary_suffixes() {
        assert_eq!(parse_memory_bytes("1Ki"), 1024);
        assert_eq!(parse_memory_bytes("512Mi"), 512 * 1024 * 1024);
        assert_eq!(parse_memory_bytes("2Gi"), 2 * 1024 * 1024 * 1024);
        assert_eq!(parse_memory_bytes("1Ti"), 1u64 << 40);
    }

    #[test]
    fn memory_decimal_suffixes() {
        assert_eq!(parse_memory_bytes("1K"), 1000);
        assert_eq!(parse_memory_bytes("3M"), 3_000_000);
        assert_eq!(parse_memory_bytes("2G"), 2_000_000_000);
    }

    #[test]
    fn memory_bare_bytes() {
        assert_eq!(parse_memory_bytes("123456"), 123456);
    }

    #[test]
    fn memory_fractional_quantity() {
        assert_eq!(parse_memory_bytes("1.5Gi"), 3 * (1u64 << 29));
    }

    #[test]
    fn memory_garbage_is_zero() {
        assert_eq!(parse_memory_bytes(""), 0);
        assert_eq!(parse_memory_bytes("Mi"), 0);
        assert_eq!(parse_memory_bytes("12Qx"), 0);
    }
}
