//! Human-readable byte sizes.

const UNIT: u64 = 1024;
const PREFIXES: [char; 6] = ['K', 'M', 'G', 'T', 'P', 'E'];

/// Format `bytes` with 1024-based units: `"0 B"`, `"1.50 KB"`, `"1.00 GB"`.
pub fn format_bytes(bytes: u64) -> String {
    if bytes < UNIT {
        return format!("{bytes} B");
    }
    let mut div = UNIT;
    let mut exp = 0;
    let mut n = bytes / UNIT;
    while n >= UNIT && exp < PREFIXES.len() - 1 {
        div *= UNIT;
        exp += 1;
        n /= UNIT;
    }
    format!("{:.2} {}B", bytes as f64 / div as f64, PREFIXES[exp])
}
