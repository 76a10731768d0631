//! Short loadout names: `A`, `B`, ..., `Z`, `AA`, `AB`, ...

use compact_str::CompactString;

/// Short name for the `n`th loadout, starting at 1.
pub fn short_name(mut n: u64) -> CompactString {
    debug_assert!(n > 0);
    let mut letters = Vec::new();
    while n > 0 {
        n -= 1;
        letters.push(b'A' + (n % 26) as u8);
        n /= 26;
    }
    letters.iter().rev().map(|b| *b as char).collect()
}

/// The first short name not already taken.
pub fn next_short_name<S: AsRef<str>>(existing: &[S]) -> CompactString {
    (1..)
        .map(short_name)
        .find(|candidate| !existing.iter().any(|e| e.as_ref() == candidate.as_str()))
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_short_name_sequence() {
        assert_eq!(short_name(1), "A");
        assert_eq!(short_name(26), "Z");
        assert_eq!(short_name(27), "AA");
        assert_eq!(short_name(28), "AB");
        assert_eq!(short_name(702), "ZZ");
        assert_eq!(short_name(703), "AAA");
    }

    #[test]
    fn test_next_short_name_fills_gaps() {
        assert_eq!(next_short_name::<&str>(&[]), "A");
        assert_eq!(next_short_name(&["A", "B"]), "C");
        assert_eq!(next_short_name(&["A", "C"]), "B");
        assert_eq!(next_short_name(&["-", "A"]), "B");
    }
}
