//! Log redaction and buffer wiping.

use zeroize::Zeroize;

/// Constant mask used for short or absent values and as the middle filler.
pub const MASK: &str = "****";

/// Redact a value for operator-facing logs.
///
/// Values of four characters or fewer (and `None`) become [`MASK`]. Longer
/// values keep their first two and last two characters around a fixed-width
/// mask, so the true length is never shown.
pub fn mask_for_logging(value: Option<&str>) -> String {
    let Some(value) = value else {
        return MASK.to_string();
    };

    let chars: Vec<char> = value.chars().collect();
    if chars.len() <= 4 {
        return MASK.to_string();
    }

    let head: String = chars[..2].iter().collect();
    let tail: String = chars[chars.len() - 2..].iter().collect();
    format!("{head}{MASK}{tail}")
}

/// Overwrite a byte buffer with zeros.
pub fn secure_wipe(buf: &mut [u8]) {
    buf.zeroize();
}

/// Overwrite and clear a string buffer.
pub fn secure_wipe_string(value: &mut String) {
    value.zeroize();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mask_long_value() {
        assert_eq!(mask_for_logging(Some("sensitivedata123")), "se****23");
        assert_eq!(mask_for_logging(Some("abcde")), "ab****de");
    }

    #[test]
    fn test_mask_short_and_absent() {
        assert_eq!(mask_for_logging(Some("abc")), MASK);
        assert_eq!(mask_for_logging(Some("abcd")), MASK);
        assert_eq!(mask_for_logging(Some("")), MASK);
        assert_eq!(mask_for_logging(None), MASK);
    }

    #[test]
    fn test_mask_multibyte() {
        assert_eq!(mask_for_logging(Some("héllo wörld")), "hé****ld");
    }

    #[test]
    fn test_wipe() {
        let mut buf = vec![1u8, 2, 3];
        secure_wipe(&mut buf);
        assert_eq!(buf, vec![0, 0, 0]);

        let mut s = String::from("hunter2");
        secure_wipe_string(&mut s);
        assert!(s.is_empty());
    }
}
