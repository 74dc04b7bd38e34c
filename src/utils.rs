//! Utility functions for the ble-session crate.

/// Render an opaque payload as uppercase hexadecimal text.
///
/// Payload bytes are pass-through for the session core; this is the one
/// formatting helper offered to presentation code.
///
/// # Example
///
/// ```
/// use ble_session::to_hex_string;
///
/// assert_eq!(to_hex_string(&[0x01, 0xAB, 0xFF]), "01ABFF");
/// ```
#[inline]
pub fn to_hex_string(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{:02X}", b)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_to_hex_string() {
        assert_eq!(to_hex_string(&[]), "");
        assert_eq!(to_hex_string(&[0x00]), "00");
        assert_eq!(to_hex_string(&[0x01, 0x02]), "0102");
        assert_eq!(to_hex_string(&[0xDE, 0xAD, 0xBE, 0xEF]), "DEADBEEF");
    }

    #[test]
    fn test_to_hex_string_low_nibbles_are_padded() {
        assert_eq!(to_hex_string(&[0x0A, 0x0B]), "0A0B");
    }
}
