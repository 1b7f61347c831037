//! Line protocol
//!
//! A request is one newline-terminated line of exactly [`LINE_LENGTH`] bytes
//! (terminator included) holding a base-10 integer no smaller than
//! [`MIN_VALUE`]. Checks run in a fixed order: length on the raw bytes, then
//! number format, then range. The first failing check decides the response.

use crate::errors::ProtocolError;

// ----------------------------------------------------------------------------
// Constants
// ----------------------------------------------------------------------------

/// Expected request length in bytes, including the trailing `\n`
pub const LINE_LENGTH: usize = 10;

/// Smallest accepted value
pub const MIN_VALUE: i64 = 1_000_000;

/// Written to a connection turned away by the admission gate. No newline.
pub const BUSY_MESSAGE: &str = "Server busy.";

// ----------------------------------------------------------------------------
// Validation
// ----------------------------------------------------------------------------

/// A validated request value
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Record {
    value: i64,
}

impl Record {
    pub fn value(&self) -> i64 {
        self.value
    }

    /// Echo sent back to the client on success
    pub fn to_response(&self) -> String {
        format!("{}\n", self.value)
    }
}

/// Validate one raw line as read from the socket.
///
/// `line` is everything read up to and including the first `\n`, or up to
/// end-of-stream when the client closed without a terminator.
pub fn validate_line(line: &[u8]) -> Result<Record, ProtocolError> {
    if line.len() != LINE_LENGTH {
        return Err(ProtocolError::length(line.len()));
    }

    let digits = line.strip_suffix(b"\n").unwrap_or(line);
    let value = std::str::from_utf8(digits)
        .ok()
        .and_then(|s| s.parse::<i64>().ok())
        .ok_or(ProtocolError::NotANumber)?;

    if value < MIN_VALUE {
        return Err(ProtocolError::below_minimum());
    }

    Ok(Record { value })
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_valid_line_is_echoed_canonically() {
        let record = validate_line(b"123456789\n").unwrap();
        assert_eq!(record.value(), 123_456_789);
        assert_eq!(record.to_response(), "123456789\n");

        let record = validate_line(b"001234567\n").unwrap();
        assert_eq!(record.to_response(), "1234567\n");
    }

    #[test]
    fn test_unterminated_line_at_end_of_stream() {
        let record = validate_line(b"1234567890").unwrap();
        assert_eq!(record.value(), 1_234_567_890);
    }

    #[test]
    fn test_short_line_reports_length() {
        assert_eq!(
            validate_line(b"123\n"),
            Err(ProtocolError::Length {
                expected: 10,
                actual: 4
            })
        );
        assert_eq!(validate_line(b""), Err(ProtocolError::length(0)));
    }

    #[test]
    fn test_padded_line_fails_length_before_format() {
        // Same digits with surrounding whitespace is too long, not malformed
        assert_eq!(
            validate_line(b" 123456789\n"),
            Err(ProtocolError::length(11))
        );
        assert_eq!(
            validate_line(b"123456789\r\n"),
            Err(ProtocolError::length(11))
        );
    }

    #[test]
    fn test_non_numeric_line() {
        assert_eq!(validate_line(b"12345678a\n"), Err(ProtocolError::NotANumber));
        assert_eq!(validate_line(b"1234 5678\n"), Err(ProtocolError::NotANumber));
        assert_eq!(
            validate_line(&[0xff, b'1', b'2', b'3', b'4', b'5', b'6', b'7', b'8', b'\n']),
            Err(ProtocolError::NotANumber)
        );
    }

    #[test]
    fn test_range_boundary() {
        assert_eq!(
            validate_line(b"000000001\n"),
            Err(ProtocolError::below_minimum())
        );
        assert_eq!(
            validate_line(b"000999999\n"),
            Err(ProtocolError::below_minimum())
        );
        assert_eq!(
            validate_line(b"-12345678\n"),
            Err(ProtocolError::below_minimum())
        );
        assert_eq!(validate_line(b"001000000\n").unwrap().value(), MIN_VALUE);
    }

    proptest! {
        #[test]
        fn prop_wrong_length_always_rejected_on_length(
            line in proptest::collection::vec(any::<u8>(), 0..64)
                .prop_filter("not the fixed length", |l| l.len() != LINE_LENGTH)
        ) {
            prop_assert_eq!(validate_line(&line), Err(ProtocolError::length(line.len())));
        }

        #[test]
        fn prop_nine_digits_at_or_above_minimum_accepted(value in MIN_VALUE..=999_999_999i64) {
            let line = format!("{:09}\n", value);
            let record = validate_line(line.as_bytes()).unwrap();
            prop_assert_eq!(record.value(), value);
            prop_assert_eq!(record.to_response(), format!("{}\n", value));
        }

        #[test]
        fn prop_nine_digits_below_minimum_rejected(value in 0..MIN_VALUE) {
            let line = format!("{:09}\n", value);
            prop_assert_eq!(validate_line(line.as_bytes()), Err(ProtocolError::below_minimum()));
        }
    }
}
