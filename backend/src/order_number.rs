// Luhn checksum validation for order numbers
//
// Used at order submission, at withdrawal, and again by the settlement
// worker before an accrual result is written.

use crate::error::ValidationError;

/// Validate an order number with the Luhn checksum.
///
/// Fails with `EmptyInput` for an empty string, `MalformedInput` when any
/// character is not an ASCII digit, and `InvalidChecksum` when the check
/// digit does not match.
pub fn validate(number: &str) -> Result<(), ValidationError> {
    if number.is_empty() {
        return Err(ValidationError::EmptyInput);
    }

    let mut sum: u32 = 0;
    for (position, ch) in number.chars().rev().enumerate() {
        let digit = ch
            .to_digit(10)
            .ok_or_else(|| ValidationError::MalformedInput(number.to_string()))?;

        sum += if position % 2 == 1 {
            let doubled = digit * 2;
            if doubled > 9 { doubled - 9 } else { doubled }
        } else {
            digit
        };
    }

    if sum % 10 != 0 {
        return Err(ValidationError::InvalidChecksum(number.to_string()));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_numbers() {
        for number in [
            "9278923470",
            "2377225624",
            "12345678903",
            "79927398713",
            "4561261212345467",
            "0",
        ] {
            assert!(validate(number).is_ok(), "{} should pass", number);
        }
    }

    #[test]
    fn test_invalid_checksum() {
        assert_eq!(
            validate("1"),
            Err(ValidationError::InvalidChecksum("1".to_string()))
        );
        assert!(matches!(
            validate("9278923471"),
            Err(ValidationError::InvalidChecksum(_))
        ));
        assert!(matches!(
            validate("79927398710"),
            Err(ValidationError::InvalidChecksum(_))
        ));
    }

    #[test]
    fn test_malformed_input() {
        assert_eq!(validate(""), Err(ValidationError::EmptyInput));
        assert!(matches!(
            validate("92789a3470"),
            Err(ValidationError::MalformedInput(_))
        ));
        assert!(matches!(
            validate(" 9278923470"),
            Err(ValidationError::MalformedInput(_))
        ));
        assert!(matches!(
            validate("-9278923470"),
            Err(ValidationError::MalformedInput(_))
        ));
        // Non-ASCII digits are rejected, not interpreted
        assert!(matches!(
            validate("٩٢٧"),
            Err(ValidationError::MalformedInput(_))
        ));
    }
}
