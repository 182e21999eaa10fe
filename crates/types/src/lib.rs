//! Validated text primitives shared across the clinic workspace.
//!
//! Every type here guarantees its invariant once constructed, so downstream code never needs to
//! re-check names, emails, phone numbers or postal codes.

/// Errors that can occur when creating validated text types.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum TextError {
    /// The input text was empty or contained only whitespace
    #[error("Text cannot be empty")]
    Empty,
    #[error("invalid email address: {0}")]
    InvalidEmail(String),
    #[error("invalid phone number: {0}")]
    InvalidPhone(String),
    #[error("invalid postal code: {0}")]
    InvalidPostalCode(String),
}

/// A string type that guarantees non-empty content.
///
/// This type wraps a `String` and ensures it contains at least one non-whitespace character.
/// The input is automatically trimmed of leading and trailing whitespace during construction.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct NonEmptyText(String);

impl NonEmptyText {
    /// Creates a new `NonEmptyText` from the given input.
    ///
    /// The input is trimmed of leading and trailing whitespace. If the trimmed
    /// result is empty, an error is returned.
    pub fn new(input: impl AsRef<str>) -> Result<Self, TextError> {
        let trimmed = input.as_ref().trim();
        if trimmed.is_empty() {
            return Err(TextError::Empty);
        }
        Ok(Self(trimmed.to_owned()))
    }

    /// Returns the inner string as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// A lower-cased email address with a plausible `local@domain.tld` shape.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct EmailAddress(String);

impl EmailAddress {
    const MAX_LEN: usize = 254;

    pub fn parse(input: impl AsRef<str>) -> Result<Self, TextError> {
        let value = input.as_ref().trim().to_ascii_lowercase();
        let invalid = || TextError::InvalidEmail(value.clone());

        if value.is_empty() || value.len() > Self::MAX_LEN || value.contains(char::is_whitespace)
        {
            return Err(invalid());
        }

        let (local, domain) = value.split_once('@').ok_or_else(invalid)?;
        if local.is_empty() || domain.contains('@') {
            return Err(invalid());
        }
        if !domain.contains('.') || domain.starts_with('.') || domain.ends_with('.') {
            return Err(invalid());
        }

        Ok(Self(value))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// A phone number normalised to digits with an optional leading `+`.
///
/// Spaces and hyphens are stripped on construction, so `+91 98765-43210` and
/// `+919876543210` compare equal.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct PhoneNumber(String);

impl PhoneNumber {
    pub fn parse(input: impl AsRef<str>) -> Result<Self, TextError> {
        let compact: String = input
            .as_ref()
            .trim()
            .chars()
            .filter(|c| *c != ' ' && *c != '-')
            .collect();

        let digits = compact.strip_prefix('+').unwrap_or(&compact);
        let ok = (7..=15).contains(&digits.len()) && digits.bytes().all(|b| b.is_ascii_digit());
        if !ok {
            return Err(TextError::InvalidPhone(input.as_ref().to_owned()));
        }

        Ok(Self(compact))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// A postal / PIN code: 3 to 10 ASCII alphanumerics, optionally split by a space or hyphen.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct PostalCode(String);

impl PostalCode {
    pub fn parse(input: impl AsRef<str>) -> Result<Self, TextError> {
        let value = input.as_ref().trim();
        let invalid = || TextError::InvalidPostalCode(value.to_owned());

        if !(3..=10).contains(&value.len()) {
            return Err(invalid());
        }
        let bytes = value.as_bytes();
        let edges_ok =
            bytes[0].is_ascii_alphanumeric() && bytes[bytes.len() - 1].is_ascii_alphanumeric();
        let body_ok = bytes
            .iter()
            .all(|b| b.is_ascii_alphanumeric() || *b == b' ' || *b == b'-');
        if !edges_ok || !body_ok {
            return Err(invalid());
        }

        Ok(Self(value.to_ascii_uppercase()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

// Display, AsRef, serde and OpenAPI plumbing is identical for every wrapper: each one is a
// plain JSON string on the wire and re-validates on the way in.
macro_rules! string_wrapper {
    ($ty:ident, $ctor:path, $description:literal) => {
        impl std::fmt::Display for $ty {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl AsRef<str> for $ty {
            fn as_ref(&self) -> &str {
                &self.0
            }
        }

        impl std::str::FromStr for $ty {
            type Err = TextError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                $ctor(s)
            }
        }

        impl serde::Serialize for $ty {
            fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
            where
                S: serde::Serializer,
            {
                serializer.serialize_str(&self.0)
            }
        }

        impl<'de> serde::Deserialize<'de> for $ty {
            fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
            where
                D: serde::Deserializer<'de>,
            {
                let s = String::deserialize(deserializer)?;
                $ctor(&s).map_err(serde::de::Error::custom)
            }
        }

        impl<'s> utoipa::ToSchema<'s> for $ty {
            fn schema() -> (
                &'s str,
                utoipa::openapi::RefOr<utoipa::openapi::schema::Schema>,
            ) {
                (
                    stringify!($ty),
                    utoipa::openapi::ObjectBuilder::new()
                        .schema_type(utoipa::openapi::SchemaType::String)
                        .description(Some($description))
                        .into(),
                )
            }
        }
    };
}

string_wrapper!(NonEmptyText, NonEmptyText::new, "Non-empty, trimmed text");
string_wrapper!(EmailAddress, EmailAddress::parse, "Lower-cased email address");
string_wrapper!(PhoneNumber, PhoneNumber::parse, "Phone number, digits with optional leading +");
string_wrapper!(PostalCode, PostalCode::parse, "Postal or PIN code");

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_non_empty_text_trims_and_rejects_blank() {
        assert_eq!(NonEmptyText::new("  Asha  ").unwrap().as_str(), "Asha");
        assert_eq!(NonEmptyText::new("   "), Err(TextError::Empty));
    }

    #[test]
    fn test_email_is_lowercased() {
        let email = EmailAddress::parse(" Front.Desk@Clinic.Example ").unwrap();
        assert_eq!(email.as_str(), "front.desk@clinic.example");
    }

    #[test]
    fn test_email_rejects_malformed_values() {
        for bad in ["", "no-at-sign", "@clinic.example", "a@b", "a@.example", "a@b@c.example"] {
            assert!(EmailAddress::parse(bad).is_err(), "{bad} should be rejected");
        }
    }

    #[test]
    fn test_phone_strips_separators() {
        let a = PhoneNumber::parse("+91 98765-43210").unwrap();
        let b = PhoneNumber::parse("+919876543210").unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_phone_rejects_letters_and_short_numbers() {
        assert!(PhoneNumber::parse("12345").is_err());
        assert!(PhoneNumber::parse("98765abc10").is_err());
    }

    #[test]
    fn test_postal_code_accepts_pin_and_postcode() {
        assert_eq!(PostalCode::parse("560001").unwrap().as_str(), "560001");
        assert_eq!(PostalCode::parse("sw1a 1aa").unwrap().as_str(), "SW1A 1AA");
        assert!(PostalCode::parse("-123").is_err());
        assert!(PostalCode::parse("12").is_err());
    }

    #[test]
    fn test_deserialize_validates() {
        let ok: Result<PhoneNumber, _> = serde_json::from_str("\"9876543210\"");
        assert!(ok.is_ok());
        let bad: Result<NonEmptyText, _> = serde_json::from_str("\"  \"");
        assert!(bad.is_err());
    }
}
