// SPDX-License-Identifier: EUPL-1.2 OR MIT

//! Conversions between directory attribute values and Rust values.
//!
//! Directory values travel as strings. Booleans follow the LDAP syntax
//! (`TRUE` / `FALSE`), numbers use their `FromStr`/`Display` forms.

use crate::error::MemberError;

/// Parse one attribute value into a member value.
pub trait FromAttribute: Sized {
    fn from_attribute(value: &str) -> Result<Self, MemberError>;
}

/// Render a member value as an attribute value.
///
/// `None` means the member is absent and no attribute is emitted for it.
pub trait ToAttribute {
    fn to_attribute(&self) -> Option<String>;

    /// Render a value that is explicitly set, as the content of a `Some`.
    fn to_set_attribute(&self) -> Option<String> {
        self.to_attribute()
    }
}

impl FromAttribute for String {
    fn from_attribute(value: &str) -> Result<Self, MemberError> {
        Ok(value.to_owned())
    }
}

impl ToAttribute for String {
    fn to_attribute(&self) -> Option<String> {
        self.as_str().to_attribute()
    }

    fn to_set_attribute(&self) -> Option<String> {
        self.as_str().to_set_attribute()
    }
}

// A bare empty string is treated as unset; `Some(String::new())` is written
// as an empty value.
impl ToAttribute for str {
    fn to_attribute(&self) -> Option<String> {
        if self.is_empty() {
            None
        } else {
            Some(self.to_owned())
        }
    }

    fn to_set_attribute(&self) -> Option<String> {
        Some(self.to_owned())
    }
}

impl<T: ToAttribute + ?Sized> ToAttribute for &T {
    fn to_attribute(&self) -> Option<String> {
        (**self).to_attribute()
    }

    fn to_set_attribute(&self) -> Option<String> {
        (**self).to_set_attribute()
    }
}

impl<T: FromAttribute> FromAttribute for Option<T> {
    fn from_attribute(value: &str) -> Result<Self, MemberError> {
        T::from_attribute(value).map(Some)
    }
}

impl<T: ToAttribute> ToAttribute for Option<T> {
    fn to_attribute(&self) -> Option<String> {
        self.as_ref().and_then(T::to_set_attribute)
    }
}

impl FromAttribute for bool {
    fn from_attribute(value: &str) -> Result<Self, MemberError> {
        match value.trim() {
            v if v.eq_ignore_ascii_case("true") => Ok(true),
            v if v.eq_ignore_ascii_case("false") => Ok(false),
            _ => Err(MemberError::conversion(value, "bool", "expected TRUE or FALSE")),
        }
    }
}

impl ToAttribute for bool {
    fn to_attribute(&self) -> Option<String> {
        Some(if *self { "TRUE" } else { "FALSE" }.to_owned())
    }
}

macro_rules! parsed_attribute {
    ($($ty:ty),* $(,)?) => {
        $(
            impl FromAttribute for $ty {
                fn from_attribute(value: &str) -> Result<Self, MemberError> {
                    value
                        .trim()
                        .parse::<$ty>()
                        .map_err(|e| MemberError::conversion(value, stringify!($ty), e))
                }
            }

            impl ToAttribute for $ty {
                fn to_attribute(&self) -> Option<String> {
                    Some(self.to_string())
                }
            }
        )*
    };
}

parsed_attribute!(
    u8, u16, u32, u64, u128, usize, i8, i16, i32, i64, i128, isize, f32, f64,
);

// Exactly one character, whitespace included.
impl FromAttribute for char {
    fn from_attribute(value: &str) -> Result<Self, MemberError> {
        value
            .parse::<char>()
            .map_err(|e| MemberError::conversion(value, "char", e))
    }
}

impl ToAttribute for char {
    fn to_attribute(&self) -> Option<String> {
        Some(self.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("TRUE", true)]
    #[case("false", false)]
    #[case(" True ", true)]
    fn test_bool_from_attribute(#[case] input: &str, #[case] expected: bool) {
        assert_eq!(bool::from_attribute(input).unwrap(), expected);
    }

    #[test]
    fn test_bool_rejects_other_values() {
        let err = bool::from_attribute("yes").unwrap_err();
        assert!(matches!(err, MemberError::Conversion { target: "bool", .. }));
    }

    #[rstest]
    #[case("42", Some(42))]
    #[case(" 7 ", Some(7))]
    #[case("-1", None)]
    #[case("many", None)]
    fn test_u32_from_attribute(#[case] input: &str, #[case] expected: Option<u32>) {
        assert_eq!(u32::from_attribute(input).ok(), expected);
    }

    #[test]
    fn test_bare_empty_string_is_absent() {
        assert_eq!(String::new().to_attribute(), None);
        assert_eq!("".to_attribute(), None);
        assert_eq!(
            Some("jdoe".to_string()).to_attribute(),
            Some("jdoe".to_string())
        );
        assert_eq!(Option::<String>::None.to_attribute(), None);
    }

    #[test]
    fn test_some_empty_string_is_a_value() {
        assert_eq!(Some(String::new()).to_attribute(), Some(String::new()));
        assert_eq!(Some("").to_attribute(), Some(String::new()));
        assert_eq!(
            Option::<String>::from_attribute("").unwrap(),
            Some(String::new())
        );
    }

    #[rstest]
    #[case(' ')]
    #[case('x')]
    #[case('\t')]
    fn test_char_keeps_whitespace(#[case] c: char) {
        let rendered = c.to_attribute().unwrap();
        assert_eq!(char::from_attribute(&rendered).unwrap(), c);
    }

    #[test]
    fn test_char_rejects_padding() {
        assert!(char::from_attribute(" x ").is_err());
        assert!(char::from_attribute("").is_err());
    }

    #[test]
    fn test_string_keeps_value_verbatim() {
        assert_eq!(
            String::from_attribute(" cn=admin ").unwrap(),
            " cn=admin ".to_string()
        );
    }
}
