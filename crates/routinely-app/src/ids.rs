// Copyright 2026 Phillip Cloud
// Licensed under the Apache License, Version 2.0

use serde::{Deserialize, Serialize};
use std::fmt;

macro_rules! counter_id {
    ($name:ident) => {
        #[derive(
            Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
        )]
        pub struct $name(u64);

        impl $name {
            pub const fn new(value: u64) -> Self {
                Self(value)
            }

            pub const fn get(self) -> u64 {
                self.0
            }
        }

        impl From<u64> for $name {
            fn from(value: u64) -> Self {
                Self(value)
            }
        }
    };
}

counter_id!(BubbleId);
counter_id!(RequestId);

/// Catalog identifier. Catalog files may carry ids as JSON strings or
/// numbers; both normalize to the same textual id so `7` and `"7"` match.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(from = "RawProductId", into = "String")]
pub struct ProductId(String);

impl ProductId {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into().trim().to_owned())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ProductId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ProductId {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<i64> for ProductId {
    fn from(value: i64) -> Self {
        Self(value.to_string())
    }
}

impl From<ProductId> for String {
    fn from(value: ProductId) -> Self {
        value.0
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RawProductId {
    Text(String),
    Integer(i64),
    Unsigned(u64),
    Float(f64),
    Flag(bool),
}

impl From<RawProductId> for ProductId {
    fn from(value: RawProductId) -> Self {
        match value {
            RawProductId::Text(text) => Self::new(text),
            RawProductId::Integer(number) => Self::from(number),
            RawProductId::Unsigned(number) => Self(number.to_string()),
            // 7.0 prints as "7", so it matches the integer id.
            RawProductId::Float(number) => Self(number.to_string()),
            RawProductId::Flag(flag) => Self(flag.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::ProductId;

    #[test]
    fn numeric_and_text_ids_compare_equal() {
        assert_eq!(ProductId::from(7), ProductId::from("7"));
        assert_eq!(ProductId::new(" 12 "), ProductId::from(12));
    }

    #[test]
    fn any_scalar_json_id_is_accepted() -> Result<(), serde_json::Error> {
        let ids: Vec<ProductId> =
            serde_json::from_str(r#"["a-1", 7, 18446744073709551615, 2.5, 7.0, true]"#)?;
        let texts: Vec<&str> = ids.iter().map(ProductId::as_str).collect();
        assert_eq!(
            texts,
            ["a-1", "7", "18446744073709551615", "2.5", "7", "true"]
        );
        assert_eq!(ids[4], ProductId::from(7));
        Ok(())
    }
}
