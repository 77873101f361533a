//! Deserialization helpers for the configuration file

use serde::{de, Deserializer};
use std::fmt;

struct U128Visitor;

impl<'de> de::Visitor<'de> for U128Visitor {
    type Value = u128;

    fn expecting(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
        formatter.write_str("an unsigned integer or a decimal string")
    }

    fn visit_u64<E>(self, v: u64) -> Result<Self::Value, E>
    where
        E: de::Error,
    {
        Ok(v.into())
    }

    fn visit_u128<E>(self, v: u128) -> Result<Self::Value, E>
    where
        E: de::Error,
    {
        Ok(v)
    }

    fn visit_i64<E>(self, v: i64) -> Result<Self::Value, E>
    where
        E: de::Error,
    {
        u128::try_from(v).map_err(|_| E::invalid_value(de::Unexpected::Signed(v), &self))
    }

    fn visit_str<E>(self, v: &str) -> Result<Self::Value, E>
    where
        E: de::Error,
    {
        v.trim()
            .replace('_', "")
            .parse()
            .map_err(|_| E::invalid_value(de::Unexpected::Str(v), &self))
    }
}

/// `u128` from a TOML integer or, for values past `i64::MAX`, a string.
pub(crate) fn u128_scalar<'de, D>(d: D) -> Result<u128, D::Error>
where
    D: Deserializer<'de>,
{
    d.deserialize_any(U128Visitor)
}
