// Copyright (c) The nextest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use junit_report::StdioRetention;
use serde::{Deserialize, Deserializer, Serializer, de::Error};

/// Serializes and deserializes a [`StdioRetention`] as its string form.
pub(crate) mod stdio_retention {
    use super::*;

    pub(crate) fn serialize<S>(retention: &StdioRetention, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.collect_str(retention)
    }

    pub(crate) fn deserialize<'de, D>(deserializer: D) -> Result<StdioRetention, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(D::Error::custom)
    }
}

/// Deserializes an optional [`StdioRetention`].
pub(super) fn deserialize_opt_stdio_retention<'de, D>(
    deserializer: D,
) -> Result<Option<StdioRetention>, D::Error>
where
    D: Deserializer<'de>,
{
    let s = Option::<String>::deserialize(deserializer)?;
    s.map(|s| s.parse().map_err(D::Error::custom)).transpose()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::de::{IntoDeserializer, value::Error as ValueError};

    #[test]
    fn deserialize_retention() {
        let de: serde::de::value::StrDeserializer<'_, ValueError> = "Failed".into_deserializer();
        assert_eq!(
            stdio_retention::deserialize(de).unwrap(),
            StdioRetention::Failed
        );

        let de: serde::de::value::StrDeserializer<'_, ValueError> = "most".into_deserializer();
        let err = stdio_retention::deserialize(de).unwrap_err();
        assert!(
            err.to_string()
                .starts_with("unrecognized value for stdio-retention: most"),
            "unexpected error: {err}"
        );
    }
}
