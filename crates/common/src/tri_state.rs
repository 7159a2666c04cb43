use std::fmt;
use std::str::FromStr;

/// A three-valued enablement flag: deliberately not a `bool` or `Option<bool>`
/// so every merge site must name its fallback explicitly.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TriState {
    #[default]
    Unset,
    True,
    False,
}

impl TriState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Unset => "unset",
            Self::True => "true",
            Self::False => "false",
        }
    }

    pub fn parse_insensitive(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "unset" | "" => Some(Self::Unset),
            "true" | "yes" | "1" => Some(Self::True),
            "false" | "no" | "0" => Some(Self::False),
            _ => None,
        }
    }

    pub fn from_bool(value: bool) -> Self {
        if value {
            Self::True
        } else {
            Self::False
        }
    }

    /// Resolve to a plain bool, defaulting unset values to `false`.
    pub fn resolve(&self) -> bool {
        matches!(self, Self::True)
    }

    /// Merge a higher-precedence layer's value over this one: the later
    /// layer wins unless it is `Unset`, in which case the lower layer stands.
    pub fn merge(self, later: TriState) -> TriState {
        match later {
            TriState::Unset => self,
            other => other,
        }
    }
}

impl FromStr for TriState {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        Self::parse_insensitive(value).ok_or_else(|| format!("invalid tri-state value: {value}"))
    }
}

impl fmt::Display for TriState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl<'de> serde::Deserialize<'de> for TriState {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        // `enabled:` is frequently omitted entirely, so accept a missing
        // or null value as Unset alongside the string encoding.
        let raw = Option::<String>::deserialize(deserializer)?;
        match raw {
            None => Ok(Self::Unset),
            Some(raw) => raw.parse().map_err(serde::de::Error::custom),
        }
    }
}

impl serde::Serialize for TriState {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_variants_case_insensitively() {
        for value in ["true", "TRUE", "yes", "1"] {
            assert_eq!(value.parse::<TriState>().unwrap(), TriState::True);
        }
        for value in ["false", "FALSE", "no", "0"] {
            assert_eq!(value.parse::<TriState>().unwrap(), TriState::False);
        }
        assert_eq!("".parse::<TriState>().unwrap(), TriState::Unset);
    }

    #[test]
    fn rejects_unknown_values() {
        assert!("maybe".parse::<TriState>().is_err());
    }

    #[test]
    fn merge_later_unset_keeps_earlier() {
        assert_eq!(TriState::True.merge(TriState::Unset), TriState::True);
        assert_eq!(TriState::True.merge(TriState::False), TriState::False);
        assert_eq!(TriState::Unset.merge(TriState::Unset), TriState::Unset);
    }

    #[test]
    fn resolve_defaults_unset_to_false() {
        assert!(!TriState::Unset.resolve());
        assert!(TriState::True.resolve());
        assert!(!TriState::False.resolve());
    }

    #[test]
    fn default_is_unset() {
        assert_eq!(TriState::default(), TriState::Unset);
    }
}
