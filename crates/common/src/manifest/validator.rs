use crate::manifest::schema::{RawModuleEntry, RawModuleSpec};
use anyhow::{anyhow, bail, Context, Result};
use once_cell::sync::Lazy;
use regex::Regex;
use serde_yaml::Value;
use std::collections::{HashMap, HashSet};

/// Module names are filesystem-derived (§3 "Identity: unique name
/// (string, filesystem-derived)"): lowercase, digits, and hyphens only, so
/// they round-trip as directory names and as camelCase values-tree keys
/// without escaping.
static MODULE_NAME_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[a-z][a-z0-9-]*$").expect("static module name pattern is valid"));

fn validate_module_name(name: &str) -> Result<()> {
    if !MODULE_NAME_PATTERN.is_match(name) {
        bail!(
            "module name `{}` is invalid: must match `{}`",
            name,
            MODULE_NAME_PATTERN.as_str()
        );
    }
    Ok(())
}

pub(crate) fn parse_module_entries(value: Value) -> Result<Vec<(String, RawModuleSpec)>> {
    let entries = match value {
        Value::Null => Vec::new(),
        Value::Sequence(entries) => entries
            .into_iter()
            .map(|entry| {
                let raw: RawModuleEntry =
                    serde_yaml::from_value(entry).context("module entry must include a name")?;
                Ok((raw.name, raw.spec))
            })
            .collect::<Result<Vec<_>>>()?,
        Value::Mapping(map) => map
            .into_iter()
            .map(|(key, value)| {
                let key = key
                    .as_str()
                    .ok_or_else(|| anyhow!("module names must be strings"))?
                    .to_string();
                let spec: RawModuleSpec = serde_yaml::from_value(value)
                    .with_context(|| format!("module `{}` is invalid", key))?;
                Ok((key, spec))
            })
            .collect::<Result<Vec<_>>>()?,
        other => bail!(
            "`modules` must be a mapping or sequence, found {:?}",
            other
        ),
    };
    for (name, _) in &entries {
        validate_module_name(name)?;
    }
    Ok(entries)
}

pub(crate) fn insert_entries(
    target: &mut HashMap<String, RawModuleSpec>,
    entries: Vec<(String, RawModuleSpec)>,
    origin: &str,
) -> Result<()> {
    let mut seen = HashSet::new();
    for (name, spec) in entries {
        if !seen.insert(name.clone()) {
            bail!("duplicate module entry `{}` in {}", name, origin);
        }
        if let Some(existing) = target.remove(&name) {
            target.insert(name, existing.merge(spec));
        } else {
            target.insert(name, spec);
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_lowercase_hyphenated_names() {
        assert!(validate_module_name("cert-manager").is_ok());
        assert!(validate_module_name("a").is_ok());
    }

    #[test]
    fn rejects_uppercase_and_leading_digit_names() {
        assert!(validate_module_name("Cert-Manager").is_err());
        assert!(validate_module_name("1module").is_err());
        assert!(validate_module_name("").is_err());
    }
}
