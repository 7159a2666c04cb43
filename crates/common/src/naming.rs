//! Values-tree key conversion (§3): each enabled module owns a top-level key
//! equal to its camel-cased name, so a filesystem-derived `cert-manager`
//! reads back as `certManager` in the merged document.

use heck::ToLowerCamelCase;

pub fn module_values_key(module: &str) -> String {
    module.to_lower_camel_case()
}
