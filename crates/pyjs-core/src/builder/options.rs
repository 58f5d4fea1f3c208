//! Deterministic `./configure` argument lists.

use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;

/// Flags, `--key=value` options and trailing `VAR=value` assignments for `./configure`.
///
/// Everything is kept sorted, so the rendered command line does not depend
/// on the order options were added in.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConfigureOptions {
    flags: BTreeSet<String>,
    options: BTreeMap<String, String>,
    vars: BTreeMap<String, String>,
}

impl ConfigureOptions {
    /// Empty option set.
    pub fn new() -> Self {
        Self::default()
    }

    /// `--<flag>`, with underscores rendered as dashes.
    pub fn flag(mut self, flag: &str) -> Self {
        self.flags.insert(flag.to_string());
        self
    }

    /// `--<key>=<value>`, with underscores in the key rendered as dashes.
    pub fn option(mut self, key: &str, value: impl Into<String>) -> Self {
        self.options.insert(key.to_string(), value.into());
        self
    }

    /// Path-valued option.
    pub fn option_path(self, key: &str, value: &Path) -> Self {
        self.option(key, value.to_string_lossy())
    }

    /// `<KEY>=<value>` passed as a trailing argument.
    pub fn var(mut self, key: &str, value: impl Into<String>) -> Self {
        self.vars.insert(key.to_string(), value.into());
        self
    }

    /// Merge `other` into `self`; `other` wins on conflicting keys.
    pub fn union(mut self, other: Self) -> Self {
        self.flags.extend(other.flags);
        self.options.extend(other.options);
        self.vars.extend(other.vars);
        self
    }

    /// True if `flag` is set.
    pub fn has_flag(&self, flag: &str) -> bool {
        self.flags.contains(flag)
    }

    /// Value of `key`, if set.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.options.get(key).map(String::as_str)
    }

    /// Arguments in their final order.
    pub fn render(&self) -> Vec<String> {
        let flags = self.flags.iter().map(|f| format!("--{}", f.replace('_', "-")));
        let options = self
            .options
            .iter()
            .map(|(k, v)| format!("--{}={v}", k.replace('_', "-")));
        let vars = self.vars.iter().map(|(k, v)| format!("{k}={v}"));
        flags.chain(options).chain(vars).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render_is_sorted_and_dashed() {
        let opts = ConfigureOptions::new()
            .flag("without_ensurepip")
            .flag("enable_ipv6")
            .option("with_openssl", "/b/lib/openssl")
            .option("prefix", "/b/lib/python-shared")
            .var("ac_cv_lib_intl_textdomain", "no");

        assert_eq!(
            opts.render(),
            vec![
                "--enable-ipv6",
                "--without-ensurepip",
                "--prefix=/b/lib/python-shared",
                "--with-openssl=/b/lib/openssl",
                "ac_cv_lib_intl_textdomain=no",
            ]
        );
    }

    #[test]
    fn test_union_is_order_independent() {
        let a = ConfigureOptions::new().flag("with_lto").option("prefix", "/a");
        let b = ConfigureOptions::new().flag("enable_shared").flag("with_lto");

        let ab = a.clone().union(b.clone());
        let ba = b.union(a);
        assert_eq!(ab.render(), ba.render());
        assert!(ab.has_flag("enable_shared"));
        assert_eq!(ab.get("prefix"), Some("/a"));
    }
}
