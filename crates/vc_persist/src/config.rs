use serde::{Deserialize, Serialize};

// -----------------------------------------------------------------------------
// Culture

/// Formatting conventions applied to literals by text backends.
///
/// Only the XML backend consults it (the decimal separator of floats);
/// JSON numbers and binary literals are culture independent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Culture {
    /// Display name, e.g. `"de-DE"`. Empty for the invariant culture.
    pub name: String,
    pub decimal_separator: char,
}

impl Culture {
    /// The invariant culture: `.` as decimal separator.
    #[inline]
    pub fn invariant() -> Self {
        Self {
            name: String::new(),
            decimal_separator: '.',
        }
    }

    #[inline]
    pub fn new(name: impl Into<String>, decimal_separator: char) -> Self {
        Self {
            name: name.into(),
            decimal_separator,
        }
    }

    /// Formats a float with this culture's decimal separator.
    ///
    /// Non-finite values are spelled `NaN`, `Infinity` and `-Infinity`.
    pub fn format_float(&self, value: f64) -> String {
        if value.is_nan() {
            "NaN".to_owned()
        } else if value.is_infinite() {
            if value > 0.0 { "Infinity" } else { "-Infinity" }.to_owned()
        } else if self.decimal_separator == '.' {
            value.to_string()
        } else {
            value
                .to_string()
                .replace('.', self.decimal_separator.encode_utf8(&mut [0; 4]))
        }
    }

    /// Parses a float written by [`Culture::format_float`].
    pub fn parse_float(&self, text: &str) -> Option<f64> {
        match text.trim() {
            "NaN" => Some(f64::NAN),
            "Infinity" => Some(f64::INFINITY),
            "-Infinity" => Some(f64::NEG_INFINITY),
            text if self.decimal_separator == '.' => text.parse().ok(),
            text => text.replace(self.decimal_separator, ".").parse().ok(),
        }
    }
}

impl Default for Culture {
    #[inline]
    fn default() -> Self {
        Self::invariant()
    }
}

// -----------------------------------------------------------------------------
// UnresolvedTypePolicy

/// What deserialization does with an object whose recorded type matches no
/// registered model, not even through a redirect.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UnresolvedTypePolicy {
    /// Fail the whole call with `Error::TypeResolution`.
    #[default]
    Fail,
    /// Skip the object's content and deserialize the member as null.
    SkipAsNull,
}

// -----------------------------------------------------------------------------
// SerializationConfig

/// Options of one serialization or deserialization call.
///
/// Every field has a default, so partial documents can be loaded with any
/// serde format:
///
/// ```
/// # use vc_persist::SerializationConfig;
/// let config: SerializationConfig =
///     serde_json::from_str(r#"{ "preserve_graph": false, "max_depth": 8 }"#).unwrap();
///
/// assert!(!config.preserve_graph);
/// assert_eq!(config.max_depth, 8);
/// assert!(config.allow_unknown_members);
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SerializationConfig {
    pub culture: Culture,
    /// Encode shared and cyclic references as back-references instead of
    /// duplicating them (cycles fail when disabled).
    pub preserve_graph: bool,
    /// Skip input members the target type does not declare.
    pub allow_unknown_members: bool,
    /// Fail when a declared member is absent from the input.
    pub require_all_members: bool,
    /// Maximum nesting of objects and collections.
    pub max_depth: usize,
    pub unresolved_types: UnresolvedTypePolicy,
}

impl SerializationConfig {
    pub const DEFAULT_MAX_DEPTH: usize = 128;

    #[inline]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_culture(mut self, culture: Culture) -> Self {
        self.culture = culture;
        self
    }

    #[must_use]
    pub fn with_preserve_graph(mut self, preserve_graph: bool) -> Self {
        self.preserve_graph = preserve_graph;
        self
    }

    #[must_use]
    pub fn with_allow_unknown_members(mut self, allow: bool) -> Self {
        self.allow_unknown_members = allow;
        self
    }

    #[must_use]
    pub fn with_require_all_members(mut self, require: bool) -> Self {
        self.require_all_members = require;
        self
    }

    #[must_use]
    pub fn with_max_depth(mut self, max_depth: usize) -> Self {
        self.max_depth = max_depth;
        self
    }

    #[must_use]
    pub fn with_unresolved_types(mut self, policy: UnresolvedTypePolicy) -> Self {
        self.unresolved_types = policy;
        self
    }
}

impl Default for SerializationConfig {
    fn default() -> Self {
        Self {
            culture: Culture::invariant(),
            preserve_graph: true,
            allow_unknown_members: true,
            require_all_members: false,
            max_depth: Self::DEFAULT_MAX_DEPTH,
            unresolved_types: UnresolvedTypePolicy::Fail,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{Culture, SerializationConfig, UnresolvedTypePolicy};

    #[test]
    fn load_from_ron() {
        let input = r#"(
            culture: (name: "de-DE", decimal_separator: ','),
            preserve_graph: false,
            unresolved_types: skip_as_null,
        )"#;

        let config: SerializationConfig = ron::from_str(input).unwrap();

        assert_eq!(config.culture, Culture::new("de-DE", ','));
        assert!(!config.preserve_graph);
        assert_eq!(config.unresolved_types, UnresolvedTypePolicy::SkipAsNull);
        assert_eq!(config.max_depth, SerializationConfig::DEFAULT_MAX_DEPTH);
    }

    #[test]
    fn culture_float_text() {
        let culture = Culture::new("de-DE", ',');
        assert_eq!(culture.format_float(2.5), "2,5");
        assert_eq!(culture.parse_float("2,5"), Some(2.5));
        assert_eq!(Culture::invariant().parse_float(" 0.25 "), Some(0.25));
        assert_eq!(culture.parse_float("abc"), None);

        for value in [f64::INFINITY, f64::NEG_INFINITY, -1250.125] {
            assert_eq!(culture.parse_float(&culture.format_float(value)), Some(value));
        }
        assert!(culture.parse_float(&culture.format_float(f64::NAN)).unwrap().is_nan());
    }
}
