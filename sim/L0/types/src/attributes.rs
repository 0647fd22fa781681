//! Flat key/value attribute sets.
//!
//! Every configurable object is created from a set of named attributes whose
//! values are strings on the wire. This module provides the typed accessors
//! used when consuming an attribute set and the writers used when exporting
//! one again.
//!
//! Floating point values are written with Rust's shortest round-trip
//! formatting, so exporting and re-importing an object is bit-exact.

use std::collections::BTreeMap;

use crate::{Result, SimError};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Attribute holding the object identity.
pub const ID: &str = "ID";

/// Attribute holding the object type tag.
pub const TYPE: &str = "Type";

/// An ordered set of string attributes.
///
/// # Example
///
/// ```
/// use sim_types::Attributes;
///
/// let attributes = Attributes::new()
///     .with("ID", "cpg")
///     .with("Durations", "0.5 0.5");
///
/// assert_eq!(attributes.name(), "cpg");
/// assert_eq!(attributes.required_f64_list("Durations").unwrap(), vec![0.5, 0.5]);
/// assert!(attributes.required("Values").is_err());
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Attributes {
    map: BTreeMap<String, String>,
}

impl Attributes {
    /// Create an empty attribute set.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an attribute (builder style).
    #[must_use]
    pub fn with(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.set(key, value);
        self
    }

    /// The object ID, or an empty string if none is set.
    #[must_use]
    pub fn name(&self) -> &str {
        self.get(ID).unwrap_or("")
    }

    /// Number of attributes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.map.len()
    }

    /// Check if there are no attributes.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    /// Iterate over `(key, value)` pairs in key order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.map.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Remove every attribute.
    pub fn clear(&mut self) {
        self.map.clear();
    }

    /// Check if an attribute is present.
    #[must_use]
    pub fn contains(&self, key: &str) -> bool {
        self.map.contains_key(key)
    }

    /// Raw attribute text, if present.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&str> {
        self.map.get(key).map(String::as_str)
    }

    // ------------------------------------------------------------------------
    // Readers
    // ------------------------------------------------------------------------

    /// Raw attribute text; missing is an error.
    pub fn required(&self, key: &str) -> Result<&str> {
        self.get(key)
            .ok_or_else(|| SimError::missing(self.name(), key))
    }

    /// A required floating point attribute.
    pub fn required_f64(&self, key: &str) -> Result<f64> {
        let text = self.required(key)?;
        parse_f64(self.name(), key, text)
    }

    /// An optional floating point attribute.
    pub fn optional_f64(&self, key: &str) -> Result<Option<f64>> {
        self.get(key)
            .map(|text| parse_f64(self.name(), key, text))
            .transpose()
    }

    /// A required non-negative integer attribute.
    pub fn required_usize(&self, key: &str) -> Result<usize> {
        let text = self.required(key)?;
        text.trim().parse::<usize>().map_err(|_| {
            SimError::invalid(self.name(), key, text, "expected a non-negative integer")
        })
    }

    /// A required whitespace separated list of floats.
    pub fn required_f64_list(&self, key: &str) -> Result<Vec<f64>> {
        let text = self.required(key)?;
        parse_f64_list(self.name(), key, text)
    }

    /// An optional whitespace separated list of floats.
    pub fn optional_f64_list(&self, key: &str) -> Result<Option<Vec<f64>>> {
        self.get(key)
            .map(|text| parse_f64_list(self.name(), key, text))
            .transpose()
    }

    /// A required list of exactly `N` floats.
    pub fn required_f64_array<const N: usize>(&self, key: &str) -> Result<[f64; N]> {
        let text = self.required(key)?;
        self.to_array(key, text)
    }

    /// An optional list of exactly `N` floats.
    pub fn optional_f64_array<const N: usize>(&self, key: &str) -> Result<Option<[f64; N]>> {
        self.get(key).map(|text| self.to_array(key, text)).transpose()
    }

    /// A required whitespace separated list of names.
    pub fn required_names(&self, key: &str) -> Result<Vec<String>> {
        Ok(self
            .required(key)?
            .split_whitespace()
            .map(str::to_string)
            .collect())
    }

    /// An optional whitespace separated list of names (empty if absent).
    #[must_use]
    pub fn optional_names(&self, key: &str) -> Vec<String> {
        self.get(key)
            .map(|text| text.split_whitespace().map(str::to_string).collect())
            .unwrap_or_default()
    }

    /// An optional boolean attribute.
    ///
    /// Accepts `true`/`false` in any case and the numbers `1`/`0`.
    pub fn optional_bool(&self, key: &str) -> Result<Option<bool>> {
        self.get(key)
            .map(|text| parse_bool(self.name(), key, text))
            .transpose()
    }

    fn to_array<const N: usize>(&self, key: &str, text: &str) -> Result<[f64; N]> {
        let values = parse_f64_list(self.name(), key, text)?;
        <[f64; N]>::try_from(values.as_slice()).map_err(|_| {
            SimError::invalid(
                self.name(),
                key,
                text,
                format!("expected {N} values, got {}", values.len()),
            )
        })
    }

    // ------------------------------------------------------------------------
    // Writers
    // ------------------------------------------------------------------------

    /// Set an attribute, replacing any previous value.
    pub fn set(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.map.insert(key.into(), value.into());
    }

    /// Set a floating point attribute.
    pub fn set_f64(&mut self, key: impl Into<String>, value: f64) {
        self.set(key, format_f64(value));
    }

    /// Set a list of floats.
    pub fn set_f64_list(&mut self, key: impl Into<String>, values: &[f64]) {
        let text = values
            .iter()
            .map(|v| format_f64(*v))
            .collect::<Vec<_>>()
            .join(" ");
        self.set(key, text);
    }

    /// Set a boolean attribute.
    pub fn set_bool(&mut self, key: impl Into<String>, value: bool) {
        self.set(key, if value { "true" } else { "false" });
    }

    /// Set a list of names.
    pub fn set_names<'a>(&mut self, key: impl Into<String>, names: impl IntoIterator<Item = &'a str>) {
        let text = names.into_iter().collect::<Vec<_>>().join(" ");
        self.set(key, text);
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for Attributes {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self {
            map: iter
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }
}

/// Shortest text that parses back to exactly `value`.
#[must_use]
pub fn format_f64(value: f64) -> String {
    format!("{value}")
}

fn parse_f64(object: &str, key: &str, text: &str) -> Result<f64> {
    text.trim()
        .parse::<f64>()
        .map_err(|_| SimError::invalid(object, key, text, "expected a number"))
}

fn parse_f64_list(object: &str, key: &str, text: &str) -> Result<Vec<f64>> {
    text.split_whitespace()
        .map(|part| {
            part.parse::<f64>()
                .map_err(|_| SimError::invalid(object, key, text, format!("invalid number {part}")))
        })
        .collect()
}

fn parse_bool(object: &str, key: &str, text: &str) -> Result<bool> {
    match text.trim().to_ascii_lowercase().as_str() {
        "true" | "1" => Ok(true),
        "false" | "0" => Ok(false),
        _ => Err(SimError::invalid(object, key, text, "expected true or false")),
    }
}
