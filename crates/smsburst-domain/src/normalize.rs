//! Key normalization.
//!
//! Raw originator identifiers arrive in whatever format the provider uses.
//! A [`KeyNormalizer`] maps them to the canonical key used for grouping, so
//! that `+63 912 345 6789` and `09123456789` land in the same window.
//! Normalizers must be pure: the same input always yields the same key.

use std::fmt;

/// Maps a raw identifier to the grouping key.
pub trait KeyNormalizer: Send + Sync + fmt::Debug {
    fn normalize(&self, raw: &str) -> String;
}

/// Uses the identifier as given, minus surrounding whitespace.
#[derive(Debug, Clone, Copy, Default)]
pub struct IdentityNormalizer;

impl KeyNormalizer for IdentityNormalizer {
    fn normalize(&self, raw: &str) -> String {
        raw.trim().to_string()
    }
}

/// Adapts any pure function into a [`KeyNormalizer`].
pub struct FnNormalizer<F> {
    name: &'static str,
    f: F,
}

impl<F> FnNormalizer<F>
where
    F: Fn(&str) -> String + Send + Sync,
{
    pub fn new(name: &'static str, f: F) -> Self {
        Self { name, f }
    }
}

impl<F> fmt::Debug for FnNormalizer<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("FnNormalizer").field(&self.name).finish()
    }
}

impl<F> KeyNormalizer for FnNormalizer<F>
where
    F: Fn(&str) -> String + Send + Sync,
{
    fn normalize(&self, raw: &str) -> String {
        (self.f)(raw)
    }
}

/// Default international prefix rewritten by [`PhoneNumberNormalizer`].
pub const DEFAULT_COUNTRY_PREFIX: &str = "+63";
/// Default national trunk prefix substituted for the country prefix.
pub const DEFAULT_TRUNK_PREFIX: &str = "0";

/// Canonicalizes phone numbers to national format.
///
/// Formatting characters (spaces, dashes, dots, parentheses) are dropped and
/// a leading country prefix is replaced by the trunk prefix. With the
/// defaults, `+63 912-345-6789` becomes `09123456789`. Numbers with a
/// different country prefix keep their international form.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PhoneNumberNormalizer {
    country_prefix: String,
    trunk_prefix: String,
}

impl PhoneNumberNormalizer {
    pub fn new(country_prefix: impl Into<String>, trunk_prefix: impl Into<String>) -> Self {
        Self {
            country_prefix: strip_formatting(&country_prefix.into()),
            trunk_prefix: trunk_prefix.into(),
        }
    }

    pub fn country_prefix(&self) -> &str {
        &self.country_prefix
    }

    pub fn trunk_prefix(&self) -> &str {
        &self.trunk_prefix
    }
}

impl Default for PhoneNumberNormalizer {
    fn default() -> Self {
        Self::new(DEFAULT_COUNTRY_PREFIX, DEFAULT_TRUNK_PREFIX)
    }
}

impl KeyNormalizer for PhoneNumberNormalizer {
    fn normalize(&self, raw: &str) -> String {
        let digits = strip_formatting(raw);
        if self.country_prefix.is_empty() {
            return digits;
        }
        match digits.strip_prefix(&self.country_prefix) {
            Some(national) if !national.is_empty() => format!("{}{}", self.trunk_prefix, national),
            _ => digits,
        }
    }
}

fn strip_formatting(raw: &str) -> String {
    raw.chars()
        .filter(|c| !c.is_whitespace() && !matches!(c, '-' | '.' | '(' | ')'))
        .collect()
}
