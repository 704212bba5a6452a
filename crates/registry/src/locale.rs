//! Localized display strings with deterministic fallback to `en`.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::{RegistryError, Result};

/// Locale every accepted descriptor must carry.
pub const DEFAULT_LOCALE: &str = "en";

/// Locale code to display string.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LocalizedText(BTreeMap<String, String>);

impl LocalizedText {
    pub fn new() -> Self {
        Self::default()
    }

    /// Text that only exists in the default locale.
    pub fn single(value: impl Into<String>) -> Self {
        let mut text = Self::new();
        text.insert(DEFAULT_LOCALE, value);
        text
    }

    pub fn with(mut self, locale: impl Into<String>, value: impl Into<String>) -> Self {
        self.insert(locale, value);
        self
    }

    pub fn insert(&mut self, locale: impl Into<String>, value: impl Into<String>) {
        self.0.insert(locale.into(), value.into());
    }

    pub fn get(&self, locale: &str) -> Option<&str> {
        self.0.get(locale).map(String::as_str)
    }

    /// Whether there is a non-blank `en` value to fall back to.
    pub fn has_default(&self) -> bool {
        self.get(DEFAULT_LOCALE).is_some_and(is_displayable)
    }

    pub fn locales(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Value for `locale`, else the `en` value.
    pub fn resolve(&self, locale: &str) -> Result<&str> {
        resolve(self, locale)
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for LocalizedText {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self(
            iter.into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        )
    }
}

/// Resolve the display value of `text` for `active_locale`.
///
/// Falls back to the `en` entry when the active locale is absent or blank. A
/// map with neither is a data-integrity violation and yields
/// [`RegistryError::MissingDefaultLocale`].
pub fn resolve<'a>(text: &'a LocalizedText, active_locale: &str) -> Result<&'a str> {
    text.get(active_locale)
        .filter(|value| is_displayable(value))
        .or_else(|| text.get(DEFAULT_LOCALE).filter(|value| is_displayable(value)))
        .ok_or_else(|| RegistryError::MissingDefaultLocale {
            requested: active_locale.to_string(),
        })
}

fn is_displayable(value: &str) -> bool {
    !value.trim().is_empty()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn blog_name() -> LocalizedText {
        LocalizedText::single("Blog")
            .with("nl", "Weblog")
            .with("fr", "Le blog")
    }

    #[test]
    fn test_resolves_active_locale() {
        assert_eq!(blog_name().resolve("nl").unwrap(), "Weblog");
        assert_eq!(blog_name().resolve("en").unwrap(), "Blog");
    }

    #[test]
    fn test_falls_back_to_english() {
        for locale in ["de", "pt-br", ""] {
            assert_eq!(blog_name().resolve(locale).unwrap(), "Blog");
        }
    }

    #[test]
    fn test_missing_default_is_an_error() {
        let text = LocalizedText::new().with("nl", "Weblog");
        assert_eq!(text.resolve("nl").unwrap(), "Weblog");

        match text.resolve("de") {
            Err(RegistryError::MissingDefaultLocale { requested }) => assert_eq!(requested, "de"),
            other => panic!("expected MissingDefaultLocale, got {other:?}"),
        }
    }

    #[test]
    fn test_blank_values_never_resolve() {
        let text = LocalizedText::single("Blog").with("nl", "  ");
        assert_eq!(text.resolve("nl").unwrap(), "Blog");
        assert!(text.has_default());

        let text = LocalizedText::single("").with("nl", "Weblog");
        assert!(!text.has_default());
        assert!(matches!(
            text.resolve("de"),
            Err(RegistryError::MissingDefaultLocale { .. })
        ));
    }

    #[test]
    fn test_serializes_as_plain_map() {
        let json = serde_json::to_string(&blog_name()).unwrap();
        assert_eq!(json, r#"{"en":"Blog","fr":"Le blog","nl":"Weblog"}"#);

        let back: LocalizedText = serde_json::from_str(&json).unwrap();
        assert_eq!(back, blog_name());
    }
}
