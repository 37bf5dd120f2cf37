//! Value Objects - Immutable domain primitives
//!
//! Value objects are identified by their value rather than identity.
//! They are immutable and can be freely shared.

use serde::Deserialize;
use std::fmt;

/// Remote lookup provider.
///
/// Selects which [`BackendStrategy`](crate::domain::ports::BackendStrategy)
/// builds requests and parses responses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    /// Google Input Tools
    Google,
    /// Baidu online IME
    Baidu,
}

impl BackendKind {
    /// Parse a backend name (case-insensitive).
    ///
    /// # Examples
    /// ```
    /// use cloud_pinyin::domain::BackendKind;
    ///
    /// assert_eq!(BackendKind::from_name("Baidu"), Some(BackendKind::Baidu));
    /// assert_eq!(BackendKind::from_name("bing"), None);
    /// ```
    pub fn from_name(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "google" => Some(Self::Google),
            "baidu" => Some(Self::Baidu),
            _ => None,
        }
    }

    /// Convert to string representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Google => "google",
            Self::Baidu => "baidu",
        }
    }
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Errors produced while parsing a [`Hotkey`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum HotkeyError {
    #[error("hotkey is empty")]
    Empty,
    #[error("hotkey has no key after modifiers")]
    MissingKey,
    #[error("unknown modifier `{0}`")]
    UnknownModifier(String),
}

/// A key combination such as `Control+Alt+Shift+C`.
///
/// Used for the feature toggle and the manual error reset. Modifier names
/// are case-insensitive (`ctrl` is accepted for `Control`); the key itself
/// is compared case-insensitively as well.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, Deserialize)]
#[serde(try_from = "String")]
pub struct Hotkey {
    pub control: bool,
    pub alt: bool,
    pub shift: bool,
    pub super_key: bool,
    /// Upper-cased key name
    pub key: String,
}

impl Hotkey {
    /// Parse a `+`-separated key combination.
    pub fn parse(s: &str) -> Result<Self, HotkeyError> {
        let s = s.trim();
        if s.is_empty() {
            return Err(HotkeyError::Empty);
        }

        let mut parts: Vec<&str> = s.split('+').map(str::trim).collect();
        let key = parts.pop().filter(|k| !k.is_empty()).ok_or(HotkeyError::MissingKey)?;

        let mut hotkey = Hotkey {
            key: key.to_uppercase(),
            ..Default::default()
        };
        for modifier in parts {
            match modifier.to_lowercase().as_str() {
                "control" | "ctrl" => hotkey.control = true,
                "alt" => hotkey.alt = true,
                "shift" => hotkey.shift = true,
                "super" => hotkey.super_key = true,
                _ => return Err(HotkeyError::UnknownModifier(modifier.to_string())),
            }
        }

        Ok(hotkey)
    }

    /// Check whether typed text names this key combination.
    pub fn matches(&self, text: &str) -> bool {
        Self::parse(text).map(|other| other == *self).unwrap_or(false)
    }
}

impl TryFrom<String> for Hotkey {
    type Error = HotkeyError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl fmt::Display for Hotkey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.control {
            f.write_str("Control+")?;
        }
        if self.alt {
            f.write_str("Alt+")?;
        }
        if self.shift {
            f.write_str("Shift+")?;
        }
        if self.super_key {
            f.write_str("Super+")?;
        }
        f.write_str(&self.key)
    }
}
