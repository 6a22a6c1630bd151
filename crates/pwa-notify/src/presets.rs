//! Canned notifications shown by the page buttons.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::NotifyError;

const ICON: &str = "/icon-192x192.png";

/// The four notification buttons.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NotificationKind {
    Info,
    Success,
    Warning,
    Error,
}

impl NotificationKind {
    pub const ALL: [NotificationKind; 4] = [Self::Info, Self::Success, Self::Warning, Self::Error];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Info => "info",
            Self::Success => "success",
            Self::Warning => "warning",
            Self::Error => "error",
        }
    }

    /// Capitalized name used in status messages.
    pub fn label(&self) -> &'static str {
        match self {
            Self::Info => "Info",
            Self::Success => "Success",
            Self::Warning => "Warning",
            Self::Error => "Error",
        }
    }
}

impl fmt::Display for NotificationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for NotificationKind {
    type Err = NotifyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|kind| kind.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| NotifyError::UnknownKind(s.to_string()))
    }
}

/// Display strings for one kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NotificationPreset {
    pub title: &'static str,
    pub body: &'static str,
    pub icon: &'static str,
    pub badge: Option<&'static str>,
    pub tag: Option<&'static str>,
}

/// Look up the preset for a kind name; unknown names get the generic entry.
pub fn preset_for(kind: &str) -> NotificationPreset {
    match kind {
        "info" => NotificationPreset {
            title: "Information",
            body: "This is an informational notification.",
            icon: ICON,
            badge: None,
            tag: Some("info-notification"),
        },
        "success" => NotificationPreset {
            title: "Success!",
            body: "Your action was completed successfully.",
            icon: ICON,
            badge: None,
            tag: Some("success-notification"),
        },
        "warning" => NotificationPreset {
            title: "Warning",
            body: "This is a warning notification. Please take note.",
            icon: ICON,
            badge: None,
            tag: Some("warning-notification"),
        },
        "error" => NotificationPreset {
            title: "Error",
            body: "An error occurred. Please try again.",
            icon: ICON,
            badge: None,
            tag: Some("error-notification"),
        },
        _ => NotificationPreset {
            title: "Notification",
            body: "This is a notification.",
            icon: ICON,
            badge: None,
            tag: None,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_each_kind_has_a_tagged_preset() {
        for kind in NotificationKind::ALL {
            let preset = preset_for(kind.as_str());
            assert_eq!(preset.tag, Some(format!("{kind}-notification").as_str()));
            assert_eq!(preset.icon, "/icon-192x192.png");
        }
        assert_eq!(preset_for("success").title, "Success!");
    }

    #[test]
    fn test_unknown_kind_gets_default() {
        let preset = preset_for("promo");
        assert_eq!(preset.title, "Notification");
        assert_eq!(preset.body, "This is a notification.");
        assert_eq!(preset.tag, None);
    }

    #[test]
    fn test_parse_kind() {
        assert_eq!("Warning".parse::<NotificationKind>().unwrap(), NotificationKind::Warning);
        assert!(matches!(
            "promo".parse::<NotificationKind>(),
            Err(NotifyError::UnknownKind(_))
        ));
        assert_eq!(NotificationKind::Error.label(), "Error");
    }
}
