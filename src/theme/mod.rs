//! Runtime theme derivation
//!
//! Turns the tenant's hex colors into the CSS custom properties the intranet
//! UI paints with. Each source color drives a small group of properties:
//!
//! ```text
//! primary   → --primary, --primary-foreground, --ring,
//!             --sidebar-primary, --sidebar-primary-foreground
//! secondary → --secondary, --secondary-foreground
//! accent    → --accent, --accent-foreground
//! ```
//!
//! A missing or invalid color never produces a guessed value: its properties
//! land in [`ThemePatch::remove`] so the stylesheet defaults apply.

mod color;

pub use color::{hex_to_hsl, Hsl};

use crate::storage::BrokerageConfig;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt::Write;
use std::str::FromStr;

/// Light or dark color scheme
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ThemeMode {
    #[default]
    Light,
    Dark,
}

impl FromStr for ThemeMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "light" => Ok(ThemeMode::Light),
            "dark" => Ok(ThemeMode::Dark),
            other => Err(format!("Unknown theme mode: {}", other)),
        }
    }
}

/// Properties to set and properties to clear
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ThemePatch {
    pub mode: ThemeMode,
    /// Property → `"H S% L%"`
    pub set: BTreeMap<String, String>,
    /// Properties to reset to stylesheet defaults
    pub remove: Vec<String>,
}

impl ThemePatch {
    /// Render the `set` properties as a CSS rule
    pub fn to_css(&self, selector: &str) -> String {
        let mut css = format!("{} {{\n", selector);
        for (property, value) in &self.set {
            // Writing into a String cannot fail
            let _ = writeln!(css, "  {}: {};", property, value);
        }
        css.push_str("}\n");
        css
    }
}

struct Slot {
    light: fn(&BrokerageConfig) -> Option<&String>,
    dark: fn(&BrokerageConfig) -> Option<&String>,
    background: &'static [&'static str],
    foreground: &'static [&'static str],
}

fn primary(c: &BrokerageConfig) -> Option<&String> {
    c.primary_color.as_ref()
}

fn dark_primary(c: &BrokerageConfig) -> Option<&String> {
    c.dark_primary_color.as_ref()
}

fn secondary(c: &BrokerageConfig) -> Option<&String> {
    c.secondary_color.as_ref()
}

fn dark_secondary(c: &BrokerageConfig) -> Option<&String> {
    c.dark_secondary_color.as_ref()
}

fn accent(c: &BrokerageConfig) -> Option<&String> {
    c.accent_color.as_ref()
}

fn dark_accent(c: &BrokerageConfig) -> Option<&String> {
    c.dark_accent_color.as_ref()
}

const SLOTS: &[Slot] = &[
    Slot {
        light: primary,
        dark: dark_primary,
        background: &["--primary", "--ring", "--sidebar-primary"],
        foreground: &["--primary-foreground", "--sidebar-primary-foreground"],
    },
    Slot {
        light: secondary,
        dark: dark_secondary,
        background: &["--secondary"],
        foreground: &["--secondary-foreground"],
    },
    Slot {
        light: accent,
        dark: dark_accent,
        background: &["--accent"],
        foreground: &["--accent-foreground"],
    },
];

/// Derive the theme patch for `mode`
///
/// Dark mode uses the `dark_*` overrides when they are set and falls back to
/// the light colors otherwise.
pub fn derive_theme(config: &BrokerageConfig, mode: ThemeMode) -> ThemePatch {
    let mut patch = ThemePatch {
        mode,
        ..Default::default()
    };

    for slot in SLOTS {
        let light = (slot.light)(config);
        let source = match mode {
            ThemeMode::Light => light,
            ThemeMode::Dark => (slot.dark)(config)
                .filter(|hex| !hex.trim().is_empty())
                .or(light),
        };

        match source.and_then(|hex| Hsl::from_hex(hex)) {
            Some(hsl) => {
                for property in slot.background {
                    patch.set.insert(property.to_string(), hsl.to_string());
                }
                for property in slot.foreground {
                    patch
                        .set
                        .insert(property.to_string(), hsl.foreground().to_string());
                }
            }
            None => {
                if let Some(hex) = source {
                    tracing::debug!(color = %hex, "Ignoring invalid theme color");
                }
                patch
                    .remove
                    .extend(slot.background.iter().chain(slot.foreground).map(|p| p.to_string()));
            }
        }
    }

    patch
}
