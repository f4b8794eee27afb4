//! Hex → HSL conversion
//!
//! CSS custom properties hold colors as bare `"H S% L%"` triples so they can
//! be wrapped in `hsl(var(--primary))`.

use std::fmt;

/// A color in HSL space, rounded to whole numbers
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Hsl {
    /// Hue in degrees, `0..360`
    pub h: u16,
    /// Saturation percentage, `0..=100`
    pub s: u8,
    /// Lightness percentage, `0..=100`
    pub l: u8,
}

impl Hsl {
    /// Parse `#RRGGBB` or `RRGGBB`; anything else is `None`
    pub fn from_hex(hex: &str) -> Option<Self> {
        let digits = hex.trim().strip_prefix('#').unwrap_or(hex.trim());
        if digits.len() != 6 || !digits.chars().all(|c| c.is_ascii_hexdigit()) {
            return None;
        }

        let channel = |i: usize| -> Option<f64> {
            u8::from_str_radix(&digits[i..i + 2], 16)
                .ok()
                .map(|v| f64::from(v) / 255.0)
        };
        Some(Self::from_rgb(channel(0)?, channel(2)?, channel(4)?))
    }

    /// Convert RGB channels in `[0, 1]`
    pub fn from_rgb(r: f64, g: f64, b: f64) -> Self {
        let max = r.max(g).max(b);
        let min = r.min(g).min(b);
        let l = (max + min) / 2.0;

        if max == min {
            return Self {
                h: 0,
                s: 0,
                l: percent(l),
            };
        }

        let d = max - min;
        let s = if l > 0.5 {
            d / (2.0 - max - min)
        } else {
            d / (max + min)
        };

        let h = if max == r {
            (g - b) / d + if g < b { 6.0 } else { 0.0 }
        } else if max == g {
            (b - r) / d + 2.0
        } else {
            (r - g) / d + 4.0
        };

        Self {
            h: ((h * 60.0).round() as u16) % 360,
            s: percent(s),
            l: percent(l),
        }
    }

    /// Near-black or near-white text color that reads on this background
    pub fn foreground(&self) -> &'static str {
        if self.l > 55 {
            "0 0% 9%"
        } else {
            "0 0% 98%"
        }
    }
}

fn percent(v: f64) -> u8 {
    (v * 100.0).round().clamp(0.0, 100.0) as u8
}

impl fmt::Display for Hsl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}% {}%", self.h, self.s, self.l)
    }
}

/// Convert a hex color to a `"H S% L%"` string
///
/// ```
/// use intranet::theme::hex_to_hsl;
///
/// assert_eq!(hex_to_hsl("#ff0000").as_deref(), Some("0 100% 50%"));
/// assert_eq!(hex_to_hsl("808080").as_deref(), Some("0 0% 50%"));
/// assert_eq!(hex_to_hsl("#fff"), None);
/// ```
pub fn hex_to_hsl(hex: &str) -> Option<String> {
    Hsl::from_hex(hex).map(|hsl| hsl.to_string())
}
