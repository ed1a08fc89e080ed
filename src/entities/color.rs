//! RGB/HSV helpers for channel, label and shadow colors.
//!
//! HSV components use the 0..360 / 0..255 / 0..255 ranges of the color
//! pickers the palettes were tuned with.

use serde::{Deserialize, Serialize};

/// Number of distinguishable base hues for channel colors
const CHANNEL_HUES: usize = 10;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Rgb {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl Rgb {
    pub const RED: Rgb = Rgb::new(255, 0, 0);
    pub const GREY: Rgb = Rgb::new(128, 128, 128);
    pub const BLACK: Rgb = Rgb::new(0, 0, 0);

    pub const fn new(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b }
    }

    pub fn from_hsv(h: f32, s: f32, v: f32) -> Self {
        hsv_to_rgb(h, s / 255.0, v / 255.0)
    }

    /// (h 0..360, s 0..255, v 0..255)
    pub fn to_hsv(&self) -> (f32, f32, f32) {
        let r = self.r as f32 / 255.0;
        let g = self.g as f32 / 255.0;
        let b = self.b as f32 / 255.0;
        let max = r.max(g).max(b);
        let min = r.min(g).min(b);
        let delta = max - min;

        let h = if delta == 0.0 {
            0.0
        } else if max == r {
            60.0 * (((g - b) / delta).rem_euclid(6.0))
        } else if max == g {
            60.0 * ((b - r) / delta + 2.0)
        } else {
            60.0 * ((r - g) / delta + 4.0)
        };
        let s = if max == 0.0 { 0.0 } else { delta / max };
        (h, s * 255.0, max * 255.0)
    }

    /// Same hue with saturation and value scaled.
    pub fn scaled(&self, sat: f32, val: f32) -> Self {
        let (h, s, v) = self.to_hsv();
        Rgb::from_hsv(h, (s * sat).min(255.0), (v * val).min(255.0))
    }

    /// Desaturated, darker variant used for shadow tabs.
    pub fn shadow(&self) -> Self {
        self.scaled(0.5, 0.7)
    }

    /// Light variant used for plot span fills.
    pub fn visualization(&self) -> Self {
        self.scaled(0.3, 1.0)
    }
}

fn hsv_to_rgb(h: f32, s: f32, v: f32) -> Rgb {
    let c = v * s;
    let h_prime = h.rem_euclid(360.0) / 60.0;
    let x = c * (1.0 - ((h_prime % 2.0) - 1.0).abs());
    let m = v - c;

    let (r, g, b) = if h_prime < 1.0 {
        (c, x, 0.0)
    } else if h_prime < 2.0 {
        (x, c, 0.0)
    } else if h_prime < 3.0 {
        (0.0, c, x)
    } else if h_prime < 4.0 {
        (0.0, x, c)
    } else if h_prime < 5.0 {
        (x, 0.0, c)
    } else {
        (c, 0.0, x)
    };

    Rgb::new(
        ((r + m) * 255.0).round() as u8,
        ((g + m) * 255.0).round() as u8,
        ((b + m) * 255.0).round() as u8,
    )
}

/// Colors for `n` channels: 10 hues, brightness shades within each hue.
pub fn channel_colors(n: usize) -> Vec<Rgb> {
    let shades = n.div_ceil(CHANNEL_HUES).max(1);
    (0..n)
        .map(|i| {
            let hue = 360.0 * (i / shades) as f32 / CHANNEL_HUES as f32;
            let value = 64.0 + 192.0 * (i % shades) as f32 / shades as f32;
            Rgb::from_hsv(hue, 255.0, value)
        })
        .collect()
}

/// Evenly spaced hues at fixed saturation/value, one per label class.
pub fn display_colors(n: usize, saturation: f32, value: f32) -> Vec<Rgb> {
    (0..n)
        .map(|i| Rgb::from_hsv((360.0 * i as f32 / n as f32).round(), saturation, value))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_primary_hues() {
        assert_eq!(Rgb::from_hsv(0.0, 255.0, 255.0), Rgb::RED);
        assert_eq!(Rgb::from_hsv(120.0, 255.0, 255.0), Rgb::new(0, 255, 0));
        assert_eq!(Rgb::from_hsv(240.0, 255.0, 255.0), Rgb::new(0, 0, 255));
    }

    #[test]
    fn test_shadow_is_paler_and_darker() {
        let shadow = Rgb::RED.shadow();
        let (h, s, v) = shadow.to_hsv();
        assert!(h.abs() < 1.0);
        assert!((s - 127.5).abs() < 2.0);
        assert!((v - 178.5).abs() < 2.0);
    }

    #[test]
    fn test_channel_colors_group_shades_by_hue() {
        let colors = channel_colors(20);
        assert_eq!(colors.len(), 20);
        // two shades per hue: first pair is red at two brightness levels
        let (h0, _, v0) = colors[0].to_hsv();
        let (h1, _, v1) = colors[1].to_hsv();
        assert!(h0.abs() < 1.0 && h1.abs() < 1.0);
        assert!(v1 > v0);
        let (h2, _, _) = colors[2].to_hsv();
        assert!((h2 - 36.0).abs() < 2.0);
    }

    #[test]
    fn test_display_colors_distinct() {
        let colors = display_colors(4, 100.0, 180.0);
        assert_eq!(colors.len(), 4);
        for i in 0..4 {
            for j in (i + 1)..4 {
                assert_ne!(colors[i], colors[j]);
            }
        }
    }
}
