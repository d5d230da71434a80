//! ARGB node colors with brightness limiting and alpha blending

use serde::{Deserialize, Serialize};
use smart_leds::RGB8;

/// Default brightness ceiling: R+G+B of at most 3 x 212, roughly 83% of full white
pub const DEFAULT_BRIGHTNESS_CEILING: u32 = 3 * 212;

/// Maximum possible R+G+B sum
pub const FULL_BRIGHTNESS: u32 = 3 * 255;

/// One LED's color as packed 32-bit ARGB (alpha in the top byte)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(transparent)]
#[repr(transparent)]
pub struct NodeColor(pub u32);

impl NodeColor {
    /// Fully transparent black; blending it changes nothing
    pub const NONE: NodeColor = NodeColor(0x0000_0000);
    pub const BLACK: NodeColor = NodeColor(0xFF00_0000);
    pub const RED: NodeColor = NodeColor(0xFFFF_0000);
    pub const GREEN: NodeColor = NodeColor(0xFF00_FF00);
    pub const BLUE: NodeColor = NodeColor(0xFF00_00FF);
    pub const YELLOW: NodeColor = NodeColor(0xFFFF_FF00);
    pub const CYAN: NodeColor = NodeColor(0xFF00_FFFF);
    pub const MAGENTA: NodeColor = NodeColor(0xFFFF_00FF);
    pub const WHITE: NodeColor = NodeColor(0xFFFF_FFFF);
    pub const WARM_WHITE: NodeColor = NodeColor(0xFFFF_9F46);

    /// Build a color from its channels
    pub const fn from_argb(a: u8, r: u8, g: u8, b: u8) -> Self {
        NodeColor(((a as u32) << 24) | ((r as u32) << 16) | ((g as u32) << 8) | b as u32)
    }

    /// Build an opaque color
    pub const fn from_rgb(r: u8, g: u8, b: u8) -> Self {
        Self::from_argb(0xFF, r, g, b)
    }

    pub const fn a(self) -> u8 {
        (self.0 >> 24) as u8
    }

    pub const fn r(self) -> u8 {
        (self.0 >> 16) as u8
    }

    pub const fn g(self) -> u8 {
        (self.0 >> 8) as u8
    }

    pub const fn b(self) -> u8 {
        self.0 as u8
    }

    /// Low 24 bits, as shifted out on the wire
    pub const fn rgb24(self) -> u32 {
        self.0 & 0x00FF_FFFF
    }

    pub const fn with_alpha(self, a: u8) -> Self {
        NodeColor((self.0 & 0x00FF_FFFF) | ((a as u32) << 24))
    }

    pub const fn is_opaque(self) -> bool {
        self.a() == 0xFF
    }

    /// Sum of the color channels, alpha excluded
    pub const fn brightness(self) -> u32 {
        self.r() as u32 + self.g() as u32 + self.b() as u32
    }

    /// Swap the red and green bytes (for strips wired GRB)
    pub const fn rg_swapped(self) -> Self {
        NodeColor((self.0 & 0xFF00_00FF) | ((self.r() as u32) << 8) | ((self.g() as u32) << 16))
    }

    /// Scale R, G and B down proportionally so their sum stays within `ceiling`.
    ///
    /// Colors already within the ceiling are returned unchanged. Alpha is
    /// never touched. Integer division may round each channel down by one.
    pub fn limit(self, ceiling: u32) -> Self {
        let sum = self.brightness();
        if sum <= ceiling {
            return self;
        }
        let scale = |c: u8| (c as u32 * ceiling / sum) as u8;
        Self::from_argb(self.a(), scale(self.r()), scale(self.g()), scale(self.b()))
    }

    /// Composite `self` over `dst`.
    ///
    /// Opaque colors replace `dst`, fully transparent ones leave it as is.
    /// Anything in between is mixed per channel and the result is opaque.
    pub fn blend_over(self, dst: NodeColor) -> NodeColor {
        match self.a() {
            0xFF => self,
            0 => dst,
            a => {
                let a = a as u32;
                let mix = |d: u8, s: u8| (((255 - a) * d as u32 + a * s as u32) / 255) as u8;
                Self::from_rgb(
                    mix(dst.r(), self.r()),
                    mix(dst.g(), self.g()),
                    mix(dst.b(), self.b()),
                )
            }
        }
    }
}

/// How a written color combines with the cell it lands on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BlendMode {
    /// Store the color as given, alpha included
    #[default]
    Replace,
    /// Composite with [`NodeColor::blend_over`]
    AlphaBlend,
}

impl BlendMode {
    /// Value a cell holding `dst` takes when `src` is written to it
    pub fn apply(self, src: NodeColor, dst: NodeColor) -> NodeColor {
        match self {
            BlendMode::Replace => src,
            BlendMode::AlphaBlend => src.blend_over(dst),
        }
    }
}

impl From<u32> for NodeColor {
    fn from(argb: u32) -> Self {
        NodeColor(argb)
    }
}

impl From<NodeColor> for u32 {
    fn from(color: NodeColor) -> Self {
        color.0
    }
}

impl From<RGB8> for NodeColor {
    fn from(rgb: RGB8) -> Self {
        NodeColor::from_rgb(rgb.r, rgb.g, rgb.b)
    }
}

impl From<NodeColor> for RGB8 {
    fn from(color: NodeColor) -> Self {
        RGB8 {
            r: color.r(),
            g: color.g(),
            b: color.b(),
        }
    }
}

impl std::fmt::Display for NodeColor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{:08X}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_channels() {
        let c = NodeColor::from_argb(0x80, 0x12, 0x34, 0x56);
        assert_eq!(c.0, 0x8012_3456);
        assert_eq!((c.a(), c.r(), c.g(), c.b()), (0x80, 0x12, 0x34, 0x56));
        assert_eq!(c.rgb24(), 0x12_3456);
        assert_eq!(c.with_alpha(0xFF).0, 0xFF12_3456);
    }

    #[test]
    fn test_limit_white() {
        let limited = NodeColor::WHITE.limit(DEFAULT_BRIGHTNESS_CEILING);
        assert_eq!((limited.r(), limited.g(), limited.b()), (212, 212, 212));
        assert_eq!(limited.brightness(), 636);
        assert!(limited.is_opaque());
    }

    #[test]
    fn test_limit_below_ceiling_unchanged() {
        assert_eq!(NodeColor::RED.limit(DEFAULT_BRIGHTNESS_CEILING), NodeColor::RED);
        let dim = NodeColor::from_argb(0x40, 10, 20, 30);
        assert_eq!(dim.limit(60), dim);
    }

    #[test]
    fn test_limit_keeps_alpha() {
        let c = NodeColor::from_argb(0x7F, 255, 255, 0);
        let limited = c.limit(255);
        assert_eq!(limited.a(), 0x7F);
        assert_eq!((limited.r(), limited.g()), (127, 127));
    }

    #[test]
    fn test_blend_modes() {
        let dst = NodeColor::from_rgb(0, 0, 200);
        assert_eq!(NodeColor::RED.blend_over(dst), NodeColor::RED);
        assert_eq!(NodeColor::NONE.blend_over(dst), dst);

        let half_red = NodeColor::from_argb(0x80, 255, 0, 0);
        let mixed = half_red.blend_over(dst);
        assert!(mixed.is_opaque());
        assert_eq!(mixed.r(), (128 * 255 / 255) as u8);
        assert_eq!(mixed.b(), ((127 * 200) / 255) as u8);

        assert_eq!(BlendMode::default(), BlendMode::Replace);
        assert_eq!(BlendMode::Replace.apply(half_red, dst), half_red);
        assert_eq!(BlendMode::Replace.apply(NodeColor::NONE, dst), NodeColor::NONE);
        assert_eq!(BlendMode::AlphaBlend.apply(half_red, dst), mixed);
    }

    #[test]
    fn test_rg_swap() {
        let c = NodeColor::from_rgb(0x11, 0x22, 0x33);
        assert_eq!(c.rg_swapped(), NodeColor::from_rgb(0x22, 0x11, 0x33));
        assert_eq!(c.rg_swapped().rg_swapped(), c);
    }

    #[test]
    fn test_rgb8_conversion() {
        let c: NodeColor = RGB8 { r: 1, g: 2, b: 3 }.into();
        assert_eq!(c, NodeColor::from_rgb(1, 2, 3));
        let back: RGB8 = c.into();
        assert_eq!((back.r, back.g, back.b), (1, 2, 3));
    }
}
