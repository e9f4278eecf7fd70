//! Pixel bus format tags negotiated between adjacent stages.
//!
//! A [`BusFormat`] describes how pixels are encoded on the bus between two
//! chain stages. The reserved [`BusFormat::Fixed`] sentinel means "no format
//! preference": it is what stages that opt out of negotiation report, and
//! what their upstream neighbour is asked to produce.

use smallvec::SmallVec;

/// Ordered list of candidate bus formats.
///
/// Chains are short and candidate lists small, so the common case stays on
/// the stack.
pub type FormatList = SmallVec<[BusFormat; 8]>;

/// A semantic pixel/bus encoding tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum BusFormat {
    /// Reserved "no preference" sentinel. Stages that do not participate in
    /// negotiation carry this value and rely on their own defaults.
    #[default]
    Fixed,
    /// 16-bit RGB, 5-6-5 packing.
    Rgb565,
    /// 18-bit RGB over a 24-bit bus.
    Rgb666,
    /// 24-bit RGB.
    Rgb888,
    /// 24-bit RGB, blue-first component order.
    Bgr888,
    /// 30-bit RGB, 10 bits per component.
    Rgb101010,
    /// 8-bit YUV 4:2:2, UYVY component order.
    Uyvy8,
    /// 8-bit YUV 4:2:2, YUYV component order.
    Yuyv8,
    /// 24-bit LVDS, JEIDA data mapping.
    LvdsJeida24,
    /// 24-bit LVDS, VESA data mapping.
    LvdsVesa24,
}

impl BusFormat {
    /// Whether this is the reserved "no preference" sentinel.
    #[inline]
    pub fn is_fixed(&self) -> bool {
        matches!(self, Self::Fixed)
    }

    /// Short lowercase name for logs and error messages.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Fixed => "fixed",
            Self::Rgb565 => "rgb565",
            Self::Rgb666 => "rgb666",
            Self::Rgb888 => "rgb888",
            Self::Bgr888 => "bgr888",
            Self::Rgb101010 => "rgb101010",
            Self::Uyvy8 => "uyvy8",
            Self::Yuyv8 => "yuyv8",
            Self::LvdsJeida24 => "lvds-jeida-24",
            Self::LvdsVesa24 => "lvds-vesa-24",
        }
    }
}

impl std::fmt::Display for BusFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_fixed() {
        assert_eq!(BusFormat::default(), BusFormat::Fixed);
        assert!(BusFormat::Fixed.is_fixed());
        assert!(!BusFormat::Rgb888.is_fixed());
    }

    #[test]
    fn test_display_names() {
        assert_eq!(BusFormat::Rgb888.to_string(), "rgb888");
        assert_eq!(BusFormat::LvdsJeida24.to_string(), "lvds-jeida-24");
    }
}
