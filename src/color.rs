use crate::utils::format_number;

/// RGBA 颜色，通道取值 0–255，alpha 取值 0–1。
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Rgba {
    pub r: f64,
    pub g: f64,
    pub b: f64,
    pub a: f64,
}

impl Rgba {
    pub fn clamp(self) -> Self {
        Self {
            r: self.r.clamp(0.0, 255.0),
            g: self.g.clamp(0.0, 255.0),
            b: self.b.clamp(0.0, 255.0),
            a: self.a.clamp(0.0, 1.0),
        }
    }
}

/// 提升亮度，amount 为 0–1 的比例。
pub fn lighten(color: Rgba, amount: f64) -> Rgba {
    let (h, s, l) = rgb_to_hsl(color);
    hsl_to_rgb(h, s, (l + amount).clamp(0.0, 1.0), color.a)
}

/// 降低亮度，amount 为 0–1 的比例。
pub fn darken(color: Rgba, amount: f64) -> Rgba {
    let (h, s, l) = rgb_to_hsl(color);
    hsl_to_rgb(h, s, (l - amount).clamp(0.0, 1.0), color.a)
}

/// 直接替换 alpha 通道。
pub fn fade(color: Rgba, amount: f64) -> Rgba {
    Rgba {
        a: amount.clamp(0.0, 1.0),
        ..color
    }
}

/// 以 weight（0–1，第一个颜色的占比）线性混合两个颜色。
pub fn mix(first: Rgba, second: Rgba, weight: f64) -> Rgba {
    let w = weight.clamp(0.0, 1.0);
    Rgba {
        r: first.r * w + second.r * (1.0 - w),
        g: first.g * w + second.g * (1.0 - w),
        b: first.b * w + second.b * (1.0 - w),
        a: first.a * w + second.a * (1.0 - w),
    }
    .clamp()
}

pub fn invert(color: Rgba) -> Rgba {
    Rgba {
        r: 255.0 - color.r,
        g: 255.0 - color.g,
        b: 255.0 - color.b,
        a: color.a,
    }
    .clamp()
}

pub fn format_hex(color: Rgba) -> String {
    let c = color.clamp();
    format!(
        "#{:02x}{:02x}{:02x}",
        to_channel(c.r),
        to_channel(c.g),
        to_channel(c.b)
    )
}

pub fn format_rgba(color: Rgba) -> String {
    let c = color.clamp();
    format!(
        "rgba({}, {}, {}, {})",
        to_channel(c.r),
        to_channel(c.g),
        to_channel(c.b),
        format_alpha(c.a)
    )
}

fn to_channel(value: f64) -> u8 {
    value.round().clamp(0.0, 255.0) as u8
}

fn format_alpha(value: f64) -> String {
    let formatted = format_number(value);
    if formatted.is_empty() {
        "0".to_string()
    } else {
        formatted
    }
}

/// RGB 转 HSL。色相按 0–6 的色环扇区计量（免去角度换算），
/// 饱和度用色度除以 1-|2l-1| 一步得出。
fn rgb_to_hsl(color: Rgba) -> (f64, f64, f64) {
    let r = color.r / 255.0;
    let g = color.g / 255.0;
    let b = color.b / 255.0;

    let max = r.max(g).max(b);
    let min = r.min(g).min(b);
    let chroma = max - min;
    let l = (max + min) / 2.0;
    if chroma == 0.0 {
        return (0.0, 0.0, l);
    }

    let s = chroma / (1.0 - (2.0 * l - 1.0).abs());
    let mut h = if max == r {
        (g - b) / chroma
    } else if max == g {
        (b - r) / chroma + 2.0
    } else {
        (r - g) / chroma + 4.0
    };
    if h < 0.0 {
        h += 6.0;
    }
    (h, s, l)
}

/// HSL 转回 RGB，逐通道套 CSS Color 4 的分段斜坡公式：
/// 通道 = l - ramp * clamp(min(k-3, 9-k), -1, 1)，k 为相对色相位置。
fn hsl_to_rgb(h: f64, s: f64, l: f64, alpha: f64) -> Rgba {
    let ramp = s * l.min(1.0 - l);
    let channel = |offset: f64| {
        let k = (offset + h * 2.0).rem_euclid(12.0);
        let slope = (k - 3.0).min(9.0 - k).clamp(-1.0, 1.0);
        (l - ramp * slope) * 255.0
    };
    Rgba {
        r: channel(0.0),
        g: channel(8.0),
        b: channel(4.0),
        a: alpha,
    }
    .clamp()
}

#[cfg(test)]
mod tests {
    use super::*;

    const BRAND: Rgba = Rgba {
        r: 51.0,
        g: 102.0,
        b: 153.0,
        a: 1.0,
    };

    #[test]
    fn lighten_and_darken_move_lightness() {
        assert_eq!(format_hex(lighten(BRAND, 0.2)), "#6699cc");
        assert_eq!(format_hex(darken(BRAND, 0.15)), "#204060");
    }

    #[test]
    fn fade_replaces_alpha() {
        let faded = fade(BRAND, 0.3);
        assert_eq!(format_rgba(faded), "rgba(51, 102, 153, 0.3)");
    }

    #[test]
    fn mix_is_weighted() {
        let white = Rgba {
            r: 255.0,
            g: 255.0,
            b: 255.0,
            a: 1.0,
        };
        let black = Rgba {
            r: 0.0,
            g: 0.0,
            b: 0.0,
            a: 1.0,
        };
        assert_eq!(format_hex(mix(white, black, 0.5)), "#808080");
        assert_eq!(format_hex(mix(white, black, 1.0)), "#ffffff");
    }

    #[test]
    fn invert_flips_channels() {
        assert_eq!(format_hex(invert(BRAND)), "#cc9966");
    }

    #[test]
    fn hsl_round_trip_is_stable() {
        let (h, s, l) = rgb_to_hsl(BRAND);
        let back = hsl_to_rgb(h, s, l, 1.0);
        assert!((back.r - BRAND.r).abs() < 1.0);
        assert!((back.g - BRAND.g).abs() < 1.0);
        assert!((back.b - BRAND.b).abs() < 1.0);
    }
}
