use glam::Vec3;

/// Linear RGB color, components nominally in [0, 1] (may exceed 1 after
/// scaling, the rasterizer clamps).
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct Color(pub Vec3);

impl Color {
    pub const BLACK: Color = Color(Vec3::ZERO);

    pub const fn rgb(r: f32, g: f32, b: f32) -> Self {
        Color(Vec3::new(r, g, b))
    }

    pub fn from_hex(hex: u32) -> Self {
        Color::rgb(
            ((hex >> 16) & 0xff) as f32 / 255.0,
            ((hex >> 8) & 0xff) as f32 / 255.0,
            (hex & 0xff) as f32 / 255.0,
        )
    }

    /// HSV to RGB with `h` in degrees (any range), `s` and `v` in [0, 1].
    pub fn from_hsv(h: f32, s: f32, v: f32) -> Self {
        let channel = |n: f32| {
            let k = (n + h / 60.0).rem_euclid(6.0);
            v - v * s * k.min(4.0 - k).min(1.0).max(0.0)
        };
        Color::rgb(channel(5.0), channel(3.0), channel(1.0))
    }

    pub fn scaled(self, factor: f32) -> Self {
        Color(self.0 * factor)
    }

    pub fn r(&self) -> f32 {
        self.0.x
    }

    pub fn g(&self) -> f32 {
        self.0.y
    }

    pub fn b(&self) -> f32 {
        self.0.z
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct StandardMaterial {
    pub color: Color,
    pub emissive: Color,
    pub emissive_intensity: f32,
    pub metalness: f32,
    pub roughness: f32,
    pub opacity: f32,
    pub transparent: bool,
}

impl Default for StandardMaterial {
    fn default() -> Self {
        Self {
            color: Color::rgb(1.0, 1.0, 1.0),
            emissive: Color::BLACK,
            emissive_intensity: 1.0,
            metalness: 0.0,
            roughness: 1.0,
            opacity: 1.0,
            transparent: false,
        }
    }
}

impl StandardMaterial {
    /// Opaque glowing inner mesh of a cell.
    pub fn core(base: Color) -> Self {
        Self {
            color: base,
            emissive: base,
            emissive_intensity: 0.6,
            metalness: 0.4,
            roughness: 0.2,
            ..Default::default()
        }
    }

    /// Faint translucent outer mesh of a cell.
    pub fn shell(base: Color) -> Self {
        Self {
            color: base.scaled(1.5),
            emissive: base,
            emissive_intensity: 0.4,
            metalness: 0.8,
            roughness: 0.1,
            opacity: 0.12,
            transparent: true,
        }
    }

    pub fn effective_opacity(&self) -> f32 {
        if self.transparent {
            self.opacity.clamp(0.0, 1.0)
        } else {
            1.0
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assert_color(c: Color, r: f32, g: f32, b: f32) {
        assert!(
            c.0.abs_diff_eq(Vec3::new(r, g, b), 1e-4),
            "{c:?} != ({r}, {g}, {b})"
        );
    }

    #[test]
    fn hsv_primaries() {
        assert_color(Color::from_hsv(0.0, 1.0, 1.0), 1.0, 0.0, 0.0);
        assert_color(Color::from_hsv(120.0, 1.0, 1.0), 0.0, 1.0, 0.0);
        assert_color(Color::from_hsv(240.0, 1.0, 1.0), 0.0, 0.0, 1.0);
        assert_color(Color::from_hsv(360.0, 1.0, 1.0), 1.0, 0.0, 0.0);
        assert_color(Color::from_hsv(42.0, 0.0, 0.5), 0.5, 0.5, 0.5);
    }

    #[test]
    fn quiet_base_color_is_sky_blue() {
        // 200 degrees, 0.8 saturation: the hue used when the room is silent.
        assert_color(Color::from_hsv(200.0, 0.8, 1.0), 0.2, 0.733_333, 1.0);
    }

    #[test]
    fn hex_parsing() {
        assert_color(Color::from_hex(0x88ccff), 0x88 as f32 / 255.0, 0.8, 1.0);
    }

    #[test]
    fn shell_is_translucent_and_brighter() {
        let base = Color::rgb(0.2, 0.4, 0.6);
        let shell = StandardMaterial::shell(base);
        let core = StandardMaterial::core(base);
        assert!(shell.transparent);
        assert!((shell.effective_opacity() - 0.12).abs() < 1e-6);
        assert_eq!(core.effective_opacity(), 1.0);
        assert_color(shell.color, 0.3, 0.6, 0.9);
        assert_eq!(shell.emissive, core.emissive);
    }
}
