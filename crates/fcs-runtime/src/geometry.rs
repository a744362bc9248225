//! Small value types shared by the packer, the drivers and the render context.

use std::ops::BitOr;

/// Integer rectangle in pixels (top-left origin).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct Rect {
    pub x: i32,
    pub y: i32,
    pub width: i32,
    pub height: i32,
}

impl Rect {
    pub const fn new(x: i32, y: i32, width: i32, height: i32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    pub fn left(&self) -> i32 {
        self.x
    }

    pub fn top(&self) -> i32 {
        self.y
    }

    pub fn right(&self) -> i32 {
        self.x + self.width
    }

    pub fn bottom(&self) -> i32 {
        self.y + self.height
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Vec2 {
    pub x: f32,
    pub y: f32,
}

impl Vec2 {
    pub const ZERO: Vec2 = Vec2 { x: 0.0, y: 0.0 };
    pub const ONE: Vec2 = Vec2 { x: 1.0, y: 1.0 };

    pub const fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }
}

/// 8-bit RGBA color. Packs as `r | g << 8 | b << 16 | a << 24`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Color {
    pub r: u8,
    pub g: u8,
    pub b: u8,
    pub a: u8,
}

impl Color {
    pub const WHITE: Color = Color::rgba(255, 255, 255, 255);
    pub const BLACK: Color = Color::rgba(0, 0, 0, 255);
    pub const TRANSPARENT: Color = Color::rgba(0, 0, 0, 0);

    pub const fn rgba(r: u8, g: u8, b: u8, a: u8) -> Self {
        Self { r, g, b, a }
    }

    pub fn packed(self) -> u32 {
        u32::from(self.r)
            | u32::from(self.g) << 8
            | u32::from(self.b) << 16
            | u32::from(self.a) << 24
    }

    pub fn from_packed(c: u32) -> Self {
        Self {
            r: (c & 0xFF) as u8,
            g: (c >> 8 & 0xFF) as u8,
            b: (c >> 16 & 0xFF) as u8,
            a: (c >> 24 & 0xFF) as u8,
        }
    }

    /// Channels normalized to `0.0..=1.0`.
    pub fn to_vec4(self) -> [f32; 4] {
        [
            f32::from(self.r) / 255.0,
            f32::from(self.g) / 255.0,
            f32::from(self.b) / 255.0,
            f32::from(self.a) / 255.0,
        ]
    }
}

impl Default for Color {
    fn default() -> Self {
        Color::WHITE
    }
}

/// Sprite mirroring flags.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct SpriteEffects(u8);

impl SpriteEffects {
    pub const NONE: SpriteEffects = SpriteEffects(0);
    pub const FLIP_HORIZONTALLY: SpriteEffects = SpriteEffects(1);
    pub const FLIP_VERTICALLY: SpriteEffects = SpriteEffects(2);

    pub fn bits(self) -> u8 {
        self.0
    }

    pub fn contains(self, other: SpriteEffects) -> bool {
        self.0 & other.0 == other.0
    }
}

impl BitOr for SpriteEffects {
    type Output = SpriteEffects;

    fn bitor(self, rhs: SpriteEffects) -> SpriteEffects {
        SpriteEffects(self.0 | rhs.0)
    }
}
