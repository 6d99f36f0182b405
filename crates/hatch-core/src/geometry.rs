//! Pass-through placement data and the one derived geometry the engine owns:
//! the canvas bounding box.

/// Where an item sits on the canvas. Stored, never interpreted.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Placement {
    pub left: f32,
    pub top: f32,
}

impl Placement {
    pub const fn new(left: f32, top: f32) -> Self {
        Self { left, top }
    }

    pub fn offset(self, dx: f32, dy: f32) -> Self {
        Self {
            left: self.left + dx,
            top: self.top + dy,
        }
    }

    /// CSS-style coordinate strings used in tokens (`"120px"`).
    pub fn to_css(self) -> (String, String) {
        (px(self.left), px(self.top))
    }

    /// Lenient inverse of `to_css`: anything unparsable becomes 0.
    pub fn from_css(left: Option<&str>, top: Option<&str>) -> Self {
        Self {
            left: left.map(parse_px).unwrap_or_default(),
            top: top.map(parse_px).unwrap_or_default(),
        }
    }
}

fn px(v: f32) -> String {
    format!("{v}px")
}

/// Parse the leading number of a CSS length (`"12.5px"` → 12.5).
pub fn parse_px(s: &str) -> f32 {
    let s = s.trim();
    let end = s
        .char_indices()
        .find(|&(i, c)| !(c.is_ascii_digit() || c == '.' || (i == 0 && (c == '-' || c == '+'))))
        .map_or(s.len(), |(i, _)| i);
    s[..end].parse().unwrap_or_default()
}

/// Axis-aligned rectangle of a placed item.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Bounds {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

impl Bounds {
    pub fn right(&self) -> f32 {
        self.x + self.width
    }

    pub fn bottom(&self) -> f32 {
        self.y + self.height
    }

    pub fn contains(&self, px: f32, py: f32) -> bool {
        px >= self.x && px <= self.right() && py >= self.y && py <= self.bottom()
    }
}

/// Minimum canvas size needed to show every item.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Dimensions {
    pub width: f32,
    pub height: f32,
}

impl Dimensions {
    /// Smallest size covering every rect from the origin, plus `padding`.
    pub fn covering<'a>(rects: impl IntoIterator<Item = &'a Bounds>, padding: f32) -> Self {
        let mut width: f32 = 0.0;
        let mut height: f32 = 0.0;
        for r in rects {
            width = width.max(r.right());
            height = height.max(r.bottom());
        }
        Self {
            width: width + padding,
            height: height + padding,
        }
    }
}
