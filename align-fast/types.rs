/// Level-local corner candidate with its FAST and Harris scores.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScoredKeypoint {
    pub x: usize,
    pub y: usize,
    pub fast_score: f32,
    pub response: f32,
}

/// Scale information for pyramid levels
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScaleLevel {
    pub level: usize,
    pub scale: f32,
    pub width: usize,
    pub height: usize,
}

impl ScaleLevel {
    /// Map a level-local pixel position back to level-0 coordinates.
    #[inline]
    pub fn to_base(&self, x: f32, y: f32) -> (f32, f32) {
        ((x + 0.5) * self.scale - 0.5, (y + 0.5) * self.scale - 0.5)
    }

    /// Map a level-0 position into this level.
    #[inline]
    pub fn from_base(&self, x: f32, y: f32) -> (f32, f32) {
        ((x + 0.5) / self.scale - 0.5, (y + 0.5) / self.scale - 0.5)
    }

    pub fn area(&self) -> usize {
        self.width * self.height
    }
}
