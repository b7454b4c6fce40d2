//! Feature extraction from player-relative screens.
use super::PlayerRelative;
use ndarray::{Array2, ArrayView2};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Binary screen mask used as the network state. Indexed as `[y, x]`.
pub type Screen = Array2<u8>;

/// A screen coordinate.
#[derive(Debug, Default, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Point {
    pub x: usize,
    pub y: usize,
}

impl Point {
    #[must_use]
    pub const fn new(x: usize, y: usize) -> Self {
        Self { x, y }
    }

    /// Euclidean distance to another point.
    #[must_use]
    pub fn distance(&self, other: &Self) -> f64 {
        let dx = self.x as f64 - other.x as f64;
        let dy = self.y as f64 - other.y as f64;
        dx.hypot(dy)
    }
}

impl fmt::Display for Point {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "({}, {})", self.x, self.y)
    }
}

/// Mask of the cells holding `label`.
fn mask(player_relative: ArrayView2<u8>, label: PlayerRelative) -> Screen {
    let label = label.label();
    player_relative.mapv(|cell| u8::from(cell == label))
}

/// Mask of the target (neutral / beacon) cells.
#[must_use]
pub fn target_mask(player_relative: ArrayView2<u8>) -> Screen {
    mask(player_relative, PlayerRelative::Neutral)
}

/// Mean coordinate of the friendly unit cells, truncated toward zero.
///
/// Returns `None` when no friendly cell is visible,
/// for example when another unit is drawn on top of the controlled one.
#[must_use]
pub fn self_position(player_relative: ArrayView2<u8>) -> Option<Point> {
    let label = PlayerRelative::SelfUnit.label();
    let (mut count, mut sum_x, mut sum_y) = (0_usize, 0_usize, 0_usize);
    for ((y, x), &cell) in player_relative.indexed_iter() {
        if cell == label {
            count += 1;
            sum_x += x;
            sum_y += y;
        }
    }
    if count == 0 {
        return None;
    }
    Some(Point::new(sum_x / count, sum_y / count))
}

/// Last known screen position of the controlled unit.
///
/// Frames in which the unit cannot be located leave the position unchanged.
#[derive(Debug, Default, Copy, Clone, PartialEq, Eq)]
pub struct UnitTracker {
    position: Option<Point>,
}

impl UnitTracker {
    #[must_use]
    pub const fn new() -> Self {
        Self { position: None }
    }

    /// Forget the previous position and locate the unit on a fresh episode screen.
    pub fn reset(&mut self, player_relative: ArrayView2<u8>) -> Option<Point> {
        self.position = self_position(player_relative);
        self.position
    }

    /// Locate the unit, keeping the stale position when it is not visible.
    pub fn update(&mut self, player_relative: ArrayView2<u8>) -> Option<Point> {
        if let Some(position) = self_position(player_relative) {
            self.position = Some(position);
        }
        self.position
    }

    #[must_use]
    pub const fn position(&self) -> Option<Point> {
        self.position
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn target_mask_selects_neutral_cells() {
        let screen = array![[0, 3, 1], [3, 4, 0]];
        assert_eq!(target_mask(screen.view()), array![[0, 1, 0], [1, 0, 0]]);
    }

    #[test]
    fn self_position_is_truncated_mean() {
        // Friendly cells at (x, y) = (1, 0), (2, 0), (2, 1)
        let screen = array![[0, 1, 1], [0, 0, 1]];
        // mean x = 5/3, mean y = 1/3
        assert_eq!(self_position(screen.view()), Some(Point::new(1, 0)));
    }

    #[test]
    fn self_position_none_when_hidden() {
        let screen = array![[0, 3], [3, 0]];
        assert_eq!(self_position(screen.view()), None);
    }

    #[test]
    fn tracker_keeps_stale_position() {
        let mut tracker = UnitTracker::new();
        let visible = array![[0, 0], [0, 1]];
        let hidden = array![[0, 3], [3, 3]];
        assert_eq!(tracker.reset(visible.view()), Some(Point::new(1, 1)));
        assert_eq!(tracker.update(hidden.view()), Some(Point::new(1, 1)));
        assert_eq!(tracker.position(), Some(Point::new(1, 1)));
    }

    #[test]
    fn tracker_reset_forgets_position() {
        let mut tracker = UnitTracker::new();
        tracker.reset(array![[1]].view());
        assert_eq!(tracker.reset(array![[0]].view()), None);
    }

    #[test]
    fn point_distance() {
        assert!((Point::new(0, 0).distance(&Point::new(3, 4)) - 5.0).abs() < 1e-12);
    }
}
