use glam::DVec2;
use serde::Deserialize;

use crate::{chess::Square, error::Error};

/// Height at which pieces are picked up and released on the far half of the board.
pub const FAR_DESCENT_HEIGHT: f64 = 140.0;
/// Height at which pieces are picked up and released on the near half of the board.
pub const NEAR_DESCENT_HEIGHT: f64 = 150.0;
/// Far-half height used for the rook while castling.
pub const ROOK_FAR_DESCENT_HEIGHT: f64 = 145.0;

/// Arm coordinates, in millimetres, of the centres of the four corner squares.
#[derive(Clone, Copy, Debug, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CalibrationCorners {
    pub a1: DVec2,
    pub h1: DVec2,
    pub a8: DVec2,
    pub h8: DVec2,
}

impl Default for CalibrationCorners {
    fn default() -> Self {
        CalibrationCorners {
            a1: DVec2::new(500.0, -95.0),
            h1: DVec2::new(500.0, 95.0),
            a8: DVec2::new(300.0, -85.0),
            h8: DVec2::new(295.0, 105.0),
        }
    }
}

impl CalibrationCorners {
    /// True when three of the corners lie on a common line.
    pub fn is_degenerate(&self) -> bool {
        let [a1, h1, a8, h8] = [self.a1, self.h1, self.a8, self.h8];
        let area = |p: DVec2, q: DVec2, r: DVec2| (q - p).perp_dot(r - p).abs();
        let eps = 1e-6;
        area(a1, h1, a8) < eps
            || area(a1, h1, h8) < eps
            || area(a1, a8, h8) < eps
            || area(h1, a8, h8) < eps
    }
}

/// Where a square sits in arm coordinates.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct PhysicalPosition {
    pub x: f64,
    pub y: f64,
    /// The board rank, 1 through 8.
    pub rank: u32,
}

impl PhysicalPosition {
    pub fn descent_height(&self) -> f64 {
        descent_height(self.rank)
    }
}

/// The z at which the claw closes on a piece standing on `rank`.
pub fn descent_height(rank: u32) -> f64 {
    if rank >= 5 {
        FAR_DESCENT_HEIGHT
    } else {
        NEAR_DESCENT_HEIGHT
    }
}

/// Like [`descent_height`], but for the rook while castling. The far-half value differs.
pub fn rook_descent_height(rank: u32) -> f64 {
    if rank >= 5 {
        ROOK_FAR_DESCENT_HEIGHT
    } else {
        NEAR_DESCENT_HEIGHT
    }
}

/// Represents the physical board as seen by the arm.
#[derive(Clone, Copy, Debug, Default)]
pub struct Board {
    pub corners: CalibrationCorners,
}

impl Board {
    pub fn new(corners: CalibrationCorners) -> Self {
        Board { corners }
    }

    /// Bilinear interpolation of the square centre between the calibrated corners.
    pub fn square_to_position(&self, square: Square) -> Result<PhysicalPosition, Error> {
        if !square.is_on_board() {
            return Err(Error::InvalidSquare(square.to_string()));
        }
        let fx = square.file as f64 / 7.0;
        let fy = square.rank as f64 / 7.0;

        let c = &self.corners;
        let a_file = lerp(c.a1, c.a8, fy);
        let h_file = lerp(c.h1, c.h8, fy);
        let p = lerp(a_file, h_file, fx);

        Ok(PhysicalPosition {
            x: p.x,
            y: p.y,
            rank: square.rank_number(),
        })
    }
}

/// Exact at both ends, so the corner squares land on their anchors.
fn lerp(a: DVec2, b: DVec2, t: f64) -> DVec2 {
    a * (1.0 - t) + b * t
}
