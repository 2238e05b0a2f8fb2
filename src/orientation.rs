//! Euler accumulation and quaternion construction.
//!
//! Head and controllers each have their own constructor and argument order
//! (yaw∘roll∘pitch for the head, roll∘pitch∘yaw for controllers). The engine
//! feeds them differently named accumulators, so keep the two separate.

use crate::types::Quaternion;

/// Default wrap period, in degrees, for per-tick rotation deltas.
pub const DEFAULT_PERIOD_DEG: f64 = 90.0;

/// Reduce two absolute angle samples (degrees) to a per-tick increment.
///
/// `delta = ((current - previous) mod period) / 360`, with a Euclidean modulo so
/// the result lies in `[0, period / 360)` and shifting either input by a
/// multiple of `period` leaves it unchanged.
///
/// This is a lossy reduction, not an angle difference: any real rotation of
/// `period` degrees or more between two samples is folded back into the first
/// period, and a small negative step wraps to a value just below
/// `period / 360`.
pub fn axis_delta(previous: f64, current: f64, period_deg: f64) -> f64 {
    (current - previous).rem_euclid(period_deg) / 360.0
}

/// [`axis_delta`] applied to each of the three axes independently.
pub fn euler_delta(previous: [f64; 3], current: [f64; 3], period_deg: f64) -> [f64; 3] {
    [
        axis_delta(previous[0], current[0], period_deg),
        axis_delta(previous[1], current[1], period_deg),
        axis_delta(previous[2], current[2], period_deg),
    ]
}

/// Head orientation (radians), composed yaw∘roll∘pitch.
///
/// With only `pitch` non-zero this is a rotation about +Y, which is why the
/// head's `pitch` doubles as its heading.
pub fn head_quaternion(yaw: f64, pitch: f64, roll: f64) -> Quaternion {
    let (sy, cy) = (yaw * 0.5).sin_cos();
    let (sr, cr) = (roll * 0.5).sin_cos();
    let (sp, cp) = (pitch * 0.5).sin_cos();

    Quaternion {
        w: cy * cr * cp + sy * sr * sp,
        x: cy * sr * cp - sy * cr * sp,
        y: cy * cr * sp + sy * sr * cp,
        z: sy * cr * cp - cy * sr * sp,
    }
}

/// Controller orientation (radians), composed roll∘pitch∘yaw.
pub fn controller_quaternion(roll: f64, pitch: f64, yaw: f64) -> Quaternion {
    let (sr, cr) = (roll * 0.5).sin_cos();
    let (sp, cp) = (pitch * 0.5).sin_cos();
    let (sy, cy) = (yaw * 0.5).sin_cos();

    Quaternion {
        w: cr * cp * cy + sr * sp * sy,
        x: sr * cp * cy - cr * sp * sy,
        y: cr * sp * cy + sr * cp * sy,
        z: -sr * sp * cy + cr * cp * sy,
    }
}

/// Rotate the horizontal offset `(x, z)` by `angle` radians about +Y.
pub fn rotate_around_y(x: f64, z: f64, angle: f64) -> (f64, f64) {
    let (s, c) = angle.sin_cos();
    (x * c + z * s, z * c - x * s)
}
