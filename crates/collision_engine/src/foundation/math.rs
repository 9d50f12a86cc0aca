//! Math utilities and types
//!
//! Provides fundamental math types for collision detection and resolution.

pub use nalgebra::{Vector2, Vector3, Vector4};

/// 2D vector type
pub type Vec2 = Vector2<f32>;

/// 3D vector type
pub type Vec3 = Vector3<f32>;

/// 4D vector type
pub type Vec4 = Vector4<f32>;

/// Tolerance used to treat an axis overlap as zero contact.
///
/// Two epsilons rather than one so that boxes sharing an edge after a
/// resolution push do not immediately re-collide.
pub const ZERO_TOLERANCE: f32 = f32::EPSILON * 2.0;

/// Check whether a float is zero within [`ZERO_TOLERANCE`].
pub fn float_eq_zero(f: f32) -> bool {
    f.abs() <= ZERO_TOLERANCE
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_tolerance() {
        assert!(float_eq_zero(0.0));
        assert!(float_eq_zero(f32::EPSILON));
        assert!(float_eq_zero(-f32::EPSILON * 2.0));
        assert!(!float_eq_zero(f32::EPSILON * 4.0));
        assert!(!float_eq_zero(0.1));
    }
}
