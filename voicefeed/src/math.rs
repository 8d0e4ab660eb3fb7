//! Math types for VoiceFeed

pub use glam::{Mat3, Quat, Vec3};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Pose {
    pub position: Vec3,
    pub rotation: Quat,
}

impl Pose {
    pub fn new(position: Vec3, rotation: Quat) -> Self {
        Self { position, rotation }
    }

    pub fn identity() -> Self {
        Self {
            position: Vec3::ZERO,
            rotation: Quat::IDENTITY,
        }
    }

    pub fn from_position(position: Vec3) -> Self {
        Self {
            position,
            rotation: Quat::IDENTITY,
        }
    }

    pub fn forward(&self) -> Vec3 {
        self.rotation * (-Vec3::Z)
    }

    pub fn up(&self) -> Vec3 {
        self.rotation * Vec3::Y
    }

    pub fn right(&self) -> Vec3 {
        self.rotation * Vec3::X
    }
}

impl Default for Pose {
    fn default() -> Self {
        Self::identity()
    }
}

/// Builds the world-orientation basis for a listener facing `forward` with the given `up`.
///
/// Columns are `(right, up, backward)`, so multiplying a vector by the result expresses
/// it as `x * right + y * up + z * backward`. A listener looking down `-Z` with `+Y` up
/// yields the identity.
pub fn orientation_frame(forward: Vec3, up: Vec3) -> Mat3 {
    let backward = (-forward).normalize_or_zero();
    let right = up.cross(backward).normalize_or_zero();
    let up = backward.cross(right);
    Mat3::from_cols(right, up, backward)
}
