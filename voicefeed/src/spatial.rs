//! Listener and emitter geometry for positional voices.

use crate::math::{Pose, Vec3, orientation_frame};

/// The "ears" in the 3D world.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AudioListener {
    pub position: Vec3,
    pub forward: Vec3,
    pub up: Vec3,
    pub velocity: Vec3,
}

impl Default for AudioListener {
    fn default() -> Self {
        Self {
            position: Vec3::ZERO,
            forward: -Vec3::Z,
            up: Vec3::Y,
            velocity: Vec3::ZERO,
        }
    }
}

impl AudioListener {
    pub fn from_pose(pose: Pose) -> Self {
        Self {
            position: pose.position,
            forward: pose.forward(),
            up: pose.up(),
            velocity: Vec3::ZERO,
        }
    }
}

/// A sound-emitting object in the 3D world.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AudioEmitter {
    pub position: Vec3,
    pub forward: Vec3,
    pub up: Vec3,
    pub velocity: Vec3,
    pub doppler_scale: f32,
}

impl Default for AudioEmitter {
    fn default() -> Self {
        Self {
            position: Vec3::ZERO,
            forward: -Vec3::Z,
            up: Vec3::Y,
            velocity: Vec3::ZERO,
            doppler_scale: 1.0,
        }
    }
}

impl AudioEmitter {
    pub fn at(position: Vec3) -> Self {
        Self {
            position,
            ..Default::default()
        }
    }

    pub fn with_velocity(mut self, velocity: Vec3) -> Self {
        self.velocity = velocity;
        self
    }
}

/// Position and velocity to write on a voice so that `emitter` is heard from `listener`.
///
/// `backend_listener` is the listener position the backend itself currently uses; the
/// emitter offset is added to it before rotating into the listener's orientation frame.
pub fn voice_placement(
    backend_listener: Vec3,
    listener: &AudioListener,
    emitter: &AudioEmitter,
) -> (Vec3, Vec3) {
    let offset = emitter.position - listener.position;
    let frame = orientation_frame(listener.forward, listener.up);
    let position = frame * (backend_listener + offset);
    let velocity = frame * emitter.velocity;
    (position, velocity)
}
