//! Face-down edge detection.
//!
//! Raw accelerometer samples come in over a channel from whatever platform
//! layer owns the sensor; this module reduces them to discrete flip edges.
//! Only the z axis matters: gravity pulls z toward -9.8 when the screen
//! faces the table.

/// Z-axis reading below this means the phone lies face-down.
pub const FACE_DOWN_THRESHOLD_Z: f32 = -5.0;

/// One tri-axis accelerometer reading.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AccelSample {
    pub x: f32,
    pub y: f32,
    pub z: f32,
}

impl AccelSample {
    pub fn new(x: f32, y: f32, z: f32) -> Self {
        Self { x, y, z }
    }
}

/// A detected flip, reported once per orientation change.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OrientationEdge {
    FaceDown,
    FaceUp,
}

/// Stateful edge detector over the sample stream.
///
/// Repeated samples on the same side of the threshold produce nothing;
/// only the crossing itself is reported.
#[derive(Debug, Default)]
pub struct OrientationMonitor {
    face_down: bool,
}

impl OrientationMonitor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_face_down(&self) -> bool {
        self.face_down
    }

    /// Feed one sample; returns the edge it produced, if any.
    pub fn observe(&mut self, sample: AccelSample) -> Option<OrientationEdge> {
        let now_down = sample.z < FACE_DOWN_THRESHOLD_Z;
        let edge = match (self.face_down, now_down) {
            (false, true) => Some(OrientationEdge::FaceDown),
            (true, false) => Some(OrientationEdge::FaceUp),
            _ => None,
        };
        self.face_down = now_down;
        edge
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn z(z: f32) -> AccelSample {
        AccelSample::new(0.0, 0.0, z)
    }

    #[test]
    fn crossing_down_emits_one_edge() {
        let mut monitor = OrientationMonitor::new();
        assert_eq!(monitor.observe(z(-9.8)), Some(OrientationEdge::FaceDown));
        assert_eq!(monitor.observe(z(-9.7)), None);
        assert_eq!(monitor.observe(z(-8.0)), None);
        assert!(monitor.is_face_down());
    }

    #[test]
    fn crossing_back_up_emits_face_up() {
        let mut monitor = OrientationMonitor::new();
        monitor.observe(z(-9.8));
        assert_eq!(monitor.observe(z(2.0)), Some(OrientationEdge::FaceUp));
        assert_eq!(monitor.observe(z(9.8)), None);
        assert!(!monitor.is_face_down());
    }

    #[test]
    fn threshold_is_strict() {
        let mut monitor = OrientationMonitor::new();
        assert_eq!(monitor.observe(z(FACE_DOWN_THRESHOLD_Z)), None);
        assert_eq!(monitor.observe(z(-5.1)), Some(OrientationEdge::FaceDown));
    }

    #[test]
    fn face_up_samples_from_rest_emit_nothing() {
        let mut monitor = OrientationMonitor::new();
        assert_eq!(monitor.observe(z(9.8)), None);
        assert_eq!(monitor.observe(z(0.0)), None);
    }
}
