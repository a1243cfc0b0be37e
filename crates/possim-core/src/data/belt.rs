use serde::{Deserialize, Serialize};

/// Belt speed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum BeltSpeed {
    /// Stopped
    #[default]
    Off,
    /// Slow forward
    Slow,
    /// Fast forward
    Fast,
}

/// Belt motor health
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum MotorState {
    /// Motor ok
    #[default]
    Ok,
    /// Motor overheated
    Overheated,
    /// Motor fuse defective
    Defective,
}

/// Full belt state as reported by the controller
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct BeltState {
    /// Current speed
    pub speed: BeltSpeed,
    /// Motor health
    pub motor: MotorState,
    /// Security flap open
    pub flap_open: bool,
    /// Light barrier interrupted
    pub barrier_interrupted: bool,
}

impl BeltState {
    /// A speed drop to zero with a healthy belt and a blocked light barrier
    /// is the controller stopping on its own.
    pub fn is_auto_stop_from(&self, previous: &BeltState) -> bool {
        previous.speed != BeltSpeed::Off
            && self.speed == BeltSpeed::Off
            && self.motor == MotorState::Ok
            && !self.flap_open
            && self.barrier_interrupted
    }
}
