/// Unit quaternion in the host runtime's `(w, x, y, z)` convention.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Quaternion {
    pub w: f64,
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl Quaternion {
    pub const IDENTITY: Quaternion = Quaternion {
        w: 1.0,
        x: 0.0,
        y: 0.0,
        z: 0.0,
    };

    pub fn norm(&self) -> f64 {
        (self.w * self.w + self.x * self.x + self.y * self.y + self.z * self.z).sqrt()
    }
}

impl Default for Quaternion {
    fn default() -> Self {
        Quaternion::IDENTITY
    }
}

/// Tracking state reported alongside a pose.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrackingResult {
    RunningOk = 0,
    /// Device is connected but tracking is paused.
    OutOfRange = 1,
}

/// Pose record published to the host runtime once per tick.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DevicePose {
    /// World position in meters [x, y, z].
    pub position: [f64; 3],
    pub rotation: Quaternion,
    pub valid: bool,
    pub connected: bool,
    pub result: TrackingResult,
}

impl Default for DevicePose {
    fn default() -> Self {
        Self {
            position: [0.0; 3],
            rotation: Quaternion::IDENTITY,
            valid: true,
            connected: true,
            result: TrackingResult::RunningOk,
        }
    }
}

/// One of the two hand controllers.
///
/// The wire id is `0` for the right hand and `1` for the left hand.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Hand {
    Right = 0,
    Left = 1,
}

impl Hand {
    pub const BOTH: [Hand; 2] = [Hand::Right, Hand::Left];

    pub fn index(self) -> usize {
        self as usize
    }

    /// Map a decoded `id` field to a hand. Anything other than exactly 0 or 1
    /// targets no controller.
    pub fn from_wire(id: f64) -> Option<Hand> {
        if id == 0.0 {
            Some(Hand::Right)
        } else if id == 1.0 {
            Some(Hand::Left)
        } else {
            None
        }
    }

    pub fn device(self) -> DeviceId {
        match self {
            Hand::Right => DeviceId::RightHand,
            Hand::Left => DeviceId::LeftHand,
        }
    }

    /// +1 for the right hand, -1 for the left, used to mirror lateral offsets.
    pub fn lateral_sign(self) -> f64 {
        match self {
            Hand::Right => 1.0,
            Hand::Left => -1.0,
        }
    }
}

/// Devices posed by the engine.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DeviceId {
    Head = 0,
    RightHand = 1,
    LeftHand = 2,
}

impl DeviceId {
    pub fn hand(self) -> Option<Hand> {
        match self {
            DeviceId::Head => None,
            DeviceId::RightHand => Some(Hand::Right),
            DeviceId::LeftHand => Some(Hand::Left),
        }
    }
}

/// Decoded controller update received from the phone app.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct PoseMessage {
    /// Target controller, `None` when the id is neither 0 nor 1.
    pub controller: Option<Hand>,
    /// Controller-local translation [x, y, z].
    pub translation: [f64; 3],
    /// Absolute Euler sample in degrees [yaw, pitch, roll].
    pub rotation: [f64; 3],
    /// Normalized trackpad axes [x, y].
    pub trackpad: [f64; 2],
    pub trackpad_clicked: bool,
    /// Trigger pull in [0, 1].
    pub trigger: f64,
}

/// Input component values for one controller.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct ControllerInputs {
    pub button_a: bool,
    pub button_b: bool,
    pub trackpad: [f64; 2],
    pub trackpad_touched: bool,
    pub trackpad_clicked: bool,
    pub trigger_value: f64,
    pub trigger_clicked: bool,
}

bitflags::bitflags! {
    /// Manual debug controls sampled once per tick.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    #[repr(C)]
    pub struct Signals: u32 {
        /// Toggles pointer-driven head rotation.
        const CURSOR_LOCK       = 1 << 0;
        /// Toggles controller tracking (valid vs. out-of-range).
        const TRACKING_TOGGLE   = 1 << 1;
        const MOVE_FORWARD      = 1 << 2;
        const MOVE_BACK         = 1 << 3;
        const MOVE_LEFT         = 1 << 4;
        const MOVE_RIGHT        = 1 << 5;
        const MOVE_UP           = 1 << 6;
        const MOVE_DOWN         = 1 << 7;
        /// Head-yaw reset plus controller rotation recenter.
        const RECENTER_HEADING  = 1 << 8;
        /// Head position reset plus controller full recenter.
        const RECENTER_POSITION = 1 << 9;
        const BUTTON_A          = 1 << 10;
        const BUTTON_B          = 1 << 11;
    }
}

/// Events the host runtime delivers back to the driver.
#[derive(Debug, Clone, PartialEq)]
pub enum HostEvent {
    HapticVibration {
        device: DeviceId,
        duration_s: f32,
        frequency: f32,
        amplitude: f32,
    },
    /// Any event type the driver does not handle.
    Other(u32),
}
