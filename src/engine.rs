//! Per-tick pose engine for the head and both controllers.
//!
//! All calibration and toggle state lives on a [`PoseEngine`] value owned by the
//! frame loop; nothing is process-global.

use crate::input::InputSource;
use crate::orientation::{
    controller_quaternion, euler_delta, head_quaternion, rotate_around_y, DEFAULT_PERIOD_DEG,
};
use crate::types::{ControllerInputs, DevicePose, Hand, PoseMessage, Signals, TrackingResult};
use serde::{Deserialize, Serialize};

/// Tunables for the engine. Defaults reproduce the desktop driver.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Radians of head rotation per pointer unit while cursor-lock is on.
    pub pointer_gain: f64,
    /// Meters moved per tick while a direction signal is held.
    pub move_step: f64,
    /// Wrap period for per-tick controller rotation deltas, degrees.
    pub rotation_period_deg: f64,
    /// Resting offset of the right hand relative to the head, meters.
    /// The left hand mirrors x.
    pub hand_rest_offset: [f64; 3],
    /// Controller tracking starts active.
    pub tracking_active_at_start: bool,
    pub cursor_lock_at_start: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            pointer_gain: 0.01,
            move_step: 0.01,
            rotation_period_deg: DEFAULT_PERIOD_DEG,
            hand_rest_offset: [0.0; 3],
            tracking_active_at_start: true,
            cursor_lock_at_start: false,
        }
    }
}

/// Rising-edge detector: true only on the tick an input goes from released to held.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EdgeLatch {
    held: bool,
}

impl EdgeLatch {
    pub fn rising(&mut self, level: bool) -> bool {
        let edge = level && !self.held;
        self.held = level;
        edge
    }
}

/// Boolean mode flipped once per rising edge of its input.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Toggle {
    on: bool,
    latch: EdgeLatch,
}

impl Toggle {
    pub fn new(on: bool) -> Self {
        Self {
            on,
            latch: EdgeLatch::default(),
        }
    }

    pub fn is_on(&self) -> bool {
        self.on
    }

    /// Feed this tick's input level. Returns true when the state flipped.
    pub fn update(&mut self, level: bool) -> bool {
        if self.latch.rising(level) {
            self.on = !self.on;
            true
        } else {
            false
        }
    }
}

/// Head orientation accumulators and world position.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct HeadState {
    pub yaw: f64,
    /// Rotation about the vertical axis; also the heading used for movement.
    pub pitch: f64,
    pub roll: f64,
    pub position: [f64; 3],
    /// Heading frozen at the last head-yaw reset. Controllers are placed in
    /// this frame.
    pub front: f64,
}

/// One controller's accumulated rotation, raw inputs and calibration.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct ControllerState {
    pub roll: f64,
    pub pitch: f64,
    pub yaw: f64,
    /// Last raw translation received from the phone.
    pub raw_position: [f64; 3],
    /// Raw translation captured at the last full recenter.
    pub correction: [f64; 3],
    /// Last absolute rotation sample, degrees, used for the next delta.
    pub previous_rotation: [f64; 3],
    pub trackpad: [f64; 2],
    pub trackpad_clicked: bool,
    pub trigger: f64,
}

impl ControllerState {
    fn recenter_rotation(&mut self, front: f64) {
        self.roll = 0.0;
        self.yaw = 0.0;
        self.pitch = front;
    }

    fn recenter(&mut self, front: f64) {
        self.correction = self.raw_position;
        self.recenter_rotation(front);
    }
}

/// Controller output for one tick.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ControllerFrame {
    pub pose: DevicePose,
    pub inputs: ControllerInputs,
}

/// Everything the engine produces for one tick.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Frame {
    pub head: DevicePose,
    /// Indexed by [`Hand::index`].
    pub controllers: [ControllerFrame; 2],
    pub cursor_locked: bool,
    pub tracking_active: bool,
}

impl Frame {
    pub fn controller(&self, hand: Hand) -> &ControllerFrame {
        &self.controllers[hand.index()]
    }
}

#[derive(Debug, Clone, Copy, Default)]
struct CalibrationLatches {
    heading: EdgeLatch,
    position: EdgeLatch,
}

/// Calibration and transform state for the head and both controllers.
#[derive(Debug, Clone)]
pub struct PoseEngine {
    config: EngineConfig,
    head: HeadState,
    controllers: [ControllerState; 2],
    cursor_lock: Toggle,
    tracking: Toggle,
    latches: CalibrationLatches,
}

impl PoseEngine {
    pub fn new(config: EngineConfig) -> Self {
        Self {
            cursor_lock: Toggle::new(config.cursor_lock_at_start),
            tracking: Toggle::new(config.tracking_active_at_start),
            config,
            head: HeadState::default(),
            controllers: [ControllerState::default(); 2],
            latches: CalibrationLatches::default(),
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn head(&self) -> &HeadState {
        &self.head
    }

    pub fn controller(&self, hand: Hand) -> &ControllerState {
        &self.controllers[hand.index()]
    }

    pub fn cursor_locked(&self) -> bool {
        self.cursor_lock.is_on()
    }

    pub fn tracking_active(&self) -> bool {
        self.tracking.is_on()
    }

    /// Zero the head yaw and freeze the current heading as the controllers'
    /// front direction.
    pub fn reset_head_yaw(&mut self) {
        self.head.yaw = 0.0;
        self.head.front = self.head.pitch;
        log::info!("Head yaw reset, front direction {:.3} rad", self.head.front);
    }

    /// Move the head back to the origin.
    pub fn reset_position(&mut self) {
        self.head.position = [0.0; 3];
        log::info!("Head position reset");
    }

    /// Capture the current raw position as the controller's zero and align its
    /// rotation with the front direction.
    pub fn recenter_controller(&mut self, hand: Hand) {
        let front = self.head.front;
        self.controllers[hand.index()].recenter(front);
        log::info!("{:?} controller recentered", hand);
    }

    /// Align the controller's rotation with the front direction, keeping its
    /// position correction.
    pub fn recenter_controller_rotation(&mut self, hand: Hand) {
        let front = self.head.front;
        self.controllers[hand.index()].recenter_rotation(front);
        log::debug!("{:?} controller rotation recentered", hand);
    }

    /// Advance one tick.
    ///
    /// `message` is the pose update decoded this tick, if any. A controller
    /// not targeted by it gets a zero rotation delta; its last position and
    /// input values are kept.
    pub fn tick(&mut self, message: Option<&PoseMessage>, input: &dyn InputSource) -> Frame {
        let signals = input.signals();

        if self.cursor_lock.update(signals.contains(Signals::CURSOR_LOCK)) {
            log::info!("Cursor lock {}", on_off(self.cursor_lock.is_on()));
        }
        if self.tracking.update(signals.contains(Signals::TRACKING_TOGGLE)) {
            log::info!("Controller tracking {}", on_off(self.tracking.is_on()));
        }
        let recenter_heading = self
            .latches
            .heading
            .rising(signals.contains(Signals::RECENTER_HEADING));
        let recenter_position = self
            .latches
            .position
            .rising(signals.contains(Signals::RECENTER_POSITION));

        let deltas = self.apply_message(message);

        let head = self.update_head(input, signals, recenter_heading, recenter_position);

        let controllers = Hand::BOTH.map(|hand| {
            if recenter_position {
                self.recenter_controller(hand);
            } else if recenter_heading {
                self.recenter_controller_rotation(hand);
            }
            self.update_controller(hand, deltas[hand.index()], signals)
        });

        Frame {
            head,
            controllers,
            cursor_locked: self.cursor_lock.is_on(),
            tracking_active: self.tracking.is_on(),
        }
    }

    /// Store the message's raw values on its controller and return the
    /// rotation delta for each hand.
    fn apply_message(&mut self, message: Option<&PoseMessage>) -> [[f64; 3]; 2] {
        let mut deltas = [[0.0; 3]; 2];
        let Some(msg) = message else {
            return deltas;
        };
        let Some(hand) = msg.controller else {
            log::debug!("Pose message for unknown controller ignored");
            return deltas;
        };

        let state = &mut self.controllers[hand.index()];
        deltas[hand.index()] = euler_delta(
            state.previous_rotation,
            msg.rotation,
            self.config.rotation_period_deg,
        );
        state.previous_rotation = msg.rotation;
        state.raw_position = msg.translation;
        state.trackpad = msg.trackpad;
        state.trackpad_clicked = msg.trackpad_clicked;
        state.trigger = msg.trigger;
        deltas
    }

    fn update_head(
        &mut self,
        input: &dyn InputSource,
        signals: Signals,
        recenter_heading: bool,
        recenter_position: bool,
    ) -> DevicePose {
        if self.cursor_lock.is_on() {
            let (dx, dy) = input.pointer_delta();
            self.head.pitch -= dx * self.config.pointer_gain;
            self.head.roll -= dy * self.config.pointer_gain;
        }
        if recenter_heading {
            self.reset_head_yaw();
        }

        let step = self.config.move_step;
        let (sin_h, cos_h) = self.head.pitch.sin_cos();
        let pos = &mut self.head.position;
        if signals.contains(Signals::MOVE_FORWARD) {
            pos[2] -= step * cos_h;
            pos[0] -= step * sin_h;
        }
        if signals.contains(Signals::MOVE_BACK) {
            pos[2] += step * cos_h;
            pos[0] += step * sin_h;
        }
        if signals.contains(Signals::MOVE_LEFT) {
            pos[0] -= step * cos_h;
            pos[2] += step * sin_h;
        }
        if signals.contains(Signals::MOVE_RIGHT) {
            pos[0] += step * cos_h;
            pos[2] -= step * sin_h;
        }
        if signals.contains(Signals::MOVE_UP) {
            pos[1] += step;
        }
        if signals.contains(Signals::MOVE_DOWN) {
            pos[1] -= step;
        }
        if recenter_position {
            self.reset_position();
        }

        DevicePose {
            position: self.head.position,
            rotation: head_quaternion(self.head.yaw, self.head.pitch, self.head.roll),
            valid: true,
            connected: true,
            result: TrackingResult::RunningOk,
        }
    }

    fn update_controller(
        &mut self,
        hand: Hand,
        delta: [f64; 3],
        signals: Signals,
    ) -> ControllerFrame {
        let head = self.head;
        let rest = self.config.hand_rest_offset;
        let state = &mut self.controllers[hand.index()];

        let local = [
            state.raw_position[0] - state.correction[0] + rest[0] * hand.lateral_sign(),
            state.raw_position[1] - state.correction[1] + rest[1],
            state.raw_position[2] - state.correction[2] + rest[2],
        ];
        let (x, z) = rotate_around_y(local[0], local[2], head.front);
        let position = [
            x + head.position[0],
            local[1] + head.position[1],
            z + head.position[2],
        ];

        // Sample order on the wire is [yaw, pitch, roll].
        state.yaw += delta[0];
        state.pitch += delta[1];
        state.roll += delta[2];

        let tracking = self.tracking.is_on();
        let pose = DevicePose {
            position,
            rotation: controller_quaternion(state.roll, state.pitch, state.yaw),
            valid: tracking,
            connected: true,
            result: if tracking {
                TrackingResult::RunningOk
            } else {
                TrackingResult::OutOfRange
            },
        };

        let inputs = ControllerInputs {
            button_a: signals.contains(Signals::BUTTON_A),
            button_b: signals.contains(Signals::BUTTON_B),
            trackpad: state.trackpad,
            trackpad_touched: state.trackpad[0] != 0.0 || state.trackpad[1] != 0.0,
            trackpad_clicked: state.trackpad_clicked,
            trigger_value: state.trigger,
            trigger_clicked: state.trigger > 0.0,
        };

        ControllerFrame { pose, inputs }
    }
}

impl Default for PoseEngine {
    fn default() -> Self {
        Self::new(EngineConfig::default())
    }
}

fn on_off(on: bool) -> &'static str {
    if on {
        "on"
    } else {
        "off"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::input::InputSnapshot;
    use crate::types::Quaternion;

    const EPS: f64 = 1e-12;

    fn message(hand: Hand, rotation: [f64; 3], translation: [f64; 3]) -> PoseMessage {
        PoseMessage {
            controller: Some(hand),
            translation,
            rotation,
            ..PoseMessage::default()
        }
    }

    fn idle() -> InputSnapshot {
        InputSnapshot::idle()
    }

    fn assert_close(a: [f64; 3], b: [f64; 3]) {
        for i in 0..3 {
            assert!((a[i] - b[i]).abs() < EPS, "{:?} != {:?}", a, b);
        }
    }

    #[test]
    fn test_idle_tick_is_identity() {
        let mut engine = PoseEngine::default();
        let frame = engine.tick(None, &idle());

        assert_eq!(frame.head.rotation, Quaternion::IDENTITY);
        assert_eq!(frame.head.position, [0.0; 3]);
        assert!(frame.head.valid && frame.head.connected);
        for hand in Hand::BOTH {
            let c = frame.controller(hand);
            assert_eq!(c.pose.rotation, Quaternion::IDENTITY);
            assert_eq!(c.pose.position, [0.0; 3]);
            assert!(c.pose.valid);
            assert_eq!(c.inputs, ControllerInputs::default());
        }
        assert!(frame.tracking_active);
        assert!(!frame.cursor_locked);
    }

    #[test]
    fn test_message_only_rotates_its_controller() {
        let mut engine = PoseEngine::default();
        engine.tick(Some(&message(Hand::Left, [5.0, 5.0, 5.0], [0.0; 3])), &idle());
        let left_before = *engine.controller(Hand::Left);

        engine.tick(Some(&message(Hand::Right, [10.0, 20.0, 30.0], [0.0; 3])), &idle());

        let right = engine.controller(Hand::Right);
        assert!((right.yaw - 10.0 / 360.0).abs() < EPS);
        assert!((right.pitch - 20.0 / 360.0).abs() < EPS);
        assert!((right.roll - 30.0 / 360.0).abs() < EPS);

        let left = engine.controller(Hand::Left);
        assert_eq!(left.yaw, left_before.yaw);
        assert_eq!(left.pitch, left_before.pitch);
        assert_eq!(left.roll, left_before.roll);
    }

    #[test]
    fn test_yaw_accumulates_delta_between_samples() {
        let mut engine = PoseEngine::default();
        let first = PoseMessage {
            trigger: 0.3,
            ..message(Hand::Right, [10.0, 0.0, 0.0], [0.0; 3])
        };
        engine.tick(Some(&first), &idle());
        let yaw_after_first = engine.controller(Hand::Right).yaw;

        engine.tick(Some(&message(Hand::Right, [19.0, 0.0, 0.0], [0.0; 3])), &idle());
        let yaw_after_second = engine.controller(Hand::Right).yaw;

        assert!((yaw_after_second - yaw_after_first - 9.0 / 360.0).abs() < EPS);
        assert_eq!(*engine.controller(Hand::Left), ControllerState::default());
    }

    #[test]
    fn test_no_message_means_no_delta() {
        let mut engine = PoseEngine::default();
        engine.tick(Some(&message(Hand::Right, [30.0, 0.0, 0.0], [0.0; 3])), &idle());
        let yaw = engine.controller(Hand::Right).yaw;

        for _ in 0..5 {
            engine.tick(None, &idle());
        }
        assert_eq!(engine.controller(Hand::Right).yaw, yaw);
    }

    #[test]
    fn test_unknown_controller_changes_nothing() {
        let mut engine = PoseEngine::default();
        let msg = PoseMessage {
            controller: None,
            rotation: [40.0, 40.0, 40.0],
            translation: [1.0, 1.0, 1.0],
            ..PoseMessage::default()
        };
        engine.tick(Some(&msg), &idle());
        for hand in Hand::BOTH {
            assert_eq!(*engine.controller(hand), ControllerState::default());
        }
    }

    #[test]
    fn test_cursor_lock_flips_once_on_rising_edge() {
        let mut engine = PoseEngine::default();
        let held = InputSnapshot::held(Signals::CURSOR_LOCK);

        let states: Vec<bool> = (0..3).map(|_| engine.tick(None, &held).cursor_locked).collect();
        assert_eq!(states, vec![true, true, true]);

        // Release, then press again to turn it off.
        assert!(engine.tick(None, &idle()).cursor_locked);
        assert!(!engine.tick(None, &held).cursor_locked);
    }

    #[test]
    fn test_toggle_edge_latch() {
        let mut toggle = Toggle::new(false);
        assert!(toggle.update(true));
        assert!(!toggle.update(true));
        assert!(!toggle.update(false));
        assert!(toggle.is_on());
        assert!(toggle.update(true));
        assert!(!toggle.is_on());
    }

    #[test]
    fn test_pointer_only_moves_head_while_locked() {
        let mut engine = PoseEngine::default();
        engine.tick(None, &idle().with_pointer(50.0, 20.0));
        assert_eq!(engine.head().pitch, 0.0);
        assert_eq!(engine.head().roll, 0.0);

        engine.tick(None, &InputSnapshot::held(Signals::CURSOR_LOCK).with_pointer(50.0, 20.0));
        assert!((engine.head().pitch + 0.5).abs() < EPS);
        assert!((engine.head().roll + 0.2).abs() < EPS);
        assert_eq!(engine.head().yaw, 0.0);
    }

    #[test]
    fn test_tracking_toggle_marks_controllers_out_of_range() {
        let mut engine = PoseEngine::default();
        let frame = engine.tick(None, &InputSnapshot::held(Signals::TRACKING_TOGGLE));
        assert!(!frame.tracking_active);
        for hand in Hand::BOTH {
            let pose = frame.controller(hand).pose;
            assert!(!pose.valid);
            assert!(pose.connected);
            assert_eq!(pose.result, TrackingResult::OutOfRange);
        }
        // Head is unaffected.
        assert!(frame.head.valid);
    }

    #[test]
    fn test_directional_movement_follows_heading() {
        let mut engine = PoseEngine::default();
        engine.tick(None, &InputSnapshot::held(Signals::MOVE_FORWARD));
        assert_close(engine.head().position, [0.0, 0.0, -0.01]);

        engine.tick(None, &InputSnapshot::held(Signals::MOVE_RIGHT | Signals::MOVE_UP));
        assert_close(engine.head().position, [0.01, 0.01, -0.01]);

        // Turn a quarter to the left: forward now walks along -x.
        let mut engine = PoseEngine::default();
        engine.head.pitch = std::f64::consts::FRAC_PI_2;
        engine.tick(None, &InputSnapshot::held(Signals::MOVE_FORWARD));
        assert_close(engine.head().position, [-0.01, 0.0, 0.0]);
    }

    #[test]
    fn test_position_reset() {
        let mut engine = PoseEngine::default();
        for _ in 0..3 {
            engine.tick(None, &InputSnapshot::held(Signals::MOVE_BACK | Signals::MOVE_DOWN));
        }
        assert_close(engine.head().position, [0.0, -0.03, 0.03]);

        engine.tick(None, &InputSnapshot::held(Signals::RECENTER_POSITION));
        assert_eq!(engine.head().position, [0.0; 3]);
    }

    #[test]
    fn test_head_yaw_reset_freezes_front_direction() {
        let mut engine = PoseEngine::default();
        engine.head.yaw = 0.4;
        engine.head.pitch = 0.25;

        engine.tick(None, &InputSnapshot::held(Signals::RECENTER_HEADING));
        assert_eq!(engine.head().yaw, 0.0);
        assert_eq!(engine.head().front, 0.25);
        // Controllers align with the new front.
        for hand in Hand::BOTH {
            assert_eq!(engine.controller(hand).pitch, 0.25);
        }

        // Turning afterwards does not move the frozen front.
        engine.tick(None, &InputSnapshot::held(Signals::CURSOR_LOCK).with_pointer(10.0, 0.0));
        assert!((engine.head().pitch - 0.15).abs() < EPS);
        assert_eq!(engine.head().front, 0.25);
    }

    #[test]
    fn test_full_recenter_cancels_raw_position() {
        let mut engine = PoseEngine::default();
        // Walk the head somewhere first.
        engine.tick(None, &InputSnapshot::held(Signals::MOVE_UP | Signals::MOVE_LEFT));
        engine.tick(Some(&message(Hand::Right, [0.0; 3], [1.0, 2.0, 3.0])), &idle());

        engine.recenter_controller(Hand::Right);
        let frame = engine.tick(Some(&message(Hand::Right, [0.0; 3], [1.0, 2.0, 3.0])), &idle());

        assert_close(frame.controller(Hand::Right).pose.position, engine.head().position);
    }

    #[test]
    fn test_recenter_signal_recaptures_both_controllers() {
        let mut engine = PoseEngine::default();
        engine.tick(Some(&message(Hand::Right, [0.0; 3], [1.0, 2.0, 3.0])), &idle());
        engine.tick(Some(&message(Hand::Left, [0.0; 3], [-1.0, 0.5, 0.0])), &idle());

        let frame = engine.tick(None, &InputSnapshot::held(Signals::RECENTER_POSITION));
        for hand in Hand::BOTH {
            assert_close(frame.controller(hand).pose.position, [0.0; 3]);
        }
        assert_eq!(engine.controller(Hand::Right).correction, [1.0, 2.0, 3.0]);
        assert_eq!(engine.controller(Hand::Left).correction, [-1.0, 0.5, 0.0]);
    }

    #[test]
    fn test_rotation_recenter_keeps_position_correction() {
        let mut engine = PoseEngine::default();
        engine.tick(Some(&message(Hand::Left, [20.0, 20.0, 20.0], [1.0, 0.0, 0.0])), &idle());
        engine.recenter_controller(Hand::Left);
        engine.tick(Some(&message(Hand::Left, [25.0, 25.0, 25.0], [2.0, 0.0, 0.0])), &idle());

        engine.recenter_controller_rotation(Hand::Left);
        let state = engine.controller(Hand::Left);
        assert_eq!((state.roll, state.yaw, state.pitch), (0.0, 0.0, 0.0));
        assert_eq!(state.correction, [1.0, 0.0, 0.0]);
        assert_eq!(state.raw_position, [2.0, 0.0, 0.0]);
    }

    #[test]
    fn test_controller_offset_rotates_with_front() {
        let mut engine = PoseEngine::default();
        engine.head.pitch = std::f64::consts::FRAC_PI_2;
        engine.reset_head_yaw();

        let frame = engine.tick(Some(&message(Hand::Right, [0.0; 3], [1.0, 0.5, 0.0])), &idle());
        // (1, 0) rotated a quarter turn about +Y lands on (0, -1).
        assert_close(frame.controller(Hand::Right).pose.position, [0.0, 0.5, -1.0]);
    }

    #[test]
    fn test_hand_rest_offset_mirrors_left() {
        let mut engine = PoseEngine::new(EngineConfig {
            hand_rest_offset: [0.2, -0.3, -0.3],
            ..EngineConfig::default()
        });
        let frame = engine.tick(None, &idle());
        assert_close(frame.controller(Hand::Right).pose.position, [0.2, -0.3, -0.3]);
        assert_close(frame.controller(Hand::Left).pose.position, [-0.2, -0.3, -0.3]);
    }

    #[test]
    fn test_controller_inputs_follow_message_and_signals() {
        let mut engine = PoseEngine::default();
        let msg = PoseMessage {
            controller: Some(Hand::Left),
            trackpad: [0.0, -0.5],
            trackpad_clicked: true,
            trigger: 0.4,
            ..PoseMessage::default()
        };
        let frame = engine.tick(Some(&msg), &InputSnapshot::held(Signals::BUTTON_B));

        let left = frame.controller(Hand::Left).inputs;
        assert!(left.trackpad_touched && left.trackpad_clicked);
        assert_eq!(left.trackpad, [0.0, -0.5]);
        assert_eq!(left.trigger_value, 0.4);
        assert!(left.trigger_clicked);
        assert!(left.button_b && !left.button_a);

        let right = frame.controller(Hand::Right).inputs;
        assert!(!right.trackpad_touched && !right.trigger_clicked);

        // Values persist on later ticks without messages.
        let frame = engine.tick(None, &idle());
        assert_eq!(frame.controller(Hand::Left).inputs.trigger_value, 0.4);
        assert!(!frame.controller(Hand::Left).inputs.button_b);
    }
}
