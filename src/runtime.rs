//! Boundary to the host VR runtime.
//!
//! The host plugin shim owns device registration and property containers. It
//! calls [`Driver::run_frame`] once per render tick and implements
//! [`RuntimeHost`] to receive poses and input values.

use crate::channel::Channel;
use crate::codec;
use crate::engine::{Frame, PoseEngine};
use crate::input::InputSource;
use crate::types::{ControllerInputs, DeviceId, DevicePose, Hand, HostEvent};
use crossbeam_channel::{Receiver, Sender};
use std::collections::HashMap;

/// What the core needs from the host runtime.
pub trait RuntimeHost {
    fn publish_pose(&mut self, device: DeviceId, pose: &DevicePose);

    fn update_controller_inputs(&mut self, hand: Hand, inputs: &ControllerInputs);

    /// Next pending host event, or `None` once the queue is drained.
    fn poll_event(&mut self) -> Option<HostEvent>;
}

/// Counters kept across frames.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FrameStats {
    pub frames: u64,
    pub messages: u64,
    pub malformed: u64,
    pub haptic_requests: u64,
}

/// Per-tick glue: channel → codec → engine → host.
pub struct Driver<H: RuntimeHost, I: InputSource> {
    channel: Channel,
    engine: PoseEngine,
    host: H,
    input: I,
    stats: FrameStats,
}

impl<H: RuntimeHost, I: InputSource> Driver<H, I> {
    pub fn new(channel: Channel, engine: PoseEngine, host: H, input: I) -> Self {
        Self {
            channel,
            engine,
            host,
            input,
            stats: FrameStats::default(),
        }
    }

    /// Run one tick. Never blocks and never fails: a malformed message is
    /// logged and the tick continues with manual input only.
    pub fn run_frame(&mut self) -> Frame {
        self.stats.frames += 1;

        let message = self.channel.read().and_then(|text| match codec::decode(&text) {
            Ok(msg) => {
                self.stats.messages += 1;
                log::trace!("Pose message: {:?}", msg);
                Some(msg)
            }
            Err(e) => {
                self.stats.malformed += 1;
                log::warn!("{}", e);
                None
            }
        });

        let frame = self.engine.tick(message.as_ref(), &self.input);

        self.host.publish_pose(DeviceId::Head, &frame.head);
        for hand in Hand::BOTH {
            let controller = frame.controller(hand);
            self.host.publish_pose(hand.device(), &controller.pose);
            self.host.update_controller_inputs(hand, &controller.inputs);
        }

        while let Some(event) = self.host.poll_event() {
            self.handle_event(event);
        }

        if frame.cursor_locked {
            self.input.center_pointer();
        }
        frame
    }

    fn handle_event(&mut self, event: HostEvent) {
        match event {
            HostEvent::HapticVibration {
                device,
                duration_s,
                frequency,
                amplitude,
            } => {
                if device.hand().is_some() {
                    self.stats.haptic_requests += 1;
                    log::info!(
                        "BUZZ! {:?} duration={:.3}s freq={:.1}Hz amp={:.2}",
                        device,
                        duration_s,
                        frequency,
                        amplitude
                    );
                }
            }
            HostEvent::Other(kind) => log::trace!("Ignoring host event {}", kind),
        }
    }

    pub fn stats(&self) -> FrameStats {
        self.stats
    }

    pub fn engine(&self) -> &PoseEngine {
        &self.engine
    }

    /// Direct access for calibration requests coming from the host UI.
    pub fn engine_mut(&mut self) -> &mut PoseEngine {
        &mut self.engine
    }

    pub fn host(&self) -> &H {
        &self.host
    }

    pub fn host_mut(&mut self) -> &mut H {
        &mut self.host
    }

    pub fn input_mut(&mut self) -> &mut I {
        &mut self.input
    }
}

/// In-process host that records what the driver publishes.
///
/// Host events are injected from any thread through [`LoopbackHost::event_sender`].
pub struct LoopbackHost {
    poses: HashMap<DeviceId, DevicePose>,
    inputs: [ControllerInputs; 2],
    publish_count: u64,
    event_tx: Sender<HostEvent>,
    event_rx: Receiver<HostEvent>,
}

impl LoopbackHost {
    pub fn new() -> Self {
        let (event_tx, event_rx) = crossbeam_channel::bounded(64);
        Self {
            poses: HashMap::new(),
            inputs: [ControllerInputs::default(); 2],
            publish_count: 0,
            event_tx,
            event_rx,
        }
    }

    pub fn event_sender(&self) -> Sender<HostEvent> {
        self.event_tx.clone()
    }

    /// Last pose published for `device`.
    pub fn pose(&self, device: DeviceId) -> Option<&DevicePose> {
        self.poses.get(&device)
    }

    pub fn inputs(&self, hand: Hand) -> &ControllerInputs {
        &self.inputs[hand.index()]
    }

    pub fn publish_count(&self) -> u64 {
        self.publish_count
    }
}

impl Default for LoopbackHost {
    fn default() -> Self {
        Self::new()
    }
}

impl RuntimeHost for LoopbackHost {
    fn publish_pose(&mut self, device: DeviceId, pose: &DevicePose) {
        self.publish_count += 1;
        self.poses.insert(device, *pose);
    }

    fn update_controller_inputs(&mut self, hand: Hand, inputs: &ControllerInputs) {
        self.inputs[hand.index()] = *inputs;
    }

    fn poll_event(&mut self) -> Option<HostEvent> {
        self.event_rx.try_recv().ok()
    }
}
