// Frame bookkeeping shared by both backends
//
// Nothing in here touches the GPU. The contexts drive these types and
// issue the native waits/signals they ask for.

use crate::error::{GraphicsError, Result};

/// A zero-sized window (minimized) has nothing to present to.
pub fn is_minimized(width: u32, height: u32) -> bool {
    width == 0 || height == 0
}

/// Where a context is inside the begin/end/present protocol.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FramePhase {
    /// No frame open; `begin_frame` is the only valid call.
    Idle,
    /// Command buffer is open for recording.
    Recording,
    /// Work submitted, waiting for `present_frame`.
    Submitted,
}

/// Enforces `begin -> end -> present` ordering and tracks which
/// frame-in-flight slot the current frame uses.
#[derive(Debug)]
pub struct FrameLifecycle {
    phase: FramePhase,
    slot: usize,
    frames_in_flight: usize,
    frame_count: u64,
}

impl FrameLifecycle {
    pub fn new(frames_in_flight: usize) -> Self {
        Self {
            phase: FramePhase::Idle,
            slot: 0,
            frames_in_flight: frames_in_flight.max(1),
            frame_count: 0,
        }
    }

    pub fn phase(&self) -> FramePhase {
        self.phase
    }

    /// Frame-in-flight slot used by the current (or next) frame.
    pub fn slot(&self) -> usize {
        self.slot
    }

    pub fn frames_in_flight(&self) -> usize {
        self.frames_in_flight
    }

    /// Number of frames presented so far.
    pub fn frame_count(&self) -> u64 {
        self.frame_count
    }

    pub fn begin(&mut self) -> Result<()> {
        self.transition("begin_frame", FramePhase::Idle, FramePhase::Recording)
    }

    pub fn end(&mut self) -> Result<()> {
        self.transition("end_frame", FramePhase::Recording, FramePhase::Submitted)
    }

    pub fn present(&mut self) -> Result<()> {
        self.transition("present_frame", FramePhase::Submitted, FramePhase::Idle)?;
        self.slot = (self.slot + 1) % self.frames_in_flight;
        self.frame_count += 1;
        Ok(())
    }

    /// Drop a frame that was opened but never reached the GPU (swapchain
    /// lost, or a native call failed while recording or submitting). The
    /// slot is not advanced.
    pub fn abandon(&mut self) {
        if self.phase != FramePhase::Idle {
            log::debug!("Abandoning frame {} in phase {:?}", self.frame_count, self.phase);
        }
        self.phase = FramePhase::Idle;
    }

    fn transition(
        &mut self,
        operation: &'static str,
        expected: FramePhase,
        next: FramePhase,
    ) -> Result<()> {
        if self.phase != expected {
            return Err(GraphicsError::FrameOrder {
                operation,
                expected,
                actual: self.phase,
            });
        }
        self.phase = next;
        Ok(())
    }
}

/// Fence values guarding each D3D12 back buffer.
///
/// A single fence is signalled once per present with a strictly
/// increasing value; each back buffer remembers the value signalled
/// after its last use.
#[derive(Debug)]
pub struct FenceSchedule {
    last_signalled: u64,
    buffer_values: Vec<u64>,
}

impl FenceSchedule {
    pub fn new(buffer_count: usize) -> Self {
        Self {
            last_signalled: 0,
            buffer_values: vec![0; buffer_count],
        }
    }

    /// Value to pass to the next `Signal`.
    pub fn next_signal(&mut self) -> u64 {
        self.last_signalled += 1;
        self.last_signalled
    }

    pub fn last_signalled(&self) -> u64 {
        self.last_signalled
    }

    pub fn record(&mut self, buffer: usize, value: u64) {
        self.buffer_values[buffer] = value;
    }

    /// Value the CPU must wait for before reusing `buffer`, or `None`
    /// if the GPU already reached it.
    pub fn wait_target(&self, buffer: usize, completed: u64) -> Option<u64> {
        let value = self.buffer_values[buffer];
        (value > completed).then_some(value)
    }

    /// Forget per-buffer values after a full GPU flush, e.g. when the
    /// swap chain buffers are resized.
    pub fn reset(&mut self, buffer_count: usize) {
        self.buffer_values.clear();
        self.buffer_values.resize(buffer_count, 0);
    }

    pub fn buffer_count(&self) -> usize {
        self.buffer_values.len()
    }
}

/// Which frame slot last rendered into each swapchain image.
///
/// Images can come back from acquire in any order, so an image may still
/// be in use by a slot other than the one about to record into it.
#[derive(Debug, Default)]
pub struct ImageOwnership {
    owners: Vec<Option<usize>>,
}

impl ImageOwnership {
    pub fn new(image_count: usize) -> Self {
        Self {
            owners: vec![None; image_count],
        }
    }

    /// Claim `image` for `slot`, returning the previous owner if it was a
    /// different slot whose fence must be waited on first.
    pub fn claim(&mut self, image: usize, slot: usize) -> Option<usize> {
        let previous = self.owners[image].replace(slot);
        previous.filter(|&owner| owner != slot)
    }

    pub fn reset(&mut self, image_count: usize) {
        self.owners.clear();
        self.owners.resize(image_count, None);
    }

    pub fn image_count(&self) -> usize {
        self.owners.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lifecycle_runs_full_cycle() {
        let mut frames = FrameLifecycle::new(2);
        assert_eq!(frames.phase(), FramePhase::Idle);

        frames.begin().unwrap();
        assert_eq!(frames.phase(), FramePhase::Recording);
        frames.end().unwrap();
        assert_eq!(frames.phase(), FramePhase::Submitted);
        frames.present().unwrap();

        assert_eq!(frames.phase(), FramePhase::Idle);
        assert_eq!(frames.slot(), 1);
        assert_eq!(frames.frame_count(), 1);
    }

    #[test]
    fn slot_wraps_around_frames_in_flight() {
        let mut frames = FrameLifecycle::new(3);
        let mut slots = Vec::new();
        for _ in 0..5 {
            slots.push(frames.slot());
            frames.begin().unwrap();
            frames.end().unwrap();
            frames.present().unwrap();
        }
        assert_eq!(slots, vec![0, 1, 2, 0, 1]);
        assert_eq!(frames.frame_count(), 5);
    }

    #[test]
    fn out_of_order_calls_are_rejected() {
        let mut frames = FrameLifecycle::new(2);

        let err = frames.end().unwrap_err();
        assert!(matches!(
            err,
            GraphicsError::FrameOrder {
                operation: "end_frame",
                expected: FramePhase::Recording,
                actual: FramePhase::Idle,
            }
        ));
        assert!(frames.present().is_err());

        frames.begin().unwrap();
        assert!(frames.begin().is_err());
        assert!(frames.present().is_err());
        assert_eq!(frames.phase(), FramePhase::Recording);
    }

    #[test]
    fn abandon_returns_to_idle_without_advancing() {
        let mut frames = FrameLifecycle::new(2);
        frames.begin().unwrap();
        frames.abandon();

        assert_eq!(frames.phase(), FramePhase::Idle);
        assert_eq!(frames.slot(), 0);
        assert_eq!(frames.frame_count(), 0);
        frames.begin().unwrap();
    }

    #[test]
    fn failed_submit_can_be_abandoned() {
        let mut frames = FrameLifecycle::new(2);
        frames.begin().unwrap();
        frames.end().unwrap();
        frames.abandon();

        assert_eq!(frames.phase(), FramePhase::Idle);
        assert_eq!(frames.slot(), 0);
        assert!(frames.present().is_err());
        frames.begin().unwrap();
    }

    #[test]
    fn zero_extent_counts_as_minimized() {
        assert!(is_minimized(0, 0));
        assert!(is_minimized(0, 600));
        assert!(is_minimized(800, 0));
        assert!(!is_minimized(1, 1));
    }

    #[test]
    fn zero_frames_in_flight_is_treated_as_one() {
        let mut frames = FrameLifecycle::new(0);
        assert_eq!(frames.frames_in_flight(), 1);
        frames.begin().unwrap();
        frames.end().unwrap();
        frames.present().unwrap();
        assert_eq!(frames.slot(), 0);
    }

    #[test]
    fn fence_values_increase_and_gate_reuse() {
        let mut fences = FenceSchedule::new(2);
        assert_eq!(fences.wait_target(0, 0), None);

        let first = fences.next_signal();
        fences.record(0, first);
        let second = fences.next_signal();
        fences.record(1, second);
        assert!(second > first);

        // GPU has finished nothing yet
        assert_eq!(fences.wait_target(0, 0), Some(first));
        // GPU finished the first frame only
        assert_eq!(fences.wait_target(0, first), None);
        assert_eq!(fences.wait_target(1, first), Some(second));
    }

    #[test]
    fn fence_reset_keeps_counter() {
        let mut fences = FenceSchedule::new(2);
        let value = fences.next_signal();
        fences.record(1, value);

        fences.reset(3);
        assert_eq!(fences.buffer_count(), 3);
        assert_eq!(fences.wait_target(1, 0), None);
        assert_eq!(fences.next_signal(), value + 1);
    }

    #[test]
    fn image_claim_reports_foreign_owner() {
        let mut images = ImageOwnership::new(3);
        assert_eq!(images.claim(0, 0), None);
        assert_eq!(images.claim(1, 1), None);
        // slot 0 comes back around and gets image 1, still owned by slot 1
        assert_eq!(images.claim(1, 0), Some(1));
        // same slot re-claiming its own image needs no extra wait
        assert_eq!(images.claim(1, 0), None);
    }

    #[test]
    fn image_reset_clears_owners() {
        let mut images = ImageOwnership::new(2);
        images.claim(0, 1);
        images.reset(4);
        assert_eq!(images.image_count(), 4);
        assert_eq!(images.claim(0, 0), None);
    }
}
