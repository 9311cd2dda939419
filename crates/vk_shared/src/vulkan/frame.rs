//! Swapchain frame lifecycle
//!
//! [`FrameScheduler`] is the bookkeeping half of frame pacing. It never
//! touches the driver: the caller performs each Vulkan call and reports the
//! result, and the scheduler answers what to do next.
//!
//! ```text
//!            begin_frame / on_acquire(Ok)          on_submit
//!   Idle ─────────────────────────────▶ Acquired ───────────▶ Submitted
//!    ▲  ╲                                                        │
//!    │   ╲ on_acquire(OUT_OF_DATE)               on_present      │
//!    │    ▼                                 (ok / needs recreate)│
//!    │   NeedsRecreate ◀─────────────────────────────────────────┤
//!    │        │                                                  │
//!    └────────┴── on_swapchain_recreated ◀───────────── Idle ◀───┘
//! ```
//!
//! [`FrameSyncSet`] is the driver half: one semaphore/fence pair per frame
//! slot plus one `render_finished` semaphore per swapchain image, so a
//! present never waits on a semaphore another image may still be using.

use ash::{vk, Device};

use super::error::{VulkanError, VulkanResult};
use super::sync::{FrameSync, Semaphore};

/// Where the current frame is in its lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameState {
    /// Ready to start a frame
    Idle,
    /// A swapchain image is acquired and commands may be recorded
    Acquired {
        /// Acquired swapchain image
        image_index: u32,
    },
    /// Work for the image is submitted and awaits presentation
    Submitted {
        /// Submitted swapchain image
        image_index: u32,
    },
    /// The swapchain must be recreated before the next frame
    NeedsRecreate,
}

/// Result of reporting an acquire
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AcquireOutcome {
    /// Record and submit for `image_index`
    Proceed {
        /// Acquired swapchain image
        image_index: u32,
        /// Another frame slot whose fence must be waited before reusing the image
        wait_on_frame: Option<usize>,
    },
    /// Swapchain is out of date; recreate without resetting the frame fence
    Recreate,
}

/// Result of reporting a present
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PresentOutcome {
    /// Frame shown; continue normally
    Presented,
    /// Frame shown or dropped; recreate before the next frame
    Recreate,
}

/// Frames-in-flight bookkeeping for a swapchain
#[derive(Debug, Clone)]
pub struct FrameScheduler {
    max_frames_in_flight: usize,
    current_frame: usize,
    images_in_flight: Vec<Option<usize>>,
    state: FrameState,
    acquire_suboptimal: bool,
    resized: bool,
    frames_presented: u64,
}

impl FrameScheduler {
    /// Scheduler for `image_count` swapchain images
    ///
    /// `max_frames_in_flight` is clamped to at least one.
    pub fn new(max_frames_in_flight: usize, image_count: usize) -> Self {
        Self {
            max_frames_in_flight: max_frames_in_flight.max(1),
            current_frame: 0,
            images_in_flight: vec![None; image_count],
            state: FrameState::Idle,
            acquire_suboptimal: false,
            resized: false,
            frames_presented: 0,
        }
    }

    /// Current state
    pub fn state(&self) -> FrameState {
        self.state
    }

    /// Frame slot used by the frame being built
    pub fn current_frame(&self) -> usize {
        self.current_frame
    }

    /// Number of frame slots
    pub fn max_frames_in_flight(&self) -> usize {
        self.max_frames_in_flight
    }

    /// Swapchain images being tracked
    pub fn image_count(&self) -> usize {
        self.images_in_flight.len()
    }

    /// Frame slot that last submitted work for `image_index`
    pub fn image_owner(&self, image_index: u32) -> Option<usize> {
        self.images_in_flight.get(image_index as usize).copied().flatten()
    }

    /// Whether a resize was reported and not yet handled
    pub fn resize_pending(&self) -> bool {
        self.resized
    }

    /// Presents attempted so far
    pub fn frames_presented(&self) -> u64 {
        self.frames_presented
    }

    /// Whether the swapchain must be recreated before the next frame
    pub fn needs_recreate(&self) -> bool {
        self.state == FrameState::NeedsRecreate
    }

    /// Start a frame; returns the slot whose fence the caller waits on
    pub fn begin_frame(&self) -> VulkanResult<usize> {
        self.expect_state("begin a frame", matches!(self.state, FrameState::Idle))?;
        Ok(self.current_frame)
    }

    /// Report the result of `vkAcquireNextImageKHR` as `(index, suboptimal)`
    pub fn on_acquire(&mut self, result: Result<(u32, bool), vk::Result>) -> VulkanResult<AcquireOutcome> {
        self.expect_state("acquire", matches!(self.state, FrameState::Idle))?;

        let (image_index, suboptimal) = match result {
            Ok(acquired) => acquired,
            Err(vk::Result::ERROR_OUT_OF_DATE_KHR) => {
                log::debug!("Swapchain out of date on acquire");
                self.state = FrameState::NeedsRecreate;
                return Ok(AcquireOutcome::Recreate);
            }
            Err(e) => return Err(VulkanError::Api(e)),
        };

        let Some(owner) = self.images_in_flight.get(image_index as usize).copied() else {
            return Err(VulkanError::InvalidFrameState {
                operation: "acquire",
                state: format!(
                    "image {image_index} is outside the {} tracked swapchain images",
                    self.images_in_flight.len()
                ),
            });
        };

        self.acquire_suboptimal = suboptimal;
        self.state = FrameState::Acquired { image_index };
        Ok(AcquireOutcome::Proceed {
            image_index,
            wait_on_frame: owner.filter(|&frame| frame != self.current_frame),
        })
    }

    /// Record that the acquired image's work was submitted by the current slot
    pub fn on_submit(&mut self) -> VulkanResult<()> {
        let FrameState::Acquired { image_index } = self.state else {
            return Err(self.invalid("submit"));
        };
        self.images_in_flight[image_index as usize] = Some(self.current_frame);
        self.state = FrameState::Submitted { image_index };
        Ok(())
    }

    /// Report the result of `vkQueuePresentKHR` as `suboptimal`
    ///
    /// The frame slot advances whatever the result, since the submission is
    /// already queued and will signal its fence.
    pub fn on_present(&mut self, result: Result<bool, vk::Result>) -> VulkanResult<PresentOutcome> {
        self.expect_state("present", matches!(self.state, FrameState::Submitted { .. }))?;

        let present_stale = match result {
            Ok(suboptimal) => suboptimal,
            Err(vk::Result::ERROR_OUT_OF_DATE_KHR) => true,
            Err(e) => {
                self.advance(false);
                return Err(VulkanError::Api(e));
            }
        };

        let recreate = present_stale || self.acquire_suboptimal || self.resized;
        if recreate {
            log::debug!(
                "Swapchain recreation requested (present stale: {present_stale}, acquire suboptimal: {}, resized: {})",
                self.acquire_suboptimal,
                self.resized
            );
        }
        self.advance(recreate);

        Ok(if recreate {
            PresentOutcome::Recreate
        } else {
            PresentOutcome::Presented
        })
    }

    /// Note a framebuffer size change
    pub fn notify_resized(&mut self) {
        self.resized = true;
    }

    /// Track a new swapchain of `image_count` images and return to `Idle`
    pub fn on_swapchain_recreated(&mut self, image_count: usize) -> VulkanResult<()> {
        self.expect_state(
            "recreate the swapchain",
            matches!(self.state, FrameState::Idle | FrameState::NeedsRecreate),
        )?;
        self.images_in_flight = vec![None; image_count];
        self.acquire_suboptimal = false;
        self.resized = false;
        self.state = FrameState::Idle;
        Ok(())
    }

    fn advance(&mut self, recreate: bool) {
        self.resized = false;
        self.acquire_suboptimal = false;
        self.frames_presented += 1;
        self.current_frame = (self.current_frame + 1) % self.max_frames_in_flight;
        self.state = if recreate {
            FrameState::NeedsRecreate
        } else {
            FrameState::Idle
        };
    }

    fn expect_state(&self, operation: &'static str, ok: bool) -> VulkanResult<()> {
        if ok {
            Ok(())
        } else {
            Err(self.invalid(operation))
        }
    }

    fn invalid(&self, operation: &'static str) -> VulkanError {
        VulkanError::InvalidFrameState {
            operation,
            state: format!("{:?}", self.state),
        }
    }
}

/// Per-frame and per-image synchronization objects
pub struct FrameSyncSet {
    device: Device,
    frames: Vec<FrameSync>,
    render_finished: Vec<Semaphore>,
}

impl FrameSyncSet {
    /// `frames_in_flight` slots and `image_count` present semaphores
    pub fn new(device: Device, frames_in_flight: usize, image_count: usize) -> VulkanResult<Self> {
        let frames = (0..frames_in_flight)
            .map(|_| FrameSync::new(device.clone()))
            .collect::<VulkanResult<Vec<_>>>()?;
        let render_finished = Self::image_semaphores(&device, image_count)?;
        Ok(Self {
            device,
            frames,
            render_finished,
        })
    }

    /// Objects for a frame slot
    pub fn frame(&self, slot: usize) -> &FrameSync {
        &self.frames[slot]
    }

    /// Semaphore the present of `image_index` waits on
    pub fn render_finished(&self, image_index: u32) -> &Semaphore {
        &self.render_finished[image_index as usize]
    }

    /// Replace the per-image semaphores after swapchain recreation
    ///
    /// The caller must ensure the device is idle.
    pub fn rebuild_image_semaphores(&mut self, image_count: usize) -> VulkanResult<()> {
        self.render_finished = Self::image_semaphores(&self.device, image_count)?;
        Ok(())
    }

    /// Wait for every frame slot's last submission
    pub fn wait_all(&self, timeout_ns: u64) -> VulkanResult<()> {
        for frame in &self.frames {
            frame.in_flight.wait(timeout_ns)?;
        }
        Ok(())
    }

    fn image_semaphores(device: &Device, count: usize) -> VulkanResult<Vec<Semaphore>> {
        (0..count).map(|_| Semaphore::new(device.clone())).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Run one complete frame on `image`, returning the acquire outcome
    fn run_frame(s: &mut FrameScheduler, image: u32) -> AcquireOutcome {
        s.begin_frame().unwrap();
        let outcome = s.on_acquire(Ok((image, false))).unwrap();
        s.on_submit().unwrap();
        assert_eq!(s.on_present(Ok(false)).unwrap(), PresentOutcome::Presented);
        outcome
    }

    #[test]
    fn test_starts_idle_on_slot_zero() {
        let s = FrameScheduler::new(2, 3);
        assert_eq!(s.state(), FrameState::Idle);
        assert_eq!(s.current_frame(), 0);
        assert_eq!(s.image_count(), 3);
        assert_eq!(s.begin_frame().unwrap(), 0);
    }

    #[test]
    fn test_zero_frames_in_flight_clamped() {
        let s = FrameScheduler::new(0, 2);
        assert_eq!(s.max_frames_in_flight(), 1);
    }

    #[test]
    fn test_happy_path_cycles_frame_slots() {
        let mut s = FrameScheduler::new(2, 3);
        for (expected_slot, image) in [(0, 0), (1, 1), (0, 2), (1, 0)] {
            assert_eq!(s.begin_frame().unwrap(), expected_slot);
            s.on_acquire(Ok((image, false))).unwrap();
            assert_eq!(s.state(), FrameState::Acquired { image_index: image });
            s.on_submit().unwrap();
            assert_eq!(s.state(), FrameState::Submitted { image_index: image });
            assert_eq!(s.on_present(Ok(false)).unwrap(), PresentOutcome::Presented);
            assert_eq!(s.state(), FrameState::Idle);
        }
        assert_eq!(s.frames_presented(), 4);
    }

    #[test]
    fn test_first_use_of_image_needs_no_extra_wait() {
        let mut s = FrameScheduler::new(2, 3);
        assert_eq!(
            run_frame(&mut s, 0),
            AcquireOutcome::Proceed { image_index: 0, wait_on_frame: None }
        );
    }

    #[test]
    fn test_image_owned_by_other_slot_reports_wait() {
        let mut s = FrameScheduler::new(2, 3);
        run_frame(&mut s, 1); // slot 0 submits image 1
        assert_eq!(s.image_owner(1), Some(0));

        // Slot 1 gets image 1 back out of order
        s.begin_frame().unwrap();
        assert_eq!(
            s.on_acquire(Ok((1, false))).unwrap(),
            AcquireOutcome::Proceed { image_index: 1, wait_on_frame: Some(0) }
        );
    }

    #[test]
    fn test_image_owned_by_same_slot_needs_no_extra_wait() {
        let mut s = FrameScheduler::new(2, 2);
        run_frame(&mut s, 0); // slot 0
        run_frame(&mut s, 1); // slot 1
        // Back on slot 0, whose fence was already waited
        assert_eq!(
            run_frame(&mut s, 0),
            AcquireOutcome::Proceed { image_index: 0, wait_on_frame: None }
        );
        assert_eq!(s.image_owner(0), Some(0));
    }

    #[test]
    fn test_out_of_date_acquire_keeps_slot() {
        let mut s = FrameScheduler::new(2, 3);
        run_frame(&mut s, 0);
        assert_eq!(s.current_frame(), 1);

        s.begin_frame().unwrap();
        let outcome = s.on_acquire(Err(vk::Result::ERROR_OUT_OF_DATE_KHR)).unwrap();
        assert_eq!(outcome, AcquireOutcome::Recreate);
        assert!(s.needs_recreate());
        assert_eq!(s.current_frame(), 1);
        assert_eq!(s.frames_presented(), 1);
    }

    #[test]
    fn test_recreate_resets_tracking() {
        let mut s = FrameScheduler::new(2, 3);
        run_frame(&mut s, 2);
        s.begin_frame().unwrap();
        s.on_acquire(Err(vk::Result::ERROR_OUT_OF_DATE_KHR)).unwrap();

        assert!(s.begin_frame().is_err());
        s.on_swapchain_recreated(4).unwrap();
        assert_eq!(s.state(), FrameState::Idle);
        assert_eq!(s.image_count(), 4);
        assert_eq!(s.image_owner(2), None);
        assert_eq!(s.current_frame(), 1);
        assert_eq!(s.begin_frame().unwrap(), 1);
    }

    #[test]
    fn test_other_acquire_errors_propagate() {
        let mut s = FrameScheduler::new(2, 3);
        let err = s.on_acquire(Err(vk::Result::ERROR_DEVICE_LOST)).unwrap_err();
        assert!(matches!(err, VulkanError::Api(vk::Result::ERROR_DEVICE_LOST)));
        assert_eq!(s.state(), FrameState::Idle);
    }

    #[test]
    fn test_out_of_range_image_is_error() {
        let mut s = FrameScheduler::new(2, 3);
        assert!(matches!(
            s.on_acquire(Ok((3, false))),
            Err(VulkanError::InvalidFrameState { operation: "acquire", .. })
        ));
        assert_eq!(s.state(), FrameState::Idle);
    }

    #[test]
    fn test_suboptimal_acquire_recreates_after_present() {
        let mut s = FrameScheduler::new(2, 3);
        s.begin_frame().unwrap();
        assert!(matches!(s.on_acquire(Ok((0, true))).unwrap(), AcquireOutcome::Proceed { .. }));
        s.on_submit().unwrap();
        assert_eq!(s.on_present(Ok(false)).unwrap(), PresentOutcome::Recreate);
        assert!(s.needs_recreate());
        assert_eq!(s.current_frame(), 1);
    }

    #[test]
    fn test_suboptimal_present_recreates() {
        let mut s = FrameScheduler::new(2, 3);
        s.begin_frame().unwrap();
        s.on_acquire(Ok((0, false))).unwrap();
        s.on_submit().unwrap();
        assert_eq!(s.on_present(Ok(true)).unwrap(), PresentOutcome::Recreate);
    }

    #[test]
    fn test_out_of_date_present_recreates() {
        let mut s = FrameScheduler::new(2, 3);
        s.begin_frame().unwrap();
        s.on_acquire(Ok((0, false))).unwrap();
        s.on_submit().unwrap();
        assert_eq!(
            s.on_present(Err(vk::Result::ERROR_OUT_OF_DATE_KHR)).unwrap(),
            PresentOutcome::Recreate
        );
        assert_eq!(s.current_frame(), 1);
    }

    #[test]
    fn test_resize_flag_forces_recreate_once() {
        let mut s = FrameScheduler::new(2, 3);
        s.begin_frame().unwrap();
        s.on_acquire(Ok((0, false))).unwrap();
        s.notify_resized();
        assert!(s.resize_pending());
        s.on_submit().unwrap();
        assert_eq!(s.on_present(Ok(false)).unwrap(), PresentOutcome::Recreate);
        assert!(!s.resize_pending());

        s.on_swapchain_recreated(3).unwrap();
        assert_eq!(run_frame(&mut s, 1), AcquireOutcome::Proceed { image_index: 1, wait_on_frame: None });
    }

    #[test]
    fn test_suboptimal_flag_does_not_leak_into_next_frame() {
        let mut s = FrameScheduler::new(2, 3);
        s.begin_frame().unwrap();
        s.on_acquire(Ok((0, true))).unwrap();
        s.on_submit().unwrap();
        s.on_present(Ok(false)).unwrap();
        s.on_swapchain_recreated(3).unwrap();

        s.begin_frame().unwrap();
        s.on_acquire(Ok((1, false))).unwrap();
        s.on_submit().unwrap();
        assert_eq!(s.on_present(Ok(false)).unwrap(), PresentOutcome::Presented);
    }

    #[test]
    fn test_fatal_present_error_still_advances() {
        let mut s = FrameScheduler::new(2, 3);
        s.begin_frame().unwrap();
        s.on_acquire(Ok((0, false))).unwrap();
        s.on_submit().unwrap();
        assert!(s.on_present(Err(vk::Result::ERROR_DEVICE_LOST)).is_err());
        assert_eq!(s.state(), FrameState::Idle);
        assert_eq!(s.current_frame(), 1);
    }

    #[test]
    fn test_out_of_order_calls_rejected() {
        let mut s = FrameScheduler::new(2, 3);
        assert!(matches!(s.on_submit(), Err(VulkanError::InvalidFrameState { operation: "submit", .. })));
        assert!(matches!(s.on_present(Ok(false)), Err(VulkanError::InvalidFrameState { .. })));

        s.on_acquire(Ok((0, false))).unwrap();
        assert!(s.begin_frame().is_err());
        assert!(s.on_acquire(Ok((1, false))).is_err());
        assert!(s.on_present(Ok(false)).is_err());
        assert!(s.on_swapchain_recreated(3).is_err());

        s.on_submit().unwrap();
        assert!(s.on_submit().is_err());
        assert!(s.on_acquire(Ok((1, false))).is_err());
    }

    #[test]
    fn test_recreate_from_idle_allowed() {
        let mut s = FrameScheduler::new(3, 2);
        run_frame(&mut s, 0);
        s.on_swapchain_recreated(5).unwrap();
        assert_eq!(s.image_count(), 5);
        assert_eq!(s.current_frame(), 1);
    }

    #[test]
    fn test_single_frame_in_flight() {
        let mut s = FrameScheduler::new(1, 2);
        run_frame(&mut s, 0);
        assert_eq!(s.current_frame(), 0);
        assert_eq!(run_frame(&mut s, 1), AcquireOutcome::Proceed { image_index: 1, wait_on_frame: None });
        assert_eq!(run_frame(&mut s, 0), AcquireOutcome::Proceed { image_index: 0, wait_on_frame: None });
    }

    #[test]
    fn test_three_slots_wait_on_oldest_owner() {
        let mut s = FrameScheduler::new(3, 3);
        run_frame(&mut s, 0); // slot 0
        run_frame(&mut s, 1); // slot 1
        // Slot 2 unexpectedly receives image 0, still owned by slot 0
        s.begin_frame().unwrap();
        assert_eq!(
            s.on_acquire(Ok((0, false))).unwrap(),
            AcquireOutcome::Proceed { image_index: 0, wait_on_frame: Some(0) }
        );
        s.on_submit().unwrap();
        assert_eq!(s.image_owner(0), Some(2));
    }
}
