//! Frame cadence and the cached tracking result.

use crate::types::FaceResult;

/// What to do with an incoming frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameAction {
    /// Run the full pipeline and replace the cached result
    Fresh,
    /// Return the cached result untouched
    Reuse,
}

/// Decides per frame whether to process or reuse, and owns the last result.
///
/// Frames are numbered from zero. With cadence `N > 1`, frames `0, N, 2N, ...`
/// are processed and all others reuse the cache.
#[derive(Debug, Clone, Default)]
pub struct FrameScheduler {
    cadence: u32,
    frame_counter: u64,
    last_result: FaceResult,
}

impl FrameScheduler {
    pub fn new(cadence: u32) -> Self {
        Self {
            cadence,
            frame_counter: 0,
            last_result: FaceResult::default(),
        }
    }

    /// The cadence rule for the frame at zero-based `frame_index`.
    pub fn should_process(cadence: u32, frame_index: u64) -> bool {
        cadence <= 1 || frame_index % u64::from(cadence) == 0
    }

    /// Count the incoming frame and decide what to do with it.
    pub fn advance(&mut self) -> FrameAction {
        let index = self.frame_counter;
        self.frame_counter = self.frame_counter.wrapping_add(1);

        if Self::should_process(self.cadence, index) {
            FrameAction::Fresh
        } else {
            FrameAction::Reuse
        }
    }

    pub fn cached(&self) -> &FaceResult {
        &self.last_result
    }

    /// Replace the cached result wholesale.
    pub fn store(&mut self, result: FaceResult) -> &FaceResult {
        self.last_result = result;
        &self.last_result
    }

    /// Number of frames seen so far.
    pub fn frame_count(&self) -> u64 {
        self.frame_counter
    }

    /// Zero-based index of the frame most recently passed to [`Self::advance`].
    pub fn current_index(&self) -> Option<u64> {
        self.frame_counter.checked_sub(1)
    }

    pub fn cadence(&self) -> u32 {
        self.cadence
    }
}
