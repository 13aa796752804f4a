use std::collections::BTreeSet;

use foundation::time::Timestamp;

use crate::frame::{Frame, FrameHandle};

/// Host primitive that invokes a callback roughly once per display refresh.
///
/// Each request is one-shot: a consumer that wants continuous playback
/// requests the next frame from inside the current callback.
pub trait FrameScheduler {
    fn request_frame(&mut self) -> FrameHandle;

    /// Cancelling an unknown or already-delivered handle is a no-op.
    fn cancel_frame(&mut self, handle: FrameHandle);
}

/// Frame requests queued until the host's next tick.
///
/// The host (a timer loop, a display link, a test) calls [`FrameQueue::take_due`]
/// once per tick and dispatches the returned frames. Handles are delivered in
/// request order.
#[derive(Debug, Default)]
pub struct FrameQueue {
    next_handle: u64,
    pending: BTreeSet<FrameHandle>,
}

impl FrameQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    pub fn is_pending(&self, handle: FrameHandle) -> bool {
        self.pending.contains(&handle)
    }

    /// Removes every pending request and stamps it with `timestamp`.
    ///
    /// Requests made while the returned frames are being dispatched land in
    /// the next tick.
    pub fn take_due(&mut self, timestamp: Timestamp) -> Vec<Frame> {
        std::mem::take(&mut self.pending)
            .into_iter()
            .map(|handle| Frame::new(handle, timestamp))
            .collect()
    }
}

impl FrameScheduler for FrameQueue {
    fn request_frame(&mut self) -> FrameHandle {
        self.next_handle += 1;
        let handle = FrameHandle(self.next_handle);
        self.pending.insert(handle);
        handle
    }

    fn cancel_frame(&mut self, handle: FrameHandle) {
        self.pending.remove(&handle);
    }
}

#[cfg(test)]
mod tests {
    use super::{FrameQueue, FrameScheduler};
    use foundation::time::Timestamp;

    #[test]
    fn delivers_requests_in_order() {
        let mut q = FrameQueue::new();
        let a = q.request_frame();
        let b = q.request_frame();
        assert_ne!(a, b);

        let frames = q.take_due(Timestamp(16.0));
        let handles: Vec<_> = frames.iter().map(|f| f.handle).collect();
        assert_eq!(handles, vec![a, b]);
        assert!(frames.iter().all(|f| f.timestamp == Timestamp(16.0)));
        assert!(q.is_empty());
    }

    #[test]
    fn cancelled_requests_are_not_delivered() {
        let mut q = FrameQueue::new();
        let a = q.request_frame();
        let b = q.request_frame();
        q.cancel_frame(a);
        q.cancel_frame(a);

        assert!(!q.is_pending(a));
        let frames = q.take_due(Timestamp(0.0));
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].handle, b);
    }

    #[test]
    fn requests_during_dispatch_wait_for_next_tick() {
        let mut q = FrameQueue::new();
        q.request_frame();
        let due = q.take_due(Timestamp(0.0));
        assert_eq!(due.len(), 1);

        let follow_up = q.request_frame();
        assert_eq!(q.len(), 1);
        assert!(q.is_pending(follow_up));
    }
}
