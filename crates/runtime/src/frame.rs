use foundation::time::Timestamp;

/// Identifies one pending frame callback.
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct FrameHandle(pub u64);

/// A frame callback delivered by the host.
///
/// `timestamp` is the host clock at delivery; consumers measure elapsed time
/// from it rather than counting frames, so playback speed does not depend on
/// the refresh rate.
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct Frame {
    pub handle: FrameHandle,
    pub timestamp: Timestamp,
}

impl Frame {
    pub fn new(handle: FrameHandle, timestamp: Timestamp) -> Self {
        Self { handle, timestamp }
    }
}

#[cfg(test)]
mod tests {
    use super::{Frame, FrameHandle};
    use foundation::time::Timestamp;

    #[test]
    fn frames_compare_by_handle_and_time() {
        let a = Frame::new(FrameHandle(1), Timestamp(16.0));
        let b = Frame::new(FrameHandle(1), Timestamp(16.0));
        assert_eq!(a, b);
        assert_ne!(a, Frame::new(FrameHandle(2), Timestamp(16.0)));
    }
}
