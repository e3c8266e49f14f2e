use thiserror::Error;

/// Errors returned by the allocator's fallible entry points.
///
/// Free-path misuse is never returned; it is routed to the
/// [`MisuseReporter`](crate::memory::report::MisuseReporter) instead.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum FrameError {
    /// No free frame, or no contiguous window of the requested length.
    #[error("out of physical frames")]
    OutOfMemory,
    /// No usable region can hold the frame bitmap.
    #[error("no usable region large enough for the frame bitmap")]
    NoPlacement,
    /// The firmware memory map was empty or described no memory.
    #[error("invalid memory region list")]
    InvalidRegionList,
    /// A process-wide operation ran before `init` succeeded.
    #[error("frame allocator not initialized")]
    NotInitialized,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assert_error_impl<E: core::error::Error>() {}

    #[test]
    fn errors_render_for_diagnostics() {
        assert_error_impl::<FrameError>();
        assert_eq!(
            format!("{}", FrameError::OutOfMemory),
            "out of physical frames"
        );
        assert_eq!(
            format!("{}", FrameError::NotInitialized),
            "frame allocator not initialized"
        );
        assert_eq!(
            format!("{}", FrameError::NoPlacement),
            "no usable region large enough for the frame bitmap"
        );
    }
}
