//! Error and result types shared across the stack.

/// Error type for PriLink operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PriError {
    /// Invalid parameter from the caller
    InvalidParameter,
    /// A bounded buffer or pool is full
    BufferFull,
    /// Timer table is full
    SchedulerFull,
    /// Retransmit or APDU queue is full
    QueueFull,
    /// Frame shorter than its fixed header
    ShortFrame,
    /// Frame failed octet-level validation
    MalformedFrame,
    /// An information element's declared length overruns the frame
    MalformedIe,
    /// Protocol discriminator is neither Q.931 nor maintenance
    UnknownProtocol,
    /// Message type is not part of the supported set
    UnknownMessageType,
    /// Call reference does not map to a live call
    NoSuchCall,
    /// Operation is not valid in the current link or call state
    InvalidState,
    /// A mandatory information element was absent
    MandatoryIeMissing,
    /// Switch variant is not supported by this build
    UnsupportedSwitch,
    /// The device rejected a read or write
    DeviceError,
}

/// Result type for PriLink operations.
pub type PriResult<T> = Result<T, PriError>;
