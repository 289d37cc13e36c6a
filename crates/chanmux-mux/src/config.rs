use chanmux_frame::FrameConfig;

/// Capacity given to a channel enabled without an explicit size.
pub const DEFAULT_CHANNEL_CAPACITY: usize = 256;

/// Configuration for a [`Multiplex`](crate::Multiplex) instance.
#[derive(Debug, Clone)]
pub struct MuxConfig {
    /// Initial buffer capacity for `enable(id, None)` (or a zero capacity).
    pub default_capacity: usize,
    /// Frame codec limits; `max_payload_size` bounds both send and receive.
    pub frame: FrameConfig,
}

impl MuxConfig {
    /// Set the default channel capacity. Zero is replaced by
    /// [`DEFAULT_CHANNEL_CAPACITY`].
    pub fn with_default_capacity(mut self, capacity: usize) -> Self {
        self.default_capacity = if capacity == 0 {
            DEFAULT_CHANNEL_CAPACITY
        } else {
            capacity
        };
        self
    }

    /// Set the maximum accepted frame payload.
    pub fn with_max_payload_size(mut self, max_payload_size: usize) -> Self {
        self.frame.max_payload_size = max_payload_size;
        self
    }
}

impl Default for MuxConfig {
    fn default() -> Self {
        Self {
            default_capacity: DEFAULT_CHANNEL_CAPACITY,
            frame: FrameConfig::default(),
        }
    }
}
