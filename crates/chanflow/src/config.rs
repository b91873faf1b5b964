//! Configuration for fan-in groups.

/// Configuration for a [`FanIn`](crate::FanIn) group.
#[derive(Debug, Clone, Default)]
pub struct FanInConfig {
    /// Buffer capacity of the merged output channel.
    ///
    /// With the default of `0`, every relayed value waits for the consumer,
    /// so a slow consumer holds back every member equally.
    ///
    /// Default: 0
    pub output_capacity: usize,
}

impl FanInConfig {
    /// Creates a configuration with a buffered merged output.
    pub fn buffered(output_capacity: usize) -> Self {
        Self { output_capacity }
    }

    /// Sets the merged output capacity.
    pub fn with_output_capacity(mut self, capacity: usize) -> Self {
        self.output_capacity = capacity;
        self
    }
}
