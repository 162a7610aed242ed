//! Shared inputs for the codec benchmarks.

/// One benchmark input: a label plus the wire bytes fed to the decoder.
#[derive(Debug, Clone, Copy)]
pub struct TestCase {
    name: &'static str,
    content: &'static str,
}

impl TestCase {
    pub const fn new(name: &'static str, content: &'static str) -> Self {
        Self { name, content }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn content(&self) -> &'static str {
        self.content
    }

    /// Wire size in bytes, for throughput reporting.
    pub fn wire_len(&self) -> u64 {
        self.content.len() as u64
    }
}
