//! Buffer types and descriptors.

use bitflags::bitflags;

bitflags! {
    /// Usage flags for buffers.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct BufferUsage: u32 {
        /// Buffer can be used as a vertex buffer.
        const VERTEX = 1 << 0;
        /// Buffer can be used as an index buffer.
        const INDEX = 1 << 1;
        /// Buffer can be used as a uniform buffer.
        const UNIFORM = 1 << 2;
        /// Buffer can be used as a storage buffer.
        const STORAGE = 1 << 3;
        /// Buffer can be used as an indirect buffer.
        const INDIRECT = 1 << 4;
        /// Buffer can be copied from.
        const COPY_SRC = 1 << 5;
        /// Buffer can be copied to.
        const COPY_DST = 1 << 6;
        /// Buffer is mappable for CPU reads.
        const MAP_READ = 1 << 7;
        /// Buffer is mappable for CPU writes.
        const MAP_WRITE = 1 << 8;
    }
}

impl Default for BufferUsage {
    fn default() -> Self {
        Self::empty()
    }
}

/// Descriptor for creating a buffer.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct BufferDescriptor {
    /// Debug label for the buffer.
    pub label: Option<String>,
    /// Size in bytes.
    pub size: u64,
    /// Usage flags.
    pub usage: BufferUsage,
    /// One physical allocation per frame in flight.
    ///
    /// Used for data the CPU rewrites every frame so frame N+1 can be written
    /// while the GPU still reads frame N.
    pub multi_frame: bool,
}

impl BufferDescriptor {
    /// Create a new buffer descriptor.
    pub fn new(size: u64, usage: BufferUsage) -> Self {
        Self {
            label: None,
            size,
            usage,
            multi_frame: false,
        }
    }

    /// Set the debug label.
    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    /// Request one backing allocation per frame in flight.
    pub fn with_multi_frame(mut self) -> Self {
        self.multi_frame = true;
        self
    }

    /// Whether the buffer lives in CPU-mappable memory.
    pub fn is_mappable(&self) -> bool {
        self.usage
            .intersects(BufferUsage::MAP_READ | BufferUsage::MAP_WRITE)
    }
}

/// Element type of an index buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum IndexFormat {
    /// 16-bit unsigned indices.
    Uint16,
    /// 32-bit unsigned indices.
    #[default]
    Uint32,
}

impl IndexFormat {
    /// Size of one index in bytes.
    pub fn size(self) -> u64 {
        match self {
            Self::Uint16 => 2,
            Self::Uint32 => 4,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mappable() {
        assert!(BufferDescriptor::new(64, BufferUsage::MAP_WRITE | BufferUsage::UNIFORM).is_mappable());
        assert!(BufferDescriptor::new(64, BufferUsage::MAP_READ).is_mappable());
        assert!(!BufferDescriptor::new(64, BufferUsage::UNIFORM | BufferUsage::COPY_DST).is_mappable());
    }

    #[test]
    fn test_builder() {
        let desc = BufferDescriptor::new(256, BufferUsage::UNIFORM)
            .with_label("camera")
            .with_multi_frame();
        assert_eq!(desc.label.as_deref(), Some("camera"));
        assert!(desc.multi_frame);
    }
}
