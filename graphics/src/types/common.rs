//! Common types shared across the graphics system.

use ash::vk;

// ============================================================================
// Extent
// ============================================================================

/// Size of a texture or render area in texels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Extent3d {
    /// Width in texels.
    pub width: u32,
    /// Height in texels.
    pub height: u32,
    /// Depth (3D textures) or layer count.
    pub depth: u32,
}

impl Extent3d {
    /// Create a new 3D extent.
    pub const fn new(width: u32, height: u32, depth: u32) -> Self {
        Self {
            width,
            height,
            depth,
        }
    }

    /// Create a new 2D extent with depth 1.
    pub const fn new_2d(width: u32, height: u32) -> Self {
        Self::new(width, height, 1)
    }

    /// Component-wise minimum of width and height.
    pub fn min_2d(self, other: Self) -> Self {
        Self::new_2d(self.width.min(other.width), self.height.min(other.height))
    }

    /// Convert to a Vulkan 3D extent.
    pub fn to_vk(self) -> vk::Extent3D {
        vk::Extent3D {
            width: self.width,
            height: self.height,
            depth: self.depth.max(1),
        }
    }
}

// ============================================================================
// Viewport
// ============================================================================

/// Viewport configuration for rendering.
///
/// Coordinates are in framebuffer space with the origin at the top-left
/// corner. Projection matrices are expected to produce +Y up in clip space,
/// which [`Viewport::to_vk`] accounts for by flipping the native viewport.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Viewport {
    /// X coordinate of the viewport's top-left corner.
    pub x: f32,
    /// Y coordinate of the viewport's top-left corner.
    pub y: f32,
    /// Width of the viewport.
    pub width: f32,
    /// Height of the viewport.
    pub height: f32,
    /// Minimum depth value (default: 0.0).
    pub min_depth: f32,
    /// Maximum depth value (default: 1.0).
    pub max_depth: f32,
}

impl Viewport {
    /// Create a viewport with the default `[0, 1]` depth range.
    pub fn new(x: f32, y: f32, width: f32, height: f32) -> Self {
        Self {
            x,
            y,
            width,
            height,
            min_depth: 0.0,
            max_depth: 1.0,
        }
    }

    /// Set a custom depth range.
    pub fn with_depth_range(mut self, min_depth: f32, max_depth: f32) -> Self {
        self.min_depth = min_depth;
        self.max_depth = max_depth;
        self
    }

    /// Native dynamic viewport with the Y axis flipped.
    ///
    /// The origin moves to the bottom edge of the rectangle and the height
    /// becomes negative, so the covered framebuffer region is unchanged while
    /// clip-space +Y points up.
    pub fn to_vk(&self) -> vk::Viewport {
        vk::Viewport {
            x: self.x,
            y: self.y + self.height,
            width: self.width,
            height: -self.height,
            min_depth: self.min_depth,
            max_depth: self.max_depth,
        }
    }

    /// The integer rectangle covered by this viewport.
    pub fn bounds(&self) -> Rect {
        Rect::new(
            self.x as i32,
            self.y as i32,
            self.width.max(0.0) as u32,
            self.height.max(0.0) as u32,
        )
    }
}

// ============================================================================
// Rect
// ============================================================================

/// An integer rectangle in framebuffer space (scissor, render area).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Rect {
    /// Left edge.
    pub x: i32,
    /// Top edge.
    pub y: i32,
    /// Width.
    pub width: u32,
    /// Height.
    pub height: u32,
}

impl Rect {
    /// Create a new rectangle.
    pub const fn new(x: i32, y: i32, width: u32, height: u32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    /// A rectangle at the origin covering `extent`.
    pub const fn from_extent(extent: Extent3d) -> Self {
        Self::new(0, 0, extent.width, extent.height)
    }

    /// Convert to a native rectangle, clamping negative offsets to zero.
    pub fn to_vk(self) -> vk::Rect2D {
        vk::Rect2D {
            offset: vk::Offset2D {
                x: self.x.max(0),
                y: self.y.max(0),
            },
            extent: vk::Extent2D {
                width: self.width,
                height: self.height,
            },
        }
    }
}
