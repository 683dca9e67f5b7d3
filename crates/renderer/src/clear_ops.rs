//! One-shot attachment clear state.

use ash::vk;

/// What happens to an attachment's contents when a pass opens.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum LoadOp {
    /// Keep existing contents.
    #[default]
    Load,
    /// Clear to the configured value.
    Clear,
    /// Contents are undefined.
    DontCare,
}

impl LoadOp {
    /// Converts to the Vulkan load op.
    #[inline]
    pub fn to_vk(self) -> vk::AttachmentLoadOp {
        match self {
            Self::Load => vk::AttachmentLoadOp::LOAD,
            Self::Clear => vk::AttachmentLoadOp::CLEAR,
            Self::DontCare => vk::AttachmentLoadOp::DONT_CARE,
        }
    }
}

/// Load ops for the next pass, per aspect.
///
/// Opening a pass [`consume`](Self::consume)s them, so a clear applies to
/// exactly one pass.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ClearOps {
    /// Color attachments.
    pub color: LoadOp,
    /// Depth aspect.
    pub depth: LoadOp,
    /// Stencil aspect.
    pub stencil: LoadOp,
}

impl Default for ClearOps {
    fn default() -> Self {
        Self::clear_all()
    }
}

impl ClearOps {
    /// Clear everything.
    #[inline]
    pub const fn clear_all() -> Self {
        Self {
            color: LoadOp::Clear,
            depth: LoadOp::Clear,
            stencil: LoadOp::Clear,
        }
    }

    /// Preserve everything.
    #[inline]
    pub const fn load_all() -> Self {
        Self {
            color: LoadOp::Load,
            depth: LoadOp::Load,
            stencil: LoadOp::Load,
        }
    }

    /// Same color op, clear depth and stencil.
    #[inline]
    pub const fn with_depth_stencil_clear(self) -> Self {
        Self {
            color: self.color,
            depth: LoadOp::Clear,
            stencil: LoadOp::Clear,
        }
    }

    /// Takes the current ops, leaving [`load_all`](Self::load_all) behind.
    #[inline]
    pub fn consume(&mut self) -> Self {
        std::mem::replace(self, Self::load_all())
    }

    /// Color will be cleared.
    #[inline]
    pub fn is_color_clear(&self) -> bool {
        self.color == LoadOp::Clear
    }

    /// Depth will be cleared.
    #[inline]
    pub fn is_depth_clear(&self) -> bool {
        self.depth == LoadOp::Clear
    }

    /// Stencil will be cleared.
    #[inline]
    pub fn is_stencil_clear(&self) -> bool {
        self.stencil == LoadOp::Clear
    }

    /// Any aspect will be cleared.
    #[inline]
    pub fn is_any_clear(&self) -> bool {
        self.is_color_clear() || self.is_depth_clear() || self.is_stencil_clear()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_consume_is_one_shot() {
        let mut ops = ClearOps::clear_all();
        let taken = ops.consume();
        assert_eq!(taken, ClearOps::clear_all());
        assert_eq!(ops, ClearOps::load_all());
        assert_eq!(ops.consume(), ClearOps::load_all());
    }

    #[test]
    fn test_depth_stencil_clear_keeps_color() {
        let ops = ClearOps::load_all().with_depth_stencil_clear();
        assert!(!ops.is_color_clear());
        assert!(ops.is_depth_clear());
        assert!(ops.is_stencil_clear());

        let ops = ClearOps {
            color: LoadOp::DontCare,
            ..ClearOps::load_all()
        }
        .with_depth_stencil_clear();
        assert_eq!(ops.color, LoadOp::DontCare);
    }

    #[test]
    fn test_load_op_to_vk() {
        assert_eq!(LoadOp::Load.to_vk(), vk::AttachmentLoadOp::LOAD);
        assert_eq!(LoadOp::Clear.to_vk(), vk::AttachmentLoadOp::CLEAR);
        assert_eq!(LoadOp::DontCare.to_vk(), vk::AttachmentLoadOp::DONT_CARE);
    }

    #[test]
    fn test_any_clear() {
        assert!(ClearOps::clear_all().is_any_clear());
        assert!(!ClearOps::load_all().is_any_clear());
    }
}
