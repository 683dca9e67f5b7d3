//! Texture identity.

use std::fmt;

/// Strongly typed texture identity.
///
/// Wraps a non-negative "base frame" handle issued by the host's bitmap
/// manager. Builtin fallback and default textures are not `TextureId`s; they
/// live in reserved bindless slots instead.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TextureId(i32);

impl TextureId {
    /// Validates a base-frame handle; negative values yield `None`.
    #[inline]
    pub fn try_from_base_frame(base_frame: i32) -> Option<Self> {
        (base_frame >= 0).then_some(Self(base_frame))
    }

    /// Returns the base-frame handle.
    #[inline]
    pub fn base_frame(self) -> i32 {
        self.0
    }
}

impl fmt::Display for TextureId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "tex#{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_negative_base_frame_rejected() {
        assert_eq!(TextureId::try_from_base_frame(-1), None);
        assert_eq!(TextureId::try_from_base_frame(i32::MIN), None);
    }

    #[test]
    fn test_valid_base_frame_round_trips() {
        let id = TextureId::try_from_base_frame(0).unwrap();
        assert_eq!(id.base_frame(), 0);
        let id = TextureId::try_from_base_frame(42).unwrap();
        assert_eq!(id.base_frame(), 42);
        assert_eq!(id.to_string(), "tex#42");
    }

    #[test]
    fn test_hash_and_eq() {
        let a = TextureId::try_from_base_frame(7).unwrap();
        let b = TextureId::try_from_base_frame(7).unwrap();
        let set: HashSet<_> = [a, b].into_iter().collect();
        assert_eq!(set.len(), 1);
    }
}
