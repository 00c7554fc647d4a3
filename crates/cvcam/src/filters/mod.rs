//! The filter set shipped with the binary.

use cvcam_core::FilterRegistry;

#[cfg(feature = "opencv")]
pub mod opencv;

/// Registry with every filter this build supports: `passthrough` always,
/// plus the OpenCV set when built with the `opencv` feature.
pub fn registry() -> FilterRegistry {
    #[allow(unused_mut)]
    let mut registry = FilterRegistry::new();
    #[cfg(feature = "opencv")]
    opencv::register_all(&mut registry);
    registry
}

#[cfg(test)]
mod tests {
    use super::*;
    use cvcam_core::{FrameProcessor, PASSTHROUGH};

    #[test]
    fn passthrough_always_available() {
        assert!(registry().supports(PASSTHROUGH));
    }

    #[cfg(feature = "opencv")]
    #[test]
    fn opencv_filters_registered() {
        let ops = registry().operations();
        for name in opencv::OPERATIONS {
            assert!(ops.iter().any(|op| op == name), "missing {name}");
        }
    }
}
