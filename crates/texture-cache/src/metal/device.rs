//! System default Metal device.

use objc2::rc::Retained;
use objc2::runtime::ProtocolObject;
use objc2_metal::{MTLCreateSystemDefaultDevice, MTLDevice};
use tracing::debug;

/// The Metal device textures are created on.
///
/// Renderers (e.g. an `MTKView`) must draw with the same device.
pub struct MetalDevice {
    device: Retained<ProtocolObject<dyn MTLDevice>>,
}

impl MetalDevice {
    /// Obtain the system default GPU.
    ///
    /// Returns `None` if Metal is unavailable.
    pub fn new() -> Option<Self> {
        let device = MTLCreateSystemDefaultDevice()?;
        debug!("Metal device: {}", device.name());
        Some(Self { device })
    }

    pub fn device(&self) -> &ProtocolObject<dyn MTLDevice> {
        &self.device
    }
}
