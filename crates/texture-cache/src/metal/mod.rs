//! Metal texture backend (macOS).

pub mod backend;
pub mod device;

pub use backend::{MetalTexture, MetalTextureBackend};
pub use device::MetalDevice;
