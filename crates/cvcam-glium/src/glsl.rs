//! GLSL version detection.

use glium::{Api, CapabilitiesSource, Version};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum GlslVersion {
    Glsl120,
    Glsl140,
    Glsl330,
}

impl GlslVersion {
    pub fn directive(self) -> &'static str {
        match self {
            GlslVersion::Glsl120 => "#version 120",
            GlslVersion::Glsl140 => "#version 140",
            GlslVersion::Glsl330 => "#version 330 core",
        }
    }
}

/// Highest version in `versions` that shaders can target.
pub fn best_of(versions: &[Version]) -> Option<GlslVersion> {
    versions
        .iter()
        .filter_map(|v| match v {
            Version(Api::Gl, 3, 3) => Some(GlslVersion::Glsl330),
            Version(Api::Gl, 1, 4) => Some(GlslVersion::Glsl140),
            Version(Api::Gl, 1, 2) => Some(GlslVersion::Glsl120),
            _ => None,
        })
        .max()
}

pub fn best_glsl_version(ctx: &impl CapabilitiesSource) -> Option<GlslVersion> {
    best_of(&ctx.get_capabilities().supported_glsl_versions)
}
