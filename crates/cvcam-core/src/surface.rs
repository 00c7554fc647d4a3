//! Render surface lifecycle notifications.

/// Events a renderer forwards from its view.
///
/// Only [`SurfaceEvent::Destroyed`] requires action from the texture cache:
/// the textures belong to the destroyed context and must be invalidated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SurfaceEvent {
    Created { width: u32, height: u32 },
    Resized { width: u32, height: u32 },
    Destroyed,
}

impl SurfaceEvent {
    pub fn invalidates_textures(&self) -> bool {
        matches!(self, SurfaceEvent::Destroyed)
    }

    pub fn size(&self) -> Option<(u32, u32)> {
        match *self {
            SurfaceEvent::Created { width, height } | SurfaceEvent::Resized { width, height } => {
                Some((width, height))
            }
            SurfaceEvent::Destroyed => None,
        }
    }
}
