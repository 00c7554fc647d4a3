//! glium backend over a GL context some other layer owns and made current.

use std::cell::Cell;
use std::sync::Once;

pub(crate) static GL_INIT_ONCE: Once = Once::new();

/// Load GL function pointers for both glium and the raw `gl` crate.
pub fn load_gl() {
    GL_INIT_ONCE.call_once(|| {
        gl_loader::init_gl();
        gl::load_with(|s| gl_loader::get_proc_address(s).cast());
    });
}

#[derive(Debug)]
pub(crate) struct HostGlBackend {
    size: Cell<(u32, u32)>,
}

impl HostGlBackend {
    pub(crate) fn new(size: (u32, u32)) -> Self {
        load_gl();
        Self {
            size: Cell::new(size),
        }
    }

    pub(crate) fn set_size(&self, size: (u32, u32)) {
        self.size.set(size);
    }
}

/// # Safety
///
/// The window layer must keep the GL context current on the render thread
/// for as long as the renderer exists. Calls from any other thread are
/// undefined behavior.
unsafe impl glium::backend::Backend for HostGlBackend {
    fn swap_buffers(&self) -> Result<(), glium::SwapBuffersError> {
        // The view swaps after the draw callback returns.
        Ok(())
    }

    unsafe fn get_proc_address(&self, symbol: &str) -> *const std::os::raw::c_void {
        gl_loader::get_proc_address(symbol).cast()
    }

    fn get_framebuffer_dimensions(&self) -> (u32, u32) {
        self.size.get()
    }

    fn is_current(&self) -> bool {
        true
    }

    unsafe fn make_current(&self) {}

    fn resize(&self, new_size: (u32, u32)) {
        self.size.set(new_size);
    }
}
