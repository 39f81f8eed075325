use khronos_egl as egl;
use wayland_client::Display;
use wayland_egl::WlEglSurface;

use crate::prelude::*;
use crate::state::DisplayMode;

pub use egl::{Config, Context, Surface};

/// EGL display shared by every window, derived from the compositor
/// connection.
pub struct EglDisplay {
    lib: egl::Instance<egl::Static>,
    display: egl::Display,
}

impl EglDisplay {
    pub fn initialize(display: &Display) -> Self {
        let lib = egl::Instance::new(egl::Static);
        let egl_display = unsafe { lib.get_display(display.get_display_ptr() as *mut _) }
            .unwrap_or_else(|| fatal!("no EGL display available for the Wayland connection"));
        lib.initialize(egl_display)
            .unwrap_or_else(|err| fatal!("failed to initialize EGL: {:?}", err));
        lib.bind_api(egl::OPENGL_API)
            .unwrap_or_else(|err| fatal!("failed to bind the OpenGL API: {:?}", err));
        Self {
            lib,
            display: egl_display,
        }
    }

    pub fn choose_config(&self, mode: &DisplayMode) -> Option<Config> {
        self.lib
            .choose_first_config(self.display, &config_attribs(mode))
            .ok()
            .flatten()
    }

    pub fn create_context(&self, config: Config) -> Context {
        self.lib
            .create_context(self.display, config, None, &[egl::NONE])
            .unwrap_or_else(|err| fatal!("failed to create an EGL context: {:?}", err))
    }

    pub fn create_window_surface(&self, config: Config, egl_window: &WlEglSurface) -> Surface {
        unsafe {
            self.lib
                .create_window_surface(self.display, config, egl_window.ptr() as *mut _, None)
        }
        .unwrap_or_else(|err| fatal!("failed to create an EGL window surface: {:?}", err))
    }

    pub fn make_current(&self, surface: Surface, context: Context) {
        let bound =
            self.lib
                .make_current(self.display, Some(surface), Some(surface), Some(context));
        if let Err(err) = bound {
            warning!("eglMakeCurrent failed: {:?}", err);
        }
    }

    pub fn swap_buffers(&self, surface: Surface) {
        if let Err(err) = self.lib.swap_buffers(self.display, surface) {
            warning!("eglSwapBuffers failed: {:?}", err);
        }
    }

    /// Releases a window's EGL objects. Absent ones are skipped, so this is
    /// safe to call on a window that was already torn down.
    pub fn release_window(&self, surface: Option<Surface>, context: Option<Context>) {
        let _ = self.lib.make_current(self.display, None, None, None);
        if let Some(surface) = surface {
            let _ = self.lib.destroy_surface(self.display, surface);
        }
        if let Some(context) = context {
            let _ = self.lib.destroy_context(self.display, context);
        }
    }
}

impl Drop for EglDisplay {
    fn drop(&mut self) {
        let _ = self.lib.terminate(self.display);
    }
}

/// Attribute list for the config chooser. EGL has no single/double
/// buffering attribute, so that part of the mode does not participate.
fn config_attribs(mode: &DisplayMode) -> Vec<egl::Int> {
    let mut attribs = vec![
        egl::SURFACE_TYPE,
        egl::WINDOW_BIT,
        egl::RENDERABLE_TYPE,
        egl::OPENGL_BIT,
        egl::RED_SIZE,
        8,
        egl::GREEN_SIZE,
        8,
        egl::BLUE_SIZE,
        8,
    ];
    if mode.alpha {
        attribs.extend_from_slice(&[egl::ALPHA_SIZE, 8]);
    }
    if mode.depth {
        attribs.extend_from_slice(&[egl::DEPTH_SIZE, 24]);
    }
    if mode.stencil {
        attribs.extend_from_slice(&[egl::STENCIL_SIZE, 8]);
    }
    if mode.multisample {
        attribs.extend_from_slice(&[egl::SAMPLE_BUFFERS, 1, egl::SAMPLES, 4]);
    }
    attribs.push(egl::NONE);
    attribs
}

/// Resolves a config for `mode`, retrying once without multisampling when
/// the first attempt finds nothing. The multisample flag is restored either
/// way.
pub fn resolve_config<C>(
    mode: &mut DisplayMode,
    mut choose: impl FnMut(&DisplayMode) -> Option<C>,
) -> Option<C> {
    if let Some(config) = choose(mode) {
        return Some(config);
    }
    if !mode.multisample {
        return None;
    }
    mode.multisample = false;
    let retried = choose(mode);
    mode.multisample = true;
    retried
}

#[cfg(test)]
mod tests {
    use super::{config_attribs, resolve_config};
    use crate::state::DisplayMode;
    use khronos_egl as egl;

    #[test]
    fn found_config_needs_no_retry() {
        let mut mode = DisplayMode {
            multisample: true,
            ..Default::default()
        };
        let mut calls = 0;
        let config = resolve_config(&mut mode, |_| {
            calls += 1;
            Some(42)
        });
        assert_eq!(config, Some(42));
        assert_eq!(calls, 1);
        assert!(mode.multisample);
    }

    #[test]
    fn multisample_is_dropped_for_the_retry_then_restored() {
        let mut mode = DisplayMode {
            multisample: true,
            ..Default::default()
        };
        let mut seen = Vec::new();
        let config = resolve_config(&mut mode, |m| {
            seen.push(m.multisample);
            if m.multisample {
                None
            } else {
                Some(7)
            }
        });
        assert_eq!(config, Some(7));
        assert_eq!(seen, [true, false]);
        assert!(mode.multisample, "flag must be restored after the retry");
    }

    #[test]
    fn no_retry_without_multisampling() {
        let mut mode = DisplayMode::default();
        let mut calls = 0;
        let config: Option<u32> = resolve_config(&mut mode, |_| {
            calls += 1;
            None
        });
        assert_eq!(config, None);
        assert_eq!(calls, 1);
    }

    #[test]
    fn failed_retry_still_restores_the_flag() {
        let mut mode = DisplayMode {
            multisample: true,
            ..Default::default()
        };
        let config: Option<u32> = resolve_config(&mut mode, |_| None);
        assert_eq!(config, None);
        assert!(mode.multisample);
    }

    #[test]
    fn attribs_follow_the_display_mode() {
        let mode = DisplayMode {
            alpha: true,
            multisample: true,
            ..Default::default()
        };
        let attribs = config_attribs(&mode);
        assert!(attribs
            .windows(2)
            .any(|w| w[0] == egl::ALPHA_SIZE && w[1] == 8));
        assert!(attribs
            .windows(2)
            .any(|w| w[0] == egl::SAMPLE_BUFFERS && w[1] == 1));
        assert!(attribs
            .windows(2)
            .any(|w| w[0] == egl::SAMPLES && w[1] == 4));
        assert_eq!(attribs.last(), Some(&egl::NONE));

        let plain = config_attribs(&DisplayMode::default());
        assert!(!plain.contains(&egl::DEPTH_SIZE));
        assert!(!plain.contains(&egl::SAMPLE_BUFFERS));
        assert!(!plain.contains(&egl::STENCIL_SIZE));
    }
}
