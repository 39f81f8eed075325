use std::time::Instant;

/// Framebuffer capabilities requested for new windows. EGL decides what the
/// compositor actually gets; this is the toolkit-level wish list.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DisplayMode {
    pub double_buffered: bool,
    pub alpha: bool,
    pub depth: bool,
    pub stencil: bool,
    pub multisample: bool,
}

impl DisplayMode {
    /// Double-buffered RGB, the mode forced for the first menu window.
    pub fn menu_default() -> Self {
        Self {
            double_buffered: true,
            ..Self::default()
        }
    }
}

/// Process-wide toolkit state, owned by the display handle.
#[derive(Debug)]
pub struct ToolkitState {
    pub initialised: bool,
    pub input_devs_initialised: bool,
    pub has_menu_context: bool,
    pub display_mode: DisplayMode,
    pub start: Instant,
}

impl ToolkitState {
    pub fn new() -> Self {
        Self {
            initialised: false,
            input_devs_initialised: false,
            has_menu_context: false,
            display_mode: DisplayMode::default(),
            start: Instant::now(),
        }
    }

    /// The first menu window pins the display mode to a known-good default.
    pub fn ensure_menu_display_mode(&mut self, is_menu: bool) {
        if is_menu && !self.has_menu_context {
            self.display_mode = DisplayMode::menu_default();
            self.has_menu_context = true;
        }
    }
}

impl Default for ToolkitState {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_menu_window_forces_double_buffered_rgb() {
        let mut state = ToolkitState::new();
        state.display_mode.multisample = true;
        state.ensure_menu_display_mode(true);
        assert_eq!(state.display_mode, DisplayMode::menu_default());
        assert!(state.has_menu_context);
    }

    #[test]
    fn existing_menu_context_keeps_the_mode() {
        let mut state = ToolkitState::new();
        state.has_menu_context = true;
        state.display_mode.depth = true;
        state.ensure_menu_display_mode(true);
        assert!(state.display_mode.depth);
    }

    #[test]
    fn non_menu_windows_keep_the_mode() {
        let mut state = ToolkitState::new();
        state.display_mode.stencil = true;
        state.ensure_menu_display_mode(false);
        assert!(state.display_mode.stencil);
        assert!(!state.has_menu_context);
    }
}
