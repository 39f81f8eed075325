use std::cell::RefCell;
use std::rc::Rc;

use wayland_client::protocol::wl_pointer::WlPointer;
use wayland_client::protocol::wl_surface::WlSurface;
use wayland_client::Main;
use wayland_egl::WlEglSurface;
use wayland_protocols::xdg_shell::client::{
    xdg_popup::{self, XdgPopup},
    xdg_positioner::XdgPositioner,
    xdg_surface::{self, XdgSurface},
    xdg_toplevel::{self, XdgToplevel},
};

use crate::egl;
use crate::prelude::*;

use self::cursor::WindowCursor;

pub mod cursor;

pub const DEFAULT_POSITION: (i32, i32) = (-1, -1);
pub const DEFAULT_SIZE: (i32, i32) = (300, 300);

/// How a window is created. Unset position and size fall back to the
/// toolkit defaults.
#[derive(Debug, Clone, Default)]
pub struct WindowConfig {
    pub title: Option<String>,
    pub position: Option<(i32, i32)>,
    pub size: Option<(i32, i32)>,
    pub game_mode: bool,
    pub is_menu: bool,
    pub is_sub_window: bool,
}

fn resolved_geometry(config: &WindowConfig) -> ((i32, i32), (i32, i32)) {
    (
        config.position.unwrap_or(DEFAULT_POSITION),
        config.size.unwrap_or(DEFAULT_SIZE),
    )
}

/// Which shell role a window gets. Fixed for the window's lifetime.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RoleKind {
    Toplevel,
    Popup,
}

impl RoleKind {
    pub fn classify(is_sub_window: bool, is_menu: bool) -> Self {
        if !is_sub_window && !is_menu {
            RoleKind::Toplevel
        } else {
            RoleKind::Popup
        }
    }
}

/// The xdg role object. A window is a toplevel or a popup, never both; the
/// positioner only exists for popups.
enum SurfaceRole {
    Toplevel(Main<XdgToplevel>),
    Popup {
        popup: Main<XdgPopup>,
        positioner: Main<XdgPositioner>,
    },
}

impl SurfaceRole {
    fn toplevel(&self) -> Option<&Main<XdgToplevel>> {
        match self {
            SurfaceRole::Toplevel(toplevel) => Some(toplevel),
            SurfaceRole::Popup { .. } => None,
        }
    }

    fn destroy(&self) {
        match self {
            SurfaceRole::Toplevel(toplevel) => toplevel.destroy(),
            SurfaceRole::Popup { popup, positioner } => {
                popup.destroy();
                positioner.destroy();
            }
        }
    }
}

/// Per-window protocol objects. Everything lives in a [`Slot`] so teardown
/// can run in any state of partial construction.
#[derive(Default)]
struct WindowContext {
    surface: Slot<Main<WlSurface>>,
    xdg_surface: Slot<Main<XdgSurface>>,
    role: Slot<SurfaceRole>,
    egl_window: Slot<WlEglSurface>,
    egl_surface: Slot<egl::Surface>,
    egl_context: Slot<egl::Context>,
    cursor: Slot<WindowCursor>,
    pointer: Slot<Main<WlPointer>>,
    pointer_button_pressed: bool,
}

#[derive(Debug, Clone)]
pub struct WindowState {
    pub x: i32,
    pub y: i32,
    pub width: i32,
    pub height: i32,
    pub fullscreen: bool,
    pub should_close: bool,
    saved_width: i32,
    saved_height: i32,
}

impl WindowState {
    fn new() -> Self {
        Self {
            x: DEFAULT_POSITION.0,
            y: DEFAULT_POSITION.1,
            width: DEFAULT_SIZE.0,
            height: DEFAULT_SIZE.1,
            fullscreen: false,
            should_close: false,
            saved_width: DEFAULT_SIZE.0,
            saved_height: DEFAULT_SIZE.1,
        }
    }

    /// Remembers the geometry to restore when fullscreen is left again.
    fn save_geometry(&mut self) {
        self.saved_width = self.width;
        self.saved_height = self.height;
    }

    fn saved_geometry(&self) -> (i32, i32) {
        (self.saved_width, self.saved_height)
    }
}

pub struct WindowInner {
    globals: GlobalsHandle,
    parent: Option<Window>,
    is_menu: bool,
    ctx: RefCell<WindowContext>,
    state: RefCell<WindowState>,
    on_reshape: RefCell<Option<Box<dyn Fn(&Window, i32, i32)>>>,
}

#[derive(Clone)]
pub struct Window {
    inner: Rc<WindowInner>,
}

impl Window {
    pub fn open(globals: GlobalsHandle, parent: Option<&Window>, config: WindowConfig) -> Self {
        let window = Window {
            inner: Rc::new(WindowInner {
                globals,
                parent: parent.cloned(),
                is_menu: config.is_menu,
                ctx: RefCell::new(WindowContext::default()),
                state: RefCell::new(WindowState::new()),
                on_reshape: RefCell::new(None),
            }),
        };
        window.open_in_place(&config);
        window
    }

    fn open_in_place(&self, config: &WindowConfig) {
        let globals = &self.inner.globals;

        let egl_config = {
            let mut toolkit = globals.state.borrow_mut();
            toolkit.ensure_menu_display_mode(config.is_menu);
            egl::resolve_config(&mut toolkit.display_mode, |mode| {
                globals.egl.choose_config(mode)
            })
        };
        let Some(egl_config) = egl_config else {
            fatal!("EGL configuration with necessary capabilities not found");
        };

        let ((x, y), (width, height)) = resolved_geometry(config);
        {
            let mut state = self.inner.state.borrow_mut();
            state.x = x;
            state.y = y;
            state.width = width;
            state.height = height;
        }

        let mut ctx = self.inner.ctx.borrow_mut();

        ctx.cursor.put(WindowCursor::new(globals, "left_ptr"));
        ctx.pointer.put(cursor::attach_pointer(self));

        let surface = globals.compositor.create_surface();

        let xdg_surface = globals.wm_base.get_xdg_surface(&surface);
        xdg_surface.quick_assign({
            let this = self.clone();
            move |xdg_surface, event, _| {
                if let xdg_surface::Event::Configure { serial } = event {
                    this.handle_surface_configure(&xdg_surface, serial);
                }
            }
        });

        let role = match RoleKind::classify(config.is_sub_window, self.inner.is_menu) {
            RoleKind::Toplevel => {
                let toplevel = xdg_surface.get_toplevel();
                if config.game_mode {
                    // Optimistic: only a later configure confirms it.
                    toplevel.set_fullscreen(None);
                    self.inner.state.borrow_mut().fullscreen = true;
                }
                if let Some(title) = &config.title {
                    toplevel.set_title(title.clone());
                }
                toplevel.quick_assign({
                    let this = self.clone();
                    move |_toplevel, event, _| this.handle_toplevel_event(event)
                });
                SurfaceRole::Toplevel(toplevel)
            }
            RoleKind::Popup => {
                let positioner = globals.wm_base.create_positioner();
                positioner.set_size(width, height);
                positioner.set_anchor_rect(x, y, width, height);
                let parent = self
                    .inner
                    .parent
                    .as_ref()
                    .unwrap_or_else(|| fatal!("popup window opened without a parent window"));
                let popup = {
                    let parent_ctx = parent.inner.ctx.borrow();
                    let Some(parent_xdg) = parent_ctx.xdg_surface.get() else {
                        fatal!("popup window parent has no shell surface");
                    };
                    xdg_surface.get_popup(Some(parent_xdg), &positioner)
                };
                popup.quick_assign({
                    let this = self.clone();
                    move |_popup, event, _| {
                        if let xdg_popup::Event::PopupDone = event {
                            this.handle_close();
                        }
                    }
                });
                SurfaceRole::Popup { popup, positioner }
            }
        };

        let egl_context = globals.egl.create_context(egl_config);
        let egl_window = WlEglSurface::new(&surface.detach(), width, height);
        let egl_surface = globals.egl.create_window_surface(egl_config, &egl_window);
        globals.egl.make_current(egl_surface, egl_context);

        ctx.surface.put(surface);
        ctx.xdg_surface.put(xdg_surface);
        ctx.role.put(role);
        ctx.egl_window.put(egl_window);
        ctx.egl_surface.put(egl_surface);
        ctx.egl_context.put(egl_context);
        ctx.pointer_button_pressed = false;

        // Configure events fire during the roundtrip; the context borrow
        // must be gone by then.
        drop(ctx);

        globals.roundtrip();
        if let Some(surface) = self.inner.ctx.borrow().surface.get() {
            surface.commit();
        }
    }

    fn handle_surface_configure(&self, xdg_surface: &Main<XdgSurface>, serial: u32) {
        xdg_surface.ack_configure(serial);
        // A null attach makes the compositor request a fresh buffer instead
        // of presenting a stale one.
        let ctx = self.inner.ctx.borrow();
        if let Some(surface) = ctx.surface.get() {
            surface.attach(None, 0, 0);
            surface.commit();
        }
    }

    fn handle_toplevel_event(&self, event: xdg_toplevel::Event) {
        match event {
            xdg_toplevel::Event::Configure { width, height, .. } => {
                // 0x0 means the client picks its own size; keep the last one.
                if width > 0 && height > 0 {
                    self.reshape(width, height);
                }
                let ctx = self.inner.ctx.borrow();
                if let Some(surface) = ctx.surface.get() {
                    surface.commit();
                }
            }
            xdg_toplevel::Event::Close => self.handle_close(),
            _ => {}
        }
    }

    fn handle_close(&self) {
        self.close();
        self.inner.state.borrow_mut().should_close = true;
    }

    /// Notifies the reshape callback, then resizes the EGL window binding
    /// in place.
    pub fn reshape(&self, width: i32, height: i32) {
        self.on_reshape_notify(width, height, false);
        let ctx = self.inner.ctx.borrow();
        if let Some(egl_window) = ctx.egl_window.get() {
            egl_window.resize(width, height, 0, 0);
        }
    }

    fn on_reshape_notify(&self, width: i32, height: i32, force_notify: bool) {
        let changed = {
            let mut state = self.inner.state.borrow_mut();
            let changed = state.width != width || state.height != height;
            state.width = width;
            state.height = height;
            changed
        };
        if changed || force_notify {
            if let Some(callback) = self.inner.on_reshape.borrow().as_ref() {
                callback(self, width, height);
            }
        }
    }

    pub fn set_reshape_callback(&self, callback: impl Fn(&Window, i32, i32) + 'static) {
        *self.inner.on_reshape.borrow_mut() = Some(Box::new(callback));
    }

    /// Destroys the window's protocol objects. Already-destroyed handles
    /// are skipped, so closing twice is a no-op.
    pub fn close(&self) {
        destroy_context_chain(&self.inner.globals, &mut self.inner.ctx.borrow_mut());
    }

    /// Recreates the window's protocol objects if any of them are gone.
    /// The original title is not persisted across this cycle; an empty one
    /// is substituted.
    pub fn show(&self) {
        let missing = {
            let ctx = self.inner.ctx.borrow();
            !ctx.egl_window.is_set() || !ctx.xdg_surface.is_set() || !ctx.surface.is_set()
        };
        if !missing {
            warning!("show: unsupported for an already existing window under Wayland");
            return;
        }
        self.close();
        let config = {
            let state = self.inner.state.borrow();
            WindowConfig {
                title: Some(String::new()),
                position: Some((state.x, state.y)),
                size: Some((state.width, state.height)),
                game_mode: state.fullscreen,
                is_menu: self.inner.is_menu,
                is_sub_window: self.inner.parent.is_some(),
            }
        };
        self.open_in_place(&config);
    }

    pub fn hide(&self) {
        self.iconify();
    }

    pub fn iconify(&self) {
        warning!("iconify: unsupported under Wayland");
    }

    pub fn set_title(&self, title: &str) {
        let ctx = self.inner.ctx.borrow();
        match ctx.role.get().and_then(SurfaceRole::toplevel) {
            Some(toplevel) => toplevel.set_title(title.to_owned()),
            None => warning!("set_title: window has no toplevel role"),
        }
    }

    /// The icon title is an alias for the window title under this backend.
    pub fn set_icon_title(&self, title: &str) {
        self.set_title(title);
    }

    pub fn set_position(&self, _x: i32, _y: i32) {
        warning!("set_position: unsupported under Wayland");
    }

    pub fn lower(&self) {
        warning!("lower: unsupported under Wayland");
    }

    pub fn raise(&self) {
        warning!("raise: unsupported under Wayland");
    }

    /// Saves the geometry and asks for fullscreen, or restores the saved
    /// geometry and asks out of it. The flag flips optimistically.
    pub fn toggle_fullscreen(&self) {
        let toplevel = {
            let ctx = self.inner.ctx.borrow();
            match ctx.role.get().and_then(SurfaceRole::toplevel) {
                Some(toplevel) => toplevel.clone(),
                None => {
                    warning!("toggle_fullscreen: window has no toplevel role");
                    return;
                }
            }
        };
        let fullscreen = self.inner.state.borrow().fullscreen;
        if !fullscreen {
            self.inner.state.borrow_mut().save_geometry();
            toplevel.set_fullscreen(None);
        } else {
            let (width, height) = self.inner.state.borrow().saved_geometry();
            self.reshape(width, height);
            toplevel.unset_fullscreen();
        }
        self.inner.state.borrow_mut().fullscreen = !fullscreen;
    }

    pub fn should_close(&self) -> bool {
        self.inner.state.borrow().should_close
    }

    pub fn state(&self) -> WindowState {
        self.inner.state.borrow().clone()
    }

    pub fn button_pressed(&self) -> bool {
        self.inner.ctx.borrow().pointer_button_pressed
    }

    pub(crate) fn globals(&self) -> &GlobalsHandle {
        &self.inner.globals
    }

    pub(crate) fn owns_surface(&self, surface: &WlSurface) -> bool {
        let ctx = self.inner.ctx.borrow();
        ctx.surface
            .get()
            .map_or(false, |own| own.detach() == *surface)
    }

    pub(crate) fn with_cursor(&self, f: impl FnOnce(&WindowCursor)) {
        let ctx = self.inner.ctx.borrow();
        if let Some(cursor) = ctx.cursor.get() {
            f(cursor);
        }
    }

    pub(crate) fn set_button_pressed(&self, pressed: bool) {
        self.inner.ctx.borrow_mut().pointer_button_pressed = pressed;
    }
}

fn destroy_context_chain(globals: &GlobalsHandle, ctx: &mut WindowContext) {
    globals
        .egl
        .release_window(ctx.egl_surface.take(), ctx.egl_context.take());
    drop(ctx.egl_window.take());
    if let Some(role) = ctx.role.take() {
        role.destroy();
    }
    if let Some(xdg_surface) = ctx.xdg_surface.take() {
        xdg_surface.destroy();
    }
    if let Some(surface) = ctx.surface.take() {
        surface.destroy();
    }
    if let Some(cursor) = ctx.cursor.take() {
        cursor.destroy();
    }
    drop(ctx.pointer.take());
}

impl Drop for WindowInner {
    fn drop(&mut self) {
        let globals = self.globals.clone();
        destroy_context_chain(&globals, self.ctx.get_mut());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn toplevel_unless_subwindow_or_menu() {
        assert_eq!(RoleKind::classify(false, false), RoleKind::Toplevel);
        assert_eq!(RoleKind::classify(true, false), RoleKind::Popup);
        assert_eq!(RoleKind::classify(false, true), RoleKind::Popup);
        assert_eq!(RoleKind::classify(true, true), RoleKind::Popup);
    }

    #[test]
    fn game_mode_does_not_change_the_role() {
        // Game mode asks for fullscreen on a toplevel; it never demotes the
        // window to a popup.
        let config = WindowConfig {
            game_mode: true,
            ..Default::default()
        };
        assert_eq!(
            RoleKind::classify(config.is_sub_window, config.is_menu),
            RoleKind::Toplevel
        );
    }

    #[test]
    fn unset_position_and_size_fall_back_to_defaults() {
        let ((x, y), (width, height)) = resolved_geometry(&WindowConfig::default());
        assert_eq!((x, y), (-1, -1));
        assert_eq!((width, height), (300, 300));
    }

    #[test]
    fn explicit_geometry_is_kept() {
        let config = WindowConfig {
            position: Some((10, 20)),
            size: Some((640, 480)),
            ..Default::default()
        };
        assert_eq!(resolved_geometry(&config), ((10, 20), (640, 480)));
    }

    #[test]
    fn fullscreen_roundtrip_restores_geometry() {
        let mut state = WindowState::new();
        state.width = 800;
        state.height = 600;

        state.save_geometry();
        state.fullscreen = true;
        state.width = 1920;
        state.height = 1080;

        assert_eq!(state.saved_geometry(), (800, 600));
    }

    #[test]
    fn saving_again_overwrites_the_old_geometry() {
        let mut state = WindowState::new();
        state.width = 320;
        state.height = 240;
        state.save_geometry();
        state.width = 400;
        state.height = 300;
        state.save_geometry();
        assert_eq!(state.saved_geometry(), (400, 300));
    }
}
