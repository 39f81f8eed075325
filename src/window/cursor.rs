use wayland_client::protocol::wl_pointer::{self, ButtonState, WlPointer};
use wayland_client::protocol::wl_surface::WlSurface;
use wayland_client::Main;

use crate::prelude::*;

use super::Window;

/// A window's cursor: the theme image attached to a dedicated surface.
/// A theme without the named cursor leaves the surface bare, and setting
/// the cursor is skipped rather than treated as an error.
pub struct WindowCursor {
    surface: Main<WlSurface>,
    hotspot: Option<(u32, u32)>,
}

impl WindowCursor {
    pub fn new(globals: &GlobalsHandle, name: &str) -> Self {
        let surface = globals.compositor.create_surface();
        let mut theme = globals.cursor_theme.borrow_mut();
        let hotspot = theme.get_cursor(name).map(|cursor| {
            let image = &cursor[0];
            let (width, height) = image.dimensions();
            surface.attach(Some(image), 0, 0);
            surface.damage_buffer(0, 0, width as i32, height as i32);
            surface.commit();
            image.hotspot()
        });
        Self { surface, hotspot }
    }

    pub fn set_on(&self, pointer: &WlPointer, serial: u32) {
        if let Some((hx, hy)) = self.hotspot {
            pointer.set_cursor(serial, Some(&self.surface), hx as i32, hy as i32);
        }
    }

    pub fn clear_on(&self, pointer: &WlPointer, serial: u32) {
        pointer.set_cursor(serial, None, 0, 0);
    }

    pub fn destroy(&self) {
        self.surface.destroy();
    }
}

/// Wires the seat pointer to a window: entering the window's surface sets
/// the cursor with the enter serial, button events track the pressed flag.
pub fn attach_pointer(window: &Window) -> Main<WlPointer> {
    let pointer = window.globals().seat.get_pointer();
    pointer.quick_assign({
        let window = window.clone();
        move |pointer, event, _| handle_pointer_event(&window, &pointer, event)
    });
    pointer
}

fn handle_pointer_event(window: &Window, pointer: &Main<WlPointer>, event: wl_pointer::Event) {
    match event {
        wl_pointer::Event::Enter { serial, surface, .. } => {
            if window.owns_surface(&surface) {
                window.with_cursor(|cursor| cursor.set_on(pointer, serial));
            }
        }
        wl_pointer::Event::Leave { serial, surface } => {
            if window.owns_surface(&surface) {
                window.with_cursor(|cursor| cursor.clear_on(pointer, serial));
            }
        }
        wl_pointer::Event::Button { state, .. } => {
            window.set_button_pressed(state == ButtonState::Pressed);
        }
        _ => {}
    }
}
