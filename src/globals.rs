use std::cell::RefCell;
use std::rc::Rc;

use wayland_client::protocol::{
    wl_compositor::WlCompositor,
    wl_registry::{self, WlRegistry},
    wl_seat::WlSeat,
    wl_shm::WlShm,
};
use wayland_client::{Display, EventQueue, Interface, Main};
use wayland_cursor::CursorTheme;
use wayland_protocols::xdg_shell::client::xdg_wm_base::{self, XdgWmBase};

use crate::egl::EglDisplay;
use crate::prelude::*;
use crate::state::ToolkitState;

const CURSOR_THEME: &str = "default";
const CURSOR_SIZE: u32 = 32;

/// The four globals this backend cannot run without.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RequiredGlobal {
    Shm,
    Compositor,
    WmBase,
    Seat,
}

impl RequiredGlobal {
    pub const ALL: [RequiredGlobal; 4] = [
        RequiredGlobal::Shm,
        RequiredGlobal::Compositor,
        RequiredGlobal::WmBase,
        RequiredGlobal::Seat,
    ];

    pub fn classify(interface: &str) -> Option<Self> {
        if interface == WlShm::NAME {
            Some(Self::Shm)
        } else if interface == WlCompositor::NAME {
            Some(Self::Compositor)
        } else if interface == XdgWmBase::NAME {
            Some(Self::WmBase)
        } else if interface == WlSeat::NAME {
            Some(Self::Seat)
        } else {
            None
        }
    }

    pub fn missing_message(self) -> &'static str {
        match self {
            Self::Shm => "wl_shm protocol not found",
            Self::Compositor => "wl_compositor protocol not found",
            Self::WmBase => "xdg_wm_base protocol not found",
            Self::Seat => "wl_seat protocol not found",
        }
    }
}

#[derive(Default)]
struct PendingGlobals {
    shm: Option<Main<WlShm>>,
    compositor: Option<Main<WlCompositor>>,
    wm_base: Option<Main<XdgWmBase>>,
    seat: Option<Main<WlSeat>>,
}

impl PendingGlobals {
    fn handle(&mut self, registry: &Main<WlRegistry>, event: wl_registry::Event) {
        match event {
            wl_registry::Event::Global {
                name,
                interface,
                version: _,
            } => match RequiredGlobal::classify(&interface) {
                Some(RequiredGlobal::Shm) => self.shm = Some(registry.bind::<WlShm>(1, name)),
                Some(RequiredGlobal::Compositor) => {
                    self.compositor = Some(registry.bind::<WlCompositor>(1, name))
                }
                Some(RequiredGlobal::WmBase) => {
                    let wm_base = registry.bind::<XdgWmBase>(1, name);
                    // An unanswered ping gets the client disconnected.
                    wm_base.quick_assign(|wm_base, event, _| {
                        if let xdg_wm_base::Event::Ping { serial } = event {
                            wm_base.pong(serial);
                        }
                    });
                    self.wm_base = Some(wm_base);
                }
                Some(RequiredGlobal::Seat) => self.seat = Some(registry.bind::<WlSeat>(1, name)),
                None => {}
            },
            // Globals are never re-bound dynamically; removals are ignored.
            wl_registry::Event::GlobalRemove { .. } => {}
            _ => {}
        }
    }

    fn require<T: Clone>(slot: &Option<T>, which: RequiredGlobal) -> T {
        match slot {
            Some(global) => global.clone(),
            None => fatal!("{}", which.missing_message()),
        }
    }
}

pub struct DisplayInner {
    // Field order is teardown order: the theme and the globals go before
    // the EGL display and the connection.
    pub cursor_theme: RcCell<CursorTheme>,
    pub shm: Main<WlShm>,
    pub seat: Main<WlSeat>,
    pub wm_base: Main<XdgWmBase>,
    pub compositor: Main<WlCompositor>,
    pub registry: Main<WlRegistry>,
    pub egl: EglDisplay,
    pub state: RefCell<ToolkitState>,
    event_queue: RefCell<EventQueue>,
    pub display: Display,
}

#[derive(Clone)]
pub struct GlobalsHandle {
    inner: Rc<DisplayInner>,
}

impl std::ops::Deref for GlobalsHandle {
    type Target = DisplayInner;

    fn deref(&self) -> &Self::Target {
        &self.inner
    }
}

fn cursor_size() -> anyhow::Result<u32> {
    let var = std::env::var("XCURSOR_SIZE")?;
    Ok(var.parse()?)
}

/// Connects to the compositor, discovers the required globals and prepares
/// the EGL display. Every failure in here is fatal; there is no retry.
pub fn initialize(display_name: Option<&str>) -> GlobalsHandle {
    let display = match display_name {
        Some(name) => Display::connect_to_name(name),
        None => Display::connect_to_env(),
    };
    let display = match display {
        Ok(display) => display,
        Err(_) => fatal!("failed to connect to a Wayland compositor"),
    };

    let mut event_queue = display.create_event_queue();
    let attached = display.attach(event_queue.token());
    let registry = attached.get_registry();

    let pending = RcCell::new(PendingGlobals::default());
    registry.quick_assign({
        let pending = pending.clone();
        move |registry, event, _| pending.borrow_mut().handle(&registry, event)
    });

    // One blocking roundtrip so every Global advertisement has been seen.
    event_queue
        .sync_roundtrip(&mut (), |_, _, _| {})
        .expect("wayland connection lost during global discovery");

    let bound = pending.borrow();
    let shm = PendingGlobals::require(&bound.shm, RequiredGlobal::Shm);
    let compositor = PendingGlobals::require(&bound.compositor, RequiredGlobal::Compositor);
    let wm_base = PendingGlobals::require(&bound.wm_base, RequiredGlobal::WmBase);
    let seat = PendingGlobals::require(&bound.seat, RequiredGlobal::Seat);
    drop(bound);

    let cursor_theme = CursorTheme::load_or(CURSOR_THEME, cursor_size().unwrap_or(CURSOR_SIZE), &shm);
    let egl = EglDisplay::initialize(&display);

    let handle = GlobalsHandle {
        inner: Rc::new(DisplayInner {
            cursor_theme: cursor_theme.into(),
            shm,
            seat,
            wm_base,
            compositor,
            registry,
            egl,
            state: RefCell::new(ToolkitState::new()),
            event_queue: RefCell::new(event_queue),
            display,
        }),
    };
    handle.state.borrow_mut().initialised = true;
    // Input devices arm a timer that asserts the initialised flag.
    handle.initialise_input_devices();
    handle
}

impl GlobalsHandle {
    /// Blocks until the compositor has processed every queued request and
    /// all resulting events have been dispatched.
    pub fn roundtrip(&self) {
        self.event_queue
            .borrow_mut()
            .sync_roundtrip(&mut (), |_, _, _| {})
            .expect("wayland connection lost");
    }

    /// Dispatches pending events, blocking until at least one arrives.
    pub fn dispatch(&self) {
        self.event_queue
            .borrow_mut()
            .dispatch(&mut (), |_, _, _| {})
            .expect("wayland connection lost");
    }

    pub fn flush(&self) {
        if let Err(err) = self.display.flush() {
            warning!("failed to flush the wayland connection: {}", err);
        }
    }

    /// Milliseconds since the backend finished initialising.
    pub fn elapsed_time(&self) -> u64 {
        self.state.borrow().start.elapsed().as_millis() as u64
    }

    pub fn initialise_input_devices(&self) {
        let mut state = self.state.borrow_mut();
        debug_assert!(
            state.initialised,
            "input devices need an initialised toolkit"
        );
        state.input_devs_initialised = true;
    }

    pub fn close_input_devices(&self) {
        self.state.borrow_mut().input_devs_initialised = false;
    }
}

#[cfg(test)]
mod tests {
    use super::RequiredGlobal;

    #[test]
    fn recognises_exactly_the_four_required_interfaces() {
        assert_eq!(RequiredGlobal::classify("wl_shm"), Some(RequiredGlobal::Shm));
        assert_eq!(
            RequiredGlobal::classify("wl_compositor"),
            Some(RequiredGlobal::Compositor)
        );
        assert_eq!(
            RequiredGlobal::classify("xdg_wm_base"),
            Some(RequiredGlobal::WmBase)
        );
        assert_eq!(
            RequiredGlobal::classify("wl_seat"),
            Some(RequiredGlobal::Seat)
        );
        assert_eq!(RequiredGlobal::classify("wl_output"), None);
        assert_eq!(RequiredGlobal::classify("zxdg_decoration_manager_v1"), None);
        assert_eq!(RequiredGlobal::classify(""), None);
    }

    #[test]
    fn discovery_is_order_independent() {
        use std::collections::HashSet;

        let adverts = [
            "wl_seat",
            "wl_output",
            "xdg_wm_base",
            "wl_data_device_manager",
            "wl_shm",
            "wl_compositor",
        ];
        let expected: HashSet<_> = RequiredGlobal::ALL.into_iter().collect();
        let mut rotated = adverts.to_vec();
        for _ in 0..adverts.len() {
            rotated.rotate_left(1);
            let bound: HashSet<_> = rotated
                .iter()
                .filter_map(|name| RequiredGlobal::classify(name))
                .collect();
            assert_eq!(bound, expected);
        }
    }

    #[test]
    fn each_missing_global_reports_its_own_protocol() {
        assert_eq!(
            RequiredGlobal::Shm.missing_message(),
            "wl_shm protocol not found"
        );
        assert_eq!(
            RequiredGlobal::Compositor.missing_message(),
            "wl_compositor protocol not found"
        );
        assert_eq!(
            RequiredGlobal::WmBase.missing_message(),
            "xdg_wm_base protocol not found"
        );
        assert_eq!(
            RequiredGlobal::Seat.missing_message(),
            "wl_seat protocol not found"
        );
    }
}
