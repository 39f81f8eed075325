//! Wayland platform backend for a cross-platform GL windowing toolkit:
//! global discovery, xdg-shell window lifecycle and the EGL glue.

mod error;
mod slot;

pub mod egl;
pub mod globals;
pub mod prelude;
pub mod state;
pub mod window;

pub use globals::{initialize, GlobalsHandle, RequiredGlobal};
pub use slot::Slot;
pub use state::{DisplayMode, ToolkitState};
pub use window::{Window, WindowConfig};
