// SPDX-License-Identifier: MIT
//
// gw-window — the widget-composition layer for gridwin.
//
// A registry of windows over one shared screen backend: windows
// register once at startup, recompute their rectangles from the device
// size whenever placement is dirty, draw in list order through Frames,
// and take turns holding keyboard focus. The registry runs the whole
// redraw protocol — resize poll, replacement, skip-if-clean, draw,
// differential or forced flush, cursor restore — once per input-loop
// iteration.

pub mod manager;
pub mod window;

pub use manager::WindowManager;
pub use window::{Window, WindowId};
