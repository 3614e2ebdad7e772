use std::cell::RefCell;
use std::rc::Rc;

use tracing::{debug, info};

use crate::cell::Cell;
use crate::machine::Machine;
use crate::natives::word;

pub const INIT_WINDOW: u8 = 0;
pub const CLOSE_WINDOW: u8 = 1;
pub const WINDOW_SHOULD_CLOSE: u8 = 2;
pub const BEGIN_DRAWING: u8 = 3;
pub const END_DRAWING: u8 = 4;

/// Headless window: records what a program asked of its window.
#[derive(Clone, Debug, Default)]
pub struct Window {
    pub title: String,
    pub width: u16,
    pub height: u16,
    pub open: bool,
    pub drawing: bool,
    /// Completed `begin_drawing`/`end_drawing` pairs.
    pub frames: u64,
    /// Report the window as closing once this many frames are done.
    pub frame_budget: Option<u64>,
}

impl Window {
    pub fn new(frame_budget: Option<u64>) -> Self {
        Self {
            frame_budget,
            ..Default::default()
        }
    }

    pub fn should_close(&self) -> bool {
        !self.open || self.frame_budget.is_some_and(|budget| self.frames >= budget)
    }
}

/// Bind the window natives to slots 0 through 4.
///
/// `init_window` takes width as `args[0..2]` and height as `args[2..4]`
/// (big-endian), and `args[4]` as the tape index of a NUL-terminated title.
/// `window_should_close` returns 1 or 0; every other native returns 0.
pub fn install<C: Cell, const N: usize>(machine: &mut Machine<C, N>, window: &Rc<RefCell<Window>>) {
    let w = Rc::clone(window);
    machine.install(INIT_WINDOW, move |m, args| {
        let mut w = w.borrow_mut();
        w.width = word(args[0], args[1]);
        w.height = word(args[2], args[3]);
        w.title = String::from_utf8_lossy(&m.read_cstr(args[4].to_byte().into())).into_owned();
        w.open = true;
        info!(title = %w.title, width = w.width, height = w.height, "creating window");
        C::ZERO
    });

    let w = Rc::clone(window);
    machine.install(CLOSE_WINDOW, move |_, _| {
        let mut w = w.borrow_mut();
        w.open = false;
        info!(frames = w.frames, "closing window");
        C::ZERO
    });

    let w = Rc::clone(window);
    machine.install(WINDOW_SHOULD_CLOSE, move |_, _| {
        C::from_byte(w.borrow().should_close().into())
    });

    let w = Rc::clone(window);
    machine.install(BEGIN_DRAWING, move |_, _| {
        w.borrow_mut().drawing = true;
        C::ZERO
    });

    let w = Rc::clone(window);
    machine.install(END_DRAWING, move |_, _| {
        let mut w = w.borrow_mut();
        if w.drawing {
            w.drawing = false;
            w.frames += 1;
            debug!(frame = w.frames, "frame done");
        }
        C::ZERO
    });
}
