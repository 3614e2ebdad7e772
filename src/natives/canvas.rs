use std::cell::RefCell;
use std::io::{self, Write};
use std::rc::Rc;

use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};

use crate::cell::Cell;
use crate::machine::Machine;

pub const CLEAR_BACKGROUND: u8 = 0;
pub const DRAW_CELL: u8 = 1;
pub const GET_COLS: u8 = 2;
pub const GET_ROWS: u8 = 3;
pub const RANDOM_BYTE: u8 = 4;

pub type Rgb = [u8; 3];

const BACKGROUND: Rgb = [0, 0, 0];

/// Configuration for a canvas.
#[derive(Clone, Copy, Debug)]
pub struct CanvasConfig {
    pub cols: u8,
    pub rows: u8,
    /// Seed for the `random_byte` native.
    pub seed: u64,
}

impl Default for CanvasConfig {
    fn default() -> Self {
        Self {
            cols: 40,
            rows: 40,
            seed: 0,
        }
    }
}

/// A grid of colored cells drawn by a program.
#[derive(Clone, Debug)]
pub struct Canvas {
    cols: u8,
    rows: u8,
    pixels: Vec<Rgb>,
    rng: SmallRng,
}

impl Canvas {
    pub fn new(config: CanvasConfig) -> Self {
        Self {
            cols: config.cols,
            rows: config.rows,
            pixels: vec![BACKGROUND; config.cols as usize * config.rows as usize],
            rng: SmallRng::seed_from_u64(config.seed),
        }
    }

    pub fn cols(&self) -> u8 {
        self.cols
    }

    pub fn rows(&self) -> u8 {
        self.rows
    }

    pub fn clear(&mut self) {
        self.pixels.fill(BACKGROUND);
    }

    /// Paint one cell. Coordinates outside the grid are ignored.
    pub fn draw(&mut self, x: u8, y: u8, color: Rgb) {
        if x < self.cols && y < self.rows {
            self.pixels[y as usize * self.cols as usize + x as usize] = color;
        }
    }

    pub fn pixel(&self, x: u8, y: u8) -> Option<Rgb> {
        (x < self.cols && y < self.rows)
            .then(|| self.pixels[y as usize * self.cols as usize + x as usize])
    }

    pub fn random_byte(&mut self) -> u8 {
        self.rng.r#gen::<u8>()
    }

    /// Write the grid as a binary PPM image, each cell `scale` pixels square.
    pub fn write_ppm<W: Write>(&self, mut out: W, scale: usize) -> io::Result<()> {
        let scale = scale.max(1);
        let cols = self.cols as usize;
        write!(out, "P6\n{} {}\n255\n", cols * scale, self.rows as usize * scale)?;
        let mut row = Vec::with_capacity(cols * scale * 3);
        for y in 0..self.rows as usize {
            row.clear();
            for color in &self.pixels[y * cols..(y + 1) * cols] {
                for _ in 0..scale {
                    row.extend_from_slice(color);
                }
            }
            for _ in 0..scale {
                out.write_all(&row)?;
            }
        }
        out.flush()
    }
}

/// Bind the canvas natives to slots 0 through 4.
///
/// `draw_cell` takes `x, y, r, g, b` as `args[0..5]`. `get_cols`, `get_rows`
/// and `random_byte` return their value; the rest return 0.
pub fn install<C: Cell, const N: usize>(machine: &mut Machine<C, N>, canvas: &Rc<RefCell<Canvas>>) {
    let c = Rc::clone(canvas);
    machine.install(CLEAR_BACKGROUND, move |_, _| {
        c.borrow_mut().clear();
        C::ZERO
    });

    let c = Rc::clone(canvas);
    machine.install(DRAW_CELL, move |_, args| {
        let [x, y, r, g, b] = [args[0], args[1], args[2], args[3], args[4]].map(Cell::to_byte);
        c.borrow_mut().draw(x, y, [r, g, b]);
        C::ZERO
    });

    let c = Rc::clone(canvas);
    machine.install(GET_COLS, move |_, _| C::from_byte(c.borrow().cols()));

    let c = Rc::clone(canvas);
    machine.install(GET_ROWS, move |_, _| C::from_byte(c.borrow().rows()));

    let c = Rc::clone(canvas);
    machine.install(RANDOM_BYTE, move |_, _| C::from_byte(c.borrow_mut().random_byte()));
}
