use std::fmt;

use crate::cell::Cell;

/// Tape length of the reference configuration.
pub const TAPE_LENGTH: usize = 30_000;

/// Number of slots in the native function table, one per byte value.
pub const NATIVE_SLOTS: usize = 256;

/// Number of cells passed to a native function.
pub const NATIVE_ARGS: usize = 8;

/// A host-supplied function callable from a program with `!`.
///
/// Receives the machine and the 8 cells preceding the current cell (the cell
/// at `dp - 8` first) and returns the value stored into the current cell.
pub type Native<C, const N: usize> = Box<dyn FnMut(&mut Machine<C, N>, [C; NATIVE_ARGS]) -> C>;

/// The machine with unsigned cells and the reference tape length.
pub type Bfpp = Machine<u8, TAPE_LENGTH>;

/// The machine with signed cells and the reference tape length.
pub type SignedBfpp = Machine<i8, TAPE_LENGTH>;

/// How the data pointer behaves at the tape edges.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum BoundsPolicy {
    /// Pointer arithmetic, including the native argument window, wraps
    /// modulo the tape length.
    #[default]
    Wrap,
    /// Leaving the tape, or reading a native window before cell 0, is an error.
    Strict,
}

/// Where the `?` dump goes.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum DebugOutput {
    #[default]
    Sink,
    Trace,
    Silent,
}

/// Evaluation settings carried by a machine.
#[derive(Clone, Copy, Debug, Default)]
pub struct EngineConfig {
    pub bounds: BoundsPolicy,
    pub debug: DebugOutput,
    /// Maximum instructions dispatched per `evaluate` call (`None` for unbounded).
    pub step_limit: Option<u64>,
}

/// The mutable machine state: a fixed tape, two pointers and the native table.
///
/// A machine is long-lived. Each evaluation resets only the two pointers, so
/// tape contents and installed natives carry over from one program to the next.
pub struct Machine<C: Cell, const N: usize> {
    pub(crate) tape: [C; N],
    pub(crate) dp: usize,
    pub(crate) ip: usize,
    pub(crate) natives: [Option<Native<C, N>>; NATIVE_SLOTS],
    pub config: EngineConfig,
}

impl<C: Cell, const N: usize> Machine<C, N> {
    /// A machine with a zeroed tape, both pointers at 0 and no natives.
    pub fn new() -> Self {
        Self::with_config(EngineConfig::default())
    }

    pub fn with_config(config: EngineConfig) -> Self {
        assert!(N > 0, "tape length must be positive");
        Self {
            tape: [C::ZERO; N],
            dp: 0,
            ip: 0,
            natives: std::array::from_fn(|_| None),
            config,
        }
    }

    /// Zero the tape and move the data pointer to 0.
    ///
    /// The instruction pointer and the native table are left alone, so a host
    /// can rerun a program without rebinding its natives.
    pub fn reset(&mut self) {
        self.tape.fill(C::ZERO);
        self.dp = 0;
    }

    /// Bind `native` to `slot`, returning whatever was bound there before.
    pub fn install<F>(&mut self, slot: u8, native: F) -> Option<Native<C, N>>
    where
        F: FnMut(&mut Machine<C, N>, [C; NATIVE_ARGS]) -> C + 'static,
    {
        self.natives[slot as usize].replace(Box::new(native))
    }

    pub fn uninstall(&mut self, slot: u8) -> Option<Native<C, N>> {
        self.natives[slot as usize].take()
    }

    pub fn has_native(&self, slot: u8) -> bool {
        self.natives[slot as usize].is_some()
    }

    pub fn tape(&self) -> &[C; N] {
        &self.tape
    }

    pub fn tape_mut(&mut self) -> &mut [C; N] {
        &mut self.tape
    }

    pub fn data_pointer(&self) -> usize {
        self.dp
    }

    /// Move the data pointer. Out-of-range values wrap modulo the tape length.
    pub fn set_data_pointer(&mut self, dp: usize) {
        self.dp = dp % N;
    }

    pub fn instruction_pointer(&self) -> usize {
        self.ip
    }

    pub fn current(&self) -> C {
        self.tape[self.dp]
    }

    pub fn current_mut(&mut self) -> &mut C {
        &mut self.tape[self.dp]
    }

    /// Read a NUL-terminated byte string starting at `start`.
    ///
    /// Stops at the first zero cell or the end of the tape.
    pub fn read_cstr(&self, start: usize) -> Vec<u8> {
        self.tape
            .iter()
            .skip(start)
            .map(|c| c.to_byte())
            .take_while(|&b| b != 0)
            .collect()
    }
}

impl<C: Cell, const N: usize> Default for Machine<C, N> {
    fn default() -> Self {
        Self::new()
    }
}

impl<C: Cell, const N: usize> fmt::Debug for Machine<C, N> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let installed = self.natives.iter().filter(|n| n.is_some()).count();
        f.debug_struct("Machine")
            .field("tape_length", &N)
            .field("dp", &self.dp)
            .field("ip", &self.ip)
            .field("natives", &installed)
            .field("config", &self.config)
            .finish()
    }
}
