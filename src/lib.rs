pub mod brackets;
pub mod cell;
pub mod codegen;
pub mod concat;
pub mod engine;
pub mod error;
pub mod lint;
pub mod machine;
pub mod natives;
pub mod sink;
pub mod suite;

pub use cell::Cell;
pub use engine::{evaluate, status_of};
pub use error::{EvalError, HostError};
pub use machine::{Bfpp, BoundsPolicy, DebugOutput, EngineConfig, Machine, SignedBfpp};
pub use sink::Sink;
