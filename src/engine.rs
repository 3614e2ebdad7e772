use tracing::{debug, trace};

use crate::cell::Cell;
use crate::error::{EvalError, STATUS_OK};
use crate::machine::{BoundsPolicy, DebugOutput, Machine, NATIVE_ARGS};
use crate::sink::Sink;

pub(crate) const PLUS: u8 = b'+';
pub(crate) const MINUS: u8 = b'-';
pub(crate) const GREATER: u8 = b'>';
pub(crate) const LESS: u8 = b'<';
pub(crate) const DOT: u8 = b'.';
pub(crate) const LBRACKET: u8 = b'[';
pub(crate) const RBRACKET: u8 = b']';
pub(crate) const DOLLAR: u8 = b'$';
pub(crate) const QUESTION: u8 = b'?';
pub(crate) const BANG: u8 = b'!';
pub(crate) const SEMICOLON: u8 = b';';

/// Returns true if `byte` is dispatched by the engine without error.
pub fn is_instruction(byte: u8) -> bool {
    matches!(
        byte,
        PLUS | MINUS
            | GREATER
            | LESS
            | DOT
            | LBRACKET
            | RBRACKET
            | DOLLAR
            | QUESTION
            | BANG
            | SEMICOLON
            | b' '
            | b'\t'
            | b'\r'
            | b'\n'
    )
}

/// Evaluate `program` against `machine`.
///
/// Both pointers are reset to 0 first; the tape and the native table are kept.
/// Runs until the instruction pointer reaches the end of the program or an
/// instruction fails. On failure a diagnostic line is written to `sink` and
/// evaluation stops at the failing instruction.
pub fn evaluate<C, const N: usize, S>(
    machine: &mut Machine<C, N>,
    program: &[u8],
    sink: &mut S,
) -> Result<(), EvalError>
where
    C: Cell,
    S: Sink + ?Sized,
{
    machine.dp = 0;
    machine.ip = 0;
    debug!(len = program.len(), "evaluating program");

    let result = run(machine, program, sink);
    match &result {
        Ok(()) => debug!("program finished"),
        Err(e) => {
            report(e, sink);
            debug!(status = e.status(), ip = machine.ip, "program failed: {e}");
        }
    }
    result
}

/// Integer status for an evaluation result: 0 on success, negative on error.
pub fn status_of(result: &Result<(), EvalError>) -> i32 {
    match result {
        Ok(()) => STATUS_OK,
        Err(e) => e.status(),
    }
}

fn run<C, const N: usize, S>(
    machine: &mut Machine<C, N>,
    program: &[u8],
    sink: &mut S,
) -> Result<(), EvalError>
where
    C: Cell,
    S: Sink + ?Sized,
{
    let len = program.len();
    let step_limit = machine.config.step_limit;
    let mut steps: u64 = 0;

    while machine.ip < len {
        if let Some(limit) = step_limit {
            if steps >= limit {
                return Err(EvalError::StepLimitExceeded { limit });
            }
        }
        steps += 1;

        let ip = machine.ip;
        match program[ip] {
            PLUS => {
                let cell = machine.current_mut();
                *cell = cell.increment();
            }
            MINUS => {
                let cell = machine.current_mut();
                *cell = cell.decrement();
            }
            GREATER => shift_right(machine)?,
            LESS => shift_left(machine)?,
            DOT => {
                sink.write_char(machine.current().to_byte());
                sink.flush();
            }
            LBRACKET => {
                if machine.current().is_zero() {
                    machine.ip = match_forward(program, ip)?;
                }
            }
            RBRACKET => {
                if !machine.current().is_zero() {
                    // Land on the matching '[' so it is evaluated again.
                    machine.ip = match_backward(program, ip)?;
                    continue;
                }
            }
            DOLLAR => machine.reset(),
            QUESTION => dump(machine, sink),
            BANG => call_native(machine)?,
            SEMICOLON => match program[ip..].iter().position(|&b| b == b'\n') {
                Some(offset) => machine.ip = ip + offset,
                None => {
                    machine.ip = len;
                    break;
                }
            },
            b' ' | b'\t' | b'\r' | b'\n' => {}
            other => {
                return Err(EvalError::UnknownInstruction {
                    instruction: other,
                    position: ip,
                });
            }
        }
        machine.ip += 1;
    }

    Ok(())
}

#[inline(always)]
fn shift_right<C: Cell, const N: usize>(machine: &mut Machine<C, N>) -> Result<(), EvalError> {
    let next = machine.dp + 1;
    machine.dp = if next < N {
        next
    } else {
        match machine.config.bounds {
            BoundsPolicy::Wrap => 0,
            BoundsPolicy::Strict => {
                return Err(EvalError::DataPointerOutOfBounds { position: machine.ip });
            }
        }
    };
    Ok(())
}

#[inline(always)]
fn shift_left<C: Cell, const N: usize>(machine: &mut Machine<C, N>) -> Result<(), EvalError> {
    machine.dp = match machine.dp.checked_sub(1) {
        Some(prev) => prev,
        None => match machine.config.bounds {
            BoundsPolicy::Wrap => N - 1,
            BoundsPolicy::Strict => {
                return Err(EvalError::DataPointerOutOfBounds { position: machine.ip });
            }
        },
    };
    Ok(())
}

fn dump<C: Cell, const N: usize, S: Sink + ?Sized>(machine: &Machine<C, N>, sink: &mut S) {
    let value = machine.current().to_int();
    match machine.config.debug {
        DebugOutput::Sink => {
            sink.write_text("[dp=");
            sink.write_int(machine.dp as i64);
            sink.write_text("] ");
            sink.write_int(value);
            sink.flush();
        }
        DebugOutput::Trace => debug!(dp = machine.dp, value, "dump"),
        DebugOutput::Silent => {}
    }
}

/// Call the native selected by the current cell and store its result there.
///
/// Arguments are the 8 cells before the current one: `dp - 8` becomes
/// `args[0]` and `dp - 1` becomes `args[7]`.
fn call_native<C: Cell, const N: usize>(machine: &mut Machine<C, N>) -> Result<(), EvalError> {
    let dp = machine.dp;
    let index = machine.tape[dp].to_byte();
    let slot = index as usize;

    let Some(mut native) = machine.natives[slot].take() else {
        return Err(EvalError::InvalidNativeIndex { index });
    };

    if dp < NATIVE_ARGS && machine.config.bounds == BoundsPolicy::Strict {
        machine.natives[slot] = Some(native);
        return Err(EvalError::NativeWindowUnderflow {
            index,
            data_pointer: dp,
        });
    }

    // N * NATIVE_ARGS keeps the subtraction non-negative for any tape length.
    let args: [C; NATIVE_ARGS] = std::array::from_fn(|k| {
        machine.tape[(dp + N * NATIVE_ARGS - (NATIVE_ARGS - k)) % N]
    });

    trace!(index, dp, ?args, "calling native");
    let result = native(machine, args);

    // A native may have bound a replacement for itself; keep that one.
    if machine.natives[slot].is_none() {
        machine.natives[slot] = Some(native);
    }
    machine.tape[dp] = result;
    Ok(())
}

/// Scan forward from the `[` at `origin` for its matching `]`.
pub(crate) fn match_forward(program: &[u8], origin: usize) -> Result<usize, EvalError> {
    let mut depth: usize = 0;
    for (i, &byte) in program.iter().enumerate().skip(origin) {
        match byte {
            LBRACKET => depth += 1,
            RBRACKET => {
                depth -= 1;
                if depth == 0 {
                    return Ok(i);
                }
            }
            _ => {}
        }
    }
    Err(EvalError::UnmatchedOpenBracket {
        origin,
        reached: program.len(),
    })
}

/// Scan backward from the `]` at `origin` for its matching `[`.
pub(crate) fn match_backward(program: &[u8], origin: usize) -> Result<usize, EvalError> {
    let mut depth: usize = 0;
    for i in (0..=origin).rev() {
        match program[i] {
            RBRACKET => depth += 1,
            LBRACKET => {
                depth -= 1;
                if depth == 0 {
                    return Ok(i);
                }
            }
            _ => {}
        }
    }
    Err(EvalError::UnmatchedCloseBracket { origin })
}

fn report<S: Sink + ?Sized>(error: &EvalError, sink: &mut S) {
    match *error {
        EvalError::UnknownInstruction { instruction, .. } => {
            sink.write_text("ERROR: unknown instruction '");
            sink.write_char(instruction);
            sink.write_char(b'\'');
        }
        EvalError::UnmatchedOpenBracket { origin, reached } => {
            sink.write_text("ERROR: could not find matching ']' for '[' at ");
            sink.write_int(origin as i64);
            sink.write_text(" (scan reached ");
            sink.write_int(reached as i64);
            sink.write_char(b')');
        }
        EvalError::UnmatchedCloseBracket { origin } => {
            sink.write_text("ERROR: could not find matching '[' for ']' at ");
            sink.write_int(origin as i64);
        }
        EvalError::InvalidNativeIndex { index } => {
            sink.write_text("ERROR: invalid native function with index ");
            sink.write_int(index.into());
        }
        _ => {
            sink.write_text("ERROR: ");
            sink.write_text(&error.to_string());
        }
    }
    sink.flush();
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;
    use std::rc::Rc;

    use super::*;
    use crate::machine::{Bfpp, EngineConfig};
    use crate::sink::{LineSink, NullSink, RecordingSink, SinkEvent};

    type Small = Machine<u8, 64>;

    fn run_small(program: &[u8]) -> (Small, Result<(), EvalError>) {
        let mut machine = Small::new();
        let result = evaluate(&mut machine, program, &mut NullSink);
        (machine, result)
    }

    fn strict() -> EngineConfig {
        EngineConfig {
            bounds: BoundsPolicy::Strict,
            ..Default::default()
        }
    }

    #[test]
    fn test_increment_and_decrement() {
        let (machine, result) = run_small(b"+++-");
        assert_eq!(result, Ok(()));
        assert_eq!(machine.tape()[0], 2);
    }

    #[test]
    fn test_decrement_wraps() {
        let (machine, _) = run_small(b"-");
        assert_eq!(machine.tape()[0], 255);
    }

    #[test]
    fn test_output_writes_char_then_flush() {
        let mut machine = Small::new();
        let mut sink = RecordingSink::new();
        let result = evaluate(&mut machine, b"+++.", &mut sink);
        assert_eq!(result, Ok(()));
        assert_eq!(sink.events, vec![SinkEvent::Char(3), SinkEvent::Flush]);
    }

    #[test]
    fn test_hello_world() {
        let program = b"++++++++[>++++[>++>+++>+++>+<<<<-]>+>+>->>+[<]<-]>>.>---.+++++++..+++.>>.<-.<.+++.------.--------.>>+.>++.";
        let mut machine = Bfpp::new();
        let mut sink = RecordingSink::new();
        evaluate(&mut machine, program, &mut sink).unwrap();
        let printed: Vec<u8> = sink
            .events
            .iter()
            .filter_map(|e| match e {
                SinkEvent::Char(c) => Some(*c),
                _ => None,
            })
            .collect();
        assert_eq!(printed, b"Hello World!\n");
    }

    #[test]
    fn test_zero_cell_skips_loop() {
        // The body would leave a mark in cell 1 if entered.
        let (machine, result) = run_small(b"[>+<]");
        assert_eq!(result, Ok(()));
        assert_eq!(machine.tape()[1], 0);
    }

    #[test]
    fn test_nonzero_cell_enters_loop() {
        let (machine, _) = run_small(b"+[>+<-]");
        assert_eq!(machine.tape()[0], 0);
        assert_eq!(machine.tape()[1], 1);
    }

    #[test]
    fn test_loop_at_program_start_jumps_back_to_zero() {
        // The matching '[' is at index 0.
        let mut machine = Small::new();
        machine.tape_mut()[0] = 3;
        let result = evaluate(&mut machine, b"[>+<-]", &mut NullSink);
        assert_eq!(result, Ok(()));
        assert_eq!(machine.tape()[1], 3);
    }

    #[test]
    fn test_nested_loops() {
        // 3 * 4 via nested loops.
        let (machine, _) = run_small(b"+++[>++++[>+<-]<-]");
        assert_eq!(machine.tape()[2], 12);
    }

    #[test]
    fn test_unmatched_open_bracket() {
        let mut machine = Small::new();
        let mut sink = RecordingSink::new();
        let result = evaluate(&mut machine, b"[+", &mut sink);
        assert_eq!(
            result,
            Err(EvalError::UnmatchedOpenBracket { origin: 0, reached: 2 })
        );
        assert_eq!(status_of(&result), -2);
        // Nothing after the bracket ran.
        assert_eq!(machine.tape()[0], 0);
        assert_eq!(sink.events.last(), Some(&SinkEvent::Flush));
    }

    #[test]
    fn test_unmatched_bracket_diagnostics() {
        let mut machine = Small::new();
        let mut sink = LineSink::new(Vec::new());
        let result = evaluate(&mut machine, b"++--[+++", &mut sink);
        assert_eq!(
            result,
            Err(EvalError::UnmatchedOpenBracket { origin: 4, reached: 8 })
        );
        assert_eq!(
            sink.finish().unwrap(),
            b"ERROR: could not find matching ']' for '[' at 4 (scan reached 8)\n"
        );

        let mut sink = LineSink::new(Vec::new());
        let result = evaluate(&mut machine, b"+]", &mut sink);
        assert_eq!(result, Err(EvalError::UnmatchedCloseBracket { origin: 1 }));
        assert_eq!(
            sink.finish().unwrap(),
            b"ERROR: could not find matching '[' for ']' at 1\n"
        );
    }

    #[test]
    fn test_unmatched_open_bracket_nonzero_falls_through() {
        let (machine, result) = run_small(b"+[+");
        assert_eq!(result, Ok(()));
        assert_eq!(machine.tape()[0], 2);
    }

    #[test]
    fn test_unmatched_close_bracket() {
        let (_, result) = run_small(b"+]");
        assert_eq!(result, Err(EvalError::UnmatchedCloseBracket { origin: 1 }));
        assert_eq!(status_of(&result), -3);
    }

    #[test]
    fn test_unmatched_close_bracket_zero_falls_through() {
        let (_, result) = run_small(b"]");
        assert_eq!(result, Ok(()));
    }

    #[test]
    fn test_reset_instruction() {
        let (machine, result) = run_small(b"+++>++$+");
        assert_eq!(result, Ok(()));
        assert_eq!(machine.tape()[0], 1);
        assert_eq!(machine.tape()[1], 0);
        assert_eq!(machine.data_pointer(), 0);
    }

    #[test]
    fn test_debug_dump() {
        let mut machine = Small::new();
        let mut sink = LineSink::new(Vec::new());
        evaluate(&mut machine, b">++?", &mut sink).unwrap();
        assert_eq!(sink.finish().unwrap(), b"[dp=1] 2\n");
    }

    #[test]
    fn test_debug_dump_signed() {
        let mut machine = Machine::<i8, 16>::new();
        let mut sink = LineSink::new(Vec::new());
        evaluate(&mut machine, b"-?.", &mut sink).unwrap();
        assert_eq!(sink.finish().unwrap(), b"[dp=0] -1\n\xff\n");
    }

    #[test]
    fn test_debug_dump_silent() {
        let mut machine = Small::with_config(EngineConfig {
            debug: DebugOutput::Silent,
            ..Default::default()
        });
        let mut sink = RecordingSink::new();
        evaluate(&mut machine, b"+?", &mut sink).unwrap();
        assert!(sink.events.is_empty());
    }

    #[test]
    fn test_comment_skips_to_newline() {
        let (machine, result) = run_small(b"+ ; [[[ not code ]\n+");
        assert_eq!(result, Ok(()));
        assert_eq!(machine.tape()[0], 2);
    }

    #[test]
    fn test_comment_at_end_without_newline() {
        let (machine, result) = run_small(b"+;trailing");
        assert_eq!(result, Ok(()));
        assert_eq!(machine.tape()[0], 1);
        assert_eq!(machine.instruction_pointer(), 10);
    }

    #[test]
    fn test_whitespace_is_noop() {
        let (machine, result) = run_small(b" +\t+\r\n");
        assert_eq!(result, Ok(()));
        assert_eq!(machine.tape()[0], 2);
    }

    #[test]
    fn test_unknown_instruction() {
        let mut machine = Small::new();
        let mut sink = LineSink::new(Vec::new());
        let result = evaluate(&mut machine, b"+a+", &mut sink);
        assert_eq!(
            result,
            Err(EvalError::UnknownInstruction { instruction: b'a', position: 1 })
        );
        assert_eq!(machine.tape()[0], 1);
        assert_eq!(
            sink.finish().unwrap(),
            b"ERROR: unknown instruction 'a'\n"
        );
    }

    #[test]
    fn test_pointers_reset_tape_kept() {
        let mut machine = Small::new();
        evaluate(&mut machine, b">+", &mut NullSink).unwrap();
        evaluate(&mut machine, b">+", &mut NullSink).unwrap();
        assert_eq!(machine.tape()[1], 2);
        assert_eq!(machine.data_pointer(), 1);
        assert_eq!(machine.instruction_pointer(), 2);
    }

    #[test]
    fn test_pointer_wraps_left() {
        let (machine, result) = run_small(b"<+");
        assert_eq!(result, Ok(()));
        assert_eq!(machine.tape()[63], 1);
    }

    #[test]
    fn test_pointer_wraps_right() {
        let mut machine = Machine::<u8, 4>::new();
        evaluate(&mut machine, b">>>>+", &mut NullSink).unwrap();
        assert_eq!(machine.tape()[0], 1);
    }

    #[test]
    fn test_strict_pointer_left() {
        let mut machine = Small::with_config(strict());
        let result = evaluate(&mut machine, b"+<", &mut NullSink);
        assert_eq!(result, Err(EvalError::DataPointerOutOfBounds { position: 1 }));
        assert_eq!(status_of(&result), -5);
    }

    #[test]
    fn test_strict_pointer_right() {
        let mut machine = Machine::<u8, 4>::with_config(strict());
        let result = evaluate(&mut machine, b">>>>", &mut NullSink);
        assert_eq!(result, Err(EvalError::DataPointerOutOfBounds { position: 3 }));
        assert_eq!(machine.data_pointer(), 3);
    }

    #[test]
    fn test_native_receives_window_in_order() {
        let mut machine = Small::new();
        let seen = Rc::new(RefCell::new(None));
        let record = Rc::clone(&seen);
        machine.install(5, move |_, args| {
            *record.borrow_mut() = Some(args);
            args.iter().fold(0u8, |acc, &a| acc.wrapping_add(a))
        });
        for (i, cell) in machine.tape_mut()[..8].iter_mut().enumerate() {
            *cell = 10 + i as u8;
        }
        machine.tape_mut()[8] = 5;

        let result = evaluate(&mut machine, b">>>>>>>>!", &mut NullSink);
        assert_eq!(result, Ok(()));
        assert_eq!(*seen.borrow(), Some([10, 11, 12, 13, 14, 15, 16, 17]));
        assert_eq!(machine.tape()[8], (10..18).sum::<u8>());
        // The window itself is untouched.
        assert_eq!(machine.tape()[0], 10);
    }

    #[test]
    fn test_missing_native() {
        let mut machine = Small::new();
        let calls = Rc::new(RefCell::new(0));
        let counter = Rc::clone(&calls);
        machine.install(5, move |_, _| {
            *counter.borrow_mut() += 1;
            0
        });
        machine.tape_mut()[8] = 6;

        let mut sink = LineSink::new(Vec::new());
        let result = evaluate(&mut machine, b">>>>>>>>!", &mut sink);
        assert_eq!(result, Err(EvalError::InvalidNativeIndex { index: 6 }));
        assert_eq!(status_of(&result), -4);
        assert_eq!(*calls.borrow(), 0);
        assert_eq!(machine.tape()[8], 6);
        assert_eq!(
            sink.finish().unwrap(),
            b"ERROR: invalid native function with index 6\n"
        );
    }

    #[test]
    fn test_native_window_wraps() {
        let mut machine = Machine::<u8, 16>::new();
        let seen = Rc::new(RefCell::new(None));
        let record = Rc::clone(&seen);
        machine.install(0, move |_, args| {
            *record.borrow_mut() = Some(args);
            7
        });
        for i in 8..16 {
            machine.tape_mut()[i] = i as u8;
        }
        evaluate(&mut machine, b"!", &mut NullSink).unwrap();
        assert_eq!(*seen.borrow(), Some([8, 9, 10, 11, 12, 13, 14, 15]));
        assert_eq!(machine.tape()[0], 7);
    }

    #[test]
    fn test_native_window_underflow_strict() {
        let mut machine = Small::with_config(strict());
        let calls = Rc::new(RefCell::new(0));
        let counter = Rc::clone(&calls);
        machine.install(0, move |_, _| {
            *counter.borrow_mut() += 1;
            1
        });
        let result = evaluate(&mut machine, b">>>!", &mut NullSink);
        assert_eq!(
            result,
            Err(EvalError::NativeWindowUnderflow { index: 0, data_pointer: 3 })
        );
        assert_eq!(*calls.borrow(), 0);
        // The native is still bound after the failed call.
        assert!(machine.has_native(0));
    }

    #[test]
    fn test_native_result_goes_to_calling_cell() {
        let mut machine = Small::new();
        machine.install(1, |m, _| {
            m.tape_mut()[0] = 99;
            m.set_data_pointer(0);
            42
        });
        machine.tape_mut()[9] = 1;
        evaluate(&mut machine, b">>>>>>>>>!", &mut NullSink).unwrap();
        assert_eq!(machine.tape()[9], 42);
        assert_eq!(machine.tape()[0], 99);
        assert_eq!(machine.data_pointer(), 0);
    }

    #[test]
    fn test_native_stays_installed_and_can_replace_itself() {
        let mut machine = Small::new();
        machine.install(2, |m, _| {
            m.install(2, |_, _| 20);
            10
        });
        machine.tape_mut()[8] = 2;
        evaluate(&mut machine, b">>>>>>>>!", &mut NullSink).unwrap();
        assert_eq!(machine.tape()[8], 10);
        machine.tape_mut()[8] = 2;
        evaluate(&mut machine, b">>>>>>>>!", &mut NullSink).unwrap();
        assert_eq!(machine.tape()[8], 20);
    }

    #[test]
    fn test_signed_native_index_uses_bit_pattern() {
        let mut machine = Machine::<i8, 16>::new();
        machine.install(255, |_, _| 5);
        evaluate(&mut machine, b"-!", &mut NullSink).unwrap();
        assert_eq!(machine.tape()[0], 5);
    }

    #[test]
    fn test_step_limit() {
        let mut machine = Small::with_config(EngineConfig {
            step_limit: Some(100),
            ..Default::default()
        });
        let result = evaluate(&mut machine, b"+[]", &mut NullSink);
        assert_eq!(result, Err(EvalError::StepLimitExceeded { limit: 100 }));
        assert_eq!(status_of(&result), -7);
    }

    #[test]
    fn test_empty_program() {
        let (_, result) = run_small(b"");
        assert_eq!(status_of(&result), 0);
    }

    #[test]
    fn test_match_helpers() {
        let program = b"[[]]";
        assert_eq!(match_forward(program, 0), Ok(3));
        assert_eq!(match_forward(program, 1), Ok(2));
        assert_eq!(match_backward(program, 3), Ok(0));
        assert_eq!(match_backward(program, 2), Ok(1));
    }
}
