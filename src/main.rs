use std::cell::RefCell;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::rc::Rc;

use clap::{Args, Parser, Subcommand, ValueEnum};
use tracing::{Level, error, info};
use tracing_subscriber::EnvFilter;

use bfpp::error::{STATUS_HOST_FAILURE, STATUS_OK};
use bfpp::lint::{Finding, Severity};
use bfpp::machine::TAPE_LENGTH;
use bfpp::natives::canvas::{self, Canvas, CanvasConfig};
use bfpp::natives::window::{self, Window};
use bfpp::sink::{LineSink, TracingSink};
use bfpp::suite::{self, Outcome, SuiteConfig};
use bfpp::{
    BoundsPolicy, Cell, DebugOutput, EngineConfig, HostError, Machine, Sink, codegen, concat,
    evaluate, lint,
};

#[derive(Parser)]
#[command(name = "bfpp", about = "Interpreter for an extended Brainfuck dialect with native calls")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run a program.
    Run(RunArgs),

    /// Report unknown instructions and unmatched brackets without running.
    Check { file: PathBuf },

    /// Print code that produces a literal.
    #[command(subcommand)]
    Literal(Literal),

    /// Compile a stack-language (.bfc) source file.
    Compile {
        file: PathBuf,

        /// Output path (stdout if omitted).
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Emit a `;; word` comment line before each word's code.
        #[arg(long)]
        debug_symbols: bool,
    },

    /// Run every program in a directory against its `.out` expectation.
    Suite {
        dir: PathBuf,

        /// Write missing expectations from this run's output.
        #[arg(long)]
        bless: bool,

        /// Max instructions per program.
        #[arg(long, default_value_t = 1 << 26)]
        step_limit: u64,
    },
}

#[derive(Subcommand)]
enum Literal {
    /// Set the current cell to a number.
    Num { value: u8 },
    /// Print a string.
    Str { text: String },
}

#[derive(Args)]
struct RunArgs {
    /// Program file.
    file: PathBuf,

    /// Cell type.
    #[arg(long, value_enum, default_value_t = Cells::Unsigned)]
    cells: Cells,

    /// Behavior at the tape edges.
    #[arg(long, value_enum, default_value_t = Bounds::Wrap)]
    bounds: Bounds,

    /// Where `?` dumps go.
    #[arg(long, value_enum, default_value_t = Dump::Sink)]
    dump: Dump,

    /// Where program output goes.
    #[arg(long, value_enum, default_value_t = Output::Stdout)]
    output: Output,

    /// Native library bound before the first evaluation.
    #[arg(long, value_enum, default_value_t = Natives::Window)]
    natives: Natives,

    /// Number of times to evaluate the program against the same machine.
    #[arg(long, default_value_t = 1)]
    frames: u64,

    /// Max instructions per evaluation.
    #[arg(long)]
    step_limit: Option<u64>,

    /// Seed for the canvas `random_byte` native.
    #[arg(long, default_value_t = 0)]
    seed: u64,

    /// Write the canvas as a PPM image after the last frame.
    #[arg(long)]
    canvas_out: Option<PathBuf>,

    /// Pixels per canvas cell in the PPM image.
    #[arg(long, default_value_t = 8)]
    canvas_scale: usize,
}

#[derive(Clone, Copy, ValueEnum)]
enum Cells {
    Unsigned,
    Signed,
}

#[derive(Clone, Copy, ValueEnum)]
enum Bounds {
    Wrap,
    Strict,
}

#[derive(Clone, Copy, ValueEnum)]
enum Dump {
    Sink,
    Trace,
    Silent,
}

#[derive(Clone, Copy, ValueEnum)]
enum Output {
    Stdout,
    Log,
}

#[derive(Clone, Copy, ValueEnum)]
enum Natives {
    None,
    Window,
    Canvas,
}

/// Use `RUST_LOG` to override the default `bfpp=info` filter.
fn init_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("bfpp=info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(io::stderr)
        .init();
}

fn main() {
    init_logging();
    let cli = Cli::parse();

    let status = match cli.command {
        Command::Run(args) => match args.cells {
            Cells::Unsigned => run::<u8>(&args),
            Cells::Signed => run::<i8>(&args),
        },
        Command::Check { file } => check(&file),
        Command::Literal(Literal::Num { value }) => {
            println!("{}", codegen::number(value));
            STATUS_OK
        }
        Command::Literal(Literal::Str { text }) => {
            print!("{}", codegen::string(text.as_bytes()));
            STATUS_OK
        }
        Command::Compile {
            file,
            output,
            debug_symbols,
        } => report(compile(&file, output.as_deref(), debug_symbols)),
        Command::Suite {
            dir,
            bless,
            step_limit,
        } => run_suite(
            &dir,
            SuiteConfig {
                bless,
                step_limit: Some(step_limit),
            },
        ),
    };

    std::process::exit(status);
}

fn report(result: Result<(), HostError>) -> i32 {
    match result {
        Ok(()) => STATUS_OK,
        Err(e) => {
            error!("{e}");
            e.status()
        }
    }
}

fn read_program(path: &Path) -> Result<Vec<u8>, HostError> {
    fs::read(path).map_err(|source| HostError::Read {
        path: path.to_owned(),
        source,
    })
}

fn run<C: Cell>(args: &RunArgs) -> i32 {
    let program = match read_program(&args.file) {
        Ok(program) => program,
        Err(e) => return report(Err(e)),
    };

    let config = EngineConfig {
        bounds: match args.bounds {
            Bounds::Wrap => BoundsPolicy::Wrap,
            Bounds::Strict => BoundsPolicy::Strict,
        },
        debug: match args.dump {
            Dump::Sink => DebugOutput::Sink,
            Dump::Trace => DebugOutput::Trace,
            Dump::Silent => DebugOutput::Silent,
        },
        step_limit: args.step_limit,
    };
    let mut machine = Machine::<C, TAPE_LENGTH>::with_config(config);

    let window = Rc::new(RefCell::new(Window::default()));
    let canvas = Rc::new(RefCell::new(Canvas::new(CanvasConfig {
        seed: args.seed,
        ..Default::default()
    })));
    match args.natives {
        Natives::None => {}
        Natives::Window => window::install(&mut machine, &window),
        Natives::Canvas => canvas::install(&mut machine, &canvas),
    }

    let result = match args.output {
        Output::Stdout => {
            let mut sink = LineSink::stdout();
            let result = run_frames(&mut machine, &program, args.frames, &mut sink);
            match sink.finish() {
                Ok(_) => result,
                Err(e) => result.and(Err(HostError::Output(e))),
            }
        }
        Output::Log => {
            let mut sink = TracingSink::new(Level::INFO);
            run_frames(&mut machine, &program, args.frames, &mut sink)
        }
    };

    if let (Natives::Canvas, Some(path)) = (args.natives, &args.canvas_out) {
        let written = fs::File::create(path)
            .and_then(|file| canvas.borrow().write_ppm(io::BufWriter::new(file), args.canvas_scale))
            .map_err(|source| HostError::Write {
                path: path.clone(),
                source,
            });
        if let Err(e) = written {
            error!("{e}");
            if result.is_ok() {
                return e.status();
            }
        }
    }

    report(result)
}

/// Evaluate `program` `frames` times against one machine.
///
/// Pointers reset on every frame; the tape and the natives carry over.
fn run_frames<C: Cell, S: Sink>(
    machine: &mut Machine<C, TAPE_LENGTH>,
    program: &[u8],
    frames: u64,
    sink: &mut S,
) -> Result<(), HostError> {
    for frame in 0..frames {
        evaluate(machine, program, sink)?;
        if frames > 1 && (frame + 1) % 100 == 0 {
            info!(frame = frame + 1, frames, "frames done");
        }
    }
    Ok(())
}

fn check(path: &Path) -> i32 {
    let program = match read_program(path) {
        Ok(program) => program,
        Err(e) => return report(Err(e)),
    };

    let diagnostics = lint::check(&program);
    for d in &diagnostics {
        println!("{}:{d}", path.display());
    }

    // Mirror the status the engine would report for the first problem.
    let first_error = diagnostics.iter().find(|d| d.severity() == Severity::Error);
    match first_error.map(|d| d.finding) {
        None => STATUS_OK,
        Some(Finding::UnknownInstruction(_)) => -1,
        Some(Finding::UnmatchedBracket(b'[')) => -2,
        Some(_) => -3,
    }
}

fn compile(path: &Path, output: Option<&Path>, debug_symbols: bool) -> Result<(), HostError> {
    let source = fs::read_to_string(path).map_err(|source| HostError::Read {
        path: path.to_owned(),
        source,
    })?;
    let program = concat::compile(&source, debug_symbols).map_err(|source| HostError::Compile {
        path: path.to_owned(),
        source,
    })?;

    match output {
        Some(out) => fs::write(out, program).map_err(|source| HostError::Write {
            path: out.to_owned(),
            source,
        }),
        None => {
            println!("{program}");
            Ok(())
        }
    }
}

fn run_suite(dir: &Path, config: SuiteConfig) -> i32 {
    let reports = match suite::run_suite(dir, &config) {
        Ok(reports) => reports,
        Err(e) => return report(Err(e)),
    };

    for r in &reports {
        let label = match &r.outcome {
            Outcome::Passed => "PASS",
            Outcome::Blessed => "BLESS",
            Outcome::Missing => "MISSING",
            Outcome::Failed { .. } => "FAIL",
            Outcome::Errored(_) => "ERROR",
        };
        println!("{label:8}{}", r.path.display());
        match &r.outcome {
            Outcome::Failed { expected, actual } => {
                println!("  expected: {expected:?}");
                println!("  actual:   {actual:?}");
            }
            Outcome::Errored(message) => println!("  status {}: {}", r.status, message.trim_end()),
            _ => {}
        }
    }

    let passed = reports.iter().filter(|r| r.is_success()).count();
    println!("{passed}/{} passed", reports.len());
    if passed == reports.len() {
        STATUS_OK
    } else {
        STATUS_HOST_FAILURE
    }
}
