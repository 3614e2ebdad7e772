//! Compiler for a small stack-based concatenative language.
//!
//! A source file is a sequence of whitespace-separated words; lines whose
//! first non-blank character is `;` are comments. The stack lives on the tape
//! starting at cell 0, one cell per element, and the data pointer always rests
//! on the first free cell above the top of the stack. Some words use up to
//! three free cells above the stack as scratch space.
//!
//! | word | effect |
//! |---|---|
//! | `0`..`255` | push the number |
//! | `pop` | `a --` |
//! | `dup` | `a -- a a` |
//! | `over` | `a b -- a b a` |
//! | `swap` | `a b -- b a` |
//! | `add`, `sub` | `a b -- a+b`, `a b -- a-b` (wrapping) |
//! | `eq`, `neq` | `a b -- flag` |
//! | `gt`, `lt` | `a b -- flag`, for nonzero `b` |
//! | `or` | `a b -- n`, nonzero when either is |
//! | `and` | `a b -- flag` |
//! | `print` | `a --`, outputs `a` with `.` |
//! | `dbgprint` | `a --`, dumps `a` with `?` |
//!
//! Control flow:
//!
//! - `while <cond> do <body> end` runs `<cond>`, pops its flag and runs
//!   `<body>` while the flag is nonzero.
//! - `if <cond> do <then> else <else> end` pops the flag and runs one branch.
//!   `else` is optional.
//! - `def NAME <words> end` defines a macro, expanded wherever `NAME` is used
//!   afterwards.
//!
//! A condition must push exactly one value, and a body must leave the stack
//! as deep as it found it.

use std::collections::HashMap;

use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConcatError {
    #[error("line {line}: unknown word `{word}`")]
    UnknownWord { word: String, line: usize },

    #[error("line {line}: `{word}` is not supported")]
    Unsupported { word: String, line: usize },

    #[error("line {line}: literal `{word}` does not fit in a cell")]
    LiteralOutOfRange { word: String, line: usize },

    #[error("line {line}: not enough elements for `{word}` (needs {needed}, stack has {depth})")]
    StackUnderflow {
        word: String,
        line: usize,
        needed: usize,
        depth: usize,
    },

    #[error("line {line}: `{word}` is not allowed here")]
    UnexpectedWord { word: String, line: usize },

    #[error("line {line}: `{word}` is missing its `{expected}`")]
    MissingTerminator {
        word: String,
        line: usize,
        expected: &'static str,
    },

    #[error("line {line}: `{name}` cannot be used as a macro name")]
    InvalidMacroName { name: String, line: usize },

    #[error("line {line}: `{word}` condition must push one value (depth {before} -> {after})")]
    BadCondition {
        word: &'static str,
        line: usize,
        before: usize,
        after: usize,
    },

    #[error("line {line}: `{word}` block starts with depth {start} but ends with depth {end}")]
    UnbalancedBlock {
        word: &'static str,
        line: usize,
        start: usize,
        end: usize,
    },
}

#[derive(Clone, Copy, Debug)]
struct Word {
    code: &'static str,
    /// Elements the word needs on the stack.
    needs: usize,
    /// Change in stack depth.
    effect: isize,
}

fn lookup(word: &str) -> Option<Word> {
    let (code, needs, effect) = match word {
        "pop" => ("[-]<", 1, -1),
        "dup" => (
            concat!(
                "[-]>[-]<<",  // clear two free cells, move to a
                "[->+>+<<]",  // copy a into the two cells above it
                ">>[-<<+>>]", // move the second copy back into a
            ),
            1,
            1,
        ),
        "over" => (
            concat!("[-]>[-]<<<", "[->>+>+<<<]", ">>>[-<<<+>>>]"),
            2,
            1,
        ),
        "swap" => (concat!("[-]<[->+<]", "<[->+<]", ">>[-<<+>>]"), 2, 0),
        "add" => ("<[-<+>]", 2, -1),
        "sub" => ("<[-<->]", 2, -1),
        "print" => ("<.", 1, -1),
        "dbgprint" => ("<?", 1, -1),
        "neq" => (
            concat!(
                "[-]<",
                "[-<->]<",     // a - b, b destroyed
                "[[-]>+<][-]", // nonzero difference sets the b cell to 1
                ">[-<+>]",
            ),
            2,
            -1,
        ),
        "eq" => (
            concat!(
                "[-]<",
                "[-<->]<",
                "[[-]>+<]+", // b cell = (a != b), a cell = 1
                ">[-<->]",   // 1 - (a != b)
            ),
            2,
            -1,
        ),
        "gt" => (
            concat!(
                "[-]>[-]>[-]+<<<", // clear three scratch cells, set a sentinel
                "[->+<]<[->+<]>",  // shift a and b up one cell
                "[->-[>]<<]",      // count both down together
                ">>>[-<]<<",
                "[-<+>]",
                "<[[-]>+<][-]>[-<+>]", // normalize to 0 or 1
            ),
            2,
            -1,
        ),
        "lt" => (
            concat!(
                "[-]>[-]>[-]+<<<",
                "[->+<]<[->+<]>",
                "[->-[>]<<]",
                ">>>[-<]<",
                "[-<<+>>]<[-]",
                "<[[-]>+<][-]>[-<+>]",
            ),
            2,
            -1,
        ),
        "or" => (
            concat!(
                "[-]<<[->>+<<]>>", // move a to the free cell
                "[[-]<<+>>]<",     // a != 0 increments the result
                "[[-]<+>]",        // b != 0 increments the result
            ),
            2,
            -1,
        ),
        "and" => (
            concat!(
                "[-]<<",
                "[[-]>[[-]>+<]<]", // free cell = a && b, both operands cleared
                ">>[-<<+>>]<",
            ),
            2,
            -1,
        ),
        _ => return None,
    };
    Some(Word {
        code,
        needs,
        effect,
    })
}

/// Block keywords. None of them may appear inside a condition.
const KEYWORDS: &[&str] = &["while", "if", "else", "do", "end", "def"];

/// Words reserved by the language that have no code generation.
const UNSUPPORTED: &[&str] = &["array", "array_get", "array_set"];

fn is_reserved(word: &str) -> bool {
    KEYWORDS.contains(&word) || UNSUPPORTED.contains(&word) || lookup(word).is_some()
}

fn is_name(word: &str) -> bool {
    let mut chars = word.chars();
    chars.next().is_some_and(|c| c.is_ascii_alphabetic())
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

#[derive(Clone, Debug)]
enum Inst {
    Push {
        value: u8,
    },
    Word {
        name: String,
        word: Word,
        line: usize,
    },
    While {
        cond: Vec<Inst>,
        body: Vec<Inst>,
        line: usize,
    },
    If {
        cond: Vec<Inst>,
        then: Vec<Inst>,
        otherwise: Vec<Inst>,
        line: usize,
    },
}

#[derive(Clone, Copy)]
struct Token<'a> {
    text: &'a str,
    line: usize,
}

struct Parser<'a> {
    tokens: Vec<Token<'a>>,
    pos: usize,
    macros: HashMap<&'a str, Vec<Inst>>,
}

impl<'a> Parser<'a> {
    fn new(source: &'a str) -> Self {
        let tokens = source
            .lines()
            .enumerate()
            .filter(|(_, line)| !line.trim_start().starts_with(';'))
            .flat_map(|(index, line)| {
                line.split_whitespace().map(move |text| Token {
                    text,
                    line: index + 1,
                })
            })
            .collect();
        Self {
            tokens,
            pos: 0,
            macros: HashMap::new(),
        }
    }

    fn next(&mut self) -> Option<Token<'a>> {
        let token = self.tokens.get(self.pos).copied();
        self.pos += 1;
        token
    }

    /// Parse words until one of `stop` is reached, returning them and the
    /// stop word. Running out of words is only allowed at the top level.
    fn block(
        &mut self,
        opener: Option<Token<'a>>,
        stop: &[&'static str],
        condition: bool,
    ) -> Result<(Vec<Inst>, &'a str), ConcatError> {
        let mut insts = Vec::new();
        while let Some(token) = self.next() {
            if stop.contains(&token.text) {
                return Ok((insts, token.text));
            }
            if condition && KEYWORDS.contains(&token.text) {
                return Err(ConcatError::UnexpectedWord {
                    word: token.text.to_owned(),
                    line: token.line,
                });
            }
            self.word(token, &mut insts)?;
        }
        match opener {
            None => Ok((insts, "")),
            Some(opener) => Err(ConcatError::MissingTerminator {
                word: opener.text.to_owned(),
                line: opener.line,
                expected: stop[0],
            }),
        }
    }

    fn word(&mut self, token: Token<'a>, out: &mut Vec<Inst>) -> Result<(), ConcatError> {
        let Token { text, line } = token;

        if text.bytes().all(|b| b.is_ascii_digit()) {
            let value = text.parse().map_err(|_| ConcatError::LiteralOutOfRange {
                word: text.to_owned(),
                line,
            })?;
            out.push(Inst::Push { value });
            return Ok(());
        }

        match text {
            "while" => {
                let (cond, _) = self.block(Some(token), &["do"], true)?;
                let (body, _) = self.block(Some(token), &["end"], false)?;
                out.push(Inst::While { cond, body, line });
            }
            "if" => {
                let (cond, _) = self.block(Some(token), &["do"], true)?;
                let (then, stop) = self.block(Some(token), &["end", "else"], false)?;
                let otherwise = if stop == "else" {
                    self.block(Some(token), &["end"], false)?.0
                } else {
                    Vec::new()
                };
                out.push(Inst::If {
                    cond,
                    then,
                    otherwise,
                    line,
                });
            }
            "def" => {
                let name = self.next().ok_or(ConcatError::MissingTerminator {
                    word: text.to_owned(),
                    line,
                    expected: "end",
                })?;
                if !is_name(name.text) || is_reserved(name.text) {
                    return Err(ConcatError::InvalidMacroName {
                        name: name.text.to_owned(),
                        line: name.line,
                    });
                }
                let (body, _) = self.block(Some(token), &["end"], false)?;
                self.macros.insert(name.text, body);
            }
            "do" | "else" | "end" => {
                return Err(ConcatError::UnexpectedWord {
                    word: text.to_owned(),
                    line,
                });
            }
            _ => {
                if let Some(word) = lookup(text) {
                    out.push(Inst::Word {
                        name: text.to_owned(),
                        word,
                        line,
                    });
                } else if let Some(body) = self.macros.get(text) {
                    out.extend(body.iter().cloned());
                } else if UNSUPPORTED.contains(&text) {
                    return Err(ConcatError::Unsupported {
                        word: text.to_owned(),
                        line,
                    });
                } else {
                    return Err(ConcatError::UnknownWord {
                        word: text.to_owned(),
                        line,
                    });
                }
            }
        }
        Ok(())
    }
}

struct Codegen {
    fragments: Vec<String>,
    depth: usize,
    debug_symbols: bool,
}

impl Codegen {
    fn symbol(&mut self, text: &str) {
        if self.debug_symbols {
            self.fragments.push(format!(";; {text}"));
        }
    }

    fn emit(&mut self, insts: &[Inst]) -> Result<(), ConcatError> {
        insts.iter().try_for_each(|inst| self.emit_one(inst))
    }

    fn emit_one(&mut self, inst: &Inst) -> Result<(), ConcatError> {
        match inst {
            Inst::Push { value } => {
                self.symbol(&value.to_string());
                let value = usize::from(*value);
                self.fragments.push(format!("[-]{}> ", "+".repeat(value)));
                self.depth += 1;
            }
            Inst::Word { name, word, line } => {
                self.symbol(name);
                if self.depth < word.needs {
                    return Err(ConcatError::StackUnderflow {
                        word: name.clone(),
                        line: *line,
                        needed: word.needs,
                        depth: self.depth,
                    });
                }
                self.depth = self.depth.saturating_add_signed(word.effect);
                self.fragments.push(word.code.to_owned());
            }
            Inst::While { cond, body, line } => {
                let start = self.depth;
                self.symbol("while");
                self.condition("while", cond, *line)?;
                self.symbol("do");
                self.fragments.push("<[".to_owned());
                self.emit(body)?;
                self.balanced("while", *line, start)?;
                self.symbol("end");
                self.condition("while", cond, *line)?;
                self.fragments.push("<]".to_owned());
            }
            Inst::If {
                cond,
                then,
                otherwise,
                line,
            } => {
                // The flag's cell runs the then-branch; the cell above it is
                // set to 1 and cleared when the then-branch runs.
                let start = self.depth;
                self.symbol("if");
                self.condition("if", cond, *line)?;
                self.symbol("do");
                self.fragments.push("[-]+<[[-]".to_owned());
                self.emit(then)?;
                self.balanced("if", *line, start)?;
                self.fragments.push(">[-]<[-]]".to_owned());
                if otherwise.is_empty() {
                    self.fragments.push(">[-]<".to_owned());
                } else {
                    self.symbol("else");
                    self.fragments.push(">[[-]<".to_owned());
                    self.emit(otherwise)?;
                    self.balanced("else", *line, start)?;
                    self.fragments.push(">[-]]<".to_owned());
                }
                self.symbol("end");
            }
        }
        Ok(())
    }

    /// Emit `cond` and pop its flag, leaving the data pointer on it.
    fn condition(
        &mut self,
        word: &'static str,
        cond: &[Inst],
        line: usize,
    ) -> Result<(), ConcatError> {
        let before = self.depth;
        self.emit(cond)?;
        if self.depth != before + 1 {
            return Err(ConcatError::BadCondition {
                word,
                line,
                before,
                after: self.depth,
            });
        }
        self.depth = before;
        Ok(())
    }

    fn balanced(&self, word: &'static str, line: usize, start: usize) -> Result<(), ConcatError> {
        if self.depth == start {
            Ok(())
        } else {
            Err(ConcatError::UnbalancedBlock {
                word,
                line,
                start,
                end: self.depth,
            })
        }
    }
}

/// Compile `source` into a program for the interpreter.
///
/// With `debug_symbols`, each word's code is emitted on its own line after a
/// `;; word` comment.
pub fn compile(source: &str, debug_symbols: bool) -> Result<String, ConcatError> {
    let mut parser = Parser::new(source);
    let (program, _) = parser.block(None, &[], false)?;

    let mut codegen = Codegen {
        fragments: Vec::new(),
        depth: 0,
        debug_symbols,
    };
    codegen.emit(&program)?;

    let separator = if debug_symbols { "\n" } else { "" };
    Ok(codegen.fragments.join(separator))
}
