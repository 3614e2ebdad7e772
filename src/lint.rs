use std::fmt;

use crate::brackets::BracketTable;
use crate::engine::{LBRACKET, RBRACKET, SEMICOLON, is_instruction};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Severity {
    Error,
    Warning,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Finding {
    /// A byte the engine would reject.
    UnknownInstruction(u8),
    /// A bracket with no partner.
    UnmatchedBracket(u8),
    /// A bracket inside a comment. The engine still counts it when matching.
    BracketInComment(u8),
}

/// A finding at a position in the program.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Diagnostic {
    pub offset: usize,
    /// 1-based.
    pub line: usize,
    /// 1-based, in bytes.
    pub column: usize,
    pub finding: Finding,
}

impl Diagnostic {
    pub fn severity(&self) -> Severity {
        match self.finding {
            Finding::BracketInComment(_) => Severity::Warning,
            _ => Severity::Error,
        }
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kind = match self.severity() {
            Severity::Error => "error",
            Severity::Warning => "warning",
        };
        write!(f, "{}:{}: {kind}: ", self.line, self.column)?;
        match self.finding {
            Finding::UnknownInstruction(b) => {
                write!(f, "unknown instruction {:?}", char::from(b))
            }
            Finding::UnmatchedBracket(b) => write!(f, "unmatched {:?}", char::from(b)),
            Finding::BracketInComment(b) => {
                write!(f, "{:?} inside a comment still takes part in loop matching", char::from(b))
            }
        }
    }
}

/// Statically check a program without running it.
///
/// Only the first unknown instruction matters at runtime, but every one is
/// reported here. Diagnostics come back ordered by offset.
pub fn check(program: &[u8]) -> Vec<Diagnostic> {
    let table = BracketTable::build(program);
    let mut diagnostics = Vec::new();
    let mut line = 1;
    let mut line_start = 0;
    let mut in_comment = false;

    for (offset, &byte) in program.iter().enumerate() {
        let finding = if in_comment {
            match byte {
                b'\n' => {
                    in_comment = false;
                    None
                }
                LBRACKET | RBRACKET => Some(Finding::BracketInComment(byte)),
                _ => None,
            }
        } else {
            match byte {
                SEMICOLON => {
                    in_comment = true;
                    None
                }
                _ if !is_instruction(byte) => Some(Finding::UnknownInstruction(byte)),
                _ => None,
            }
        };

        let position = |finding| Diagnostic {
            offset,
            line,
            column: offset - line_start + 1,
            finding,
        };
        if let Some(finding) = finding {
            diagnostics.push(position(finding));
        }
        if (byte == LBRACKET || byte == RBRACKET) && table.partner(offset).is_none() {
            diagnostics.push(position(Finding::UnmatchedBracket(byte)));
        }

        if byte == b'\n' {
            line += 1;
            line_start = offset + 1;
        }
    }

    diagnostics
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clean_program() {
        assert!(check(b"+[>+<-] ; copy\n.").is_empty());
    }

    #[test]
    fn test_unknown_instruction_position() {
        let diagnostics = check(b"++\n +x");
        assert_eq!(
            diagnostics,
            vec![Diagnostic {
                offset: 5,
                line: 2,
                column: 3,
                finding: Finding::UnknownInstruction(b'x'),
            }]
        );
        assert_eq!(diagnostics[0].to_string(), "2:3: error: unknown instruction 'x'");
    }

    #[test]
    fn test_unmatched_brackets() {
        // The first '[' pairs with the first ']' on line 2.
        let diagnostics = check(b"[[]\n]]");
        assert_eq!(diagnostics.len(), 1);
        assert_eq!(diagnostics[0].finding, Finding::UnmatchedBracket(b']'));
        assert_eq!((diagnostics[0].line, diagnostics[0].column), (2, 2));
    }

    #[test]
    fn test_bracket_in_comment_warns() {
        let diagnostics = check(b"; [\n");
        assert_eq!(diagnostics.len(), 2);
        assert_eq!(diagnostics[0].severity(), Severity::Warning);
        assert_eq!(diagnostics[1].finding, Finding::UnmatchedBracket(b'['));
        assert_eq!(diagnostics[1].severity(), Severity::Error);
    }

    #[test]
    fn test_comment_hides_unknown_bytes() {
        assert!(check(b"+ ; anything goes here\n-").is_empty());
    }
}
