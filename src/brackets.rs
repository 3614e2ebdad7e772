use crate::engine::{LBRACKET, RBRACKET};

const UNMATCHED: usize = usize::MAX;

/// Precomputed bracket partners for a whole program.
///
/// Brackets are paired on raw bytes, the same way the engine scans for them,
/// so a bracket inside a `;` comment still takes part in matching.
#[derive(Clone, Debug)]
pub struct BracketTable {
    table: Vec<usize>,
}

impl BracketTable {
    pub fn build(program: &[u8]) -> Self {
        Self {
            table: build_bracket_table(program),
        }
    }

    /// The index of the bracket paired with the one at `index`, if any.
    pub fn partner(&self, index: usize) -> Option<usize> {
        match self.table.get(index) {
            Some(&UNMATCHED) | None => None,
            Some(&target) => Some(target),
        }
    }

    /// Positions of brackets in `program` that have no partner.
    ///
    /// `program` must be the buffer the table was built from.
    pub fn unmatched<'a>(&'a self, program: &'a [u8]) -> impl Iterator<Item = usize> + 'a {
        program
            .iter()
            .enumerate()
            .filter(|&(i, &b)| (b == LBRACKET || b == RBRACKET) && self.table[i] == UNMATCHED)
            .map(|(i, _)| i)
    }

    pub fn is_balanced(&self, program: &[u8]) -> bool {
        self.unmatched(program).next().is_none()
    }
}

/// Build a bracket-match lookup table for the program.
///
/// Returns a Vec where `result[i]` is the index of the matching bracket
/// for position `i`, or `UNMATCHED` if the bracket at `i` is unmatched
/// (or if position `i` is not a bracket).
fn build_bracket_table(program: &[u8]) -> Vec<usize> {
    let mut table = vec![UNMATCHED; program.len()];
    let mut stack = Vec::new();

    for (i, &byte) in program.iter().enumerate() {
        match byte {
            LBRACKET => stack.push(i),
            RBRACKET => {
                if let Some(open) = stack.pop() {
                    table[open] = i;
                    table[i] = open;
                }
            }
            _ => {}
        }
    }

    table
}


#[cfg(test)]
mod proptests {
    use super::*;
    use crate::engine::{match_backward, match_forward};
    use proptest::prelude::*;

    proptest! {
        #[test]
        fn table_agrees_with_scanning_matcher(
            program in prop::collection::vec(prop::sample::select(b"[]+ ".to_vec()), 0..64)
        ) {
            let table = BracketTable::build(&program);
            for (i, &b) in program.iter().enumerate() {
                match b {
                    LBRACKET => prop_assert_eq!(table.partner(i), match_forward(&program, i).ok()),
                    RBRACKET => prop_assert_eq!(table.partner(i), match_backward(&program, i).ok()),
                    _ => prop_assert_eq!(table.partner(i), None),
                }
            }
        }
    }
}
