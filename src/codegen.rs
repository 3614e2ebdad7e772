//! Generators for common code fragments.

const MULTIPLIER: usize = 16;

/// Code that sets the current cell to `n`.
///
/// Uses the cell to the right as a loop counter: `16 * k` is built with a
/// loop, then adjusted by single steps. Both cells must start at zero unless
/// `n` is 0, which just clears the current cell. The pointer ends where it
/// started and the scratch cell is left at zero.
pub fn number(n: u8) -> String {
    if n == 0 {
        return "[-]".to_owned();
    }
    let n = n as usize;

    // Pick the multiple of 16 closest to n.
    let mut repeat = 1;
    let mut best = usize::MAX;
    for k in 0..MULTIPLIER {
        let diff = (MULTIPLIER * k).abs_diff(n);
        if diff > best {
            break;
        }
        if diff < best {
            best = diff;
            repeat = k;
        }
    }

    let mut code = format!(
        ">{}[<{}>-]<",
        "+".repeat(MULTIPLIER),
        "+".repeat(repeat)
    );
    let base = MULTIPLIER * repeat;
    if n >= base {
        code.push_str(&"+".repeat(n - base));
    } else {
        code.push_str(&"-".repeat(base - n));
    }
    code
}

/// Code that prints every byte of `text`, one line per byte.
///
/// Each line clears the current cell, builds the byte with [`number`] and
/// outputs it, followed by a comment naming the byte.
pub fn string(text: &[u8]) -> String {
    let mut code = String::new();
    for &byte in text {
        // Brackets in comments still count for loop matching.
        let shown = if (byte.is_ascii_graphic() || byte == b' ') && byte != b'[' && byte != b']' {
            char::from(byte).to_string()
        } else {
            format!("\\x{byte:02x}")
        };
        code.push_str(&format!("[-]{}. ;; {shown} = {byte}\n", number(byte)));
    }
    code
}
