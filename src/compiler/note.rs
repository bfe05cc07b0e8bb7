//! Note names, transposition and NES period values

/// Canonical spelling for each semitone of the octave
pub const NOTE_NAMES: [&str; 12] = [
    "c", "c+", "d", "d+", "e", "f", "f+", "g", "g+", "a", "a+", "b",
];

/// 2A03 timer periods for octave 2, c through b
pub const BASE_PERIODS: [u32; 12] = [
    0x06AE, 0x064E, 0x05F4, 0x059E, 0x054E, 0x0501, 0x04B9, 0x0476, 0x0436, 0x03F9, 0x03C0,
    0x038A,
];

/// Octave the period table is written for
const BASE_OCTAVE: i32 = 2;

/// Semitone offset of a lowercase note name with optional accidental
///
/// `c-` and `b+` fall outside the octave and return -1 and 12.
pub fn semitone(note: &str) -> Option<i32> {
    let mut chars = note.chars();
    let base = match chars.next()? {
        'c' => 0,
        'd' => 2,
        'e' => 4,
        'f' => 5,
        'g' => 7,
        'a' => 9,
        'b' => 11,
        _ => return None,
    };
    let offset = match chars.as_str() {
        "" => 0,
        "+" => 1,
        "-" => -1,
        _ => return None,
    };
    Some(base + offset)
}

/// Octave shift command moving by `ticks` octaves (`>` up, `<` down)
pub fn octave_shift(ticks: i32) -> String {
    let symbol = if ticks < 0 { "<" } else { ">" };
    symbol.repeat(ticks.unsigned_abs() as usize)
}

/// Shift command taking the channel from `last` to `new`
pub fn move_to_octave(new: i32, last: i32) -> String {
    octave_shift(new - last)
}

/// Timer period of a note at an octave
pub fn period(note: &str, octave: i32) -> Option<u32> {
    let n = semitone(note)?;
    let octave = octave + n.div_euclid(12);
    let value = BASE_PERIODS[n.rem_euclid(12) as usize];
    let shift = octave - BASE_OCTAVE;
    Some(if shift >= 0 {
        value >> shift.min(31)
    } else {
        value << (-shift).min(16)
    })
}

/// Transpose a note by `amount` semitones
///
/// Returns the words to emit: octave shifts before the note when it wraps, the
/// note with `suffix`, then the shift restoring the original octave.
pub fn transpose(note: &str, amount: i32, suffix: &str) -> Option<Vec<String>> {
    let mut number = semitone(note)?.checked_add(amount)?;
    let mut words = Vec::new();
    let mut ticks = 0;

    while number < 0 {
        words.push("<".to_string());
        ticks += 1;
        number += 12;
    }

    while number > 11 {
        words.push(">".to_string());
        ticks -= 1;
        number -= 12;
    }

    words.push(format!("{}{}", NOTE_NAMES[number as usize], suffix));

    let restore = octave_shift(ticks);
    if !restore.is_empty() {
        words.push(restore);
    }

    Some(words)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn net_ticks(words: &[String]) -> i32 {
        words
            .iter()
            .flat_map(|w| w.chars())
            .map(|c| match c {
                '>' => 1,
                '<' => -1,
                _ => 0,
            })
            .sum()
    }

    #[test]
    fn test_enharmonics() {
        assert_eq!(semitone("d+"), semitone("e-"));
        assert_eq!(semitone("e"), semitone("f-"));
        assert_eq!(semitone("e+"), semitone("f"));
        assert_eq!(semitone("c-"), Some(-1));
        assert_eq!(semitone("b+"), Some(12));
        assert_eq!(semitone("h"), None);
        assert_eq!(semitone("c++"), None);
    }

    #[test]
    fn test_transpose_within_octave() {
        assert_eq!(transpose("c", 2, "8").unwrap(), vec!["d8"]);
        assert_eq!(transpose("e-", 0, "").unwrap(), vec!["d+"]);
    }

    #[test]
    fn test_transpose_wraps_up() {
        assert_eq!(transpose("b", 1, "4").unwrap(), vec![">", "c4", "<"]);
        assert_eq!(transpose("c", 25, "").unwrap(), vec![">", ">", "c+", "<<"]);
    }

    #[test]
    fn test_transpose_wraps_down() {
        assert_eq!(transpose("c", -1, "").unwrap(), vec!["<", "b", ">"]);
    }

    #[test]
    fn test_transpose_overflow() {
        assert_eq!(transpose("b", i32::MAX, ""), None);
    }

    #[test]
    fn test_transpose_round_trip() {
        for (i, name) in NOTE_NAMES.iter().enumerate() {
            for amount in [-14, -5, 3, 12, 17] {
                let up = transpose(name, amount, "").unwrap();
                let moved = up.iter().find(|w| semitone(w).is_some()).unwrap();
                let back = transpose(moved, -amount, "").unwrap();
                let restored = back.iter().find(|w| semitone(w).is_some()).unwrap();
                assert_eq!(restored, NOTE_NAMES[i]);
                assert_eq!(net_ticks(&up) + net_ticks(&back), 0);
            }
        }
    }

    #[test]
    fn test_octave_shift() {
        assert_eq!(octave_shift(0), "");
        assert_eq!(octave_shift(2), ">>");
        assert_eq!(octave_shift(-3), "<<<");
        assert_eq!(move_to_octave(3, 5), "<<");
    }

    #[test]
    fn test_period() {
        assert_eq!(period("c", 2), Some(0x06AE));
        assert_eq!(period("c", 4), Some(0x06AE >> 2));
        assert_eq!(period("a", 3), Some(0x03F9 >> 1));
        assert_eq!(period("b+", 3), period("c", 4));
        assert_eq!(period("c", 1), Some(0x06AE << 1));
    }
}
