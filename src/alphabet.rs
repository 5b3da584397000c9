//! The fixed working alphabet.
//!
//! Letters are stored as class indices `0..26` in the corpus and the model, and mapped back to
//! characters only for display and for the per-letter image directories.

/// Number of letter classes.
pub const CLASS_COUNT: usize = 26;

/// The 26 letter classes, in class-index order.
pub const ALPHABET: [char; CLASS_COUNT] = [
    'A', 'B', 'C', 'D', 'E', 'F', 'G', 'H', 'I', 'J', 'K', 'L', 'M', 'N', 'O', 'P', 'Q', 'R',
    'S', 'T', 'U', 'V', 'W', 'X', 'Y', 'Z',
];

/// Returns the letter for a class index, or `None` if the index is out of range.
pub fn letter_for(class_index: usize) -> Option<char> {
    ALPHABET.get(class_index).copied()
}

/// Returns the class index of a letter (`'A'` -> 0, `'B'` -> 1, ...).
pub fn class_index(letter: char) -> Option<usize> {
    ALPHABET.iter().position(|&c| c == letter)
}

/// Parses a per-letter directory name such as `"A"` into its class index.
///
/// Only single uppercase letters of the alphabet are accepted.
pub fn class_index_for_dir_name(name: &str) -> Option<usize> {
    let mut chars = name.chars();
    match (chars.next(), chars.next()) {
        (Some(letter), None) => class_index(letter),
        _ => None,
    }
}
