use std::collections::HashMap;
use std::fmt;
use std::sync::OnceLock;

/// One keyed element of a character: a short or a long tone
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Symbol {
    Dot,
    Dash,
}

impl Symbol {
    pub fn as_char(self) -> char {
        match self {
            Symbol::Dot => '.',
            Symbol::Dash => '-',
        }
    }

    pub fn from_char(c: char) -> Option<Self> {
        match c {
            '.' => Some(Symbol::Dot),
            '-' => Some(Symbol::Dash),
            _ => None,
        }
    }

    /// Length of the tone in dot units
    pub fn units(self) -> u32 {
        match self {
            Symbol::Dot => 1,
            Symbol::Dash => 3,
        }
    }
}

impl fmt::Display for Symbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_char())
    }
}

/// International Morse table: letters, digits and common punctuation
const MORSE_TABLE: [(char, &str); 54] = [
    ('A', ".-"),
    ('B', "-..."),
    ('C', "-.-."),
    ('D', "-.."),
    ('E', "."),
    ('F', "..-."),
    ('G', "--."),
    ('H', "...."),
    ('I', ".."),
    ('J', ".---"),
    ('K', "-.-"),
    ('L', ".-.."),
    ('M', "--"),
    ('N', "-."),
    ('O', "---"),
    ('P', ".--."),
    ('Q', "--.-"),
    ('R', ".-."),
    ('S', "..."),
    ('T', "-"),
    ('U', "..-"),
    ('V', "...-"),
    ('W', ".--"),
    ('X', "-..-"),
    ('Y', "-.--"),
    ('Z', "--.."),
    ('0', "-----"),
    ('1', ".----"),
    ('2', "..---"),
    ('3', "...--"),
    ('4', "....-"),
    ('5', "....."),
    ('6', "-...."),
    ('7', "--..."),
    ('8', "---.."),
    ('9', "----."),
    ('.', ".-.-.-"),
    (',', "--..--"),
    ('?', "..--.."),
    ('\'', ".----."),
    ('!', "-.-.--"),
    ('/', "-..-."),
    ('(', "-.--."),
    (')', "-.--.-"),
    ('&', ".-..."),
    (':', "---..."),
    (';', "-.-.-."),
    ('=', "-...-"),
    ('+', ".-.-."),
    ('-', "-....-"),
    ('_', "..--.-"),
    ('"', ".-..-."),
    ('$', "...-..-"),
    ('@', ".--.-."),
];

/// Bidirectional character <-> symbol sequence lookup.
///
/// Lookups by character are case-insensitive; reverse lookups always
/// return the canonical (upper-case) character.
pub struct SymbolTable {
    by_char: HashMap<char, Vec<Symbol>>,
    by_pattern: HashMap<Vec<Symbol>, char>,
}

impl SymbolTable {
    fn build() -> Self {
        let mut by_char = HashMap::with_capacity(MORSE_TABLE.len());
        let mut by_pattern = HashMap::with_capacity(MORSE_TABLE.len());

        for &(ch, pattern) in MORSE_TABLE.iter() {
            let symbols: Vec<Symbol> = pattern.chars().filter_map(Symbol::from_char).collect();
            by_pattern.insert(symbols.clone(), ch);
            by_char.insert(ch, symbols);
        }

        Self { by_char, by_pattern }
    }

    /// Shared process-wide table
    pub fn standard() -> &'static SymbolTable {
        static TABLE: OnceLock<SymbolTable> = OnceLock::new();
        TABLE.get_or_init(SymbolTable::build)
    }

    /// Symbols for `ch`, or `None` when the character has no Morse form
    pub fn encode(&self, ch: char) -> Option<&[Symbol]> {
        self.by_char
            .get(&ch.to_ascii_uppercase())
            .map(|symbols| symbols.as_slice())
    }

    /// Character for a complete symbol sequence
    pub fn decode(&self, symbols: &[Symbol]) -> Option<char> {
        self.by_pattern.get(symbols).copied()
    }

    pub fn len(&self) -> usize {
        self.by_char.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_char.is_empty()
    }

    /// Iterate over every (character, symbols) entry in table order
    pub fn entries(&self) -> impl Iterator<Item = (char, &[Symbol])> + '_ {
        MORSE_TABLE
            .iter()
            .filter_map(move |&(ch, _)| self.encode(ch).map(|symbols| (ch, symbols)))
    }
}

/// Render a symbol sequence as dot/dash notation, e.g. `"-.-."`
pub fn pattern_to_string(symbols: &[Symbol]) -> String {
    symbols.iter().map(|s| s.as_char()).collect()
}

/// Parse dot/dash notation; `None` on any other character or an empty string
pub fn parse_pattern(pattern: &str) -> Option<Vec<Symbol>> {
    if pattern.is_empty() {
        return None;
    }
    pattern.chars().map(Symbol::from_char).collect()
}

/// Render text as dot/dash notation.
///
/// Characters are separated by a space and words by `" / "`. Characters
/// without a Morse form are skipped.
pub fn text_to_pattern(text: &str) -> String {
    let table = SymbolTable::standard();
    let words: Vec<String> = text
        .split_whitespace()
        .map(|word| {
            word.chars()
                .filter_map(|ch| table.encode(ch))
                .map(pattern_to_string)
                .collect::<Vec<_>>()
                .join(" ")
        })
        .filter(|word| !word.is_empty())
        .collect();
    words.join(" / ")
}

/// Read dot/dash notation back as text, the inverse of [`text_to_pattern`].
///
/// Characters are separated by whitespace and words by `/`. Groups that are
/// not valid notation or have no table entry are skipped.
pub fn pattern_to_text(notation: &str) -> String {
    let table = SymbolTable::standard();
    let words: Vec<String> = notation
        .split('/')
        .map(|word| {
            word.split_whitespace()
                .filter_map(parse_pattern)
                .filter_map(|symbols| table.decode(&symbols))
                .collect::<String>()
        })
        .filter(|word| !word.is_empty())
        .collect();
    words.join(" ")
}
