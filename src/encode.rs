/// Closed genre vocabulary. Index 0 is the most significant of the 19 bits.
pub const GENRES: [&str; 19] = [
    "action",
    "adventure",
    "animation",
    "comedy",
    "crime",
    "documentary",
    "drama",
    "family",
    "fantasy",
    "history",
    "horror",
    "music",
    "mystery",
    "romance",
    "science_fiction",
    "tv_movie",
    "thriller",
    "war",
    "western",
];

pub const GENRE_BITS: usize = GENRES.len();

const GENRE_MASK: u32 = (1 << GENRE_BITS) - 1;

/// Known countries of origin. Anything else encodes to `UNKNOWN_COUNTRY`.
///
/// Code 9 is keyed on "Australia". Older catalogs keyed it on the misspelling
/// "Austrailia", so their Australian rows hold `UNKNOWN_COUNTRY` instead.
pub const COUNTRIES: [&str; 15] = [
    "USA",
    "UK",
    "China",
    "France",
    "Japan",
    "Germany",
    "South Korea",
    "Canada",
    "India",
    "Australia",
    "Hong Kong",
    "Italy",
    "Spain",
    "Brazil",
    "USSR",
];

pub const UNKNOWN_COUNTRY: u8 = COUNTRIES.len() as u8;

/// Per-genre booleans materialised from a stored bitmask, in `GENRES` order.
pub type GenreFlags = [bool; GENRE_BITS];

/// "Science Fiction" -> "science_fiction"
pub fn normalize_genre(genre: &str) -> String {
    genre
        .trim()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join("_")
        .to_lowercase()
}

pub fn encode_genres<S: AsRef<str>>(genres: &[S]) -> u32 {
    let normalized: Vec<String> = genres.iter().map(|g| normalize_genre(g.as_ref())).collect();

    GENRES
        .iter()
        .enumerate()
        .filter(|(_, genre)| normalized.iter().any(|n| n == *genre))
        .fold(0u32, |mask, (i, _)| mask | 1 << (GENRE_BITS - 1 - i))
}

/// Inverse of [`encode_genres`]. A missing or zero bitmask yields all-false flags.
pub fn decode_genres(bitmask: Option<u32>) -> GenreFlags {
    // Start from all-false so nothing leaks in from a previous row.
    let mut flags = [false; GENRE_BITS];

    let Some(bitmask) = bitmask else {
        return flags;
    };

    let digits = format!("{:0width$b}", bitmask & GENRE_MASK, width = GENRE_BITS);
    for (flag, digit) in flags.iter_mut().zip(digits.chars()) {
        *flag = digit == '1';
    }
    flags
}

/// Names of the genres set in `bitmask`, in vocabulary order.
pub fn genre_names(bitmask: u32) -> Vec<&'static str> {
    decode_genres(Some(bitmask))
        .iter()
        .zip(GENRES)
        .filter_map(|(set, name)| set.then_some(name))
        .collect()
}

pub fn encode_country(country: &str) -> u8 {
    COUNTRIES
        .iter()
        .position(|c| *c == country.trim())
        .map(|i| i as u8)
        .unwrap_or(UNKNOWN_COUNTRY)
}
