// Identifier normalization for PostgreSQL column and table names
use rand::Rng;
use std::path::Path;

/// Characters replaced by an underscore
const SEPARATORS: &[char] = &[' ', '/', '.', ':', ';', '|', '-', ','];

/// Characters removed without replacement
const STRIPPED: &[char] = &[
    '[', ']', '{', '}', '(', ')', '?', '!', '$', '%', '*', '"', '#', '&', '\'',
];

/// Transliterate a lower-case accented Latin letter to ASCII
fn transliterate(c: char) -> Option<&'static str> {
    let ascii = match c {
        'à' | 'á' | 'â' | 'ã' | 'ä' | 'å' => "a",
        'æ' => "ae",
        'ç' => "c",
        'è' | 'é' | 'ê' | 'ë' => "e",
        'ì' | 'í' | 'î' | 'ï' => "i",
        'ñ' => "n",
        'ò' | 'ó' | 'ô' | 'õ' | 'ö' | 'ø' => "o",
        'œ' => "oe",
        'ß' => "ss",
        'ù' | 'ú' | 'û' | 'ü' => "u",
        'ý' | 'ÿ' => "y",
        _ => return None,
    };
    Some(ascii)
}

/// Makes sure that a string is a valid PostgreSQL identifier.
///
/// Total and side-effect free apart from the random placeholder used when
/// nothing usable remains.
pub fn normalize(raw: &str) -> String {
    let lowered = raw.to_lowercase();
    let mut out = String::with_capacity(lowered.len());

    for c in lowered.trim().chars() {
        if let Some(ascii) = transliterate(c) {
            out.push_str(ascii);
        } else if SEPARATORS.contains(&c) {
            out.push('_');
        } else if !STRIPPED.contains(&c) {
            out.push(c);
        }
    }

    let trimmed = out.trim();
    if trimmed.is_empty() {
        return placeholder_name();
    }

    if trimmed.starts_with(|c: char| c.is_ascii_digit()) {
        format!("_{}", trimmed)
    } else {
        trimmed.to_string()
    }
}

/// Random `_col<N>` name for identifiers that normalize to nothing
pub fn placeholder_name() -> String {
    format!("_col{}", rand::thread_rng().gen_range(0..10000))
}

/// Default relation name for an input file: base name without extension
pub fn normalize_table_name(path: &Path) -> Option<String> {
    let stem = path.file_stem()?.to_str()?;
    Some(normalize(stem))
}
