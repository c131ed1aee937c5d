//! Text folding shared by date parsing, classification and deduplication.

/// Lowercase and strip the diacritics found in Portuguese, Spanish and French listings.
pub fn fold_accents(text: &str) -> String {
    text.chars()
        .flat_map(char::to_lowercase)
        .map(|c| match c {
            'á' | 'à' | 'â' | 'ã' | 'ä' | 'å' => 'a',
            'é' | 'è' | 'ê' | 'ë' => 'e',
            'í' | 'ì' | 'î' | 'ï' => 'i',
            'ó' | 'ò' | 'ô' | 'õ' | 'ö' => 'o',
            'ú' | 'ù' | 'û' | 'ü' => 'u',
            'ç' => 'c',
            'ñ' => 'n',
            'º' | '°' => 'o',
            other => other,
        })
        .collect()
}

/// Folded text reduced to alphanumeric words separated by single spaces.
///
/// `"F1 - Qualifying"` and `"f1  qualifying!"` both become `"f1 qualifying"`.
pub fn normalize_name(text: &str) -> String {
    fold_accents(text)
        .chars()
        .map(|c| if c.is_alphanumeric() { c } else { ' ' })
        .collect::<String>()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

/// Whether `phrase` occurs in `text` as a run of whole words. Both must be normalized.
pub fn contains_phrase(text: &str, phrase: &str) -> bool {
    if phrase.is_empty() {
        return false;
    }
    if text == phrase {
        return true;
    }
    let padded_text = format!(" {} ", text);
    let padded_phrase = format!(" {} ", phrase);
    padded_text.contains(&padded_phrase)
}

/// Remove every whole-word occurrence of `phrase` from `text`. Both must be normalized.
pub fn strip_phrase(text: &str, phrase: &str) -> String {
    if phrase.is_empty() {
        return text.to_string();
    }
    let padded = format!(" {} ", text);
    let needle = format!(" {} ", phrase);
    padded
        .replace(&needle, " ")
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn folds_portuguese() {
        assert_eq!(fold_accents("Sábado às 14h"), "sabado as 14h");
        assert_eq!(fold_accents("Março"), "marco");
    }

    #[test]
    fn normalizes_punctuation() {
        assert_eq!(normalize_name("F1 - Qualifying"), "f1 qualifying");
        assert_eq!(normalize_name("  Fórmula   1: Classificação "), "formula 1 classificacao");
    }

    #[test]
    fn phrases_match_whole_words() {
        assert!(contains_phrase("formula 1 qualifying", "formula 1"));
        assert!(!contains_phrase("f12 qualifying", "f1"));
        assert_eq!(strip_phrase("formula 1 qualifying", "formula 1"), "qualifying");
        assert_eq!(strip_phrase("f1", "f1"), "");
    }
}
