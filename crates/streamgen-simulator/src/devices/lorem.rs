//! Filler text for error messages and generated names.

use once_cell::sync::Lazy;
use rand::rngs::StdRng;
use rand::Rng;

const PARAGRAPH: &str = "Lorem ipsum dolor sit amet, consectetur adipiscing elit, sed do eiusmod \
tempor incididunt ut labore et dolore magna aliqua. Ut enim ad minim veniam, quis nostrud \
exercitation ullamco laboris nisi ut aliquip ex ea commodo consequat. Duis aute irure dolor in \
reprehenderit in voluptate velit esse cillum dolore eu fugiat nulla pariatur. Excepteur sint \
occaecat cupidatat non proident, sunt in culpa qui officia deserunt mollit anim id est laborum. \
Sed ut perspiciatis unde omnis iste natus error sit voluptatem accusantium doloremque laudantium, \
totam rem aperiam, eaque ipsa quae ab illo inventore veritatis et quasi architecto beatae vitae \
dicta sunt explicabo. Nemo enim ipsam voluptatem quia voluptas sit aspernatur aut odit aut fugit, \
sed quia consequuntur magni dolores eos qui ratione voluptatem sequi nesciunt.";

/// Length of the long filler text.
pub const TEXT_LEN: usize = 5 * 1024;

/// Length of the common error message.
pub const SHORT_TEXT_LEN: usize = 2 * 1024;

static TEXT: Lazy<String> = Lazy::new(|| {
    let mut text = String::with_capacity(TEXT_LEN + PARAGRAPH.len());
    while text.len() < TEXT_LEN {
        if !text.is_empty() {
            text.push(' ');
        }
        text.push_str(PARAGRAPH);
    }
    text.truncate(TEXT_LEN);
    text
});

static WORDS: Lazy<Vec<&'static str>> = Lazy::new(|| TEXT.split_whitespace().collect());

/// 5 KiB of filler text.
pub fn text() -> &'static str {
    TEXT.as_str()
}

/// The first 2 KiB of [`text`].
pub fn short_text() -> &'static str {
    &TEXT[..SHORT_TEXT_LEN]
}

pub fn words() -> &'static [&'static str] {
    &WORDS
}

/// A random word without surrounding punctuation.
pub fn word(rng: &mut StdRng) -> &'static str {
    let words = words();
    words[rng.gen_range(0..words.len())].trim_matches(|c: char| c.is_ascii_punctuation())
}

/// A random word with its first letter upper-cased.
pub fn name(rng: &mut StdRng) -> String {
    let mut chars = word(rng).chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;

    #[test]
    fn test_text_sizes() {
        assert_eq!(text().len(), TEXT_LEN);
        assert_eq!(short_text().len(), SHORT_TEXT_LEN);
        assert!(words().len() > 500);
    }

    #[test]
    fn test_names_are_capitalized_words() {
        let mut rng = StdRng::seed_from_u64(3);
        for _ in 0..100 {
            let name = name(&mut rng);
            assert!(!name.is_empty());
            assert!(name.chars().next().unwrap().is_uppercase());
            assert!(!name.ends_with(',') && !name.ends_with('.'));
        }
    }
}
