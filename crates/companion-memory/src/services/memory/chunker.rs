use anyhow::Result;
use text_splitter::{Characters, ChunkConfig, TextSplitter};

/// Splits companion text into index fragments: one per paragraph, with
/// paragraphs longer than `fragment_size` characters broken at sentence or
/// word boundaries into overlapping chunks.
pub struct TextChunker {
    splitter: TextSplitter<Characters>,
}

impl TextChunker {
    /// Fails when `overlap` does not fit inside `fragment_size`.
    pub fn new(fragment_size: usize, overlap: usize) -> Result<Self> {
        let config = ChunkConfig::new(fragment_size.max(1)).with_overlap(overlap)?;
        Ok(Self {
            splitter: TextSplitter::new(config),
        })
    }

    pub fn split(&self, text: &str) -> Vec<String> {
        text.split("\n\n")
            .map(str::trim)
            .filter(|p| !p.is_empty())
            .flat_map(|p| self.splitter.chunks(p).map(str::to_string))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_paragraphs_become_fragments() {
        let chunker = TextChunker::new(100, 10).unwrap();
        let fragments = chunker.split("Human: hi\nElon: hello\n\n\n\n  Human: bye  \n\n");
        assert_eq!(fragments, vec!["Human: hi\nElon: hello", "Human: bye"]);
    }

    #[test]
    fn test_long_paragraph_keeps_whole_words() {
        let text = "Elon builds reusable rockets. He also likes electric cars.";
        let words: Vec<&str> = text.split_whitespace().collect();

        let fragments = TextChunker::new(20, 5).unwrap().split(text);

        assert!(fragments.len() > 1);
        assert!(fragments[0].starts_with("Elon"));
        for fragment in &fragments {
            assert!(fragment.chars().count() <= 20, "too long: {:?}", fragment);
            for word in fragment.split_whitespace() {
                assert!(words.contains(&word), "cut word {:?} in {:?}", word, fragment);
            }
        }
        assert!(fragments.last().unwrap().ends_with("cars."));
    }

    #[test]
    fn test_multibyte_text() {
        let fragments = TextChunker::new(3, 0).unwrap().split("ça va été");
        assert!(fragments.iter().all(|f| f.chars().count() <= 3));
        assert_eq!(fragments.join(" "), "ça va été");
    }

    #[test]
    fn test_overlap_larger_than_size_is_rejected() {
        assert!(TextChunker::new(10, 20).is_err());
    }

    #[test]
    fn test_empty_text() {
        assert!(TextChunker::new(10, 2).unwrap().split("  \n\n ").is_empty());
    }
}
