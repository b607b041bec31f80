//! Recursive character splitting of the job-offer corpus into embeddable chunks.

use std::collections::VecDeque;

const SEPARATORS: [&str; 4] = ["\n\n", "\n", " ", ""];

#[derive(Debug, Clone, Copy)]
pub struct TextSplitter {
    chunk_size: usize,
    chunk_overlap: usize,
}

impl TextSplitter {
    pub fn new(chunk_size: usize, chunk_overlap: usize) -> Self {
        let chunk_size = chunk_size.max(1);
        Self {
            chunk_size,
            chunk_overlap: chunk_overlap.min(chunk_size - 1),
        }
    }

    /// Chunks of at most `chunk_size` characters, preferring paragraph, then
    /// line, then word boundaries.
    pub fn split(&self, text: &str) -> Vec<String> {
        self.split_with(text, &SEPARATORS)
    }

    fn split_with(&self, text: &str, separators: &[&str]) -> Vec<String> {
        let (separator, rest) = pick_separator(text, separators);

        let pieces: Vec<&str> = if separator.is_empty() {
            text.char_indices()
                .map(|(i, c)| &text[i..i + c.len_utf8()])
                .collect()
        } else {
            text.split(separator).filter(|p| !p.is_empty()).collect()
        };

        let mut chunks = Vec::new();
        let mut fitting: Vec<&str> = Vec::new();
        for piece in pieces {
            if char_len(piece) < self.chunk_size {
                fitting.push(piece);
                continue;
            }
            if !fitting.is_empty() {
                chunks.extend(self.merge(&fitting, separator));
                fitting.clear();
            }
            if rest.is_empty() {
                chunks.push(piece.to_string());
            } else {
                chunks.extend(self.split_with(piece, rest));
            }
        }
        if !fitting.is_empty() {
            chunks.extend(self.merge(&fitting, separator));
        }
        chunks
    }

    /// Greedy packing of small pieces; trailing pieces worth at most
    /// `chunk_overlap` characters open the next chunk.
    fn merge(&self, pieces: &[&str], separator: &str) -> Vec<String> {
        let sep_len = char_len(separator);
        let mut out = Vec::new();
        let mut current: VecDeque<&str> = VecDeque::new();
        let mut total = 0usize;

        for &piece in pieces {
            let len = char_len(piece);
            let joiner = |current: &VecDeque<&str>| if current.is_empty() { 0 } else { sep_len };

            if total + len + joiner(&current) > self.chunk_size && !current.is_empty() {
                push_chunk(&mut out, &current, separator);
                while total > self.chunk_overlap
                    || (total > 0 && total + len + joiner(&current) > self.chunk_size)
                {
                    let Some(front) = current.pop_front() else { break };
                    total -= char_len(front) + if current.is_empty() { 0 } else { sep_len };
                }
            }

            total += len + joiner(&current);
            current.push_back(piece);
        }
        push_chunk(&mut out, &current, separator);
        out
    }
}

fn pick_separator<'s>(text: &str, separators: &'s [&'s str]) -> (&'s str, &'s [&'s str]) {
    for (i, sep) in separators.iter().copied().enumerate() {
        if sep.is_empty() {
            return (sep, &[]);
        }
        if text.contains(sep) {
            return (sep, &separators[i + 1..]);
        }
    }
    ("", &[])
}

fn push_chunk(out: &mut Vec<String>, pieces: &VecDeque<&str>, separator: &str) {
    let joined = pieces.iter().copied().collect::<Vec<_>>().join(separator);
    let trimmed = joined.trim();
    if !trimmed.is_empty() {
        out.push(trimmed.to_string());
    }
}

fn char_len(s: &str) -> usize {
    s.chars().count()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn short_text_is_one_chunk() {
        let splitter = TextSplitter::new(1000, 0);
        assert_eq!(splitter.split("Job Title: Engineer"), vec!["Job Title: Engineer"]);
    }

    #[test]
    fn empty_text_has_no_chunks() {
        assert!(TextSplitter::new(10, 0).split("").is_empty());
        assert!(TextSplitter::new(10, 0).split("\n\n\n\n").is_empty());
    }

    #[test]
    fn paragraphs_packed_until_full() {
        let splitter = TextSplitter::new(12, 0);
        let chunks = splitter.split("aaaa\n\nbbbb\n\ncccc");
        assert_eq!(chunks, vec!["aaaa\n\nbbbb", "cccc"]);
    }

    #[test]
    fn long_paragraph_falls_back_to_words() {
        let splitter = TextSplitter::new(10, 0);
        let chunks = splitter.split("one two three four\n\nfive");
        assert_eq!(chunks, vec!["one two", "three four", "five"]);
        assert!(chunks.iter().all(|c| c.chars().count() <= 10));
    }

    #[test]
    fn unbroken_word_split_by_chars() {
        let splitter = TextSplitter::new(4, 0);
        assert_eq!(splitter.split("abcdefghij"), vec!["abcd", "efgh", "ij"]);
    }

    #[test]
    fn overlap_repeats_tail_words() {
        let splitter = TextSplitter::new(9, 4);
        let chunks = splitter.split("aa bb cc dd ee");
        assert_eq!(chunks, vec!["aa bb cc", "cc dd ee"]);
    }

    #[test]
    fn lengths_counted_in_chars() {
        let splitter = TextSplitter::new(5, 0);
        let chunks = splitter.split("žluť kůň");
        assert_eq!(chunks, vec!["žluť", "kůň"]);
    }
}
