//! Text helpers.

use std::borrow::Cow;

/// Helpers for fitting text into chat messages.
pub trait Truncatable {
    /// Cuts the text after `len` characters, appending `suffix` when anything was cut.
    fn truncate_with_suffix(&self, len: usize, suffix: &str) -> Cow<'_, str>;

    /// Splits the text into pieces of at most `size` characters.
    fn char_chunks(&self, size: usize) -> Vec<&str>;
}

impl Truncatable for String {
    fn truncate_with_suffix(&self, len: usize, suffix: &str) -> Cow<'_, str> {
        self.as_str().truncate_with_suffix(len, suffix)
    }

    fn char_chunks(&self, size: usize) -> Vec<&str> {
        self.as_str().char_chunks(size)
    }
}

impl Truncatable for str {
    fn truncate_with_suffix(&self, len: usize, suffix: &str) -> Cow<'_, str> {
        match self.char_indices().nth(len) {
            Some((byte_idx, _)) => Cow::Owned(format!("{}{suffix}", &self[..byte_idx])),
            None => Cow::Borrowed(self),
        }
    }

    fn char_chunks(&self, size: usize) -> Vec<&str> {
        if size == 0 {
            return vec![];
        }

        let mut chunks = Vec::new();
        let mut rest = self;

        while !rest.is_empty() {
            let end = rest.char_indices().nth(size).map_or(rest.len(), |(i, _)| i);
            let (chunk, tail) = rest.split_at(end);

            chunks.push(chunk);
            rest = tail;
        }

        chunks
    }
}
