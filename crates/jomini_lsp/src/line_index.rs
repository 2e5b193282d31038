//! Conversion between byte offsets and LSP positions.
//!
//! The analysis crates work in byte offsets; LSP wants zero-based lines and
//! UTF-16 code-unit columns. Line starts are precomputed once per document
//! revision.

use jomini_base::Span;
use tower_lsp::lsp_types::{Position, Range};

#[derive(Debug, Clone)]
pub struct LineIndex {
    /// Byte offset where each line begins; index 0 is always 0.
    line_starts: Vec<usize>,
    source: String,
}

impl LineIndex {
    pub fn new(source: &str) -> Self {
        let mut line_starts = vec![0];
        for (offset, byte) in source.bytes().enumerate() {
            if byte == b'\n' {
                line_starts.push(offset + 1);
            }
        }
        LineIndex {
            line_starts,
            source: source.to_string(),
        }
    }

    /// Byte offset → LSP position (UTF-16 column).
    pub fn position(&self, byte_offset: usize) -> Position {
        let offset = byte_offset.min(self.source.len());
        let line = self
            .line_starts
            .partition_point(|&start| start <= offset)
            .saturating_sub(1);
        let line_start = self.line_starts[line];
        let character = self.source[line_start..offset].encode_utf16().count() as u32;
        Position {
            line: line as u32,
            character,
        }
    }

    /// Byte span → LSP range.
    pub fn range(&self, span: Span) -> Range {
        Range {
            start: self.position(span.start),
            end: self.position(span.end),
        }
    }

    /// LSP position → byte offset. Positions past the end of a line or the
    /// document clamp instead of failing.
    pub fn offset(&self, position: Position) -> usize {
        let line = position.line as usize;
        if line >= self.line_starts.len() {
            return self.source.len();
        }
        let line_start = self.line_starts[line];
        let line_end = self
            .line_starts
            .get(line + 1)
            .copied()
            .unwrap_or(self.source.len());

        let mut utf16_seen = 0u32;
        for (byte_idx, ch) in self.source[line_start..line_end].char_indices() {
            if utf16_seen >= position.character {
                return line_start + byte_idx;
            }
            utf16_seen += ch.len_utf16() as u32;
        }
        line_end
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ascii_positions() {
        let idx = LineIndex::new("abc\ndef\nghi");
        assert_eq!(idx.position(0), Position { line: 0, character: 0 });
        assert_eq!(idx.position(4), Position { line: 1, character: 0 });
        assert_eq!(idx.position(7), Position { line: 1, character: 3 });
    }

    #[test]
    fn offset_round_trips() {
        let src = "namespace = my_mod\nmy_mod.1 = { }\n";
        let idx = LineIndex::new(src);
        for offset in 0..src.len() {
            assert_eq!(idx.offset(idx.position(offset)), offset, "offset {offset}");
        }
    }

    #[test]
    fn multibyte_columns_count_utf16_units() {
        // 'ö' is 2 UTF-8 bytes, 1 UTF-16 unit.
        let src = "könig = yes";
        let idx = LineIndex::new(src);
        let pos = idx.position(src.find('=').unwrap());
        assert_eq!(pos.character, 6);
    }

    #[test]
    fn out_of_bounds_clamp() {
        let idx = LineIndex::new("ab");
        assert_eq!(idx.position(99), Position { line: 0, character: 2 });
        assert_eq!(idx.offset(Position { line: 9, character: 9 }), 2);
        assert_eq!(idx.offset(Position { line: 0, character: 99 }), 2);
    }

    #[test]
    fn span_to_range() {
        let idx = LineIndex::new("a = 1\nbb = 2\n");
        let range = idx.range(Span::new(6, 8));
        assert_eq!(range.start, Position { line: 1, character: 0 });
        assert_eq!(range.end, Position { line: 1, character: 2 });
    }

    #[test]
    fn crlf_lines() {
        let src = "a = 1\r\nb = 2";
        let idx = LineIndex::new(src);
        assert_eq!(idx.position(7), Position { line: 1, character: 0 });
    }
}
