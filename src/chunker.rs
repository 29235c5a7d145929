//! Reflows reply text into line-bounded chunks for chat delivery.
//!
//! Text is normalized (escaped and CRLF line breaks folded, lone backslash
//! marker lines removed), split into paragraphs, then packed into chunks of at
//! most `max_lines` lines. Paragraphs longer than `max_chars_per_line` are
//! word-wrapped; a single word longer than the budget is hard-split.
//! Lengths are counted in `char`s.

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ChunkError {
    #[error("Invalid argument: {0} must be at least 1")]
    InvalidArgument(&'static str),
}

/// Line and character budget for one chunk.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkLimits {
    max_lines: usize,
    max_chars_per_line: usize,
}

impl ChunkLimits {
    pub fn new(max_lines: usize, max_chars_per_line: usize) -> Result<Self, ChunkError> {
        if max_lines == 0 {
            return Err(ChunkError::InvalidArgument("max_lines"));
        }
        if max_chars_per_line == 0 {
            return Err(ChunkError::InvalidArgument("max_chars_per_line"));
        }
        Ok(Self {
            max_lines,
            max_chars_per_line,
        })
    }

    pub fn max_lines(&self) -> usize {
        self.max_lines
    }

    pub fn max_chars_per_line(&self) -> usize {
        self.max_chars_per_line
    }

    /// Split `text` into send-ready chunks. Empty input yields no chunks.
    pub fn split(&self, text: &str) -> Vec<String> {
        if text.is_empty() {
            return Vec::new();
        }
        let normalized = normalize(text);
        let paragraphs = split_paragraphs(&normalized);
        pack(&paragraphs, *self)
    }
}

impl Default for ChunkLimits {
    fn default() -> Self {
        Self {
            max_lines: 3,
            max_chars_per_line: 100,
        }
    }
}

/// Split a message into chunks of at most `max_lines` lines, each at most
/// `max_chars_per_line` characters unless a hard split was impossible to avoid.
pub fn split_message(
    text: &str,
    max_lines: usize,
    max_chars_per_line: usize,
) -> Result<Vec<String>, ChunkError> {
    Ok(ChunkLimits::new(max_lines, max_chars_per_line)?.split(text))
}

// ---------------------------------------------------------------------------
// Normalization
// ---------------------------------------------------------------------------

/// Fold `\n` escapes and CRLF into line breaks, then drop standalone
/// backslash marker lines (interior, leading, trailing, in that order).
pub fn normalize(text: &str) -> String {
    let unescaped = text.replace("\\n", "\n").replace("\r\n", "\n");
    let interior = remove_interior_markers(&unescaped);
    let leading = strip_leading_marker(&interior);
    strip_trailing_marker(leading).to_string()
}

/// Byte index just past the whitespace run starting at `from`.
fn skip_whitespace(s: &str, from: usize) -> usize {
    s[from..]
        .find(|c: char| !c.is_whitespace())
        .map_or(s.len(), |i| from + i)
}

/// Match `ws* \ ws* LF` starting at `from`. Returns the byte index past the
/// last line break of the trailing whitespace run.
fn match_marker(s: &str, from: usize) -> Option<usize> {
    let slash = skip_whitespace(s, from);
    if !s[slash..].starts_with('\\') {
        return None;
    }
    let after = slash + 1;
    let run_end = skip_whitespace(s, after);
    s[after..run_end].rfind('\n').map(|i| after + i + 1)
}

/// `LF ws* \ ws* LF` -> `LF`, leftmost first, non-overlapping.
fn remove_interior_markers(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut copied = 0;
    let mut pos = 0;
    while let Some(i) = s[pos..].find('\n').map(|i| pos + i) {
        match match_marker(s, i + 1) {
            Some(end) => {
                out.push_str(&s[copied..=i]);
                copied = end;
                pos = end;
            }
            None => pos = i + 1,
        }
    }
    out.push_str(&s[copied..]);
    out
}

/// `^ ws* \ ws* LF` -> nothing.
fn strip_leading_marker(s: &str) -> &str {
    match match_marker(s, 0) {
        Some(end) => &s[end..],
        None => s,
    }
}

/// `LF ws* \ ws* $` -> nothing. The cut starts at the first line break of the
/// whitespace run before the backslash.
fn strip_trailing_marker(s: &str) -> &str {
    let trimmed = s.trim_end();
    if !trimmed.ends_with('\\') {
        return s;
    }
    let slash = trimmed.len() - 1;
    let run_start = s[..slash].trim_end().len();
    match s[run_start..slash].find('\n') {
        Some(i) => &s[..run_start + i],
        None => s,
    }
}

// ---------------------------------------------------------------------------
// Paragraphs
// ---------------------------------------------------------------------------

/// Split normalized text on every line break. Empty paragraphs are kept.
pub fn split_paragraphs(normalized: &str) -> Vec<&str> {
    normalized.split('\n').collect()
}

// ---------------------------------------------------------------------------
// Packing
// ---------------------------------------------------------------------------

/// Accumulates lines into the current chunk and cuts a chunk whenever the
/// line budget is reached. Lines are joined only at flush time.
struct ChunkAssembler {
    max_lines: usize,
    lines: Vec<String>,
    chunks: Vec<String>,
}

impl ChunkAssembler {
    fn new(max_lines: usize) -> Self {
        Self {
            max_lines,
            lines: Vec::new(),
            chunks: Vec::new(),
        }
    }

    fn flush(&mut self) {
        if !self.lines.is_empty() {
            self.chunks.push(self.lines.join("\n"));
            self.lines.clear();
        }
    }

    fn emit(&mut self, line: String) {
        if self.lines.len() >= self.max_lines {
            self.flush();
        }
        self.lines.push(line);
    }

    /// A blank line right at a full chunk boundary flushes, then is only
    /// added if the fresh chunk still has room.
    fn push_blank(&mut self) {
        if self.lines.len() >= self.max_lines {
            self.flush();
        }
        if self.lines.len() < self.max_lines {
            self.lines.push(String::new());
        }
    }

    fn finish(mut self) -> Vec<String> {
        self.flush();
        self.chunks
    }
}

/// Pack paragraphs into chunks, greedily and strictly left to right.
pub fn pack(paragraphs: &[&str], limits: ChunkLimits) -> Vec<String> {
    let mut assembler = ChunkAssembler::new(limits.max_lines);

    for paragraph in paragraphs {
        if paragraph.trim().is_empty() {
            assembler.push_blank();
        } else if paragraph.chars().count() <= limits.max_chars_per_line {
            assembler.emit(paragraph.to_string());
        } else {
            wrap_paragraph(paragraph, limits.max_chars_per_line, &mut assembler);
        }
    }

    assembler.finish()
}

fn wrap_paragraph(paragraph: &str, max_chars: usize, out: &mut ChunkAssembler) {
    let mut line: Vec<&str> = Vec::new();
    let mut line_len = 0;

    for word in paragraph.split_whitespace() {
        let word_len = word.chars().count();

        if word_len > max_chars {
            if !line.is_empty() {
                out.emit(line.join(" "));
                line.clear();
                line_len = 0;
            }
            for slice in hard_split(word, max_chars) {
                out.emit(slice.to_string());
            }
        } else if line_len + word_len + usize::from(!line.is_empty()) > max_chars {
            if !line.is_empty() {
                out.emit(line.join(" "));
            }
            line.clear();
            line.push(word);
            line_len = word_len;
        } else {
            if !line.is_empty() {
                line_len += 1;
            }
            line.push(word);
            line_len += word_len;
        }
    }

    if !line.is_empty() {
        out.emit(line.join(" "));
    }
}

/// Consecutive slices of `width` chars; the last may be shorter.
fn hard_split(word: &str, width: usize) -> impl Iterator<Item = &str> {
    let mut rest = word;
    std::iter::from_fn(move || {
        if rest.is_empty() {
            return None;
        }
        let cut = rest
            .char_indices()
            .nth(width)
            .map_or(rest.len(), |(i, _)| i);
        let (head, tail) = rest.split_at(cut);
        rest = tail;
        Some(head)
    })
}
