#[cfg(test)]
mod tests;

use std::ops::Range;
use std::path::Path;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use tracing::debug;

/// Candidate delimiters for tabular content, in tie-break order
const TABULAR_DELIMITERS: [char; 3] = [',', ';', '\t'];
/// Lower bound on the number of data rows grouped into one tabular chunk
const MIN_ROWS_PER_CHUNK: usize = 5;
const PARAGRAPH_SEPARATOR: &str = "\n\n";

/// Configuration for content chunking. All sizes are in characters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChunkingConfig {
    /// Target maximum characters per chunk
    pub chunk_size: usize,
    /// Characters carried from the end of one chunk into the next
    pub chunk_overlap: usize,
    /// Chunks shorter than this are discarded
    pub min_chunk_size: usize,
    /// Prefer starting overlap tails at a sentence boundary
    pub respect_sentences: bool,
    /// Split free text on blank-line paragraphs instead of single lines
    pub respect_paragraphs: bool,
}

impl Default for ChunkingConfig {
    #[inline]
    fn default() -> Self {
        Self {
            chunk_size: 1000,
            chunk_overlap: 200,
            min_chunk_size: 100,
            respect_sentences: true,
            respect_paragraphs: true,
        }
    }
}

/// Which chunking strategy a document is routed through
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "kebab-case")]
pub enum FormatHint {
    /// Delimited rows with a header line (CSV, TSV)
    Tabular,
    /// Serialized records (JSON)
    StructuredRecord,
    /// Prose; also the fallback for anything the other strategies reject
    #[default]
    FreeText,
}

/// A `--format` value that names no chunking strategy
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown format '{0}', expected one of: csv, tsv, json, text")]
pub struct UnknownFormat(pub String);

impl FormatHint {
    /// Recognized tags only; `None` for anything else
    fn from_tag(tag: &str) -> Option<Self> {
        let normalized = tag.trim().trim_start_matches('.').to_ascii_lowercase();
        match normalized.as_str() {
            "csv" | "tsv" | "tabular" | "text/csv" | "text/tab-separated-values" => {
                Some(Self::Tabular)
            }
            "json" | "structured" | "structured-record" | "application/json" => {
                Some(Self::StructuredRecord)
            }
            "text" | "txt" | "free-text" | "md" | "markdown" | "text/plain" | "text/markdown" => {
                Some(Self::FreeText)
            }
            _ => None,
        }
    }

    /// Map a file type tag, MIME type or extension onto a strategy.
    /// Unrecognized types are treated as free text.
    #[inline]
    pub fn from_file_type(file_type: &str) -> Self {
        Self::from_tag(file_type).unwrap_or(Self::FreeText)
    }

    /// Pick a strategy from a file's extension
    #[inline]
    pub fn from_path(path: &Path) -> Self {
        path.extension()
            .and_then(|ext| ext.to_str())
            .map_or(Self::FreeText, Self::from_file_type)
    }

    /// Format tag recorded in chunk metadata
    #[inline]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Tabular => "csv",
            Self::StructuredRecord => "json",
            Self::FreeText => "text",
        }
    }
}

impl FromStr for FormatHint {
    type Err = UnknownFormat;

    #[inline]
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_tag(s).ok_or_else(|| UnknownFormat(s.to_string()))
    }
}

impl std::fmt::Display for FormatHint {
    #[inline]
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Metadata carried by every chunk and copied into its embedding record
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChunkMetadata {
    /// Position of this chunk within its document, starting at 0
    pub chunk_index: usize,
    /// Originating filename
    pub source_file: String,
    /// Format tag of the source
    pub file_type: String,
    /// Human-readable extent used in citations, e.g. "Rows 1-5"
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub section: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub line_start: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub line_end: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub page_number: Option<u32>,
    /// Header column names for tabular chunks
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub columns: Option<Vec<String>>,
    /// Estimated token count
    pub tokens: usize,
}

/// A retrievable unit of document text
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Chunk {
    pub content: String,
    pub metadata: ChunkMetadata,
}

/// Strategy output before indices and token counts are assigned
#[derive(Debug)]
struct Segment {
    content: String,
    section: String,
    line_start: Option<usize>,
    line_end: Option<usize>,
    columns: Option<Vec<String>>,
}

/// A paragraph (or line) of free text with its location in the source
#[derive(Debug)]
struct TextBlock {
    text: String,
    char_start: usize,
    char_end: usize,
    line_start: usize,
    line_end: usize,
}

/// Location covered by the blocks accumulated into a running chunk
#[derive(Debug, Clone, Copy)]
struct Span {
    char_start: usize,
    char_end: usize,
    line_start: usize,
    line_end: usize,
}

/// Split a document into ordered chunks using the strategy for its format.
///
/// Deterministic and free of I/O. Chunks shorter than
/// `config.min_chunk_size` are dropped; the surviving chunks are numbered
/// from 0 with no gaps.
#[inline]
pub fn chunk_document(
    content: &str,
    format: FormatHint,
    source_name: &str,
    config: &ChunkingConfig,
) -> Vec<Chunk> {
    let segments = match format {
        FormatHint::Tabular => split_tabular(content, config),
        FormatHint::StructuredRecord => split_structured(content, config),
        FormatHint::FreeText => None,
    }
    .unwrap_or_else(|| split_free_text(content, config));

    let chunks: Vec<Chunk> = segments
        .into_iter()
        .filter(|segment| segment.content.chars().count() >= config.min_chunk_size)
        .enumerate()
        .map(|(chunk_index, segment)| Chunk {
            metadata: ChunkMetadata {
                chunk_index,
                source_file: source_name.to_string(),
                file_type: format.as_str().to_string(),
                section: Some(segment.section),
                line_start: segment.line_start,
                line_end: segment.line_end,
                page_number: None,
                columns: segment.columns,
                tokens: estimate_token_count(&segment.content),
            },
            content: segment.content,
        })
        .collect();

    debug!(
        "Chunked '{}' ({}) into {} chunks (avg {} tokens)",
        source_name,
        format,
        chunks.len(),
        chunks.iter().map(|c| c.metadata.tokens).sum::<usize>() / chunks.len().max(1)
    );

    chunks
}

/// Estimate token count as one token per four characters, rounded up
#[inline]
pub fn estimate_token_count(text: &str) -> usize {
    text.chars().count().div_ceil(4)
}

/// Group delimited rows under a repeated header. Returns `None` when the
/// content has no data rows so the caller can fall back to free text.
fn split_tabular(content: &str, config: &ChunkingConfig) -> Option<Vec<Segment>> {
    let lines: Vec<(usize, &str)> = content
        .split('\n')
        .enumerate()
        .map(|(i, line)| (i + 1, line.trim_end_matches('\r')))
        .filter(|(_, line)| !line.trim().is_empty())
        .collect();

    let ((_, header), rows) = lines.split_first()?;
    if rows.is_empty() {
        return None;
    }

    let delimiter = detect_delimiter(header);
    let columns: Vec<String> = header
        .split(delimiter)
        .map(|name| name.trim().trim_matches('"').to_string())
        .collect();

    let total_row_chars: usize = rows.iter().map(|(_, row)| row.chars().count()).sum();
    let average_row_len = (total_row_chars as f64 / rows.len() as f64).max(1.0);
    let rows_per_chunk =
        ((config.chunk_size as f64 / average_row_len).floor() as usize).max(MIN_ROWS_PER_CHUNK);

    debug!(
        "Tabular content: {} rows, {} columns, delimiter {:?}, {} rows per chunk",
        rows.len(),
        columns.len(),
        delimiter,
        rows_per_chunk
    );

    let render = |range: &Range<usize>| {
        let mut chunk = String::from(*header);
        for (_, row) in &rows[range.clone()] {
            chunk.push('\n');
            chunk.push_str(row);
        }
        chunk
    };

    let mut ranges = group_ranges(rows.len(), rows_per_chunk);
    fold_short_tail(&mut ranges, |range| {
        render(range).chars().count() < config.min_chunk_size
    });

    let segments = ranges
        .iter()
        .map(|range| Segment {
            content: render(range),
            section: format!("Rows {}-{}", range.start + 1, range.end),
            line_start: rows.get(range.start).map(|(line, _)| *line),
            line_end: rows.get(range.end - 1).map(|(line, _)| *line),
            columns: Some(columns.clone()),
        })
        .collect();

    Some(segments)
}

/// The candidate delimiter that yields the most header columns; ties go to
/// the earlier candidate.
fn detect_delimiter(header: &str) -> char {
    let mut best = TABULAR_DELIMITERS[0];
    let mut best_columns = 0;
    for candidate in TABULAR_DELIMITERS {
        let columns = header.split(candidate).count();
        if columns > best_columns {
            best = candidate;
            best_columns = columns;
        }
    }
    best
}

/// Group consecutive items of a top-level JSON array. Single objects,
/// empty arrays and unparseable input return `None`.
fn split_structured(content: &str, config: &ChunkingConfig) -> Option<Vec<Segment>> {
    let value: Value = match serde_json::from_str(content) {
        Ok(value) => value,
        Err(e) => {
            debug!("Structured content did not parse, using free text: {}", e);
            return None;
        }
    };

    let Value::Array(items) = value else {
        debug!("Structured content is not a list, using free text");
        return None;
    };
    if items.is_empty() {
        return None;
    }

    let total_len = serde_json::to_string(&items).ok()?.chars().count();
    let average_item_len = (total_len / items.len()).max(1);
    let items_per_chunk = (config.chunk_size / average_item_len).max(1);

    let render = |range: &Range<usize>| serde_json::to_string_pretty(&items[range.clone()]);

    let mut ranges = group_ranges(items.len(), items_per_chunk);
    fold_short_tail(&mut ranges, |range| {
        render(range).is_ok_and(|text| text.chars().count() < config.min_chunk_size)
    });

    let mut segments = Vec::with_capacity(ranges.len());
    for range in &ranges {
        segments.push(Segment {
            content: render(range).ok()?,
            section: format!("Items {}-{}", range.start + 1, range.end),
            line_start: None,
            line_end: None,
            columns: None,
        });
    }

    Some(segments)
}

/// Accumulate paragraphs into chunks near `chunk_size`, seeding each new
/// chunk with an overlap tail from the one before it. A single paragraph
/// larger than `chunk_size` is kept whole.
fn split_free_text(content: &str, config: &ChunkingConfig) -> Vec<Segment> {
    let blocks = text_blocks(content, config.respect_paragraphs);
    let mut segments = Vec::new();
    let mut current = String::new();
    let mut current_len = 0;
    let mut span: Option<Span> = None;

    for block in blocks {
        let block_len = block.text.chars().count();
        let joined_len = if current.is_empty() {
            block_len
        } else {
            current_len + PARAGRAPH_SEPARATOR.len() + block_len
        };

        if !current.is_empty()
            && joined_len > config.chunk_size
            && current_len >= config.min_chunk_size
        {
            let tail = overlap_tail(&current, config);
            let tail_len = tail.chars().count();
            if let Some(closed) = span.take() {
                // the next chunk starts with the closed chunk's tail
                if tail_len > 0 {
                    span = Some(Span {
                        char_start: closed.char_end.saturating_sub(tail_len),
                        char_end: closed.char_end,
                        line_start: closed.line_end.saturating_sub(tail.matches('\n').count()),
                        line_end: closed.line_end,
                    });
                }
                segments.push(text_segment(current, closed));
            }
            current_len = tail_len;
            current = tail;
        }

        if !current.is_empty() {
            current.push_str(PARAGRAPH_SEPARATOR);
            current_len += PARAGRAPH_SEPARATOR.len();
        }
        current.push_str(&block.text);
        current_len += block_len;

        span = Some(match span {
            Some(open) => Span {
                char_end: block.char_end,
                line_end: block.line_end,
                ..open
            },
            None => Span {
                char_start: block.char_start,
                char_end: block.char_end,
                line_start: block.line_start,
                line_end: block.line_end,
            },
        });
    }

    if let Some(open) = span {
        if current_len >= config.min_chunk_size {
            segments.push(text_segment(current, open));
        }
    }

    segments
}

fn text_segment(content: String, span: Span) -> Segment {
    Segment {
        content,
        section: format!("Characters {}-{}", span.char_start, span.char_end),
        line_start: Some(span.line_start),
        line_end: Some(span.line_end),
        columns: None,
    }
}

/// Break text into blank-line paragraphs (or single lines) with their
/// character offsets and 1-based line numbers.
fn text_blocks(content: &str, by_paragraph: bool) -> Vec<TextBlock> {
    let mut blocks = Vec::new();
    let mut pending: Option<TextBlock> = None;
    let mut offset = 0;

    for (index, raw_line) in content.split('\n').enumerate() {
        let line_number = index + 1;
        let line = raw_line.trim_end_matches('\r');
        let line_start = offset;
        let line_end = line_start + line.chars().count();
        offset += raw_line.chars().count() + 1;

        if line.trim().is_empty() {
            blocks.extend(pending.take());
            continue;
        }

        if !by_paragraph {
            blocks.push(TextBlock {
                text: line.trim().to_string(),
                char_start: line_start,
                char_end: line_end,
                line_start: line_number,
                line_end: line_number,
            });
            continue;
        }

        match pending.as_mut() {
            Some(block) => {
                block.text.push('\n');
                block.text.push_str(line);
                block.char_end = line_end;
                block.line_end = line_number;
            }
            None => {
                pending = Some(TextBlock {
                    text: line.to_string(),
                    char_start: line_start,
                    char_end: line_end,
                    line_start: line_number,
                    line_end: line_number,
                });
            }
        }
    }
    blocks.extend(pending);

    for block in &mut blocks {
        block.text = block.text.trim().to_string();
    }
    blocks
}

/// Up to `chunk_overlap` trailing characters of a closed chunk, starting
/// after the first sentence end inside that window when there is one.
fn overlap_tail(chunk: &str, config: &ChunkingConfig) -> String {
    if config.chunk_overlap == 0 {
        return String::new();
    }

    let total = chunk.chars().count();
    let tail: String = chunk
        .chars()
        .skip(total.saturating_sub(config.chunk_overlap))
        .collect();

    if config.respect_sentences {
        if let Some(sentence) = sentence_start(&tail)
            .and_then(|start| tail.get(start..))
            .map(str::trim_start)
            .filter(|sentence| !sentence.is_empty())
        {
            return sentence.to_string();
        }
    }

    tail.trim_start().to_string()
}

/// Byte offset just past the first `.`, `!` or `?` that is followed by whitespace
fn sentence_start(text: &str) -> Option<usize> {
    let mut chars = text.char_indices().peekable();
    while let Some((_, c)) = chars.next() {
        if matches!(c, '.' | '!' | '?') {
            if let Some(&(next_index, next)) = chars.peek() {
                if next.is_whitespace() {
                    return Some(next_index);
                }
            }
        }
    }
    None
}

/// Consecutive `size`-item ranges covering `0..len`
fn group_ranges(len: usize, size: usize) -> Vec<Range<usize>> {
    let size = size.max(1);
    (0..len)
        .step_by(size)
        .map(|start| start..(start + size).min(len))
        .collect()
}

/// Merge a trailing range into its predecessor when it would render below
/// the size floor, so grouped content never loses rows to the floor.
fn fold_short_tail(ranges: &mut Vec<Range<usize>>, is_short: impl Fn(&Range<usize>) -> bool) {
    if ranges.len() < 2 {
        return;
    }
    let Some(last) = ranges.last() else {
        return;
    };
    if is_short(last) {
        if let Some(tail) = ranges.pop() {
            if let Some(previous) = ranges.last_mut() {
                previous.end = tail.end;
            }
        }
    }
}
