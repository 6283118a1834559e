use super::estimate_token_count as estimate_token_count_impl;
use super::*;

const FIRST_PARAGRAPH: &str =
    "The first paragraph introduces the topic. It has two sentences of moderate length.";
const SECOND_PARAGRAPH: &str =
    "Alpha beta gamma delta epsilon zeta eta theta iota. Kappa lambda mu nu xi omicron.";
const THIRD_PARAGRAPH: &str =
    "The third paragraph arrives last and pushes the running chunk beyond its size limit.";

fn customer_csv(rows: usize) -> String {
    let mut csv = String::from("id,name,email,city");
    for i in 1..=rows {
        csv.push_str(&format!(
            "\n{},Customer Number {:02},customer{:02}@example.com,Springfield",
            i, i, i
        ));
    }
    csv
}

fn parse_range(section: &str, prefix: &str) -> (usize, usize) {
    let range = section
        .strip_prefix(prefix)
        .expect("section should carry the expected prefix");
    let (start, end) = range.split_once('-').expect("range should contain a dash");
    (
        start.parse().expect("range start should be numeric"),
        end.parse().expect("range end should be numeric"),
    )
}

#[test]
fn default_config() {
    let config = ChunkingConfig::default();
    assert_eq!(config.chunk_size, 1000);
    assert_eq!(config.chunk_overlap, 200);
    assert_eq!(config.min_chunk_size, 100);
    assert!(config.respect_sentences);
    assert!(config.respect_paragraphs);
}

#[test]
fn estimate_token_count() {
    assert_eq!(estimate_token_count_impl(""), 0);
    assert_eq!(estimate_token_count_impl("abcd"), 1);
    assert_eq!(estimate_token_count_impl("abcde"), 2);
    assert_eq!(estimate_token_count_impl("ééééé"), 2);
}

#[test]
fn format_hint_from_file_type() {
    assert_eq!(FormatHint::from_file_type("csv"), FormatHint::Tabular);
    assert_eq!(FormatHint::from_file_type(".TSV"), FormatHint::Tabular);
    assert_eq!(FormatHint::from_file_type("text/csv"), FormatHint::Tabular);
    assert_eq!(
        FormatHint::from_file_type("application/json"),
        FormatHint::StructuredRecord
    );
    assert_eq!(FormatHint::from_file_type("pdf"), FormatHint::FreeText);
    assert_eq!(
        FormatHint::from_path(Path::new("exports/customers.csv")),
        FormatHint::Tabular
    );
    assert_eq!(FormatHint::from_path(Path::new("README")), FormatHint::FreeText);
}

#[test]
fn format_hint_parsing_rejects_unknown_tags() {
    assert_eq!("csv".parse::<FormatHint>(), Ok(FormatHint::Tabular));
    assert_eq!("JSON".parse::<FormatHint>(), Ok(FormatHint::StructuredRecord));
    assert_eq!("text".parse::<FormatHint>(), Ok(FormatHint::FreeText));
    assert_eq!(
        "cvs".parse::<FormatHint>(),
        Err(UnknownFormat("cvs".to_string()))
    );
    // extension lookup stays lenient
    assert_eq!(
        FormatHint::from_path(Path::new("notes.cvs")),
        FormatHint::FreeText
    );
}

#[test]
fn tabular_chunks_repeat_header_and_cover_all_rows() {
    let csv = customer_csv(12);
    let config = ChunkingConfig {
        chunk_size: 200,
        ..ChunkingConfig::default()
    };

    let chunks = chunk_document(&csv, FormatHint::Tabular, "customers.csv", &config);
    assert!(!chunks.is_empty());

    let mut next_row = 1;
    for chunk in &chunks {
        assert!(chunk.content.starts_with("id,name,email,city\n"));
        let section = chunk.metadata.section.as_deref().expect("section label");
        let (start, end) = parse_range(section, "Rows ");
        assert_eq!(start, next_row, "row ranges must be contiguous");
        assert!(end >= start);
        next_row = end + 1;

        assert_eq!(chunk.content.lines().count(), end - start + 2);
        assert_eq!(chunk.metadata.file_type, "csv");
        assert_eq!(
            chunk.metadata.columns.as_deref(),
            Some(
                &[
                    "id".to_string(),
                    "name".to_string(),
                    "email".to_string(),
                    "city".to_string()
                ][..]
            )
        );
    }
    assert_eq!(next_row, 13, "rows 1-12 must all be covered");
}

#[test]
fn tabular_line_numbers_account_for_header() {
    let csv = customer_csv(6);
    let config = ChunkingConfig {
        chunk_size: 50,
        min_chunk_size: 10,
        ..ChunkingConfig::default()
    };

    let chunks = chunk_document(&csv, FormatHint::Tabular, "customers.csv", &config);
    assert_eq!(chunks.len(), 2);
    assert_eq!(chunks[0].metadata.section.as_deref(), Some("Rows 1-5"));
    assert_eq!(chunks[0].metadata.line_start, Some(2));
    assert_eq!(chunks[0].metadata.line_end, Some(6));
    assert_eq!(chunks[1].metadata.section.as_deref(), Some("Rows 6-6"));
    assert_eq!(chunks[1].metadata.line_start, Some(7));
}

#[test]
fn tabular_short_trailing_group_is_folded() {
    let csv = customer_csv(6);
    let config = ChunkingConfig {
        chunk_size: 50,
        min_chunk_size: 100,
        ..ChunkingConfig::default()
    };

    let chunks = chunk_document(&csv, FormatHint::Tabular, "customers.csv", &config);
    assert_eq!(chunks.len(), 1);
    assert_eq!(chunks[0].metadata.section.as_deref(), Some("Rows 1-6"));
}

#[test]
fn delimiter_detection() {
    assert_eq!(detect_delimiter("a,b,c"), ',');
    assert_eq!(detect_delimiter("a;b;c;d"), ';');
    assert_eq!(detect_delimiter("a\tb\tc"), '\t');
    assert_eq!(detect_delimiter("single"), ',');
    assert_eq!(detect_delimiter("a,b;c"), ',');
}

#[test]
fn semicolon_table_records_columns() {
    let mut table = String::from("sku;label;price");
    for i in 0..8 {
        table.push_str(&format!("\nSKU-{i:04};Widget model {i};{}.99", i + 10));
    }
    let config = ChunkingConfig {
        min_chunk_size: 10,
        ..ChunkingConfig::default()
    };

    let chunks = chunk_document(&table, FormatHint::Tabular, "prices.csv", &config);
    assert_eq!(chunks.len(), 1);
    assert_eq!(
        chunks[0].metadata.columns,
        Some(vec![
            "sku".to_string(),
            "label".to_string(),
            "price".to_string()
        ])
    );
}

#[test]
fn header_only_table_falls_back_to_free_text() {
    let header = "column_one,column_two,column_three,column_four,column_five,column_six,column_seven,column_eight";
    let config = ChunkingConfig {
        min_chunk_size: 10,
        ..ChunkingConfig::default()
    };

    let chunks = chunk_document(header, FormatHint::Tabular, "empty.csv", &config);
    assert_eq!(chunks.len(), 1);
    assert_eq!(chunks[0].content, header);
    assert!(
        chunks[0]
            .metadata
            .section
            .as_deref()
            .is_some_and(|s| s.starts_with("Characters "))
    );
}

#[test]
fn structured_array_groups_items() {
    let items: Vec<serde_json::Value> = (0..20)
        .map(|i| serde_json::json!({ "id": i, "title": format!("Record number {i}") }))
        .collect();
    let content = serde_json::to_string(&items).expect("can serialize json");
    let config = ChunkingConfig {
        chunk_size: 200,
        min_chunk_size: 10,
        ..ChunkingConfig::default()
    };

    let chunks = chunk_document(&content, FormatHint::StructuredRecord, "records.json", &config);
    assert!(chunks.len() > 1);

    let mut next_item = 1;
    let mut recovered = Vec::new();
    for chunk in &chunks {
        let section = chunk.metadata.section.as_deref().expect("section label");
        let (start, end) = parse_range(section, "Items ");
        assert_eq!(start, next_item);
        next_item = end + 1;

        let group: Vec<serde_json::Value> =
            serde_json::from_str(&chunk.content).expect("chunk should be a JSON array");
        assert_eq!(group.len(), end - start + 1);
        recovered.extend(group);
    }
    assert_eq!(recovered, items);
}

#[test]
fn structured_object_falls_back_to_free_text() {
    let content = serde_json::to_string_pretty(&serde_json::json!({
        "name": "Quarterly report",
        "summary": "Revenue grew in every region while support costs declined slightly."
    }))
    .expect("can serialize json");
    let config = ChunkingConfig {
        min_chunk_size: 10,
        ..ChunkingConfig::default()
    };

    let chunks = chunk_document(&content, FormatHint::StructuredRecord, "report.json", &config);
    assert_eq!(chunks.len(), 1);
    assert_eq!(chunks[0].content, content);
    assert_eq!(chunks[0].metadata.file_type, "json");
}

#[test]
fn malformed_structured_content_falls_back_to_free_text() {
    let content = "[{\"id\": 1, \"title\": \"broken record\"}, {\"id\": 2, \"title\": ";
    let config = ChunkingConfig {
        min_chunk_size: 10,
        ..ChunkingConfig::default()
    };

    let chunks = chunk_document(content, FormatHint::StructuredRecord, "broken.json", &config);
    assert_eq!(chunks.len(), 1);
    assert_eq!(chunks[0].content, content);
}

#[test]
fn free_text_overlap_starts_after_sentence_boundary() {
    let text = format!("{FIRST_PARAGRAPH}\n\n{SECOND_PARAGRAPH}\n\n{THIRD_PARAGRAPH}");
    let config = ChunkingConfig {
        chunk_size: 200,
        chunk_overlap: 50,
        min_chunk_size: 20,
        ..ChunkingConfig::default()
    };

    let chunks = chunk_document(&text, FormatHint::FreeText, "notes.txt", &config);
    assert_eq!(chunks.len(), 2);
    assert_eq!(
        chunks[0].content,
        format!("{FIRST_PARAGRAPH}\n\n{SECOND_PARAGRAPH}")
    );
    assert_eq!(
        chunks[1].content,
        format!("Kappa lambda mu nu xi omicron.\n\n{THIRD_PARAGRAPH}")
    );
    assert_eq!(chunks[0].metadata.line_start, Some(1));
    assert_eq!(chunks[0].metadata.line_end, Some(3));
    // the seeded overlap sits on line 3
    assert_eq!(chunks[1].metadata.line_start, Some(3));
    assert_eq!(chunks[1].metadata.line_end, Some(5));
}

#[test]
fn seeded_chunk_range_covers_its_overlap() {
    let text = format!("{FIRST_PARAGRAPH}\n\n{SECOND_PARAGRAPH}\n\n{THIRD_PARAGRAPH}");
    let config = ChunkingConfig {
        chunk_size: 200,
        chunk_overlap: 50,
        min_chunk_size: 20,
        ..ChunkingConfig::default()
    };

    let chunks = chunk_document(&text, FormatHint::FreeText, "notes.txt", &config);
    assert_eq!(chunks.len(), 2);

    let section = chunks[1]
        .metadata
        .section
        .as_deref()
        .expect("free text chunks carry a character range");
    let (start, end) = parse_range(section, "Characters ");
    let overlap_start = text.find("Kappa").expect("overlap sentence is in the text");
    assert_eq!(start, overlap_start);
    assert_eq!(end, text.len());
    assert_eq!(&text[start..end], chunks[1].content);
}

#[test]
fn free_text_overlap_without_sentence_preference_uses_raw_tail() {
    let text = format!("{FIRST_PARAGRAPH}\n\n{SECOND_PARAGRAPH}\n\n{THIRD_PARAGRAPH}");
    let config = ChunkingConfig {
        chunk_size: 200,
        chunk_overlap: 50,
        min_chunk_size: 20,
        respect_sentences: false,
        ..ChunkingConfig::default()
    };

    let chunks = chunk_document(&text, FormatHint::FreeText, "notes.txt", &config);
    assert_eq!(chunks.len(), 2);
    let overlap = chunks[1]
        .content
        .strip_suffix(&format!("\n\n{THIRD_PARAGRAPH}"))
        .expect("second chunk ends with the third paragraph");
    assert!(overlap.chars().count() <= 50);
    assert!(chunks[0].content.ends_with(overlap));
    assert!(overlap.len() > "Kappa lambda mu nu xi omicron.".len());
}

#[test]
fn oversized_paragraph_is_kept_whole() {
    let oversized = "This paragraph keeps going well past the configured size. ".repeat(5);
    let oversized = oversized.trim();
    let text = format!(
        "A short opening paragraph.\n\n{oversized}\n\nA short closing paragraph."
    );
    let config = ChunkingConfig {
        chunk_size: 100,
        chunk_overlap: 0,
        min_chunk_size: 10,
        ..ChunkingConfig::default()
    };

    let chunks = chunk_document(&text, FormatHint::FreeText, "long.txt", &config);
    assert_eq!(chunks.len(), 3);
    assert_eq!(chunks[1].content, oversized);
    assert!(chunks[1].content.chars().count() > config.chunk_size);
}

#[test]
fn chunks_below_minimum_are_dropped() {
    let config = ChunkingConfig::default();
    let chunks = chunk_document("Too short to keep.", FormatHint::FreeText, "tiny.txt", &config);
    assert!(chunks.is_empty());

    let chunks = chunk_document("   \n\n  ", FormatHint::FreeText, "blank.txt", &config);
    assert!(chunks.is_empty());
}

#[test]
fn chunk_indices_and_tokens() {
    let paragraph = "Sentences about retrieval augmented generation fill this paragraph. ".repeat(4);
    let text = vec![paragraph.trim(); 6].join("\n\n");
    let config = ChunkingConfig {
        chunk_size: 400,
        chunk_overlap: 80,
        min_chunk_size: 50,
        ..ChunkingConfig::default()
    };

    let chunks = chunk_document(&text, FormatHint::FreeText, "guide.md", &config);
    assert!(chunks.len() > 1);
    for (i, chunk) in chunks.iter().enumerate() {
        assert_eq!(chunk.metadata.chunk_index, i);
        assert_eq!(
            chunk.metadata.tokens,
            chunk.content.chars().count().div_ceil(4)
        );
        assert_eq!(chunk.metadata.source_file, "guide.md");
        assert!(chunk.content.chars().count() >= config.min_chunk_size);
    }
}

#[test]
fn chunking_is_deterministic() {
    let text = format!("{FIRST_PARAGRAPH}\n\n{SECOND_PARAGRAPH}\n\n{THIRD_PARAGRAPH}");
    let config = ChunkingConfig {
        chunk_size: 120,
        chunk_overlap: 40,
        min_chunk_size: 20,
        ..ChunkingConfig::default()
    };

    let first = chunk_document(&text, FormatHint::FreeText, "notes.txt", &config);
    let second = chunk_document(&text, FormatHint::FreeText, "notes.txt", &config);
    assert_eq!(first, second);

    let csv = customer_csv(30);
    let first = chunk_document(&csv, FormatHint::Tabular, "customers.csv", &config);
    let second = chunk_document(&csv, FormatHint::Tabular, "customers.csv", &config);
    assert_eq!(first, second);
}

#[test]
fn line_mode_splits_single_lines() {
    let text = "First line with enough words to matter.\nSecond line with enough words to matter.\nThird line with enough words to matter.";
    let config = ChunkingConfig {
        chunk_size: 60,
        chunk_overlap: 0,
        min_chunk_size: 10,
        respect_paragraphs: false,
        ..ChunkingConfig::default()
    };

    let chunks = chunk_document(text, FormatHint::FreeText, "lines.txt", &config);
    assert_eq!(chunks.len(), 3);
    assert_eq!(chunks[2].content, "Third line with enough words to matter.");
    assert_eq!(chunks[2].metadata.line_start, Some(3));
}

#[test]
fn metadata_serialization_skips_empty_fields() {
    let metadata = ChunkMetadata {
        chunk_index: 2,
        source_file: "notes.txt".to_string(),
        file_type: "text".to_string(),
        section: Some("Characters 0-120".to_string()),
        line_start: None,
        line_end: None,
        page_number: None,
        columns: None,
        tokens: 30,
    };

    let json = serde_json::to_string(&metadata).expect("can serialize json");
    assert!(!json.contains("line_start"));
    assert!(!json.contains("columns"));

    let parsed: ChunkMetadata = serde_json::from_str(&json).expect("can parse json");
    assert_eq!(parsed, metadata);
}
