//! Output formatting for search results.
//!
//! Human output is a compact ranked list with `path:line` locators; `--json`
//! emits an array of `{meta, score}` records for scripting.

use sift_core::SearchResult;

/// Formats results for the terminal.
pub fn format_human(results: &[SearchResult]) -> String {
    if results.is_empty() {
        return "no results".to_string();
    }

    let mut out = String::new();
    for (i, r) in results.iter().enumerate() {
        out.push_str(&format!(
            "{:2}  {:.3}  {}:{}\n    {}\n\n",
            i + 1,
            r.score,
            r.meta.path.display(),
            r.meta.line_num,
            r.meta.text
        ));
    }
    out.trim_end().to_string()
}

/// Formats results as a JSON array of `{meta, score}` records.
pub fn format_json(results: &[SearchResult]) -> anyhow::Result<String> {
    Ok(serde_json::to_string_pretty(results)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use sift_core::ChunkMeta;
    use std::path::PathBuf;

    fn result(path: &str, line: usize, score: f32) -> SearchResult {
        SearchResult {
            meta: ChunkMeta {
                path: PathBuf::from(path),
                line_num: line,
                start_byte: 0,
                end_byte: 42,
                chunk_index: 0,
                text: "snippet text".to_string(),
                mtime: 0,
            },
            score,
        }
    }

    #[test]
    fn test_human_empty() {
        assert_eq!(format_human(&[]), "no results");
    }

    #[test]
    fn test_human_lists_locator_and_score() {
        let out = format_human(&[result("src/main.rs", 12, 0.812)]);
        assert!(out.contains("0.812"));
        assert!(out.contains("src/main.rs:12"));
        assert!(out.contains("snippet text"));
    }

    #[test]
    fn test_json_shape() {
        let out = format_json(&[result("a.md", 3, 0.5)]).unwrap();
        assert!(out.trim_start().starts_with('['));
        assert!(out.contains("\"meta\""));
        assert!(out.contains("\"score\""));
        assert!(out.contains("\"line_num\": 3"));
    }

    #[test]
    fn test_json_empty_is_empty_array() {
        assert_eq!(format_json(&[]).unwrap(), "[]");
    }
}
