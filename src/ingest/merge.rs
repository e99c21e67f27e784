//! Merge of per-case clinical files into one unified table.

use std::path::{Path, PathBuf};

use regex::Regex;

use crate::ingest::error::{IngestError, IngestResult};
use crate::ingest::table::Table;

/// Compile a `*`-wildcard file pattern (e.g. `FM-AD*.tsv`) into a regex
/// anchored on the whole file name.
pub fn pattern_regex(pattern: &str) -> Regex {
    let escaped = regex::escape(pattern).replace(r"\*", ".*");
    Regex::new(&format!("^{escaped}$")).expect("escaped pattern is a valid regex")
}

/// Files directly inside `dir` whose names match `pattern`, sorted by name.
pub fn matching_files(dir: &Path, pattern: &str) -> IngestResult<Vec<PathBuf>> {
    let re = pattern_regex(pattern);
    let mut files = Vec::new();
    for entry in std::fs::read_dir(dir).map_err(|e| IngestError::io(dir, e))? {
        let path = entry.map_err(|e| IngestError::io(dir, e))?.path();
        if !path.is_file() {
            continue;
        }
        if path
            .file_name()
            .and_then(|n| n.to_str())
            .is_some_and(|n| re.is_match(n))
        {
            files.push(path);
        }
    }
    files.sort();
    Ok(files)
}

/// Stack `next` below `merged`.
///
/// Both must have the same column set. When the columns match but are
/// ordered differently, `next` is reordered to `merged`'s header.
pub fn stack(merged: &mut Table, next: Table, origin: &str) -> IngestResult<()> {
    if merged.headers == next.headers {
        merged.rows.extend(next.rows);
        return Ok(());
    }

    let mut expected = merged.headers.clone();
    let mut actual = next.headers.clone();
    expected.sort();
    actual.sort();
    if expected != actual || has_duplicates(&expected) {
        return Err(IngestError::SchemaMismatch {
            file: origin.into(),
            expected: merged.headers.clone(),
            actual: next.headers,
        });
    }

    let order: Vec<usize> = merged
        .headers
        .iter()
        .filter_map(|h| next.headers.iter().position(|n| n == h))
        .collect();
    for row in next.rows {
        merged.rows.push(order.iter().map(|&i| row[i].clone()).collect());
    }
    Ok(())
}

fn has_duplicates(sorted: &[String]) -> bool {
    sorted.windows(2).any(|w| w[0] == w[1])
}

/// Read every file in `dir` matching `pattern` and stack the rows.
pub fn merge_tables(dir: &Path, pattern: &str) -> IngestResult<Table> {
    let files = matching_files(dir, pattern)?;
    if files.is_empty() {
        return Err(IngestError::NoInputFiles {
            dir: dir.display().to_string(),
            pattern: pattern.into(),
        });
    }

    let mut merged = Table::read_tsv(&files[0])?;
    for file in &files[1..] {
        let table = Table::read_tsv(file)?;
        tracing::debug!(file = %file.display(), rows = table.len(), "read clinical file");
        stack(&mut merged, table, &file.display().to_string())?;
    }

    tracing::info!(files = files.len(), rows = merged.len(), "clinical files merged");
    Ok(merged)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write(dir: &Path, name: &str, body: &str) {
        std::fs::write(dir.join(name), body).unwrap();
    }

    #[test]
    fn pattern_matches_whole_name() {
        let re = pattern_regex("FM-AD*.tsv");
        assert!(re.is_match("FM-AD_clinical.FM-AD1004.tsv"));
        assert!(!re.is_match("FM-AD_clinical.tsv.bak"));
        assert!(!re.is_match("MANIFEST.txt"));
        assert!(pattern_regex("a.b").is_match("a.b"));
        assert!(!pattern_regex("a.b").is_match("axb"));
    }

    #[test]
    fn stacks_rows_from_matching_files_only() {
        let dir = tempfile::TempDir::new().unwrap();
        write(dir.path(), "FM-AD_1.tsv", "id\tsite\nAD1\tSkin\n");
        write(dir.path(), "FM-AD_2.tsv", "id\tsite\nAD2\tColon\nAD3\tLung\n");
        write(dir.path(), "MANIFEST.txt", "ignored");

        let table = merge_tables(dir.path(), "FM-AD*.tsv").unwrap();
        assert_eq!(table.headers, vec!["id", "site"]);
        assert_eq!(table.len(), 3);
        assert_eq!(table.rows[0][0], "AD1");
        assert_eq!(table.rows[2][0], "AD3");
    }

    #[test]
    fn reordered_columns_are_aligned_by_name() {
        let dir = tempfile::TempDir::new().unwrap();
        write(dir.path(), "FM-AD_1.tsv", "id\tsite\nAD1\tSkin\n");
        write(dir.path(), "FM-AD_2.tsv", "site\tid\nColon\tAD2\n");

        let table = merge_tables(dir.path(), "FM-AD*.tsv").unwrap();
        assert_eq!(table.rows[1], vec!["AD2".to_string(), "Colon".to_string()]);
    }

    #[test]
    fn column_set_mismatch_is_fatal() {
        let dir = tempfile::TempDir::new().unwrap();
        write(dir.path(), "FM-AD_1.tsv", "id\tsite\nAD1\tSkin\n");
        write(dir.path(), "FM-AD_2.tsv", "id\tgender\nAD2\tmale\n");

        let err = merge_tables(dir.path(), "FM-AD*.tsv").unwrap_err();
        assert!(matches!(err, IngestError::SchemaMismatch { .. }));
    }

    #[test]
    fn no_matching_files_is_an_error() {
        let dir = tempfile::TempDir::new().unwrap();
        let err = merge_tables(dir.path(), "FM-AD*.tsv").unwrap_err();
        assert!(matches!(err, IngestError::NoInputFiles { .. }));
    }
}
