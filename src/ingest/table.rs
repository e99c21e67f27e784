//! In-memory delimited table.
//!
//! GDC clinical files are plain tab-separated text with a header line and no
//! quoting, so a table is just a header plus rows of strings. Every row has
//! exactly as many fields as the header.

use std::path::Path;

use crate::ingest::error::{IngestError, IngestResult};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Table {
    pub headers: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

impl Table {
    pub fn new(headers: Vec<String>) -> Self {
        Self {
            headers,
            rows: Vec::new(),
        }
    }

    /// Parse tab-separated text. `origin` names the source in errors.
    pub fn parse_tsv(text: &str, origin: &str) -> IngestResult<Self> {
        let mut lines = text.lines().enumerate();
        let headers: Vec<String> = loop {
            match lines.next() {
                Some((_, line)) if line.trim().is_empty() => continue,
                Some((_, line)) => break split_line(line),
                None => {
                    return Err(IngestError::MalformedTable {
                        file: origin.into(),
                        line: 1,
                        message: "no header line".into(),
                    });
                }
            }
        };

        let mut rows = Vec::new();
        for (idx, line) in lines {
            if line.trim().is_empty() {
                continue;
            }
            let fields = split_line(line);
            if fields.len() != headers.len() {
                return Err(IngestError::MalformedTable {
                    file: origin.into(),
                    line: idx + 1,
                    message: format!(
                        "expected {} fields, found {}",
                        headers.len(),
                        fields.len()
                    ),
                });
            }
            rows.push(fields);
        }
        Ok(Self { headers, rows })
    }

    pub fn read_tsv(path: &Path) -> IngestResult<Self> {
        let text = std::fs::read_to_string(path).map_err(|e| IngestError::io(path, e))?;
        Self::parse_tsv(&text, &path.display().to_string())
    }

    /// Render as tab-separated text. Tabs and line breaks inside a field are
    /// replaced by spaces so the output always re-parses to the same shape.
    pub fn to_tsv(&self) -> String {
        let mut out = String::new();
        push_line(&mut out, &self.headers);
        for row in &self.rows {
            push_line(&mut out, row);
        }
        out
    }

    /// Write atomically to `path`.
    pub fn write_tsv(&self, path: &Path) -> IngestResult<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| IngestError::io(parent, e))?;
        }
        crate::paths::write_atomic(path, self.to_tsv().as_bytes())
            .map_err(|e| IngestError::io(path, e))
    }

    pub fn column(&self, name: &str) -> Option<usize> {
        self.headers.iter().position(|h| h == name)
    }

    /// Like [`Table::column`], but a missing column is an error naming `origin`.
    pub fn require_column(&self, name: &str, origin: &str) -> IngestResult<usize> {
        self.column(name).ok_or_else(|| IngestError::MissingColumn {
            column: name.into(),
            file: origin.into(),
        })
    }

    /// Values of one column, in row order.
    pub fn values<'a>(&'a self, col: usize) -> impl Iterator<Item = &'a str> + 'a {
        self.rows.iter().map(move |r| r[col].as_str())
    }

    /// Append a column whose value for each row is computed by `f`. An
    /// existing column of the same name is overwritten instead.
    pub fn set_column(&mut self, name: &str, mut f: impl FnMut(&[String]) -> String) {
        match self.column(name) {
            Some(idx) => {
                for row in &mut self.rows {
                    row[idx] = f(row);
                }
            }
            None => {
                self.headers.push(name.to_string());
                for row in &mut self.rows {
                    let value = f(row);
                    row.push(value);
                }
            }
        }
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

fn split_line(line: &str) -> Vec<String> {
    line.trim_end_matches('\r')
        .split('\t')
        .map(str::to_string)
        .collect()
}

fn push_line(out: &mut String, fields: &[String]) {
    for (i, field) in fields.iter().enumerate() {
        if i > 0 {
            out.push('\t');
        }
        if field.contains(['\t', '\n', '\r']) {
            out.push_str(&field.replace(['\t', '\n', '\r'], " "));
        } else {
            out.push_str(field);
        }
    }
    out.push('\n');
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = "cases.submitter_id\tdemographic.gender\tdiagnoses.primary_diagnosis\r\n\
AD1004\tmale\tSquamous cell carcinoma, NOS\r\n\
\r\n\
AD10038\tfemale\tAdenocarcinoma, NOS\r\n";

    #[test]
    fn parses_header_and_rows() {
        let table = Table::parse_tsv(SAMPLE, "sample").unwrap();
        assert_eq!(table.headers.len(), 3);
        assert_eq!(table.len(), 2);
        assert_eq!(table.rows[0][2], "Squamous cell carcinoma, NOS");
        assert_eq!(table.column("demographic.gender"), Some(1));
    }

    #[test]
    fn ragged_row_is_rejected() {
        let err = Table::parse_tsv("a\tb\n1\t2\t3\n", "ragged").unwrap_err();
        assert!(matches!(err, IngestError::MalformedTable { line: 2, .. }));
    }

    #[test]
    fn empty_input_has_no_header() {
        assert!(Table::parse_tsv("\n\n", "empty").is_err());
    }

    #[test]
    fn set_column_appends_then_overwrites() {
        let mut table = Table::parse_tsv(SAMPLE, "sample").unwrap();
        table.set_column("ncit_code", |_| "NO_MATCH".into());
        assert_eq!(table.headers.last().unwrap(), "ncit_code");
        table.set_column("ncit_code", |row| format!("code-{}", row[0]));
        assert_eq!(table.headers.len(), 4);
        assert_eq!(table.rows[1][3], "code-AD10038");
    }

    #[test]
    fn embedded_tabs_do_not_break_the_shape() {
        let mut table = Table::new(vec!["id".into(), "note".into()]);
        table.rows.push(vec!["1".into(), "a\tb\nc".into()]);
        let text = table.to_tsv();
        let back = Table::parse_tsv(&text, "memory").unwrap();
        assert_eq!(back.rows[0][1], "a b c");
    }

    #[test]
    fn write_then_read_file() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("processed/merged.tsv");
        let table = Table::parse_tsv(SAMPLE, "sample").unwrap();
        table.write_tsv(&path).unwrap();
        assert_eq!(Table::read_tsv(&path).unwrap(), table);
    }
}
