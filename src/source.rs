use crate::error::SourceError;
use csv::StringRecord;
use std::fs::File;
use std::path::Path;

/// One input CSV file, fully loaded.
///
/// All records are read when the source is opened, so a malformed file is
/// rejected before any of its URLs are downloaded. Rows shorter than the
/// header are accepted; rows longer than it reject the file.
#[derive(Debug)]
pub struct CsvSource {
    id: String,
    headers: StringRecord,
    records: Vec<StringRecord>,
}

impl CsvSource {
    pub fn open(path: &Path) -> Result<Self, SourceError> {
        let file = File::open(path).map_err(|source| SourceError::Open {
            path: path.to_path_buf(),
            source,
        })?;
        let parse_err = |source: csv::Error| SourceError::Parse {
            path: path.to_path_buf(),
            source,
        };

        // Short rows are fine, their missing cells read as blank
        let mut reader = csv::ReaderBuilder::new().flexible(true).from_reader(file);
        let headers = reader.headers().map_err(parse_err)?.clone();
        let records = reader
            .records()
            .collect::<Result<Vec<_>, _>>()
            .map_err(parse_err)?;

        if let Some(record) = records.iter().find(|record| record.len() > headers.len()) {
            return Err(SourceError::TooManyFields {
                path: path.to_path_buf(),
                line: record.position().map_or(0, |pos| pos.line()),
                found: record.len(),
                expected: headers.len(),
            });
        }

        Ok(Self {
            id: source_id(path),
            headers,
            records,
        })
    }

    /// File name of the source, recorded in tracking entries.
    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.column_index(name).is_some()
    }

    pub fn records(&self) -> &[StringRecord] {
        &self.records
    }

    /// Trimmed value of `column` in `record`, `None` when absent or blank.
    pub fn value<'a>(&self, record: &'a StringRecord, column: &str) -> Option<&'a str> {
        let index = self.column_index(column)?;
        record
            .get(index)
            .map(str::trim)
            .filter(|value| !value.is_empty())
    }

    fn column_index(&self, name: &str) -> Option<usize> {
        self.headers.iter().position(|header| header == name)
    }
}

fn source_id(path: &Path) -> String {
    path.file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}
