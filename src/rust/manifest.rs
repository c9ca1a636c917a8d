//! Reading of tab-separated `(label, image path)` manifests.
//!
//! A manifest starts with a header row followed by one record per line:
//!
//! ```text
//! Label<TAB>ImageSource
//! siamese<TAB>/img/a.jpg
//! maine_coon<TAB>/img/b.jpg
//! ```
//!
//! Records are produced lazily; reading the same path again restarts the sequence.

use std::fs::File;
use std::io;
use std::path::{Path, PathBuf};

use csv::{ErrorKind, Reader, ReaderBuilder, StringRecord, StringRecordsIntoIter};
use log::{debug, warn};

use crate::error::{PipelineError, Result};

const SEPARATOR: u8 = b'\t';

/// Kind of value a manifest column holds
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    /// Opaque text, used verbatim
    Text,
    /// Filesystem path, resolved against the manifest's directory when relative
    Path,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldDescriptor {
    pub name: String,
    pub kind: FieldKind,
}

impl FieldDescriptor {
    pub fn new(name: impl Into<String>, kind: FieldKind) -> Self {
        Self {
            name: name.into(),
            kind,
        }
    }
}

/// Ordered column layout of a manifest.
///
/// The reader requires exactly one `Text` column (the label) and one `Path`
/// column (the image source), in any order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ManifestSchema {
    fields: Vec<FieldDescriptor>,
    label_index: usize,
    path_index: usize,
}

impl ManifestSchema {
    pub fn new(fields: Vec<FieldDescriptor>) -> Result<Self> {
        let position = |kind: FieldKind| {
            let mut matches = fields.iter().enumerate().filter(|(_, f)| f.kind == kind);
            match (matches.next(), matches.next()) {
                (Some((i, _)), None) => Ok(i),
                _ => Err(PipelineError::InvalidConfig(format!(
                    "Manifest schema needs exactly one {:?} column",
                    kind
                ))),
            }
        };
        let label_index = position(FieldKind::Text)?;
        let path_index = position(FieldKind::Path)?;
        Ok(Self {
            fields,
            label_index,
            path_index,
        })
    }

    pub fn fields(&self) -> &[FieldDescriptor] {
        &self.fields
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Tab-joined header line for this schema
    pub fn header(&self) -> String {
        self.fields
            .iter()
            .map(|f| f.name.as_str())
            .collect::<Vec<_>>()
            .join("\t")
    }
}

impl Default for ManifestSchema {
    fn default() -> Self {
        Self {
            fields: vec![
                FieldDescriptor::new("Label", FieldKind::Text),
                FieldDescriptor::new("ImageSource", FieldKind::Path),
            ],
            label_index: 0,
            path_index: 1,
        }
    }
}

/// One labeled image reference from a manifest
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ManifestRecord {
    pub label: String,
    pub image_path: PathBuf,
}

impl ManifestRecord {
    pub fn new(label: impl Into<String>, image_path: impl Into<PathBuf>) -> Self {
        Self {
            label: label.into(),
            image_path: image_path.into(),
        }
    }

    /// Builds a single-record input for an image that is not listed in any manifest.
    ///
    /// The label is the file name, the path is canonicalised.
    pub fn adhoc(image_path: &Path) -> Result<Self> {
        let full_path = image_path.canonicalize().map_err(|e| {
            if e.kind() == io::ErrorKind::NotFound {
                PipelineError::ImageDecodeError {
                    path: image_path.to_path_buf(),
                    reason: "file does not exist".into(),
                }
            } else {
                PipelineError::Io(e)
            }
        })?;
        let label = full_path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_default();
        Ok(Self::new(label, full_path))
    }
}

/// Parses manifests against a fixed schema
#[derive(Debug, Clone, Default)]
pub struct ManifestReader {
    schema: ManifestSchema,
}

impl ManifestReader {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_schema(schema: ManifestSchema) -> Self {
        Self { schema }
    }

    pub fn schema(&self) -> &ManifestSchema {
        &self.schema
    }

    /// Opens a manifest and returns a lazy iterator over its records.
    ///
    /// # Errors
    /// - `ManifestNotFound` if the file does not exist
    /// - `MalformedManifest` if the header has the wrong number of fields
    ///
    /// Per-line errors are yielded by the iterator.
    pub fn read(&self, path: impl AsRef<Path>) -> Result<ManifestRecords> {
        let path = path.as_ref();
        let file = File::open(path).map_err(|e| {
            if e.kind() == io::ErrorKind::NotFound {
                PipelineError::ManifestNotFound {
                    path: path.to_path_buf(),
                }
            } else {
                PipelineError::Io(e)
            }
        })?;
        let base_dir = path
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_default();

        let mut reader = ReaderBuilder::new()
            .delimiter(SEPARATOR)
            .has_headers(true)
            .flexible(true)
            .from_reader(file);
        check_header(&mut reader, path, &self.schema)?;

        Ok(ManifestRecords {
            records: reader.into_records(),
            path: path.to_path_buf(),
            base_dir,
            schema: self.schema.clone(),
            last_line: 1,
            failed: false,
        })
    }

    /// Reads every record, stopping at the first error
    pub fn read_all(&self, path: impl AsRef<Path>) -> Result<Vec<ManifestRecord>> {
        self.read(path)?.collect()
    }
}

fn check_header(reader: &mut Reader<File>, path: &Path, schema: &ManifestSchema) -> Result<()> {
    let header = reader
        .headers()
        .map_err(|e| csv_error(path, 1, e))?;
    // An empty file has no records
    if header.is_empty() {
        return Ok(());
    }

    if header.len() != schema.len() {
        return Err(PipelineError::MalformedManifest {
            path: path.to_path_buf(),
            line: 1,
            reason: format!(
                "header must have {} fields ({}), found {}",
                schema.len(),
                schema.header(),
                header.len()
            ),
        });
    }
    for (column, field) in header.iter().zip(schema.fields()) {
        if !column.eq_ignore_ascii_case(&field.name) {
            warn!(
                "Manifest {:?} column '{}' does not match expected '{}'",
                path, column, field.name
            );
        }
    }
    Ok(())
}

/// Maps a reader error onto the manifest error taxonomy
fn csv_error(path: &Path, fallback_line: usize, err: csv::Error) -> PipelineError {
    let line = err
        .position()
        .map(|pos| pos.line() as usize)
        .unwrap_or(fallback_line);
    let message = err.to_string();
    match err.into_kind() {
        ErrorKind::Io(e) => PipelineError::Io(e),
        ErrorKind::Utf8 { err, .. } => PipelineError::MalformedManifest {
            path: path.to_path_buf(),
            line,
            reason: format!("not valid UTF-8: {}", err),
        },
        _ => PipelineError::MalformedManifest {
            path: path.to_path_buf(),
            line,
            reason: message,
        },
    }
}

/// Lazy sequence of records from one manifest file
pub struct ManifestRecords {
    records: StringRecordsIntoIter<File>,
    path: PathBuf,
    base_dir: PathBuf,
    schema: ManifestSchema,
    /// Line of the last record handed out, used when an error carries no position
    last_line: usize,
    failed: bool,
}

impl ManifestRecords {
    fn parse_record(&self, record: &StringRecord, line: usize) -> Result<ManifestRecord> {
        let malformed = |reason: String| PipelineError::MalformedManifest {
            path: self.path.clone(),
            line,
            reason,
        };
        if record.len() != self.schema.len() {
            return Err(malformed(format!(
                "expected {} fields, found {}",
                self.schema.len(),
                record.len()
            )));
        }

        let label = record[self.schema.label_index].to_string();
        let raw_path = &record[self.schema.path_index];
        if raw_path.is_empty() {
            return Err(malformed("image path is empty".into()));
        }
        let image_path = PathBuf::from(raw_path);
        let image_path = if image_path.is_relative() {
            self.base_dir.join(image_path)
        } else {
            image_path
        };

        Ok(ManifestRecord { label, image_path })
    }
}

impl std::fmt::Debug for ManifestRecords {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ManifestRecords")
            .field("path", &self.path)
            .field("last_line", &self.last_line)
            .field("failed", &self.failed)
            .finish()
    }
}

impl Iterator for ManifestRecords {
    type Item = Result<ManifestRecord>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed {
            return None;
        }
        let record = match self.records.next()? {
            Ok(record) => record,
            Err(e) => {
                self.failed = true;
                return Some(Err(csv_error(&self.path, self.last_line + 1, e)));
            }
        };
        let line = record
            .position()
            .map(|pos| pos.line() as usize)
            .unwrap_or(self.last_line + 1);
        self.last_line = line;

        let parsed = self.parse_record(&record, line);
        if parsed.is_err() {
            self.failed = true;
        } else {
            debug!("Manifest line {}: {:?}", line, parsed);
        }
        Some(parsed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn write_manifest(dir: &TempDir, contents: &str) -> PathBuf {
        let path = dir.path().join("manifest.tsv");
        fs::write(&path, contents).unwrap();
        path
    }

    #[test]
    fn test_reads_records_in_file_order() {
        let dir = TempDir::new().unwrap();
        let path = write_manifest(
            &dir,
            "Label\tImageSource\nsiamese\t/img/a.jpg\nmaine_coon\t/img/b.jpg\n",
        );

        let records = ManifestReader::new().read_all(&path).unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].label, "siamese");
        assert_eq!(records[0].image_path, PathBuf::from("/img/a.jpg"));
        assert_eq!(records[1].label, "maine_coon");
    }

    #[test]
    fn test_wrong_field_count_names_line() {
        let dir = TempDir::new().unwrap();
        let path = write_manifest(
            &dir,
            "Label\tImageSource\nsiamese\t/img/a.jpg\nbroken-row\n",
        );

        let mut records = ManifestReader::new().read(&path).unwrap();
        assert!(records.next().unwrap().is_ok());
        match records.next() {
            Some(Err(PipelineError::MalformedManifest { line, .. })) => assert_eq!(line, 3),
            other => panic!("expected MalformedManifest, got {:?}", other),
        }
        assert!(records.next().is_none());
    }

    #[test]
    fn test_missing_file() {
        let result = ManifestReader::new().read("/definitely/not/here.tsv");
        assert!(matches!(result, Err(PipelineError::ManifestNotFound { .. })));
    }

    #[test]
    fn test_empty_and_header_only_files() {
        let dir = TempDir::new().unwrap();
        let path = write_manifest(&dir, "");
        assert!(ManifestReader::new().read_all(&path).unwrap().is_empty());

        let path = write_manifest(&dir, "Label\tImageSource\n");
        assert!(ManifestReader::new().read_all(&path).unwrap().is_empty());
    }

    #[test]
    fn test_bad_header() {
        let dir = TempDir::new().unwrap();
        let path = write_manifest(&dir, "Label ImageSource\nsiamese\t/img/a.jpg\n");
        let result = ManifestReader::new().read(&path);
        assert!(matches!(
            result,
            Err(PipelineError::MalformedManifest { line: 1, .. })
        ));
    }

    #[test]
    fn test_relative_paths_quotes_and_crlf() {
        let dir = TempDir::new().unwrap();
        let path = write_manifest(
            &dir,
            "Label\tImageSource\r\n\"bengal\"\timages/c.png\r\n\r\nsphynx\t\"d e.png\"\r\n",
        );

        let records = ManifestReader::new().read_all(&path).unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].label, "bengal");
        assert_eq!(records[0].image_path, dir.path().join("images/c.png"));
        assert_eq!(records[1].image_path, dir.path().join("d e.png"));
    }

    #[test]
    fn test_quoted_field_may_contain_tab() {
        let dir = TempDir::new().unwrap();
        let path = write_manifest(
            &dir,
            "Label\tImageSource\n\"tabby\tcat\"\t/img/a.jpg\n\"say \"\"meow\"\"\"\t/img/b.jpg\n",
        );

        let records = ManifestReader::new().read_all(&path).unwrap();
        assert_eq!(
            records,
            vec![
                ManifestRecord::new("tabby\tcat", "/img/a.jpg"),
                ManifestRecord::new("say \"meow\"", "/img/b.jpg"),
            ]
        );
    }

    #[test]
    fn test_invalid_utf8_names_line() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("manifest.tsv");
        fs::write(&path, b"Label\tImageSource\nsiamese\t/img/a.jpg\nbad\xff\t/img/b.jpg\n").unwrap();

        let mut records = ManifestReader::new().read(&path).unwrap();
        assert!(records.next().unwrap().is_ok());
        match records.next() {
            Some(Err(PipelineError::MalformedManifest { line, .. })) => assert_eq!(line, 3),
            other => panic!("expected MalformedManifest, got {:?}", other),
        }
        assert!(records.next().is_none());
    }

    #[test]
    fn test_custom_schema_order() {
        let schema = ManifestSchema::new(vec![
            FieldDescriptor::new("ImageSource", FieldKind::Path),
            FieldDescriptor::new("Label", FieldKind::Text),
        ])
        .unwrap();
        let dir = TempDir::new().unwrap();
        let path = write_manifest(&dir, "ImageSource\tLabel\n/img/a.jpg\tsiamese\n");

        let records = ManifestReader::with_schema(schema).read_all(&path).unwrap();
        assert_eq!(records[0], ManifestRecord::new("siamese", "/img/a.jpg"));
    }

    #[test]
    fn test_schema_requires_label_and_path() {
        let result = ManifestSchema::new(vec![
            FieldDescriptor::new("Label", FieldKind::Text),
            FieldDescriptor::new("Other", FieldKind::Text),
        ]);
        assert!(matches!(result, Err(PipelineError::InvalidConfig(_))));
    }

    #[test]
    fn test_adhoc_record_uses_file_name() {
        let dir = TempDir::new().unwrap();
        let image = dir.path().join("tabby.png");
        fs::write(&image, b"not really a png").unwrap();

        let record = ManifestRecord::adhoc(&image).unwrap();
        assert_eq!(record.label, "tabby.png");
        assert!(record.image_path.is_absolute());

        let missing = ManifestRecord::adhoc(&dir.path().join("missing.png"));
        assert!(matches!(missing, Err(PipelineError::ImageDecodeError { .. })));
    }
}
