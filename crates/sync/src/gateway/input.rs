//! Files handed to the extraction gateway.

use std::path::Path;

use base64::Engine;
use base64::engine::general_purpose::STANDARD;

use super::error::InputError;

/// What the extraction gateway reads.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExtractionInput {
    /// A spreadsheet photo.
    Image {
        /// MIME type, e.g. "image/jpeg".
        media_type: String,
        /// Base64-encoded image bytes.
        data: String,
    },
    /// Raw CSV text.
    Csv(String),
}

impl ExtractionInput {
    /// Short label for logs.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::Image { .. } => "image",
            Self::Csv(_) => "csv",
        }
    }
}

/// A named input, one per uploaded file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InputFile {
    /// File name shown in progress and failure reports.
    pub name: String,
    pub input: ExtractionInput,
}

impl InputFile {
    /// A CSV input.
    #[must_use]
    pub fn csv(name: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            input: ExtractionInput::Csv(text.into()),
        }
    }

    /// An image input from raw bytes.
    #[must_use]
    pub fn image(name: impl Into<String>, media_type: impl Into<String>, bytes: &[u8]) -> Self {
        Self {
            name: name.into(),
            input: ExtractionInput::Image {
                media_type: media_type.into(),
                data: STANDARD.encode(bytes),
            },
        }
    }

    /// Build an input from a file name and its contents, choosing CSV or
    /// image by extension.
    ///
    /// # Errors
    ///
    /// Returns `InputError::Unsupported` for unknown extensions and
    /// `InputError::NotUtf8` for CSV files that are not valid UTF-8.
    pub fn from_bytes(name: &str, bytes: Vec<u8>) -> Result<Self, InputError> {
        let path = Path::new(name);
        match classify(path) {
            Some(Kind::Text) => {
                let text = String::from_utf8(bytes).map_err(|_| InputError::NotUtf8 {
                    path: path.to_path_buf(),
                })?;
                // Excel exports often start with a byte order mark.
                let text = text
                    .strip_prefix('\u{feff}')
                    .map(str::to_string)
                    .unwrap_or(text);
                Ok(Self::csv(name, text))
            }
            Some(Kind::Image(media_type)) => Ok(Self::image(name, media_type, &bytes)),
            None => Err(InputError::Unsupported {
                path: path.to_path_buf(),
            }),
        }
    }

    /// Read a file from disk.
    ///
    /// # Errors
    ///
    /// Returns `InputError` if the file type is unsupported or the file
    /// cannot be read.
    pub async fn from_path(path: &Path) -> Result<Self, InputError> {
        if classify(path).is_none() {
            return Err(InputError::Unsupported {
                path: path.to_path_buf(),
            });
        }

        let bytes = tokio::fs::read(path).await.map_err(|source| InputError::Io {
            path: path.to_path_buf(),
            source,
        })?;

        let name = path
            .file_name()
            .map_or_else(|| path.display().to_string(), |n| n.to_string_lossy().into_owned());
        Self::from_bytes(&name, bytes)
    }
}

enum Kind {
    Text,
    Image(&'static str),
}

fn classify(path: &Path) -> Option<Kind> {
    let extension = path.extension()?.to_str()?.to_ascii_lowercase();
    match extension.as_str() {
        "csv" | "tsv" | "txt" => Some(Kind::Text),
        "png" => Some(Kind::Image("image/png")),
        "jpg" | "jpeg" => Some(Kind::Image("image/jpeg")),
        "gif" => Some(Kind::Image("image/gif")),
        "webp" => Some(Kind::Image("image/webp")),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_csv_by_extension() {
        let file = InputFile::from_bytes("Customers.CSV", b"id,name\n1,Lin\n".to_vec())
            .expect("csv input");
        assert_eq!(file.input, ExtractionInput::Csv("id,name\n1,Lin\n".to_string()));
        assert_eq!(file.input.kind(), "csv");
    }

    #[test]
    fn test_csv_strips_byte_order_mark() {
        let file = InputFile::from_bytes("a.csv", "\u{feff}id\n1\n".as_bytes().to_vec())
            .expect("csv input");
        assert_eq!(file.input, ExtractionInput::Csv("id\n1\n".to_string()));
    }

    #[test]
    fn test_image_by_extension() {
        let file = InputFile::from_bytes("sheet.jpeg", b"hello".to_vec()).expect("image input");
        assert_eq!(
            file.input,
            ExtractionInput::Image {
                media_type: "image/jpeg".to_string(),
                data: "aGVsbG8=".to_string(),
            }
        );
    }

    #[test]
    fn test_unsupported_extension() {
        let result = InputFile::from_bytes("sheet.xlsx", Vec::new());
        assert!(matches!(result, Err(InputError::Unsupported { .. })));

        let result = InputFile::from_bytes("no_extension", Vec::new());
        assert!(matches!(result, Err(InputError::Unsupported { .. })));
    }

    #[test]
    fn test_csv_must_be_utf8() {
        let result = InputFile::from_bytes("a.csv", vec![0xff, 0xfe, 0x00]);
        assert!(matches!(result, Err(InputError::NotUtf8 { .. })));
    }

    #[tokio::test]
    async fn test_from_path_reads_file() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("batch.csv");
        tokio::fs::write(&path, "id,city\n7,Hualien\n")
            .await
            .expect("write");

        let file = InputFile::from_path(&path).await.expect("input");
        assert_eq!(file.name, "batch.csv");
        assert_eq!(file.input.kind(), "csv");
    }

    #[tokio::test]
    async fn test_from_path_missing_file() {
        let dir = tempfile::tempdir().expect("tempdir");
        let result = InputFile::from_path(&dir.path().join("missing.png")).await;
        assert!(matches!(result, Err(InputError::Io { .. })));
    }
}
