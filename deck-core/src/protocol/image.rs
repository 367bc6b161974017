//! Base64 data URLs for `setImage`.
//!
//! The host accepts images as `data:<mime>;base64,<bytes>`; SVG may also be
//! sent as plain markup, which needs none of this.

use std::path::Path;

use base64::{Engine, engine::general_purpose::STANDARD as BASE64};
use mime_guess::Mime;
use tokio::fs as TokioFs;

use crate::error::{DeckError, DeckResult};

/// Encode image bytes of a known MIME type.
#[must_use]
pub fn image_bytes_to_data_url(bytes: &[u8], mime: &str) -> String {
    format!("data:{mime};base64,{}", BASE64.encode(bytes))
}

/// Read an image file and encode it, taking the MIME type from the extension.
///
/// # Errors
///
/// `InvalidSendPayload` when the extension maps to no known type, `Io` when
/// the file cannot be read.
pub async fn image_file_to_data_url(path: &Path) -> DeckResult<String> {
    let mime: Mime = mime_guess::from_path(path).first().ok_or_else(|| {
        DeckError::invalid_send(format!("cannot tell the image type of {}", path.display()))
    })?;
    let bytes: Vec<u8> = TokioFs::read(path).await?;

    Ok(image_bytes_to_data_url(&bytes, mime.essence_str()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::outbound::SetImagePayload;

    #[test]
    fn test_bytes_become_a_data_url() {
        let url: String = image_bytes_to_data_url(&[0x89, b'P', b'N', b'G'], "image/png");
        assert_eq!(url, "data:image/png;base64,iVBORw==");

        assert_eq!(image_bytes_to_data_url(&[], "image/jpeg"), "data:image/jpeg;base64,");
    }

    #[tokio::test]
    async fn test_file_type_follows_extension() {
        let dir: tempfile::TempDir = tempfile::tempdir().unwrap();
        let path: std::path::PathBuf = dir.path().join("icon.svg");
        std::fs::write(&path, "<svg/>").unwrap();

        let url: String = image_file_to_data_url(&path).await.unwrap();
        assert_eq!(url, "data:image/svg+xml;base64,PHN2Zy8+");
        assert_eq!(SetImagePayload::new(url.as_str()).image, url);
    }

    #[tokio::test]
    async fn test_unknown_extension_and_missing_file_are_errors() {
        let dir: tempfile::TempDir = tempfile::tempdir().unwrap();

        let unknown: std::path::PathBuf = dir.path().join("icon.notanimage");
        std::fs::write(&unknown, [1u8, 2, 3]).unwrap();
        assert!(matches!(
            image_file_to_data_url(&unknown).await,
            Err(DeckError::InvalidSendPayload { .. })
        ));

        assert!(matches!(
            image_file_to_data_url(&dir.path().join("gone.png")).await,
            Err(DeckError::Io(_))
        ));
    }
}
