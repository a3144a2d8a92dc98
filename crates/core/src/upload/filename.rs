use crate::error::ConversionError;

/// Longest sanitised stem kept for output names.
const MAX_STEM_CHARS: usize = 100;

/// A client-supplied filename after validation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientFilename {
    /// Name exactly as the client sent it.
    pub original: String,
    /// Filesystem-safe stem used to name outputs.
    pub stem: String,
    /// Lower-cased suffix after the last `.`, if any.
    pub extension: Option<String>,
}

impl ClientFilename {
    /// Validate a client filename.
    ///
    /// Rejects empty names, names made only of dots, and anything carrying a
    /// path separator or NUL byte.
    pub fn parse(name: &str) -> Result<Self, ConversionError> {
        let trimmed = name.trim();
        if trimmed.is_empty() {
            return Err(ConversionError::invalid_filename("filename is empty"));
        }
        if trimmed.chars().all(|c| c == '.') {
            return Err(ConversionError::invalid_filename(
                "filename cannot consist only of dots",
            ));
        }
        if trimmed.contains(['/', '\\', '\0']) {
            return Err(ConversionError::invalid_filename(format!(
                "filename '{}' contains a path component",
                trimmed.escape_default()
            )));
        }

        let (raw_stem, extension) = match trimmed.rsplit_once('.') {
            Some((stem, ext)) if !ext.is_empty() => (stem, Some(ext.to_ascii_lowercase())),
            Some((stem, _)) => (stem, None),
            None => (trimmed, None),
        };

        Ok(Self {
            original: trimmed.to_string(),
            stem: sanitize_stem(raw_stem),
            extension,
        })
    }
}

/// Keep ASCII alphanumerics, `-`, `_` and `.`; spaces become `_`.
pub fn sanitize_stem(stem: &str) -> String {
    let cleaned: String = stem
        .chars()
        .filter_map(|c| match c {
            ' ' => Some('_'),
            c if c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.') => Some(c),
            _ => None,
        })
        .take(MAX_STEM_CHARS)
        .collect();

    let cleaned = cleaned.trim_matches('.');
    if cleaned.is_empty() {
        "file".to_string()
    } else {
        cleaned.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    #[test]
    fn test_parse_simple_name() {
        let name = ClientFilename::parse("Annual Report.PDF").unwrap();
        assert_eq!(name.original, "Annual Report.PDF");
        assert_eq!(name.stem, "Annual_Report");
        assert_eq!(name.extension.as_deref(), Some("pdf"));
    }

    #[test]
    fn test_parse_uses_last_dot() {
        let name = ClientFilename::parse("archive.tar.gz").unwrap();
        assert_eq!(name.stem, "archive.tar");
        assert_eq!(name.extension.as_deref(), Some("gz"));
    }

    #[test]
    fn test_parse_without_extension() {
        let name = ClientFilename::parse("README").unwrap();
        assert_eq!(name.extension, None);
        assert_eq!(name.stem, "README");

        let trailing = ClientFilename::parse("notes.").unwrap();
        assert_eq!(trailing.extension, None);
    }

    #[test]
    fn test_rejects_bad_names() {
        for bad in ["", "   ", ".", "..", "../etc/passwd", "a/b.pdf", "a\\b.pdf", "x\0.pdf"] {
            let err = ClientFilename::parse(bad).unwrap_err();
            assert_eq!(err.kind(), ErrorKind::InvalidFilename, "accepted {bad:?}");
        }
    }

    #[test]
    fn test_sanitize_stem() {
        assert_eq!(sanitize_stem("résumé (final)"), "rsum_final");
        assert_eq!(sanitize_stem("日本語"), "file");
        assert_eq!(sanitize_stem(""), "file");
        assert_eq!(sanitize_stem("..hidden"), "hidden");
        assert_eq!(sanitize_stem(&"a".repeat(300)).len(), MAX_STEM_CHARS);
    }

    #[test]
    fn test_dotfile_gets_default_stem() {
        let name = ClientFilename::parse(".pdf").unwrap();
        assert_eq!(name.stem, "file");
        assert_eq!(name.extension.as_deref(), Some("pdf"));
    }
}
