use std::fmt;
use std::path::Path;

/// Book formats the pipeline knows how to import.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BookFormat {
    Epub,
    Pdf,
    Txt,
    Mobi,
    Azw3,
}

impl BookFormat {
    /// Parse a dot-qualified or bare extension, case-insensitively.
    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext.trim_start_matches('.').to_ascii_lowercase().as_str() {
            "epub" => Some(Self::Epub),
            "pdf" => Some(Self::Pdf),
            "txt" => Some(Self::Txt),
            "mobi" => Some(Self::Mobi),
            "azw3" => Some(Self::Azw3),
            _ => None,
        }
    }

    pub fn from_path(path: &Path) -> Option<Self> {
        path.extension()
            .and_then(|e| e.to_str())
            .and_then(Self::from_extension)
    }

    /// Lowercase, dot-qualified extension.
    pub fn extension(self) -> &'static str {
        match self {
            Self::Epub => ".epub",
            Self::Pdf => ".pdf",
            Self::Txt => ".txt",
            Self::Mobi => ".mobi",
            Self::Azw3 => ".azw3",
        }
    }

    /// Formats that are stored as-is. Everything else is converted to EPUB first.
    pub fn requires_conversion(self) -> bool {
        match self {
            Self::Epub | Self::Pdf => false,
            Self::Txt | Self::Mobi | Self::Azw3 => true,
        }
    }

    /// Settings flag gating automatic conversion of this format.
    pub fn conversion_flag(self) -> Option<&'static str> {
        match self {
            Self::Txt => Some(AUTO_CONVERT_TXT),
            Self::Mobi | Self::Azw3 => Some(AUTO_CONVERT_MOBI),
            Self::Epub | Self::Pdf => None,
        }
    }

    /// Value stored in the catalog's `file_type` column.
    pub fn file_type(self) -> &'static str {
        self.extension().trim_start_matches('.')
    }
}

impl fmt::Display for BookFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.file_type())
    }
}

pub const AUTO_CONVERT_TXT: &str = "auto_convert_txt";
pub const AUTO_CONVERT_MOBI: &str = "auto_convert_mobi";
