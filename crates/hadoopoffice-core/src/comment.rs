//! Cell comments (notes)

/// A cell comment
///
/// Readers fill `author` from the file's author table; the record writer
/// uses the configured comment author.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct CellComment {
    pub author: String,
    pub text: String,
}

impl CellComment {
    /// Create a new comment with the given author and text
    ///
    /// ```rust
    /// use hadoopoffice_core::CellComment;
    ///
    /// let comment = CellComment::new("hadoopoffice", "This is a test");
    /// assert_eq!(comment.to_string(), "[hadoopoffice]: This is a test");
    /// ```
    pub fn new(author: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            author: author.into(),
            text: text.into(),
        }
    }

    /// Create a comment without an author
    pub fn text_only(text: impl Into<String>) -> Self {
        Self::new(String::new(), text)
    }
}

impl std::fmt::Display for CellComment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.author.is_empty() {
            f.write_str(&self.text)
        } else {
            write!(f, "[{}]: {}", self.author, self.text)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display() {
        assert_eq!(CellComment::text_only("Hello").to_string(), "Hello");
        assert_eq!(CellComment::new("John", "Hello").to_string(), "[John]: Hello");
    }
}
