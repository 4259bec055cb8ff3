//! Statement options.

use crate::native::constants::{
    DEFAULT_FETCH_ARRAY_SIZE, DEFAULT_LOB_CHUNK_SIZE, MAX_ARRAY_SIZE, TEXT_BYTES_PER_CHAR,
};

/// Tunables shared by every statement of a connection.
///
/// # Example
///
/// ```
/// use oracle_dpi_rs::StatementOptions;
///
/// let opts = StatementOptions::new()
///     .with_fetch_array_size(64)
///     .with_check_lob_write(false);
/// assert_eq!(opts.fetch_array_size, 64);
/// assert_eq!(opts.max_array_size, 1024);
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatementOptions {
    /// Rows per native fetch.
    pub fetch_array_size: u32,
    /// Largest accepted array argument.
    pub max_array_size: usize,
    /// LOB write chunk when the locator reports none.
    pub lob_chunk_fallback: u32,
    /// Verify the LOB size after every write.
    pub check_lob_write: bool,
    /// Bytes reserved per character of a text argument.
    pub text_capacity_factor: usize,
}

impl Default for StatementOptions {
    fn default() -> Self {
        Self {
            fetch_array_size: DEFAULT_FETCH_ARRAY_SIZE,
            max_array_size: MAX_ARRAY_SIZE,
            lob_chunk_fallback: DEFAULT_LOB_CHUNK_SIZE,
            check_lob_write: true,
            text_capacity_factor: TEXT_BYTES_PER_CHAR,
        }
    }
}

impl StatementOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the rows per native fetch. Zero is raised to one.
    pub fn with_fetch_array_size(mut self, size: u32) -> Self {
        self.fetch_array_size = size.max(1);
        self
    }

    pub fn with_max_array_size(mut self, max: usize) -> Self {
        self.max_array_size = max;
        self
    }

    pub fn with_lob_chunk_fallback(mut self, size: u32) -> Self {
        self.lob_chunk_fallback = size.max(1);
        self
    }

    pub fn with_check_lob_write(mut self, check: bool) -> Self {
        self.check_lob_write = check;
        self
    }

    pub fn with_text_capacity_factor(mut self, factor: usize) -> Self {
        self.text_capacity_factor = factor.max(1);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let opts = StatementOptions::default();
        assert_eq!(opts.fetch_array_size, 1);
        assert_eq!(opts.max_array_size, 1024);
        assert_eq!(opts.lob_chunk_fallback, 1 << 20);
        assert!(opts.check_lob_write);
        assert_eq!(opts.text_capacity_factor, 4);
    }

    #[test]
    fn test_builder_clamps_zero() {
        let opts = StatementOptions::new()
            .with_fetch_array_size(0)
            .with_lob_chunk_fallback(0)
            .with_text_capacity_factor(0);
        assert_eq!(opts.fetch_array_size, 1);
        assert_eq!(opts.lob_chunk_fallback, 1);
        assert_eq!(opts.text_capacity_factor, 1);
    }
}
