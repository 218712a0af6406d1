//! Default values for configuration

use crate::dedup::DedupMode;
use crate::reader::{DelimiterChoice, RaggedRows};

/// Default delimiter for imports (sniffed from the header line)
pub fn default_import_delimiter() -> DelimiterChoice {
    DelimiterChoice::Auto
}

/// Default handling of rows whose field count differs from the header
pub fn default_ragged_rows() -> RaggedRows {
    RaggedRows::Skip
}

/// Default read buffer for the CSV reader (1 MiB)
pub fn default_buffer_capacity() -> usize {
    1 << 20
}

/// Default dedup mode when key columns are given without a mode
pub fn default_dedup_mode() -> DedupMode {
    DedupMode::File
}

/// Default upper bound for a single order's row budget
pub fn default_max_budget() -> usize {
    1_000_000
}

/// Default blob directory name under the base dir
pub fn default_blob_dir_name() -> &'static str {
    "blobs"
}
