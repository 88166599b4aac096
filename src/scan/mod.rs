mod walker;

pub use walker::{
    is_eligible, scan_directory, source_identity, SourceFile, SKIP_DIRS, SUPPORTED_EXTENSIONS,
};
