//! Smart splitting of segment streams into size-bounded chunks (C3).

pub mod splitter;

pub use splitter::{SmartSplitter, SplitterConfig};
