//! Scan pipeline modules

pub mod holder_filter;
pub mod holder_scanner;
pub mod token_classifier;

pub use holder_scanner::{HolderScanner, ScanParams};
pub use token_classifier::TokenClassifier;
