pub mod detector;

pub use detector::{ExploitDetector, SignatureMatch};
