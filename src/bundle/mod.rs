//! Bundle Builder & Integrity (C5): assemble per-task execution bundles
//! and verify their integrity before dispatch.

pub mod builder;
pub mod checksum;
pub mod integrity;
mod model;

pub use builder::{bundle_path, build, result_path, BundleInputs};
pub use checksum::checksum_bytes;
pub use integrity::{verify, verify_artifacts, IntegrityOutcome};
pub use model::{
    ArtifactChecksums, Behavior, Bundle, BundleDependencies, CapabilityMap, Checksums,
    PhysicalMap, PhysicalMapEntry, ResultError, ResultFile, ResultFiles, ResultStatus,
    BUNDLE_VERSION,
};
