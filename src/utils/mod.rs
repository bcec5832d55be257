//! File helpers for building batches.

pub mod files;

pub use files::{
    apply_renames, expand_globs, files_by_extension, find_images, plan_renames, sequential_names,
    Rename, RenameOutcome, RenameRule,
};
