//! Small shared helpers.

/// Flatten an error and its source chain into one line for storage in an
/// audit row's `last_error` column.
pub fn flatten_error(err: &anyhow::Error) -> String {
    err.chain()
        .map(|cause| cause.to_string())
        .collect::<Vec<_>>()
        .join(": ")
}
