use longship_core::path_utils::LongshipPath;

/// Normalize a record path and refuse anything that could leave the cache root.
pub fn normalize_rel_path(rel_path: &str) -> Result<String, crate::StorageError> {
    let normalized = LongshipPath::normalize(rel_path);
    validate_relative_path(&normalized)?;
    Ok(normalized)
}

pub fn validate_relative_path(path: &str) -> Result<(), crate::StorageError> {
    if !LongshipPath::verify_safe(path) {
        return Err(crate::StorageError::InvalidPath(path.to_string()));
    }
    Ok(())
}
