//! User-facing message templates shared by the engine and its tests.

/// Prefix marking console lines written by this engine.
pub const LOG_PREFIX: &str = "[PREINT] ";

/// Message for a triggered branch that does not match the integration repository.
pub fn no_relevant_change(branch_name: &str) -> String {
    format!(
        "There is no relevant SCM change to integrate where branch matches the 'Integration repository'. \
         Either branch ({branch_name}) is deleted or already integrated, or the SCM change is not related \
         to the integration repository."
    )
}

/// Prefix a console line.
pub fn prefixed(line: impl AsRef<str>) -> String {
    format!("{LOG_PREFIX}{}", line.as_ref())
}
