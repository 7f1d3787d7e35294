/// File extension of hint segment files
pub const HINT_SUFFIX: &str = ".hint";

/// Name of the merge-finish marker file; its contents are the ASCII decimal
/// id of the highest data segment incorporated into the last merge
pub const MERGE_FIN_FILE: &str = ".fin";

/// Name of the transient subdirectory a merge builds its output in
pub const MERGE_DIR: &str = "merge";
