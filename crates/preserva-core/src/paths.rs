// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Staging path sanitization.
//!
//! Characterization runs the staged path through an external tool, so paths
//! are rewritten to a filesystem- and CLI-safe form before use. The rewrite
//! is a pure function: the same input always produces the same output, and
//! sanitizing an already-sanitized path is a no-op.

/// Rewrite reserved and shell-special characters in a path.
///
/// Characters outside `[A-Za-z0-9/._-]` are replaced; each run of one or
/// more such characters collapses to a single `_`:
///
/// ```
/// use preserva_core::paths::sanitize_path;
/// assert_eq!(
///     sanitize_path(r#"/path/to/fi$4l?*"'!e.txt<<1"#),
///     "/path/to/fi_4l_e.txt_1"
/// );
/// ```
pub fn sanitize_path(path: &str) -> String {
    let mut out = String::with_capacity(path.len());
    let mut in_run = false;
    for c in path.chars() {
        if c.is_ascii_alphanumeric() || matches!(c, '/' | '.' | '_' | '-') {
            out.push(c);
            in_run = false;
        } else if !in_run {
            out.push('_');
            in_run = true;
        }
    }
    out
}
