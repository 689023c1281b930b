// SPDX-License-Identifier: LGPL-3.0-only
//
// This file is provided WITHOUT ANY WARRANTY;
// without even the implied warranty of MERCHANTABILITY
// or FITNESS FOR A PARTICULAR PURPOSE.

use path_clean::clean;
use std::path::{Path, PathBuf};

pub type FindInParent = fn(&Path, &str) -> Option<PathBuf>;

/// Walk up from `path` looking for `filename`
pub fn find_in_parent(path: &Path, filename: &str) -> Option<PathBuf> {
    path.ancestors()
        .map(|dir| dir.join(filename))
        .find(|candidate| candidate.exists())
}

/// Resolve which configuration file to use.
///
/// An explicit CLI path wins (relative paths are taken from `cwd`), then the
/// nearest file named `default_filename` in `cwd` or its parents, then the
/// file inside `default_config_dir`.
pub fn resolve_config_path(
    find_in_parent: FindInParent,
    cwd: &Path,
    default_config_dir: &Path,
    default_filename: &str,
    cli_file: Option<&Path>,
) -> PathBuf {
    if let Some(cli_file) = cli_file {
        if cli_file.is_absolute() {
            return cli_file.to_path_buf();
        }
        return clean(cwd.join(cli_file));
    }

    if let Some(found) = find_in_parent(cwd, default_filename) {
        return found;
    }

    clean(default_config_dir.join(default_filename))
}
