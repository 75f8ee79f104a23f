//! Host platform (linux for example) utility functions

use std::path::PathBuf;

/// Environment variable giving the root directory of the software tree.
pub const SW_ROOT_ENV_VAR: &str = "PROBE_SW_ROOT";

/// Retrieve the software root directory from the environment.
pub fn get_probe_sw_root() -> Result<PathBuf, std::env::VarError> {
    std::env::var(SW_ROOT_ENV_VAR).map(PathBuf::from)
}
