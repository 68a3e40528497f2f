mod fs;
mod lock;
mod paths;

pub use fs::{
    archive_os_name, default_architecture, is_case_insensitive_fs, muxer_file_name, path_key,
    replace_file, write_atomic,
};
pub use lock::{LockError, MODIFY_INSTALLATION_STATES, ScopedMutex};
pub use paths::{AppPaths, AppPathsError, HOME_ENV_VAR};
