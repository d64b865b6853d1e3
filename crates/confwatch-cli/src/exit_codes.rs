//! Process exit codes. Failed store operations exit with
//! `ConfError::exit_code()`; these cover the rest.

pub const SUCCESS: i32 = 0;
pub const INTERNAL_ERROR: i32 = 4; // Unreadable config file or other setup failure
