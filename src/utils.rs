//! # Utility Functions Module
//!
//! Helpers for building external tool command lines.

use std::ffi::OsString;

/// Builds a `Vec<OsString>` from heterogeneous items.
///
/// Every item must be accepted by `OsString::from`, so `&str`, `String`,
/// `&Path` and `&PathBuf` can be mixed freely:
///
/// ```rust
/// use std::path::Path;
/// use opti_dir::args;
///
/// let level = 2;
/// let args = args![format!("--opt={}", level), "--preserve", Path::new("a.png")];
/// assert_eq!(args[0], "--opt=2");
/// ```
#[macro_export]
macro_rules! args {
    [$($item:expr),* $(,)?] => {
        vec![$(::std::ffi::OsString::from($item)),*]
    };
}

/// Renders an argument list the way it would be typed in a shell, for logging.
pub fn display_command(program: &str, args: &[OsString]) -> String {
    let mut rendered = String::from(program);
    for arg in args {
        rendered.push(' ');
        rendered.push_str(&arg.to_string_lossy());
    }
    rendered
}
