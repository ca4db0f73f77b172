/// Prefixed status line on stderr, printed only when stderr is a terminal.
///
/// ```ignore
/// log_status!("distribute", "Copied to {}", destination);
/// ```
#[macro_export]
macro_rules! log_status {
    ($prefix:expr, $($arg:tt)*) => {
        if ::std::io::IsTerminal::is_terminal(&::std::io::stderr()) {
            eprintln!(concat!("[", $prefix, "] {}"), format_args!($($arg)*));
        }
    };
}

pub mod core;
pub mod utils;

// `posctl::manifest` instead of `posctl::core::manifest`
pub use core::*;
pub use utils::*;
