//! Debug logging for the resolution pipeline. Disabled by default; a hosting driver
//! can flip it on to watch graph construction, fixpoint merges and minimization
//! decisions go by on stderr.

use std::sync::atomic::{AtomicBool, Ordering};

use lazy_static::lazy_static;

// re-exported for the `log!` macro
pub use colored;

lazy_static! {
    static ref ENABLED: AtomicBool = AtomicBool::new(false);
}

pub fn enable() {
    ENABLED.store(true, Ordering::Relaxed);
}

pub fn disable() {
    ENABLED.store(false, Ordering::Relaxed);
}

pub fn is_enabled() -> bool {
    ENABLED.load(Ordering::Relaxed)
}

#[macro_export]
macro_rules! log {
    (graph, $($token:tt)*) => (
        if $crate::is_enabled() {
            use $crate::colored::Colorize;

            eprintln!("<{}> [{}] {}", "LOG".black().on_purple(), "graph".black().on_blue(), format_args!($($token)*));
        }
    );
    (unify, $($token:tt)*) => (
        if $crate::is_enabled() {
            use $crate::colored::Colorize;

            eprintln!("<{}> [{}] {}", "LOG".black().on_purple(), "unify".black().on_green(), format_args!($($token)*));
        }
    );
    (nested, $($token:tt)*) => (
        if $crate::is_enabled() {
            use $crate::colored::Colorize;

            eprintln!("<{}> [{}] {}", "LOG".black().on_purple(), "nested".black().on_cyan(), format_args!($($token)*));
        }
    );
    (minimize, $($token:tt)*) => (
        if $crate::is_enabled() {
            use $crate::colored::Colorize;

            eprintln!("<{}> [{}] {}", "LOG".black().on_purple(), "minimize".black().on_yellow(), format_args!($($token)*));
        }
    );
}
