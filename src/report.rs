//! User-facing output
//!
//! Diagnostics go through the `log` macros. Anything the user is expected to read (counts, dry run
//! previews, audit summaries) goes through a [Reporter] handed to each component.

use std::path::Path;

pub trait Reporter {
    /// A plain line of output
    fn line(&self, message: &str);

    /// An advisory condition that doesn't stop the current operation
    fn warning(&self, message: &str);

    /// Content that would have been written to `path` if this weren't a dry run
    fn preview(&self, path: &Path, content: &str) {
        self.line(&format!("--dry set, would write {}:", path.display()));
        self.line(content);
    }
}

/// Print everything to stdout
pub struct ConsoleReporter;

impl Reporter for ConsoleReporter {
    fn line(&self, message: &str) {
        println!("{message}");
    }

    fn warning(&self, message: &str) {
        println!("WARNING: {message}");
    }
}

#[cfg(test)]
pub mod testing {
    use std::cell::RefCell;
    use std::path::{Path, PathBuf};

    use super::Reporter;

    /// Keeps every reported line so tests can inspect them
    #[derive(Default)]
    pub struct RecordingReporter {
        pub lines: RefCell<Vec<String>>,
        pub warnings: RefCell<Vec<String>>,
        pub previews: RefCell<Vec<(PathBuf, String)>>,
    }

    impl Reporter for RecordingReporter {
        fn line(&self, message: &str) {
            self.lines.borrow_mut().push(message.to_string());
        }

        fn warning(&self, message: &str) {
            self.warnings.borrow_mut().push(message.to_string());
        }

        fn preview(&self, path: &Path, content: &str) {
            self.previews
                .borrow_mut()
                .push((path.to_path_buf(), content.to_string()));
        }
    }
}
