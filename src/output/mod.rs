mod progress;
mod styling;
mod summary;
mod tables;

pub use progress::WaitSpinner;
pub use styling::{dim, magenta_bold};
pub use summary::print_summary;

/// Prints the `tssc-e2e` banner to stderr.
///
/// Displays the tool name, version, and description at the start of execution.
pub fn print_banner() {
    eprintln!(
        r"
{} {}
  {}
",
        magenta_bold("🧪 tssc-e2e"),
        dim(env!("CARGO_PKG_VERSION")),
        dim("End-to-end checks for software templates")
    );
}
