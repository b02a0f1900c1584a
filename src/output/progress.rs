use indicatif::{ProgressBar, ProgressDrawTarget, ProgressStyle};

use super::styling::{bright_green, bright_red, bright_yellow};

/// Spinner shown on stderr while a long wait is in progress.
pub struct WaitSpinner {
    pb: ProgressBar,
}

impl WaitSpinner {
    pub fn start(message: &str) -> Self {
        let pb = ProgressBar::new_spinner();
        pb.set_draw_target(ProgressDrawTarget::stderr());
        let style = ProgressStyle::default_spinner().template("  {msg} {spinner} {elapsed}");
        if let Ok(style) = style {
            pb.set_style(style);
        }
        pb.set_message(bright_yellow(message).to_string());
        pb.enable_steady_tick(std::time::Duration::from_millis(100));
        Self { pb }
    }

    pub fn finish(self, passed: bool, message: &str) {
        let message = if passed {
            bright_green(format!("{message} ✓")).to_string()
        } else {
            bright_red(format!("{message} ✗")).to_string()
        };
        self.pb.finish_with_message(message);
    }
}
