use clap::ValueEnum;
use icftl_core::Monitor;
use indicatif::{MultiProgress, ProgressBar, ProgressStyle};

/// Trace replay progress bar
#[derive(Copy, Clone, Default, PartialEq, Eq, PartialOrd, Ord, ValueEnum)]
pub(crate) enum Bar {
    /// Fancy Unicode progress bars
    #[default]
    Unicode,
    /// Basic ASCII progress bars
    Ascii,
}

impl Bar {
    /// Tracks the monitor's progress over a trace of `events` events until it stops.
    pub(crate) fn print_progress_bar(&self, events: u64, monitor: &Monitor, trace_name: &str) {
        const FINE_BAR: &str = "█▉▊▋▌▍▎▏  ";
        const ASCII_BAR: &str = "#--";
        const ASCII_SPINNER: &str = "|/-\\";

        let bars = MultiProgress::new();

        // Spinner
        let spinner_style = if let Bar::Ascii = self {
            ProgressStyle::with_template("{elapsed_precise} {spinner} {msg}")
                .unwrap()
                .tick_chars(ASCII_SPINNER)
        } else {
            ProgressStyle::with_template("{elapsed_precise} {spinner} {msg}").unwrap()
        };
        let spinner = ProgressBar::new_spinner()
            .with_style(spinner_style)
            .with_message(format!("monitoring {trace_name} ({events} events)"));
        let spinner = bars.add(spinner);

        // Progress bar
        let progress_style = if let Bar::Ascii = self {
            ProgressStyle::with_template("{bar:50} {percent:>3}% ({pos}/{len}) ETA: {eta}")
                .unwrap()
                .progress_chars(ASCII_BAR)
        } else {
            ProgressStyle::with_template(
                "{bar:50.white.on_black} {percent:>3}% ({pos}/{len}) ETA: {eta}",
            )
            .unwrap()
            .progress_chars(FINE_BAR)
        };
        let progress_bar = bars.add(ProgressBar::new(events).with_style(progress_style));

        // Verdict counter
        let verdict_style = ProgressStyle::with_template("{prefix} {msg}").unwrap();
        let verdict_line = bars.add(
            ProgressBar::new(0)
                .with_style(verdict_style)
                .with_prefix("Verdicts:"),
        );

        bars.set_move_cursor(true);
        while monitor.running() {
            // Dropped events are never processed.
            let handled = monitor.processed() + monitor.dropped();
            if handled > progress_bar.position() {
                spinner.tick();
                progress_bar.set_position(handled);
                verdict_line.set_message(format!(
                    "{} issued, {} events dropped",
                    monitor.verdicts(),
                    monitor.dropped()
                ));
                verdict_line.tick();
            }
            if handled >= events {
                break;
            }
            // Sleep a while to limit update/refresh rate.
            std::thread::sleep(std::time::Duration::from_millis(100));
        }

        // Clean up terminal
        bars.set_move_cursor(false);
        spinner.finish_and_clear();
        progress_bar.finish_and_clear();
        verdict_line.finish_and_clear();
    }
}
