/// Terminal status output: a wait spinner plus one check line per observed
/// milestone, printed in the order the milestone events fired.
use crate::config::LoadTrigger;
use crate::metrics::Metric;
use console::style;
use indicatif::{ProgressBar, ProgressStyle};
use std::time::Duration;

pub struct StatusReporter {
    spinner: ProgressBar,
    load_trigger: LoadTrigger,
}

impl StatusReporter {
    pub fn new(load_trigger: LoadTrigger) -> Self {
        let spinner = ProgressBar::new_spinner();
        spinner.set_style(
            ProgressStyle::default_spinner()
                .template("{spinner} {msg}")
                .unwrap(),
        );
        spinner.enable_steady_tick(Duration::from_millis(100));
        spinner.set_message("waiting for vite server...");
        Self {
            spinner,
            load_trigger,
        }
    }

    /// Print the status line for a newly observed milestone, then restart
    /// the wait spinner when more milestones are expected.
    pub fn metric_observed(&self, metric: Metric, value: f64, hash_consistent: bool) {
        let line = match metric {
            Metric::PageLoad => {
                let when = match self.load_trigger {
                    LoadTrigger::OnPrebundle => "pre bundle",
                    _ => "start up",
                };
                format!("page load on {} in: {} ms", when, style(value).yellow())
            }
            _ => format!("{} in: {} ms", metric.label(), style(value).yellow()),
        };
        self.spinner
            .println(format!("{} {}", style("✔").green(), line));

        let keep_waiting = match metric {
            Metric::StartUp => !hash_consistent,
            Metric::Prebundle => self.load_trigger == LoadTrigger::OnPrebundle,
            Metric::PageLoad => false,
            _ => true,
        };
        if keep_waiting {
            self.spinner.set_message("waiting to collect...");
        }
    }

    /// Swap the spinner text, e.g. while loading the page or waiting to exit.
    pub fn waiting(&self, message: &str) {
        self.spinner.set_message(message.to_string());
    }

    pub fn finish(&self) {
        self.spinner.finish_and_clear();
    }
}
