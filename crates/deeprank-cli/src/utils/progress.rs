use deeprank::engine::progress::{Progress, ProgressReporter};
use indicatif::{ProgressBar, ProgressDrawTarget, ProgressState, ProgressStyle};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing::{info, warn};

const SPINNER_TICK_MS: u64 = 80;

/// What one workflow phase went through.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PhaseTally {
    pub phase: &'static str,
    pub total: u64,
    pub done: u64,
    /// Conformations skipped or degraded during the phase, with the reason.
    pub skipped: Vec<(String, String)>,
}

impl PhaseTally {
    fn summary_line(&self) -> String {
        match self.skipped.len() {
            0 => format!("✓ {}", self.phase),
            n => format!("✓ {} ({n} skipped)", self.phase),
        }
    }
}

struct State {
    bar: ProgressBar,
    current: Option<PhaseTally>,
    finished: Vec<PhaseTally>,
}

impl State {
    fn tally(&mut self) -> &mut PhaseTally {
        self.current.get_or_insert_with(PhaseTally::default)
    }

    fn apply(&mut self, event: Progress) {
        match event {
            Progress::PhaseStart { name } => {
                if let Some(open) = self.current.take() {
                    self.finished.push(open);
                }
                self.current = Some(PhaseTally {
                    phase: name,
                    ..Default::default()
                });
                self.bar.reset();
                self.bar.set_length(0);
                self.bar.set_style(spinner_style());
                self.bar.set_prefix(name);
                self.bar.set_message("");
                self.bar
                    .enable_steady_tick(Duration::from_millis(SPINNER_TICK_MS));
            }
            Progress::TaskStart { total_steps } => {
                self.tally().total = total_steps;
                self.bar.disable_steady_tick();
                self.bar.reset();
                self.bar.set_length(total_steps);
                self.bar.set_style(bar_style());
            }
            Progress::TaskIncrement => {
                self.tally().done += 1;
                self.bar.inc(1);
            }
            Progress::TaskFinish => {
                let total = self.tally().total;
                self.tally().done = total;
                self.bar.set_position(total);
            }
            Progress::PhaseFinish => {
                let tally = self.current.take().unwrap_or_default();
                self.bar.disable_steady_tick();
                self.bar.finish_with_message(tally.summary_line());
                self.finished.push(tally);
            }
            Progress::Skipped { name, reason } => {
                self.bar.println(format!("  ! {name}: {reason}"));
                let tally = self.tally();
                tally.skipped.push((name, reason));
                let count = tally.skipped.len();
                self.bar.set_message(format!("{count} skipped"));
            }
            Progress::Message(msg) => self.bar.println(format!("  {msg}")),
        }
    }
}

/// Renders the phases of a create, append, map or remove run on stderr and
/// keeps a per-phase tally for the closing summary.
#[derive(Clone)]
pub struct CollectionProgress {
    state: Arc<Mutex<State>>,
}

impl CollectionProgress {
    pub fn new() -> Self {
        Self::with_target(ProgressDrawTarget::stderr())
    }

    fn with_target(target: ProgressDrawTarget) -> Self {
        let bar = ProgressBar::with_draw_target(Some(0), target).with_style(spinner_style());
        bar.finish_and_clear();
        Self {
            state: Arc::new(Mutex::new(State {
                bar,
                current: None,
                finished: Vec::new(),
            })),
        }
    }

    /// A reporter whose events drive this display.
    pub fn reporter(&self) -> ProgressReporter<'static> {
        let state = self.state.clone();
        ProgressReporter::with_callback(Box::new(move |event: Progress| {
            let Ok(mut state) = state.lock() else {
                warn!("Progress state mutex was poisoned; dropping the update");
                return;
            };
            state.apply(event);
        }))
    }

    /// Finished phases in order, followed by the one still running.
    pub fn phases(&self) -> Vec<PhaseTally> {
        let Ok(state) = self.state.lock() else {
            return Vec::new();
        };
        state
            .finished
            .iter()
            .chain(state.current.as_ref())
            .cloned()
            .collect()
    }

    /// Logs one line per phase that saw work or skipped conformations.
    pub fn log_summary(&self) {
        for tally in self.phases() {
            if tally.total == 0 && tally.skipped.is_empty() {
                continue;
            }
            info!(
                phase = tally.phase,
                done = tally.done,
                total = tally.total,
                skipped = tally.skipped.len(),
                "Phase summary"
            );
        }
    }
}

impl Default for CollectionProgress {
    fn default() -> Self {
        Self::new()
    }
}

fn spinner_style() -> ProgressStyle {
    ProgressStyle::with_template("{spinner:.green} {prefix:.bold} {msg}")
        .unwrap_or_else(|_| ProgressStyle::default_spinner())
}

fn bar_style() -> ProgressStyle {
    ProgressStyle::with_template(
        "{prefix:>13.bold} [{bar:40.cyan/blue}] {pos}/{len} conformations ({eta}) {msg}",
    )
    .unwrap_or_else(|_| ProgressStyle::default_bar())
    .with_key("eta", |state: &ProgressState, w: &mut dyn std::fmt::Write| {
        let _ = write!(w, "{:.1}s", state.eta().as_secs_f64());
    })
    .progress_chars("##-")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    fn hidden() -> CollectionProgress {
        CollectionProgress::with_target(ProgressDrawTarget::hidden())
    }

    #[test]
    fn starts_without_phases() {
        let progress = hidden();
        assert!(progress.phases().is_empty());
        assert!(progress.state.lock().unwrap().bar.is_finished());
    }

    #[test]
    fn tallies_each_create_phase() {
        let progress = hidden();
        let reporter = progress.reporter();

        reporter.report(Progress::PhaseStart {
            name: "Preparation",
        });
        reporter.report(Progress::PhaseFinish);
        reporter.report(Progress::PhaseStart {
            name: "Conformations",
        });
        reporter.report(Progress::TaskStart { total_steps: 3 });
        reporter.report(Progress::TaskIncrement);
        {
            let state = progress.state.lock().unwrap();
            assert_eq!(state.bar.prefix(), "Conformations");
            assert_eq!(state.bar.length(), Some(3));
            assert_eq!(state.bar.position(), 1);
        }
        reporter.skipped("1AK4_9w", "unreadable complex");
        reporter.report(Progress::TaskFinish);
        reporter.report(Progress::PhaseFinish);

        let phases = progress.phases();
        let names: Vec<_> = phases.iter().map(|p| p.phase).collect();
        assert_eq!(names, vec!["Preparation", "Conformations"]);
        assert_eq!(phases[1].total, 3);
        assert_eq!(phases[1].done, 3);
        assert_eq!(
            phases[1].skipped,
            vec![("1AK4_9w".to_string(), "unreadable complex".to_string())]
        );
        assert_eq!(
            progress.state.lock().unwrap().bar.message(),
            "✓ Conformations (1 skipped)"
        );
    }

    #[test]
    fn skipped_names_span_phases() {
        let progress = hidden();
        let reporter = progress.reporter();
        reporter.report(Progress::PhaseStart { name: "Append" });
        reporter.skipped("1AK4_7w", "no reference structure");
        reporter.report(Progress::PhaseFinish);
        reporter.report(Progress::PhaseStart { name: "Mapping" });
        reporter.skipped("1ATN", "chains A and B missing");

        let phases = progress.phases();
        let skipped: Vec<_> = phases
            .iter()
            .flat_map(|p| p.skipped.iter().map(|(name, _)| name.as_str()))
            .collect();
        assert_eq!(skipped, vec!["1AK4_7w", "1ATN"]);
        assert_eq!(phases.len(), 2);
        assert_eq!(phases[1].phase, "Mapping");
        assert_eq!(phases[0].summary_line(), "✓ Append (1 skipped)");
    }

    #[test]
    fn clean_phase_summary_has_no_count() {
        let progress = hidden();
        let reporter = progress.reporter();
        reporter.report(Progress::PhaseStart { name: "Remove" });
        reporter.report(Progress::PhaseFinish);
        assert_eq!(progress.state.lock().unwrap().bar.message(), "✓ Remove");
    }

    #[test]
    fn reporter_can_move_to_another_thread() {
        let progress = hidden();
        let reporter = progress.reporter();

        thread::spawn(move || {
            reporter.report(Progress::PhaseStart { name: "Mapping" });
            reporter.report(Progress::TaskStart { total_steps: 1 });
            reporter.report(Progress::TaskIncrement);
            reporter.report(Progress::PhaseFinish);
        })
        .join()
        .unwrap();

        let phases = progress.phases();
        assert_eq!(phases.len(), 1);
        assert_eq!(phases[0].done, 1);
    }
}
