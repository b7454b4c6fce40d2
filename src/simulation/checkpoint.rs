//! Best-model selection and checkpoint files
use super::hooks::{EpisodeSnapshot, TrainingHook};
use super::stats::round1;
use crate::agents::{Axis, PerAxis, PersistPolicy};
use crate::logging::StatsLogger;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// When a model is eligible to be compared against the best so far.
#[derive(Debug, Copy, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelSelection {
    /// Only consider steps strictly after this one.
    pub after_step: u64,
    /// Only consider once strictly more than this many episodes completed.
    pub min_episodes: u64,
    /// A new mean reward must exceed the best by this factor.
    pub margin: f64,
    /// Only consider steps that are a multiple of this interval.
    pub every: Option<u64>,
}

impl Default for ModelSelection {
    fn default() -> Self {
        Self {
            after_step: 500,
            min_episodes: 100,
            margin: 1.2,
            every: Some(10_000),
        }
    }
}

impl ModelSelection {
    pub fn is_eligible(&self, step: u64, num_episodes: u64) -> bool {
        step > self.after_step
            && num_episodes > self.min_episodes
            && self.every.map_or(true, |n| n > 0 && step % n == 0)
    }
}

/// The best mean reward seen so far.
///
/// Means are compared and recorded rounded to one decimal.
#[derive(Debug, Copy, Clone, PartialEq, Serialize, Deserialize)]
pub struct BestModelRecord {
    pub margin: f64,
    best: Option<f64>,
}

impl BestModelRecord {
    /// A record that accepts any first offer.
    pub const fn new(margin: f64) -> Self {
        Self { margin, best: None }
    }

    /// A record that only accepts offers beating `best` by the margin.
    pub const fn with_best(margin: f64, best: f64) -> Self {
        Self {
            margin,
            best: Some(best),
        }
    }

    pub const fn best(&self) -> Option<f64> {
        self.best
    }

    /// Offer a new mean reward, returning its rounded value if it beats the best by the margin.
    pub fn offer(&mut self, mean_reward: f64) -> Option<f64> {
        let mean_reward = round1(mean_reward);
        let accept = match self.best {
            None => true,
            Some(best) => mean_reward > best * self.margin,
        };
        if accept {
            self.best = Some(mean_reward);
            Some(mean_reward)
        } else {
            None
        }
    }
}

/// Path of an archived per-axis model.
///
/// `<root>/models/<algorithm>/<date>/<axis>_<mean_reward>.cbor`
pub fn model_path(root: &Path, algorithm: &str, date: &str, axis: Axis, mean_reward: f64) -> PathBuf {
    root.join("models")
        .join(algorithm)
        .join(date)
        .join(format!("{}_{}.cbor", axis, mean_reward))
}

/// Hook archiving the policies whenever the rolling mean reward beats the best so far.
///
/// The best starts at zero, so a run that never earns a reward archives nothing.
/// Keeps at most one file per axis: the previous file of an axis is deleted once its
/// replacement is written. Filesystem failures are logged and otherwise ignored.
#[derive(Debug, Clone, PartialEq)]
pub struct BestModelSaver {
    root: PathBuf,
    algorithm: String,
    selection: ModelSelection,
    record: BestModelRecord,
    retained: PerAxis<Option<PathBuf>>,
    date: Option<String>,
}

impl BestModelSaver {
    pub fn new<P: Into<PathBuf>>(root: P, algorithm: &str, selection: ModelSelection) -> Self {
        Self {
            root: root.into(),
            algorithm: algorithm.into(),
            selection,
            record: BestModelRecord::with_best(selection.margin, 0.0),
            retained: PerAxis::new(None, None),
            date: None,
        }
    }

    /// Use a fixed date directory instead of the current local date.
    #[must_use]
    pub fn with_date<S: Into<String>>(mut self, date: S) -> Self {
        self.date = Some(date.into());
        self
    }

    pub const fn record(&self) -> &BestModelRecord {
        &self.record
    }

    /// The currently retained file of each axis.
    pub const fn retained(&self) -> &PerAxis<Option<PathBuf>> {
        &self.retained
    }

    fn date(&self) -> String {
        self.date
            .clone()
            .unwrap_or_else(|| chrono::Local::now().format("%Y-%m-%d").to_string())
    }

    fn save_all<P: PersistPolicy>(
        &mut self,
        policies: &PerAxis<P>,
        mean_reward: f64,
        logger: &mut dyn StatsLogger,
    ) {
        let date = self.date();
        for axis in Axis::ALL {
            let path = model_path(&self.root, &self.algorithm, &date, axis, mean_reward);
            if let Some(dir) = path.parent() {
                if let Err(err) = fs::create_dir_all(dir) {
                    note(logger, format!("cannot create {}: {}", dir.display(), err));
                }
            }
            if let Err(err) = policies[axis].save(&path) {
                note(logger, format!("cannot save {}: {}", path.display(), err));
                continue;
            }
            note(logger, format!("saved {}", path.display()));

            if let Some(previous) = self.retained[axis].replace(path) {
                if Some(&previous) != self.retained[axis].as_ref() {
                    if let Err(err) = fs::remove_file(&previous) {
                        note(logger, format!("cannot delete {}: {}", previous.display(), err));
                    }
                }
            }
        }
    }
}

fn note(logger: &mut dyn StatsLogger, message: String) {
    // Messages under one id always share a summary type
    let _ = logger.log_message("checkpoint", message);
}

impl<P: PersistPolicy> TrainingHook<P> for BestModelSaver {
    fn on_episode_end(&mut self, snapshot: &EpisodeSnapshot<P>, logger: &mut dyn StatsLogger) {
        if !self
            .selection
            .is_eligible(snapshot.step, snapshot.num_episodes)
        {
            return;
        }
        if let Some(mean_reward) = self.record.offer(snapshot.means.reward) {
            self.save_all(snapshot.policies, mean_reward, logger);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agents::testing::ScriptedPolicy;
    use crate::logging::VecLogger;
    use crate::simulation::stats::EpisodeMeans;
    use rstest::rstest;
    use tempfile::tempdir;

    #[rstest]
    #[case(11.5, None)]
    #[case(12.0, None)]
    #[case(12.04, None)]
    #[case(12.06, Some(12.1))]
    #[case(12.5, Some(12.5))]
    fn record_margin(#[case] mean: f64, #[case] accepted: Option<f64>) {
        let mut record = BestModelRecord::new(1.2);
        assert_eq!(record.offer(10.0), Some(10.0));
        assert_eq!(record.offer(mean), accepted);
        assert_eq!(record.best(), Some(accepted.unwrap_or(10.0)));
    }

    #[test]
    fn record_with_best_rejects_zero() {
        let mut record = BestModelRecord::with_best(1.2, 0.0);
        assert_eq!(record.offer(0.0), None);
        assert_eq!(record.offer(0.04), None);
        assert_eq!(record.offer(0.3), Some(0.3));
    }

    #[rstest]
    #[case(500, 101, false)]
    #[case(501, 100, false)]
    #[case(501, 101, true)]
    fn eligibility_without_interval(#[case] step: u64, #[case] episodes: u64, #[case] eligible: bool) {
        let selection = ModelSelection {
            every: None,
            ..ModelSelection::default()
        };
        assert_eq!(selection.is_eligible(step, episodes), eligible);
    }

    #[test]
    fn eligibility_with_interval() {
        let selection = ModelSelection::default();
        assert!(!selection.is_eligible(10_001, 200));
        assert!(selection.is_eligible(20_000, 200));
    }

    #[test]
    fn path_layout() {
        let path = model_path(Path::new("/out"), "deepq", "2017-11-05", Axis::Y, 12.5);
        assert_eq!(path, Path::new("/out/models/deepq/2017-11-05/y_12.5.cbor"));
        let path = model_path(Path::new("/out"), "deepq", "2017-11-05", Axis::X, round1(93.333));
        assert_eq!(path, Path::new("/out/models/deepq/2017-11-05/x_93.3.cbor"));
    }

    fn snapshot(policies: &PerAxis<ScriptedPolicy>, reward: f64) -> EpisodeSnapshot<'_, ScriptedPolicy> {
        EpisodeSnapshot {
            step: 1000,
            num_episodes: 1,
            means: EpisodeMeans {
                reward,
                beacons: reward / 100.0,
                beacon_time: None,
            },
            exploration: 0.1,
            policies,
        }
    }

    fn files_in(dir: &Path) -> Vec<String> {
        let mut names: Vec<_> = fs::read_dir(dir)
            .unwrap()
            .map(|entry| entry.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        names.sort();
        names
    }

    #[test]
    fn saver_keeps_one_file_per_axis() {
        let root = tempdir().unwrap();
        let selection = ModelSelection {
            after_step: 0,
            min_episodes: 0,
            margin: 1.2,
            every: None,
        };
        let mut saver = BestModelSaver::new(root.path(), "deepq", selection).with_date("2017-11-05");
        let policies = PerAxis::new(ScriptedPolicy::new(16, 3), ScriptedPolicy::new(16, 7));
        let mut logger = VecLogger::default();
        let dir = root.path().join("models/deepq/2017-11-05");

        saver.on_episode_end(&snapshot(&policies, 10.0), &mut logger);
        assert_eq!(files_in(&dir), ["x_10.cbor", "y_10.cbor"]);

        // Not enough improvement
        saver.on_episode_end(&snapshot(&policies, 11.5), &mut logger);
        assert_eq!(files_in(&dir), ["x_10.cbor", "y_10.cbor"]);

        saver.on_episode_end(&snapshot(&policies, 12.5), &mut logger);
        assert_eq!(files_in(&dir), ["x_12.5.cbor", "y_12.5.cbor"]);
        assert_eq!(saver.record().best(), Some(12.5));
        assert_eq!(saver.retained().x.as_deref(), Some(dir.join("x_12.5.cbor").as_path()));

        let mut restored = ScriptedPolicy::new(16, 0);
        restored.restore(&dir.join("y_12.5.cbor")).unwrap();
        assert_eq!(restored.action, 7);
    }

    #[test]
    fn saver_respects_eligibility() {
        let root = tempdir().unwrap();
        let mut saver = BestModelSaver::new(
            root.path(),
            "deepq",
            ModelSelection {
                every: None,
                ..ModelSelection::default()
            },
        );
        let policies = PerAxis::new(ScriptedPolicy::new(16, 3), ScriptedPolicy::new(16, 7));
        saver.on_episode_end(&snapshot(&policies, 50.0), &mut ());
        assert_eq!(saver.record().best(), Some(0.0));
        assert!(!root.path().join("models").exists());
    }

    #[test]
    fn save_failure_logged() {
        let root = tempdir().unwrap();
        // A file where the models directory should be
        fs::write(root.path().join("models"), b"").unwrap();
        let selection = ModelSelection {
            after_step: 0,
            min_episodes: 0,
            margin: 1.2,
            every: None,
        };
        let mut saver = BestModelSaver::new(root.path(), "deepq", selection);
        let policies = PerAxis::new(ScriptedPolicy::new(16, 3), ScriptedPolicy::new(16, 7));
        let mut logger = VecLogger::default();
        saver.on_episode_end(&snapshot(&policies, 10.0), &mut logger);
        assert_eq!(saver.retained(), &PerAxis::new(None, None));
        assert!(!logger.values("checkpoint").is_empty());
        // Recorded even though nothing was written
        assert_eq!(saver.record().best(), Some(10.0));
        saver.on_episode_end(&snapshot(&policies, 11.0), &mut logger);
        assert_eq!(saver.record().best(), Some(10.0));
    }

    fn any_time_selection() -> ModelSelection {
        ModelSelection {
            after_step: 0,
            min_episodes: 0,
            margin: 1.2,
            every: None,
        }
    }

    #[test]
    fn saver_names_files_with_rounded_mean() {
        let root = tempdir().unwrap();
        let mut saver =
            BestModelSaver::new(root.path(), "deepq", any_time_selection()).with_date("2017-11-05");
        let policies = PerAxis::new(ScriptedPolicy::new(16, 3), ScriptedPolicy::new(16, 7));
        saver.on_episode_end(&snapshot(&policies, 280.0 / 3.0), &mut ());
        let dir = root.path().join("models/deepq/2017-11-05");
        assert_eq!(files_in(&dir), ["x_93.3.cbor", "y_93.3.cbor"]);
        assert_eq!(saver.record().best(), Some(93.3));
    }

    #[test]
    fn saver_skips_zero_reward() {
        let root = tempdir().unwrap();
        let mut saver = BestModelSaver::new(root.path(), "deepq", any_time_selection());
        let policies = PerAxis::new(ScriptedPolicy::new(16, 3), ScriptedPolicy::new(16, 7));
        saver.on_episode_end(&snapshot(&policies, 0.0), &mut ());
        assert_eq!(saver.retained(), &PerAxis::new(None, None));
        assert!(!root.path().join("models").exists());
    }
}
