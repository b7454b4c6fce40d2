//! Rolling episode statistics
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

/// Number of completed episodes kept in each window.
pub const WINDOW: usize = 100;

/// Derived means over the completed-episode windows.
#[derive(Debug, Default, Copy, Clone, PartialEq, Serialize, Deserialize)]
pub struct EpisodeMeans {
    /// Mean total (scaled) reward per episode
    pub reward: f64,
    /// Mean number of beacon captures per episode
    pub beacons: f64,
    /// Mean of the per-episode average time between captures.
    ///
    /// `None` when no episode in the window had a capture.
    pub beacon_time: Option<f64>,
}

#[derive(Debug, Default, Copy, Clone, PartialEq)]
struct EpisodeTotals {
    reward: f64,
    beacons: f64,
    beacon_time: f64,
}

/// Bounded rolling windows of per-episode reward, captures and capture timing.
#[derive(Debug, Clone, PartialEq)]
pub struct EpisodeStatistics {
    rewards: VecDeque<f64>,
    beacons: VecDeque<f64>,
    beacon_times: VecDeque<f64>,
    /// Average time between captures; `None` for episodes without a capture
    average_beacon_times: VecDeque<Option<f64>>,
    current: EpisodeTotals,
}

impl Default for EpisodeStatistics {
    fn default() -> Self {
        Self::new()
    }
}

fn push_bounded<T>(window: &mut VecDeque<T>, value: T) {
    if window.len() == WINDOW {
        window.pop_front();
    }
    window.push_back(value);
}

/// Round to one decimal place, the precision of reported and compared means.
pub fn round1(x: f64) -> f64 {
    (x * 10.0).round() / 10.0
}

fn mean<'a, I: IntoIterator<Item = &'a f64>>(values: I) -> Option<f64> {
    let (sum, count) = values
        .into_iter()
        .fold((0.0, 0_u32), |(sum, count), v| (sum + v, count + 1));
    if count == 0 {
        None
    } else {
        Some(sum / f64::from(count))
    }
}

impl EpisodeStatistics {
    pub fn new() -> Self {
        Self {
            rewards: VecDeque::with_capacity(WINDOW),
            beacons: VecDeque::with_capacity(WINDOW),
            beacon_times: VecDeque::with_capacity(WINDOW),
            average_beacon_times: VecDeque::with_capacity(WINDOW),
            current: EpisodeTotals::default(),
        }
    }

    /// Add one step to the current episode.
    ///
    /// * `reward` - scaled step reward
    /// * `beacons` - raw environment reward, counted as captures
    /// * `beacon_time` - steps since the previous capture if this step captured, else 0
    pub fn record_step(&mut self, reward: f64, beacons: f64, beacon_time: f64) {
        self.current.reward += reward;
        self.current.beacons += beacons;
        self.current.beacon_time += beacon_time;
    }

    /// Close the current episode, push its totals into the windows and start a new one.
    pub fn end_episode(&mut self) {
        let totals = std::mem::take(&mut self.current);
        push_bounded(&mut self.rewards, totals.reward);
        push_bounded(&mut self.beacons, totals.beacons);
        push_bounded(&mut self.beacon_times, totals.beacon_time);
        let average = if totals.beacons > 0.0 {
            Some(totals.beacon_time / totals.beacons)
        } else {
            None
        };
        push_bounded(&mut self.average_beacon_times, average);
    }

    /// Means over the completed episodes in the window.
    pub fn means(&self) -> EpisodeMeans {
        EpisodeMeans {
            reward: mean(&self.rewards).unwrap_or(0.0),
            beacons: mean(&self.beacons).unwrap_or(0.0),
            beacon_time: mean(self.average_beacon_times.iter().flatten()),
        }
    }

    /// Number of completed episodes currently in the window.
    pub fn len(&self) -> usize {
        self.rewards.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rewards.is_empty()
    }

    /// Per-episode rewards in the window, oldest first.
    pub fn rewards(&self) -> impl Iterator<Item = f64> + '_ {
        self.rewards.iter().copied()
    }

    /// Per-episode capture counts in the window, oldest first.
    pub fn beacons(&self) -> impl Iterator<Item = f64> + '_ {
        self.beacons.iter().copied()
    }

    /// Per-episode average time between captures, oldest first.
    pub fn average_beacon_times(&self) -> impl Iterator<Item = Option<f64>> + '_ {
        self.average_beacon_times.iter().copied()
    }
}
