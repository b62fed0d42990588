//! Sliding-window behavior analysis.
//!
//! Occupancy samples are buffered for the most recent `behavior_check_window`.
//! A behavioral event is the fraction of those samples whose occupancy lies in
//! a configured band reaching a threshold.

use chrono::{Duration, NaiveDateTime};
use image::RgbImage;
use std::collections::VecDeque;

/// One detection cycle's result.
#[derive(Debug, Clone)]
pub struct Sample {
    pub timestamp: NaiveDateTime,
    pub occupancy: u32,
    /// Annotated, downsampled crop kept for the event clip
    pub thumbnail: RgbImage,
}

/// Parameters of the behavior condition.
#[derive(Debug, Clone)]
pub struct BehaviorConfig {
    /// Maximum span between oldest and newest buffered sample
    pub window: Duration,
    /// Inclusive occupancy band
    pub min_individuals: u32,
    pub max_individuals: u32,
    /// Activity fraction at or above which the behavior holds
    pub min_fraction: f64,
}

/// Time-bounded buffer of samples, ordered by arrival.
#[derive(Debug)]
pub struct BehaviorAnalyzer {
    config: BehaviorConfig,
    buffer: VecDeque<Sample>,
}

impl BehaviorAnalyzer {
    pub fn new(config: BehaviorConfig) -> Self {
        Self {
            config,
            buffer: VecDeque::new(),
        }
    }

    pub fn config(&self) -> &BehaviorConfig {
        &self.config
    }

    /// Append a sample and evict everything that no longer fits the window.
    pub fn append(&mut self, sample: Sample) {
        self.buffer.push_back(sample);
        while self.buffer.len() >= 2 && self.span() > self.config.window {
            self.buffer.pop_front();
        }
    }

    /// Newest minus oldest timestamp; zero for fewer than two samples.
    pub fn span(&self) -> Duration {
        match (self.buffer.front(), self.buffer.back()) {
            (Some(oldest), Some(newest)) => newest.timestamp - oldest.timestamp,
            _ => Duration::zero(),
        }
    }

    /// Fraction of buffered samples inside the occupancy band.
    ///
    /// `None` when the buffer is empty. A single sample yields exactly 0 or 1,
    /// which callers should not trust on its own.
    pub fn activity_fraction(&self) -> Option<f64> {
        if self.buffer.is_empty() {
            return None;
        }
        let band = self.config.min_individuals..=self.config.max_individuals;
        let active = self
            .buffer
            .iter()
            .filter(|s| band.contains(&s.occupancy))
            .count();
        Some(active as f64 / self.buffer.len() as f64)
    }

    /// Whether the activity fraction reaches the notification threshold.
    pub fn check_for_behavior(&self) -> bool {
        self.activity_fraction()
            .map(|fraction| fraction >= self.config.min_fraction)
            .unwrap_or(false)
    }

    pub fn samples(&self) -> impl Iterator<Item = &Sample> {
        self.buffer.iter()
    }

    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    /// Drop every buffered sample.
    pub fn reset(&mut self) {
        self.buffer.clear();
    }
}
