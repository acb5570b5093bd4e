//! Scripted location sensor for tests/dev.

use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use chrono::Utc;

use crate::{AcquisitionOptions, Coordinate, LocationSensor, PositionFix, SensorFailure};

/// What the scripted sensor answers with.
#[derive(Debug, Clone, PartialEq)]
pub enum SensorBehavior {
    /// Answer with this fix.
    Fix(PositionFix),
    /// Answer with a fresh fix at this coordinate (stamped at request time).
    At(Coordinate),
    Deny,
    Fail(String),
    /// Never answer.
    Hang,
}

/// In-memory [`LocationSensor`].
///
/// - No IO
/// - Counts requests and releases so tests can check the handle discipline
#[derive(Debug)]
pub struct ScriptedSensor {
    behavior: Mutex<SensorBehavior>,
    requests: AtomicUsize,
    releases: AtomicUsize,
}

impl ScriptedSensor {
    pub fn new(behavior: SensorBehavior) -> Self {
        Self {
            behavior: Mutex::new(behavior),
            requests: AtomicUsize::new(0),
            releases: AtomicUsize::new(0),
        }
    }

    /// Sensor that always reports a fresh fix at `coordinate`.
    pub fn fixed(coordinate: Coordinate) -> Self {
        Self::new(SensorBehavior::At(coordinate))
    }

    pub fn set_behavior(&self, behavior: SensorBehavior) {
        if let Ok(mut current) = self.behavior.lock() {
            *current = behavior;
        }
    }

    pub fn requests(&self) -> usize {
        self.requests.load(Ordering::SeqCst)
    }

    pub fn releases(&self) -> usize {
        self.releases.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl LocationSensor for ScriptedSensor {
    async fn current_position(
        &self,
        _options: &AcquisitionOptions,
    ) -> Result<PositionFix, SensorFailure> {
        self.requests.fetch_add(1, Ordering::SeqCst);

        let behavior = self
            .behavior
            .lock()
            .map(|b| b.clone())
            .map_err(|_| SensorFailure::Unavailable("sensor state poisoned".to_string()))?;

        match behavior {
            SensorBehavior::Fix(fix) => Ok(fix),
            SensorBehavior::At(coordinate) => Ok(PositionFix::new(coordinate, Utc::now())),
            SensorBehavior::Deny => Err(SensorFailure::PermissionDenied),
            SensorBehavior::Fail(detail) => Err(SensorFailure::Unavailable(detail)),
            SensorBehavior::Hang => std::future::pending().await,
        }
    }

    fn release(&self) {
        self.releases.fetch_add(1, Ordering::SeqCst);
    }
}
