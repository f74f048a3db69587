//! Short-lived hand-off between the upload that produced stems and the
//! download requests that fetch them.

use std::{
    collections::HashMap,
    time::{Duration, Instant},
};

use parking_lot::Mutex;
use uuid::Uuid;

use crate::core::package::PackagedStem;

#[derive(Clone, Debug)]
pub struct Job {
    pub track: String,
    pub stems: Vec<PackagedStem>,
    created: Instant,
}

impl Job {
    pub fn stem(&self, file_name: &str) -> Option<&PackagedStem> {
        self.stems.iter().find(|s| s.file_name == file_name)
    }
}

/// In-memory job store keyed by a random request id. Entries older than the
/// ttl are invisible to lookups and removed by [`StemStore::purge_expired`].
pub struct StemStore {
    ttl: Duration,
    jobs: Mutex<HashMap<Uuid, Job>>,
}

impl StemStore {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            jobs: Mutex::new(HashMap::new()),
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    pub fn insert(&self, track: impl Into<String>, stems: Vec<PackagedStem>) -> Uuid {
        let id = Uuid::new_v4();
        let job = Job {
            track: track.into(),
            stems,
            created: Instant::now(),
        };
        self.jobs.lock().insert(id, job);
        id
    }

    fn is_live(&self, job: &Job, now: Instant) -> bool {
        now.duration_since(job.created) < self.ttl
    }

    pub fn job(&self, id: &Uuid) -> Option<Job> {
        let jobs = self.jobs.lock();
        jobs.get(id)
            .filter(|job| self.is_live(job, Instant::now()))
            .cloned()
    }

    pub fn get(&self, id: &Uuid, file_name: &str) -> Option<PackagedStem> {
        let jobs = self.jobs.lock();
        jobs.get(id)
            .filter(|job| self.is_live(job, Instant::now()))
            .and_then(|job| job.stem(file_name))
            .cloned()
    }

    /// Drops expired jobs, returning how many were removed.
    pub fn purge_expired(&self) -> usize {
        let now = Instant::now();
        let mut jobs = self.jobs.lock();
        let before = jobs.len();
        jobs.retain(|_, job| now.duration_since(job.created) < self.ttl);
        before - jobs.len()
    }

    pub fn len(&self) -> usize {
        self.jobs.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
