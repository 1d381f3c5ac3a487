use serde::Serialize;

use crate::models::WorkSession;

/// Finalized sessions, newest first. Only the session manager appends.
#[derive(Debug, Clone, Default, Serialize)]
#[serde(transparent)]
pub struct HistoryStore {
    sessions: Vec<WorkSession>,
}

impl HistoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start from already-finalized sessions, e.g. a demo seed. Anything not
    /// finalized is dropped; the rest is ordered newest first.
    pub fn seeded(sessions: Vec<WorkSession>) -> Self {
        let mut sessions: Vec<WorkSession> = sessions
            .into_iter()
            .filter(WorkSession::is_finalized)
            .collect();
        sessions.sort_by(|a, b| b.end_time.cmp(&a.end_time));
        Self { sessions }
    }

    pub(crate) fn push_front(&mut self, session: WorkSession) {
        self.sessions.insert(0, session);
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    pub fn latest(&self) -> Option<&WorkSession> {
        self.sessions.first()
    }

    pub fn iter(&self) -> impl Iterator<Item = &WorkSession> {
        self.sessions.iter()
    }

    pub fn as_slice(&self) -> &[WorkSession] {
        &self.sessions
    }

    pub fn total_worked_ms(&self) -> u64 {
        self.sessions.iter().filter_map(|s| s.net_worked_ms).sum()
    }
}

#[cfg(test)]
mod tests {
    use chrono::{DateTime, Duration, Utc};

    use super::*;
    use crate::models::{LocationSample, StillImage, VerifiedCapture};

    fn capture(at: DateTime<Utc>) -> VerifiedCapture {
        VerifiedCapture {
            photo: StillImage {
                jpeg: vec![0xFF, 0xD8, 0xFF, 0xD9],
                width: 1,
                height: 1,
            },
            location: LocationSample {
                latitude: 58.3585,
                longitude: 24.5365,
                accuracy_m: 10.0,
                captured_at: at,
            },
            distance_m: 0,
            confirmed_at: at,
        }
    }

    fn finished(id: &str, start: DateTime<Utc>, hours: i64) -> WorkSession {
        let mut session = WorkSession::begin(id.into(), start, capture(start), None);
        let end = start + Duration::hours(hours);
        session.end_time = Some(end);
        session.net_worked_ms = Some(hours as u64 * 3_600_000);
        session
    }

    #[test]
    fn seeded_drops_open_sessions_and_sorts_newest_first() {
        let t0 = DateTime::<Utc>::from_timestamp(1_767_254_400, 0).unwrap();
        let open = WorkSession::begin("open".into(), t0, capture(t0), None);
        let store = HistoryStore::seeded(vec![
            finished("monday", t0, 8),
            open,
            finished("wednesday", t0 + Duration::days(2), 6),
            finished("tuesday", t0 + Duration::days(1), 7),
        ]);

        let ids: Vec<_> = store.iter().map(|s| s.id.as_str()).collect();
        assert_eq!(ids, ["wednesday", "tuesday", "monday"]);
        assert_eq!(store.latest().unwrap().id, "wednesday");
        assert_eq!(store.total_worked_ms(), 21 * 3_600_000);
    }

    #[test]
    fn push_front_keeps_latest_first() {
        let t0 = DateTime::<Utc>::from_timestamp(1_767_254_400, 0).unwrap();
        let mut store = HistoryStore::new();
        assert!(store.is_empty());

        store.push_front(finished("first", t0, 1));
        store.push_front(finished("second", t0 + Duration::hours(2), 1));

        assert_eq!(store.len(), 2);
        assert_eq!(store.as_slice()[0].id, "second");
    }

    #[test]
    fn serializes_as_plain_array() {
        let store = HistoryStore::new();
        assert_eq!(serde_json::to_string(&store).unwrap(), "[]");
    }
}
