//! Matching of replies to outstanding read requests.
use std::collections::HashMap;
use std::time::Duration;

use cscp_protocol::{Command, RequestKey};
use tokio::sync::oneshot;
use tokio::time::Instant;

use crate::error::{ClientError, Result};

/// Completion side of a read request.
pub type Responder<T> = oneshot::Sender<Result<T>>;

struct Pending<T> {
    command: Command,
    responder: Responder<T>,
    created: Instant,
    deadline: Instant,
    seq: u64,
}

/// Outstanding read requests, at most one per [`RequestKey`].
///
/// Deadlines are stored rather than timers; the owner calls
/// [`RequestCorrelator::expire`] when [`RequestCorrelator::next_deadline`] passes.
pub struct RequestCorrelator<T> {
    pending: HashMap<RequestKey, Pending<T>>,
    next_seq: u64,
}

impl<T> Default for RequestCorrelator<T> {
    fn default() -> Self {
        RequestCorrelator {
            pending: HashMap::new(),
            next_seq: 0,
        }
    }
}

impl<T> RequestCorrelator<T> {
    pub fn new() -> RequestCorrelator<T> {
        RequestCorrelator::default()
    }

    /// Registers a request sent at `now`. An entry already waiting on the
    /// same key is replaced and rejected with [`ClientError::Superseded`].
    pub fn register(
        &mut self,
        key: RequestKey,
        command: Command,
        responder: Responder<T>,
        now: Instant,
        timeout: Duration,
    ) {
        let seq = self.next_seq;
        self.next_seq += 1;
        let entry = Pending {
            command,
            responder,
            created: now,
            deadline: now + timeout,
            seq,
        };
        log::trace!("Awaiting reply for {}", key);
        if let Some(previous) = self.pending.insert(key, entry) {
            log::warn!("Request for {} replaced an unanswered one", key);
            let _ = previous.responder.send(Err(ClientError::Superseded {
                command: previous.command.name(),
            }));
        }
    }

    /// Takes the entry waiting on `key`, if any.
    pub fn take(&mut self, key: &RequestKey) -> Option<(Command, Responder<T>)> {
        self.pending
            .remove(key)
            .map(|entry| (entry.command, entry.responder))
    }

    /// Rejects the longest waiting request; returns false if none is pending.
    pub fn reject_oldest(&mut self, error: ClientError) -> bool {
        let oldest = self
            .pending
            .iter()
            .min_by_key(|(_, entry)| (entry.created, entry.seq))
            .map(|(key, _)| *key);
        match oldest.and_then(|key| self.pending.remove(&key)) {
            Some(entry) => {
                let _ = entry.responder.send(Err(error));
                true
            }
            None => false,
        }
    }

    /// Rejects every request whose deadline is at or before `now`.
    pub fn expire(&mut self, now: Instant) -> usize {
        let expired: Vec<RequestKey> = self
            .pending
            .iter()
            .filter(|(_, entry)| entry.deadline <= now)
            .map(|(key, _)| *key)
            .collect();
        for key in &expired {
            if let Some(entry) = self.pending.remove(key) {
                log::warn!("Request {} ({}) timed out", key, entry.command.name());
                let _ = entry.responder.send(Err(ClientError::Timeout {
                    command: entry.command.name(),
                }));
            }
        }
        expired.len()
    }

    /// Rejects everything still pending with `error`.
    pub fn reject_all(&mut self, error: ClientError) {
        for (_, entry) in self.pending.drain() {
            let _ = entry.responder.send(Err(error.clone()));
        }
    }

    pub fn next_deadline(&self) -> Option<Instant> {
        self.pending.values().map(|entry| entry.deadline).min()
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    pub fn contains(&self, key: &RequestKey) -> bool {
        self.pending.contains_key(key)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use tokio::sync::oneshot::error::TryRecvError;

    const TIMEOUT: Duration = Duration::from_millis(100);

    fn fader_key(id: u16) -> RequestKey {
        RequestKey::new(Command::FaderLevel.code(), Some(id))
    }

    #[test]
    fn register_then_take() {
        let mut correlator = RequestCorrelator::<u16>::new();
        let (tx, mut rx) = oneshot::channel();
        correlator.register(fader_key(1), Command::FaderLevel, tx, Instant::now(), TIMEOUT);
        assert_eq!(correlator.len(), 1);
        let (command, responder) = correlator.take(&fader_key(1)).unwrap();
        assert_eq!(command, Command::FaderLevel);
        responder.send(Ok(512)).unwrap();
        assert_eq!(rx.try_recv().unwrap().unwrap(), 512);
        assert!(correlator.is_empty());
        assert!(correlator.take(&fader_key(1)).is_none());
    }

    #[test]
    fn keys_are_independent() {
        let mut correlator = RequestCorrelator::<u16>::new();
        let now = Instant::now();
        let (tx1, _rx1) = oneshot::channel();
        let (tx2, _rx2) = oneshot::channel();
        correlator.register(fader_key(1), Command::FaderLevel, tx1, now, TIMEOUT);
        correlator.register(fader_key(2), Command::FaderLevel, tx2, now, TIMEOUT);
        assert_eq!(correlator.len(), 2);
        assert!(correlator.take(&fader_key(2)).is_some());
        assert!(correlator.contains(&fader_key(1)));
    }

    #[test]
    fn second_registration_supersedes_first() {
        let mut correlator = RequestCorrelator::<u16>::new();
        let now = Instant::now();
        let (tx1, mut rx1) = oneshot::channel();
        let (tx2, mut rx2) = oneshot::channel();
        correlator.register(fader_key(1), Command::FaderLevel, tx1, now, TIMEOUT);
        correlator.register(fader_key(1), Command::FaderLevel, tx2, now, TIMEOUT);
        assert_eq!(correlator.len(), 1);
        assert!(matches!(
            rx1.try_recv().unwrap(),
            Err(ClientError::Superseded { command: "fader level" })
        ));
        assert!(matches!(rx2.try_recv(), Err(TryRecvError::Empty)));
    }

    #[test]
    fn expires_after_deadline() {
        let mut correlator = RequestCorrelator::<u16>::new();
        let now = Instant::now();
        let (tx, mut rx) = oneshot::channel();
        correlator.register(fader_key(1), Command::FaderLevel, tx, now, TIMEOUT);
        assert_eq!(correlator.next_deadline(), Some(now + TIMEOUT));
        assert_eq!(correlator.expire(now + Duration::from_millis(99)), 0);
        assert_eq!(correlator.expire(now + TIMEOUT), 1);
        assert!(correlator.is_empty());
        assert!(matches!(
            rx.try_recv().unwrap(),
            Err(ClientError::Timeout { command: "fader level" })
        ));
    }

    #[test]
    fn nak_rejects_oldest() {
        let mut correlator = RequestCorrelator::<u16>::new();
        let now = Instant::now();
        let (tx1, mut rx1) = oneshot::channel();
        let (tx2, mut rx2) = oneshot::channel();
        correlator.register(fader_key(2), Command::FaderLevel, tx1, now, TIMEOUT);
        correlator.register(fader_key(1), Command::FaderLevel, tx2, now, TIMEOUT);
        let reasons = cscp_protocol::NakReasons::COMMAND_NOT_SUPPORTED;
        assert!(correlator.reject_oldest(ClientError::Nak { reasons }));
        assert!(matches!(rx1.try_recv().unwrap(), Err(ClientError::Nak { .. })));
        assert!(matches!(rx2.try_recv(), Err(TryRecvError::Empty)));
        assert!(correlator.reject_oldest(ClientError::Nak { reasons }));
        assert!(!correlator.reject_oldest(ClientError::Nak { reasons }));
    }

    #[test]
    fn reject_all_clears_everything() {
        let mut correlator = RequestCorrelator::<u16>::new();
        let now = Instant::now();
        let (tx1, mut rx1) = oneshot::channel();
        let (tx2, mut rx2) = oneshot::channel();
        correlator.register(fader_key(1), Command::FaderLevel, tx1, now, TIMEOUT);
        let info_key = RequestKey::new(Command::ConsoleInfo.code(), None);
        correlator.register(info_key, Command::ConsoleInfo, tx2, now, TIMEOUT);
        correlator.reject_all(ClientError::NotConnected);
        assert!(correlator.is_empty());
        assert_eq!(correlator.next_deadline(), None);
        assert!(matches!(rx1.try_recv().unwrap(), Err(ClientError::NotConnected)));
        assert!(matches!(rx2.try_recv().unwrap(), Err(ClientError::NotConnected)));
    }
}
