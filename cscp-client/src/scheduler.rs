//! Two-lane outbound queue enforcing the console's command spacing.
use std::collections::VecDeque;
use std::time::Duration;

use tokio::time::Instant;

/// The queue a command waits in.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum Lane {
    General,
    FaderLevel,
}

/// Outcome of asking the scheduler what to do at a given instant.
#[derive(Debug, Eq, PartialEq)]
pub enum Tick<T> {
    /// Send this entry now.
    Send(T),
    /// Nothing may be sent before this instant.
    WaitUntil(Instant),
    /// Both lanes are empty.
    Idle,
}

/// Releases queued commands so that no two sends are closer than the
/// global spacing and no two fader level sends are closer than the fader
/// spacing. Fader level traffic goes first whenever its cooldown allows;
/// general commands fill the gaps.
///
/// The scheduler never reads the clock itself; callers pass `now`.
#[derive(Debug)]
pub struct CommandScheduler<T> {
    general: VecDeque<T>,
    fader: VecDeque<T>,
    last_send: Option<Instant>,
    last_fader_send: Option<Instant>,
    global_spacing: Duration,
    fader_spacing: Duration,
}

impl<T> CommandScheduler<T> {
    pub fn new(global_spacing: Duration, fader_spacing: Duration) -> CommandScheduler<T> {
        CommandScheduler {
            general: VecDeque::new(),
            fader: VecDeque::new(),
            last_send: None,
            last_fader_send: None,
            global_spacing,
            fader_spacing: fader_spacing.max(global_spacing),
        }
    }

    /// Updates both spacings; the fader spacing is raised to the global one if shorter.
    pub fn set_spacing(&mut self, global_spacing: Duration, fader_spacing: Duration) {
        self.global_spacing = global_spacing;
        self.fader_spacing = fader_spacing.max(global_spacing);
    }

    pub fn enqueue(&mut self, lane: Lane, entry: T) {
        match lane {
            Lane::General => self.general.push_back(entry),
            Lane::FaderLevel => self.fader.push_back(entry),
        }
    }

    pub fn len(&self) -> usize {
        self.general.len() + self.fader.len()
    }

    pub fn is_empty(&self) -> bool {
        self.general.is_empty() && self.fader.is_empty()
    }

    /// Decides what may happen at `now`. A returned entry counts as sent at `now`.
    pub fn tick(&mut self, now: Instant) -> Tick<T> {
        if self.is_empty() {
            return Tick::Idle;
        }
        if let Some(last) = self.last_send {
            let ready_at = last + self.global_spacing;
            if now < ready_at {
                return Tick::WaitUntil(ready_at);
            }
        }
        let fader_ready_at = self.last_fader_send.map(|last| last + self.fader_spacing);
        let fader_ready = fader_ready_at.is_none_or(|at| now >= at);

        if fader_ready {
            if let Some(entry) = self.fader.pop_front() {
                self.last_send = Some(now);
                self.last_fader_send = Some(now);
                return Tick::Send(entry);
            }
        }
        if let Some(entry) = self.general.pop_front() {
            self.last_send = Some(now);
            return Tick::Send(entry);
        }
        // Only fader entries remain and their cooldown is still running.
        match fader_ready_at {
            Some(at) => Tick::WaitUntil(at),
            None => Tick::Idle,
        }
    }

    /// Removes every queued entry, fader lane first.
    pub fn drain(&mut self) -> Vec<T> {
        self.fader.drain(..).chain(self.general.drain(..)).collect()
    }

    /// Forgets send history, e.g. for a fresh connection.
    pub fn reset(&mut self) {
        self.last_send = None;
        self.last_fader_send = None;
    }
}

#[cfg(test)]
mod test {
    use super::*;

    const GLOBAL: Duration = Duration::from_millis(10);
    const FADER: Duration = Duration::from_millis(40);

    /// Runs the scheduler to completion, jumping the clock to each wake time.
    fn run(scheduler: &mut CommandScheduler<(Lane, u32)>, start: Instant) -> Vec<(Instant, Lane, u32)> {
        let mut now = start;
        let mut sent = Vec::new();
        loop {
            match scheduler.tick(now) {
                Tick::Send((lane, id)) => sent.push((now, lane, id)),
                Tick::WaitUntil(at) => {
                    assert!(at > now);
                    now = at;
                }
                Tick::Idle => return sent,
            }
        }
    }

    fn filled(pattern: &[Lane]) -> CommandScheduler<(Lane, u32)> {
        let mut scheduler = CommandScheduler::new(GLOBAL, FADER);
        for (id, lane) in pattern.iter().enumerate() {
            scheduler.enqueue(*lane, (*lane, id as u32));
        }
        scheduler
    }

    #[test]
    fn idle_when_empty() {
        let mut scheduler: CommandScheduler<u32> = CommandScheduler::new(GLOBAL, FADER);
        assert_eq!(scheduler.tick(Instant::now()), Tick::Idle);
    }

    #[test]
    fn respects_global_spacing() {
        let start = Instant::now();
        let mut scheduler = CommandScheduler::new(GLOBAL, FADER);
        scheduler.enqueue(Lane::General, 1);
        scheduler.enqueue(Lane::General, 2);
        assert_eq!(scheduler.tick(start), Tick::Send(1));
        assert_eq!(scheduler.tick(start + Duration::from_millis(3)), Tick::WaitUntil(start + GLOBAL));
        assert_eq!(scheduler.tick(start + GLOBAL), Tick::Send(2));
        assert_eq!(scheduler.tick(start + GLOBAL), Tick::Idle);
    }

    #[test]
    fn fader_lane_goes_first_and_general_fills_gaps() {
        use Lane::*;
        let mut scheduler = filled(&[General, General, FaderLevel, FaderLevel, General]);
        let start = Instant::now();
        let order: Vec<(Duration, u32)> = run(&mut scheduler, start)
            .into_iter()
            .map(|(at, _, id)| (at - start, id))
            .collect();
        let ms = Duration::from_millis;
        assert_eq!(
            order,
            vec![(ms(0), 2), (ms(10), 0), (ms(20), 1), (ms(30), 4), (ms(40), 3)]
        );
    }

    #[test]
    fn spacing_holds_for_mixed_traffic() {
        use Lane::*;
        let pattern: Vec<Lane> = (0..60)
            .map(|i| if i % 3 == 0 { General } else { FaderLevel })
            .collect();
        let mut scheduler = filled(&pattern);
        let sent = run(&mut scheduler, Instant::now());
        assert_eq!(sent.len(), pattern.len());
        for pair in sent.windows(2) {
            assert!(pair[1].0 - pair[0].0 >= GLOBAL);
        }
        let fader_sends: Vec<Instant> = sent
            .iter()
            .filter(|(_, lane, _)| *lane == FaderLevel)
            .map(|(at, _, _)| *at)
            .collect();
        for pair in fader_sends.windows(2) {
            assert!(pair[1] - pair[0] >= FADER);
        }
    }

    #[test]
    fn lanes_are_fifo() {
        use Lane::*;
        let pattern = [FaderLevel, General, FaderLevel, General, FaderLevel, General];
        let mut scheduler = filled(&pattern);
        let sent = run(&mut scheduler, Instant::now());
        for lane in [General, FaderLevel] {
            let ids: Vec<u32> = sent.iter().filter(|s| s.1 == lane).map(|s| s.2).collect();
            let mut sorted = ids.clone();
            sorted.sort();
            assert_eq!(ids, sorted);
        }
    }

    #[test]
    fn fader_spacing_never_below_global() {
        let start = Instant::now();
        let mut scheduler = CommandScheduler::new(GLOBAL, Duration::from_millis(1));
        scheduler.enqueue(Lane::FaderLevel, 1);
        scheduler.enqueue(Lane::FaderLevel, 2);
        assert_eq!(scheduler.tick(start), Tick::Send(1));
        assert_eq!(scheduler.tick(start + Duration::from_millis(5)), Tick::WaitUntil(start + GLOBAL));
    }

    #[test]
    fn drain_empties_both_lanes() {
        let mut scheduler = CommandScheduler::new(GLOBAL, FADER);
        scheduler.enqueue(Lane::General, 1);
        scheduler.enqueue(Lane::FaderLevel, 2);
        assert_eq!(scheduler.drain(), vec![2, 1]);
        assert!(scheduler.is_empty());
    }
}
