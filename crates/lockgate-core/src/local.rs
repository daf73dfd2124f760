//! In-process lock primitive.
//!
//! Backs the memory clients shipped with the backend crates, which stand in
//! for real store clients in tests and in the simulator. A [`LockCell`] is the
//! shared server-side state of one lock name; a [`LocalLock`] is a handle onto
//! a cell with a fixed access mode. Read and write handles of one group point
//! at the same cell.
//!
//! Holds are per [`LockOwner`] and counted, so an owner may re-acquire what it
//! already holds. A hold may carry a lease after which it disappears on its
//! own. Fair handles queue by arrival and are granted in that order.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use crate::{ClientError, LockOwner};

/// Upper bound on a single condvar wait when the caller set no deadline.
const MAX_PARK: Duration = Duration::from_secs(60);

/// Access mode of a handle onto a cell.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Access {
    Exclusive,
    Read,
    Write,
}

#[derive(Debug, Clone, Copy)]
struct Hold {
    count: u32,
    expires_at: Option<Instant>,
}

impl Hold {
    fn new(lease: Option<Duration>, now: Instant) -> Self {
        Self {
            count: 1,
            expires_at: lease.and_then(|lease| now.checked_add(lease)),
        }
    }

    fn renew(&mut self, lease: Option<Duration>, now: Instant) {
        self.count += 1;
        self.expires_at = lease.and_then(|lease| now.checked_add(lease));
    }

    fn is_expired(&self, now: Instant) -> bool {
        self.expires_at.is_some_and(|at| at <= now)
    }
}

#[derive(Debug, Default)]
struct CellState {
    writer: Option<(LockOwner, Hold)>,
    readers: HashMap<LockOwner, Hold>,
    queue: VecDeque<u64>,
    next_ticket: u64,
}

impl CellState {
    fn purge_expired(&mut self, now: Instant) -> bool {
        let mut changed = false;
        if self
            .writer
            .as_ref()
            .is_some_and(|(_, hold)| hold.is_expired(now))
        {
            self.writer = None;
            changed = true;
        }
        let before = self.readers.len();
        self.readers.retain(|_, hold| !hold.is_expired(now));
        changed || self.readers.len() != before
    }

    fn next_expiry(&self) -> Option<Instant> {
        self.writer
            .iter()
            .map(|(_, hold)| hold)
            .chain(self.readers.values())
            .filter_map(|hold| hold.expires_at)
            .min()
    }

    fn holds(&self, owner: LockOwner, access: Access) -> bool {
        match access {
            Access::Exclusive | Access::Write => {
                matches!(&self.writer, Some((holder, _)) if *holder == owner)
            }
            Access::Read => self.readers.contains_key(&owner),
        }
    }

    fn holds_any(&self, owner: LockOwner) -> bool {
        self.holds(owner, Access::Write) || self.holds(owner, Access::Read)
    }

    fn can_grant(&self, owner: LockOwner, access: Access) -> bool {
        match (access, &self.writer) {
            (_, Some((holder, _))) => *holder == owner,
            // No upgrade: a writer waits for every reader, itself included.
            (Access::Exclusive | Access::Write, None) => self.readers.is_empty(),
            (Access::Read, None) => true,
        }
    }

    fn grant(&mut self, owner: LockOwner, access: Access, lease: Option<Duration>, now: Instant) {
        match access {
            Access::Exclusive | Access::Write => {
                if let Some((_, hold)) = self.writer.as_mut() {
                    hold.renew(lease, now);
                } else {
                    self.writer = Some((owner, Hold::new(lease, now)));
                }
            }
            Access::Read => {
                self.readers
                    .entry(owner)
                    .and_modify(|hold| hold.renew(lease, now))
                    .or_insert_with(|| Hold::new(lease, now));
            }
        }
    }

    fn release(&mut self, owner: LockOwner, access: Access) -> bool {
        match access {
            Access::Exclusive | Access::Write => {
                let Some((holder, hold)) = self.writer.as_mut() else {
                    return false;
                };
                if *holder != owner {
                    return false;
                }
                hold.count -= 1;
                if hold.count == 0 {
                    self.writer = None;
                }
            }
            Access::Read => {
                let Some(hold) = self.readers.get_mut(&owner) else {
                    return false;
                };
                hold.count -= 1;
                if hold.count == 0 {
                    self.readers.remove(&owner);
                }
            }
        }
        true
    }
}

/// Shared state of one lock name.
#[derive(Debug, Default)]
pub struct LockCell {
    state: Mutex<CellState>,
    wake: Condvar,
}

impl LockCell {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, CellState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Drop every hold, as a store does when the session owning them ends.
    pub fn clear(&self) {
        let mut state = self.state();
        state.writer = None;
        state.readers.clear();
        drop(state);
        self.wake.notify_all();
    }

    /// Whether anyone holds the cell in any mode.
    pub fn is_locked(&self) -> bool {
        let mut state = self.state();
        state.purge_expired(Instant::now());
        state.writer.is_some() || !state.readers.is_empty()
    }
}

/// A handle onto a [`LockCell`] with a fixed access mode.
#[derive(Debug, Clone)]
pub struct LocalLock {
    name: String,
    cell: Arc<LockCell>,
    access: Access,
    fair: bool,
}

impl LocalLock {
    pub fn new(name: impl Into<String>, cell: Arc<LockCell>, access: Access, fair: bool) -> Self {
        Self {
            name: name.into(),
            cell,
            access,
            fair,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn access(&self) -> Access {
        self.access
    }

    pub fn is_fair(&self) -> bool {
        self.fair
    }

    /// Block up to `wait` for the lock. `lease` bounds the hold; `None`
    /// holds until released.
    pub fn try_acquire(&self, owner: LockOwner, wait: Duration, lease: Option<Duration>) -> bool {
        let deadline = Instant::now().checked_add(wait);
        let mut state = self.cell.state();

        let ticket = self.fair.then(|| {
            let ticket = state.next_ticket;
            state.next_ticket += 1;
            state.queue.push_back(ticket);
            ticket
        });

        loop {
            let now = Instant::now();
            if state.purge_expired(now) {
                self.cell.wake.notify_all();
            }

            let first_in_line = ticket.is_none_or(|ticket| state.queue.front() == Some(&ticket));
            // Reentry never queues behind strangers.
            if (first_in_line || state.holds_any(owner)) && state.can_grant(owner, self.access) {
                if let Some(ticket) = ticket {
                    state.queue.retain(|queued| *queued != ticket);
                    self.cell.wake.notify_all();
                }
                state.grant(owner, self.access, lease, now);
                return true;
            }

            let remaining = match deadline {
                Some(deadline) if now >= deadline => {
                    if let Some(ticket) = ticket {
                        state.queue.retain(|queued| *queued != ticket);
                        self.cell.wake.notify_all();
                    }
                    return false;
                }
                Some(deadline) => deadline - now,
                None => MAX_PARK,
            };
            let park = state
                .next_expiry()
                .map_or(remaining, |at| remaining.min(at.saturating_duration_since(now)));

            let (next, _) = self
                .cell
                .wake
                .wait_timeout(state, park)
                .unwrap_or_else(PoisonError::into_inner);
            state = next;
        }
    }

    pub fn is_held_by(&self, owner: LockOwner) -> bool {
        let mut state = self.cell.state();
        state.purge_expired(Instant::now());
        state.holds(owner, self.access)
    }

    /// Release one hold of `owner`.
    pub fn release(&self, owner: LockOwner) -> Result<(), ClientError> {
        let mut state = self.cell.state();
        state.purge_expired(Instant::now());
        if !state.release(owner, self.access) {
            return Err(ClientError::NotOwner(format!(
                "{} is not held by {}",
                self.name, owner
            )));
        }
        drop(state);
        self.cell.wake.notify_all();
        Ok(())
    }

    pub fn is_locked(&self) -> bool {
        self.cell.is_locked()
    }
}
