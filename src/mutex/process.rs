//! The per-process admission state machine.
//!
//! | State    | request_cs          | release_cs               | inbound REQUEST              | inbound REPLY             |
//! |----------|---------------------|--------------------------|------------------------------|---------------------------|
//! | RELEASED | -> WANTED, broadcast| rejected                 | reply now                    | unsolicited, ignored      |
//! | WANTED   | resend if the broadcast failed, else rejected | rejected | reply if it precedes ours, else defer | count once per sender; N-1 wakes requester |
//! | HELD     | rejected            | -> RELEASED, reply to deferred | defer                  | unsolicited, ignored      |

use std::collections::HashSet;
use std::sync::{Condvar, Mutex, MutexGuard, PoisonError};
use std::time::Instant;

use log::{debug, error, info, warn};

use super::config::MutexConfig;
use super::error::MutexError;
use super::queue::PendingQueue;
use super::state::{ProcessState, RequestStamp};
use crate::clock::LamportClock;
use crate::net::{Message, MessageTag, Transport};
use crate::{ProcessId, Timestamp};

/// Counters kept by a process over its lifetime.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ProcessStats {
    /// Times this process entered the CS.
    pub entries: u64,
    /// REQUESTs answered on arrival.
    pub immediate_replies: u64,
    /// REQUESTs queued for a reply at release.
    pub deferred_requests: u64,
    /// Deferred REPLYs sent at release.
    pub deferred_replies_sent: u64,
    /// REPLYs that arrived with no outstanding request to count them against.
    pub unsolicited_replies: u64,
}

/// Point-in-time view of a process, for tests and diagnostics.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessSnapshot {
    pub process_id: ProcessId,
    pub state: ProcessState,
    pub clock: Timestamp,
    /// Stamp of the outstanding or held request.
    pub request: Option<RequestStamp>,
    pub num_replies: u32,
    /// Deferred requesters in arrival order.
    pub pending: Vec<ProcessId>,
}

/// Returned by `request_cs` once the process holds the CS.
#[derive(Debug, Clone, Copy)]
pub struct Grant {
    /// Priority of the request that was admitted.
    pub stamp: RequestStamp,
    /// When the process became WANTED.
    pub requested_at: Instant,
    /// When the process became HELD.
    pub granted_at: Instant,
}

/// Returned by `release_cs`.
#[derive(Debug, Clone)]
pub struct Release {
    /// When the process became RELEASED.
    pub released_at: Instant,
    /// Deferred requesters that were sent a REPLY, in send order.
    pub replied_to: Vec<ProcessId>,
}

/// Mutable protocol state. Guarded by `MutexProcess::inner`.
#[derive(Debug, Default)]
struct ProcessInner {
    clock: LamportClock,
    state: ProcessState,
    /// Set from the moment the process becomes WANTED until it releases.
    request: Option<RequestStamp>,
    requested_at: Option<Instant>,
    /// The last broadcast of `request` failed; some peers may not have it.
    unsent: bool,
    /// Peers that answered `request`.
    replied: HashSet<ProcessId>,
    pending: PendingQueue,
    stats: ProcessStats,
}

impl ProcessInner {
    fn num_replies(&self) -> u32 {
        self.replied.len() as u32
    }
}

/// One participant in the mutual exclusion group.
///
/// All state sits behind a single lock; `request_cs`, `release_cs` and every
/// inbound message run as one critical section each. `request_cs` is the only
/// call that blocks, and it gives up the lock while it waits for replies.
pub struct MutexProcess<T: Transport> {
    config: MutexConfig,
    transport: T,
    inner: Mutex<ProcessInner>,
    /// Signalled when the reply count reaches N-1.
    all_replied: Condvar,
}

impl<T: Transport> MutexProcess<T> {
    pub fn new(config: MutexConfig, transport: T) -> Self {
        info!(
            "p{}: started in a group of {}, state {}",
            config.self_id(),
            config.peer_count(),
            ProcessState::Released
        );
        MutexProcess {
            config,
            transport,
            inner: Mutex::new(ProcessInner::default()),
            all_replied: Condvar::new(),
        }
    }

    pub fn id(&self) -> ProcessId {
        self.config.self_id()
    }

    pub fn config(&self) -> &MutexConfig {
        &self.config
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    fn lock_inner(&self) -> MutexGuard<'_, ProcessInner> {
        // Critical sections never panic mid-update, so a poisoned lock still
        // holds consistent state.
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Ask the group for the CS and block until every peer has replied.
    ///
    /// Must be called in RELEASED. On return the process is HELD.
    ///
    /// If the REQUEST broadcast fails the error is returned and the request
    /// stays outstanding: the process remains WANTED with the same stamp and
    /// keeps collecting replies. Calling `request_cs` again resends that stamp
    /// and resumes the wait.
    pub fn request_cs(&self) -> Result<Grant, MutexError> {
        let id = self.config.self_id();
        let needed = self.config.replies_needed();

        let mut inner = self.lock_inner();
        let stamp = match (inner.state, inner.request) {
            (ProcessState::Released, _) => {
                let stamp = RequestStamp::new(inner.clock.tick()?, id);
                inner.state = ProcessState::Wanted;
                inner.request = Some(stamp);
                inner.requested_at = Some(Instant::now());
                inner.replied.clear();
                info!("p{}: WANTED {}", id, stamp);
                stamp
            }
            (ProcessState::Wanted, Some(stamp)) if inner.unsent => {
                info!("p{}: resending REQUEST {}", id, stamp);
                stamp
            }
            (state, _) => {
                error!("p{}: request_cs called while {}", id, state);
                return Err(MutexError::InvalidTransition {
                    operation: "request_cs",
                    state,
                });
            }
        };

        match self.transport.broadcast_to_others(Message::request(stamp.timestamp)) {
            Ok(reached) => {
                inner.unsent = false;
                if reached as u32 != needed {
                    warn!(
                        "p{}: REQUEST {} reached {} peers but {} replies are needed",
                        id, stamp, reached, needed
                    );
                }
            }
            Err(e) => {
                inner.unsent = true;
                error!(
                    "p{}: REQUEST {} broadcast failed, request stays outstanding: {}",
                    id, stamp, e
                );
                return Err(e.into());
            }
        }

        while inner.num_replies() < needed {
            let (guard, wait) = self
                .all_replied
                .wait_timeout_while(inner, self.config.wait_warn_interval(), |i| {
                    i.num_replies() < needed
                })
                .unwrap_or_else(PoisonError::into_inner);
            inner = guard;
            if wait.timed_out() {
                warn!(
                    "p{}: still waiting for replies to {} ({}/{})",
                    id,
                    stamp,
                    inner.num_replies(),
                    needed
                );
            }
        }

        inner.state = ProcessState::Held;
        inner.stats.entries += 1;
        let granted_at = Instant::now();
        let requested_at = inner.requested_at.unwrap_or(granted_at);
        info!("p{}: HELD {}", id, stamp);

        Ok(Grant {
            stamp,
            requested_at,
            granted_at,
        })
    }

    /// Leave the CS and reply to every deferred requester, oldest first.
    ///
    /// Must be called in HELD. If a deferred REPLY cannot be handed to the
    /// transport the remaining ones are still sent and the first error is
    /// returned; the process is RELEASED either way.
    pub fn release_cs(&self) -> Result<Release, MutexError> {
        let id = self.config.self_id();

        let mut inner = self.lock_inner();
        if inner.state != ProcessState::Held {
            error!("p{}: release_cs called while {}", id, inner.state);
            return Err(MutexError::InvalidTransition {
                operation: "release_cs",
                state: inner.state,
            });
        }

        inner.state = ProcessState::Released;
        inner.request = None;
        inner.requested_at = None;
        inner.replied.clear();
        let released_at = Instant::now();

        let replied_to = inner.pending.drain_all();
        let timestamp = inner.clock.current();
        let mut first_error = None;
        for &target in &replied_to {
            match self.transport.send_to(target, Message::reply(timestamp)) {
                Ok(()) => inner.stats.deferred_replies_sent += 1,
                Err(e) => {
                    error!("p{}: deferred REPLY to p{} failed: {}", id, target, e);
                    first_error.get_or_insert(e);
                }
            }
        }
        info!("p{}: RELEASED, replied to {:?}", id, replied_to);

        match first_error {
            Some(e) => Err(e.into()),
            None => Ok(Release {
                released_at,
                replied_to,
            }),
        }
    }

    /// Enter the CS and return a guard that releases it when dropped.
    pub fn lock(&self) -> Result<CsGuard<'_, T>, MutexError> {
        let grant = self.request_cs()?;
        Ok(CsGuard {
            process: self,
            grant,
            released: false,
        })
    }

    /// React to a message from `sender`.
    ///
    /// Never blocks. The Lamport receive rule is applied first, whatever the
    /// tag; priority is then judged against the stamp of our own outstanding
    /// request, not the freshly advanced clock.
    pub fn handle_message(&self, sender: ProcessId, message: Message) -> Result<(), MutexError> {
        let id = self.config.self_id();
        if sender == id {
            return Err(MutexError::SelfMessage(sender));
        }

        let mut inner = self.lock_inner();
        let now = inner.clock.receive_action(message.timestamp).map_err(|e| {
            warn!("p{}: rejected {:?} from p{}: {}", id, message.tag, sender, e);
            e
        })?;

        match message.tag {
            MessageTag::Request => {
                let theirs = RequestStamp::new(message.timestamp, sender);
                let reply_now = match inner.state {
                    ProcessState::Released => true,
                    ProcessState::Wanted => inner.request.map_or(true, |ours| theirs.precedes(&ours)),
                    ProcessState::Held => false,
                };

                if reply_now {
                    self.transport.send_to(sender, Message::reply(now))?;
                    inner.stats.immediate_replies += 1;
                    debug!("p{}: replied to p{} {} while {}", id, sender, theirs, inner.state);
                } else if inner.pending.enqueue(sender) {
                    inner.stats.deferred_requests += 1;
                    debug!("p{}: deferred p{} {} while {}", id, sender, theirs, inner.state);
                } else {
                    warn!("p{}: p{} already deferred, ignoring repeated REQUEST", id, sender);
                }
            }
            MessageTag::Reply => {
                let needed = self.config.replies_needed();
                let counted = inner.state == ProcessState::Wanted
                    && inner.num_replies() < needed
                    && inner.replied.insert(sender);
                if !counted {
                    inner.stats.unsolicited_replies += 1;
                    warn!(
                        "p{}: unsolicited REPLY from p{} while {} ({}/{})",
                        id,
                        sender,
                        inner.state,
                        inner.num_replies(),
                        needed
                    );
                    return Ok(());
                }

                debug!("p{}: REPLY from p{} ({}/{})", id, sender, inner.num_replies(), needed);
                if inner.num_replies() == needed {
                    self.all_replied.notify_all();
                }
            }
        }
        Ok(())
    }

    /// Decode a wire frame from `sender` and handle it.
    pub fn handle_frame(&self, sender: ProcessId, frame: &[u8]) -> Result<(), MutexError> {
        let message = Message::decode(frame)?;
        self.handle_message(sender, message)
    }

    pub fn state(&self) -> ProcessState {
        self.lock_inner().state
    }

    pub fn snapshot(&self) -> ProcessSnapshot {
        let inner = self.lock_inner();
        ProcessSnapshot {
            process_id: self.config.self_id(),
            state: inner.state,
            clock: inner.clock.current(),
            request: inner.request,
            num_replies: inner.num_replies(),
            pending: inner.pending.iter().collect(),
        }
    }

    pub fn stats(&self) -> ProcessStats {
        self.lock_inner().stats
    }
}

/// Holds the CS for as long as it lives.
pub struct CsGuard<'a, T: Transport> {
    process: &'a MutexProcess<T>,
    grant: Grant,
    released: bool,
}

impl<T: Transport> CsGuard<'_, T> {
    pub fn grant(&self) -> &Grant {
        &self.grant
    }

    /// Release now and report the outcome.
    pub fn release(mut self) -> Result<Release, MutexError> {
        self.released = true;
        self.process.release_cs()
    }
}

impl<T: Transport> Drop for CsGuard<'_, T> {
    fn drop(&mut self) {
        if self.released {
            return;
        }
        if let Err(e) = self.process.release_cs() {
            error!("p{}: release on drop failed: {}", self.process.id(), e);
        }
    }
}
