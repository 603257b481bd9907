//! Threaded process group runner.
//!
//! Runs every [`MutexProcess`] of a group in one binary over a
//! [`MockNetwork`]. Each process gets a dispatcher thread that drains its
//! inbox into `handle_frame`; clients call `request_cs`/`release_cs` from
//! their own threads.

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crossbeam_channel::RecvTimeoutError;
use log::{debug, info, warn};
use rand::Rng;

use super::checker::CsHistory;
use crate::mutex::{MutexConfig, MutexError, MutexProcess, DEFAULT_WAIT_WARN_INTERVAL};
use crate::net::{EndpointSender, Inbox, MockNetwork};
use crate::ProcessId;

/// How long a dispatcher blocks on its inbox before re-checking the stop flag.
pub const DISPATCH_POLL_INTERVAL: Duration = Duration::from_millis(10);

/// Configuration for a local process group.
#[derive(Debug, Clone)]
pub struct ClusterConfig {
    /// Member ids.
    pub ids: Vec<ProcessId>,
    /// Per-message delay range injected by the network.
    pub latency: (Duration, Duration),
    /// Passed through to every process's `MutexConfig`.
    pub wait_warn_interval: Duration,
}

impl ClusterConfig {
    /// Group of `size` processes with ids `1..=size` and direct delivery.
    pub fn new(size: u32) -> Self {
        ClusterConfig {
            ids: (1..=size).collect(),
            latency: (Duration::ZERO, Duration::ZERO),
            wait_warn_interval: DEFAULT_WAIT_WARN_INTERVAL,
        }
    }

    pub fn with_latency(mut self, min: Duration, max: Duration) -> Self {
        self.latency = (min, max);
        self
    }

    pub fn validate(&self) -> Result<(), MutexError> {
        if self.ids.is_empty() {
            return Err(MutexError::InvalidConfig("group has no members".to_string()));
        }
        let unique: HashSet<_> = self.ids.iter().collect();
        if unique.len() != self.ids.len() {
            return Err(MutexError::InvalidConfig(format!(
                "duplicate process ids in {:?}",
                self.ids
            )));
        }
        if self.latency.0 > self.latency.1 {
            return Err(MutexError::InvalidConfig(format!(
                "latency min {:?} exceeds max {:?}",
                self.latency.0, self.latency.1
            )));
        }
        Ok(())
    }
}

/// Handle to one running process.
pub struct ProcessHandle {
    process: Arc<MutexProcess<EndpointSender>>,
    stop: Arc<AtomicBool>,
    dispatcher: Option<JoinHandle<()>>,
}

impl ProcessHandle {
    fn spawn(process: MutexProcess<EndpointSender>, inbox: Inbox) -> Self {
        let process = Arc::new(process);
        let stop = Arc::new(AtomicBool::new(false));

        let dispatcher = {
            let process = Arc::clone(&process);
            let stop = Arc::clone(&stop);
            thread::Builder::new()
                .name(format!("dispatch-p{}", process.id()))
                .spawn(move || run_dispatcher(&process, &inbox, &stop))
                .expect("failed to spawn dispatcher thread")
        };

        ProcessHandle {
            process,
            stop,
            dispatcher: Some(dispatcher),
        }
    }

    pub fn process(&self) -> &Arc<MutexProcess<EndpointSender>> {
        &self.process
    }

    /// Stop the dispatcher thread.
    ///
    /// Returns `false` if the dispatcher had panicked.
    pub fn stop(&mut self) -> bool {
        self.stop.store(true, Ordering::SeqCst);
        match self.dispatcher.take() {
            Some(handle) => join_dispatcher(self.process.id(), handle),
            None => true,
        }
    }
}

fn join_dispatcher(id: ProcessId, handle: JoinHandle<()>) -> bool {
    match handle.join() {
        Ok(()) => true,
        Err(panic) => {
            let reason = panic
                .downcast_ref::<&str>()
                .copied()
                .or_else(|| panic.downcast_ref::<String>().map(String::as_str))
                .unwrap_or("unknown panic");
            warn!("p{}: dispatcher thread panicked: {}", id, reason);
            false
        }
    }
}

fn run_dispatcher(process: &MutexProcess<EndpointSender>, inbox: &Inbox, stop: &AtomicBool) {
    while !stop.load(Ordering::SeqCst) {
        match inbox.recv_timeout(DISPATCH_POLL_INTERVAL) {
            Ok((from, frame)) => {
                if let Err(e) = process.handle_frame(from, &frame) {
                    warn!("p{}: dropped frame from p{}: {}", process.id(), from, e);
                }
            }
            Err(RecvTimeoutError::Timeout) => {}
            Err(RecvTimeoutError::Disconnected) => break,
        }
    }
    debug!("p{}: dispatcher exiting", process.id());
}

/// A running process group.
pub struct Cluster {
    handles: Vec<ProcessHandle>,
}

impl Cluster {
    /// Build the network and start a dispatcher for every member.
    pub fn spawn(config: &ClusterConfig) -> Result<Self, MutexError> {
        config.validate()?;

        let mut network = MockNetwork::with_latency(&config.ids, config.latency);
        let peer_count = config.ids.len() as u32;
        let mut handles = Vec::with_capacity(config.ids.len());

        for &id in &config.ids {
            let (sender, inbox) = network
                .create_endpoint(id)
                .ok_or_else(|| MutexError::InvalidConfig(format!("no endpoint for p{}", id)))?;
            let process_config =
                MutexConfig::new(id, peer_count)?.with_wait_warn_interval(config.wait_warn_interval);
            handles.push(ProcessHandle::spawn(
                MutexProcess::new(process_config, sender),
                inbox,
            ));
        }

        info!("cluster of {} started (latency {:?})", peer_count, config.latency);
        Ok(Cluster { handles })
    }

    pub fn ids(&self) -> Vec<ProcessId> {
        self.handles.iter().map(|h| h.process.id()).collect()
    }

    pub fn process(&self, id: ProcessId) -> Option<&Arc<MutexProcess<EndpointSender>>> {
        self.handles
            .iter()
            .map(ProcessHandle::process)
            .find(|p| p.id() == id)
    }

    pub fn processes(&self) -> impl Iterator<Item = &Arc<MutexProcess<EndpointSender>>> {
        self.handles.iter().map(ProcessHandle::process)
    }

    /// Have every process enter and leave the CS `rounds` times concurrently.
    ///
    /// Each tenure lasts `hold`; between tenures a client pauses for a random
    /// duration up to `think`. Returns the recorded history.
    pub fn run_rounds(
        &self,
        rounds: usize,
        hold: Duration,
        think: Duration,
    ) -> Result<CsHistory, MutexError> {
        let history = CsHistory::new();

        let clients: Vec<JoinHandle<Result<(), MutexError>>> = self
            .processes()
            .map(|process| {
                let process = Arc::clone(process);
                let history = history.clone();
                thread::spawn(move || -> Result<(), MutexError> {
                    let mut rng = rand::thread_rng();
                    for _ in 0..rounds {
                        let grant = process.request_cs()?;
                        thread::sleep(hold);
                        let release = process.release_cs()?;
                        history.record(&grant, &release);
                        if !think.is_zero() {
                            thread::sleep(rng.gen_range(Duration::ZERO..=think));
                        }
                    }
                    Ok(())
                })
            })
            .collect();

        let mut first_error = None;
        for client in clients {
            let result = client.join().expect("client thread panicked");
            if let Err(e) = result {
                first_error.get_or_insert(e);
            }
        }

        match first_error {
            Some(e) => Err(e),
            None => Ok(history),
        }
    }

    /// Stop every dispatcher. Returns `false` if any of them had panicked.
    pub fn shutdown(&mut self) -> bool {
        self.handles
            .iter_mut()
            .fold(true, |clean, handle| handle.stop() && clean)
    }
}

impl Drop for Cluster {
    fn drop(&mut self) {
        self.shutdown();
    }
}
