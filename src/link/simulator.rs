//! Simulated Controller
//!
//! A small scripted stand-in for a GRBL board, driven through a
//! [`ChannelLink`]. It answers status queries with `<State|MPos:...>`
//! reports and acknowledges commands with `ok`, and can be told to
//! misbehave in the ways real boards do: stay silent, stay busy for a
//! while after each move, drop the first few copies of a command, or
//! vanish mid-program.

use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};
use tokio::task::JoinHandle;

use super::{ChannelLink, DeviceEnd, Link, LinkConnector};
use crate::config::LinkConfig;
use crate::error::{Error, Result};
use crate::models::Position;

/// How the simulated board behaves
#[derive(Debug, Clone)]
pub struct DeviceBehavior {
    /// Never reply to anything
    pub silent: bool,
    /// Status polls answered `Run` after each acknowledged command
    pub busy_polls: u32,
    /// Writes of each distinct command ignored before it is acknowledged
    pub ignore_writes: u32,
    /// Commands that are never acknowledged
    pub never_ack: HashSet<String>,
    /// Hang up after receiving this many lines
    pub hang_up_after: Option<usize>,
    /// Reply used for acknowledgments
    pub ack_reply: String,
    /// State name used in idle reports
    pub idle_state: String,
    /// Follow each status report with an ack for the query's line ending
    pub ack_status_queries: bool,
}

impl Default for DeviceBehavior {
    fn default() -> Self {
        Self {
            silent: false,
            busy_polls: 0,
            ignore_writes: 0,
            never_ack: HashSet::new(),
            hang_up_after: None,
            ack_reply: "ok".to_string(),
            idle_state: "Idle".to_string(),
            ack_status_queries: false,
        }
    }
}

impl DeviceBehavior {
    /// Board that acknowledges everything on the first write
    pub fn responsive() -> Self {
        Self::default()
    }

    /// Board that never answers
    pub fn silent() -> Self {
        Self {
            silent: true,
            ..Self::default()
        }
    }
}

/// What the board saw, shared with whoever is inspecting it
#[derive(Debug, Default, Clone)]
pub struct DeviceLog {
    /// Every line received, in order
    pub received: Vec<String>,
    /// Set once the host side dropped or closed the link
    pub closed_by_host: bool,
    /// Set once the board hung up on purpose
    pub hung_up: bool,
}

impl DeviceLog {
    /// Received lines other than status queries
    pub fn commands(&self) -> Vec<String> {
        self.received
            .iter()
            .filter(|line| line.as_str() != "?")
            .cloned()
            .collect()
    }
}

/// A simulated GRBL board
pub struct SimulatedDevice {
    behavior: DeviceBehavior,
    log: Arc<Mutex<DeviceLog>>,
    position: Position,
    busy_remaining: u32,
    writes_seen: HashMap<String, u32>,
}

impl SimulatedDevice {
    pub fn new(behavior: DeviceBehavior) -> Self {
        Self {
            behavior,
            log: Arc::new(Mutex::new(DeviceLog::default())),
            position: Position {
                x: 0.0,
                y: 0.0,
                z: 0.0,
            },
            busy_remaining: 0,
            writes_seen: HashMap::new(),
        }
    }

    /// Shared handle to the device log
    pub fn log(&self) -> Arc<Mutex<DeviceLog>> {
        Arc::clone(&self.log)
    }

    /// Run on its own task at the far end of `end`
    pub fn spawn(self, end: DeviceEnd) -> JoinHandle<()> {
        tokio::spawn(self.run(end))
    }

    /// Serve the host until either side goes away
    pub async fn run(mut self, mut end: DeviceEnd) {
        while let Some(line) = end.from_host.recv().await {
            let count = {
                let mut log = lock(&self.log);
                log.received.push(line.clone());
                log.received.len()
            };

            if self
                .behavior
                .hang_up_after
                .is_some_and(|limit| count >= limit)
            {
                lock(&self.log).hung_up = true;
                debug!("Simulated device hanging up after {} lines", count);
                return;
            }

            if self.behavior.silent {
                continue;
            }

            let replies = self.respond(line.trim());
            if !replies.into_iter().all(|reply| end.reply(reply)) {
                break;
            }
        }
        lock(&self.log).closed_by_host = true;
    }

    fn respond(&mut self, line: &str) -> Vec<String> {
        if line.is_empty() {
            return Vec::new();
        }
        if line == "?" {
            let mut replies = vec![self.status_report()];
            if self.behavior.ack_status_queries {
                replies.push(self.behavior.ack_reply.clone());
            }
            return replies;
        }

        let seen = self.writes_seen.entry(line.to_string()).or_insert(0);
        *seen += 1;
        if *seen <= self.behavior.ignore_writes || self.behavior.never_ack.contains(line) {
            return Vec::new();
        }

        self.apply(line);
        self.busy_remaining = self.behavior.busy_polls;
        vec![self.behavior.ack_reply.clone()]
    }

    fn status_report(&mut self) -> String {
        let state = if self.busy_remaining > 0 {
            self.busy_remaining -= 1;
            "Run"
        } else {
            self.behavior.idle_state.as_str()
        };
        format!(
            "<{}|MPos:{:.3},{:.3},{:.3}|FS:0,0>",
            state, self.position.x, self.position.y, self.position.z
        )
    }

    /// Track absolute position for G0/G1 moves and G92 resets
    fn apply(&mut self, line: &str) {
        let mut words = line.split_whitespace();
        let Some(code) = words.next() else { return };
        match code {
            "G92" => {
                self.position = Position {
                    x: 0.0,
                    y: 0.0,
                    z: 0.0,
                }
            }
            "G0" | "G1" => {
                for word in words {
                    let mut chars = word.chars();
                    let axis = chars.next();
                    let Ok(value) = chars.as_str().parse::<f64>() else {
                        continue;
                    };
                    match axis {
                        Some('X') => self.position.x = value,
                        Some('Y') => self.position.y = value,
                        Some('Z') => self.position.z = value,
                        _ => {}
                    }
                }
            }
            _ => {}
        }
    }
}

fn lock(log: &Arc<Mutex<DeviceLog>>) -> std::sync::MutexGuard<'_, DeviceLog> {
    // A panicked writer cannot leave the log half-updated in a harmful way
    log.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Connector that wires every new link to a fresh simulated board
pub struct SimulatorConnector {
    behavior: DeviceBehavior,
    logs: Mutex<Vec<Arc<Mutex<DeviceLog>>>>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
    refuse: bool,
}

impl SimulatorConnector {
    pub fn new(behavior: DeviceBehavior) -> Self {
        Self {
            behavior,
            logs: Mutex::new(Vec::new()),
            tasks: Mutex::new(Vec::new()),
            refuse: false,
        }
    }

    /// Connector whose port can never be opened
    pub fn refusing() -> Self {
        Self {
            refuse: true,
            ..Self::new(DeviceBehavior::default())
        }
    }

    /// Number of links opened so far
    pub fn connections(&self) -> usize {
        self.logs.lock().map(|logs| logs.len()).unwrap_or(0)
    }

    /// Snapshot of the log of the `index`-th connection
    pub fn device_log(&self, index: usize) -> Option<DeviceLog> {
        let logs = self.logs.lock().ok()?;
        logs.get(index).map(|log| lock(log).clone())
    }

    /// Wait for every simulated board to stop
    pub async fn shutdown(&self) {
        let tasks: Vec<JoinHandle<()>> = match self.tasks.lock() {
            Ok(mut tasks) => tasks.drain(..).collect(),
            Err(_) => Vec::new(),
        };
        for task in tasks {
            let _ = task.await;
        }
    }
}

#[async_trait]
impl LinkConnector for SimulatorConnector {
    async fn connect(&self, config: &LinkConfig) -> Result<Link> {
        if self.refuse {
            return Err(Error::ConnectionFailed {
                port: config.port.clone(),
                reason: "simulated port refused".to_string(),
            });
        }

        let (link, end) = ChannelLink::pair(config.port.clone());
        let device = SimulatedDevice::new(self.behavior.clone());
        if let Ok(mut logs) = self.logs.lock() {
            logs.push(device.log());
        }
        let task = device.spawn(end);
        if let Ok(mut tasks) = self.tasks.lock() {
            tasks.push(task);
        }
        Ok(Box::new(link))
    }
}
