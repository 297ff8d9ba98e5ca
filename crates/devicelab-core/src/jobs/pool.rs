//! Agent and device resource pool
//!
//! Process-local registry of worker agents and the capability-typed device
//! slots they own. The pool is seeded from configuration at startup and
//! mutated only by the scheduler; it is intentionally not persisted, so a
//! restart starts from an all-available pool (startup recovery resets the
//! jobs that referenced it).

use crate::config::AgentConfig;
use crate::jobs::Target;
use serde::Serialize;
use tracing::debug;

/// Device availability
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum DeviceStatus {
    Available,
    Busy,
}

/// Agent availability. `Busy` means every owned device is busy; `Offline`
/// is externally signaled (reserved).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum AgentStatus {
    Online,
    Busy,
    Offline,
}

/// A capability-typed execution slot
#[derive(Debug, Clone)]
pub struct Device {
    pub id: String,
    pub device_type: Target,
    pub status: DeviceStatus,

    /// Owning agent, kept as a lookup key rather than a back-pointer
    pub agent_id: String,

    /// Jobs locked to this device while busy
    pub current_jobs: Vec<String>,
}

/// A worker host exposing one or more devices
#[derive(Debug, Clone)]
pub struct Agent {
    pub id: String,
    pub status: AgentStatus,
    pub devices: Vec<Device>,
}

impl Agent {
    fn recompute_status(&mut self) {
        if self.status == AgentStatus::Offline {
            return;
        }
        let all_busy = self
            .devices
            .iter()
            .all(|d| d.status == DeviceStatus::Busy);
        self.status = if all_busy && !self.devices.is_empty() {
            AgentStatus::Busy
        } else {
            AgentStatus::Online
        };
    }
}

/// An assignment handle returned by `find_available`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceLease {
    pub agent_id: String,
    pub device_id: String,
}

/// Flat device view for the read API
#[derive(Debug, Clone, Serialize)]
pub struct DeviceSnapshot {
    pub id: String,

    #[serde(rename = "type")]
    pub device_type: Target,

    pub status: DeviceStatus,
    pub target: Target,
    pub agent_id: String,
    pub current_jobs: Vec<String>,
}

/// Pool counters for the stats API
#[derive(Debug, Clone, Copy, Serialize)]
pub struct PoolStats {
    pub agents: usize,
    pub devices: usize,
    pub busy_devices: usize,
}

/// In-memory registry of agents and devices
#[derive(Debug)]
pub struct AgentPool {
    agents: Vec<Agent>,
}

impl AgentPool {
    /// Seed the pool from configuration; insertion order is preserved and
    /// is the assignment tie-break order.
    pub fn from_config(specs: &[AgentConfig]) -> Self {
        let agents = specs
            .iter()
            .map(|spec| Agent {
                id: spec.id.clone(),
                status: AgentStatus::Online,
                devices: spec
                    .devices
                    .iter()
                    .map(|d| Device {
                        id: d.id.clone(),
                        device_type: d.device_type,
                        status: DeviceStatus::Available,
                        agent_id: spec.id.clone(),
                        current_jobs: Vec::new(),
                    })
                    .collect(),
            })
            .collect();
        Self { agents }
    }

    /// First online agent holding an available device of the given target
    pub fn find_available(&self, target: Target) -> Option<DeviceLease> {
        for agent in &self.agents {
            if agent.status == AgentStatus::Offline {
                continue;
            }
            for device in &agent.devices {
                if device.status == DeviceStatus::Available && device.device_type == target {
                    return Some(DeviceLease {
                        agent_id: agent.id.clone(),
                        device_id: device.id.clone(),
                    });
                }
            }
        }
        None
    }

    /// Whether a specific device is currently available
    pub fn device_available(&self, device_id: &str) -> bool {
        self.device(device_id)
            .map(|d| d.status == DeviceStatus::Available)
            .unwrap_or(false)
    }

    /// Mark a device busy and record the jobs locked to it
    pub fn acquire(&mut self, device_id: &str, jobs: &[String]) -> bool {
        for agent in &mut self.agents {
            if let Some(device) = agent.devices.iter_mut().find(|d| d.id == device_id) {
                device.status = DeviceStatus::Busy;
                device.current_jobs = jobs.to_vec();
                agent.recompute_status();
                debug!(device_id, jobs = jobs.len(), "device acquired");
                return true;
            }
        }
        false
    }

    /// Return a device to the pool
    pub fn release(&mut self, device_id: &str) -> bool {
        for agent in &mut self.agents {
            if let Some(device) = agent.devices.iter_mut().find(|d| d.id == device_id) {
                device.status = DeviceStatus::Available;
                device.current_jobs.clear();
                agent.recompute_status();
                debug!(device_id, "device released");
                return true;
            }
        }
        false
    }

    fn device(&self, device_id: &str) -> Option<&Device> {
        self.agents
            .iter()
            .flat_map(|a| a.devices.iter())
            .find(|d| d.id == device_id)
    }

    /// Look up an agent by ID
    pub fn agent(&self, agent_id: &str) -> Option<&Agent> {
        self.agents.iter().find(|a| a.id == agent_id)
    }

    /// Flat device list for the read API
    pub fn devices(&self) -> Vec<DeviceSnapshot> {
        self.agents
            .iter()
            .flat_map(|agent| {
                agent.devices.iter().map(|d| DeviceSnapshot {
                    id: d.id.clone(),
                    device_type: d.device_type,
                    status: d.status,
                    target: d.device_type,
                    agent_id: d.agent_id.clone(),
                    current_jobs: d.current_jobs.clone(),
                })
            })
            .collect()
    }

    /// Pool counters
    pub fn stats(&self) -> PoolStats {
        let devices = self.agents.iter().map(|a| a.devices.len()).sum();
        let busy_devices = self
            .agents
            .iter()
            .flat_map(|a| a.devices.iter())
            .filter(|d| d.status == DeviceStatus::Busy)
            .count();
        PoolStats {
            agents: self.agents.len(),
            devices,
            busy_devices,
        }
    }
}
