// src/lifecycle/host.rs

//! Host lifecycle driven by agent registration and heartbeats.
//!
//! ```text
//! INIT --registration--> WAITING_FOR_HOST_STATUS_UPDATES --status updates--> HEALTHY
//! HEALTHY <--heartbeat healthy / unhealthy--> UNHEALTHY
//! any state --heartbeat lost--> HEARTBEAT_LOST --registration--> WAITING_...
//! ```

use std::fmt;

use tracing::{debug, error, info};

use crate::errors::Result;
use crate::fsm::{Machine, MachineEvent, TrackedEntity, TransitionTable};
use crate::types::{EntityId, Timestamp};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HostState {
    Init,
    WaitingForHostStatusUpdates,
    Healthy,
    Unhealthy,
    HeartbeatLost,
}

impl fmt::Display for HostState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HostState::Init => write!(f, "INIT"),
            HostState::WaitingForHostStatusUpdates => write!(f, "WAITING_FOR_HOST_STATUS_UPDATES"),
            HostState::Healthy => write!(f, "HEALTHY"),
            HostState::Unhealthy => write!(f, "UNHEALTHY"),
            HostState::HeartbeatLost => write!(f, "HEARTBEAT_LOST"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HostEventType {
    RegistrationRequest,
    StatusUpdatesReceived,
    HeartbeatHealthy,
    HeartbeatUnhealthy,
    HeartbeatLost,
}

impl fmt::Display for HostEventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HostEventType::RegistrationRequest => write!(f, "HOST_REGISTRATION_REQUEST"),
            HostEventType::StatusUpdatesReceived => write!(f, "HOST_STATUS_UPDATES_RECEIVED"),
            HostEventType::HeartbeatHealthy => write!(f, "HOST_HEARTBEAT_HEALTHY"),
            HostEventType::HeartbeatUnhealthy => write!(f, "HOST_HEARTBEAT_UNHEALTHY"),
            HostEventType::HeartbeatLost => write!(f, "HOST_HEARTBEAT_LOST"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum HealthStatus {
    Healthy,
    Unhealthy,
    #[default]
    Unknown,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct HostHealth {
    pub status: HealthStatus,
    pub report: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HostEvent {
    Registration {
        host: EntityId,
        registered_at: Timestamp,
        agent_version: Option<String>,
    },
    StatusUpdatesReceived {
        host: EntityId,
        at: Timestamp,
    },
    HeartbeatHealthy {
        host: EntityId,
        at: Timestamp,
    },
    HeartbeatUnhealthy {
        host: EntityId,
        at: Timestamp,
        health: HostHealth,
    },
    HeartbeatLost {
        host: EntityId,
        at: Timestamp,
    },
}

impl MachineEvent for HostEvent {
    type Kind = HostEventType;

    fn entity_id(&self) -> &str {
        match self {
            HostEvent::Registration { host, .. }
            | HostEvent::StatusUpdatesReceived { host, .. }
            | HostEvent::HeartbeatHealthy { host, .. }
            | HostEvent::HeartbeatUnhealthy { host, .. }
            | HostEvent::HeartbeatLost { host, .. } => host,
        }
    }

    fn kind(&self) -> HostEventType {
        match self {
            HostEvent::Registration { .. } => HostEventType::RegistrationRequest,
            HostEvent::StatusUpdatesReceived { .. } => HostEventType::StatusUpdatesReceived,
            HostEvent::HeartbeatHealthy { .. } => HostEventType::HeartbeatHealthy,
            HostEvent::HeartbeatUnhealthy { .. } => HostEventType::HeartbeatUnhealthy,
            HostEvent::HeartbeatLost { .. } => HostEventType::HeartbeatLost,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HostData {
    pub last_registration_time: Option<Timestamp>,
    pub last_heartbeat_time: Option<Timestamp>,
    pub time_in_state: Option<Timestamp>,
    pub agent_version: Option<String>,
    pub health: HostHealth,
}

#[derive(Debug, Clone, Copy)]
pub struct HostMachine;

impl Machine for HostMachine {
    type State = HostState;
    type Kind = HostEventType;
    type Event = HostEvent;
    type Data = HostData;
    const NAME: &'static str = "host";
}

pub type Host = TrackedEntity<HostMachine>;

pub fn host_table() -> Result<TransitionTable<HostMachine>> {
    use HostEventType as E;
    use HostState as S;

    TransitionTable::<HostMachine>::builder(S::Init)
        .transition(S::Init, S::WaitingForHostStatusUpdates, E::RegistrationRequest, registration_received)
        .transition(S::Init, S::HeartbeatLost, E::HeartbeatLost, heartbeat_lost)
        .transition(S::WaitingForHostStatusUpdates, S::Healthy, E::StatusUpdatesReceived, status_updates_received)
        // Healthy heartbeats are ignored until component status arrives.
        .noop(S::WaitingForHostStatusUpdates, S::WaitingForHostStatusUpdates, E::HeartbeatHealthy)
        .transition(S::WaitingForHostStatusUpdates, S::WaitingForHostStatusUpdates, E::HeartbeatUnhealthy, became_unhealthy)
        .transition(S::WaitingForHostStatusUpdates, S::HeartbeatLost, E::HeartbeatLost, heartbeat_lost)
        .transition(S::Healthy, S::Healthy, E::HeartbeatHealthy, heartbeat_received)
        .transition(S::Healthy, S::HeartbeatLost, E::HeartbeatLost, heartbeat_lost)
        .transition(S::Healthy, S::Unhealthy, E::HeartbeatUnhealthy, became_unhealthy)
        .transition(S::Healthy, S::WaitingForHostStatusUpdates, E::RegistrationRequest, registration_received)
        .transition(S::Unhealthy, S::Healthy, E::HeartbeatHealthy, became_healthy)
        .transition(S::Unhealthy, S::Unhealthy, E::HeartbeatUnhealthy, heartbeat_received)
        .transition(S::Unhealthy, S::HeartbeatLost, E::HeartbeatLost, heartbeat_lost)
        .transition(S::Unhealthy, S::WaitingForHostStatusUpdates, E::RegistrationRequest, registration_received)
        .noop(S::HeartbeatLost, S::HeartbeatLost, E::HeartbeatLost)
        .transition(S::HeartbeatLost, S::WaitingForHostStatusUpdates, E::RegistrationRequest, registration_received)
        .build()
}

fn registration_received(data: &mut HostData, event: &HostEvent) {
    if let HostEvent::Registration {
        host,
        registered_at,
        agent_version,
    } = event
    {
        data.last_registration_time = Some(*registered_at);
        // Heartbeat and time-in-state start at registration time.
        data.last_heartbeat_time = Some(*registered_at);
        data.time_in_state = Some(*registered_at);
        data.agent_version = agent_version.clone();
        info!(
            host = %host,
            registration_time = registered_at,
            agent_version = agent_version.as_deref().unwrap_or("unknown"),
            "received host registration"
        );
    }
}

fn status_updates_received(data: &mut HostData, event: &HostEvent) {
    debug!(host = %event.entity_id(), "host status updates received");
    data.health.status = HealthStatus::Healthy;
}

fn heartbeat_received(data: &mut HostData, event: &HostEvent) {
    let at = match event {
        HostEvent::HeartbeatHealthy { at, .. } | HostEvent::HeartbeatUnhealthy { at, .. } => *at,
        _ => 0,
    };
    if at == 0 {
        error!(host = %event.entity_id(), "heartbeat time is 0");
    }
    data.last_heartbeat_time = Some(at);
}

fn became_healthy(data: &mut HostData, event: &HostEvent) {
    if let HostEvent::HeartbeatHealthy { host, at } = event {
        data.last_heartbeat_time = Some(*at);
        data.health.status = HealthStatus::Healthy;
        debug!(host = %host, heartbeat_time = at, "host became healthy");
    }
}

fn became_unhealthy(data: &mut HostData, event: &HostEvent) {
    if let HostEvent::HeartbeatUnhealthy { host, at, health } = event {
        data.last_heartbeat_time = Some(*at);
        data.health = health.clone();
        debug!(host = %host, heartbeat_time = at, report = %health.report, "host became unhealthy");
    }
}

fn heartbeat_lost(data: &mut HostData, event: &HostEvent) {
    debug!(
        host = %event.entity_id(),
        last_heartbeat_time = ?data.last_heartbeat_time,
        "host heartbeat lost"
    );
    data.health.status = HealthStatus::Unknown;
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::errors::ClustertrackError;

    const HOST: &str = "c6401.ambari.apache.org";

    fn host() -> Host {
        TrackedEntity::new(HOST, Arc::new(host_table().unwrap()))
    }

    fn register(at: Timestamp) -> HostEvent {
        HostEvent::Registration {
            host: HOST.to_string(),
            registered_at: at,
            agent_version: Some("1.2.0".to_string()),
        }
    }

    #[test]
    fn registration_then_status_updates_makes_host_healthy() {
        let host = host();

        host.handle_event(&register(1000)).unwrap();
        assert_eq!(host.state(), HostState::WaitingForHostStatusUpdates);
        let data = host.snapshot().data;
        assert_eq!(data.last_registration_time, Some(1000));
        assert_eq!(data.last_heartbeat_time, Some(1000));
        assert_eq!(data.agent_version.as_deref(), Some("1.2.0"));

        // Ignored while waiting for status updates.
        host.handle_event(&HostEvent::HeartbeatHealthy { host: HOST.into(), at: 1500 })
            .unwrap();
        assert_eq!(host.snapshot().data.last_heartbeat_time, Some(1000));

        host.handle_event(&HostEvent::StatusUpdatesReceived { host: HOST.into(), at: 2000 })
            .unwrap();
        assert_eq!(host.state(), HostState::Healthy);
        assert_eq!(host.snapshot().data.health.status, HealthStatus::Healthy);
    }

    #[test]
    fn unhealthy_heartbeat_then_recovery() {
        let host = host();
        host.handle_event(&register(1)).unwrap();
        host.handle_event(&HostEvent::StatusUpdatesReceived { host: HOST.into(), at: 2 })
            .unwrap();

        let health = HostHealth {
            status: HealthStatus::Unhealthy,
            report: "disk full".to_string(),
        };
        host.handle_event(&HostEvent::HeartbeatUnhealthy {
            host: HOST.into(),
            at: 3,
            health: health.clone(),
        })
        .unwrap();
        assert_eq!(host.state(), HostState::Unhealthy);
        assert_eq!(host.snapshot().data.health, health);

        host.handle_event(&HostEvent::HeartbeatHealthy { host: HOST.into(), at: 4 })
            .unwrap();
        assert_eq!(host.state(), HostState::Healthy);
        assert_eq!(host.snapshot().data.last_heartbeat_time, Some(4));
    }

    #[test]
    fn lost_heartbeat_requires_reregistration() {
        let host = host();
        host.handle_event(&register(1)).unwrap();
        host.handle_event(&HostEvent::HeartbeatLost { host: HOST.into(), at: 9 })
            .unwrap();
        assert_eq!(host.state(), HostState::HeartbeatLost);
        assert_eq!(host.snapshot().data.health.status, HealthStatus::Unknown);

        let err = host
            .handle_event(&HostEvent::HeartbeatHealthy { host: HOST.into(), at: 10 })
            .unwrap_err();
        assert!(matches!(err, ClustertrackError::InvalidTransition { .. }));
        assert_eq!(host.state(), HostState::HeartbeatLost);

        host.handle_event(&register(11)).unwrap();
        assert_eq!(host.state(), HostState::WaitingForHostStatusUpdates);
    }

    #[test]
    fn hosts_are_never_reset() {
        let host = host();
        host.handle_event(&HostEvent::HeartbeatLost { host: HOST.into(), at: 1 })
            .unwrap();
        assert!(matches!(host.reset(), Err(ClustertrackError::ResetNotAllowed { .. })));
    }
}
