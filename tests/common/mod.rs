//! Shared fixtures for integration tests.

#![allow(dead_code)]

use async_trait::async_trait;
use parking_lot::Mutex;
use pickup_gateway::core::clock::ManualClock;
use pickup_gateway::core::config::{GatewayConfig, LookupConfig};
use pickup_gateway::{
    PickupLookupGateway, RequestOptions, UpstreamClient, UpstreamError, UpstreamResponse,
};
use serde_json::{json, Value};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;

#[derive(Debug, Clone)]
pub enum Behaviour {
    Succeed(Value),
    Status(u16),
    NetworkDown,
    Hang,
}

/// Scripted stand-in for the courier API
pub struct FakeUpstream {
    calls: AtomicUsize,
    behaviour: Mutex<Behaviour>,
    gate: Mutex<Option<Arc<Notify>>>,
    requests: Mutex<Vec<(String, RequestOptions)>>,
}

impl FakeUpstream {
    pub fn new(behaviour: Behaviour) -> Arc<Self> {
        Arc::new(Self {
            calls: AtomicUsize::new(0),
            behaviour: Mutex::new(behaviour),
            gate: Mutex::new(None),
            requests: Mutex::new(Vec::new()),
        })
    }

    pub fn succeeding() -> Arc<Self> {
        Self::new(Behaviour::Succeed(sample_body()))
    }

    pub fn failing() -> Arc<Self> {
        Self::new(Behaviour::Status(503))
    }

    pub fn set(&self, behaviour: Behaviour) {
        *self.behaviour.lock() = behaviour;
    }

    /// Hold every call until the returned gate is notified
    pub fn gated(&self) -> Arc<Notify> {
        let gate = Arc::new(Notify::new());
        *self.gate.lock() = Some(gate.clone());
        gate
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn last_request(&self) -> Option<(String, RequestOptions)> {
        self.requests.lock().last().cloned()
    }
}

#[async_trait]
impl UpstreamClient for FakeUpstream {
    async fn authenticated_request(
        &self,
        path: &str,
        options: RequestOptions,
    ) -> Result<UpstreamResponse, UpstreamError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.requests.lock().push((path.to_string(), options));

        let gate = self.gate.lock().clone();
        if let Some(gate) = gate {
            gate.notified().await;
        }

        let behaviour = self.behaviour.lock().clone();
        match behaviour {
            Behaviour::Succeed(body) => Ok(UpstreamResponse::success(body)),
            Behaviour::Status(status) => Ok(UpstreamResponse::failure(status)),
            Behaviour::NetworkDown => Err(UpstreamError::Network("connection refused".into())),
            Behaviour::Hang => {
                tokio::time::sleep(Duration::from_secs(3600)).await;
                Ok(UpstreamResponse::success(sample_body()))
            }
        }
    }
}

pub fn sample_body() -> Value {
    json!({
        "points": [
            {
                "code": "WAW01M",
                "courierService": "inpost",
                "name": "Paczkomat WAW01M",
                "address": {"line1": "ul. Nowy Świat 1", "city": "Warszawa", "postCode": "00-029"},
                "coordinates": {"latitude": 52.2319, "longitude": 21.0181}
            },
            {
                "code": "WAW02M",
                "courierService": "inpost",
                "name": "Paczkomat WAW02M",
                "address": {"line1": "ul. Chmielna 5", "city": "Warszawa", "postCode": "00-021"}
            }
        ]
    })
}

pub fn config_with(adjust: impl FnOnce(&mut LookupConfig)) -> GatewayConfig {
    let mut config = GatewayConfig::default();
    adjust(&mut config.lookup);
    config
}

pub fn gateway_with(
    config: &GatewayConfig,
    upstream: Arc<FakeUpstream>,
) -> (Arc<PickupLookupGateway>, Arc<ManualClock>) {
    let clock = ManualClock::shared();
    let gateway = PickupLookupGateway::with_clock(config, upstream, clock.clone());
    (Arc::new(gateway), clock)
}
