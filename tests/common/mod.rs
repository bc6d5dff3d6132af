#![allow(dead_code)]

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use parkcard::application::engine::CardEngine;
use parkcard::application::lifecycle::ApplicationRequest;
use parkcard::config::EngineConfig;
use parkcard::domain::ports::{
    GatewayError, PayPageRequest, PaymentGateway, PaymentGatewayRef, Stores,
};
use parkcard::infrastructure::clock::ManualClock;
use parkcard::infrastructure::in_memory::InMemoryStore;
use std::sync::{Arc, Mutex};

/// 09:00 in Kolkata, well clear of any date boundary.
pub fn start() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 3, 2, 3, 30, 0).unwrap()
}

pub struct TestEngine {
    pub engine: CardEngine,
    pub clock: Arc<ManualClock>,
    pub stores: Stores,
}

pub fn engine(bypass_payments: bool, gateway: Option<PaymentGatewayRef>) -> TestEngine {
    let clock = Arc::new(ManualClock::new(start()));
    let stores = Stores::from_backend(InMemoryStore::new());
    let config = EngineConfig {
        bypass_payments,
        user_frontend_url: "https://cards.example".to_string(),
        ..EngineConfig::default()
    };
    let engine = CardEngine::new(stores.clone(), gateway, clock.clone(), &config);
    TestEngine {
        engine,
        clock,
        stores,
    }
}

pub fn request(name: &str, phone: &str, plan: &str) -> ApplicationRequest {
    ApplicationRequest {
        name: name.to_string(),
        email: format!("{}@example.com", name.to_lowercase()),
        phone: phone.to_string(),
        vehicle: "KA01MJ2024".to_string(),
        plan: plan.to_string(),
        ..ApplicationRequest::default()
    }
}

/// Applies in bypass mode, approves, and steps the clock past activation.
/// Returns the application id and card number.
pub async fn active_card(t: &TestEngine, name: &str, phone: &str, plan: &str) -> (String, String) {
    let applied = t.engine.apply(request(name, phone, plan)).await.unwrap();
    let approved = t.engine.approve(&applied.application_id, "ops").await.unwrap();
    (applied.application_id, approved.card_number.unwrap())
}

/// Gateway double answering every pay-page request the same way.
pub struct StubGateway {
    answer: Result<String, GatewayError>,
    pub requests: Mutex<Vec<PayPageRequest>>,
}

impl StubGateway {
    pub fn redirecting(url: &str) -> Self {
        Self {
            answer: Ok(url.to_string()),
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn failing(error: GatewayError) -> Self {
        Self {
            answer: Err(error),
            requests: Mutex::new(Vec::new()),
        }
    }
}

#[async_trait]
impl PaymentGateway for StubGateway {
    async fn open_pay_page(&self, request: &PayPageRequest) -> Result<String, GatewayError> {
        self.requests.lock().unwrap().push(request.clone());
        self.answer.clone()
    }
}
