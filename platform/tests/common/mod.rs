//! Shared harness for the platform integration tests.
//!
//! Wires [`AppState`] from the in-memory store and the deterministic
//! environment, so services and the router can be driven without a
//! database, SMTP server or payment gateway.

#![allow(dead_code)]
#![allow(clippy::unwrap_used, clippy::expect_used)]

use arena::config::{
    CartConfig, CheckoutConfig, Config, DatabaseConfig, GatewayConfig, MailConfig, MailTransport,
    MetricsConfig, RateLimitConfig, ServerConfig,
};
use arena::gateway::{Gateway, GatewayNotification};
use arena::live::LiveFeed;
use arena::services::{AddItem, CheckoutRequest, Dependencies, PaymentChoice, Services};
use arena::{build_router, AppState};
use arena_core::environment::Clock;
use arena_core::types::{Competition, RegistrationType, User};
use arena_testing::{
    fixtures, test_clock, FixedClock, InMemoryStore, RecordingMailer, ScriptedCodeGenerator,
    ScriptedOrderSequence,
};
use axum::Router;
use chrono::{DateTime, Duration, Utc};
use std::sync::Arc;

/// Configuration with gateway credentials and no retry delay.
pub fn test_config() -> Config {
    Config {
        database: DatabaseConfig {
            url: "postgres://unused".to_string(),
            max_connections: 1,
            run_migrations: false,
        },
        server: ServerConfig {
            host: "127.0.0.1".to_string(),
            port: 0,
            shutdown_timeout: 1,
        },
        cart: CartConfig::default(),
        checkout: CheckoutConfig {
            order_retry_delay_ms: 0,
            currency: "LKR".to_string(),
        },
        gateway: GatewayConfig {
            merchant_id: "1211149".to_string(),
            merchant_secret: "arena-test-secret".to_string(),
            checkout_url: "https://sandbox.payhere.lk/pay/checkout".to_string(),
            return_url: "https://arena.test/payment/success".to_string(),
            cancel_url: "https://arena.test/payment/cancel".to_string(),
            notify_url: "https://api.arena.test/payments/notify".to_string(),
            country: "Sri Lanka".to_string(),
        },
        mail: MailConfig {
            transport: MailTransport::Console,
            smtp_host: "localhost".to_string(),
            smtp_port: 587,
            smtp_username: String::new(),
            smtp_password: String::new(),
            from_email: "noreply@arena.test".to_string(),
            from_name: "Arena".to_string(),
            send_timeout: 1,
        },
        rate_limit: RateLimitConfig {
            max_requests: 1000,
            window_seconds: 60,
        },
        metrics: MetricsConfig {
            host: "127.0.0.1".to_string(),
            port: 0,
        },
    }
}

/// One competition with an individual and a team registration type.
pub struct Catalog {
    pub competition: Competition,
    /// 5000 LKR, one member
    pub individual: RegistrationType,
    /// 7500 LKR, up to three members
    pub team: RegistrationType,
}

/// Everything a test needs to drive and inspect the platform.
pub struct TestApp {
    pub store: InMemoryStore,
    pub clock: FixedClock,
    pub orders: Arc<ScriptedOrderSequence>,
    pub mailer: RecordingMailer,
    pub feed: LiveFeed,
    pub config: Config,
    pub state: AppState,
}

impl TestApp {
    /// Default wiring: fallback order ids and codes, accepting mailer.
    pub fn new() -> Self {
        Self::build(
            test_config(),
            ScriptedOrderSequence::default(),
            ScriptedCodeGenerator::new(),
            RecordingMailer::new(),
        )
    }

    /// Replays `order_ids` before falling back to `ORDER-TEST-n`.
    pub fn with_orders(order_ids: &[&str]) -> Self {
        Self::build(
            test_config(),
            ScriptedOrderSequence::new(order_ids.iter().copied()),
            ScriptedCodeGenerator::new(),
            RecordingMailer::new(),
        )
    }

    pub fn with_codes(codes: ScriptedCodeGenerator) -> Self {
        Self::build(
            test_config(),
            ScriptedOrderSequence::default(),
            codes,
            RecordingMailer::new(),
        )
    }

    pub fn with_config(config: Config) -> Self {
        Self::build(
            config,
            ScriptedOrderSequence::default(),
            ScriptedCodeGenerator::new(),
            RecordingMailer::new(),
        )
    }

    pub fn with_mailer(mailer: RecordingMailer) -> Self {
        Self::build(
            test_config(),
            ScriptedOrderSequence::default(),
            ScriptedCodeGenerator::new(),
            mailer,
        )
    }

    pub fn build(
        config: Config,
        orders: ScriptedOrderSequence,
        codes: ScriptedCodeGenerator,
        mailer: RecordingMailer,
    ) -> Self {
        let store = InMemoryStore::new();
        let clock = test_clock();
        let orders = Arc::new(orders);
        let feed = LiveFeed::new(16);
        let deps = Dependencies {
            store: Arc::new(store.clone()),
            clock: Arc::new(clock.clone()),
            orders: orders.clone(),
            codes: Arc::new(codes),
            mailer: Arc::new(mailer.clone()),
            feed: feed.clone(),
        };
        let state = AppState::new(deps, &config);
        Self {
            store,
            clock,
            orders,
            mailer,
            feed,
            config,
            state,
        }
    }

    pub fn services(&self) -> &Services {
        &self.state.services
    }

    pub fn router(&self) -> Router {
        build_router(self.state.clone())
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    pub fn gateway(&self) -> Gateway {
        Gateway::new(self.config.gateway.clone())
    }

    /// Robotics competition closing in thirty days.
    pub fn catalog(&self) -> Catalog {
        let competition = self
            .store
            .insert_competition(fixtures::competition("RBT", self.now() + Duration::days(30)));
        let individual = self.store.insert_registration_type(fixtures::registration_type(
            &competition,
            "Individual",
            5000,
            1,
        ));
        let team = self
            .store
            .insert_registration_type(fixtures::registration_type(&competition, "Team", 7500, 3));
        Catalog {
            competition,
            individual,
            team,
        }
    }

    pub fn member(&self, email: &str) -> User {
        self.store.insert_user(fixtures::member(email))
    }

    pub fn moderator(&self, email: &str) -> User {
        self.store.insert_user(fixtures::moderator(email))
    }

    pub fn admin(&self, email: &str) -> User {
        self.store.insert_user(fixtures::admin(email))
    }

    /// Session token valid for a day.
    pub fn login(&self, user: &User) -> String {
        let token = format!("session-{}", user.id);
        self.store
            .insert_session(&token, user.id, self.now() + Duration::days(1));
        token
    }

    pub async fn add(&self, user: &User, registration_type: &RegistrationType, members: usize) {
        self.services()
            .carts
            .add_item(user, add_item(registration_type, members))
            .await
            .expect("add to cart");
    }

    /// Bank-transfer checkout of whatever is in the cart.
    pub async fn bank_checkout(&self, user: &User) -> String {
        self.services()
            .checkout
            .checkout(user, bank_request())
            .await
            .expect("bank checkout")
            .order_id()
            .to_string()
    }

    /// Signed notification for `order_id`.
    pub fn notification(&self, order_id: &str, amount: &str, status_code: i32) -> GatewayNotification {
        let mut notification = GatewayNotification {
            merchant_id: self.config.gateway.merchant_id.clone(),
            order_id: order_id.to_string(),
            payment_id: Some("320025071".to_string()),
            payhere_amount: amount.to_string(),
            payhere_currency: "LKR".to_string(),
            status_code,
            md5sig: String::new(),
        };
        notification.md5sig = self.gateway().notification_signature(&notification);
        notification
    }
}

pub fn add_item(registration_type: &RegistrationType, members: usize) -> AddItem {
    AddItem {
        competition_id: registration_type.competition_id,
        registration_type_id: registration_type.id,
        participant_details: fixtures::participant(members),
    }
}

pub fn bank_request() -> CheckoutRequest {
    CheckoutRequest {
        customer: fixtures::customer(),
        payment: PaymentChoice::Bank {
            bank_slip_url: "https://uploads.arena.test/slips/0001.jpg".to_string(),
        },
    }
}

pub fn card_request() -> CheckoutRequest {
    CheckoutRequest {
        customer: fixtures::customer(),
        payment: PaymentChoice::Card,
    }
}
