#![forbid(unsafe_code)]

//! Tracing integration tests.
//!
//! Validator failures are reported as `warn` events naming the validator;
//! run lifecycle events are emitted at `debug`.

use std::sync::{Arc, Mutex};

use serde_json::{Value, json};
use tracing::Level;
use tracing_subscriber::layer::SubscriberExt;
use treeform::validation::{ValidationModel, Validator, Verdict};
use treeform::{LeafConfig, LeafController, ModelCell};

// ============================================================================
// Test Infrastructure
// ============================================================================

#[derive(Debug, Clone)]
struct CapturedEvent {
    level: Level,
    message: String,
    validator: Option<String>,
}

/// A tracing Layer that records every event.
struct EventCapture {
    events: Arc<Mutex<Vec<CapturedEvent>>>,
}

#[derive(Default)]
struct FieldVisitor {
    message: String,
    validator: Option<String>,
}

impl tracing::field::Visit for FieldVisitor {
    fn record_debug(&mut self, field: &tracing::field::Field, value: &dyn std::fmt::Debug) {
        match field.name() {
            "message" => self.message = format!("{value:?}"),
            "validator" => self.validator = Some(format!("{value:?}")),
            _ => {}
        }
    }

    fn record_str(&mut self, field: &tracing::field::Field, value: &str) {
        match field.name() {
            "message" => self.message = value.to_string(),
            "validator" => self.validator = Some(value.to_string()),
            _ => {}
        }
    }
}

impl<S: tracing::Subscriber> tracing_subscriber::Layer<S> for EventCapture {
    fn on_event(&self, event: &tracing::Event<'_>, _ctx: tracing_subscriber::layer::Context<'_, S>) {
        let mut visitor = FieldVisitor::default();
        event.record(&mut visitor);
        self.events.lock().unwrap().push(CapturedEvent {
            level: *event.metadata().level(),
            message: visitor.message,
            validator: visitor.validator,
        });
    }
}

fn with_captured_events(f: impl FnOnce()) -> Vec<CapturedEvent> {
    let events = Arc::new(Mutex::new(Vec::new()));
    let subscriber = tracing_subscriber::registry().with(EventCapture {
        events: Arc::clone(&events),
    });
    tracing::subscriber::with_default(subscriber, f);
    let captured = events.lock().unwrap().clone();
    captured
}

// ============================================================================
// Tests
// ============================================================================

#[test]
fn panicking_validator_is_logged_at_warn() {
    let events = with_captured_events(|| {
        let cell = ModelCell::new(json!({"name": ""}));
        let validation = ValidationModel::new();
        let name = LeafController::new(
            LeafConfig::new("name")
                .validator(Validator::new(|_: &Value| -> Verdict { panic!("broken rule") }).named("broken"))
                .validator(Validator::new(|_: &Value| "still checked")),
            &validation,
            cell.replacer(),
        )
        .unwrap();
        name.blur(&cell.get()).unwrap();
        assert_eq!(name.errors(), ["still checked"]);
    });

    let warning = events
        .iter()
        .find(|e| e.level == Level::WARN)
        .expect("a warning for the panicking validator");
    assert_eq!(warning.validator.as_deref(), Some("broken"));
    assert!(warning.message.contains("panicked"));
}

#[test]
fn run_start_is_logged_at_debug() {
    let events = with_captured_events(|| {
        let cell = ModelCell::new(json!({"name": "Ada"}));
        let validation = ValidationModel::new();
        let name = LeafController::new(LeafConfig::new("name"), &validation, cell.replacer())
            .unwrap();
        name.blur(&cell.get()).unwrap();
    });

    assert!(
        events
            .iter()
            .any(|e| e.level == Level::DEBUG && e.message == "validation run started")
    );
    assert!(
        events
            .iter()
            .any(|e| e.level == Level::DEBUG && e.message == "leaf touched")
    );
}
