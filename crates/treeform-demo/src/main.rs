#![forbid(unsafe_code)]

//! Scripted editing session over a small contact form.
//!
//! Run with `TREEFORM_LOG=treeform=debug` to watch validation runs, and
//! `TREEFORM_DEFER_MS=300` to debounce the username availability check.

use std::time::Duration;

use serde_json::{Value, json};
use treeform::validation::rules::{Email, MinLength, Required};
use treeform::validation::{ValidationModel, Validator};
use treeform::{FormConfig, FormError, LeafConfig, LeafController, ModelCell};

const TAKEN: [&str; 2] = ["admin", "root"];

/// Pretend remote lookup.
fn username_available() -> Validator {
    Validator::from_async(|value: Value| async move {
        tokio::time::sleep(Duration::from_millis(120)).await;
        let name = value.as_str().unwrap_or_default().to_owned();
        TAKEN
            .contains(&name.as_str())
            .then(|| format!("\"{name}\" is already taken"))
    })
    .named("username_available")
}

struct ContactForm {
    cell: ModelCell,
    validation: ValidationModel,
    leaves: Vec<LeafController>,
}

impl ContactForm {
    fn new(config: FormConfig) -> Result<Self, FormError> {
        let cell = ModelCell::new(json!({
            "contact": {"firstName": "", "lastName": "", "email": ""},
            "account": {"username": ""}
        }));
        let validation = ValidationModel::with_config(config);
        let configs = [
            LeafConfig::new("contact.firstName").validator(Required::new()),
            LeafConfig::new("contact.lastName").validator(Required::new()),
            LeafConfig::new("contact.email")
                .validator(Required::new())
                .validator(Email::new())
                .show_errors(true),
            LeafConfig::new("account.username")
                .validator(MinLength::new(3))
                .deferred_validator(username_available()),
        ];
        let leaves = configs
            .into_iter()
            .map(|config| LeafController::new(config, &validation, cell.replacer()))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self {
            cell,
            validation,
            leaves,
        })
    }

    fn leaf(&self, location: &str) -> Option<&LeafController> {
        self.leaves.iter().find(|leaf| leaf.location().as_str() == location)
    }

    fn sync_all(&self) -> Result<(), FormError> {
        let model = self.cell.get();
        for leaf in &self.leaves {
            leaf.sync(&model)?;
        }
        Ok(())
    }

    fn type_and_leave(&self, location: &str, text: &str) -> Result<(), FormError> {
        let Some(leaf) = self.leaf(location) else {
            tracing::warn!(location, "no leaf bound at location, skipping");
            return Ok(());
        };
        leaf.change(&self.cell.get(), json!(text))?;
        leaf.blur(&self.cell.get())?;
        self.sync_all()
    }

    fn print(&self, step: &str) {
        println!("== {step}");
        let model = self.cell.get();
        for leaf in &self.leaves {
            leaf.render(&model, |view| {
                let marker = if view.is_validating() { " (checking)" } else { "" };
                println!("  {:<20} {}{marker}", view.location().as_str(), view.value());
                for error in view.errors() {
                    println!("      ! {error}");
                }
            });
        }
        let pending = self.validation.all_errors_for_location(None).len();
        println!("  {pending} location(s) with errors");
    }
}

async fn run() -> Result<(), FormError> {
    let config = FormConfig::from_env();
    tracing::info!(defer = ?config.default_defer, "starting contact form session");

    let form = ContactForm::new(config)?;
    form.sync_all()?;
    form.print("mounted");

    form.type_and_leave("contact.firstName", "")?;
    form.print("first name left empty");

    form.type_and_leave("contact.firstName", "Ada")?;
    form.type_and_leave("contact.lastName", "Lovelace")?;
    form.type_and_leave("contact.email", "ada@example")?;
    form.print("names filled in, email incomplete");

    form.type_and_leave("contact.email", "ada@example.com")?;
    form.type_and_leave("account.username", "ad")?;
    form.type_and_leave("account.username", "admin")?;
    form.print("username submitted");

    tokio::time::sleep(Duration::from_millis(500)).await;
    form.print("availability checked");

    form.type_and_leave("account.username", "ada")?;
    tokio::time::sleep(Duration::from_millis(500)).await;
    form.print("final");

    form.validation.teardown();
    Ok(())
}

#[tokio::main(flavor = "current_thread")]
async fn main() {
    treeform::logging::init();
    if let Err(e) = run().await {
        eprintln!("Form error: {e}");
        std::process::exit(1);
    }
}
