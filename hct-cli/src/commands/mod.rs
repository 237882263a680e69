//! Command handlers -- one module per subcommand

use std::io::Write;

use serde_json::{Map, Value};

use crate::error::CliError;
use crate::host::Delivery;

pub mod associate;
pub mod config;
pub mod consent;
pub mod embed;
pub mod event;
pub mod leave;
pub mod status;
pub mod visit;

/// Parse a `--data` argument into a JSON object. Absent means `{}`.
pub(crate) fn parse_data(data: Option<&str>) -> Result<Value, CliError> {
    let Some(raw) = data else {
        return Ok(Value::Object(Map::new()));
    };
    match serde_json::from_str::<Value>(raw) {
        Ok(value @ Value::Object(_)) => Ok(value),
        Ok(other) => Err(CliError::Command(format!(
            "--data must be a JSON object, got {other}"
        ))),
        Err(e) => Err(CliError::Command(format!("--data is not valid JSON: {e}"))),
    }
}

/// Text rendering of the requests a command produced.
pub(crate) fn render_delivery(delivery: &Delivery, w: &mut dyn Write) -> std::io::Result<()> {
    use colored::Colorize;

    if delivery.requests.is_empty() {
        writeln!(w, "  Requests: {}", "none".dimmed())?;
        return Ok(());
    }

    let mode = if delivery.dry_run {
        "dry run".yellow().to_string()
    } else {
        "sent".green().to_string()
    };
    writeln!(w, "  Requests ({}):", mode)?;
    for request in &delivery.requests {
        writeln!(w, "    {} {}", format!("{:<10}", request.path.as_str()).bold(), request.url)?;
    }
    if let (Some(sent), Some(failed)) = (delivery.sent, delivery.failed) {
        let failed_label = if failed > 0 {
            failed.to_string().red().to_string()
        } else {
            failed.to_string()
        };
        writeln!(w, "  Delivered: {} ok, {} failed", sent, failed_label)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::RequestSummary;
    use hct_core::types::CollectPath;

    #[test]
    fn test_parse_data_defaults_to_empty_object() {
        assert_eq!(parse_data(None).expect("parse"), Value::Object(Map::new()));
    }

    #[test]
    fn test_parse_data_rejects_non_objects() {
        assert!(parse_data(Some("[1,2]")).is_err());
        assert!(parse_data(Some("{oops")).is_err());
        let value = parse_data(Some(r#"{"sku":"A1"}"#)).expect("parse");
        assert_eq!(value["sku"], "A1");
    }

    #[test]
    fn test_render_delivery_lists_requests() {
        let delivery = Delivery {
            requests: vec![RequestSummary {
                path: CollectPath::Register,
                url: "https://collect.example/register/CODE".to_owned(),
                payload: Map::new(),
            }],
            dry_run: true,
            ..Default::default()
        };
        let mut buffer = Vec::new();
        render_delivery(&delivery, &mut buffer).expect("render");
        let output = String::from_utf8(buffer).expect("valid UTF-8");
        assert!(output.contains("/register"));
        assert!(output.contains("https://collect.example/register/CODE"));
        assert!(!output.contains("Delivered"));
    }

    #[test]
    fn test_render_delivery_empty() {
        let mut buffer = Vec::new();
        render_delivery(&Delivery::default(), &mut buffer).expect("render");
        let output = String::from_utf8(buffer).expect("valid UTF-8");
        assert!(output.contains("none"));
    }
}
