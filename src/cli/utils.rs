use std::sync::Arc;

use serde_json::{json, Value};

use crate::cli::OutputFormat;
use crate::database::{DatabaseManager, PgStore, Store};

/// Output a success message in the appropriate format
pub fn output_success(output_format: &OutputFormat, message: &str, data: Option<Value>) -> anyhow::Result<()> {
    match output_format {
        OutputFormat::Json => {
            let mut response = json!({
                "success": true,
                "message": message
            });

            if let (Some(target), Some(Value::Object(extra))) = (response.as_object_mut(), data) {
                target.extend(extra);
            }

            println!("{}", serde_json::to_string_pretty(&response)?);
        }
        OutputFormat::Text => {
            println!("✓ {}", message);
            if let Some(Value::Object(extra)) = data {
                for (key, value) in extra {
                    match value {
                        Value::String(s) => println!("  {}: {}", key, s),
                        other => println!("  {}: {}", key, other),
                    }
                }
            }
        }
    }
    Ok(())
}

/// Connects to the configured Postgres database as a data gateway.
pub async fn connect_store() -> anyhow::Result<Arc<dyn Store>> {
    let pool = DatabaseManager::connect().await?;
    Ok(Arc::new(PgStore::new(pool)))
}
