//! Output formatting

use clap::ValueEnum;
use serde::Serialize;
use serde_json::Value;
use tabled::builder::Builder;
use tabled::settings::Style;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    Table,
    Json,
    Yaml,
}

impl OutputFormat {
    pub fn render<T: Serialize>(&self, data: &T) -> anyhow::Result<String> {
        Ok(match self {
            OutputFormat::Json => serde_json::to_string_pretty(data)?,
            OutputFormat::Yaml => serde_yaml::to_string(data)?,
            OutputFormat::Table => table(&serde_json::to_value(data)?),
        })
    }

    pub fn print<T: Serialize>(&self, data: &T) -> anyhow::Result<()> {
        println!("{}", self.render(data)?);
        Ok(())
    }
}

/// Flatten a JSON value into borderless `key  value` rows
fn table(value: &Value) -> String {
    let mut rows = Vec::new();
    flatten("", value, &mut rows);

    let mut builder = Builder::default();
    for (key, value) in rows {
        builder.push_record([key, value]);
    }
    builder.build().with(Style::blank()).to_string()
}

fn flatten(prefix: &str, value: &Value, rows: &mut Vec<(String, String)>) {
    let key = |suffix: &str| {
        if prefix.is_empty() {
            suffix.to_string()
        } else {
            format!("{prefix}.{suffix}")
        }
    };
    match value {
        Value::Object(map) => {
            for (k, v) in map {
                flatten(&key(k.as_str()), v, rows);
            }
        }
        Value::Array(items) => {
            for (i, v) in items.iter().enumerate() {
                flatten(&key(i.to_string().as_str()), v, rows);
            }
        }
        Value::String(s) => rows.push((prefix.to_string(), s.clone())),
        other => rows.push((prefix.to_string(), other.to_string())),
    }
}
