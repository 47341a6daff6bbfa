//! Shared fixtures for session integration tests.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Once;

use datafusion::arrow::array::Array;
use datafusion::arrow::util::display::array_value_to_string;
use strata_common::config::{AppConfig, TelemetryConfig};
use strata_session::{decode, Session, WirePayload};
use strata_telemetry::init_telemetry;

pub const REGIONS: [&str; 4] = ["North", "South", "East", "West"];

pub const SALES_ROWS: usize = 1000;

static TELEMETRY: Once = Once::new();

pub fn session() -> Session {
    session_with_config(AppConfig::defaults().unwrap())
}

pub fn session_with_config(config: AppConfig) -> Session {
    TELEMETRY.call_once(|| {
        let _ = init_telemetry(&TelemetryConfig::default());
    });
    Session::try_new(config).unwrap()
}

/// Writes `sales.csv` with columns `id`, `region`, `amount` and `date`.
/// Regions cycle through [`REGIONS`], so each region holds a quarter of the rows.
pub fn write_sales_csv(dir: &Path) -> PathBuf {
    let mut text = String::from("id,region,amount,date\n");
    for i in 0..SALES_ROWS {
        let region = REGIONS[i % REGIONS.len()];
        let amount = (i % 97) as f64 * 3.25 + 10.5;
        let day = i % 28 + 1;
        text.push_str(&format!("{i},{region},{amount:.2},2024-01-{day:02}\n"));
    }
    let path = dir.join("sales.csv");
    fs::write(&path, text).unwrap();
    path
}

/// Writes `events.csv` with a timestamp, a date and a boolean column.
/// The last row holds nulls in every column but `id`.
pub fn write_events_csv(dir: &Path) -> PathBuf {
    let text = "id,at,day,flag\n\
                1,2024-01-01 10:00:00,2024-01-01,true\n\
                2,2024-01-01 10:00:00,2024-01-02,false\n\
                3,2024-01-02 08:30:00,2024-01-02,true\n\
                4,,,\n";
    let path = dir.join("events.csv");
    fs::write(&path, text).unwrap();
    path
}

/// Writes `scores.csv`, where the second `score` is missing.
pub fn write_scores_csv(dir: &Path) -> PathBuf {
    let path = dir.join("scores.csv");
    fs::write(&path, "id,name,score\n1,a,10\n2,b,\n3,c,20\n4,d,30\n").unwrap();
    path
}

/// The values of one column of a payload, rendered as text.
#[allow(dead_code)]
pub fn column_values(payload: &WirePayload, column: &str) -> Vec<String> {
    let decoded = decode(payload.as_bytes()).unwrap();
    let index = decoded.schema.index_of(column).unwrap();
    decoded
        .batches
        .iter()
        .flat_map(|batch| {
            let array = batch.column(index).clone();
            (0..array.len())
                .map(|i| array_value_to_string(array.as_ref(), i).unwrap())
                .collect::<Vec<_>>()
        })
        .collect()
}
