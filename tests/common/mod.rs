#![allow(dead_code)]

use std::path::Path;
use std::sync::Mutex;

use arcgis_scrap::{FeatureSource, QueryRequest, Result, ScraperConfig};
use async_trait::async_trait;
use chrono::NaiveDate;
use serde_json::{json, Value};

pub const URL: &str = "http://127.0.0.1:3000/FeatureServer/0/query";

pub fn date() -> NaiveDate {
    NaiveDate::from_ymd_opt(2020, 5, 1).unwrap()
}

pub fn config(dir: &Path, max_record_query: u32) -> ScraperConfig {
    ScraperConfig::new(URL, dir, "layer").with_max_record_query(max_record_query)
}

/// In-memory layer holding the given object IDs. Records every request it answers.
pub struct SimServer {
    ids: Vec<u64>,
    geojson: bool,
    pub requests: Mutex<Vec<QueryRequest>>,
}

impl SimServer {
    pub fn new(ids: impl IntoIterator<Item = u64>) -> Self {
        let mut ids: Vec<u64> = ids.into_iter().collect();
        ids.sort_unstable();
        Self {
            ids,
            geojson: false,
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn contiguous(count: u64) -> Self {
        Self::new(1..=count)
    }

    pub fn geojson(mut self) -> Self {
        self.geojson = true;
        self
    }

    pub fn requests(&self) -> Vec<QueryRequest> {
        self.requests.lock().unwrap().clone()
    }

    fn feature(&self, id: u64) -> Value {
        if self.geojson {
            json!({"type": "Feature", "id": id, "properties": {"name": format!("site {id}")}})
        } else {
            json!({"attributes": {"OBJECTID": id, "name": format!("site {id}")}})
        }
    }
}

#[async_trait]
impl FeatureSource for SimServer {
    async fn query(&self, request: &QueryRequest) -> Result<Vec<u8>> {
        self.requests.lock().unwrap().push(request.clone());
        let features: Vec<Value> = self
            .ids
            .iter()
            .filter(|id| match &request.window {
                Some(w) => (w.low..w.high).contains(*id),
                None => true,
            })
            .map(|id| self.feature(*id))
            .collect();
        let body = json!({"objectIdFieldName": "OBJECTID", "features": features});
        Ok(serde_json::to_vec(&body).unwrap())
    }
}

/// Answers every query with the same body.
pub struct FixedServer(pub Vec<u8>);

#[async_trait]
impl FeatureSource for FixedServer {
    async fn query(&self, _request: &QueryRequest) -> Result<Vec<u8>> {
        Ok(self.0.clone())
    }
}

/// Writes an Esri JSON partial file holding the given IDs.
pub fn write_partial(dir: &Path, name: &str, ids: impl IntoIterator<Item = u64>) {
    let features: Vec<Value> = ids
        .into_iter()
        .map(|id| json!({"attributes": {"OBJECTID": id, "value": id * 10}}))
        .collect();
    let body = json!({"features": features});
    std::fs::write(dir.join(name), serde_json::to_vec_pretty(&body).unwrap()).unwrap();
}

pub fn file_names(paths: &[std::path::PathBuf]) -> Vec<String> {
    paths
        .iter()
        .map(|p| p.file_name().unwrap().to_string_lossy().into_owned())
        .collect()
}
