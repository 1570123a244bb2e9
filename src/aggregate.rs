use std::path::{Path, PathBuf};

use chrono::{Local, NaiveDate};
use indexmap::IndexSet;
use serde_json::{Map, Value};
use walkdir::WalkDir;

use crate::config::{OutputFormat, ScraperConfig};
use crate::parse::{feature_attributes, feature_id, FeatureResponse};
use crate::{info_time, warn_time, Error, Result, DATE_FORMAT};

/// One feature's attributes, tagged with its identifier and its position before sorting.
#[derive(Debug, Clone, PartialEq)]
pub struct Row {
    pub index: usize,
    pub id: u64,
    pub values: Map<String, Value>,
}

/// Every feature from every partial file, sorted by identifier. Duplicates are kept.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ConsolidatedTable {
    /// Union of attribute names in first-seen order.
    pub columns: IndexSet<String>,
    pub rows: Vec<Row>,
}

impl ConsolidatedTable {
    fn push(&mut self, id: u64, values: Map<String, Value>) {
        for key in values.keys() {
            if !self.columns.contains(key) {
                self.columns.insert(key.clone());
            }
        }
        let index = self.rows.len();
        self.rows.push(Row { index, id, values });
    }

    pub fn ids(&self) -> impl Iterator<Item = u64> + '_ {
        self.rows.iter().map(|row| row.id)
    }

    /// Writes a leading unnamed index column followed by one column per attribute.
    pub fn write_csv<W: std::io::Write>(&self, writer: W) -> Result<()> {
        let mut wtr = csv::Writer::from_writer(writer);
        wtr.write_record(std::iter::once("").chain(self.columns.iter().map(String::as_str)))?;
        for row in &self.rows {
            let mut record = Vec::with_capacity(self.columns.len() + 1);
            record.push(row.index.to_string());
            record.extend(
                self.columns
                    .iter()
                    .map(|col| row.values.get(col).map(render_cell).unwrap_or_default()),
            );
            wtr.write_record(&record)?;
        }
        wtr.flush()?;
        Ok(())
    }
}

fn render_cell(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct AggregationReport {
    pub files: usize,
    pub skipped: Vec<PathBuf>,
    pub rows: usize,
    pub output: PathBuf,
}

/// Folds partial files back into one table.
#[derive(Debug, Clone)]
pub struct Aggregator {
    format: OutputFormat,
    id_field: String,
    skip_malformed: bool,
}

impl Aggregator {
    pub fn new(format: OutputFormat, id_field: impl Into<String>) -> Self {
        Self {
            format,
            id_field: id_field.into(),
            skip_malformed: false,
        }
    }

    pub fn from_config(config: &ScraperConfig) -> Result<Self> {
        let format = OutputFormat::parse(&config.output_type)?;
        Ok(Self::new(format, config.id_field.clone()).skip_malformed(config.skip_malformed))
    }

    /// Warn and move on instead of failing when a partial file can't be read.
    pub fn skip_malformed(mut self, skip: bool) -> Self {
        self.skip_malformed = skip;
        self
    }

    /// All partial files under `dir`, recursively. Order is whatever the filesystem gives.
    /// A directory that can't be listed is an error, its files would otherwise go missing.
    pub fn collect(&self, dir: impl AsRef<Path>) -> Result<Vec<PathBuf>> {
        let ext = self.format.extension();
        let mut paths = Vec::new();
        for entry in WalkDir::new(dir) {
            let entry = entry.map_err(std::io::Error::from)?;
            if entry.file_type().is_file() && entry.path().extension().is_some_and(|e| e == ext) {
                paths.push(entry.into_path());
            }
        }
        Ok(paths)
    }

    /// Loads every file and sorts the combined rows by identifier.
    /// Files are read in path order so the result doesn't depend on how they were listed.
    pub fn aggregate(&self, paths: &[PathBuf]) -> Result<ConsolidatedTable> {
        self.aggregate_with_skips(paths).map(|(table, _)| table)
    }

    fn aggregate_with_skips(&self, paths: &[PathBuf]) -> Result<(ConsolidatedTable, Vec<PathBuf>)> {
        let mut paths = paths.to_vec();
        paths.sort();

        let mut table = ConsolidatedTable::default();
        let mut skipped = Vec::new();
        for path in paths {
            match self.load_rows(&path) {
                Ok(rows) => {
                    for (id, values) in rows {
                        table.push(id, values);
                    }
                }
                Err(e @ Error::MalformedPartialFile { .. }) if self.skip_malformed => {
                    warn_time!("Skipping {}", e);
                    skipped.push(path);
                }
                Err(e) => return Err(e),
            }
        }
        table.rows.sort_by_key(|row| row.id);
        Ok((table, skipped))
    }

    fn load_rows(&self, path: &Path) -> Result<Vec<(u64, Map<String, Value>)>> {
        let raw = std::fs::read(path)?;
        let res = FeatureResponse::decode(&raw, self.format).map_err(|e| Error::malformed(path, e))?;

        res.features()
            .iter()
            .enumerate()
            .map(|(n, feature)| -> Result<(u64, Map<String, Value>)> {
                let attrs = feature_attributes(feature, self.format).ok_or_else(|| {
                    Error::malformed(
                        path,
                        format!("feature {n} has no `{}` object", self.format.attributes_key()),
                    )
                })?;
                let id = feature_id(feature, self.format, &self.id_field)
                    .map_err(|e| Error::malformed(path, format!("feature {n}: {e}")))?;
                Ok((id, self.with_id_column(attrs, id)))
            })
            .collect()
    }

    /// GeoJSON features may keep their ID outside `properties`, it still gets a column.
    fn with_id_column(&self, attrs: &Map<String, Value>, id: u64) -> Map<String, Value> {
        if attrs.contains_key(&self.id_field) {
            return attrs.clone();
        }
        let mut values = Map::with_capacity(attrs.len() + 1);
        values.insert(self.id_field.clone(), Value::from(id));
        values.extend(attrs.iter().map(|(k, v)| (k.clone(), v.clone())));
        values
    }

    /// Collects everything under `dir` and writes `<base>_<date>.csv` next to it.
    pub fn run(&self, dir: &Path, base: &str, date: NaiveDate) -> Result<AggregationReport> {
        let start_time = Local::now();
        info_time!("Opening {} files and saving features to CSV", self.format.extension());

        let paths = self.collect(dir)?;
        let (table, skipped) = self.aggregate_with_skips(&paths)?;

        let output = dir.join(export_file_name(base, date));
        let file = std::fs::File::create(&output)?;
        table.write_csv(std::io::BufWriter::new(file))?;

        info_time!(
            start_time,
            "Wrote {} rows from {} files to: {}",
            table.rows.len(),
            paths.len() - skipped.len(),
            output.display()
        );
        Ok(AggregationReport {
            files: paths.len() - skipped.len(),
            skipped,
            rows: table.rows.len(),
            output,
        })
    }
}

/// `<base>_<date>.csv`
pub fn export_file_name(base: &str, date: NaiveDate) -> String {
    format!("{base}_{}.csv", date.format(DATE_FORMAT))
}

/// Aggregates the partial files in `config.save_dir_path` on a blocking thread.
pub async fn aggregate(config: &ScraperConfig) -> Result<AggregationReport> {
    config.validate()?;
    let aggregator = Aggregator::from_config(config)?;
    let dir = config.save_dir_path.clone();
    let base = config.save_file_base_name.clone();
    let date = Local::now().date_naive();

    tokio::task::spawn_blocking(move || aggregator.run(&dir, &base, date)).await?
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn attrs(value: Value) -> Map<String, Value> {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn columns_are_union_in_first_seen_order() {
        let mut table = ConsolidatedTable::default();
        table.push(2, attrs(json!({"OBJECTID": 2, "a": 1})));
        table.push(1, attrs(json!({"OBJECTID": 1, "b": "x"})));
        assert_eq!(
            table.columns.iter().collect::<Vec<_>>(),
            vec!["OBJECTID", "a", "b"]
        );
        assert_eq!(table.rows[1].index, 1);
    }

    #[test]
    fn csv_has_index_column_and_blank_missing_cells() {
        let mut table = ConsolidatedTable::default();
        table.push(1, attrs(json!({"OBJECTID": 1, "name": "Šiška, LJ", "ok": true})));
        table.push(2, attrs(json!({"OBJECTID": 2, "name": null})));

        let mut out = Vec::new();
        table.write_csv(&mut out).unwrap();
        let text = String::from_utf8(out).unwrap();
        assert_eq!(
            text,
            ",OBJECTID,name,ok\n0,1,\"Šiška, LJ\",true\n1,2,,\n"
        );
    }

    #[test]
    fn fallback_id_gets_its_own_column() {
        let agg = Aggregator::new(OutputFormat::GeoJson, "OBJECTID");
        let values = agg.with_id_column(&attrs(json!({"name": "x"})), 7);
        assert_eq!(values.keys().collect::<Vec<_>>(), vec!["OBJECTID", "name"]);
        assert_eq!(values["OBJECTID"], 7);

        let kept = attrs(json!({"name": "y", "OBJECTID": 8}));
        assert_eq!(agg.with_id_column(&kept, 8), kept);
    }

    #[test]
    fn export_name() {
        let date = NaiveDate::from_ymd_opt(2021, 1, 9).unwrap();
        assert_eq!(export_file_name("unacast", date), "unacast_2021-01-09.csv");
    }
}
