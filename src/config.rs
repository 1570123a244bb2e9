use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::{Error, Result, CHUNK_RATIO, DEFAULT_ID_FIELD, DEFAULT_OUTPUT_TYPE};

/// Everything the scraper needs to know about one FeatureServer layer and where to put its data.
///
/// Keys follow the JSON setup file:
/// ```json
/// {
///     "arcgis_url": "https://services.arcgis.com/.../FeatureServer/0/query",
///     "save_dir_path": "covid_data",
///     "save_file_base_name": "unacast_objid",
///     "max_record_query": 2000,
///     "output_type": "json"
/// }
/// ```
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ScraperConfig {
    /// Layer query endpoint.
    pub arcgis_url: String,
    /// Directory that receives partial files and the CSV export.
    pub save_dir_path: PathBuf,
    pub save_file_base_name: String,
    /// Server side per-query record cap. `None` means the whole layer fits in one query.
    #[serde(default)]
    pub max_record_query: Option<u32>,
    #[serde(default = "default_output_type")]
    pub output_type: String,
    /// Static filter predicate sent as `where`.
    #[serde(default, rename = "where")]
    pub where_clause: Option<String>,
    #[serde(default = "default_id_field")]
    pub id_field: String,
    /// Extra windows requested past the apparent end of the layer before giving up.
    #[serde(default)]
    pub probe_windows: u32,
    /// Skip unreadable partial files during aggregation instead of aborting.
    #[serde(default)]
    pub skip_malformed: bool,
}

fn default_output_type() -> String {
    DEFAULT_OUTPUT_TYPE.to_string()
}

fn default_id_field() -> String {
    DEFAULT_ID_FIELD.to_string()
}

impl ScraperConfig {
    pub fn new(
        arcgis_url: impl Into<String>,
        save_dir_path: impl Into<PathBuf>,
        save_file_base_name: impl Into<String>,
    ) -> Self {
        Self {
            arcgis_url: arcgis_url.into(),
            save_dir_path: save_dir_path.into(),
            save_file_base_name: save_file_base_name.into(),
            max_record_query: None,
            output_type: default_output_type(),
            where_clause: None,
            id_field: default_id_field(),
            probe_windows: 0,
            skip_malformed: false,
        }
    }

    pub fn with_max_record_query(mut self, max: u32) -> Self {
        self.max_record_query = Some(max);
        self
    }

    pub fn with_output_type(mut self, output_type: impl Into<String>) -> Self {
        self.output_type = output_type.into();
        self
    }

    pub fn with_where(mut self, where_clause: impl Into<String>) -> Self {
        self.where_clause = Some(where_clause.into());
        self
    }

    pub fn with_id_field(mut self, id_field: impl Into<String>) -> Self {
        self.id_field = id_field.into();
        self
    }

    pub fn with_probe_windows(mut self, probe_windows: u32) -> Self {
        self.probe_windows = probe_windows;
        self
    }

    pub fn with_skip_malformed(mut self, skip_malformed: bool) -> Self {
        self.skip_malformed = skip_malformed;
        self
    }

    /// Reads and validates a JSON setup file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)?;
        let config: ScraperConfig = serde_json::from_str(&raw)
            .map_err(|e| Error::Config(format!("{}: {e}", path.display())))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if !self.arcgis_url.starts_with("http://") && !self.arcgis_url.starts_with("https://") {
            return Err(Error::Config(
                "arcgis_url must start with http:// or https://".to_string(),
            ));
        }
        let base = &self.save_file_base_name;
        if base.is_empty() || base.contains(['/', '\\']) {
            return Err(Error::Config(format!(
                "save_file_base_name must be a non-empty file name, got `{base}`"
            )));
        }
        if let Some(max) = self.max_record_query {
            if max < 2 {
                return Err(Error::Config(format!(
                    "max_record_query must be at least 2, got {max}"
                )));
            }
        }
        if self.id_field.is_empty() {
            return Err(Error::Config("id_field must not be empty".to_string()));
        }
        Ok(())
    }

    /// Candidate IDs per window: 75% of the server cap, leaving room for missing IDs.
    pub fn chunk_size(&self) -> Option<u64> {
        self.max_record_query
            .map(|max| ((max as f64 * CHUNK_RATIO).floor() as u64).max(1))
    }

    /// `<save_dir>/<base>`, the prefix shared by every file this config writes.
    pub(crate) fn save_stem(&self) -> PathBuf {
        self.save_dir_path.join(&self.save_file_base_name)
    }
}

/// Feature collection formats the scraper can decode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    Json,
    GeoJson,
}

impl OutputFormat {
    pub fn parse(code: &str) -> Result<Self> {
        match code.to_ascii_lowercase().as_str() {
            "json" => Ok(OutputFormat::Json),
            "geojson" => Ok(OutputFormat::GeoJson),
            _ => Err(Error::UnsupportedFormat(code.to_string())),
        }
    }

    /// File extension of partial files.
    pub fn extension(self) -> &'static str {
        match self {
            OutputFormat::Json => "json",
            OutputFormat::GeoJson => "geojson",
        }
    }

    /// Value of the `f` query parameter. The `p` prefix asks for pretty output.
    pub fn query_code(self) -> String {
        format!("p{}", self.extension())
    }

    /// Member of a feature that holds its attribute map.
    pub fn attributes_key(self) -> &'static str {
        match self {
            OutputFormat::Json => "attributes",
            OutputFormat::GeoJson => "properties",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base() -> ScraperConfig {
        ScraperConfig::new("https://example.com/FeatureServer/0/query", "data", "layer")
    }

    #[test]
    fn chunk_is_three_quarters_of_cap() {
        assert_eq!(base().with_max_record_query(2000).chunk_size(), Some(1500));
        assert_eq!(base().with_max_record_query(5).chunk_size(), Some(3));
        assert_eq!(base().with_max_record_query(2).chunk_size(), Some(1));
        assert_eq!(base().chunk_size(), None);
    }

    #[test]
    fn rejects_bad_values() {
        assert!(base().validate().is_ok());
        assert!(matches!(
            ScraperConfig::new("ftp://x", "d", "b").validate(),
            Err(Error::Config(_))
        ));
        assert!(base().with_max_record_query(1).validate().is_err());
        assert!(ScraperConfig::new("http://x", "d", "a/b").validate().is_err());
        assert!(base().with_id_field("").validate().is_err());
    }

    #[test]
    fn deserializes_setup_file_keys() {
        let raw = r#"{
            "arcgis_url": "https://example.com/query",
            "save_dir_path": "covid_data",
            "save_file_base_name": "unacast_objid",
            "where": null,
            "max_record_query": 2000,
            "output_type": "json"
        }"#;
        let config: ScraperConfig = serde_json::from_str(raw).unwrap();
        assert_eq!(config.max_record_query, Some(2000));
        assert_eq!(config.where_clause, None);
        assert_eq!(config.id_field, "OBJECTID");
        assert_eq!(config.probe_windows, 0);
        assert!(!config.skip_malformed);
    }

    #[test]
    fn format_codes() {
        assert_eq!(OutputFormat::parse("JSON").unwrap(), OutputFormat::Json);
        assert_eq!(OutputFormat::parse("geojson").unwrap().query_code(), "pgeojson");
        assert!(matches!(
            OutputFormat::parse("pbf"),
            Err(Error::UnsupportedFormat(f)) if f == "pbf"
        ));
    }
}
