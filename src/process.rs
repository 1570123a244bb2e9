use std::path::PathBuf;

use chrono::{Local, NaiveDate};
use tokio::{fs::File, io::AsyncWriteExt};

use crate::config::{OutputFormat, ScraperConfig};
use crate::parse::FeatureResponse;
use crate::request::{FeatureSource, HttpSource, QueryRequest, QueryWindow};
use crate::{info_time, Error, Result, DATE_FORMAT};

/// Why a pagination run stopped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Termination {
    /// A window reached past the last record the server returned.
    Exhausted,
    /// A window came back with no features at all.
    EmptyWindow,
    /// No per-query cap configured, the whole layer was fetched in one query.
    SingleQuery,
    /// The configured output format can't be decoded. Nothing was requested.
    UnsupportedFormat(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PaginationReport {
    pub termination: Termination,
    pub requests: usize,
    pub features: usize,
    pub files: Vec<PathBuf>,
}

impl PaginationReport {
    fn new() -> Self {
        Self {
            termination: Termination::Exhausted,
            requests: 0,
            features: 0,
            files: Vec::new(),
        }
    }
}

/// Walks a layer's object ID space window by window, writing every response to its own partial file.
pub struct Paginator<S> {
    source: S,
    config: ScraperConfig,
    date: NaiveDate,
}

impl<S: FeatureSource> Paginator<S> {
    pub fn new(source: S, config: ScraperConfig) -> Self {
        Self {
            source,
            config,
            date: Local::now().date_naive(),
        }
    }

    /// Date stamped into partial file names. Defaults to today.
    pub fn with_date(mut self, date: NaiveDate) -> Self {
        self.date = date;
        self
    }

    pub fn source(&self) -> &S {
        &self.source
    }

    /// Runs one query for `window` (`None` means every record) and decodes the response.
    pub async fn fetch_window(
        &self,
        window: Option<QueryWindow>,
        format: OutputFormat,
    ) -> Result<FeatureResponse> {
        let request = QueryRequest {
            where_clause: self.config.where_clause.clone(),
            window,
            format_code: format.query_code(),
        };
        let body = self.source.query(&request).await?;
        FeatureResponse::decode(&body, format)
    }

    /// Fetches the whole layer. Requests are strictly sequential, any transport or decode
    /// failure ends the run.
    pub async fn paginate(&self) -> Result<PaginationReport> {
        let start_time = Local::now();
        let mut report = PaginationReport::new();

        let format = match OutputFormat::parse(&self.config.output_type) {
            Ok(format) => format,
            Err(Error::UnsupportedFormat(code)) => {
                info_time!("{} not yet supported", code);
                report.termination = Termination::UnsupportedFormat(code);
                return Ok(report);
            }
            Err(e) => return Err(e),
        };
        tokio::fs::create_dir_all(&self.config.save_dir_path).await?;

        let Some(chunk_size) = self.config.chunk_size() else {
            let res = self.fetch_window(None, format).await?;
            report.requests += 1;
            report.features += res.features().len();
            report.files.push(self.persist(&res, None, format).await?);
            report.termination = Termination::SingleQuery;
            info_time!(start_time, "Fetched {} features in one query.", report.features);
            return Ok(report);
        };

        info_time!("Started paginating with {} IDs per window", chunk_size);
        let id_field = self.config.id_field.as_str();
        let mut next_id = 1;
        let mut probes_left = self.config.probe_windows;

        loop {
            let window = QueryWindow::new(next_id, chunk_size)?;
            let res = self.fetch_window(Some(window), format).await?;
            report.requests += 1;

            let range_max = window.range_max();
            // Rows below the window are stale, the server ignored `objectIds`.
            let data_max = res.last_id(id_field)?.filter(|id| *id >= window.low);
            let Some(data_max) = data_max else {
                info_time!("Search range {}..={} returned no new features", window.low, range_max);
                if probes_left == 0 {
                    report.termination = Termination::EmptyWindow;
                    break;
                }
                probes_left -= 1;
                next_id = advance(range_max)?;
                continue;
            };
            info_time!("Search range max: {}, ObjectId max: {}", range_max, data_max);

            report.features += res.features().len();
            report
                .files
                .push(self.persist(&res, Some((window.low, data_max)), format).await?);
            probes_left = self.config.probe_windows;

            if range_max > data_max {
                if probes_left == 0 {
                    info_time!("Search range max exceeds maximum ObjectId");
                    report.termination = Termination::Exhausted;
                    break;
                }
                info_time!("Probing past ObjectId {} for gaps", range_max);
                probes_left -= 1;
                next_id = advance(range_max)?;
            } else {
                next_id = advance(data_max)?;
            }
        }

        info_time!(
            start_time,
            "Finished paginating: {} requests, {} features, {} files.",
            report.requests,
            report.features,
            report.files.len()
        );
        Ok(report)
    }

    async fn persist(
        &self,
        res: &FeatureResponse,
        id_range: Option<(u64, u64)>,
        format: OutputFormat,
    ) -> Result<PathBuf> {
        let file_name = partial_file_name(
            &self.config.save_file_base_name,
            id_range,
            self.date,
            format.extension(),
        );
        let path = self.config.save_dir_path.join(file_name);
        let mut file = File::create(&path).await?;
        file.write_all(&res.to_pretty_bytes()?).await?;
        file.flush().await?;
        info_time!("Wrote {} features to file: {}", res.features().len(), path.display());
        Ok(path)
    }
}

/// First ID of the next window. Always strictly past `last`.
fn advance(last: u64) -> Result<u64> {
    last.checked_add(1).ok_or(Error::IdOverflow(last))
}

/// `<base>_<min>-<max>_<date>.<ext>`, or `<base>__<date>.<ext>` when the whole layer was fetched.
pub fn partial_file_name(
    base: &str,
    id_range: Option<(u64, u64)>,
    date: NaiveDate,
    extension: &str,
) -> String {
    let id_range = id_range
        .map(|(min, max)| format!("{min}-{max}"))
        .unwrap_or_default();
    format!("{base}_{id_range}_{}.{extension}", date.format(DATE_FORMAT))
}

/// Paginates the layer described by `config` over HTTP.
pub async fn paginate(config: &ScraperConfig) -> Result<PaginationReport> {
    config.validate()?;
    let source = HttpSource::new(config.arcgis_url.clone());
    Paginator::new(source, config.clone()).paginate().await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn advance_stops_at_u64_max() {
        assert_eq!(advance(41).unwrap(), 42);
        assert!(matches!(advance(u64::MAX), Err(Error::IdOverflow(u64::MAX))));
    }

    #[test]
    fn partial_names() {
        let date = NaiveDate::from_ymd_opt(2020, 5, 1).unwrap();
        assert_eq!(
            partial_file_name("unacast", Some((1, 1499)), date, "json"),
            "unacast_1-1499_2020-05-01.json"
        );
        assert_eq!(
            partial_file_name("unacast", None, date, "geojson"),
            "unacast__2020-05-01.geojson"
        );
    }
}
