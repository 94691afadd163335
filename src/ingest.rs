//! The fetch run: walk every input file, download images whose URL is not yet
//! tracked and record each success before moving on.

use crate::config::Config;
use crate::error::{FetchError, IngestError, TrackingError};
use crate::source::CsvSource;
use crate::tracking::{TrackingEntry, TrackingMapping, TrackingStore};
use crate::utils::filename::{derive_filename, fallback_filename};
use crate::utils::files::{discover_sources, ensure_output_dir};
use crate::utils::http::Fetch;
use indicatif::{ProgressBar, ProgressStyle};
use tracing::{debug, info, warn};

/// What happened to one (column, row) cell.
#[derive(Debug)]
pub enum RecordOutcome {
    Downloaded(TrackingEntry),
    Skipped(SkipReason),
    Failed(FetchError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    EmptyUrl,
    AlreadyTracked,
}

/// A URL that could not be downloaded during the run.
#[derive(Debug, Clone)]
pub struct DownloadFailure {
    pub url: String,
    pub csv_file: String,
    pub column: String,
    pub reason: String,
}

/// An input file that could not be read.
#[derive(Debug, Clone)]
pub struct SourceFailure {
    pub csv_file: String,
    pub reason: String,
}

#[derive(Debug, Default)]
pub struct RunSummary {
    pub newly_downloaded_count: usize,
    pub processed_count: usize,
    pub limit_reached: bool,
    pub download_failures: Vec<DownloadFailure>,
    pub source_failures: Vec<SourceFailure>,
}

/// Drives one fetch run. Owns the in-memory tracking mapping for its lifetime.
pub struct Ingestor<F: Fetch> {
    config: Config,
    fetcher: F,
    store: TrackingStore,
    mapping: TrackingMapping,
}

impl<F: Fetch> Ingestor<F> {
    pub fn new(config: Config, fetcher: F) -> Self {
        let store = TrackingStore::new(config.tracking_path());
        Self {
            config,
            fetcher,
            store,
            mapping: TrackingMapping::new(),
        }
    }

    pub fn mapping(&self) -> &TrackingMapping {
        &self.mapping
    }

    pub async fn run(&mut self) -> Result<RunSummary, IngestError> {
        let output_dir = &self.config.output_dir;
        ensure_output_dir(output_dir).map_err(|source| IngestError::OutputDir {
            path: output_dir.clone(),
            source,
        })?;

        self.mapping = self.store.load()?;
        info!(
            "Loaded {} tracked images from {}",
            self.mapping.len(),
            self.store.path().display()
        );

        let input_dir = &self.config.input_dir;
        let sources = discover_sources(
            input_dir,
            &self.config.source_prefix,
            &self.config.source_suffix,
        )
        .map_err(|source| IngestError::Discover {
            path: input_dir.clone(),
            source,
        })?;
        info!("Found {} input files in {}", sources.len(), input_dir.display());

        let mut summary = RunSummary::default();
        for path in sources {
            if self.limit_reached(&summary) {
                break;
            }

            info!("Processing {}...", path.display());
            let source = match CsvSource::open(&path) {
                Ok(source) => source,
                Err(e) => {
                    warn!("Error reading {}: {}", path.display(), e);
                    summary.source_failures.push(SourceFailure {
                        csv_file: path.display().to_string(),
                        reason: e.to_string(),
                    });
                    continue;
                }
            };

            self.process_source(&source, &mut summary).await?;
        }

        summary.limit_reached = self.limit_reached(&summary);

        Ok(summary)
    }

    async fn process_source(
        &mut self,
        source: &CsvSource,
        summary: &mut RunSummary,
    ) -> Result<(), TrackingError> {
        let columns: Vec<String> = self
            .config
            .image_columns
            .iter()
            .filter(|column| source.has_column(column))
            .cloned()
            .collect();

        if columns.is_empty() {
            debug!("{} has no image columns", source.id());
        }

        for column in &columns {
            let pb = progress_bar(source.records().len() as u64, column);

            for record in source.records() {
                let url = source.value(record, column);
                let icao = source
                    .value(record, &self.config.code_column)
                    .unwrap_or_default();

                match self.process_record(source.id(), column, url, icao).await? {
                    RecordOutcome::Downloaded(entry) => {
                        summary.newly_downloaded_count += 1;
                        pb.suspend(|| {
                            info!(
                                "Downloaded and tracked: {} (ICAO: {})",
                                entry.filename, entry.icao
                            )
                        });
                    }
                    RecordOutcome::Skipped(reason) => {
                        debug!(?reason, column = %column, "Skipped row in {}", source.id());
                    }
                    RecordOutcome::Failed(e) => {
                        let url = url.unwrap_or_default();
                        pb.suspend(|| warn!("Failed to download {}: {}", url, e));
                        summary.download_failures.push(DownloadFailure {
                            url: url.to_string(),
                            csv_file: source.id().to_string(),
                            column: column.clone(),
                            reason: e.to_string(),
                        });
                    }
                }

                summary.processed_count += 1;
                pb.inc(1);

                if self.limit_reached(summary) {
                    pb.finish_and_clear();
                    return Ok(());
                }
            }

            pb.finish_and_clear();
        }

        Ok(())
    }

    /// Download one cell's URL unless it is blank or already tracked.
    ///
    /// Only a tracking store failure is an error; download problems come back
    /// as `RecordOutcome::Failed`.
    async fn process_record(
        &mut self,
        csv_file: &str,
        column: &str,
        url: Option<&str>,
        icao: &str,
    ) -> Result<RecordOutcome, TrackingError> {
        let Some(url) = url else {
            return Ok(RecordOutcome::Skipped(SkipReason::EmptyUrl));
        };
        if self.mapping.contains_key(url) {
            return Ok(RecordOutcome::Skipped(SkipReason::AlreadyTracked));
        }

        let mut filename = derive_filename(url);
        let mut destination = self.config.output_dir.join(&filename);
        if self.store.owns(&destination) {
            // Never let a download land on the tracking file
            filename = fallback_filename(url);
            destination = self.config.output_dir.join(&filename);
        }

        match self.fetcher.fetch(url, &destination).await {
            Ok(bytes) => {
                debug!("Downloaded: {} to {} ({} bytes)", url, destination.display(), bytes);
                let entry = TrackingEntry {
                    local_path: destination.to_string_lossy().into_owned(),
                    icao: icao.to_string(),
                    column: column.to_string(),
                    csv_file: csv_file.to_string(),
                    filename,
                };
                self.store.append(url, entry.clone())?;
                self.mapping.insert(url.to_string(), entry.clone());
                Ok(RecordOutcome::Downloaded(entry))
            }
            Err(e) => Ok(RecordOutcome::Failed(e)),
        }
    }

    /// A limit of 0 means no limit.
    fn limit_reached(&self, summary: &RunSummary) -> bool {
        self.config
            .limit
            .is_some_and(|limit| limit > 0 && summary.newly_downloaded_count >= limit)
    }
}

fn progress_bar(len: u64, column: &str) -> ProgressBar {
    let pb = ProgressBar::new(len);
    if let Ok(style) = ProgressStyle::default_bar()
        .template("{spinner:.green} {msg} [{bar:40.cyan/blue}] {pos}/{len} ({eta})")
    {
        pb.set_style(style.progress_chars("#>-"));
    }
    pb.set_message(column.to_string());
    pb
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::collections::HashSet;
    use std::fs;
    use std::path::{Path, PathBuf};
    use std::sync::{Arc, Mutex};

    /// Records every call; writes the URL as the file body unless told to fail.
    #[derive(Clone, Default)]
    struct ScriptedFetcher {
        failing: HashSet<String>,
        calls: Arc<Mutex<Vec<String>>>,
    }

    impl ScriptedFetcher {
        fn failing(urls: &[&str]) -> Self {
            Self {
                failing: urls.iter().map(|u| u.to_string()).collect(),
                ..Default::default()
            }
        }

        fn calls(&self) -> Vec<String> {
            self.calls.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl Fetch for ScriptedFetcher {
        async fn fetch(&self, url: &str, destination: &Path) -> Result<u64, FetchError> {
            self.calls.lock().unwrap().push(url.to_string());
            if self.failing.contains(url) {
                return Err(FetchError::Status(reqwest::StatusCode::NOT_FOUND));
            }
            fs::write(destination, url.as_bytes()).map_err(|source| FetchError::Io {
                operation: "Failed to write",
                path: destination.to_path_buf(),
                source,
            })?;
            Ok(url.len() as u64)
        }
    }

    struct Workspace {
        _tmp: tempfile::TempDir,
        input_dir: PathBuf,
        output_dir: PathBuf,
    }

    impl Workspace {
        fn new() -> Self {
            let tmp = tempfile::tempdir().unwrap();
            let input_dir = tmp.path().join("input");
            fs::create_dir(&input_dir).unwrap();
            let output_dir = tmp.path().join("plane-images");
            Self {
                _tmp: tmp,
                input_dir,
                output_dir,
            }
        }

        fn write_source(&self, name: &str, content: &str) {
            fs::write(self.input_dir.join(name), content).unwrap();
        }

        fn config(&self) -> Config {
            Config {
                input_dir: self.input_dir.clone(),
                output_dir: self.output_dir.clone(),
                ..Config::default()
            }
        }

        fn store(&self) -> TrackingStore {
            TrackingStore::new(self.config().tracking_path())
        }

        fn preload(&self, url: &str, icao: &str) {
            fs::create_dir_all(&self.output_dir).unwrap();
            let filename = derive_filename(url);
            self.store()
                .append(
                    url,
                    TrackingEntry {
                        local_path: self.output_dir.join(&filename).display().to_string(),
                        icao: icao.to_string(),
                        column: "#ImageLink".to_string(),
                        csv_file: "plane-alert-old-images.csv".to_string(),
                        filename,
                    },
                )
                .unwrap();
        }
    }

    const U1: &str = "https://img.example.com/planes/u1.jpg";
    const U2: &str = "https://img.example.com/planes/u2";
    const U3: &str = "https://img.example.com/planes/u3.png";

    #[tokio::test]
    async fn fetches_only_untracked_urls() {
        let ws = Workspace::new();
        ws.write_source(
            "plane-alert-a-images.csv",
            &format!("$ICAO,#ImageLink,#ImageLink2\nICAO1,{},{}\n", U1, U2),
        );
        ws.write_source(
            "plane-alert-b-images.csv",
            "$ICAO,$Operator\nICAO9,Acme Air\n",
        );
        ws.preload(U1, "ICAO1");
        let before = ws.store().load().unwrap();

        let fetcher = ScriptedFetcher::default();
        let mut ingestor = Ingestor::new(ws.config(), fetcher.clone());
        let summary = ingestor.run().await.unwrap();

        assert_eq!(fetcher.calls(), vec![U2.to_string()]);
        assert_eq!(summary.newly_downloaded_count, 1);
        assert_eq!(summary.processed_count, 2);
        assert!(summary.download_failures.is_empty());
        assert!(summary.source_failures.is_empty());

        let mapping = ws.store().load().unwrap();
        let urls: Vec<_> = mapping.keys().cloned().collect();
        assert_eq!(urls, vec![U1.to_string(), U2.to_string()]);
        assert_eq!(mapping[U1], before[U1]);

        let new_entry = &mapping[U2];
        assert_eq!(new_entry.icao, "ICAO1");
        assert_eq!(new_entry.column, "#ImageLink2");
        assert_eq!(new_entry.csv_file, "plane-alert-a-images.csv");
        assert_eq!(new_entry.filename, "u2.jpg");
        assert_eq!(
            new_entry.local_path,
            ws.output_dir.join("u2.jpg").to_string_lossy()
        );
        assert_eq!(fs::read(ws.output_dir.join("u2.jpg")).unwrap(), U2.as_bytes());
        assert_eq!(ingestor.mapping(), &mapping);
    }

    #[tokio::test]
    async fn second_run_downloads_nothing() {
        let ws = Workspace::new();
        ws.write_source(
            "plane-alert-civ-images.csv",
            &format!(
                "$ICAO,#ImageLink,#ImageLink2,#ImageLink3\nA1,{},{},\nB2,{},,\n",
                U1, U2, U3
            ),
        );

        let first_fetcher = ScriptedFetcher::default();
        let first = Ingestor::new(ws.config(), first_fetcher.clone())
            .run()
            .await
            .unwrap();
        assert_eq!(first.newly_downloaded_count, 3);
        assert_eq!(first.processed_count, 6);
        let after_first = fs::read_to_string(ws.config().tracking_path()).unwrap();

        let second_fetcher = ScriptedFetcher::default();
        let second = Ingestor::new(ws.config(), second_fetcher.clone())
            .run()
            .await
            .unwrap();
        assert_eq!(second.newly_downloaded_count, 0);
        assert_eq!(second.processed_count, 6);
        assert!(second_fetcher.calls().is_empty());
        assert_eq!(
            fs::read_to_string(ws.config().tracking_path()).unwrap(),
            after_first
        );
    }

    #[tokio::test]
    async fn failed_download_is_not_tracked() {
        let ws = Workspace::new();
        ws.write_source(
            "plane-alert-civ-images.csv",
            &format!("$ICAO,#ImageLink\nA1,{}\nB2,{}\n", U1, U3),
        );

        let fetcher = ScriptedFetcher::failing(&[U1]);
        let summary = Ingestor::new(ws.config(), fetcher.clone())
            .run()
            .await
            .unwrap();

        assert_eq!(fetcher.calls(), vec![U1.to_string(), U3.to_string()]);
        assert_eq!(summary.newly_downloaded_count, 1);
        assert_eq!(summary.download_failures.len(), 1);
        assert_eq!(summary.download_failures[0].url, U1);
        assert_eq!(summary.download_failures[0].column, "#ImageLink");

        let mapping = ws.store().load().unwrap();
        assert!(!mapping.contains_key(U1));
        assert_eq!(mapping[U3].icao, "B2");
    }

    #[tokio::test]
    async fn unreadable_source_does_not_stop_the_run() {
        let ws = Workspace::new();
        ws.write_source(
            "plane-alert-a-images.csv",
            "$ICAO,#ImageLink\nA1,https://img.example.com/x.jpg,extra,fields\n",
        );
        ws.write_source(
            "plane-alert-b-images.csv",
            &format!("$ICAO,#ImageLink\nB2,{}\n", U1),
        );

        let fetcher = ScriptedFetcher::default();
        let summary = Ingestor::new(ws.config(), fetcher.clone())
            .run()
            .await
            .unwrap();

        assert_eq!(summary.source_failures.len(), 1);
        assert!(summary.source_failures[0]
            .csv_file
            .ends_with("plane-alert-a-images.csv"));
        assert_eq!(fetcher.calls(), vec![U1.to_string()]);
        assert_eq!(summary.newly_downloaded_count, 1);
    }

    #[tokio::test]
    async fn blank_urls_and_missing_icao_are_handled() {
        let ws = Workspace::new();
        ws.write_source(
            "plane-alert-civ-images.csv",
            &format!("$Registration,#ImageLink\nN1,\nN2,  \nN3,{}\n", U1),
        );

        let fetcher = ScriptedFetcher::default();
        let summary = Ingestor::new(ws.config(), fetcher.clone())
            .run()
            .await
            .unwrap();

        assert_eq!(summary.processed_count, 3);
        assert_eq!(fetcher.calls(), vec![U1.to_string()]);
        assert_eq!(ws.store().load().unwrap()[U1].icao, "");
    }

    #[tokio::test]
    async fn download_limit_stops_early() {
        let ws = Workspace::new();
        ws.write_source(
            "plane-alert-a-images.csv",
            &format!("$ICAO,#ImageLink,#ImageLink2\nA1,{},{}\n", U1, U2),
        );
        ws.write_source(
            "plane-alert-b-images.csv",
            &format!("$ICAO,#ImageLink\nB2,{}\n", U3),
        );

        let fetcher = ScriptedFetcher::default();
        let config = Config {
            limit: Some(1),
            ..ws.config()
        };
        let summary = Ingestor::new(config, fetcher.clone()).run().await.unwrap();

        assert!(summary.limit_reached);
        assert_eq!(summary.newly_downloaded_count, 1);
        assert_eq!(summary.processed_count, 1);
        assert_eq!(fetcher.calls(), vec![U1.to_string()]);
    }

    #[tokio::test]
    async fn corrupt_tracking_file_aborts_before_fetching() {
        let ws = Workspace::new();
        ws.write_source(
            "plane-alert-civ-images.csv",
            &format!("$ICAO,#ImageLink\nA1,{}\n", U1),
        );
        fs::create_dir_all(&ws.output_dir).unwrap();
        fs::write(ws.config().tracking_path(), "{\"truncated\": ").unwrap();

        let fetcher = ScriptedFetcher::default();
        let err = Ingestor::new(ws.config(), fetcher.clone())
            .run()
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            IngestError::Tracking(TrackingError::Corrupt { .. })
        ));
        assert!(fetcher.calls().is_empty());
    }

    #[tokio::test]
    async fn unusable_output_dir_aborts() {
        let ws = Workspace::new();
        fs::write(&ws.output_dir, b"a file, not a directory").unwrap();

        let err = Ingestor::new(ws.config(), ScriptedFetcher::default())
            .run()
            .await
            .unwrap_err();

        assert!(matches!(err, IngestError::OutputDir { .. }));
    }

    #[tokio::test]
    async fn url_named_like_tracking_file_cannot_overwrite_it() {
        let ws = Workspace::new();
        let clash = "https://img.example.com/planes/downloaded_images.json";
        let clash_tmp = "https://img.example.com/planes/downloaded_images.json.tmp";
        ws.write_source(
            "plane-alert-civ-images.csv",
            &format!("$ICAO,#ImageLink\nA1,{}\nB2,{}\nC3,{}\nD4,{}\n", U1, clash, clash_tmp, U3),
        );

        let fetcher = ScriptedFetcher::default();
        let summary = Ingestor::new(ws.config(), fetcher.clone())
            .run()
            .await
            .unwrap();
        assert_eq!(summary.newly_downloaded_count, 4);

        let mapping = ws.store().load().unwrap();
        assert_eq!(mapping.len(), 4);
        assert_eq!(mapping[clash].filename, fallback_filename(clash));
        assert_eq!(mapping[clash_tmp].filename, fallback_filename(clash_tmp));
        assert_eq!(mapping[U3].icao, "D4");

        // A later run still reads the store and fetches nothing
        let second_fetcher = ScriptedFetcher::default();
        let second = Ingestor::new(ws.config(), second_fetcher.clone())
            .run()
            .await
            .unwrap();
        assert_eq!(second.newly_downloaded_count, 0);
        assert!(second_fetcher.calls().is_empty());
    }

    #[tokio::test]
    async fn tracking_write_failure_aborts_the_run() {
        let ws = Workspace::new();
        ws.write_source(
            "plane-alert-civ-images.csv",
            &format!("$ICAO,#ImageLink\nA1,{}\nB2,{}\n", U1, U3),
        );
        fs::create_dir_all(ws.store().tmp_path()).unwrap();

        let fetcher = ScriptedFetcher::default();
        let err = Ingestor::new(ws.config(), fetcher.clone())
            .run()
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            IngestError::Tracking(TrackingError::Io { .. })
        ));
        assert_eq!(fetcher.calls(), vec![U1.to_string()]);
        assert!(ws.output_dir.join("u1.jpg").exists());
        assert!(ws.store().load().unwrap().is_empty());
    }

    #[tokio::test]
    async fn zero_limit_means_no_limit() {
        let ws = Workspace::new();
        ws.write_source(
            "plane-alert-civ-images.csv",
            &format!("$ICAO,#ImageLink,#ImageLink2\nA1,{},{}\n", U1, U2),
        );

        let config = Config {
            limit: Some(0),
            ..ws.config()
        };
        let summary = Ingestor::new(config, ScriptedFetcher::default())
            .run()
            .await
            .unwrap();

        assert!(!summary.limit_reached);
        assert_eq!(summary.newly_downloaded_count, 2);
    }
}
