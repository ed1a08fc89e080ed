//! DTW variance report over a snapshot directory of recordings.
//!
//! Every labeled run in every recording becomes one sample of its gesture
//! class. For each unordered class pair one task runs on a dedicated rayon
//! pool and computes, per feature, the mean length-normalized DTW distance
//! over all sample pairs. Tasks send their rows over a channel to a single
//! writer thread that owns `variance.csv`, so the file is append-only and
//! never written concurrently.
//!
//! The report works on files on disk, never on the live model, and may run
//! while editing continues.

use std::collections::BTreeMap;
use std::fs::File;
use std::path::{Path, PathBuf};
use std::thread;

use crossbeam_channel::Sender;
use log::{debug, info, warn};

use super::dtw::normalized_dtw;
use crate::core::model::runs;
use crate::entities::recording::RecordingFile;
use crate::entities::recording::RecordingStore;
use crate::error::{EditorError, Result};

pub const REPORT_DIR: &str = "variances";
pub const VARIANCE_FILE: &str = "variance.csv";
const HEADER: [&str; 4] = ["gesture 1", "gesture 2", "feature", "variance"];

/// One labeled run: `rows[t][feature]`.
#[derive(Clone, Debug)]
pub struct Sample {
    pub source: PathBuf,
    pub start: usize,
    pub rows: Vec<Vec<f64>>,
}

impl Sample {
    fn feature(&self, f: usize) -> Vec<f64> {
        self.rows.iter().map(|r| r.get(f).copied().unwrap_or(0.0)).collect()
    }
}

/// Samples grouped by class, plus the feature names they share.
#[derive(Clone, Debug, Default)]
pub struct ReportInput {
    pub features: Vec<String>,
    pub samples: BTreeMap<String, Vec<Sample>>,
}

impl ReportInput {
    pub fn classes(&self) -> Vec<&str> {
        self.samples.keys().map(String::as_str).collect()
    }

    pub fn sample_count(&self) -> usize {
        self.samples.values().map(Vec::len).sum()
    }
}

/// One `gesture 1;gesture 2;feature;variance` line.
#[derive(Clone, Debug, PartialEq)]
pub struct VarianceRow {
    pub g1: String,
    pub g2: String,
    pub feature: String,
    pub variance: f64,
}

/// Read every `*.json` recording in `dir` and cut its labeled runs.
///
/// Recordings whose channels differ from the first one are skipped.
pub fn collect_samples(dir: &Path) -> Result<ReportInput> {
    let pattern = format!("{}/*.json", glob::Pattern::escape(&dir.to_string_lossy()));
    let paths = glob::glob(&pattern)
        .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidInput, e.to_string()))?;

    let mut input = ReportInput::default();
    for path in paths.filter_map(|p| p.ok()) {
        let file = match RecordingFile::open(&path) {
            Ok(f) => f,
            Err(e) => {
                warn!("skipping {}: {}", path.display(), e);
                continue;
            }
        };
        let data = file.data();
        if input.features.is_empty() {
            input.features = data.channels.clone();
        } else if input.features != data.channels {
            warn!("skipping {}: channel layout differs", path.display());
            continue;
        }
        let mut found = 0;
        for (start, end, code) in runs(data.target.iter().copied()) {
            let Some(class) = data.classes.get(code as usize) else {
                warn!("{}: code {} has no class name", path.display(), code);
                continue;
            };
            input.samples.entry(class.clone()).or_default().push(Sample {
                source: path.clone(),
                start,
                rows: data.rows(start, end).to_vec(),
            });
            found += 1;
        }
        debug!("{}: {} labeled runs", path.display(), found);
    }
    Ok(input)
}

/// Unordered class pairs `(i, j)` with `i <= j`.
pub fn class_pairs(n: usize) -> Vec<(usize, usize)> {
    (0..n).flat_map(|i| (i..n).map(move |j| (i, j))).collect()
}

/// Mean normalized DTW distance per feature between two sample sets.
///
/// With `same` set the sets are one class and a sample is never compared
/// with itself. Returns `None` when no pair is left to compare.
pub fn pair_variance(g1: &[Sample], g2: &[Sample], same: bool, features: usize) -> Option<Vec<f64>> {
    let mut sums = vec![0.0; features];
    let mut pairs = 0usize;
    for (i, s1) in g1.iter().enumerate() {
        for (j, s2) in g2.iter().enumerate() {
            if same && i == j {
                continue;
            }
            let mut compared = false;
            for (f, sum) in sums.iter_mut().enumerate() {
                if let Some(d) = normalized_dtw(&s1.feature(f), &s2.feature(f)) {
                    *sum += d;
                    compared = true;
                }
            }
            if compared {
                pairs += 1;
            }
        }
    }
    (pairs > 0).then(|| sums.into_iter().map(|s| s / pairs as f64).collect())
}

/// Worker threads for the report pool: all cores but one.
pub fn worker_count() -> usize {
    num_cpus::get().saturating_sub(1).max(1)
}

/// Run the variance report into `out_dir/variances/variance.csv`.
///
/// Blocks until every class pair is done, then calls `on_done` once with the
/// report path. Returns the report path and the number of rows written.
pub fn generate_variance_report<F>(input: &ReportInput, out_dir: &Path, on_done: F) -> Result<(PathBuf, usize)>
where
    F: FnOnce(&Path),
{
    let report_dir = out_dir.join(REPORT_DIR);
    std::fs::create_dir_all(&report_dir)?;
    let report_file = report_dir.join(VARIANCE_FILE);

    let mut writer = csv::WriterBuilder::new()
        .delimiter(b';')
        .from_writer(File::create(&report_file)?);
    writer.write_record(HEADER)?;

    let (tx, rx) = crossbeam_channel::unbounded::<VarianceRow>();
    let writer_thread = thread::Builder::new()
        .name("annotrack-report-writer".into())
        .spawn(move || -> Result<usize> {
            let mut written = 0;
            for row in rx {
                writer.write_record([
                    row.g1.as_str(),
                    row.g2.as_str(),
                    row.feature.as_str(),
                    format!("{:.3}", row.variance).as_str(),
                ])?;
                written += 1;
            }
            writer.flush()?;
            Ok(written)
        })?;

    let threads = worker_count();
    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(threads)
        .thread_name(|i| format!("annotrack-dtw-{i}"))
        .build()?;
    let classes = input.classes();
    let pairs = class_pairs(classes.len());
    info!(
        "variance report: {} classes, {} pairs, {} samples on {} threads",
        classes.len(),
        pairs.len(),
        input.sample_count(),
        threads
    );

    pool.scope(|scope| {
        for (i, j) in pairs {
            let tx = tx.clone();
            let (g1, g2) = (classes[i], classes[j]);
            scope.spawn(move |_| run_pair(input, g1, g2, &tx));
        }
    });
    drop(tx);

    let written = writer_thread
        .join()
        .map_err(|_| EditorError::Io(std::io::Error::other("report writer panicked")))??;
    info!("variance report written: {} ({} rows)", report_file.display(), written);
    on_done(&report_file);
    Ok((report_file, written))
}

fn run_pair(input: &ReportInput, g1: &str, g2: &str, tx: &Sender<VarianceRow>) {
    let (Some(s1), Some(s2)) = (input.samples.get(g1), input.samples.get(g2)) else {
        return;
    };
    let Some(variances) = pair_variance(s1, s2, g1 == g2, input.features.len()) else {
        debug!("'{}' / '{}': nothing to compare", g1, g2);
        return;
    };
    for (feature, variance) in input.features.iter().zip(variances) {
        let row = VarianceRow {
            g1: g1.to_string(),
            g2: g2.to_string(),
            feature: feature.clone(),
            variance,
        };
        if tx.send(row).is_err() {
            warn!("report writer gone, dropping '{}' / '{}'", g1, g2);
            return;
        }
    }
    debug!("variances between '{}' and '{}' calculated", g1, g2);
}

/// Read a variance report back, keyed by `(g1, g2, feature)`.
pub fn read_variance_report(path: &Path) -> Result<BTreeMap<(String, String, String), f64>> {
    let mut reader = csv::ReaderBuilder::new().delimiter(b';').from_path(path)?;
    let mut table = BTreeMap::new();
    for record in reader.records() {
        let record = record?;
        if record.len() < 4 {
            warn!("short report line: {:?}", record);
            continue;
        }
        let Ok(value) = record[3].parse::<f64>() else {
            warn!("bad variance value: {:?}", &record[3]);
            continue;
        };
        table.insert((record[0].to_string(), record[1].to_string(), record[2].to_string()), value);
    }
    Ok(table)
}

/// A feature separates two classes when both within-class variances are
/// clearly below the between-class one.
pub fn is_distinctive(within_1: f64, within_2: f64, between: f64) -> bool {
    within_1 < 0.8 * between && within_2 < 0.8 * between
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;
    use crate::entities::recording::tests::sample_data;

    fn sample(values: &[f64]) -> Sample {
        Sample {
            source: PathBuf::from("mem"),
            start: 0,
            rows: values.iter().map(|&v| vec![v, -v]).collect(),
        }
    }

    #[test]
    fn test_class_pairs_are_unordered_with_diagonal() {
        assert_eq!(class_pairs(3), vec![(0, 0), (0, 1), (0, 2), (1, 1), (1, 2), (2, 2)]);
        assert!(class_pairs(0).is_empty());
    }

    #[test]
    fn test_same_class_skips_identical_samples() {
        let set = vec![sample(&[0.0, 0.0]), sample(&[2.0, 2.0])];
        // two ordered pairs left, each at normalized distance 4
        assert_eq!(pair_variance(&set, &set, true, 2), Some(vec![4.0, 4.0]));
        assert_eq!(pair_variance(&set[..1], &set[..1], true, 2), None);
    }

    #[test]
    fn test_report_writes_all_pairs_and_calls_back_once() {
        let dir = tempfile::tempdir().unwrap();
        let input = ReportInput {
            features: vec!["x".into(), "y".into()],
            samples: BTreeMap::from([
                ("point".to_string(), vec![sample(&[0.0, 1.0]), sample(&[0.0, 2.0])]),
                ("wave".to_string(), vec![sample(&[5.0, 5.0])]),
            ]),
        };
        let calls = AtomicUsize::new(0);
        let (path, rows) = generate_variance_report(&input, dir.path(), |_| {
            calls.fetch_add(1, Ordering::SeqCst);
        })
        .unwrap();

        // (point, point) and (point, wave) have pairs; (wave, wave) has one sample
        assert_eq!(rows, 4);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(path, dir.path().join(REPORT_DIR).join(VARIANCE_FILE));

        let table = read_variance_report(&path).unwrap();
        assert_eq!(table.len(), 4);
        let pw = table[&("point".to_string(), "wave".to_string(), "x".to_string())];
        let pp = table[&("point".to_string(), "point".to_string(), "x".to_string())];
        assert!(pw > pp);
        let text = std::fs::read_to_string(&path).unwrap();
        assert!(text.starts_with("gesture 1;gesture 2;feature;variance\n"));
    }

    #[test]
    fn test_collect_samples_cuts_labeled_runs() {
        let dir = tempfile::tempdir().unwrap();
        let mut data = sample_data(20);
        data.target[2..5].fill(1);
        data.target[10..12].fill(2);
        data.target[15..18].fill(1);
        RecordingFile::create(dir.path().join("a.json"), data).unwrap();
        std::fs::write(dir.path().join("broken.json"), "{").unwrap();

        let input = collect_samples(dir.path()).unwrap();
        assert_eq!(input.features, vec!["hand left x", "hand left y"]);
        assert_eq!(input.samples["wave"].len(), 2);
        assert_eq!(input.samples["point"][0].rows.len(), 2);
        assert_eq!(input.samples["wave"][1].start, 15);
    }

    #[test]
    fn test_distinctive_rule() {
        assert!(is_distinctive(1.0, 1.0, 2.0));
        assert!(!is_distinctive(1.0, 1.9, 2.0));
    }
}
