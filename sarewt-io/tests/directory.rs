use ndarray::{Array2, Array4};
use sarewt_core::{Cut, CutSpec, EventBatch, DIJET_FEATURE_NAMES};
use sarewt_io::{
    write_events, ChunkBudget, DirectoryEvents, DirectoryReader, FailurePolicy, WriteOptions,
};
use std::fs;
use std::path::Path;
use tempfile::tempdir;

const TAG_COLUMN: usize = 10;

/// Writes `n` events tagged with consecutive global indices starting at
/// `first`. The tag is stored in every constituent slot and in the last
/// feature column so row correspondence can be checked after any reshuffle.
#[allow(clippy::cast_precision_loss)]
fn write_tagged(path: &Path, first: usize, n: usize) {
    let constituents =
        Array4::from_shape_fn((n, 2, 4, 3), |(i, _, _, _)| (first + i) as f32);
    let features = Array2::from_shape_fn((n, 11), |(i, col)| {
        let tag = (first + i) as f32;
        match col {
            0 => 1000.0 + (tag % 200.0),
            1 | 6 => 300.0 + (tag % 50.0),
            9 => (tag % 30.0) / 10.0 - 1.5,
            TAG_COLUMN => tag,
            _ => 0.0,
        }
    });
    let data = DirectoryEvents {
        events: EventBatch::new(constituents, features).unwrap(),
        particle_feature_names: vec!["eta".into(), "phi".into(), "pt".into()],
        feature_names: DIJET_FEATURE_NAMES.iter().map(|s| (*s).to_string()).collect(),
    };
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).unwrap();
    }
    write_events(path, &data, &WriteOptions::default()).unwrap();
}

fn assert_rows_paired(events: &EventBatch) {
    for (row, features) in events.features().outer_iter().enumerate() {
        let tag = features[TAG_COLUMN];
        assert_eq!(events.constituents()[[row, 1, 3, 2]], tag, "row {row}");
    }
}

fn tags(events: &EventBatch) -> Vec<f32> {
    events.features().column(TAG_COLUMN).to_vec()
}

#[test]
fn three_file_directory() {
    let dir = tempdir().unwrap();
    write_tagged(&dir.path().join("qcd_000.h5"), 0, 57_964);
    write_tagged(&dir.path().join("qcd_001.h5"), 57_964, 36);
    write_tagged(&dir.path().join("qcd_002.h5"), 58_000, 58_096);

    let reader = DirectoryReader::new(dir.path());
    let all = reader.load_all(None, &CutSpec::new()).unwrap();
    assert_eq!(all.events.len(), 116_096);
    assert_eq!(all.events.features().shape(), &[116_096, 11]);

    let count = reader.count(&CutSpec::new(), true).unwrap();
    assert_eq!((count.files, count.events), (3, 116_096));

    let partial = reader.load_all(Some(77_000), &CutSpec::new()).unwrap();
    assert_eq!(partial.events.len(), 77_000);
    assert_eq!(partial.events.features()[[76_999, TAG_COLUMN]], 76_999.0);
    assert_rows_paired(&partial.events);
}

#[test]
fn mjj_threshold_keeps_strictly_greater() {
    let dir = tempdir().unwrap();
    write_tagged(&dir.path().join("a.h5"), 0, 500);
    write_tagged(&dir.path().join("b.h5"), 500, 500);

    let reader = DirectoryReader::new(dir.path());
    let all = reader.load_all(None, &CutSpec::new()).unwrap();
    let expected = all
        .events
        .features()
        .column(0)
        .iter()
        .filter(|&&m| m > 1100.0)
        .count();

    let cuts = CutSpec::new().with(Cut::Mjj, 1100.0);
    assert_eq!(reader.load_all(None, &cuts).unwrap().events.len(), expected);
    assert_eq!(reader.count(&cuts, true).unwrap().events, expected);
}

#[test]
fn sideband_and_signal_region_partition() {
    let dir = tempdir().unwrap();
    write_tagged(&dir.path().join("a.h5"), 0, 300);

    let reader = DirectoryReader::new(dir.path());
    let side = reader
        .load_all(None, &CutSpec::new().with(Cut::Sideband, 1.0))
        .unwrap();
    let signal = reader
        .load_all(None, &CutSpec::new().with(Cut::SignalRegion, 1.0))
        .unwrap();
    assert_eq!(side.events.len() + signal.events.len(), 300);

    let mut merged = tags(&side.events);
    merged.extend(tags(&signal.events));
    merged.sort_by(f32::total_cmp);
    let all: Vec<f32> = (0..300u16).map(f32::from).collect();
    assert_eq!(merged, all);

    let both = CutSpec::new()
        .with(Cut::Sideband, 1.0)
        .with(Cut::SignalRegion, 1.0);
    assert!(reader.load_all(None, &both).unwrap().events.is_empty());
}

#[test]
fn streamed_chunks_reproduce_full_load() {
    let dir = tempdir().unwrap();
    write_tagged(&dir.path().join("a.h5"), 0, 13);
    write_tagged(&dir.path().join("b.h5"), 13, 2);
    write_tagged(&dir.path().join("c.h5"), 15, 20);

    let reader = DirectoryReader::new(dir.path());
    let cuts = CutSpec::new().with(Cut::Mjj, 1010.0);
    let full = reader.load_all(None, &cuts).unwrap().events;

    for chunk_n in 1..=40 {
        let chunks: Vec<EventBatch> = reader
            .stream_by_count(chunk_n, &cuts)
            .unwrap()
            .collect::<Result<_, _>>()
            .unwrap();
        let (last, rest) = chunks.split_last().unwrap();
        assert!(rest.iter().all(|c| c.len() == chunk_n), "chunk_n {chunk_n}");
        assert!(!last.is_empty() && last.len() <= chunk_n);

        let joined = EventBatch::concat(chunks).unwrap().unwrap();
        assert_eq!(joined, full, "chunk_n {chunk_n}");
    }
}

#[test]
fn size_bounded_chunks_stay_within_budget() {
    let dir = tempdir().unwrap();
    write_tagged(&dir.path().join("a.h5"), 0, 100);
    write_tagged(&dir.path().join("b.h5"), 100, 57);

    let reader = DirectoryReader::new(dir.path());
    // 140 bytes per event, 2000 bytes hold 14 events.
    let budget = ChunkBudget::megabytes(2000.0 / (1024.0 * 1024.0));
    let mut stream = reader.stream_by_size(&budget, &CutSpec::new()).unwrap();

    let mut sizes = Vec::new();
    for chunk in stream.by_ref() {
        let chunk = chunk.unwrap();
        assert!(chunk.nbytes() <= 2000);
        assert_rows_paired(&chunk);
        sizes.push(chunk.len());
    }
    assert_eq!(stream.rows_per_chunk(), Some(14));
    assert_eq!(sizes.iter().sum::<usize>(), 157);
    assert_eq!(sizes.len(), 12);
    assert_eq!(sizes.last(), Some(&3));
}

#[test]
fn quarantined_and_corrupt_files_do_not_contribute() {
    let dir = tempdir().unwrap();
    write_tagged(&dir.path().join("run1/a.h5"), 0, 10);
    write_tagged(&dir.path().join("quarantine/b.h5"), 10, 10);
    write_tagged(&dir.path().join("run2/c.h5"), 20, 10);
    fs::write(dir.path().join("run2/d.h5"), b"truncated").unwrap();

    let reader = DirectoryReader::new(dir.path());
    let loaded = reader.load_all(None, &CutSpec::new()).unwrap();
    let expected: Vec<f32> = (0..10u8).chain(20..30).map(f32::from).collect();
    assert_eq!(tags(&loaded.events), expected);

    let streamed: usize = reader
        .stream_by_count(4, &CutSpec::new())
        .unwrap()
        .map(|chunk| chunk.unwrap().len())
        .sum();
    assert_eq!(streamed, 20);

    let strict = DirectoryReader::new(dir.path()).with_policy(FailurePolicy::Abort);
    let mut chunks = strict.stream_by_count(100, &CutSpec::new()).unwrap();
    assert!(chunks.next().unwrap().is_err());
    assert!(chunks.next().is_none());
}

#[test]
fn non_recursive_count_sees_top_level_only() {
    let dir = tempdir().unwrap();
    write_tagged(&dir.path().join("top.h5"), 0, 5);
    write_tagged(&dir.path().join("nested/deep.h5"), 5, 7);

    let reader = DirectoryReader::new(dir.path());
    assert_eq!(reader.count(&CutSpec::new(), false).unwrap().events, 5);
    assert_eq!(reader.count(&CutSpec::new(), true).unwrap().events, 12);
}
