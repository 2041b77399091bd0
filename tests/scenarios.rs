//! End-to-end scenarios: synthetic slice directories built with
//! `tempfile`, run through the public `build` API, and checked against
//! literal expected shapes/values.

use ct_pyramid::codec::{Codec, PixelBuffer, Slice};
use ct_pyramid::engine::{sequential::SequentialEngine, LevelEngine};
use ct_pyramid::pair::PairTask;
use ct_pyramid::{build, scan, CancelToken, Options};

fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

fn write_constant(dir: &std::path::Path, name: &str, width: u32, height: u32, value: u8) {
    let codec = Codec;
    let slice = Slice::new(width, height, PixelBuffer::U8(vec![value; (width * height) as usize]));
    codec.write(&slice, &dir.join(name), false).unwrap();
}

fn write_constant_u16(dir: &std::path::Path, name: &str, width: u32, height: u32) {
    let codec = Codec;
    let mut data = vec![0u16; (width * height) as usize];
    for y in 0..height {
        let row_value = ((y as u32 * 65535) / (height - 1).max(1)) as u16;
        for x in 0..width {
            data[(y * width + x) as usize] = row_value;
        }
    }
    let slice = Slice::new(width, height, PixelBuffer::U16(data));
    codec.write(&slice, &dir.join(name), false).unwrap();
}

#[test]
fn odd_count_produces_six_files_at_level1_and_three_at_level2() {
    let dir = tempfile::tempdir().unwrap();
    for i in 0..11u32 {
        write_constant(dir.path(), &format!("slice_{:04}.tif", i), 256, 256, 100);
    }

    let options = Options::default();
    let cancel = CancelToken::new();
    let outcome = build(dir.path(), &options, &mut |_, _, _| {}, &cancel).unwrap();
    let report = outcome.into_inner();

    let level1 = dir.path().join(".thumbnail/1");
    let level2 = dir.path().join(".thumbnail/2");
    assert_eq!(std::fs::read_dir(&level1).unwrap().count(), 6);
    assert_eq!(std::fs::read_dir(&level2).unwrap().count(), 3);
    assert_eq!(report.levels.len(), 2);
}

#[test]
fn pyramid_depth_stops_at_512_and_volume_loader_picks_level2() {
    let dir = tempfile::tempdir().unwrap();
    for i in 0..8u32 {
        write_constant(dir.path(), &format!("slice_{:04}.tif", i), 2048, 2048, 50);
    }

    let options = Options::default();
    let cancel = CancelToken::new();
    let outcome = build(dir.path(), &options, &mut |_, _, _| {}, &cancel).unwrap();
    let report = outcome.into_inner();

    assert_eq!(report.levels.len(), 2);
    assert_eq!(report.levels[0].width, 1024);
    assert_eq!(report.levels[1].width, 512);
    assert!(!dir.path().join(".thumbnail/3").exists());

    // 512 is not < 512, so the loader falls back to the highest
    // available level rather than finding one strictly below the
    // threshold.
    assert_eq!(report.selected_level, Some(2));
}

#[test]
fn sixteen_bit_preservation_through_averaging_and_volume_normalization() {
    let dir = tempfile::tempdir().unwrap();
    for i in 0..4u32 {
        write_constant_u16(dir.path(), &format!("slice_{:04}.tif", i), 256, 256);
    }

    let options = Options::default();
    let cancel = CancelToken::new();
    let outcome = build(dir.path(), &options, &mut |_, _, _| {}, &cancel).unwrap();
    let report = outcome.into_inner();

    let level1_file = dir.path().join(".thumbnail/1/000000.tif");
    let codec = Codec;
    let slice = codec.read(&level1_file).unwrap();
    assert_eq!((slice.width, slice.height), (128, 128));
    assert!(slice.pixels.is_u16());

    let volume = report.volume.unwrap();
    assert_eq!(volume.data.len(), volume.depth * (volume.height as usize) * (volume.width as usize));
}

#[test]
fn cancel_then_resume_completes_the_remaining_pairs() {
    init_logging();
    let dir = tempfile::tempdir().unwrap();
    for i in 0..10u32 {
        write_constant(dir.path(), &format!("slice_{:04}.tif", i), 256, 256, 100);
    }

    let pattern = scan(dir.path(), &Codec).unwrap();
    let level1_dir = dir.path().join(".thumbnail/1");
    std::fs::create_dir_all(&level1_dir).unwrap();

    let tasks: Vec<PairTask> = (0..5usize)
        .map(|i| PairTask {
            index: i,
            source_a: pattern.path(dir.path(), pattern.seq_begin + (2 * i) as u64),
            source_b: Some(pattern.path(dir.path(), pattern.seq_begin + (2 * i + 1) as u64)),
            output: level1_dir.join(format!("{:06}.tif", i)),
        })
        .collect();

    // Cancel after the third completed pair by flipping the token from
    // inside the progress callback rather than racing a background
    // thread.
    let cancel = CancelToken::new();
    let mut completed = 0usize;
    let engine = SequentialEngine;
    let codec = Codec;
    engine
        .run_level(tasks, &codec, false, 512, &cancel, &mut |n| {
            completed += n;
            if completed == 3 {
                cancel.cancel();
            }
        })
        .unwrap();

    assert_eq!(std::fs::read_dir(&level1_dir).unwrap().count(), 3);

    let fresh_cancel = CancelToken::new();
    let options = Options {
        use_parallel: false,
        ..Options::default()
    };
    let outcome = build(dir.path(), &options, &mut |_, _, _| {}, &fresh_cancel).unwrap();
    assert!(!outcome.is_cancelled());
    assert_eq!(std::fs::read_dir(&level1_dir).unwrap().count(), 5);
}

#[test]
fn progress_sink_receives_monotonic_updates_ending_at_total() {
    let dir = tempfile::tempdir().unwrap();
    for i in 0..10u32 {
        write_constant(dir.path(), &format!("slice_{:04}.tif", i), 256, 256, 100);
    }

    let options = Options::default();
    let cancel = CancelToken::new();
    let mut last_done = 0.0f64;
    let mut last_total = 0.0f64;
    let mut call_count = 0usize;
    let mut sink = |done: f64, total: f64, _eta: &str| {
        assert!(done + 1e-9 >= last_done);
        assert!(done <= total + 1e-9);
        last_done = done;
        last_total = total;
        call_count += 1;
    };

    build(dir.path(), &options, &mut sink, &cancel).unwrap();

    assert!(call_count > 0);
    assert!((last_done - last_total).abs() < 1e-9);
}

#[test]
fn missing_middle_slice_pairs_surviving_neighbor_alone() {
    init_logging();
    let dir = tempfile::tempdir().unwrap();
    for i in 0..10u32 {
        if i == 5 {
            continue;
        }
        write_constant(dir.path(), &format!("slice_{:04}.tif", i), 256, 256, 100);
    }

    let options = Options::default();
    let cancel = CancelToken::new();
    let outcome = build(dir.path(), &options, &mut |_, _, _| {}, &cancel).unwrap();
    let report = outcome.into_inner();

    let level1 = dir.path().join(".thumbnail/1");
    assert_eq!(std::fs::read_dir(&level1).unwrap().count(), 5);
    assert!(report.volume.is_some());
}
