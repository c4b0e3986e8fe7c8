use std::fs;
use std::path::{Path, PathBuf};

use headwater::common::{ColumnIdx, TransformError};
use headwater::encoder::FeatureFormat;
use headwater::pipeline::{DataSource, OovPolicy, TransformConfig, run};
use headwater::scaler::ScalerKind;
use headwater::scheduler::NegativeSamplingPolicy;

fn write_csv(dir: &Path, name: &str, rows: &[&str]) -> PathBuf {
    let path = dir.join(name);
    fs::write(&path, rows.join("\n") + "\n").unwrap();
    path
}

fn read_lines(path: &Path) -> Vec<String> {
    fs::read_to_string(path)
        .unwrap()
        .lines()
        .map(str::to_string)
        .collect()
}

fn cols(ids: &[u32]) -> Vec<ColumnIdx> {
    ids.iter().copied().map(ColumnIdx).collect()
}

/// rating,user,item,price
fn split_fixture(dir: &Path) -> (PathBuf, PathBuf) {
    let train = write_csv(
        dir,
        "train.csv",
        &[
            "rating,user,item,price",
            "5,u1,i1,10",
            "1,u2,i2,20",
            "4,u1,i3,30",
        ],
    );
    let eval = write_csv(
        dir,
        "eval.csv",
        &["rating,user,item,price", "3,u2,i1,15", "5,u9,i2,25"],
    );
    (train, eval)
}

fn split_config(dir: &Path) -> TransformConfig {
    let (train_path, eval_path) = split_fixture(dir);
    TransformConfig {
        source: DataSource::Split {
            train_path,
            eval_path,
        },
        train_output_path: dir.join("train.ffm"),
        eval_output_path: dir.join("eval.ffm"),
        threshold: 3.0,
        cat_cols: cols(&[1, 2]),
        num_cols: cols(&[3]),
        ..TransformConfig::default()
    }
}

#[test]
fn test_explicit_labels_libffm() {
    let dir = tempfile::tempdir().unwrap();
    let config = split_config(dir.path());
    let summary = run(&config).unwrap();

    // user: u1=1 u2=2, item: i1=3 i2=4 i3=5, price: 6
    assert_eq!(
        read_lines(&config.train_output_path),
        vec!["1 0:1:1 1:3:1 2:6:10", "0 0:2:1 1:4:1 2:6:20", "1 0:1:1 1:5:1 2:6:30"]
    );
    // The u9 row is dropped as unseen.
    assert_eq!(read_lines(&config.eval_output_path), vec!["0 0:2:1 1:3:1 2:6:15"]);
    assert_eq!(summary.filter.before, 2);
    assert_eq!(summary.filter.after, 1);
    assert_eq!(summary.num_features, 6);
}

#[test]
fn test_libsvm_with_sentinel_oov() {
    let dir = tempfile::tempdir().unwrap();
    let config = TransformConfig {
        format: FeatureFormat::LibSvm,
        oov: OovPolicy::Sentinel,
        ..split_config(dir.path())
    };
    run(&config).unwrap();
    assert_eq!(
        read_lines(&config.eval_output_path),
        vec!["0 2:1 3:1 6:15", "1 0:1 4:1 6:25"]
    );
}

#[test]
fn test_negative_sampling_counts() {
    let dir = tempfile::tempdir().unwrap();
    let mut rows = vec!["label,user,age,score".to_string()];
    for i in 0..200 {
        rows.push(format!("1,u{},{},{}", i % 13, 18 + i % 50, (i as f64) / 200.0));
    }
    let rows: Vec<&str> = rows.iter().map(String::as_str).collect();
    let data = write_csv(dir.path(), "data.csv", &rows);

    let config = TransformConfig {
        source: DataSource::Single {
            path: data,
            train_frac: 0.75,
        },
        train_output_path: dir.path().join("train.ffm"),
        eval_output_path: dir.path().join("eval.ffm"),
        cat_cols: cols(&[1]),
        num_cols: cols(&[2, 3]),
        negative_sampling: NegativeSamplingPolicy::Ratio(2),
        oov: OovPolicy::Sentinel,
        ..TransformConfig::default()
    };
    let summary = run(&config).unwrap();
    assert_eq!(summary.train_rows, 150);
    assert_eq!(summary.eval_rows, 50);

    for (path, rows) in [(&config.train_output_path, 150), (&config.eval_output_path, 50)] {
        let lines = read_lines(path);
        assert_eq!(lines.len(), rows * 3);
        assert_eq!(lines.iter().filter(|l| l.starts_with("1 ")).count(), rows);
        assert_eq!(lines.iter().filter(|l| l.starts_with("0 ")).count(), rows * 2);
        // Integer negatives stay integers within the training range.
        for line in lines.iter().filter(|l| l.starts_with("0 ")) {
            let age: i64 = line.split(' ').nth(2).unwrap().rsplit(':').next().unwrap().parse().unwrap();
            assert!((18..=67).contains(&age));
        }
    }

    // Same seed, same artifacts.
    let first = read_lines(&config.train_output_path);
    run(&config).unwrap();
    assert_eq!(first, read_lines(&config.train_output_path));
}

#[test]
fn test_shuffle_train_keeps_lines() {
    let dir = tempfile::tempdir().unwrap();
    let plain = split_config(dir.path());
    run(&plain).unwrap();
    let mut expected = read_lines(&plain.train_output_path);

    let shuffled = TransformConfig {
        shuffle_train: true,
        ..plain
    };
    run(&shuffled).unwrap();
    let mut actual = read_lines(&shuffled.train_output_path);
    expected.sort();
    actual.sort();
    assert_eq!(expected, actual);
}

#[test]
fn test_normalize_and_feature_map() {
    let dir = tempfile::tempdir().unwrap();
    let config = TransformConfig {
        normalize: Some(ScalerKind::MinMax),
        feature_map_path: Some(dir.path().join("features.json")),
        ..split_config(dir.path())
    };
    run(&config).unwrap();

    assert_eq!(
        read_lines(&config.train_output_path),
        vec!["1 0:1:1 1:3:1 2:6:0", "0 0:2:1 1:4:1 2:6:0.5", "1 0:1:1 1:5:1 2:6:1"]
    );
    assert_eq!(read_lines(&config.eval_output_path), vec!["0 0:2:1 1:3:1 2:6:0.25"]);

    let map: serde_json::Value =
        serde_json::from_str(&fs::read_to_string(dir.path().join("features.json")).unwrap()).unwrap();
    assert_eq!(map["num_features"], 6);
    assert_eq!(map["columns"]["item"]["values"]["i3"], 5);
    assert_eq!(map["columns"]["price"]["range"]["max"], 1.0);
}

#[test]
fn test_failed_run_leaves_no_artifacts() {
    let dir = tempfile::tempdir().unwrap();
    let train = write_csv(dir.path(), "train.csv", &["y,cat,x", "1,a,1.5", "0,b,2.5"]);
    // Missing numeric value in eval.
    let eval = write_csv(dir.path(), "eval.csv", &["y,cat,x", "1,a,", "0,b,3"]);
    let config = TransformConfig {
        source: DataSource::Split {
            train_path: train,
            eval_path: eval,
        },
        train_output_path: dir.path().join("out").join("train.ffm"),
        eval_output_path: dir.path().join("out").join("eval.ffm"),
        cat_cols: cols(&[1]),
        num_cols: cols(&[2]),
        ..TransformConfig::default()
    };
    fs::create_dir(dir.path().join("out")).unwrap();

    let err = run(&config).unwrap_err();
    assert!(matches!(err, TransformError::Data(_)));
    assert_eq!(fs::read_dir(dir.path().join("out")).unwrap().count(), 0);
}

#[test]
fn test_configuration_errors() {
    let dir = tempfile::tempdir().unwrap();
    let out_of_range = TransformConfig {
        cat_cols: cols(&[1, 9]),
        ..split_config(dir.path())
    };
    assert!(matches!(
        run(&out_of_range),
        Err(TransformError::Configuration(_))
    ));
    assert!(!out_of_range.train_output_path.exists());

    let text_label = TransformConfig {
        label_col: ColumnIdx(1),
        cat_cols: cols(&[2]),
        ..split_config(dir.path())
    };
    assert!(matches!(run(&text_label), Err(TransformError::Data(_))));
}

#[test]
fn test_split_files_share_category_types() {
    let dir = tempfile::tempdir().unwrap();
    // Train alone infers `cat` as integers, eval alone as floats.
    let train = write_csv(dir.path(), "train.csv", &["y,cat,x", "1,1,0.5", "0,2,1.5"]);
    let eval = write_csv(dir.path(), "eval.csv", &["y,cat,x", "1,1,0.7", "0,2.5,0.9"]);
    let config = TransformConfig {
        source: DataSource::Split {
            train_path: train,
            eval_path: eval,
        },
        train_output_path: dir.path().join("train.svm"),
        eval_output_path: dir.path().join("eval.svm"),
        format: FeatureFormat::LibSvm,
        cat_cols: cols(&[1]),
        num_cols: cols(&[2]),
        ..TransformConfig::default()
    };
    let summary = run(&config).unwrap();
    assert_eq!(summary.filter.before, 2);
    assert_eq!(summary.filter.after, 1);
    // cat: 1=1 2=2, x: 3
    assert_eq!(read_lines(&config.eval_output_path), vec!["1 1:1 3:0.7"]);

    let sentinel = TransformConfig {
        oov: OovPolicy::Sentinel,
        ..config
    };
    run(&sentinel).unwrap();
    assert_eq!(
        read_lines(&sentinel.eval_output_path),
        vec!["1 1:1 3:0.7", "0 0:1 3:0.9"]
    );
}

#[test]
fn test_unwritable_output_leaves_no_artifacts() {
    let dir = tempfile::tempdir().unwrap();
    let config = TransformConfig {
        eval_output_path: dir.path().join("missing_dir").join("eval.ffm"),
        feature_map_path: Some(dir.path().join("features.json")),
        ..split_config(dir.path())
    };
    assert!(matches!(run(&config), Err(TransformError::Io(_))));
    assert!(!config.train_output_path.exists());
    assert!(!dir.path().join("features.json").exists());

    let mut left: Vec<String> = fs::read_dir(dir.path())
        .unwrap()
        .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
        .collect();
    left.sort();
    assert_eq!(left, vec!["eval.csv", "train.csv"]);

    let bad_map = TransformConfig {
        feature_map_path: Some(dir.path().join("missing_dir").join("features.json")),
        ..split_config(dir.path())
    };
    assert!(run(&bad_map).is_err());
    assert!(!bad_map.train_output_path.exists());
    assert!(!bad_map.eval_output_path.exists());
}

#[test]
fn test_extreme_float_range_with_negatives() {
    let dir = tempfile::tempdir().unwrap();
    let train = write_csv(dir.path(), "train.csv", &["y,cat,x", "1,a,-1.5e308", "1,b,1.5e308"]);
    let eval = write_csv(dir.path(), "eval.csv", &["y,cat,x", "1,a,0"]);
    let config = TransformConfig {
        source: DataSource::Split {
            train_path: train,
            eval_path: eval,
        },
        train_output_path: dir.path().join("train.svm"),
        eval_output_path: dir.path().join("eval.svm"),
        format: FeatureFormat::LibSvm,
        cat_cols: cols(&[1]),
        num_cols: cols(&[2]),
        negative_sampling: NegativeSamplingPolicy::Ratio(4),
        ..TransformConfig::default()
    };
    let summary = run(&config).unwrap();
    assert_eq!(summary.train.lines(), 10);
    for line in read_lines(&config.train_output_path) {
        let x: f64 = line.rsplit(':').next().unwrap().parse().unwrap();
        assert!(x.is_finite());
    }

    let infinite = write_csv(dir.path(), "inf.csv", &["y,cat,x", "1,a,inf", "1,b,2"]);
    let rejected = TransformConfig {
        source: DataSource::Split {
            train_path: infinite,
            eval_path: dir.path().join("eval.csv"),
        },
        ..config
    };
    assert!(matches!(run(&rejected), Err(TransformError::Data(_))));
}
