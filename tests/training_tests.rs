use std::path::Path;

use burn::backend::{Autodiff, NdArray};
use burn::module::AutodiffModule;
use burn::prelude::*;

use tasknet::data::{DataError, Split};
use tasknet::model::{meta_path, ModelMeta, TaskNet};
use tasknet::training::{self, TrainingConfig};

type TestBackend = Autodiff<NdArray>;

fn synthetic_config(outdir: &Path, train_len: usize, batch: usize, num_epoch: usize) -> TrainingConfig {
    TrainingConfig {
        data: format!("synthetic:{train_len}"),
        datadir: outdir.join("data"),
        download: false,
        num_epoch,
        batch,
        lr: 1e-3,
        seed: Some(17),
        outdir: outdir.join("weights"),
        log_interval: 1,
        ..Default::default()
    }
}

#[test]
fn one_optimizer_step_per_batch_per_epoch() {
    let dir = tempfile::tempdir().unwrap();
    // 30 samples in batches of 8: three full batches and one of 6
    let config = synthetic_config(dir.path(), 30, 8, 3);

    let report = training::run::<TestBackend>(&config, &Default::default()).unwrap();

    assert_eq!(report.steps, 12);
    assert_eq!(report.epochs.len(), 3);
    assert!(report.epochs.iter().all(|epoch| epoch.steps == 4));
    assert!(report
        .epochs
        .iter()
        .flat_map(|epoch| &epoch.losses)
        .all(|loss| loss.is_finite()));
}

#[test]
fn saves_weights_that_reload() {
    let dir = tempfile::tempdir().unwrap();
    let config = synthetic_config(dir.path(), 16, 8, 1);

    let model = training::train::<TestBackend>(&config, &Default::default()).unwrap();

    let artifact = dir.path().join("weights").join("LeNet_net_synthetic:16.pth");
    assert_eq!(config.output_path(), artifact);
    assert!(artifact.is_file());

    let meta: ModelMeta =
        serde_json::from_str(&std::fs::read_to_string(meta_path(&artifact)).unwrap()).unwrap();
    assert_eq!(meta.model, "LeNet");
    assert_eq!(meta.num_cls, 10);

    let device = Default::default();
    let loaded = TaskNet::<NdArray>::load(&artifact, &device).unwrap();
    assert_eq!(loaded.num_params(), model.num_params());

    let x = Tensor::<NdArray, 4>::ones([2, 1, 28, 28], &device);
    let expected = model.valid().forward(x.clone()).into_data();
    loaded.forward(x).into_data().assert_approx_eq(&expected, 4);
}

#[test]
fn zero_epochs_still_evaluates_and_saves() {
    let dir = tempfile::tempdir().unwrap();
    let config = synthetic_config(dir.path(), 16, 4, 0);

    let report = training::run::<TestBackend>(&config, &Default::default()).unwrap();

    assert_eq!(report.steps, 0);
    assert!(report.epochs.is_empty());
    assert!(report.artifact.is_file());

    let eval = report.eval.unwrap();
    assert_eq!(eval.total, 4);
    assert!((0.0..=100.0).contains(&eval.accuracy));
}

#[test]
fn dtn_trains_on_three_channel_input() {
    let dir = tempfile::tempdir().unwrap();
    let config = TrainingConfig {
        model: "DTNClassifier".into(),
        ..synthetic_config(dir.path(), 12, 6, 1)
    };

    let report = training::run::<TestBackend>(&config, &Default::default()).unwrap();

    assert_eq!(report.steps, 2);
    assert_eq!(report.model.num_channels(), 3);
    assert!(dir
        .path()
        .join("weights")
        .join("DTNClassifier_net_synthetic:12.pth")
        .is_file());
}

#[test]
fn folder_dataset_without_test_split_skips_evaluation() {
    let dir = tempfile::tempdir().unwrap();
    for (class, shade) in [("cat", 40u8), ("dog", 220u8)] {
        let class_dir = dir.path().join("data").join("pets").join(Split::Train.as_str()).join(class);
        std::fs::create_dir_all(&class_dir).unwrap();
        for i in 0..3 {
            image::GrayImage::from_pixel(28, 28, image::Luma([shade]))
                .save(class_dir.join(format!("{i}.png")))
                .unwrap();
        }
    }
    let config = TrainingConfig {
        data: "pets".into(),
        num_cls: 2,
        ..synthetic_config(dir.path(), 0, 4, 1)
    };

    let report = training::run::<TestBackend>(&config, &Default::default()).unwrap();

    assert_eq!(report.steps, 2);
    assert!(report.eval.is_none());
    assert!(report.artifact.is_file());
}

#[test]
fn rejects_unknown_model_before_touching_data() {
    let dir = tempfile::tempdir().unwrap();
    let config = TrainingConfig {
        model: "ResNet".into(),
        ..synthetic_config(dir.path(), 8, 4, 1)
    };

    let err = training::run::<TestBackend>(&config, &Default::default())
        .err()
        .unwrap();

    assert!(format!("{err:#}").contains("ResNet"));
    assert!(!config.output_path().exists());
}

#[test]
fn rejects_dataset_with_more_classes_than_the_model() {
    let dir = tempfile::tempdir().unwrap();
    let config = TrainingConfig {
        num_cls: 4,
        ..synthetic_config(dir.path(), 20, 4, 1)
    };

    assert!(training::run::<TestBackend>(&config, &Default::default()).is_err());
}

#[test]
fn missing_mnist_without_download_is_an_error() {
    let dir = tempfile::tempdir().unwrap();
    let config = TrainingConfig {
        data: "mnist".into(),
        ..synthetic_config(dir.path(), 0, 4, 1)
    };

    let err = training::run::<TestBackend>(&config, &Default::default())
        .err()
        .unwrap();

    assert!(format!("{err:#}").contains("mnist"));
}

fn write_folder_split(root: &Path, split: Split, classes: &[(&str, u8)], per_class: usize) {
    for &(class, shade) in classes {
        let class_dir = root.join(split.as_str()).join(class);
        std::fs::create_dir_all(&class_dir).unwrap();
        for i in 0..per_class {
            image::GrayImage::from_pixel(28, 28, image::Luma([shade]))
                .save(class_dir.join(format!("{i}.png")))
                .unwrap();
        }
    }
}

#[test]
fn folder_test_split_missing_a_class_evaluates() {
    let dir = tempfile::tempdir().unwrap();
    let root = dir.path().join("data").join("bugs");
    write_folder_split(&root, Split::Train, &[("ant", 20), ("bee", 120), ("cat", 240)], 2);
    write_folder_split(&root, Split::Test, &[("ant", 20), ("cat", 240)], 2);
    let config = TrainingConfig {
        data: "bugs".into(),
        num_cls: 3,
        ..synthetic_config(dir.path(), 0, 3, 2)
    };

    let report = training::run::<TestBackend>(&config, &Default::default()).unwrap();

    assert_eq!(report.steps, 4);
    let eval = report.eval.unwrap();
    assert_eq!(eval.total, 4);
    assert!(eval.correct <= 4);
}

#[test]
fn folder_test_class_unknown_to_train_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let root = dir.path().join("data").join("bugs");
    write_folder_split(&root, Split::Train, &[("ant", 20), ("bee", 120)], 2);
    write_folder_split(&root, Split::Test, &[("ant", 20), ("wasp", 200)], 1);
    let config = TrainingConfig {
        data: "bugs".into(),
        num_cls: 2,
        ..synthetic_config(dir.path(), 0, 2, 1)
    };

    let err = training::run::<TestBackend>(&config, &Default::default())
        .err()
        .unwrap();

    assert!(matches!(
        err.downcast_ref::<DataError>(),
        Some(DataError::UnknownClass { .. })
    ));
}

#[test]
fn logged_accuracy_stays_within_bounds() {
    let dir = tempfile::tempdir().unwrap();
    let config = TrainingConfig {
        log_interval: 2,
        ..synthetic_config(dir.path(), 30, 4, 2)
    };

    let report = training::run::<TestBackend>(&config, &Default::default()).unwrap();

    for epoch in &report.epochs {
        // eight batches per epoch, every second one logged
        assert_eq!(epoch.logged.len(), 4);
        for logged in &epoch.logged {
            assert!(logged.correct <= logged.size);
            assert!((0.0..=100.0).contains(&logged.accuracy));
            assert_eq!(
                logged.accuracy,
                logged.correct as f32 / logged.size as f32 * 100.0
            );
        }
    }
}
