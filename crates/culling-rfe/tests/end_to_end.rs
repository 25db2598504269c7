//! End-to-end tests: dataset -> elimination -> checkpoints -> tidy -> prune -> final fit.

use std::collections::BTreeSet;
use std::fs;
use std::path::Path;

use culling_forest::{MaxFeatures, OobMode, RandomForest, RandomForestConfig, RegressionMetrics};
use culling_io::{Column, Dataset, ExperimentName, Predictor};
use culling_rfe::{
    CheckpointStore, CorrelationMatrix, DesignLayout, EvalType, FeatureImportance, FitOutcome,
    ForestGrid, ForestTrainer, Metric, ModelTrainer, NullBaseline, PrunePass, ResampleConfig,
    RfeConfig, RfeEngine, RfeError, SubsetSchedule, TrainerError, WorkerPool, encode, fit_final,
    pearson, prune, select_top, tidy,
};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use tempfile::TempDir;

const SCHEDULE: [usize; 7] = [17, 14, 11, 8, 5, 2, 1];

/// 20 numeric predictors and one three-level categorical. The response
/// depends on x0, x1, x2 and the zone; x3 is a near copy of x0.
fn synthetic(n_rows: usize, seed: u64) -> Dataset {
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    let mut columns: Vec<Vec<f64>> = (0..20)
        .map(|_| (0..n_rows).map(|_| rng.r#gen::<f64>() * 10.0).collect())
        .collect();
    columns[3] = columns[0]
        .iter()
        .map(|v| v + rng.r#gen::<f64>() * 0.2)
        .collect();
    let zone: Vec<usize> = (0..n_rows).map(|_| rng.gen_range(0..3)).collect();

    let response: Vec<f64> = (0..n_rows)
        .map(|i| {
            3.0 * columns[0][i] + 2.0 * columns[1][i] - 2.0 * columns[2][i]
                + 4.0 * zone[i] as f64
                + rng.r#gen::<f64>()
        })
        .collect();

    let mut predictors: Vec<Predictor> = columns
        .into_iter()
        .enumerate()
        .map(|(i, values)| Predictor {
            name: format!("x{i}"),
            column: Column::Numeric(values),
        })
        .collect();
    predictors.push(Predictor {
        name: "zone".into(),
        column: Column::Categorical {
            levels: vec!["east".into(), "north".into(), "west".into()],
            codes: zone,
        },
    });
    Dataset::new("y".into(), response, predictors).unwrap()
}

fn noise_dataset(n_rows: usize, seed: u64) -> Dataset {
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    let predictors = (0..5)
        .map(|i| Predictor {
            name: format!("n{i}"),
            column: Column::Numeric((0..n_rows).map(|_| rng.r#gen::<f64>()).collect()),
        })
        .collect();
    let response = (0..n_rows).map(|_| rng.r#gen::<f64>() * 4.0).collect();
    Dataset::new("y".into(), response, predictors).unwrap()
}

fn forest_trainer() -> ForestTrainer {
    ForestTrainer::new(RandomForestConfig::new(15).unwrap())
        .with_grid(ForestGrid::new(vec![MaxFeatures::Third], vec![5]).unwrap())
}

fn config(schedule: &[usize], times: usize) -> RfeConfig {
    RfeConfig::new(
        SubsetSchedule::new(schedule.to_vec()).unwrap(),
        ResampleConfig::new(0.8, times).unwrap().with_seed(7),
    )
    .with_cv_folds(3)
    .with_seed(100)
}

fn store(dir: &Path) -> CheckpointStore {
    CheckpointStore::new(&dir.join("checkpoints"), ExperimentName::new("e2e".into()).unwrap())
        .unwrap()
}

/// Predicts the training mean; importance is |r| with the response. Like a
/// real model it refuses tables whose predictors differ from the fit table.
struct MeanTrainer {
    fail_on_seed: Option<u64>,
}

impl ModelTrainer for MeanTrainer {
    type Params = ();
    type Model = (f64, Vec<String>);

    fn grid(&self, _table: &Dataset) -> Vec<()> {
        vec![()]
    }

    fn fit(
        &self,
        table: &Dataset,
        _grid: &[()],
        cv_folds: usize,
        seed: u64,
    ) -> Result<FitOutcome<(f64, Vec<String>), ()>, TrainerError> {
        if self.fail_on_seed == Some(seed) {
            return Err(TrainerError::Failed {
                message: "did not converge".into(),
            });
        }
        let y = table.response();
        let mean = y.iter().sum::<f64>() / y.len() as f64;
        let design = encode(table);
        let importances = design
            .layout
            .column_names()
            .into_iter()
            .enumerate()
            .map(|(c, feature)| {
                let column: Vec<f64> = design.rows.iter().map(|r| r[c]).collect();
                FeatureImportance {
                    feature,
                    importance: pearson(&column, y).abs(),
                }
            })
            .collect();
        Ok(FitOutcome {
            model: (mean, table.predictor_names()),
            params: (),
            fold_predictions: vec![mean; y.len()],
            fold_index: (0..y.len()).map(|i| i % cv_folds).collect(),
            train_performance: RegressionMetrics::compute(y, &vec![mean; y.len()])?,
            importances,
            oob: None,
        })
    }

    fn predict(
        &self,
        (mean, names): &(f64, Vec<String>),
        table: &Dataset,
    ) -> Result<Vec<f64>, TrainerError> {
        if &table.predictor_names() != names {
            return Err(TrainerError::Failed {
                message: format!("fit on {names:?}, asked to predict {:?}", table.predictor_names()),
            });
        }
        Ok(vec![*mean; table.n_rows()])
    }
}

// ---------------------------------------------------------------------------
// Full scenario
// ---------------------------------------------------------------------------

#[test]
fn end_to_end_scenario() {
    let dataset = synthetic(200, 1);
    let dir = TempDir::new().unwrap();
    let pool = WorkerPool::new(2).unwrap();
    let engine =
        RfeEngine::new(forest_trainer(), config(&SCHEDULE, 5), &pool, store(dir.path())).unwrap();

    let run = engine.run(&dataset).unwrap();
    assert_eq!(run.computed, vec![1, 2, 3, 4, 5]);
    assert!(run.resumed.is_empty());

    let checkpoints = engine.store().load_completed(5).unwrap();
    assert_eq!(checkpoints.len(), 5);
    let bin_files = fs::read_dir(engine.store().dir())
        .unwrap()
        .filter(|e| e.as_ref().unwrap().path().extension().is_some_and(|x| x == "bin"))
        .count();
    assert_eq!(bin_files, 5);

    let all_predictors: BTreeSet<String> = dataset.predictor_names().into_iter().collect();
    for cp in &checkpoints {
        // Rank conservation: every predictor ranked exactly once.
        let ranked: BTreeSet<String> = cp.ranks.iter().map(|r| r.feature.clone()).collect();
        assert_eq!(ranked, all_predictors);
        assert_eq!(cp.ranks.len(), 21);

        // Schedule monotonicity.
        assert_eq!(cp.predictor_counts, vec![21, 14, 11, 8, 5, 2, 1]);
        assert_eq!(cp.subset_sizes, SCHEDULE.to_vec());
        assert_eq!(cp.ranks.iter().filter(|r| r.rank == 7).count(), 7);
        assert_eq!(cp.ranks.iter().filter(|r| r.rank == 1).count(), 1);
        assert_eq!(cp.train.len(), 7);
        assert_eq!(cp.test.len(), 7);
        assert_eq!(cp.null.len(), 7);
    }

    let (performance, ranks) = tidy(&checkpoints).unwrap();
    assert_eq!(ranks.rows.len(), 21);
    assert!(ranks.rows.iter().all(|r| !r.feature.contains('=')));
    assert!(ranks.rows.iter().all(|r| r.summary.count == 5));
    assert_eq!(performance.subset_sizes(), vec![0, 1, 2, 5, 8, 11, 14, 17]);
    assert_eq!(performance.rows.len(), 7 * 2 * 3 + 3);
    assert!(
        performance
            .rows
            .iter()
            .filter(|r| r.eval_type == EvalType::Null)
            .all(|r| r.subset_size == 0)
    );

    // Summary fields sit flat on each JSON row.
    let json = serde_json::to_value(&performance).unwrap();
    let first = &json["rows"][0];
    assert_eq!(first["subset_size"], 1);
    assert!(first["mean"].is_number() && first["count"] == 5);

    // The strongest signal survives longest.
    let top3: BTreeSet<String> = ranks.top(3).into_iter().collect();
    assert!(top3.contains("x0") || top3.contains("x3"), "top3 = {top3:?}");

    // Pruning: x0 and x3 are near copies, exactly one of them goes.
    let matrix = CorrelationMatrix::from_dataset(&dataset);
    let report = prune(&matrix, &ranks, PrunePass::First).unwrap();
    let gone: Vec<&str> = report.dropped.iter().map(String::as_str).collect();
    assert!(gone == ["x0"] || gone == ["x3"], "dropped = {gone:?}");
    for _ in 0..3 {
        assert_eq!(prune(&matrix, &ranks, PrunePass::First).unwrap(), report);
    }
    let pruned = report.apply(&dataset).unwrap();
    assert_eq!(pruned.n_predictors(), 20);
    assert!(pruned.predictor("zone").is_some());

    // Next run's input: the best subset size by holdout RMSE, then pruning.
    let best = performance.best_subset_size(Metric::Rmse).unwrap();
    let reduced = select_top(&dataset, &ranks, best).unwrap();
    assert_eq!(reduced.n_predictors(), best);
    assert_eq!(reduced.response(), dataset.response());
    let expected: BTreeSet<String> = ranks.top(best).into_iter().collect();
    let kept: BTreeSet<String> = reduced.predictor_names().into_iter().collect();
    assert_eq!(kept, expected);
    let next = prune(&CorrelationMatrix::from_dataset(&reduced), &ranks, PrunePass::First)
        .unwrap()
        .apply(&reduced)
        .unwrap();
    assert!(next.n_predictors() <= best);
}

// ---------------------------------------------------------------------------
// Resumption
// ---------------------------------------------------------------------------

#[test]
fn resumption_is_idempotent() {
    let dataset = synthetic(120, 2);
    let schedule = [10, 6, 3, 1];
    let pool = WorkerPool::new(3).unwrap();

    let full_dir = TempDir::new().unwrap();
    let full = RfeEngine::new(forest_trainer(), config(&schedule, 4), &pool, store(full_dir.path())).unwrap();
    full.run(&dataset).unwrap();
    let expected = tidy(&full.store().load_completed(4).unwrap()).unwrap();

    // Simulate a crash after resample 2: later checkpoints never landed.
    let crash_dir = TempDir::new().unwrap();
    let crashed = RfeEngine::new(forest_trainer(), config(&schedule, 4), &pool, store(crash_dir.path())).unwrap();
    crashed.run(&dataset).unwrap();
    for index in [3, 4] {
        fs::remove_file(crashed.store().path_for(index)).unwrap();
    }

    let resumed = crashed.run(&dataset).unwrap();
    assert_eq!(resumed.resumed, vec![1, 2]);
    assert_eq!(resumed.computed, vec![3, 4]);
    assert_eq!(tidy(&crashed.store().load_completed(4).unwrap()).unwrap(), expected);

    // A third run has nothing to do.
    let idle = crashed.run(&dataset).unwrap();
    assert_eq!(idle.resumed, vec![1, 2, 3, 4]);
    assert!(idle.computed.is_empty());
}

#[test]
fn failed_resample_is_reported_and_retried() {
    let dataset = synthetic(100, 3);
    let schedule = [8, 4, 1];
    let cfg = config(&schedule, 4);
    let pool = WorkerPool::new(2).unwrap();
    let dir = TempDir::new().unwrap();

    // Resample i uses seed 100 + i.
    let flaky = MeanTrainer {
        fail_on_seed: Some(103),
    };
    let engine = RfeEngine::new(flaky, cfg.clone(), &pool, store(dir.path())).unwrap();
    match engine.run(&dataset) {
        Err(RfeError::ResamplesFailed { failures }) => {
            assert_eq!(failures.len(), 1);
            assert_eq!(failures[0].index, 3);
            assert!(failures[0].reason.contains("did not converge"));
        }
        other => panic!("expected ResamplesFailed, got {other:?}"),
    }
    assert!(!engine.store().exists(3));
    assert_eq!(engine.store().resume_plan(4).completed, vec![1, 2, 4]);

    let healthy = MeanTrainer { fail_on_seed: None };
    let retry = RfeEngine::new(healthy, cfg, &pool, store(dir.path())).unwrap();
    let run = retry.run(&dataset).unwrap();
    assert_eq!(run.computed, vec![3]);
    assert_eq!(run.resumed, vec![1, 2, 4]);
}

#[test]
fn oversized_schedule_fails_before_any_work() {
    let dataset = synthetic(60, 4);
    let pool = WorkerPool::new(1).unwrap();
    let dir = TempDir::new().unwrap();
    let engine = RfeEngine::new(
        MeanTrainer { fail_on_seed: None },
        config(&[25, 10, 1], 2),
        &pool,
        store(dir.path()),
    )
    .unwrap();
    assert!(matches!(
        engine.run(&dataset),
        Err(RfeError::InsufficientFeatures {
            requested: 25,
            available: 21
        })
    ));
    assert!(engine.store().resume_plan(2).completed.is_empty());
}

// ---------------------------------------------------------------------------
// Null baseline
// ---------------------------------------------------------------------------

#[test]
fn null_baseline_matches_training_mean_on_noise() {
    let dataset = noise_dataset(150, 5);
    let cfg = config(&[5, 3, 1], 5);
    let pool = WorkerPool::new(2).unwrap();
    let dir = TempDir::new().unwrap();
    let engine = RfeEngine::new(forest_trainer(), cfg.clone(), &pool, store(dir.path())).unwrap();
    engine.run(&dataset).unwrap();
    let checkpoints = engine.store().load_completed(5).unwrap();

    // Null RMSE is exactly the RMSE of predicting the training mean.
    let partitions = cfg.resampling().create_partitions(dataset.response()).unwrap();
    for (cp, part) in checkpoints.iter().zip(&partitions) {
        let y = dataset.response();
        let mean = part.train.iter().map(|&r| y[r]).sum::<f64>() / part.train.len() as f64;
        let observed: Vec<f64> = part.holdout.iter().map(|&r| y[r]).collect();
        let expected = RegressionMetrics::compute(&observed, &vec![mean; observed.len()]).unwrap();
        assert!(cp.null.iter().all(|m| (m.rmse - expected.rmse).abs() < 1e-12));
    }

    // With no signal, Test and Null are indistinguishable.
    let (performance, _) = tidy(&checkpoints).unwrap();
    let null = performance.get(0, EvalType::Null, Metric::Rmse).unwrap().summary.mean;
    for size in [1, 3, 5] {
        let test = performance.get(size, EvalType::Test, Metric::Rmse).unwrap().summary.mean;
        let ratio = test / null;
        assert!((0.8..1.35).contains(&ratio), "size {size}: test {test} vs null {null}");
    }
}

#[test]
fn internal_fold_baseline_scores_training_rows() {
    let dataset = noise_dataset(90, 6);
    let cfg = config(&[4, 2], 2).with_null_baseline(NullBaseline::InternalFolds);
    let pool = WorkerPool::new(1).unwrap();
    let dir = TempDir::new().unwrap();
    let engine =
        RfeEngine::new(MeanTrainer { fail_on_seed: None }, cfg, &pool, store(dir.path())).unwrap();
    engine.run(&dataset).unwrap();
    for cp in engine.store().load_completed(2).unwrap() {
        // Folds are fixed per resample, so the baseline does not move across steps.
        assert_eq!(cp.null[0], cp.null[1]);
        assert!(cp.null[0].rmse > 0.0);
    }
}

// ---------------------------------------------------------------------------
// Final model
// ---------------------------------------------------------------------------

#[test]
fn final_fit_on_selected_features() {
    let dataset = synthetic(200, 7)
        .select_predictors(&["x0", "x1", "x2", "zone", "x9"])
        .unwrap();
    let split = ResampleConfig::new(0.8, 1).unwrap().with_seed(3);
    let trainer = ForestTrainer::new(
        RandomForestConfig::new(40)
            .unwrap()
            .with_oob_mode(OobMode::Enabled),
    );

    let fitted = fit_final(&trainer, &dataset, &split, 5, 11).unwrap();
    let report = &fitted.report;
    assert_eq!(report.features, vec!["x0", "x1", "x2", "x9", "zone"]);
    assert_eq!(report.n_train + report.holdout.len(), 200);
    assert!(report.test.r_squared > 0.6, "r2 = {}", report.test.r_squared);
    assert!(report.test.rmse < report.null.rmse);
    assert_eq!(report.importances.len(), 5);
    assert!(report.importances.iter().all(|f| !f.feature.contains('=')));
    assert!(trainer.grid(&dataset).contains(&report.params));
    let oob = report.oob.unwrap();
    assert!(oob.r_squared > 0.5, "oob r2 = {}", oob.r_squared);

    // The model uses the forest's versioned format and predicts the same after reload.
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("final_model.bin");
    fitted.model.save(&path).unwrap();
    let reloaded = RandomForest::load(&path).unwrap();
    let rows = encode(&dataset).rows;
    assert_eq!(reloaded.predict_batch(&rows).unwrap(), fitted.model.predict_batch(&rows).unwrap());
    assert_eq!(
        reloaded.feature_names(),
        DesignLayout::for_dataset(&dataset).column_names().as_slice()
    );
}
