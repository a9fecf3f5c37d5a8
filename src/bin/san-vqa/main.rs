use anyhow::Context;
use burn::prelude::*;
use burn::tensor::backend::AutodiffBackend;
use san_vqa::data::{
    ANSWER_VOCAB_NAME, AnswerVocab, IMAGE_PATHS_NAME, TRAIN_SPLIT_NAME, VALID_SPLIT_NAME,
    VqaSplit, load_embedding_matrix, load_image_paths,
};
use san_vqa::model::{QuestionEncoderConfig, SanConfig};
use san_vqa::training::{
    Artifacts, MODEL_CONFIG_NAME, MODEL_NAME, PREDICTIONS_NAME, RUN_CONFIG_NAME,
    TRAINING_CONFIG_NAME, RunConfig, TrainingConfig, load_config, predict, save_predictions,
    train,
};
use std::path::Path;
use tracing_subscriber::EnvFilter;

pub mod backend;
pub mod cli;

use backend::{TrainingBackend, main_device};
use cli::AppArgs;

/// Trains on `AutoB` and predicts on its inner backend, both on `device`.
pub fn launch<AutoB: AutodiffBackend>(
    app_args: &AppArgs,
    device: &AutoB::Device,
) -> anyhow::Result<()> {
    let artifacts = Artifacts::new(&app_args.artifacts_path)?;

    // setup training and model configs
    let training_config: TrainingConfig = match &app_args.training_config {
        Some(path) => load_config(path)?,
        None => artifacts
            .load_config(TRAINING_CONFIG_NAME)?
            .unwrap_or_else(|| app_args.variant.training_config()),
    };
    let model_config: SanConfig = match &app_args.model_config {
        Some(path) => load_config(path)?,
        None => artifacts
            .load_config(MODEL_CONFIG_NAME)?
            .unwrap_or_else(|| app_args.variant.model_config()),
    };
    model_config
        .validate()
        .context("invalid model configuration")?;
    // save configs
    artifacts.save_config(&training_config, TRAINING_CONFIG_NAME)?;
    artifacts.save_config(&model_config, MODEL_CONFIG_NAME)?;

    if !app_args.inference && !app_args.training {
        println!("neither training nor inference were enabled");
        println!("{}", cli::HELP);
        return Ok(());
    }

    let data_dir = app_args
        .data_dir
        .as_deref()
        .context("--data-dir is required for training and inference")?;
    let image_paths = load_image_paths(&data_dir.join(IMAGE_PATHS_NAME))?;
    let valid_split = VqaSplit::load(&data_dir.join(VALID_SPLIT_NAME))?;
    let valid_config =
        model_config.generator_config(training_config.batch_size, false, training_config.seed);
    let (valid_data, question_ids) =
        valid_split.into_generator(image_paths.clone(), &valid_config)?;

    if app_args.training {
        if app_args.remove_artifacts {
            artifacts.remove_weights::<AutoB>()?;
        }

        let train_split = VqaSplit::load(&data_dir.join(TRAIN_SPLIT_NAME))?;
        let train_config = model_config.generator_config(
            training_config.batch_size,
            training_config.shuffle,
            training_config.seed,
        );
        let (mut train_data, _) = train_split.into_generator(image_paths, &train_config)?;

        let model = match &app_args.embedding {
            Some(path) => {
                let matrix = load_embedding_matrix(path)?;
                let (rows, cols) = matrix.dim();
                let values: Vec<f32> = matrix.iter().copied().collect();
                let data = TensorData::new(values, [rows, cols]);
                let matrix = Tensor::<AutoB, 2>::from_data(data, device);
                model_config.init_with_question_embedding(matrix, device)?
            }
            None => model_config.init::<AutoB>(device),
        };
        let model = artifacts
            .load_model::<AutoB, _>(model.clone(), MODEL_NAME, device)?
            .unwrap_or(model);

        let run_config = RunConfig::new(
            run_name(&model_config),
            embedding_name(app_args.embedding.as_deref()),
            app_args.dataset.as_str(),
            &model_config,
            &training_config,
        );
        run_config.save(&artifacts.path(RUN_CONFIG_NAME))?;

        let trained = train::<AutoB>(
            &artifacts,
            &training_config,
            model,
            &mut train_data,
            &valid_data,
            device,
        )?;
        if let Some(epoch) = trained.stopped_at {
            tracing::info!("stopped early after epoch {epoch}");
        }
    }

    if app_args.inference {
        let model = model_config.init::<AutoB::InnerBackend>(device);
        let model = artifacts
            .load_model::<AutoB::InnerBackend, _>(model, MODEL_NAME, device)?
            .with_context(|| format!("no trained model in {:?}", artifacts.dir()))?;
        let vocab = AnswerVocab::load(&data_dir.join(ANSWER_VOCAB_NAME))?;

        let predictions = predict::<AutoB::InnerBackend>(
            &model,
            &valid_data,
            &question_ids,
            &vocab,
            training_config.num_workers,
            device,
        )?;
        save_predictions(&artifacts.path(PREDICTIONS_NAME), &predictions)?;
    }

    Ok(())
}

/// e.g. `SAN_LSTM_3`
fn run_name(model_config: &SanConfig) -> String {
    let encoder = match model_config.question {
        QuestionEncoderConfig::Cnn(_) => "CNN",
        QuestionEncoderConfig::Lstm(_) => "LSTM",
    };
    format!("SAN_{encoder}_{}", model_config.hops)
}

fn embedding_name(path: Option<&Path>) -> String {
    path.and_then(Path::file_stem)
        .map(|stem| stem.to_string_lossy().into_owned())
        .unwrap_or_else(|| "random".to_string())
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("san_vqa=info".parse()?))
        .init();

    let app_args = AppArgs::parse()?;
    launch::<TrainingBackend>(&app_args, &main_device())
}
