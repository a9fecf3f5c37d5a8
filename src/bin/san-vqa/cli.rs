use san_vqa::model::SanConfig;
use san_vqa::training::TrainingConfig;
use std::path::PathBuf;
use std::str::FromStr;

pub const HELP: &str = "\
san-vqa

Trains a stacked attention network on visual question answering data and/or predicts the
answers of the validation questions.
Models, optimizer state, configurations and run outputs are persisted in an artifacts directory.

USAGE:
    san-vqa [OPTIONS]

When no --training or --inference flag is provided, the program exits after handling configuration logic.

BEHAVIOR OVERVIEW
- The program manages two configurations: training config and model config.
- If --training-config or --model-config is given, the corresponding config is loaded from the specified file and saved to the artifacts directory (overwriting any existing file).
- If no explicit config file is provided for a component, the program attempts to load it from the artifacts directory; if absent, the preset of --variant is used and saved.
- The data directory holds train.json, val.json, image_paths.json and answer_vocab.json.
- Model and optimizer weights are loaded from the artifacts directory if present; otherwise new ones are created.
- Training saves the initial weights as cp-0000 and the weights after each epoch as cp-<epoch>, along with history.json and config.json.
- Inference writes predictions.json, one {answer, question_id} entry per validation question.
- If both --training and --inference are specified, training executes first, followed by inference using the trained model.

Log verbosity is controlled by RUST_LOG (default: san_vqa=info).

FLAGS:
    -h, --help                  Show this help message and exit

OPTIONS:
    -t, --training              Run training (creates or updates model / optimizer)
    -i, --inference             Run inference after training (if both flags are used) or immediately (if only inference is requested)
    -r, --remove-artifacts      Delete existing model and optimizer files from the artifacts directory before training
                                (has no effect if --training is not used)
    -c, --training-config <PATH>
                                Load training configuration from this file (overrides any config in artifacts directory)
    -m, --model-config <PATH>   Load model configuration from this file (overrides any config in artifacts directory)
    -a, --artifacts-path <PATH>
                                Directory where configurations, model weights, and optimizer state are saved and loaded.
                                If the directory does not exist, it will be created.
                                Defaults to a newly created temporary directory (path will be printed).
    -d, --data-dir <PATH>       Directory of the tokenized splits, image path table and answer vocabulary.
                                Required by --training and --inference.
    --variant <cnn|lstm>        Preset used for configs missing from the artifacts directory [default: lstm]
    --embedding <PATH>          Pretrained question embedding matrix (.npy, [vocab_size, embedding_dim])
    --dataset <NAME>            Dataset name recorded in config.json [default: english]
";

/// Preset model and training configurations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Variant {
    /// Convolutional question encoder, two attention hops.
    Cnn2,
    /// Recurrent question encoder, three attention hops.
    Lstm3,
}

impl Variant {
    pub fn model_config(&self) -> SanConfig {
        match self {
            Self::Cnn2 => SanConfig::cnn_2(),
            Self::Lstm3 => SanConfig::lstm_3(),
        }
    }

    pub fn training_config(&self) -> TrainingConfig {
        match self {
            Self::Cnn2 => TrainingConfig::cnn_2(),
            Self::Lstm3 => TrainingConfig::lstm_3(),
        }
    }
}

impl FromStr for Variant {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "cnn" | "cnn-2" => Ok(Self::Cnn2),
            "lstm" | "lstm-3" => Ok(Self::Lstm3),
            other => Err(format!("unknown variant {other:?}, expected cnn or lstm")),
        }
    }
}

#[derive(Debug)]
pub struct AppArgs {
    pub training: bool,
    pub inference: bool,
    pub remove_artifacts: bool,
    pub training_config: Option<PathBuf>,
    pub model_config: Option<PathBuf>,
    pub artifacts_path: PathBuf,
    pub data_dir: Option<PathBuf>,
    pub variant: Variant,
    pub embedding: Option<PathBuf>,
    pub dataset: String,
}

impl AppArgs {
    pub fn parse() -> anyhow::Result<Self> {
        let mut pargs = pico_args::Arguments::from_env();

        // Help has a higher priority and should be handled separately.
        if pargs.contains(["-h", "--help"]) {
            println!("{}", HELP);
            std::process::exit(0);
        }

        let artifacts_path = pargs.opt_value_from_os_str(["-a", "--artifacts-path"], parse_path)?;
        let artifacts_path = match artifacts_path {
            Some(path) => path,
            None => {
                // e.g. /tmp/san-vqa-abcd-0
                let name = format!("{}-", std::env!("CARGO_PKG_NAME"));
                let tmp = temp_dir::TempDir::with_prefix(name)?.dont_delete_on_drop();
                let path = tmp.path().to_path_buf();
                println!("new artifacts directory: {path:?}");
                path
            }
        };

        let args = AppArgs {
            training_config: pargs
                .opt_value_from_os_str(["-c", "--training-config"], parse_path)?,
            model_config: pargs.opt_value_from_os_str(["-m", "--model-config"], parse_path)?,
            artifacts_path,
            data_dir: pargs.opt_value_from_os_str(["-d", "--data-dir"], parse_path)?,
            variant: pargs
                .opt_value_from_str("--variant")?
                .unwrap_or(Variant::Lstm3),
            embedding: pargs.opt_value_from_os_str("--embedding", parse_path)?,
            dataset: pargs
                .opt_value_from_str("--dataset")?
                .unwrap_or_else(|| "english".to_string()),
            // must parse flags after values
            training: pargs.contains(["-t", "--training"]),
            inference: pargs.contains(["-i", "--inference"]),
            remove_artifacts: pargs.contains(["-r", "--remove-artifacts"]),
        };

        // It's up to the caller what to do with the remaining arguments.
        let remaining = pargs.finish();
        if !remaining.is_empty() {
            anyhow::bail!("unused arguments: {remaining:?}");
        }

        Ok(args)
    }
}

fn parse_path(s: &std::ffi::OsStr) -> Result<PathBuf, &'static str> {
    Ok(s.into())
}
