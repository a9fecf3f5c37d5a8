//! Artifacts directory: model checkpoints, optimizer state, configs and run outputs.

use crate::error::TrainingError;
use burn::module::AutodiffModule;
use burn::optim::Optimizer;
use burn::prelude::*;
use burn::record::{CompactRecorder, FileRecorder, Recorder};
use burn::tensor::backend::AutodiffBackend;
use std::path::{Path, PathBuf};

pub const MODEL_NAME: &str = "model";
pub const OPTIM_NAME: &str = "optim";
pub const MODEL_CONFIG_NAME: &str = "model_config.json";
pub const TRAINING_CONFIG_NAME: &str = "training_config.json";
pub const RUN_CONFIG_NAME: &str = "config.json";
pub const HISTORY_NAME: &str = "history.json";
pub const PREDICTIONS_NAME: &str = "predictions.json";

/// Name of the weights checkpoint saved at the end of `epoch`; epoch `0` holds the initial
/// weights.
pub fn checkpoint_name(epoch: usize) -> String {
    format!("cp-{epoch:04}")
}

#[derive(Debug, Clone)]
pub struct Artifacts {
    dir: PathBuf,
}

impl Artifacts {
    /// Uses `dir`, creating it if needed.
    pub fn new(dir: impl Into<PathBuf>) -> Result<Self, TrainingError> {
        let dir = dir.into();
        std::fs::create_dir_all(&dir).map_err(|source| TrainingError::Io {
            path: dir.clone(),
            source,
        })?;
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn path(&self, name: &str) -> PathBuf {
        self.dir.join(name)
    }

    /// Path of a recorded file, with the extension added by the recorder.
    pub fn record_path<B: Backend>(&self, name: &str) -> PathBuf {
        let file_ext = <CompactRecorder as FileRecorder<B>>::file_extension();
        self.path(name).with_added_extension(file_ext)
    }

    pub fn save_model<B: Backend>(
        &self,
        model: &impl Module<B>,
        name: &str,
    ) -> Result<(), TrainingError> {
        let path = self.path(name);
        tracing::debug!("saving {name} to {:?}", self.record_path::<B>(name));
        model
            .clone()
            .save_file(path, &CompactRecorder::new())?; // ext added automatically
        Ok(())
    }

    /// Loads the weights recorded under `name` into `model`, or returns `None` if there are
    /// none.
    pub fn load_model<B: Backend, M: Module<B>>(
        &self,
        model: M,
        name: &str,
        device: &B::Device,
    ) -> Result<Option<M>, TrainingError> {
        if !self.record_path::<B>(name).exists() {
            return Ok(None);
        }
        tracing::info!("loading {name} from {:?}", self.dir);
        let model = model.load_file(self.path(name), &CompactRecorder::new(), device)?;
        Ok(Some(model))
    }

    pub fn save_checkpoint<B: Backend>(
        &self,
        model: &impl Module<B>,
        epoch: usize,
    ) -> Result<(), TrainingError> {
        self.save_model::<B>(model, &checkpoint_name(epoch))
    }

    pub fn save_optim<AutoB, AutoM, O>(&self, optim: &O) -> Result<(), TrainingError>
    where
        AutoB: AutodiffBackend,
        AutoM: AutodiffModule<AutoB>,
        O: Optimizer<AutoM, AutoB>,
    {
        let path = self.record_path::<AutoB>(OPTIM_NAME);
        tracing::debug!("saving {OPTIM_NAME} to {path:?}");
        CompactRecorder::new().record(optim.to_record(), self.path(OPTIM_NAME))?;
        Ok(())
    }

    /// Restores the optimizer state, or returns `optim` unchanged if there is none.
    pub fn load_optim<AutoB, AutoM, O>(
        &self,
        optim: O,
        device: &AutoB::Device,
    ) -> Result<O, TrainingError>
    where
        AutoB: AutodiffBackend,
        AutoM: AutodiffModule<AutoB>,
        O: Optimizer<AutoM, AutoB>,
    {
        if !self.record_path::<AutoB>(OPTIM_NAME).exists() {
            return Ok(optim);
        }
        tracing::info!("loading {OPTIM_NAME} from {:?}", self.dir);
        let record = CompactRecorder::new().load(self.path(OPTIM_NAME), device)?;
        Ok(optim.load_record(record))
    }

    pub fn save_config(&self, config: &impl Config, name: &str) -> Result<(), TrainingError> {
        let path = self.path(name);
        tracing::info!("saving config into {path:?}");
        config
            .save(&path)
            .map_err(|source| TrainingError::Io { path, source })
    }

    /// Loads the config saved under `name`, or returns `None` if there is none.
    pub fn load_config<C: Config>(&self, name: &str) -> Result<Option<C>, TrainingError> {
        let path = self.path(name);
        if !path.exists() {
            return Ok(None);
        }
        tracing::info!("loading config from {path:?}");
        load_config(&path).map(Some)
    }

    /// Deletes the model and optimizer records and the history, if any, so that training
    /// starts over from epoch `1`.
    pub fn remove_weights<B: Backend>(&self) -> Result<(), TrainingError> {
        let paths = [
            self.record_path::<B>(MODEL_NAME),
            self.record_path::<B>(OPTIM_NAME),
            self.path(HISTORY_NAME),
        ];
        for path in paths {
            if path.exists() {
                tracing::info!("removing {path:?}");
                std::fs::remove_file(&path)
                    .map_err(|source| TrainingError::Io { path, source })?;
            }
        }
        Ok(())
    }
}

/// Loads a json config file.
pub fn load_config<C: Config>(path: &Path) -> Result<C, TrainingError> {
    C::load(path).map_err(|error| TrainingError::Config {
        path: path.to_path_buf(),
        error,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{ImageEncoder, ImageEncoderConfig};
    use crate::utils::max_abs_diff;
    use burn::backend::NdArray;
    use temp_dir::TempDir;

    type TestBackend = NdArray<f32>;

    #[test]
    fn checkpoint_names_are_zero_padded() {
        assert_eq!(checkpoint_name(0), "cp-0000");
        assert_eq!(checkpoint_name(12), "cp-0012");
    }

    #[test]
    fn weights_round_trip() {
        let dir = TempDir::new().unwrap();
        let artifacts = Artifacts::new(dir.path().join("run")).unwrap();
        let device = Default::default();
        let config = ImageEncoderConfig::new(3).with_channels(2);
        let model: ImageEncoder<TestBackend> = config.init(&device);

        let fresh = config.init::<TestBackend>(&device);
        let missing = artifacts.load_model::<TestBackend, _>(fresh, &checkpoint_name(1), &device);
        assert!(missing.unwrap().is_none());

        artifacts.save_checkpoint::<TestBackend>(&model, 1).unwrap();
        assert!(artifacts.record_path::<TestBackend>("cp-0001").exists());

        let fresh = config.init::<TestBackend>(&device);
        let loaded = artifacts
            .load_model::<TestBackend, _>(fresh, &checkpoint_name(1), &device)
            .unwrap()
            .unwrap();
        // weights are recorded at half precision
        let diff = max_abs_diff(loaded.proj.weight.val(), model.proj.weight.val());
        assert!(diff < 1e-2);
    }

    #[test]
    fn configs_round_trip() {
        let dir = TempDir::new().unwrap();
        let artifacts = Artifacts::new(dir.path()).unwrap();
        assert!(
            artifacts
                .load_config::<ImageEncoderConfig>(MODEL_CONFIG_NAME)
                .unwrap()
                .is_none()
        );

        let config = ImageEncoderConfig::new(7).with_channels(3);
        artifacts.save_config(&config, MODEL_CONFIG_NAME).unwrap();
        let back: ImageEncoderConfig = artifacts.load_config(MODEL_CONFIG_NAME).unwrap().unwrap();
        assert_eq!(back.embed_dim, 7);
        assert_eq!(back.channels, 3);
    }

    #[test]
    fn unreadable_configs_are_config_errors() {
        let dir = TempDir::new().unwrap();
        let missing = load_config::<ImageEncoderConfig>(&dir.child("missing.json"));
        assert!(matches!(missing, Err(TrainingError::Config { .. })));

        let path = dir.child("broken.json");
        std::fs::write(&path, "{\"embed_dim\": ").unwrap();
        let broken = load_config::<ImageEncoderConfig>(&path);
        assert!(matches!(broken, Err(TrainingError::Config { .. })));
    }

    #[test]
    fn removing_weights_forgets_the_history() {
        let dir = TempDir::new().unwrap();
        let artifacts = Artifacts::new(dir.path()).unwrap();
        let device = Default::default();
        let model: ImageEncoder<TestBackend> = ImageEncoderConfig::new(3).init(&device);
        artifacts.save_model::<TestBackend>(&model, MODEL_NAME).unwrap();
        std::fs::write(artifacts.path(HISTORY_NAME), "{}").unwrap();

        artifacts.remove_weights::<TestBackend>().unwrap();
        assert!(!artifacts.record_path::<TestBackend>(MODEL_NAME).exists());
        assert!(!artifacts.path(HISTORY_NAME).exists());
        // nothing left to remove
        artifacts.remove_weights::<TestBackend>().unwrap();
    }
}
