//! Weight files for the actor and the critic ensemble.
//!
//! Weights are written with Burn's `BinFileRecorder` at full precision. The
//! recorder always uses the `.bin` extension, so `dir/actor` and
//! `dir/actor.bin` name the same file.
//!
//! Loading checks every parameter shape against a freshly initialized
//! template, so a file written for a different architecture fails with
//! [`Error::ShapeMismatch`] instead of producing a half-loaded network.

use burn::module::{Module, ModuleMapper, Param};
use burn::record::{BinBytesRecorder, BinFileRecorder, FullPrecisionSettings, Recorder};
use burn::tensor::backend::Backend;
use burn::tensor::Tensor;
use std::fs;
use std::path::{Path, PathBuf};

use crate::error::{Error, Result};

/// File stem of the actor weights.
pub const ACTOR_FILE: &str = "actor";
/// File stem of the critic ensemble weights.
pub const CRITIC_FILE: &str = "critic";
/// Extension added by the recorder.
pub const WEIGHTS_EXTENSION: &str = "bin";

// ============================================================================
// Shape Collection
// ============================================================================

/// Collects float parameter shapes in traversal order.
struct ShapeCollector {
    shapes: Vec<Vec<usize>>,
}

impl<B: Backend> ModuleMapper<B> for ShapeCollector {
    fn map_float<const D: usize>(&mut self, param: Param<Tensor<B, D>>) -> Param<Tensor<B, D>> {
        self.shapes.push(param.val().dims().to_vec());
        param
    }
}

/// Shapes of all float parameters of `module`, in traversal order.
pub fn param_shapes<B: Backend, M: Module<B>>(module: &M) -> Vec<Vec<usize>> {
    let mut collector = ShapeCollector { shapes: Vec::new() };
    let _ = module.clone().map(&mut collector);
    collector.shapes
}

// ============================================================================
// Save / Load
// ============================================================================

/// Write `module` to `path` (extension forced to `.bin`).
pub fn save_module<B: Backend, M: Module<B>>(module: &M, path: impl AsRef<Path>) -> Result<PathBuf> {
    let mut path = path.as_ref().to_path_buf();
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }

    let recorder = BinFileRecorder::<FullPrecisionSettings>::new();
    module
        .clone()
        .save_file(&path, &recorder)
        .map_err(|e| Error::Recorder(e.to_string()))?;

    path.set_extension(WEIGHTS_EXTENSION);
    tracing::debug!(path = %path.display(), "saved module weights");
    Ok(path)
}

/// Load weights from `path` into `template`.
///
/// The template fixes the architecture. A file whose parameter shapes differ
/// from it is rejected.
pub fn load_module<B: Backend, M: Module<B>>(
    template: M,
    path: impl AsRef<Path>,
    device: &B::Device,
) -> Result<M> {
    let path = path.as_ref();
    let expected = param_shapes(&template);
    let module_name = path
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("module")
        .to_string();

    let recorder = BinFileRecorder::<FullPrecisionSettings>::new();
    let loaded = template
        .load_file(path, &recorder, device)
        .map_err(|e| Error::Recorder(e.to_string()))?;

    let loaded = check_shapes(module_name, expected, loaded)?;
    tracing::info!(path = %path.display(), "loaded module weights");
    Ok(loaded)
}

/// Load `path` into `template` when the file exists.
///
/// `None` or a missing file keeps the template's random init and logs a
/// warning. A present file must match the template's shapes.
pub fn load_if_present<B: Backend, M: Module<B>>(
    template: M,
    path: Option<&Path>,
    device: &B::Device,
) -> Result<M> {
    let Some(path) = path else {
        return Ok(template);
    };
    let file = path.with_extension(WEIGHTS_EXTENSION);
    if !file.exists() {
        tracing::warn!(path = %file.display(), "weight file not found, using random init");
        return Ok(template);
    }
    load_module(template, &file, device)
}

fn check_shapes<B: Backend, M: Module<B>>(
    module: String,
    expected: Vec<Vec<usize>>,
    loaded: M,
) -> Result<M> {
    let found = param_shapes(&loaded);
    if found != expected {
        return Err(Error::ShapeMismatch {
            module,
            expected,
            found,
        });
    }
    Ok(loaded)
}

// ============================================================================
// In-memory records
// ============================================================================

/// Serialize `module` into the byte payload carried by the variables table.
pub fn module_to_bytes<B: Backend, M: Module<B>>(module: &M) -> Result<Vec<u8>> {
    BinBytesRecorder::<FullPrecisionSettings>::default()
        .record(module.clone().into_record(), ())
        .map_err(|e| Error::Recorder(e.to_string()))
}

/// Load a byte payload produced by [`module_to_bytes`] into `template`.
///
/// Same shape check as [`load_module`]: a payload recorded from another
/// architecture is an [`Error::ShapeMismatch`].
pub fn module_from_bytes<B: Backend, M: Module<B>>(
    template: M,
    bytes: Vec<u8>,
    device: &B::Device,
) -> Result<M> {
    let expected = param_shapes(&template);
    let record = BinBytesRecorder::<FullPrecisionSettings>::default()
        .load(bytes, device)
        .map_err(|e| Error::Recorder(e.to_string()))?;
    check_shapes("snapshot".to_string(), expected, template.load_record(record))
}

// ============================================================================
// Checkpointer
// ============================================================================

/// Saves and loads the actor and critic weight files of one run directory.
#[derive(Debug, Clone)]
pub struct Checkpointer {
    dir: PathBuf,
}

impl Checkpointer {
    /// Create a checkpointer, creating `dir` if needed.
    pub fn new(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir)?;
        Ok(Self { dir })
    }

    /// Run directory.
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// `dir/actor.bin`
    pub fn actor_path(&self) -> PathBuf {
        self.dir.join(ACTOR_FILE).with_extension(WEIGHTS_EXTENSION)
    }

    /// `dir/critic.bin`
    pub fn critic_path(&self) -> PathBuf {
        self.dir.join(CRITIC_FILE).with_extension(WEIGHTS_EXTENSION)
    }

    /// Write both weight files.
    pub fn save<B, A, C>(&self, actor: &A, critic: &C) -> Result<(PathBuf, PathBuf)>
    where
        B: Backend,
        A: Module<B>,
        C: Module<B>,
    {
        let actor_path = save_module(actor, self.actor_path())?;
        let critic_path = save_module(critic, self.critic_path())?;
        tracing::info!(dir = %self.dir.display(), "saved actor and critic weights");
        Ok((actor_path, critic_path))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::algorithms::sac::{ActorConfig, CriticConfig};
    use burn::backend::NdArray;
    use tempfile::tempdir;

    type B = NdArray<f32>;

    #[test]
    fn test_checkpointer_creates_dir() {
        let dir = tempdir().unwrap();
        let nested = dir.path().join("nested/run");
        let checkpointer = Checkpointer::new(&nested).unwrap();

        assert!(nested.exists());
        assert_eq!(checkpointer.actor_path(), nested.join("actor.bin"));
        assert_eq!(checkpointer.critic_path(), nested.join("critic.bin"));
    }

    #[test]
    fn test_save_and_load_actor() {
        let dir = tempdir().unwrap();
        let device = Default::default();
        let config = ActorConfig::new(3, 1).with_hidden([8, 4]);
        let actor = config.init::<B>(&device);
        let obs = [0.3, -0.2, 0.9];

        let checkpointer = Checkpointer::new(dir.path()).unwrap();
        let critic = CriticConfig::new(3, 1)
            .with_units([8, 4])
            .with_ensemble(2, 3)
            .init::<B>(&device);
        let (actor_path, critic_path) = checkpointer.save(&actor, &critic).unwrap();
        assert!(actor_path.exists());
        assert!(critic_path.exists());

        let loaded = load_module(config.init::<B>(&device), &actor_path, &device).unwrap();
        assert_eq!(
            loaded.act(&obs, true).unwrap(),
            actor.act(&obs, true).unwrap()
        );
    }

    #[test]
    fn test_shape_mismatch_is_rejected() {
        let dir = tempdir().unwrap();
        let device = Default::default();
        let small = ActorConfig::new(3, 1).with_hidden([8, 4]).init::<B>(&device);
        let path = save_module(&small, dir.path().join("actor")).unwrap();

        let template = ActorConfig::new(3, 1).with_hidden([16, 4]).init::<B>(&device);
        let result = load_module(template, &path, &device);
        assert!(matches!(result, Err(Error::ShapeMismatch { .. })));
    }

    #[test]
    fn test_missing_file_is_recorder_error() {
        let dir = tempdir().unwrap();
        let device = Default::default();
        let template = ActorConfig::new(3, 1).with_hidden([8, 4]).init::<B>(&device);

        let result = load_module(template, dir.path().join("absent.bin"), &device);
        assert!(matches!(result, Err(Error::Recorder(_))));
    }

    #[test]
    fn test_load_if_present_falls_back_to_template() {
        let dir = tempdir().unwrap();
        let device = Default::default();
        let config = ActorConfig::new(3, 1).with_hidden([8, 4]);
        let template = config.init::<B>(&device);
        let obs = [0.2, 0.1, -0.3];
        let expected = template.act(&obs, true).unwrap();

        let missing = dir.path().join("absent");
        let kept = load_if_present(template.clone(), Some(missing.as_path()), &device).unwrap();
        assert_eq!(kept.act(&obs, true).unwrap(), expected);

        let kept = load_if_present(template, None, &device).unwrap();
        assert_eq!(kept.act(&obs, true).unwrap(), expected);
    }

    #[test]
    fn test_load_if_present_loads_existing_file() {
        let dir = tempdir().unwrap();
        let device = Default::default();
        let config = ActorConfig::new(3, 1).with_hidden([8, 4]);
        let saved = config.init::<B>(&device);
        save_module(&saved, dir.path().join("actor")).unwrap();

        let path = dir.path().join("actor");
        let loaded = load_if_present(config.init::<B>(&device), Some(path.as_path()), &device).unwrap();
        let obs = [0.4, -0.6, 0.9];
        assert_eq!(loaded.act(&obs, true).unwrap(), saved.act(&obs, true).unwrap());
    }

    #[test]
    fn test_bytes_round_trip() {
        let device = Default::default();
        let config = ActorConfig::new(3, 1).with_hidden([8, 4]);
        let actor = config.init::<B>(&device);
        let obs = [0.1, 0.5, -0.7];

        let bytes = module_to_bytes(&actor).unwrap();
        assert!(!bytes.is_empty());

        let loaded = module_from_bytes(config.init::<B>(&device), bytes, &device).unwrap();
        assert_eq!(
            loaded.act(&obs, true).unwrap(),
            actor.act(&obs, true).unwrap()
        );
    }

    #[test]
    fn test_garbage_bytes_are_rejected() {
        let device = Default::default();
        let template = ActorConfig::new(3, 1).with_hidden([8, 4]).init::<B>(&device);
        let result = module_from_bytes(template, vec![1, 2, 3], &device);
        assert!(matches!(result, Err(Error::Recorder(_))));
    }

    #[test]
    fn test_bytes_from_other_architecture_are_rejected() {
        let device = Default::default();
        let small = ActorConfig::new(3, 1).with_hidden([8, 4]).init::<B>(&device);
        let bytes = module_to_bytes(&small).unwrap();

        let template = ActorConfig::new(3, 1).with_hidden([16, 4]).init::<B>(&device);
        let result = module_from_bytes(template, bytes, &device);
        assert!(matches!(result, Err(Error::ShapeMismatch { .. })));
    }

    #[test]
    fn test_param_shapes_order() {
        let device = Default::default();
        let actor = ActorConfig::new(3, 2).with_hidden([8, 4]).init::<B>(&device);
        let shapes = param_shapes(&actor);

        assert_eq!(shapes.first(), Some(&vec![3, 8]));
        assert!(shapes.contains(&vec![4, 2]));
    }
}
