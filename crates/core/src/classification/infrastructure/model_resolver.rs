use std::fmt;
use std::path::{Path, PathBuf};

use thiserror::Error;

use crate::shared::config::MaskConfig;
use crate::shared::constants::DEFAULT_MODEL_CANDIDATES;

#[derive(Error, Debug, PartialEq)]
pub enum ModelResolveError {
    #[error("no classifier artifact found (searched: {})", display_paths(.searched))]
    ArtifactNotFound { searched: Vec<PathBuf> },
}

/// Why a particular artifact was chosen.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ResolvedFrom {
    EnvOverride,
    Configured,
    Candidate(String),
}

impl fmt::Display for ResolvedFrom {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ResolvedFrom::EnvOverride => f.write_str("environment override"),
            ResolvedFrom::Configured => f.write_str("configured path"),
            ResolvedFrom::Candidate(name) => write!(f, "conventional name {name}"),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ResolvedModel {
    pub path: PathBuf,
    pub from: ResolvedFrom,
}

/// Locate the classifier artifact.
///
/// Resolution order:
/// 1. Explicit override (`MASK_MODEL_PATH`)
/// 2. Configured path
/// 3. `candidates`, then the built-in conventional names, inside `models_dir`
///
/// Every step is logged. Returns every path probed when nothing exists.
pub fn resolve(
    override_path: Option<&Path>,
    configured: &Path,
    models_dir: &Path,
    candidates: &[&str],
) -> Result<ResolvedModel, ModelResolveError> {
    let mut searched = Vec::new();

    if let Some(path) = override_path {
        if path.is_file() {
            log::info!("Using model override from environment: {}", path.display());
            return Ok(ResolvedModel {
                path: path.to_path_buf(),
                from: ResolvedFrom::EnvOverride,
            });
        }
        log::warn!("Model override not found: {}", path.display());
        searched.push(path.to_path_buf());
    }

    if configured.is_file() {
        log::info!("Using configured model path: {}", configured.display());
        return Ok(ResolvedModel {
            path: configured.to_path_buf(),
            from: ResolvedFrom::Configured,
        });
    }
    log::warn!("Configured model path not found: {}", configured.display());
    searched.push(configured.to_path_buf());

    for name in candidates.iter().chain(DEFAULT_MODEL_CANDIDATES) {
        let candidate = models_dir.join(name);
        if searched.contains(&candidate) {
            continue;
        }
        if candidate.is_file() {
            log::info!("Found model candidate: {}", candidate.display());
            return Ok(ResolvedModel {
                path: candidate,
                from: ResolvedFrom::Candidate(name.to_string()),
            });
        }
        log::debug!("Model candidate missing: {}", candidate.display());
        searched.push(candidate);
    }

    log::error!("No mask model found in {}", models_dir.display());
    Err(ModelResolveError::ArtifactNotFound { searched })
}

/// [`resolve`] with paths taken from `config`.
pub fn resolve_from_config(
    config: &MaskConfig,
    candidates: &[&str],
) -> Result<ResolvedModel, ModelResolveError> {
    resolve(
        config.model_override.as_deref(),
        &config.default_model_path(),
        &config.resolved_models_dir(),
        candidates,
    )
}

fn display_paths(paths: &[PathBuf]) -> String {
    paths
        .iter()
        .map(|p| p.display().to_string())
        .collect::<Vec<_>>()
        .join(", ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn touch(path: &Path) {
        fs::write(path, b"model").unwrap();
    }

    #[test]
    fn test_override_wins() {
        let tmp = TempDir::new().unwrap();
        let override_path = tmp.path().join("custom.onnx");
        let configured = tmp.path().join("mask_mobilenet.onnx");
        touch(&override_path);
        touch(&configured);

        let resolved = resolve(Some(&override_path), &configured, tmp.path(), &[]).unwrap();
        assert_eq!(resolved.path, override_path);
        assert_eq!(resolved.from, ResolvedFrom::EnvOverride);
    }

    #[test]
    fn test_missing_override_falls_through_to_configured() {
        let tmp = TempDir::new().unwrap();
        let configured = tmp.path().join("configured.onnx");
        touch(&configured);

        let resolved = resolve(
            Some(&tmp.path().join("gone.onnx")),
            &configured,
            tmp.path(),
            &[],
        )
        .unwrap();
        assert_eq!(resolved.from, ResolvedFrom::Configured);
    }

    #[test]
    fn test_caller_candidates_precede_builtins() {
        let tmp = TempDir::new().unwrap();
        touch(&tmp.path().join("mask_detector.onnx"));
        touch(&tmp.path().join("my_model.onnx"));

        let resolved = resolve(
            None,
            &tmp.path().join("absent.onnx"),
            tmp.path(),
            &["my_model.onnx"],
        )
        .unwrap();
        assert_eq!(resolved.from, ResolvedFrom::Candidate("my_model.onnx".into()));
    }

    #[test]
    fn test_builtin_candidate_order() {
        let tmp = TempDir::new().unwrap();
        touch(&tmp.path().join("mask_model.onnx"));
        touch(&tmp.path().join("mask_detector.onnx"));

        let resolved = resolve(None, &tmp.path().join("absent.onnx"), tmp.path(), &[]).unwrap();
        assert_eq!(resolved.path, tmp.path().join("mask_detector.onnx"));
    }

    #[test]
    fn test_weight_store_candidate() {
        let tmp = TempDir::new().unwrap();
        touch(&tmp.path().join("mask_mobilenet.safetensors"));

        let resolved = resolve(None, &tmp.path().join("absent.onnx"), tmp.path(), &[]).unwrap();
        assert_eq!(resolved.path, tmp.path().join("mask_mobilenet.safetensors"));
    }

    #[test]
    fn test_directory_is_not_an_artifact() {
        let tmp = TempDir::new().unwrap();
        fs::create_dir(tmp.path().join("mask_model.onnx")).unwrap();

        let result = resolve(None, &tmp.path().join("absent.onnx"), tmp.path(), &[]);
        assert!(result.is_err());
    }

    #[test]
    fn test_not_found_lists_everything_searched() {
        let tmp = TempDir::new().unwrap();
        let override_path = tmp.path().join("override.onnx");
        let configured = tmp.path().join("mask_mobilenet.onnx");

        let err = resolve(Some(&override_path), &configured, tmp.path(), &["extra.onnx"])
            .unwrap_err();
        let ModelResolveError::ArtifactNotFound { searched } = err;
        assert_eq!(searched[0], override_path);
        assert_eq!(searched[1], configured);
        assert_eq!(searched[2], tmp.path().join("extra.onnx"));
        // configured path equals a built-in candidate and is probed once
        let dupes = searched.iter().filter(|p| **p == configured).count();
        assert_eq!(dupes, 1);
        assert_eq!(searched.len(), 2 + 1 + DEFAULT_MODEL_CANDIDATES.len() - 1);
    }

    #[test]
    fn test_resolve_from_config_uses_models_dir() {
        let tmp = TempDir::new().unwrap();
        touch(&tmp.path().join("mask_mobilenet.onnx"));
        let config = MaskConfig {
            models_dir: Some(tmp.path().to_path_buf()),
            ..MaskConfig::default()
        };

        let resolved = resolve_from_config(&config, &[]).unwrap();
        assert_eq!(resolved.from, ResolvedFrom::Configured);
    }

    #[test]
    fn test_error_message_names_paths() {
        let err = ModelResolveError::ArtifactNotFound {
            searched: vec![PathBuf::from("/a.onnx"), PathBuf::from("/b.onnx")],
        };
        assert_eq!(
            err.to_string(),
            "no classifier artifact found (searched: /a.onnx, /b.onnx)"
        );
    }
}
