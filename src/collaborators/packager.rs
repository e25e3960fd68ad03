use super::{run_blocking, PhaseContext, PhaseOperation};
use crate::error::CollaboratorError;
use crate::models::MonthKey;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};

/// Companion metadata written next to the delivery archive
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PackageManifest {
    pub month: MonthKey,
    pub created_at: DateTime<Utc>,
    pub tool_version: String,
    pub archive: String,
    pub files: Vec<ManifestEntry>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ManifestEntry {
    pub name: String,
    pub bytes: u64,
    pub sha256: String,
}

/// Built-in Package collaborator: `<prefix>_<YYYY-MM>.tar.gz` plus a JSON manifest
#[derive(Debug, Clone)]
pub struct ArchivePackager {
    prefix: String,
}

impl ArchivePackager {
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
        }
    }

    pub fn archive_name(&self, month: MonthKey) -> String {
        format!("{}_{}.tar.gz", self.prefix, month)
    }

    pub fn manifest_name(&self, month: MonthKey) -> String {
        format!("{}_{}.manifest.json", self.prefix, month)
    }

    /// Build the archive and manifest, returning both paths
    pub fn package(
        &self,
        month: MonthKey,
        inputs: &[PathBuf],
        output_dir: &Path,
    ) -> Result<Vec<PathBuf>, CollaboratorError> {
        if inputs.is_empty() {
            return Err(CollaboratorError::MissingOutput(
                "nothing to package: no canonical files".to_string(),
            ));
        }
        std::fs::create_dir_all(output_dir)?;

        let archive_name = self.archive_name(month);
        let archive_path = output_dir.join(&archive_name);
        let mut entries = Vec::with_capacity(inputs.len());

        {
            let file = std::fs::File::create(&archive_path)?;
            let gz = flate2::write::GzEncoder::new(file, flate2::Compression::default());
            let mut tar = tar::Builder::new(gz);

            for input in inputs {
                let name = input
                    .file_name()
                    .and_then(|n| n.to_str())
                    .ok_or_else(|| {
                        CollaboratorError::MissingOutput(format!("unusable file name: {}", input.display()))
                    })?
                    .to_string();

                let content = std::fs::read(input)?;
                tar.append_path_with_name(input, &name)?;
                entries.push(ManifestEntry {
                    name,
                    bytes: content.len() as u64,
                    sha256: format!("{:x}", Sha256::digest(&content)),
                });
            }

            tar.into_inner()?.finish()?.sync_all()?;
        }

        let manifest = PackageManifest {
            month,
            created_at: Utc::now(),
            tool_version: env!("CARGO_PKG_VERSION").to_string(),
            archive: archive_name,
            files: entries,
        };
        let manifest_path = output_dir.join(self.manifest_name(month));
        std::fs::write(&manifest_path, serde_json::to_vec_pretty(&manifest)?)?;

        tracing::info!(archive = %archive_path.display(), files = manifest.files.len(), "package written");
        Ok(vec![archive_path, manifest_path])
    }
}

#[async_trait]
impl PhaseOperation for ArchivePackager {
    fn describe(&self) -> String {
        format!("built-in packager ({}_<month>.tar.gz)", self.prefix)
    }

    async fn execute(&self, ctx: &PhaseContext) -> Result<Vec<PathBuf>, CollaboratorError> {
        let packager = self.clone();
        let month = ctx.month;
        let inputs = ctx.inputs.clone();
        let output_dir = ctx.output_dir.clone();
        run_blocking(move || packager.package(month, &inputs, &output_dir)).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use flate2::read::GzDecoder;
    use tempfile::TempDir;

    #[test]
    fn test_package_writes_archive_and_manifest() {
        let temp = TempDir::new().unwrap();
        let data = temp.path().join("JTMD_DATA_x.csv");
        let meta = temp.path().join("JTMD_META_x.csv");
        std::fs::write(&data, "1,2,3\n").unwrap();
        std::fs::write(&meta, "code,name\n").unwrap();

        let month = MonthKey::parse("2025-06").unwrap();
        let out = temp.path().join("package");
        let paths = ArchivePackager::new("JTMD")
            .package(month, &[data.clone(), meta], &out)
            .unwrap();

        assert_eq!(
            paths,
            vec![
                out.join("JTMD_2025-06.tar.gz"),
                out.join("JTMD_2025-06.manifest.json"),
            ]
        );

        let archive = std::fs::File::open(&paths[0]).unwrap();
        let mut tar = tar::Archive::new(GzDecoder::new(archive));
        let names: Vec<String> = tar
            .entries()
            .unwrap()
            .map(|e| e.unwrap().path().unwrap().to_string_lossy().to_string())
            .collect();
        assert_eq!(names, vec!["JTMD_DATA_x.csv", "JTMD_META_x.csv"]);

        let manifest: PackageManifest =
            serde_json::from_str(&std::fs::read_to_string(&paths[1]).unwrap()).unwrap();
        assert_eq!(manifest.files.len(), 2);
        assert_eq!(manifest.files[0].bytes, 6);
        assert_eq!(
            manifest.files[0].sha256,
            format!("{:x}", Sha256::digest(std::fs::read(&data).unwrap()))
        );
    }

    #[test]
    fn test_empty_inputs_rejected() {
        let temp = TempDir::new().unwrap();
        let month = MonthKey::parse("2025-06").unwrap();
        let err = ArchivePackager::new("JTMD").package(month, &[], temp.path()).unwrap_err();
        assert!(matches!(err, CollaboratorError::MissingOutput(_)));
    }
}
