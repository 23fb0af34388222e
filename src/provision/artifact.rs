//! # Config Artifacts
//!
//! Decodes the base64 payload of a `getConfig` response and persists it under
//! the server-chosen filename. Android configs are JSON, re-indented with four
//! spaces; iOS configs are property lists, written in binary form.

use std::fs;
use std::io::Cursor;
use std::path::{Path, PathBuf};

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use serde::Serialize;
use tracing::info;

use crate::error::{ProvisionError, Result};
use crate::gcp::firebase::types::{ConfigFile, Platform};

/// A fetched config file, decoded and ready to be written.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigArtifact {
    pub filename: String,
    pub contents: Vec<u8>,
    pub destination: PathBuf,
}

impl ConfigArtifact {
    /// Decodes and re-serializes `file` for `platform`.
    pub fn from_response(platform: Platform, file: &ConfigFile, dir: &Path) -> Result<Self> {
        let filename = Path::new(&file.config_filename)
            .file_name()
            .and_then(|n| n.to_str())
            .filter(|n| !n.is_empty())
            .ok_or_else(|| {
                ProvisionError::Artifact(format!(
                    "unusable config filename {:?}",
                    file.config_filename
                ))
            })?
            .to_string();

        let decoded = STANDARD
            .decode(file.config_file_contents.trim())
            .map_err(|e| ProvisionError::Artifact(format!("{filename}: invalid base64: {e}")))?;
        let contents = reserialize(platform, &decoded)
            .map_err(|e| ProvisionError::Artifact(format!("{filename}: {e}")))?;

        Ok(Self {
            destination: dir.to_path_buf(),
            filename,
            contents,
        })
    }

    pub fn path(&self) -> PathBuf {
        self.destination.join(&self.filename)
    }

    /// Writes the artifact, overwriting any existing file at the target path.
    pub fn write(&self) -> Result<PathBuf> {
        if !self.destination.as_os_str().is_empty() {
            fs::create_dir_all(&self.destination).map_err(|e| {
                ProvisionError::Artifact(format!(
                    "cannot create {}: {}",
                    self.destination.display(),
                    e
                ))
            })?;
        }
        let path = self.path();
        fs::write(&path, &self.contents).map_err(|e| {
            ProvisionError::Artifact(format!("cannot write {}: {}", path.display(), e))
        })?;
        info!(path = %path.display(), bytes = self.contents.len(), "config artifact saved");
        Ok(path)
    }
}

fn reserialize(platform: Platform, bytes: &[u8]) -> std::result::Result<Vec<u8>, String> {
    match platform {
        Platform::Android => {
            let value: serde_json::Value =
                serde_json::from_slice(bytes).map_err(|e| format!("invalid JSON: {e}"))?;
            let mut out = Vec::new();
            let formatter = serde_json::ser::PrettyFormatter::with_indent(b"    ");
            let mut ser = serde_json::Serializer::with_formatter(&mut out, formatter);
            value.serialize(&mut ser).map_err(|e| e.to_string())?;
            Ok(out)
        }
        Platform::Ios => {
            let value = plist::Value::from_reader(Cursor::new(bytes))
                .map_err(|e| format!("invalid property list: {e}"))?;
            let mut out = Vec::new();
            value.to_writer_binary(&mut out).map_err(|e| e.to_string())?;
            Ok(out)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    const PLIST_XML: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<!DOCTYPE plist PUBLIC "-//Apple//DTD PLIST 1.0//EN" "http://www.apple.com/DTDs/PropertyList-1.0.dtd">
<plist version="1.0">
<dict>
	<key>BUNDLE_ID</key>
	<string>com.demo.ios</string>
	<key>IS_ADS_ENABLED</key>
	<false/>
</dict>
</plist>"#;

    fn response(name: &str, raw: &[u8]) -> ConfigFile {
        ConfigFile {
            config_filename: name.to_string(),
            config_file_contents: STANDARD.encode(raw),
        }
    }

    #[test]
    fn android_config_is_reindented_without_loss() {
        let original = json!({
            "project_info": {"project_id": "demo-proj-1", "project_number": "42"},
            "client": [{"client_info": {"mobilesdk_app_id": "1:42:android:abc"}}],
            "configuration_version": "1"
        });
        let raw = serde_json::to_vec(&original).unwrap();
        let a = ConfigArtifact::from_response(
            Platform::Android,
            &response("google-services.json", &raw),
            Path::new(""),
        )
        .unwrap();

        let text = String::from_utf8(a.contents.clone()).unwrap();
        assert!(text.starts_with("{\n    \"project_info\""));
        let back: serde_json::Value = serde_json::from_slice(&a.contents).unwrap();
        assert_eq!(back, original);
        assert_eq!(a.path(), PathBuf::from("google-services.json"));
    }

    #[test]
    fn ios_config_is_written_as_binary_plist() {
        let a = ConfigArtifact::from_response(
            Platform::Ios,
            &response("GoogleService-Info.plist", PLIST_XML.as_bytes()),
            Path::new("out"),
        )
        .unwrap();
        assert!(a.contents.starts_with(b"bplist00"));

        let back = plist::Value::from_reader(Cursor::new(&a.contents)).unwrap();
        let dict = back.as_dictionary().unwrap();
        assert_eq!(
            dict.get("BUNDLE_ID").and_then(|v| v.as_string()),
            Some("com.demo.ios")
        );
        assert_eq!(dict.get("IS_ADS_ENABLED").and_then(|v| v.as_boolean()), Some(false));
    }

    #[test]
    fn bad_payloads_are_artifact_errors() {
        let bad_b64 = ConfigFile {
            config_filename: "google-services.json".into(),
            config_file_contents: "%%%".into(),
        };
        assert!(matches!(
            ConfigArtifact::from_response(Platform::Android, &bad_b64, Path::new("")),
            Err(ProvisionError::Artifact(_))
        ));
        assert!(matches!(
            ConfigArtifact::from_response(
                Platform::Android,
                &response("google-services.json", b"not json"),
                Path::new("")
            ),
            Err(ProvisionError::Artifact(_))
        ));
        assert!(matches!(
            ConfigArtifact::from_response(Platform::Ios, &response("..", b"x"), Path::new("")),
            Err(ProvisionError::Artifact(_))
        ));
    }

    #[test]
    fn server_filename_cannot_escape_destination() {
        let a = ConfigArtifact::from_response(
            Platform::Android,
            &response("../../etc/google-services.json", b"{}"),
            Path::new("out"),
        )
        .unwrap();
        assert_eq!(a.path(), PathBuf::from("out/google-services.json"));
    }

    #[test]
    fn write_creates_directory_and_overwrites() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let dest = dir.path().join("nested/android");
        let first = ConfigArtifact::from_response(
            Platform::Android,
            &response("google-services.json", br#"{"a": 1}"#),
            &dest,
        )?;
        let path = first.write()?;
        assert_eq!(path, dest.join("google-services.json"));

        let second = ConfigArtifact::from_response(
            Platform::Android,
            &response("google-services.json", br#"{"a": 2}"#),
            &dest,
        )?;
        second.write()?;
        let back: serde_json::Value = serde_json::from_slice(&fs::read(&path)?)?;
        assert_eq!(back, json!({"a": 2}));
        Ok(())
    }
}
