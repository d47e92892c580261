//! Artifact materialization
//!
//! Worker results may embed binary or text payloads (plots, tables, documents).
//! The materializer writes each recognized payload to the session's artifact
//! directory, records an artifact row and adds a file reference to the result.

use base64::engine::general_purpose::{STANDARD, STANDARD_NO_PAD};
use base64::Engine;
use serde_json::{json, Map, Value};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tokio::fs::{self, OpenOptions};
use tokio::io::AsyncWriteExt;
use tracing::{debug, warn};

use quanta_config::ArtifactsConfig;
use quanta_storage::{ArtifactKind, BackgroundRecorder};

/// Key holding artifact references in a materialized result
pub const ARTIFACTS_KEY: &str = "artifacts";

#[derive(Error, Debug)]
pub enum ArtifactError {
    #[error("Field '{field}' is not valid base64: {source}")]
    Decode {
        field: String,
        #[source]
        source: base64::DecodeError,
    },

    #[error("Failed to write artifact {}: {source}", .path.display())]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Encoding {
    Base64,
    Text,
}

/// How a recognized payload field is stored
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct PayloadFormat {
    kind: ArtifactKind,
    extension: &'static str,
    mime: &'static str,
    encoding: Encoding,
}

const PNG: PayloadFormat = PayloadFormat {
    kind: ArtifactKind::Image,
    extension: "png",
    mime: "image/png",
    encoding: Encoding::Base64,
};

const SVG: PayloadFormat = PayloadFormat {
    kind: ArtifactKind::VectorGraphic,
    extension: "svg",
    mime: "image/svg+xml",
    encoding: Encoding::Text,
};

const CSV: PayloadFormat = PayloadFormat {
    kind: ArtifactKind::Csv,
    extension: "csv",
    mime: "text/csv",
    encoding: Encoding::Text,
};

const PDF: PayloadFormat = PayloadFormat {
    kind: ArtifactKind::Document,
    extension: "pdf",
    mime: "application/pdf",
    encoding: Encoding::Base64,
};

fn recognize(field: &str) -> Option<PayloadFormat> {
    match field {
        "image_png_b64" | "png_b64" => Some(PNG),
        "svg" => Some(SVG),
        "csv_data" => Some(CSV),
        "pdf_b64" => Some(PDF),
        f if f.ends_with("_png_b64") => Some(PNG),
        _ => None,
    }
}

/// Where a payload field was found
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Location {
    TopLevel,
    Nested,
}

struct Candidate {
    location: Location,
    field: String,
    format: PayloadFormat,
    payload: String,
}

/// One payload written to disk
#[derive(Debug, Clone, PartialEq)]
pub struct MaterializedArtifact {
    pub kind: ArtifactKind,
    pub path: PathBuf,
    pub field: String,
    pub size: usize,
}

impl MaterializedArtifact {
    fn reference(&self) -> Value {
        json!({
            "kind": self.kind.as_str(),
            "path": self.path.to_string_lossy(),
            "field": self.field,
        })
    }
}

/// Extracts embedded payloads from worker results into per-session files
#[derive(Clone)]
pub struct ArtifactMaterializer {
    enabled: bool,
    root: PathBuf,
    strip_payloads: bool,
    recorder: BackgroundRecorder,
}

impl ArtifactMaterializer {
    pub fn new(config: &ArtifactsConfig, recorder: BackgroundRecorder) -> Self {
        Self {
            enabled: config.enabled,
            root: config.root.clone(),
            strip_payloads: config.strip_payloads,
            recorder,
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Directory holding a session's artifacts
    pub fn session_dir(&self, session_id: &str) -> PathBuf {
        self.root.join(sanitize_component(session_id))
    }

    /// Write every recognized payload in `result` and return the augmented result.
    ///
    /// Must be called at most once per completed call. A field that fails to
    /// decode or write is logged and left untouched; the rest still materialize.
    pub async fn materialize(
        &self,
        session_id: &str,
        tool_name: &str,
        result: Value,
    ) -> (Value, Vec<MaterializedArtifact>) {
        let mut object = match result {
            Value::Object(object) if self.enabled => object,
            other => return (other, Vec::new()),
        };

        let candidates = collect_candidates(&object);
        if candidates.is_empty() {
            return (Value::Object(object), Vec::new());
        }

        let dir = self.session_dir(session_id);
        let mut written = Vec::new();
        for candidate in candidates {
            match self.write_payload(&dir, tool_name, &candidate).await {
                Ok((size, path)) => {
                    self.recorder.record_artifact(
                        session_id,
                        candidate.format.kind,
                        &path.to_string_lossy(),
                        json!({
                            "field": candidate.field,
                            "size": size,
                            "mime": candidate.format.mime,
                        }),
                    );

                    debug!(
                        "Materialized {} from field '{}' of {} to {}",
                        candidate.format.kind,
                        candidate.field,
                        tool_name,
                        path.display()
                    );

                    if self.strip_payloads {
                        strip_field(&mut object, candidate.location, &candidate.field);
                    }

                    written.push(MaterializedArtifact {
                        kind: candidate.format.kind,
                        path,
                        field: candidate.field,
                        size,
                    });
                }
                Err(e) => {
                    warn!("Skipping artifact for {} in session {}: {}", tool_name, session_id, e);
                }
            }
        }

        if !written.is_empty() {
            attach_references(&mut object, &written);
        }
        (Value::Object(object), written)
    }

    async fn write_payload(
        &self,
        dir: &Path,
        tool_name: &str,
        candidate: &Candidate,
    ) -> Result<(usize, PathBuf), ArtifactError> {
        let bytes = match candidate.format.encoding {
            Encoding::Base64 => decode_base64(&candidate.payload).map_err(|source| {
                ArtifactError::Decode {
                    field: candidate.field.clone(),
                    source,
                }
            })?,
            Encoding::Text => candidate.payload.clone().into_bytes(),
        };

        let filename = format!(
            "{}-{}.{}",
            sanitize_component(tool_name),
            uuid::Uuid::new_v4().simple(),
            candidate.format.extension
        );
        let path = dir.join(filename);

        fs::create_dir_all(dir)
            .await
            .map_err(|source| ArtifactError::Write {
                path: dir.to_path_buf(),
                source,
            })?;
        // never overwrite an earlier artifact
        let write = async {
            let mut file = OpenOptions::new()
                .write(true)
                .create_new(true)
                .open(&path)
                .await?;
            file.write_all(&bytes).await?;
            file.flush().await
        };
        write.await.map_err(|source| ArtifactError::Write {
            path: path.clone(),
            source,
        })?;

        Ok((bytes.len(), path))
    }
}

fn collect_candidates(object: &Map<String, Value>) -> Vec<Candidate> {
    let mut candidates = Vec::new();
    let mut scan = |map: &Map<String, Value>, location: Location| {
        for (field, value) in map {
            let (Some(format), Value::String(payload)) = (recognize(field), value) else {
                continue;
            };
            candidates.push(Candidate {
                location,
                field: field.clone(),
                format,
                payload: payload.clone(),
            });
        }
    };

    scan(object, Location::TopLevel);
    if let Some(Value::Object(nested)) = object.get(ARTIFACTS_KEY) {
        scan(nested, Location::Nested);
    }
    candidates
}

fn strip_field(object: &mut Map<String, Value>, location: Location, field: &str) {
    match location {
        Location::TopLevel => {
            object.remove(field);
        }
        Location::Nested => {
            if let Some(Value::Object(nested)) = object.get_mut(ARTIFACTS_KEY) {
                nested.remove(field);
            }
        }
    }
}

fn attach_references(object: &mut Map<String, Value>, written: &[MaterializedArtifact]) {
    let references = written.iter().map(MaterializedArtifact::reference);
    match object.get_mut(ARTIFACTS_KEY) {
        None => {
            object.insert(ARTIFACTS_KEY.to_string(), Value::Array(references.collect()));
        }
        Some(Value::Array(existing)) => existing.extend(references),
        Some(Value::Object(nested)) => match nested.get_mut("files") {
            Some(Value::Array(files)) => files.extend(references),
            Some(_) => {
                warn!("Result field 'artifacts.files' is not a list; leaving references out");
            }
            None => {
                nested.insert("files".to_string(), Value::Array(references.collect()));
            }
        },
        Some(_) => {
            warn!("Result field 'artifacts' is neither a list nor an object; leaving references out");
        }
    }
}

/// Decode standard base64, tolerating a `data:` URL prefix, embedded whitespace
/// and missing padding.
fn decode_base64(payload: &str) -> Result<Vec<u8>, base64::DecodeError> {
    let body = match payload.find(";base64,") {
        Some(idx) if payload.starts_with("data:") => &payload[idx + ";base64,".len()..],
        _ => payload,
    };
    let cleaned: String = body.chars().filter(|c| !c.is_ascii_whitespace()).collect();

    STANDARD
        .decode(&cleaned)
        .or_else(|_| STANDARD_NO_PAD.decode(cleaned.trim_end_matches('=')))
}

/// Reduce a session id or tool name to a single safe path component
pub fn sanitize_component(raw: &str) -> String {
    let sanitized: String = raw
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '_' || c == '-' {
                c
            } else {
                '_'
            }
        })
        .collect();
    if sanitized.is_empty() {
        "_".to_string()
    } else {
        sanitized
    }
}
