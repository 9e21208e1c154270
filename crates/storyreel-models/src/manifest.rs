//! Narration manifest (`video_list.json`).
//!
//! The manifest is a JSON object keyed by narration audio file name:
//!
//! ```json
//! {
//!   "audio_1.mp3": { "source_video": "forest.mp4", "clip": "intro", "line": "Once upon a time" },
//!   "audio_2.mp3": { "source_video": "river.mp4", "line": "The river ran" }
//! }
//! ```
//!
//! Key order in the document is the order of the final cut, so the
//! manifest is decoded with a map visitor instead of a sorted map.

use std::fmt;
use std::path::{Path, PathBuf};

use serde::de::{MapAccess, Visitor};
use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::ModelResult;
use crate::item::WorkItem;

/// One manifest value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ManifestEntry {
    pub source_video: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub clip: Option<String>,
    #[serde(default)]
    pub line: String,
}

/// Ordered audio-name → entry mapping.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Manifest {
    entries: Vec<(String, ManifestEntry)>,
}

impl Manifest {
    pub fn from_json(json: &str) -> ModelResult<Self> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn push(&mut self, audio_name: impl Into<String>, entry: ManifestEntry) {
        self.entries.push((audio_name.into(), entry));
    }

    pub fn entries(&self) -> &[(String, ManifestEntry)] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Build work items, resolving relative names against the given
    /// directories. Existence is not checked here.
    pub fn work_items(&self, audio_dir: &Path, videos_dir: &Path) -> Vec<WorkItem> {
        self.entries
            .iter()
            .enumerate()
            .map(|(index, (audio_name, entry))| {
                let clip_name = entry.clip.clone().unwrap_or_else(|| {
                    Path::new(audio_name)
                        .file_stem()
                        .map(|s| s.to_string_lossy().into_owned())
                        .unwrap_or_else(|| audio_name.clone())
                });
                WorkItem {
                    index,
                    audio_path: Some(audio_dir.join(audio_name)),
                    source_video_path: resolve(videos_dir, &entry.source_video),
                    caption_text: entry.line.clone(),
                    output_clip_name: Some(clip_name),
                }
            })
            .collect()
    }
}

fn resolve(dir: &Path, name: &str) -> PathBuf {
    let path = Path::new(name);
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        dir.join(path)
    }
}

impl<'de> Deserialize<'de> for Manifest {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        struct ManifestVisitor;

        impl<'de> Visitor<'de> for ManifestVisitor {
            type Value = Manifest;

            fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
                f.write_str("an object mapping audio file names to manifest entries")
            }

            fn visit_map<A>(self, mut map: A) -> Result<Self::Value, A::Error>
            where
                A: MapAccess<'de>,
            {
                let mut entries = Vec::with_capacity(map.size_hint().unwrap_or(0));
                while let Some((key, value)) = map.next_entry::<String, ManifestEntry>()? {
                    entries.push((key, value));
                }
                Ok(Manifest { entries })
            }
        }

        deserializer.deserialize_map(ManifestVisitor)
    }
}

impl Serialize for Manifest {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let mut map = serializer.serialize_map(Some(self.entries.len()))?;
        for (key, entry) in &self.entries {
            map.serialize_entry(key, entry)?;
        }
        map.end()
    }
}
