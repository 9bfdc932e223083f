use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Note colour as stored in `_type`. Bombs use `3` and carry no colour.
pub const RED_NOTE: u8 = 0;
pub const BLUE_NOTE: u8 = 1;

/// A v2 difficulty file. Fields this crate does not touch are kept in
/// `extra` and written back unchanged.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Beatmap {
    #[serde(rename = "_notes", default)]
    pub notes: Vec<Note>,
    #[serde(rename = "_obstacles", default)]
    pub obstacles: Vec<Obstacle>,
    #[serde(rename = "_events", default)]
    pub events: Vec<LightEvent>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Beatmap {
    /// Parses a difficulty file, refusing anything that is not v2. A v3
    /// file or an unrelated JSON object would otherwise parse with empty
    /// sections and be rewritten with v2 arrays injected.
    pub fn parse(raw: &[u8]) -> Result<Self, String> {
        let value: Value = serde_json::from_slice(raw).map_err(|err| err.to_string())?;
        let Some(object) = value.as_object() else {
            return Err("difficulty file is not a JSON object".to_string());
        };
        if let Some(version) = object.get("version").and_then(Value::as_str) {
            if !version.starts_with('2') {
                return Err(format!("beatmap format {version} is not supported, only v2"));
            }
        }
        if !object.contains_key("_notes") {
            return Err("not a v2 difficulty file: `_notes` is missing".to_string());
        }
        serde_json::from_value(value).map_err(|err| err.to_string())
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Note {
    #[serde(rename = "_time")]
    pub time: f64,
    #[serde(rename = "_type")]
    pub kind: u8,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Note {
    pub fn is_coloured(&self) -> bool {
        self.kind == RED_NOTE || self.kind == BLUE_NOTE
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Obstacle {
    #[serde(rename = "_time")]
    pub time: f64,
    #[serde(rename = "_duration", default)]
    pub duration: f64,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct LightEvent {
    #[serde(rename = "_time")]
    pub time: f64,
    #[serde(rename = "_type")]
    pub kind: u8,
    #[serde(rename = "_value")]
    pub value: u8,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl LightEvent {
    pub fn new(time: f64, kind: u8, value: u8) -> Self {
        Self {
            time,
            kind,
            value,
            extra: Map::new(),
        }
    }
}
