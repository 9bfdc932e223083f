/// Title and artist of one audio asset, plus what else the upload can use.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct TrackMetadata {
    pub title: String,
    pub artist: String,
    pub duration_secs: Option<f64>,
    pub cover_art: Option<CoverArt>,
}

impl TrackMetadata {
    /// Metadata for a file without readable tags.
    pub fn from_stem(stem: impl Into<String>) -> Self {
        Self {
            title: stem.into(),
            ..Default::default()
        }
    }

    pub fn smart_filename(&self) -> String {
        smart_filename(&self.title, &self.artist)
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CoverArt {
    pub media_type: String,
    pub data: Vec<u8>,
}

/// `"{Title} - {Artist}"` when both are known, else the title alone. The
/// result is safe to use as a directory name.
pub fn smart_filename(title: &str, artist: &str) -> String {
    let title = title.trim();
    let artist = artist.trim();
    let raw = if !title.is_empty() && !artist.is_empty() {
        format!("{title} - {artist}")
    } else {
        title.to_string()
    };
    sanitize_file_name(&raw)
}

pub fn sanitize_file_name(raw: &str) -> String {
    let replaced: String = raw
        .chars()
        .map(|c| match c {
            '<' | '>' | ':' | '"' | '/' | '\\' | '|' | '?' | '*' => '_',
            c if c.is_control() => '_',
            c => c,
        })
        .collect();
    let trimmed = replaced.trim().trim_end_matches(['.', ' ']);
    if trimmed.is_empty() {
        "untitled".to_string()
    } else {
        trimmed.to_string()
    }
}
