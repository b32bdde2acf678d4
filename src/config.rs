//! Configuration types for document preparation.
//!
//! PDF ingestion (page splitting and block export) is controlled through
//! [`IngestConfig`], built via its [`IngestConfigBuilder`]. The text stages
//! take their own small value types: [`FilterRules`] for markdown filtering,
//! [`EntityMarkers`] for entity-name extraction and [`ChunkConfig`] for chunk
//! preparation. All of them are `serde` types so they can be stored next to a
//! corpus and diffed between runs.

use crate::error::PrepError;
use crate::progress::ProgressCallback;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;

/// Configuration for PDF ingestion.
///
/// # Example
/// ```rust
/// use edgequake_docprep::IngestConfig;
///
/// let config = IngestConfig::builder()
///     .image_dpi(200)
///     .build()
///     .unwrap();
/// assert_eq!(config.image_dpi, 200);
/// ```
#[derive(Clone)]
pub struct IngestConfig {
    /// Render scale used for split analysis. Default: 1.0 (72 DPI).
    ///
    /// At 1.0 one raster pixel is one PDF point, so the fixed pixel offsets of
    /// [`SplitHeuristics`] keep their meaning regardless of page size.
    pub analysis_scale: f32,

    /// DPI for the exported page PNGs. Range: 72–600. Default: 300.
    pub image_dpi: u32,

    /// PDF user password for encrypted documents.
    pub password: Option<String>,

    /// Constants of the split heuristic.
    pub heuristics: SplitHeuristics,

    /// Optional per-page progress events.
    pub progress_callback: Option<ProgressCallback>,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            analysis_scale: 1.0,
            image_dpi: 300,
            password: None,
            heuristics: SplitHeuristics::default(),
            progress_callback: None,
        }
    }
}

impl fmt::Debug for IngestConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IngestConfig")
            .field("analysis_scale", &self.analysis_scale)
            .field("image_dpi", &self.image_dpi)
            .field("password", &self.password.as_ref().map(|_| "<redacted>"))
            .field("heuristics", &self.heuristics)
            .field(
                "progress_callback",
                &self
                    .progress_callback
                    .as_ref()
                    .map(|_| "<dyn IngestProgressCallback>"),
            )
            .finish()
    }
}

impl IngestConfig {
    /// Create a new builder for `IngestConfig`.
    pub fn builder() -> IngestConfigBuilder {
        IngestConfigBuilder {
            config: Self::default(),
        }
    }
}

/// Builder for [`IngestConfig`].
pub struct IngestConfigBuilder {
    config: IngestConfig,
}

impl IngestConfigBuilder {
    pub fn analysis_scale(mut self, scale: f32) -> Self {
        self.config.analysis_scale = scale;
        self
    }

    pub fn image_dpi(mut self, dpi: u32) -> Self {
        self.config.image_dpi = dpi;
        self
    }

    pub fn password(mut self, pwd: impl Into<String>) -> Self {
        self.config.password = Some(pwd.into());
        self
    }

    pub fn heuristics(mut self, heuristics: SplitHeuristics) -> Self {
        self.config.heuristics = heuristics;
        self
    }

    pub fn progress_callback(mut self, cb: ProgressCallback) -> Self {
        self.config.progress_callback = Some(cb);
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<IngestConfig, PrepError> {
        let c = &self.config;
        if !(c.analysis_scale.is_finite() && c.analysis_scale > 0.0) {
            return Err(PrepError::InvalidConfig(format!(
                "analysis scale must be a positive number, got {}",
                c.analysis_scale
            )));
        }
        if !(72..=600).contains(&c.image_dpi) {
            return Err(PrepError::InvalidConfig(format!(
                "image DPI must be 72–600, got {}",
                c.image_dpi
            )));
        }
        c.heuristics.validate()?;
        Ok(self.config)
    }
}

// ── Split heuristic ──────────────────────────────────────────────────────

/// Constants of the gutter-detection heuristic.
///
/// Pixel values are in raster pixels of the analysed image; the edge-density
/// threshold is on the edge map's native 0–255 scale.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SplitHeuristics {
    /// Half width of the centre strip fed to the edge detector. Default: 10.
    pub strip_half_width: u32,
    /// Mean edge-map value below which the page is split. Default: 0.95.
    pub edge_density_threshold: f64,
    /// Start of the colour band, in pixels right of centre. Default: 10.
    pub band_start_offset: u32,
    /// End (exclusive) of the colour band, in pixels right of centre. Default: 30.
    pub band_end_offset: u32,
    /// Max−min channel spread below which the band counts as uniform. Default: 10.
    pub uniform_range_threshold: u8,
    /// Canny hysteresis low threshold. Default: 50.
    pub canny_low: f32,
    /// Canny hysteresis high threshold. Default: 150.
    pub canny_high: f32,
}

impl Default for SplitHeuristics {
    fn default() -> Self {
        Self {
            strip_half_width: 10,
            edge_density_threshold: 0.95,
            band_start_offset: 10,
            band_end_offset: 30,
            uniform_range_threshold: 10,
            canny_low: 50.0,
            canny_high: 150.0,
        }
    }
}

impl SplitHeuristics {
    fn validate(&self) -> Result<(), PrepError> {
        if self.strip_half_width == 0 {
            return Err(PrepError::InvalidConfig(
                "strip half width must be ≥ 1".into(),
            ));
        }
        if self.band_end_offset <= self.band_start_offset {
            return Err(PrepError::InvalidConfig(format!(
                "colour band is empty ({}..{})",
                self.band_start_offset, self.band_end_offset
            )));
        }
        if self.canny_low > self.canny_high {
            return Err(PrepError::InvalidConfig(format!(
                "canny low threshold {} exceeds high threshold {}",
                self.canny_low, self.canny_high
            )));
        }
        Ok(())
    }
}

// ── Markdown filtering ───────────────────────────────────────────────────

/// Keyword lists for [`crate::pipeline::filter`].
///
/// Matching is plain substring containment, case-sensitive.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FilterRules {
    /// A line containing any of these is dropped.
    #[serde(default)]
    pub banned_line_words: Vec<String>,
    /// A header containing any of these drops its whole section.
    #[serde(default)]
    pub banned_header_keywords: Vec<String>,
}

impl FilterRules {
    pub fn new(
        banned_line_words: impl IntoIterator<Item = impl Into<String>>,
        banned_header_keywords: impl IntoIterator<Item = impl Into<String>>,
    ) -> Self {
        Self {
            banned_line_words: banned_line_words.into_iter().map(Into::into).collect(),
            banned_header_keywords: banned_header_keywords.into_iter().map(Into::into).collect(),
        }
    }

    /// Load rules from a JSON file shaped like
    /// `{"banned_line_words": [...], "banned_header_keywords": [...]}`.
    pub fn from_json_file(path: &Path) -> Result<Self, PrepError> {
        let raw = std::fs::read_to_string(path).map_err(|source| PrepError::InputReadFailed {
            path: path.to_path_buf(),
            source,
        })?;
        serde_json::from_str(&raw).map_err(|e| {
            PrepError::InvalidConfig(format!("rules file '{}': {e}", path.display()))
        })
    }

    /// Append extra words/keywords, e.g. from repeated CLI flags.
    pub fn extend(&mut self, line_words: &[String], header_keywords: &[String]) {
        self.banned_line_words.extend_from_slice(line_words);
        self.banned_header_keywords.extend_from_slice(header_keywords);
    }
}

// ── Entity extraction ────────────────────────────────────────────────────

/// Marker phrases used by [`crate::pipeline::entity`].
///
/// Defaults target Japanese integrated reports (統合報告書).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntityMarkers {
    /// Corporate-suffix marker, e.g. 株式会社.
    pub corporate_suffix: String,
    /// Group marker, e.g. グループ.
    pub group: String,
    /// Report-title anchors. The first one is also used by the correction stage.
    pub report_titles: Vec<String>,
    /// Header marking the first page of the document body.
    pub first_page_header: String,
    /// Header marking the second page of the document body.
    pub second_page_header: String,
    /// Postal-code mark that precedes addresses.
    pub postal_mark: String,
    /// Company-profile / contact section headers.
    pub section_headers: Vec<String>,
}

impl Default for EntityMarkers {
    fn default() -> Self {
        Self {
            corporate_suffix: "株式会社".into(),
            group: "グループ".into(),
            report_titles: vec!["統合報告書".into(), "統合レポート".into()],
            first_page_header: "## P.1".into(),
            second_page_header: "## P.2".into(),
            postal_mark: "〒".into(),
            section_headers: vec![
                "## 会社概要".into(),
                "## 会社情報".into(),
                "お問い合わせ先".into(),
            ],
        }
    }
}

// ── Chunking ─────────────────────────────────────────────────────────────

/// Sizing for [`crate::pipeline::chunk`]. Lengths are in characters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChunkConfig {
    /// Maximum chunk length. Default: 512.
    pub chunk_size: usize,
    /// Trailing context carried into the next chunk. Default: 32.
    pub chunk_overlap: usize,
}

impl Default for ChunkConfig {
    fn default() -> Self {
        Self {
            chunk_size: 512,
            chunk_overlap: 32,
        }
    }
}

impl ChunkConfig {
    pub fn new(chunk_size: usize, chunk_overlap: usize) -> Result<Self, PrepError> {
        if chunk_size == 0 {
            return Err(PrepError::InvalidConfig("chunk size must be ≥ 1".into()));
        }
        if chunk_overlap >= chunk_size {
            return Err(PrepError::InvalidConfig(format!(
                "chunk overlap {chunk_overlap} must be smaller than chunk size {chunk_size}"
            )));
        }
        Ok(Self {
            chunk_size,
            chunk_overlap,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_builds() {
        let config = IngestConfig::builder().build().unwrap();
        assert_eq!(config.image_dpi, 300);
        assert_eq!(config.analysis_scale, 1.0);
        assert_eq!(config.heuristics, SplitHeuristics::default());
    }

    #[test]
    fn rejects_out_of_range_dpi() {
        let err = IngestConfig::builder().image_dpi(1200).build().unwrap_err();
        assert!(matches!(err, PrepError::InvalidConfig(_)));
    }

    #[test]
    fn rejects_non_positive_scale() {
        assert!(IngestConfig::builder().analysis_scale(0.0).build().is_err());
        assert!(IngestConfig::builder()
            .analysis_scale(f32::NAN)
            .build()
            .is_err());
    }

    #[test]
    fn rejects_empty_colour_band() {
        let heuristics = SplitHeuristics {
            band_start_offset: 30,
            band_end_offset: 30,
            ..SplitHeuristics::default()
        };
        assert!(IngestConfig::builder()
            .heuristics(heuristics)
            .build()
            .is_err());
    }

    #[test]
    fn debug_redacts_password() {
        let config = IngestConfig::builder().password("hunter2").build().unwrap();
        let dbg = format!("{config:?}");
        assert!(!dbg.contains("hunter2"));
        assert!(dbg.contains("<redacted>"));
    }

    #[test]
    fn filter_rules_from_partial_json() {
        let rules: FilterRules =
            serde_json::from_str(r#"{"banned_header_keywords": ["目次"]}"#).unwrap();
        assert!(rules.banned_line_words.is_empty());
        assert_eq!(rules.banned_header_keywords, vec!["目次".to_string()]);
    }

    #[test]
    fn filter_rules_extend() {
        let mut rules = FilterRules::new(["a"], ["b"]);
        rules.extend(&["c".to_string()], &[]);
        assert_eq!(rules.banned_line_words, vec!["a", "c"]);
        assert_eq!(rules.banned_header_keywords, vec!["b"]);
    }

    #[test]
    fn chunk_config_validation() {
        assert!(ChunkConfig::new(512, 32).is_ok());
        assert!(ChunkConfig::new(0, 0).is_err());
        assert!(ChunkConfig::new(10, 10).is_err());
    }

    #[test]
    fn entity_markers_default_has_two_report_titles() {
        let m = EntityMarkers::default();
        assert_eq!(m.report_titles.len(), 2);
        assert_eq!(m.report_titles[0], "統合報告書");
    }
}
