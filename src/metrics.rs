//! Line metrics for the certificate template.
//!
//! Weights approximate rendered advance widths of the template's body font: a Hangul syllable
//! counts as full width, everything else as slightly more than half. They are calibrated against
//! the one supported template and are not a general East Asian width model; a new template needs
//! its own calibration.

use serde::Deserialize;

pub const HANGUL_WEIGHT: f64 = 2.0;
pub const NARROW_WEIGHT: f64 = 1.1;

/// Hangul syllables and Hangul compatibility Jamo.
pub fn is_hangul(ch: char) -> bool {
    matches!(ch, '\u{AC00}'..='\u{D7A3}' | '\u{3130}'..='\u{318F}')
}

pub fn char_weight(ch: char) -> f64 {
    if is_hangul(ch) {
        HANGUL_WEIGHT
    } else {
        NARROW_WEIGHT
    }
}

pub fn text_weight(text: &str) -> f64 {
    text.chars().map(char_weight).sum()
}

/// Layout parameters of the address block, in weight units and HWP units.
#[derive(Clone, Debug, Deserialize, PartialEq)]
#[serde(default)]
pub struct LayoutConstants {
    /// Text that identifies the address paragraph.
    pub label_marker: String,
    /// Weight that fits on one rendered line, label included.
    pub weight_per_line: f64,
    /// Weight taken by the label at the start of the first line.
    pub label_weight: f64,
    /// Vertical distance between consecutive line segments.
    pub line_height: i64,
    /// Height of one line box, used for paragraph extents.
    pub line_box_height: i64,
    pub paragraph_gap: i64,
    /// `flags` written on wrapped continuation lines.
    pub continuation_flags: u32,
    /// Used when the template line segment has no horizontal geometry.
    pub base_horz_pos: i64,
    pub base_horz_size: i64,
    /// How many characters a break may move back to reach a separator.
    pub separator_lookback: usize,
}

impl Default for LayoutConstants {
    fn default() -> Self {
        Self {
            label_marker: "주소지".to_string(),
            weight_per_line: 84.0,
            label_weight: 20.0,
            line_height: 1600,
            line_box_height: 1000,
            paragraph_gap: 600,
            continuation_flags: 1_441_792,
            base_horz_pos: 0,
            base_horz_size: 42_520,
            separator_lookback: 20,
        }
    }
}

impl LayoutConstants {
    /// Rejects geometry under which a continuation line cannot hold a single Hangul syllable.
    pub fn validate(&self) -> anyhow::Result<()> {
        anyhow::ensure!(
            self.weight_per_line > self.label_weight + HANGUL_WEIGHT,
            "layout.weight_per_line ({}) must exceed layout.label_weight ({}) by more than {}",
            self.weight_per_line,
            self.label_weight,
            HANGUL_WEIGHT
        );
        anyhow::ensure!(
            self.label_weight >= 0.0,
            "layout.label_weight must not be negative"
        );
        anyhow::ensure!(self.line_height > 0, "layout.line_height must be positive");
        anyhow::ensure!(
            self.base_horz_size > 0,
            "layout.base_horz_size must be positive"
        );
        anyhow::ensure!(
            !self.label_marker.is_empty(),
            "layout.label_marker must not be empty"
        );
        Ok(())
    }

    pub fn continuation_budget(&self) -> f64 {
        self.weight_per_line - self.label_weight
    }

    /// Horizontal offset of continuation lines so they start under the end of the label.
    pub fn hanging_indent(&self, base_horz_size: i64) -> i64 {
        if self.weight_per_line <= 0.0 {
            return 0;
        }
        (self.label_weight / self.weight_per_line * base_horz_size as f64).floor() as i64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn weights() {
        assert_eq!(char_weight('가'), 2.0);
        assert_eq!(char_weight('힣'), 2.0);
        assert_eq!(char_weight('ㄱ'), 2.0);
        assert_eq!(char_weight('a'), 1.1);
        assert_eq!(char_weight('1'), 1.1);
        assert_eq!(char_weight(' '), 1.1);
        assert_eq!(char_weight('中'), 1.1);
        assert_eq!(text_weight("서울시"), 6.0);
    }

    #[test]
    fn indent_is_floored_share_of_line() {
        let layout = LayoutConstants::default();
        // 20 / 84 * 42520 = 10123.8...
        assert_eq!(layout.hanging_indent(42_520), 10_123);
        assert_eq!(layout.continuation_budget(), 64.0);
        layout.validate().expect("defaults are usable");
    }
}
