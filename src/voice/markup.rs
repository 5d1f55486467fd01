//! Speech segments and SSML checks

use std::sync::LazyLock;

use regex::Regex;

static TAG_REGEX: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"</?[A-Za-z][^<>]*>").expect("valid regex"));

static SPACE_REGEX: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\s+").expect("valid regex"));

/// How a segment's text is marked up
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Markup {
    Plain,
    /// SSML rooted at `<speak>`
    Structured,
}

/// One unit of speech output
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpeechSegment {
    pub text: String,
    pub markup: Markup,
}

impl SpeechSegment {
    #[must_use]
    pub fn plain(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            markup: Markup::Plain,
        }
    }

    #[must_use]
    pub fn structured(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            markup: Markup::Structured,
        }
    }

    /// Segment for model output, structured if it mentions a `<speak>` root
    #[must_use]
    pub fn detect(text: impl Into<String>) -> Self {
        let text = text.into();
        if text.contains("<speak") {
            Self::structured(text)
        } else {
            Self::plain(text)
        }
    }

    /// Make the segment safe to synthesize
    ///
    /// Structured text must begin with `<speak>` and end with `</speak>`.
    /// Anything else is spoken as plain text with every tag stripped.
    #[must_use]
    pub fn validated(self) -> Self {
        match self.markup {
            Markup::Structured if is_well_formed(&self.text) => self,
            Markup::Structured => {
                tracing::warn!(text = %self.text, "malformed SSML, speaking as plain text");
                Self::plain(strip_tags(&self.text))
            }
            Markup::Plain if TAG_REGEX.is_match(&self.text) => {
                tracing::debug!(text = %self.text, "stripping stray tags");
                Self::plain(strip_tags(&self.text))
            }
            Markup::Plain => self,
        }
    }
}

/// True when the text is wrapped in a single `<speak>` root
#[must_use]
pub fn is_well_formed(text: &str) -> bool {
    let text = text.trim();
    (text.starts_with("<speak>") || text.starts_with("<speak "))
        && text.ends_with("</speak>")
}

/// Remove all markup tags and collapse whitespace
#[must_use]
pub fn strip_tags(text: &str) -> String {
    let stripped = TAG_REGEX.replace_all(text, " ");
    SPACE_REGEX.replace_all(stripped.trim(), " ").into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn detects_structured_text() {
        assert_eq!(SpeechSegment::detect("hi").markup, Markup::Plain);
        assert_eq!(
            SpeechSegment::detect("<speak>hi</speak>").markup,
            Markup::Structured
        );
    }

    #[test]
    fn well_formed_ssml_is_kept() {
        let segment = SpeechSegment::structured("<speak>Buy <emphasis>Trinity Force</emphasis></speak>");
        assert_eq!(segment.clone().validated(), segment);
    }

    #[test]
    fn malformed_ssml_is_stripped() {
        let segment = SpeechSegment::structured("Sure! <speak>Buy <break time=\"1s\"/> boots");
        assert_eq!(segment.validated(), SpeechSegment::plain("Sure! Buy boots"));
    }

    #[test]
    fn plain_text_is_untouched() {
        let segment = SpeechSegment::plain("a < b > c");
        assert_eq!(segment.clone().validated(), segment);
    }

    #[test]
    fn stray_tags_in_plain_text_are_stripped() {
        let segment = SpeechSegment::detect("Build <b>Trinity Force</b> first.<br/>");
        assert_eq!(segment.markup, Markup::Plain);
        assert_eq!(segment.validated(), SpeechSegment::plain("Build Trinity Force first."));
    }
}
