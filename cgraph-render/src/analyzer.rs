//! Validity analyzer for rendered graphs.
//!
//! The render function gives no explicit "done" signal, so completeness is
//! inferred geometrically: the plotted series must end within a fixed
//! fraction of the drawing's right edge. This is a heuristic; a graph whose
//! real data stops short of the edge is indistinguishable from a truncated
//! rendering.

use cgraph_core::{AnalyzeError, AnalyzerConfig};
use roxmltree::{Document, Node, ParsingOptions};

/// Attributes inspected for the series color token.
const STYLE_ATTRIBUTES: [&str; 4] = ["stroke", "fill", "style", "color"];

/// Measurement of an accepted rendering.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Completeness {
    /// Horizontal coordinate where the series line ends.
    pub endpoint_x: i64,
    /// Declared width of the bounding rectangle.
    pub bounding_width: i64,
    /// `endpoint_x / bounding_width`.
    pub ratio: f64,
}

/// Decides whether a rendered graph is complete.
#[derive(Debug, Clone)]
pub struct ValidityAnalyzer {
    series_color: String,
    completion_ratio: f64,
}

impl Default for ValidityAnalyzer {
    fn default() -> Self {
        Self::new(&AnalyzerConfig::default())
    }
}

impl ValidityAnalyzer {
    pub fn new(config: &AnalyzerConfig) -> Self {
        Self {
            series_color: config
                .series_color
                .trim()
                .trim_start_matches('#')
                .to_ascii_lowercase(),
            completion_ratio: config.completion_ratio,
        }
    }

    /// Analyze markup. `Ok` means the rendering is complete; the error
    /// explains why it was rejected otherwise.
    pub fn analyze(&self, markup: &str) -> Result<Completeness, AnalyzeError> {
        let options = ParsingOptions {
            allow_dtd: true,
            ..ParsingOptions::default()
        };
        let doc = Document::parse_with_options(markup, options).map_err(|e| {
            AnalyzeError::MalformedMarkup {
                reason: e.to_string(),
            }
        })?;

        let bounding_width = bounding_width(&doc)?;
        let endpoint_x = self.endpoint_x(&doc)?;
        let ratio = endpoint_x as f64 / bounding_width as f64;

        if endpoint_x as f64 > self.completion_ratio * bounding_width as f64 {
            Ok(Completeness {
                endpoint_x,
                bounding_width,
                ratio,
            })
        } else {
            Err(AnalyzeError::LineIncomplete {
                endpoint_x,
                bounding_width,
                ratio,
            })
        }
    }

    /// Shorthand for `analyze(markup).is_ok()`.
    pub fn is_complete(&self, markup: &str) -> bool {
        self.analyze(markup).is_ok()
    }

    fn endpoint_x(&self, doc: &Document<'_>) -> Result<i64, AnalyzeError> {
        let coordinates = doc
            .descendants()
            .filter(|node| node.is_element() && self.is_series(node))
            .find_map(|node| node.attribute("d").or_else(|| node.attribute("points")))
            .ok_or_else(|| AnalyzeError::EndpointNotFound {
                color: self.series_color.clone(),
            })?;

        let tokens = numeric_tokens(coordinates);
        if tokens.len() < 2 {
            return Err(AnalyzeError::EndpointUnparseable {
                token: coordinates.to_string(),
            });
        }

        let token = tokens[tokens.len() - 2];
        token
            .parse::<i64>()
            .map_err(|_| AnalyzeError::EndpointUnparseable {
                token: token.to_string(),
            })
    }

    fn is_series(&self, node: &Node<'_, '_>) -> bool {
        STYLE_ATTRIBUTES.iter().any(|name| {
            node.attribute(*name)
                .map(|value| value.to_ascii_lowercase().contains(&self.series_color))
                .unwrap_or(false)
        })
    }
}

/// Width of the last `rect` declaring one, in document order.
fn bounding_width(doc: &Document<'_>) -> Result<i64, AnalyzeError> {
    let raw = doc
        .descendants()
        .filter(|node| node.is_element() && node.tag_name().name() == "rect")
        .filter_map(|node| node.attribute("width"))
        .last()
        .ok_or_else(|| AnalyzeError::WidthNotFound {
            reason: "no rect element declares a width".to_string(),
        })?;

    let trimmed = raw.trim();
    let number = trimmed.strip_suffix("px").unwrap_or(trimmed);
    match number.parse::<i64>() {
        Ok(width) if width > 0 => Ok(width),
        Ok(width) => Err(AnalyzeError::WidthNotFound {
            reason: format!("rect width {} is not positive", width),
        }),
        Err(_) => Err(AnalyzeError::WidthNotFound {
            reason: format!("rect width {:?} is not an integer", raw),
        }),
    }
}

/// Split a path `d` or `points` list into numeric tokens.
///
/// Whitespace, commas and command letters separate tokens; a sign starts a
/// new token (`10-5` is `10`, `-5`).
fn numeric_tokens(data: &str) -> Vec<&str> {
    let mut tokens = Vec::new();
    let mut start: Option<usize> = None;

    for (i, c) in data.char_indices() {
        if c.is_ascii_digit() || c == '.' {
            if start.is_none() {
                start = Some(i);
            }
        } else if c == '-' || c == '+' {
            if let Some(s) = start.take() {
                tokens.push(&data[s..i]);
            }
            start = Some(i);
        } else if let Some(s) = start.take() {
            tokens.push(&data[s..i]);
        }
    }
    if let Some(s) = start {
        tokens.push(&data[s..]);
    }

    tokens
}


#[cfg(test)]
mod prop_tests {
    use super::*;
    use proptest::prelude::*;

    fn chart(width: i64, endpoint_x: i64) -> String {
        format!(
            r##"<svg xmlns="http://www.w3.org/2000/svg"><rect width="{w}" height="400" x="0" y="0"/><path d="M0 390L{mid} 200L{x} 40" fill="none" stroke="#39a85a"/></svg>"##,
            w = width,
            mid = endpoint_x / 2,
            x = endpoint_x
        )
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(200))]

        /// For any endpoint strictly beyond 95% of the width, the rendering is valid.
        #[test]
        fn prop_endpoint_past_threshold_is_valid(width in 20i64..5000, frac in 0.0f64..=1.0) {
            let threshold = (width * 95) / 100;
            let endpoint_x = threshold + 1 + ((width - threshold - 1) as f64 * frac) as i64;
            let analyzer = ValidityAnalyzer::default();
            prop_assert!(analyzer.analyze(&chart(width, endpoint_x)).is_ok());
        }

        /// For any endpoint below 95% of the width, the rendering is rejected as incomplete.
        #[test]
        fn prop_endpoint_below_threshold_is_incomplete(width in 20i64..5000, frac in 0.0f64..0.95) {
            let endpoint_x = (width as f64 * frac).floor() as i64;
            prop_assume!((endpoint_x as f64) < 0.95 * width as f64);
            let analyzer = ValidityAnalyzer::default();
            let result = analyzer.analyze(&chart(width, endpoint_x));
            let incomplete = matches!(result, Err(AnalyzeError::LineIncomplete { .. }));
            prop_assert!(incomplete);
        }
    }
}
