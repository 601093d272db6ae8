//! Style Extraction Normalizer.
//!
//! Turns raw computed-style queries into [`StyleRecord`]s keyed by a
//! content-derived identity, so records from differently structured markup on
//! the two sides can still be paired.

use std::collections::{BTreeMap, HashMap};
use std::sync::OnceLock;
use std::time::Duration;

use regex::{Captures, Regex};
use tracing::debug;

use crate::domain::region::RegionSpec;
use crate::domain::style::{Geometry, StructuralRole, StyleAttribute, StyleRecord};
use crate::domain::target::ViewportProfile;
use crate::renderer::{PageRenderer, RawElement, RenderError};

/// Longest text prefix kept in an identity.
pub const MAX_IDENTITY_TEXT: usize = 80;

#[derive(Debug, Clone)]
pub struct StyleNormalizer {
    attributes: Vec<StyleAttribute>,
}

impl Default for StyleNormalizer {
    fn default() -> Self {
        Self {
            attributes: StyleAttribute::TRACKED.to_vec(),
        }
    }
}

impl StyleNormalizer {
    pub fn new(attributes: Vec<StyleAttribute>) -> Self {
        Self { attributes }
    }

    pub fn attributes(&self) -> &[StyleAttribute] {
        &self.attributes
    }

    /// Query every structural role probe of `region` and normalize the result.
    ///
    /// Regions without probes yield no records.
    pub async fn extract(
        &self,
        renderer: &dyn PageRenderer,
        region: &RegionSpec,
        viewport: &ViewportProfile,
        timeout: Duration,
    ) -> Result<Vec<StyleRecord>, RenderError> {
        let probes = [
            (StructuralRole::Container, region.probes.container.as_deref()),
            (StructuralRole::Item, region.probes.item.as_deref()),
            (StructuralRole::Label, region.probes.label.as_deref()),
        ];
        let mut groups = Vec::new();
        for (role, selector) in probes {
            let Some(selector) = selector else { continue };
            let elements = tokio::time::timeout(
                timeout,
                renderer.query_computed_style(selector, &self.attributes),
            )
            .await
            .map_err(|_| RenderError::timeout(format!("style query {selector}"), timeout))??;
            debug!(region = %region.name, role = %role, matched = elements.len(), "style probe");
            groups.push((role, elements));
        }
        Ok(self.normalize_elements(groups, viewport.center_x()))
    }

    /// Build records from raw elements grouped by role, in the given order.
    ///
    /// Duplicate identities within the region are suffixed `@1`, `@2`, ... by
    /// document order; the first occurrence keeps the bare identity.
    pub fn normalize_elements(
        &self,
        groups: Vec<(StructuralRole, Vec<RawElement>)>,
        viewport_center_x: f64,
    ) -> Vec<StyleRecord> {
        let mut seen: HashMap<String, usize> = HashMap::new();
        let mut records = Vec::new();
        for (role, elements) in groups {
            for element in elements {
                let Some(base) = base_identity(&element, role) else {
                    continue;
                };
                let count = seen.entry(base.clone()).or_insert(0);
                let identity = if *count == 0 {
                    base
                } else {
                    format!("{base}@{count}")
                };
                *count += 1;

                let attributes: BTreeMap<StyleAttribute, String> = self
                    .attributes
                    .iter()
                    .filter_map(|attr| {
                        element
                            .styles
                            .get(attr)
                            .map(|raw| (*attr, normalize_value(*attr, raw)))
                    })
                    .collect();
                let b = element.bounds;
                records.push(StyleRecord {
                    identity,
                    role,
                    attributes,
                    geometry: Geometry::new(b.x, b.y, b.width, b.height, viewport_center_x),
                });
            }
        }
        records
    }
}

/// `normalize(text) + "#" + role`; `None` when the element cannot be paired.
///
/// Text-less elements fall back to their ARIA role. Containers are always kept
/// since there is one per probe.
fn base_identity(element: &RawElement, role: StructuralRole) -> Option<String> {
    let text = normalize_text(&element.text);
    let label = if !text.is_empty() {
        text
    } else if let Some(aria) = element.aria_role.as_deref().filter(|r| !r.trim().is_empty()) {
        format!("[{}]", aria.trim().to_lowercase())
    } else if role == StructuralRole::Container {
        String::new()
    } else {
        return None;
    };
    Some(format!("{label}#{role}"))
}

/// Collapse whitespace, trim, lower-case, truncate.
pub fn normalize_text(raw: &str) -> String {
    raw.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
        .chars()
        .take(MAX_IDENTITY_TEXT)
        .collect()
}

fn hex_color_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"#([0-9a-f]{8}|[0-9a-f]{6}|[0-9a-f]{3,4})\b").expect("valid regex"))
}

fn number_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"-?(?:\d+\.\d+|\d+|\.\d+)").expect("valid regex"))
}

fn opaque_rgba_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"rgba\((\d+), (\d+), (\d+), 1\)").expect("valid regex")
    })
}

fn length_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^(-?(?:\d+\.\d+|\d+|\.\d+))([a-z%]*)$").expect("valid regex"))
}

/// Unit-aware canonical form of a computed value.
///
/// `10.0px` and `10px` normalize equal, as do `bold` and `700`, or
/// `#fff` and `rgb(255,255,255)`.
pub fn normalize_value(attribute: StyleAttribute, raw: &str) -> String {
    let mut value = raw.trim().to_lowercase().replace(['"', '\''], "");
    if attribute == StyleAttribute::FontWeight {
        match value.as_str() {
            "normal" => return "400".to_string(),
            "bold" => return "700".to_string(),
            _ => {}
        }
    }

    value = hex_color_re()
        .replace_all(&value, |caps: &Captures| hex_to_rgb(&caps[1]))
        .into_owned();

    // Canonical separators: ", " between list items, single spaces elsewhere.
    value = value
        .split(',')
        .map(|part| part.split_whitespace().collect::<Vec<_>>().join(" "))
        .collect::<Vec<_>>()
        .join(", ");
    value = value.replace("( ", "(").replace(" )", ")");

    value = number_re()
        .replace_all(&value, |caps: &Captures| canonical_number(&caps[0]))
        .into_owned();

    opaque_rgba_re()
        .replace_all(&value, "rgb($1, $2, $3)")
        .into_owned()
}

fn canonical_number(literal: &str) -> String {
    match literal.parse::<f64>() {
        Ok(n) if n == 0.0 => "0".to_string(),
        Ok(n) => {
            let fixed = format!("{n:.4}");
            fixed
                .trim_end_matches('0')
                .trim_end_matches('.')
                .to_string()
        }
        Err(_) => literal.to_string(),
    }
}

fn hex_to_rgb(hex: &str) -> String {
    let expand = |s: &str| -> Vec<u8> {
        if s.len() <= 4 {
            s.chars()
                .filter_map(|c| u8::from_str_radix(&format!("{c}{c}"), 16).ok())
                .collect()
        } else {
            (0..s.len())
                .step_by(2)
                .filter_map(|i| u8::from_str_radix(&s[i..i + 2], 16).ok())
                .collect()
        }
    };
    match expand(hex).as_slice() {
        [r, g, b] | [r, g, b, 255] => format!("rgb({r}, {g}, {b})"),
        [r, g, b, a] => format!("rgba({r}, {g}, {b}, {})", canonical_number(&format!("{}", f64::from(*a) / 255.0))),
        _ => format!("#{hex}"),
    }
}

/// Split a normalized single-length value like `12.5px` into number and unit.
pub fn parse_length(value: &str) -> Option<(f64, &str)> {
    let caps = length_re().captures(value.trim())?;
    let number = caps.get(1)?.as_str().parse().ok()?;
    Some((number, caps.get(2).map_or("", |m| m.as_str())))
}
