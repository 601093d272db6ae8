//! Canonical style records extracted from live-rendered regions.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

/// Version of the tracked attribute list. Bump whenever [`StyleAttribute::TRACKED`] changes,
/// since records from different versions are not comparable.
pub const ATTRIBUTE_SET_VERSION: u32 = 1;

/// Severity class of an attribute mismatch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AttributeCategory {
    Typography,
    Layout,
    Decorative,
}

/// Computed-style properties tracked for every style record.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum StyleAttribute {
    FontFamily,
    FontSize,
    FontWeight,
    LetterSpacing,
    LineHeight,
    TextTransform,
    Color,
    BackgroundColor,
    PaddingTop,
    PaddingRight,
    PaddingBottom,
    PaddingLeft,
    MarginTop,
    MarginRight,
    MarginBottom,
    MarginLeft,
    MaxWidth,
    Display,
    FlexDirection,
    JustifyContent,
    AlignItems,
    Gap,
    GridTemplateColumns,
    BorderWidth,
    BorderRadius,
    BoxShadow,
}

impl StyleAttribute {
    pub const TRACKED: [StyleAttribute; 26] = [
        StyleAttribute::FontFamily,
        StyleAttribute::FontSize,
        StyleAttribute::FontWeight,
        StyleAttribute::LetterSpacing,
        StyleAttribute::LineHeight,
        StyleAttribute::TextTransform,
        StyleAttribute::Color,
        StyleAttribute::BackgroundColor,
        StyleAttribute::PaddingTop,
        StyleAttribute::PaddingRight,
        StyleAttribute::PaddingBottom,
        StyleAttribute::PaddingLeft,
        StyleAttribute::MarginTop,
        StyleAttribute::MarginRight,
        StyleAttribute::MarginBottom,
        StyleAttribute::MarginLeft,
        StyleAttribute::MaxWidth,
        StyleAttribute::Display,
        StyleAttribute::FlexDirection,
        StyleAttribute::JustifyContent,
        StyleAttribute::AlignItems,
        StyleAttribute::Gap,
        StyleAttribute::GridTemplateColumns,
        StyleAttribute::BorderWidth,
        StyleAttribute::BorderRadius,
        StyleAttribute::BoxShadow,
    ];

    /// The CSS property name passed to `getComputedStyle().getPropertyValue`.
    pub fn css_name(&self) -> &'static str {
        match self {
            StyleAttribute::FontFamily => "font-family",
            StyleAttribute::FontSize => "font-size",
            StyleAttribute::FontWeight => "font-weight",
            StyleAttribute::LetterSpacing => "letter-spacing",
            StyleAttribute::LineHeight => "line-height",
            StyleAttribute::TextTransform => "text-transform",
            StyleAttribute::Color => "color",
            StyleAttribute::BackgroundColor => "background-color",
            StyleAttribute::PaddingTop => "padding-top",
            StyleAttribute::PaddingRight => "padding-right",
            StyleAttribute::PaddingBottom => "padding-bottom",
            StyleAttribute::PaddingLeft => "padding-left",
            StyleAttribute::MarginTop => "margin-top",
            StyleAttribute::MarginRight => "margin-right",
            StyleAttribute::MarginBottom => "margin-bottom",
            StyleAttribute::MarginLeft => "margin-left",
            StyleAttribute::MaxWidth => "max-width",
            StyleAttribute::Display => "display",
            StyleAttribute::FlexDirection => "flex-direction",
            StyleAttribute::JustifyContent => "justify-content",
            StyleAttribute::AlignItems => "align-items",
            StyleAttribute::Gap => "gap",
            StyleAttribute::GridTemplateColumns => "grid-template-columns",
            StyleAttribute::BorderWidth => "border-width",
            StyleAttribute::BorderRadius => "border-radius",
            StyleAttribute::BoxShadow => "box-shadow",
        }
    }

    pub fn from_css_name(name: &str) -> Option<StyleAttribute> {
        StyleAttribute::TRACKED
            .iter()
            .copied()
            .find(|attr| attr.css_name() == name)
    }

    pub fn category(&self) -> AttributeCategory {
        match self {
            StyleAttribute::FontFamily
            | StyleAttribute::FontSize
            | StyleAttribute::FontWeight
            | StyleAttribute::LetterSpacing
            | StyleAttribute::LineHeight
            | StyleAttribute::TextTransform
            | StyleAttribute::Color => AttributeCategory::Typography,
            StyleAttribute::BackgroundColor
            | StyleAttribute::BorderWidth
            | StyleAttribute::BorderRadius
            | StyleAttribute::BoxShadow => AttributeCategory::Decorative,
            _ => AttributeCategory::Layout,
        }
    }
}

impl fmt::Display for StyleAttribute {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.css_name())
    }
}

/// Structural role an element plays inside its region.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StructuralRole {
    Container,
    Item,
    Label,
}

impl StructuralRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            StructuralRole::Container => "container",
            StructuralRole::Item => "item",
            StructuralRole::Label => "label",
        }
    }
}

impl fmt::Display for StructuralRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Geometry measurements compared between paired records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GeometryMetric {
    Width,
    Height,
    Top,
    CenterOffset,
}

impl GeometryMetric {
    pub const ALL: [GeometryMetric; 4] = [
        GeometryMetric::Width,
        GeometryMetric::Height,
        GeometryMetric::Top,
        GeometryMetric::CenterOffset,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            GeometryMetric::Width => "width",
            GeometryMetric::Height => "height",
            GeometryMetric::Top => "top",
            GeometryMetric::CenterOffset => "center_offset",
        }
    }
}

/// Bounding geometry in CSS pixels.
///
/// `left` is not compared directly: horizontal placement is compared through
/// `center_offset`, the distance between the element's center and the viewport's.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Geometry {
    pub width: f64,
    pub height: f64,
    pub left: f64,
    pub top: f64,
    pub center_offset: f64,
}

impl Geometry {
    pub fn new(left: f64, top: f64, width: f64, height: f64, viewport_center_x: f64) -> Self {
        Self {
            width,
            height,
            left,
            top,
            center_offset: (left + width / 2.0) - viewport_center_x,
        }
    }

    pub fn metric(&self, metric: GeometryMetric) -> f64 {
        match metric {
            GeometryMetric::Width => self.width,
            GeometryMetric::Height => self.height,
            GeometryMetric::Top => self.top,
            GeometryMetric::CenterOffset => self.center_offset,
        }
    }
}

/// A comparable, markup-independent description of one element.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StyleRecord {
    /// `normalize(visible text) + "#" + role`, disambiguated by document order.
    pub identity: String,
    pub role: StructuralRole,
    /// Unit-normalized computed values.
    pub attributes: BTreeMap<StyleAttribute, String>,
    pub geometry: Geometry,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_css_names_roundtrip() {
        for attr in StyleAttribute::TRACKED {
            assert_eq!(StyleAttribute::from_css_name(attr.css_name()), Some(attr));
        }
    }

    #[test]
    fn test_categories() {
        assert_eq!(
            StyleAttribute::FontSize.category(),
            AttributeCategory::Typography
        );
        assert_eq!(
            StyleAttribute::BoxShadow.category(),
            AttributeCategory::Decorative
        );
        assert_eq!(StyleAttribute::Gap.category(), AttributeCategory::Layout);
    }

    #[test]
    fn test_center_offset() {
        let geo = Geometry::new(0.0, 0.0, 1600.0, 80.0, 800.0);
        assert_eq!(geo.center_offset, 0.0);

        let shifted = Geometry::new(15.0, 0.0, 1600.0, 80.0, 800.0);
        assert_eq!(shifted.metric(GeometryMetric::CenterOffset), 15.0);
    }

    #[test]
    fn test_attribute_map_serializes_with_snake_case_keys() {
        let mut attributes = BTreeMap::new();
        attributes.insert(StyleAttribute::FontSize, "16px".to_string());
        let value = serde_json::to_value(&attributes).unwrap();
        assert_eq!(value["font_size"], "16px");
    }
}
