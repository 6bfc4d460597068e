//! Saving and loading region templates.
//!
//! A template is a JSON document:
//!
//! ```json
//! {
//!   "format_version": 1,
//!   "regions": [{ "id": 0, "left": 10.0, "top": 20.0, "width": 200.0, "height": 30.0 }],
//!   "field_names": { "0": "Invoice number" }
//! }
//! ```
//!
//! Loading is deliberately forgiving. Missing `regions` or `field_names` are
//! treated as empty. `regions` may also be a whole drawing-canvas document
//! with an `objects` array, which is what older templates contain. Templates
//! without `format_version` key their field names by position; we give their
//! regions IDs and move the names over.

use std::collections::{BTreeMap, HashSet};

use schemars::JsonSchema;
use tokio::fs;

use crate::{
    prelude::*,
    region::{
        DrawnRect, Rect, Region, RegionId, allocate_id, legacy_identity_key, next_id_after,
    },
};

/// The template format version we write.
pub const TEMPLATE_FORMAT_VERSION: u32 = 1;

/// A reusable set of named regions, in canvas space.
#[derive(Clone, Debug, PartialEq, Serialize, JsonSchema)]
pub struct Template {
    /// Format version. Templates without one are version 0.
    pub format_version: u32,

    /// Regions as drawn on the template page, in column order.
    pub regions: Vec<Region>,

    /// Field names keyed by region ID. Keys without a matching region are
    /// ignored.
    pub field_names: BTreeMap<String, String>,
}

impl Default for Template {
    fn default() -> Self {
        Self::new(vec![], BTreeMap::new())
    }
}

impl Template {
    /// Create a template in the current format.
    pub fn new(regions: Vec<Region>, field_names: BTreeMap<String, String>) -> Self {
        Self {
            format_version: TEMPLATE_FORMAT_VERSION,
            regions,
            field_names,
        }
    }

    /// Serialize as pretty-printed JSON.
    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string_pretty(self).context("failed to serialize template")
    }

    /// Parse a template document.
    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json).context("failed to parse template")
    }

    /// Load a template from a file.
    #[instrument(level = "debug", skip_all, fields(path = %path.display()))]
    pub async fn load(path: &Path) -> Result<Self> {
        let json = fs::read_to_string(path)
            .await
            .with_context(|| format!("failed to read template {:?}", path.display()))?;
        let template = Self::from_json(&json)
            .with_context(|| format!("failed to load template {:?}", path.display()))?;
        debug!(regions = template.regions.len(), "Loaded template");
        Ok(template)
    }

    /// Save a template to a file.
    #[instrument(level = "debug", skip_all, fields(path = %path.display()))]
    pub async fn save(&self, path: &Path) -> Result<()> {
        let json = self.to_json()?;
        fs::write(path, json)
            .await
            .with_context(|| format!("failed to write template {:?}", path.display()))
    }
}

impl<'de> Deserialize<'de> for Template {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        TemplateDocument::deserialize(deserializer).map(Template::from)
    }
}

/// Multiplier used when a drawn object has no `scaleX` or `scaleY`.
fn unit_scale() -> f64 {
    1.0
}

/// A rectangle as it appears in a template file or a drawing-canvas export.
///
/// Canvas exports carry many other fields (`type`, `fill`, `stroke`...),
/// which we ignore.
#[derive(Clone, Debug, Deserialize)]
pub struct DrawnObject {
    #[serde(default)]
    pub id: Option<RegionId>,
    pub left: f64,
    pub top: f64,
    pub width: f64,
    pub height: f64,
    #[serde(default = "unit_scale", rename = "scaleX")]
    pub scale_x: f64,
    #[serde(default = "unit_scale", rename = "scaleY")]
    pub scale_y: f64,
}

impl DrawnObject {
    /// The rectangle as displayed, with any resize scaling applied.
    pub fn rect(&self) -> Rect {
        Rect::new(
            self.left,
            self.top,
            self.width * self.scale_x,
            self.height * self.scale_y,
        )
    }
}

impl From<DrawnObject> for DrawnRect {
    fn from(obj: DrawnObject) -> Self {
        DrawnRect {
            id: obj.id,
            rect: obj.rect(),
        }
    }
}

/// The two shapes `regions` can take.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub enum DrawnObjects {
    /// A bare list of rectangles.
    List(Vec<DrawnObject>),
    /// A canvas document with an `objects` list.
    Canvas {
        #[serde(default)]
        objects: Vec<DrawnObject>,
    },
}

impl DrawnObjects {
    /// Get our objects, whatever shape we came in.
    pub fn into_objects(self) -> Vec<DrawnObject> {
        match self {
            DrawnObjects::List(objects) => objects,
            DrawnObjects::Canvas { objects } => objects,
        }
    }
}

/// The on-disk template, before IDs are checked and legacy keys migrated.
#[derive(Debug, Deserialize)]
struct TemplateDocument {
    #[serde(default)]
    format_version: u32,
    #[serde(default)]
    regions: Option<DrawnObjects>,
    #[serde(default)]
    field_names: Option<BTreeMap<String, String>>,
}

impl From<TemplateDocument> for Template {
    fn from(doc: TemplateDocument) -> Self {
        if doc.format_version > TEMPLATE_FORMAT_VERSION {
            warn!(
                format_version = doc.format_version,
                "Template was written by a newer version; loading what we understand"
            );
        }
        let objects = doc
            .regions
            .map(DrawnObjects::into_objects)
            .unwrap_or_default();
        let mut field_names = doc.field_names.unwrap_or_default();

        // Any region without a usable ID gets one past the largest we've seen.
        let mut next_id = next_id_after(objects.iter().filter_map(|obj| obj.id));
        let mut seen = HashSet::new();

        let mut regions = Vec::with_capacity(objects.len());
        for (ordinal, obj) in objects.into_iter().enumerate() {
            let rect = obj.rect();
            let id = match obj.id {
                Some(id) if seen.insert(id) => id,
                _ => {
                    let id = allocate_id(&mut next_id, |id| seen.contains(&id));
                    seen.insert(id);
                    if let Some(name) = field_names.remove(&legacy_identity_key(ordinal, &rect))
                    {
                        field_names.insert(id.key(), name);
                    }
                    id
                }
            };
            regions.push(Region { id, rect });
        }

        Template {
            format_version: doc.format_version.max(TEMPLATE_FORMAT_VERSION),
            regions,
            field_names,
        }
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::region::RegionSet;

    fn sample() -> Template {
        let regions = vec![
            Region {
                id: RegionId(0),
                rect: Rect::new(10.5, 20.25, 100.125, 30.0),
            },
            Region {
                id: RegionId(3),
                rect: Rect::new(0.1, 0.2, 0.3, 1.0 / 3.0),
            },
        ];
        let field_names = BTreeMap::from([
            ("0".to_owned(), "Name".to_owned()),
            ("3".to_owned(), "Amount".to_owned()),
            ("17".to_owned(), "Stale".to_owned()),
        ]);
        Template::new(regions, field_names)
    }

    #[test]
    fn round_trips_exactly() {
        let template = sample();
        let json = template.to_json().unwrap();
        assert_eq!(Template::from_json(&json).unwrap(), template);
    }

    #[test]
    fn missing_keys_mean_empty() {
        let template = Template::from_json("{}").unwrap();
        assert!(template.regions.is_empty());
        assert!(template.field_names.is_empty());

        let template = Template::from_json(r#"{"regions": null}"#).unwrap();
        assert!(template.regions.is_empty());
    }

    #[test]
    fn missing_field_names_fall_back_to_defaults() {
        let template = Template::from_json(
            r#"{"regions": [{"left": 1, "top": 2, "width": 3, "height": 4}]}"#,
        )
        .unwrap();
        let set = RegionSet::from_parts(template.regions, template.field_names);
        assert_eq!(set.field_name(0).as_deref(), Some("Field_1"));
    }

    #[test]
    fn legacy_canvas_templates_are_migrated() {
        let json = r#"{
            "regions": {
                "version": "4.4.0",
                "objects": [
                    {"type": "rect", "left": 50.7, "top": 80.2, "width": 100, "height": 20,
                     "fill": "rgba(255, 165, 0, 0.3)", "scaleX": 1, "scaleY": 1},
                    {"type": "rect", "left": 300, "top": 80, "width": 50, "height": 10,
                     "scaleX": 2, "scaleY": 1.5}
                ]
            },
            "field_names": {
                "region_0_50_80": "Invoice",
                "region_1_300_80": "Total",
                "region_2_9_9": "Gone"
            }
        }"#;
        let template = Template::from_json(json).unwrap();
        assert_eq!(template.format_version, TEMPLATE_FORMAT_VERSION);
        assert_eq!(
            template.regions,
            vec![
                Region {
                    id: RegionId(0),
                    rect: Rect::new(50.7, 80.2, 100.0, 20.0),
                },
                Region {
                    id: RegionId(1),
                    rect: Rect::new(300.0, 80.0, 100.0, 15.0),
                },
            ]
        );
        let set = RegionSet::from_parts(template.regions, template.field_names);
        let names: Vec<_> = set
            .named_regions()
            .into_iter()
            .map(|r| r.field_name)
            .collect();
        assert_eq!(names, ["Invoice", "Total"]);
        assert_eq!(set.field_names().get("region_2_9_9").map(String::as_str), Some("Gone"));
    }

    #[test]
    fn duplicate_ids_are_reassigned() {
        let json = r#"{
            "format_version": 1,
            "regions": [
                {"id": 5, "left": 0, "top": 0, "width": 1, "height": 1},
                {"id": 5, "left": 9, "top": 9, "width": 1, "height": 1}
            ]
        }"#;
        let template = Template::from_json(json).unwrap();
        assert_eq!(template.regions[0].id, RegionId(5));
        assert_eq!(template.regions[1].id, RegionId(6));
    }

    #[test]
    fn largest_possible_id_loads_without_collisions() {
        let json = r#"{
            "format_version": 1,
            "regions": [
                {"id": 18446744073709551615, "left": 0, "top": 0, "width": 1, "height": 1},
                {"left": 5, "top": 5, "width": 1, "height": 1},
                {"left": 9, "top": 9, "width": 1, "height": 1}
            ],
            "field_names": {"18446744073709551615": "Total"}
        }"#;
        let template = Template::from_json(json).unwrap();
        let ids: Vec<_> = template.regions.iter().map(|r| r.id).collect();
        assert_eq!(ids, [RegionId(u64::MAX), RegionId(0), RegionId(1)]);

        let set = RegionSet::from_parts(template.regions, template.field_names);
        assert_eq!(set.field_name(0).as_deref(), Some("Total"));
    }

    #[test]
    fn newer_versions_still_load() {
        let json = r#"{"format_version": 99, "regions": [], "field_names": {}, "extra": true}"#;
        let template = Template::from_json(json).unwrap();
        assert_eq!(template.format_version, 99);
    }

    #[tokio::test]
    async fn save_then_load() -> Result<()> {
        let dir = tempfile::TempDir::with_prefix("template")?;
        let path = dir.path().join("template.json");
        let template = sample();
        template.save(&path).await?;
        assert_eq!(Template::load(&path).await?, template);
        Ok(())
    }
}
