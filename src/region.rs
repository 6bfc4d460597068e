//! Regions drawn on the template page, and the field names attached to them.
//!
//! Every region gets an explicit [`RegionId`] when it is created. Field names
//! are stored in a map keyed by that ID, so renaming survives redraws,
//! reordering and deletion of other regions. The older positional key
//! (`region_<ordinal>_<left>_<top>`) is still available through
//! [`legacy_identity_key`], because templates saved before IDs existed use it.

use std::{collections::BTreeMap, fmt};

use schemars::JsonSchema;

use crate::{error::ExtractError, prelude::*};

/// A rectangle, in whatever coordinate space it was captured in.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct Rect {
    /// Distance from the left edge.
    pub left: f64,
    /// Distance from the top edge.
    pub top: f64,
    /// Width of the rectangle.
    pub width: f64,
    /// Height of the rectangle.
    pub height: f64,
}

impl Rect {
    /// Create a new rectangle.
    pub fn new(left: f64, top: f64, width: f64, height: f64) -> Self {
        Self {
            left,
            top,
            width,
            height,
        }
    }
}

/// A stable region identifier, assigned once when the region is created.
#[derive(
    Clone,
    Copy,
    Debug,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Serialize,
    Deserialize,
    JsonSchema,
)]
#[serde(transparent)]
pub struct RegionId(pub u64);

impl RegionId {
    /// The key used for this region in a field-name map.
    pub fn key(self) -> String {
        self.0.to_string()
    }
}

impl fmt::Display for RegionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A region on the template page, in canvas space.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct Region {
    /// Our stable ID.
    pub id: RegionId,

    /// Our geometry, in canvas space.
    #[serde(flatten)]
    pub rect: Rect,
}

impl Region {
    /// The key under which this region's field name is stored.
    pub fn identity_key(&self) -> String {
        self.id.key()
    }
}

/// A region together with its resolved field name.
#[derive(Clone, Debug, PartialEq)]
pub struct NamedRegion {
    pub id: RegionId,
    pub rect: Rect,
    pub field_name: String,
}

/// A rectangle as reported by the drawing surface. Objects which were
/// already known to us carry their [`RegionId`]; new ones don't.
#[derive(Clone, Debug, PartialEq)]
pub struct DrawnRect {
    pub id: Option<RegionId>,
    pub rect: Rect,
}

/// The name a region gets if nobody has named it yet. `ordinal` is 0-based.
pub fn default_field_name(ordinal: usize) -> String {
    format!("Field_{}", ordinal + 1)
}

/// The positional key used by templates saved without region IDs.
///
/// Coordinates are truncated towards zero, so two regions starting within the
/// same pixel at the same ordinal share a key.
pub fn legacy_identity_key(ordinal: usize, rect: &Rect) -> String {
    format!(
        "region_{}_{}_{}",
        ordinal,
        rect.left.trunc() as i64,
        rect.top.trunc() as i64
    )
}

/// The ID after the largest one in `ids`, or [`u64::MAX`] if the counter has
/// run out.
pub fn next_id_after(ids: impl IntoIterator<Item = RegionId>) -> u64 {
    ids.into_iter()
        .map(|id| id.0.saturating_add(1))
        .max()
        .unwrap_or(0)
}

/// Hand out a fresh ID from `next_id`.
///
/// Counter IDs stop short of [`u64::MAX`]. Once the counter runs out (only
/// possible after loading a huge ID), we fall back to the smallest ID for
/// which `in_use` is false.
pub fn allocate_id(next_id: &mut u64, in_use: impl Fn(RegionId) -> bool) -> RegionId {
    if let Some(after) = next_id.checked_add(1) {
        let id = RegionId(*next_id);
        *next_id = after;
        return id;
    }
    warn!("Region ID counter exhausted; reusing the smallest free ID");
    (0..u64::MAX)
        .map(RegionId)
        .find(|&id| !in_use(id))
        .unwrap_or(RegionId(u64::MAX))
}

/// The ordered set of regions drawn in one session, plus their field names.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct RegionSet {
    /// Regions, in drawing order. This is also the column order.
    regions: Vec<Region>,
    /// Field names keyed by [`Region::identity_key`]. May contain keys for
    /// regions which no longer exist.
    field_names: BTreeMap<String, String>,
    /// The next ID we will hand out.
    next_id: u64,
}

impl RegionSet {
    /// Create an empty region set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuild a region set from persisted parts.
    ///
    /// IDs handed out afterwards are always larger than any existing ID.
    pub fn from_parts(regions: Vec<Region>, field_names: BTreeMap<String, String>) -> Self {
        let next_id = next_id_after(regions.iter().map(|region| region.id));
        Self {
            regions,
            field_names,
            next_id,
        }
    }

    /// Add a new region at the end of the set.
    pub fn add(&mut self, rect: Rect) -> RegionId {
        let regions = &self.regions;
        let id = allocate_id(&mut self.next_id, |id| regions.iter().any(|r| r.id == id));
        debug!(%id, ?rect, "Added region");
        self.regions.push(Region { id, rect });
        id
    }

    /// Remove a region. Its field name stays in the map, where it is ignored.
    pub fn remove(&mut self, id: RegionId) -> Option<Region> {
        let idx = self.regions.iter().position(|region| region.id == id)?;
        Some(self.regions.remove(idx))
    }

    /// Replace our regions with the drawing surface's current list.
    ///
    /// Objects with an ID we haven't already seen in this list keep it. New
    /// objects, and any repeated IDs, get fresh IDs.
    pub fn sync(&mut self, drawn: Vec<DrawnRect>) {
        let mut regions: Vec<Region> = Vec::with_capacity(drawn.len());
        for drawn_rect in drawn {
            let id = match drawn_rect.id {
                Some(id) if !regions.iter().any(|region| region.id == id) => {
                    self.next_id = self.next_id.max(id.0.saturating_add(1));
                    id
                }
                _ => allocate_id(&mut self.next_id, |id| {
                    regions.iter().any(|region| region.id == id)
                }),
            };
            regions.push(Region {
                id,
                rect: drawn_rect.rect,
            });
        }
        self.regions = regions;
    }

    /// Our regions, in order.
    pub fn regions(&self) -> &[Region] {
        &self.regions
    }

    /// Our raw field-name map.
    pub fn field_names(&self) -> &BTreeMap<String, String> {
        &self.field_names
    }

    /// How many regions do we have?
    pub fn len(&self) -> usize {
        self.regions.len()
    }

    /// Do we have any regions?
    pub fn is_empty(&self) -> bool {
        self.regions.is_empty()
    }

    /// The field name for the region at `ordinal`, falling back to the
    /// default name.
    pub fn field_name(&self, ordinal: usize) -> Option<String> {
        let region = self.regions.get(ordinal)?;
        Some(self.resolve_name(ordinal, region))
    }

    /// The stored name for `region`, or the default for its position.
    fn resolve_name(&self, ordinal: usize, region: &Region) -> String {
        self.field_names
            .get(&region.identity_key())
            .cloned()
            .unwrap_or_else(|| default_field_name(ordinal))
    }

    /// Rename the region at `ordinal`. This takes effect immediately.
    pub fn rename(
        &mut self,
        ordinal: usize,
        name: impl Into<String>,
    ) -> Result<(), ExtractError> {
        let region = self
            .regions
            .get(ordinal)
            .ok_or(ExtractError::RegionOutOfRange {
                ordinal,
                count: self.regions.len(),
            })?;
        self.field_names.insert(region.identity_key(), name.into());
        Ok(())
    }

    /// Every region with its resolved field name, in order.
    pub fn named_regions(&self) -> Vec<NamedRegion> {
        self.regions
            .iter()
            .enumerate()
            .map(|(ordinal, region)| NamedRegion {
                id: region.id,
                rect: region.rect,
                field_name: self.resolve_name(ordinal, region),
            })
            .collect()
    }

    /// Split back into persistable parts.
    pub fn to_parts(&self) -> (Vec<Region>, BTreeMap<String, String>) {
        (self.regions.clone(), self.field_names.clone())
    }
}
