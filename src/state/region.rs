//! Region tree and layout engine
//!
//! Regions mirror the repository's directory structure inside a fixed
//! `WORLD_SIZE x WORLD_SIZE` world. Each region's children share its content
//! area (bounds minus padding and a label strip) as a near-square grid in
//! insertion order. Paths arrive one at a time, so every insertion re-lays
//! out the parent's children and cascades down through their descendants.
//!
//! Two synthetic regions exist besides directories: `base` (the root) and
//! `external` (network resources, a leaf directly under `base`).

use crate::config::{LABEL_HEIGHT, MAP_PADDING, MAX_REGION_FILES, WORLD_SIZE};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

pub const BASE: &str = "base";
pub const EXTERNAL: &str = "external";

/// Vertical space above the first file slot in a region
const FILE_SLOT_PAD_TOP: f64 = 24.0;
/// Vertical space below the last file slot in a region
const FILE_SLOT_PAD_BOTTOM: f64 = 8.0;

/// Axis-aligned rectangle; may be degenerate for deeply nested regions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Bounds {
    pub x: i64,
    pub y: i64,
    pub width: i64,
    pub height: i64,
}

impl Bounds {
    /// Area available to children
    fn content(&self) -> (f64, f64, f64, f64) {
        let x = self.x as f64 + MAP_PADDING;
        let y = self.y as f64 + MAP_PADDING + LABEL_HEIGHT;
        let w = self.width as f64 - MAP_PADDING * 2.0;
        let h = self.height as f64 - MAP_PADDING - LABEL_HEIGHT - MAP_PADDING;
        (x, y, w, h)
    }

    pub fn center(&self) -> (f64, f64) {
        (
            self.x as f64 + self.width as f64 / 2.0,
            self.y as f64 + self.height as f64 / 2.0,
        )
    }
}

/// Round half up, matching how the renderer rounds its own geometry
fn round_half_up(v: f64) -> i64 {
    (v + 0.5).floor() as i64
}

/// Split `parent`'s content area into `count` cells, row-major
pub fn grid_cells(parent: &Bounds, count: usize) -> Vec<Bounds> {
    if count == 0 {
        return Vec::new();
    }
    let (cx, cy, cw, ch) = parent.content();
    let cols = (count as f64).sqrt().ceil() as usize;
    let rows = count.div_ceil(cols);
    let cell_w = cw / cols as f64;
    let cell_h = ch / rows as f64;

    (0..count)
        .map(|idx| {
            let col = (idx % cols) as f64;
            let row = (idx / cols) as f64;
            Bounds {
                x: round_half_up(cx + col * cell_w),
                y: round_half_up(cy + row * cell_h),
                width: round_half_up(cell_w),
                height: round_half_up(cell_h),
            }
        })
        .collect()
}

/// Presentation classification, fixed at creation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Terrain {
    Base,
    Source,
    Test,
    Config,
    Docs,
    Build,
    Assets,
    External,
}

impl Terrain {
    /// Guess terrain from a region path
    pub fn infer(region: &str) -> Self {
        if region.is_empty() || region == BASE {
            return Terrain::Base;
        }
        let lower = region.to_lowercase();
        if lower.starts_with("src") || lower.starts_with("lib") {
            Terrain::Source
        } else if lower.contains("test") {
            Terrain::Test
        } else if lower.starts_with("doc") || lower.ends_with(".md") {
            Terrain::Docs
        } else if lower.starts_with("dist") || lower.starts_with("build") {
            Terrain::Build
        } else if lower.contains("asset") || lower.contains("image") || lower.contains("font") {
            Terrain::Assets
        } else if lower.contains("config") || lower.starts_with('.') {
            Terrain::Config
        } else {
            Terrain::Source
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MapRegion {
    pub id: String,
    pub label: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<String>,
    pub bounds: Bounds,
    pub terrain: Terrain,
    pub file_count: usize,
    /// First `MAX_REGION_FILES` distinct filenames seen, in arrival order
    pub files: Vec<String>,
    /// Child region ids; order is layout order
    pub children: Vec<String>,
}

impl MapRegion {
    /// Vertical slot for the file at `index` in the region's file list
    pub fn file_slot(&self, index: usize) -> (f64, f64) {
        let usable = self.bounds.height as f64 - FILE_SLOT_PAD_TOP - FILE_SLOT_PAD_BOTTOM;
        let slot = usable / self.files.len().max(1) as f64;
        let x = self.bounds.x as f64 + self.bounds.width as f64 / 2.0;
        let y = self.bounds.y as f64 + FILE_SLOT_PAD_TOP + slot * index as f64 + slot / 2.0;
        (x, y)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GameMap {
    pub width: i64,
    pub height: i64,
    pub regions: BTreeMap<String, MapRegion>,
}

impl Default for GameMap {
    fn default() -> Self {
        Self {
            width: WORLD_SIZE,
            height: WORLD_SIZE,
            regions: BTreeMap::new(),
        }
    }
}

impl GameMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, id: &str) -> Option<&MapRegion> {
        self.regions.get(id)
    }

    fn ensure_base(&mut self) {
        if self.regions.contains_key(BASE) {
            return;
        }
        self.regions.insert(
            BASE.to_string(),
            MapRegion {
                id: BASE.to_string(),
                label: "root".to_string(),
                parent_id: None,
                bounds: Bounds {
                    x: 0,
                    y: 0,
                    width: self.width,
                    height: self.height,
                },
                terrain: Terrain::Base,
                file_count: 0,
                files: Vec::new(),
                children: Vec::new(),
            },
        );
    }

    /// Make sure `path` and every ancestor exist; returns the region id
    ///
    /// Idempotent. Empty path components are ignored, so `"a//b/"` and
    /// `"a/b"` name the same region; the returned id is the normalized one.
    pub fn ensure_region(&mut self, path: &str) -> String {
        self.ensure_base();

        let components: Vec<&str> = path.split('/').filter(|c| !c.is_empty()).collect();
        match components.as_slice() {
            [] => return BASE.to_string(),
            [only] if *only == BASE => return BASE.to_string(),
            // `external` stays a single leaf; anything beneath it folds into it
            [first, ..] if *first == EXTERNAL => {
                if !self.regions.contains_key(EXTERNAL) {
                    self.add_child(BASE, EXTERNAL, EXTERNAL, Terrain::External);
                }
                return EXTERNAL.to_string();
            }
            _ => {}
        }

        // Walk top-down; each missing prefix is created under the previous one
        let mut parent = BASE.to_string();
        for depth in 1..=components.len() {
            let id = components[..depth].join("/");
            if !self.regions.contains_key(&id) {
                let label = components[depth - 1];
                self.add_child(&parent, &id, label, Terrain::infer(&id));
                tracing::debug!(region = %id, parent = %parent, "Region discovered");
            }
            parent = id;
        }
        parent
    }

    fn add_child(&mut self, parent_id: &str, id: &str, label: &str, terrain: Terrain) {
        let Some(parent) = self.regions.get_mut(parent_id) else {
            return;
        };
        parent.children.push(id.to_string());
        let placeholder = parent.bounds;

        self.regions.insert(
            id.to_string(),
            MapRegion {
                id: id.to_string(),
                label: label.to_string(),
                parent_id: Some(parent_id.to_string()),
                bounds: placeholder,
                terrain,
                file_count: 0,
                files: Vec::new(),
                children: Vec::new(),
            },
        );
        self.relayout(parent_id);
    }

    /// Recompute the grid under `root_id` and every descendant grid below it
    fn relayout(&mut self, root_id: &str) {
        let mut pending = vec![root_id.to_string()];
        while let Some(id) = pending.pop() {
            let Some(region) = self.regions.get(&id) else {
                continue;
            };
            if region.children.is_empty() {
                continue;
            }
            let cells = grid_cells(&region.bounds, region.children.len());
            let children = region.children.clone();

            for (child_id, bounds) in children.into_iter().zip(cells) {
                if let Some(child) = self.regions.get_mut(&child_id) {
                    child.bounds = bounds;
                    if !child.children.is_empty() {
                        pending.push(child_id);
                    }
                }
            }
        }
    }

    /// Track `filename` in `region_id`; returns its slot index if tracked
    ///
    /// Once a region holds `MAX_REGION_FILES` names, new names are not recorded
    /// and `None` is returned.
    pub fn record_file(&mut self, region_id: &str, filename: &str) -> Option<usize> {
        let region = self.regions.get_mut(region_id)?;
        if let Some(idx) = region.files.iter().position(|f| f == filename) {
            return Some(idx);
        }
        if region.files.len() >= MAX_REGION_FILES {
            return None;
        }
        region.files.push(filename.to_string());
        region.file_count = region.files.len();
        Some(region.files.len() - 1)
    }
}

fn resolve(path: &str) -> PathBuf {
    // Symlinked prefixes (macOS /tmp -> /private/tmp) must match on both sides
    std::fs::canonicalize(path).unwrap_or_else(|_| PathBuf::from(path))
}

/// Region id for a file: its parent directory relative to the repository
///
/// Files directly in the repository root (or bare names) map to `base`.
/// Paths outside the repository keep their absolute directory chain.
pub fn path_to_region(file_path: &str, repo_path: &str) -> String {
    let file = resolve(file_path);
    let repo = resolve(repo_path);

    let relative = match file.strip_prefix(&repo) {
        Ok(rel) if !repo.as_os_str().is_empty() => rel.to_path_buf(),
        _ => file.clone(),
    };

    let parts: Vec<String> = relative
        .components()
        .filter_map(|c| match c {
            std::path::Component::Normal(s) => Some(s.to_string_lossy().into_owned()),
            _ => None,
        })
        .collect();

    if parts.len() <= 1 {
        return BASE.to_string();
    }
    parts[..parts.len() - 1].join("/")
}

/// Final path component, used as the tracked filename
pub fn file_name(path: &str) -> Option<String> {
    Path::new(path)
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .filter(|n| !n.is_empty())
}
