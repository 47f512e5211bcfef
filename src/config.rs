use std::fs;
use std::path::Path;

use anyhow::{anyhow, bail, Context, Result};
use glam::IVec3;
use roxmltree::{Document, Node};
use serde::{Deserialize, Serialize};

use crate::world::{World, DEFAULT_AMBIENT, DEFAULT_LIGHTCELL_SIZE, DEFAULT_MAX_PORTAL_DEPTH};

/// Which priority structure orders the radiosity patches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QueueKind {
    /// Binary search tree keyed by priority.
    #[default]
    Tree,
    /// Indexed binary heap.
    Heap,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RadiosityConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// The solver stops once the best priority drops below
    /// `start_priority / stop_ratio`.
    #[serde(default = "default_stop_ratio")]
    pub stop_ratio: f32,
    #[serde(default = "default_max_iterations")]
    pub max_iterations: u32,
    /// Reselections of one patch at an unchanged priority tolerated before
    /// the run is declared a loop.
    #[serde(default = "default_max_repeats")]
    pub max_repeats: u32,
    #[serde(default = "default_meter_total")]
    pub meter_total: u32,
    #[serde(default)]
    pub queue: QueueKind,
    /// Also require a clear beam between the patch centres before shooting.
    #[serde(default)]
    pub beam_check: bool,
}

impl Default for RadiosityConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            stop_ratio: default_stop_ratio(),
            max_iterations: default_max_iterations(),
            max_repeats: default_max_repeats(),
            meter_total: default_meter_total(),
            queue: QueueKind::default(),
            beam_check: false,
        }
    }
}

fn default_true() -> bool {
    true
}

fn default_stop_ratio() -> f32 {
    1000.0
}

fn default_max_iterations() -> u32 {
    1000
}

fn default_max_repeats() -> u32 {
    4
}

fn default_meter_total() -> u32 {
    1000
}

fn default_max_portal_depth() -> u32 {
    DEFAULT_MAX_PORTAL_DEPTH
}

fn default_lightcell_size() -> u32 {
    DEFAULT_LIGHTCELL_SIZE
}

fn default_ambient() -> IVec3 {
    DEFAULT_AMBIENT
}

/// Settings of a lighting run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LighterConfig {
    #[serde(default = "default_max_portal_depth")]
    pub max_portal_depth: u32,
    #[serde(default = "default_lightcell_size")]
    pub lightcell_size: u32,
    #[serde(default = "default_ambient")]
    pub ambient: IVec3,
    #[serde(default)]
    pub radiosity: RadiosityConfig,
}

impl Default for LighterConfig {
    fn default() -> Self {
        Self {
            max_portal_depth: default_max_portal_depth(),
            lightcell_size: default_lightcell_size(),
            ambient: default_ambient(),
            radiosity: RadiosityConfig::default(),
        }
    }
}

impl LighterConfig {
    /// Parses a `<lighter>` document. Missing elements keep their defaults,
    /// unknown ones are rejected.
    pub fn from_xml(xml: &str) -> Result<Self> {
        let document = Document::parse(xml).context("invalid lighter XML")?;
        let root = document.root_element();
        if !root.has_tag_name("lighter") {
            bail!("expected <lighter> root, found <{}>", root.tag_name().name());
        }
        let mut config = Self::default();
        for node in root.children().filter(Node::is_element) {
            match node.tag_name().name() {
                "portals" => {
                    for child in node.children().filter(Node::is_element) {
                        match child.tag_name().name() {
                            "maxdepth" => config.max_portal_depth = parse_u32(&child)?,
                            other => bail!("unknown element <{other}> in <portals>"),
                        }
                    }
                }
                "lightcell" => {
                    let size = parse_u32(&node)?;
                    if size == 0 {
                        bail!("<lightcell> must be positive");
                    }
                    config.lightcell_size = size;
                }
                "ambient" => config.ambient = parse_ivec3(&node)?,
                "radiosity" => config.radiosity = parse_radiosity(&node)?,
                other => bail!("unknown element <{other}> in <lighter>"),
            }
        }
        Ok(config)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let xml = fs::read_to_string(path)
            .with_context(|| format!("failed to read config {}", path.display()))?;
        Self::from_xml(&xml).with_context(|| format!("failed to parse config {}", path.display()))
    }

    /// Copies the world-level settings into `world`. Call before adding
    /// polygons, since the light cell size is used when lightmaps are laid
    /// out.
    pub fn apply(&self, world: &mut World) {
        world.set_max_portal_depth(self.max_portal_depth);
        world.set_lightcell_size(self.lightcell_size);
        world.set_ambient(self.ambient);
    }
}

fn parse_radiosity(node: &Node<'_, '_>) -> Result<RadiosityConfig> {
    let mut config = RadiosityConfig::default();
    for child in node.children().filter(Node::is_element) {
        match child.tag_name().name() {
            "enabled" => config.enabled = parse_bool(&child)?,
            "stopratio" => {
                let ratio = parse_f32(&child)?;
                if ratio <= 0.0 {
                    bail!("<stopratio> must be positive");
                }
                config.stop_ratio = ratio;
            }
            "maxiterations" => config.max_iterations = parse_u32(&child)?,
            "maxrepeats" => config.max_repeats = parse_u32(&child)?,
            "metertotal" => config.meter_total = parse_u32(&child)?.max(1),
            "beamcheck" => config.beam_check = parse_bool(&child)?,
            "queue" => {
                config.queue = match element_text(&child)? {
                    "tree" => QueueKind::Tree,
                    "heap" => QueueKind::Heap,
                    other => bail!("unknown queue kind '{other}', expected tree or heap"),
                }
            }
            other => bail!("unknown element <{other}> in <radiosity>"),
        }
    }
    Ok(config)
}

fn element_text<'a>(node: &Node<'a, '_>) -> Result<&'a str> {
    node.text()
        .map(str::trim)
        .filter(|text| !text.is_empty())
        .ok_or_else(|| anyhow!("<{}> is empty", node.tag_name().name()))
}

fn parse_u32(node: &Node<'_, '_>) -> Result<u32> {
    let text = element_text(node)?;
    text.parse::<u32>()
        .map_err(|err| anyhow!("failed to parse <{}> '{text}': {err}", node.tag_name().name()))
}

fn parse_f32(node: &Node<'_, '_>) -> Result<f32> {
    let text = element_text(node)?;
    text.parse::<f32>()
        .map_err(|err| anyhow!("failed to parse <{}> '{text}': {err}", node.tag_name().name()))
}

fn parse_bool(node: &Node<'_, '_>) -> Result<bool> {
    match element_text(node)? {
        "true" | "yes" | "on" | "1" => Ok(true),
        "false" | "no" | "off" | "0" => Ok(false),
        other => Err(anyhow!("<{}> expects a boolean, got '{other}'", node.tag_name().name())),
    }
}

fn parse_ivec3(node: &Node<'_, '_>) -> Result<IVec3> {
    let text = element_text(node)?;
    let numbers = text
        .split_whitespace()
        .map(|component| component.parse::<i32>())
        .collect::<Result<Vec<_>, _>>()
        .map_err(|err| anyhow!("failed to parse <{}> '{text}': {err}", node.tag_name().name()))?;
    match numbers.as_slice() {
        [r, g, b] => Ok(IVec3::new(*r, *g, *b)),
        _ => Err(anyhow!("<{}> needs three components", node.tag_name().name())),
    }
}
