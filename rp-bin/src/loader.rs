use std::path::Path;

use anyhow::{bail, Context, Result};
use serde::Deserialize;

use rp_types::{BlockType, Circuit, MultiWell, Orient, PlaceStatus, RectI, Tech, V2};

/// JSON materialization of a design, standing in for the external physical
/// database that owns LEF/DEF parsing.
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CircuitDesc {
    pub region: RectI,
    #[serde(default = "one")]
    pub grid_x: f64,
    #[serde(default = "one")]
    pub grid_y: f64,
    #[serde(default)]
    pub tech: Tech,
    pub types: Vec<BlockType>,
    pub blocks: Vec<BlockDesc>,
    #[serde(default)]
    pub nets: Vec<NetDesc>,
    /// Well-tap cell type, by name.
    #[serde(default)]
    pub well_tap_type: Option<String>,
}

fn one() -> f64 {
    1.0
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BlockDesc {
    pub name: String,
    #[serde(rename = "type")]
    pub type_name: String,
    #[serde(default)]
    pub x: f64,
    #[serde(default)]
    pub y: f64,
    #[serde(default)]
    pub status: PlaceStatus,
    #[serde(default)]
    pub orient: Orient,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct NetDesc {
    #[serde(default = "one")]
    pub weight: f64,
    pub pins: Vec<PinDesc>,
}

/// A net endpoint: a named pin of the block's type, or an explicit offset.
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PinDesc {
    pub block: String,
    #[serde(default)]
    pub pin: Option<String>,
    #[serde(default)]
    pub offset: Option<(f64, f64)>,
}

/// Extra per-type well descriptions from a `-cell`/`-mcell` file.
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CellWellDesc {
    #[serde(rename = "type")]
    pub type_name: String,
    pub well: MultiWell,
}

pub fn load_circuit(def: &Path, lef: Option<&Path>, wells: &[&Path]) -> Result<Circuit> {
    let text = std::fs::read_to_string(def)
        .with_context(|| format!("cannot read design file {}", def.display()))?;
    let mut desc: CircuitDesc = serde_json::from_str(&text)
        .with_context(|| format!("malformed design file {}", def.display()))?;

    if let Some(lef) = lef {
        let text = std::fs::read_to_string(lef)
            .with_context(|| format!("cannot read technology file {}", lef.display()))?;
        desc.tech = serde_json::from_str(&text)
            .with_context(|| format!("malformed technology file {}", lef.display()))?;
    }
    for path in wells {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("cannot read cell file {}", path.display()))?;
        let cells: Vec<CellWellDesc> = serde_json::from_str(&text)
            .with_context(|| format!("malformed cell file {}", path.display()))?;
        for cell in cells {
            let ty = desc
                .types
                .iter_mut()
                .find(|t| t.name == cell.type_name)
                .with_context(|| format!("cell file names unknown type {}", cell.type_name))?;
            ty.well = Some(cell.well);
        }
    }

    build(desc)
}

fn build(desc: CircuitDesc) -> Result<Circuit> {
    let mut ckt = Circuit::new(desc.region, desc.tech);
    ckt.grid_value_x = desc.grid_x;
    ckt.grid_value_y = desc.grid_y;

    for ty in desc.types {
        ckt.add_type(ty).context("rejected cell type")?;
    }
    if let Some(name) = &desc.well_tap_type {
        let id = ckt
            .type_id(name)
            .with_context(|| format!("unknown well-tap type {name}"))?;
        ckt.tech.well_tap_type = Some(id);
    }

    let mut block_ids = std::collections::HashMap::new();
    for blk in desc.blocks {
        let type_id = ckt
            .type_id(&blk.type_name)
            .with_context(|| format!("block {} has unknown type {}", blk.name, blk.type_name))?;
        let id = ckt.add_block(blk.name.clone(), type_id, blk.x, blk.y, blk.status, blk.orient);
        if block_ids.insert(blk.name.clone(), id).is_some() {
            bail!("duplicate block name {}", blk.name);
        }
    }

    for (i, net) in desc.nets.into_iter().enumerate() {
        let mut pins = Vec::with_capacity(net.pins.len());
        for pin in net.pins {
            let &blk = block_ids
                .get(&pin.block)
                .with_context(|| format!("net {i} references unknown block {}", pin.block))?;
            let offset = match (&pin.pin, pin.offset) {
                (Some(name), _) => {
                    let ty = &ckt.types[ckt.blocks[blk].type_id];
                    let p = ty
                        .pins
                        .iter()
                        .find(|p| &p.name == name)
                        .with_context(|| {
                            format!("type {} has no pin named {name}", ty.name)
                        })?;
                    p.offset
                }
                (None, Some((x, y))) => V2::new(x, y),
                (None, None) => V2::new(0.0, 0.0),
            };
            pins.push((blk, offset));
        }
        ckt.add_net(net.weight, pins);
    }

    Ok(ckt)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn minimal_design_loads() {
        let json = r#"{
            "region": { "llx": 0, "lly": 0, "urx": 100, "ury": 100 },
            "tech": { "row_height": 10 },
            "types": [
                { "name": "inv", "width": 4, "height": 10,
                  "pins": [ { "name": "A", "offset": { "x": 1.0, "y": 5.0 } } ] }
            ],
            "blocks": [
                { "name": "u1", "type": "inv" },
                { "name": "u2", "type": "inv", "x": 20.0, "y": 0.0, "status": "Fixed" }
            ],
            "nets": [
                { "pins": [ { "block": "u1", "pin": "A" },
                            { "block": "u2", "offset": [0.0, 0.0] } ] }
            ]
        }"#;
        let desc: CircuitDesc = serde_json::from_str(json).unwrap();
        let ckt = build(desc).unwrap();
        assert_eq!(ckt.blocks.len(), 2);
        assert_eq!(ckt.nets.len(), 1);
        assert_eq!(ckt.nets[0].pins[0].offset.x, 1.0);
        assert!(ckt.blocks[1].is_fixed());
        assert_eq!(ckt.tech.row_height, 10);
    }

    #[test]
    fn unknown_type_is_an_error() {
        let json = r#"{
            "region": { "llx": 0, "lly": 0, "urx": 10, "ury": 10 },
            "types": [],
            "blocks": [ { "name": "u1", "type": "missing" } ]
        }"#;
        let desc: CircuitDesc = serde_json::from_str(json).unwrap();
        assert!(build(desc).is_err());
    }
}
