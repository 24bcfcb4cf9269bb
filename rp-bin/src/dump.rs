use std::fs::File;
use std::io::{BufWriter, Write};

use anyhow::Result;
use log::warn;

use rp_types::{Circuit, Phase, PlacementObserver};

/// Writes per-phase debugging artifacts: a MATLAB patch table of block
/// rectangles and a `(x, y, dx, dy)` displacement quiver relative to the
/// previous phase.
pub struct MatlabDump {
    base: String,
    /// Block positions at the previous snapshot; the quiver of the first
    /// phase is relative to the loaded design.
    last: Vec<(f64, f64)>,
}

impl MatlabDump {
    pub fn new(base: &str, ckt: &Circuit) -> Self {
        MatlabDump {
            base: base.to_string(),
            last: ckt.blocks.iter().map(|b| (b.llx, b.lly)).collect(),
        }
    }

    fn phase_tag(phase: Phase) -> &'static str {
        match phase {
            Phase::GlobalPlacement => "gp",
            Phase::TetrisLegalization => "lg",
            Phase::WellLegalization => "wlg",
        }
    }

    fn write_patch_table(&self, path: &str, ckt: &Circuit) -> Result<()> {
        let mut out = BufWriter::new(File::create(path)?);
        for blk in &ckt.blocks {
            let (llx, lly, urx, ury) = (blk.llx, blk.lly, blk.urx(), blk.ury());
            let fill = if blk.is_movable() { 1 } else { 0 };
            writeln!(
                out,
                "{llx}\t{urx}\t{urx}\t{llx}\t{lly}\t{lly}\t{ury}\t{ury}\t{fill}\t{fill}\t{fill}"
            )?;
        }
        Ok(())
    }

    fn write_quiver(&mut self, path: &str, ckt: &Circuit) -> Result<()> {
        let mut out = BufWriter::new(File::create(path)?);
        for (blk, &(px, py)) in ckt.blocks.iter().zip(self.last.iter()) {
            writeln!(out, "{px}\t{py}\t{}\t{}", blk.llx - px, blk.lly - py)?;
        }
        // newly created blocks (taps, caps) have no previous location
        self.last = ckt.blocks.iter().map(|b| (b.llx, b.lly)).collect();
        Ok(())
    }
}

impl PlacementObserver for MatlabDump {
    fn on_phase_end(&mut self, phase: Phase, ckt: &Circuit) {
        let tag = Self::phase_tag(phase);
        let table = format!("{}_{tag}_result.txt", self.base);
        if let Err(e) = self.write_patch_table(&table, ckt) {
            warn!("cannot write {table}: {e}");
        }
        let quiver = format!("{}_{tag}_displace.txt", self.base);
        if let Err(e) = self.write_quiver(&quiver, ckt) {
            warn!("cannot write {quiver}: {e}");
        }
    }
}
